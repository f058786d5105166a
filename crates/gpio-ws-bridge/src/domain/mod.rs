//! Domain layer for gpio-ws-bridge.
//!
//! The domain layer contains pure types that have no dependencies on I/O,
//! networking, or the async runtime.  This makes them easy to test in
//! isolation.
//!
//! # What belongs in the domain layer?
//!
//! - Pin readings and pin direction
//! - Origin policies (pure predicates)
//! - Connection identity, state machine and close reasons
//! - Frame types for the message channel
//! - Configuration structures
//!
//! # What does NOT belong here?
//!
//! - Any `tokio`, `TcpStream`, or `WebSocket` types
//! - File I/O or environment variable reading

pub mod config;
pub mod connection;
pub mod messages;
pub mod origin;
pub mod reading;

pub use config::{BridgeConfig, ConfigError, PinBackend};
pub use connection::{
    CloseReason, ConnectionId, ConnectionState, InvalidTransition, LifecycleEvent,
};
pub use messages::ChannelFrame;
pub use origin::{AllowAllOrigins, AllowListOrigins, OriginPolicy};
pub use reading::{PinDirection, PinReading};
