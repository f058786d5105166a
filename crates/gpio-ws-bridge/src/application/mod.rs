//! Application layer for gpio-ws-bridge.
//!
//! The application layer knows *what* happens to a connection and a pin
//! reading, but delegates *how* bytes reach the wire to the infrastructure
//! layer.
//!
//! # Responsibilities
//!
//! - Owning the pin behind the [`DigitalInputSource`] port
//! - Per-connection broadcast timers with guaranteed cancellation
//! - The registry of open connections
//! - Accept / reject / open / close decisions
//! - Inbound echo policy
//!
//! # What does NOT belong here?
//!
//! - Opening sockets or parsing HTTP (that is infrastructure)
//! - WebSocket framing (handled by tokio-tungstenite)
//! - sysfs file access (that is infrastructure)

pub mod echo;
pub mod lifecycle;
pub mod pin_reader;
pub mod registry;
pub mod scheduler;

pub use echo::EchoPolicy;
pub use lifecycle::{
    ConnectionLifecycleManager, HandshakeDecision, HandshakeRequest, OpenConnection, RejectReason,
};
pub use pin_reader::{DigitalInputSource, PinError, PinReader};
pub use registry::{ConnectionInfo, ConnectionRegistry, RegistryEntry, RegistryError};
pub use scheduler::{
    broadcast_tick, BroadcastScheduler, ChannelError, OutboundChannel, SchedulerExit,
    SchedulerExitReason, SchedulerHandle, TickOutcome,
};
