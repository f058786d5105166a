//! Infrastructure layer for gpio-ws-bridge.
//!
//! The infrastructure layer handles all I/O: the GPIO line, the WebSocket
//! listener and the optional configuration file.
//!
//! # Responsibilities
//!
//! - Opening and configuring the pin backend (sysfs or simulated)
//! - Binding a TCP listener and performing the WebSocket upgrade handshake
//! - Adapting the write half of each WebSocket to the outbound channel port
//! - Spawning per-session Tokio tasks
//! - Handling the graceful shutdown signal
//!
//! # What does NOT belong here?
//!
//! - Handshake decisions, scheduling and bookkeeping (application layer)
//! - Value types such as readings, frames and connection states (domain layer)

pub mod config_file;
pub mod gpio;
pub mod ws_channel;
pub mod ws_server;

// Re-export the primary entry points so `main.rs` can call them concisely.
pub use gpio::open_pin_reader;
pub use ws_server::{run_server, Server};
