//! gpio-ws-bridge library crate.
//!
//! Samples one digital input pin on a fixed interval and pushes the level to
//! every connected WebSocket client.
//!
//! # Architecture (clean architecture)
//!
//! ```text
//! Browser / WebSocket client
//!         ↕  ("1" text frames, sub-protocol "echo-protocol")
//! [gpio-ws-bridge]
//!   ├── domain/           Pure types: readings, origin policies, connection
//!   │                     state machine, BridgeConfig
//!   ├── application/      PinReader, BroadcastScheduler, ConnectionRegistry,
//!   │                     ConnectionLifecycleManager
//!   └── infrastructure/
//!         ├── ws_server/  Accept loop + handshake (tokio-tungstenite)
//!         ├── ws_channel/ WebSocket writes for the outbound port
//!         ├── gpio/       sysfs and simulated pin backends
//!         └── config_file/ Optional TOML configuration
//!         ↕
//! Digital input pin
//! ```
//!
//! # Layer rules
//!
//! - `domain` has no I/O and no async.
//! - `application` depends on `domain` and spawns timers on the tokio runtime,
//!   but never touches sockets or files.
//! - `infrastructure` depends on all other layers plus `tungstenite` and the
//!   filesystem.
//!
//! # Scheduling model
//!
//! The binary runs everything on a single-threaded tokio runtime.  Handshakes,
//! close handling and ticks are interleaved turns on one thread, so the pin
//! and the registry are never touched in parallel.

/// Domain layer: pure types (no I/O).
pub mod domain;

/// Application layer: connection lifecycle and broadcast scheduling.
pub mod application;

/// Infrastructure layer: WebSocket server, pin backends, config file.
pub mod infrastructure;
