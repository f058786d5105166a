//! GPIO WebSocket bridge: entry point.
//!
//! This binary samples one digital input pin and streams its level to every
//! connected WebSocket client.  Each connection gets its own broadcast timer;
//! on every tick the pin is read and, when the level is high, the decimal
//! value is sent as a text frame.
//!
//! # Usage
//!
//! ```text
//! gpio-ws-bridge [OPTIONS]
//!
//! Options:
//!   --config           <PATH>    Optional TOML configuration file
//!   --ws-port          <PORT>    WebSocket listener port [default: 8080]
//!   --ws-bind          <IP>      Listener bind address [default: 0.0.0.0]
//!   --pin-index        <N>       Hardware pin to monitor [default: 1]
//!   --poll-interval-ms <MS>      Broadcast tick period [default: 100]
//!   --subprotocol      <NAME>    Required sub-protocol [default: echo-protocol]
//!   --allowed-origins  <LIST>    Comma-separated origin allow-list [default: any]
//!   --echo-inbound     <BOOL>    Echo inbound frames back [default: false]
//!   --pin-backend      <KIND>    sysfs | simulated [default: sysfs]
//!   --sysfs-root       <PATH>    sysfs GPIO root [default: /sys/class/gpio]
//!   --simulated-levels <LIST>    Levels cycled by the simulated pin [default: 1,0]
//! ```
//!
//! # Configuration precedence
//!
//! Command-line arguments win over environment variables, which win over the
//! TOML file, which wins over the built-in defaults.
//!
//! | Variable                | Default           |
//! |-------------------------|-------------------|
//! | `GPIO_WS_CONFIG`        | none              |
//! | `GPIO_WS_PORT`          | `8080`            |
//! | `GPIO_WS_BIND`          | `0.0.0.0`         |
//! | `GPIO_PIN_INDEX`        | `1`               |
//! | `GPIO_POLL_INTERVAL_MS` | `100`             |
//! | `GPIO_SUBPROTOCOL`      | `echo-protocol`   |
//! | `GPIO_ALLOWED_ORIGINS`  | empty (allow all) |
//! | `GPIO_ECHO_INBOUND`     | `false`           |
//! | `GPIO_PIN_BACKEND`      | `sysfs`           |
//! | `GPIO_SYSFS_ROOT`       | `/sys/class/gpio` |

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use gpio_ws_bridge::domain::config::{
    DEFAULT_PIN_INDEX, DEFAULT_POLL_INTERVAL_MS, DEFAULT_PORT, DEFAULT_SUBPROTOCOL,
    DEFAULT_SYSFS_ROOT,
};
use gpio_ws_bridge::domain::{BridgeConfig, PinBackend};
use gpio_ws_bridge::infrastructure::config_file::{BackendKind, FileConfig};
use gpio_ws_bridge::infrastructure::{open_pin_reader, run_server};

const DEFAULT_BIND: &str = "0.0.0.0";
const DEFAULT_SIMULATED_LEVELS: [u8; 2] = [1, 0];

// ── CLI argument definitions ──────────────────────────────────────────────────

/// Streams the level of a digital input pin to WebSocket subscribers.
///
/// Every option is optional so that values missing on the command line and in
/// the environment can still come from the `--config` file.
#[derive(Debug, Default, Parser)]
#[command(
    name = "gpio-ws-bridge",
    about = "Streams the level of a digital input pin to WebSocket subscribers",
    version
)]
struct Cli {
    /// Optional TOML configuration file.
    #[arg(long, env = "GPIO_WS_CONFIG")]
    config: Option<PathBuf>,

    /// TCP port for the WebSocket server to listen on.
    #[arg(long, env = "GPIO_WS_PORT")]
    ws_port: Option<u16>,

    /// IP address to bind the WebSocket server to.
    ///
    /// Use `0.0.0.0` to accept connections from any interface or `127.0.0.1`
    /// to accept only local connections.
    #[arg(long, env = "GPIO_WS_BIND")]
    ws_bind: Option<String>,

    /// Hardware index of the monitored pin.
    #[arg(long, env = "GPIO_PIN_INDEX")]
    pin_index: Option<u32>,

    /// Broadcast tick period in milliseconds.
    #[arg(long, env = "GPIO_POLL_INTERVAL_MS")]
    poll_interval_ms: Option<u64>,

    /// Sub-protocol a client must offer during the handshake.
    #[arg(long, env = "GPIO_SUBPROTOCOL")]
    subprotocol: Option<String>,

    /// Comma-separated list of accepted `Origin` values.
    ///
    /// When empty, requests from every origin are accepted.
    #[arg(long, env = "GPIO_ALLOWED_ORIGINS", value_delimiter = ',')]
    allowed_origins: Vec<String>,

    /// Echo inbound text and binary frames back to the sender.
    #[arg(long, env = "GPIO_ECHO_INBOUND")]
    echo_inbound: Option<bool>,

    /// Where pin levels come from.
    #[arg(long, value_enum, env = "GPIO_PIN_BACKEND")]
    pin_backend: Option<BackendKind>,

    /// Root of the Linux sysfs GPIO interface.
    #[arg(long, env = "GPIO_SYSFS_ROOT")]
    sysfs_root: Option<PathBuf>,

    /// Levels returned in turn by the simulated backend.
    #[arg(long, value_delimiter = ',')]
    simulated_levels: Vec<u8>,
}

impl Cli {
    /// Merges the parsed arguments with `file` into a validated
    /// [`BridgeConfig`].
    ///
    /// # Errors
    ///
    /// Returns an error if the bind address is not a valid IP address or if
    /// the merged configuration fails [`BridgeConfig::validate`].
    fn into_bridge_config(self, file: FileConfig) -> anyhow::Result<BridgeConfig> {
        let server = file.server;
        let pin = file.pin;

        let bind = self
            .ws_bind
            .or(server.bind)
            .unwrap_or_else(|| DEFAULT_BIND.to_string());
        let port = self.ws_port.or(server.port).unwrap_or(DEFAULT_PORT);
        let ws_bind_addr: SocketAddr = format!("{bind}:{port}")
            .parse()
            .with_context(|| format!("invalid WebSocket bind address: '{bind}:{port}'"))?;

        let allowed_origins = if self.allowed_origins.is_empty() {
            server.allowed_origins.unwrap_or_default()
        } else {
            self.allowed_origins
        };

        let pin_backend = match self.pin_backend.or(pin.backend).unwrap_or(BackendKind::Sysfs) {
            BackendKind::Sysfs => PinBackend::Sysfs {
                root: self
                    .sysfs_root
                    .or(pin.sysfs_root)
                    .unwrap_or_else(|| PathBuf::from(DEFAULT_SYSFS_ROOT)),
            },
            BackendKind::Simulated => PinBackend::Simulated {
                levels: if self.simulated_levels.is_empty() {
                    pin.simulated_levels
                        .unwrap_or_else(|| DEFAULT_SIMULATED_LEVELS.to_vec())
                } else {
                    self.simulated_levels
                },
            },
        };

        let config = BridgeConfig {
            ws_bind_addr,
            pin_index: self.pin_index.or(pin.index).unwrap_or(DEFAULT_PIN_INDEX),
            poll_interval: Duration::from_millis(
                self.poll_interval_ms
                    .or(pin.poll_interval_ms)
                    .unwrap_or(DEFAULT_POLL_INTERVAL_MS),
            ),
            subprotocol: self
                .subprotocol
                .or(server.subprotocol)
                .unwrap_or_else(|| DEFAULT_SUBPROTOCOL.to_string()),
            allowed_origins,
            echo_inbound: self.echo_inbound.or(server.echo_inbound).unwrap_or(false),
            pin_backend,
        };
        config.validate().context("invalid configuration")?;
        Ok(config)
    }

    /// Loads the `--config` file, or an empty one when none was given.
    fn load_file(&self) -> anyhow::Result<FileConfig> {
        match &self.config {
            Some(path) => FileConfig::load(path)
                .with_context(|| format!("failed to load config file {}", path.display())),
            None => Ok(FileConfig::default()),
        }
    }
}

// ── Entry point ───────────────────────────────────────────────────────────────

/// Program entry point.
///
/// # What happens at startup
///
/// 1. `tracing_subscriber` is initialised; `RUST_LOG` sets the level
///    (default `info`).
/// 2. CLI arguments, environment variables and the optional config file are
///    merged into a [`BridgeConfig`].
/// 3. The pin is opened and configured as an input.  Failure here is fatal.
/// 4. A Ctrl+C handler is spawned; it clears the shared `running` flag.
/// 5. [`run_server`] accepts connections until the flag is cleared.
/// 6. The pin is released.
#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    // ── Logging setup ─────────────────────────────────────────────────────────
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // ── Configuration ─────────────────────────────────────────────────────────
    let cli = Cli::parse();
    let file = cli.load_file()?;
    let config = cli.into_bridge_config(file)?;

    info!(
        "GPIO WebSocket bridge starting: ws={}, pin={}, interval={:?}, subprotocol={}",
        config.ws_bind_addr, config.pin_index, config.poll_interval, config.subprotocol
    );

    // ── Pin ───────────────────────────────────────────────────────────────────
    let reader = open_pin_reader(&config.pin_backend, config.pin_index)
        .with_context(|| format!("failed to initialise pin {}", config.pin_index))?;
    info!("pin facility: {}", reader.describe());
    let reader = Arc::new(reader);

    // ── Graceful shutdown flag ────────────────────────────────────────────────
    let running = Arc::new(AtomicBool::new(true));
    let running_clone = Arc::clone(&running);

    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("received Ctrl+C; initiating graceful shutdown");
                running_clone.store(false, Ordering::Relaxed);
            }
            Err(e) => {
                tracing::error!("failed to listen for Ctrl+C signal: {e}");
            }
        }
    });

    // ── Main server loop ──────────────────────────────────────────────────────
    let result = run_server(&config, Arc::clone(&reader), running).await;

    if let Err(e) = reader.close() {
        warn!("failed to release pin {}: {e}", reader.pin_index());
    }
    result?;

    info!("GPIO WebSocket bridge stopped");
    Ok(())
}

// ── Tests ─────────────────────────────────────────────────────────────────────
