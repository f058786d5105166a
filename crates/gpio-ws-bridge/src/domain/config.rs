//! Bridge configuration types.
//!
//! [`BridgeConfig`] is the single source of truth for all runtime settings.
//! It is populated by `main.rs` from CLI arguments, environment variables and
//! an optional TOML file; tests build it directly or start from the defaults.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Default TCP port for the WebSocket listener.
pub const DEFAULT_PORT: u16 = 8080;
/// Default hardware pin index.
pub const DEFAULT_PIN_INDEX: u32 = 1;
/// Default broadcast tick period in milliseconds.
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 100;
/// Default negotiated sub-protocol name.
pub const DEFAULT_SUBPROTOCOL: &str = "echo-protocol";
/// Default root of the Linux sysfs GPIO interface.
pub const DEFAULT_SYSFS_ROOT: &str = "/sys/class/gpio";

/// Errors returned by [`BridgeConfig::validate`].
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("poll interval must be greater than zero")]
    ZeroPollInterval,
    #[error("sub-protocol name must not be empty")]
    EmptySubprotocol,
    #[error("sub-protocol name contains invalid character {0:?}")]
    InvalidSubprotocol(char),
    #[error("simulated pin backend needs at least one level")]
    EmptySimulation,
}

/// Where pin levels come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PinBackend {
    /// Linux sysfs GPIO rooted at `root` (normally `/sys/class/gpio`).
    Sysfs { root: PathBuf },
    /// In-memory pin that cycles through `levels`, one per read.
    Simulated { levels: Vec<u8> },
}

impl Default for PinBackend {
    fn default() -> Self {
        PinBackend::Sysfs {
            root: PathBuf::from(DEFAULT_SYSFS_ROOT),
        }
    }
}

/// All runtime configuration for the bridge.
///
/// # Example
///
/// ```rust
/// use gpio_ws_bridge::domain::BridgeConfig;
///
/// let cfg = BridgeConfig::default();
/// assert_eq!(cfg.ws_bind_addr.port(), 8080);
/// assert_eq!(cfg.subprotocol, "echo-protocol");
/// ```
#[derive(Debug, Clone)]
pub struct BridgeConfig {
    /// The address and port the WebSocket server binds to.
    pub ws_bind_addr: SocketAddr,

    /// Hardware identifier of the monitored pin.
    pub pin_index: u32,

    /// Period of each connection's broadcast tick.
    pub poll_interval: Duration,

    /// Sub-protocol a client must offer during the handshake.
    pub subprotocol: String,

    /// Origins accepted by the handshake.  Empty means every origin is
    /// accepted, which is unsafe outside a trusted network.
    pub allowed_origins: Vec<String>,

    /// Echo inbound frames back to their sender.  Off unless explicitly
    /// enabled; inbound content is otherwise ignored.
    pub echo_inbound: bool,

    /// Source of pin levels.
    pub pin_backend: PinBackend,
}

impl Default for BridgeConfig {
    /// | Field           | Default             |
    /// |-----------------|---------------------|
    /// | ws_bind_addr    | `0.0.0.0:8080`      |
    /// | pin_index       | `1`                 |
    /// | poll_interval   | 100 ms              |
    /// | subprotocol     | `echo-protocol`     |
    /// | allowed_origins | empty (allow all)   |
    /// | echo_inbound    | `false`             |
    /// | pin_backend     | sysfs               |
    fn default() -> Self {
        Self {
            ws_bind_addr: SocketAddr::from(([0, 0, 0, 0], DEFAULT_PORT)),
            pin_index: DEFAULT_PIN_INDEX,
            poll_interval: Duration::from_millis(DEFAULT_POLL_INTERVAL_MS),
            subprotocol: DEFAULT_SUBPROTOCOL.to_string(),
            allowed_origins: Vec::new(),
            echo_inbound: false,
            pin_backend: PinBackend::default(),
        }
    }
}

impl BridgeConfig {
    /// Checks the settings that cannot be expressed in the type system.
    ///
    /// # Errors
    ///
    /// Returns the first [`ConfigError`] found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.poll_interval.is_zero() {
            return Err(ConfigError::ZeroPollInterval);
        }
        if self.subprotocol.is_empty() {
            return Err(ConfigError::EmptySubprotocol);
        }
        // RFC 6455 sub-protocol names are HTTP tokens.
        if let Some(c) = self.subprotocol.chars().find(|c| !is_token_char(*c)) {
            return Err(ConfigError::InvalidSubprotocol(c));
        }
        if let PinBackend::Simulated { levels } = &self.pin_backend {
            if levels.is_empty() {
                return Err(ConfigError::EmptySimulation);
            }
        }
        Ok(())
    }
}

fn is_token_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || "!#$%&'*+-.^_`|~".contains(c)
}
