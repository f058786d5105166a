//! Optional TOML configuration file.
//!
//! Every key is optional; anything missing falls back to the CLI/environment
//! value or to the [`BridgeConfig`](crate::domain::BridgeConfig) default.
//!
//! ```toml
//! [server]
//! bind = "0.0.0.0"
//! port = 8080
//! subprotocol = "echo-protocol"
//! allowed_origins = ["http://dashboard.local"]
//! echo_inbound = false
//!
//! [pin]
//! index = 1
//! poll_interval_ms = 100
//! backend = "sysfs"
//! sysfs_root = "/sys/class/gpio"
//! ```

use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

/// Error type for configuration file operations.
#[derive(Debug, Error)]
pub enum ConfigFileError {
    /// The file could not be read.
    #[error("I/O error reading config at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The TOML content could not be parsed.
    #[error("failed to parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Which pin backend to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// Linux sysfs GPIO.
    Sysfs,
    /// In-memory pin cycling through `simulated_levels`.
    Simulated,
}

/// Top-level file schema.
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct FileConfig {
    pub server: ServerSection,
    pub pin: PinSection,
}

/// `[server]` table.
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct ServerSection {
    pub bind: Option<String>,
    pub port: Option<u16>,
    pub subprotocol: Option<String>,
    pub allowed_origins: Option<Vec<String>>,
    pub echo_inbound: Option<bool>,
}

/// `[pin]` table.
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct PinSection {
    pub index: Option<u32>,
    pub poll_interval_ms: Option<u64>,
    pub backend: Option<BackendKind>,
    pub sysfs_root: Option<PathBuf>,
    pub simulated_levels: Option<Vec<u8>>,
}

impl FileConfig {
    /// Parses TOML text.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigFileError::Parse`] on malformed TOML or unknown keys.
    pub fn parse(text: &str) -> Result<Self, ConfigFileError> {
        Ok(toml::from_str(text)?)
    }

    /// Reads and parses the file at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigFileError::Io`] if the file cannot be read and
    /// [`ConfigFileError::Parse`] if it is not valid.
    pub fn load(path: &Path) -> Result<Self, ConfigFileError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigFileError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&text)
    }
}
