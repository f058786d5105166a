//! PinReader: the single owned handle to the monitored digital input.
//!
//! The hardware facility is abstracted behind the [`DigitalInputSource`] port.
//! Production uses the sysfs adapter, tests use a mock or the simulated
//! source.  One `PinReader` is constructed at startup, configured once, and
//! shared read-only (`Arc<PinReader>`) by every connection's scheduler.
//!
//! # Failure semantics
//!
//! - [`PinReader::configure`] propagates errors: a pin that cannot be set to
//!   input at boot is fatal.
//! - [`PinReader::read`] never propagates errors: a failed sample is treated
//!   as "no reading this tick".

use thiserror::Error;
use tracing::{debug, info};

use crate::domain::reading::{PinDirection, PinReading};

/// Error type for pin access.
#[derive(Debug, Error)]
pub enum PinError {
    #[error("pin {pin} is unavailable: {reason}")]
    Unavailable { pin: u32, reason: String },
    #[error("I/O error on pin {pin}: {source}")]
    Io {
        pin: u32,
        #[source]
        source: std::io::Error,
    },
    #[error("pin {pin} returned unexpected value {value:?}")]
    InvalidValue { pin: u32, value: String },
}

/// Port to the underlying digital input facility.
///
/// Implementations must return from every method in bounded time; a
/// hardware read is expected to be O(1).
#[cfg_attr(test, mockall::automock)]
pub trait DigitalInputSource: Send + Sync {
    /// Configures the direction of the line.
    fn set_direction(&self, direction: PinDirection) -> Result<(), PinError>;

    /// Samples the current logical level.
    fn read_level(&self) -> Result<u8, PinError>;

    /// Releases the line.  Read-only lines need no explicit teardown, but the
    /// call exists so fakes can observe it.
    fn release(&self) -> Result<(), PinError>;

    /// Human-readable description of the facility, logged at startup.
    fn describe(&self) -> String;
}

/// Lets callers keep a handle to a source after giving it to a [`PinReader`].
impl<T: DigitalInputSource + ?Sized> DigitalInputSource for std::sync::Arc<T> {
    fn set_direction(&self, direction: PinDirection) -> Result<(), PinError> {
        (**self).set_direction(direction)
    }

    fn read_level(&self) -> Result<u8, PinError> {
        (**self).read_level()
    }

    fn release(&self) -> Result<(), PinError> {
        (**self).release()
    }

    fn describe(&self) -> String {
        (**self).describe()
    }
}

/// Owned, shareable reader for one pin.
pub struct PinReader {
    source: Box<dyn DigitalInputSource>,
    pin_index: u32,
}

impl PinReader {
    /// Wraps `source`, which must already be bound to `pin_index`.
    pub fn new(source: impl DigitalInputSource + 'static, pin_index: u32) -> Self {
        Self {
            source: Box::new(source),
            pin_index,
        }
    }

    /// The hardware pin identifier.
    pub fn pin_index(&self) -> u32 {
        self.pin_index
    }

    /// Description of the underlying facility.
    pub fn describe(&self) -> String {
        self.source.describe()
    }

    /// Sets the pin direction.  Called once at startup.
    ///
    /// # Errors
    ///
    /// Returns the facility's [`PinError`] unchanged; the caller should abort.
    pub fn configure(&self, direction: PinDirection) -> Result<(), PinError> {
        self.source.set_direction(direction)?;
        info!(
            "pin {} configured as {}",
            self.pin_index,
            direction.as_sysfs_str()
        );
        Ok(())
    }

    /// Samples the pin.  Returns `None` if the facility reported an error.
    pub fn read(&self) -> Option<PinReading> {
        match self.source.read_level() {
            Ok(level) => Some(PinReading::new(level)),
            Err(e) => {
                debug!("pin {}: read failed, no data this tick: {e}", self.pin_index);
                None
            }
        }
    }

    /// Releases the pin.
    ///
    /// # Errors
    ///
    /// Returns the facility's [`PinError`] if the release failed.
    pub fn close(&self) -> Result<(), PinError> {
        self.source.release()
    }
}

impl std::fmt::Debug for PinReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PinReader")
            .field("pin_index", &self.pin_index)
            .finish_non_exhaustive()
    }
}
