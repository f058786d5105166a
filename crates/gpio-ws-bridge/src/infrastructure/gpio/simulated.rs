//! Simulated pin for running without hardware.
//!
//! # Why a simulated pin?
//!
//! The sysfs backend needs a board with an exported GPIO line.  The
//! `SimulatedInputSource` replaces it with a list of levels returned one per
//! read, wrapping around at the end.  It records the configured direction and
//! whether it was released so tests can observe the startup and shutdown
//! sequence.
//!
//! # Usage
//!
//! ```rust
//! use gpio_ws_bridge::application::DigitalInputSource;
//! use gpio_ws_bridge::infrastructure::gpio::SimulatedInputSource;
//!
//! let pin = SimulatedInputSource::cycling(vec![1, 0]);
//! assert_eq!(pin.read_level().unwrap(), 1);
//! assert_eq!(pin.read_level().unwrap(), 0);
//! assert_eq!(pin.read_level().unwrap(), 1);
//! ```
//!
//! Set `should_fail` to make every read return an error, which the
//! [`PinReader`](crate::application::PinReader) turns into "no reading".

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

use crate::application::pin_reader::{DigitalInputSource, PinError};
use crate::domain::reading::PinDirection;

/// In-memory pin that cycles through a fixed list of levels.
#[derive(Debug, Default)]
pub struct SimulatedInputSource {
    levels: Vec<u8>,
    cursor: AtomicUsize,
    direction: Mutex<Option<PinDirection>>,
    released: AtomicBool,
    /// When `true`, every read fails.
    pub should_fail: AtomicBool,
}

impl SimulatedInputSource {
    /// A pin returning `levels[0]`, `levels[1]`, ... and wrapping around.
    pub fn cycling(levels: Vec<u8>) -> Self {
        Self {
            levels,
            ..Self::default()
        }
    }

    /// A pin that always reports `level`.
    pub fn constant(level: u8) -> Self {
        Self::cycling(vec![level])
    }

    /// The last direction passed to `set_direction`.
    pub fn direction(&self) -> Option<PinDirection> {
        *self.direction.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Number of reads served so far.
    pub fn reads(&self) -> usize {
        self.cursor.load(Ordering::Acquire)
    }

    /// Returns `true` once `release` has been called.
    pub fn is_released(&self) -> bool {
        self.released.load(Ordering::Acquire)
    }
}

impl DigitalInputSource for SimulatedInputSource {
    fn set_direction(&self, direction: PinDirection) -> Result<(), PinError> {
        *self.direction.lock().unwrap_or_else(|e| e.into_inner()) = Some(direction);
        Ok(())
    }

    fn read_level(&self) -> Result<u8, PinError> {
        if self.should_fail.load(Ordering::Acquire) {
            return Err(PinError::Unavailable {
                pin: 0,
                reason: "simulated read failure".to_string(),
            });
        }
        if self.levels.is_empty() {
            return Err(PinError::Unavailable {
                pin: 0,
                reason: "no simulated levels".to_string(),
            });
        }
        let i = self.cursor.fetch_add(1, Ordering::AcqRel);
        Ok(self.levels[i % self.levels.len()])
    }

    fn release(&self) -> Result<(), PinError> {
        self.released.store(true, Ordering::Release);
        Ok(())
    }

    fn describe(&self) -> String {
        format!("simulated pin cycling {:?}", self.levels)
    }
}
