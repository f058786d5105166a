//! Linux sysfs GPIO backend.
//!
//! The legacy sysfs interface exposes each exported line as a directory:
//!
//! ```text
//! /sys/class/gpio/export        write "N" to export line N
//! /sys/class/gpio/unexport      write "N" to release it
//! /sys/class/gpio/gpioN/direction   "in" | "out"
//! /sys/class/gpio/gpioN/value       "0" | "1"
//! ```
//!
//! Reads are a single small file read, which the kernel serves without
//! blocking on the line itself.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

use tracing::{debug, info};

use crate::application::pin_reader::{DigitalInputSource, PinError};
use crate::domain::reading::PinDirection;

/// One GPIO line accessed through sysfs.
#[derive(Debug)]
pub struct SysfsGpio {
    root: PathBuf,
    pin: u32,
    /// Set when this process exported the line, so `release` only unexports
    /// lines it created.
    exported_here: AtomicBool,
}

impl SysfsGpio {
    /// Binds to line `pin` under `root` (normally `/sys/class/gpio`).
    /// Nothing is touched until [`DigitalInputSource::set_direction`].
    pub fn new(root: impl Into<PathBuf>, pin: u32) -> Self {
        Self {
            root: root.into(),
            pin,
            exported_here: AtomicBool::new(false),
        }
    }

    fn line_dir(&self) -> PathBuf {
        self.root.join(format!("gpio{}", self.pin))
    }

    fn io_error(&self, source: io::Error) -> PinError {
        PinError::Io {
            pin: self.pin,
            source,
        }
    }

    fn write_control(&self, path: &Path, value: &str) -> Result<(), PinError> {
        fs::write(path, value).map_err(|e| self.io_error(e))
    }

    fn ensure_exported(&self) -> Result<(), PinError> {
        if !self.root.is_dir() {
            return Err(PinError::Unavailable {
                pin: self.pin,
                reason: format!("{} does not exist", self.root.display()),
            });
        }
        if self.line_dir().is_dir() {
            return Ok(());
        }
        debug!("exporting gpio{} via {}", self.pin, self.root.display());
        self.write_control(&self.root.join("export"), &self.pin.to_string())?;
        self.exported_here.store(true, Ordering::Release);
        Ok(())
    }
}

impl DigitalInputSource for SysfsGpio {
    fn set_direction(&self, direction: PinDirection) -> Result<(), PinError> {
        self.ensure_exported()?;
        self.write_control(
            &self.line_dir().join("direction"),
            direction.as_sysfs_str(),
        )
    }

    fn read_level(&self) -> Result<u8, PinError> {
        let raw = fs::read_to_string(self.line_dir().join("value")).map_err(|e| self.io_error(e))?;
        let trimmed = raw.trim();
        trimmed.parse::<u8>().map_err(|_| PinError::InvalidValue {
            pin: self.pin,
            value: trimmed.to_string(),
        })
    }

    fn release(&self) -> Result<(), PinError> {
        if !self.exported_here.swap(false, Ordering::AcqRel) {
            return Ok(());
        }
        info!("unexporting gpio{}", self.pin);
        self.write_control(&self.root.join("unexport"), &self.pin.to_string())
    }

    fn describe(&self) -> String {
        format!("Linux sysfs GPIO at {} (line {})", self.root.display(), self.pin)
    }
}
