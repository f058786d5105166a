//! Pin backends implementing the [`DigitalInputSource`](crate::application::DigitalInputSource) port.
//!
//! - [`sysfs::SysfsGpio`]: Linux `/sys/class/gpio` interface (production).
//! - [`simulated::SimulatedInputSource`]: in-memory pin cycling through a
//!   fixed list of levels, for running without hardware and for tests.

use crate::application::pin_reader::{PinError, PinReader};
use crate::domain::config::PinBackend;
use crate::domain::reading::PinDirection;

pub mod simulated;
pub mod sysfs;

pub use simulated::SimulatedInputSource;
pub use sysfs::SysfsGpio;

/// Builds the configured backend, wraps it in a [`PinReader`] and sets the pin
/// to input.
///
/// # Errors
///
/// Returns the backend's [`PinError`] if the pin cannot be configured.  The
/// caller treats this as fatal.
pub fn open_pin_reader(backend: &PinBackend, pin_index: u32) -> Result<PinReader, PinError> {
    let reader = match backend {
        PinBackend::Sysfs { root } => PinReader::new(SysfsGpio::new(root.clone(), pin_index), pin_index),
        PinBackend::Simulated { levels } => {
            PinReader::new(SimulatedInputSource::cycling(levels.clone()), pin_index)
        }
    };
    reader.configure(PinDirection::Input)?;
    Ok(reader)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_simulated_backend_configures_input() {
        let backend = PinBackend::Simulated { levels: vec![1, 0] };

        let reader = open_pin_reader(&backend, 3).expect("simulated pin always opens");

        assert_eq!(reader.pin_index(), 3);
        assert_eq!(reader.read().map(|r| r.level()), Some(1));
        assert_eq!(reader.read().map(|r| r.level()), Some(0));
    }

    #[test]
    fn test_open_missing_sysfs_root_is_fatal() {
        let backend = PinBackend::Sysfs {
            root: std::env::temp_dir().join("gpio-ws-bridge-does-not-exist"),
        };

        let result = open_pin_reader(&backend, 1);

        assert!(matches!(result, Err(PinError::Unavailable { pin: 1, .. })));
    }
}
