//! Pin readings.

use std::fmt;

/// Direction a digital pin is configured for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PinDirection {
    /// The pin is sampled by the bridge.
    Input,
    /// The pin is driven by the host.  Never used by the bridge itself, but the
    /// hardware port accepts it so adapters can be configured either way.
    Output,
}

impl PinDirection {
    /// The keyword the Linux sysfs GPIO interface uses for this direction.
    pub fn as_sysfs_str(self) -> &'static str {
        match self {
            PinDirection::Input => "in",
            PinDirection::Output => "out",
        }
    }
}

/// The logical level of the monitored pin at one sampling instant.
///
/// Produced fresh on every tick and discarded right after it has been sent.
/// A reading is *truthy* when its level is non-zero; only truthy readings are
/// pushed to subscribers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PinReading(u8);

impl PinReading {
    /// Creates a reading from a raw logical level.
    pub const fn new(level: u8) -> Self {
        Self(level)
    }

    /// The raw logical level.
    pub const fn level(self) -> u8 {
        self.0
    }

    /// Returns `true` when the reading should be broadcast.
    pub const fn is_truthy(self) -> bool {
        self.0 != 0
    }
}

/// The external text representation: the level in decimal.
impl fmt::Display for PinReading {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
