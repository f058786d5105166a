//! Handling of inbound frames.
//!
//! The bridge is a one-way feed: by default inbound content is read (so close
//! frames and pings are processed) and then discarded.  Echo mode is a dormant
//! capability that must be switched on explicitly in the configuration; when
//! on, every data frame is returned to its sender unchanged.

use crate::domain::messages::ChannelFrame;

/// What to do with inbound data frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EchoPolicy {
    /// Ignore inbound content.
    #[default]
    Disabled,
    /// Send text frames back as text and binary frames back as binary.
    Verbatim,
}

impl EchoPolicy {
    pub fn from_enabled(enabled: bool) -> Self {
        if enabled {
            EchoPolicy::Verbatim
        } else {
            EchoPolicy::Disabled
        }
    }

    /// Returns the frame to send back, if any.
    pub fn reply(self, inbound: ChannelFrame) -> Option<ChannelFrame> {
        match self {
            EchoPolicy::Disabled => None,
            EchoPolicy::Verbatim => Some(inbound),
        }
    }
}
