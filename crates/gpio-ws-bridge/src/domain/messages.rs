//! Frames carried by the message channel.
//!
//! The channel is text-based: the only payload the server originates is the
//! decimal pin reading.  Binary frames only appear when inbound echo is
//! enabled and a peer sends one.

use crate::domain::reading::PinReading;

/// A single data frame on the message channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelFrame {
    /// UTF-8 text frame.
    Text(String),
    /// Binary frame.
    Binary(Vec<u8>),
}

impl ChannelFrame {
    /// Payload length in bytes.
    pub fn len(&self) -> usize {
        match self {
            ChannelFrame::Text(t) => t.len(),
            ChannelFrame::Binary(b) => b.len(),
        }
    }

    /// Returns `true` for an empty payload.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl From<PinReading> for ChannelFrame {
    fn from(reading: PinReading) -> Self {
        ChannelFrame::Text(reading.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reading_becomes_decimal_text_frame() {
        let frame = ChannelFrame::from(PinReading::new(1));
        assert_eq!(frame, ChannelFrame::Text("1".to_string()));
    }

    #[test]
    fn test_frame_len() {
        assert_eq!(ChannelFrame::Text("abc".to_string()).len(), 3);
        assert_eq!(ChannelFrame::Binary(vec![1, 2]).len(), 2);
        assert!(ChannelFrame::Binary(Vec::new()).is_empty());
    }
}
