//! WebSocket implementation of the [`OutboundChannel`] port.
//!
//! The write half of a WebSocket stream is shared between the connection's
//! broadcast scheduler and the inbound reader (which needs it for echo
//! replies), so it lives behind a `tokio::sync::Mutex`.  The lock is held only
//! for the duration of a single frame write, and every write and close is
//! bounded by a deadline so a peer that stops reading cannot stall the
//! connection.

use std::time::Duration;

use async_trait::async_trait;
use futures_util::{Sink, SinkExt};
use tokio::sync::Mutex;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::{Error as WsError, Message as WsMessage};
use tracing::debug;

use crate::application::scheduler::{ChannelError, OutboundChannel};
use crate::domain::messages::ChannelFrame;

/// Outbound half of one WebSocket connection.
pub struct WsOutbound<S> {
    sink: Mutex<S>,
    write_timeout: Duration,
}

impl<S> WsOutbound<S> {
    /// Wraps `sink`; a write or close taking longer than `write_timeout`
    /// fails.
    pub fn new(sink: S, write_timeout: Duration) -> Self {
        Self {
            sink: Mutex::new(sink),
            write_timeout,
        }
    }
}

/// Converts a channel frame into a WebSocket data message.
pub fn to_ws_message(frame: ChannelFrame) -> WsMessage {
    match frame {
        ChannelFrame::Text(text) => WsMessage::Text(text),
        ChannelFrame::Binary(data) => WsMessage::Binary(data),
    }
}

/// Maps a tungstenite write error onto the port's error type.
pub fn channel_error(error: WsError) -> ChannelError {
    match error {
        WsError::ConnectionClosed | WsError::AlreadyClosed => ChannelError::Closed,
        other => ChannelError::Transport(other.to_string()),
    }
}

#[async_trait]
impl<S> OutboundChannel for WsOutbound<S>
where
    S: Sink<WsMessage, Error = WsError> + Unpin + Send,
{
    async fn send(&self, frame: ChannelFrame) -> Result<(), ChannelError> {
        let mut sink = self.sink.lock().await;
        match timeout(self.write_timeout, sink.send(to_ws_message(frame))).await {
            Ok(result) => result.map_err(channel_error),
            Err(_) => Err(ChannelError::Transport(format!(
                "write timed out after {:?}",
                self.write_timeout
            ))),
        }
    }

    async fn close(&self) {
        let mut sink = self.sink.lock().await;
        match timeout(self.write_timeout, sink.close()).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => debug!("closing WebSocket sink failed (peer already gone): {e}"),
            Err(_) => debug!("closing WebSocket sink timed out after {:?}", self.write_timeout),
        }
    }
}
