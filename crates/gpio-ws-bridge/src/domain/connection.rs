//! Connection identity and lifecycle state machine.
//!
//! Every inbound request moves through these states:
//!
//! ```text
//!             Accepted            Closed
//! Pending ─────────────► Open ─────────────► Closed
//!    │
//!    │ Rejected
//!    ▼
//! Rejected
//! ```
//!
//! `Rejected` and `Closed` are terminal.  Any other transition is reported as
//! an [`InvalidTransition`] rather than silently ignored.

use std::fmt;

use thiserror::Error;
use uuid::Uuid;

/// Unique identifier of one accepted peer session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    /// Generates a fresh random identifier.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

/// State of a single connection request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Request received, origin not yet evaluated.
    Pending,
    /// Refused at the protocol level; no connection was created.
    Rejected,
    /// Handshake complete, registered, scheduler running.
    Open,
    /// Scheduler cancelled and connection deregistered.
    Closed,
}

/// Events that drive [`ConnectionState`] transitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleEvent {
    /// Origin accepted and handshake completed.
    Accepted,
    /// Origin (or handshake) refused.
    Rejected,
    /// Peer disconnect, write failure, or local shutdown.
    Closed,
}

/// Returned when an event is not valid in the current state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("invalid connection transition: {event:?} in state {from:?}")]
pub struct InvalidTransition {
    pub from: ConnectionState,
    pub event: LifecycleEvent,
}

impl ConnectionState {
    /// Applies `event` and returns the next state.
    ///
    /// # Errors
    ///
    /// Returns [`InvalidTransition`] for any event that is not allowed in the
    /// current state, including every event in a terminal state.
    pub fn on(self, event: LifecycleEvent) -> Result<Self, InvalidTransition> {
        match (self, event) {
            (ConnectionState::Pending, LifecycleEvent::Accepted) => Ok(ConnectionState::Open),
            (ConnectionState::Pending, LifecycleEvent::Rejected) => Ok(ConnectionState::Rejected),
            (ConnectionState::Open, LifecycleEvent::Closed) => Ok(ConnectionState::Closed),
            (from, event) => Err(InvalidTransition { from, event }),
        }
    }

    /// Returns `true` for `Rejected` and `Closed`.
    pub fn is_terminal(self) -> bool {
        matches!(self, ConnectionState::Rejected | ConnectionState::Closed)
    }
}

/// Why an open connection ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CloseReason {
    /// The peer closed the connection, optionally with a close frame.
    PeerClosed {
        code: Option<u16>,
        description: String,
    },
    /// The transport failed while reading from the peer.
    TransportError(String),
    /// A broadcast write failed; the connection is treated as closed.
    WriteFailed(String),
    /// The server is shutting down.
    LocalShutdown,
}

impl fmt::Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CloseReason::PeerClosed {
                code: Some(code),
                description,
            } => write!(f, "peer closed (code {code}: {description})"),
            CloseReason::PeerClosed {
                code: None,
                description,
            } => write!(f, "peer closed ({description})"),
            CloseReason::TransportError(e) => write!(f, "transport error: {e}"),
            CloseReason::WriteFailed(e) => write!(f, "broadcast write failed: {e}"),
            CloseReason::LocalShutdown => f.write_str("local shutdown"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pending_accepted_becomes_open() {
        let state = ConnectionState::Pending.on(LifecycleEvent::Accepted);
        assert_eq!(state, Ok(ConnectionState::Open));
    }

    #[test]
    fn test_pending_rejected_becomes_rejected() {
        let state = ConnectionState::Pending.on(LifecycleEvent::Rejected);
        assert_eq!(state, Ok(ConnectionState::Rejected));
    }

    #[test]
    fn test_open_closed_becomes_closed() {
        let state = ConnectionState::Open.on(LifecycleEvent::Closed);
        assert_eq!(state, Ok(ConnectionState::Closed));
    }

    #[test]
    fn test_terminal_states_reject_every_event() {
        for state in [ConnectionState::Rejected, ConnectionState::Closed] {
            assert!(state.is_terminal());
            for event in [
                LifecycleEvent::Accepted,
                LifecycleEvent::Rejected,
                LifecycleEvent::Closed,
            ] {
                assert_eq!(
                    state.on(event),
                    Err(InvalidTransition { from: state, event })
                );
            }
        }
    }

    #[test]
    fn test_pending_cannot_close_directly() {
        assert!(ConnectionState::Pending.on(LifecycleEvent::Closed).is_err());
    }

    #[test]
    fn test_open_cannot_be_accepted_twice() {
        assert!(ConnectionState::Open.on(LifecycleEvent::Accepted).is_err());
    }

    #[test]
    fn test_connection_ids_are_unique() {
        assert_ne!(ConnectionId::new(), ConnectionId::new());
    }

    #[test]
    fn test_close_reason_display_includes_code() {
        let reason = CloseReason::PeerClosed {
            code: Some(1000),
            description: "bye".to_string(),
        };
        assert_eq!(reason.to_string(), "peer closed (code 1000: bye)");
    }

    #[test]
    fn test_close_reason_display_without_code() {
        let reason = CloseReason::PeerClosed {
            code: None,
            description: "stream ended".to_string(),
        };
        assert_eq!(reason.to_string(), "peer closed (stream ended)");
    }
}
