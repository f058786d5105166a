//! ConnectionLifecycleManager: accept → handshake → register → broadcast →
//! close → deregister.
//!
//! The manager owns the pieces every session needs (origin policy, registry,
//! scheduler factory) and exposes the lifecycle as three calls:
//!
//! 1. [`evaluate`](ConnectionLifecycleManager::evaluate) runs while the
//!    upgrade request is still pending and decides accept or reject.
//! 2. [`open`](ConnectionLifecycleManager::open) runs after the handshake has
//!    completed: it creates the connection, starts its scheduler and registers
//!    both.
//! 3. [`close`](ConnectionLifecycleManager::close) stops the scheduler and
//!    deregisters.  It is safe to call more than once.
//!
//! Nothing here touches sockets; the infrastructure layer maps real requests
//! and streams onto these calls.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use thiserror::Error;
use tracing::{info, warn};

use crate::application::pin_reader::PinReader;
use crate::application::registry::{ConnectionInfo, ConnectionRegistry, RegistryEntry, RegistryError};
use crate::application::scheduler::{BroadcastScheduler, OutboundChannel, SchedulerExit};
use crate::domain::config::BridgeConfig;
use crate::domain::connection::{CloseReason, ConnectionId};
use crate::domain::origin::{AllowAllOrigins, AllowListOrigins, OriginPolicy};

/// The parts of an upgrade request the lifecycle cares about.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct HandshakeRequest {
    /// Request target, e.g. `/` or `/pin`.
    pub uri: String,
    /// Value of the `Origin` header, if present.
    pub origin: Option<String>,
    /// Sub-protocols offered in `Sec-WebSocket-Protocol`, in client order.
    pub offered_subprotocols: Vec<String>,
}

impl HandshakeRequest {
    /// Splits a `Sec-WebSocket-Protocol` header value into its entries.
    pub fn parse_subprotocols(header: Option<&str>) -> Vec<String> {
        header
            .map(|value| {
                value
                    .split(',')
                    .map(str::trim)
                    .filter(|p| !p.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default()
    }
}

/// Why a request was refused.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RejectReason {
    #[error("origin {} is not allowed", .origin.as_deref().unwrap_or("<none>"))]
    OriginNotAllowed { origin: Option<String> },
    #[error("client did not offer sub-protocol {expected:?}")]
    SubprotocolNotOffered { expected: String },
}

impl RejectReason {
    /// HTTP status used to refuse the upgrade.
    pub fn http_status(&self) -> u16 {
        match self {
            RejectReason::OriginNotAllowed { .. } => 403,
            RejectReason::SubprotocolNotOffered { .. } => 400,
        }
    }
}

/// Outcome of [`ConnectionLifecycleManager::evaluate`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandshakeDecision {
    /// Complete the handshake, echoing `subprotocol` back to the client.
    Accept { subprotocol: String },
    /// Refuse the request; no connection is created.
    Reject(RejectReason),
}

/// A connection that has just entered the `Open` state.
#[derive(Debug)]
pub struct OpenConnection {
    pub id: ConnectionId,
    /// Resolves when the connection's scheduler ends.
    pub exit: SchedulerExit,
}

/// Drives every connection through its lifecycle.
pub struct ConnectionLifecycleManager {
    policy: Arc<dyn OriginPolicy>,
    registry: Arc<ConnectionRegistry>,
    scheduler: BroadcastScheduler,
    subprotocol: String,
}

impl ConnectionLifecycleManager {
    pub fn new(
        policy: Arc<dyn OriginPolicy>,
        reader: Arc<PinReader>,
        poll_interval: Duration,
        subprotocol: impl Into<String>,
    ) -> Self {
        Self {
            policy,
            registry: Arc::new(ConnectionRegistry::new()),
            scheduler: BroadcastScheduler::new(reader, poll_interval),
            subprotocol: subprotocol.into(),
        }
    }

    /// Builds a manager from the runtime configuration.  An empty origin list
    /// selects [`AllowAllOrigins`].
    pub fn from_config(config: &BridgeConfig, reader: Arc<PinReader>) -> Self {
        let policy: Arc<dyn OriginPolicy> = if config.allowed_origins.is_empty() {
            warn!("origin checking disabled: accepting connections from any origin");
            Arc::new(AllowAllOrigins)
        } else {
            Arc::new(AllowListOrigins::new(config.allowed_origins.iter().cloned()))
        };
        Self::new(policy, reader, config.poll_interval, config.subprotocol.clone())
    }

    pub fn registry(&self) -> &Arc<ConnectionRegistry> {
        &self.registry
    }

    pub fn subprotocol(&self) -> &str {
        &self.subprotocol
    }

    /// Period of every connection's broadcast tick.
    pub fn poll_interval(&self) -> Duration {
        self.scheduler.period()
    }

    /// Decides whether a pending request may be upgraded.
    ///
    /// The origin is checked first; a rejected origin is logged.
    pub fn evaluate(&self, request: &HandshakeRequest) -> HandshakeDecision {
        if !self.policy.is_allowed(request.origin.as_deref()) {
            warn!(
                "connection from origin {} rejected",
                request.origin.as_deref().unwrap_or("<none>")
            );
            return HandshakeDecision::Reject(RejectReason::OriginNotAllowed {
                origin: request.origin.clone(),
            });
        }

        if !request
            .offered_subprotocols
            .iter()
            .any(|p| *p == self.subprotocol)
        {
            warn!(
                "request for {} rejected: sub-protocol {:?} not offered (offered: {:?})",
                request.uri, self.subprotocol, request.offered_subprotocols
            );
            return HandshakeDecision::Reject(RejectReason::SubprotocolNotOffered {
                expected: self.subprotocol.clone(),
            });
        }

        HandshakeDecision::Accept {
            subprotocol: self.subprotocol.clone(),
        }
    }

    /// Creates, registers and starts broadcasting to a new connection.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::Duplicate`] if the generated ID collides with
    /// a registered one; the new scheduler is stopped in that case.
    pub fn open(
        &self,
        peer_addr: SocketAddr,
        origin: Option<String>,
        channel: Arc<dyn OutboundChannel>,
    ) -> Result<OpenConnection, RegistryError> {
        let id = ConnectionId::new();
        let (handle, exit) = self.scheduler.start(id, channel);
        let info = ConnectionInfo {
            id,
            peer_addr,
            origin,
            opened_at: Instant::now(),
        };
        self.registry.add(RegistryEntry::new(info, handle))?;
        info!("connection {id} accepted from {peer_addr}");
        Ok(OpenConnection { id, exit })
    }

    /// Stops the connection's scheduler and deregisters it.
    ///
    /// Returns the connection's info if this call closed it, `None` if it was
    /// already closed.
    pub fn close(&self, id: ConnectionId, reason: &CloseReason) -> Option<ConnectionInfo> {
        let info = self.registry.remove(id)?;
        info!(
            "peer {} disconnected after {:.1}s: {reason}",
            info.peer_addr,
            info.opened_at.elapsed().as_secs_f32()
        );
        Some(info)
    }

    /// Closes every open connection.  Returns how many were closed.
    pub fn shutdown(&self) -> usize {
        let closed = self.registry.stop_all();
        for info in &closed {
            info!(
                "peer {} disconnected: {}",
                info.peer_addr,
                CloseReason::LocalShutdown
            );
        }
        closed.len()
    }
}
