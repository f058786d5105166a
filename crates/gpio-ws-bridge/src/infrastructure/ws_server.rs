//! WebSocket server: accept loop, origin-gated handshake and per-connection
//! sessions.
//!
//! This module is responsible for:
//!
//! 1. Binding a TCP listener on the configured address.
//! 2. Accepting incoming TCP connections.
//! 3. Running the HTTP upgrade handshake, consulting the
//!    [`ConnectionLifecycleManager`] before answering so that rejected origins
//!    never become connections.
//! 4. Opening the connection (registry entry + broadcast scheduler) once the
//!    handshake succeeds.
//! 5. Reading inbound frames until the peer leaves or the scheduler stops,
//!    then closing the connection.
//! 6. Stopping every connection when the `running` flag is cleared.
//!
//! # Scheduling
//!
//! Each session runs in its own Tokio task, but the binary uses the
//! current-thread runtime: sessions, handshakes and ticks are interleaved on
//! one thread and never run in parallel.  Nothing in a turn blocks; the only
//! suspension points are socket I/O and timers.

use std::net::SocketAddr;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::time::Duration;

use anyhow::Context;
use futures_util::{Stream, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinSet;
use tokio::time::timeout;
use tokio_tungstenite::{
    accept_hdr_async,
    tungstenite::{
        error::ProtocolError,
        handshake::server::{ErrorResponse, Request, Response},
        http::{
            header::{ORIGIN, SEC_WEBSOCKET_PROTOCOL},
            HeaderValue, StatusCode,
        },
        Error as WsError, Message as WsMessage,
    },
};
use tracing::{debug, error, info, warn};

use crate::application::echo::EchoPolicy;
use crate::application::lifecycle::{
    ConnectionLifecycleManager, HandshakeDecision, HandshakeRequest, OpenConnection,
};
use crate::application::pin_reader::PinReader;
use crate::application::scheduler::{OutboundChannel, SchedulerExitReason};
use crate::domain::config::BridgeConfig;
use crate::domain::connection::{CloseReason, ConnectionId, ConnectionState, LifecycleEvent};
use crate::domain::messages::ChannelFrame;
use crate::infrastructure::ws_channel::WsOutbound;

/// How often the accept loop re-checks the `running` flag.
const ACCEPT_POLL: Duration = Duration::from_millis(200);

/// How long shutdown waits for sessions to send their close frames.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

/// Lower bound on the per-frame write deadline.
const MIN_WRITE_TIMEOUT: Duration = Duration::from_secs(1);

// ── Public API ────────────────────────────────────────────────────────────────

/// Runs the server until `running` is set to `false`.
///
/// # Errors
///
/// Returns an error if the TCP listener cannot be bound (e.g., the port is
/// already in use or the process lacks permission to bind).
pub async fn run_server(
    config: &BridgeConfig,
    reader: Arc<PinReader>,
    running: Arc<AtomicBool>,
) -> anyhow::Result<()> {
    let manager = Arc::new(ConnectionLifecycleManager::from_config(config, reader));
    let echo = EchoPolicy::from_enabled(config.echo_inbound);
    let server = Server::bind(config.ws_bind_addr, manager, echo).await?;
    server.serve(running).await
}

/// A bound listener plus everything a session needs.
pub struct Server {
    listener: TcpListener,
    manager: Arc<ConnectionLifecycleManager>,
    echo: EchoPolicy,
    /// Session tasks, drained at shutdown so each one can close its socket.
    sessions: JoinSet<()>,
}

impl Server {
    /// Binds the listener.
    ///
    /// # Errors
    ///
    /// Returns an error if `addr` cannot be bound.
    pub async fn bind(
        addr: SocketAddr,
        manager: Arc<ConnectionLifecycleManager>,
        echo: EchoPolicy,
    ) -> anyhow::Result<Self> {
        let listener = TcpListener::bind(addr)
            .await
            .with_context(|| format!("failed to bind WebSocket listener on {addr}"))?;
        Ok(Self {
            listener,
            manager,
            echo,
            sessions: JoinSet::new(),
        })
    }

    /// The address actually bound (useful when binding port 0).
    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Accepts connections until `running` is cleared, then closes every open
    /// connection.
    ///
    /// Accept errors are logged and never end the loop.  Returns once every
    /// session has finished closing or a short grace period has elapsed.
    pub async fn serve(mut self, running: Arc<AtomicBool>) -> anyhow::Result<()> {
        let local = self.local_addr().context("listener has no local address")?;
        info!("server is listening on {local}");

        loop {
            if !running.load(Ordering::Relaxed) {
                info!("shutdown flag set; stopping accept loop");
                break;
            }

            // Short timeout so the `running` flag is re-checked even when no
            // client is connecting.
            match timeout(ACCEPT_POLL, self.listener.accept()).await {
                Ok(Ok((stream, peer_addr))) => {
                    debug!("TCP connection from {peer_addr}");
                    let manager = Arc::clone(&self.manager);
                    let echo = self.echo;
                    self.sessions.spawn(async move {
                        handle_connection(stream, peer_addr, manager, echo).await;
                    });
                }
                Ok(Err(e)) => {
                    // Transient accept error (e.g., too many open file descriptors).
                    error!("accept error: {e}");
                }
                Err(_) => {}
            }

            // Reap finished sessions so the set does not grow without bound.
            while self.sessions.try_join_next().is_some() {}
        }

        let closed = self.manager.shutdown();
        info!("closing {closed} connection(s)");

        let sessions = &mut self.sessions;
        let drained = timeout(SHUTDOWN_GRACE, async {
            while sessions.join_next().await.is_some() {}
        })
        .await;
        if drained.is_err() {
            warn!(
                "{} session(s) still closing after {SHUTDOWN_GRACE:?}; aborting",
                self.sessions.len()
            );
            self.sessions.shutdown().await;
        }

        info!("server stopped");
        Ok(())
    }
}

// ── Per-connection handler ────────────────────────────────────────────────────

async fn handle_connection(
    raw_stream: TcpStream,
    peer_addr: SocketAddr,
    manager: Arc<ConnectionLifecycleManager>,
    echo: EchoPolicy,
) {
    match run_session(raw_stream, peer_addr, manager, echo).await {
        Ok(state) => debug!("session {peer_addr} finished in state {state:?}"),
        Err(e) => warn!("session {peer_addr} ended with error: {e:#}"),
    }
}

/// Runs one request from handshake to close and returns its terminal state.
async fn run_session(
    raw_stream: TcpStream,
    peer_addr: SocketAddr,
    manager: Arc<ConnectionLifecycleManager>,
    echo: EchoPolicy,
) -> anyhow::Result<ConnectionState> {
    let mut state = ConnectionState::Pending;

    // ── Handshake ─────────────────────────────────────────────────────────────
    //
    // The callback runs after tungstenite has validated the upgrade headers
    // and before the response is written, so a rejection is answered with a
    // plain HTTP error and no WebSocket is ever created.
    let mut decision: Option<HandshakeDecision> = None;
    let mut origin: Option<String> = None;
    let callback = |request: &Request, response: Response| -> Result<Response, ErrorResponse> {
        let handshake = handshake_request(request);
        info!(
            "received request for {} from {peer_addr} (origin: {})",
            handshake.uri,
            handshake.origin.as_deref().unwrap_or("<none>")
        );
        let verdict = manager.evaluate(&handshake);
        let result = respond(&verdict, response);
        origin = handshake.origin;
        decision = Some(verdict);
        result
    };

    let accepted = accept_hdr_async(raw_stream, callback).await;
    let ws_stream = match accepted {
        Ok(ws) => ws,
        Err(e) => {
            if let Some(HandshakeDecision::Reject(reason)) = &decision {
                state = state.on(LifecycleEvent::Rejected)?;
                debug!("request from {peer_addr} refused: {reason}");
                return Ok(state);
            }
            if is_non_upgrade(&e) {
                // The callback never ran, so the request was never logged.
                info!("received non-upgrade request from {peer_addr}; refused: {e}");
                return Ok(state.on(LifecycleEvent::Rejected)?);
            }
            return Err(e).with_context(|| format!("WebSocket handshake failed with {peer_addr}"));
        }
    };

    // ── Open ──────────────────────────────────────────────────────────────────
    let (ws_tx, mut ws_rx) = ws_stream.split();
    let write_timeout = manager.poll_interval().max(MIN_WRITE_TIMEOUT);
    let outbound = Arc::new(WsOutbound::new(ws_tx, write_timeout));
    let OpenConnection { id, exit } = manager.open(peer_addr, origin, outbound.clone())?;
    state = state.on(LifecycleEvent::Accepted)?;

    // ── Active ────────────────────────────────────────────────────────────────
    //
    // The session ends when the peer goes away or the scheduler stops on its
    // own (write failure, or shutdown stopped it).
    let reason = tokio::select! {
        reason = read_inbound(&mut ws_rx, outbound.as_ref(), echo, id) => reason,
        exit = exit.wait() => match exit {
            SchedulerExitReason::WriteFailed(e) => CloseReason::WriteFailed(e.to_string()),
            SchedulerExitReason::Stopped => CloseReason::LocalShutdown,
        },
    };

    // ── Closed ────────────────────────────────────────────────────────────────
    manager.close(id, &reason);
    state = state.on(LifecycleEvent::Closed)?;
    outbound.close().await;
    Ok(state)
}

/// Returns `true` when a handshake failed because the request was plain HTTP
/// rather than a WebSocket upgrade.
fn is_non_upgrade(error: &WsError) -> bool {
    matches!(
        error,
        WsError::Protocol(
            ProtocolError::WrongHttpMethod
                | ProtocolError::WrongHttpVersion
                | ProtocolError::MissingConnectionUpgradeHeader
                | ProtocolError::MissingUpgradeWebSocketHeader
                | ProtocolError::MissingSecWebSocketVersionHeader
                | ProtocolError::MissingSecWebSocketKey
        )
    )
}

/// Extracts what the lifecycle needs from the raw upgrade request.
fn handshake_request(request: &Request) -> HandshakeRequest {
    let offered_subprotocols = request
        .headers()
        .get_all(SEC_WEBSOCKET_PROTOCOL)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| HandshakeRequest::parse_subprotocols(Some(v)))
        .collect();

    HandshakeRequest {
        uri: request.uri().to_string(),
        origin: request
            .headers()
            .get(ORIGIN)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string),
        offered_subprotocols,
    }
}

/// Turns a decision into the handshake response.
fn respond(decision: &HandshakeDecision, mut response: Response) -> Result<Response, ErrorResponse> {
    match decision {
        HandshakeDecision::Accept { subprotocol } => match HeaderValue::from_str(subprotocol) {
            Ok(value) => {
                response.headers_mut().insert(SEC_WEBSOCKET_PROTOCOL, value);
                Ok(response)
            }
            Err(_) => Err(error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                "invalid sub-protocol configured",
            )),
        },
        HandshakeDecision::Reject(reason) => Err(error_response(
            StatusCode::from_u16(reason.http_status()).unwrap_or(StatusCode::FORBIDDEN),
            &reason.to_string(),
        )),
    }
}

fn error_response(status: StatusCode, message: &str) -> ErrorResponse {
    let mut response = ErrorResponse::new(Some(message.to_string()));
    *response.status_mut() = status;
    response
}

/// Reads inbound frames until the connection ends and returns why it ended.
///
/// Data frames are passed to the echo policy; with echo disabled they are
/// dropped.  Ping replies are queued by tungstenite itself.
async fn read_inbound<S>(
    ws_rx: &mut S,
    outbound: &dyn OutboundChannel,
    echo: EchoPolicy,
    id: ConnectionId,
) -> CloseReason
where
    S: Stream<Item = Result<WsMessage, WsError>> + Unpin,
{
    loop {
        let frame = match ws_rx.next().await {
            Some(Ok(WsMessage::Text(text))) => {
                debug!("connection {id}: inbound text frame ({} bytes)", text.len());
                ChannelFrame::Text(text)
            }
            Some(Ok(WsMessage::Binary(data))) => {
                debug!("connection {id}: inbound binary frame ({} bytes)", data.len());
                ChannelFrame::Binary(data)
            }
            Some(Ok(WsMessage::Close(frame))) => {
                return match frame {
                    Some(frame) => CloseReason::PeerClosed {
                        code: Some(u16::from(frame.code)),
                        description: frame.reason.into_owned(),
                    },
                    None => CloseReason::PeerClosed {
                        code: None,
                        description: "close frame without status".to_string(),
                    },
                };
            }
            Some(Ok(WsMessage::Ping(_) | WsMessage::Pong(_) | WsMessage::Frame(_))) => continue,
            Some(Err(WsError::ConnectionClosed | WsError::Protocol(_))) => {
                return CloseReason::PeerClosed {
                    code: None,
                    description: "connection closed".to_string(),
                };
            }
            Some(Err(e)) => return CloseReason::TransportError(e.to_string()),
            None => {
                return CloseReason::PeerClosed {
                    code: None,
                    description: "stream ended".to_string(),
                };
            }
        };

        if let Some(reply) = echo.reply(frame) {
            if let Err(e) = outbound.send(reply).await {
                return CloseReason::WriteFailed(e.to_string());
            }
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
