//! Integration tests for the WebSocket bridge over loopback.
//!
//! # Purpose
//!
//! These tests start the real [`Server`] on `127.0.0.1:0` and drive it with a
//! `tokio-tungstenite` client, the same way a browser would.  They verify:
//!
//! - The happy path: a client offering the right sub-protocol receives one
//!   text frame per tick whenever the pin reads high.
//! - The handshake gate: a disallowed origin or a missing sub-protocol is
//!   refused with an HTTP error and never becomes a connection.
//! - Isolation: closing one client does not disturb another.
//! - Shutdown: clearing the `running` flag closes every connection.
//!
//! The pin is a [`SimulatedInputSource`] shared through an `Arc`, so tests can
//! count how many times it was read.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout, Instant};
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use gpio_ws_bridge::application::{ConnectionLifecycleManager, EchoPolicy, PinReader};
use gpio_ws_bridge::domain::{AllowAllOrigins, AllowListOrigins, OriginPolicy};
use gpio_ws_bridge::infrastructure::gpio::SimulatedInputSource;
use gpio_ws_bridge::infrastructure::Server;

const PERIOD: Duration = Duration::from_millis(100);
const SUBPROTOCOL: &str = "echo-protocol";

type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

// ── Harness ───────────────────────────────────────────────────────────────────

struct Bridge {
    addr: SocketAddr,
    manager: Arc<ConnectionLifecycleManager>,
    pin: Arc<SimulatedInputSource>,
    running: Arc<AtomicBool>,
    task: JoinHandle<anyhow::Result<()>>,
}

async fn start_bridge(levels: Vec<u8>, policy: Arc<dyn OriginPolicy>, echo: EchoPolicy) -> Bridge {
    let pin = Arc::new(SimulatedInputSource::cycling(levels));
    let reader = Arc::new(PinReader::new(Arc::clone(&pin), 1));
    let manager = Arc::new(ConnectionLifecycleManager::new(policy, reader, PERIOD, SUBPROTOCOL));

    let server = Server::bind("127.0.0.1:0".parse().unwrap(), Arc::clone(&manager), echo)
        .await
        .expect("bind loopback");
    let addr = server.local_addr().unwrap();
    let running = Arc::new(AtomicBool::new(true));
    let task = tokio::spawn(server.serve(Arc::clone(&running)));

    Bridge {
        addr,
        manager,
        pin,
        running,
        task,
    }
}

async fn connect(addr: SocketAddr, origin: Option<&str>, protocol: Option<&str>) -> Result<Client, WsError> {
    let mut request = format!("ws://{addr}/").into_client_request()?;
    if let Some(origin) = origin {
        request
            .headers_mut()
            .insert("Origin", HeaderValue::from_str(origin).unwrap());
    }
    if let Some(protocol) = protocol {
        request
            .headers_mut()
            .insert("Sec-WebSocket-Protocol", HeaderValue::from_str(protocol).unwrap());
    }
    connect_async(request).await.map(|(ws, _response)| ws)
}

/// Collects text frames until `window` has elapsed.
async fn collect_texts(ws: &mut Client, window: Duration) -> Vec<String> {
    let deadline = Instant::now() + window;
    let mut texts = Vec::new();
    while let Ok(Some(msg)) = tokio::time::timeout_at(deadline, ws.next()).await {
        match msg {
            Ok(Message::Text(t)) => texts.push(t),
            Ok(_) => {}
            Err(_) => break,
        }
    }
    texts
}

/// Skips data frames and requires the next control message to be a close
/// frame (not a reset or a silent end of stream).
async fn assert_close_frame(ws: &mut Client) {
    let deadline = Instant::now() + Duration::from_secs(2);
    loop {
        match tokio::time::timeout_at(deadline, ws.next()).await {
            Ok(Some(Ok(Message::Text(_)))) => continue,
            Ok(Some(Ok(Message::Close(_)))) => return,
            other => panic!("expected a close frame, got {other:?}"),
        }
    }
}

/// Waits up to one second for the registry to reach `expected` entries.
async fn wait_for_len(manager: &ConnectionLifecycleManager, expected: usize) {
    let deadline = Instant::now() + Duration::from_secs(1);
    while manager.registry().len() != expected && Instant::now() < deadline {
        sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(manager.registry().len(), expected);
}

// ── Happy path ────────────────────────────────────────────────────────────────

/// A pin alternating 1, 0, 1, ... yields exactly "1", "1" within the first
/// three intervals, and nothing further once the client closes.
#[tokio::test]
async fn test_end_to_end_alternating_pin_sends_only_high_levels() {
    // Arrange
    let bridge = start_bridge(vec![1, 0], Arc::new(AllowAllOrigins), EchoPolicy::Disabled).await;

    // Act: connect and listen for four and a half intervals (the fourth tick
    // reads low)
    let mut ws = connect(bridge.addr, Some("http://dash.local"), Some(SUBPROTOCOL))
        .await
        .expect("handshake must succeed");
    let texts = collect_texts(&mut ws, PERIOD * 9 / 2).await;

    // Assert
    assert_eq!(texts, vec!["1", "1"]);
    assert_eq!(bridge.manager.registry().len(), 1);

    // Act: close and let the server tear the connection down
    ws.close(None).await.unwrap();
    wait_for_len(&bridge.manager, 0).await;
    let reads_after_close = bridge.pin.reads();
    sleep(PERIOD * 3).await;

    // Assert: the scheduler is gone, the pin is no longer sampled
    assert_eq!(bridge.pin.reads(), reads_after_close);
    assert_eq!(bridge.manager.registry().active_schedulers(), 0);
}

#[tokio::test]
async fn test_handshake_echoes_subprotocol() {
    let bridge = start_bridge(vec![0], Arc::new(AllowAllOrigins), EchoPolicy::Disabled).await;
    let request = {
        let mut r = format!("ws://{}/", bridge.addr).into_client_request().unwrap();
        r.headers_mut()
            .insert("Sec-WebSocket-Protocol", HeaderValue::from_static(SUBPROTOCOL));
        r
    };

    let (_ws, response) = connect_async(request).await.expect("handshake");

    assert_eq!(
        response.headers().get("Sec-WebSocket-Protocol").unwrap(),
        SUBPROTOCOL
    );
}

// ── Handshake gate ────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_disallowed_origin_is_refused_without_connection() {
    // Arrange
    let policy = Arc::new(AllowListOrigins::new(["http://trusted.local"]));
    let bridge = start_bridge(vec![1], policy, EchoPolicy::Disabled).await;

    // Act
    let result = connect(bridge.addr, Some("http://evil.example"), Some(SUBPROTOCOL)).await;
    sleep(PERIOD * 2).await;

    // Assert
    match result {
        Err(WsError::Http(response)) => assert_eq!(response.status().as_u16(), 403),
        other => panic!("expected HTTP 403, got {:?}", other.err()),
    }
    assert!(bridge.manager.registry().is_empty());
    assert_eq!(bridge.pin.reads(), 0, "a refused request must not start a scheduler");
}

#[tokio::test]
async fn test_allowed_origin_is_accepted() {
    let policy = Arc::new(AllowListOrigins::new(["http://trusted.local"]));
    let bridge = start_bridge(vec![1], policy, EchoPolicy::Disabled).await;

    let ws = connect(bridge.addr, Some("http://trusted.local"), Some(SUBPROTOCOL)).await;

    assert!(ws.is_ok());
    wait_for_len(&bridge.manager, 1).await;
}

#[tokio::test]
async fn test_missing_subprotocol_is_refused() {
    let bridge = start_bridge(vec![1], Arc::new(AllowAllOrigins), EchoPolicy::Disabled).await;

    let result = connect(bridge.addr, None, None).await;

    match result {
        Err(WsError::Http(response)) => assert_eq!(response.status().as_u16(), 400),
        other => panic!("expected HTTP 400, got {:?}", other.err()),
    }
    assert!(bridge.manager.registry().is_empty());
}

#[tokio::test]
async fn test_plain_http_request_never_becomes_a_connection() {
    use tokio::io::AsyncWriteExt;

    // Arrange
    let bridge = start_bridge(vec![1], Arc::new(AllowAllOrigins), EchoPolicy::Disabled).await;
    let mut stream = TcpStream::connect(bridge.addr).await.unwrap();

    // Act
    stream
        .write_all(b"GET / HTTP/1.1\r\nHost: localhost\r\n\r\n")
        .await
        .unwrap();
    sleep(PERIOD * 2).await;

    // Assert
    assert!(bridge.manager.registry().is_empty());
    assert_eq!(bridge.pin.reads(), 0);
}

// ── Echo ──────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_echo_enabled_returns_frames_verbatim() {
    // Arrange: a low pin so only echoes are sent
    let bridge = start_bridge(vec![0], Arc::new(AllowAllOrigins), EchoPolicy::Verbatim).await;
    let mut ws = connect(bridge.addr, None, Some(SUBPROTOCOL)).await.unwrap();

    // Act
    ws.send(Message::Text("hello".to_string())).await.unwrap();
    ws.send(Message::Binary(vec![1, 2, 3])).await.unwrap();

    // Assert
    let first = timeout(Duration::from_secs(1), ws.next()).await.unwrap().unwrap().unwrap();
    let second = timeout(Duration::from_secs(1), ws.next()).await.unwrap().unwrap().unwrap();
    assert_eq!(first, Message::Text("hello".to_string()));
    assert_eq!(second, Message::Binary(vec![1, 2, 3]));
}

#[tokio::test]
async fn test_echo_disabled_ignores_inbound_frames() {
    let bridge = start_bridge(vec![0], Arc::new(AllowAllOrigins), EchoPolicy::Disabled).await;
    let mut ws = connect(bridge.addr, None, Some(SUBPROTOCOL)).await.unwrap();

    ws.send(Message::Text("hello".to_string())).await.unwrap();
    let texts = collect_texts(&mut ws, PERIOD * 3).await;

    assert!(texts.is_empty());
    assert_eq!(bridge.manager.registry().len(), 1);
}

// ── Isolation and shutdown ────────────────────────────────────────────────────

#[tokio::test]
async fn test_closing_one_client_does_not_affect_another() {
    // Arrange
    let bridge = start_bridge(vec![1], Arc::new(AllowAllOrigins), EchoPolicy::Disabled).await;
    let mut a = connect(bridge.addr, None, Some(SUBPROTOCOL)).await.unwrap();
    let mut b = connect(bridge.addr, None, Some(SUBPROTOCOL)).await.unwrap();
    wait_for_len(&bridge.manager, 2).await;

    // Act
    a.close(None).await.unwrap();
    wait_for_len(&bridge.manager, 1).await;
    let texts = collect_texts(&mut b, PERIOD * 3 + PERIOD / 2).await;

    // Assert
    assert!(texts.len() >= 2, "B must keep receiving, got {texts:?}");
    assert!(texts.iter().all(|t| t == "1"));
}

#[tokio::test]
async fn test_shutdown_flag_closes_all_connections() {
    // Arrange
    let bridge = start_bridge(vec![1], Arc::new(AllowAllOrigins), EchoPolicy::Disabled).await;
    let mut ws = connect(bridge.addr, None, Some(SUBPROTOCOL)).await.unwrap();
    wait_for_len(&bridge.manager, 1).await;

    // Act
    bridge.running.store(false, Ordering::Relaxed);
    let served = timeout(Duration::from_secs(2), bridge.task)
        .await
        .expect("accept loop must notice the flag");

    // Assert: the server returned cleanly and the client got a close frame
    assert!(served.unwrap().is_ok());
    assert!(bridge.manager.registry().is_empty());
    assert_close_frame(&mut ws).await;
}

/// Mirrors the binary: `serve` runs on its own current-thread runtime, which is
/// dropped as soon as `serve` returns.  Clients must still receive a close
/// frame, so every session has to finish before `serve` returns.
#[tokio::test]
async fn test_shutdown_closes_cleanly_before_runtime_is_dropped() {
    // Arrange: the server lives on a separate thread and runtime
    let pin = Arc::new(SimulatedInputSource::constant(0));
    let reader = Arc::new(PinReader::new(Arc::clone(&pin), 1));
    let manager = Arc::new(ConnectionLifecycleManager::new(
        Arc::new(AllowAllOrigins),
        reader,
        PERIOD,
        SUBPROTOCOL,
    ));
    let running = Arc::new(AtomicBool::new(true));
    let (addr_tx, addr_rx) = tokio::sync::oneshot::channel();

    let server_thread = std::thread::spawn({
        let manager = Arc::clone(&manager);
        let running = Arc::clone(&running);
        move || {
            let runtime = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .unwrap();
            runtime.block_on(async move {
                let server = Server::bind("127.0.0.1:0".parse().unwrap(), manager, EchoPolicy::Disabled)
                    .await
                    .unwrap();
                addr_tx.send(server.local_addr().unwrap()).unwrap();
                server.serve(running).await
            })
            // `runtime` is dropped here, cancelling anything still pending.
        }
    });
    let addr = addr_rx.await.unwrap();
    let mut ws = connect(addr, None, Some(SUBPROTOCOL)).await.unwrap();
    wait_for_len(&manager, 1).await;

    // Act
    running.store(false, Ordering::Relaxed);
    let served = tokio::task::spawn_blocking(move || server_thread.join())
        .await
        .unwrap()
        .expect("server thread must not panic");

    // Assert
    assert!(served.is_ok());
    assert_close_frame(&mut ws).await;
}
