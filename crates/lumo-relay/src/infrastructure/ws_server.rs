//! WebSocket server: accept loop and per-connection task management.
//!
//! This module is responsible for:
//!
//! 1. Binding a TCP listener on the configured address.
//! 2. Upgrading each accepted connection to a WebSocket, capturing the
//!    request path during the handshake.
//! 3. Rejecting connections whose path is not `/session/{id}` with close
//!    code 4000.
//! 4. Running, per connection:
//!    - a **reader** that feeds inbound text frames to the connection's
//!      [`ConnectionRouter`] and hands the resulting deliveries to the
//!      recipients' outbound queues,
//!    - a **writer** task draining the connection's own outbound queue into
//!      the socket,
//!    - a **heartbeat** task that pings every `heartbeat_interval` and
//!      terminates a connection that missed the previous pong.
//! 5. Running one **idle sweep** task for the whole relay.
//! 6. Stopping the accept loop when the `running` flag is cleared.
//!
//! # Concurrency
//!
//! The registry sits behind a single `tokio::sync::Mutex`.  Every join,
//! route, leave, and sweep takes that lock, so membership changes are
//! serialised.  The lock is never held across socket I/O: the router only
//! produces [`Delivery`] values, and delivering one is a non-blocking
//! `try_send` into a bounded queue.

use std::net::SocketAddr;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::time::{Duration, Instant};

use anyhow::Context;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use lumo_core::protocol::codec::parse_session_path;
use lumo_core::protocol::messages::RelayCloseCode;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, Mutex};
use tokio::time::{interval, timeout};
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::{Error as WsError, Message as WsMessage};
use tokio_tungstenite::{accept_hdr_async, WebSocketStream};
use tracing::{debug, error, info, warn};

use crate::application::{ConnectionRouter, Delivery, LinkState, PeerLink, SessionRegistry};
use crate::domain::config::RelayConfig;
use crate::infrastructure::connection::{ConnectionHandle, Outbound};

/// The registry as shared between connection tasks and the sweep.
pub type SharedRegistry = Arc<Mutex<SessionRegistry<ConnectionHandle>>>;

type WsSink = SplitSink<WebSocketStream<TcpStream>, WsMessage>;
type WsSource = SplitStream<WebSocketStream<TcpStream>>;

/// How long a closing connection's writer gets to flush its queue.
const WRITER_DRAIN_TIMEOUT: Duration = Duration::from_secs(1);

// ── Public API ────────────────────────────────────────────────────────────────

/// A bound, not-yet-running relay.
///
/// Binding and running are separate so callers (tests in particular) can bind
/// to port `0` and learn the real address before any client connects.
pub struct RelayServer {
    listener: TcpListener,
    config: Arc<RelayConfig>,
    registry: SharedRegistry,
}

impl RelayServer {
    /// Binds the TCP listener on `config.bind_addr`.
    ///
    /// # Errors
    ///
    /// Returns an error if the address is in use or cannot be bound.
    pub async fn bind(config: RelayConfig) -> anyhow::Result<Self> {
        let listener = TcpListener::bind(config.bind_addr)
            .await
            .with_context(|| format!("failed to bind relay listener on {}", config.bind_addr))?;
        Ok(Self {
            listener,
            config: Arc::new(config),
            registry: Arc::new(Mutex::new(SessionRegistry::new())),
        })
    }

    /// The address actually bound.
    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// A handle to the session registry, for introspection.
    pub fn registry(&self) -> SharedRegistry {
        Arc::clone(&self.registry)
    }

    /// Runs the accept loop until `running` is set to `false`.
    ///
    /// Connections already accepted keep running after the loop exits; they
    /// end when their peers disconnect or the runtime shuts down.
    pub async fn run(self, running: Arc<AtomicBool>) -> anyhow::Result<()> {
        let local = self.listener.local_addr()?;
        info!("relay listening on {local}");

        let sweeper = tokio::spawn(sweep_idle_sessions(
            Arc::clone(&self.registry),
            self.config.sweep_interval,
            self.config.session_max_idle,
        ));

        loop {
            if !running.load(Ordering::Relaxed) {
                info!("shutdown flag set; stopping accept loop");
                break;
            }

            // Short timeout so the shutdown flag is re-checked regularly.
            match timeout(Duration::from_millis(200), self.listener.accept()).await {
                Ok(Ok((stream, peer_addr))) => {
                    debug!("new connection from {peer_addr}");
                    let cfg = Arc::clone(&self.config);
                    let registry = Arc::clone(&self.registry);
                    tokio::spawn(async move {
                        handle_connection(stream, peer_addr, cfg, registry).await;
                    });
                }
                Ok(Err(e)) => {
                    error!("accept error: {e}");
                }
                Err(_) => {}
            }
        }

        sweeper.abort();
        Ok(())
    }
}

/// Binds and runs a relay until `running` is cleared.
///
/// # Errors
///
/// Returns an error if the listener cannot be bound.
pub async fn run_server(config: RelayConfig, running: Arc<AtomicBool>) -> anyhow::Result<()> {
    RelayServer::bind(config).await?.run(running).await
}

// ── Per-connection handler ────────────────────────────────────────────────────

/// Wraps [`run_connection`] and logs the outcome.
async fn handle_connection(
    raw_stream: TcpStream,
    peer_addr: SocketAddr,
    config: Arc<RelayConfig>,
    registry: SharedRegistry,
) {
    match run_connection(raw_stream, peer_addr, config, registry).await {
        Ok(()) => debug!("connection {peer_addr} closed"),
        Err(e) => warn!("connection {peer_addr} closed with error: {e:#}"),
    }
}

/// Runs the complete lifecycle of one WebSocket connection.
///
/// # Errors
///
/// Returns an error if the WebSocket handshake fails.  Everything after the
/// handshake ends the connection quietly.
async fn run_connection(
    raw_stream: TcpStream,
    peer_addr: SocketAddr,
    config: Arc<RelayConfig>,
    registry: SharedRegistry,
) -> anyhow::Result<()> {
    // ── Handshake ─────────────────────────────────────────────────────────────
    let mut request_path: Option<String> = None;
    let mut ws_stream = accept_hdr_async(
        raw_stream,
        |req: &Request, resp: Response| -> Result<Response, ErrorResponse> {
            request_path = Some(req.uri().path().to_string());
            Ok(resp)
        },
    )
    .await
    .with_context(|| format!("WebSocket handshake failed with {peer_addr}"))?;

    let Some(session_id) = request_path.as_deref().and_then(parse_session_path) else {
        info!(
            "rejecting {peer_addr}: bad path {:?}",
            request_path.as_deref().unwrap_or_default()
        );
        let _ = ws_stream.close(Some(close_frame(RelayCloseCode::BadPath))).await;
        return Ok(());
    };

    let label = format!("{peer_addr} [{session_id}]");
    debug!("{label}: WebSocket established");

    // ── Tasks ─────────────────────────────────────────────────────────────────
    let (ws_tx, mut ws_rx) = ws_stream.split();
    let (link, outbound_rx) = ConnectionHandle::new(config.outbound_queue);
    let mut router = ConnectionRouter::new(session_id, link.clone());
    let alive = Arc::new(AtomicBool::new(true));

    let mut writer = tokio::spawn(write_outbound(ws_tx, outbound_rx, label.clone()));
    let mut heartbeat = tokio::spawn(heartbeat(
        link.clone(),
        Arc::clone(&alive),
        config.heartbeat_interval,
        label.clone(),
    ));

    tokio::select! {
        _ = read_inbound(&mut ws_rx, &mut router, &registry, &alive, &label) => {
            debug!("{label}: reader ended");
        }
        _ = &mut writer => {
            debug!("{label}: writer ended");
        }
        _ = &mut heartbeat => {
            debug!("{label}: heartbeat ended");
        }
        _ = link.terminated() => {
            debug!("{label}: terminated");
        }
    }

    // ── Cleanup ───────────────────────────────────────────────────────────────
    heartbeat.abort();
    let deliveries = {
        let mut reg = registry.lock().await;
        router.handle_close(&mut reg)
    };
    dispatch(deliveries);

    // Dropping the last senders lets the writer flush and finish.
    link.mark_closed();
    drop(router);
    drop(link);
    if timeout(WRITER_DRAIN_TIMEOUT, &mut writer).await.is_err() {
        writer.abort();
    }
    Ok(())
}

/// Reads frames until the peer goes away.
async fn read_inbound(
    ws_rx: &mut WsSource,
    router: &mut ConnectionRouter<ConnectionHandle>,
    registry: &SharedRegistry,
    alive: &AtomicBool,
    label: &str,
) {
    loop {
        let ws_msg = match ws_rx.next().await {
            Some(Ok(msg)) => msg,
            Some(Err(WsError::ConnectionClosed | WsError::Protocol(_))) => {
                debug!("{label}: WebSocket closed");
                break;
            }
            Some(Err(e)) => {
                warn!("{label}: WebSocket error: {e}");
                break;
            }
            None => {
                debug!("{label}: stream ended");
                break;
            }
        };

        match ws_msg {
            WsMessage::Text(text) => {
                let deliveries = {
                    let mut reg = registry.lock().await;
                    router.handle_text(&text, &mut reg, Instant::now())
                };
                dispatch(deliveries);
                if router.state() == LinkState::Closed {
                    // Keep reading so the close handshake can complete; the
                    // writer ends the connection once the close frame is out.
                    continue;
                }
            }
            WsMessage::Pong(_) => {
                alive.store(true, Ordering::Relaxed);
            }
            WsMessage::Ping(_) => {
                // tungstenite queues the pong reply itself.
            }
            WsMessage::Binary(_) => {
                debug!("{label}: binary frame ignored");
            }
            WsMessage::Close(_) => {
                debug!("{label}: close frame received");
                break;
            }
            WsMessage::Frame(_) => {}
        }
    }
}

/// Drains the outbound queue into the socket.
///
/// Ends after sending a close frame, on a write error, or when every sender
/// has been dropped (in which case a normal close is sent).
async fn write_outbound(mut ws_tx: WsSink, mut outbound_rx: mpsc::Receiver<Outbound>, label: String) {
    while let Some(frame) = outbound_rx.recv().await {
        let (msg, last) = match frame {
            Outbound::Text(text) => (WsMessage::Text(text), false),
            Outbound::Ping => (WsMessage::Ping(Vec::new()), false),
            Outbound::Close(code) => {
                info!("{label}: closing with {} ({})", code.code(), code.reason());
                (WsMessage::Close(Some(close_frame(code))), true)
            }
        };
        if ws_tx.send(msg).await.is_err() {
            debug!("{label}: send failed (peer gone)");
            return;
        }
        if last {
            return;
        }
    }
    let _ = ws_tx.close().await;
}

/// Pings every `period`; ends when a ping went unanswered for a full period.
async fn heartbeat(link: ConnectionHandle, alive: Arc<AtomicBool>, period: Duration, label: String) {
    let mut ticker = interval(period);
    ticker.tick().await; // Skip the immediate first tick.

    loop {
        ticker.tick().await;
        if !alive.swap(false, Ordering::Relaxed) {
            info!("{label}: no pong since last heartbeat; terminating");
            link.terminate();
            return;
        }
        if !link.send_ping() && !link.is_live() {
            return;
        }
    }
}

/// Periodically expires idle sessions and closes their participants.
async fn sweep_idle_sessions(registry: SharedRegistry, period: Duration, max_idle: Duration) {
    let mut ticker = interval(period);
    ticker.tick().await;

    loop {
        ticker.tick().await;
        let expired = registry.lock().await.sweep(Instant::now(), max_idle);
        for session in expired {
            info!(
                "[{}] session expired after {}s idle; closing {} connection(s)",
                session.session_id,
                max_idle.as_secs(),
                session.participants.len()
            );
            for participant in session.participants {
                participant.close(RelayCloseCode::SessionExpired);
            }
        }
    }
}

// ── Helpers ───────────────────────────────────────────────────────────────────

/// Hands router output to the recipients' queues.
fn dispatch(deliveries: Vec<Delivery<ConnectionHandle>>) {
    for delivery in deliveries {
        match delivery {
            Delivery::Text { to, text } => {
                to.send_text(text);
            }
            Delivery::Close { to, code } => to.close(code),
        }
    }
}

fn close_frame(code: RelayCloseCode) -> CloseFrame<'static> {
    CloseFrame {
        code: CloseCode::from(code.code()),
        reason: code.reason().into(),
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_close_frame_carries_application_code() {
        let frame = close_frame(RelayCloseCode::SlotOccupied);
        assert_eq!(u16::from(frame.code), 4001);
        assert_eq!(frame.reason, "Session already has a teleprompter");
    }

    #[tokio::test]
    async fn test_dispatch_routes_text_and_close() {
        // Arrange
        let (a, mut a_rx) = ConnectionHandle::new(4);
        let (b, mut b_rx) = ConnectionHandle::new(4);

        // Act
        dispatch(vec![
            Delivery::Text {
                to: a.clone(),
                text: "x".to_string(),
            },
            Delivery::Close {
                to: b.clone(),
                code: RelayCloseCode::SessionExpired,
            },
        ]);

        // Assert
        assert_eq!(a_rx.recv().await, Some(Outbound::Text("x".to_string())));
        assert_eq!(
            b_rx.recv().await,
            Some(Outbound::Close(RelayCloseCode::SessionExpired))
        );
    }

    #[tokio::test]
    async fn test_bind_to_port_zero_reports_real_port() {
        let config = RelayConfig {
            bind_addr: "127.0.0.1:0".parse().unwrap(),
            ..RelayConfig::default()
        };

        let server = RelayServer::bind(config).await.unwrap();

        assert_ne!(server.local_addr().unwrap().port(), 0);
    }
}
