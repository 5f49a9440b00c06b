//! Connection to the relay.
//!
//! [`ConnectionManager`] owns at most one WebSocket link to the relay at a
//! time.  It performs the `join` handshake, fans inbound frames out to
//! subscribers, queues outbound frames, and reconnects after an unexpected
//! drop.
//!
//! Architecture:
//! - `connect_as_*` opens the socket, sends `join`, and waits for the relay's
//!   `joined` acknowledgement (or a close) within the connect timeout.
//! - A spawned link task then runs a **writer** (bounded `mpsc` queue → socket)
//!   and a **reader** (socket → subscribers) until either side ends.
//! - When a link ends without [`ConnectionManager::disconnect`] having been
//!   called, one reconnect timer is armed.  Each failed attempt re-arms it.
//!
//! Every connect attempt bumps a generation counter.  A link or timer whose
//! generation is no longer current is stale and its outcome is ignored, so an
//! aborted attempt can never install a second socket.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use lumo_core::protocol::codec::{
    decode_relay_frame, encode_client_message, session_path, RelayEvent,
};
use lumo_core::protocol::messages::{
    ClientMessage, PlaybackState, RelayCloseCode, RelayNotice, RemoteCommand, Role,
};
use lumo_core::{SessionId, SessionIdError};
use thiserror::Error;
use tokio::net::TcpStream;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout};
use tokio_tungstenite::tungstenite::{Error as WsError, Message as WsMessage};
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};

use crate::application::playback::StateSink;
use crate::application::remote_control::{CommandSink, RemoteController};
use crate::application::subscribers::{Subscribers, Subscription};
use crate::domain::config::RelaySettings;

type Ws = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Reasons a connect attempt fails.
#[derive(Debug, Error)]
pub enum ConnectError {
    /// No `joined` acknowledgement arrived in time.
    #[error("relay did not acknowledge the join within {0:?}")]
    ConnectTimeout(Duration),

    /// Another teleprompter already holds the session.
    #[error("session {0} already has a teleprompter")]
    SlotOccupied(SessionId),

    /// The relay expired the session while joining.
    #[error("session {0} has expired")]
    SessionExpired(SessionId),

    /// The relay closed the socket before acknowledging the join.
    #[error("relay rejected the session (close code {code:?})")]
    SessionRejected { code: Option<u16> },

    /// The user-supplied session code is malformed.
    #[error("invalid session code: {0}")]
    InvalidSessionId(#[from] SessionIdError),

    /// DNS, refused connection, TLS, or a protocol violation.
    #[error("transport error: {0}")]
    Transport(#[from] WsError),

    /// The `join` frame could not be serialised.
    #[error("failed to encode join frame: {0}")]
    Encode(#[from] serde_json::Error),

    /// A newer connect or a disconnect superseded this attempt.
    #[error("connect attempt was superseded")]
    Cancelled,
}

/// Presence change of the counterpart role.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeerEvent {
    Connected(Role),
    Disconnected(Role),
}

#[derive(Default)]
struct LinkSlot {
    identity: Option<(Role, SessionId)>,
    outbound: Option<mpsc::Sender<String>>,
    generation: u64,
    connected: bool,
    should_reconnect: bool,
    reconnect: Option<JoinHandle<()>>,
}

/// Client side of the relay link.  Shared by `Arc`.
pub struct ConnectionManager {
    settings: RelaySettings,
    slot: Mutex<LinkSlot>,
    commands: Arc<Subscribers<RemoteCommand>>,
    connection: Arc<Subscribers<bool>>,
    states: Arc<Subscribers<PlaybackState>>,
    peers: Arc<Subscribers<PeerEvent>>,
}

impl ConnectionManager {
    /// Creates a disconnected manager.
    pub fn new(settings: RelaySettings) -> Arc<Self> {
        Arc::new(Self {
            settings,
            slot: Mutex::new(LinkSlot::default()),
            commands: Subscribers::new(),
            connection: Subscribers::new(),
            states: Subscribers::new(),
            peers: Subscribers::new(),
        })
    }

    // ── Connect / disconnect ─────────────────────────────────────────────────

    /// Opens a new session as its teleprompter and returns the generated code.
    pub async fn connect_as_teleprompter(self: &Arc<Self>) -> Result<SessionId, ConnectError> {
        let session_id = SessionId::generate();
        self.connect(Role::Teleprompter, session_id.clone()).await?;
        Ok(session_id)
    }

    /// Opens the session `session_id` as its teleprompter, for example to
    /// keep the same code across a restart.
    pub async fn connect_as_teleprompter_with(
        self: &Arc<Self>,
        session_id: SessionId,
    ) -> Result<(), ConnectError> {
        self.connect(Role::Teleprompter, session_id).await
    }

    /// Joins an existing session as a remote.  `code` is case-insensitive.
    pub async fn connect_as_remote(self: &Arc<Self>, code: &str) -> Result<(), ConnectError> {
        let session_id = SessionId::parse(code)?;
        self.connect(Role::Remote, session_id).await
    }

    async fn connect(self: &Arc<Self>, role: Role, session_id: SessionId) -> Result<(), ConnectError> {
        self.disconnect();
        let generation = {
            let mut slot = self.slot();
            slot.generation += 1;
            slot.identity = Some((role, session_id.clone()));
            slot.generation
        };
        info!(session = %session_id, role = role.as_str(), "connecting to relay at {}", self.settings.url);

        let result = self.establish(role, &session_id, generation).await;
        if let Err(e) = &result {
            warn!(session = %session_id, "connect failed: {e}");
            let mut slot = self.slot();
            if slot.generation == generation {
                slot.identity = None;
            }
        }
        result
    }

    /// Closes the link and cancels any pending reconnect.  Idempotent.
    pub fn disconnect(&self) {
        let was_connected = {
            let mut slot = self.slot();
            slot.should_reconnect = false;
            slot.generation += 1;
            if let Some(timer) = slot.reconnect.take() {
                timer.abort();
            }
            // Dropping the sender lets the writer send a close frame.
            slot.outbound = None;
            slot.identity = None;
            std::mem::replace(&mut slot.connected, false)
        };
        if was_connected {
            info!("disconnected from relay");
            self.connection.notify(&false);
        }
    }

    /// Opens the socket, joins, and installs the link if `generation` is
    /// still current.
    async fn establish(
        self: &Arc<Self>,
        role: Role,
        session_id: &SessionId,
        generation: u64,
    ) -> Result<(), ConnectError> {
        let url = self.session_url(session_id);
        let limit = self.settings.connect_timeout();
        let ws = timeout(limit, handshake(&url, role, session_id))
            .await
            .map_err(|_| ConnectError::ConnectTimeout(limit))??;

        let (tx, rx) = mpsc::channel(self.settings.outbound_queue.max(1));
        {
            let mut slot = self.slot();
            if slot.generation != generation {
                return Err(ConnectError::Cancelled);
            }
            slot.outbound = Some(tx);
            slot.connected = true;
            slot.should_reconnect = true;
        }
        info!(session = %session_id, role = role.as_str(), "joined session");

        tokio::spawn(run_link(Arc::downgrade(self), generation, ws, rx));
        self.connection.notify(&true);
        Ok(())
    }

    // ── Reconnect ────────────────────────────────────────────────────────────

    fn on_link_closed(self: &Arc<Self>, generation: u64) {
        {
            let mut slot = self.slot();
            if slot.generation != generation || !slot.connected {
                return;
            }
            slot.connected = false;
            slot.outbound = None;
            if slot.should_reconnect {
                self.schedule_reconnect(&mut slot);
            }
        }
        warn!(
            "link to relay closed; reconnecting in {:?}",
            self.settings.reconnect_delay()
        );
        self.connection.notify(&false);
    }

    fn schedule_reconnect(self: &Arc<Self>, slot: &mut LinkSlot) {
        if let Some(previous) = slot.reconnect.take() {
            previous.abort();
        }
        let manager = Arc::downgrade(self);
        let delay = self.settings.reconnect_delay();
        slot.reconnect = Some(tokio::spawn(async move {
            sleep(delay).await;
            if let Some(manager) = manager.upgrade() {
                manager.reconnect_once().await;
            }
        }));
    }

    async fn reconnect_once(self: Arc<Self>) {
        let (role, session_id, generation) = {
            let mut slot = self.slot();
            // This task is the pending timer.
            slot.reconnect = None;
            if !slot.should_reconnect || slot.connected {
                return;
            }
            let Some((role, session_id)) = slot.identity.clone() else {
                return;
            };
            slot.generation += 1;
            (role, session_id, slot.generation)
        };
        info!(session = %session_id, "reconnecting to relay");

        match self.establish(role, &session_id, generation).await {
            Ok(()) => {}
            Err(ConnectError::Cancelled) => debug!("reconnect superseded"),
            Err(e) => {
                warn!(session = %session_id, "reconnect failed: {e}");
                let mut slot = self.slot();
                if slot.generation == generation && slot.should_reconnect {
                    self.schedule_reconnect(&mut slot);
                }
            }
        }
    }

    // ── Sending ──────────────────────────────────────────────────────────────

    /// Queues a command for the teleprompter.  Returns `false` if it was
    /// dropped (not connected, or the queue is full).
    pub fn send_command(&self, command: RemoteCommand) -> bool {
        self.send(ClientMessage::Command { payload: command })
    }

    /// Queues a playback snapshot for the remotes.  Same contract as
    /// [`send_command`](Self::send_command).
    pub fn broadcast_state(&self, state: PlaybackState) -> bool {
        self.send(ClientMessage::State { payload: state })
    }

    fn send(&self, message: ClientMessage) -> bool {
        let text = match encode_client_message(&message) {
            Ok(text) => text,
            Err(e) => {
                warn!("failed to encode outbound frame: {e}");
                return false;
            }
        };
        let slot = self.slot();
        let Some(tx) = slot.outbound.as_ref() else {
            return false;
        };
        match tx.try_send(text) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                debug!("outbound queue full; dropping frame");
                false
            }
            Err(TrySendError::Closed(_)) => false,
        }
    }

    // ── Subscriptions ────────────────────────────────────────────────────────

    /// Commands forwarded from remotes (teleprompter side).
    pub fn on_message<F>(&self, handler: F) -> Subscription
    where
        F: Fn(&RemoteCommand) + Send + Sync + 'static,
    {
        self.commands.subscribe(handler)
    }

    /// `true` after each successful join, `false` after each drop or disconnect.
    pub fn on_connection_change<F>(&self, handler: F) -> Subscription
    where
        F: Fn(&bool) + Send + Sync + 'static,
    {
        self.connection.subscribe(handler)
    }

    /// Playback snapshots forwarded from the teleprompter (remote side).
    pub fn on_state_update<F>(&self, handler: F) -> Subscription
    where
        F: Fn(&PlaybackState) + Send + Sync + 'static,
    {
        self.states.subscribe(handler)
    }

    pub fn on_peer_change<F>(&self, handler: F) -> Subscription
    where
        F: Fn(&PeerEvent) + Send + Sync + 'static,
    {
        self.peers.subscribe(handler)
    }

    /// Creates a [`RemoteController`] that sends through this manager and
    /// follows its state updates until the controller is dropped.
    pub fn remote_controller(self: &Arc<Self>) -> Arc<RemoteController> {
        let controller = Arc::new(RemoteController::new(Arc::clone(self) as Arc<dyn CommandSink>));
        let observer = Arc::downgrade(&controller);
        controller.attach(self.on_state_update(move |state| {
            if let Some(controller) = observer.upgrade() {
                controller.observe(state);
            }
        }));
        controller
    }

    // ── Accessors ────────────────────────────────────────────────────────────

    pub fn session_id(&self) -> Option<SessionId> {
        self.slot().identity.as_ref().map(|(_, id)| id.clone())
    }

    pub fn role(&self) -> Option<Role> {
        self.slot().identity.as_ref().map(|(role, _)| *role)
    }

    pub fn is_connected(&self) -> bool {
        self.slot().connected
    }

    /// Base relay URL, without the session path.
    pub fn relay_url(&self) -> &str {
        &self.settings.url
    }

    fn session_url(&self, session_id: &SessionId) -> String {
        format!(
            "{}{}",
            self.settings.url.trim_end_matches('/'),
            session_path(session_id)
        )
    }

    fn slot(&self) -> MutexGuard<'_, LinkSlot> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn dispatch(&self, text: &str) {
        match decode_relay_frame(text) {
            Some(RelayEvent::Command(command)) => {
                debug!("received command: {}", command.type_name());
                self.commands.notify(&command);
            }
            Some(RelayEvent::State(state)) => self.states.notify(&state),
            Some(RelayEvent::Notice(RelayNotice::PeerConnected { role })) => {
                info!("{} connected", role.as_str());
                self.peers.notify(&PeerEvent::Connected(role));
            }
            Some(RelayEvent::Notice(RelayNotice::PeerDisconnected { role })) => {
                info!("{} disconnected", role.as_str());
                self.peers.notify(&PeerEvent::Disconnected(role));
            }
            Some(RelayEvent::Notice(RelayNotice::Joined { .. })) => {
                debug!("ignoring repeated join acknowledgement");
            }
            None => debug!("dropping unrecognised frame from relay"),
        }
    }
}

impl StateSink for ConnectionManager {
    fn broadcast_state(&self, state: PlaybackState) {
        let _ = ConnectionManager::broadcast_state(self, state);
    }
}

impl CommandSink for ConnectionManager {
    fn send_command(&self, command: RemoteCommand) -> bool {
        ConnectionManager::send_command(self, command)
    }
}

// ── Link I/O ──────────────────────────────────────────────────────────────────

/// Connects, sends `join`, and waits for the relay's answer.
async fn handshake(url: &str, role: Role, session_id: &SessionId) -> Result<Ws, ConnectError> {
    let (mut ws, _response) = connect_async(url).await?;
    let join = encode_client_message(&ClientMessage::Join {
        role,
        session_id: session_id.clone(),
    })?;
    ws.send(WsMessage::Text(join)).await?;

    while let Some(msg) = ws.next().await {
        match msg? {
            WsMessage::Text(text) => match decode_relay_frame(&text) {
                Some(RelayEvent::Notice(RelayNotice::Joined {
                    teleprompter_present,
                    remotes,
                    ..
                })) => {
                    debug!(teleprompter_present, remotes, "join acknowledged");
                    return Ok(ws);
                }
                _ => debug!("ignoring frame received before join acknowledgement"),
            },
            WsMessage::Close(frame) => {
                return Err(rejection(session_id, frame.map(|f| u16::from(f.code))));
            }
            _ => {}
        }
    }
    Err(ConnectError::SessionRejected { code: None })
}

/// Maps a close received during the handshake to a [`ConnectError`].
fn rejection(session_id: &SessionId, code: Option<u16>) -> ConnectError {
    match code.and_then(RelayCloseCode::from_code) {
        Some(RelayCloseCode::SlotOccupied) => ConnectError::SlotOccupied(session_id.clone()),
        Some(RelayCloseCode::SessionExpired) => ConnectError::SessionExpired(session_id.clone()),
        _ => ConnectError::SessionRejected { code },
    }
}

/// Runs one established link until either direction ends.
async fn run_link(
    manager: Weak<ConnectionManager>,
    generation: u64,
    ws: Ws,
    mut rx: mpsc::Receiver<String>,
) {
    let (mut sink, mut source) = ws.split();

    let writer = async {
        while let Some(text) = rx.recv().await {
            if let Err(e) = sink.send(WsMessage::Text(text)).await {
                debug!("send to relay failed: {e}");
                return;
            }
        }
        // Queue closed: disconnect() was called.
        let _ = sink.close().await;
    };

    let reader = async {
        while let Some(msg) = source.next().await {
            match msg {
                Ok(WsMessage::Text(text)) => {
                    let Some(manager) = manager.upgrade() else {
                        return;
                    };
                    manager.dispatch(&text);
                }
                Ok(WsMessage::Close(frame)) => {
                    debug!("relay closed the link: {frame:?}");
                    return;
                }
                Ok(_) => {}
                Err(e) => {
                    warn!("relay link error: {e}");
                    return;
                }
            }
        }
    };

    tokio::select! {
        _ = writer => {}
        _ = reader => {}
    }

    if let Some(manager) = manager.upgrade() {
        manager.on_link_closed(generation);
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn manager(url: &str) -> Arc<ConnectionManager> {
        ConnectionManager::new(RelaySettings {
            url: url.to_string(),
            ..RelaySettings::default()
        })
    }

    fn code() -> SessionId {
        SessionId::parse("QX7K2M9P").unwrap()
    }

    #[test]
    fn test_close_4001_maps_to_slot_occupied() {
        let err = rejection(&code(), Some(4001));
        assert!(matches!(err, ConnectError::SlotOccupied(id) if id == code()));
    }

    #[test]
    fn test_close_4002_maps_to_session_expired() {
        assert!(matches!(
            rejection(&code(), Some(4002)),
            ConnectError::SessionExpired(_)
        ));
    }

    #[test]
    fn test_other_closes_map_to_session_rejected() {
        assert!(matches!(
            rejection(&code(), Some(4000)),
            ConnectError::SessionRejected { code: Some(4000) }
        ));
        assert!(matches!(
            rejection(&code(), None),
            ConnectError::SessionRejected { code: None }
        ));
    }

    #[test]
    fn test_session_url_joins_base_and_path() {
        // Arrange
        let with_slash = manager("ws://relay.local:10000/");
        let without = manager("ws://relay.local:10000");

        // Act / Assert
        assert_eq!(
            with_slash.session_url(&code()),
            "ws://relay.local:10000/session/QX7K2M9P"
        );
        assert_eq!(without.session_url(&code()), with_slash.session_url(&code()));
    }

    #[test]
    fn test_sending_while_disconnected_is_a_silent_noop() {
        let m = manager("ws://127.0.0.1:1");
        assert!(!m.send_command(RemoteCommand::Play));
        assert!(!m.broadcast_state(PlaybackState {
            is_playing: false,
            speed: 50,
            position: 0.0,
            script_title: String::new(),
        }));
    }

    #[test]
    fn test_disconnect_when_idle_is_idempotent_and_silent() {
        // Arrange
        let m = manager("ws://127.0.0.1:1");
        let calls = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&calls);
        let _sub = m.on_connection_change(move |_| {
            c.fetch_add(1, Ordering::Relaxed);
        });

        // Act
        m.disconnect();
        m.disconnect();

        // Assert
        assert_eq!(calls.load(Ordering::Relaxed), 0);
        assert!(!m.is_connected());
        assert!(m.session_id().is_none());
    }

    #[tokio::test]
    async fn test_invalid_code_is_rejected_before_any_io() {
        let m = manager("ws://127.0.0.1:1");

        let err = m.connect_as_remote("abc").await.unwrap_err();

        assert!(matches!(
            err,
            ConnectError::InvalidSessionId(SessionIdError::WrongLength(3))
        ));
        assert!(m.role().is_none());
    }

    #[test]
    fn test_dispatch_routes_frames_to_matching_subscribers() {
        // Arrange
        let m = manager("ws://127.0.0.1:1");
        let commands = Arc::new(AtomicUsize::new(0));
        let peers = Arc::new(Mutex::new(Vec::new()));
        let c = Arc::clone(&commands);
        let p = Arc::clone(&peers);
        let _s1 = m.on_message(move |_| {
            c.fetch_add(1, Ordering::Relaxed);
        });
        let _s2 = m.on_peer_change(move |e| p.lock().unwrap().push(*e));

        // Act
        m.dispatch(r#"{"type":"speed","payload":{"speed":80}}"#);
        m.dispatch(r#"{"type":"command","payload":{"type":"play"}}"#);
        m.dispatch(r#"{"type":"peer_connected","role":"remote"}"#);
        m.dispatch("not json");

        // Assert
        assert_eq!(commands.load(Ordering::Relaxed), 2);
        assert_eq!(*peers.lock().unwrap(), vec![PeerEvent::Connected(Role::Remote)]);
    }

    #[test]
    fn test_remote_controller_follows_states_until_dropped() {
        // Arrange
        let m = manager("ws://127.0.0.1:1");
        let controller = m.remote_controller();

        // Act
        m.dispatch(
            r#"{"type":"state","payload":{"isPlaying":true,"speed":65,"position":10.0,"scriptTitle":"Keynote"}}"#,
        );

        // Assert
        assert_eq!(controller.speed(), 65);
        assert!(controller.is_playing());
        assert_eq!(m.states.len(), 1);
        drop(controller);
        assert!(m.states.is_empty());
    }
}
