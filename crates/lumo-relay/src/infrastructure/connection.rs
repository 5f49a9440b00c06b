//! Handle to one live WebSocket connection.
//!
//! A [`ConnectionHandle`] is what the registry stores for each participant.
//! It does not own the socket; it owns the sending end of the connection's
//! bounded outbound queue.  A dedicated writer task drains that queue into
//! the socket (see `ws_server`), so a slow recipient only ever fills its own
//! queue and never stalls the sender or other recipients.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use lumo_core::protocol::messages::RelayCloseCode;
use tokio::sync::{mpsc, Notify};
use tracing::warn;
use uuid::Uuid;

use crate::application::{ConnectionId, PeerLink};

/// A frame waiting in a connection's outbound queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outbound {
    Text(String),
    Ping,
    Close(RelayCloseCode),
}

#[derive(Debug)]
struct Shared {
    open: AtomicBool,
    kill: Notify,
}

/// Cloneable handle to a connection's outbound queue.
#[derive(Debug, Clone)]
pub struct ConnectionHandle {
    id: ConnectionId,
    tx: mpsc::Sender<Outbound>,
    shared: Arc<Shared>,
}

impl ConnectionHandle {
    /// Creates a handle with a fresh id and a queue of `capacity` frames.
    ///
    /// Returns the handle and the receiving end for the writer task.
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<Outbound>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let handle = Self {
            id: Uuid::new_v4(),
            tx,
            shared: Arc::new(Shared {
                open: AtomicBool::new(true),
                kill: Notify::new(),
            }),
        };
        (handle, rx)
    }

    /// Queues a text frame.  Returns `false` if it was not queued.
    ///
    /// A full queue drops the frame for this recipient only.
    pub fn send_text(&self, text: String) -> bool {
        self.enqueue(Outbound::Text(text))
    }

    /// Queues a WebSocket ping.
    pub fn send_ping(&self) -> bool {
        self.enqueue(Outbound::Ping)
    }

    /// Closes the connection with `code`.
    ///
    /// The close frame is queued behind anything already pending.  If the
    /// queue is full the connection is terminated without a close frame.
    pub fn close(&self, code: RelayCloseCode) {
        if !self.is_live() {
            return;
        }
        if self.tx.try_send(Outbound::Close(code)).is_err() {
            self.terminate();
        }
    }

    /// Ends the connection immediately, without a close handshake.
    pub fn terminate(&self) {
        self.mark_closed();
        self.shared.kill.notify_one();
    }

    /// Marks the transport as gone.  Routing skips this link from now on.
    pub fn mark_closed(&self) {
        self.shared.open.store(false, Ordering::Relaxed);
    }

    /// Resolves once [`ConnectionHandle::terminate`] has been called.
    pub async fn terminated(&self) {
        self.shared.kill.notified().await;
    }

    fn enqueue(&self, frame: Outbound) -> bool {
        if !self.is_live() {
            return false;
        }
        match self.tx.try_send(frame) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                warn!("outbound queue full for connection {}; dropping frame", self.id);
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                self.mark_closed();
                false
            }
        }
    }
}

impl PeerLink for ConnectionHandle {
    fn id(&self) -> ConnectionId {
        self.id
    }

    fn is_live(&self) -> bool {
        self.shared.open.load(Ordering::Relaxed) && !self.tx.is_closed()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_send_text_reaches_receiver() {
        // Arrange
        let (handle, mut rx) = ConnectionHandle::new(4);

        // Act
        assert!(handle.send_text("hi".to_string()));

        // Assert
        assert_eq!(rx.recv().await, Some(Outbound::Text("hi".to_string())));
    }

    #[tokio::test]
    async fn test_full_queue_drops_only_the_new_frame() {
        let (handle, mut rx) = ConnectionHandle::new(1);
        assert!(handle.send_text("first".to_string()));

        assert!(!handle.send_text("second".to_string()));

        assert_eq!(rx.recv().await, Some(Outbound::Text("first".to_string())));
        assert!(handle.is_live());
    }

    #[tokio::test]
    async fn test_dropped_receiver_marks_link_dead() {
        let (handle, rx) = ConnectionHandle::new(4);
        drop(rx);

        assert!(!handle.is_live());
        assert!(!handle.send_text("x".to_string()));
    }

    #[tokio::test]
    async fn test_close_on_full_queue_terminates() {
        // Arrange
        let (handle, _rx) = ConnectionHandle::new(1);
        handle.send_text("pending".to_string());

        // Act
        handle.close(RelayCloseCode::SessionExpired);

        // Assert: the permit stored by notify_one lets this resolve at once.
        handle.terminated().await;
        assert!(!handle.is_live());
    }

    #[tokio::test]
    async fn test_close_is_queued_behind_pending_frames() {
        let (handle, mut rx) = ConnectionHandle::new(4);
        handle.send_text("last words".to_string());

        handle.close(RelayCloseCode::SlotOccupied);

        assert_eq!(rx.recv().await, Some(Outbound::Text("last words".to_string())));
        assert_eq!(rx.recv().await, Some(Outbound::Close(RelayCloseCode::SlotOccupied)));
    }

    #[test]
    fn test_clones_share_identity() {
        let (handle, _rx) = ConnectionHandle::new(1);
        assert_eq!(handle.clone().id(), handle.id());
    }
}
