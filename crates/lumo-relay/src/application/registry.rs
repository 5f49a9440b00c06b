//! Session registry: who is in which session, and who a frame goes to.
//!
//! The registry is the only place session state changes.  It maps a session
//! code to at most one teleprompter link and a set of remote links, and it
//! owns the pairing and cleanup rules:
//!
//! - A second *live* teleprompter is rejected with
//!   [`RegisterError::SlotOccupied`], never queued.  A teleprompter slot held
//!   by a dead link (transport already closed) is taken over.
//! - A session is deleted the moment it has neither a teleprompter nor a
//!   remote.  There is no grace period for the empty case.
//! - [`SessionRegistry::sweep`] removes sessions idle past the expiry window
//!   and hands back their participants so the caller can close them.
//!
//! # Serialisation
//!
//! The registry itself is a plain `&mut self` data structure.  The
//! infrastructure layer keeps it behind one async mutex, and every connection
//! task, the heartbeat, and the idle sweep take that same lock, so joins can
//! never race each other past the one-teleprompter check.
//!
//! # Why generic over the link type?
//!
//! `SessionRegistry<L>` works with any [`PeerLink`].  In production `L` is the
//! WebSocket connection handle; in tests it is a tiny fake with a liveness
//! flag.  The rules above are therefore tested without opening a socket.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use lumo_core::protocol::messages::Role;
use lumo_core::SessionId;
use thiserror::Error;
use uuid::Uuid;

/// Unique identifier assigned to every accepted connection.
pub type ConnectionId = Uuid;

/// What the registry needs to know about a connection.
pub trait PeerLink: Clone {
    /// Stable identifier of the connection.
    fn id(&self) -> ConnectionId;

    /// `false` once the transport has closed.  Dead links are skipped when
    /// routing and do not hold the teleprompter slot.
    fn is_live(&self) -> bool;
}

/// Reasons a `join` is refused.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegisterError {
    /// A live teleprompter is already in the session.
    #[error("session {0} already has a live teleprompter")]
    SlotOccupied(SessionId),
}

/// Result of a successful registration: the live peers that were already in
/// the session before the new connection joined.
#[derive(Debug, Clone)]
pub struct JoinAck<L> {
    pub teleprompter: Option<L>,
    pub remotes: Vec<L>,
}

/// Result of removing a connection from its session.
#[derive(Debug, Clone)]
pub struct Departure<L> {
    /// The role the departing connection held.
    pub role: Role,
    /// Live counterparts that should hear `peer_disconnected`.
    pub notify: Vec<L>,
    /// `true` if the session became empty and was deleted.
    pub session_removed: bool,
}

/// A session removed by [`SessionRegistry::sweep`].
#[derive(Debug, Clone)]
pub struct ExpiredSession<L> {
    pub session_id: SessionId,
    /// Participants still live at sweep time.  They must be closed.
    pub participants: Vec<L>,
}

/// Read-only view of a session's occupancy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PeerSummary {
    pub teleprompter_present: bool,
    pub remotes: usize,
}

#[derive(Debug)]
struct Session<L> {
    teleprompter: Option<L>,
    remotes: Vec<L>,
    last_activity: Instant,
}

impl<L: PeerLink> Session<L> {
    fn new(now: Instant) -> Self {
        Self {
            teleprompter: None,
            remotes: Vec::new(),
            last_activity: now,
        }
    }

    fn is_empty(&self) -> bool {
        self.teleprompter.is_none() && self.remotes.is_empty()
    }

    fn live_teleprompter(&self) -> Option<&L> {
        self.teleprompter.as_ref().filter(|t| t.is_live())
    }

    fn live_remotes(&self) -> Vec<L> {
        self.remotes.iter().filter(|r| r.is_live()).cloned().collect()
    }
}

/// In-memory map from session code to its participants.
#[derive(Debug)]
pub struct SessionRegistry<L> {
    sessions: HashMap<SessionId, Session<L>>,
}

impl<L: PeerLink> Default for SessionRegistry<L> {
    fn default() -> Self {
        Self::new()
    }
}

impl<L: PeerLink> SessionRegistry<L> {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self {
            sessions: HashMap::new(),
        }
    }

    /// Installs `link` into `session_id` under `role`.
    ///
    /// The session is created if this code has not been seen before.
    ///
    /// # Errors
    ///
    /// Returns [`RegisterError::SlotOccupied`] when `role` is
    /// [`Role::Teleprompter`] and a live teleprompter already holds the slot.
    /// The existing teleprompter is left untouched and no session is created.
    pub fn register(
        &mut self,
        session_id: &SessionId,
        link: L,
        role: Role,
        now: Instant,
    ) -> Result<JoinAck<L>, RegisterError> {
        if role == Role::Teleprompter {
            if let Some(session) = self.sessions.get(session_id) {
                if session
                    .live_teleprompter()
                    .is_some_and(|t| t.id() != link.id())
                {
                    return Err(RegisterError::SlotOccupied(session_id.clone()));
                }
            }
        }

        let session = self
            .sessions
            .entry(session_id.clone())
            .or_insert_with(|| Session::new(now));
        session.last_activity = now;

        let ack = JoinAck {
            teleprompter: session
                .live_teleprompter()
                .filter(|t| t.id() != link.id())
                .cloned(),
            remotes: session
                .live_remotes()
                .into_iter()
                .filter(|r| r.id() != link.id())
                .collect(),
        };

        match role {
            Role::Teleprompter => session.teleprompter = Some(link),
            Role::Remote => {
                session.remotes.retain(|r| r.id() != link.id());
                session.remotes.push(link);
            }
        }

        Ok(ack)
    }

    /// Removes connection `id` from `session_id`.
    ///
    /// Returns `None` if the connection was not registered there (already
    /// swept, or rejected at join time).  Deletes the session when it
    /// becomes empty.
    pub fn unregister(&mut self, session_id: &SessionId, id: ConnectionId) -> Option<Departure<L>> {
        let session = self.sessions.get_mut(session_id)?;

        let role = if session.teleprompter.as_ref().is_some_and(|t| t.id() == id) {
            session.teleprompter = None;
            Role::Teleprompter
        } else if let Some(pos) = session.remotes.iter().position(|r| r.id() == id) {
            session.remotes.remove(pos);
            Role::Remote
        } else {
            return None;
        };

        let notify = match role {
            Role::Teleprompter => session.live_remotes(),
            Role::Remote => session.live_teleprompter().cloned().into_iter().collect(),
        };

        let session_removed = session.is_empty();
        if session_removed {
            self.sessions.remove(session_id);
        }

        Some(Departure {
            role,
            notify,
            session_removed,
        })
    }

    /// Computes where a frame from connection `source` should go.
    ///
    /// Teleprompter → every live remote; remote → the teleprompter if present
    /// and live.  An unknown source gets an empty set.
    pub fn route(&self, session_id: &SessionId, source: ConnectionId) -> Vec<L> {
        let Some(session) = self.sessions.get(session_id) else {
            return Vec::new();
        };

        if session.teleprompter.as_ref().is_some_and(|t| t.id() == source) {
            return session.live_remotes();
        }
        if session.remotes.iter().any(|r| r.id() == source) {
            return session.live_teleprompter().cloned().into_iter().collect();
        }
        Vec::new()
    }

    /// Refreshes the last-activity timestamp of `session_id`.
    pub fn touch(&mut self, session_id: &SessionId, now: Instant) {
        if let Some(session) = self.sessions.get_mut(session_id) {
            session.last_activity = now;
        }
    }

    /// Removes every session whose last activity is more than `max_idle`
    /// before `now`.
    pub fn sweep(&mut self, now: Instant, max_idle: Duration) -> Vec<ExpiredSession<L>> {
        let expired: Vec<SessionId> = self
            .sessions
            .iter()
            .filter(|(_, s)| now.saturating_duration_since(s.last_activity) > max_idle)
            .map(|(id, _)| id.clone())
            .collect();

        expired
            .into_iter()
            .filter_map(|id| {
                let session = self.sessions.remove(&id)?;
                let participants = session
                    .teleprompter
                    .into_iter()
                    .chain(session.remotes)
                    .filter(|p| p.is_live())
                    .collect();
                Some(ExpiredSession {
                    session_id: id,
                    participants,
                })
            })
            .collect()
    }

    /// Number of sessions currently tracked.
    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    /// Whether `session_id` is currently tracked.
    pub fn contains(&self, session_id: &SessionId) -> bool {
        self.sessions.contains_key(session_id)
    }

    /// Live occupancy of `session_id`, or `None` if it does not exist.
    pub fn peers(&self, session_id: &SessionId) -> Option<PeerSummary> {
        self.sessions.get(session_id).map(|s| PeerSummary {
            teleprompter_present: s.live_teleprompter().is_some(),
            remotes: s.remotes.iter().filter(|r| r.is_live()).count(),
        })
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
