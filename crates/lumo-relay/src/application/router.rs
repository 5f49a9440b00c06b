//! Per-connection routing state machine.
//!
//! Every accepted connection gets one [`ConnectionRouter`].  It decides what
//! happens to each inbound text frame and what to tell the session when the
//! connection goes away.  It performs no I/O: every method returns a list of
//! [`Delivery`] values that the infrastructure layer hands to the recipients'
//! outbound queues.
//!
//! ```text
//!             join (ok)                    close
//! Unjoined ─────────────► Joined(role) ─────────────► Closed
//!     │                                                  ▲
//!     └──── join (slot occupied) → Close(4001) ──────────┘
//! ```
//!
//! # Rules
//!
//! - Before a successful `join`, every other frame is dropped.
//! - A second `join` on a joined connection is dropped.
//! - `state` is forwarded only from a teleprompter and `command` (either
//!   envelope form) only from a remote.  Frames in the wrong direction are
//!   dropped.
//! - Forwarded frames are passed on as the exact received text.
//! - Malformed frames are dropped without closing the connection.

use std::time::Instant;

use lumo_core::protocol::codec::{classify_client_frame, encode_notice, ClientFrame};
use lumo_core::protocol::messages::{RelayCloseCode, RelayNotice, Role};
use lumo_core::SessionId;
use tracing::{debug, info, warn};

use crate::application::registry::{PeerLink, RegisterError, SessionRegistry};

/// Lifecycle of one connection as seen by the router.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    /// Connected, no accepted `join` yet.
    Unjoined,
    /// Registered in the session under this role.
    Joined(Role),
    /// Rejected or closed.  Nothing more is routed.
    Closed,
}

/// One outbound action produced by the router.
#[derive(Debug, Clone, PartialEq)]
pub enum Delivery<L> {
    /// Queue a text frame on `to`.
    Text { to: L, text: String },
    /// Close `to` with an application close code.
    Close { to: L, code: RelayCloseCode },
}

/// Routing state for a single connection.
#[derive(Debug)]
pub struct ConnectionRouter<L> {
    session_id: SessionId,
    link: L,
    state: LinkState,
}

impl<L: PeerLink> ConnectionRouter<L> {
    /// Creates a router for a connection that arrived on `session_id`'s path.
    pub fn new(session_id: SessionId, link: L) -> Self {
        Self {
            session_id,
            link,
            state: LinkState::Unjoined,
        }
    }

    pub fn state(&self) -> LinkState {
        self.state
    }

    pub fn session_id(&self) -> &SessionId {
        &self.session_id
    }

    /// Handles one inbound text frame.
    pub fn handle_text(
        &mut self,
        text: &str,
        registry: &mut SessionRegistry<L>,
        now: Instant,
    ) -> Vec<Delivery<L>> {
        if self.state == LinkState::Closed {
            return Vec::new();
        }

        let Some(frame) = classify_client_frame(text) else {
            debug!("[{}] dropping unrecognised frame", self.session_id);
            return Vec::new();
        };

        match (self.state, frame) {
            (LinkState::Unjoined, ClientFrame::Join { role, session_id }) => {
                if let Some(body_id) = session_id.as_deref() {
                    if !body_id.eq_ignore_ascii_case(self.session_id.as_str()) {
                        debug!(
                            "[{}] join body names a different session; using the path",
                            self.session_id
                        );
                    }
                }
                self.join(role, registry, now)
            }
            (LinkState::Unjoined, other) => {
                debug!(
                    "[{}] dropping {} before join",
                    self.session_id,
                    other.type_name()
                );
                Vec::new()
            }
            (LinkState::Joined(_), ClientFrame::Join { .. }) => {
                debug!("[{}] dropping repeated join", self.session_id);
                Vec::new()
            }
            (LinkState::Joined(role), frame) => self.forward(role, &frame, text, registry, now),
            (LinkState::Closed, _) => Vec::new(),
        }
    }

    /// Handles the connection going away, for whatever reason.
    ///
    /// Idempotent: only the first call after a successful join produces
    /// `peer_disconnected` notices.
    pub fn handle_close(&mut self, registry: &mut SessionRegistry<L>) -> Vec<Delivery<L>> {
        let previous = std::mem::replace(&mut self.state, LinkState::Closed);
        let LinkState::Joined(role) = previous else {
            return Vec::new();
        };

        let Some(departure) = registry.unregister(&self.session_id, self.link.id()) else {
            // Already removed, e.g. by the idle sweep.
            return Vec::new();
        };

        info!(
            "[{}] {role} left{}",
            self.session_id,
            if departure.session_removed {
                "; session removed"
            } else {
                ""
            }
        );

        let notice = RelayNotice::PeerDisconnected {
            role: departure.role,
        };
        departure
            .notify
            .into_iter()
            .filter_map(|to| notice_delivery(to, &notice))
            .collect()
    }

    fn join(
        &mut self,
        role: Role,
        registry: &mut SessionRegistry<L>,
        now: Instant,
    ) -> Vec<Delivery<L>> {
        let ack = match registry.register(&self.session_id, self.link.clone(), role, now) {
            Ok(ack) => ack,
            Err(RegisterError::SlotOccupied(_)) => {
                warn!(
                    "[{}] rejecting teleprompter: slot occupied",
                    self.session_id
                );
                self.state = LinkState::Closed;
                return vec![Delivery::Close {
                    to: self.link.clone(),
                    code: RelayCloseCode::SlotOccupied,
                }];
            }
        };

        self.state = LinkState::Joined(role);
        info!(
            "[{}] {role} joined (teleprompter present: {}, remotes: {})",
            self.session_id,
            ack.teleprompter.is_some(),
            ack.remotes.len()
        );

        let mut out = Vec::new();
        let joined = RelayNotice::Joined {
            role,
            session_id: self.session_id.clone(),
            teleprompter_present: ack.teleprompter.is_some(),
            remotes: ack.remotes.len(),
        };
        out.extend(notice_delivery(self.link.clone(), &joined));

        // Existing counterparts hear about the newcomer; the newcomer hears
        // about a counterpart that was already there.
        let arrived = RelayNotice::PeerConnected { role };
        let present = RelayNotice::PeerConnected {
            role: role.counterpart(),
        };
        let counterparts: Vec<L> = match role {
            Role::Teleprompter => ack.remotes,
            Role::Remote => ack.teleprompter.into_iter().collect(),
        };
        if !counterparts.is_empty() {
            out.extend(notice_delivery(self.link.clone(), &present));
        }
        out.extend(
            counterparts
                .into_iter()
                .filter_map(|to| notice_delivery(to, &arrived)),
        );
        out
    }

    fn forward(
        &self,
        role: Role,
        frame: &ClientFrame,
        text: &str,
        registry: &mut SessionRegistry<L>,
        now: Instant,
    ) -> Vec<Delivery<L>> {
        let allowed = match frame {
            ClientFrame::State => role == Role::Teleprompter,
            ClientFrame::Command | ClientFrame::LegacyCommand(_) => role == Role::Remote,
            ClientFrame::Join { .. } => false,
        };
        if !allowed {
            debug!(
                "[{}] dropping {} from {role}",
                self.session_id,
                frame.type_name()
            );
            return Vec::new();
        }

        registry.touch(&self.session_id, now);
        let targets = registry.route(&self.session_id, self.link.id());
        debug!(
            "[{}] {role} → {} recipient(s): {}",
            self.session_id,
            targets.len(),
            frame.type_name()
        );
        targets
            .into_iter()
            .map(|to| Delivery::Text {
                to,
                text: text.to_string(),
            })
            .collect()
    }
}

fn notice_delivery<L>(to: L, notice: &RelayNotice) -> Option<Delivery<L>> {
    match encode_notice(notice) {
        Ok(text) => Some(Delivery::Text { to, text }),
        Err(e) => {
            warn!("failed to encode relay notice: {e}");
            None
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
