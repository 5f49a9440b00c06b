//! Application layer for lumo-relay.
//!
//! Knows *what* happens to a frame or a connection, never *how* bytes move.
//!
//! - [`registry`]: session membership, routing targets, expiry
//! - [`router`]: the per-connection state machine that turns inbound frames
//!   into deliveries
//!
//! Neither module opens a socket or spawns a task, so both are tested with an
//! in-memory link.

pub mod registry;
pub mod router;

pub use registry::{
    ConnectionId, Departure, ExpiredSession, JoinAck, PeerLink, PeerSummary, RegisterError,
    SessionRegistry,
};
pub use router::{ConnectionRouter, Delivery, LinkState};
