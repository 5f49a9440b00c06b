//! Domain types shared by the relay and both client roles.
//!
//! Nothing in here touches the network or the clock.  The only domain
//! concept the two sides share beyond the wire messages is the session
//! identifier: the short code that pairs a teleprompter with its remotes.

/// Session identifiers: generation, parsing and case normalisation.
pub mod session_id;

pub use session_id::{SessionId, SessionIdError, SESSION_ALPHABET, SESSION_ID_LEN};
