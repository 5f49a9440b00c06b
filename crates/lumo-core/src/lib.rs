//! # lumo-core
//!
//! Shared library for the Lumo teleprompter sync system containing the wire
//! protocol types, the JSON frame codec, and session identifiers.
//!
//! This crate is used by the relay and by both client roles (teleprompter
//! and remote).  It has no dependencies on sockets, timers, or async
//! runtimes.
//!
//! # Architecture overview
//!
//! Lumo lets one device (the *teleprompter*) scroll a script while another
//! device (the *remote*) drives playback over the network.  Both connect to a
//! *relay* under the same short session code; the relay pairs them and
//! forwards frames between them.
//!
//! - **`protocol`** – The JSON frames that travel over the WebSocket, and the
//!   codec that classifies them.  The relay only ever looks at the envelope;
//!   clients decode the typed payloads.
//!
//! - **`domain`** – The session code: how it is generated, what alphabet it
//!   uses, and how it is normalised.

pub mod domain;
pub mod protocol;

pub use domain::{SessionId, SessionIdError};
pub use protocol::messages::{
    ClientMessage, PlaybackState, RelayCloseCode, RelayNotice, RemoteCommand, Role, SeekDirection,
    SeekUnit,
};
pub use protocol::{classify_client_frame, decode_relay_frame, ClientFrame, RelayEvent};
