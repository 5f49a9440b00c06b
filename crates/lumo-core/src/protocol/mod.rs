//! Protocol module: wire-message types and the JSON frame codec.

pub mod codec;
pub mod messages;

pub use codec::{
    classify_client_frame, decode_relay_frame, encode_client_message, encode_notice,
    parse_session_path, session_path, ClientFrame, LegacyCommandKind, RelayEvent,
};
pub use messages::*;
