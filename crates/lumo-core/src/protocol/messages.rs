//! Wire-message types for the teleprompter relay protocol.
//!
//! Every frame on the wire is a JSON object with a `"type"` field naming the
//! variant.  There are three audiences for these types:
//!
//! ```text
//! Client → Relay:  ClientMessage   (join / state / command)
//! Relay  → Client: RelayNotice     (joined / peer_connected / peer_disconnected)
//!                  + forwarded state and command frames, byte-for-byte
//! Remote → Teleprompter (through the relay): RemoteCommand
//! ```
//!
//! The relay never deserialises a `PlaybackState` or `RemoteCommand`; it only
//! reads the envelope (see [`crate::protocol::codec::classify_client_frame`]).
//! The typed payloads here exist for the two client roles.

use serde::de::{self, DeserializeOwned};
use serde::{Deserialize, Deserializer, Serialize};

use crate::domain::SessionId;

/// Lowest speed a teleprompter accepts, in percent.
pub const MIN_SPEED_PERCENT: u8 = 1;

/// Highest speed a teleprompter accepts, in percent.
pub const MAX_SPEED_PERCENT: u8 = 100;

// ── Roles ─────────────────────────────────────────────────────────────────────

/// The participant kind declared in a `join` frame.
///
/// Fixed for the lifetime of one connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// The device displaying and scrolling the script.  At most one per session.
    Teleprompter,
    /// A device driving playback.  Any number per session.
    Remote,
}

impl Role {
    /// Returns the wire name of the role.
    pub fn as_str(self) -> &'static str {
        match self {
            Role::Teleprompter => "teleprompter",
            Role::Remote => "remote",
        }
    }

    /// Returns the role on the other end of the relay.
    pub fn counterpart(self) -> Role {
        match self {
            Role::Teleprompter => Role::Remote,
            Role::Remote => Role::Teleprompter,
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── Remote commands ───────────────────────────────────────────────────────────

/// Direction of a seek gesture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SeekDirection {
    Forward,
    Backward,
}

/// Size of one seek step.
///
/// Travels in the `amount` field of a seek payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SeekUnit {
    #[default]
    Line,
    Paragraph,
}

/// A playback command sent by a remote to the teleprompter.
///
/// Commands are stateless and fire-and-forget.  The JSON form puts the tag in
/// `type` and any arguments in `payload`:
///
/// ```json
/// {"type":"play"}
/// {"type":"speed","payload":{"speed":80}}
/// {"type":"seek","payload":{"direction":"forward","amount":"line"}}
/// ```
///
/// This is also exactly the legacy "direct" frame shape, so a legacy frame
/// forwarded by the relay deserialises straight into this enum.
///
/// Commands without arguments accept and ignore any `payload`, so
/// `{"type":"play","payload":{}}` is a play command.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", content = "payload", rename_all = "lowercase")]
pub enum RemoteCommand {
    /// Start (or resume) scrolling.
    Play,
    /// Pause scrolling, keeping the current position.
    Pause,
    /// Pause scrolling and rewind to the top.
    Stop,
    /// Change the scroll speed.
    Speed {
        /// New speed in percent, `1..=100`.
        speed: u8,
    },
    /// Jump forwards or backwards by a fixed step.
    Seek {
        direction: SeekDirection,
        #[serde(rename = "amount")]
        unit: SeekUnit,
    },
    /// Ask the teleprompter to re-broadcast its current state.
    Status,
    /// Jump the teleprompter to an absolute position in pixels.
    Sync { position: f64 },
}

impl RemoteCommand {
    /// Returns the wire tag of the command, for logging.
    pub fn type_name(&self) -> &'static str {
        match self {
            RemoteCommand::Play => "play",
            RemoteCommand::Pause => "pause",
            RemoteCommand::Stop => "stop",
            RemoteCommand::Speed { .. } => "speed",
            RemoteCommand::Seek { .. } => "seek",
            RemoteCommand::Status => "status",
            RemoteCommand::Sync { .. } => "sync",
        }
    }
}

/// Wire tags accepted for [`RemoteCommand`].
const COMMAND_TAGS: &[&str] = &["play", "pause", "stop", "speed", "seek", "status", "sync"];

#[derive(Deserialize)]
struct RawCommand {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    payload: Option<serde_json::Value>,
}

#[derive(Deserialize)]
struct SpeedArgs {
    speed: u8,
}

#[derive(Deserialize)]
struct SeekArgs {
    direction: SeekDirection,
    #[serde(default)]
    amount: SeekUnit,
}

#[derive(Deserialize)]
struct SyncArgs {
    position: f64,
}

fn command_args<T, E>(payload: Option<serde_json::Value>) -> Result<T, E>
where
    T: DeserializeOwned,
    E: de::Error,
{
    let value = payload.ok_or_else(|| E::missing_field("payload"))?;
    serde_json::from_value(value).map_err(E::custom)
}

impl<'de> Deserialize<'de> for RemoteCommand {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = RawCommand::deserialize(deserializer)?;
        match raw.kind.as_str() {
            "play" => Ok(RemoteCommand::Play),
            "pause" => Ok(RemoteCommand::Pause),
            "stop" => Ok(RemoteCommand::Stop),
            "status" => Ok(RemoteCommand::Status),
            "speed" => {
                let SpeedArgs { speed } = command_args(raw.payload)?;
                Ok(RemoteCommand::Speed { speed })
            }
            "seek" => {
                let SeekArgs { direction, amount } = command_args(raw.payload)?;
                Ok(RemoteCommand::Seek {
                    direction,
                    unit: amount,
                })
            }
            "sync" => {
                let SyncArgs { position } = command_args(raw.payload)?;
                Ok(RemoteCommand::Sync { position })
            }
            other => Err(de::Error::unknown_variant(other, COMMAND_TAGS)),
        }
    }
}

// ── Playback state ────────────────────────────────────────────────────────────

/// Snapshot of the teleprompter's playback, broadcast to every remote.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaybackState {
    pub is_playing: bool,
    /// Speed in percent, `1..=100`.
    pub speed: u8,
    /// Scroll offset in logical pixels.
    pub position: f64,
    pub script_title: String,
}

// ── Client → relay frames ─────────────────────────────────────────────────────

/// Frames a client sends to the relay.
///
/// ```json
/// {"type":"join","role":"remote","sessionId":"QX7K2M9P"}
/// {"type":"state","payload":{"isPlaying":true,"speed":50,"position":12.5,"scriptTitle":"Intro"}}
/// {"type":"command","payload":{"type":"pause"}}
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ClientMessage {
    /// Handshake: declares the connection's role.  Must be the first frame.
    Join {
        role: Role,
        #[serde(rename = "sessionId")]
        session_id: SessionId,
    },
    /// Teleprompter → remotes.
    State { payload: PlaybackState },
    /// Remote → teleprompter.
    Command { payload: RemoteCommand },
}

// ── Relay → client notices ────────────────────────────────────────────────────

/// Frames the relay itself originates.
///
/// ```json
/// {"type":"joined","role":"remote","sessionId":"QX7K2M9P","teleprompterPresent":true,"remotes":0}
/// {"type":"peer_connected","role":"teleprompter"}
/// {"type":"peer_disconnected","role":"remote"}
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RelayNotice {
    /// Acknowledges a `join`.  Sent only to the joining connection.
    Joined {
        role: Role,
        #[serde(rename = "sessionId")]
        session_id: SessionId,
        /// Whether a live teleprompter was already in the session.
        #[serde(rename = "teleprompterPresent")]
        teleprompter_present: bool,
        /// Number of live remotes already in the session (excluding the joiner).
        remotes: usize,
    },
    /// A participant with `role` is now present.
    PeerConnected { role: Role },
    /// A participant with `role` has left.
    PeerDisconnected { role: Role },
}

// ── Close codes ───────────────────────────────────────────────────────────────

/// Application close codes the relay uses when it ends a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RelayCloseCode {
    /// The request path was not `/session/{id}`.
    BadPath,
    /// A live teleprompter already occupies the session.
    SlotOccupied,
    /// The session was idle past the expiry window.
    SessionExpired,
}

impl RelayCloseCode {
    /// Returns the numeric WebSocket close code.
    pub fn code(self) -> u16 {
        match self {
            RelayCloseCode::BadPath => 4000,
            RelayCloseCode::SlotOccupied => 4001,
            RelayCloseCode::SessionExpired => 4002,
        }
    }

    /// Maps a numeric close code back to a relay close reason.
    pub fn from_code(code: u16) -> Option<Self> {
        match code {
            4000 => Some(RelayCloseCode::BadPath),
            4001 => Some(RelayCloseCode::SlotOccupied),
            4002 => Some(RelayCloseCode::SessionExpired),
            _ => None,
        }
    }

    /// Human-readable close reason sent alongside the code.
    pub fn reason(self) -> &'static str {
        match self {
            RelayCloseCode::BadPath => "Invalid path. Use /session/{sessionId}",
            RelayCloseCode::SlotOccupied => "Session already has a teleprompter",
            RelayCloseCode::SessionExpired => "Session expired",
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
