//! Frame classification and encoding for the JSON wire protocol.
//!
//! The relay and the clients read the same frames with different needs:
//!
//! - The relay only needs the envelope: which `type` a frame has, and for
//!   `join` the declared role.  It forwards everything else byte-for-byte, so
//!   [`classify_client_frame`] deliberately does not parse payloads.
//! - A client needs the typed content.  [`decode_relay_frame`] turns a text
//!   frame received from the relay into a [`RelayEvent`].
//!
//! Both functions return `None` for anything they do not understand.
//! Malformed or unknown input from a peer is never an error: it is dropped.

use serde::Deserialize;

use crate::domain::SessionId;
use crate::protocol::messages::{ClientMessage, PlaybackState, RelayNotice, RemoteCommand, Role};

/// Path prefix under which the relay accepts WebSocket upgrades.
pub const SESSION_PATH_PREFIX: &str = "/session/";

// ── Relay side: envelope classification ──────────────────────────────────────

/// The direct command tags a legacy remote sends without a `command` envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LegacyCommandKind {
    Play,
    Pause,
    Stop,
    Speed,
    Seek,
}

impl LegacyCommandKind {
    fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "play" => Some(Self::Play),
            "pause" => Some(Self::Pause),
            "stop" => Some(Self::Stop),
            "speed" => Some(Self::Speed),
            "seek" => Some(Self::Seek),
            _ => None,
        }
    }

    /// Returns the wire tag.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Play => "play",
            Self::Pause => "pause",
            Self::Stop => "stop",
            Self::Speed => "speed",
            Self::Seek => "seek",
        }
    }
}

/// What the relay needs to know about an inbound client frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientFrame {
    /// A handshake.  `session_id` is whatever the client put in the body; the
    /// connection path is authoritative.
    Join {
        role: Role,
        session_id: Option<String>,
    },
    /// A playback-state snapshot (teleprompter → remotes).
    State,
    /// A command wrapped in a `command` envelope (remote → teleprompter).
    Command,
    /// A bare command frame in the legacy direct form (remote → teleprompter).
    LegacyCommand(LegacyCommandKind),
}

impl ClientFrame {
    /// Short name for log lines.  Never includes payload content.
    pub fn type_name(&self) -> &'static str {
        match self {
            ClientFrame::Join { .. } => "join",
            ClientFrame::State => "state",
            ClientFrame::Command => "command",
            ClientFrame::LegacyCommand(kind) => kind.as_str(),
        }
    }
}

#[derive(Deserialize)]
struct Envelope<'a> {
    #[serde(rename = "type", borrow)]
    kind: std::borrow::Cow<'a, str>,
    #[serde(default)]
    role: Option<Role>,
    #[serde(default, rename = "sessionId")]
    session_id: Option<String>,
}

/// Classifies a text frame received by the relay.
///
/// Returns `None` for invalid JSON, a missing `type`, an unknown `type`, or a
/// `join` without a valid `role`.
pub fn classify_client_frame(text: &str) -> Option<ClientFrame> {
    let envelope: Envelope<'_> = serde_json::from_str(text).ok()?;
    match envelope.kind.as_ref() {
        "join" => Some(ClientFrame::Join {
            role: envelope.role?,
            session_id: envelope.session_id,
        }),
        "state" => Some(ClientFrame::State),
        "command" => Some(ClientFrame::Command),
        other => LegacyCommandKind::from_tag(other).map(ClientFrame::LegacyCommand),
    }
}

// ── Client side: typed decoding ───────────────────────────────────────────────

/// A decoded frame received by a client from the relay.
#[derive(Debug, Clone, PartialEq)]
pub enum RelayEvent {
    /// A notice originated by the relay.
    Notice(RelayNotice),
    /// A playback-state snapshot forwarded from the teleprompter.
    State(PlaybackState),
    /// A command forwarded from a remote (either envelope form).
    Command(RemoteCommand),
}

#[derive(Deserialize)]
struct Tagged<'a> {
    #[serde(rename = "type", borrow)]
    kind: std::borrow::Cow<'a, str>,
}

#[derive(Deserialize)]
struct Wrapped<T> {
    payload: T,
}

/// Decodes a text frame a client received from the relay.
///
/// Understands relay notices, `state` and `command` envelopes, and the legacy
/// direct command form.  Returns `None` for anything else.
pub fn decode_relay_frame(text: &str) -> Option<RelayEvent> {
    let tagged: Tagged<'_> = serde_json::from_str(text).ok()?;
    match tagged.kind.as_ref() {
        "joined" | "peer_connected" | "peer_disconnected" => {
            serde_json::from_str::<RelayNotice>(text)
                .ok()
                .map(RelayEvent::Notice)
        }
        "state" => serde_json::from_str::<Wrapped<PlaybackState>>(text)
            .ok()
            .map(|w| RelayEvent::State(w.payload)),
        "command" => serde_json::from_str::<Wrapped<RemoteCommand>>(text)
            .ok()
            .map(|w| RelayEvent::Command(w.payload)),
        other if LegacyCommandKind::from_tag(other).is_some() => {
            serde_json::from_str::<RemoteCommand>(text)
                .ok()
                .map(RelayEvent::Command)
        }
        _ => None,
    }
}

// ── Encoding ─────────────────────────────────────────────────────────────────

/// Serialises a client message into a text frame.
///
/// Every type in [`ClientMessage`] serialises infallibly (no maps with
/// non-string keys); the `Result` is kept so callers do not need to rely on
/// that.
pub fn encode_client_message(msg: &ClientMessage) -> Result<String, serde_json::Error> {
    serde_json::to_string(msg)
}

/// Serialises a relay notice into a text frame.
pub fn encode_notice(notice: &RelayNotice) -> Result<String, serde_json::Error> {
    serde_json::to_string(notice)
}

// ── Connection path ───────────────────────────────────────────────────────────

/// Builds the path a client connects to for `session_id`.
pub fn session_path(session_id: &SessionId) -> String {
    format!("{SESSION_PATH_PREFIX}{session_id}")
}

/// Extracts the session identifier from a request path.
///
/// Accepts `/session/{id}` with an optional trailing slash.  Anything else,
/// including extra path segments, yields `None`.
pub fn parse_session_path(path: &str) -> Option<SessionId> {
    let mut parts = path.split('/').filter(|p| !p.is_empty());
    if parts.next()? != "session" {
        return None;
    }
    let segment = parts.next()?;
    if parts.next().is_some() {
        return None;
    }
    SessionId::from_path_segment(segment)
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::messages::{SeekDirection, SeekUnit};

    #[test]
    fn test_classify_join() {
        let frame =
            classify_client_frame(r#"{"type":"join","role":"teleprompter","sessionId":"AB"}"#);
        assert_eq!(
            frame,
            Some(ClientFrame::Join {
                role: Role::Teleprompter,
                session_id: Some("AB".to_string()),
            })
        );
    }

    #[test]
    fn test_classify_join_without_role_is_dropped() {
        assert_eq!(classify_client_frame(r#"{"type":"join"}"#), None);
        assert_eq!(
            classify_client_frame(r#"{"type":"join","role":"spectator"}"#),
            None
        );
    }

    #[test]
    fn test_classify_state_ignores_payload_content() {
        // The relay must not care what is inside the payload.
        let frame = classify_client_frame(r#"{"type":"state","payload":{"anything":[1,2]}}"#);
        assert_eq!(frame, Some(ClientFrame::State));
    }

    #[test]
    fn test_classify_legacy_direct_commands() {
        for tag in ["play", "pause", "stop", "speed", "seek"] {
            let text = format!(r#"{{"type":"{tag}"}}"#);
            let frame = classify_client_frame(&text).unwrap();
            assert_eq!(frame.type_name(), tag);
        }
    }

    #[test]
    fn test_classify_rejects_garbage() {
        assert_eq!(classify_client_frame("not json"), None);
        assert_eq!(classify_client_frame(r#"{"role":"remote"}"#), None);
        assert_eq!(classify_client_frame(r#"{"type":"dance"}"#), None);
        assert_eq!(classify_client_frame("[1,2,3]"), None);
    }

    #[test]
    fn test_decode_forwarded_state() {
        let text = r#"{"type":"state","payload":{"isPlaying":false,"speed":80,"position":0,"scriptTitle":"T"}}"#;
        let event = decode_relay_frame(text).unwrap();
        assert_eq!(
            event,
            RelayEvent::State(PlaybackState {
                is_playing: false,
                speed: 80,
                position: 0.0,
                script_title: "T".to_string(),
            })
        );
    }

    #[test]
    fn test_decode_command_envelope_and_legacy_form_agree() {
        let wrapped = decode_relay_frame(
            r#"{"type":"command","payload":{"type":"seek","payload":{"direction":"forward","amount":"line"}}}"#,
        );
        let legacy = decode_relay_frame(
            r#"{"type":"seek","payload":{"direction":"forward","amount":"line"}}"#,
        );
        let expected = RelayEvent::Command(RemoteCommand::Seek {
            direction: SeekDirection::Forward,
            unit: SeekUnit::Line,
        });
        assert_eq!(wrapped, Some(expected.clone()));
        assert_eq!(legacy, Some(expected));
    }

    #[test]
    fn test_decode_legacy_speed_scenario_frame() {
        let event = decode_relay_frame(r#"{"type":"speed","payload":{"speed":80}}"#);
        assert_eq!(
            event,
            Some(RelayEvent::Command(RemoteCommand::Speed { speed: 80 }))
        );
    }

    #[test]
    fn test_decode_peer_notices() {
        let event = decode_relay_frame(r#"{"type":"peer_disconnected","role":"teleprompter"}"#);
        assert_eq!(
            event,
            Some(RelayEvent::Notice(RelayNotice::PeerDisconnected {
                role: Role::Teleprompter
            }))
        );
    }

    #[test]
    fn test_decode_unknown_or_malformed_is_none() {
        assert_eq!(decode_relay_frame(r#"{"type":"error","message":"x"}"#), None);
        assert_eq!(decode_relay_frame(r#"{"type":"state","payload":7}"#), None);
        assert_eq!(decode_relay_frame("{"), None);
    }

    #[test]
    fn test_parse_session_path() {
        assert_eq!(
            parse_session_path("/session/qx7k2m9p").map(|s| s.to_string()),
            Some("QX7K2M9P".to_string())
        );
        assert!(parse_session_path("/session/QX7K2M9P/").is_some());
        assert!(parse_session_path("/session/").is_none());
        assert!(parse_session_path("/").is_none());
        assert!(parse_session_path("/rooms/ABC").is_none());
        assert!(parse_session_path("/session/ABC/extra").is_none());
    }

    #[test]
    fn test_session_path_round_trips_through_parser() {
        let id = SessionId::generate();
        assert_eq!(parse_session_path(&session_path(&id)), Some(id));
    }
}
