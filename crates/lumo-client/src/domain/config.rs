//! Client configuration schema.
//!
//! Loaded from a TOML file by `infrastructure::storage`.  Every field has a
//! serde default so a partial file (or none at all) works:
//!
//! ```toml
//! frame_rate = 60
//!
//! [relay]
//! url = "ws://192.168.1.20:10000"
//! connect_timeout_secs = 10
//!
//! [text]
//! font_size = 48.0
//!
//! [playback]
//! speed = 40
//! mirror_horizontal = true
//! ```

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::domain::settings::{PlaybackSettings, TextSettings};

/// Top-level client configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Playback ticks per second on the teleprompter.
    #[serde(default = "default_frame_rate")]
    pub frame_rate: u32,
    #[serde(default)]
    pub relay: RelaySettings,
    #[serde(default)]
    pub text: TextSettings,
    #[serde(default)]
    pub playback: PlaybackSettings,
}

/// How to reach the relay and how to behave when the link drops.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelaySettings {
    /// Base WebSocket URL of the relay, without the session path.
    #[serde(default = "default_url")]
    pub url: String,
    /// Upper bound on connect plus join acknowledgement.
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
    /// Delay before each reconnect attempt after an unexpected close.
    #[serde(default = "default_reconnect_delay_secs")]
    pub reconnect_delay_secs: u64,
    /// Frames buffered for sending before new ones are dropped.
    #[serde(default = "default_outbound_queue")]
    pub outbound_queue: usize,
}

impl RelaySettings {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_secs(self.reconnect_delay_secs)
    }
}

fn default_frame_rate() -> u32 {
    60
}
fn default_url() -> String {
    "ws://127.0.0.1:10000".to_string()
}
fn default_connect_timeout_secs() -> u64 {
    10
}
fn default_reconnect_delay_secs() -> u64 {
    3
}
fn default_outbound_queue() -> usize {
    64
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            frame_rate: default_frame_rate(),
            relay: RelaySettings::default(),
            text: TextSettings::default(),
            playback: PlaybackSettings::default(),
        }
    }
}

impl Default for RelaySettings {
    fn default() -> Self {
        Self {
            url: default_url(),
            connect_timeout_secs: default_connect_timeout_secs(),
            reconnect_delay_secs: default_reconnect_delay_secs(),
            outbound_queue: default_outbound_queue(),
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
