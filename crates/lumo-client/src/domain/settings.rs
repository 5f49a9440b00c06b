//! Settings and script snapshots the client reads at session start.
//!
//! These are owned by whatever stores the user's preferences; the client only
//! ever reads an immutable snapshot.  Field defaults match the values a fresh
//! install starts with.

use serde::{Deserialize, Serialize};

use lumo_core::protocol::messages::{MAX_SPEED_PERCENT, MIN_SPEED_PERCENT};

/// Typography and colours of the scrolling text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextSettings {
    /// Font size in logical pixels.
    #[serde(default = "default_font_size")]
    pub font_size: f64,
    /// Line height as a multiple of `font_size`.
    #[serde(default = "default_line_height")]
    pub line_height: f64,
    /// Extra space between paragraphs, in logical pixels.
    #[serde(default = "default_paragraph_spacing")]
    pub paragraph_spacing: f64,
    #[serde(default = "default_font_family")]
    pub font_family: String,
    #[serde(default = "default_text_color")]
    pub text_color: String,
    #[serde(default = "default_background_color")]
    pub background_color: String,
}

impl TextSettings {
    /// Height of one rendered line in logical pixels.
    pub fn line_pixels(&self) -> f64 {
        self.font_size * self.line_height
    }

    /// Approximate rendered height of `content` wrapped at `columns`
    /// characters.  For hosts with no renderer to report real metrics.
    pub fn estimate_height(&self, content: &str, columns: usize) -> f64 {
        let columns = columns.max(1);
        let mut lines = 0usize;
        let mut paragraphs = 0usize;
        for paragraph in content.split("\n\n").filter(|p| !p.trim().is_empty()) {
            paragraphs += 1;
            for line in paragraph.lines() {
                lines += line.chars().count().div_ceil(columns).max(1);
            }
        }
        lines as f64 * self.line_pixels()
            + paragraphs.saturating_sub(1) as f64 * self.paragraph_spacing
    }
}

/// Playback preferences.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlaybackSettings {
    /// Initial scroll speed in percent.
    #[serde(default = "default_speed")]
    pub speed: u8,
    #[serde(default)]
    pub mirror_horizontal: bool,
    #[serde(default)]
    pub mirror_vertical: bool,
}

impl PlaybackSettings {
    /// The initial speed, clamped to the accepted range.
    pub fn initial_speed(&self) -> u8 {
        self.speed.clamp(MIN_SPEED_PERCENT, MAX_SPEED_PERCENT)
    }
}

/// The script being presented.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Script {
    pub id: String,
    pub title: String,
    pub content: String,
    /// Last modification time, seconds since the Unix epoch.
    pub updated_at: u64,
}

// ── Default helpers ───────────────────────────────────────────────────────────

fn default_font_size() -> f64 {
    42.0
}
fn default_line_height() -> f64 {
    1.6
}
fn default_paragraph_spacing() -> f64 {
    24.0
}
fn default_font_family() -> String {
    "System".to_string()
}
fn default_text_color() -> String {
    "#FFFFFF".to_string()
}
fn default_background_color() -> String {
    "#000000".to_string()
}
fn default_speed() -> u8 {
    50
}

impl Default for TextSettings {
    fn default() -> Self {
        Self {
            font_size: default_font_size(),
            line_height: default_line_height(),
            paragraph_spacing: default_paragraph_spacing(),
            font_family: default_font_family(),
            text_color: default_text_color(),
            background_color: default_background_color(),
        }
    }
}

impl Default for PlaybackSettings {
    fn default() -> Self {
        Self {
            speed: default_speed(),
            mirror_horizontal: false,
            mirror_vertical: false,
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
