//! Remote controller: turns remote-screen gestures into commands.
//!
//! The controller mirrors the teleprompter's last reported state so that
//! `toggle` and the speed buttons act on what the teleprompter is actually
//! doing rather than on what this remote last asked for.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use lumo_core::protocol::messages::{PlaybackState, RemoteCommand, SeekDirection, SeekUnit};
use tracing::debug;

use crate::application::playback::SpeedCell;
use crate::application::subscribers::Subscription;
use crate::domain::settings::PlaybackSettings;

/// Change applied by one press of a speed button.
pub const SPEED_STEP: i16 = 10;

/// Where gestures are sent.  Must not block.
#[cfg_attr(test, mockall::automock)]
pub trait CommandSink: Send + Sync {
    /// Returns `false` if the command was dropped.
    fn send_command(&self, command: RemoteCommand) -> bool;
}

pub struct RemoteController {
    sink: Arc<dyn CommandSink>,
    latest: Mutex<Option<PlaybackState>>,
    speed: SpeedCell,
    /// State feed that calls [`observe`](Self::observe); removed on drop.
    feed: Mutex<Option<Subscription>>,
}

impl RemoteController {
    pub fn new(sink: Arc<dyn CommandSink>) -> Self {
        Self {
            sink,
            latest: Mutex::new(None),
            speed: SpeedCell::new(PlaybackSettings::default().initial_speed()),
            feed: Mutex::new(None),
        }
    }

    /// Ties the state-update subscription that feeds this controller to its
    /// lifetime.  A previously attached feed is unsubscribed.
    pub fn attach(&self, feed: Subscription) {
        let previous = self
            .feed
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .replace(feed);
        if let Some(previous) = previous {
            previous.unsubscribe();
        }
    }

    /// Records a state update from the teleprompter.
    pub fn observe(&self, state: &PlaybackState) {
        self.speed.set(state.speed);
        *self.latest() = Some(state.clone());
    }

    /// The teleprompter's last reported state, if any arrived yet.
    pub fn latest_state(&self) -> Option<PlaybackState> {
        self.latest().clone()
    }

    /// Local speed mirror.  Follows the teleprompter and this remote's own
    /// speed changes.
    pub fn speed(&self) -> u8 {
        self.speed.get()
    }

    pub fn is_playing(&self) -> bool {
        self.latest().as_ref().is_some_and(|s| s.is_playing)
    }

    // ── Gestures ─────────────────────────────────────────────────────────────

    pub fn play(&self) -> bool {
        self.send(RemoteCommand::Play)
    }

    pub fn pause(&self) -> bool {
        self.send(RemoteCommand::Pause)
    }

    pub fn stop(&self) -> bool {
        self.send(RemoteCommand::Stop)
    }

    /// Pauses if the teleprompter reported playing, plays otherwise.
    pub fn toggle(&self) -> bool {
        if self.is_playing() {
            self.pause()
        } else {
            self.play()
        }
    }

    pub fn set_speed(&self, percent: u8) -> bool {
        let speed = self.speed.set(percent);
        self.send(RemoteCommand::Speed { speed })
    }

    /// Adds `delta` to the mirrored speed and sends the clamped result.
    pub fn nudge_speed(&self, delta: i16) -> bool {
        let next = (i16::from(self.speed()) + delta).clamp(0, i16::from(u8::MAX));
        self.set_speed(u8::try_from(next).unwrap_or(u8::MAX))
    }

    pub fn seek_forward(&self) -> bool {
        self.seek(SeekDirection::Forward)
    }

    pub fn seek_backward(&self) -> bool {
        self.seek(SeekDirection::Backward)
    }

    /// Asks the teleprompter to re-broadcast its state.
    pub fn request_status(&self) -> bool {
        self.send(RemoteCommand::Status)
    }

    /// One-line status for the remote's display.
    pub fn render(&self) -> String {
        match self.latest().as_ref() {
            None => "waiting for teleprompter".to_string(),
            Some(state) => format!(
                "{} | {} | speed {}% | {:.0}px",
                if state.script_title.is_empty() {
                    "untitled"
                } else {
                    state.script_title.as_str()
                },
                if state.is_playing { "playing" } else { "paused" },
                state.speed,
                state.position,
            ),
        }
    }

    fn seek(&self, direction: SeekDirection) -> bool {
        self.send(RemoteCommand::Seek {
            direction,
            unit: SeekUnit::Line,
        })
    }

    fn send(&self, command: RemoteCommand) -> bool {
        let name = command.type_name();
        let sent = self.sink.send_command(command);
        if !sent {
            debug!("{name} not sent: link down or queue full");
        }
        sent
    }

    fn latest(&self) -> MutexGuard<'_, Option<PlaybackState>> {
        self.latest.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for RemoteController {
    fn drop(&mut self) {
        let feed = self
            .feed
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(feed) = feed {
            feed.unsubscribe();
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
