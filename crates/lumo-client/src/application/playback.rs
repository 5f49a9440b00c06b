//! Playback engine: the teleprompter's scroll position over time.
//!
//! # How a tick works (for beginners)
//!
//! The display calls [`PlaybackEngine::tick`] once per refresh with the
//! current time.  While playing, each tick:
//!
//! 1. measures the time since the previous tick, capped at 100 ms so a stall
//!    (e.g. the window was hidden) does not make the text jump,
//! 2. converts the speed percentage into pixels per second
//!    (`speed / 100 * 150`),
//! 3. during the first 1.5 s after starting, scales that speed by
//!    `progress²` so scrolling eases in instead of lurching,
//! 4. advances the position and clamps it to the scrollable range.
//!
//! Reaching the end pauses the engine.  The very first tick after starting
//! only records the clock and moves nothing.
//!
//! # Speed is outside the lock
//!
//! The speed lives in a [`SpeedCell`] (an `AtomicU8`).  A remote changing the
//! speed writes it without touching the motion state, and the next tick picks
//! it up.  A speed change never restarts the ease-in ramp.
//!
//! # Locking
//!
//! Everything else sits behind one `std::sync::Mutex`.  Every operation,
//! including a tick, takes it once, so a command that lands between two ticks
//! is applied atomically and a `pause` can never be overtaken by a tick that
//! was already scheduled.  Subscribers and the state sink are called after the
//! lock is released.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use lumo_core::protocol::messages::{
    PlaybackState, RemoteCommand, SeekDirection, SeekUnit, MAX_SPEED_PERCENT, MIN_SPEED_PERCENT,
};
use tracing::{debug, info};

use crate::application::subscribers::{Subscribers, Subscription};
use crate::domain::settings::{PlaybackSettings, TextSettings};

/// Scroll rate at 100 % speed, in logical pixels per second.
pub const BASE_RATE_PX_PER_SEC: f64 = 150.0;

/// Length of the ease-in ramp after each start.
pub const EASE_IN_DURATION: Duration = Duration::from_millis(1500);

/// Largest time step a single tick may apply.
pub const MAX_TICK_DELTA: Duration = Duration::from_millis(100);

/// Lines moved by one `line` seek step.
pub const LINE_SEEK_LINES: f64 = 3.0;

/// Lines moved by one `paragraph` seek step.
pub const PARAGRAPH_SEEK_LINES: f64 = 10.0;

// ── Speed cell ────────────────────────────────────────────────────────────────

/// Lock-free speed percentage, always within `1..=100`.
#[derive(Debug)]
pub struct SpeedCell(AtomicU8);

impl SpeedCell {
    pub fn new(percent: u8) -> Self {
        Self(AtomicU8::new(clamp_speed(percent)))
    }

    pub fn get(&self) -> u8 {
        self.0.load(Ordering::Relaxed)
    }

    /// Stores `percent` clamped to the valid range and returns what was stored.
    pub fn set(&self, percent: u8) -> u8 {
        let clamped = clamp_speed(percent);
        self.0.store(clamped, Ordering::Relaxed);
        clamped
    }
}

fn clamp_speed(percent: u8) -> u8 {
    percent.clamp(MIN_SPEED_PERCENT, MAX_SPEED_PERCENT)
}

// ── State sink ────────────────────────────────────────────────────────────────

/// Where playback snapshots go.  Must not block.
#[cfg_attr(test, mockall::automock)]
pub trait StateSink: Send + Sync {
    fn broadcast_state(&self, state: PlaybackState);
}

/// What a tick did.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TickOutcome {
    /// Nothing moved: paused, first tick after starting, or no layout yet.
    Idle,
    /// The position advanced to this value.
    Advanced(f64),
    /// The end was reached at this position and the engine paused.
    ReachedEnd(f64),
}

// ── Engine ────────────────────────────────────────────────────────────────────

#[derive(Debug, Default)]
struct Motion {
    playing: bool,
    position: f64,
    ease_start: Option<Instant>,
    has_eased_in: bool,
    last_tick: Option<Instant>,
    content_height: f64,
    viewport_height: f64,
}

impl Motion {
    fn max_scroll(&self) -> f64 {
        (self.content_height - self.viewport_height).max(0.0)
    }

    fn rearm(&mut self) {
        self.has_eased_in = false;
        self.ease_start = None;
        self.last_tick = None;
    }

    fn clamp(&self, position: f64) -> f64 {
        position.clamp(0.0, self.max_scroll())
    }
}

/// Teleprompter playback state machine.
pub struct PlaybackEngine {
    speed: SpeedCell,
    motion: Mutex<Motion>,
    text: TextSettings,
    playback: PlaybackSettings,
    script_title: String,
    sink: Option<Arc<dyn StateSink>>,
    position_subscribers: Arc<Subscribers<f64>>,
}

impl PlaybackEngine {
    /// Creates a paused engine at position 0 with the configured initial speed.
    pub fn new(text: TextSettings, playback: PlaybackSettings, script_title: impl Into<String>) -> Self {
        Self {
            speed: SpeedCell::new(playback.initial_speed()),
            motion: Mutex::new(Motion::default()),
            text,
            playback,
            script_title: script_title.into(),
            sink: None,
            position_subscribers: Subscribers::new(),
        }
    }

    /// Sends a snapshot to `sink` after every change.
    pub fn with_sink(mut self, sink: Arc<dyn StateSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    // ── Read access ──────────────────────────────────────────────────────────

    pub fn is_playing(&self) -> bool {
        self.motion().playing
    }

    pub fn position(&self) -> f64 {
        self.motion().position
    }

    pub fn speed(&self) -> u8 {
        self.speed.get()
    }

    /// Whether the ease-in ramp has completed for the current play session.
    pub fn has_eased_in(&self) -> bool {
        self.motion().has_eased_in
    }

    pub fn max_scroll(&self) -> f64 {
        self.motion().max_scroll()
    }

    pub fn text_settings(&self) -> &TextSettings {
        &self.text
    }

    /// Mirroring flags and initial speed, for the renderer.
    pub fn playback_settings(&self) -> &PlaybackSettings {
        &self.playback
    }

    pub fn script_title(&self) -> &str {
        &self.script_title
    }

    /// The snapshot remotes see.
    pub fn snapshot(&self) -> PlaybackState {
        let m = self.motion();
        self.snapshot_of(&m)
    }

    /// Calls `handler` with the new position after every change.
    pub fn on_position_change<F>(&self, handler: F) -> Subscription
    where
        F: Fn(&f64) + Send + Sync + 'static,
    {
        self.position_subscribers.subscribe(handler)
    }

    // ── Transitions ──────────────────────────────────────────────────────────

    /// Starts scrolling.  The ramp restarts unless already playing.
    pub fn play(&self) {
        let state = {
            let mut m = self.motion();
            if !m.playing {
                m.playing = true;
                m.rearm();
            }
            self.snapshot_of(&m)
        };
        debug!("playback: play");
        self.broadcast(state);
    }

    /// Stops scrolling and keeps the position.  The next play re-ramps.
    pub fn pause(&self) {
        let state = {
            let mut m = self.motion();
            m.playing = false;
            m.rearm();
            self.snapshot_of(&m)
        };
        debug!("playback: pause");
        self.broadcast(state);
    }

    /// Stops scrolling and rewinds to the top.
    pub fn stop(&self) {
        let state = {
            let mut m = self.motion();
            m.playing = false;
            m.rearm();
            m.position = 0.0;
            self.snapshot_of(&m)
        };
        debug!("playback: stop");
        self.position_subscribers.notify(&0.0);
        self.broadcast(state);
    }

    pub fn toggle(&self) {
        if self.is_playing() {
            self.pause();
        } else {
            self.play();
        }
    }

    /// Changes the speed.  Takes effect on the next tick without re-ramping.
    pub fn set_speed(&self, percent: u8) -> u8 {
        let stored = self.speed.set(percent);
        debug!("playback: speed {stored}");
        self.broadcast(self.snapshot());
        stored
    }

    /// Moves by `lines` rendered lines.  Works in any play state and never
    /// touches the ease-in ramp.
    pub fn seek_by_amount(&self, direction: SeekDirection, lines: f64) -> f64 {
        let amount = lines * self.text.line_pixels();
        let (position, state) = {
            let mut m = self.motion();
            m.position = match direction {
                SeekDirection::Forward => (m.position + amount).min(m.max_scroll()),
                SeekDirection::Backward => (m.position - amount).max(0.0),
            };
            (m.position, self.snapshot_of(&m))
        };
        self.position_subscribers.notify(&position);
        self.broadcast(state);
        position
    }

    /// Receives render metrics from the layout collaborator.
    pub fn set_layout(&self, content_height: f64, viewport_height: f64) {
        let moved = {
            let mut m = self.motion();
            m.content_height = content_height.max(0.0);
            m.viewport_height = viewport_height.max(0.0);
            let clamped = m.clamp(m.position);
            (clamped != m.position).then(|| {
                m.position = clamped;
                clamped
            })
        };
        if let Some(position) = moved {
            self.position_subscribers.notify(&position);
        }
    }

    /// Accepts an externally driven position, clamped to the scrollable range.
    pub fn set_position(&self, position: f64) -> f64 {
        let (position, state) = {
            let mut m = self.motion();
            m.position = m.clamp(position);
            (m.position, self.snapshot_of(&m))
        };
        self.position_subscribers.notify(&position);
        self.broadcast(state);
        position
    }

    /// Applies a command received from a remote.
    pub fn apply_command(&self, command: &RemoteCommand) {
        info!("applying remote command: {}", command.type_name());
        match command {
            RemoteCommand::Play => self.play(),
            RemoteCommand::Pause => self.pause(),
            RemoteCommand::Stop => self.stop(),
            RemoteCommand::Speed { speed } => {
                self.set_speed(*speed);
            }
            RemoteCommand::Seek { direction, unit } => {
                let lines = match unit {
                    SeekUnit::Line => LINE_SEEK_LINES,
                    SeekUnit::Paragraph => PARAGRAPH_SEEK_LINES,
                };
                self.seek_by_amount(*direction, lines);
            }
            RemoteCommand::Status => self.broadcast(self.snapshot()),
            RemoteCommand::Sync { position } => {
                self.set_position(*position);
            }
        }
    }

    // ── Tick ─────────────────────────────────────────────────────────────────

    /// Advances playback to `now`.
    pub fn tick(&self, now: Instant) -> TickOutcome {
        let (outcome, state) = {
            let mut m = self.motion();
            let outcome = self.advance(&mut m, now);
            (outcome, self.snapshot_of(&m))
        };

        match outcome {
            TickOutcome::Idle => {}
            TickOutcome::Advanced(position) => {
                self.position_subscribers.notify(&position);
                self.broadcast(state);
            }
            TickOutcome::ReachedEnd(position) => {
                info!("playback reached the end at {position:.1}px");
                self.position_subscribers.notify(&position);
                self.broadcast(state);
            }
        }
        outcome
    }

    fn advance(&self, m: &mut Motion, now: Instant) -> TickOutcome {
        if !m.playing {
            return TickOutcome::Idle;
        }
        let max_scroll = m.max_scroll();
        if max_scroll <= 0.0 {
            // Waiting for layout.
            return TickOutcome::Idle;
        }

        let ease_start = *m.ease_start.get_or_insert(now);
        let Some(last) = m.last_tick.replace(now) else {
            return TickOutcome::Idle;
        };
        let dt = now.saturating_duration_since(last).min(MAX_TICK_DELTA).as_secs_f64();

        let target = f64::from(self.speed.get()) / 100.0 * BASE_RATE_PX_PER_SEC;
        let applied = if m.has_eased_in {
            target
        } else {
            let elapsed = now.saturating_duration_since(ease_start);
            let progress = (elapsed.as_secs_f64() / EASE_IN_DURATION.as_secs_f64()).min(1.0);
            if progress >= 1.0 {
                m.has_eased_in = true;
            }
            target * progress * progress
        };

        let next = m.position + applied * dt;
        if next >= max_scroll {
            m.position = max_scroll;
            m.playing = false;
            m.rearm();
            TickOutcome::ReachedEnd(max_scroll)
        } else {
            m.position = next;
            TickOutcome::Advanced(next)
        }
    }

    // ── Helpers ──────────────────────────────────────────────────────────────

    fn motion(&self) -> MutexGuard<'_, Motion> {
        self.motion.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn snapshot_of(&self, m: &Motion) -> PlaybackState {
        PlaybackState {
            is_playing: m.playing,
            speed: self.speed.get(),
            position: m.position,
            script_title: self.script_title.clone(),
        }
    }

    fn broadcast(&self, state: PlaybackState) {
        if let Some(sink) = &self.sink {
            sink.broadcast_state(state);
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
