//! Frame clock: drives [`PlaybackEngine::tick`] at a fixed rate.
//!
//! Stands in for the display refresh callback on a headless teleprompter.
//! Missed frames are skipped, not replayed in a burst; the engine's delta
//! clamp covers the gap.

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::time::Duration;

use tokio::time::{interval, MissedTickBehavior};
use tracing::debug;

use crate::application::playback::PlaybackEngine;

/// Interval between frames for `frame_rate` ticks per second.
pub fn frame_period(frame_rate: u32) -> Duration {
    Duration::from_secs(1) / frame_rate.max(1)
}

/// Ticks `engine` every frame until `running` is cleared.
pub async fn run_frame_loop(engine: Arc<PlaybackEngine>, frame_rate: u32, running: Arc<AtomicBool>) {
    let period = frame_period(frame_rate);
    let mut frames = interval(period);
    frames.set_missed_tick_behavior(MissedTickBehavior::Skip);
    debug!("frame clock running every {period:?}");

    while running.load(Ordering::Relaxed) {
        let now = frames.tick().await;
        engine.tick(now.into_std());
    }
    debug!("frame clock stopped");
}

// ── Tests ─────────────────────────────────────────────────────────────────────
