//! lumo-client library entry point.
//!
//! Re-exports all public modules so that integration tests in `tests/`
//! and the binary entry point in `main.rs` share the same module tree.
//!
//! # What does lumo-client do? (for beginners)
//!
//! A Lumo session has one *teleprompter* (the screen the presenter reads) and
//! any number of *remotes* (phones or laptops that steer it).  Neither side
//! talks to the other directly: both connect to the relay under a shared
//! eight-character session code and the relay forwards frames between them.
//!
//! On the teleprompter:
//!
//! 1. [`ConnectionManager::connect_as_teleprompter`] creates a session and
//!    returns its code for the presenter to share.
//! 2. The [`PlaybackEngine`] scrolls the script, ticked by the frame clock.
//! 3. Commands from remotes arrive through `on_message` and are applied with
//!    [`PlaybackEngine::apply_command`].
//! 4. Every change is broadcast back as a `state` frame.
//!
//! On a remote:
//!
//! 1. [`ConnectionManager::connect_as_remote`] joins with the shared code.
//! 2. The [`RemoteController`] turns button presses into commands and keeps
//!    the teleprompter's last reported state for display.
//!
//! [`ConnectionManager::connect_as_teleprompter`]: infrastructure::ConnectionManager::connect_as_teleprompter
//! [`ConnectionManager::connect_as_remote`]: infrastructure::ConnectionManager::connect_as_remote
//! [`PlaybackEngine`]: application::PlaybackEngine
//! [`PlaybackEngine::apply_command`]: application::PlaybackEngine::apply_command
//! [`RemoteController`]: application::RemoteController

/// Domain layer: config and settings snapshots.
pub mod domain;

/// Application layer: playback, remote control and subscriber registries.
pub mod application;

/// Infrastructure layer: relay link, frame clock and file storage.
pub mod infrastructure;
