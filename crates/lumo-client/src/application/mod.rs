//! Application layer for the client: logic without I/O.
//!
//! - **`playback`** – the teleprompter's scroll state machine, driven by
//!   ticks and remote commands.
//! - **`remote_control`** – turns remote-screen gestures into commands and
//!   mirrors the teleprompter's reported state.
//! - **`subscribers`** – the ordered handler registry both of the above and
//!   the connection manager publish through.

pub mod playback;
pub mod remote_control;
pub mod subscribers;

pub use playback::{PlaybackEngine, SpeedCell, StateSink, TickOutcome};
pub use remote_control::{CommandSink, RemoteController};
pub use subscribers::{Subscribers, Subscription};
