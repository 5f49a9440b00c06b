//! Infrastructure layer for the client application.
//!
//! **Dependency rule**: this layer may depend on `application`, `domain` and
//! `lumo_core`, but MUST NOT be imported by the `application` or domain
//! layers.  The application layer reaches it only through the
//! [`StateSink`](crate::application::StateSink) and
//! [`CommandSink`](crate::application::CommandSink) traits.
//!
//! # Sub-modules
//!
//! - **`connection`** – the WebSocket link to the relay: join handshake,
//!   subscriber fan-out, bounded outbound queue and fixed-delay reconnect.
//! - **`frame_clock`** – a tokio interval that ticks the playback engine.
//! - **`storage`** – TOML config and script files.

pub mod connection;
pub mod frame_clock;
pub mod storage;

pub use connection::{ConnectError, ConnectionManager, PeerEvent};
pub use frame_clock::run_frame_loop;
pub use storage::{load_config, load_script, save_config, ConfigError};
