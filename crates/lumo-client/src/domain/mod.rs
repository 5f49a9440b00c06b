//! Domain layer for lumo-client: configuration and settings snapshots.
//!
//! No I/O here.  Loading the config file is done by `infrastructure::storage`.

pub mod config;
pub mod settings;

pub use config::{ClientConfig, RelaySettings};
pub use settings::{PlaybackSettings, Script, TextSettings};
