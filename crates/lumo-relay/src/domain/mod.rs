//! Domain layer for lumo-relay.
//!
//! Pure configuration types with no I/O.  The wire types the relay speaks live
//! in `lumo-core` because the clients need them too.

pub mod config;

pub use config::{RelayConfig, DEFAULT_PORT};
