//! Infrastructure layer for lumo-relay.
//!
//! Everything that touches a socket or a timer: the accept loop, the
//! per-connection reader/writer/heartbeat tasks, and the idle sweep.

pub mod connection;
pub mod ws_server;

pub use connection::{ConnectionHandle, Outbound};
pub use ws_server::{run_server, RelayServer, SharedRegistry};
