//! lumo-relay library crate.
//!
//! The relay accepts WebSocket connections on `/session/{CODE}`, pairs one
//! teleprompter with any number of remotes per session, and forwards frames
//! between them without interpreting their payloads.
//!
//! # Architecture (clean architecture)
//!
//! ```text
//! Teleprompter ──┐                         ┌── Remote
//!                ▼                         ▼
//! [lumo-relay]
//!   ├── domain/          RelayConfig
//!   ├── application/
//!   │     ├── registry   sessions, routing targets, expiry
//!   │     └── router     per-connection state machine → deliveries
//!   └── infrastructure/
//!         ├── ws_server  accept loop, reader/writer/heartbeat, idle sweep
//!         └── connection outbound queue handle stored in the registry
//! ```
//!
//! # Layer rules
//!
//! - `domain` has no I/O.
//! - `application` depends on `domain` and `lumo-core` only; it is generic
//!   over the link type so it can be tested without sockets.
//! - `infrastructure` depends on all other layers plus `tokio` and
//!   `tokio-tungstenite`.

/// Domain layer: configuration.
pub mod domain;

/// Application layer: session registry and routing.
pub mod application;

/// Infrastructure layer: WebSocket server.
pub mod infrastructure;
