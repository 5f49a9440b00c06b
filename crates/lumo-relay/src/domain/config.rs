//! Relay configuration types.
//!
//! [`RelayConfig`] is the single source of truth for all runtime settings.
//! `main.rs` fills it from CLI flags and environment variables; tests build
//! it directly with short intervals.

use std::net::{Ipv4Addr, SocketAddr};
use std::time::Duration;

/// Default TCP port the relay listens on.
pub const DEFAULT_PORT: u16 = 10000;

/// All runtime configuration for the relay.
///
/// # Example
///
/// ```rust
/// use lumo_relay::domain::RelayConfig;
///
/// let cfg = RelayConfig::default();
/// assert_eq!(cfg.bind_addr.port(), 10000);
/// ```
#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// Address the WebSocket listener binds to.  Port `0` picks a free port.
    pub bind_addr: SocketAddr,

    /// How often each connection is pinged.  A connection that has not
    /// answered the previous ping when the next one is due is terminated.
    pub heartbeat_interval: Duration,

    /// Sessions with no activity for longer than this are expired.
    pub session_max_idle: Duration,

    /// How often the idle-session sweep runs.
    pub sweep_interval: Duration,

    /// Capacity of each connection's outbound frame queue.  Frames that do
    /// not fit are dropped for that recipient only.
    pub outbound_queue: usize,
}

impl Default for RelayConfig {
    /// | Field              | Default          |
    /// |--------------------|------------------|
    /// | bind_addr          | `0.0.0.0:10000`  |
    /// | heartbeat_interval | 30 seconds       |
    /// | session_max_idle   | 1 hour           |
    /// | sweep_interval     | 60 seconds       |
    /// | outbound_queue     | 64 frames        |
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from((Ipv4Addr::UNSPECIFIED, DEFAULT_PORT)),
            heartbeat_interval: Duration::from_secs(30),
            session_max_idle: Duration::from_secs(60 * 60),
            sweep_interval: Duration::from_secs(60),
            outbound_queue: 64,
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_port_is_10000() {
        // Arrange / Act
        let cfg = RelayConfig::default();
        // Assert
        assert_eq!(cfg.bind_addr.port(), 10000);
        assert!(cfg.bind_addr.ip().is_unspecified());
    }

    #[test]
    fn test_default_timers() {
        let cfg = RelayConfig::default();
        assert_eq!(cfg.heartbeat_interval, Duration::from_secs(30));
        assert_eq!(cfg.session_max_idle, Duration::from_secs(3600));
        assert_eq!(cfg.sweep_interval, Duration::from_secs(60));
    }

    #[test]
    fn test_default_outbound_queue_is_nonzero() {
        assert!(RelayConfig::default().outbound_queue > 0);
    }
}
