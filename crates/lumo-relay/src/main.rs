//! Lumo relay: entry point.
//!
//! Pairs one teleprompter with any number of remotes per session and forwards
//! frames between them over WebSocket.  Clients connect to
//! `ws://HOST:PORT/session/{CODE}`.
//!
//! # Usage
//!
//! ```text
//! lumo-relay [OPTIONS]
//!
//! Options:
//!   --bind <ADDR>                 Address to listen on [default: 0.0.0.0]
//!   --port <PORT>                 TCP port [default: 10000]
//!   --heartbeat-interval <SECS>   Ping interval [default: 30]
//!   --session-max-idle <SECS>     Idle time before a session expires [default: 3600]
//!   --sweep-interval <SECS>       How often idle sessions are swept [default: 60]
//!   --outbound-queue <FRAMES>     Per-connection outbound queue size [default: 64]
//! ```
//!
//! # Environment variable overrides
//!
//! | Variable                  | Default   |
//! |---------------------------|-----------|
//! | `LUMO_RELAY_BIND`         | `0.0.0.0` |
//! | `LUMO_RELAY_PORT`         | `10000`   |
//! | `LUMO_HEARTBEAT_INTERVAL` | `30`      |
//! | `LUMO_SESSION_MAX_IDLE`   | `3600`    |
//! | `LUMO_SWEEP_INTERVAL`     | `60`      |
//! | `LUMO_OUTBOUND_QUEUE`     | `64`      |
//!
//! CLI args take precedence when both are present.

use std::net::{IpAddr, SocketAddr};
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::time::Duration;

use anyhow::{bail, Context};
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use lumo_relay::domain::RelayConfig;
use lumo_relay::infrastructure::run_server;

// ── CLI argument definitions ──────────────────────────────────────────────────

/// Lumo teleprompter relay.
#[derive(Debug, Parser)]
#[command(
    name = "lumo-relay",
    about = "WebSocket relay pairing a teleprompter with its remotes",
    version
)]
struct Cli {
    /// IP address to bind to.
    #[arg(long, default_value = "0.0.0.0", env = "LUMO_RELAY_BIND")]
    bind: String,

    /// TCP port to listen on.
    #[arg(long, default_value_t = 10000, env = "LUMO_RELAY_PORT")]
    port: u16,

    /// Seconds between liveness pings.  A connection that has not answered the
    /// previous ping by the next one is terminated.
    #[arg(long, default_value_t = 30, env = "LUMO_HEARTBEAT_INTERVAL")]
    heartbeat_interval: u64,

    /// Seconds of inactivity after which a session is expired.
    #[arg(long, default_value_t = 3600, env = "LUMO_SESSION_MAX_IDLE")]
    session_max_idle: u64,

    /// Seconds between idle-session sweeps.
    #[arg(long, default_value_t = 60, env = "LUMO_SWEEP_INTERVAL")]
    sweep_interval: u64,

    /// Frames buffered per connection before new frames to it are dropped.
    #[arg(long, default_value_t = 64, env = "LUMO_OUTBOUND_QUEUE")]
    outbound_queue: usize,
}

impl Cli {
    /// Converts the parsed CLI arguments into a [`RelayConfig`].
    ///
    /// # Errors
    ///
    /// Returns an error if `--bind` is not an IP address or any interval or
    /// the queue size is zero.
    fn into_relay_config(self) -> anyhow::Result<RelayConfig> {
        let ip: IpAddr = self
            .bind
            .parse()
            .with_context(|| format!("invalid bind address: '{}'", self.bind))?;

        for (name, value) in [
            ("--heartbeat-interval", self.heartbeat_interval),
            ("--session-max-idle", self.session_max_idle),
            ("--sweep-interval", self.sweep_interval),
        ] {
            if value == 0 {
                bail!("{name} must be at least 1 second");
            }
        }
        if self.outbound_queue == 0 {
            bail!("--outbound-queue must be at least 1");
        }

        Ok(RelayConfig {
            bind_addr: SocketAddr::new(ip, self.port),
            heartbeat_interval: Duration::from_secs(self.heartbeat_interval),
            session_max_idle: Duration::from_secs(self.session_max_idle),
            sweep_interval: Duration::from_secs(self.sweep_interval),
            outbound_queue: self.outbound_queue,
        })
    }
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = Cli::parse().into_relay_config()?;

    info!(
        "lumo relay starting: bind={}, heartbeat={}s, max idle={}s",
        config.bind_addr,
        config.heartbeat_interval.as_secs(),
        config.session_max_idle.as_secs()
    );

    let running = Arc::new(AtomicBool::new(true));
    let running_clone = Arc::clone(&running);

    // The accept loop checks this flag every 200 ms.
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("received Ctrl+C; shutting down");
                running_clone.store(false, Ordering::Relaxed);
            }
            Err(e) => {
                tracing::error!("failed to listen for Ctrl+C signal: {e}");
            }
        }
    });

    run_server(config, running).await?;

    info!("lumo relay stopped");
    Ok(())
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn cli(args: &[&str]) -> Cli {
        Cli::parse_from(std::iter::once("lumo-relay").chain(args.iter().copied()))
    }

    #[test]
    fn test_cli_defaults() {
        // Arrange / Act
        let cli = cli(&[]);

        // Assert
        assert_eq!(cli.port, 10000);
        assert_eq!(cli.bind, "0.0.0.0");
        assert_eq!(cli.heartbeat_interval, 30);
        assert_eq!(cli.session_max_idle, 3600);
        assert_eq!(cli.sweep_interval, 60);
        assert_eq!(cli.outbound_queue, 64);
    }

    #[test]
    fn test_cli_port_override() {
        assert_eq!(cli(&["--port", "9999"]).port, 9999);
    }

    #[test]
    fn test_into_relay_config_defaults() {
        let config = cli(&[]).into_relay_config().unwrap();
        assert_eq!(config.bind_addr.to_string(), "0.0.0.0:10000");
        assert_eq!(config.heartbeat_interval, Duration::from_secs(30));
        assert_eq!(config.session_max_idle, Duration::from_secs(3600));
    }

    #[test]
    fn test_into_relay_config_custom_bind() {
        let config = cli(&["--bind", "127.0.0.1", "--port", "8080"])
            .into_relay_config()
            .unwrap();
        assert_eq!(config.bind_addr.to_string(), "127.0.0.1:8080");
    }

    #[test]
    fn test_into_relay_config_accepts_ipv6() {
        let config = cli(&["--bind", "::1"]).into_relay_config().unwrap();
        assert!(config.bind_addr.is_ipv6());
    }

    #[test]
    fn test_into_relay_config_invalid_bind_returns_error() {
        // Arrange
        let cli = Cli {
            bind: "not.an.ip".to_string(),
            port: 10000,
            heartbeat_interval: 30,
            session_max_idle: 3600,
            sweep_interval: 60,
            outbound_queue: 64,
        };

        // Act
        let result = cli.into_relay_config();

        // Assert: must return an error, not panic
        assert!(result.is_err());
    }

    #[test]
    fn test_into_relay_config_rejects_zero_interval() {
        let result = cli(&["--heartbeat-interval", "0"]).into_relay_config();
        assert!(result.is_err());
    }

    #[test]
    fn test_into_relay_config_rejects_zero_queue() {
        let result = cli(&["--outbound-queue", "0"]).into_relay_config();
        assert!(result.is_err());
    }
}
