//! Lumo client: entry point.
//!
//! One binary, two roles:
//!
//! ```text
//! lumo-client [--config <FILE>] teleprompter --script <FILE>
//! lumo-client [--config <FILE>] remote <CODE>
//! lumo-client [--config <FILE>] init-config [--force]
//! ```
//!
//! `init-config` writes the default configuration to the config path so it
//! can be edited.
//!
//! # Teleprompter
//!
//! Creates a session, prints its code, and scrolls the script from the frame
//! clock.  Commands from remotes are applied as they arrive and every change
//! is broadcast back.  Runs until Ctrl+C.
//!
//! # Remote
//!
//! Joins the session and reads one gesture per line from stdin:
//!
//! | Input      | Effect                         |
//! |------------|--------------------------------|
//! | `play`     | start scrolling                |
//! | `pause`    | pause                          |
//! | `stop`     | pause and rewind               |
//! | `toggle`   | play or pause                  |
//! | `speed N`  | set speed to N percent         |
//! | `+` / `-`  | speed up / down by 10          |
//! | `fwd`      | seek forward one step          |
//! | `back`     | seek backward one step         |
//! | `status`   | ask for the current state      |
//! | `quit`     | leave                          |

use std::path::{Path, PathBuf};
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc, Mutex, PoisonError,
};

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use tokio::sync::mpsc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use lumo_client::application::remote_control::SPEED_STEP;
use lumo_client::application::{PlaybackEngine, RemoteController, StateSink};
use lumo_client::domain::ClientConfig;
use lumo_client::infrastructure::{
    load_config, load_script, run_frame_loop, save_config, ConnectionManager, PeerEvent,
};

// ── CLI argument definitions ──────────────────────────────────────────────────

/// Lumo teleprompter client.
#[derive(Debug, Parser)]
#[command(name = "lumo-client", about = "Lumo teleprompter and remote control", version)]
struct Cli {
    /// Path to the TOML config file.  Defaults apply if it does not exist.
    #[arg(long, default_value = "lumo.toml", env = "LUMO_CLIENT_CONFIG")]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Present a script and accept remote control.
    Teleprompter {
        /// Plain-text script file.
        #[arg(long)]
        script: PathBuf,

        /// Visible height in logical pixels.
        #[arg(long, default_value_t = 1080.0)]
        viewport_height: f64,

        /// Characters per rendered line, for estimating the script height.
        #[arg(long, default_value_t = 40)]
        columns: usize,
    },
    /// Control a teleprompter by its session code.
    Remote {
        /// Eight-character session code shown on the teleprompter.
        code: String,
    },
    /// Write the default configuration to the config path.
    InitConfig {
        /// Overwrite an existing file.
        #[arg(long)]
        force: bool,
    },
}

// ── Remote gestures ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Gesture {
    Play,
    Pause,
    Stop,
    Toggle,
    Speed(u8),
    Faster,
    Slower,
    Forward,
    Backward,
    Status,
    Quit,
}

fn parse_gesture(line: &str) -> Option<Gesture> {
    let mut words = line.split_whitespace();
    let gesture = match words.next()?.to_ascii_lowercase().as_str() {
        "play" => Gesture::Play,
        "pause" => Gesture::Pause,
        "stop" => Gesture::Stop,
        "toggle" => Gesture::Toggle,
        "speed" => Gesture::Speed(words.next()?.parse().ok()?),
        "+" => Gesture::Faster,
        "-" => Gesture::Slower,
        "fwd" => Gesture::Forward,
        "back" => Gesture::Backward,
        "status" => Gesture::Status,
        "quit" | "exit" => Gesture::Quit,
        _ => return None,
    };
    words.next().is_none().then_some(gesture)
}

fn perform(controller: &RemoteController, gesture: Gesture) -> bool {
    match gesture {
        Gesture::Play => controller.play(),
        Gesture::Pause => controller.pause(),
        Gesture::Stop => controller.stop(),
        Gesture::Toggle => controller.toggle(),
        Gesture::Speed(percent) => controller.set_speed(percent),
        Gesture::Faster => controller.nudge_speed(SPEED_STEP),
        Gesture::Slower => controller.nudge_speed(-SPEED_STEP),
        Gesture::Forward => controller.seek_forward(),
        Gesture::Backward => controller.seek_backward(),
        Gesture::Status => controller.request_status(),
        Gesture::Quit => true,
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

    let cli = Cli::parse();
    match cli.command {
        Command::Teleprompter {
            script,
            viewport_height,
            columns,
        } => run_teleprompter(read_config(&cli.config)?, script, viewport_height, columns).await,
        Command::Remote { code } => run_remote(read_config(&cli.config)?, code).await,
        Command::InitConfig { force } => {
            init_config(&cli.config, force)?;
            println!("Wrote default config to {}", cli.config.display());
            Ok(())
        }
    }
}

fn read_config(path: &Path) -> anyhow::Result<ClientConfig> {
    let config = load_config(path)
        .with_context(|| format!("failed to load config from {}", path.display()))?;
    info!("relay: {}", config.relay.url);
    Ok(config)
}

/// Writes the default config to `path`.  Refuses to replace an existing file
/// unless `force` is set.
fn init_config(path: &Path, force: bool) -> anyhow::Result<()> {
    if path.exists() && !force {
        bail!("{} already exists; pass --force to overwrite", path.display());
    }
    save_config(path, &ClientConfig::default())
        .with_context(|| format!("failed to write config to {}", path.display()))
}

async fn run_teleprompter(
    config: ClientConfig,
    script_path: PathBuf,
    viewport_height: f64,
    columns: usize,
) -> anyhow::Result<()> {
    let script = load_script(&script_path)
        .with_context(|| format!("failed to read script {}", script_path.display()))?;

    let connection = ConnectionManager::new(config.relay.clone());
    let engine = Arc::new(
        PlaybackEngine::new(config.text.clone(), config.playback.clone(), script.title.clone())
            .with_sink(Arc::clone(&connection) as Arc<dyn StateSink>),
    );
    engine.set_layout(
        config.text.estimate_height(&script.content, columns),
        viewport_height,
    );

    let target = Arc::downgrade(&engine);
    let _commands = connection.on_message(move |command| {
        if let Some(engine) = target.upgrade() {
            engine.apply_command(command);
        }
    });
    let _peers = connection.on_peer_change(|event| match event {
        PeerEvent::Connected(role) => println!("{role} connected"),
        PeerEvent::Disconnected(role) => println!("{role} disconnected"),
    });
    let _links = connection.on_connection_change(|up| {
        if !*up {
            println!("relay link lost; reconnecting");
        }
    });

    let code = connection
        .connect_as_teleprompter()
        .await
        .context("failed to open a session on the relay")?;
    println!("Session code: {code}");
    println!("Presenting \"{}\"", script.title);

    let running = shutdown_flag();
    run_frame_loop(Arc::clone(&engine), config.frame_rate, running).await;

    connection.disconnect();
    info!("teleprompter stopped");
    Ok(())
}

async fn run_remote(config: ClientConfig, code: String) -> anyhow::Result<()> {
    let connection = ConnectionManager::new(config.relay);
    let controller = connection.remote_controller();

    let shown = Mutex::new(None);
    let view = Arc::downgrade(&controller);
    let _states = connection.on_state_update(move |state| {
        // Position changes every frame; only print play state and speed changes.
        let key = (state.is_playing, state.speed);
        let mut last = shown.lock().unwrap_or_else(PoisonError::into_inner);
        if *last != Some(key) {
            *last = Some(key);
            if let Some(controller) = view.upgrade() {
                println!("{}", controller.render());
            }
        }
    });
    let _peers = connection.on_peer_change(|event| match event {
        PeerEvent::Connected(_) => println!("teleprompter online"),
        PeerEvent::Disconnected(_) => println!("teleprompter offline"),
    });

    connection
        .connect_as_remote(&code)
        .await
        .with_context(|| format!("failed to join session {code}"))?;
    println!("Joined session {}", code.trim().to_ascii_uppercase());
    controller.request_status();

    let mut lines = spawn_stdin_reader();
    loop {
        let line = tokio::select! {
            line = lines.recv() => match line {
                Some(line) => line,
                None => break,
            },
            _ = tokio::signal::ctrl_c() => break,
        };
        if line.trim().is_empty() {
            continue;
        }
        match parse_gesture(&line) {
            Some(Gesture::Quit) => break,
            Some(gesture) => {
                if !perform(&controller, gesture) {
                    println!("not connected; command dropped");
                }
                if gesture == Gesture::Status {
                    println!("{}", controller.render());
                }
            }
            None => println!("unknown command: {}", line.trim()),
        }
    }

    connection.disconnect();
    info!("remote stopped");
    Ok(())
}

/// Reads stdin lines on a dedicated thread so a pending read never holds up
/// runtime shutdown.
fn spawn_stdin_reader() -> mpsc::Receiver<String> {
    let (tx, rx) = mpsc::channel(16);
    std::thread::spawn(move || {
        for line in std::io::stdin().lines() {
            let Ok(line) = line else {
                break;
            };
            if tx.blocking_send(line).is_err() {
                break;
            }
        }
    });
    rx
}

/// Returns a flag that is cleared on Ctrl+C.
fn shutdown_flag() -> Arc<AtomicBool> {
    let running = Arc::new(AtomicBool::new(true));
    let flag = Arc::clone(&running);
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("failed to listen for Ctrl+C: {e}");
            return;
        }
        info!("Ctrl+C received, shutting down");
        flag.store(false, Ordering::Relaxed);
    });
    running
}

// ── Tests ─────────────────────────────────────────────────────────────────────
