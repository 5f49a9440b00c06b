//! End-to-end tests: real connection managers against a real relay.
//!
//! Each test binds a relay on `127.0.0.1:0` and drives teleprompter and remote
//! clients through it.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use lumo_client::application::{PlaybackEngine, StateSink};
use lumo_client::domain::{PlaybackSettings, RelaySettings, TextSettings};
use lumo_client::infrastructure::{ConnectError, ConnectionManager, PeerEvent};
use lumo_core::protocol::messages::Role;
use lumo_core::SessionId;
use lumo_relay::domain::RelayConfig;
use lumo_relay::infrastructure::{RelayServer, SharedRegistry};
use tokio_test::{assert_err, assert_ok};

struct Relay {
    url: String,
    registry: SharedRegistry,
    running: Arc<AtomicBool>,
}

impl Drop for Relay {
    fn drop(&mut self) {
        self.running.store(false, Ordering::Relaxed);
    }
}

async fn start_relay(config: RelayConfig) -> Relay {
    let server = RelayServer::bind(RelayConfig {
        bind_addr: "127.0.0.1:0".parse().unwrap(),
        ..config
    })
    .await
    .unwrap();
    let url = format!("ws://{}", server.local_addr().unwrap());
    let registry = server.registry();
    let running = Arc::new(AtomicBool::new(true));
    tokio::spawn(server.run(Arc::clone(&running)));
    Relay {
        url,
        registry,
        running,
    }
}

fn client(relay: &Relay) -> Arc<ConnectionManager> {
    ConnectionManager::new(RelaySettings {
        url: relay.url.clone(),
        connect_timeout_secs: 5,
        reconnect_delay_secs: 1,
        ..RelaySettings::default()
    })
}

/// Polls `check` until it holds or five seconds pass.
async fn eventually(what: &str, check: impl Fn() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while !check() {
        assert!(Instant::now() < deadline, "timed out waiting for {what}");
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}

fn record<T: Clone + Send + 'static>() -> (Arc<Mutex<Vec<T>>>, impl Fn(&T) + Send + Sync + 'static) {
    let log = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&log);
    (log, move |event: &T| sink.lock().unwrap().push(event.clone()))
}

#[tokio::test]
async fn test_remote_speed_command_reaches_engine_without_reramping() {
    // Arrange: a teleprompter whose engine is fully eased in.
    let relay = start_relay(RelayConfig::default()).await;
    let teleprompter = client(&relay);
    let engine = Arc::new(
        PlaybackEngine::new(TextSettings::default(), PlaybackSettings::default(), "Keynote")
            .with_sink(Arc::clone(&teleprompter) as Arc<dyn StateSink>),
    );
    engine.set_layout(100_000.0, 1_000.0);
    let target = Arc::clone(&engine);
    let _commands = teleprompter.on_message(move |command| target.apply_command(command));
    let (teleprompter_peers, on_peer) = record::<PeerEvent>();
    let _tp = teleprompter.on_peer_change(on_peer);

    let code = assert_ok!(teleprompter.connect_as_teleprompter().await);

    let t0 = Instant::now();
    engine.play();
    for i in 0..120 {
        engine.tick(t0 + Duration::from_millis(16) * i);
    }
    assert!(engine.has_eased_in());

    let remote = client(&relay);
    let controller = remote.remote_controller();
    let (remote_peers, on_peer) = record::<PeerEvent>();
    let _rp = remote.on_peer_change(on_peer);

    // Act: join with the lowercase code, then change the speed.
    assert_ok!(
        remote
            .connect_as_remote(&code.as_str().to_ascii_lowercase())
            .await
    );
    eventually("both peers to see each other", || {
        teleprompter_peers.lock().unwrap().contains(&PeerEvent::Connected(Role::Remote))
            && remote_peers.lock().unwrap().contains(&PeerEvent::Connected(Role::Teleprompter))
    })
    .await;
    assert!(controller.set_speed(80));

    // Assert
    eventually("the engine to apply the speed", || engine.speed() == 80).await;
    assert!(engine.has_eased_in());
    assert!(engine.is_playing());
    eventually("the remote to see the new speed", || {
        controller.latest_state().is_some_and(|s| s.speed == 80)
    })
    .await;
    assert_eq!(controller.speed(), 80);
    assert_eq!(remote.session_id(), Some(code));

    teleprompter.disconnect();
    remote.disconnect();
}

#[tokio::test]
async fn test_second_teleprompter_gets_slot_occupied() {
    // Arrange
    let relay = start_relay(RelayConfig::default()).await;
    let first = client(&relay);
    let code = assert_ok!(first.connect_as_teleprompter().await);

    // Act
    let second = client(&relay);
    let result = second.connect_as_teleprompter_with(code.clone()).await;

    // Assert
    assert!(matches!(result, Err(ConnectError::SlotOccupied(id)) if id == code));
    assert!(second.session_id().is_none());
    assert!(!second.is_connected());
    assert!(first.is_connected());
    assert!(first.broadcast_state(lumo_core::PlaybackState {
        is_playing: false,
        speed: 50,
        position: 0.0,
        script_title: String::new(),
    }));

    first.disconnect();
}

#[tokio::test]
async fn test_remote_may_join_a_session_before_its_teleprompter() {
    let relay = start_relay(RelayConfig::default()).await;
    let remote = client(&relay);

    assert_ok!(remote.connect_as_remote("QX7K2M9P").await);

    assert!(remote.is_connected());
    assert_eq!(remote.role(), Some(Role::Remote));
    let present = relay
        .registry
        .lock()
        .await
        .peers(&SessionId::parse("QX7K2M9P").unwrap())
        .map(|p| p.teleprompter_present);
    assert_eq!(present, Some(false));

    remote.disconnect();
}

#[tokio::test]
async fn test_unexpected_close_triggers_reconnect_with_same_identity() {
    // Arrange: sessions expire after 300 ms idle.
    let relay = start_relay(RelayConfig {
        session_max_idle: Duration::from_millis(300),
        sweep_interval: Duration::from_millis(50),
        ..RelayConfig::default()
    })
    .await;
    let teleprompter = client(&relay);
    let (changes, on_change) = record::<bool>();
    let _sub = teleprompter.on_connection_change(on_change);

    // Act
    let code = assert_ok!(teleprompter.connect_as_teleprompter().await);

    // Assert: expired, then rejoined after the reconnect delay.
    eventually("a drop followed by a reconnect", || {
        changes.lock().unwrap().starts_with(&[true, false, true])
    })
    .await;
    assert_eq!(teleprompter.session_id(), Some(code));
    assert_eq!(teleprompter.role(), Some(Role::Teleprompter));

    teleprompter.disconnect();
}

#[tokio::test]
async fn test_disconnect_closes_link_and_never_reconnects() {
    // Arrange
    let relay = start_relay(RelayConfig::default()).await;
    let remote = client(&relay);
    let (changes, on_change) = record::<bool>();
    let _sub = remote.on_connection_change(on_change);
    assert_ok!(remote.connect_as_remote("ABCD2345").await);

    // Act
    remote.disconnect();
    remote.disconnect();

    // Assert: the relay drops the empty session and no reconnect happens.
    let registry = relay.registry.clone();
    let deadline = Instant::now() + Duration::from_secs(5);
    while registry.lock().await.session_count() > 0 {
        assert!(Instant::now() < deadline, "session was never removed");
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    tokio::time::sleep(Duration::from_millis(1_500)).await;
    assert_eq!(*changes.lock().unwrap(), vec![true, false]);
    assert!(remote.session_id().is_none());
    assert!(!remote.send_command(lumo_core::RemoteCommand::Play));
}

#[tokio::test]
async fn test_connect_to_dead_relay_is_a_transport_error() {
    // Arrange: a port with nothing listening.
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    let manager = ConnectionManager::new(RelaySettings {
        url: format!("ws://{addr}"),
        ..RelaySettings::default()
    });

    // Act
    let err = assert_err!(manager.connect_as_remote("ABCD2345").await);

    // Assert
    assert!(matches!(err, ConnectError::Transport(_)));
    assert!(manager.role().is_none());
}

#[tokio::test]
async fn test_relay_that_never_acknowledges_join_times_out() {
    // Arrange: a WebSocket server that upgrades and then stays silent.
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let _ws = tokio_tungstenite::accept_async(stream).await.unwrap();
        tokio::time::sleep(Duration::from_secs(30)).await;
    });
    let manager = ConnectionManager::new(RelaySettings {
        url: format!("ws://{addr}"),
        connect_timeout_secs: 1,
        ..RelaySettings::default()
    });
    let started = Instant::now();

    // Act
    let err = assert_err!(manager.connect_as_remote("ABCD2345").await);

    // Assert
    assert!(matches!(err, ConnectError::ConnectTimeout(limit) if limit == Duration::from_secs(1)));
    assert!(started.elapsed() >= Duration::from_secs(1));
    assert!(!manager.is_connected());
    assert!(manager.session_id().is_none());
}

#[tokio::test]
async fn test_new_connect_cancels_pending_reconnect_to_old_session() {
    // Arrange: sessions expire after 300 ms idle; the client waits 1 s to
    // reconnect.
    let relay = start_relay(RelayConfig {
        session_max_idle: Duration::from_millis(300),
        sweep_interval: Duration::from_millis(50),
        ..RelayConfig::default()
    })
    .await;
    let remote = client(&relay);
    let (changes, on_change) = record::<bool>();
    let _sub = remote.on_connection_change(on_change);
    let old = SessionId::parse("PREV2345").unwrap();
    let new = SessionId::parse("NEXT2345").unwrap();
    assert_ok!(remote.connect_as_remote(old.as_str()).await);
    eventually("the old session to expire", || {
        *changes.lock().unwrap() == [true, false]
    })
    .await;

    // Act: join another session while the reconnect timer is pending.
    assert_ok!(remote.connect_as_remote(new.as_str()).await);

    // Assert: past the reconnect delay, the old session never comes back and
    // the new one holds exactly this client. Commands keep it from idling.
    let until = Instant::now() + Duration::from_millis(1_500);
    while Instant::now() < until {
        assert!(remote.send_command(lumo_core::RemoteCommand::Status));
        {
            let registry = relay.registry.lock().await;
            assert!(!registry.contains(&old), "old session was rejoined");
            assert_eq!(registry.peers(&new).map(|p| p.remotes), Some(1));
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    assert_eq!(*changes.lock().unwrap(), vec![true, false, true]);
    assert_eq!(remote.session_id(), Some(new));

    remote.disconnect();
}
