// Integration tests for the registry server and its client.
//
// The registry is an ordinary actor, so these tests host it under a local
// manager and drive the protocol through local references. Timing
// scenarios run with a scaled down RegistryConfig.

use troupe_actor::{
    ActorRef, Error, GlobalRegistry, Manager, RegistryClient, RegistryConfig,
    REGISTRY_NAME,
};

use tracing_test::traced_test;

use std::time::{Duration, Instant};

fn scaled_config() -> RegistryConfig {
    RegistryConfig {
        heartbeat_interval: Duration::from_millis(100),
        offline_threshold: Duration::from_millis(300),
        sweep_interval: Duration::from_millis(50),
    }
}

/// Hosts a registry under a manager and returns both with a local
/// reference to the registry actor.
fn start_registry(config: RegistryConfig) -> (Manager, ActorRef) {
    let manager = Manager::new("registry-host");
    manager.manage(GlobalRegistry::new(config)).unwrap();
    manager.init();
    let registry_ref = manager.get_local_actor(REGISTRY_NAME);
    assert!(registry_ref.is_local());
    (manager, registry_ref)
}

fn stop_registry(manager: Manager) {
    manager.terminate_all();
    manager.end();
}

#[test]
fn test_register_and_lookup() {
    let (manager, registry_ref) = start_registry(scaled_config());
    let client = RegistryClient::new("m1", registry_ref);

    client
        .register_actor("pong", "tcp://localhost:5001")
        .unwrap();
    // Registration counts as a heartbeat, so the entry is online.
    let endpoint = client.lookup("pong").unwrap();
    assert_eq!(endpoint, "tcp://localhost:5001");

    stop_registry(manager);
}

#[test]
fn test_lookup_unknown_name() {
    let (manager, registry_ref) = start_registry(scaled_config());
    let client = RegistryClient::new("m1", registry_ref);

    let result = client.lookup("nobody");
    assert_eq!(result.unwrap_err(), Error::NotFound("nobody".to_owned()));
    let result = client.lookup_allow_offline("nobody");
    assert_eq!(result.unwrap_err(), Error::NotFound("nobody".to_owned()));

    stop_registry(manager);
}

#[test]
fn test_duplicate_registration_while_live() {
    let (manager, registry_ref) = start_registry(scaled_config());
    let first = RegistryClient::new("m1", registry_ref.clone());
    let second = RegistryClient::new("m2", registry_ref);

    first.register_actor("A", "tcp://localhost:5001").unwrap();
    let result = second.register_actor("A", "tcp://localhost:5002");
    match result {
        Err(Error::Registration { name, reason }) => {
            assert_eq!(name, "A");
            assert!(!reason.is_empty());
        }
        other => panic!("expected a registration failure, got {other:?}"),
    }

    // The first entry is unchanged.
    let endpoint = first.lookup("A").unwrap();
    assert_eq!(endpoint, "tcp://localhost:5001");

    stop_registry(manager);
}

#[test]
fn test_same_manager_reregisters() {
    let (manager, registry_ref) = start_registry(scaled_config());
    let client = RegistryClient::new("m1", registry_ref);

    client.register_actor("A", "tcp://localhost:5001").unwrap();
    // Overwriting its own entry is allowed.
    client.register_actor("A", "tcp://localhost:5009").unwrap();
    assert_eq!(client.lookup("A").unwrap(), "tcp://localhost:5009");

    stop_registry(manager);
}

#[test]
#[traced_test]
fn test_offline_detection_after_missed_heartbeats() {
    let config = scaled_config();
    let (manager, registry_ref) = start_registry(config.clone());
    let client = RegistryClient::new("m1", registry_ref);

    client.register_actor("A", "tcp://localhost:5001").unwrap();
    assert!(client.lookup("A").is_ok());

    // No heartbeats: wait past the offline threshold.
    std::thread::sleep(config.offline_threshold + Duration::from_millis(200));

    let result = client.lookup("A");
    assert_eq!(result.unwrap_err(), Error::Offline("A".to_owned()));
    // The entry is flagged, not dropped.
    let (endpoint, online) = client.lookup_allow_offline("A").unwrap();
    assert_eq!(endpoint, "tcp://localhost:5001");
    assert!(!online);

    stop_registry(manager);
}

#[test]
fn test_heartbeat_brings_entries_back_online() {
    let config = scaled_config();
    let (manager, registry_ref) = start_registry(config.clone());
    let client = RegistryClient::with_interval(
        "m1",
        registry_ref,
        config.heartbeat_interval,
    );

    client.register_actor("A", "tcp://localhost:5001").unwrap();
    std::thread::sleep(config.offline_threshold + Duration::from_millis(100));
    assert_eq!(client.lookup("A").unwrap_err(), Error::Offline("A".to_owned()));

    // Resumed heartbeats mark the manager online again.
    client.start_heartbeat();
    std::thread::sleep(config.heartbeat_interval * 2);
    assert_eq!(client.lookup("A").unwrap(), "tcp://localhost:5001");

    client.stop_heartbeat();
    stop_registry(manager);
}

#[test]
fn test_takeover_after_offline() {
    let config = scaled_config();
    let (manager, registry_ref) = start_registry(config.clone());
    let first = RegistryClient::new("m1", registry_ref.clone());
    let second = RegistryClient::new("m2", registry_ref);

    first.register_actor("A", "tcp://localhost:5001").unwrap();
    // m1 dies silently; after the threshold the name is up for takeover.
    std::thread::sleep(config.offline_threshold + Duration::from_millis(100));

    second.register_actor("A", "tcp://localhost:5002").unwrap();
    assert_eq!(second.lookup("A").unwrap(), "tcp://localhost:5002");

    stop_registry(manager);
}

#[test]
fn test_heartbeat_liveness_and_stop() {
    let config = RegistryConfig {
        heartbeat_interval: Duration::from_millis(50),
        offline_threshold: Duration::from_secs(60),
        // Keep the sweep quiet so the message count isolates heartbeats.
        sweep_interval: Duration::from_secs(60),
    };
    let (manager, registry_ref) = start_registry(config);
    let client = RegistryClient::with_interval(
        "m1",
        registry_ref,
        Duration::from_millis(50),
    );

    let counts_before = manager.message_counts()[REGISTRY_NAME].1;
    client.start_heartbeat();
    assert!(client.is_heartbeat_running());
    // Idempotent start.
    client.start_heartbeat();

    std::thread::sleep(Duration::from_millis(320));
    client.stop_heartbeat();
    assert!(!client.is_heartbeat_running());

    // At least floor(T / interval) heartbeats were observed in the window.
    let deadline = Instant::now() + Duration::from_secs(2);
    loop {
        let observed = manager.message_counts()[REGISTRY_NAME].1 - counts_before;
        if observed >= 6 {
            break;
        }
        assert!(
            Instant::now() < deadline,
            "only {observed} heartbeats observed"
        );
        std::thread::sleep(Duration::from_millis(20));
    }

    // After stop, no further heartbeats arrive.
    std::thread::sleep(Duration::from_millis(100));
    let settled = manager.message_counts()[REGISTRY_NAME].1;
    std::thread::sleep(Duration::from_millis(200));
    assert_eq!(manager.message_counts()[REGISTRY_NAME].1, settled);

    stop_registry(manager);
}

#[test]
fn test_unregister_removes_entry() {
    let (manager, registry_ref) = start_registry(scaled_config());
    let client = RegistryClient::new("m1", registry_ref);

    client.register_actor("A", "tcp://localhost:5001").unwrap();
    client.unregister_actor("A");

    // Unregistration is fire and forget; poll until it lands.
    let deadline = Instant::now() + Duration::from_secs(2);
    loop {
        match client.lookup("A") {
            Err(Error::NotFound(_)) => break,
            Ok(_) | Err(_) => {
                assert!(Instant::now() < deadline, "entry was not removed");
                std::thread::sleep(Duration::from_millis(20));
            }
        }
    }

    stop_registry(manager);
}
