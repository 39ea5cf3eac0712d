//! A relay built from configuration, sender and receiver sharing one
//! database file.

use std::time::Duration;

use handoff::{Backend, HandoffError, Relay, RelayConfig, RetrievalMode, SqliteStore};

fn config_for(path: &std::path::Path) -> RelayConfig {
    let mut config = RelayConfig::from_toml_str(&format!(
        r#"
        pepper = "integration-pepper"

        [store]
        backend = "sqlite"
        path = "{}"
        "#,
        path.display()
    ))
    .unwrap();
    config.kdf.profile = handoff::KdfProfile::Custom(1_000);
    config
}

#[tokio::test]
async fn test_handoff_between_two_relays() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("handoff.db");
    let config = config_for(&path);

    let sender = Relay::from_config(&config).unwrap();
    let receiver = Relay::from_config(&config).unwrap();
    let code = sender.generate_code().unwrap();

    let backend = sender
        .send(&code, "Tr0ub4dor&3xyzxyzxyz", "Medikation: keine", config.default_ttl().unwrap())
        .await
        .unwrap();
    assert_eq!(backend, Backend::Persistent);

    assert_eq!(
        receiver.receive(&code, "Tr0ub4dor&3xyzxyzxyz").await.unwrap(),
        "Medikation: keine"
    );
    assert!(matches!(
        sender.receive(&code, "Tr0ub4dor&3xyzxyzxyz").await,
        Err(HandoffError::NotFound)
    ));
}

#[tokio::test]
async fn test_different_pepper_cannot_find_handoff() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("handoff.db");

    let sender = Relay::from_config(&config_for(&path)).unwrap();
    let mut other = config_for(&path);
    other.pepper = Some("another-deployment".to_string());
    let receiver = Relay::from_config(&other).unwrap();

    sender
        .send("AbC123xYz890", "Tr0ub4dor&3xyzxyzxyz", "x", chrono::Duration::minutes(5))
        .await
        .unwrap();
    assert!(matches!(
        receiver.receive("AbC123xYz890", "Tr0ub4dor&3xyzxyzxyz").await,
        Err(HandoffError::NotFound)
    ));
}

#[tokio::test]
async fn test_configured_reaper_over_sqlite() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("handoff.db");
    let config = config_for(&path);
    let relay = Relay::from_config(&config).unwrap();

    relay
        .send("AbC123xYz890", "Tr0ub4dor&3xyzxyzxyz", "stale", chrono::Duration::seconds(-30))
        .await
        .unwrap();

    // The first sweep runs immediately, long before the five-minute tick.
    assert_eq!(config.reap_interval(), Duration::from_secs(300));
    let reaper = relay.spawn_reaper(config.reap_interval());
    tokio::time::sleep(Duration::from_millis(100)).await;
    reaper.shutdown().await;

    let inspect = SqliteStore::open(&path, RetrievalMode::SingleUse).unwrap();
    assert!(inspect.is_empty().unwrap());
}

#[tokio::test]
async fn test_events_file_from_config() {
    let dir = tempfile::tempdir().unwrap();
    let events_path = dir.path().join("events.jsonl");
    let mut config = config_for(&dir.path().join("handoff.db"));
    config.events.file = Some(events_path.clone());
    config.events.buffer = 1;

    let relay = Relay::from_config(&config).unwrap();
    relay
        .send("AbC123xYz890", "Tr0ub4dor&3xyzxyzxyz", "x", chrono::Duration::minutes(5))
        .await
        .unwrap();
    relay.receive("AbC123xYz890", "Tr0ub4dor&3xyzxyzxyz").await.unwrap();

    assert_eq!(relay.events().len(), 1);
    let lines = std::fs::read_to_string(&events_path).unwrap();
    assert_eq!(lines.lines().count(), 2);
    assert!(lines.contains("\"kind\":\"retrieved\""));
}

#[test]
fn test_custom_kdf_cannot_be_configured() {
    let result = RelayConfig::from_toml_str("pepper = \"x\"\n[kdf]\nprofile = { custom = 1 }");
    assert!(matches!(result, Err(HandoffError::Config(_))));
}
