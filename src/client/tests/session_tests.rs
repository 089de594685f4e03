//! Tests for session module.

use super::*;
use crate::codec::read_document;
use crate::manager::rpc_tests::{TestManager, APP1};
use crate::manager::ServiceName;
use crate::test_support::{write_json, SharedOutput};
use crate::value::ValueCell;
use tempfile::{tempdir, TempDir};

fn defaults(timeout_ms: u64, phrase: &str) -> SessionSnapshot {
    SessionSnapshot {
        timeout_ms,
        phrase: phrase.to_string(),
    }
}

fn signal(entries: &[(&str, ValueCell)]) -> ConfigMap {
    entries
        .iter()
        .map(|(key, value)| (key.to_string(), value.clone()))
        .collect()
}

#[test]
fn test_apply_signal_updates_both_keys() {
    let snapshot = Mutex::new(defaults(1000, "Hey"));
    let applied = apply_signal(
        &snapshot,
        &signal(&[
            ("Timeout", ValueCell::Int(250)),
            ("TimeoutPhrase", ValueCell::from("yo")),
        ]),
    );

    assert_eq!(applied, vec!["Timeout", "TimeoutPhrase"]);
    assert_eq!(*snapshot.lock().unwrap(), defaults(250, "yo"));
}

#[test]
fn test_apply_signal_skips_only_the_bad_key() {
    let snapshot = Mutex::new(defaults(1000, "Hey"));
    let applied = apply_signal(
        &snapshot,
        &signal(&[
            ("Timeout", ValueCell::from("fast")),
            ("TimeoutPhrase", ValueCell::from("yo")),
        ]),
    );
    assert_eq!(applied, vec!["TimeoutPhrase"]);
    assert_eq!(*snapshot.lock().unwrap(), defaults(1000, "yo"));

    let applied = apply_signal(
        &snapshot,
        &signal(&[
            ("Timeout", ValueCell::Int(300)),
            ("TimeoutPhrase", ValueCell::Int(7)),
        ]),
    );
    assert_eq!(applied, vec!["Timeout"]);
    assert_eq!(*snapshot.lock().unwrap(), defaults(300, "yo"));
}

#[test]
fn test_apply_signal_partial_payload_updates_only_present_key() {
    let snapshot = Mutex::new(defaults(1000, "Hey"));

    let applied = apply_signal(&snapshot, &signal(&[("TimeoutPhrase", ValueCell::from("yo"))]));
    assert_eq!(applied, vec!["TimeoutPhrase"]);
    assert_eq!(*snapshot.lock().unwrap(), defaults(1000, "yo"));

    let applied = apply_signal(&snapshot, &signal(&[("Timeout", ValueCell::Int(75))]));
    assert_eq!(applied, vec!["Timeout"]);
    assert_eq!(*snapshot.lock().unwrap(), defaults(75, "yo"));
}

#[test]
fn test_apply_signal_rejects_non_positive_timeout() {
    let snapshot = Mutex::new(defaults(1000, "Hey"));
    assert!(apply_signal(&snapshot, &signal(&[("Timeout", ValueCell::Int(0))])).is_empty());
    assert!(apply_signal(&snapshot, &signal(&[("Timeout", ValueCell::Int(-5))])).is_empty());
    assert_eq!(*snapshot.lock().unwrap(), defaults(1000, "Hey"));
}

#[test]
fn test_apply_signal_ignores_unknown_keys() {
    let snapshot = Mutex::new(defaults(1000, "Hey"));
    let applied = apply_signal(
        &snapshot,
        &signal(&[
            ("Color", ValueCell::from("blue")),
            ("Ratio", ValueCell::Float(0.5)),
        ]),
    );
    assert!(applied.is_empty());
    assert_eq!(*snapshot.lock().unwrap(), defaults(1000, "Hey"));
}

#[test]
fn test_load_local_config_creates_missing_file() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("nested").join("client.json");

    let loaded = load_local_config(&path, &defaults(200, "tick"), false).unwrap();

    assert_eq!(loaded, defaults(200, "tick"));
    assert_eq!(
        read_document(&path).unwrap(),
        signal(&[
            ("Timeout", ValueCell::Int(200)),
            ("TimeoutPhrase", ValueCell::from("tick")),
        ])
    );
}

#[test]
fn test_load_local_config_prefers_existing_file() {
    let dir = tempdir().unwrap();
    write_json(
        dir.path(),
        "client.json",
        r#"{"Timeout":42,"TimeoutPhrase":"stored","Extra":true}"#,
    );

    let loaded =
        load_local_config(&dir.path().join("client.json"), &defaults(200, "tick"), false).unwrap();
    assert_eq!(loaded, defaults(42, "stored"));
}

#[test]
fn test_load_local_config_force_rewrites_file() {
    let dir = tempdir().unwrap();
    write_json(dir.path(), "client.json", r#"{"Timeout":42,"TimeoutPhrase":"stored"}"#);
    let path = dir.path().join("client.json");

    let loaded = load_local_config(&path, &defaults(200, "tick"), true).unwrap();
    assert_eq!(loaded, defaults(200, "tick"));
    assert_eq!(read_document(&path).unwrap()["Timeout"], ValueCell::Int(200));
}

#[test]
fn test_load_local_config_rejects_bad_bootstrap_keys() {
    let dir = tempdir().unwrap();
    let cases = [
        ("missing.json", r#"{"Timeout":42}"#),
        ("wrong_type.json", r#"{"Timeout":"soon","TimeoutPhrase":"x"}"#),
        ("zero.json", r#"{"Timeout":0,"TimeoutPhrase":"x"}"#),
        ("phrase_type.json", r#"{"Timeout":5,"TimeoutPhrase":false}"#),
    ];

    for (file, content) in cases {
        write_json(dir.path(), file, content);
        let result = load_local_config(&dir.path().join(file), &defaults(200, "tick"), false);
        assert!(
            matches!(result, Err(ConfigError::MalformedDocument { .. })),
            "{} should be malformed, got {:?}",
            file,
            result
        );
    }
}

/// A running manager serving `clientapp`, published in its own bus directory.
struct ClientFixture {
    manager: TestManager,
    bus_dir: TempDir,
    _service_name: ServiceName,
    local_dir: TempDir,
}

impl ClientFixture {
    async fn start() -> Self {
        let manager = TestManager::start(&[("clientapp", APP1)]).await;
        let bus_dir = tempdir().unwrap();
        let service_name = ServiceName::acquire(bus_dir.path(), paths::SERVICE_NAME).unwrap();
        service_name.publish(&manager.address).unwrap();

        Self {
            manager,
            bus_dir,
            _service_name: service_name,
            local_dir: tempdir().unwrap(),
        }
    }

    fn local_path(&self) -> PathBuf {
        self.local_dir.path().join("clientapp.json")
    }

    fn options(&self, timeout_ms: u64, phrase: &str) -> SessionOptions {
        SessionOptions {
            timeout_ms,
            phrase: phrase.to_string(),
            config_path: Some(self.local_path()),
            force_create: false,
            bus_dir: Some(self.bus_dir.path().to_path_buf()),
        }
    }
}

async fn pause(ms: u64) {
    tokio::time::sleep(Duration::from_millis(ms)).await;
}

#[tokio::test]
async fn test_client_creates_local_file_and_prints_phrase() {
    let fixture = ClientFixture::start().await;
    let output = SharedOutput::default();

    let mut session =
        ClientSession::start(fixture.options(200, "tick"), Box::new(output.clone()))
            .await
            .unwrap();
    assert_eq!(session.app_name(), "clientapp");
    assert_eq!(session.config_path(), fixture.local_path());
    assert_eq!(
        read_document(&fixture.local_path()).unwrap(),
        signal(&[
            ("Timeout", ValueCell::Int(200)),
            ("TimeoutPhrase", ValueCell::from("tick")),
        ])
    );

    pause(900).await;
    session.shutdown();

    let lines = output.lines();
    assert!(lines.len() >= 2, "expected repeated output, got {:?}", lines);
    assert!(lines.len() <= 5, "printed too often: {:?}", lines);
    assert!(lines.iter().all(|line| line == "tick"));
}

#[tokio::test]
async fn test_client_follows_configuration_changes() {
    let fixture = ClientFixture::start().await;
    let output = SharedOutput::default();
    let mut session =
        ClientSession::start(fixture.options(100, "tick"), Box::new(output.clone()))
            .await
            .unwrap();
    assert!(session.connection().is_connected().await);

    let conn = fixture.manager.connect().await;
    conn.change_configuration("clientapp", "TimeoutPhrase", Some(ValueCell::from("tock")))
        .await
        .unwrap();
    conn.change_configuration("clientapp", "Timeout", Some(ValueCell::Int(50)))
        .await
        .unwrap();

    // Signals are already queued; run until they are applied.
    assert!(tokio::time::timeout(Duration::from_millis(200), session.run())
        .await
        .is_err());
    assert_eq!(session.snapshot(), defaults(50, "tock"));

    pause(400).await;
    session.shutdown();
    assert_eq!(output.lines().last().map(String::as_str), Some("tock"));

    // The local file is the client's own copy and is not rewritten by signals.
    assert_eq!(
        read_document(&fixture.local_path()).unwrap()["TimeoutPhrase"],
        ValueCell::from("tick")
    );
}

#[tokio::test]
async fn test_client_ignores_bad_values_in_signal() {
    let fixture = ClientFixture::start().await;
    let mut session = ClientSession::start(
        fixture.options(100, "tick"),
        Box::new(SharedOutput::default()),
    )
    .await
    .unwrap();

    let conn = fixture.manager.connect().await;
    conn.change_configuration("clientapp", "Timeout", Some(ValueCell::from("soon")))
        .await
        .unwrap();
    conn.change_configuration("clientapp", "Unrelated", Some(ValueCell::Bool(true)))
        .await
        .unwrap();

    assert!(tokio::time::timeout(Duration::from_millis(200), session.run())
        .await
        .is_err());
    // The manager's phrase for clientapp is "hi"; the bad timeout is skipped.
    assert_eq!(session.snapshot(), defaults(100, "hi"));
}

#[tokio::test]
async fn test_client_run_ends_when_manager_stops() {
    let fixture = ClientFixture::start().await;
    let mut session = ClientSession::start(
        fixture.options(100, "tick"),
        Box::new(SharedOutput::default()),
    )
    .await
    .unwrap();

    fixture.manager.bus.stop().await;

    let end = tokio::time::timeout(Duration::from_secs(2), session.run())
        .await
        .unwrap();
    assert_eq!(end, SessionEnd::ManagerStopping);
}

#[tokio::test]
async fn test_shutdown_joins_worker() {
    let fixture = ClientFixture::start().await;
    let output = SharedOutput::default();
    let mut session =
        ClientSession::start(fixture.options(50, "tick"), Box::new(output.clone()))
            .await
            .unwrap();

    pause(200).await;
    session.shutdown();
    let printed = output.lines().len();
    assert!(printed >= 1);

    pause(200).await;
    assert_eq!(output.lines().len(), printed);
    session.shutdown();
}

#[tokio::test]
async fn test_client_without_manager_is_connection_error() {
    let bus_dir = tempdir().unwrap();
    let local_dir = tempdir().unwrap();
    let options = SessionOptions {
        timeout_ms: 100,
        phrase: "tick".to_string(),
        config_path: Some(local_dir.path().join("clientapp.json")),
        force_create: false,
        bus_dir: Some(bus_dir.path().to_path_buf()),
    };

    let result = ClientSession::start(options, Box::new(SharedOutput::default())).await;
    assert!(matches!(result, Err(ConfigError::Connection { .. })));
    // The local file is created before connecting.
    assert!(local_dir.path().join("clientapp.json").exists());
}

#[tokio::test]
async fn test_stop_joins_worker_without_blocking_runtime() {
    let fixture = ClientFixture::start().await;
    let output = SharedOutput::default();
    let mut session =
        ClientSession::start(fixture.options(500, "tick"), Box::new(output.clone()))
            .await
            .unwrap();

    // The worker is mid-sleep; a timer on this runtime must still fire while
    // stop waits for it.
    let ticker = tokio::spawn(async {
        tokio::time::sleep(Duration::from_millis(20)).await;
        std::time::Instant::now()
    });
    let stop_started = std::time::Instant::now();
    session.stop().await;
    let stopped = std::time::Instant::now();

    let ticked = ticker.await.unwrap();
    assert!(ticked < stopped);
    assert!(ticked.duration_since(stop_started) < Duration::from_millis(300));
    assert!(output.lines().is_empty());

    session.stop().await;
    session.shutdown();
}
