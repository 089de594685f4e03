//! Integration tests for the manager's bus endpoint.
//!
//! These tests start a real `ManagerBus` on ephemeral loopback ports and talk
//! to it with the client-side connection and subscription. No mocks are used.

mod concurrent_tests;

use crate::client::{BusConnection, SignalSubscription, SubscriptionEvent};
use crate::manager::{DocumentRegistry, ManagerBus, SignalBroadcaster, SubscriberRegistry};
use crate::paths;
use crate::rpc::AddressFileContent;
use crate::test_support::write_json;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::sync::RwLock;

pub const APP1: &str = r#"{"Timeout":500,"TimeoutPhrase":"hi"}"#;
pub const APP2: &str = r#"{"Enabled":true,"Ratio":0.5}"#;

/// Test harness owning a configuration directory and a running bus.
pub struct TestManager {
    pub dir: TempDir,
    pub registry: Arc<DocumentRegistry>,
    pub bus: ManagerBus,
    pub address: AddressFileContent,
}

impl TestManager {
    /// Writes `files` into a fresh directory and starts serving them.
    pub async fn start(files: &[(&str, &str)]) -> Self {
        let dir = tempfile::tempdir().unwrap();
        for (name, content) in files {
            write_json(dir.path(), &format!("{}.json", name), content);
        }

        let subscribers = Arc::new(RwLock::new(SubscriberRegistry::new()));
        let registry = Arc::new(DocumentRegistry::new(dir.path()));
        registry
            .initialize(Arc::new(SignalBroadcaster::new(subscribers.clone())))
            .unwrap();

        let bus = ManagerBus::new(registry.clone(), subscribers);
        let address = bus.run().await.unwrap();

        Self {
            dir,
            registry,
            bus,
            address,
        }
    }

    /// Serves `app1` and `app2`.
    pub async fn start_default() -> Self {
        Self::start(&[("app1", APP1), ("app2", APP2)]).await
    }

    pub async fn connect(&self) -> BusConnection {
        BusConnection::connect_to(&self.address).await.unwrap()
    }

    /// Subscribes to the given applications (all of them when empty).
    pub async fn subscribe(&self, apps: &[&str]) -> SignalSubscription {
        let rules = apps.iter().map(|app| paths::object_path(app)).collect();
        SignalSubscription::connect(&self.address, rules)
            .await
            .unwrap()
    }

    pub fn file(&self, app: &str) -> PathBuf {
        self.dir.path().join(format!("{}.json", app))
    }

    pub fn config_dir(&self) -> &Path {
        self.dir.path()
    }
}

/// Next event on `subscription`, failing the test after two seconds.
pub async fn next_event(subscription: &mut SignalSubscription) -> SubscriptionEvent {
    tokio::time::timeout(Duration::from_secs(2), subscription.recv())
        .await
        .expect("timed out waiting for a signal")
        .expect("subscription closed")
}
