//! RPC server implementation for the configuration manager.
//!
//! Serves `ConfigurationService` for every document in the registry and keeps
//! track of connected `SignalSubscriber`s for `configurationChanged` broadcasts.

use crate::document::{ConfigDocument, SignalEmitter};
use crate::error::{ConfigError, ConfigResult};
use crate::manager::registry::DocumentRegistry;
use crate::paths;
use crate::rpc::configuration_service::{ConfigurationService, SignalSubscriberClient};
use crate::rpc::{AddressFileContent, BusFault, BusResult};
use crate::value::{ConfigMap, ValueCell};
use crate::BUILD_SHA;
use async_trait::async_trait;
use futures::StreamExt;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tarpc::server::{self, Channel};
use tarpc::tokio_serde::formats::Bincode;
use tokio::sync::{broadcast, Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Unique subscriber ID for tracking connected subscribers.
type SubscriberId = u64;

/// Interval between subscriber liveness sweeps.
const SUBSCRIBER_CLEANUP_INTERVAL: Duration = Duration::from_secs(30);

struct Subscriber {
    client: SignalSubscriberClient,
    /// Object paths the subscriber listens to; empty means all.
    match_rules: Vec<String>,
}

impl Subscriber {
    fn matches(&self, object_path: &str) -> bool {
        self.match_rules.is_empty() || self.match_rules.iter().any(|rule| rule == object_path)
    }
}

/// Subscriber tracking - stores callback clients for broadcasts.
pub struct SubscriberRegistry {
    subscribers: HashMap<SubscriberId, Subscriber>,
    next_id: SubscriberId,
}

impl SubscriberRegistry {
    pub fn new() -> Self {
        Self {
            subscribers: HashMap::new(),
            next_id: 0,
        }
    }

    /// Add a new subscriber with its callback client. Returns the assigned ID.
    pub fn add(&mut self, client: SignalSubscriberClient, match_rules: Vec<String>) -> SubscriberId {
        let id = self.next_id;
        self.next_id += 1;
        self.subscribers
            .insert(id, Subscriber { client, match_rules });
        id
    }

    /// Remove a subscriber by ID.
    pub fn remove(&mut self, id: &SubscriberId) {
        self.subscribers.remove(id);
    }

    /// Get count of active subscribers.
    pub fn count(&self) -> usize {
        self.subscribers.len()
    }

    /// Send `configurationChanged` to every subscriber matching `object_path`.
    /// Returns IDs of failed subscribers for cleanup.
    pub async fn broadcast_configuration_changed(
        &self,
        object_path: &str,
        config: &ConfigMap,
    ) -> Vec<SubscriberId> {
        let mut failed = Vec::new();

        for (id, subscriber) in &self.subscribers {
            if !subscriber.matches(object_path) {
                continue;
            }
            if subscriber
                .client
                .configuration_changed(
                    tarpc::context::current(),
                    object_path.to_string(),
                    paths::INTERFACE_NAME.to_string(),
                    config.clone(),
                )
                .await
                .is_err()
            {
                failed.push(*id);
            }
        }

        failed
    }

    /// Tell every subscriber the manager is going away.
    pub async fn broadcast_stopping(&self) {
        for (id, subscriber) in &self.subscribers {
            if let Err(e) = subscriber
                .client
                .manager_stopping(tarpc::context::current())
                .await
            {
                debug!("Subscriber {} missed stop notification: {}", id, e);
            }
        }
    }

    /// Ping all subscribers to check if they're alive.
    /// Returns IDs of subscribers that failed to respond.
    pub async fn ping_all(&self) -> Vec<SubscriberId> {
        let mut failed = Vec::new();

        for (id, subscriber) in &self.subscribers {
            match subscriber.client.ping(tarpc::context::current()).await {
                Ok(true) => {}
                _ => failed.push(*id),
            }
        }

        failed
    }
}

impl Default for SubscriberRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// [`SignalEmitter`] delivering broadcasts to connected subscribers.
pub struct SignalBroadcaster {
    subscribers: Arc<RwLock<SubscriberRegistry>>,
}

impl SignalBroadcaster {
    pub fn new(subscribers: Arc<RwLock<SubscriberRegistry>>) -> Self {
        Self { subscribers }
    }
}

#[async_trait]
impl SignalEmitter for SignalBroadcaster {
    async fn emit_configuration_changed(&self, object_path: &str, config: ConfigMap) {
        let failed = {
            let registry = self.subscribers.read().await;
            registry
                .broadcast_configuration_changed(object_path, &config)
                .await
        };

        if !failed.is_empty() {
            let mut registry = self.subscribers.write().await;
            for id in failed {
                registry.remove(&id);
                info!("Removed dead subscriber: {}", id);
            }
        }
        debug!(
            "Emitted {} for {}",
            paths::CONFIG_CHANGED_SIGNAL,
            object_path
        );
    }
}

/// Server implementation for ConfigurationService.
#[derive(Clone)]
pub struct ManagerServer {
    registry: Arc<DocumentRegistry>,
}

impl ManagerServer {
    pub fn new(registry: Arc<DocumentRegistry>) -> Self {
        Self { registry }
    }

    fn document(&self, object_path: &str) -> BusResult<Arc<ConfigDocument>> {
        self.registry
            .by_object_path(object_path)
            .ok_or_else(|| BusFault::UnknownObject {
                path: object_path.to_string(),
            })
    }
}

impl ConfigurationService for ManagerServer {
    async fn get_configuration(
        self,
        _: tarpc::context::Context,
        object_path: String,
    ) -> BusResult<ConfigMap> {
        let document = self.document(&object_path)?;
        Ok(document.get_all().await)
    }

    async fn change_configuration(
        self,
        _: tarpc::context::Context,
        object_path: String,
        key: String,
        value: Option<ValueCell>,
    ) -> BusResult<()> {
        let document = self.document(&object_path)?;
        document.change_one(&key, value).await.map_err(|e| {
            debug!("Rejected change of {}: {}", object_path, e);
            BusFault::from(e)
        })
    }

    async fn list_applications(self, _: tarpc::context::Context) -> Vec<String> {
        self.registry.application_names()
    }

    async fn ping(self, _: tarpc::context::Context) -> bool {
        true
    }

    async fn version(self, _: tarpc::context::Context) -> String {
        BUILD_SHA.to_string()
    }
}

struct RunningBus {
    address: AddressFileContent,
    shutdown_tx: broadcast::Sender<()>,
    tasks: Vec<JoinHandle<()>>,
}

/// The manager's bus endpoint: RPC listener, subscriber listener and cleanup task.
pub struct ManagerBus {
    registry: Arc<DocumentRegistry>,
    subscribers: Arc<RwLock<SubscriberRegistry>>,
    running: Mutex<Option<RunningBus>>,
}

impl ManagerBus {
    pub fn new(
        registry: Arc<DocumentRegistry>,
        subscribers: Arc<RwLock<SubscriberRegistry>>,
    ) -> Self {
        Self {
            registry,
            subscribers,
            running: Mutex::new(None),
        }
    }

    /// Starts serving on ephemeral loopback ports and returns immediately.
    /// Calling `run` on a running bus returns the existing address.
    ///
    /// # Errors
    ///
    /// `Connection` if the registry is not initialized or a port cannot be bound.
    pub async fn run(&self) -> ConfigResult<AddressFileContent> {
        use tarpc::client;
        use tarpc::serde_transport::tcp;

        let mut running = self.running.lock().await;
        if let Some(bus) = running.as_ref() {
            return Ok(bus.address.clone());
        }
        if !self.registry.is_initialized() {
            return Err(ConfigError::connection(
                "Cannot publish applications before the registry is initialized",
            ));
        }

        let bind_error = |e: std::io::Error| ConfigError::connection(format!("Failed to bind: {}", e));
        let mut listener = tcp::listen("127.0.0.1:0", Bincode::default)
            .await
            .map_err(bind_error)?;
        let mut subscriber_listener = tcp::listen("127.0.0.1:0", Bincode::default)
            .await
            .map_err(bind_error)?;

        let address = AddressFileContent {
            port: listener.local_addr().port(),
            subscriber_port: subscriber_listener.local_addr().port(),
            pid: std::process::id(),
        };
        let (shutdown_tx, _) = broadcast::channel::<()>(1);

        let server_task = {
            let registry = self.registry.clone();
            let mut shutdown_rx = shutdown_tx.subscribe();
            tokio::spawn(async move {
                loop {
                    tokio::select! {
                        Some(result) = listener.next() => {
                            match result {
                                Ok(transport) => {
                                    let server = ManagerServer::new(registry.clone());
                                    let channel = server::BaseChannel::with_defaults(transport);
                                    tokio::spawn(async move {
                                        channel.execute(server.serve()).for_each(|response| async {
                                            tokio::spawn(response);
                                        }).await;
                                    });
                                }
                                Err(e) => warn!("Accept error: {}", e),
                            }
                        }
                        _ = shutdown_rx.recv() => break,
                    }
                }
                debug!("RPC listener stopped");
            })
        };

        let subscriber_task = {
            let subscribers = self.subscribers.clone();
            let mut shutdown_rx = shutdown_tx.subscribe();
            tokio::spawn(async move {
                loop {
                    tokio::select! {
                        Some(result) = subscriber_listener.next() => {
                            match result {
                                Ok(transport) => {
                                    let callback_client = SignalSubscriberClient::new(
                                        client::Config::default(),
                                        transport,
                                    ).spawn();
                                    tokio::spawn(register_subscriber(subscribers.clone(), callback_client));
                                }
                                Err(e) => warn!("Subscriber accept error: {}", e),
                            }
                        }
                        _ = shutdown_rx.recv() => break,
                    }
                }
                debug!("Subscriber listener stopped");
            })
        };

        let cleanup_task = tokio::spawn(run_subscriber_cleanup(
            self.subscribers.clone(),
            shutdown_tx.subscribe(),
        ));

        info!(
            "Serving {} application(s) on ports {} (main) and {} (subscriber)",
            self.registry.application_names().len(),
            address.port,
            address.subscriber_port
        );

        *running = Some(RunningBus {
            address: address.clone(),
            shutdown_tx,
            tasks: vec![server_task, subscriber_task, cleanup_task],
        });
        Ok(address)
    }

    /// Stops accepting connections and notifies subscribers. In-flight calls
    /// are not aborted. Idempotent; a no-op if the bus never ran.
    pub async fn stop(&self) {
        let Some(bus) = self.running.lock().await.take() else {
            debug!("Stop requested but bus is not running");
            return;
        };

        self.subscribers.read().await.broadcast_stopping().await;
        let _ = bus.shutdown_tx.send(());
        for task in bus.tasks {
            if let Err(e) = task.await {
                warn!("Bus task ended abnormally: {}", e);
            }
        }
        info!("Bus stopped");
    }

    /// Address of the running bus.
    pub async fn address(&self) -> Option<AddressFileContent> {
        self.running.lock().await.as_ref().map(|bus| bus.address.clone())
    }

    /// Number of registered subscribers.
    pub async fn subscriber_count(&self) -> usize {
        self.subscribers.read().await.count()
    }
}

/// Ask a newly connected subscriber for its match rules, then register it.
async fn register_subscriber(
    subscribers: Arc<RwLock<SubscriberRegistry>>,
    client: SignalSubscriberClient,
) {
    let match_rules = match client.match_rules(tarpc::context::current()).await {
        Ok(rules) => rules,
        Err(e) => {
            warn!("Subscriber did not report match rules: {}", e);
            return;
        }
    };

    let rule_count = match_rules.len();
    let id = subscribers.write().await.add(client.clone(), match_rules);

    if let Err(e) = client.subscribed(tarpc::context::current(), id).await {
        warn!("Subscriber {} dropped during registration: {}", id, e);
        subscribers.write().await.remove(&id);
        return;
    }
    info!("Subscriber connected: {} ({} match rules)", id, rule_count);
}

/// Background task to periodically clean up dead subscriber connections.
/// Sends a ping to each subscriber and removes those that don't respond.
async fn run_subscriber_cleanup(
    subscribers: Arc<RwLock<SubscriberRegistry>>,
    mut shutdown_rx: broadcast::Receiver<()>,
) {
    let mut interval = tokio::time::interval(SUBSCRIBER_CLEANUP_INTERVAL);

    loop {
        tokio::select! {
            _ = interval.tick() => {
                let failed = {
                    let registry = subscribers.read().await;
                    if registry.count() == 0 {
                        continue;
                    }
                    registry.ping_all().await
                };

                if !failed.is_empty() {
                    let mut registry = subscribers.write().await;
                    for id in &failed {
                        registry.remove(id);
                    }
                    info!(
                        "Cleanup: {} dead subscribers removed, {} remaining",
                        failed.len(),
                        registry.count()
                    );
                }
            }
            _ = shutdown_rx.recv() => {
                break;
            }
        }
    }
}
