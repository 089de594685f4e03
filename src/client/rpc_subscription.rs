//! RPC subscription for receiving `configurationChanged` from the manager.
//!
//! The client connects to the manager's subscriber port and runs a
//! `SignalSubscriber` server on that connection; the manager calls into it.

use crate::error::{ConfigError, ConfigResult};
use crate::rpc::configuration_service::SignalSubscriber;
use crate::rpc::AddressFileContent;
use crate::value::ConfigMap;
use futures::StreamExt;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tarpc::server::{self, Channel};
use tarpc::tokio_serde::formats::Bincode;
use tokio::sync::{mpsc, oneshot};
use tracing::debug;

/// How long to wait for the manager to confirm registration.
const SUBSCRIBE_TIMEOUT: Duration = Duration::from_secs(5);

/// Events received from the manager via subscription.
#[derive(Debug, Clone, PartialEq)]
pub enum SubscriptionEvent {
    /// Full mapping of an application after one of its keys changed
    ConfigurationChanged {
        object_path: String,
        config: ConfigMap,
    },
    /// Manager is shutting down
    ManagerStopping,
}

/// Handler that implements SignalSubscriber and forwards events to a channel.
#[derive(Clone)]
struct SubscriptionHandler {
    tx: mpsc::UnboundedSender<SubscriptionEvent>,
    match_rules: Arc<Vec<String>>,
    subscribed_tx: Arc<Mutex<Option<oneshot::Sender<u64>>>>,
}

impl SignalSubscriber for SubscriptionHandler {
    async fn match_rules(self, _: tarpc::context::Context) -> Vec<String> {
        self.match_rules.as_ref().clone()
    }

    async fn subscribed(self, _: tarpc::context::Context, subscriber_id: u64) {
        let sender = self.subscribed_tx.lock().ok().and_then(|mut slot| slot.take());
        if let Some(sender) = sender {
            let _ = sender.send(subscriber_id);
        }
    }

    async fn configuration_changed(
        self,
        _: tarpc::context::Context,
        object_path: String,
        interface: String,
        config: ConfigMap,
    ) {
        debug!("Signal on {} ({})", object_path, interface);
        let _ = self.tx.send(SubscriptionEvent::ConfigurationChanged {
            object_path,
            config,
        });
    }

    async fn manager_stopping(self, _: tarpc::context::Context) {
        debug!("Manager stopping notification");
        let _ = self.tx.send(SubscriptionEvent::ManagerStopping);
    }

    async fn ping(self, _: tarpc::context::Context) -> bool {
        true
    }
}

/// Live subscription to `configurationChanged` signals.
///
/// Architecture:
/// 1. Subscriber connects to the manager's subscriber port
/// 2. Subscriber runs a SignalSubscriber RPC server on that connection
/// 3. Manager asks for the match rules, registers the subscriber and confirms
///    with `subscribed`
/// 4. Manager calls into the subscriber's server to deliver signals
pub struct SignalSubscription {
    rx: mpsc::UnboundedReceiver<SubscriptionEvent>,
    subscriber_id: u64,
    server_task: tokio::task::JoinHandle<()>,
}

impl SignalSubscription {
    /// Connect to the manager's subscriber port and wait until registered.
    ///
    /// `match_rules` lists the object paths to receive signals for; empty
    /// means every application.
    ///
    /// # Errors
    ///
    /// `Connection` if the port is unreachable or the manager never confirms.
    pub async fn connect(
        address: &AddressFileContent,
        match_rules: Vec<String>,
    ) -> ConfigResult<Self> {
        use tarpc::serde_transport::tcp;

        let subscriber_addr = format!("127.0.0.1:{}", address.subscriber_port);
        let transport = tcp::connect(&subscriber_addr, Bincode::default)
            .await
            .map_err(|e| {
                ConfigError::connection(format!(
                    "Failed to connect to subscriber port {}: {}",
                    address.subscriber_port, e
                ))
            })?;

        let (tx, rx) = mpsc::unbounded_channel();
        let (subscribed_tx, subscribed_rx) = oneshot::channel();
        let handler = SubscriptionHandler {
            tx,
            match_rules: Arc::new(match_rules),
            subscribed_tx: Arc::new(Mutex::new(Some(subscribed_tx))),
        };

        let server_task = tokio::spawn(async move {
            let channel = server::BaseChannel::with_defaults(transport);
            channel
                .execute(handler.serve())
                .for_each(|response| async {
                    tokio::spawn(response);
                })
                .await;
            debug!("Subscription callback server ended");
        });

        let subscriber_id = match tokio::time::timeout(SUBSCRIBE_TIMEOUT, subscribed_rx).await {
            Ok(Ok(id)) => id,
            Ok(Err(_)) => {
                server_task.abort();
                return Err(ConfigError::connection(
                    "Manager closed the subscription before confirming it",
                ));
            }
            Err(_) => {
                server_task.abort();
                return Err(ConfigError::connection(
                    "Timed out waiting for subscription confirmation",
                ));
            }
        };
        debug!("Subscribed as {}", subscriber_id);

        Ok(Self {
            rx,
            subscriber_id,
            server_task,
        })
    }

    /// ID the manager assigned to this subscriber.
    pub fn subscriber_id(&self) -> u64 {
        self.subscriber_id
    }

    /// Receive the next subscription event.
    /// Returns None if the connection is closed.
    pub async fn recv(&mut self) -> Option<SubscriptionEvent> {
        self.rx.recv().await
    }
}

impl Drop for SignalSubscription {
    fn drop(&mut self) {
        self.server_task.abort();
    }
}
