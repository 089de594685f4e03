//! Configuration service definitions for caller ↔ manager RPC.

use crate::rpc::BusResult;
use crate::value::{ConfigMap, ValueCell};

/// Service exposed by the manager for every published application.
///
/// Each call names the target object by its path,
/// `/com/system/configurationManager/Application/<name>`.
#[tarpc::service]
pub trait ConfigurationService {
    /// Returns the full key → value mapping of the application.
    async fn get_configuration(object_path: String) -> BusResult<ConfigMap>;

    /// Sets one key. `None` is an unset value and is rejected.
    /// On success the document is persisted and `configurationChanged` is broadcast.
    async fn change_configuration(
        object_path: String,
        key: String,
        value: Option<ValueCell>,
    ) -> BusResult<()>;

    /// Names of all published applications, sorted.
    async fn list_applications() -> Vec<String>;

    /// Liveness probe.
    async fn ping() -> bool;

    /// Build SHA of the manager.
    async fn version() -> String;
}

/// Callback service for broadcasts (manager → subscriber).
/// Subscribers implement this service; the manager calls into it.
#[tarpc::service]
pub trait SignalSubscriber {
    /// Object paths this subscriber wants signals for. Empty means all.
    /// Called once when the subscriber connects.
    async fn match_rules() -> Vec<String>;

    /// Registration is complete; signals matching the rules will be delivered.
    async fn subscribed(subscriber_id: u64);

    /// `configurationChanged`: the full mapping of the changed application.
    async fn configuration_changed(object_path: String, interface: String, config: ConfigMap);

    /// The manager is shutting down and releasing its service name.
    async fn manager_stopping();

    /// Ping to check if subscriber is still alive. Returns true if healthy.
    async fn ping() -> bool;
}
