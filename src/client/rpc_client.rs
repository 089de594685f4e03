//! RPC client for the configuration manager using tarpc.
//!
//! Resolves the manager through its published address file and exposes the
//! per-application methods by application name.

use crate::error::{ConfigError, ConfigResult};
use crate::paths;
use crate::rpc::configuration_service::ConfigurationServiceClient;
use crate::rpc::{read_service_address, AddressFileContent, BusFault};
use crate::value::{ConfigMap, ValueCell};
use std::path::Path;
use tarpc::client;
use tarpc::tokio_serde::formats::Bincode;
use tracing::debug;

/// Failure of a call to the manager.
#[derive(Debug)]
pub enum CallError {
    /// The call did not complete (connection lost, deadline exceeded)
    Transport(client::RpcError),
    /// The manager rejected the call
    Fault(BusFault),
}

impl std::fmt::Display for CallError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CallError::Transport(e) => write!(f, "RPC failed: {}", e),
            CallError::Fault(fault) => write!(f, "{}", fault),
        }
    }
}

impl std::error::Error for CallError {}

impl From<client::RpcError> for CallError {
    fn from(err: client::RpcError) -> Self {
        CallError::Transport(err)
    }
}

impl From<BusFault> for CallError {
    fn from(fault: BusFault) -> Self {
        CallError::Fault(fault)
    }
}

/// Connection to the manager's `ConfigurationService`.
pub struct BusConnection {
    client: ConfigurationServiceClient,
    address: AddressFileContent,
}

impl BusConnection {
    /// Connects to the owner of the configuration service found in `bus_dir`.
    ///
    /// # Errors
    ///
    /// `Connection` if the service is not running or not reachable.
    pub async fn connect(bus_dir: &Path) -> ConfigResult<Self> {
        let address = read_service_address(bus_dir, paths::SERVICE_NAME)?;
        Self::connect_to(&address).await
    }

    /// Connects to a known manager address.
    pub async fn connect_to(address: &AddressFileContent) -> ConfigResult<Self> {
        use tarpc::serde_transport::tcp;

        let addr = format!("127.0.0.1:{}", address.port);
        let transport = tcp::connect(&addr, Bincode::default)
            .await
            .map_err(|e| ConfigError::connection(format!("Failed to connect to {}: {}", addr, e)))?;
        let client = ConfigurationServiceClient::new(client::Config::default(), transport).spawn();
        debug!("Connected to manager at {}", addr);

        Ok(Self {
            client,
            address: address.clone(),
        })
    }

    /// Address this connection was opened to.
    pub fn address(&self) -> &AddressFileContent {
        &self.address
    }

    /// Returns true if the manager answers a ping.
    pub async fn is_connected(&self) -> bool {
        matches!(
            self.client.ping(tarpc::context::current()).await,
            Ok(true)
        )
    }

    /// Full configuration of application `app_name`.
    pub async fn get_configuration(&self, app_name: &str) -> Result<ConfigMap, CallError> {
        Ok(self
            .client
            .get_configuration(tarpc::context::current(), paths::object_path(app_name))
            .await??)
    }

    /// Sets `key` of application `app_name`; `None` is an unset value.
    pub async fn change_configuration(
        &self,
        app_name: &str,
        key: &str,
        value: Option<ValueCell>,
    ) -> Result<(), CallError> {
        Ok(self
            .client
            .change_configuration(
                tarpc::context::current(),
                paths::object_path(app_name),
                key.to_string(),
                value,
            )
            .await??)
    }

    /// Names of all applications published by the manager.
    pub async fn list_applications(&self) -> Result<Vec<String>, CallError> {
        Ok(self
            .client
            .list_applications(tarpc::context::current())
            .await?)
    }

    /// Build SHA of the manager.
    pub async fn version(&self) -> Result<String, CallError> {
        Ok(self.client.version(tarpc::context::current()).await?)
    }
}
