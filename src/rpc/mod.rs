//! RPC service definitions for the configuration bus.
//!
//! This module defines the tarpc services for:
//! - Caller → Manager: reading and changing application configuration
//! - Manager → Subscriber: `configurationChanged` broadcasts and liveness probes

pub mod configuration_service;

use crate::error::{ConfigError, ConfigResult};
use crate::paths;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Faults returned by manager RPC methods.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum BusFault {
    /// Empty key or unset value
    InvalidArgument { message: String },
    /// No application is published at the requested object path
    UnknownObject { path: String },
    /// Internal error
    Internal { message: String },
}

impl std::fmt::Display for BusFault {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BusFault::InvalidArgument { message } => write!(f, "Invalid argument: {}", message),
            BusFault::UnknownObject { path } => write!(f, "Unknown object: {}", path),
            BusFault::Internal { message } => write!(f, "Internal error: {}", message),
        }
    }
}

impl std::error::Error for BusFault {}

impl From<ConfigError> for BusFault {
    fn from(err: ConfigError) -> Self {
        match err {
            ConfigError::InvalidArgument { message } => BusFault::InvalidArgument { message },
            other => BusFault::Internal {
                message: other.to_string(),
            },
        }
    }
}

/// Result type for manager RPC methods.
pub type BusResult<T> = Result<T, BusFault>;

/// Content of the address file published by the service owner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AddressFileContent {
    /// Port serving `ConfigurationService`
    pub port: u16,
    /// Port accepting `SignalSubscriber` connections
    pub subscriber_port: u16,
    /// PID of the owning manager
    pub pid: u32,
}

/// Reads the address published by the owner of `service`.
///
/// # Errors
///
/// `Connection` if the service is not running or its address file is unreadable.
pub fn read_service_address(bus_dir: &Path, service: &str) -> ConfigResult<AddressFileContent> {
    let path = paths::service_address_path(bus_dir, service);
    let content = std::fs::read_to_string(&path).map_err(|e| {
        ConfigError::connection(format!(
            "Service {} is not running ({}: {})",
            service,
            path.display(),
            e
        ))
    })?;
    serde_json::from_str(&content).map_err(|e| {
        ConfigError::connection(format!(
            "Invalid address file {}: {}",
            path.display(),
            e
        ))
    })
}

#[cfg(test)]
#[path = "tests/rpc_tests.rs"]
mod tests;
