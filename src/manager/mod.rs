//! Configuration manager: owns the application documents and serves them on the bus.
//!
//! ## Architecture
//!
//! - **Registry (`registry.rs`)**: scans the configuration directory and loads
//!   one document per `*.json` file.
//! - **Server (`rpc_server.rs`)**: tarpc server exposing `ConfigurationService`
//!   and delivering `configurationChanged` to subscribers.
//! - **Service name (`service_name.rs`)**: exclusive ownership of the
//!   well-known service name and its published address.

pub mod registry;
pub mod rpc_server;
pub mod service_name;

#[cfg(test)]
pub(crate) mod rpc_tests;

pub use registry::DocumentRegistry;
pub use rpc_server::{ManagerBus, SignalBroadcaster, SubscriberRegistry};
pub use service_name::ServiceName;
