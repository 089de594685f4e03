//! Configuration manager and client communicating over a local message bus.
//!
//! The manager publishes one configuration document per application found in
//! its configuration directory. Clients read and change keys by RPC and
//! receive the full mapping of an application whenever one of its keys changes.

pub mod client;
pub mod codec;
pub mod document;
pub mod error;
pub mod logging;
pub mod manager;
pub mod paths;
pub mod rpc;
pub mod shutdown;
pub mod value;

#[cfg(test)]
pub(crate) mod test_support;

/// Git SHA the binaries were built from, or "unknown".
pub const BUILD_SHA: &str = env!("CONFIGURATION_MANAGER_GIT_SHA");
