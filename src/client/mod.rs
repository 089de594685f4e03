//! Configuration client: mirrors one application's settings from the manager.
//!
//! - **Connection (`rpc_client.rs`)**: method calls on `ConfigurationService`.
//! - **Subscription (`rpc_subscription.rs`)**: receives `configurationChanged`.
//! - **Session (`session.rs`)**: local file, snapshot and periodic worker.

pub mod rpc_client;
pub mod rpc_subscription;
pub mod session;

pub use rpc_client::{BusConnection, CallError};
pub use rpc_subscription::{SignalSubscription, SubscriptionEvent};
pub use session::{ClientSession, SessionEnd, SessionOptions, SessionSnapshot};
