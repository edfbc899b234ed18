//! Tracking sync runtime: push channel, fallback pollers, and the consumer
//! facing [`TrackingService`].

pub(crate) mod channel;
pub mod config;
pub mod error;
pub(crate) mod poller;
pub mod query;
pub mod service;

pub use config::SyncConfig;
pub use error::{ConnectionError, FetchError, FetchFailure};
pub use query::{HttpShipmentQuery, ShipmentQuery};
pub use service::{ListenerGuard, ShipmentHandle, TrackingService};
