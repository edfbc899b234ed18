//! parceltrack-sync: deterministic tracking sync engine.
//!
//! Connection lifecycle, ref-counted subscriptions, the per-shipment
//! staleness gate, fallback-poll bookkeeping and snapshot reconciliation.
//! No IO and no clocks: the runtime feeds inputs in and executes the
//! returned effects.

pub mod connection;
pub mod dispatcher;
pub mod engine;
pub mod listeners;
pub mod poll;
pub mod reconcile;
pub mod registry;

pub use connection::{BackoffPolicy, ConnectionMachine, ConnectionStats, Retry, Transition};
pub use dispatcher::{StalenessGate, Verdict};
pub use engine::{Effect, Effects, SyncEngine};
pub use listeners::{Callback, KeyedListeners, ListenerId, Listeners};
pub use poll::PollSet;
pub use reconcile::{MergeOutcome, Reconciler};
pub use registry::{Release, SubscriptionRegistry};
