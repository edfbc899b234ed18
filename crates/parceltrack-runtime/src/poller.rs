//! Fallback poll timers: one interval task per armed shipment.
//!
//! The first tick fires immediately. Each tick spawns a detached fetch so
//! that stopping the timer never cancels a request already in flight; a
//! response that lands after the shipment was released is discarded by
//! the engine.

use std::collections::HashMap;
use std::sync::Weak;
use std::time::Duration;

use parceltrack_core::TrackingNumber;
use tokio::task::AbortHandle;
use tokio::time::{MissedTickBehavior, interval};

use crate::error::FetchFailure;
use crate::query::{ShipmentQuery, fetch_poll_event};
use crate::service::Shared;

#[derive(Debug, Default)]
pub(crate) struct Pollers {
    tasks: HashMap<TrackingNumber, AbortHandle>,
}

impl Pollers {
    pub(crate) fn insert(&mut self, id: TrackingNumber, handle: AbortHandle) {
        if let Some(previous) = self.tasks.insert(id, handle) {
            previous.abort();
        }
    }

    pub(crate) fn stop(&mut self, id: &TrackingNumber) -> bool {
        match self.tasks.remove(id) {
            Some(handle) => {
                handle.abort();
                true
            }
            None => false,
        }
    }

    pub(crate) fn stop_all(&mut self) {
        for (_, handle) in self.tasks.drain() {
            handle.abort();
        }
    }

    pub(crate) fn is_running(&self, id: &TrackingNumber) -> bool {
        self.tasks.contains_key(id)
    }

    pub(crate) fn len(&self) -> usize {
        self.tasks.len()
    }
}

impl Drop for Pollers {
    fn drop(&mut self) {
        self.stop_all();
    }
}

/// Timer loop for one shipment. Exits when the service is gone.
pub(crate) async fn run_poller<Q: ShipmentQuery>(
    shared: Weak<Shared<Q>>,
    id: TrackingNumber,
    period: Duration,
) {
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        ticker.tick().await;
        if shared.strong_count() == 0 {
            break;
        }
        tracing::debug!(tracking_number = %id, "poll tick");
        tokio::spawn(refresh(shared.clone(), id.clone()));
    }
}

/// One snapshot + history fetch fed through the staleness gate.
pub(crate) async fn refresh<Q: ShipmentQuery>(shared: Weak<Shared<Q>>, id: TrackingNumber) {
    let Some(service) = shared.upgrade() else {
        return;
    };
    match fetch_poll_event(&service.query, &id).await {
        Ok(event) => service.ingest_event(&event),
        Err(error) => {
            if !service.is_subscribed(&id) {
                tracing::debug!(tracking_number = %id, error = %error, "fetch failed after release");
                return;
            }
            tracing::warn!(tracking_number = %id, error = %error, "shipment fetch failed");
            service.notify_fetch_error(&FetchFailure {
                tracking_number: id,
                error,
            });
        }
    }
}
