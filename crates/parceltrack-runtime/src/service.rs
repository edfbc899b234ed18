//! `TrackingService`: the consumer-facing façade.
//!
//! Owns the `SyncEngine` behind a mutex and executes its effects: control
//! messages go to the channel task, poller edges start or stop timers,
//! view changes fan out to listeners. The engine lock is always released
//! before any listener runs, so callbacks may call back into the service
//! (subscribe, release, drop guards) freely.
//!
//! All methods that spawn work must be called from within a tokio runtime.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use parceltrack_core::rest::{HistoryEntry, poll_event};
use parceltrack_core::{
    ConnectionState, ConnectionStatus, ControlMessage, ShipmentSnapshot, ShipmentView,
    TrackingEvent, TrackingNumber, project,
};
use parceltrack_sync::{
    ConnectionStats, Effect, Effects, KeyedListeners, ListenerId, Listeners, SyncEngine,
};
use tokio::sync::mpsc::{self, UnboundedSender};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::channel::{ChannelSettings, run_channel};
use crate::config::SyncConfig;
use crate::error::{ConnectionError, FetchError, FetchFailure};
use crate::poller::{Pollers, refresh, run_poller};
use crate::query::{HttpShipmentQuery, ShipmentQuery};

/// How long `shutdown()` waits for the channel task to send its close frame.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

// ─── Handles ─────────────────────────────────────────────────────────

type Release = Box<dyn FnOnce() + Send + Sync>;

/// Scoped interest in one shipment. Dropping it releases the interest.
#[must_use = "dropping the handle releases the subscription immediately"]
pub struct ShipmentHandle {
    tracking_number: TrackingNumber,
    release: Option<Release>,
}

impl ShipmentHandle {
    pub fn tracking_number(&self) -> &TrackingNumber {
        &self.tracking_number
    }

    /// Release now. Equivalent to dropping the handle.
    pub fn release(mut self) {
        if let Some(release) = self.release.take() {
            release();
        }
    }
}

impl Drop for ShipmentHandle {
    fn drop(&mut self) {
        if let Some(release) = self.release.take() {
            release();
        }
    }
}

impl std::fmt::Debug for ShipmentHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShipmentHandle")
            .field("tracking_number", &self.tracking_number)
            .finish_non_exhaustive()
    }
}

/// Registration of one listener. Dropping it unregisters.
#[must_use = "dropping the guard unregisters the listener immediately"]
pub struct ListenerGuard {
    remove: Option<Release>,
}

impl ListenerGuard {
    fn new(remove: impl FnOnce() + Send + Sync + 'static) -> Self {
        Self {
            remove: Some(Box::new(remove)),
        }
    }

    /// Keep the listener registered for the life of the service.
    pub fn detach(mut self) {
        self.remove = None;
    }
}

impl Drop for ListenerGuard {
    fn drop(&mut self) {
        if let Some(remove) = self.remove.take() {
            remove();
        }
    }
}

impl std::fmt::Debug for ListenerGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ListenerGuard")
            .field("active", &self.remove.is_some())
            .finish()
    }
}

// ─── Shared state ────────────────────────────────────────────────────

struct ChannelHandle {
    epoch: u64,
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

#[derive(Default)]
struct ChannelSlot {
    current: Option<ChannelHandle>,
    outbound: Option<UnboundedSender<ControlMessage>>,
    next_epoch: u64,
}

pub(crate) struct Shared<Q> {
    pub(crate) config: SyncConfig,
    pub(crate) query: Q,
    engine: Mutex<SyncEngine>,
    status_listeners: Mutex<Listeners<ConnectionStatus>>,
    shipment_listeners: Mutex<KeyedListeners<TrackingNumber, ShipmentView>>,
    fetch_error_listeners: Mutex<Listeners<FetchFailure>>,
    pollers: Mutex<Pollers>,
    channel: Mutex<ChannelSlot>,
    me: Weak<Self>,
}

impl<Q: ShipmentQuery> Shared<Q> {
    fn with_engine<R>(&self, f: impl FnOnce(&mut SyncEngine) -> R) -> R {
        f(&mut lock(&self.engine))
    }

    pub(crate) fn is_subscribed(&self, id: &TrackingNumber) -> bool {
        lock(&self.engine).is_subscribed(id)
    }

    // ── effects ──

    /// Execute a batch: every channel and timer action first, then the
    /// listener notifications. A listener that re-enters the service
    /// therefore only ever acts after this batch's actions have landed.
    fn apply(&self, effects: Effects) {
        let mut notices = Vec::new();
        for effect in effects {
            match effect {
                Effect::Send(msg) => self.send_control(msg),
                Effect::ArmPoller(id) => self.start_poller(id),
                Effect::DisarmPoller(id) => {
                    lock(&self.pollers).stop(&id);
                }
                Effect::InitialFetch(id) => {
                    tokio::spawn(refresh(self.me.clone(), id));
                }
                Effect::ScheduleHighlightClear {
                    tracking_number,
                    generation,
                } => self.schedule_highlight_clear(tracking_number, generation),
                Effect::StatusChanged { .. } | Effect::ShipmentChanged(_) => notices.push(effect),
                Effect::RetryAfter { .. } | Effect::GaveUp { .. } => {}
            }
        }
        for notice in notices {
            match notice {
                Effect::StatusChanged { to, .. } => self.notify_status(to),
                Effect::ShipmentChanged(view) => self.notify_shipment(&view),
                _ => {}
            }
        }
    }

    fn send_control(&self, msg: ControlMessage) {
        let slot = lock(&self.channel);
        let Some(tx) = slot.outbound.as_ref() else {
            tracing::debug!(tracking_number = %msg.tracking_number, "no channel, control message dropped");
            return;
        };
        if tx.send(msg).is_err() {
            tracing::debug!("channel task gone, control message dropped");
        }
    }

    fn start_poller(&self, id: TrackingNumber) {
        let task = tokio::spawn(run_poller(
            self.me.clone(),
            id.clone(),
            self.config.poll_interval,
        ));
        tracing::debug!(tracking_number = %id, "fallback polling started");
        lock(&self.pollers).insert(id, task.abort_handle());
    }

    fn schedule_highlight_clear(&self, id: TrackingNumber, generation: u64) {
        let shared = self.me.clone();
        let flash = self.config.flash_duration;
        tokio::spawn(async move {
            tokio::time::sleep(flash).await;
            if let Some(service) = shared.upgrade() {
                let fx = service.with_engine(|e| e.clear_highlight(&id, generation));
                service.apply(fx);
            }
        });
    }

    // ── notifications ──

    fn notify_status(&self, state: ConnectionState) {
        let status = state.status();
        let callbacks = lock(&self.status_listeners).snapshot();
        for cb in callbacks {
            cb(&status);
        }
    }

    fn notify_shipment(&self, view: &ShipmentView) {
        let callbacks = lock(&self.shipment_listeners).snapshot(&view.snapshot.tracking_number);
        for cb in callbacks {
            cb(view);
        }
    }

    pub(crate) fn notify_fetch_error(&self, failure: &FetchFailure) {
        let callbacks = lock(&self.fetch_error_listeners).snapshot();
        for cb in callbacks {
            cb(failure);
        }
    }

    // ── inbound ──

    pub(crate) fn ingest_message(&self, raw: &str) {
        let fx = self.with_engine(|e| e.on_message(raw));
        self.apply(fx);
    }

    pub(crate) fn ingest_event(&self, event: &TrackingEvent) {
        let fx = self.with_engine(|e| e.apply_event(event));
        self.apply(fx);
    }

    fn release(&self, session: u64, id: &TrackingNumber) {
        let fx = self.with_engine(|e| e.release_in(session, id));
        self.apply(fx);
    }

    // ── channel lifecycle ──

    fn spawn_channel(&self) {
        let mut slot = lock(&self.channel);
        if let Some(old) = slot.current.take() {
            old.cancel.cancel();
        }
        slot.next_epoch += 1;
        let epoch = slot.next_epoch;
        let (tx, rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();
        let settings = ChannelSettings {
            url: self.config.channel_url.clone(),
            connect_timeout: self.config.connect_timeout,
            heartbeat_interval: self.config.heartbeat_interval,
        };
        let task = tokio::spawn(run_channel(
            self.me.clone(),
            epoch,
            settings,
            rx,
            cancel.clone(),
        ));
        slot.outbound = Some(tx);
        slot.current = Some(ChannelHandle {
            epoch,
            cancel,
            task,
        });
    }

    fn stop_channel(&self) -> Option<JoinHandle<()>> {
        let mut slot = lock(&self.channel);
        slot.outbound = None;
        slot.current.take().map(|handle| {
            handle.cancel.cancel();
            handle.task
        })
    }

    /// Run `f` against the engine only if `epoch` is still the live channel.
    fn for_epoch(&self, epoch: u64, f: impl FnOnce(&mut SyncEngine) -> Effects) -> Option<Effects> {
        let slot = lock(&self.channel);
        let current = slot.current.as_ref().is_some_and(|h| h.epoch == epoch);
        if !current {
            return None;
        }
        Some(self.with_engine(f))
    }

    pub(crate) fn channel_opened(&self, epoch: u64) -> bool {
        match self.for_epoch(epoch, SyncEngine::on_connected) {
            Some(fx) if !fx.is_empty() => {
                self.apply(fx);
                true
            }
            _ => false,
        }
    }

    /// Returns the retry delay, or `None` if the task should exit.
    pub(crate) fn channel_failed(&self, epoch: u64, error: &ConnectionError) -> Option<Duration> {
        tracing::warn!(error = %error, "channel failure");
        let fx = self.for_epoch(epoch, SyncEngine::on_transport_failure)?;
        let retry = fx.retry();
        self.apply(fx);
        retry.map(|(delay, _attempt)| delay)
    }

    pub(crate) fn channel_retry_due(&self, epoch: u64) -> bool {
        match self.for_epoch(epoch, SyncEngine::on_retry_due) {
            Some(fx) if !fx.is_empty() => {
                self.apply(fx);
                true
            }
            _ => false,
        }
    }
}

// ─── Service ─────────────────────────────────────────────────────────

pub struct TrackingService<Q: ShipmentQuery = HttpShipmentQuery> {
    shared: Arc<Shared<Q>>,
}

impl<Q: ShipmentQuery> Clone for TrackingService<Q> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl TrackingService<HttpShipmentQuery> {
    /// Service backed by the HTTP Shipment Query client at `config.api_base_url`.
    pub fn http(config: SyncConfig) -> Self {
        let query = HttpShipmentQuery::new(config.api_base_url.clone());
        Self::new(config, query)
    }
}

impl<Q: ShipmentQuery> TrackingService<Q> {
    pub fn new(config: SyncConfig, query: Q) -> Self {
        let engine = SyncEngine::new(config.backoff, config.viewport);
        let shared = Arc::new_cyclic(|me| Shared {
            config,
            query,
            engine: Mutex::new(engine),
            status_listeners: Mutex::new(Listeners::new()),
            shipment_listeners: Mutex::new(KeyedListeners::new()),
            fetch_error_listeners: Mutex::new(Listeners::new()),
            pollers: Mutex::new(Pollers::default()),
            channel: Mutex::new(ChannelSlot::default()),
            me: me.clone(),
        });
        Self { shared }
    }

    pub fn config(&self) -> &SyncConfig {
        &self.shared.config
    }

    // ── subscriptions ──

    /// Acquire interest in a shipment. The returned handle releases it.
    pub fn subscribe_to_shipment(&self, id: TrackingNumber) -> ShipmentHandle {
        let (session, fx) = self.shared.with_engine(|e| (e.session(), e.subscribe(&id)));
        self.shared.apply(fx);

        let shared = Arc::downgrade(&self.shared);
        let release_id = id.clone();
        ShipmentHandle {
            tracking_number: id,
            release: Some(Box::new(move || {
                if let Some(service) = shared.upgrade() {
                    service.release(session, &release_id);
                }
            })),
        }
    }

    pub fn on_connection_status_change(
        &self,
        callback: impl Fn(ConnectionStatus) + Send + Sync + 'static,
    ) -> ListenerGuard {
        let id = lock(&self.shared.status_listeners)
            .add(Arc::new(move |status: &ConnectionStatus| callback(*status)));
        let shared = Arc::downgrade(&self.shared);
        ListenerGuard::new(move || {
            if let Some(service) = shared.upgrade() {
                lock(&service.status_listeners).remove(id);
            }
        })
    }

    /// Merged view updates for one shipment.
    pub fn on_shipment_change(
        &self,
        id: &TrackingNumber,
        callback: impl Fn(&ShipmentView) + Send + Sync + 'static,
    ) -> ListenerGuard {
        let listener: ListenerId = lock(&self.shared.shipment_listeners).add(id, Arc::new(callback));
        let shared = Arc::downgrade(&self.shared);
        let key = id.clone();
        ListenerGuard::new(move || {
            if let Some(service) = shared.upgrade() {
                lock(&service.shipment_listeners).remove(&key, listener);
            }
        })
    }

    /// Poll and initial-load failures for subscribed shipments.
    pub fn on_fetch_error(
        &self,
        callback: impl Fn(&FetchFailure) + Send + Sync + 'static,
    ) -> ListenerGuard {
        let id = lock(&self.shared.fetch_error_listeners).add(Arc::new(callback));
        let shared = Arc::downgrade(&self.shared);
        ListenerGuard::new(move || {
            if let Some(service) = shared.upgrade() {
                lock(&service.fetch_error_listeners).remove(id);
            }
        })
    }

    // ── connection ──

    /// Open the push channel. No-op while connecting or connected.
    pub fn connect(&self) {
        let fx = self.shared.with_engine(SyncEngine::begin_connect);
        if fx.is_empty() {
            return;
        }
        self.shared.apply(fx);
        self.shared.spawn_channel();
    }

    /// Close the channel without retrying; polling takes over.
    pub fn disconnect(&self) {
        self.shared.stop_channel();
        let fx = self.shared.with_engine(SyncEngine::disconnect);
        self.shared.apply(fx);
    }

    /// Drop the current connection and start over with a fresh attempt budget.
    pub fn reconnect(&self) {
        self.shared.stop_channel();
        let fx = self.shared.with_engine(SyncEngine::reconnect);
        self.shared.apply(fx);
        self.shared.spawn_channel();
    }

    /// Close the channel, stop every timer and return to `Idle`.
    /// Outstanding handles become inert: dropping one later never touches
    /// subscriptions taken after the shutdown.
    pub async fn shutdown(&self) {
        let task = self.shared.stop_channel();
        lock(&self.shared.pollers).stop_all();
        let fx = self.shared.with_engine(SyncEngine::teardown);
        self.shared.apply(fx);
        if let Some(task) = task
            && tokio::time::timeout(SHUTDOWN_GRACE, task).await.is_err()
        {
            tracing::debug!("channel task did not finish within grace period");
        }
        tracing::info!("tracking service stopped");
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.shared.with_engine(|e| e.connection_state())
    }

    pub fn connection_status(&self) -> ConnectionStatus {
        self.connection_state().status()
    }

    pub fn connection_stats(&self) -> ConnectionStats {
        self.shared.with_engine(|e| e.connection_stats())
    }

    // ── data ──

    /// Feed one raw channel frame through the dispatcher.
    pub fn ingest_message(&self, raw: &str) {
        self.shared.ingest_message(raw);
    }

    /// Current merged view of a subscribed shipment.
    pub fn view(&self, id: &TrackingNumber) -> Option<ShipmentView> {
        self.shared.with_engine(|e| e.view(id))
    }

    pub fn is_polling(&self, id: &TrackingNumber) -> bool {
        lock(&self.shared.pollers).is_running(id)
    }

    pub fn active_pollers(&self) -> usize {
        lock(&self.shared.pollers).len()
    }

    pub async fn validate(&self, id: &TrackingNumber) -> Result<bool, FetchError> {
        self.shared.query.validate(id).await
    }

    pub async fn history(&self, id: &TrackingNumber) -> Result<Vec<HistoryEntry>, FetchError> {
        self.shared.query.fetch_history(id).await
    }

    /// One-shot snapshot + projection, independent of any subscription.
    pub async fn lookup(&self, id: &TrackingNumber) -> Result<ShipmentView, FetchError> {
        let snapshot = self.shared.query.fetch_snapshot(id).await?;
        let history = self.shared.query.fetch_history(id).await?;
        let snapshot = ShipmentSnapshot::from_event(&poll_event(&snapshot, &history));
        let projection = project(&snapshot, &self.shared.config.viewport);
        Ok(ShipmentView {
            snapshot,
            projection,
            highlighted: false,
        })
    }
}
