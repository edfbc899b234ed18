//! `SyncEngine`: the deterministic core of the tracking sync layer.
//!
//! Every input (consumer calls, channel lifecycle, inbound frames, poll
//! results, timer expiries) is a method call that mutates state and
//! returns the [`Effects`] the runtime must carry out. State changes are
//! complete before any effect is handed out (process-then-notify).

use std::time::Duration;

use parceltrack_core::{
    ConnectionState, ControlMessage, EventSource, ShipmentSnapshot, ShipmentView, TrackingEvent,
    TrackingNumber, Viewport, decode_inbound,
};
use tracing::{debug, info, warn};

use crate::connection::{BackoffPolicy, ConnectionMachine, ConnectionStats, Retry, Transition};
use crate::dispatcher::{StalenessGate, Verdict};
use crate::poll::PollSet;
use crate::reconcile::Reconciler;
use crate::registry::{Release, SubscriptionRegistry};

// ─── Effects ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    /// Write a control message to the channel.
    Send(ControlMessage),
    /// Start the fallback poll timer for a shipment (first tick immediate).
    ArmPoller(TrackingNumber),
    DisarmPoller(TrackingNumber),
    /// One snapshot + history fetch outside the poll cadence.
    InitialFetch(TrackingNumber),
    StatusChanged {
        from: ConnectionState,
        to: ConnectionState,
    },
    ShipmentChanged(ShipmentView),
    /// Call `clear_highlight(tracking_number, generation)` after the flash duration.
    ScheduleHighlightClear {
        tracking_number: TrackingNumber,
        generation: u64,
    },
    /// Call `on_retry_due()` after `delay`.
    RetryAfter { delay: Duration, attempt: u32 },
    GaveUp { failures: u32 },
}

/// Ordered effects produced by one engine call.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Effects(Vec<Effect>);

impl Effects {
    pub fn push(&mut self, effect: Effect) {
        self.0.push(effect);
    }

    fn transition(&mut self, t: Transition) {
        self.push(Effect::StatusChanged {
            from: t.from,
            to: t.to,
        });
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Effect> {
        self.0.iter()
    }

    /// The scheduled retry, if this batch asks for one.
    pub fn retry(&self) -> Option<(Duration, u32)> {
        self.0.iter().find_map(|e| match e {
            Effect::RetryAfter { delay, attempt } => Some((*delay, *attempt)),
            _ => None,
        })
    }

    /// Control messages in send order.
    pub fn sends(&self) -> impl Iterator<Item = &ControlMessage> {
        self.0.iter().filter_map(|e| match e {
            Effect::Send(msg) => Some(msg),
            _ => None,
        })
    }

    pub fn shipment_views(&self) -> impl Iterator<Item = &ShipmentView> {
        self.0.iter().filter_map(|e| match e {
            Effect::ShipmentChanged(view) => Some(view),
            _ => None,
        })
    }
}

impl IntoIterator for Effects {
    type Item = Effect;
    type IntoIter = std::vec::IntoIter<Effect>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

// ─── Engine ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default)]
pub struct SyncEngine {
    connection: ConnectionMachine,
    registry: SubscriptionRegistry,
    gate: StalenessGate,
    reconciler: Reconciler,
    polls: PollSet,
    /// Bumped by `teardown()`; releases carry the session they were taken in.
    session: u64,
}

impl SyncEngine {
    pub fn new(backoff: BackoffPolicy, viewport: Viewport) -> Self {
        Self {
            connection: ConnectionMachine::new(backoff),
            reconciler: Reconciler::new(viewport),
            ..Self::default()
        }
    }

    // ── queries ──

    pub fn connection_state(&self) -> ConnectionState {
        self.connection.state()
    }

    pub fn connection_stats(&self) -> ConnectionStats {
        self.connection.stats()
    }

    pub fn ref_count(&self, id: &TrackingNumber) -> u32 {
        self.registry.ref_count(id)
    }

    pub fn is_subscribed(&self, id: &TrackingNumber) -> bool {
        self.registry.contains(id)
    }

    pub fn subscribed(&self) -> Vec<TrackingNumber> {
        self.registry.ids().cloned().collect()
    }

    pub fn is_polling(&self, id: &TrackingNumber) -> bool {
        self.polls.is_armed(id)
    }

    pub fn view(&self, id: &TrackingNumber) -> Option<ShipmentView> {
        self.reconciler.view(id)
    }

    pub fn snapshot(&self, id: &TrackingNumber) -> Option<&ShipmentSnapshot> {
        self.reconciler.snapshot(id)
    }

    pub fn session(&self) -> u64 {
        self.session
    }

    // ── subscriptions ──

    pub fn subscribe(&mut self, id: &TrackingNumber) -> Effects {
        let mut fx = Effects::default();
        let count = self.registry.acquire(id);
        debug!(tracking_number = %id, ref_count = count, "subscription acquired");
        if count != 1 {
            return fx;
        }
        if self.connection.state().is_connected() {
            fx.push(Effect::Send(ControlMessage::subscribe(id.clone())));
            fx.push(Effect::InitialFetch(id.clone()));
        } else if self.polls.arm(id) {
            fx.push(Effect::ArmPoller(id.clone()));
        }
        fx
    }

    pub fn release(&mut self, id: &TrackingNumber) -> Effects {
        let mut fx = Effects::default();
        match self.registry.release(id) {
            Release::Unknown => {
                debug!(tracking_number = %id, "release of unknown subscription ignored");
            }
            Release::Remaining(count) => {
                debug!(tracking_number = %id, ref_count = count, "subscription released");
            }
            Release::Last => {
                debug!(tracking_number = %id, "last interest released");
                if self.connection.state().is_connected() {
                    fx.push(Effect::Send(ControlMessage::unsubscribe(id.clone())));
                }
                if self.polls.disarm(id) {
                    fx.push(Effect::DisarmPoller(id.clone()));
                }
                self.gate.forget(id);
                self.reconciler.forget(id);
            }
        }
        fx
    }

    /// `release` for an interest acquired in `session`. Interests from
    /// before the last teardown are already gone and are ignored.
    pub fn release_in(&mut self, session: u64, id: &TrackingNumber) -> Effects {
        if session != self.session {
            debug!(tracking_number = %id, session, "release from a torn-down session ignored");
            return Effects::default();
        }
        self.release(id)
    }

    // ── connection lifecycle ──

    fn arm_all(&mut self, fx: &mut Effects) {
        for id in self.registry.ids() {
            if self.polls.arm(id) {
                fx.push(Effect::ArmPoller(id.clone()));
            }
        }
    }

    fn disarm_all(&mut self, fx: &mut Effects) {
        for id in self.polls.disarm_all() {
            fx.push(Effect::DisarmPoller(id));
        }
    }

    /// `connect()`. Returns no effects if already connecting or connected.
    pub fn begin_connect(&mut self) -> Effects {
        let mut fx = Effects::default();
        if let Some(t) = self.connection.begin_connect() {
            info!(from = %t.from, "connecting");
            fx.transition(t);
        }
        fx
    }

    /// Handshake completed: stop polling and (re)subscribe every held id.
    pub fn on_connected(&mut self) -> Effects {
        let mut fx = Effects::default();
        let Some(opened) = self.connection.on_open() else {
            debug!(state = %self.connection.state(), "open ignored outside connecting");
            return fx;
        };
        info!(
            reconnected = opened.reconnected,
            subscriptions = self.registry.len(),
            "channel connected"
        );
        fx.transition(opened.transition);
        self.disarm_all(&mut fx);
        for id in self.registry.ids() {
            fx.push(Effect::Send(ControlMessage::subscribe(id.clone())));
        }
        fx
    }

    /// Transport dropped or the handshake failed.
    pub fn on_transport_failure(&mut self) -> Effects {
        let mut fx = Effects::default();
        let Some(failed) = self.connection.on_failure() else {
            return fx;
        };
        for t in failed.transitions {
            fx.transition(t);
        }
        self.arm_all(&mut fx);
        match failed.retry {
            Retry::After { delay, attempt } => {
                warn!(
                    attempt,
                    delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                    "channel failed, retry scheduled"
                );
                fx.push(Effect::RetryAfter { delay, attempt });
            }
            Retry::GiveUp { failures } => {
                warn!(failures, "channel failed, giving up; periodic updates only");
                fx.push(Effect::GaveUp { failures });
            }
        }
        fx
    }

    pub fn on_retry_due(&mut self) -> Effects {
        let mut fx = Effects::default();
        if let Some(t) = self.connection.on_retry_due() {
            info!("retrying connection");
            fx.transition(t);
        }
        fx
    }

    /// Manual disconnect: no retry, polling takes over.
    pub fn disconnect(&mut self) -> Effects {
        let mut fx = Effects::default();
        if let Some(t) = self.connection.disconnect() {
            info!(from = %t.from, "disconnected");
            fx.transition(t);
        }
        self.arm_all(&mut fx);
        fx
    }

    /// Fresh attempt budget, then connect.
    pub fn reconnect(&mut self) -> Effects {
        let mut fx = self.disconnect();
        self.connection.reset_attempts();
        for effect in self.begin_connect() {
            fx.push(effect);
        }
        fx
    }

    /// Drop all state and return to `Idle`. Later releases are no-ops.
    pub fn teardown(&mut self) -> Effects {
        let mut fx = Effects::default();
        self.disarm_all(&mut fx);
        if let Some(t) = self.connection.teardown() {
            fx.transition(t);
        }
        self.registry.clear();
        self.gate.clear();
        self.reconciler.clear();
        self.session += 1;
        fx
    }

    // ── inbound data ──

    /// Raw text frame from the channel. Malformed frames are dropped.
    pub fn on_message(&mut self, raw: &str) -> Effects {
        match decode_inbound(raw) {
            Ok(event) => self.apply_event(&event),
            Err(e) => {
                warn!(error = %e, "dropping inbound frame");
                Effects::default()
            }
        }
    }

    /// Push or poll event through the staleness gate and into the merge.
    pub fn apply_event(&mut self, event: &TrackingEvent) -> Effects {
        let mut fx = Effects::default();
        let id = &event.tracking_number;
        if !self.registry.contains(id) {
            debug!(tracking_number = %id, source = ?event.source, "event for unwatched shipment dropped");
            return fx;
        }

        if let Verdict::Stale { last_applied } = self.gate.admit(event) {
            debug!(
                tracking_number = %id,
                source = ?event.source,
                timestamp = %event.timestamp,
                %last_applied,
                "stale event dropped"
            );
            if event.source == EventSource::Poll
                && let Some(view) = self.reconciler.backfill(event)
            {
                fx.push(Effect::ShipmentChanged(view));
            }
            return fx;
        }

        let outcome = self.reconciler.merge(event);
        if let Some((from, to)) = outcome.status_change {
            info!(tracking_number = %id, %from, %to, "shipment status changed");
        }
        fx.push(Effect::ShipmentChanged(outcome.view));
        if let Some(generation) = outcome.highlight {
            fx.push(Effect::ScheduleHighlightClear {
                tracking_number: id.clone(),
                generation,
            });
        }
        fx
    }

    pub fn clear_highlight(&mut self, id: &TrackingNumber, generation: u64) -> Effects {
        let mut fx = Effects::default();
        if let Some(view) = self.reconciler.clear_highlight(id, generation) {
            fx.push(Effect::ShipmentChanged(view));
        }
        fx
    }
}


#[cfg(test)]
mod proptests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use parceltrack_core::{Point2D, ShipmentStatus};
    use proptest::prelude::*;

    fn arb_status() -> impl Strategy<Value = ShipmentStatus> {
        proptest::sample::select(ShipmentStatus::ALL.to_vec())
    }

    fn arb_point() -> impl Strategy<Value = Point2D> {
        (-500.0f64..500.0, -500.0f64..500.0).prop_map(|(x, y)| Point2D::new(x, y))
    }

    /// Optional-field presence shared by both events of a pair.
    #[derive(Debug, Clone, Copy)]
    struct Coverage {
        display: bool,
        location: bool,
        truck: bool,
        comment: bool,
        route: bool,
    }

    fn arb_coverage() -> impl Strategy<Value = Coverage> {
        (any::<bool>(), any::<bool>(), any::<bool>(), any::<bool>(), any::<bool>()).prop_map(
            |(display, location, truck, comment, route)| Coverage {
                display,
                location,
                truck,
                comment,
                route,
            },
        )
    }

    fn arb_event(
        cov: Coverage,
        millis: i64,
        source: EventSource,
    ) -> impl Strategy<Value = TrackingEvent> {
        (arb_status(), arb_point(), arb_point(), arb_point(), "[a-z]{1,8}").prop_map(
            move |(status, loc, origin, destination, text)| {
                let mut e = TrackingEvent::status_change(
                    TrackingNumber::parse("UPS123456789").expect("valid"),
                    status,
                    Utc.timestamp_millis_opt(millis).single().expect("valid"),
                    source,
                );
                e.status_display = cov.display.then(|| format!("{status} {text}"));
                e.current_location = cov.location.then_some(loc);
                e.truck_status = cov.truck.then(|| text.clone());
                e.comment = cov.comment.then(|| text.clone());
                if cov.route {
                    e.origin = Some(origin);
                    e.destination = Some(destination);
                }
                e
            },
        )
    }

    fn subscribed_engine() -> SyncEngine {
        let mut engine = SyncEngine::default();
        engine.subscribe(&TrackingNumber::parse("UPS123456789").expect("valid"));
        engine
    }

    fn final_snapshot(engine: &SyncEngine) -> ShipmentSnapshot {
        engine
            .snapshot(&TrackingNumber::parse("UPS123456789").expect("valid"))
            .cloned()
            .expect("snapshot")
    }

    proptest! {
        /// Invariant: E1(t=100), E2(t=200) in either arrival order give the
        /// snapshot produced by timestamp order.
        #[test]
        fn merge_is_order_independent(
            (e1, e2) in arb_coverage().prop_flat_map(|cov| (
                arb_event(cov, 100, EventSource::Push),
                arb_event(cov, 200, EventSource::Poll),
            ))
        ) {
            let mut in_order = subscribed_engine();
            in_order.apply_event(&e1);
            in_order.apply_event(&e2);

            let mut reversed = subscribed_engine();
            reversed.apply_event(&e2);
            reversed.apply_event(&e1);

            prop_assert_eq!(final_snapshot(&in_order), final_snapshot(&reversed));
        }

        /// Invariant: a poll no newer than the last applied event never
        /// changes status, display, location or timestamp.
        #[test]
        fn stale_poll_never_changes_displayed_state(
            pushed in arb_event(
                Coverage { display: true, location: true, truck: true, comment: true, route: true },
                1_000,
                EventSource::Push,
            ),
            (poll_ms, poll) in (0i64..=1_000).prop_flat_map(|ms| (
                Just(ms),
                arb_event(
                    Coverage { display: true, location: true, truck: true, comment: true, route: true },
                    ms,
                    EventSource::Poll,
                ),
            )),
        ) {
            let mut engine = subscribed_engine();
            engine.apply_event(&pushed);
            let before = final_snapshot(&engine);
            let fx = engine.apply_event(&poll);
            prop_assert!(fx.is_empty());
            prop_assert_eq!(final_snapshot(&engine), before);
        }

        /// Invariant: the highlight is raised exactly when an admitted event
        /// changes the status of an existing snapshot.
        #[test]
        fn highlight_iff_status_changes(
            statuses in proptest::collection::vec(arb_status(), 1..12),
        ) {
            let mut engine = subscribed_engine();
            let mut previous: Option<ShipmentStatus> = None;
            for (i, status) in statuses.into_iter().enumerate() {
                let millis = i64::try_from(i).expect("small") * 10 + 10;
                let fx = engine.apply_event(&TrackingEvent::status_change(
                    TrackingNumber::parse("UPS123456789").expect("valid"),
                    status,
                    Utc.timestamp_millis_opt(millis).single().expect("valid"),
                    EventSource::Push,
                ));
                let flashed = fx
                    .iter()
                    .any(|e| matches!(e, Effect::ScheduleHighlightClear { .. }));
                let expected = previous.is_some_and(|p| p != status);
                prop_assert_eq!(flashed, expected);
                previous = Some(status);
            }
        }
    }
}
