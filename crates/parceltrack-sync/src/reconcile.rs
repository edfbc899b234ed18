//! View reconciliation: the single place shipment snapshots change.
//!
//! Events that passed the staleness gate are merged field-by-field onto
//! the stored snapshot. A status change raises a highlight tagged with a
//! generation number; the runtime clears it after the flash duration by
//! echoing the generation back, so a newer change is never cut short by
//! an older timer.

use std::collections::HashMap;
use std::collections::hash_map::Entry;

use parceltrack_core::{
    RouteProjection, ShipmentSnapshot, ShipmentStatus, ShipmentView, TrackingEvent,
    TrackingNumber, Viewport, project,
};

#[derive(Debug, Clone)]
struct Tracked {
    snapshot: ShipmentSnapshot,
    projection: Option<RouteProjection>,
    highlight: Option<u64>,
}

impl Tracked {
    fn view(&self) -> ShipmentView {
        ShipmentView {
            snapshot: self.snapshot.clone(),
            projection: self.projection,
            highlighted: self.highlight.is_some(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MergeOutcome {
    pub view: ShipmentView,
    /// `(before, after)` when the merge changed the status.
    pub status_change: Option<(ShipmentStatus, ShipmentStatus)>,
    /// Generation of a freshly raised highlight.
    pub highlight: Option<u64>,
}

#[derive(Debug, Clone, Default)]
pub struct Reconciler {
    tracked: HashMap<TrackingNumber, Tracked>,
    viewport: Viewport,
    next_generation: u64,
}

/// Apply the fields the event carries. Returns true if geometry moved.
fn apply(snapshot: &mut ShipmentSnapshot, event: &TrackingEvent) -> bool {
    let status_changed = snapshot.status != event.status;
    snapshot.status = event.status;
    match &event.status_display {
        Some(display) => snapshot.status_display.clone_from(display),
        None if status_changed => {
            snapshot.status_display = event.status.display_name().to_owned();
        }
        None => {}
    }
    if let Some(comment) = &event.comment {
        snapshot.last_comment = Some(comment.clone());
    }
    if let Some(truck_status) = &event.truck_status {
        snapshot.truck_status = Some(truck_status.clone());
    }

    let before = (snapshot.origin, snapshot.destination, snapshot.current_location);
    if event.origin.is_some() {
        snapshot.origin = event.origin;
    }
    if event.destination.is_some() {
        snapshot.destination = event.destination;
    }
    if event.current_location.is_some() {
        snapshot.current_location = event.current_location;
    }

    snapshot.last_applied_timestamp = event.timestamp;
    snapshot.last_source = event.source;
    before != (snapshot.origin, snapshot.destination, snapshot.current_location)
}

impl Reconciler {
    pub fn new(viewport: Viewport) -> Self {
        Self {
            viewport,
            ..Self::default()
        }
    }

    /// Merge an admitted event. The caller is responsible for gating.
    ///
    /// Absent fields keep their stored value, so arrival order only washes
    /// out for events carrying the same set of optional fields.
    pub fn merge(&mut self, event: &TrackingEvent) -> MergeOutcome {
        match self.tracked.entry(event.tracking_number.clone()) {
            Entry::Vacant(slot) => {
                let snapshot = ShipmentSnapshot::from_event(event);
                let projection = project(&snapshot, &self.viewport);
                let tracked = slot.insert(Tracked {
                    snapshot,
                    projection,
                    highlight: None,
                });
                MergeOutcome {
                    view: tracked.view(),
                    status_change: None,
                    highlight: None,
                }
            }
            Entry::Occupied(mut slot) => {
                let tracked = slot.get_mut();
                let before = tracked.snapshot.status;
                if apply(&mut tracked.snapshot, event) {
                    tracked.projection = project(&tracked.snapshot, &self.viewport);
                }

                let status_change = (before != event.status).then_some((before, event.status));
                let highlight = status_change.map(|_| {
                    self.next_generation += 1;
                    self.next_generation
                });
                if highlight.is_some() {
                    tracked.highlight = highlight;
                }
                MergeOutcome {
                    view: tracked.view(),
                    status_change,
                    highlight,
                }
            }
        }
    }

    /// Fill in route endpoints the snapshot is still missing. Touches
    /// nothing else; used for poll results the gate rejected.
    pub fn backfill(&mut self, event: &TrackingEvent) -> Option<ShipmentView> {
        let tracked = self.tracked.get_mut(&event.tracking_number)?;
        let snapshot = &mut tracked.snapshot;
        let mut filled = false;
        if snapshot.origin.is_none() && event.origin.is_some() {
            snapshot.origin = event.origin;
            filled = true;
        }
        if snapshot.destination.is_none() && event.destination.is_some() {
            snapshot.destination = event.destination;
            filled = true;
        }
        if !filled {
            return None;
        }
        tracked.projection = project(&tracked.snapshot, &self.viewport);
        Some(tracked.view())
    }

    /// Drop the highlight if `generation` is still the current one.
    pub fn clear_highlight(&mut self, id: &TrackingNumber, generation: u64) -> Option<ShipmentView> {
        let tracked = self.tracked.get_mut(id)?;
        if tracked.highlight != Some(generation) {
            return None;
        }
        tracked.highlight = None;
        Some(tracked.view())
    }

    pub fn view(&self, id: &TrackingNumber) -> Option<ShipmentView> {
        self.tracked.get(id).map(Tracked::view)
    }

    pub fn snapshot(&self, id: &TrackingNumber) -> Option<&ShipmentSnapshot> {
        self.tracked.get(id).map(|t| &t.snapshot)
    }

    pub fn forget(&mut self, id: &TrackingNumber) {
        self.tracked.remove(id);
    }

    pub fn clear(&mut self) {
        self.tracked.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use parceltrack_core::{EventSource, Point2D};

    fn tn() -> TrackingNumber {
        TrackingNumber::parse("UPS123456789").expect("valid")
    }

    fn event(status: ShipmentStatus, millis: i64) -> TrackingEvent {
        TrackingEvent::status_change(
            tn(),
            status,
            Utc.timestamp_millis_opt(millis).single().expect("valid"),
            EventSource::Push,
        )
    }

    fn with_route(mut e: TrackingEvent) -> TrackingEvent {
        e.origin = Some(Point2D::new(0.0, 0.0));
        e.destination = Some(Point2D::new(100.0, 0.0));
        e.source = EventSource::Poll;
        e
    }

    #[test]
    fn first_merge_seeds_without_highlight() {
        let mut r = Reconciler::default();
        let out = r.merge(&event(ShipmentStatus::Pending, 10));
        assert!(out.status_change.is_none());
        assert!(out.highlight.is_none());
        assert!(!out.view.highlighted);
        assert_eq!(out.view.snapshot.status_display, "Pending");
        assert!(out.view.projection.is_none(), "no route yet");
    }

    #[test]
    fn status_change_raises_highlight_and_derives_display() {
        let mut r = Reconciler::default();
        r.merge(&event(ShipmentStatus::Pending, 10));
        let out = r.merge(&event(ShipmentStatus::PickedUp, 20));
        assert_eq!(
            out.status_change,
            Some((ShipmentStatus::Pending, ShipmentStatus::PickedUp))
        );
        assert!(out.view.highlighted);
        assert_eq!(out.view.snapshot.status_display, "Picked Up");

        let generation = out.highlight.expect("highlight");
        let cleared = r.clear_highlight(&tn(), generation).expect("cleared");
        assert!(!cleared.highlighted);
        assert!(r.clear_highlight(&tn(), generation).is_none());
    }

    #[test]
    fn same_status_keeps_display_and_does_not_flash() {
        let mut r = Reconciler::default();
        let mut first = event(ShipmentStatus::InTransit, 10);
        first.status_display = Some("In Transit (hub 4)".into());
        r.merge(&first);

        let mut moved = event(ShipmentStatus::InTransit, 20);
        moved.current_location = Some(Point2D::new(5.0, 5.0));
        let out = r.merge(&moved);
        assert!(out.highlight.is_none());
        assert_eq!(out.view.snapshot.status_display, "In Transit (hub 4)");
        assert_eq!(out.view.snapshot.current_location, Some(Point2D::new(5.0, 5.0)));
    }

    #[test]
    fn absent_fields_leave_snapshot_untouched() {
        let mut r = Reconciler::default();
        let mut full = with_route(event(ShipmentStatus::InTransit, 10));
        full.current_location = Some(Point2D::new(25.0, 0.0));
        full.truck_status = Some("DELIVERING".into());
        full.comment = Some("left hub".into());
        r.merge(&full);

        let out = r.merge(&event(ShipmentStatus::OutForDelivery, 20));
        let snap = out.view.snapshot;
        assert_eq!(snap.current_location, Some(Point2D::new(25.0, 0.0)));
        assert_eq!(snap.truck_status.as_deref(), Some("DELIVERING"));
        assert_eq!(snap.last_comment.as_deref(), Some("left hub"));
        assert_eq!(out.view.projection.map(|p| p.progress_percent), Some(25));
        assert_eq!(snap.last_source, EventSource::Push);
    }

    #[test]
    fn newer_highlight_survives_older_clear() {
        let mut r = Reconciler::default();
        r.merge(&event(ShipmentStatus::Pending, 10));
        let first = r
            .merge(&event(ShipmentStatus::PickedUp, 20))
            .highlight
            .expect("highlight");
        let second = r
            .merge(&event(ShipmentStatus::InTransit, 30))
            .highlight
            .expect("highlight");
        assert_ne!(first, second);
        assert!(r.clear_highlight(&tn(), first).is_none());
        assert!(r.view(&tn()).expect("view").highlighted);
        assert!(r.clear_highlight(&tn(), second).is_some());
    }

    #[test]
    fn backfill_only_fills_missing_endpoints() {
        let mut r = Reconciler::default();
        r.merge(&event(ShipmentStatus::InTransit, 100));

        let mut late = with_route(event(ShipmentStatus::Pending, 50));
        late.current_location = Some(Point2D::new(90.0, 0.0));
        late.truck_status = Some("IDLE".into());
        let view = r.backfill(&late).expect("filled");
        let snap = &view.snapshot;
        assert_eq!(snap.status, ShipmentStatus::InTransit);
        assert_eq!(snap.last_applied_timestamp.timestamp_millis(), 100);
        assert!(snap.current_location.is_none());
        assert!(snap.truck_status.is_none());
        assert!(snap.has_geometry());
        assert!(view.projection.is_some());

        // Nothing left to fill.
        assert!(r.backfill(&late).is_none());
    }

    #[test]
    fn forget_drops_state() {
        let mut r = Reconciler::default();
        r.merge(&event(ShipmentStatus::Pending, 10));
        r.forget(&tn());
        assert!(r.view(&tn()).is_none());
        assert!(r.backfill(&with_route(event(ShipmentStatus::Pending, 1))).is_none());
    }
}
