//! Per-shipment staleness gate.
//!
//! Push and poll events for the same shipment pass through one gate, so
//! their interleaving can never move a shipment backwards in time.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use parceltrack_core::{TrackingEvent, TrackingNumber};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// Newer than anything applied so far (or the first event seen).
    Fresh,
    /// `timestamp <= last_applied`; drop it.
    Stale { last_applied: DateTime<Utc> },
}

#[derive(Debug, Clone, Default)]
pub struct StalenessGate {
    last_applied: HashMap<TrackingNumber, DateTime<Utc>>,
}

impl StalenessGate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn check(&self, event: &TrackingEvent) -> Verdict {
        match self.last_applied.get(&event.tracking_number) {
            Some(&last) if event.timestamp <= last => Verdict::Stale { last_applied: last },
            _ => Verdict::Fresh,
        }
    }

    /// Check and, if fresh, record the event's timestamp as last applied.
    pub fn admit(&mut self, event: &TrackingEvent) -> Verdict {
        let verdict = self.check(event);
        if verdict == Verdict::Fresh {
            self.last_applied
                .insert(event.tracking_number.clone(), event.timestamp);
        }
        verdict
    }

    #[cfg(test)]
    fn last_applied(&self, id: &TrackingNumber) -> Option<DateTime<Utc>> {
        self.last_applied.get(id).copied()
    }

    pub fn forget(&mut self, id: &TrackingNumber) {
        self.last_applied.remove(id);
    }

    pub fn clear(&mut self) {
        self.last_applied.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use parceltrack_core::{EventSource, ShipmentStatus};

    fn event(id: &str, millis: i64) -> TrackingEvent {
        TrackingEvent::status_change(
            TrackingNumber::parse(id).expect("valid"),
            ShipmentStatus::InTransit,
            Utc.timestamp_millis_opt(millis).single().expect("valid"),
            EventSource::Push,
        )
    }

    #[test]
    fn first_event_is_fresh() {
        let mut gate = StalenessGate::new();
        assert_eq!(gate.admit(&event("UPS1", 100)), Verdict::Fresh);
        assert_eq!(
            gate.last_applied(&TrackingNumber::parse("UPS1").expect("valid"))
                .map(|t| t.timestamp_millis()),
            Some(100)
        );
    }

    #[test]
    fn equal_and_older_timestamps_are_stale() {
        let mut gate = StalenessGate::new();
        gate.admit(&event("UPS1", 100));
        assert!(matches!(gate.admit(&event("UPS1", 100)), Verdict::Stale { .. }));
        assert!(matches!(gate.admit(&event("UPS1", 50)), Verdict::Stale { .. }));
        assert_eq!(gate.admit(&event("UPS1", 101)), Verdict::Fresh);
    }

    #[test]
    fn shipments_are_gated_independently() {
        let mut gate = StalenessGate::new();
        gate.admit(&event("UPS1", 500));
        assert_eq!(gate.admit(&event("UPS2", 1)), Verdict::Fresh);
    }

    #[test]
    fn forget_resets_the_gate() {
        let mut gate = StalenessGate::new();
        gate.admit(&event("UPS1", 500));
        gate.forget(&TrackingNumber::parse("UPS1").expect("valid"));
        assert_eq!(gate.admit(&event("UPS1", 1)), Verdict::Fresh);
    }

    #[test]
    fn check_does_not_record() {
        let gate = StalenessGate::new();
        assert_eq!(gate.check(&event("UPS1", 5)), Verdict::Fresh);
        assert_eq!(gate.check(&event("UPS1", 5)), Verdict::Fresh);
    }
}
