//! Ref-counted shipment interest.
//!
//! An entry exists iff at least one consumer holds it. The registry only
//! counts; the engine turns 0→1 / 1→0 edges into control messages.

use std::collections::BTreeMap;

use parceltrack_core::TrackingNumber;

/// Result of releasing one interest.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Release {
    /// Other consumers still hold the id.
    Remaining(u32),
    /// That was the last holder; the entry is gone.
    Last,
    /// No entry for this id; nothing changed.
    Unknown,
}

#[derive(Debug, Clone, Default)]
pub struct SubscriptionRegistry {
    entries: BTreeMap<TrackingNumber, u32>,
}

impl SubscriptionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add one interest. Returns the new ref count (1 on first acquire).
    pub fn acquire(&mut self, id: &TrackingNumber) -> u32 {
        let count = self.entries.entry(id.clone()).or_insert(0);
        *count = count.saturating_add(1);
        *count
    }

    pub fn release(&mut self, id: &TrackingNumber) -> Release {
        let Some(count) = self.entries.get_mut(id) else {
            return Release::Unknown;
        };
        *count -= 1;
        if *count == 0 {
            self.entries.remove(id);
            Release::Last
        } else {
            Release::Remaining(*count)
        }
    }

    pub fn ref_count(&self, id: &TrackingNumber) -> u32 {
        self.entries.get(id).copied().unwrap_or(0)
    }

    pub fn contains(&self, id: &TrackingNumber) -> bool {
        self.entries.contains_key(id)
    }

    /// Every held id, once each, in key order. Used for reconnect replay.
    pub fn ids(&self) -> impl Iterator<Item = &TrackingNumber> {
        self.entries.keys()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}


#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        /// Ref count equals acquires minus effective releases, never goes
        /// negative, and the entry exists iff the count is positive.
        #[test]
        fn ref_count_tracks_net_interest(ops in proptest::collection::vec(any::<bool>(), 0..64)) {
            let id = TrackingNumber::parse("UPS123456789").expect("valid");
            let mut reg = SubscriptionRegistry::new();
            let mut expected: u32 = 0;
            let mut firsts = 0u32;
            let mut lasts = 0u32;

            for acquire in ops {
                if acquire {
                    if reg.acquire(&id) == 1 {
                        firsts += 1;
                    }
                    expected += 1;
                } else {
                    match reg.release(&id) {
                        Release::Last => {
                            lasts += 1;
                            expected -= 1;
                        }
                        Release::Remaining(_) => expected -= 1,
                        Release::Unknown => prop_assert_eq!(expected, 0),
                    }
                }
                prop_assert_eq!(reg.ref_count(&id), expected);
                prop_assert_eq!(reg.contains(&id), expected > 0);
            }
            // Every 0→1 edge is matched by a 1→0 edge, except a still-open one.
            prop_assert_eq!(firsts - lasts, u32::from(expected > 0));
        }
    }
}
