//! Which shipments should currently have a fallback poll timer.
//!
//! A shipment is armed while it is subscribed and the channel is not
//! connected. The set only answers "did this call change anything", so
//! the runtime starts or stops exactly one timer per edge.

use std::collections::BTreeSet;

use parceltrack_core::TrackingNumber;

#[derive(Debug, Clone, Default)]
pub struct PollSet {
    armed: BTreeSet<TrackingNumber>,
}

impl PollSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true if the id was not armed before.
    pub fn arm(&mut self, id: &TrackingNumber) -> bool {
        self.armed.insert(id.clone())
    }

    /// Returns true if the id was armed.
    pub fn disarm(&mut self, id: &TrackingNumber) -> bool {
        self.armed.remove(id)
    }

    /// Disarm everything, returning what was armed.
    pub fn disarm_all(&mut self) -> Vec<TrackingNumber> {
        std::mem::take(&mut self.armed).into_iter().collect()
    }

    pub fn is_armed(&self, id: &TrackingNumber) -> bool {
        self.armed.contains(id)
    }

    pub fn is_empty(&self) -> bool {
        self.armed.is_empty()
    }
}
