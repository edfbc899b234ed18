//! Observer registries.
//!
//! Callers take a snapshot of the callbacks while holding their lock,
//! release it, then invoke. A callback may therefore add or remove
//! listeners (or call back into the service) without deadlocking.

use std::collections::BTreeMap;
use std::sync::Arc;

pub type Callback<T> = Arc<dyn Fn(&T) + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerId(u64);

// ─── Broadcast ───────────────────────────────────────────────────────

pub struct Listeners<T> {
    next_id: u64,
    entries: Vec<(ListenerId, Callback<T>)>,
}

impl<T> Default for Listeners<T> {
    fn default() -> Self {
        Self {
            next_id: 0,
            entries: Vec::new(),
        }
    }
}

impl<T> Listeners<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, callback: Callback<T>) -> ListenerId {
        self.next_id += 1;
        let id = ListenerId(self.next_id);
        self.entries.push((id, callback));
        id
    }

    pub fn remove(&mut self, id: ListenerId) -> bool {
        let before = self.entries.len();
        self.entries.retain(|(entry, _)| *entry != id);
        self.entries.len() != before
    }

    /// Callbacks in registration order.
    pub fn snapshot(&self) -> Vec<Callback<T>> {
        self.entries.iter().map(|(_, cb)| Arc::clone(cb)).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

// ─── Keyed ───────────────────────────────────────────────────────────

/// Listeners grouped by key (one group per shipment).
pub struct KeyedListeners<K, T> {
    next_id: u64,
    groups: BTreeMap<K, Vec<(ListenerId, Callback<T>)>>,
}

impl<K, T> Default for KeyedListeners<K, T> {
    fn default() -> Self {
        Self {
            next_id: 0,
            groups: BTreeMap::new(),
        }
    }
}

impl<K: Ord + Clone, T> KeyedListeners<K, T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, key: &K, callback: Callback<T>) -> ListenerId {
        self.next_id += 1;
        let id = ListenerId(self.next_id);
        self.groups
            .entry(key.clone())
            .or_default()
            .push((id, callback));
        id
    }

    pub fn remove(&mut self, key: &K, id: ListenerId) -> bool {
        let Some(group) = self.groups.get_mut(key) else {
            return false;
        };
        let before = group.len();
        group.retain(|(entry, _)| *entry != id);
        let removed = group.len() != before;
        if group.is_empty() {
            self.groups.remove(key);
        }
        removed
    }

    pub fn snapshot(&self, key: &K) -> Vec<Callback<T>> {
        self.groups
            .get(key)
            .map(|group| group.iter().map(|(_, cb)| Arc::clone(cb)).collect())
            .unwrap_or_default()
    }

    pub fn count(&self, key: &K) -> usize {
        self.groups.get(key).map_or(0, Vec::len)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[test]
    fn broadcast_in_registration_order() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut listeners: Listeners<u32> = Listeners::new();
        for tag in ["a", "b"] {
            let seen = Arc::clone(&seen);
            listeners.add(Arc::new(move |v: &u32| {
                seen.lock().expect("lock").push(format!("{tag}{v}"));
            }));
        }
        for cb in listeners.snapshot() {
            cb(&7);
        }
        assert_eq!(*seen.lock().expect("lock"), vec!["a7", "b7"]);
    }

    #[test]
    fn remove_by_id() {
        let mut listeners: Listeners<u32> = Listeners::new();
        let a = listeners.add(Arc::new(|_: &u32| {}));
        let b = listeners.add(Arc::new(|_: &u32| {}));
        assert!(listeners.remove(a));
        assert!(!listeners.remove(a));
        assert_eq!(listeners.len(), 1);
        assert!(listeners.remove(b));
        assert!(listeners.is_empty());
    }

    #[test]
    fn keyed_groups_are_independent() {
        let mut keyed: KeyedListeners<String, u32> = KeyedListeners::new();
        let k1 = "UPS1".to_owned();
        let k2 = "UPS2".to_owned();
        let id = keyed.add(&k1, Arc::new(|_: &u32| {}));
        keyed.add(&k2, Arc::new(|_: &u32| {}));
        assert_eq!(keyed.count(&k1), 1);
        assert!(!keyed.remove(&k2, id), "id belongs to another key");
        assert!(keyed.remove(&k1, id));
        assert_eq!(keyed.count(&k1), 0);
        assert!(keyed.snapshot(&k1).is_empty());
        assert_eq!(keyed.snapshot(&k2).len(), 1);
    }
}
