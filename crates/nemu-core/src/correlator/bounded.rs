//! Insertion-ordered map with FIFO eviction.

use std::collections::{HashMap, VecDeque};
use std::hash::Hash;

/// Map that drops its oldest entries once it grows past `capacity`.
///
/// Lookups and removals do not change an entry's position. Re-inserting a
/// live key replaces its value in place and keeps its slot.
#[derive(Debug)]
pub(crate) struct BoundedFifo<K, V> {
    capacity: usize,
    next_seq: u64,
    order: VecDeque<(u64, K)>,
    entries: HashMap<K, (u64, V)>,
}

impl<K, V> BoundedFifo<K, V>
where
    K: Eq + Hash + Clone,
{
    pub(crate) fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            next_seq: 0,
            order: VecDeque::with_capacity(capacity + 1),
            entries: HashMap::with_capacity(capacity + 1),
        }
    }

    /// Insert and evict down to capacity. Returns how many entries were dropped.
    pub(crate) fn insert(&mut self, key: K, value: V) -> usize {
        if let Some(slot) = self.entries.get_mut(&key) {
            slot.1 = value;
            return 0;
        }

        let seq = self.next_seq;
        self.next_seq += 1;
        self.entries.insert(key.clone(), (seq, value));
        self.order.push_back((seq, key));

        let mut evicted = 0;
        while self.entries.len() > self.capacity {
            let Some((seq, key)) = self.order.pop_front() else {
                break;
            };
            if self.is_live(seq, &key) {
                self.entries.remove(&key);
                evicted += 1;
            }
        }
        evicted
    }

    pub(crate) fn remove(&mut self, key: &K) -> Option<V> {
        let (_, value) = self.entries.remove(key)?;
        // Stale order slots are skipped lazily; compact once they dominate.
        if self.order.len() > self.capacity * 2 {
            let entries = &self.entries;
            self.order
                .retain(|(seq, key)| entries.get(key).map_or(false, |(s, _)| s == seq));
        }
        Some(value)
    }

    pub(crate) fn contains(&self, key: &K) -> bool {
        self.entries.contains_key(key)
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    fn is_live(&self, seq: u64, key: &K) -> bool {
        self.entries.get(key).map_or(false, |(s, _)| *s == seq)
    }
}
