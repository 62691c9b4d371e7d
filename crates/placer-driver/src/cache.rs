//! Fixed-capacity hash table with FIFO eviction, keyed by strategy hash.
//!
//! Linear probing, no runtime resize, no locking (one table per thread).

use std::collections::VecDeque;

const LOAD_FACTOR: f64 = 1.9;

/// Open-addressing table mapping a 64-bit strategy hash to a cloned value.
///
/// - Inserting an existing key keeps the first value.
/// - At capacity the oldest inserted key is evicted, and the probe chain
///   after the freed slot is compacted so later keys stay reachable.
pub struct StrategyCache<V> {
    slots: Vec<Option<(u64, V)>>,
    insertion_order: VecDeque<u64>,
    capacity: usize,
}

impl<V: Clone> StrategyCache<V> {
    /// `capacity` 0 disables the cache: every lookup misses.
    pub fn new(capacity: usize) -> Self {
        let table_size = (capacity as f64 * LOAD_FACTOR) as usize + 1;
        let mut slots = Vec::with_capacity(table_size);
        slots.resize_with(table_size, || None);
        Self {
            slots,
            insertion_order: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn lookup(&self, key: u64) -> Option<V> {
        if self.capacity == 0 {
            return None;
        }
        let idx = self.find(key)?;
        self.slots[idx].as_ref().map(|(_, v)| v.clone())
    }

    pub fn insert(&mut self, key: u64, value: V) {
        if self.capacity == 0 {
            return;
        }

        let mut idx = self.home(key);
        while let Some((k, _)) = &self.slots[idx] {
            if *k == key {
                return;
            }
            idx = self.next(idx);
        }

        self.slots[idx] = Some((key, value));
        self.insertion_order.push_back(key);

        while self.insertion_order.len() > self.capacity {
            self.evict_oldest();
        }
    }

    pub fn len(&self) -> usize {
        self.insertion_order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.insertion_order.is_empty()
    }

    fn home(&self, key: u64) -> usize {
        (key % self.slots.len() as u64) as usize
    }

    fn next(&self, idx: usize) -> usize {
        if idx + 1 == self.slots.len() {
            0
        } else {
            idx + 1
        }
    }

    fn find(&self, key: u64) -> Option<usize> {
        let mut idx = self.home(key);
        loop {
            match &self.slots[idx] {
                None => return None,
                Some((k, _)) if *k == key => return Some(idx),
                Some(_) => idx = self.next(idx),
            }
        }
    }

    fn evict_oldest(&mut self) {
        let Some(key) = self.insertion_order.pop_front() else {
            return;
        };
        let Some(mut hole) = self.find(key) else {
            return;
        };
        self.slots[hole] = None;

        // Pull back every entry of the chain whose home slot is not strictly
        // between the hole and its current position.
        let mut cur = self.next(hole);
        while let Some((k, _)) = &self.slots[cur] {
            let home = self.home(*k);
            if !in_circular_range(home, self.next(hole), cur) {
                self.slots.swap(hole, cur);
                hole = cur;
            }
            cur = self.next(cur);
        }
    }
}

/// `target` in the circular range `[start, end]`.
fn in_circular_range(target: usize, start: usize, end: usize) -> bool {
    if start <= end {
        target >= start && target <= end
    } else {
        target >= start || target <= end
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_then_lookup() {
        let mut cache = StrategyCache::new(16);
        cache.insert(42, (1.5f64, 0.0f64));
        assert_eq!(cache.lookup(42), Some((1.5, 0.0)));
        assert!(cache.lookup(7).is_none());
    }

    #[test]
    fn first_value_wins() {
        let mut cache = StrategyCache::new(16);
        cache.insert(42, 1.0f64);
        cache.insert(42, 2.0f64);
        assert_eq!(cache.lookup(42), Some(1.0));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn evicts_oldest_first() {
        let mut cache = StrategyCache::new(3);
        for k in 1..=4u64 {
            cache.insert(k, k as f64);
        }
        assert_eq!(cache.len(), 3);
        assert!(cache.lookup(1).is_none());
        for k in 2..=4u64 {
            assert_eq!(cache.lookup(k), Some(k as f64));
        }
    }

    #[test]
    fn colliding_key_survives_eviction() {
        // Capacity 4 → 8 slots; keys 0 and 8 share slot 0.
        let mut cache = StrategyCache::new(4);
        cache.insert(0, "a");
        cache.insert(8, "b");
        cache.insert(100, "c");
        cache.insert(200, "d");
        cache.insert(300, "e"); // evicts 0

        assert!(cache.lookup(0).is_none());
        assert_eq!(cache.lookup(8), Some("b"));
    }

    #[test]
    fn zero_capacity_never_stores() {
        let mut cache = StrategyCache::new(0);
        cache.insert(1, 1.0f64);
        assert!(cache.lookup(1).is_none());
        assert!(cache.is_empty());
    }

    #[test]
    fn churn_keeps_most_recent() {
        let mut cache = StrategyCache::new(32);
        for k in 0..1000u64 {
            cache.insert(k, k);
        }
        assert_eq!(cache.len(), 32);
        for k in 968..1000u64 {
            assert_eq!(cache.lookup(k), Some(k), "recent key {k}");
        }
        for k in 0..900u64 {
            assert!(cache.lookup(k).is_none(), "old key {k}");
        }
    }
}
