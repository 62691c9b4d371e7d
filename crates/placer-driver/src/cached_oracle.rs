//! Caching decorator for any `CostOracle`.
//!
//! The oracle is a pure function of the fully specified strategy, and many
//! tree nodes imply the same one (`[a]` and `[a, a]` both fill every group
//! with `a`). Cache hits skip the simulator entirely. Thread-local tables:
//! threads running at the same time never share one. A thread that exits
//! leaves its table to the next thread spawned, warm.

use placer_mcts::{CostOracle, OracleError, Record, Strategy};
use std::cell::RefCell;
use std::sync::atomic::{AtomicU64, Ordering::Relaxed};
use thread_local::ThreadLocal;

use crate::cache::StrategyCache;

/// Aggregate cache statistics, readable from any thread.
#[derive(Debug, Default)]
pub struct CacheStats {
    pub hits: AtomicU64,
    pub misses: AtomicU64,
}

impl CacheStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn hit_rate(&self) -> f64 {
        let h = self.hits.load(Relaxed);
        let m = self.misses.load(Relaxed);
        let total = h + m;
        if total == 0 {
            0.0
        } else {
            h as f64 / total as f64
        }
    }
}

/// Oracle decorator memoizing `(time, feedback)` per strategy, per thread.
///
/// Oracle errors are never cached.
pub struct CachedOracle<O>
where
    O: CostOracle,
    O::Feedback: Send,
{
    inner: O,
    caches: ThreadLocal<RefCell<StrategyCache<(f64, O::Feedback)>>>,
    capacity: usize,
    pub stats: CacheStats,
}

impl<O> CachedOracle<O>
where
    O: CostOracle,
    O::Feedback: Clone + Send,
{
    /// `capacity` entries per thread; 0 disables caching.
    pub fn new(inner: O, capacity: usize) -> Self {
        Self {
            inner,
            caches: ThreadLocal::new(),
            capacity,
            stats: CacheStats::new(),
        }
    }

    pub fn inner(&self) -> &O {
        &self.inner
    }
}

impl<O> CostOracle for CachedOracle<O>
where
    O: CostOracle,
    O::Feedback: Clone + Send,
{
    type Feedback = O::Feedback;

    fn evaluate_with_feedback(
        &self,
        strategy: &Strategy<'_>,
    ) -> Result<(f64, Self::Feedback), OracleError> {
        let capacity = self.capacity;
        let cache = self
            .caches
            .get_or(|| RefCell::new(StrategyCache::new(capacity)));

        let key = strategy_hash(strategy);
        if let Some(hit) = cache.borrow().lookup(key) {
            self.stats.hits.fetch_add(1, Relaxed);
            return Ok(hit);
        }

        self.stats.misses.fetch_add(1, Relaxed);
        let result = self.inner.evaluate_with_feedback(strategy)?;
        cache.borrow_mut().insert(key, result.clone());
        Ok(result)
    }

    fn invalidity(&self, record: &Record, feedback: &Self::Feedback) -> f64 {
        self.inner.invalidity(record, feedback)
    }
}

// FNV-1a: fast, simple, good distribution for small keys.
const FNV_OFFSET: u64 = 0xcbf29ce484222325;
const FNV_PRIME: u64 = 0x100000001b3;

struct Fnv(u64);

impl Fnv {
    fn mix(&mut self, value: u64) {
        self.0 ^= value;
        self.0 = self.0.wrapping_mul(FNV_PRIME);
    }
}

/// Hash of everything the oracle sees: the record and one
/// `(group, placement, communication)` per group.
///
/// The record is part of the key because one thread's cache outlives a
/// single search.
fn strategy_hash(strategy: &Strategy<'_>) -> u64 {
    let mut h = Fnv(FNV_OFFSET);
    mix_record(&mut h, strategy.record());

    for (group, _, action) in strategy.iter() {
        h.mix(group.index as u64);
        let mut bits = 0u64;
        for (i, &on) in action.placement().iter().enumerate() {
            if on {
                bits |= 1 << i;
            }
        }
        h.mix(bits);
        h.mix(action.communication() as u64);
    }
    h.0
}

fn mix_record(h: &mut Fnv, record: &Record) {
    h.mix(record.batch_size);
    for task in &record.topology.tasks {
        h.mix(task.device_count as u64);
        h.mix(task.memory_bytes);
        h.mix(task.intra_bandwidth);
    }
    for row in &record.topology.bandwidth {
        for &bw in row {
            h.mix(bw);
        }
    }
    for group in &record.op_groups {
        h.mix(group.len() as u64);
        for &id in group {
            h.mix(id as u64);
        }
    }
    for cost in &record.node_costs {
        h.mix(cost.to_bits());
    }
}
