use log::{debug, info};
use placer_mcts::{Action, CostOracle, PriorFn, Record, SearchConfig, State, Tree};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering::Relaxed};
use std::sync::Arc;
use std::time::Instant;

use crate::cached_oracle::CachedOracle;
use crate::DriverError;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Result of one search over one record.
///
/// `best_actions[i]` decides the op-group `group_order[i]`; groups past
/// `best_actions.len()` take `best_actions[0]`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SearchOutcome {
    pub record_index: usize,
    pub baseline_time: f64,
    /// `None` only when no playout ran. `Some(0.0)` with no actions keeps
    /// the baseline.
    pub best_value: Option<f32>,
    pub best_actions: Vec<Action>,
    pub group_order: Vec<usize>,
    /// Most visited root child.
    pub recommended: Option<Action>,
    pub playouts: u32,
    pub elapsed_secs: f64,
}

/// Aggregate numbers of one batch.
#[derive(Clone, Debug, Default)]
pub struct BatchStats {
    pub searches: usize,
    pub playouts: u64,
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub elapsed_secs: f64,
}

impl BatchStats {
    pub fn searches_per_second(&self) -> f64 {
        if self.elapsed_secs > 0.0 {
            self.searches as f64 / self.elapsed_secs
        } else {
            0.0
        }
    }

    pub fn playouts_per_second(&self) -> f64 {
        if self.elapsed_secs > 0.0 {
            self.playouts as f64 / self.elapsed_secs
        } else {
            0.0
        }
    }
}

/// Result of `run_searches`.
#[derive(Clone, Debug)]
#[must_use]
pub struct BatchResult {
    /// Sorted by `record_index`.
    pub outcomes: Vec<SearchOutcome>,
    pub stats: BatchStats,
}

/// Parameters for a batch of searches.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DriverConfig {
    /// Playouts per record.
    pub n_playouts: u32,
    /// Worker threads; 0 is treated as 1.
    pub num_threads: u32,
    /// Oracle cache entries per worker thread; 0 disables caching.
    pub cache_capacity: usize,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            n_playouts: 800,
            num_threads: 1,
            cache_capacity: 4096,
        }
    }
}

/// Atomic counters for tracking batch progress from outside.
#[derive(Debug, Default)]
pub struct SearchProgress {
    pub searches_completed: AtomicU32,
    pub playouts_completed: AtomicU64,
}

impl SearchProgress {
    pub fn new() -> Self {
        Self::default()
    }
}

// ---------------------------------------------------------------------------
// Single search
// ---------------------------------------------------------------------------

/// Prime a root state for `record`, run `n_playouts` playouts, and collect
/// the outcome.
pub fn run_search<O: CostOracle + ?Sized>(
    record_index: usize,
    record: Arc<Record>,
    oracle: &O,
    prior: Option<&dyn PriorFn>,
    search_config: &SearchConfig,
    n_playouts: u32,
) -> Result<SearchOutcome, DriverError> {
    let start = Instant::now();
    let wrap = |source| DriverError::Search {
        record_index,
        source,
    };

    let state = State::new(record, oracle).map_err(wrap)?;
    let mut tree = Tree::new(search_config.clone());
    let best = tree
        .playout(&state, n_playouts, oracle, prior)
        .map_err(wrap)?;

    let (best_value, best_actions) = match best {
        Some(best) => (Some(best.value), best.actions),
        None => (None, Vec::new()),
    };
    let outcome = SearchOutcome {
        record_index,
        baseline_time: state.baseline_time(),
        best_value,
        best_actions,
        group_order: state.groups().iter().map(|g| g.index).collect(),
        recommended: tree.get_action().cloned(),
        playouts: n_playouts,
        elapsed_secs: start.elapsed().as_secs_f64(),
    };

    info!(
        "record {record_index}: best {} over {} groups, {n_playouts} playouts in {:.2}s",
        outcome
            .best_value
            .map_or_else(|| "none".to_string(), |v| format!("{v:+.4}")),
        outcome.group_order.len(),
        outcome.elapsed_secs
    );
    Ok(outcome)
}

// ---------------------------------------------------------------------------
// Multi-record orchestration
// ---------------------------------------------------------------------------

/// Work-claiming loop run by every worker thread.
///
/// Claims records via `next_record` until none are left or another worker
/// has failed.
#[allow(clippy::too_many_arguments)]
fn search_worker_loop<O: CostOracle + ?Sized>(
    records: &[Arc<Record>],
    oracle: &O,
    prior: Option<&dyn PriorFn>,
    search_config: &SearchConfig,
    config: &DriverConfig,
    next_record: &AtomicU32,
    failed: &AtomicBool,
    progress: Option<&SearchProgress>,
) -> Result<Vec<SearchOutcome>, DriverError> {
    let mut local = Vec::new();
    loop {
        if failed.load(Relaxed) {
            break;
        }
        let idx = next_record.fetch_add(1, Relaxed) as usize;
        if idx >= records.len() {
            break;
        }

        let outcome = match run_search(
            idx,
            records[idx].clone(),
            oracle,
            prior,
            search_config,
            config.n_playouts,
        ) {
            Ok(outcome) => outcome,
            Err(err) => {
                failed.store(true, Relaxed);
                return Err(err);
            }
        };

        if let Some(p) = progress {
            p.playouts_completed
                .fetch_add(config.n_playouts as u64, Relaxed);
            p.searches_completed.fetch_add(1, Relaxed);
        }
        local.push(outcome);
    }
    Ok(local)
}

/// Run one independent search per record on `config.num_threads` threads.
///
/// The oracle is wrapped in a per-thread `CachedOracle`. The first failing
/// search aborts the batch: workers stop claiming new records and its error
/// is returned.
pub fn run_searches<O>(
    records: &[Arc<Record>],
    oracle: &O,
    prior: Option<&dyn PriorFn>,
    search_config: &SearchConfig,
    config: &DriverConfig,
    progress: Option<&SearchProgress>,
) -> Result<BatchResult, DriverError>
where
    O: CostOracle,
    O::Feedback: Clone + Send,
{
    let start = Instant::now();
    let cached = CachedOracle::new(oracle, config.cache_capacity);
    let next_record = AtomicU32::new(0);
    let failed = AtomicBool::new(false);
    let num_threads = config.num_threads.max(1);

    debug!(
        "searching {} records on {num_threads} threads, {} playouts each",
        records.len(),
        config.n_playouts
    );

    let thread_results: Vec<Result<Vec<SearchOutcome>, DriverError>> = std::thread::scope(|s| {
        let cached = &cached;
        let next_record = &next_record;
        let failed = &failed;
        let handles: Vec<_> = (0..num_threads)
            .map(|_| {
                s.spawn(move || {
                    search_worker_loop(
                        records,
                        cached,
                        prior,
                        search_config,
                        config,
                        next_record,
                        failed,
                        progress,
                    )
                })
            })
            .collect();

        handles
            .into_iter()
            .map(|h| h.join().unwrap_or(Err(DriverError::WorkerPanicked)))
            .collect()
    });

    // Fail fast: return first error
    let mut outcomes = Vec::with_capacity(records.len());
    for result in thread_results {
        outcomes.extend(result?);
    }
    outcomes.sort_by_key(|o| o.record_index);

    let stats = BatchStats {
        searches: outcomes.len(),
        playouts: outcomes.iter().map(|o| o.playouts as u64).sum(),
        cache_hits: cached.stats.hits.load(Relaxed),
        cache_misses: cached.stats.misses.load(Relaxed),
        elapsed_secs: start.elapsed().as_secs_f64(),
    };
    info!(
        "{} searches in {:.2}s ({:.1} playouts/s, cache hit rate {:.1}%)",
        stats.searches,
        stats.elapsed_secs,
        stats.playouts_per_second(),
        cached.stats.hit_rate() * 100.0
    );

    Ok(BatchResult { outcomes, stats })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
