//! Batch driver for `placer-mcts`: oracle caching, multi-record search
//! and outcome persistence.

pub mod cache;
pub mod cached_oracle;
pub mod recording;
pub mod search_pool;

#[cfg(test)]
pub(crate) mod test_util;

use placer_mcts::SearchError;

pub use cached_oracle::{CacheStats, CachedOracle};
pub use recording::{read_outcomes, read_records, write_outcomes, OutcomeWriter};
pub use search_pool::{
    run_search, run_searches, BatchResult, BatchStats, DriverConfig, SearchOutcome, SearchProgress,
};

/// Errors from driving a batch of searches.
#[derive(Debug, thiserror::Error)]
pub enum DriverError {
    #[error("search for record {record_index} failed")]
    Search {
        record_index: usize,
        #[source]
        source: SearchError,
    },

    #[error("I/O error")]
    Io(#[from] std::io::Error),

    #[error("malformed JSON on line {line}")]
    Json {
        line: usize,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to encode outcome")]
    Encode(#[from] serde_json::Error),

    #[error("search worker panicked")]
    WorkerPanicked,
}
