use thiserror::Error;

use crate::oracle::OracleError;

/// Fatal search failures.
///
/// Infeasible strategies are not errors: they score −1 and the search keeps
/// going. Everything here aborts the current run and is surfaced to the
/// driver.
#[derive(Error, Debug)]
pub enum SearchError {
    #[error("cost oracle failed: {0}")]
    Oracle(#[source] OracleError),
    #[error("prior function failed: {0}")]
    Prior(#[source] OracleError),
    #[error("prior function returned {got} entries for {expected} candidates")]
    PriorLength { expected: usize, got: usize },
    #[error("no legal action for {n_tasks} task(s)")]
    EmptyActionSpace { n_tasks: usize },
    #[error("invalid record: {0}")]
    InvalidRecord(String),
    #[error("baseline time must be finite and positive, got {0}")]
    InvalidBaseline(f64),
    #[error("cost oracle reported a non-positive or non-finite time {0} for a feasible strategy")]
    InvalidSimulatedTime(f64),
    #[error("placement must select at least one task")]
    EmptyPlacement,
    #[error("unknown communication mode {0}")]
    UnknownCommunication(u8),
    #[error("no group has been decided yet")]
    NoDecision,
}

impl From<OracleError> for SearchError {
    fn from(err: OracleError) -> Self {
        Self::Oracle(err)
    }
}
