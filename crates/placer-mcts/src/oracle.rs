use crate::record::Record;
use crate::state::Strategy;
use std::fmt;

// ---------------------------------------------------------------------------
// OracleError — failures of external collaborators
// ---------------------------------------------------------------------------

/// Error raised by a cost oracle or prior function (simulator crash,
/// malformed graph reference, Python exception, ...).
///
/// Wraps `Box<dyn Error + Send + Sync>` so `placer-mcts` stays decoupled
/// from any concrete simulator's error types.
#[derive(Debug)]
pub struct OracleError(Box<dyn std::error::Error + Send + Sync>);

impl OracleError {
    /// Wrap any error into an OracleError.
    pub fn new(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self(Box::new(err))
    }

    /// Create from a string message.
    pub fn msg(msg: impl Into<String>) -> Self {
        Self(msg.into().into())
    }
}

impl fmt::Display for OracleError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::error::Error for OracleError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.0.source()
    }
}

impl From<String> for OracleError {
    fn from(s: String) -> Self {
        Self::msg(s)
    }
}

// ---------------------------------------------------------------------------
// CostOracle trait
// ---------------------------------------------------------------------------

/// Clean boundary between search and the cost simulator.
///
/// The search hands over a fully specified strategy and gets back a simulated
/// execution time plus opaque feedback; `invalidity` turns that feedback into
/// a feasibility verdict. Must be deterministic for a fixed strategy.
///
/// `Send + Sync` because one oracle is shared by every search thread of a
/// driver via `&`/`Arc`.
pub trait CostOracle: Send + Sync {
    type Feedback;

    fn evaluate_with_feedback(
        &self,
        strategy: &Strategy<'_>,
    ) -> Result<(f64, Self::Feedback), OracleError>;

    /// Zero when feasible, positive on a resource violation (e.g. memory
    /// overcommit). Only the `> 0` test matters to the search.
    fn invalidity(&self, record: &Record, feedback: &Self::Feedback) -> f64;
}

impl<O: CostOracle + ?Sized> CostOracle for &O {
    type Feedback = O::Feedback;

    fn evaluate_with_feedback(
        &self,
        strategy: &Strategy<'_>,
    ) -> Result<(f64, Self::Feedback), OracleError> {
        (**self).evaluate_with_feedback(strategy)
    }

    fn invalidity(&self, record: &Record, feedback: &Self::Feedback) -> f64 {
        (**self).invalidity(record, feedback)
    }
}

/// Reward for one evaluated strategy: −1 if infeasible, otherwise the speedup
/// over the baseline (`baseline / time − 1`).
pub fn leaf_value(baseline_time: f64, simulated_time: f64, invalidity: f64) -> f32 {
    if invalidity > 0.0 {
        -1.0
    } else {
        (baseline_time / simulated_time - 1.0) as f32
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
