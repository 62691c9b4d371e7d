use crate::action::Action;
use crate::oracle::OracleError;
use crate::state::State;

/// Source of prior probabilities for freshly expanded children.
///
/// Called once per expansion with every surviving candidate. Returns one
/// log-probability per candidate, in candidate order. The search
/// exponentiates them and does not renormalize.
///
/// `Send + Sync` for the same reason as `CostOracle`: one prior is shared by
/// every search thread of a driver.
pub trait PriorFn: Send + Sync {
    fn log_priors(&self, state: &State, candidates: &[Action]) -> Result<Vec<f32>, OracleError>;
}

/// `ln(1/n)` for every candidate: plain UCT-style exploration.
#[derive(Clone, Copy, Debug, Default)]
pub struct UniformPrior;

impl PriorFn for UniformPrior {
    fn log_priors(&self, _state: &State, candidates: &[Action]) -> Result<Vec<f32>, OracleError> {
        let log_p = -(candidates.len() as f32).ln();
        Ok(vec![log_p; candidates.len()])
    }
}

/// Blanket impl so plain closures can be injected as priors.
impl<F> PriorFn for F
where
    F: Fn(&State, &[Action]) -> Result<Vec<f32>, OracleError> + Send + Sync,
{
    fn log_priors(&self, state: &State, candidates: &[Action]) -> Result<Vec<f32>, OracleError> {
        self(state, candidates)
    }
}
