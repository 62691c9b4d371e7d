//! Python bindings for the placement search.
//!
//! Gated behind the `python` feature. Exposes `register_mcts_module()` for
//! the combined extension crate to call; there is no `#[pymodule]` here.

use std::sync::Arc;

use numpy::{PyArray1, PyArray2, PyReadonlyArray1};
use pyo3::exceptions::{PyRuntimeError, PyValueError};
use pyo3::prelude::*;

use crate::action::Action;
use crate::error::SearchError;
use crate::oracle::{CostOracle, OracleError};
use crate::prior::PriorFn;
use crate::record::Record;
use crate::search::SearchConfig;
use crate::state::{State, Strategy};
use crate::tree::{BestTrajectory, Tree};

/// `(placement, communication)` as Python sees an action.
type PyAction = (Vec<bool>, u8);

fn to_py_action(action: &Action) -> PyAction {
    (action.placement().to_vec(), action.communication() as u8)
}

fn search_err(err: SearchError) -> PyErr {
    PyRuntimeError::new_err(err.to_string())
}

// ---------------------------------------------------------------------------
// PySearchResult
// ---------------------------------------------------------------------------

/// Search outcome exposed to Python.
///
/// Actions are `(placement, communication)` tuples with communication
/// 0 = PS, 1 = NCCL, 2 = MP. `best_actions[i]` decides the op-group
/// `group_order[i]`.
/// `best_value` 0 with empty `best_actions` keeps the baseline strategy.
#[pyclass(name = "SearchResult")]
pub struct PySearchResult {
    best: Option<BestTrajectory>,
    recommended: Option<Action>,
    baseline_time: f64,
    group_order: Vec<usize>,
    visit_policy: Vec<f32>,
}

#[pymethods]
impl PySearchResult {
    #[getter]
    fn best_value(&self) -> Option<f32> {
        self.best.as_ref().map(|b| b.value)
    }

    #[getter]
    fn best_actions(&self) -> Vec<PyAction> {
        self.best
            .as_ref()
            .map(|b| b.actions.iter().map(to_py_action).collect())
            .unwrap_or_default()
    }

    #[getter]
    fn recommended(&self) -> Option<PyAction> {
        self.recommended.as_ref().map(to_py_action)
    }

    #[getter]
    fn baseline_time(&self) -> f64 {
        self.baseline_time
    }

    #[getter]
    fn group_order(&self) -> Vec<usize> {
        self.group_order.clone()
    }

    #[getter]
    fn visit_policy<'py>(&self, py: Python<'py>) -> Bound<'py, PyArray1<f32>> {
        PyArray1::from_slice(py, &self.visit_policy)
    }

    fn __repr__(&self) -> String {
        match &self.best {
            Some(best) => format!(
                "SearchResult(best_value={:.4}, decisions={}, baseline_time={:.6})",
                best.value,
                best.actions.len(),
                self.baseline_time
            ),
            None => format!(
                "SearchResult(best_value=None, baseline_time={:.6})",
                self.baseline_time
            ),
        }
    }
}

// ---------------------------------------------------------------------------
// PyCallbackOracle — calls Python evaluate_fn
// ---------------------------------------------------------------------------

/// Cost oracle that delegates to a Python callable.
///
/// ```python
/// def evaluate_fn(strategy: list[tuple[list[bool], int]]) -> tuple[float, float]:
///     # one (placement, communication) per op-group, in record order
///     return time, invalidity
/// ```
struct PyCallbackOracle {
    evaluate_fn: PyObject,
}

impl CostOracle for PyCallbackOracle {
    type Feedback = f64;

    fn evaluate_with_feedback(&self, strategy: &Strategy<'_>) -> Result<(f64, f64), OracleError> {
        let groups: Vec<PyAction> = strategy
            .by_original_index()
            .into_iter()
            .map(to_py_action)
            .collect();

        Python::with_gil(|py| {
            let result = self
                .evaluate_fn
                .call1(py, (groups,))
                .map_err(OracleError::new)?;
            result.bind(py).extract::<(f64, f64)>().map_err(OracleError::new)
        })
    }

    fn invalidity(&self, _record: &Record, feedback: &f64) -> f64 {
        *feedback
    }
}

// ---------------------------------------------------------------------------
// PyCallbackPrior — calls Python policy_fn
// ---------------------------------------------------------------------------

/// Prior that delegates to a Python callable.
///
/// ```python
/// def policy_fn(
///     decided: list[tuple[list[bool], int]],  # actions so far, search order
///     placement_masks: np.ndarray,            # [N, T] float32
///     communication_masks: np.ndarray,        # [N, 3] float32
/// ) -> np.ndarray: ...                        # [N] log-probabilities
/// ```
struct PyCallbackPrior {
    policy_fn: PyObject,
}

impl PriorFn for PyCallbackPrior {
    fn log_priors(&self, state: &State, candidates: &[Action]) -> Result<Vec<f32>, OracleError> {
        let decided: Vec<PyAction> = state.actions().iter().map(to_py_action).collect();
        let (placements, communications): (Vec<Vec<f32>>, Vec<Vec<f32>>) = candidates
            .iter()
            .map(|a| {
                let (p, c) = a.to_mask();
                (p, c.to_vec())
            })
            .unzip();

        Python::with_gil(|py| {
            let placements = PyArray2::from_vec2(py, &placements)
                .map_err(|e| OracleError::msg(e.to_string()))?;
            let communications = PyArray2::from_vec2(py, &communications)
                .map_err(|e| OracleError::msg(e.to_string()))?;

            let result = self
                .policy_fn
                .call1(py, (decided, placements, communications))
                .map_err(OracleError::new)?;
            let result = result.bind(py);

            if let Ok(array) = result.extract::<PyReadonlyArray1<f32>>() {
                return Ok(array.as_array().to_vec());
            }
            result.extract::<Vec<f32>>().map_err(OracleError::new)
        })
    }
}

// ---------------------------------------------------------------------------
// search
// ---------------------------------------------------------------------------

/// Run a full search on a JSON-encoded record.
///
/// Holds the GIL throughout: every leaf evaluation calls back into Python.
#[pyfunction]
#[pyo3(signature = (record_json, evaluate_fn, *, policy_fn=None, playouts=800, c_puct=1.4, real_topology=false))]
fn search(
    record_json: String,
    evaluate_fn: PyObject,
    policy_fn: Option<PyObject>,
    playouts: u32,
    c_puct: f32,
    real_topology: bool,
) -> PyResult<PySearchResult> {
    let record = Record::from_json(&record_json).map_err(|e| PyValueError::new_err(e.to_string()))?;

    let oracle = PyCallbackOracle { evaluate_fn };
    let prior = policy_fn.map(|policy_fn| PyCallbackPrior { policy_fn });
    let prior = prior.as_ref().map(|p| p as &dyn PriorFn);

    let state = State::new(Arc::new(record), &oracle).map_err(search_err)?;
    let mut tree = Tree::new(SearchConfig {
        c_puct,
        real_topology,
    });
    let best = tree
        .playout(&state, playouts, &oracle, prior)
        .map_err(search_err)?;

    Ok(PySearchResult {
        best,
        recommended: tree.get_action().cloned(),
        baseline_time: state.baseline_time(),
        group_order: state.groups().iter().map(|g| g.index).collect(),
        visit_policy: tree.visit_policy(),
    })
}

// ---------------------------------------------------------------------------
// Module registration
// ---------------------------------------------------------------------------

/// Register search types and functions on the given module.
///
/// Called by the combined extension crate, not a standalone pymodule.
pub fn register_mcts_module(m: &Bound<'_, PyModule>) -> PyResult<()> {
    m.add_function(wrap_pyfunction!(search, m)?)?;
    m.add_class::<PySearchResult>()?;
    Ok(())
}
