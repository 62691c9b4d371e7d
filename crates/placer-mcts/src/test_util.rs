use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use crate::action::{Action, Communication};
use crate::oracle::{CostOracle, OracleError};
use crate::record::{Record, TaskSpec, TopoSpec};
use crate::state::Strategy;

// ---------------------------------------------------------------------------
// Records
// ---------------------------------------------------------------------------

fn task(device_count: u32) -> TaskSpec {
    TaskSpec {
        device_name: "v100".to_string(),
        memory_bytes: 1 << 30,
        intra_bandwidth: 8000,
        device_count,
    }
}

/// Two one-device tasks, three groups.
///
/// Group costs: group 0 = 3, group 1 = 5 + 7 = 12, group 2 = 1, so the
/// search order is [1, 0, 2].
pub fn three_group_record() -> Record {
    Record {
        op_groups: vec![vec![0], vec![1, 2], vec![3]],
        topology: TopoSpec {
            tasks: vec![task(1), task(1)],
            bandwidth: vec![vec![0, 2180], vec![2180, 0]],
        },
        batch_size: 64,
        node_costs: vec![3.0, 5.0, 7.0, 1.0],
    }
}

/// One task per entry of `devices`, `n_groups` single-node groups with
/// strictly decreasing costs, batch size 64, no bandwidth matrix.
pub fn record_with_devices(devices: &[u32], n_groups: usize) -> Record {
    Record {
        op_groups: (0..n_groups).map(|i| vec![i]).collect(),
        topology: TopoSpec {
            tasks: devices.iter().map(|&d| task(d)).collect(),
            bandwidth: Vec::new(),
        },
        batch_size: 64,
        node_costs: (0..n_groups).map(|i| (n_groups - i) as f64).collect(),
    }
}

// ---------------------------------------------------------------------------
// Stub oracles
// ---------------------------------------------------------------------------

/// Same `(time, invalidity)` for every strategy.
pub struct FixedOracle {
    time: f64,
    invalidity: f64,
}

impl FixedOracle {
    pub fn new(time: f64, invalidity: f64) -> Self {
        Self { time, invalidity }
    }
}

impl CostOracle for FixedOracle {
    type Feedback = f64;

    fn evaluate_with_feedback(&self, _strategy: &Strategy<'_>) -> Result<(f64, f64), OracleError> {
        Ok((self.time, self.invalidity))
    }

    fn invalidity(&self, _record: &Record, feedback: &f64) -> f64 {
        *feedback
    }
}

/// Replays `(time, invalidity)` pairs in call order, repeating the last one.
pub struct ScriptedOracle {
    script: Vec<(f64, f64)>,
    next: AtomicUsize,
}

impl ScriptedOracle {
    pub fn new(script: Vec<(f64, f64)>) -> Self {
        assert!(!script.is_empty());
        Self {
            script,
            next: AtomicUsize::new(0),
        }
    }
}

impl CostOracle for ScriptedOracle {
    type Feedback = f64;

    fn evaluate_with_feedback(&self, _strategy: &Strategy<'_>) -> Result<(f64, f64), OracleError> {
        let i = self.next.fetch_add(1, Ordering::Relaxed);
        Ok(self.script[i.min(self.script.len() - 1)])
    }

    fn invalidity(&self, _record: &Record, feedback: &f64) -> f64 {
        *feedback
    }
}

/// Always fails.
pub struct FailingOracle;

impl CostOracle for FailingOracle {
    type Feedback = ();

    fn evaluate_with_feedback(&self, _strategy: &Strategy<'_>) -> Result<(f64, ()), OracleError> {
        Err(OracleError::msg("simulator crashed"))
    }

    fn invalidity(&self, _record: &Record, _feedback: &()) -> f64 {
        0.0
    }
}

/// Small analytic cost model.
///
/// Compute splits across the placement's devices unless the group is model
/// partitioned; synchronization costs grow with the device count (PS twice
/// as fast as NCCL). Memory: replicated groups hold their full cost on every
/// selected task, MP groups split it. Feedback is per-task memory, checked
/// against `memory_bytes`.
pub struct ToyOracle;

impl CostOracle for ToyOracle {
    type Feedback = Vec<f64>;

    fn evaluate_with_feedback(&self, strategy: &Strategy<'_>) -> Result<(f64, Vec<f64>), OracleError> {
        let topology = &strategy.record().topology;
        let mut time = 0.0;
        let mut memory = vec![0.0; topology.n_tasks()];

        for (group, _, action) in strategy.iter() {
            let devices = action.device_count(topology) as f64;
            let n_selected = action.selected_tasks().count() as f64;
            time += match action.communication() {
                Communication::Ps => group.cost / devices + 0.6 * (devices - 1.0),
                Communication::Nccl => group.cost / devices + 0.3 * (devices - 1.0),
                Communication::Mp => group.cost + 0.1 * (n_selected - 1.0),
            };
            for t in action.selected_tasks() {
                memory[t] += match action.communication() {
                    Communication::Mp => group.cost / n_selected,
                    _ => group.cost,
                };
            }
        }
        Ok((time, memory))
    }

    fn invalidity(&self, record: &Record, memory: &Vec<f64>) -> f64 {
        record
            .topology
            .tasks
            .iter()
            .zip(memory)
            .map(|(task, &used)| (used - task.memory_bytes as f64).max(0.0))
            .sum()
    }
}

// ---------------------------------------------------------------------------
// Decorators
// ---------------------------------------------------------------------------

/// Counts oracle invocations.
pub struct CountingOracle<O> {
    inner: O,
    calls: AtomicUsize,
}

impl<O> CountingOracle<O> {
    pub fn new(inner: O) -> Self {
        Self {
            inner,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::Relaxed)
    }
}

impl<O: CostOracle> CostOracle for CountingOracle<O> {
    type Feedback = O::Feedback;

    fn evaluate_with_feedback(
        &self,
        strategy: &Strategy<'_>,
    ) -> Result<(f64, Self::Feedback), OracleError> {
        self.calls.fetch_add(1, Ordering::Relaxed);
        self.inner.evaluate_with_feedback(strategy)
    }

    fn invalidity(&self, record: &Record, feedback: &Self::Feedback) -> f64 {
        self.inner.invalidity(record, feedback)
    }
}

/// Keeps a copy of every strategy it is asked to evaluate, in search order.
pub struct RecordingOracle<O> {
    inner: O,
    seen: Mutex<Vec<Vec<Action>>>,
}

impl<O> RecordingOracle<O> {
    pub fn new(inner: O) -> Self {
        Self {
            inner,
            seen: Mutex::new(Vec::new()),
        }
    }

    pub fn strategies(&self) -> Vec<Vec<Action>> {
        self.seen.lock().unwrap().clone()
    }
}

impl<O: CostOracle> CostOracle for RecordingOracle<O> {
    type Feedback = O::Feedback;

    fn evaluate_with_feedback(
        &self,
        strategy: &Strategy<'_>,
    ) -> Result<(f64, Self::Feedback), OracleError> {
        let actions = (0..strategy.len()).map(|i| strategy.action(i).clone()).collect();
        self.seen.lock().unwrap().push(actions);
        self.inner.evaluate_with_feedback(strategy)
    }

    fn invalidity(&self, record: &Record, feedback: &Self::Feedback) -> f64 {
        self.inner.invalidity(record, feedback)
    }
}
