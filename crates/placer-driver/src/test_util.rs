use placer_mcts::{Communication, CostOracle, OracleError, Record, Strategy, TaskSpec, TopoSpec};
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};

/// Two two-device tasks, two single-node groups with costs 8 and 2.
pub fn two_task_record() -> Record {
    let task = |name: &str| TaskSpec {
        device_name: name.to_string(),
        memory_bytes: 16 << 30,
        intra_bandwidth: 10_000,
        device_count: 2,
    };
    Record {
        op_groups: vec![vec![0], vec![1]],
        topology: TopoSpec {
            tasks: vec![task("p100"), task("v100")],
            bandwidth: vec![vec![0, 5000], vec![5000, 0]],
        },
        batch_size: 64,
        node_costs: vec![8.0, 2.0],
    }
}

/// Deterministic cost model that counts its invocations.
///
/// Compute splits evenly across the placement's devices; each
/// communication pattern adds a fixed overhead. Always feasible.
pub struct LinearOracle {
    calls: AtomicUsize,
}

impl LinearOracle {
    pub fn new() -> Self {
        Self {
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::Relaxed)
    }
}

impl CostOracle for LinearOracle {
    type Feedback = f64;

    fn evaluate_with_feedback(&self, strategy: &Strategy<'_>) -> Result<(f64, f64), OracleError> {
        self.calls.fetch_add(1, Ordering::Relaxed);
        let topology = &strategy.record().topology;
        let time = strategy
            .iter()
            .map(|(group, _, action)| {
                let devices = action.device_count(topology) as f64;
                let overhead = match action.communication() {
                    Communication::Ps => 0.5,
                    Communication::Nccl => 0.25,
                    Communication::Mp => 1.0,
                };
                group.cost / devices + overhead
            })
            .sum();
        Ok((time, 0.0))
    }

    fn invalidity(&self, _record: &Record, feedback: &f64) -> f64 {
        *feedback
    }
}

/// Fails its first `failures` calls, then reports a constant time.
pub struct FlakyOracle {
    remaining_failures: AtomicU32,
}

impl FlakyOracle {
    pub fn new(failures: u32) -> Self {
        Self {
            remaining_failures: AtomicU32::new(failures),
        }
    }
}

impl CostOracle for FlakyOracle {
    type Feedback = f64;

    fn evaluate_with_feedback(&self, _strategy: &Strategy<'_>) -> Result<(f64, f64), OracleError> {
        let failing = self
            .remaining_failures
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            Err(OracleError::msg("simulator unavailable"))
        } else {
            Ok((1.0, 0.0))
        }
    }

    fn invalidity(&self, _record: &Record, feedback: &f64) -> f64 {
        *feedback
    }
}
