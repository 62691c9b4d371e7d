use serde::{Deserialize, Serialize};

use crate::error::SearchError;

/// Placement subsets are enumerated exhaustively (2^T − 1 per expansion),
/// so the task count is capped.
pub const MAX_TASKS: usize = 16;

// ---------------------------------------------------------------------------
// Topology
// ---------------------------------------------------------------------------

/// One machine/task of the cluster.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TaskSpec {
    pub device_name: String,
    pub memory_bytes: u64,
    pub intra_bandwidth: u64,
    pub device_count: u32,
}

/// Cluster description: tasks plus the inter-task bandwidth matrix.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct TopoSpec {
    pub tasks: Vec<TaskSpec>,
    /// T×T. May be empty when the oracle does not need it.
    #[serde(default)]
    pub bandwidth: Vec<Vec<u64>>,
}

impl TopoSpec {
    pub fn n_tasks(&self) -> usize {
        self.tasks.len()
    }

    /// Sum of `device_count` over the tasks selected by `placement`.
    pub fn device_count(&self, placement: &[bool]) -> u64 {
        debug_assert_eq!(placement.len(), self.tasks.len());
        self.tasks
            .iter()
            .zip(placement)
            .filter(|(_, on)| **on)
            .map(|(task, _)| u64::from(task.device_count))
            .sum()
    }

    pub fn total_devices(&self) -> u64 {
        self.tasks.iter().map(|t| u64::from(t.device_count)).sum()
    }
}

// ---------------------------------------------------------------------------
// Record — read-only input of one optimization run
// ---------------------------------------------------------------------------

/// Everything the search reads about the model and the cluster.
///
/// `node_costs[id]` is the profiled compute cost of graph node `id` on the
/// reference device. Only used to order groups; the cost oracle keeps its own
/// profiling tables.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub op_groups: Vec<Vec<usize>>,
    pub topology: TopoSpec,
    pub batch_size: u64,
    pub node_costs: Vec<f64>,
}

impl Record {
    pub fn from_json(json: &str) -> Result<Self, SearchError> {
        let record: Record =
            serde_json::from_str(json).map_err(|e| SearchError::InvalidRecord(e.to_string()))?;
        record.validate()?;
        Ok(record)
    }

    pub fn n_tasks(&self) -> usize {
        self.topology.n_tasks()
    }

    pub fn n_groups(&self) -> usize {
        self.op_groups.len()
    }

    /// Aggregate reference-device cost of group `i`.
    pub fn group_cost(&self, i: usize) -> f64 {
        self.op_groups[i].iter().map(|&id| self.node_costs[id]).sum()
    }

    pub fn device_count(&self, placement: &[bool]) -> u64 {
        self.topology.device_count(placement)
    }

    pub fn validate(&self) -> Result<(), SearchError> {
        let n_tasks = self.n_tasks();
        if n_tasks == 0 {
            return Err(invalid("topology has no tasks"));
        }
        if n_tasks > MAX_TASKS {
            return Err(invalid(format!(
                "{n_tasks} tasks exceeds the limit of {MAX_TASKS}"
            )));
        }
        if let Some(i) = self.topology.tasks.iter().position(|t| t.device_count == 0) {
            return Err(invalid(format!("task {i} has no devices")));
        }
        let bw = &self.topology.bandwidth;
        if !bw.is_empty() && (bw.len() != n_tasks || bw.iter().any(|row| row.len() != n_tasks)) {
            return Err(invalid(format!(
                "bandwidth matrix must be {n_tasks}x{n_tasks}"
            )));
        }
        if self.batch_size == 0 {
            return Err(invalid("batch size is zero"));
        }
        if self.op_groups.is_empty() {
            return Err(invalid("no op-groups"));
        }
        for (i, group) in self.op_groups.iter().enumerate() {
            if group.is_empty() {
                return Err(invalid(format!("op-group {i} is empty")));
            }
            if let Some(&id) = group.iter().find(|&&id| id >= self.node_costs.len()) {
                return Err(invalid(format!(
                    "op-group {i} references node {id} without a cost entry"
                )));
            }
        }
        Ok(())
    }
}

fn invalid(msg: impl Into<String>) -> SearchError {
    SearchError::InvalidRecord(msg.into())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_util;

    #[test]
    fn valid_fixture() {
        let record = test_util::three_group_record();
        record.validate().unwrap();
        assert_eq!(record.n_tasks(), 2);
        assert_eq!(record.n_groups(), 3);
    }

    #[test]
    fn group_cost_sums_nodes() {
        let record = test_util::three_group_record();
        // Group 1 = nodes {1, 2} = 5.0 + 7.0
        assert!((record.group_cost(1) - 12.0).abs() < 1e-9);
    }

    #[test]
    fn rejects_no_tasks() {
        let mut record = test_util::three_group_record();
        record.topology.tasks.clear();
        record.topology.bandwidth.clear();
        let err = record.validate().unwrap_err();
        assert!(err.to_string().contains("no tasks"), "{err}");
    }

    #[test]
    fn rejects_too_many_tasks() {
        let record = test_util::record_with_devices(&[1; MAX_TASKS + 1], 1);
        let err = record.validate().unwrap_err();
        assert!(err.to_string().contains("exceeds"), "{err}");
    }

    #[test]
    fn rejects_zero_device_task() {
        let record = test_util::record_with_devices(&[1, 0], 1);
        let err = record.validate().unwrap_err();
        assert!(err.to_string().contains("task 1 has no devices"), "{err}");
    }

    #[test]
    fn rejects_bad_bandwidth_shape() {
        let mut record = test_util::three_group_record();
        record.topology.bandwidth = vec![vec![1, 2]];
        assert!(record.validate().is_err());
    }

    #[test]
    fn rejects_dangling_node() {
        let mut record = test_util::three_group_record();
        record.op_groups[0].push(99);
        let err = record.validate().unwrap_err();
        assert!(err.to_string().contains("node 99"), "{err}");
    }

    #[test]
    fn rejects_empty_group_and_zero_batch() {
        let mut record = test_util::three_group_record();
        record.op_groups.push(Vec::new());
        assert!(record.validate().is_err());

        let mut record = test_util::three_group_record();
        record.batch_size = 0;
        assert!(record.validate().is_err());
    }

    #[test]
    fn json_roundtrip_validates() {
        let record = test_util::three_group_record();
        let json = serde_json::to_string(&record).unwrap();
        assert_eq!(Record::from_json(&json).unwrap(), record);

        let err = Record::from_json("{\"op_groups\": []}").unwrap_err();
        assert!(matches!(err, SearchError::InvalidRecord(_)));
    }

    #[test]
    fn bandwidth_defaults_to_empty() {
        let json = r#"{
            "op_groups": [[0]],
            "topology": {"tasks": [{"device_name": "v100", "memory_bytes": 1, "intra_bandwidth": 1, "device_count": 2}]},
            "batch_size": 8,
            "node_costs": [1.0]
        }"#;
        let record = Record::from_json(json).unwrap();
        assert!(record.topology.bandwidth.is_empty());
        assert_eq!(record.topology.total_devices(), 2);
    }

    #[test]
    fn device_totals_do_not_overflow() {
        let mut record = test_util::three_group_record();
        for task in &mut record.topology.tasks {
            task.device_count = u32::MAX;
        }
        assert!(record.validate().is_ok());
        assert_eq!(record.topology.total_devices(), 2 * u64::from(u32::MAX));
        assert_eq!(record.device_count(&[true, true]), 2 * u64::from(u32::MAX));
    }
}
