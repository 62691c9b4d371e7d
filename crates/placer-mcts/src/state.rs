use log::{debug, warn};
use std::sync::Arc;

use crate::action::{Action, Communication};
use crate::error::SearchError;
use crate::oracle::CostOracle;
use crate::record::Record;

// ---------------------------------------------------------------------------
// SortedGroup
// ---------------------------------------------------------------------------

/// An op-group in search order, remembering where it sits in the record.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SortedGroup {
    /// Index into `Record::op_groups`.
    pub index: usize,
    /// Aggregate reference-device cost.
    pub cost: f64,
}

// ---------------------------------------------------------------------------
// State — decision sequence of one playout
// ---------------------------------------------------------------------------

/// Partial or complete assignment of actions to groups.
///
/// Groups are ordered by descending compute cost; `actions[i]` decides
/// `groups[i]`. Groups past `actions.len()` are evaluated with `actions[0]`.
///
/// `Clone` shares the record, the group order and the baseline through `Arc`
/// and copies only the action list, so playouts forked from one state never
/// observe each other's decisions.
#[derive(Clone, Debug)]
pub struct State {
    record: Arc<Record>,
    groups: Arc<[SortedGroup]>,
    baseline_time: f64,
    actions: Vec<Action>,
}

impl State {
    /// Root state of an optimization run: validates the record, orders the
    /// groups and primes the baseline through `oracle`.
    pub fn new<O: CostOracle + ?Sized>(record: Arc<Record>, oracle: &O) -> Result<Self, SearchError> {
        let mut state = Self::unprimed(record)?;
        state.baseline_time = state.compute_baseline(oracle)?;
        Ok(state)
    }

    /// Root state with a baseline known from an earlier run.
    pub fn with_baseline(record: Arc<Record>, baseline_time: f64) -> Result<Self, SearchError> {
        check_baseline(baseline_time)?;
        let mut state = Self::unprimed(record)?;
        state.baseline_time = baseline_time;
        Ok(state)
    }

    /// Skips record validation so tests can reach states `new` refuses.
    #[cfg(test)]
    pub(crate) fn unvalidated(record: Arc<Record>, baseline_time: f64) -> Self {
        let groups = sort_groups(&record);
        Self {
            record,
            groups: groups.into(),
            baseline_time,
            actions: Vec::new(),
        }
    }

    fn unprimed(record: Arc<Record>) -> Result<Self, SearchError> {
        record.validate()?;
        let groups = sort_groups(&record);
        Ok(Self {
            record,
            groups: groups.into(),
            baseline_time: 0.0,
            actions: Vec::new(),
        })
    }

    /// Time of the all-data-parallel strategy (every group on every task,
    /// all-reduce). Falls back to model partitioning when that does not fit.
    fn compute_baseline<O: CostOracle + ?Sized>(&self, oracle: &O) -> Result<f64, SearchError> {
        let n_tasks = self.record.n_tasks();
        let data_parallel = if self.record.topology.total_devices() == 1 {
            Communication::Ps
        } else {
            Communication::Nccl
        };

        let mut time = self.probe_uniform(oracle, Action::all_tasks(n_tasks, data_parallel)?)?;
        if time.is_none() {
            warn!("data-parallel baseline is infeasible, falling back to model partitioning");
            time = self.probe_uniform(oracle, Action::all_tasks(n_tasks, Communication::Mp)?)?;
        }
        let time = match time {
            Some(t) => t,
            None => {
                warn!("model-partitioned baseline is infeasible too, using its time anyway");
                self.probe_time(oracle, Action::all_tasks(n_tasks, Communication::Mp)?)?
            }
        };
        check_baseline(time)?;
        debug!("baseline time {time:.6} for {} groups", self.groups.len());
        Ok(time)
    }

    /// Time of the strategy assigning `action` to every group; `None` if
    /// infeasible.
    fn probe_uniform<O: CostOracle + ?Sized>(
        &self,
        oracle: &O,
        action: Action,
    ) -> Result<Option<f64>, SearchError> {
        let mut probe = self.clone();
        probe.actions.clear();
        probe.actions.push(action);
        let strategy = probe.strategy()?;
        let (time, feedback) = oracle.evaluate_with_feedback(&strategy)?;
        if oracle.invalidity(&self.record, &feedback) > 0.0 {
            Ok(None)
        } else {
            Ok(Some(time))
        }
    }

    fn probe_time<O: CostOracle + ?Sized>(&self, oracle: &O, action: Action) -> Result<f64, SearchError> {
        let mut probe = self.clone();
        probe.actions.clear();
        probe.actions.push(action);
        let (time, _) = oracle.evaluate_with_feedback(&probe.strategy()?)?;
        Ok(time)
    }

    // --- Accessors ---

    pub fn record(&self) -> &Record {
        &self.record
    }

    pub fn record_arc(&self) -> &Arc<Record> {
        &self.record
    }

    pub fn groups(&self) -> &[SortedGroup] {
        &self.groups
    }

    pub fn baseline_time(&self) -> f64 {
        self.baseline_time
    }

    pub fn actions(&self) -> &[Action] {
        &self.actions
    }

    /// True once every group has its own decision.
    pub fn finished(&self) -> bool {
        self.actions.len() >= self.groups.len()
    }

    /// Decision used for sorted group `i`: its own if decided, else `actions[0]`.
    pub fn action_for(&self, i: usize) -> Option<&Action> {
        self.actions.get(i).or_else(|| self.actions.first())
    }

    // --- Mutation ---

    /// Decide the next undecided group.
    pub fn push(&mut self, action: Action) {
        debug_assert!(
            self.actions.len() < self.groups.len(),
            "push: all {} groups already decided",
            self.groups.len()
        );
        debug_assert_eq!(action.n_tasks(), self.record.n_tasks());
        self.actions.push(action);
    }

    pub fn extend<'a>(&mut self, actions: impl IntoIterator<Item = &'a Action>) {
        for action in actions {
            self.push(action.clone());
        }
    }

    /// Fully specified strategy implied by the decisions so far.
    pub fn strategy(&self) -> Result<Strategy<'_>, SearchError> {
        if self.actions.is_empty() {
            return Err(SearchError::NoDecision);
        }
        let assignment = (0..self.groups.len())
            .map(|i| self.action_for(i).ok_or(SearchError::NoDecision))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Strategy {
            record: &self.record,
            groups: &self.groups,
            assignment,
        })
    }
}

/// Descending cost; equal costs keep record order.
fn sort_groups(record: &Record) -> Vec<SortedGroup> {
    let mut groups: Vec<SortedGroup> = (0..record.n_groups())
        .map(|index| SortedGroup {
            index,
            cost: record.group_cost(index),
        })
        .collect();
    groups.sort_by(|a, b| b.cost.total_cmp(&a.cost));
    groups
}

fn check_baseline(time: f64) -> Result<(), SearchError> {
    if time.is_finite() && time > 0.0 {
        Ok(())
    } else {
        Err(SearchError::InvalidBaseline(time))
    }
}

// ---------------------------------------------------------------------------
// Strategy — what the cost oracle sees
// ---------------------------------------------------------------------------

/// One action per group, every group assigned.
#[derive(Clone, Debug)]
pub struct Strategy<'a> {
    record: &'a Record,
    groups: &'a [SortedGroup],
    assignment: Vec<&'a Action>,
}

impl<'a> Strategy<'a> {
    pub fn record(&self) -> &'a Record {
        self.record
    }

    pub fn len(&self) -> usize {
        self.assignment.len()
    }

    pub fn is_empty(&self) -> bool {
        self.assignment.is_empty()
    }

    /// Action of sorted group `i`.
    pub fn action(&self, i: usize) -> &'a Action {
        self.assignment[i]
    }

    /// `(group, graph node ids, action)` in search order.
    pub fn iter(&self) -> impl Iterator<Item = (&'a SortedGroup, &'a [usize], &'a Action)> + '_ {
        let record = self.record;
        self.groups
            .iter()
            .zip(self.assignment.iter())
            .map(move |(g, &a)| (g, record.op_groups[g.index].as_slice(), a))
    }

    /// Actions re-ordered to match `Record::op_groups`.
    pub fn by_original_index(&self) -> Vec<&'a Action> {
        let mut out = vec![self.assignment[0]; self.assignment.len()];
        for (g, &a) in self.groups.iter().zip(&self.assignment) {
            out[g.index] = a;
        }
        out
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
