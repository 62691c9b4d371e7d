use log::debug;
use serde::{Deserialize, Serialize};

use crate::action::Action;
use crate::error::SearchError;
use crate::node::{Node, NodeArena, NodeIndex};
use crate::oracle::CostOracle;
use crate::prior::PriorFn;
use crate::search::{self, SearchConfig};
use crate::state::State;

// ---------------------------------------------------------------------------
// Result types
// ---------------------------------------------------------------------------

/// Highest leaf value seen during one `playout` call and the decisions that
/// produced it.
///
/// Value 0 with no actions means nothing beat the baseline strategy.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BestTrajectory {
    pub value: f32,
    pub actions: Vec<Action>,
}

/// Statistics of one root child.
#[derive(Clone, Copy, Debug)]
pub struct ChildStats<'a> {
    pub action: &'a Action,
    pub prior: f32,
    pub q: f32,
    pub visits: u32,
}

// ---------------------------------------------------------------------------
// Tree
// ---------------------------------------------------------------------------

/// Owns the node arena and the root, and drives repeated playouts.
///
/// Does not own the root `State`: each `playout` call takes the run's root
/// state and clones it once per playout. Decisions committed through
/// `advance_root` are replayed onto every clone.
pub struct Tree {
    arena: NodeArena,
    root: NodeIndex,
    config: SearchConfig,
    committed: Vec<Action>,
}

impl Tree {
    pub fn new(config: SearchConfig) -> Self {
        let mut arena = NodeArena::new();
        let root = arena.alloc(Node::root());
        Self {
            arena,
            root,
            config,
            committed: Vec::new(),
        }
    }

    pub fn root(&self) -> NodeIndex {
        self.root
    }

    pub fn arena(&self) -> &NodeArena {
        &self.arena
    }

    pub fn config(&self) -> &SearchConfig {
        &self.config
    }

    /// Decisions fixed by `advance_root`, highest-cost group first.
    pub fn committed(&self) -> &[Action] {
        &self.committed
    }

    /// Run `n` playouts from `state` and return the best trajectory among
    /// them, or `None` if no playout produced a value above −1.
    ///
    /// On a fresh tree the first playout only expands the root and counts as
    /// value 0 with no actions, so the result never falls below the
    /// baseline.
    pub fn playout<O: CostOracle + ?Sized>(
        &mut self,
        state: &State,
        n: u32,
        oracle: &O,
        prior: Option<&dyn PriorFn>,
    ) -> Result<Option<BestTrajectory>, SearchError> {
        self.playout_with_trace(state, n, oracle, prior, |_, _| {})
    }

    /// `playout`, calling `trace(value, actions)` after every playout.
    ///
    /// A playout that stopped at an unexpanded root reports value 0.
    pub fn playout_with_trace<O, F>(
        &mut self,
        state: &State,
        n: u32,
        oracle: &O,
        prior: Option<&dyn PriorFn>,
        mut trace: F,
    ) -> Result<Option<BestTrajectory>, SearchError>
    where
        O: CostOracle + ?Sized,
        F: FnMut(f32, &[Action]),
    {
        let mut best: Option<BestTrajectory> = None;
        let mut best_value = -1.0f32;

        for i in 0..n {
            let mut playout_state = state.clone();
            playout_state.extend(&self.committed);

            let value = search::playout(
                &mut self.arena,
                self.root,
                &mut playout_state,
                &self.config,
                oracle,
                prior,
            )?;

            let leaf = value.unwrap_or(0.0);
            trace(leaf, playout_state.actions());

            if leaf > best_value {
                let actions = match value {
                    Some(_) => playout_state.actions().to_vec(),
                    None => Vec::new(),
                };
                debug!("playout {i}: new best {leaf:.4} over {} decisions", actions.len());
                best_value = leaf;
                best = Some(BestTrajectory {
                    value: leaf,
                    actions,
                });
            }
        }
        Ok(best)
    }

    /// Most visited root child; the first one wins ties. `None` before the
    /// root has been expanded.
    pub fn get_action(&self) -> Option<&Action> {
        let mut best: Option<(&Node, u32)> = None;
        for child in self.arena[self.root].children() {
            let node = &self.arena[child];
            if best.is_none_or(|(_, v)| node.visits() > v) {
                best = Some((node, node.visits()));
            }
        }
        best.and_then(|(node, _)| node.action())
    }

    pub fn root_children(&self) -> Vec<ChildStats<'_>> {
        self.arena[self.root]
            .children()
            .filter_map(|idx| {
                let node = &self.arena[idx];
                node.action().map(|action| ChildStats {
                    action,
                    prior: node.prior(),
                    q: node.q(),
                    visits: node.visits(),
                })
            })
            .collect()
    }

    /// Visit distribution over root children, in child order. Uniform while
    /// no child has been visited; empty before expansion.
    pub fn visit_policy(&self) -> Vec<f32> {
        let visits: Vec<u32> = self.root_children().iter().map(|c| c.visits).collect();
        let total: u32 = visits.iter().sum();
        if total == 0 {
            let n = visits.len();
            return vec![1.0 / n as f32; n];
        }
        visits.iter().map(|&v| v as f32 / total as f32).collect()
    }

    /// Commit `action` for the highest-priority undecided group by moving the
    /// root to the matching child.
    ///
    /// Returns `false` if the root has no such child (caller should
    /// `reinit`). Abandoned nodes stay in the arena.
    pub fn advance_root(&mut self, action: &Action) -> bool {
        let found = self.arena[self.root]
            .children()
            .find(|&idx| self.arena[idx].action() == Some(action));

        match found {
            Some(child) => {
                self.root = child;
                self.committed.push(action.clone());
                true
            }
            None => false,
        }
    }

    /// Drop every node and every committed decision.
    pub fn reinit(&mut self) {
        self.arena.clear();
        self.root = self.arena.alloc(Node::root());
        self.committed.clear();
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
