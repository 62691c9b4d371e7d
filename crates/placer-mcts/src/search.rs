use log::{debug, trace};

use crate::action::{Action, Communication};
use crate::error::SearchError;
use crate::node::{Node, NodeArena, NodeIndex};
use crate::oracle::{leaf_value, CostOracle};
use crate::prior::PriorFn;
use crate::record::Record;
use crate::state::State;

pub const DEFAULT_C_PUCT: f32 = 1.4;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Search configuration. Immutable, shareable across threads.
#[derive(Clone, Debug)]
pub struct SearchConfig {
    /// Exploration constant (PUCT).
    pub c_puct: f32,
    /// Drop data-parallel modes whose device count does not divide the
    /// batch size.
    pub real_topology: bool,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            c_puct: DEFAULT_C_PUCT,
            real_topology: false,
        }
    }
}

/// Nodes visited by one descent, root first, leaf last.
pub type SearchPath = Vec<NodeIndex>;

// ---------------------------------------------------------------------------
// select_child
// ---------------------------------------------------------------------------

/// q + c_puct · prior · √N_parent / (1 + N_child)
pub fn puct_score(child: &Node, parent_visits: u32, c_puct: f32) -> f32 {
    let exploration =
        c_puct * child.prior() * (parent_visits as f32).sqrt() / (1.0 + child.visits() as f32);
    child.q() + exploration
}

/// Child with the highest PUCT score; the first one wins ties.
/// `None` for a leaf.
pub fn select_child(arena: &NodeArena, parent: NodeIndex, c_puct: f32) -> Option<NodeIndex> {
    let parent_visits = arena[parent].visits();
    let mut best: Option<(NodeIndex, f32)> = None;
    for child in arena[parent].children() {
        let score = puct_score(&arena[child], parent_visits, c_puct);
        if best.is_none_or(|(_, s)| score > s) {
            best = Some((child, score));
        }
    }
    best.map(|(idx, _)| idx)
}

// ---------------------------------------------------------------------------
// legal_actions — action space with feasibility pruning
// ---------------------------------------------------------------------------

/// Every non-empty placement crossed with every communication mode that
/// survives pruning.
///
/// Placements are enumerated lexicographically with task 0 as the most
/// significant bit (`[0,0,1]`, `[0,1,0]`, `[0,1,1]`, ...), and for each
/// placement modes come in `PS, NCCL, MP` order. This order is the child
/// order and therefore the PUCT tie-break order.
///
/// Pruning, on the total device count `d` of the placement:
/// - `d == 1`: only PS.
/// - `real_topology` and `batch_size % d != 0`: only MP.
pub fn legal_actions(record: &Record, real_topology: bool) -> Vec<Action> {
    let n_tasks = record.n_tasks();
    if n_tasks == 0 {
        return Vec::new();
    }

    let mut actions = Vec::new();
    for code in 1u32..(1u32 << n_tasks) {
        let placement: Vec<bool> = (0..n_tasks)
            .map(|i| (code >> (n_tasks - 1 - i)) & 1 == 1)
            .collect();
        let n_devices = record.device_count(&placement);

        for comm in Communication::ALL {
            if n_devices == 1 && comm != Communication::Ps {
                continue;
            }
            if real_topology
                && (n_devices == 0 || record.batch_size % n_devices != 0)
                && comm != Communication::Mp
            {
                continue;
            }
            actions.push(Action::from_parts(placement.clone(), comm));
        }
    }
    actions
}

// ---------------------------------------------------------------------------
// expand
// ---------------------------------------------------------------------------

/// Give the leaf `idx` one child per legal action. Returns the child count.
///
/// Priors come from `prior` (log-probabilities, exponentiated, not
/// renormalized) or are uniform `1/n` without one. A child whose action
/// equals `state.actions()[0]` starts with the parent's visit count.
pub fn expand(
    arena: &mut NodeArena,
    idx: NodeIndex,
    state: &State,
    config: &SearchConfig,
    prior: Option<&dyn PriorFn>,
) -> Result<usize, SearchError> {
    debug_assert!(arena[idx].is_leaf(), "expand: node already expanded");

    let candidates = legal_actions(state.record(), config.real_topology);
    let n = candidates.len();
    if n == 0 {
        return Err(SearchError::EmptyActionSpace {
            n_tasks: state.record().n_tasks(),
        });
    }

    let priors: Vec<f32> = match prior {
        Some(prior) => {
            let log_p = prior
                .log_priors(state, &candidates)
                .map_err(SearchError::Prior)?;
            if log_p.len() != n {
                return Err(SearchError::PriorLength {
                    expected: n,
                    got: log_p.len(),
                });
            }
            log_p.into_iter().map(f32::exp).collect()
        }
        None => vec![1.0 / n as f32; n],
    };

    let parent_visits = arena[idx].visits();
    let default = state.actions().first();
    let children: Vec<Node> = candidates
        .into_iter()
        .zip(priors)
        .map(|(action, p)| {
            let warm = default == Some(&action);
            let mut node = Node::new(action, p);
            if warm {
                node.seed_visits(parent_visits);
            }
            node
        })
        .collect();

    let first = arena.alloc_contiguous(children);
    arena[idx].set_children(first, n);

    debug!(
        "expanded depth {} into {n} children ({} priors)",
        state.actions().len(),
        if prior.is_some() { "learned" } else { "uniform" }
    );
    Ok(n)
}

// ---------------------------------------------------------------------------
// evaluate_leaf
// ---------------------------------------------------------------------------

/// Leaf value of `idx` for `state`, computed through the oracle the first
/// time and cached on the node afterwards.
pub fn evaluate_leaf<O: CostOracle + ?Sized>(
    arena: &mut NodeArena,
    idx: NodeIndex,
    state: &State,
    oracle: &O,
) -> Result<f32, SearchError> {
    if let Some(value) = arena[idx].cached_value() {
        return Ok(value);
    }

    let strategy = state.strategy()?;
    let (time, feedback) = oracle.evaluate_with_feedback(&strategy)?;
    let invalidity = oracle.invalidity(state.record(), &feedback);
    if invalidity <= 0.0 && !(time.is_finite() && time > 0.0) {
        return Err(SearchError::InvalidSimulatedTime(time));
    }
    let value = leaf_value(state.baseline_time(), time, invalidity);

    arena[idx].set_cached_value(value);
    Ok(value)
}

// ---------------------------------------------------------------------------
// backup
// ---------------------------------------------------------------------------

/// One visit and one running-mean update for every node on `path`.
///
/// No sign flip: every node on the path optimizes the same objective.
pub fn backup(arena: &mut NodeArena, path: &[NodeIndex], value: f32) {
    for &idx in path.iter().rev() {
        arena[idx].update(value);
    }
}

// ---------------------------------------------------------------------------
// playout — one select/expand/evaluate/backup cycle
// ---------------------------------------------------------------------------

/// Descend from `root` to a leaf, appending each selected child's action to
/// `state`, then expand, evaluate and back up.
///
/// Returns `None` when `root` itself is the leaf: it is expanded (unless
/// `state` is finished) but nothing is evaluated or updated, since the root
/// is never a decision outcome.
pub fn playout<O: CostOracle + ?Sized>(
    arena: &mut NodeArena,
    root: NodeIndex,
    state: &mut State,
    config: &SearchConfig,
    oracle: &O,
    prior: Option<&dyn PriorFn>,
) -> Result<Option<f32>, SearchError> {
    let mut path: SearchPath = vec![root];
    let mut current = root;

    while let Some(child) = select_child(arena, current, config.c_puct) {
        let action = arena[child]
            .action()
            .cloned()
            .ok_or(SearchError::NoDecision)?;
        state.push(action);
        path.push(child);
        current = child;
    }

    if !state.finished() {
        expand(arena, current, state, config, prior)?;
    }

    if current == root {
        trace!("playout stopped at unexpanded root");
        return Ok(None);
    }

    let value = evaluate_leaf(arena, current, state, oracle)?;
    backup(arena, &path, value);
    trace!("playout depth {} value {value:.4}", path.len() - 1);
    Ok(Some(value))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
