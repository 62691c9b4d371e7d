pub mod action;
pub mod error;
pub mod node;
pub mod oracle;
pub mod prior;
pub mod record;
pub mod search;
pub mod state;
pub mod tree;

#[cfg(feature = "python")]
pub mod bindings;

#[cfg(test)]
pub(crate) mod test_util;

pub use action::{Action, Communication};
pub use error::SearchError;
pub use node::{Node, NodeArena, NodeIndex};
pub use oracle::{leaf_value, CostOracle, OracleError};
pub use prior::{PriorFn, UniformPrior};
pub use record::{Record, TaskSpec, TopoSpec, MAX_TASKS};
pub use search::{
    backup, evaluate_leaf, expand, legal_actions, playout, puct_score, select_child,
    SearchConfig, SearchPath, DEFAULT_C_PUCT,
};
pub use state::{SortedGroup, State, Strategy};
pub use tree::{BestTrajectory, ChildStats, Tree};
