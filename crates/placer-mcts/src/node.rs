use std::ops::{Index, IndexMut};

use crate::action::Action;

// ---------------------------------------------------------------------------
// NodeIndex — typed arena index
// ---------------------------------------------------------------------------

#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct NodeIndex(u32);

impl NodeIndex {
    fn as_usize(self) -> usize {
        self.0 as usize
    }
}

// ---------------------------------------------------------------------------
// Node — one vertex of the search tree
// ---------------------------------------------------------------------------

/// Search statistics for one decision.
///
/// Children are allocated contiguously at expansion, so a node only stores
/// the first child index and the count. Iteration order is enumeration order,
/// which is also the PUCT tie-break order.
#[derive(Clone, Debug)]
pub struct Node {
    /// `None` only for the root.
    action: Option<Action>,
    prior: f32,

    // Welford running mean of backed-up leaf values
    q: f32,
    visits: u32,

    // Oracle result, computed at most once
    value: Option<f32>,

    first_child: Option<NodeIndex>,
    n_children: u32,
}

impl Node {
    pub fn root() -> Self {
        Self {
            action: None,
            prior: 0.0,
            q: 0.0,
            visits: 0,
            value: None,
            first_child: None,
            n_children: 0,
        }
    }

    pub fn new(action: Action, prior: f32) -> Self {
        Self {
            action: Some(action),
            prior,
            ..Self::root()
        }
    }

    // --- Getters ---

    pub fn action(&self) -> Option<&Action> {
        self.action.as_ref()
    }
    pub fn prior(&self) -> f32 {
        self.prior
    }
    pub fn q(&self) -> f32 {
        self.q
    }
    pub fn visits(&self) -> u32 {
        self.visits
    }
    pub fn cached_value(&self) -> Option<f32> {
        self.value
    }
    pub fn n_children(&self) -> usize {
        self.n_children as usize
    }

    /// Unexpanded.
    pub fn is_leaf(&self) -> bool {
        self.n_children == 0
    }

    pub fn children(&self) -> impl Iterator<Item = NodeIndex> + Clone {
        let start = self.first_child.map_or(0, |c| c.0);
        (start..start + self.n_children).map(NodeIndex)
    }

    // --- Setters ---

    pub fn set_children(&mut self, first: NodeIndex, n: usize) {
        debug_assert!(self.is_leaf(), "set_children: node already expanded");
        self.first_child = Some(first);
        self.n_children = n as u32;
    }

    pub fn set_cached_value(&mut self, value: f32) {
        debug_assert!(self.value.is_none(), "set_cached_value: value already cached");
        self.value = Some(value);
    }

    /// Warm start: pretend the node has been visited `n` more times.
    pub fn seed_visits(&mut self, n: u32) {
        self.visits += n;
    }

    // --- Value update ---

    /// Welford running-average update: q ← q + (value - q) / visits
    pub fn update(&mut self, value: f32) {
        self.visits += 1;
        self.q += (value - self.q) / self.visits as f32;
    }
}

// ---------------------------------------------------------------------------
// NodeArena — arena allocator
// ---------------------------------------------------------------------------

pub struct NodeArena {
    nodes: Vec<Node>,
}

impl NodeArena {
    pub fn new() -> Self {
        Self { nodes: Vec::new() }
    }

    pub fn with_capacity(cap: usize) -> Self {
        Self {
            nodes: Vec::with_capacity(cap),
        }
    }

    pub fn alloc(&mut self, node: Node) -> NodeIndex {
        let idx = NodeIndex(self.nodes.len() as u32);
        self.nodes.push(node);
        idx
    }

    /// Allocate `nodes` back to back and return the index of the first.
    pub fn alloc_contiguous(&mut self, nodes: impl IntoIterator<Item = Node>) -> NodeIndex {
        let first = NodeIndex(self.nodes.len() as u32);
        self.nodes.extend(nodes);
        first
    }

    pub fn get(&self, idx: NodeIndex) -> &Node {
        &self.nodes[idx.as_usize()]
    }

    pub fn get_mut(&mut self, idx: NodeIndex) -> &mut Node {
        &mut self.nodes[idx.as_usize()]
    }

    pub fn clear(&mut self) {
        self.nodes.clear();
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

impl Default for NodeArena {
    fn default() -> Self {
        Self::new()
    }
}

impl Index<NodeIndex> for NodeArena {
    type Output = Node;

    fn index(&self, idx: NodeIndex) -> &Node {
        self.get(idx)
    }
}

impl IndexMut<NodeIndex> for NodeArena {
    fn index_mut(&mut self, idx: NodeIndex) -> &mut Node {
        self.get_mut(idx)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
