//! Dependency Graph
//!
//! This module implements the topology of the reactive graph: nodes, the
//! edges between them, and the batch queue that defers effect execution.
//! It knows nothing about user values or closures beyond the `Reaction`
//! trait object each computed or sink node carries.
//!
//! # Overview
//!
//! The dependency graph is a directed acyclic graph (DAG) where:
//!
//! - Nodes represent signals, computeds, effects, watchers and scopes
//! - Edges represent reads: if A read B during its last run, there is an
//!   edge from B (producer) to A (consumer)
//!
//! # Design Decisions
//!
//! 1. Nodes and edges live in generational arenas (`slotmap`), so a handle
//!    to a disposed node can never alias a newer one.
//!
//! 2. Each node keeps intrusive doubly linked lists of its dependency and
//!    subscriber edges. Unlinking an edge is O(1) on both sides, and a
//!    cursor lets repeated executions reuse edges instead of rebuilding them.
//!
//! 3. The graph is a plain data structure. The runtime borrows it briefly
//!    for every operation and never while user code runs.

mod link;
mod node;
mod scheduler;

use slotmap::SlotMap;

pub use link::{Link, LinkId};
pub use node::{Flags, Node, NodeId, NodeKind, RunKind};
pub(crate) use node::{Cleanup, Reaction, ReactionRef};
pub use scheduler::BatchScheduler;

/// Node and edge storage for one runtime.
#[derive(Debug)]
pub struct Graph {
    nodes: SlotMap<NodeId, Node>,
    links: SlotMap<LinkId, Link>,

    /// Global logical clock, bumped on every committed source write.
    clock: u64,

    /// Last tracking epoch handed out.
    epoch: u64,
}

impl Graph {
    /// Create a new empty graph.
    pub fn new() -> Self {
        Self {
            nodes: SlotMap::with_key(),
            links: SlotMap::with_key(),
            clock: 0,
            epoch: 0,
        }
    }

    /// Add a node to the graph.
    pub fn insert(&mut self, node: Node) -> NodeId {
        self.nodes.insert(node)
    }

    /// Remove a node from the graph.
    ///
    /// Also removes all edges involving this node.
    pub fn remove(&mut self, id: NodeId) -> Option<Node> {
        self.unlink_dependencies(id);
        self.unlink_subscribers(id);
        self.nodes.remove(id)
    }

    /// Get a reference to a node.
    pub fn get(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id)
    }

    /// Get a mutable reference to a node.
    pub fn get_mut(&mut self, id: NodeId) -> Option<&mut Node> {
        self.nodes.get_mut(id)
    }

    /// Whether the node is still present.
    pub fn contains(&self, id: NodeId) -> bool {
        self.nodes.contains_key(id)
    }

    /// Current value of the global clock.
    pub fn clock(&self) -> u64 {
        self.clock
    }

    /// Record a committed write to `id`: bump its version and the clock.
    pub fn commit_write(&mut self, id: NodeId) {
        self.clock += 1;
        if let Some(node) = self.nodes.get_mut(id) {
            node.version += 1;
        }
    }

    /// Get the total number of nodes in the graph.
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Get the total number of edges in the graph.
    pub fn link_count(&self) -> usize {
        self.links.len()
    }
}

impl Default for Graph {
    fn default() -> Self {
        Self::new()
    }
}
