//! Link Manager
//!
//! An edge between a producer and a consumer lives in two intrusive doubly
//! linked lists at once: the producer's subscriber list and the consumer's
//! dependency list. Either side can be walked, and an edge can be unlinked
//! from both in O(1) given its id.
//!
//! # Tracking
//!
//! Every tracked execution of a consumer starts with a cursor positioned
//! before the first dependency. Each read either:
//!
//! 1. repeats the dependency just read (ignored),
//! 2. matches the edge right after the cursor (cursor advances, no allocation),
//! 3. matches an edge already reached in this run (ignored),
//! 4. matches an edge further down the old list (moved behind the cursor), or
//! 5. creates a new edge behind the cursor.
//!
//! When the execution ends, every edge after the cursor was not read this
//! time and is unlinked. Stable dependency sets therefore cost no edge
//! churn at all.

use slotmap::new_key_type;

use super::node::NodeId;
use super::Graph;

new_key_type! {
    /// Identifier of an edge in the graph.
    pub struct LinkId;
}

/// One producer → consumer edge.
#[derive(Debug, Clone)]
pub struct Link {
    /// The producer.
    pub dep: NodeId,

    /// The consumer.
    pub sub: NodeId,

    /// Producer version observed when the consumer last read it.
    pub version: u64,

    /// Tracking epoch of the consumer run that last touched this edge.
    pub epoch: u64,

    // Neighbours in the consumer's dependency list.
    pub(crate) prev_dep: Option<LinkId>,
    pub(crate) next_dep: Option<LinkId>,

    // Neighbours in the producer's subscriber list.
    pub(crate) prev_sub: Option<LinkId>,
    pub(crate) next_sub: Option<LinkId>,
}

impl Graph {
    /// Position the dependency cursor of `sub` before its first edge and
    /// open a new tracking epoch.
    pub fn start_tracking(&mut self, sub: NodeId) {
        self.epoch += 1;
        let epoch = self.epoch;
        if let Some(node) = self.nodes.get_mut(sub) {
            node.deps_tail = None;
            node.epoch = epoch;
        }
    }

    /// Unlink every edge of `sub` that the cursor did not reach.
    ///
    /// Returns the producers that lost their last subscriber.
    pub fn end_tracking(&mut self, sub: NodeId) -> Vec<NodeId> {
        let Some(node) = self.nodes.get(sub) else {
            return Vec::new();
        };
        let mut cursor = match node.deps_tail {
            Some(tail) => self.links.get(tail).and_then(|link| link.next_dep),
            None => node.deps_head,
        };

        let mut orphaned = Vec::new();
        while let Some(id) = cursor {
            cursor = self.links.get(id).and_then(|link| link.next_dep);
            if let Some(dep) = self.unlink(id) {
                orphaned.push(dep);
            }
        }
        orphaned
    }

    /// Record that `sub` read `dep` during its current tracked execution.
    pub fn link(&mut self, dep: NodeId, sub: NodeId) {
        let (Some(dep_node), Some(sub_node)) = (self.nodes.get(dep), self.nodes.get(sub)) else {
            return;
        };
        let version = dep_node.version;
        let epoch = sub_node.epoch;
        let tail = sub_node.deps_tail;

        // Same producer read twice in a row.
        if let Some(tail) = tail {
            if self.links[tail].dep == dep {
                return;
            }
        }

        // Cheap path: the edge right after the cursor.
        let next = match tail {
            Some(tail) => self.links[tail].next_dep,
            None => sub_node.deps_head,
        };
        if let Some(next) = next {
            let link = &mut self.links[next];
            if link.dep == dep {
                link.version = version;
                link.epoch = epoch;
                self.nodes[sub].deps_tail = Some(next);
                return;
            }
        }

        if let Some(existing) = self.find_link(dep, sub) {
            let link = &mut self.links[existing];
            if link.epoch == epoch {
                // Already read in this run; keep the first observed version.
                return;
            }
            link.version = version;
            link.epoch = epoch;
            self.move_dep_after(existing, sub, tail);
            self.nodes[sub].deps_tail = Some(existing);
            return;
        }

        let id = self.links.insert(Link {
            dep,
            sub,
            version,
            epoch,
            prev_dep: None,
            next_dep: None,
            prev_sub: None,
            next_sub: None,
        });
        self.insert_dep_after(id, sub, tail);
        self.push_sub(id, dep);
        self.nodes[sub].deps_tail = Some(id);
    }

    /// Remove an edge from both of its lists.
    ///
    /// Returns the producer if it has no subscribers left. Unlinking an
    /// edge that no longer exists is a no-op.
    pub fn unlink(&mut self, id: LinkId) -> Option<NodeId> {
        let link = self.links.remove(id)?;

        match link.prev_dep {
            Some(prev) => self.links[prev].next_dep = link.next_dep,
            None => {
                if let Some(sub) = self.nodes.get_mut(link.sub) {
                    sub.deps_head = link.next_dep;
                }
            }
        }
        if let Some(next) = link.next_dep {
            self.links[next].prev_dep = link.prev_dep;
        }
        if let Some(sub) = self.nodes.get_mut(link.sub) {
            if sub.deps_tail == Some(id) {
                sub.deps_tail = link.prev_dep;
            }
            sub.dep_count -= 1;
        }

        match link.prev_sub {
            Some(prev) => self.links[prev].next_sub = link.next_sub,
            None => {
                if let Some(dep) = self.nodes.get_mut(link.dep) {
                    dep.subs_head = link.next_sub;
                }
            }
        }
        match link.next_sub {
            Some(next) => self.links[next].prev_sub = link.prev_sub,
            None => {
                if let Some(dep) = self.nodes.get_mut(link.dep) {
                    dep.subs_tail = link.prev_sub;
                }
            }
        }

        let dep = self.nodes.get_mut(link.dep)?;
        dep.sub_count -= 1;
        (dep.sub_count == 0).then_some(link.dep)
    }

    /// Unlink every dependency of `sub`.
    pub fn unlink_dependencies(&mut self, sub: NodeId) -> Vec<NodeId> {
        let mut orphaned = Vec::new();
        let mut cursor = self.nodes.get(sub).and_then(|node| node.deps_head);
        while let Some(id) = cursor {
            cursor = self.links.get(id).and_then(|link| link.next_dep);
            if let Some(dep) = self.unlink(id) {
                orphaned.push(dep);
            }
        }
        orphaned
    }

    /// Unlink every subscriber of `dep`.
    pub fn unlink_subscribers(&mut self, dep: NodeId) {
        let mut cursor = self.nodes.get(dep).and_then(|node| node.subs_head);
        while let Some(id) = cursor {
            cursor = self.links.get(id).and_then(|link| link.next_sub);
            self.unlink(id);
        }
    }

    /// Consumers of `dep`, in subscription order.
    pub fn subscribers(&self, dep: NodeId) -> Vec<NodeId> {
        let mut subs = Vec::new();
        let mut cursor = self.nodes.get(dep).and_then(|node| node.subs_head);
        while let Some(id) = cursor {
            let link = &self.links[id];
            subs.push(link.sub);
            cursor = link.next_sub;
        }
        subs
    }

    /// Producers of `sub`, in read order.
    pub fn dependencies(&self, sub: NodeId) -> Vec<NodeId> {
        let mut deps = Vec::new();
        let mut cursor = self.nodes.get(sub).and_then(|node| node.deps_head);
        while let Some(id) = cursor {
            let link = &self.links[id];
            deps.push(link.dep);
            cursor = link.next_dep;
        }
        deps
    }

    /// First dependency edge of `sub`.
    pub(crate) fn first_dependency(&self, sub: NodeId) -> Option<LinkId> {
        self.nodes.get(sub).and_then(|node| node.deps_head)
    }

    /// Get an edge.
    pub fn get_link(&self, id: LinkId) -> Option<&Link> {
        self.links.get(id)
    }

    /// Find the edge between `dep` and `sub`, walking whichever of the two
    /// lists is shorter.
    fn find_link(&self, dep: NodeId, sub: NodeId) -> Option<LinkId> {
        let dep_node = &self.nodes[dep];
        let sub_node = &self.nodes[sub];

        if dep_node.sub_count <= sub_node.dep_count {
            let mut cursor = dep_node.subs_tail;
            while let Some(id) = cursor {
                let link = &self.links[id];
                if link.sub == sub {
                    return Some(id);
                }
                cursor = link.prev_sub;
            }
        } else {
            let mut cursor = sub_node.deps_head;
            while let Some(id) = cursor {
                let link = &self.links[id];
                if link.dep == dep {
                    return Some(id);
                }
                cursor = link.next_dep;
            }
        }
        None
    }

    /// Insert `id` into the dependency list of `sub` right after `after`
    /// (at the head when `after` is `None`).
    fn insert_dep_after(&mut self, id: LinkId, sub: NodeId, after: Option<LinkId>) {
        let next = match after {
            Some(after) => self.links[after].next_dep,
            None => self.nodes[sub].deps_head,
        };

        {
            let link = &mut self.links[id];
            link.prev_dep = after;
            link.next_dep = next;
        }
        match after {
            Some(after) => self.links[after].next_dep = Some(id),
            None => self.nodes[sub].deps_head = Some(id),
        }
        if let Some(next) = next {
            self.links[next].prev_dep = Some(id);
        }
        self.nodes[sub].dep_count += 1;
    }

    /// Detach `id` from the dependency list of `sub` and reinsert it after
    /// `after`. The subscriber list is untouched.
    fn move_dep_after(&mut self, id: LinkId, sub: NodeId, after: Option<LinkId>) {
        let (prev, next) = {
            let link = &self.links[id];
            (link.prev_dep, link.next_dep)
        };
        match prev {
            Some(prev) => self.links[prev].next_dep = next,
            None => self.nodes[sub].deps_head = next,
        }
        if let Some(next) = next {
            self.links[next].prev_dep = prev;
        }
        self.nodes[sub].dep_count -= 1;

        self.insert_dep_after(id, sub, after);
    }

    /// Append `id` to the subscriber list of `dep`.
    fn push_sub(&mut self, id: LinkId, dep: NodeId) {
        let tail = self.nodes[dep].subs_tail;
        {
            let link = &mut self.links[id];
            link.prev_sub = tail;
            link.next_sub = None;
        }
        match tail {
            Some(tail) => self.links[tail].next_sub = Some(id),
            None => self.nodes[dep].subs_head = Some(id),
        }
        let node = &mut self.nodes[dep];
        node.subs_tail = Some(id);
        node.sub_count += 1;
    }
}
