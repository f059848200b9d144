//! Batch Scheduler
//!
//! The scheduler decides when queued effects run. It does not run them
//! itself; the runtime drains it.
//!
//! # Algorithm
//!
//! 1. Every public write opens a batch; `batch()` opens an explicit one.
//!    Batches nest by depth.
//! 2. Propagation pushes each sink that leaves the clean state onto a FIFO
//!    queue exactly once (the node's `QUEUED` flag guards re-entry).
//! 3. When the outermost batch closes, the queue is drained pass by pass in
//!    the order sinks were first marked. Sinks re-marked while a pass runs
//!    land in the next pass.
//! 4. Once the queue is empty the runtime is idle, and computeds that lost
//!    their last subscriber are offered for auto-disposal.

use std::collections::VecDeque;

use indexmap::IndexSet;

use super::node::NodeId;

/// Batch depth, the effect queue, and the idle-time disposal set.
#[derive(Debug, Default)]
pub struct BatchScheduler {
    depth: usize,
    flushing: bool,
    queue: VecDeque<NodeId>,
    unobserved: IndexSet<NodeId>,
}

impl BatchScheduler {
    /// Create a new empty scheduler.
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a batch.
    pub fn start_batch(&mut self) {
        self.depth += 1;
    }

    /// Close a batch. Returns `true` when this closed the outermost batch
    /// and no flush is already running, i.e. when the caller must flush.
    pub fn end_batch(&mut self) -> bool {
        debug_assert!(self.depth > 0, "end_batch without matching start_batch");
        self.depth = self.depth.saturating_sub(1);
        self.depth == 0 && !self.flushing
    }

    /// Current batch depth.
    pub fn depth(&self) -> usize {
        self.depth
    }

    /// Mark the start or end of a flush.
    pub fn set_flushing(&mut self, flushing: bool) {
        self.flushing = flushing;
    }

    /// Queue a sink. The caller guarantees it is not already queued.
    pub fn enqueue(&mut self, id: NodeId) {
        self.queue.push_back(id);
    }

    /// Take everything queued so far as one flush pass.
    pub fn take_pass(&mut self) -> VecDeque<NodeId> {
        std::mem::take(&mut self.queue)
    }

    /// Number of queued sinks.
    pub fn queued(&self) -> usize {
        self.queue.len()
    }

    /// Offer a node for disposal at the next idle point.
    pub fn defer_unobserved(&mut self, id: NodeId) {
        self.unobserved.insert(id);
    }

    /// Take the nodes offered for idle-time disposal.
    pub fn take_unobserved(&mut self) -> Vec<NodeId> {
        self.unobserved.drain(..).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use slotmap::SlotMap;

    fn ids(count: usize) -> Vec<NodeId> {
        let mut map: SlotMap<NodeId, ()> = SlotMap::with_key();
        (0..count).map(|_| map.insert(())).collect()
    }

    #[test]
    fn only_outermost_batch_requests_flush() {
        let mut scheduler = BatchScheduler::new();

        scheduler.start_batch();
        scheduler.start_batch();
        assert_eq!(scheduler.depth(), 2);

        assert!(!scheduler.end_batch());
        assert!(scheduler.end_batch());
        assert_eq!(scheduler.depth(), 0);
    }

    #[test]
    fn no_nested_flush_while_flushing() {
        let mut scheduler = BatchScheduler::new();
        scheduler.set_flushing(true);

        scheduler.start_batch();
        assert!(!scheduler.end_batch());

        scheduler.set_flushing(false);
        scheduler.start_batch();
        assert!(scheduler.end_batch());
    }

    #[test]
    fn passes_preserve_enqueue_order() {
        let mut scheduler = BatchScheduler::new();
        let ids = ids(3);

        for id in &ids {
            scheduler.enqueue(*id);
        }
        assert_eq!(scheduler.queued(), 3);

        let pass: Vec<_> = scheduler.take_pass().into_iter().collect();
        assert_eq!(pass, ids);
        assert_eq!(scheduler.queued(), 0);
    }

    #[test]
    fn unobserved_set_dedupes() {
        let mut scheduler = BatchScheduler::new();
        let ids = ids(2);

        scheduler.defer_unobserved(ids[0]);
        scheduler.defer_unobserved(ids[1]);
        scheduler.defer_unobserved(ids[0]);

        assert_eq!(scheduler.take_unobserved(), ids);
        assert!(scheduler.take_unobserved().is_empty());
    }
}
