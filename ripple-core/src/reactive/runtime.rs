//! Reactive Runtime
//!
//! The runtime is the central coordinator that connects signals, computeds,
//! effects and watchers. It owns the dependency graph and the batch
//! scheduler, and it is the only place that calls back into user code.
//!
//! # How It Works
//!
//! 1. When a signal is written and its value actually changes, the runtime
//!    bumps its version and walks forward through the subscribers:
//!    a. direct subscribers are marked dirty
//!    b. everything further downstream is marked pending
//!    c. effects and watchers are queued
//!    d. computeds are lazy: nothing is recomputed during the walk
//!
//! 2. When a computed is read, the runtime walks backwards: a dirty
//!    computed recomputes; a pending one first refreshes its dependencies
//!    in read order and recomputes only if one of them reports a version
//!    different from the one recorded on the edge.
//!
//! 3. When the outermost batch closes, queued sinks run once each, in the
//!    order they were first marked.
//!
//! # Thread Safety
//!
//! There is one runtime per thread, held in thread-local storage. Handles
//! are `!Send`; a graph is driven from the thread that created it.
//!
//! # Borrowing
//!
//! The graph and scheduler sit in `RefCell`s. Every borrow is scoped to a
//! few lines of bookkeeping and is released before any getter, body,
//! cleanup, observer, or destructor of user data runs.

use std::any::Any;
use std::cell::{Cell, RefCell};
use std::mem;
use std::panic::{self, AssertUnwindSafe};
use std::rc::Rc;

use indexmap::IndexMap;

use crate::error::{ReactiveError, Result};
use crate::graph::{BatchScheduler, Cleanup, Flags, Graph, Node, NodeId, NodeKind, RunKind};

use super::context::ReactiveContext;
use super::observer::{Observer, ObserverId};

/// Per-thread runtime settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RuntimeConfig {
    /// Maximum number of queue passes in one flush before the runtime gives
    /// up on effects that keep re-triggering each other.
    pub max_flush_passes: usize,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            max_flush_passes: 1000,
        }
    }
}

/// Why a queued sink did not complete.
enum Failure {
    Panic(Box<dyn Any + Send>),
    Error(ReactiveError),
}

/// The per-thread reactive runtime.
pub(crate) struct Runtime {
    graph: RefCell<Graph>,
    scheduler: RefCell<BatchScheduler>,
    observers: RefCell<IndexMap<ObserverId, Rc<dyn Observer>>>,
    config: Cell<RuntimeConfig>,
}

thread_local! {
    static RUNTIME: Runtime = Runtime::new();
}

impl Runtime {
    fn new() -> Self {
        Self {
            graph: RefCell::new(Graph::new()),
            scheduler: RefCell::new(BatchScheduler::new()),
            observers: RefCell::new(IndexMap::new()),
            config: Cell::new(RuntimeConfig::default()),
        }
    }

    /// Run `f` against this thread's runtime.
    pub(crate) fn with<R>(f: impl FnOnce(&Runtime) -> R) -> R {
        RUNTIME.with(f)
    }

    /// Like [`Runtime::with`], but returns `None` during thread teardown.
    pub(crate) fn try_with<R>(f: impl FnOnce(&Runtime) -> R) -> Option<R> {
        RUNTIME.try_with(f).ok()
    }

    // ------------------------------------------------------------------
    // Creation and inspection
    // ------------------------------------------------------------------

    /// Insert a node, adopting it into `owner` when given.
    pub(crate) fn create(&self, mut node: Node, owner: Option<NodeId>) -> NodeId {
        let kind = node.kind();
        let id = {
            let mut graph = self.graph.borrow_mut();
            let owner = owner.filter(|owner| {
                graph.get(*owner).is_some_and(|node| {
                    node.kind().is_owner() && !node.flags.contains(Flags::DISPOSED)
                })
            });
            node.owner = owner;
            let id = graph.insert(node);
            if let Some(owner) = owner.and_then(|owner| graph.get_mut(owner)) {
                owner.owned.insert(id);
            }
            id
        };

        tracing::trace!(target: "ripple", node = ?id, kind = ?kind, "node created");
        for observer in self.observers() {
            observer.on_create(id, kind);
        }
        id
    }

    /// Fail with [`ReactiveError::Disposed`] unless `id` is live.
    pub(crate) fn ensure_alive(&self, id: NodeId) -> Result<()> {
        match self.graph.borrow().get(id) {
            Some(node) if !node.flags.contains(Flags::DISPOSED) => Ok(()),
            _ => Err(ReactiveError::Disposed(id)),
        }
    }

    /// Whether `id` has been disposed, or is being disposed.
    pub(crate) fn is_disposed(&self, id: NodeId) -> bool {
        self.ensure_alive(id).is_err()
    }

    pub(crate) fn flags(&self, id: NodeId) -> Option<Flags> {
        self.graph.borrow().get(id).map(Node::flags)
    }

    pub(crate) fn with_node<R>(&self, id: NodeId, f: impl FnOnce(&Node) -> R) -> Option<R> {
        self.graph.borrow().get(id).map(f)
    }

    pub(crate) fn node_count(&self) -> usize {
        self.graph.borrow().node_count()
    }

    pub(crate) fn link_count(&self) -> usize {
        self.graph.borrow().link_count()
    }

    pub(crate) fn config(&self) -> RuntimeConfig {
        self.config.get()
    }

    pub(crate) fn set_config(&self, config: RuntimeConfig) {
        self.config.set(config);
    }

    // ------------------------------------------------------------------
    // Read path
    // ------------------------------------------------------------------

    /// Link `id` to the active consumer, if any.
    pub(crate) fn track(&self, id: NodeId) -> Result<()> {
        let consumer = ReactiveContext::current_consumer();
        let mut graph = self.graph.borrow_mut();
        match graph.get(id) {
            Some(node) if !node.flags.contains(Flags::DISPOSED) => {}
            _ => return Err(ReactiveError::Disposed(id)),
        }
        if let Some(consumer) = consumer {
            if consumer != id {
                graph.link(id, consumer);
            }
        }
        Ok(())
    }

    /// Bring a computed up to date.
    pub(crate) fn refresh(&self, id: NodeId) -> Result<()> {
        let flags = self.flags(id).ok_or(ReactiveError::Disposed(id))?;
        if flags.contains(Flags::DISPOSED) {
            return Err(ReactiveError::Disposed(id));
        }
        if flags.contains(Flags::RUNNING) {
            return Err(ReactiveError::Cycle(id));
        }

        if flags.contains(Flags::DIRTY) {
            return self.recompute(id);
        }
        if flags.contains(Flags::PENDING) {
            if self.check_dirty(id)? {
                return self.recompute(id);
            }
            let mut graph = self.graph.borrow_mut();
            let clock = graph.clock();
            if let Some(node) = graph.get_mut(id) {
                node.mark_clean();
                node.verified_at = clock;
            }
        }
        Ok(())
    }

    /// Resolve a pending node: refresh its dependencies in read order and
    /// report whether any of them changed since this node last read it.
    fn check_dirty(&self, id: NodeId) -> Result<bool> {
        let mut cursor = {
            let graph = self.graph.borrow();
            let Some(node) = graph.get(id) else {
                return Ok(true);
            };
            if node.verified_at == graph.clock() {
                // Nothing was written anywhere since this node was verified.
                return Ok(false);
            }
            graph.first_dependency(id)
        };

        while let Some(link_id) = cursor {
            let (dep, seen, stale_computed) = {
                let graph = self.graph.borrow();
                let Some(link) = graph.get_link(link_id) else {
                    return Ok(true);
                };
                let Some(dep) = graph.get(link.dep) else {
                    return Ok(true);
                };
                cursor = link.next_dep;
                let stale = dep.kind() == NodeKind::Computed && dep.flags.is_stale();
                (link.dep, link.version, stale)
            };

            if stale_computed {
                self.refresh(dep)?;
            }

            let current = self.graph.borrow().get(dep).map(Node::version);
            if current != Some(seen) {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Run a computed's getter and commit the result.
    fn recompute(&self, id: NodeId) -> Result<()> {
        let (reaction, started_at) = {
            let mut graph = self.graph.borrow_mut();
            let clock = graph.clock();
            let node = graph.get_mut(id).ok_or(ReactiveError::Disposed(id))?;
            let reaction = node
                .reaction
                .as_ref()
                .and_then(|reaction| reaction.upgrade())
                .ok_or(ReactiveError::Disposed(id))?;
            node.mark_clean();
            node.flags.insert(Flags::RUNNING);
            graph.start_tracking(id);
            (reaction, clock)
        };

        tracing::trace!(target: "ripple", node = ?id, "recomputing");

        let changed = {
            let mut guard = TrackingGuard::new(self, id);
            let _ctx = ReactiveContext::enter(Some(id), None);
            let changed = reaction.execute(RunKind::Full);
            guard.complete();
            changed
        };
        drop(reaction);

        {
            let mut graph = self.graph.borrow_mut();
            let Some(node) = graph.get_mut(id) else {
                return Err(ReactiveError::Disposed(id));
            };
            if node.flags.contains(Flags::DISPOSED) {
                return Err(ReactiveError::Disposed(id));
            }
            node.verified_at = started_at;
            if changed {
                node.version += 1;
                confirm_subscribers(&mut graph, id);
            }
        }

        if changed {
            for observer in self.observers() {
                observer.on_update(id);
            }
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Write path
    // ------------------------------------------------------------------

    /// Set the skip-equality marker for the next write to `id`.
    pub(crate) fn set_force_notify(&self, id: NodeId) {
        if let Some(node) = self.graph.borrow_mut().get_mut(id) {
            node.flags.insert(Flags::FORCE_NOTIFY);
        }
    }

    /// Clear the skip-equality marker, returning whether it was set.
    pub(crate) fn take_force_notify(&self, id: NodeId) -> bool {
        let mut graph = self.graph.borrow_mut();
        let Some(node) = graph.get_mut(id) else {
            return false;
        };
        let forced = node.flags.contains(Flags::FORCE_NOTIFY);
        node.flags.remove(Flags::FORCE_NOTIFY);
        forced
    }

    /// Commit a changed source value and propagate it.
    pub(crate) fn propagate_write(&self, id: NodeId) -> Result<()> {
        self.graph.borrow_mut().commit_write(id);
        tracing::trace!(target: "ripple", node = ?id, "source changed");

        let batch = BatchGuard::open();
        for observer in self.observers() {
            observer.on_update(id);
        }
        let marked = self.propagate(id);
        let flushed = batch.close();
        marked.and(flushed)
    }

    /// Forward walk: direct subscribers of `source` become dirty, everything
    /// further downstream pending. Sinks leaving the clean state are queued.
    fn propagate(&self, source: NodeId) -> Result<()> {
        let mut notified = Vec::new();
        let result = {
            let mut graph = self.graph.borrow_mut();
            let mut scheduler = self.scheduler.borrow_mut();
            mark_downstream(&mut graph, &mut scheduler, source, &mut notified)
        };

        if !notified.is_empty() {
            let observers = self.observers();
            for id in &notified {
                for observer in &observers {
                    observer.on_notify(*id);
                }
            }
        }
        result
    }

    // ------------------------------------------------------------------
    // Batching and flushing
    // ------------------------------------------------------------------

    pub(crate) fn start_batch(&self) {
        self.scheduler.borrow_mut().start_batch();
    }

    /// Close a batch, flushing if it was the outermost one. The first panic
    /// raised by an effect during the flush is resumed here.
    pub(crate) fn end_batch(&self) -> Result<()> {
        match self.close_batch() {
            Ok(()) => Ok(()),
            Err(Failure::Error(err)) => Err(err),
            Err(Failure::Panic(payload)) => panic::resume_unwind(payload),
        }
    }

    /// Close a batch without raising: used on early-return and unwinding
    /// paths where the caller already has an outcome to report.
    pub(crate) fn end_batch_quietly(&self) {
        if std::thread::panicking() {
            // Leave the queue for the next flush rather than running user
            // code while unwinding.
            self.scheduler.borrow_mut().end_batch();
            return;
        }
        match self.close_batch() {
            Ok(()) => {}
            Err(Failure::Error(err)) => {
                tracing::warn!(target: "ripple", error = %err, "flush failed while closing batch");
            }
            Err(Failure::Panic(_)) => {
                tracing::warn!(target: "ripple", "effect panicked while closing batch");
            }
        }
    }

    fn close_batch(&self) -> std::result::Result<(), Failure> {
        let must_flush = self.scheduler.borrow_mut().end_batch();
        if must_flush {
            self.flush()
        } else {
            Ok(())
        }
    }

    /// Drain the queue pass by pass, isolating failures per sink.
    fn flush(&self) -> std::result::Result<(), Failure> {
        self.scheduler.borrow_mut().set_flushing(true);
        let max_passes = self.config.get().max_flush_passes;
        let mut failures = Vec::new();
        let mut passes = 0;
        let mut runs = 0;

        loop {
            let pass = self.scheduler.borrow_mut().take_pass();
            if pass.is_empty() {
                break;
            }
            passes += 1;
            if passes > max_passes {
                self.abandon_queue(pass);
                tracing::error!(target: "ripple", passes = max_passes, "effects did not settle");
                failures.push(Failure::Error(ReactiveError::FlushLimit { passes: max_passes }));
                break;
            }

            for id in pass {
                runs += 1;
                match panic::catch_unwind(AssertUnwindSafe(|| self.settle(id))) {
                    Ok(Ok(())) => {}
                    Ok(Err(err)) => {
                        tracing::error!(target: "ripple", node = ?id, error = %err, "effect failed");
                        failures.push(Failure::Error(err));
                    }
                    Err(payload) => {
                        tracing::error!(target: "ripple", node = ?id, "effect panicked");
                        failures.push(Failure::Panic(payload));
                    }
                }
            }
        }

        self.scheduler.borrow_mut().set_flushing(false);
        if runs > 0 {
            tracing::debug!(target: "ripple", passes, runs, failures = failures.len(), "flush complete");
        }

        self.dispose_unobserved();

        match failures.into_iter().next() {
            Some(failure) => Err(failure),
            None => Ok(()),
        }
    }

    fn abandon_queue(&self, pass: impl IntoIterator<Item = NodeId>) {
        let rest = self.scheduler.borrow_mut().take_pass();
        let mut graph = self.graph.borrow_mut();
        for id in pass.into_iter().chain(rest) {
            if let Some(node) = graph.get_mut(id) {
                node.flags.remove(Flags::QUEUED);
            }
        }
    }

    /// Process one dequeued sink: run it if its dependencies really changed.
    fn settle(&self, id: NodeId) -> Result<()> {
        let flags = {
            let mut graph = self.graph.borrow_mut();
            let Some(node) = graph.get_mut(id) else {
                return Ok(());
            };
            node.flags.remove(Flags::QUEUED);
            node.flags
        };
        if flags.intersects(Flags::DISPOSED | Flags::PAUSED) {
            return Ok(());
        }

        let run = flags.contains(Flags::DIRTY)
            || (flags.contains(Flags::PENDING) && self.check_dirty(id)?);
        if run {
            self.run_sink(id, RunKind::Full)
        } else {
            if let Some(node) = self.graph.borrow_mut().get_mut(id) {
                node.mark_clean();
            }
            Ok(())
        }
    }

    // ------------------------------------------------------------------
    // Running sinks
    // ------------------------------------------------------------------

    /// Run an effect or watcher body with itself as consumer and owner.
    pub(crate) fn run_sink(&self, id: NodeId, kind: RunKind) -> Result<()> {
        let reaction = {
            let graph = self.graph.borrow();
            let node = graph.get(id).ok_or(ReactiveError::Disposed(id))?;
            if node.flags.contains(Flags::DISPOSED) {
                return Err(ReactiveError::Disposed(id));
            }
            if node.flags.contains(Flags::RUNNING) {
                return Err(ReactiveError::Reentrant(id));
            }
            node.reaction
                .as_ref()
                .and_then(|reaction| reaction.upgrade())
                .ok_or(ReactiveError::Disposed(id))?
        };

        let batch = BatchGuard::open();
        if kind == RunKind::Full {
            self.run_cleanups(id);
            self.dispose_owned(id);
        }

        {
            let mut graph = self.graph.borrow_mut();
            let clock = graph.clock();
            if let Some(node) = graph.get_mut(id) {
                node.mark_clean();
                node.verified_at = clock;
                node.flags.insert(Flags::RUNNING);
                if !node.flags.contains(Flags::INITIALIZED) {
                    node.flags.insert(Flags::RECURSED_CHECK);
                }
            }
            graph.start_tracking(id);
        }

        tracing::trace!(target: "ripple", node = ?id, ?kind, "running effect");
        {
            let mut guard = TrackingGuard::new(self, id);
            let _ctx = ReactiveContext::enter(Some(id), Some(id));
            reaction.execute(kind);
            guard.complete();
        }
        drop(reaction);

        batch.close()
    }

    /// Unlink a watcher from everything it reads and keep it dormant.
    pub(crate) fn pause(&self, id: NodeId) -> Result<()> {
        let orphaned = {
            let mut graph = self.graph.borrow_mut();
            let node = match graph.get_mut(id) {
                Some(node) if !node.flags.contains(Flags::DISPOSED) => node,
                _ => return Err(ReactiveError::Disposed(id)),
            };
            node.flags.insert(Flags::PAUSED);
            node.mark_clean();
            graph.unlink_dependencies(id)
        };
        self.defer_unobserved(orphaned);
        Ok(())
    }

    /// Wake a paused watcher and re-track its sources.
    pub(crate) fn resume(&self, id: NodeId, kind: RunKind) -> Result<()> {
        {
            let mut graph = self.graph.borrow_mut();
            let node = match graph.get_mut(id) {
                Some(node) if !node.flags.contains(Flags::DISPOSED) => node,
                _ => return Err(ReactiveError::Disposed(id)),
            };
            if !node.flags.contains(Flags::PAUSED) {
                return Ok(());
            }
            node.flags.remove(Flags::PAUSED);
        }
        self.run_sink(id, kind)
    }

    // ------------------------------------------------------------------
    // Ownership, cleanup and disposal
    // ------------------------------------------------------------------

    /// Register a cleanup on the active owner.
    pub(crate) fn on_cleanup(&self, cleanup: Cleanup) -> Result<()> {
        let owner = ReactiveContext::current_owner().ok_or(ReactiveError::CleanupOutsideOwner)?;
        let mut graph = self.graph.borrow_mut();
        match graph.get_mut(owner) {
            Some(node) if !node.flags.contains(Flags::DISPOSED) => {
                node.cleanups.push(cleanup);
                Ok(())
            }
            _ => Err(ReactiveError::Disposed(owner)),
        }
    }

    fn run_cleanups(&self, id: NodeId) {
        let cleanups = match self.graph.borrow_mut().get_mut(id) {
            Some(node) => mem::take(&mut node.cleanups),
            None => return,
        };
        if cleanups.is_empty() {
            return;
        }
        let _ctx = ReactiveContext::enter(None, None);
        for cleanup in cleanups {
            cleanup();
        }
    }

    fn dispose_owned(&self, id: NodeId) {
        let owned = match self.graph.borrow_mut().get_mut(id) {
            Some(node) => mem::take(&mut node.owned),
            None => return,
        };
        for child in owned {
            self.dispose(child);
        }
    }

    /// Dispose a node. Idempotent.
    ///
    /// A node disposed while its own body runs is finalized when that run
    /// ends.
    pub(crate) fn dispose(&self, id: NodeId) {
        let running = {
            let mut graph = self.graph.borrow_mut();
            let Some(node) = graph.get_mut(id) else {
                return;
            };
            if node.flags.contains(Flags::DISPOSED) {
                return;
            }
            node.flags.insert(Flags::DISPOSED);
            node.flags.contains(Flags::RUNNING)
        };

        tracing::trace!(target: "ripple", node = ?id, deferred = running, "disposing");
        if !running {
            self.finalize_dispose(id);
        }
    }

    /// Dispose a node from a handle and settle the runtime afterwards.
    pub(crate) fn dispose_now(&self, id: NodeId) -> Result<()> {
        let batch = BatchGuard::open();
        self.dispose(id);
        batch.close()
    }

    /// Dispose a node whose last handle went away.
    pub(crate) fn release(&self, id: NodeId) {
        if !self.graph.borrow().contains(id) {
            return;
        }
        self.start_batch();
        self.dispose(id);
        self.end_batch_quietly();
    }

    fn finalize_dispose(&self, id: NodeId) {
        // Children first, so nested scopes unwind depth-first.
        self.dispose_owned(id);
        self.run_cleanups(id);

        let (node, orphaned) = {
            let mut graph = self.graph.borrow_mut();
            let orphaned = graph.unlink_dependencies(id);
            let owner = graph.get(id).and_then(|node| node.owner);
            if let Some(owner) = owner.and_then(|owner| graph.get_mut(owner)) {
                owner.owned.shift_remove(&id);
            }
            (graph.remove(id), orphaned)
        };

        self.defer_unobserved(orphaned);
        for observer in self.observers() {
            observer.on_dispose(id);
        }

        // Drops the reaction, and with it user closures, outside any borrow.
        drop(node);
    }

    /// Queue auto-dispose computeds that just lost their last subscriber.
    fn defer_unobserved(&self, orphaned: Vec<NodeId>) {
        if orphaned.is_empty() {
            return;
        }
        let graph = self.graph.borrow();
        let mut scheduler = self.scheduler.borrow_mut();
        for id in orphaned {
            if let Some(node) = graph.get(id) {
                if node.auto_dispose && node.sub_count == 0 {
                    scheduler.defer_unobserved(id);
                }
            }
        }
    }

    /// Idle point: dispose the computeds that are still unobserved.
    fn dispose_unobserved(&self) {
        loop {
            let candidates = self.scheduler.borrow_mut().take_unobserved();
            if candidates.is_empty() {
                break;
            }
            for id in candidates {
                let unobserved = self.with_node(id, |node| {
                    node.subscriber_count() == 0 && !node.flags.contains(Flags::RUNNING)
                });
                if unobserved == Some(true) {
                    tracing::debug!(target: "ripple", node = ?id, "auto-disposing unobserved computed");
                    self.dispose(id);
                }
            }
        }
    }

    // ------------------------------------------------------------------
    // Observers
    // ------------------------------------------------------------------

    pub(crate) fn add_observer(&self, id: ObserverId, observer: Rc<dyn Observer>) {
        self.observers.borrow_mut().insert(id, observer);
    }

    pub(crate) fn remove_observer(&self, id: ObserverId) -> Option<Rc<dyn Observer>> {
        self.observers.borrow_mut().shift_remove(&id)
    }

    fn observers(&self) -> Vec<Rc<dyn Observer>> {
        let observers = self.observers.borrow();
        if observers.is_empty() {
            return Vec::new();
        }
        observers.values().cloned().collect()
    }
}

/// Mark everything downstream of `source`.
fn mark_downstream(
    graph: &mut Graph,
    scheduler: &mut BatchScheduler,
    source: NodeId,
    notified: &mut Vec<NodeId>,
) -> Result<()> {
    let mut stack = vec![(source, Flags::DIRTY)];
    let mut reentrant = None;

    while let Some((producer, mark)) = stack.pop() {
        let mut computeds = Vec::new();

        for sub in graph.subscribers(producer) {
            let Some(node) = graph.get_mut(sub) else {
                continue;
            };
            let flags = node.flags;
            if flags.intersects(Flags::PAUSED | Flags::DISPOSED) {
                continue;
            }
            if flags.contains(Flags::RECURSED_CHECK) {
                // Finish marking the rest so no subscriber keeps a stale
                // value behind a clean flag.
                reentrant.get_or_insert(sub);
                continue;
            }

            if mark == Flags::DIRTY {
                node.mark_dirty();
            } else {
                node.mark_pending();
            }

            let kind = node.kind();
            if kind == NodeKind::Computed {
                // A stale computed already passed the mark on, unless its
                // last recompute failed and left subscribers behind.
                if !flags.is_stale() || !flags.contains(Flags::INITIALIZED) {
                    computeds.push(sub);
                }
            } else if kind.is_sink() && !flags.contains(Flags::QUEUED) {
                node.flags.insert(Flags::QUEUED);
                scheduler.enqueue(sub);
                notified.push(sub);
            }
        }

        // Reverse so the first subscriber is walked first.
        stack.extend(computeds.into_iter().rev().map(|id| (id, Flags::PENDING)));
    }

    match reentrant {
        Some(id) => Err(ReactiveError::Reentrant(id)),
        None => Ok(()),
    }
}

/// A computed changed on pull: its pending subscribers are now confirmed.
fn confirm_subscribers(graph: &mut Graph, id: NodeId) {
    for sub in graph.subscribers(id) {
        if let Some(node) = graph.get_mut(sub) {
            if node.flags.contains(Flags::PENDING) {
                node.mark_dirty();
            }
        }
    }
}

/// Ends a tracked execution: prunes unread edges, clears the running
/// state, and finalizes a disposal requested mid-run. Runs on unwind too.
struct TrackingGuard<'rt> {
    runtime: &'rt Runtime,
    id: NodeId,
    completed: bool,
}

impl<'rt> TrackingGuard<'rt> {
    fn new(runtime: &'rt Runtime, id: NodeId) -> Self {
        Self {
            runtime,
            id,
            completed: false,
        }
    }

    fn complete(&mut self) {
        self.completed = true;
    }
}

impl Drop for TrackingGuard<'_> {
    fn drop(&mut self) {
        let (orphaned, disposed) = {
            let mut graph = self.runtime.graph.borrow_mut();
            let orphaned = graph.end_tracking(self.id);
            let Some(node) = graph.get_mut(self.id) else {
                return;
            };
            node.flags.remove(Flags::RUNNING | Flags::RECURSED_CHECK);
            if self.completed {
                node.flags.insert(Flags::INITIALIZED);
            } else if node.kind() == NodeKind::Computed {
                // Keep the failed computed retryable on the next read.
                node.mark_dirty();
                node.flags.remove(Flags::INITIALIZED);
            } else if !node.flags.contains(Flags::INITIALIZED) {
                // A sink whose first run failed is dropped; `Effect::new`
                // and `Watcher::new` never hand out a handle for it.
                tracing::debug!(target: "ripple", node = ?self.id, "first run failed, disposing");
                node.flags.insert(Flags::DISPOSED);
            }
            (orphaned, node.flags.contains(Flags::DISPOSED))
        };

        self.runtime.defer_unobserved(orphaned);
        if disposed {
            self.runtime.finalize_dispose(self.id);
        }
    }
}

/// Guard for a batch.
///
/// Opening increments the batch depth; [`BatchGuard::close`] decrements it
/// and flushes when the outermost batch closes. A guard dropped without
/// being closed (early return, panic) still closes its batch, reporting
/// flush failures to the log instead of the caller.
#[must_use = "dropping the guard closes the batch immediately"]
pub struct BatchGuard {
    closed: bool,
}

impl BatchGuard {
    /// Open a batch.
    pub fn open() -> Self {
        Runtime::with(Runtime::start_batch);
        Self { closed: false }
    }

    /// Close the batch, flushing queued effects if this was the outermost
    /// one.
    pub fn close(mut self) -> Result<()> {
        self.closed = true;
        Runtime::with(Runtime::end_batch)
    }
}

impl Drop for BatchGuard {
    fn drop(&mut self) {
        if !self.closed {
            Runtime::try_with(Runtime::end_batch_quietly);
        }
    }
}

/// Open a batch. Effects triggered while any batch is open run once the
/// outermost batch closes.
pub fn start_batch() -> BatchGuard {
    BatchGuard::open()
}

/// Replace this thread's runtime configuration.
pub fn configure(config: RuntimeConfig) {
    Runtime::with(|rt| rt.set_config(config));
}

/// Current runtime configuration for this thread.
pub fn runtime_config() -> RuntimeConfig {
    Runtime::with(Runtime::config)
}

/// Number of live nodes on this thread.
pub fn node_count() -> usize {
    Runtime::with(Runtime::node_count)
}

/// Number of live dependency edges on this thread.
pub fn link_count() -> usize {
    Runtime::with(Runtime::link_count)
}
