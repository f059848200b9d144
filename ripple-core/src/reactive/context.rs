//! Reactive Context
//!
//! The reactive context tracks which computation is currently running.
//! This enables automatic dependency tracking: when a signal is read,
//! we link it to the current consumer.
//!
//! # Implementation
//!
//! Two thread-local slots hold the state:
//!
//! - the active consumer: the node whose reads are being recorded
//! - the active owner: the effect, watcher or scope that adopts newly
//!   created nodes and receives `on_cleanup` callbacks
//!
//! Entering a context swaps new values in and returns a guard holding the
//! previous ones. Dropping the guard restores them, also when the
//! computation panics, so a failed body can never leave tracking pointed at
//! a stale node.

use std::cell::Cell;

use crate::graph::NodeId;

thread_local! {
    static CONSUMER: Cell<Option<NodeId>> = const { Cell::new(None) };
    static OWNER: Cell<Option<NodeId>> = const { Cell::new(None) };
}

/// Guard that restores the previous context when dropped.
#[must_use = "the context is restored as soon as the guard is dropped"]
pub struct ReactiveContext {
    consumer: Option<NodeId>,
    owner: Option<NodeId>,
}

impl ReactiveContext {
    /// Enter a context with the given consumer and owner.
    pub fn enter(consumer: Option<NodeId>, owner: Option<NodeId>) -> Self {
        Self {
            consumer: Self::set_consumer(consumer),
            owner: Self::set_owner(owner),
        }
    }

    /// Stop recording reads; keep the current owner.
    pub fn untracked() -> Self {
        Self::enter(None, Self::current_owner())
    }

    /// Replace the active consumer, returning the previous one.
    pub fn set_consumer(consumer: Option<NodeId>) -> Option<NodeId> {
        CONSUMER.with(|cell| cell.replace(consumer))
    }

    /// Replace the active owner, returning the previous one.
    pub fn set_owner(owner: Option<NodeId>) -> Option<NodeId> {
        OWNER.with(|cell| cell.replace(owner))
    }

    /// Get the node currently recording dependencies, if any.
    pub fn current_consumer() -> Option<NodeId> {
        CONSUMER.with(Cell::get)
    }

    /// Get the node currently adopting new nodes, if any.
    pub fn current_owner() -> Option<NodeId> {
        OWNER.with(Cell::get)
    }

    /// Check if reads are currently being recorded.
    pub fn is_tracking() -> bool {
        Self::current_consumer().is_some()
    }
}

impl Drop for ReactiveContext {
    fn drop(&mut self) {
        // Thread teardown may already have destroyed the slots.
        let _ = CONSUMER.try_with(|cell| cell.set(self.consumer));
        let _ = OWNER.try_with(|cell| cell.set(self.owner));
    }
}

/// Run `f` without recording any reads as dependencies of the current
/// consumer.
///
/// Nested calls are no-ops for the inner call.
///
/// # Example
///
/// ```rust
/// use ripple_core::{untracked, Effect, Signal};
///
/// let a = Signal::new(1);
/// let b = Signal::new(2);
///
/// let (a2, b2) = (a.clone(), b.clone());
/// let _effect = Effect::new(move || {
///     let _ = a2.get();
///     let _ = untracked(|| b2.get());
/// });
///
/// // Writing `b` does not re-run the effect.
/// b.set(3);
/// ```
pub fn untracked<R>(f: impl FnOnce() -> R) -> R {
    let _ctx = ReactiveContext::untracked();
    f()
}
