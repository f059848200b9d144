//! Effect scopes and cleanup registration.
//!
//! An [`EffectScope`] is an owner with no data-flow role. Everything
//! created while it runs a closure (computeds, effects, watchers, nested
//! scopes) is adopted by it, and disposing the scope disposes all of them,
//! children before parents.

use std::fmt;

use crate::error::{raise, Result};
use crate::graph::{Node, NodeId, NodeKind};

use super::context::ReactiveContext;
use super::runtime::Runtime;

/// A disposal boundary for a group of reactive nodes.
///
/// # Example
///
/// ```rust
/// use ripple_core::{Effect, EffectScope, Signal};
///
/// let source = Signal::new(0);
/// let scope = EffectScope::new();
///
/// let effect = scope.run(|| {
///     let s = source.clone();
///     Effect::new(move || {
///         s.get();
///     })
/// });
///
/// scope.dispose();
/// assert!(effect.is_disposed());
/// ```
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct EffectScope {
    id: NodeId,
}

impl EffectScope {
    /// Create a scope owned by the active owner, if any. Disposing that
    /// owner disposes this scope too.
    pub fn new() -> Self {
        Self::create(ReactiveContext::current_owner())
    }

    /// Create a scope that no owner will dispose.
    pub fn detached() -> Self {
        Self::create(None)
    }

    fn create(owner: Option<NodeId>) -> Self {
        let id = Runtime::with(|rt| rt.create(Node::new(NodeKind::Scope), owner));
        Self { id }
    }

    /// Get the scope's graph id.
    pub fn id(&self) -> NodeId {
        self.id
    }

    /// Run `f` with this scope as the owner of anything it creates.
    ///
    /// Reads inside `f` are not tracked by any outer consumer.
    pub fn try_run<R>(&self, f: impl FnOnce() -> R) -> Result<R> {
        Runtime::with(|rt| rt.ensure_alive(self.id))?;
        let _ctx = ReactiveContext::enter(None, Some(self.id));
        Ok(f())
    }

    /// Run `f` with this scope as owner, panicking if the scope was disposed.
    pub fn run<R>(&self, f: impl FnOnce() -> R) -> R {
        raise(self.try_run(f))
    }

    /// Dispose the scope and everything it owns. Idempotent.
    pub fn dispose(&self) {
        raise(Runtime::with(|rt| rt.dispose_now(self.id)))
    }

    /// Whether the scope has been disposed.
    pub fn is_disposed(&self) -> bool {
        Runtime::with(|rt| rt.is_disposed(self.id))
    }
}

impl Default for EffectScope {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for EffectScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EffectScope").field("id", &self.id).finish()
    }
}

/// Register `f` to run when the active effect, watcher or scope re-runs or
/// is disposed.
///
/// Cleanups run in registration order, untracked.
pub fn try_on_cleanup(f: impl FnOnce() + 'static) -> Result<()> {
    Runtime::with(|rt| rt.on_cleanup(Box::new(f)))
}

/// Register a cleanup on the active owner.
///
/// # Panics
///
/// Panics when no effect, watcher or scope is active, including inside a
/// computed's getter.
pub fn on_cleanup(f: impl FnOnce() + 'static) {
    raise(try_on_cleanup(f))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ReactiveError;
    use crate::reactive::{node_count, Computed, Effect, Signal};
    use std::cell::RefCell;
    use std::rc::Rc;

    #[test]
    fn scope_disposes_what_it_created() {
        let source = Signal::new(0);
        let scope = EffectScope::new();
        let before = node_count();

        let (computed, effect) = scope.run(|| {
            let s = source.clone();
            let computed = Computed::new(move || s.get() + 1);
            let c = computed.clone();
            let effect = Effect::new(move || {
                c.get();
            });
            (computed, effect)
        });
        assert_eq!(node_count(), before + 2);

        scope.dispose();
        assert!(scope.is_disposed());
        assert!(computed.is_disposed());
        assert!(effect.is_disposed());
        assert_eq!(node_count(), before - 1);
    }

    #[test]
    fn nested_scopes_dispose_depth_first() {
        let order = Rc::new(RefCell::new(Vec::new()));
        let outer = EffectScope::new();

        let (order_outer, order_inner) = (order.clone(), order.clone());
        let inner = outer.run(|| {
            on_cleanup(move || order_outer.borrow_mut().push("outer"));
            let inner = EffectScope::new();
            inner.run(|| on_cleanup(move || order_inner.borrow_mut().push("inner")));
            inner
        });

        outer.dispose();
        assert!(inner.is_disposed());
        assert_eq!(*order.borrow(), vec!["inner", "outer"]);
    }

    #[test]
    fn detached_scope_survives_parent() {
        let outer = EffectScope::new();
        let detached = outer.run(EffectScope::detached);

        outer.dispose();
        assert!(!detached.is_disposed());
        detached.dispose();
    }

    #[test]
    fn disposed_scope_rejects_run() {
        let scope = EffectScope::new();
        scope.dispose();
        scope.dispose();
        assert_eq!(scope.try_run(|| ()), Err(ReactiveError::Disposed(scope.id())));
    }

    #[test]
    fn cleanup_outside_owner_is_an_error() {
        assert_eq!(try_on_cleanup(|| ()), Err(ReactiveError::CleanupOutsideOwner));

        let computed = Computed::new(|| try_on_cleanup(|| ()).is_err());
        assert!(computed.get());
    }

    #[test]
    #[should_panic(expected = "on_cleanup called outside")]
    fn on_cleanup_panics_outside_owner() {
        on_cleanup(|| ());
    }
}
