//! Effect Implementation
//!
//! An Effect is a side-effecting computation that runs whenever its
//! dependencies change.
//!
//! # How Effects Work
//!
//! 1. When created, the effect runs its function immediately to establish
//!    initial dependencies.
//!
//! 2. When any dependency changes, the effect is queued. It runs when the
//!    outermost batch closes, once per batch no matter how many of its
//!    dependencies changed.
//!
//! 3. Before re-running, the effect runs its cleanups and disposes the
//!    nodes it created last time. The new run re-tracks its dependencies
//!    from scratch, reusing edges that are read again in the same order.
//!
//! # Differences from Computed
//!
//! - Computeds return a value; effects do not.
//! - Computeds are lazy (compute on access); effects are eager (run when
//!   deps change).
//! - Effects own what they create: computeds, effects and scopes created
//!   inside the body are disposed on the next run.
//!
//! # Cleanup
//!
//! Call [`on_cleanup`](super::on_cleanup) inside the body to register a
//! function that runs before the effect re-runs and when it is disposed.
//!
//! # Lifetime
//!
//! The graph keeps an effect alive. Dropping the handle does nothing;
//! call [`Effect::dispose`] or dispose an enclosing scope.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use crate::error::{raise, Result};
use crate::graph::{Node, NodeId, NodeKind, Reaction, ReactionRef, RunKind};

use super::context::ReactiveContext;
use super::runtime::Runtime;

/// A side-effecting computation that runs when dependencies change.
///
/// # Example
///
/// ```rust
/// use ripple_core::{Effect, Signal};
/// use std::cell::Cell;
/// use std::rc::Rc;
///
/// let count = Signal::new(0);
/// let seen = Rc::new(Cell::new(0));
///
/// let (c, s) = (count.clone(), seen.clone());
/// let effect = Effect::new(move || s.set(c.get()));
///
/// count.set(5);
/// assert_eq!(seen.get(), 5);
/// effect.dispose();
/// ```
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Effect {
    id: NodeId,
}

struct EffectInner {
    body: RefCell<Box<dyn FnMut()>>,
}

impl Reaction for EffectInner {
    fn execute(&self, _kind: RunKind) -> bool {
        let mut body = self.body.borrow_mut();
        (*body)();
        true
    }
}

impl Effect {
    /// Create an effect and run it immediately.
    ///
    /// # Panics
    ///
    /// Panics with whatever the body panics with on its first run, and on
    /// a reentrant write during that run. The effect is disposed before the
    /// panic leaves this call.
    pub fn new(body: impl FnMut() + 'static) -> Self {
        let effect = Self::new_lazy(body);
        raise(effect.try_run());
        effect
    }

    /// Create an effect without running it.
    ///
    /// It tracks nothing until [`Effect::run`] is called.
    pub fn new_lazy(body: impl FnMut() + 'static) -> Self {
        let inner: Rc<dyn Reaction> = Rc::new(EffectInner {
            body: RefCell::new(Box::new(body)),
        });
        let node = Node::new(NodeKind::Effect).with_reaction(ReactionRef::Strong(inner));
        let id = Runtime::with(|rt| rt.create(node, ReactiveContext::current_owner()));
        Self { id }
    }

    /// Get the effect's graph id.
    pub fn id(&self) -> NodeId {
        self.id
    }

    /// Run the effect now: cleanups, then the body, re-tracking its
    /// dependencies.
    ///
    /// If the body panics before the effect ever completed a run, the
    /// effect is disposed.
    pub fn try_run(&self) -> Result<()> {
        Runtime::with(|rt| rt.run_sink(self.id, RunKind::Full))
    }

    /// Run the effect now, panicking on usage errors.
    pub fn run(&self) {
        raise(self.try_run())
    }

    /// Dispose the effect: run its cleanups, dispose what it owns, and
    /// unlink it. Idempotent. An effect disposed from inside its own body
    /// finishes the current run first.
    pub fn dispose(&self) {
        raise(Runtime::with(|rt| rt.dispose_now(self.id)))
    }

    /// Whether the effect has been disposed.
    pub fn is_disposed(&self) -> bool {
        Runtime::with(|rt| rt.is_disposed(self.id))
    }

    /// Number of nodes the last run read.
    pub fn dependency_count(&self) -> usize {
        Runtime::with(|rt| rt.with_node(self.id, |node| node.dependency_count())).unwrap_or(0)
    }
}

impl fmt::Debug for Effect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let flags = Runtime::try_with(|rt| rt.flags(self.id)).flatten();
        f.debug_struct("Effect")
            .field("id", &self.id)
            .field("flags", &flags)
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ReactiveError;
    use crate::reactive::{batch, on_cleanup, Computed, Signal};
    use std::cell::Cell;

    #[test]
    fn effect_runs_on_creation() {
        let call_count = Rc::new(Cell::new(0));
        let call_count_clone = call_count.clone();

        let effect = Effect::new(move || {
            call_count_clone.set(call_count_clone.get() + 1);
        });

        assert_eq!(call_count.get(), 1);
        effect.dispose();
    }

    #[test]
    fn effect_lazy_does_not_run_on_creation() {
        let call_count = Rc::new(Cell::new(0));
        let call_count_clone = call_count.clone();

        let effect = Effect::new_lazy(move || {
            call_count_clone.set(call_count_clone.get() + 1);
        });
        assert_eq!(call_count.get(), 0);

        effect.run();
        assert_eq!(call_count.get(), 1);
        effect.dispose();
    }

    #[test]
    fn effect_reruns_once_per_batch() {
        let a = Signal::new(1);
        let b = Signal::new(2);
        let sum = Rc::new(Cell::new(0));
        let call_count = Rc::new(Cell::new(0));

        let (a2, b2, sum2, call_count_clone) = (a.clone(), b.clone(), sum.clone(), call_count.clone());
        let effect = Effect::new(move || {
            sum2.set(a2.get() + b2.get());
            call_count_clone.set(call_count_clone.get() + 1);
        });

        batch(|| {
            a.set(10);
            b.set(20);
        });

        assert_eq!(sum.get(), 30);
        assert_eq!(call_count.get(), 2);
        effect.dispose();
    }

    #[test]
    fn effect_does_not_run_after_disposal() {
        let source = Signal::new(0);
        let call_count = Rc::new(Cell::new(0));
        let call_count_clone = call_count.clone();
        let s = source.clone();

        let effect = Effect::new(move || {
            s.get();
            call_count_clone.set(call_count_clone.get() + 1);
        });

        effect.dispose();
        effect.dispose();
        assert!(effect.is_disposed());

        source.set(1);
        assert_eq!(call_count.get(), 1);
        assert_eq!(effect.try_run(), Err(ReactiveError::Disposed(effect.id())));
    }

    #[test]
    fn cleanups_run_before_rerun_and_on_dispose() {
        let source = Signal::new(0);
        let log = Rc::new(RefCell::new(Vec::new()));

        let (s, log_clone) = (source.clone(), log.clone());
        let effect = Effect::new(move || {
            let value = s.get();
            log_clone.borrow_mut().push(format!("run {value}"));
            let log_inner = log_clone.clone();
            on_cleanup(move || log_inner.borrow_mut().push(format!("cleanup {value}")));
        });

        source.set(1);
        effect.dispose();

        assert_eq!(
            *log.borrow(),
            vec!["run 0", "cleanup 0", "run 1", "cleanup 1"]
        );
    }

    #[test]
    fn rerun_disposes_owned_children() {
        let source = Signal::new(0);
        let children = Rc::new(RefCell::new(Vec::new()));

        let (s, children_clone) = (source.clone(), children.clone());
        let effect = Effect::new(move || {
            s.get();
            let child = Computed::new(|| 1);
            children_clone.borrow_mut().push(child);
        });

        source.set(1);
        let children = children.borrow();
        assert!(children[0].is_disposed());
        assert!(!children[1].is_disposed());

        drop(children);
        effect.dispose();
    }

    #[test]
    fn dynamic_dependencies_are_pruned() {
        let use_a = Signal::new(true);
        let a = Signal::new(1);
        let b = Signal::new(2);
        let call_count = Rc::new(Cell::new(0));

        let (flag, a2, b2, call_count_clone) = (use_a.clone(), a.clone(), b.clone(), call_count.clone());
        let effect = Effect::new(move || {
            if flag.get() {
                a2.get();
            } else {
                b2.get();
            }
            call_count_clone.set(call_count_clone.get() + 1);
        });
        assert_eq!(effect.dependency_count(), 2);

        use_a.set(false);
        assert_eq!(call_count.get(), 2);

        // `a` is no longer read.
        a.set(5);
        assert_eq!(call_count.get(), 2);

        b.set(5);
        assert_eq!(call_count.get(), 3);
        effect.dispose();
    }

    #[test]
    fn self_disposal_finishes_current_run() {
        let source = Signal::new(0);
        let slot: Rc<Cell<Option<Effect>>> = Rc::new(Cell::new(None));
        let call_count = Rc::new(Cell::new(0));

        let (s, slot_clone, call_count_clone) = (source.clone(), slot.clone(), call_count.clone());
        let effect = Effect::new(move || {
            let value = s.get();
            call_count_clone.set(call_count_clone.get() + 1);
            if value == 1 {
                if let Some(me) = slot_clone.get() {
                    me.dispose();
                }
            }
        });
        slot.set(Some(effect));

        source.set(1);
        assert!(effect.is_disposed());
        source.set(2);
        assert_eq!(call_count.get(), 2);
    }
}
