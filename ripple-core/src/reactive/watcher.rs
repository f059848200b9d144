//! Watchers.
//!
//! A watcher splits an effect in two: a tracked *sources* function that
//! produces a value, and an untracked callback that receives the new and
//! previous values. The callback only fires when the sources changed (or a
//! custom predicate accepts the change).
//!
//! Watchers can be paused. A paused watcher is unlinked from everything it
//! read, so writes upstream cost nothing; resuming re-reads the sources and
//! relinks.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use crate::error::{raise, ReactiveError, Result};
use crate::graph::{Flags, Node, NodeId, NodeKind, Reaction, ReactionRef, RunKind};

use super::context::{untracked, ReactiveContext};
use super::options::WatchOptions;
use super::runtime::{BatchGuard, Runtime};

type Callback<S> = Box<dyn FnMut(&S, Option<&S>)>;
type Predicate<S> = Rc<dyn Fn(&S, &S) -> bool>;

/// A sink that calls back with `(new, previous)` when its sources change.
///
/// # Example
///
/// ```rust
/// use ripple_core::{Signal, Watcher};
/// use std::cell::RefCell;
/// use std::rc::Rc;
///
/// let count = Signal::new(1);
/// let seen = Rc::new(RefCell::new(Vec::new()));
///
/// let (c, s) = (count.clone(), seen.clone());
/// let watcher = Watcher::new(
///     move || c.get(),
///     move |new: &i32, old: Option<&i32>| s.borrow_mut().push((*new, old.copied())),
/// );
///
/// count.set(2);
/// count.set(2);
/// assert_eq!(*seen.borrow(), vec![(2, Some(1))]);
/// watcher.dispose();
/// ```
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Watcher {
    id: NodeId,
}

struct WatcherInner<S> {
    sources: Box<dyn Fn() -> S>,
    callback: RefCell<Callback<S>>,
    predicate: Predicate<S>,
    previous: RefCell<Option<S>>,
    immediate: bool,
}

impl<S: Clone + 'static> Reaction for WatcherInner<S> {
    fn execute(&self, kind: RunKind) -> bool {
        let next = (self.sources)();
        let previous = self.previous.replace(Some(next.clone()));

        let fire = match (kind, previous.as_ref()) {
            (RunKind::Retrack, _) => false,
            (RunKind::Full, Some(old)) => (self.predicate)(&next, old),
            (RunKind::Full, None) => self.immediate,
        };

        if fire {
            untracked(|| {
                let mut callback = self.callback.borrow_mut();
                (*callback)(&next, previous.as_ref());
            });
        }
        true
    }
}

impl Watcher {
    /// Watch `sources`, calling `callback` whenever the value they produce
    /// changes under `PartialEq`.
    pub fn new<S>(
        sources: impl Fn() -> S + 'static,
        callback: impl FnMut(&S, Option<&S>) + 'static,
    ) -> Self
    where
        S: PartialEq + Clone + 'static,
    {
        Self::with_options(sources, callback, WatchOptions::default())
    }

    /// Watch with explicit options.
    ///
    /// The sources are read immediately to establish dependencies. With
    /// `immediate` set, the callback also fires once right away with no
    /// previous value.
    pub fn with_options<S>(
        sources: impl Fn() -> S + 'static,
        callback: impl FnMut(&S, Option<&S>) + 'static,
        options: WatchOptions<S>,
    ) -> Self
    where
        S: PartialEq + Clone + 'static,
    {
        let WatchOptions {
            immediate,
            predicate,
            name,
        } = options;
        let predicate: Predicate<S> = match predicate {
            Some(predicate) => predicate,
            None => Rc::new(|new: &S, old: &S| new != old),
        };

        let inner: Rc<dyn Reaction> = Rc::new(WatcherInner {
            sources: Box::new(sources),
            callback: RefCell::new(Box::new(callback)),
            predicate,
            previous: RefCell::new(None),
            immediate,
        });
        let node = Node::new(NodeKind::Watcher)
            .named(name)
            .with_reaction(ReactionRef::Strong(inner));

        let watcher = Self {
            id: Runtime::with(|rt| rt.create(node, ReactiveContext::current_owner())),
        };
        raise(Runtime::with(|rt| rt.run_sink(watcher.id, RunKind::Full)));
        watcher
    }

    /// Get the watcher's graph id.
    pub fn id(&self) -> NodeId {
        self.id
    }

    /// Stop reacting. The watcher is unlinked from its sources until
    /// [`Watcher::resume`].
    pub fn try_pause(&self) -> Result<()> {
        Runtime::with(|rt| rt.pause(self.id))
    }

    pub fn pause(&self) {
        raise(self.try_pause())
    }

    /// Start reacting again.
    ///
    /// The sources are re-read to relink. With `try_run`, the callback
    /// fires if the value differs from the one seen before pausing;
    /// otherwise the new value is only remembered.
    pub fn try_resume(&self, try_run: bool) -> Result<()> {
        let kind = if try_run { RunKind::Full } else { RunKind::Retrack };
        Runtime::with(|rt| rt.resume(self.id, kind))
    }

    pub fn resume(&self, try_run: bool) {
        raise(self.try_resume(try_run))
    }

    /// Whether the watcher is paused.
    pub fn is_paused(&self) -> bool {
        Runtime::with(|rt| rt.flags(self.id)).is_some_and(|flags| flags.contains(Flags::PAUSED))
    }

    /// Run `f` without triggering this watcher for the writes it makes.
    ///
    /// The watcher still relinks and remembers the new source value, so the
    /// next unrelated change compares against it. A change that was already
    /// pending before `f` ran still fires.
    pub fn try_ignore_updates<R>(&self, f: impl FnOnce() -> R) -> Result<R> {
        let id = self.id;
        let was_stale = Runtime::with(|rt| {
            rt.ensure_alive(id)?;
            Ok::<_, ReactiveError>(rt.flags(id).is_some_and(Flags::is_stale))
        })?;

        let batch = BatchGuard::open();
        let result = f();
        let now_stale = Runtime::with(|rt| rt.flags(id)).is_some_and(Flags::is_stale);
        if !was_stale && now_stale {
            tracing::trace!(target: "ripple", node = ?id, "ignoring watcher updates");
            Runtime::with(|rt| rt.run_sink(id, RunKind::Retrack))?;
        }
        batch.close()?;
        Ok(result)
    }

    pub fn ignore_updates<R>(&self, f: impl FnOnce() -> R) -> R {
        raise(self.try_ignore_updates(f))
    }

    /// Dispose the watcher, running its cleanups. Idempotent.
    pub fn dispose(&self) {
        raise(Runtime::with(|rt| rt.dispose_now(self.id)))
    }

    /// Whether the watcher has been disposed.
    pub fn is_disposed(&self) -> bool {
        Runtime::with(|rt| rt.is_disposed(self.id))
    }
}

impl fmt::Debug for Watcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let flags = Runtime::try_with(|rt| rt.flags(self.id)).flatten();
        f.debug_struct("Watcher")
            .field("id", &self.id)
            .field("flags", &flags)
            .finish()
    }
}
