//! Computed Implementation
//!
//! A Computed is a cached derived value that re-evaluates only when its
//! dependencies change.
//!
//! # How Computeds Work
//!
//! 1. Creating a computed does not run the getter. The first read does.
//!
//! 2. When accessed again, if no dependencies have changed, the cached value
//!    is returned.
//!
//! 3. When a direct dependency changes the computed is marked dirty; when
//!    something further upstream changes it is only marked pending.
//!
//! 4. On the next read, a pending computed re-checks its inputs in read
//!    order. If all of them settle on the values it saw last time, it is
//!    marked clean without running the getter.
//!
//! 5. A recompute that produces an equal value keeps the old version, so
//!    readers further down stay clean as well.
//!
//! # Failure
//!
//! A getter that panics leaves no value behind: the computed stays dirty
//! and the next read tries again.

use std::cell::{Ref, RefCell};
use std::fmt::{self, Debug};
use std::rc::{Rc, Weak};

use crate::error::{raise, ReactiveError, Result};
use crate::graph::{Node, NodeId, NodeKind, Reaction, ReactionRef, RunKind};

use super::context::ReactiveContext;
use super::options::{ComputedOptions, Equality};
use super::runtime::{BatchGuard, Runtime};

/// A lazily evaluated, cached derived value.
///
/// # Example
///
/// ```rust
/// use ripple_core::{Computed, Signal};
///
/// let width = Signal::new(3);
/// let height = Signal::new(4);
///
/// let (w, h) = (width.clone(), height.clone());
/// let area = Computed::new(move || w.get() * h.get());
///
/// assert_eq!(area.get(), 12);
/// width.set(5);
/// assert_eq!(area.get(), 20);
/// ```
pub struct Computed<T: 'static> {
    inner: Rc<ComputedInner<T>>,
}

struct ComputedInner<T> {
    id: NodeId,
    getter: Box<dyn Fn() -> T>,
    value: RefCell<Option<T>>,
    equality: Equality<T>,
}

impl<T: 'static> Reaction for ComputedInner<T> {
    fn execute(&self, _kind: RunKind) -> bool {
        let next = (self.getter)();

        let mut slot = self.value.borrow_mut();
        let changed = match slot.as_ref() {
            Some(previous) => !self.equality.is_equal(previous, &next),
            None => true,
        };
        // An equal result keeps the cached instance.
        let replaced = if changed { slot.replace(next) } else { Some(next) };
        drop(slot);
        drop(replaced);

        changed
    }
}

impl<T> Drop for ComputedInner<T> {
    fn drop(&mut self) {
        Runtime::try_with(|rt| rt.release(self.id));
    }
}

impl<T: PartialEq + 'static> Computed<T> {
    /// Create a new computed from a getter.
    ///
    /// The getter does not run until the first read.
    pub fn new(getter: impl Fn() -> T + 'static) -> Self {
        Self::with_options(getter, ComputedOptions::default())
    }
}

impl<T: 'static> Computed<T> {
    /// Create a new computed with explicit options.
    pub fn with_options(getter: impl Fn() -> T + 'static, options: ComputedOptions<T>) -> Self {
        let ComputedOptions {
            name,
            equality,
            auto_dispose,
        } = options;

        let inner = Rc::new_cyclic(|weak: &Weak<ComputedInner<T>>| {
            let reaction: Weak<dyn Reaction> = weak.clone();
            let node = Node::new(NodeKind::Computed)
                .named(name)
                .with_reaction(ReactionRef::Weak(reaction))
                .with_auto_dispose(auto_dispose);
            let id = Runtime::with(|rt| rt.create(node, ReactiveContext::current_owner()));

            ComputedInner {
                id,
                getter: Box::new(getter),
                value: RefCell::new(None),
                equality,
            }
        });

        Self { inner }
    }

    /// Get the computed's graph id.
    pub fn id(&self) -> NodeId {
        self.inner.id
    }

    /// Bring the value up to date, optionally linking it to the active
    /// consumer, and borrow it.
    fn read(&self, track: bool) -> Result<Ref<'_, T>> {
        let id = self.inner.id;
        Runtime::with(|rt| {
            let batch = BatchGuard::open();
            let mut result = rt.refresh(id);
            if track && result.is_ok() {
                result = rt.track(id);
            }
            let closed = batch.close();
            result.and(closed)
        })?;

        Ref::filter_map(self.inner.value.borrow(), Option::as_ref)
            .map_err(|_| ReactiveError::Disposed(id))
    }

    /// Borrow the current value, tracking the read.
    pub fn try_with<R>(&self, f: impl FnOnce(&T) -> R) -> Result<R> {
        let value = self.read(true)?;
        Ok(f(&value))
    }

    /// Borrow the current value, tracking the read.
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        raise(self.try_with(f))
    }

    /// Get the current value, recomputing if needed, and link it to the
    /// active consumer.
    ///
    /// Fails with [`ReactiveError::Cycle`] when called from inside its own
    /// getter, and with [`ReactiveError::Disposed`] after disposal.
    pub fn try_get(&self) -> Result<T>
    where
        T: Clone,
    {
        self.read(true).map(|value| value.clone())
    }

    /// Get the current value, panicking on usage errors.
    pub fn get(&self) -> T
    where
        T: Clone,
    {
        raise(self.try_get())
    }

    /// Get the current value without linking it to the active consumer.
    pub fn try_peek(&self) -> Result<T>
    where
        T: Clone,
    {
        self.read(false).map(|value| value.clone())
    }

    /// Get the current value without linking it to the active consumer.
    pub fn peek(&self) -> T
    where
        T: Clone,
    {
        raise(self.try_peek())
    }

    /// Dispose the computed. Later reads fail.
    pub fn dispose(&self) {
        raise(Runtime::with(|rt| rt.dispose_now(self.inner.id)))
    }

    /// Whether the computed has been disposed.
    pub fn is_disposed(&self) -> bool {
        Runtime::with(|rt| rt.is_disposed(self.inner.id))
    }
}

impl<T> Clone for Computed<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T: Debug> Debug for Computed<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let flags = Runtime::try_with(|rt| rt.flags(self.inner.id)).flatten();
        let mut debug = f.debug_struct("Computed");
        debug.field("id", &self.inner.id).field("flags", &flags);
        match self.inner.value.try_borrow() {
            Ok(value) => debug.field("value", &*value),
            Err(_) => debug.field("value", &"<borrowed>"),
        };
        debug.finish()
    }
}

/// A computed with a setter.
///
/// Reads behave like [`Computed`]. Writes call the setter inside a batch,
/// so whatever signals it touches notify their dependents once.
///
/// # Example
///
/// ```rust
/// use ripple_core::{Signal, WritableComputed};
///
/// let celsius = Signal::new(100.0);
/// let (get_c, set_c) = (celsius.clone(), celsius.clone());
/// let fahrenheit = WritableComputed::new(
///     move || get_c.get() * 9.0 / 5.0 + 32.0,
///     move |f: f64| set_c.set((f - 32.0) * 5.0 / 9.0),
/// );
///
/// assert_eq!(fahrenheit.get(), 212.0);
/// fahrenheit.set(32.0);
/// assert_eq!(celsius.get(), 0.0);
/// ```
pub struct WritableComputed<T: 'static> {
    computed: Computed<T>,
    setter: Rc<dyn Fn(T)>,
}

impl<T: PartialEq + 'static> WritableComputed<T> {
    pub fn new(getter: impl Fn() -> T + 'static, setter: impl Fn(T) + 'static) -> Self {
        Self::with_options(getter, setter, ComputedOptions::default())
    }
}

impl<T: 'static> WritableComputed<T> {
    pub fn with_options(
        getter: impl Fn() -> T + 'static,
        setter: impl Fn(T) + 'static,
        options: ComputedOptions<T>,
    ) -> Self {
        Self {
            computed: Computed::with_options(getter, options),
            setter: Rc::new(setter),
        }
    }

    /// The read side.
    pub fn as_computed(&self) -> &Computed<T> {
        &self.computed
    }

    pub fn try_get(&self) -> Result<T>
    where
        T: Clone,
    {
        self.computed.try_get()
    }

    pub fn get(&self) -> T
    where
        T: Clone,
    {
        self.computed.get()
    }

    pub fn peek(&self) -> T
    where
        T: Clone,
    {
        self.computed.peek()
    }

    /// Run the setter inside a batch.
    pub fn try_set(&self, value: T) -> Result<()> {
        Runtime::with(|rt| rt.ensure_alive(self.computed.id()))?;
        let batch = BatchGuard::open();
        (self.setter)(value);
        batch.close()
    }

    pub fn set(&self, value: T) {
        raise(self.try_set(value))
    }

    pub fn dispose(&self) {
        self.computed.dispose();
    }

    pub fn is_disposed(&self) -> bool {
        self.computed.is_disposed()
    }
}

impl<T> Clone for WritableComputed<T> {
    fn clone(&self) -> Self {
        Self {
            computed: self.computed.clone(),
            setter: Rc::clone(&self.setter),
        }
    }
}

impl<T: Debug> Debug for WritableComputed<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("WritableComputed").field(&self.computed).finish()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::{node_count, Signal};
    use std::cell::Cell;

    fn counter() -> (Rc<Cell<usize>>, Rc<Cell<usize>>) {
        let call_count = Rc::new(Cell::new(0));
        let call_count_clone = call_count.clone();
        (call_count, call_count_clone)
    }

    #[test]
    fn computed_is_lazy() {
        let (call_count, call_count_clone) = counter();
        let source = Signal::new(1);
        let s = source.clone();

        let doubled = Computed::new(move || {
            call_count_clone.set(call_count_clone.get() + 1);
            s.get() * 2
        });
        assert_eq!(call_count.get(), 0);

        source.set(2);
        assert_eq!(call_count.get(), 0);

        assert_eq!(doubled.get(), 4);
        assert_eq!(call_count.get(), 1);
    }

    #[test]
    fn computed_caches_value_when_clean() {
        let (call_count, call_count_clone) = counter();
        let computed = Computed::new(move || {
            call_count_clone.set(call_count_clone.get() + 1);
            42
        });

        assert_eq!(computed.get(), 42);
        assert_eq!(computed.get(), 42);
        assert_eq!(computed.peek(), 42);
        assert_eq!(call_count.get(), 1);
    }

    #[test]
    fn equal_recompute_keeps_downstream_clean() {
        let source = Signal::new(3);
        let s = source.clone();
        let clamped = Computed::new(move || s.get().min(10));

        let (call_count, call_count_clone) = counter();
        let c = clamped.clone();
        let label = Computed::new(move || {
            call_count_clone.set(call_count_clone.get() + 1);
            format!("value {}", c.get())
        });

        source.set(20);
        assert_eq!(label.get(), "value 10");
        source.set(30);
        assert_eq!(label.get(), "value 10");
        assert_eq!(call_count.get(), 1);
    }

    #[test]
    fn self_read_reports_cycle() {
        let slot: Rc<RefCell<Option<Computed<i32>>>> = Rc::new(RefCell::new(None));
        let slot_clone = slot.clone();
        let computed = Computed::new(move || {
            let me = slot_clone.borrow().clone();
            match me.map(|c| c.try_get()) {
                Some(Err(ReactiveError::Cycle(_))) => -1,
                _ => 0,
            }
        });
        *slot.borrow_mut() = Some(computed.clone());

        assert_eq!(computed.get(), -1);
        slot.borrow_mut().take();
    }

    #[test]
    fn getter_panic_leaves_computed_dirty() {
        let fail = Signal::new(true);
        let f = fail.clone();
        let computed = Computed::new(move || {
            if f.get() {
                panic!("getter failed");
            }
            7
        });

        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| computed.get()));
        assert!(result.is_err());

        fail.set(false);
        assert_eq!(computed.get(), 7);
    }

    #[test]
    fn disposed_computed_rejects_reads() {
        let computed = Computed::new(|| 1);
        assert_eq!(computed.get(), 1);

        computed.dispose();
        assert!(computed.is_disposed());
        assert_eq!(computed.try_get(), Err(ReactiveError::Disposed(computed.id())));
    }

    #[test]
    fn dropping_last_handle_unlinks_dependencies() {
        let source = Signal::new(1);
        let s = source.clone();
        let computed = Computed::new(move || s.get());
        computed.get();

        let nodes = node_count();
        assert_eq!(crate::reactive::link_count(), 1);
        drop(computed);

        assert_eq!(node_count(), nodes - 1);
        assert_eq!(crate::reactive::link_count(), 0);
    }

    #[test]
    fn writable_computed_sets_through_batch() {
        let first = Signal::new(String::from("Ada"));
        let last = Signal::new(String::from("Lovelace"));

        let (f, l) = (first.clone(), last.clone());
        let (fs, ls) = (first.clone(), last.clone());
        let full = WritableComputed::new(
            move || format!("{} {}", f.get(), l.get()),
            move |name: String| {
                let (a, b) = name.split_once(' ').unwrap_or((name.as_str(), ""));
                fs.set(a.to_string());
                ls.set(b.to_string());
            },
        );

        let (call_count, call_count_clone) = counter();
        let full_clone = full.clone();
        let effect = crate::reactive::Effect::new(move || {
            full_clone.get();
            call_count_clone.set(call_count_clone.get() + 1);
        });

        full.set(String::from("Grace Hopper"));
        assert_eq!(full.get(), "Grace Hopper");
        // Both writes landed in one batch.
        assert_eq!(call_count.get(), 2);

        effect.dispose();
    }
}
