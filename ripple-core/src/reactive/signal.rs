//! Signal Implementation
//!
//! A Signal is the fundamental reactive primitive. It holds a value and
//! tracks which computations depend on it.
//!
//! # How Signals Work
//!
//! 1. When a signal is read within a reactive context (computed, effect or
//!    watcher), the reading node is linked as a subscriber.
//!
//! 2. When a signal is written, the new value is compared with the old one.
//!    Equal writes are dropped; otherwise the signal's version is bumped and
//!    its subscribers are marked.
//!
//! 3. Marked effects run once the outermost batch closes. Computeds wait
//!    until somebody reads them.
//!
//! # Memory Layout
//!
//! Each signal handle is one `Rc` pointing at:
//! - the graph node id
//! - the value, behind a `RefCell`
//! - the equality used to drop no-op writes
//!
//! Dropping the last handle disposes the node.

use std::cell::RefCell;
use std::fmt::{self, Debug};
use std::mem;
use std::rc::Rc;

use crate::error::{raise, ReactiveError, Result};
use crate::graph::{Node, NodeId, NodeKind};

use super::options::{Equality, SignalOptions};
use super::runtime::Runtime;

/// A reactive signal holding a value of type T.
///
/// # Example
///
/// ```rust
/// use ripple_core::Signal;
///
/// let count = Signal::new(0);
///
/// // Read the value
/// let value = count.get();
///
/// // Update the value (notifies subscribers)
/// count.set(5);
/// assert_eq!(count.get(), 5);
/// ```
pub struct Signal<T: 'static> {
    inner: Rc<SignalInner<T>>,
}

struct SignalInner<T> {
    id: NodeId,
    value: RefCell<T>,
    equality: Equality<T>,
}

impl<T> Drop for SignalInner<T> {
    fn drop(&mut self) {
        Runtime::try_with(|rt| rt.release(self.id));
    }
}

impl<T: PartialEq + 'static> Signal<T> {
    /// Create a new signal with the given initial value.
    pub fn new(value: T) -> Self {
        Self::with_options(value, SignalOptions::default())
    }
}

impl<T: 'static> Signal<T> {
    /// Create a new signal with explicit options.
    pub fn with_options(value: T, options: SignalOptions<T>) -> Self {
        let node = Node::new(NodeKind::Signal).named(options.name);
        // Signals are never owned: they outlive the effect that made them
        // for as long as a handle exists.
        let id = Runtime::with(|rt| rt.create(node, None));
        Self {
            inner: Rc::new(SignalInner {
                id,
                value: RefCell::new(value),
                equality: options.equality,
            }),
        }
    }

    /// Get the signal's graph id.
    pub fn id(&self) -> NodeId {
        self.inner.id
    }

    /// Borrow the current value, tracking the read.
    pub fn try_with<R>(&self, f: impl FnOnce(&T) -> R) -> Result<R> {
        Runtime::with(|rt| rt.track(self.inner.id))?;
        Ok(f(&self.inner.value.borrow()))
    }

    /// Borrow the current value, tracking the read.
    ///
    /// The value stays borrowed while `f` runs, so writes to this signal
    /// from inside `f` fail with [`ReactiveError::Borrowed`].
    ///
    /// # Panics
    ///
    /// Panics if the signal has been disposed.
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        raise(self.try_with(f))
    }

    /// Read the value without linking it to the active consumer.
    pub fn try_peek(&self) -> Result<T>
    where
        T: Clone,
    {
        Runtime::with(|rt| rt.ensure_alive(self.inner.id))?;
        Ok(self.inner.value.borrow().clone())
    }

    /// Read the value without linking it to the active consumer.
    pub fn peek(&self) -> T
    where
        T: Clone,
    {
        raise(self.try_peek())
    }

    /// Get the current value.
    ///
    /// If called within a reactive context, this also registers the
    /// current computation as a subscriber.
    pub fn try_get(&self) -> Result<T>
    where
        T: Clone,
    {
        self.try_with(T::clone)
    }

    /// Get the current value, panicking if the signal was disposed.
    pub fn get(&self) -> T
    where
        T: Clone,
    {
        raise(self.try_get())
    }

    /// Set a new value and notify subscribers.
    ///
    /// An equal value is dropped silently. Returns the first failure raised
    /// by the flush this write triggered, if any.
    pub fn try_set(&self, value: T) -> Result<()> {
        self.write(Some(value))
    }

    /// Set a new value, panicking on usage errors.
    pub fn set(&self, value: T) {
        raise(self.try_set(value))
    }

    /// Update the value using a function of the current one.
    pub fn try_update(&self, f: impl FnOnce(&T) -> T) -> Result<()> {
        let next = {
            Runtime::with(|rt| rt.ensure_alive(self.inner.id))?;
            let current = self.inner.value.borrow();
            f(&current)
        };
        self.try_set(next)
    }

    /// Update the value using a function of the current one.
    pub fn update(&self, f: impl FnOnce(&T) -> T) {
        raise(self.try_update(f))
    }

    /// Mutate the value in place and notify subscribers unconditionally.
    pub fn try_mutate(&self, f: impl FnOnce(&mut T)) -> Result<()> {
        let id = self.inner.id;
        Runtime::with(|rt| rt.ensure_alive(id))?;
        let mut value = self
            .inner
            .value
            .try_borrow_mut()
            .map_err(|_| ReactiveError::Borrowed(id))?;
        f(&mut value);
        drop(value);
        self.try_notify()
    }

    /// Mutate the value in place and notify subscribers unconditionally.
    pub fn mutate(&self, f: impl FnOnce(&mut T)) {
        raise(self.try_mutate(f))
    }

    /// Notify subscribers as if the value had changed.
    pub fn try_notify(&self) -> Result<()> {
        Runtime::with(|rt| {
            rt.ensure_alive(self.inner.id)?;
            rt.set_force_notify(self.inner.id);
            Ok::<_, ReactiveError>(())
        })?;
        self.write(None)
    }

    /// Notify subscribers as if the value had changed.
    pub fn notify(&self) {
        raise(self.try_notify())
    }

    /// Dispose the signal. Later reads and writes fail.
    pub fn dispose(&self) {
        raise(Runtime::with(|rt| rt.dispose_now(self.inner.id)))
    }

    /// Whether the signal has been disposed.
    pub fn is_disposed(&self) -> bool {
        Runtime::with(|rt| rt.is_disposed(self.inner.id))
    }

    /// Commit a write. `None` means the value was already changed in place.
    fn write(&self, value: Option<T>) -> Result<()> {
        let id = self.inner.id;
        Runtime::with(|rt| {
            rt.ensure_alive(id)?;
            let forced = rt.take_force_notify(id);

            if let Some(value) = value {
                let mut slot = self
                    .inner
                    .value
                    .try_borrow_mut()
                    .map_err(|_| ReactiveError::Borrowed(id))?;
                if !forced && self.inner.equality.is_equal(&slot, &value) {
                    return Ok(());
                }
                let old = mem::replace(&mut *slot, value);
                // Drop the old value after the borrow ends.
                drop(slot);
                drop(old);
            } else if !forced {
                return Ok(());
            }

            rt.propagate_write(id)
        })
    }
}

impl<T> Clone for Signal<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T: Debug> Debug for Signal<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut debug = f.debug_struct("Signal");
        debug.field("id", &self.inner.id);
        match self.inner.value.try_borrow() {
            Ok(value) => debug.field("value", &*value),
            Err(_) => debug.field("value", &"<borrowed>"),
        };
        debug.finish()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::Effect;
    use std::cell::Cell;

    #[test]
    fn signal_get_and_set() {
        let signal = Signal::new(0);
        assert_eq!(signal.get(), 0);

        signal.set(42);
        assert_eq!(signal.get(), 42);
    }

    #[test]
    fn signal_update() {
        let signal = Signal::new(10);
        signal.update(|v| v + 5);
        assert_eq!(signal.get(), 15);
    }

    #[test]
    fn signal_clone_shares_state() {
        let signal1 = Signal::new(0);
        let signal2 = signal1.clone();

        signal1.set(42);
        assert_eq!(signal2.get(), 42);

        signal2.set(100);
        assert_eq!(signal1.get(), 100);
    }

    #[test]
    fn equal_write_is_dropped() {
        let signal = Signal::new(7);
        let version = |s: &Signal<i32>| Runtime::with(|rt| rt.with_node(s.id(), |n| n.version()));

        let before = version(&signal);
        signal.set(7);
        assert_eq!(version(&signal), before);

        signal.set(8);
        assert_ne!(version(&signal), before);
    }

    #[test]
    fn mutate_always_notifies() {
        let signal = Signal::new(vec![1, 2]);
        let call_count = Rc::new(Cell::new(0));
        let call_count_clone = call_count.clone();
        let s = signal.clone();

        let effect = Effect::new(move || {
            s.with(|v| v.len());
            call_count_clone.set(call_count_clone.get() + 1);
        });
        assert_eq!(call_count.get(), 1);

        signal.mutate(|v| v.push(3));
        assert_eq!(call_count.get(), 2);
        assert_eq!(signal.peek(), vec![1, 2, 3]);

        // No change at all, but notify still re-runs dependents.
        signal.notify();
        assert_eq!(call_count.get(), 3);

        effect.dispose();
    }

    #[test]
    fn custom_equality_controls_notification() {
        let signal = Signal::with_options(
            1.0_f64,
            SignalOptions::with_equality(Equality::custom(|a: &f64, b: &f64| (a - b).abs() < 0.1)),
        );
        let call_count = Rc::new(Cell::new(0));
        let call_count_clone = call_count.clone();
        let s = signal.clone();
        let effect = Effect::new(move || {
            s.get();
            call_count_clone.set(call_count_clone.get() + 1);
        });

        signal.set(1.05);
        assert_eq!(call_count.get(), 1);
        // The dropped write keeps the old value.
        assert_eq!(signal.peek(), 1.0);

        signal.set(2.0);
        assert_eq!(call_count.get(), 2);

        effect.dispose();
    }

    #[test]
    fn disposed_signal_rejects_access() {
        let signal = Signal::new(1);
        signal.dispose();
        signal.dispose();

        assert!(signal.is_disposed());
        assert_eq!(signal.try_get(), Err(ReactiveError::Disposed(signal.id())));
        assert_eq!(signal.try_set(2), Err(ReactiveError::Disposed(signal.id())));
    }

    #[test]
    #[should_panic(expected = "has been disposed")]
    fn get_after_dispose_panics() {
        let signal = Signal::new(1);
        signal.dispose();
        signal.get();
    }

    #[test]
    fn dropping_last_handle_frees_node() {
        let before = crate::reactive::node_count();
        let signal = Signal::new(String::from("x"));
        let clone = signal.clone();
        assert_eq!(crate::reactive::node_count(), before + 1);

        drop(signal);
        assert_eq!(crate::reactive::node_count(), before + 1);
        drop(clone);
        assert_eq!(crate::reactive::node_count(), before);
    }

    #[test]
    fn debug_shows_value() {
        let signal = Signal::new(3);
        assert!(format!("{signal:?}").contains("value: 3"));
    }

    #[test]
    fn write_inside_with_reports_borrowed() {
        let signal = Signal::new(1);
        let id = signal.id();

        let (set, mutated) = signal.with(|_| (signal.try_set(2), signal.try_mutate(|v| *v = 3)));
        assert_eq!(set, Err(ReactiveError::Borrowed(id)));
        assert_eq!(mutated, Err(ReactiveError::Borrowed(id)));

        // Nothing was written, and the signal is still usable.
        assert_eq!(signal.get(), 1);
        signal.set(4);
        assert_eq!(signal.get(), 4);
    }
}
