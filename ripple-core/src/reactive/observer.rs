//! Graph observers.
//!
//! An observer receives lifecycle notifications for every node on the
//! current thread. This is the hook for devtools, loggers and test probes;
//! the runtime itself never depends on what observers do.
//!
//! Observers are called after the runtime has released its internal
//! borrows, so they may read handles (but should not write to them).

use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::graph::{NodeId, NodeKind};

use super::runtime::Runtime;

/// Unique identifier for a registered observer.
///
/// Returned by [`add_observer`] and used to remove the observer again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObserverId(u64);

impl ObserverId {
    /// Generate a new unique observer ID.
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

impl Default for ObserverId {
    fn default() -> Self {
        Self::new()
    }
}

/// Lifecycle callbacks for graph nodes. Every method defaults to a no-op.
#[cfg_attr(test, mockall::automock)]
pub trait Observer {
    /// A node was created.
    fn on_create(&self, _node: NodeId, _kind: NodeKind) {}

    /// A signal was written with a new value, or a computed produced one.
    fn on_update(&self, _node: NodeId) {}

    /// An effect or watcher was queued to run.
    fn on_notify(&self, _node: NodeId) {}

    /// A node was disposed and removed from the graph.
    fn on_dispose(&self, _node: NodeId) {}
}

/// Register an observer on this thread's runtime.
pub fn add_observer(observer: Rc<dyn Observer>) -> ObserverId {
    let id = ObserverId::new();
    Runtime::with(|rt| rt.add_observer(id, observer));
    id
}

/// Unregister an observer. Returns `false` if it was not registered.
pub fn remove_observer(id: ObserverId) -> bool {
    // Dropped outside the runtime so the observer's destructor may use it.
    let removed = Runtime::with(|rt| rt.remove_observer(id));
    removed.is_some()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::{Effect, Signal};

    #[test]
    fn observer_ids_are_unique() {
        let id1 = ObserverId::new();
        let id2 = ObserverId::new();

        assert_ne!(id1, id2);
    }

    #[test]
    fn observer_sees_node_lifecycle() {
        let mut mock = MockObserver::new();
        mock.expect_on_create().times(2).return_const(());
        mock.expect_on_update().times(1).return_const(());
        mock.expect_on_notify().times(1).return_const(());
        mock.expect_on_dispose().times(1).return_const(());

        let observer = add_observer(Rc::new(mock));

        let source = Signal::new(0);
        let s = source.clone();
        let effect = Effect::new(move || {
            s.get();
        });
        source.set(1);
        effect.dispose();

        // Expectations are verified when the mock is dropped here.
        assert!(remove_observer(observer));
        assert!(!remove_observer(observer));
    }

    #[test]
    fn equal_writes_are_not_reported() {
        let mut mock = MockObserver::new();
        mock.expect_on_update().never();
        mock.expect_on_notify().never();

        let source = Signal::new(3);
        let observer = add_observer(Rc::new(mock));
        source.set(3);
        assert!(remove_observer(observer));
    }
}
