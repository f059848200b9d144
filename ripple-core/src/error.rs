//! Error types for the reactive runtime.
//!
//! Only contract violations are errors. Panics raised by user getters and
//! effect bodies are not converted; they unwind to whichever call triggered
//! the body, with the graph left in a retryable state.

use thiserror::Error;

use crate::graph::NodeId;

/// Usage errors reported by the runtime.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReactiveError {
    /// The node was disposed (explicitly, by its owner, or by auto-dispose).
    #[error("reactive node {0:?} has been disposed")]
    Disposed(NodeId),

    /// `on_cleanup` was called with no effect, watcher or scope active.
    #[error("on_cleanup called outside of an effect, watcher or scope")]
    CleanupOutsideOwner,

    /// A computed read itself while its getter was running.
    #[error("cycle detected: computed {0:?} was read while recomputing")]
    Cycle(NodeId),

    /// An effect was re-triggered before its first run finished.
    #[error("reentrant update: effect {0:?} was triggered during its own first run")]
    Reentrant(NodeId),

    /// A signal was written while its value was borrowed by `with`.
    #[error("signal {0:?} was written while its value is borrowed")]
    Borrowed(NodeId),

    /// Effects kept re-triggering each other.
    #[error("effects did not settle after {passes} flush passes")]
    FlushLimit { passes: usize },
}

/// Result alias used throughout the crate.
pub type Result<T, E = ReactiveError> = std::result::Result<T, E>;

/// Unwrap a runtime result on the panicking API surface.
#[track_caller]
pub(crate) fn raise<T>(result: Result<T>) -> T {
    match result {
        Ok(value) => value,
        Err(err) => {
            tracing::warn!(target: "ripple", error = %err, "reactive usage error");
            panic!("{err}")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_mention_the_violation() {
        assert!(ReactiveError::CleanupOutsideOwner
            .to_string()
            .contains("outside"));
        assert!(ReactiveError::FlushLimit { passes: 3 }
            .to_string()
            .contains("3 flush passes"));
    }

    #[test]
    fn raise_passes_values_through() {
        assert_eq!(raise(Ok(5)), 5);
    }

    #[test]
    #[should_panic(expected = "on_cleanup called outside")]
    fn raise_panics_with_message() {
        raise::<()>(Err(ReactiveError::CleanupOutsideOwner));
    }
}
