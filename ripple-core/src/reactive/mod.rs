//! Reactive Primitives
//!
//! This module implements the reactive system: signals, computeds, effects,
//! watchers and scopes. These primitives form the foundation of Ripple's
//! fine-grained reactivity.
//!
//! # Concepts
//!
//! ## Signals
//!
//! A Signal is a container for mutable state. When a signal's value is read
//! within a tracking context (a computed, effect or watcher), the signal is
//! linked as a dependency of that context. When the signal's value changes,
//! every dependent is marked.
//!
//! ## Computeds
//!
//! A Computed is a derived value that caches its result. It re-evaluates
//! only when read after one of its dependencies actually changed, so an
//! unchanged intermediate value stops a change from travelling further.
//!
//! ## Effects and Watchers
//!
//! An Effect is a side-effecting computation that runs whenever its
//! dependencies change. A Watcher separates the tracked read from an
//! untracked callback and only calls back when the read value changed.
//!
//! ## Scopes
//!
//! Effects, watchers and scopes own what is created while they run.
//! Disposing an owner disposes everything it owns.
//!
//! # Implementation Notes
//!
//! The reactive system uses a thread-local tracking context to detect
//! dependencies automatically. When a signal is read, we check whether
//! there is an active consumer and, if so, link the two.
//!
//! Writes are pushed eagerly as dirty/pending marks; values are pulled
//! lazily. Effects run in batches, once per batch, after the graph has
//! been marked.

mod async_state;
mod batch;
mod computed;
mod context;
mod effect;
mod observer;
mod options;
mod runtime;
mod scope;
mod signal;
mod watcher;

pub use async_state::AsyncState;
pub use batch::{batch, try_batch};
pub use computed::{Computed, WritableComputed};
pub use context::{untracked, ReactiveContext};
pub use effect::Effect;
pub use observer::{add_observer, remove_observer, Observer, ObserverId};
pub use options::{ComputedOptions, Equality, SignalOptions, WatchOptions};
pub use runtime::{
    configure, link_count, node_count, runtime_config, start_batch, BatchGuard, RuntimeConfig,
};
pub use scope::{on_cleanup, try_on_cleanup, EffectScope};
pub use signal::Signal;
pub use watcher::Watcher;
