//! Ripple Core
//!
//! This crate provides the runtime for Ripple, a fine-grained reactive
//! dependency graph. It implements:
//!
//! - Reactive primitives (signals, computeds, effects, watchers)
//! - Push-pull propagation with glitch-free, at-most-once effect runs
//! - Batching, ownership scopes and cleanup
//!
//! # Architecture
//!
//! The crate is organized into two modules:
//!
//! - `graph`: the untyped dependency graph: nodes, edges, state flags and
//!   the batch queue
//! - `reactive`: typed handles over the graph and the thread-local runtime
//!   that drives them
//!
//! # Example
//!
//! ```rust
//! use ripple_core::{Computed, Effect, Signal};
//! use std::cell::RefCell;
//! use std::rc::Rc;
//!
//! // Create a signal
//! let count = Signal::new(0);
//!
//! // Create a derived value
//! let c = count.clone();
//! let doubled = Computed::new(move || c.get() * 2);
//!
//! // Create an effect
//! let log = Rc::new(RefCell::new(Vec::new()));
//! let (c, d, l) = (count.clone(), doubled.clone(), log.clone());
//! let effect = Effect::new(move || {
//!     l.borrow_mut().push(format!("Count: {}, Doubled: {}", c.get(), d.get()));
//! });
//!
//! // Update the signal
//! count.set(5);
//! assert_eq!(log.borrow().last().unwrap(), "Count: 5, Doubled: 10");
//! effect.dispose();
//! ```
//!
//! # Errors
//!
//! Every fallible operation has a `try_` form returning
//! [`Result`]. The plain form panics with the same message, in the way
//! `RefCell::borrow` relates to `RefCell::try_borrow`.
//!
//! # Logging
//!
//! The runtime emits `tracing` events under the `ripple` target: node
//! lifecycle and recomputes at `trace`, flush summaries and auto-disposal at
//! `debug`, usage errors at `warn`, and failed effects at `error`.

pub mod graph;
pub mod reactive;

mod error;

pub use error::{ReactiveError, Result};
pub use graph::{NodeId, NodeKind};
pub use reactive::{
    add_observer, batch, configure, link_count, node_count, on_cleanup, remove_observer,
    runtime_config, start_batch, try_batch, try_on_cleanup, untracked, AsyncState, BatchGuard,
    Computed, ComputedOptions, Effect, EffectScope, Equality, Observer, ObserverId,
    RuntimeConfig, Signal, SignalOptions, WatchOptions, Watcher, WritableComputed,
};
