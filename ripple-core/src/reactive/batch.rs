//! Batching.
//!
//! Every write already runs in an implicit batch of its own. An explicit
//! batch groups several writes so that effects run once, after the last
//! of them, against a consistent state.

use crate::error::{raise, Result};

use super::runtime::BatchGuard;

/// Run `f` as one batch. Effects triggered inside run when the outermost
/// batch closes.
///
/// Returns the first failure raised while flushing.
pub fn try_batch<R>(f: impl FnOnce() -> R) -> Result<R> {
    let batch = BatchGuard::open();
    let result = f();
    batch.close()?;
    Ok(result)
}

/// Run `f` as one batch.
///
/// # Example
///
/// ```rust
/// use ripple_core::{batch, Effect, Signal};
/// use std::cell::Cell;
/// use std::rc::Rc;
///
/// let first = Signal::new("Ada");
/// let last = Signal::new("Lovelace");
/// let runs = Rc::new(Cell::new(0));
///
/// let (f, l, r) = (first.clone(), last.clone(), runs.clone());
/// let effect = Effect::new(move || {
///     let _ = (f.get(), l.get());
///     r.set(r.get() + 1);
/// });
///
/// batch(|| {
///     first.set("Grace");
///     last.set("Hopper");
/// });
/// assert_eq!(runs.get(), 2);
/// effect.dispose();
/// ```
pub fn batch<R>(f: impl FnOnce() -> R) -> R {
    raise(try_batch(f))
}
