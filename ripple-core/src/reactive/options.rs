//! Construction options for signals, computeds and watchers.
//!
//! Every option struct has a `Default` that matches the plain constructor,
//! and builder-style methods for the fields callers usually change.

use std::borrow::Cow;
use std::fmt;
use std::rc::Rc;

/// How a signal or computed decides that a new value equals the old one.
///
/// Equal writes are dropped: versions stay put and nothing downstream is
/// notified.
pub struct Equality<T>(Option<Rc<dyn Fn(&T, &T) -> bool>>);

impl<T> Equality<T> {
    /// Treat every write as a change.
    pub fn never() -> Self {
        Self(None)
    }

    /// Use a custom comparison.
    pub fn custom(eq: impl Fn(&T, &T) -> bool + 'static) -> Self {
        Self(Some(Rc::new(eq)))
    }

    /// Whether `old` and `new` compare equal.
    pub fn is_equal(&self, old: &T, new: &T) -> bool {
        self.0.as_ref().is_some_and(|eq| eq(old, new))
    }
}

impl<T: PartialEq> Equality<T> {
    /// Compare with `PartialEq`.
    pub fn partial_eq() -> Self {
        Self::custom(|a: &T, b: &T| a == b)
    }
}

impl<T: PartialEq> Default for Equality<T> {
    fn default() -> Self {
        Self::partial_eq()
    }
}

impl<T> Clone for Equality<T> {
    fn clone(&self) -> Self {
        Self(self.0.clone())
    }
}

impl<T> fmt::Debug for Equality<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            Some(_) => f.write_str("Equality::Custom"),
            None => f.write_str("Equality::Never"),
        }
    }
}

/// Options for [`Signal::with_options`](super::Signal::with_options).
#[derive(Debug, Clone)]
pub struct SignalOptions<T> {
    /// Diagnostic name, shown in logs.
    pub name: Option<Cow<'static, str>>,
    pub equality: Equality<T>,
}

impl<T> SignalOptions<T> {
    /// Options with the given equality and no name.
    pub fn with_equality(equality: Equality<T>) -> Self {
        Self { name: None, equality }
    }

    pub fn name(mut self, name: impl Into<Cow<'static, str>>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn equality(mut self, equality: Equality<T>) -> Self {
        self.equality = equality;
        self
    }
}

impl<T: PartialEq> Default for SignalOptions<T> {
    fn default() -> Self {
        Self::with_equality(Equality::default())
    }
}

/// Options for [`Computed::with_options`](super::Computed::with_options).
#[derive(Debug, Clone)]
pub struct ComputedOptions<T> {
    /// Diagnostic name, shown in logs.
    pub name: Option<Cow<'static, str>>,

    pub equality: Equality<T>,

    /// Dispose the computed once nothing subscribes to it anymore. The
    /// check happens when the runtime is idle, so a computed that is
    /// dropped and re-read in the same batch survives.
    pub auto_dispose: bool,
}

impl<T> ComputedOptions<T> {
    /// Options with the given equality, no name, no auto-dispose.
    pub fn with_equality(equality: Equality<T>) -> Self {
        Self {
            name: None,
            equality,
            auto_dispose: false,
        }
    }

    pub fn name(mut self, name: impl Into<Cow<'static, str>>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn equality(mut self, equality: Equality<T>) -> Self {
        self.equality = equality;
        self
    }

    pub fn auto_dispose(mut self, auto_dispose: bool) -> Self {
        self.auto_dispose = auto_dispose;
        self
    }
}

impl<T: PartialEq> Default for ComputedOptions<T> {
    fn default() -> Self {
        Self::with_equality(Equality::default())
    }
}

/// Options for [`Watcher::with_options`](super::Watcher::with_options).
pub struct WatchOptions<S> {
    /// Call the callback once at creation, with no previous value.
    pub immediate: bool,

    /// Decides whether a change is worth a callback, given `(new, old)`.
    /// Without a predicate the callback fires when `new != old`.
    pub predicate: Option<Rc<dyn Fn(&S, &S) -> bool>>,

    /// Diagnostic name, shown in logs.
    pub name: Option<Cow<'static, str>>,
}

impl<S> WatchOptions<S> {
    pub fn immediate(mut self, immediate: bool) -> Self {
        self.immediate = immediate;
        self
    }

    pub fn predicate(mut self, predicate: impl Fn(&S, &S) -> bool + 'static) -> Self {
        self.predicate = Some(Rc::new(predicate));
        self
    }

    pub fn name(mut self, name: impl Into<Cow<'static, str>>) -> Self {
        self.name = Some(name.into());
        self
    }
}

impl<S> Default for WatchOptions<S> {
    fn default() -> Self {
        Self {
            immediate: false,
            predicate: None,
            name: None,
        }
    }
}

impl<S> Clone for WatchOptions<S> {
    fn clone(&self) -> Self {
        Self {
            immediate: self.immediate,
            predicate: self.predicate.clone(),
            name: self.name.clone(),
        }
    }
}

impl<S> fmt::Debug for WatchOptions<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WatchOptions")
            .field("immediate", &self.immediate)
            .field("predicate", &self.predicate.is_some())
            .field("name", &self.name)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_equality_uses_partial_eq() {
        let eq = Equality::<i32>::default();
        assert!(eq.is_equal(&1, &1));
        assert!(!eq.is_equal(&1, &2));
    }

    #[test]
    fn never_equality_reports_every_write() {
        let eq = Equality::<i32>::never();
        assert!(!eq.is_equal(&1, &1));
    }

    #[test]
    fn custom_equality() {
        let eq = Equality::custom(|a: &f64, b: &f64| (a - b).abs() < 0.5);
        assert!(eq.is_equal(&1.0, &1.2));
        assert!(!eq.is_equal(&1.0, &2.0));
    }

    #[test]
    fn builders_set_fields() {
        let options = ComputedOptions::<u8>::default()
            .name("total")
            .auto_dispose(true);
        assert_eq!(options.name.as_deref(), Some("total"));
        assert!(options.auto_dispose);

        let watch = WatchOptions::<u8>::default()
            .immediate(true)
            .predicate(|new, old| new > old);
        assert!(watch.immediate);
        assert!(watch.predicate.is_some_and(|p| p(&2, &1)));
    }
}
