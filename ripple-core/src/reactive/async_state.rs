//! State of a value produced asynchronously.
//!
//! The runtime has no executor. Code that drives a future or a callback
//! API stores its progress in a `Signal<AsyncState<T, E>>`, and readers
//! react to the transitions like any other signal write.

/// A value that is loading, loaded, or failed to load.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AsyncState<T, E> {
    Pending,
    Ready(T),
    Failed(E),
}

impl<T, E> AsyncState<T, E> {
    pub fn is_pending(&self) -> bool {
        matches!(self, AsyncState::Pending)
    }

    pub fn is_ready(&self) -> bool {
        matches!(self, AsyncState::Ready(_))
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, AsyncState::Failed(_))
    }

    /// The loaded value, if any.
    pub fn ready(&self) -> Option<&T> {
        match self {
            AsyncState::Ready(value) => Some(value),
            _ => None,
        }
    }

    /// The failure, if any.
    pub fn error(&self) -> Option<&E> {
        match self {
            AsyncState::Failed(error) => Some(error),
            _ => None,
        }
    }

    pub fn as_ref(&self) -> AsyncState<&T, &E> {
        match self {
            AsyncState::Pending => AsyncState::Pending,
            AsyncState::Ready(value) => AsyncState::Ready(value),
            AsyncState::Failed(error) => AsyncState::Failed(error),
        }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> AsyncState<U, E> {
        match self {
            AsyncState::Pending => AsyncState::Pending,
            AsyncState::Ready(value) => AsyncState::Ready(f(value)),
            AsyncState::Failed(error) => AsyncState::Failed(error),
        }
    }

    /// `None` while pending, otherwise the outcome.
    pub fn into_result(self) -> Option<Result<T, E>> {
        match self {
            AsyncState::Pending => None,
            AsyncState::Ready(value) => Some(Ok(value)),
            AsyncState::Failed(error) => Some(Err(error)),
        }
    }
}

impl<T, E> Default for AsyncState<T, E> {
    fn default() -> Self {
        AsyncState::Pending
    }
}

impl<T, E> From<Result<T, E>> for AsyncState<T, E> {
    fn from(result: Result<T, E>) -> Self {
        match result {
            Ok(value) => AsyncState::Ready(value),
            Err(error) => AsyncState::Failed(error),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::{Computed, Signal};

    #[test]
    fn accessors_match_variant() {
        let pending: AsyncState<u32, String> = AsyncState::default();
        assert!(pending.is_pending());
        assert_eq!(pending.ready(), None);

        let ready: AsyncState<u32, String> = Ok(3).into();
        assert!(ready.is_ready());
        assert_eq!(ready.ready(), Some(&3));
        assert_eq!(ready.clone().map(|v| v * 2), AsyncState::Ready(6));

        let failed: AsyncState<u32, String> = Err("timeout".to_string()).into();
        assert!(failed.is_failed());
        assert_eq!(failed.error().map(String::as_str), Some("timeout"));
        assert_eq!(failed.into_result(), Some(Err("timeout".to_string())));
    }

    #[test]
    fn readers_follow_transitions() {
        let state = Signal::new(AsyncState::<Vec<u8>, String>::Pending);
        let s = state.clone();
        let label = Computed::new(move || {
            s.with(|state| match state.as_ref() {
                AsyncState::Pending => "loading".to_string(),
                AsyncState::Ready(bytes) => format!("{} bytes", bytes.len()),
                AsyncState::Failed(error) => format!("error: {error}"),
            })
        });

        assert_eq!(label.get(), "loading");
        state.set(AsyncState::Ready(vec![1, 2, 3]));
        assert_eq!(label.get(), "3 bytes");
        state.set(AsyncState::Failed("offline".into()));
        assert_eq!(label.get(), "error: offline");
    }
}
