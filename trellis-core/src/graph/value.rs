//! Async node values.
//!
//! Async-computation and stream-subscription nodes expose their progress as
//! data: [`AsyncValue`] is a tagged union with exactly one tag active at a
//! time. The only legal transitions are `Loading -> Data` and
//! `Loading -> Error`; a fresh `Loading` cycle requires re-invocation through
//! `ProviderContainer::invalidate`.

use std::fmt;
use std::sync::Arc;

use thiserror::Error;

/// The state of an asynchronous node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AsyncValue<T> {
    /// The underlying operation has started but not settled.
    Loading,
    /// The operation settled with a value.
    Data(T),
    /// The operation settled with a failure. Recoverable: callers retry by
    /// invalidating the node.
    Error(OperationFailure),
}

impl<T> AsyncValue<T> {
    pub fn is_loading(&self) -> bool {
        matches!(self, AsyncValue::Loading)
    }

    /// The settled value, if any.
    pub fn data(&self) -> Option<&T> {
        match self {
            AsyncValue::Data(value) => Some(value),
            _ => None,
        }
    }

    /// The failure cause, if the operation failed.
    pub fn error(&self) -> Option<&OperationFailure> {
        match self {
            AsyncValue::Error(failure) => Some(failure),
            _ => None,
        }
    }
}

/// Cause of a failed asynchronous operation.
///
/// Cheap to clone; surfaced through [`AsyncValue::Error`] rather than thrown,
/// so watchers can render a retry affordance.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct OperationFailure {
    message: Arc<str>,
}

impl OperationFailure {
    pub fn new(message: impl fmt::Display) -> Self {
        Self {
            message: message.to_string().into(),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl From<&str> for OperationFailure {
    fn from(message: &str) -> Self {
        Self::new(message)
    }
}

impl From<String> for OperationFailure {
    fn from(message: String) -> Self {
        Self::new(message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tags_are_mutually_exclusive() {
        let loading: AsyncValue<i32> = AsyncValue::Loading;
        assert!(loading.is_loading());
        assert_eq!(loading.data(), None);
        assert_eq!(loading.error(), None);

        let data = AsyncValue::Data(7);
        assert!(!data.is_loading());
        assert_eq!(data.data(), Some(&7));

        let failed: AsyncValue<i32> = AsyncValue::Error("boom".into());
        assert_eq!(failed.error().map(OperationFailure::message), Some("boom"));
    }

    #[test]
    fn failure_displays_its_message() {
        let failure = OperationFailure::new("user lookup timed out");
        assert_eq!(failure.to_string(), "user lookup timed out");
    }
}
