//! Invocation-time error types.
//!
//! Two families of failures can surface while a pipeline runs:
//!
//! | Type | Raised by | Reaches the caller of `invoke` |
//! |---|---|---|
//! | [`ContextBagError`] | [`ContextBag`](crate::ContextBag) lookups | Only if a behavior converts it |
//! | [`InvocationError`] | Behaviors, terminators and the chain itself | Always, unchanged |
//!
//! Configuration failures (bad ordering, unbuildable steps) are fatal at
//! construction time and live in `tessera-pipeline`.

use thiserror::Error;

/// Result type returned by every behavior, terminator and pipeline invocation.
pub type BehaviorResult = Result<(), InvocationError>;

/// Errors raised by [`ContextBag`](crate::ContextBag) lookups.
///
/// These are local to the caller of the bag. They only become a pipeline
/// failure when a behavior propagates them with `?`.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ContextBagError {
    /// No entry with the key exists locally or in any ancestor bag.
    #[error("no item found in behavior context with key: {key}")]
    NotFound {
        /// The key that was looked up.
        key: String,
    },

    /// An entry exists under the key but holds a value of another type.
    #[error("item stored under key {key} is not a {expected}")]
    TypeMismatch {
        /// The key that was looked up.
        key: String,
        /// The type the caller asked for.
        expected: &'static str,
    },
}

impl ContextBagError {
    /// Creates a not-found error for a key.
    pub fn not_found(key: impl Into<String>) -> Self {
        Self::NotFound { key: key.into() }
    }

    /// Creates a type mismatch error for a key and the requested type.
    pub fn type_mismatch<T: ?Sized>(key: impl Into<String>) -> Self {
        Self::TypeMismatch {
            key: key.into(),
            expected: std::any::type_name::<T>(),
        }
    }
}

/// A failure raised while a pipeline is being invoked.
///
/// The chain propagates this value unchanged from the failing behavior to the
/// original caller; it is never wrapped, retried or swallowed on the way up.
///
/// # Example
///
/// ```
/// use tessera_core::{BehaviorResult, InvocationError};
///
/// fn reject(body: &str) -> BehaviorResult {
///     if body.is_empty() {
///         return Err(InvocationError::failed("message body is empty"));
///     }
///     Ok(())
/// }
///
/// assert!(reject("").is_err());
/// ```
#[derive(Error, Debug)]
pub enum InvocationError {
    /// A behavior or terminator reported a failure.
    #[error(transparent)]
    Failed(#[from] anyhow::Error),

    /// A behavior propagated a context bag lookup failure.
    #[error(transparent)]
    Bag(#[from] ContextBagError),

    /// A behavior was handed a context of a type it does not accept.
    ///
    /// Pipelines verify context compatibility at construction time, so this
    /// only appears when an erased behavior is driven by hand.
    #[error("behavior expects context {expected} but received {found}")]
    ContextMismatch {
        /// The context type the behavior accepts.
        expected: &'static str,
        /// The context type it was given.
        found: &'static str,
    },

    /// A smuggling strategy found no behavior table on the context.
    #[error("no behavior table is attached to the invocation context")]
    MissingBehaviorTable,
}

impl InvocationError {
    /// Creates a failure from a message.
    #[must_use]
    pub fn failed(message: impl std::fmt::Display + std::fmt::Debug + Send + Sync + 'static) -> Self {
        Self::Failed(anyhow::Error::msg(message))
    }

    /// Creates a failure from any standard error.
    #[must_use]
    pub fn from_error<E>(error: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Failed(anyhow::Error::new(error))
    }

    /// Returns the underlying error of a [`InvocationError::Failed`] if it is an `E`.
    #[must_use]
    pub fn downcast_ref<E>(&self) -> Option<&E>
    where
        E: std::fmt::Display + std::fmt::Debug + Send + Sync + 'static,
    {
        match self {
            Self::Failed(inner) => inner.downcast_ref::<E>(),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Error)]
    #[error("disk full")]
    struct DiskFull;

    #[test]
    fn test_not_found_display() {
        let err = ContextBagError::not_found("my.Key");
        assert_eq!(
            err.to_string(),
            "no item found in behavior context with key: my.Key"
        );
    }

    #[test]
    fn test_type_mismatch_names_requested_type() {
        let err = ContextBagError::type_mismatch::<u32>("counter");
        assert!(err.to_string().contains("counter"));
        assert!(err.to_string().contains("u32"));
    }

    #[test]
    fn test_failed_is_transparent() {
        let err = InvocationError::failed("boom");
        assert_eq!(err.to_string(), "boom");
    }

    #[test]
    fn test_downcast_preserves_identity() {
        let err = InvocationError::from_error(DiskFull);
        assert!(err.downcast_ref::<DiskFull>().is_some());
        assert_eq!(err.to_string(), "disk full");
    }

    #[test]
    fn test_bag_error_converts() {
        fn lookup() -> BehaviorResult {
            Err(ContextBagError::not_found("missing"))?;
            Ok(())
        }

        let err = lookup().unwrap_err();
        assert!(matches!(
            err,
            InvocationError::Bag(ContextBagError::NotFound { .. })
        ));
        assert!(err.downcast_ref::<DiskFull>().is_none());
    }
}
