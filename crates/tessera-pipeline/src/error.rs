//! Construction-time errors.

use tessera_core::BuildError;
use thiserror::Error;

/// A pipeline could not be assembled.
///
/// Every variant is fatal: no partial pipeline is ever returned.
#[derive(Error, Debug)]
pub enum ConfigurationError {
    /// Two enabled additions share an id.
    #[error("step registration with id '{id}' is already registered")]
    DuplicateStep {
        /// The duplicated step id.
        id: String,
    },

    /// A replacement targets an id that was never added.
    #[error("cannot replace step '{id}': no step with that id is registered")]
    UnknownReplacementTarget {
        /// The replacement's target id.
        id: String,
    },

    /// The same id is replaced more than once.
    #[error("step '{id}' is replaced more than once")]
    DuplicateReplacement {
        /// The replaced step id.
        id: String,
    },

    /// A hard ordering reference names a step that is not in the pipeline.
    #[error("step '{step}' must run {relation} '{reference}', which is not registered")]
    UnknownStepReference {
        /// The step declaring the relation.
        step: String,
        /// `"before"` or `"after"`.
        relation: &'static str,
        /// The missing step id.
        reference: String,
    },

    /// The before/after relations cannot be satisfied.
    #[error("ordering constraints form a cycle between steps: {}", .steps.join(", "))]
    OrderingCycle {
        /// The steps taking part in the cycle, in registration order.
        steps: Vec<String>,
    },

    /// The object builder could not produce a step's behavior.
    #[error("failed to build step '{id}'")]
    BuildFailed {
        /// The step id.
        id: String,
        /// The builder failure.
        #[source]
        source: BuildError,
    },

    /// A step does not accept the context its predecessor forwards.
    #[error("step '{id}' accepts {accepted} but is handed {provided}")]
    ContextMismatch {
        /// The step id.
        id: String,
        /// The context type the step accepts.
        accepted: &'static str,
        /// The context type the previous step (or the pipeline root) provides.
        provided: &'static str,
    },

    /// A terminator appears before the end of the pipeline.
    #[error("terminator step '{id}' must be the last step in the pipeline")]
    TerminatorNotLast {
        /// The terminator's step id.
        id: String,
    },
}

/// A strategy name did not match any [`InvocationStrategy`](crate::InvocationStrategy).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("unknown invocation strategy '{0}'")]
pub struct UnknownStrategyError(pub String);

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn test_cycle_lists_steps() {
        let err = ConfigurationError::OrderingCycle {
            steps: vec!["a".into(), "b".into(), "c".into()],
        };
        assert_eq!(
            err.to_string(),
            "ordering constraints form a cycle between steps: a, b, c"
        );
    }

    #[test]
    fn test_build_failed_keeps_source() {
        let err = ConfigurationError::BuildFailed {
            id: "audit".into(),
            source: BuildError::not_registered::<String>(),
        };
        assert!(err.to_string().contains("audit"));
        assert!(err.source().unwrap().to_string().contains("not registered"));
    }
}
