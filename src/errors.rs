// Error taxonomy for refinement sessions
//
// Protocol errors (bad transitions, missing preconditions) are programming
// errors and always bubble up. Invocation errors are recoverable at the
// caller's discretion. Parse degradations and budget pressure never show up
// here: they resolve to defaults or trigger truncation/summarization instead.

use thiserror::Error;

use crate::protocol::{Persona, Phase};

#[derive(Debug, Error)]
pub enum RefineError {
    #[error("Cannot transition from {from} to {to}")]
    InvalidStateTransition { from: Phase, to: Phase },

    #[error("Critique requested but the session has no draft")]
    MissingDraft,

    #[error("Approval requested but no artifact has been produced")]
    MissingArtifact,

    #[error("{stage} request timed out after {elapsed_secs}s")]
    InvocationTimeout { stage: Persona, elapsed_secs: u64 },

    #[error("{stage} request failed: {message}")]
    Invocation { stage: Persona, message: String },
}

impl RefineError {
    /// True for errors the caller may retry (model channel failures).
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            RefineError::InvocationTimeout { .. } | RefineError::Invocation { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::AwaitReason;

    #[test]
    fn test_transition_error_message_names_both_phases() {
        let err = RefineError::InvalidStateTransition {
            from: Phase::Idle,
            to: Phase::AwaitingUser(AwaitReason::Approval),
        };
        let msg = err.to_string();
        assert!(msg.contains("idle"), "{msg}");
        assert!(msg.contains("awaiting_user(approval)"), "{msg}");
    }

    #[test]
    fn test_timeout_message_includes_elapsed_time() {
        let err = RefineError::InvocationTimeout {
            stage: Persona::Critic,
            elapsed_secs: 300,
        };
        assert_eq!(err.to_string(), "critic request timed out after 300s");
        assert!(err.is_recoverable());
    }

    #[test]
    fn test_protocol_errors_are_not_recoverable() {
        assert!(!RefineError::MissingDraft.is_recoverable());
        assert!(!RefineError::MissingArtifact.is_recoverable());
    }
}
