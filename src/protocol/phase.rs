// Session phases and the transition graph between them

use serde::{Deserialize, Serialize};
use std::fmt;

/// Why a session is waiting on the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AwaitReason {
    /// Clarifying questions (from the analyst or from critique issues)
    Clarification,
    /// A final artifact exists and needs sign-off
    Approval,
}

impl AwaitReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            AwaitReason::Clarification => "clarification",
            AwaitReason::Approval => "approval",
        }
    }
}

/// Tagged session state.
///
/// ```text
/// Idle → Drafting → AwaitingUser → Critiquing → Refining → AwaitingUser(approval)
///                                                              ↓
///                                                   Approved | Cancelled
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "state", content = "reason", rename_all = "snake_case")]
pub enum Phase {
    Idle,
    Drafting,
    AwaitingUser(AwaitReason),
    Critiquing,
    Refining,
    Approved,
    Cancelled,
}

impl Phase {
    /// Whether the graph has an edge from `self` to `to`.
    pub fn can_transition_to(&self, to: Phase) -> bool {
        use Phase::*;

        // Cancellation is reachable from everywhere except itself
        if to == Cancelled {
            return *self != Cancelled;
        }

        matches!(
            (*self, to),
            (Idle, Drafting)
                | (Drafting, AwaitingUser(_))
                | (Drafting, Critiquing)
                | (AwaitingUser(_), Drafting)
                | (AwaitingUser(_), Refining)
                | (AwaitingUser(AwaitReason::Approval), Approved)
                | (Critiquing, Refining)
                | (Critiquing, AwaitingUser(AwaitReason::Clarification))
                | (Refining, AwaitingUser(AwaitReason::Approval))
        )
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Phase::Approved | Phase::Cancelled)
    }

    pub fn is_awaiting_user(&self) -> bool {
        matches!(self, Phase::AwaitingUser(_))
    }

    pub fn all() -> &'static [Phase] {
        &[
            Phase::Idle,
            Phase::Drafting,
            Phase::AwaitingUser(AwaitReason::Clarification),
            Phase::AwaitingUser(AwaitReason::Approval),
            Phase::Critiquing,
            Phase::Refining,
            Phase::Approved,
            Phase::Cancelled,
        ]
    }
}

impl Default for Phase {
    fn default() -> Self {
        Phase::Idle
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::Idle => write!(f, "idle"),
            Phase::Drafting => write!(f, "drafting"),
            Phase::AwaitingUser(reason) => write!(f, "awaiting_user({})", reason.as_str()),
            Phase::Critiquing => write!(f, "critiquing"),
            Phase::Refining => write!(f, "refining"),
            Phase::Approved => write!(f, "approved"),
            Phase::Cancelled => write!(f, "cancelled"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CLARIFY: Phase = Phase::AwaitingUser(AwaitReason::Clarification);
    const APPROVAL: Phase = Phase::AwaitingUser(AwaitReason::Approval);

    #[test]
    fn test_happy_path_edges() {
        assert!(Phase::Idle.can_transition_to(Phase::Drafting));
        assert!(Phase::Drafting.can_transition_to(CLARIFY));
        assert!(CLARIFY.can_transition_to(Phase::Drafting));
        assert!(Phase::Drafting.can_transition_to(Phase::Critiquing));
        assert!(Phase::Critiquing.can_transition_to(Phase::Refining));
        assert!(Phase::Refining.can_transition_to(APPROVAL));
        assert!(APPROVAL.can_transition_to(Phase::Approved));
    }

    #[test]
    fn test_low_confidence_and_forced_refine_edges() {
        assert!(Phase::Critiquing.can_transition_to(CLARIFY));
        assert!(CLARIFY.can_transition_to(Phase::Refining));
    }

    #[test]
    fn test_rejected_edges() {
        assert!(!Phase::Idle.can_transition_to(Phase::Critiquing));
        assert!(!Phase::Idle.can_transition_to(Phase::Refining));
        assert!(!CLARIFY.can_transition_to(Phase::Critiquing));
        assert!(!CLARIFY.can_transition_to(Phase::Approved));
        assert!(!Phase::Refining.can_transition_to(CLARIFY));
        assert!(!Phase::Critiquing.can_transition_to(APPROVAL));
        assert!(!Phase::Approved.can_transition_to(Phase::Drafting));
        assert!(!Phase::Cancelled.can_transition_to(Phase::Idle));
    }

    #[test]
    fn test_cancel_reachable_from_every_other_phase() {
        for phase in Phase::all() {
            let expected = *phase != Phase::Cancelled;
            assert_eq!(phase.can_transition_to(Phase::Cancelled), expected, "{phase}");
        }
    }

    #[test]
    fn test_terminal_phases() {
        assert!(Phase::Approved.is_terminal());
        assert!(Phase::Cancelled.is_terminal());
        assert!(!APPROVAL.is_terminal());
    }

    #[test]
    fn test_phase_serialization_is_tagged() {
        let json = serde_json::to_string(&APPROVAL).unwrap();
        assert_eq!(json, r#"{"state":"awaiting_user","reason":"approval"}"#);

        let parsed: Phase = serde_json::from_str(r#"{"state":"drafting"}"#).unwrap();
        assert_eq!(parsed, Phase::Drafting);
    }
}
