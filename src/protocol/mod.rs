// Protocol layer: session phases, shared data contracts and persona prompts
//
// Everything the refinement engine exchanges with its caller lives here, so
// the budget and context layers never need to know about sessions.

pub mod phase;
pub mod prompts;
pub mod types;

pub use phase::{AwaitReason, Phase};
pub use prompts::{ArtifactSection, CANONICAL_HEADINGS};
pub use types::{
    Artifact, ClarifyingQuestion, ConversationTurn, CritiqueIssue, CritiqueResult, IssueType,
    Persona, QuestionCategory, SessionState, Severity, TechnicalPlan, TurnMetadata, TurnRole,
    UserClarification,
};
