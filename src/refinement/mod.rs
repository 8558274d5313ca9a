// Refinement orchestration
//
// A session walks a feature request through analyst drafting, user
// clarification, critique and refinement, publishing every step as an event.

pub mod events;
pub mod parsers;
pub mod session;

pub use events::{EventReceiver, EventSender, SessionEvent};
pub use parsers::{is_draft_shaped, parse_artifact, parse_critique, parse_questions, render_artifact};
pub use session::RefinementSession;
