// Workspace context assembly
//
// Turns a free-text request into a bounded, ranked slice of the workspace:
// keyword extraction, search through injected collaborators, relevance
// ranking, and budgeted assembly of full files and signature skeletons.

pub mod builder;
pub mod keywords;
pub mod notes;
pub mod ranking;
pub mod skeleton;
pub mod workspace;

pub use builder::{ContextRelevanceBuilder, ContextStrategy, RelevantFile, SmartContext};
pub use keywords::extract_keywords;
pub use notes::collect_project_notes;
pub use skeleton::extract_skeleton;
pub use workspace::{FileReader, FileSearch, LocalWorkspace, SearchMatch, SearchOptions};
