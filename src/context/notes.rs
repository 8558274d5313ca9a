// Project notes: the caller-side workspace context handed to a session
//
// Looks for SPECFORGE.md, CONTEXT.md and README.md at the workspace root, in
// that order, and concatenates whatever is non-empty. The result is capped so
// a huge README cannot crowd out the ranked context.

use std::path::Path;
use tracing::{debug, info};

use crate::budget::truncate_context;

const NOTE_FILENAMES: &[&str] = &["SPECFORGE.md", "CONTEXT.md", "README.md"];

/// Combined notes never exceed this many estimated tokens.
pub const MAX_NOTE_TOKENS: usize = 2_000;

/// Notes found at `root`, or `None` when there are none.
pub fn collect_project_notes(root: &Path) -> Option<String> {
    let sections: Vec<String> = NOTE_FILENAMES
        .iter()
        .filter_map(|name| {
            let path = root.join(name);
            let content = read_non_empty(&path)?;
            info!("Loaded project notes: {}", path.display());
            Some(content)
        })
        .collect();

    if sections.is_empty() {
        debug!("No project notes found in {}", root.display());
        return None;
    }

    let joined = sections.join("\n\n---\n\n");
    Some(truncate_context(&joined, MAX_NOTE_TOKENS).content)
}

fn read_non_empty(path: &Path) -> Option<String> {
    match std::fs::read_to_string(path) {
        Ok(content) if !content.trim().is_empty() => Some(content),
        Ok(_) => None,
        Err(e) => {
            if path.exists() {
                debug!("Failed to read {}: {}", path.display(), e);
            }
            None
        }
    }
}
