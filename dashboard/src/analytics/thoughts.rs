use crate::types::{Thought, ThoughtsDocument};

/// How many thoughts the dashboard shows.
pub const DEFAULT_THOUGHT_LIMIT: usize = 10;

/// The last `limit` thoughts, most recent first. Stored thoughts are
/// chronological.
pub fn latest_thoughts(doc: &ThoughtsDocument, limit: usize) -> Vec<Thought> {
    doc.thoughts.iter().rev().take(limit).cloned().collect()
}
