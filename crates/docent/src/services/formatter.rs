use crate::models::ScoredEntry;

/// Placed between consecutive passages in a context block
pub const PASSAGE_SEPARATOR: &str = "\n\n---\n\n";

/// Render ranked passages as one prompt-ready context block
///
/// Each passage becomes `[Source: <source>]\n<content>`, in the order given.
/// An empty slice renders as an empty string.
pub fn format_context(passages: &[ScoredEntry]) -> String {
  passages
    .iter()
    .map(|passage| format!("[Source: {}]\n{}", passage.entry.source, passage.entry.content))
    .collect::<Vec<_>>()
    .join(PASSAGE_SEPARATOR)
}
