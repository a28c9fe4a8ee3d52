//! Indexing a single file's unified diff into hunk and stageable line tables.

use crate::patch::{PatchError, split_lines};

/// Line positions derived from one file's diff text
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DiffIndex {
    /// Zero-based line indices of every `@@` hunk header, ascending
    pub hunk_starts: Vec<usize>,
    /// Zero-based line indices of every `+`/`-` line inside a hunk, ascending
    pub stageable_lines: Vec<usize>,
}

/// Parse a unified diff (git diff output for one file) into line tables.
///
/// Lines before the first hunk header are the file header; `---`/`+++` there
/// are never stageable.
///
/// # Errors
///
/// Returns [`PatchError::MalformedPatch`] if the text has no hunk header.
pub fn parse_diff(diff_output: &str) -> Result<DiffIndex, PatchError> {
    let mut index = DiffIndex::default();

    for (line_number, line) in split_lines(diff_output).into_iter().enumerate() {
        if line.starts_with("@@") {
            index.hunk_starts.push(line_number);
        } else if index.hunk_starts.is_empty() {
            // Still in the file header
            continue;
        } else if line.starts_with('+') || line.starts_with('-') {
            index.stageable_lines.push(line_number);
        }
    }

    if index.hunk_starts.is_empty() {
        return Err(PatchError::MalformedPatch);
    }

    Ok(index)
}
