//! Carving single-hunk sub-patches out of a file's unified diff.
//!
//! Every function here takes the full diff of one file and produces a
//! [`SubPatch`]: the file header followed by exactly one hunk, with the hunk's
//! new-file line count repaired so `git apply` accepts it.
//!
//! Line indices are zero-based positions in the diff text, the same positions
//! reported by [`crate::diff::parse_diff`].

use crate::cycle::{self, Bound, Direction};
use error_set::error_set;
use nom::{
    IResult, Parser,
    bytes::complete::tag,
    character::complete::{char, u32 as number},
    combinator::{opt, peek, recognize},
    sequence::preceded,
};
use std::fmt;

error_set! {
    /// Errors from building a sub-patch
    PatchError := {
        /// No `@@` line where one was expected
        #[display("Could not find a hunk header in the diff")]
        MalformedPatch,
        /// The hunk header has no usable new-file line count
        #[display("Malformed hunk header '{header}'")]
        MalformedHeader { header: String },
        /// The requested line is past the end of the diff
        #[display("Line {index} is outside the diff ({len} lines)")]
        LineOutOfRange { index: usize, len: usize },
        /// Keeping the removal at `index` as context would leave it without
        /// its newline while later lines follow it
        #[display("Line {index} has no trailing newline; the changes after it cannot be split from it")]
        UnterminatedLine { index: usize },
    }
}

/// A file header plus exactly one hunk, ready for `git apply`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubPatch(String);

impl SubPatch {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// True when no line after the hunk header adds or removes anything.
    ///
    /// Applying such a patch is a no-op, so the unstage flow skips it.
    pub fn is_empty(&self) -> bool {
        !self
            .0
            .lines()
            .skip_while(|line| !line.starts_with("@@"))
            .skip(1)
            .any(|line| line.starts_with('+') || line.starts_with('-'))
    }

    fn assemble<'a>(lines: impl IntoIterator<Item = &'a str>) -> Self {
        let mut text: String = lines.into_iter().collect();
        if !text.is_empty() && !text.ends_with('\n') {
            text.push('\n');
        }
        SubPatch(text)
    }
}

impl fmt::Display for SubPatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Split diff text into lines, keeping each line's terminator.
pub(crate) fn split_lines(diff: &str) -> Vec<&str> {
    diff.split_inclusive('\n').collect()
}

/// Number of lines before the first hunk header.
fn header_length(lines: &[&str]) -> Result<usize, PatchError> {
    lines
        .iter()
        .position(|line| line.starts_with("@@"))
        .ok_or(PatchError::MalformedPatch)
}

fn check_in_range(lines: &[&str], index: usize) -> Result<(), PatchError> {
    if index < lines.len() {
        Ok(())
    } else {
        Err(PatchError::LineOutOfRange {
            index,
            len: lines.len(),
        })
    }
}

/// Isolate the hunk containing `line_index`, unmodified, behind the file header.
///
/// The hunk starts at the greatest element of `hunk_starts` not after
/// `line_index` and ends before the next element, or at the end of the diff
/// when `line_index` is in the last hunk.
///
/// # Errors
///
/// [`PatchError::MalformedPatch`] when the diff has no hunk header or
/// `line_index` falls in the file header; [`PatchError::LineOutOfRange`] when
/// `line_index` is past the end of the diff.
pub fn extract_hunk(
    diff: &str,
    hunk_starts: &[usize],
    line_index: usize,
) -> Result<SubPatch, PatchError> {
    let lines = split_lines(diff);
    let header_len = header_length(&lines)?;
    check_in_range(&lines, line_index)?;

    let current = cycle::cyclic_index(
        hunk_starts,
        &line_index,
        Direction::Backward,
        Bound::Inclusive,
    )
    .filter(|p| !p.wrapped)
    .ok_or(PatchError::MalformedPatch)?;
    let start = hunk_starts[current.index];

    let end = match cycle::cyclic_index(
        hunk_starts,
        &line_index,
        Direction::Forward,
        Bound::Exclusive,
    ) {
        Some(next) if !next.wrapped => hunk_starts[next.index].min(lines.len()),
        _ => lines.len(),
    };

    if start < header_len || start >= end {
        return Err(PatchError::MalformedPatch);
    }

    Ok(SubPatch::assemble(
        lines[..header_len]
            .iter()
            .chain(&lines[start..end])
            .copied(),
    ))
}

/// Build a patch that stages only the addition or removal at `line_index`.
///
/// Other removals in the hunk become context (the line still exists in the
/// new file), other additions are dropped, and the hunk's new-file count is
/// adjusted to match.
///
/// ```
/// use git_line_stager::patch::extract_line;
///
/// let diff = "--- a/f\n+++ b/f\n@@ -1,2 +1,4 @@\n a\n+b\n+c\n d\n";
/// let patch = extract_line(diff, 5).unwrap();
/// assert_eq!(patch.as_str(), "--- a/f\n+++ b/f\n@@ -1,2 +1,3 @@\n a\n+c\n d\n");
/// ```
///
/// # Errors
///
/// See [`PatchError`].
pub fn extract_line(diff: &str, line_index: usize) -> Result<SubPatch, PatchError> {
    rewrite_enclosing_hunk(diff, line_index, |is_target, line| {
        match (is_target, line.as_bytes().first()) {
            (true, _) => Rewrite::Keep,
            (false, Some(b'-')) => Rewrite::Demote,
            (false, Some(b'+')) => Rewrite::Drop,
            (false, _) => Rewrite::Keep,
        }
    })
}

/// Build the enclosing hunk with the change at `line_index` taken out.
///
/// A removal at `line_index` becomes context and an addition is dropped;
/// every other line is left exactly as it was.
///
/// # Errors
///
/// See [`PatchError`].
pub fn extract_hunk_without_line(diff: &str, line_index: usize) -> Result<SubPatch, PatchError> {
    rewrite_enclosing_hunk(diff, line_index, |is_target, line| {
        match (is_target, line.as_bytes().first()) {
            (true, Some(b'-')) => Rewrite::Demote,
            (true, Some(b'+')) => Rewrite::Drop,
            _ => Rewrite::Keep,
        }
    })
}

/// What happens to one body line of the hunk being rewritten
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Rewrite {
    Keep,
    /// Turn a removal into context
    Demote,
    Drop,
}

fn rewrite_enclosing_hunk<F>(
    diff: &str,
    line_index: usize,
    mut decide: F,
) -> Result<SubPatch, PatchError>
where
    F: FnMut(bool, &str) -> Rewrite,
{
    let lines = split_lines(diff);
    let header_len = header_length(&lines)?;
    check_in_range(&lines, line_index)?;

    let hunk_start = (header_len..=line_index)
        .rev()
        .find(|&i| lines[i].starts_with("@@"))
        .ok_or(PatchError::MalformedPatch)?;

    let mut line_changes: i64 = 0;
    let mut body: Vec<String> = Vec::new();
    let mut previous = Rewrite::Keep;
    // A demoted removal that kept its `\ No newline` marker
    let mut unterminated: Option<usize> = None;

    for (index, line) in lines.iter().enumerate().skip(hunk_start + 1) {
        if line.starts_with("@@") {
            break;
        }

        // The marker belongs to the line before it and goes wherever that line went
        if line.starts_with('\\') {
            match previous {
                Rewrite::Drop => {}
                Rewrite::Demote => {
                    unterminated = Some(index - 1);
                    body.push((*line).to_string());
                }
                Rewrite::Keep => body.push((*line).to_string()),
            }
            continue;
        }

        let rewrite = decide(index == line_index, line);
        let in_post_image = match rewrite {
            Rewrite::Keep => !line.starts_with('-'),
            Rewrite::Demote => true,
            Rewrite::Drop => false,
        };
        if let (Some(demoted), true) = (unterminated, in_post_image) {
            return Err(PatchError::UnterminatedLine { index: demoted });
        }

        match rewrite {
            Rewrite::Keep => body.push((*line).to_string()),
            Rewrite::Demote => {
                body.push(format!(" {}", &line[1..]));
                line_changes += 1;
            }
            Rewrite::Drop => line_changes -= 1,
        }
        previous = rewrite;
    }

    let header = updated_header(lines[hunk_start], line_changes)?;

    Ok(SubPatch::assemble(
        lines[..header_len]
            .iter()
            .copied()
            .chain(std::iter::once(header.as_str()))
            .chain(body.iter().map(String::as_str)),
    ))
}

/// `,N` after a range start; absent when the count is implicitly 1
fn count(input: &str) -> IResult<&str, Option<u32>> {
    opt(preceded(char(','), number)).parse(input)
}

fn range(input: &str) -> IResult<&str, (u32, Option<u32>)> {
    (number, count).parse(input)
}

/// `@@ -a,b +c`, stopping right before the new-file count
fn header_prefix(input: &str) -> IResult<&str, &str> {
    recognize((tag("@@ -"), range, tag(" +"), number)).parse(input)
}

fn closing_marker(input: &str) -> IResult<&str, &str> {
    peek(tag(" @@")).parse(input)
}

/// Split a hunk header into the text before the new-file count, the count
/// itself, and everything from the closing ` @@` onwards.
fn split_header(input: &str) -> IResult<&str, (&str, Option<u32>)> {
    let (rest, prefix) = header_prefix(input)?;
    let (rest, new_count) = count(rest)?;
    let (rest, _) = closing_marker(rest)?;
    Ok((rest, (prefix, new_count)))
}

/// Add `line_changes` to the new-file line count of a hunk header.
///
/// `@@ -14,8 +14,11 @@ import (` with `-2` becomes `@@ -14,8 +14,9 @@ import (`.
/// Everything except the count is preserved byte for byte.
fn updated_header(header: &str, line_changes: i64) -> Result<String, PatchError> {
    let malformed = || PatchError::MalformedHeader {
        header: header.trim_end().to_string(),
    };

    let (rest, (prefix, new_count)) = split_header(header).map_err(|_| malformed())?;
    let new_count = i64::from(new_count.unwrap_or(1)) + line_changes;
    let new_count = u32::try_from(new_count).map_err(|_| malformed())?;

    Ok(format!("{prefix},{new_count}{rest}"))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use similar_asserts::assert_eq;

    const HEADER: &str = "diff --git a/gtk.nix b/gtk.nix\n--- a/gtk.nix\n+++ b/gtk.nix\n";

    /// Two hunks: lines 3..=9 and 10..=13
    fn two_hunk_diff() -> String {
        format!(
            "{HEADER}@@ -10,3 +10,4 @@ programs = {{\n     gtk.enable = true;\n-    gtk.theme.name = \"Adwaita\";\n-    gtk.iconTheme.name = \"Papirus\";\n+    gtk.iconTheme.name = \"Papirus-Dark\";\n+    gtk.cursorTheme.size = 24;\n+    gtk.font.size = 11;\n@@ -30,2 +31,3 @@ home = {{\n   username = \"me\";\n+  stateVersion = \"24.05\";\n   homeDirectory = \"/home/me\";\n"
        )
    }

    #[test]
    fn header_count_updated_with_context_text() {
        assert_eq!(
            updated_header("@@ -14,8 +14,11 @@ import (\n", -2).unwrap(),
            "@@ -14,8 +14,9 @@ import (\n"
        );
    }

    #[test]
    fn header_count_updated_without_context_text() {
        assert_eq!(
            updated_header("@@ -1,2 +1,3 @@\n", 1).unwrap(),
            "@@ -1,2 +1,4 @@\n"
        );
    }

    #[test]
    fn header_implicit_count_is_written_out() {
        assert_eq!(
            updated_header("@@ -5 +5 @@ fn main() {\n", 1).unwrap(),
            "@@ -5 +5,2 @@ fn main() {\n"
        );
    }

    #[test]
    fn header_context_digits_are_untouched() {
        assert_eq!(
            updated_header("@@ -3,4 +3,5 @@ let x = 7 @@ 9\n", -1).unwrap(),
            "@@ -3,4 +3,4 @@ let x = 7 @@ 9\n"
        );
    }

    #[test]
    fn header_without_counts_is_malformed() {
        let result = updated_header("@@ nonsense @@\n", 0);
        assert!(matches!(
            result,
            Err(PatchError::MalformedHeader { ref header }) if header == "@@ nonsense @@"
        ));
    }

    #[test]
    fn header_count_cannot_go_negative() {
        let result = updated_header("@@ -1,1 +1,0 @@\n", -1);
        assert!(matches!(result, Err(PatchError::MalformedHeader { .. })));
    }

    #[test]
    fn extract_first_hunk() {
        let diff = two_hunk_diff();
        let patch = extract_hunk(&diff, &[3, 10], 5).unwrap();
        assert_eq!(
            patch.as_str(),
            format!(
                "{HEADER}@@ -10,3 +10,4 @@ programs = {{\n     gtk.enable = true;\n-    gtk.theme.name = \"Adwaita\";\n-    gtk.iconTheme.name = \"Papirus\";\n+    gtk.iconTheme.name = \"Papirus-Dark\";\n+    gtk.cursorTheme.size = 24;\n+    gtk.font.size = 11;\n"
            )
        );
    }

    #[test]
    fn extract_last_hunk_runs_to_end_of_diff() {
        let diff = two_hunk_diff();
        let patch = extract_hunk(&diff, &[3, 10], 12).unwrap();
        assert_eq!(
            patch.as_str(),
            format!(
                "{HEADER}@@ -30,2 +31,3 @@ home = {{\n   username = \"me\";\n+  stateVersion = \"24.05\";\n   homeDirectory = \"/home/me\";\n"
            )
        );
    }

    #[test]
    fn extract_hunk_on_header_line_itself() {
        let diff = two_hunk_diff();
        let patch = extract_hunk(&diff, &[3, 10], 10).unwrap();
        assert!(patch.as_str().contains("@@ -30,2 +31,3 @@"));
        assert!(!patch.as_str().contains("@@ -10,3 +10,4 @@"));
    }

    #[test]
    fn extract_hunk_in_file_header_fails() {
        let diff = two_hunk_diff();
        let result = extract_hunk(&diff, &[3, 10], 1);
        assert!(matches!(result, Err(PatchError::MalformedPatch)));
    }

    #[test]
    fn extract_hunk_without_hunks_fails() {
        let result = extract_hunk("--- a/f\n+++ b/f\n", &[], 1);
        assert!(matches!(result, Err(PatchError::MalformedPatch)));
    }

    #[test]
    fn extract_hunk_past_end_fails() {
        let diff = two_hunk_diff();
        let result = extract_hunk(&diff, &[3, 10], 99);
        assert!(matches!(
            result,
            Err(PatchError::LineOutOfRange { index: 99, len: 14 })
        ));
    }

    #[test]
    fn extract_single_addition_keeps_header() {
        let diff = "--- a/f\n+++ b/f\nindex 1..2\n@@ -1,2 +1,3 @@\n a\n+b\n c\n";
        let patch = extract_line(diff, 5).unwrap();
        assert_eq!(patch.as_str(), diff);
    }

    #[test]
    fn extract_line_drops_other_additions() {
        let diff = "--- a/f\n+++ b/f\n@@ -1,2 +1,4 @@\n a\n+b\n+c\n d\n";
        let patch = extract_line(diff, 5).unwrap();
        assert_eq!(
            patch.as_str(),
            "--- a/f\n+++ b/f\n@@ -1,2 +1,3 @@\n a\n+c\n d\n"
        );
    }

    #[test]
    fn extract_line_demotes_other_removals() {
        let diff = two_hunk_diff();
        // Stage only "+    gtk.cursorTheme.size = 24;"
        let patch = extract_line(&diff, 8).unwrap();
        assert_eq!(
            patch.as_str(),
            format!(
                "{HEADER}@@ -10,3 +10,4 @@ programs = {{\n     gtk.enable = true;\n     gtk.theme.name = \"Adwaita\";\n     gtk.iconTheme.name = \"Papirus\";\n+    gtk.cursorTheme.size = 24;\n"
            )
        );
    }

    #[test]
    fn extract_line_for_removal() {
        let diff = two_hunk_diff();
        // Stage only "-    gtk.theme.name"; two other additions dropped, one removal demoted
        let patch = extract_line(&diff, 5).unwrap();
        assert_eq!(
            patch.as_str(),
            format!(
                "{HEADER}@@ -10,3 +10,2 @@ programs = {{\n     gtk.enable = true;\n-    gtk.theme.name = \"Adwaita\";\n     gtk.iconTheme.name = \"Papirus\";\n"
            )
        );
    }

    #[test]
    fn extract_line_stops_at_next_hunk() {
        let diff = two_hunk_diff();
        let patch = extract_line(&diff, 8).unwrap();
        assert!(!patch.as_str().contains("stateVersion"));
        assert_eq!(patch.as_str().matches("@@ -").count(), 1);
    }

    #[test]
    fn extract_line_in_last_hunk() {
        let diff = two_hunk_diff();
        let patch = extract_line(&diff, 12).unwrap();
        assert_eq!(
            patch.as_str(),
            format!(
                "{HEADER}@@ -30,2 +31,3 @@ home = {{\n   username = \"me\";\n+  stateVersion = \"24.05\";\n   homeDirectory = \"/home/me\";\n"
            )
        );
    }

    #[test]
    fn extract_line_in_file_header_fails() {
        let diff = two_hunk_diff();
        assert!(matches!(
            extract_line(&diff, 0),
            Err(PatchError::MalformedPatch)
        ));
    }

    #[test]
    fn extract_line_without_hunks_fails() {
        assert!(matches!(
            extract_line("--- a/f\n+++ b/f\n", 1),
            Err(PatchError::MalformedPatch)
        ));
    }

    #[test]
    fn extract_line_preserves_crlf() {
        let diff = "--- a/f\r\n+++ b/f\r\n@@ -1,1 +1,3 @@\r\n a\r\n+b\r\n+c\r\n";
        let patch = extract_line(diff, 5).unwrap();
        assert_eq!(
            patch.as_str(),
            "--- a/f\r\n+++ b/f\r\n@@ -1,1 +1,2 @@\r\n a\r\n+c\r\n"
        );
    }

    #[test]
    fn extract_line_terminates_unterminated_diff() {
        let diff = "--- a/f\n+++ b/f\n@@ -1 +1,2 @@\n a\n+b";
        let patch = extract_line(diff, 4).unwrap();
        assert_eq!(patch.as_str(), "--- a/f\n+++ b/f\n@@ -1 +1,2 @@\n a\n+b\n");
    }

    #[test]
    fn without_line_drops_target_addition_only() {
        let diff = two_hunk_diff();
        let patch = extract_hunk_without_line(&diff, 8).unwrap();
        assert_eq!(
            patch.as_str(),
            format!(
                "{HEADER}@@ -10,3 +10,3 @@ programs = {{\n     gtk.enable = true;\n-    gtk.theme.name = \"Adwaita\";\n-    gtk.iconTheme.name = \"Papirus\";\n+    gtk.iconTheme.name = \"Papirus-Dark\";\n+    gtk.font.size = 11;\n"
            )
        );
        assert!(!patch.is_empty());
    }

    #[test]
    fn without_line_demotes_target_removal_only() {
        let diff = two_hunk_diff();
        let patch = extract_hunk_without_line(&diff, 6).unwrap();
        assert_eq!(
            patch.as_str(),
            format!(
                "{HEADER}@@ -10,3 +10,5 @@ programs = {{\n     gtk.enable = true;\n-    gtk.theme.name = \"Adwaita\";\n     gtk.iconTheme.name = \"Papirus\";\n+    gtk.iconTheme.name = \"Papirus-Dark\";\n+    gtk.cursorTheme.size = 24;\n+    gtk.font.size = 11;\n"
            )
        );
    }

    #[test]
    fn without_only_change_is_empty() {
        let diff = two_hunk_diff();
        let patch = extract_hunk_without_line(&diff, 12).unwrap();
        assert_eq!(
            patch.as_str(),
            format!(
                "{HEADER}@@ -30,2 +31,2 @@ home = {{\n   username = \"me\";\n   homeDirectory = \"/home/me\";\n"
            )
        );
        assert!(patch.is_empty());
    }

    /// Old file "a\nb" without a final newline, new file "a\nb\nc\n"
    const UNTERMINATED_OLD: &str = "--- a/f\n+++ b/f\n@@ -1,2 +1,3 @@\n a\n-b\n\\ No newline at end of file\n+b\n+c\n";

    /// Old file "a\n", new file "a\nb\nc" without a final newline
    const UNTERMINATED_NEW: &str = "--- a/f\n+++ b/f\n@@ -1 +1,3 @@\n a\n+b\n+c\n\\ No newline at end of file\n";

    #[test]
    fn no_newline_marker_stays_with_its_removal() {
        let patch = extract_line(UNTERMINATED_OLD, 4).unwrap();
        assert_eq!(
            patch.as_str(),
            "--- a/f\n+++ b/f\n@@ -1,2 +1,1 @@\n a\n-b\n\\ No newline at end of file\n"
        );
    }

    #[test]
    fn addition_after_demoted_unterminated_line_is_rejected() {
        // Demoting "-b" keeps its marker, so "+c" would be glued onto "b"
        assert!(matches!(
            extract_line(UNTERMINATED_OLD, 7),
            Err(PatchError::UnterminatedLine { index: 4 })
        ));
        assert!(matches!(
            extract_line(UNTERMINATED_OLD, 6),
            Err(PatchError::UnterminatedLine { index: 4 })
        ));
        assert!(matches!(
            extract_hunk_without_line(UNTERMINATED_OLD, 4),
            Err(PatchError::UnterminatedLine { index: 4 })
        ));
    }

    #[test]
    fn demoted_unterminated_line_at_hunk_end_keeps_marker() {
        let diff = "--- a/f\n+++ b/f\n@@ -1,2 +1 @@\n a\n-b\n\\ No newline at end of file\n";
        let patch = extract_hunk_without_line(diff, 4).unwrap();
        assert_eq!(
            patch.as_str(),
            "--- a/f\n+++ b/f\n@@ -1,2 +1,2 @@\n a\n b\n\\ No newline at end of file\n"
        );
        assert!(patch.is_empty());
    }

    #[test]
    fn no_newline_marker_dropped_with_its_addition() {
        let patch = extract_line(UNTERMINATED_NEW, 4).unwrap();
        assert_eq!(
            patch.as_str(),
            "--- a/f\n+++ b/f\n@@ -1 +1,2 @@\n a\n+b\n"
        );
    }

    #[test]
    fn no_newline_marker_kept_with_staged_addition() {
        let patch = extract_line(UNTERMINATED_NEW, 5).unwrap();
        assert_eq!(
            patch.as_str(),
            "--- a/f\n+++ b/f\n@@ -1 +1,2 @@\n a\n+c\n\\ No newline at end of file\n"
        );
    }

    #[test]
    fn header_lines_do_not_count_as_changes() {
        let patch = SubPatch("--- a/f\n+++ b/f\n@@ -1,2 +1,2 @@\n a\n b\n".to_string());
        assert!(patch.is_empty());
    }

    #[test]
    fn patch_without_hunk_header_is_empty() {
        let patch = SubPatch("--- a/f\n+++ b/f\n".to_string());
        assert!(patch.is_empty());
    }
}
