//! The active state of the staging panel: one file's diff, its line tables,
//! and a cursor over the stageable lines.
//!
//! The cursor is a position in [`StagingSession::stageable_lines`], not a line
//! of text, so it survives the diff being re-fetched after every stage or
//! unstage. Sessions are never patched up in place after a mutation; the
//! caller re-fetches the diff and builds a new one (see
//! [`crate::panel::StagingPanel::refresh`]).

use crate::apply::{ApplyError, ApplyMode, PatchApplier};
use crate::cycle::{self, Bound, Direction};
use crate::diff::DiffIndex;
use crate::patch::{self, PatchError, SubPatch};
use error_set::error_set;

error_set! {
    /// Errors from staging or unstaging the selection
    StageError := {
        PatchError(PatchError),
        ApplyError(ApplyError),
    }
}

/// How much of the diff a stage or unstage acts on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    /// Only the selected `+`/`-` line
    Line,
    /// The whole hunk containing the selected line
    Hunk,
}

/// Result of an unstage whose patches were built and whose first
/// (reverting) apply succeeded.
#[must_use]
#[derive(Debug)]
pub enum UnstageOutcome {
    /// The selection is no longer among the pending changes
    Unstaged,
    /// Re-applying the rest of the hunk failed, and the original hunk was put
    /// back; nothing changed overall
    RolledBack { cause: ApplyError },
    /// Re-applying the rest of the hunk failed and so did putting the original
    /// hunk back. The working tree matches neither the old nor the new state.
    RollbackFailed {
        cause: ApplyError,
        rollback: ApplyError,
    },
}

impl UnstageOutcome {
    /// True when the repository was left in an unknown state
    pub fn is_fatal(&self) -> bool {
        matches!(self, UnstageOutcome::RollbackFailed { .. })
    }
}

/// Which lines of the diff should be on screen for the current selection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FocusRegion {
    /// First line to show
    pub top: usize,
    /// Last line to show (inclusive)
    pub bottom: usize,
    /// The selected line, to be highlighted
    pub selected: usize,
}

/// Rendering hint for whoever draws a [`FocusRegion`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ViewHint {
    pub highlight: bool,
    pub wrap: bool,
}

impl FocusRegion {
    pub fn hint(&self) -> ViewHint {
        ViewHint {
            highlight: true,
            wrap: false,
        }
    }
}

/// Lines kept visible below the cursor when a hunk is taller than the view
const TRAILING_CONTEXT: usize = 3;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagingSession {
    diff: String,
    hunk_starts: Vec<usize>,
    stageable_lines: Vec<usize>,
    selected: usize,
}

impl StagingSession {
    /// Build a session over `diff`, or `None` if nothing in it is stageable.
    ///
    /// `previous_selection` is the cursor of the session this one replaces; it
    /// is kept where possible and clamped to the last stageable line otherwise.
    pub fn new(diff: String, index: DiffIndex, previous_selection: Option<usize>) -> Option<Self> {
        let last = index.stageable_lines.len().checked_sub(1)?;
        let selected = previous_selection.map_or(0, |previous| previous.min(last));

        Some(Self {
            diff,
            hunk_starts: index.hunk_starts,
            stageable_lines: index.stageable_lines,
            selected,
        })
    }

    pub fn diff(&self) -> &str {
        &self.diff
    }

    pub fn hunk_starts(&self) -> &[usize] {
        &self.hunk_starts
    }

    pub fn stageable_lines(&self) -> &[usize] {
        &self.stageable_lines
    }

    /// Cursor position within [`Self::stageable_lines`]
    pub fn selected(&self) -> usize {
        self.selected
    }

    /// Line index in the diff text under the cursor
    pub fn selected_line(&self) -> usize {
        self.stageable_lines[self.selected]
    }

    pub fn line_count(&self) -> usize {
        self.diff.split_inclusive('\n').count()
    }

    /// Move the cursor to `position`; `None` (and no move) if out of range.
    pub fn select(&mut self, position: usize) -> Option<usize> {
        (position < self.stageable_lines.len()).then(|| {
            self.selected = position;
            position
        })
    }

    /// Move to the next or previous stageable line, wrapping at either end.
    pub fn cycle_line(&mut self, direction: Direction) {
        let line = self.selected_line();
        let next = match direction {
            Direction::Forward => cycle::next_index(&self.stageable_lines, &line),
            Direction::Backward => cycle::prev_index(&self.stageable_lines, &line),
        };
        if let Some(next) = next {
            self.selected = next;
        }
    }

    /// Move to the first stageable line of the next or previous hunk, wrapping.
    pub fn cycle_hunk(&mut self, direction: Direction) {
        let line = self.selected_line();
        let Some(current) = cycle::cyclic_index(
            &self.hunk_starts,
            &line,
            Direction::Backward,
            Bound::Inclusive,
        ) else {
            return;
        };

        let hunks = self.hunk_starts.len();
        let target = match direction {
            Direction::Forward => (current.index + 1) % hunks,
            Direction::Backward => (current.index + hunks - 1) % hunks,
        };

        if let Some(first) = cycle::cyclic_index(
            &self.stageable_lines,
            &self.hunk_starts[target],
            Direction::Forward,
            Bound::Inclusive,
        ) {
            self.selected = first.index;
        }
    }

    /// Work out what to show for the selected line.
    ///
    /// Ideally the whole hunk is visible, starting at its header (or at the
    /// top of the file for the first hunk, so the file name shows). When the
    /// hunk is taller than `viewport_height`, the bottom is pulled up to a few
    /// lines past the cursor instead.
    pub fn focus_region(&self, viewport_height: usize) -> FocusRegion {
        let line = self.selected_line();
        let last_line = self.line_count().saturating_sub(1);

        let mut bottom = match cycle::cyclic_index(
            &self.hunk_starts,
            &line,
            Direction::Forward,
            Bound::Exclusive,
        ) {
            Some(next) if !next.wrapped => self.hunk_starts[next.index].saturating_sub(1),
            _ => last_line,
        };

        let top = match cycle::cyclic_index(
            &self.hunk_starts,
            &line,
            Direction::Backward,
            Bound::Inclusive,
        ) {
            Some(current) if current.index > 0 && !current.wrapped => {
                self.hunk_starts[current.index]
            }
            _ => 0,
        };

        if bottom.saturating_sub(top) > viewport_height {
            bottom = (line + TRAILING_CONTEXT).min(last_line);
        }

        FocusRegion {
            top,
            bottom,
            selected: line,
        }
    }

    fn build(&self, scope: Scope) -> Result<SubPatch, PatchError> {
        let line = self.selected_line();
        match scope {
            Scope::Line => patch::extract_line(&self.diff, line),
            Scope::Hunk => patch::extract_hunk(&self.diff, &self.hunk_starts, line),
        }
    }

    /// Add the selected line or hunk to the index.
    ///
    /// Nothing has been touched when this fails. On success the caller should
    /// re-fetch the diff and rebuild the session.
    pub fn stage<A>(&self, scope: Scope, applier: &mut A) -> Result<(), StageError>
    where
        A: PatchApplier + ?Sized,
    {
        let patch = self.build(scope)?;
        log::debug!(
            "Staging {scope:?} at line {}:\n{patch}",
            self.selected_line()
        );
        applier.apply_patch(&patch, ApplyMode::STAGE)?;
        Ok(())
    }

    /// Take the selected line or hunk out of the pending changes.
    ///
    /// The whole hunk is reverted first. For a single line, the hunk minus
    /// that line is then re-applied; if that fails the original hunk is
    /// re-applied so the net effect is nil. An `Err` means nothing changed;
    /// see [`UnstageOutcome`] for everything past the first apply.
    pub fn unstage<A>(&self, scope: Scope, applier: &mut A) -> Result<UnstageOutcome, StageError>
    where
        A: PatchApplier + ?Sized,
    {
        let line = self.selected_line();
        let hunk = patch::extract_hunk(&self.diff, &self.hunk_starts, line)?;
        let without_line = patch::extract_hunk_without_line(&self.diff, line)?;

        log::debug!("Reverting hunk around line {line}:\n{hunk}");
        applier.apply_patch(&hunk, ApplyMode::REVERT)?;

        if scope == Scope::Hunk || without_line.is_empty() {
            return Ok(UnstageOutcome::Unstaged);
        }

        log::debug!("Restoring hunk without line {line}:\n{without_line}");
        let Err(cause) = applier.apply_patch(&without_line, ApplyMode::RESTORE) else {
            return Ok(UnstageOutcome::Unstaged);
        };

        log::warn!("Restoring hunk without line {line} failed ({cause}), re-applying original hunk");
        match applier.apply_patch(&hunk, ApplyMode::RESTORE) {
            Ok(()) => Ok(UnstageOutcome::RolledBack { cause }),
            Err(rollback) => {
                log::error!(
                    "Could not re-apply original hunk around line {line}: {rollback}; working tree is in an unknown state"
                );
                Ok(UnstageOutcome::RollbackFailed { cause, rollback })
            }
        }
    }
}
