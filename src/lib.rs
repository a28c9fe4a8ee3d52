use error_set::error_set;

pub mod apply;
pub mod cycle;
pub mod diff;
pub mod git;
pub mod panel;
pub mod patch;
pub mod session;
pub mod view;

pub use apply::{ApplyError, ApplyMode, PatchApplier};
pub use cycle::Direction;
pub use git::{Git, GitCommandError};
pub use panel::StagingPanel;
pub use patch::{PatchError, SubPatch};
pub use session::{FocusRegion, Scope, StageError, StagingSession, UnstageOutcome};

error_set! {
    /// Top-level error for git-line-stager operations
    GitStagerError := {
        #[display("No unstaged changes in {file}")]
        NoChanges { file: String },
        #[display("Selection {position} is out of range ({len} stageable lines)")]
        InvalidSelection { position: usize, len: usize },
        /// The working tree is in neither the old nor the new state; fatal
        #[display("Unstaging failed ({cause}) and restoring the original hunk also failed ({rollback}); check the working tree by hand")]
        RollbackFailed { cause: String, rollback: String },
        /// The patch went in but the new diff could not be read back
        #[display("Changes were applied, but re-reading the diff failed: {message}")]
        Refresh { message: String },
        PatchError(PatchError),
        StageError(StageError),
        GitCommandError(GitCommandError),
    }
}

/// Main interface for git-line-stager operations on one file
pub struct GitStager<'a> {
    git: Git<'a>,
    file: String,
    panel: StagingPanel,
}

impl<'a> GitStager<'a> {
    /// Open the staging panel for `file` in the repository at `repo_path`
    ///
    /// # Examples
    /// ```no_run
    /// # use git_line_stager::{GitStager, Scope};
    /// let mut stager = GitStager::open(".", "flake.nix").unwrap();
    /// stager.select(2).unwrap();
    /// stager.stage(Scope::Line).unwrap();
    /// ```
    ///
    /// # Errors
    ///
    /// [`GitStagerError::NoChanges`] if the file has nothing stageable, or any
    /// error from fetching and indexing its diff.
    pub fn open(repo_path: &'a str, file: impl Into<String>) -> Result<Self, GitStagerError> {
        let mut stager = Self {
            git: Git::new(repo_path),
            file: file.into(),
            panel: StagingPanel::Empty,
        };
        stager.refresh()?;

        if !stager.panel.is_active() {
            return Err(GitStagerError::NoChanges { file: stager.file });
        }

        Ok(stager)
    }

    pub fn file(&self) -> &str {
        &self.file
    }

    pub fn panel(&self) -> &StagingPanel {
        &self.panel
    }

    pub fn session(&self) -> Option<&StagingSession> {
        self.panel.session()
    }

    /// For cursor movement; see [`StagingSession::cycle_line`] and friends
    pub fn session_mut(&mut self) -> Option<&mut StagingSession> {
        self.panel.session_mut()
    }

    /// Re-fetch the file's diff and rebuild the panel from it
    pub fn refresh(&mut self) -> Result<(), GitStagerError> {
        let diff = self.git.unstaged_diff(&self.file)?;
        self.panel.refresh(&diff)?;
        Ok(())
    }

    /// Close the panel
    pub fn escape(&mut self) {
        self.panel.escape();
    }

    /// Put the cursor on the `position`-th stageable line
    pub fn select(&mut self, position: usize) -> Result<(), GitStagerError> {
        let session = self
            .panel
            .session_mut()
            .ok_or_else(|| no_changes(&self.file))?;
        let len = session.stageable_lines().len();

        session
            .select(position)
            .map(|_| ())
            .ok_or(GitStagerError::InvalidSelection { position, len })
    }

    /// Stage the selected line or hunk, then refresh.
    ///
    /// If the refresh fails the index has still changed: the error is
    /// [`GitStagerError::Refresh`] and the panel is closed.
    pub fn stage(&mut self, scope: Scope) -> Result<(), GitStagerError> {
        let session = self.panel.session().ok_or_else(|| no_changes(&self.file))?;
        session.stage(scope, &mut self.git)?;
        self.refresh_after_apply()
    }

    /// Unstage the selected line or hunk, then refresh.
    ///
    /// A failed rollback is reported as [`GitStagerError::RollbackFailed`],
    /// which callers must treat as fatal. A failed refresh afterwards is
    /// [`GitStagerError::Refresh`], as for [`Self::stage`].
    pub fn unstage(&mut self, scope: Scope) -> Result<(), GitStagerError> {
        let session = self.panel.session().ok_or_else(|| no_changes(&self.file))?;

        match session.unstage(scope, &mut self.git)? {
            UnstageOutcome::Unstaged => self.refresh_after_apply(),
            UnstageOutcome::RolledBack { cause } => Err(StageError::ApplyError(cause).into()),
            UnstageOutcome::RollbackFailed { cause, rollback } => {
                Err(GitStagerError::RollbackFailed {
                    cause: cause.to_string(),
                    rollback: rollback.to_string(),
                })
            }
        }
    }

    fn refresh_after_apply(&mut self) -> Result<(), GitStagerError> {
        let refreshed = self.refresh();
        settle(&mut self.panel, refreshed)
    }
}

/// The working tree or index already changed, so a stale diff must not stay up
fn settle(
    panel: &mut StagingPanel,
    refreshed: Result<(), GitStagerError>,
) -> Result<(), GitStagerError> {
    refreshed.map_err(|error| {
        log::warn!("Re-reading the diff after applying failed: {error}");
        panel.escape();
        GitStagerError::Refresh {
            message: error.to_string(),
        }
    })
}

fn no_changes(file: &str) -> GitStagerError {
    GitStagerError::NoChanges {
        file: file.to_string(),
    }
}
