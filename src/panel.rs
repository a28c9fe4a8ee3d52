use crate::diff::parse_diff;
use crate::patch::PatchError;
use crate::session::StagingSession;

/// The staging panel: either showing a file's diff or closed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum StagingPanel {
    #[default]
    Empty,
    Active(StagingSession),
}

impl StagingPanel {
    /// Replace the session with one built from a freshly fetched diff.
    ///
    /// An empty or near-empty diff (the file has no unstaged changes left), or
    /// one with nothing stageable, closes the panel. Otherwise the cursor of
    /// the previous session is carried over, clamped to the new line count.
    ///
    /// # Errors
    ///
    /// Returns [`PatchError::MalformedPatch`] if the diff has no hunks; the
    /// panel is left as it was.
    pub fn refresh(&mut self, diff: &str) -> Result<(), PatchError> {
        if diff.lines().count() < 2 {
            self.escape();
            return Ok(());
        }

        let index = parse_diff(diff)?;
        let previous = self.session().map(StagingSession::selected);

        *self = match StagingSession::new(diff.to_string(), index, previous) {
            Some(session) => StagingPanel::Active(session),
            None => StagingPanel::Empty,
        };

        Ok(())
    }

    /// Close the panel.
    pub fn escape(&mut self) {
        *self = StagingPanel::Empty;
    }

    pub fn is_active(&self) -> bool {
        matches!(self, StagingPanel::Active(_))
    }

    pub fn session(&self) -> Option<&StagingSession> {
        match self {
            StagingPanel::Active(session) => Some(session),
            StagingPanel::Empty => None,
        }
    }

    pub fn session_mut(&mut self) -> Option<&mut StagingSession> {
        match self {
            StagingPanel::Active(session) => Some(session),
            StagingPanel::Empty => None,
        }
    }
}
