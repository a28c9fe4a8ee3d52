use crate::patch::SubPatch;
use error_set::error_set;

error_set! {
    /// A patch was rejected by whatever applies it
    ApplyError := {
        #[display("Patch did not apply: {message}")]
        ApplyFailed { message: String },
    }
}

/// How a patch is applied: forwards or in reverse, and to which tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ApplyMode {
    /// Undo the patch instead of applying it
    pub reverse: bool,
    /// Touch only the index, leaving the working tree alone
    pub index_only: bool,
}

impl ApplyMode {
    /// Add a change to the index
    pub const STAGE: Self = Self {
        reverse: false,
        index_only: true,
    };
    /// Take a whole hunk back out of the working tree
    pub const REVERT: Self = Self {
        reverse: true,
        index_only: false,
    };
    /// Put a (possibly trimmed) hunk back into the working tree
    pub const RESTORE: Self = Self {
        reverse: false,
        index_only: false,
    };
}

/// Applies sub-patches to a repository.
pub trait PatchApplier {
    /// Apply `patch` in the given mode, blocking until it is done.
    fn apply_patch(&mut self, patch: &SubPatch, mode: ApplyMode) -> Result<(), ApplyError>;
}
