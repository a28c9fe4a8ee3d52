//! Running git: fetching a file's unstaged diff and applying sub-patches.

use crate::apply::{ApplyError, ApplyMode, PatchApplier};
use crate::patch::SubPatch;
use error_set::error_set;
use std::io::Write;
use std::process::{Command, Stdio};

error_set! {
    /// Errors from git command execution
    GitCommandError := {
        #[display("Failed to run git diff: {message}")]
        DiffFailed { message: String },
        #[display("git diff failed: {stderr}")]
        DiffExitError { stderr: String },
        #[display("Invalid UTF-8 in git diff output: {message}")]
        InvalidUtf8 { message: String },
        #[display("Failed to spawn git apply: {message}")]
        ApplySpawnFailed { message: String },
        #[display("Failed to get stdin handle for git apply")]
        ApplyStdinFailed,
        #[display("Failed to write patch to git apply: {message}")]
        ApplyWriteFailed { message: String },
        #[display("Failed to wait for git apply: {message}")]
        ApplyWaitFailed { message: String },
        #[display("git apply failed: {stderr}")]
        ApplyExitError { stderr: String },
    }
}

/// A git repository driven through the `git` binary
#[derive(Debug, Clone, Copy)]
pub struct Git<'a> {
    repo_path: &'a str,
}

impl<'a> Git<'a> {
    pub fn new(repo_path: &'a str) -> Self {
        Self { repo_path }
    }

    /// Unstaged changes (working tree against index) for one file.
    ///
    /// Empty when the file has no unstaged changes.
    pub fn unstaged_diff(&self, file: &str) -> Result<String, GitCommandError> {
        let output = Command::new("git")
            .args([
                "-C",
                self.repo_path,
                "diff",
                "--no-ext-diff",
                "--no-color",
                "--",
                file,
            ])
            .output()
            .map_err(|e| GitCommandError::DiffFailed {
                message: e.to_string(),
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(GitCommandError::DiffExitError {
                stderr: stderr.into_owned(),
            });
        }

        String::from_utf8(output.stdout).map_err(|e| GitCommandError::InvalidUtf8 {
            message: e.to_string(),
        })
    }

    fn apply_args(&self, mode: ApplyMode) -> Vec<&'a str> {
        let mut args = vec!["-C", self.repo_path, "apply"];
        if mode.index_only {
            args.push("--cached");
        }
        if mode.reverse {
            args.push("--reverse");
        }
        args.push("-");
        args
    }

    /// Pipe a patch into `git apply`
    fn run_apply(&self, patch: &str, mode: ApplyMode) -> Result<(), GitCommandError> {
        let mut child = Command::new("git")
            .args(self.apply_args(mode))
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| GitCommandError::ApplySpawnFailed {
                message: e.to_string(),
            })?;

        child
            .stdin
            .take()
            .ok_or(GitCommandError::ApplyStdinFailed)?
            .write_all(patch.as_bytes())
            .map_err(|e| GitCommandError::ApplyWriteFailed {
                message: e.to_string(),
            })?;

        let output = child
            .wait_with_output()
            .map_err(|e| GitCommandError::ApplyWaitFailed {
                message: e.to_string(),
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(GitCommandError::ApplyExitError {
                stderr: stderr.trim_end().to_string(),
            });
        }

        Ok(())
    }
}

impl PatchApplier for Git<'_> {
    fn apply_patch(&mut self, patch: &SubPatch, mode: ApplyMode) -> Result<(), ApplyError> {
        log::debug!("git apply {mode:?} in {}", self.repo_path);
        self.run_apply(patch.as_str(), mode)
            .map_err(|e| ApplyError::ApplyFailed {
                message: e.to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use similar_asserts::assert_eq;

    #[test]
    fn stage_applies_to_index_only() {
        let git = Git::new("/repo");
        assert_eq!(
            git.apply_args(ApplyMode::STAGE),
            vec!["-C", "/repo", "apply", "--cached", "-"]
        );
    }

    #[test]
    fn revert_applies_reverse_to_working_tree() {
        let git = Git::new("/repo");
        assert_eq!(
            git.apply_args(ApplyMode::REVERT),
            vec!["-C", "/repo", "apply", "--reverse", "-"]
        );
    }

    #[test]
    fn restore_applies_forward_to_working_tree() {
        let git = Git::new("/repo");
        assert_eq!(
            git.apply_args(ApplyMode::RESTORE),
            vec!["-C", "/repo", "apply", "-"]
        );
    }

    #[test]
    fn cached_reverse_combines_flags() {
        let git = Git::new(".");
        let mode = ApplyMode {
            reverse: true,
            index_only: true,
        };
        assert_eq!(
            git.apply_args(mode),
            vec!["-C", ".", "apply", "--cached", "--reverse", "-"]
        );
    }
}
