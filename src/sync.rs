//! Per-checkout update with automatic conflict resolution.
//!
//! [`sync`] brings one checkout up to date with its upstream branch:
//! - Reapplies the most recent stash, if any
//! - Discards (force) or stashes (conservative) local modifications
//! - Pulls with rebase
//! - On conflict, hard-resets to upstream (force) or retries the rebase
//!   favoring upstream changes, aborting if that fails too
//!
//! Failures never propagate as errors. They end up as [`Issue`]s in the
//! returned [`SyncOutcome`] so the caller can move on to the next checkout.

use crate::config::SyncPolicy;
use crate::constants::GIT_DIR;
use crate::git::{self, GitError, GitLogger};
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// A directory believed to hold a git checkout.
#[derive(Debug, Clone)]
pub struct SyncTarget {
    path: PathBuf,
    has_vcs_metadata: bool,
}

impl SyncTarget {
    /// Checks for git metadata once, at construction.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        // `.git` may be a file for submodules and worktrees.
        let has_vcs_metadata = path.join(GIT_DIR).exists();
        Self {
            path,
            has_vcs_metadata,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn has_vcs_metadata(&self) -> bool {
        self.has_vcs_metadata
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IssueKind {
    StashApplyFailed,
    UnresolvedConflicts,
    ResetFailed,
    TimedOut,
    Cancelled,
    CommandUnavailable,
}

/// Something about one checkout that needs a human.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Issue {
    pub kind: IssueKind,
    pub path: PathBuf,
    pub message: String,
}

impl Issue {
    fn new(kind: IssueKind, path: &Path, message: String) -> Self {
        Self {
            kind,
            path: path.to_path_buf(),
            message,
        }
    }

    pub fn stash_apply_failed(path: &Path) -> Self {
        Self::new(
            IssueKind::StashApplyFailed,
            path,
            format!("Failed to apply stashed changes in {}", path.display()),
        )
    }

    pub fn unresolved_conflicts(path: &Path) -> Self {
        Self::new(
            IssueKind::UnresolvedConflicts,
            path,
            format!(
                "Unable to resolve conflicts in {}. Manual intervention required.",
                path.display()
            ),
        )
    }

    pub fn reset_failed(path: &Path) -> Self {
        Self::new(
            IssueKind::ResetFailed,
            path,
            format!(
                "Unable to reset {} to its upstream branch. Manual intervention required.",
                path.display()
            ),
        )
    }

    pub fn timed_out(path: &Path, command: &str, timeout: Duration) -> Self {
        Self::new(
            IssueKind::TimedOut,
            path,
            format!(
                "Timed out after {:?} running `git {}` in {}",
                timeout,
                command,
                path.display()
            ),
        )
    }

    pub fn cancelled(path: &Path) -> Self {
        Self::new(
            IssueKind::Cancelled,
            path,
            format!("Update of {} was cancelled", path.display()),
        )
    }

    pub fn command_unavailable(path: &Path, error: &GitError) -> Self {
        Self::new(
            IssueKind::CommandUnavailable,
            path,
            format!("Could not run git in {}: {}", path.display(), error),
        )
    }
}

impl fmt::Display for Issue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

/// Result of syncing one checkout. No issues means success.
#[derive(Debug, Clone)]
pub struct SyncOutcome {
    pub path: PathBuf,
    pub issues: Vec<Issue>,
}

impl SyncOutcome {
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.issues.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncStep {
    Skipped,
    ApplyingStash,
    DiscardingChanges,
    DiscardFailed,
    StashingChanges,
    StashFailed,
    Pulling,
    ResolvingConflicts,
    ForceResetting,
    RebasingFavoringUpstream,
    AbortingRebase,
    Completed,
}

/// Observer for sync progress. Never influences control flow.
pub trait SyncCallbacks {
    fn on_step(&self, target: &SyncTarget, step: &SyncStep);

    fn on_complete(&self, _outcome: &SyncOutcome) {}
}

/// Remaining steps are skipped; the reason is already recorded as an issue.
struct Halt;

struct Syncer<'a, C: ?Sized> {
    target: &'a SyncTarget,
    policy: &'a SyncPolicy,
    callbacks: &'a C,
    log: GitLogger,
    issues: Vec<Issue>,
}

/// Synchronizes `target` with its upstream according to `policy`.
pub fn sync<C>(target: &SyncTarget, policy: &SyncPolicy, callbacks: &C) -> SyncOutcome
where
    C: SyncCallbacks + ?Sized,
{
    let mut syncer = Syncer {
        target,
        policy,
        callbacks,
        log: policy.git_logger(),
        issues: Vec::new(),
    };

    if !target.has_vcs_metadata() {
        syncer.step(SyncStep::Skipped);
    } else {
        if syncer.execute().is_err() {
            syncer.cleanup_after_halt();
        }
        if syncer.issues.is_empty() {
            syncer.step(SyncStep::Completed);
        }
    }

    let outcome = SyncOutcome {
        path: target.path().to_path_buf(),
        issues: syncer.issues,
    };
    callbacks.on_complete(&outcome);
    outcome
}

impl<C> Syncer<'_, C>
where
    C: SyncCallbacks + ?Sized,
{
    fn step(&self, step: SyncStep) {
        self.callbacks.on_step(self.target, &step);
    }

    fn path(&self) -> &Path {
        self.target.path()
    }

    /// Runs one git operation, honoring cancellation first.
    ///
    /// A plain non-zero exit maps to `T::default()` (false, None, empty);
    /// timeouts and spawn failures become issues and halt the sync.
    fn run<T, F>(&mut self, op: F) -> Result<T, Halt>
    where
        T: Default,
        F: FnOnce(&Path, &SyncPolicy, GitLogger) -> Result<T, GitError>,
    {
        if self.policy.cancel.is_cancelled() {
            self.issues.push(Issue::cancelled(self.target.path()));
            return Err(Halt);
        }
        match op(self.target.path(), self.policy, self.log) {
            Ok(value) => Ok(value),
            Err(GitError::TimedOut { command, timeout }) => {
                let issue = Issue::timed_out(self.target.path(), &command, timeout);
                self.issues.push(issue);
                Err(Halt)
            }
            Err(err @ (GitError::Spawn(_) | GitError::Wait(_))) => {
                let issue = Issue::command_unavailable(self.target.path(), &err);
                self.issues.push(issue);
                Err(Halt)
            }
            Err(GitError::Failed { .. } | GitError::InvalidRef(_)) => Ok(T::default()),
        }
    }

    fn execute(&mut self) -> Result<(), Halt> {
        let stashes = self.run(git::list_stashes)?;
        if !stashes.is_empty() {
            self.step(SyncStep::ApplyingStash);
            if !self.run(git::apply_stash)? {
                self.issues.push(Issue::stash_apply_failed(self.target.path()));
            }
        }

        if self.run(git::has_local_changes)? {
            if self.policy.force {
                self.step(SyncStep::DiscardingChanges);
                if !self.run(git::discard_local_changes)? {
                    self.step(SyncStep::DiscardFailed);
                }
            } else {
                self.step(SyncStep::StashingChanges);
                if !self.run(git::stash_local_changes)? {
                    self.step(SyncStep::StashFailed);
                }
            }
        }

        self.step(SyncStep::Pulling);
        if self.run(git::pull_rebase)? {
            return Ok(());
        }

        self.step(SyncStep::ResolvingConflicts);
        self.abort_pending_rebase()?;
        if self.policy.force {
            self.reset_to_upstream()
        } else {
            self.rebase_favoring_upstream()
        }
    }

    fn reset_to_upstream(&mut self) -> Result<(), Halt> {
        self.step(SyncStep::ForceResetting);
        self.run(git::fetch_all)?;
        let reset = match self.run(git::resolve_upstream)? {
            Some(upstream) => {
                self.run(|repo, policy, log| git::reset_hard_to(repo, policy, &upstream, log))?
            }
            None => false,
        };
        if !reset {
            self.issues.push(Issue::reset_failed(self.target.path()));
        }
        Ok(())
    }

    fn rebase_favoring_upstream(&mut self) -> Result<(), Halt> {
        self.step(SyncStep::RebasingFavoringUpstream);
        let rebased = match self.run(git::resolve_upstream)? {
            Some(upstream) => self.run(|repo, policy, log| {
                git::rebase_favoring_upstream(repo, policy, &upstream, log)
            })?,
            None => false,
        };
        if !rebased {
            self.issues.push(Issue::unresolved_conflicts(self.target.path()));
            self.abort_pending_rebase()?;
        }
        Ok(())
    }

    fn abort_pending_rebase(&mut self) -> Result<(), Halt> {
        if self.run(git::rebase_in_progress)? {
            self.step(SyncStep::AbortingRebase);
            self.run(git::abort_rebase)?;
        }
        Ok(())
    }

    /// Best effort: leave no rebase behind after a halt, ignoring cancellation.
    fn cleanup_after_halt(&self) {
        if let Ok(true) = git::rebase_in_progress(self.path(), self.policy, self.log) {
            self.step(SyncStep::AbortingRebase);
            let _ = git::abort_rebase(self.path(), self.policy, self.log);
        }
    }
}
