//! Git command wrappers.
//!
//! This module provides a thin wrapper around git CLI commands, handling
//! command execution, per-invocation deadlines and error formatting.
//! Every function takes the repository path explicitly; nothing here
//! depends on the process working directory.

use crate::config::SyncPolicy;
use crate::constants::{DEFAULT_REMOTE, PROCESS_POLL_MS};
use colored::Colorize;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use thiserror::Error;

/// Callback invoked with every git command before it runs.
pub type GitLogger = fn(&Path, &[&str]);

/// Prints each git command as it runs (verbose mode).
pub fn verbose_logger(repo: &Path, args: &[&str]) {
    eprintln!(
        "    {} {} {}",
        "$ git".dimmed(),
        args.join(" ").dimmed(),
        format!("[{}]", repo.display()).dimmed()
    );
}

pub fn no_op_logger(_repo: &Path, _args: &[&str]) {}

#[derive(Debug, Error)]
pub enum GitError {
    #[error("Failed to spawn git command: {0}")]
    Spawn(#[source] std::io::Error),

    #[error("Failed to wait for git command: {0}")]
    Wait(#[source] std::io::Error),

    #[error("git {command} timed out after {timeout:?}")]
    TimedOut { command: String, timeout: Duration },

    #[error("git {command} failed: {stderr}")]
    Failed { command: String, stderr: String },

    #[error("Invalid ref name: {0:?}")]
    InvalidRef(String),
}

/// Exit status and captured streams of one git invocation.
#[derive(Debug)]
pub struct GitOutput {
    pub success: bool,
    pub stdout: String,
    pub stderr: String,
}

/// Runs git in `repo`, killing it once `policy.git_timeout` elapses.
///
/// A non-zero exit is not an error here; callers branch on `success`.
pub fn execute(repo: &Path, policy: &SyncPolicy, args: &[&str]) -> Result<GitOutput, GitError> {
    let mut child = Command::new("git")
        .current_dir(repo)
        .args(args)
        .env("GIT_TERMINAL_PROMPT", "0")
        .env("GIT_EDITOR", "true")
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(GitError::Spawn)?;

    let stdout = child.stdout.take().map(spawn_reader);
    let stderr = child.stderr.take().map(spawn_reader);

    let deadline = Instant::now() + policy.git_timeout;
    let status = loop {
        match child.try_wait().map_err(GitError::Wait)? {
            Some(status) => break status,
            None if Instant::now() >= deadline => {
                // Readers are left detached: a grandchild may still hold the pipes.
                let _ = child.kill();
                let _ = child.wait();
                return Err(GitError::TimedOut {
                    command: args.join(" "),
                    timeout: policy.git_timeout,
                });
            }
            None => thread::sleep(Duration::from_millis(PROCESS_POLL_MS)),
        }
    };

    Ok(GitOutput {
        success: status.success(),
        stdout: join_reader(stdout),
        stderr: join_reader(stderr),
    })
}

fn spawn_reader<R: Read + Send + 'static>(mut source: R) -> JoinHandle<String> {
    thread::spawn(move || {
        let mut buf = Vec::new();
        let _ = source.read_to_end(&mut buf);
        String::from_utf8_lossy(&buf).into_owned()
    })
}

fn join_reader(handle: Option<JoinHandle<String>>) -> String {
    handle.and_then(|h| h.join().ok()).unwrap_or_default()
}

/// Runs git and returns trimmed stdout, failing on a non-zero exit.
pub fn run_git(repo: &Path, policy: &SyncPolicy, args: &[&str]) -> anyhow::Result<String> {
    let output = execute(repo, policy, args)?;
    if output.success {
        Ok(output.stdout.trim().to_string())
    } else {
        Err(GitError::Failed {
            command: args.join(" "),
            stderr: output.stderr.trim().to_string(),
        }
        .into())
    }
}

fn succeeds(
    repo: &Path,
    policy: &SyncPolicy,
    args: &[&str],
    log: GitLogger,
) -> Result<bool, GitError> {
    log(repo, args);
    execute(repo, policy, args).map(|output| output.success)
}

fn query(
    repo: &Path,
    policy: &SyncPolicy,
    args: &[&str],
    log: GitLogger,
) -> Result<Option<String>, GitError> {
    log(repo, args);
    let output = execute(repo, policy, args)?;
    let value = output.stdout.trim();
    if output.success && !value.is_empty() {
        Ok(Some(value.to_string()))
    } else {
        Ok(None)
    }
}

fn validate_ref_name(name: &str) -> Result<(), GitError> {
    let invalid = name.is_empty()
        || name.starts_with('-')
        || name.contains("..")
        || name.chars().any(|c| c.is_control() || c.is_whitespace());
    if invalid {
        return Err(GitError::InvalidRef(name.to_string()));
    }
    Ok(())
}

/// Lists stash entries, most recent first. A failing listing counts as empty.
pub fn list_stashes(repo: &Path, policy: &SyncPolicy, log: GitLogger) -> Result<Vec<String>, GitError> {
    Ok(query(repo, policy, &["stash", "list"], log)?
        .map(|out| out.lines().map(str::to_string).collect())
        .unwrap_or_default())
}

/// Reapplies the most recent stash, keeping it on the stack.
pub fn apply_stash(repo: &Path, policy: &SyncPolicy, log: GitLogger) -> Result<bool, GitError> {
    succeeds(repo, policy, &["stash", "apply"], log)
}

/// True when tracked files differ from HEAD. Untracked files are ignored.
pub fn has_local_changes(repo: &Path, policy: &SyncPolicy, log: GitLogger) -> Result<bool, GitError> {
    succeeds(repo, policy, &["diff", "--quiet", "HEAD"], log).map(|clean| !clean)
}

pub fn discard_local_changes(
    repo: &Path,
    policy: &SyncPolicy,
    log: GitLogger,
) -> Result<bool, GitError> {
    succeeds(repo, policy, &["reset", "--hard", "HEAD"], log)
}

pub fn stash_local_changes(
    repo: &Path,
    policy: &SyncPolicy,
    log: GitLogger,
) -> Result<bool, GitError> {
    succeeds(repo, policy, &["stash"], log)
}

pub fn pull_rebase(repo: &Path, policy: &SyncPolicy, log: GitLogger) -> Result<bool, GitError> {
    succeeds(repo, policy, &["pull", "--rebase"], log)
}

pub fn fetch_all(repo: &Path, policy: &SyncPolicy, log: GitLogger) -> Result<bool, GitError> {
    succeeds(repo, policy, &["fetch", "--all"], log)
}

/// Name of the checked-out branch, or `None` on a detached or unborn HEAD.
pub fn current_branch(
    repo: &Path,
    policy: &SyncPolicy,
    log: GitLogger,
) -> Result<Option<String>, GitError> {
    Ok(query(repo, policy, &["rev-parse", "--abbrev-ref", "HEAD"], log)?
        .filter(|branch| branch != "HEAD"))
}

/// Upstream tracking ref of the current branch (e.g. `origin/master`).
///
/// Uses the configured upstream when there is one, otherwise assumes
/// `origin/<current-branch>`.
pub fn resolve_upstream(
    repo: &Path,
    policy: &SyncPolicy,
    log: GitLogger,
) -> Result<Option<String>, GitError> {
    let configured = query(
        repo,
        policy,
        &["rev-parse", "--abbrev-ref", "--symbolic-full-name", "@{u}"],
        log,
    )?;
    if configured.is_some() {
        return Ok(configured);
    }
    Ok(current_branch(repo, policy, log)?.map(|branch| format!("{DEFAULT_REMOTE}/{branch}")))
}

pub fn reset_hard_to(
    repo: &Path,
    policy: &SyncPolicy,
    target: &str,
    log: GitLogger,
) -> Result<bool, GitError> {
    validate_ref_name(target)?;
    succeeds(repo, policy, &["reset", "--hard", target], log)
}

/// Rebases onto `upstream`, taking the upstream side of every conflicting hunk.
///
/// While rebasing, "ours" names the branch being rebased onto, so the
/// `ours` strategy option is what favors incoming changes.
pub fn rebase_favoring_upstream(
    repo: &Path,
    policy: &SyncPolicy,
    upstream: &str,
    log: GitLogger,
) -> Result<bool, GitError> {
    validate_ref_name(upstream)?;
    succeeds(
        repo,
        policy,
        &["rebase", "--strategy-option=ours", upstream],
        log,
    )
}

pub fn abort_rebase(repo: &Path, policy: &SyncPolicy, log: GitLogger) -> Result<bool, GitError> {
    succeeds(repo, policy, &["rebase", "--abort"], log)
}

/// True while a rebase (merge or apply backend) is stopped in `repo`.
pub fn rebase_in_progress(
    repo: &Path,
    policy: &SyncPolicy,
    log: GitLogger,
) -> Result<bool, GitError> {
    let Some(git_dir) = query(repo, policy, &["rev-parse", "--git-dir"], log)? else {
        return Ok(false);
    };
    let git_dir = absolutize(repo, PathBuf::from(git_dir));
    Ok(git_dir.join("rebase-merge").exists() || git_dir.join("rebase-apply").exists())
}

fn absolutize(repo: &Path, path: PathBuf) -> PathBuf {
    if path.is_absolute() {
        path
    } else {
        repo.join(path)
    }
}
