//! Test infrastructure for comfyui-updater integration tests.
#![allow(dead_code)]

use anyhow::Result;
use comfyui_updater::config::{CancelToken, SyncPolicy, Verbosity};
use comfyui_updater::git::run_git;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tempfile::TempDir;

/// Conservative policy with a generous timeout.
pub fn test_policy() -> SyncPolicy {
    SyncPolicy {
        verbosity: Verbosity::Normal,
        force: false,
        git_timeout: Duration::from_secs(60),
        cancel: CancelToken::new(),
    }
}

pub fn force_policy() -> SyncPolicy {
    SyncPolicy {
        force: true,
        ..test_policy()
    }
}

fn configure_identity(path: &Path) -> Result<()> {
    let policy = test_policy();
    run_git(path, &policy, &["config", "user.email", "test@example.com"])?;
    run_git(path, &policy, &["config", "user.name", "Test User"])?;
    run_git(path, &policy, &["config", "commit.gpgsign", "false"])?;
    Ok(())
}

/// Initializes a repository on `master` with one commit of README.md.
pub fn init_repo(path: &Path) -> Result<()> {
    let policy = test_policy();
    std::fs::create_dir_all(path)?;
    run_git(path, &policy, &["init", "-b", "master"])?;
    configure_identity(path)?;
    std::fs::write(path.join("README.md"), "# Test Repo\n")?;
    run_git(path, &policy, &["add", "README.md"])?;
    run_git(path, &policy, &["commit", "-m", "Initial commit"])?;
    Ok(())
}

/// Initializes `path` like [`init_repo`] and pushes it to a new bare `remote`,
/// with `master` tracking `origin/master`.
pub fn init_repo_with_remote(path: &Path, remote: &Path) -> Result<()> {
    let policy = test_policy();
    std::fs::create_dir_all(remote)?;
    run_git(remote, &policy, &["init", "--bare", "-b", "master"])?;
    init_repo(path)?;
    run_git(
        path,
        &policy,
        &["remote", "add", "origin", &remote.to_string_lossy()],
    )?;
    run_git(path, &policy, &["push", "-u", "origin", "master"])?;
    Ok(())
}

/// A temporary git repository for testing.
/// Automatically cleaned up when dropped.
pub struct TestRepo {
    temp_dir: TempDir,
    path: PathBuf,
    remote: Option<PathBuf>,
}

impl TestRepo {
    /// Creates a repository with an initial commit and no remote.
    pub fn new() -> Result<Self> {
        let temp_dir = TempDir::new()?;
        let path = temp_dir.path().join("checkout");
        init_repo(&path)?;
        Ok(Self {
            temp_dir,
            path,
            remote: None,
        })
    }

    /// Creates a repository whose `master` tracks a bare remote.
    pub fn with_remote() -> Result<Self> {
        let temp_dir = TempDir::new()?;
        let path = temp_dir.path().join("checkout");
        let remote = temp_dir.path().join("remote.git");
        init_repo_with_remote(&path, &remote)?;
        Ok(Self {
            temp_dir,
            path,
            remote: Some(remote),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn git(&self, args: &[&str]) -> Result<String> {
        run_git(&self.path, &test_policy(), args)
    }

    pub fn read_file(&self, name: &str) -> Result<String> {
        Ok(std::fs::read_to_string(self.path.join(name))?)
    }

    pub fn file_exists(&self, name: &str) -> bool {
        self.path.join(name).exists()
    }

    /// Commits `contents` to `name` locally, without pushing.
    pub fn commit_file(&self, name: &str, contents: &str, message: &str) -> Result<()> {
        std::fs::write(self.path.join(name), contents)?;
        self.git(&["add", name])?;
        self.git(&["commit", "-m", message])?;
        Ok(())
    }

    /// Modifies a tracked file without committing.
    pub fn make_dirty(&self) -> Result<()> {
        std::fs::write(self.path.join("README.md"), "# Modified locally\n")?;
        Ok(())
    }

    pub fn make_untracked(&self) -> Result<()> {
        std::fs::write(self.path.join("untracked.txt"), "untracked\n")?;
        Ok(())
    }

    pub fn stash_count(&self) -> Result<usize> {
        Ok(self.git(&["stash", "list"])?.lines().count())
    }

    pub fn head(&self) -> Result<String> {
        self.git(&["rev-parse", "HEAD"])
    }

    /// Tip of `master` on the remote.
    pub fn upstream_head(&self) -> Result<String> {
        let remote = self.remote()?;
        run_git(&remote, &test_policy(), &["rev-parse", "master"])
    }

    pub fn rebase_in_progress(&self) -> bool {
        let git_dir = self.path.join(".git");
        git_dir.join("rebase-merge").exists() || git_dir.join("rebase-apply").exists()
    }

    /// Pushes a commit to the remote from a separate clone.
    /// `change` edits the clone's working tree; everything is committed.
    pub fn push_upstream<F>(&self, message: &str, change: F) -> Result<()>
    where
        F: FnOnce(&Path) -> Result<()>,
    {
        let policy = test_policy();
        let remote = self.remote()?;
        let clone_parent = TempDir::new_in(self.temp_dir.path())?;
        let clone = clone_parent.path().join("upstream");

        run_git(
            clone_parent.path(),
            &policy,
            &["clone", "-b", "master", &remote.to_string_lossy(), "upstream"],
        )?;
        configure_identity(&clone)?;
        change(&clone)?;
        run_git(&clone, &policy, &["add", "-A"])?;
        run_git(&clone, &policy, &["commit", "-m", message])?;
        run_git(&clone, &policy, &["push", "origin", "master"])?;
        Ok(())
    }

    /// Pushes a commit that writes `contents` to `name` upstream.
    pub fn push_upstream_file(&self, name: &str, contents: &str) -> Result<()> {
        self.push_upstream(&format!("Upstream change to {name}"), |clone| {
            std::fs::write(clone.join(name), contents)?;
            Ok(())
        })
    }

    /// Points `origin` at an ssh URL whose transport hangs, so network
    /// operations only end when they are killed.
    pub fn make_remote_hang(&self) -> Result<()> {
        self.git(&["remote", "set-url", "origin", "ssh://example.invalid/repo.git"])?;
        self.git(&["config", "ssh.variant", "simple"])?;
        self.git(&["config", "core.sshCommand", "sh -c 'sleep 10' --"])?;
        Ok(())
    }

    fn remote(&self) -> Result<PathBuf> {
        self.remote
            .clone()
            .ok_or_else(|| anyhow::anyhow!("test repo has no remote"))
    }
}
