//! Sync policy derived from CLI arguments.

use crate::git::{self, GitLogger};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

/// Runtime policy applied to every checkout in a run.
#[derive(Debug, Clone)]
pub struct SyncPolicy {
    /// Controls the verbosity level of CLI output.
    pub verbosity: Verbosity,
    /// Discard local divergence and prefer hard resets over merging.
    pub force: bool,
    /// Deadline for each individual git invocation.
    pub git_timeout: Duration,
    /// Checked between git invocations; once set, syncing stops.
    pub cancel: CancelToken,
}

impl Default for SyncPolicy {
    fn default() -> Self {
        Self {
            verbosity: Verbosity::default(),
            force: false,
            git_timeout: crate::constants::git_timeout(),
            cancel: CancelToken::default(),
        }
    }
}

impl SyncPolicy {
    #[must_use]
    pub fn is_quiet(&self) -> bool {
        self.verbosity == Verbosity::Quiet
    }

    #[must_use]
    pub fn is_verbose(&self) -> bool {
        self.verbosity == Verbosity::Verbose
    }

    /// Returns the appropriate git logger based on verbosity settings.
    ///
    /// Policy only selects which logger function to use; the logging itself
    /// lives as plain functions in the git module.
    #[must_use]
    pub fn git_logger(&self) -> GitLogger {
        if self.is_verbose() {
            git::verbose_logger
        } else {
            git::no_op_logger
        }
    }
}

/// Verbosity level for CLI output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Verbosity {
    Quiet,
    #[default]
    Normal,
    Verbose,
}

/// Cooperative cancellation flag shared between the caller and running syncs.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}
