//! Command-line interface: argument parsing and the top-level run.

use crate::config::{CancelToken, SyncPolicy, Verbosity};
use crate::constants;
use crate::output;
use crate::project::{self, RunScope, RunSummary};
use anyhow::Context;
use clap::Parser;
use std::io::IsTerminal;
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::{Duration, Instant};

/// Exit status of a run that finished but left issues behind.
pub const EXIT_WITH_ISSUES: u8 = 2;

#[derive(Debug, Parser)]
#[command(
    name = "update-comfyui",
    version,
    about = "Update ComfyUI projects and custom nodes.",
    after_help = "When run without options, all projects are updated with minimal output.\n\
                  If run from within a project directory, only that project is updated."
)]
pub struct Args {
    /// Run in verbose mode
    #[arg(short, long, conflicts_with = "quiet")]
    pub verbose: bool,

    /// Only print issues and the final count
    #[arg(short, long)]
    pub quiet: bool,

    /// Force update, discarding local changes
    #[arg(short, long)]
    pub force: bool,

    /// Do not ask for confirmation before a forced update
    #[arg(short = 'y', long)]
    pub yes: bool,

    /// Timeout for each git operation, in seconds [default: $COMFYUI_UPDATE_TIMEOUT or 120]
    #[arg(long, value_name = "SECS", value_parser = clap::value_parser!(u64).range(1..))]
    pub timeout: Option<u64>,

    /// Directory holding the projects [default: $COMFYUI_PROJECTS_ROOT or ~/comfyui-launcher/server/projects]
    #[arg(long, value_name = "DIR")]
    pub projects_root: Option<PathBuf>,

    /// Number of projects to update in parallel (ignored in verbose mode)
    #[arg(short, long, default_value_t = 1, value_parser = clap::value_parser!(u64).range(1..))]
    pub jobs: u64,
}

impl Args {
    pub fn policy(&self) -> SyncPolicy {
        let verbosity = if self.verbose {
            Verbosity::Verbose
        } else if self.quiet {
            Verbosity::Quiet
        } else {
            Verbosity::Normal
        };
        SyncPolicy {
            verbosity,
            force: self.force,
            git_timeout: self
                .timeout
                .map(Duration::from_secs)
                .unwrap_or_else(constants::git_timeout),
            cancel: CancelToken::new(),
        }
    }

    pub fn projects_root(&self) -> anyhow::Result<PathBuf> {
        match &self.projects_root {
            Some(root) => Ok(root.clone()),
            None => constants::projects_root(),
        }
    }
}

/// Updates every project in scope and prints the summary.
pub fn run(args: &Args) -> anyhow::Result<ExitCode> {
    let policy = args.policy();

    if policy.force && !args.yes && !confirm_force()? {
        println!("Aborted, nothing was changed.");
        return Ok(ExitCode::SUCCESS);
    }

    let cwd = std::env::current_dir().context("Failed to determine current directory")?;
    let scope = RunScope::resolve(&cwd, &args.projects_root()?);
    let projects = scope.projects()?;
    output::print_run_start(&scope, projects.len(), &policy);

    let start = Instant::now();
    let progress = output::create_run_progress(projects.len(), &policy);
    let reports = project::update_projects(&projects, &policy, args.jobs as usize, |_| {
        progress.tracker(&policy)
    })?;
    progress.finish();

    let summary = RunSummary {
        reports,
        duration: start.elapsed(),
    };
    output::print_summary(&summary, &policy);

    Ok(ExitCode::from(exit_status(&summary)))
}

fn exit_status(summary: &RunSummary) -> u8 {
    if summary.is_clean() {
        0
    } else {
        EXIT_WITH_ISSUES
    }
}

/// Asks before discarding local changes. Non-interactive runs proceed.
fn confirm_force() -> anyhow::Result<bool> {
    if !std::io::stdin().is_terminal() {
        return Ok(true);
    }
    dialoguer::Confirm::new()
        .with_prompt("Force mode discards local changes in every checkout. Continue?")
        .default(false)
        .interact()
        .context("Failed to read confirmation")
}
