//! Progress bar, verbose narration, and summary formatting.
//!
//! This module provides visual feedback while projects are updated: a
//! progress bar over projects in normal mode, step-by-step narration in
//! verbose mode, and the final issue summary.

use crate::config::SyncPolicy;
use crate::constants::PROGRESS_BAR_WIDTH;
use crate::project::{ProjectCallbacks, ProjectEvent, ProjectReport, RunScope, RunSummary};
use crate::sync::{SyncCallbacks, SyncStep, SyncTarget};
use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

/// No-op callbacks for when progress tracking is not needed.
/// This is the null object pattern for the callback traits.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NoOpCallbacks;

impl SyncCallbacks for NoOpCallbacks {
    fn on_step(&self, _target: &SyncTarget, _step: &SyncStep) {}
}

impl ProjectCallbacks for NoOpCallbacks {}

/// Progress bar over all projects of a run.
/// Hidden in quiet and verbose modes.
#[derive(Clone)]
pub struct RunProgress {
    bar: ProgressBar,
}

impl RunProgress {
    pub fn start_project(&self, name: &str) {
        self.bar.set_message(name.to_string());
    }

    pub fn finish_project(&self) {
        self.bar.inc(1);
    }

    pub fn finish(&self) {
        self.bar.finish();
    }

    /// Per-project tracker combining progress with verbose narration.
    pub fn tracker(&self, policy: &SyncPolicy) -> ProjectTracker {
        self.tracker_with_sink(policy, stderr_sink())
    }

    /// Like [`RunProgress::tracker`], narrating into `sink` in verbose mode.
    pub fn tracker_with_sink(&self, policy: &SyncPolicy, sink: NarrationSink) -> ProjectTracker {
        ProjectTracker {
            progress: self.clone(),
            narration: policy.is_verbose().then_some(sink),
        }
    }
}

/// Destination of verbose narration, one call per line.
pub type NarrationSink = Arc<dyn Fn(&str) + Send + Sync>;

pub fn stderr_sink() -> NarrationSink {
    Arc::new(|line: &str| eprintln!("{}", line))
}

#[must_use]
pub fn create_run_progress(total: usize, policy: &SyncPolicy) -> RunProgress {
    let bar = if policy.is_quiet() || policy.is_verbose() {
        ProgressBar::hidden()
    } else {
        let bar = ProgressBar::new(total as u64);
        bar.set_style(
            ProgressStyle::default_bar()
                .template(&format!(
                    "Updating: {{msg:<40}}[{{bar:{}}}] {{percent:>3}}%",
                    PROGRESS_BAR_WIDTH
                ))
                .unwrap()
                .progress_chars("= "),
        );
        bar
    };
    RunProgress { bar }
}

/// Callbacks used by the CLI for each project.
/// Narration is `None` outside verbose mode.
pub struct ProjectTracker {
    progress: RunProgress,
    narration: Option<NarrationSink>,
}

impl SyncCallbacks for ProjectTracker {
    fn on_step(&self, target: &SyncTarget, step: &SyncStep) {
        if let Some(sink) = &self.narration {
            sink(&narrate_step(target.path(), step));
        }
    }
}

impl ProjectCallbacks for ProjectTracker {
    fn on_project_event(&self, event: &ProjectEvent) {
        if let ProjectEvent::Started { name } = event {
            self.progress.start_project(name);
        }
        if let Some(sink) = &self.narration {
            sink(&narrate_project_event(event));
        }
    }

    fn on_project_complete(&self, _report: &ProjectReport) {
        self.progress.finish_project();
    }
}

fn narrate_step(path: &Path, step: &SyncStep) -> String {
    let message = format_step_message(path, step);
    match step {
        SyncStep::Completed => message.green().to_string(),
        SyncStep::ResolvingConflicts
        | SyncStep::Skipped
        | SyncStep::ApplyingStash
        | SyncStep::DiscardingChanges
        | SyncStep::StashingChanges => format!("\n{}", message.yellow()),
        SyncStep::DiscardFailed | SyncStep::StashFailed => message.red().to_string(),
        _ => message,
    }
}

fn narrate_project_event(event: &ProjectEvent) -> String {
    let message = format_project_event(event);
    match event {
        ProjectEvent::Finished { .. } => format!("{}\n{}", message.green(), "-".repeat(40)),
        ProjectEvent::Started { .. } => format!("\n{}", message.green()),
        _ => message.green().to_string(),
    }
}

fn format_step_message(path: &Path, step: &SyncStep) -> String {
    let path = path.display();
    match step {
        SyncStep::Skipped => format!("Skipping {} (not a git repository)", path),
        SyncStep::ApplyingStash => {
            format!("Stashed changes found in {}. Attempting to apply...", path)
        }
        SyncStep::DiscardingChanges => {
            "Uncommitted changes found. Force option is set. Discarding changes...".to_string()
        }
        SyncStep::StashingChanges => "Uncommitted changes found. Stashing changes...".to_string(),
        SyncStep::DiscardFailed => {
            format!("Could not discard local changes in {}; they are still present", path)
        }
        SyncStep::StashFailed => {
            format!("Could not stash local changes in {}; they are still present", path)
        }
        SyncStep::Pulling => format!("Pulling {} with rebase...", path),
        SyncStep::ResolvingConflicts => {
            format!("Conflicts detected in {}. Attempting to resolve...", path)
        }
        SyncStep::ForceResetting => "Force resetting to upstream...".to_string(),
        SyncStep::RebasingFavoringUpstream => {
            "Attempting to resolve conflicts by favoring incoming changes...".to_string()
        }
        SyncStep::AbortingRebase => format!("Aborting rebase in {}...", path),
        SyncStep::Completed => format!("Update successful for {}", path),
    }
}

fn format_project_event(event: &ProjectEvent) -> String {
    match event {
        ProjectEvent::Started { name } => format!("Updating project: {}", name),
        ProjectEvent::MainApp => "Updating MainApp...".to_string(),
        ProjectEvent::CustomNodes => "Updating custom nodes...".to_string(),
        ProjectEvent::CustomNode { name } => format!("Updating {}...", name),
        ProjectEvent::Finished { name } => format!("Finished updating {}", name),
    }
}

pub fn print_run_start(scope: &RunScope, count: usize, policy: &SyncPolicy) {
    if policy.is_quiet() {
        return;
    }
    match scope {
        RunScope::SingleProject(path) => println!(
            "{} {}",
            "Updating project:".cyan(),
            path.display().to_string().white().bold()
        ),
        RunScope::AllProjects(root) if count == 0 => println!(
            "{} {}",
            "No projects found in".yellow().bold(),
            root.display()
        ),
        RunScope::AllProjects(root) => println!(
            "{}",
            format!("Updating {} projects in {}", count, root.display()).dimmed()
        ),
    }
    if policy.force {
        println!("{}", "Force mode: local changes will be discarded".yellow());
    }
}

pub fn print_summary(summary: &RunSummary, policy: &SyncPolicy) {
    if policy.is_quiet() {
        print_quiet_summary(summary);
    } else {
        print_normal_summary(summary, policy);
    }
}

fn print_quiet_summary(summary: &RunSummary) {
    println!("{}", format_banner(summary));
    for issue in summary.issues() {
        eprintln!("error: {}", issue);
    }
}

fn print_normal_summary(summary: &RunSummary, policy: &SyncPolicy) {
    if summary.is_clean() {
        println!("\n{}", format_banner(summary).green());
    } else {
        println!("\n{}", format_banner(summary).yellow());
    }

    if policy.is_verbose() {
        for report in &summary.reports {
            println!(
                "  {} {} in {}",
                if report.issues.is_empty() {
                    "OK".green().bold()
                } else {
                    "ISSUES".red().bold()
                },
                report.name.white(),
                format_duration(report.duration).dimmed()
            );
        }
    }

    if !summary.is_clean() {
        println!("\n{}", "Summary of issues:".yellow());
        for line in format_issue_lines(summary) {
            println!("{}", line);
        }
    }
}

fn format_banner(summary: &RunSummary) -> String {
    let projects = summary.reports.len();
    let elapsed = format_duration(summary.duration);
    match summary.issue_count() {
        0 => format!("All projects updated successfully! ({} in {})", projects, elapsed),
        1 => format!("Updated {} projects with 1 issue in {}", projects, elapsed),
        n => format!("Updated {} projects with {} issues in {}", projects, n, elapsed),
    }
}

fn format_issue_lines(summary: &RunSummary) -> Vec<String> {
    summary.issues().map(|issue| format!("- {}", issue)).collect()
}

fn format_duration(duration: Duration) -> String {
    format!("{:.2}s", duration.as_secs_f32())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Verbosity;
    use crate::sync::Issue;
    use std::path::PathBuf;
    use std::sync::Mutex;

    fn summary_with(issues: Vec<Issue>) -> RunSummary {
        RunSummary {
            reports: vec![ProjectReport {
                path: PathBuf::from("/projects/demo"),
                name: "demo".to_string(),
                issues,
                duration: Duration::from_millis(1500),
            }],
            duration: Duration::from_millis(1234),
        }
    }

    #[test]
    fn test_format_duration_rounds_to_two_decimals() {
        assert_eq!(format_duration(Duration::from_millis(1234)), "1.23s");
        assert_eq!(format_duration(Duration::from_secs(42)), "42.00s");
    }

    #[test]
    fn test_banner_reports_success_only_without_issues() {
        assert_eq!(
            format_banner(&summary_with(vec![])),
            "All projects updated successfully! (1 in 1.23s)"
        );

        let conflict = Issue::unresolved_conflicts(Path::new("/projects/demo/comfyui"));
        assert_eq!(
            format_banner(&summary_with(vec![conflict])),
            "Updated 1 projects with 1 issue in 1.23s"
        );
    }

    #[test]
    fn test_issue_lines_are_itemized_in_order() {
        let path = Path::new("/projects/demo/comfyui");
        let summary = summary_with(vec![
            Issue::stash_apply_failed(path),
            Issue::unresolved_conflicts(path),
        ]);
        assert_eq!(
            format_issue_lines(&summary),
            vec![
                "- Failed to apply stashed changes in /projects/demo/comfyui".to_string(),
                "- Unable to resolve conflicts in /projects/demo/comfyui. Manual intervention required."
                    .to_string(),
            ]
        );
    }

    #[test]
    fn test_format_step_message_mentions_path_where_useful() {
        let path = Path::new("/p/comfyui");
        assert_eq!(
            format_step_message(path, &SyncStep::Skipped),
            "Skipping /p/comfyui (not a git repository)"
        );
        assert_eq!(
            format_step_message(path, &SyncStep::Completed),
            "Update successful for /p/comfyui"
        );
        assert_eq!(
            format_step_message(path, &SyncStep::RebasingFavoringUpstream),
            "Attempting to resolve conflicts by favoring incoming changes..."
        );
    }

    #[test]
    fn test_format_project_event_messages() {
        assert_eq!(
            format_project_event(&ProjectEvent::Started {
                name: "demo".to_string()
            }),
            "Updating project: demo"
        );
        assert_eq!(format_project_event(&ProjectEvent::MainApp), "Updating MainApp...");
        assert_eq!(
            format_project_event(&ProjectEvent::CustomNode {
                name: "node-a".to_string()
            }),
            "Updating node-a..."
        );
    }

    #[test]
    fn test_no_op_callbacks_implement_all_hooks() {
        let callbacks = NoOpCallbacks;
        let target = SyncTarget::new("/does/not/exist");
        callbacks.on_step(&target, &SyncStep::Pulling);
        callbacks.on_project_event(&ProjectEvent::MainApp);
        callbacks.on_project_complete(&ProjectReport {
            path: PathBuf::from("/projects/demo"),
            name: "demo".to_string(),
            issues: vec![],
            duration: Duration::ZERO,
        });
    }

    fn capture_sink() -> (NarrationSink, Arc<Mutex<Vec<String>>>) {
        let lines = Arc::new(Mutex::new(Vec::new()));
        let captured = Arc::clone(&lines);
        let sink: NarrationSink = Arc::new(move |line: &str| {
            captured.lock().unwrap().push(line.to_string());
        });
        (sink, lines)
    }

    fn drive_tracker(tracker: &ProjectTracker) {
        let target = SyncTarget::new("/p/demo/comfyui");
        tracker.on_project_event(&ProjectEvent::Started {
            name: "demo".to_string(),
        });
        tracker.on_project_event(&ProjectEvent::MainApp);
        tracker.on_step(&target, &SyncStep::StashingChanges);
        tracker.on_step(&target, &SyncStep::StashFailed);
        tracker.on_step(&target, &SyncStep::Pulling);
        tracker.on_project_event(&ProjectEvent::Finished {
            name: "demo".to_string(),
        });
    }

    #[test]
    fn test_verbose_tracker_narrates_steps_and_events() {
        let policy = SyncPolicy {
            verbosity: Verbosity::Verbose,
            ..SyncPolicy::default()
        };
        let (sink, lines) = capture_sink();
        let tracker = create_run_progress(1, &policy).tracker_with_sink(&policy, sink);

        drive_tracker(&tracker);

        let lines = lines.lock().unwrap();
        assert_eq!(lines.len(), 6);
        assert!(lines[0].contains("Updating project: demo"));
        assert!(lines[1].contains("Updating MainApp..."));
        assert!(lines[2].contains("Uncommitted changes found. Stashing changes..."));
        assert!(lines[3].contains("Could not stash local changes in /p/demo/comfyui"));
        assert!(lines[4].contains("Pulling /p/demo/comfyui with rebase..."));
        assert!(lines[5].contains("Finished updating demo"));
        assert!(lines[5].ends_with(&"-".repeat(40)));
    }

    #[test]
    fn test_tracker_is_silent_outside_verbose_mode() {
        for verbosity in [Verbosity::Normal, Verbosity::Quiet] {
            let policy = SyncPolicy {
                verbosity,
                ..SyncPolicy::default()
            };
            let (sink, lines) = capture_sink();
            let tracker = create_run_progress(1, &policy).tracker_with_sink(&policy, sink);

            drive_tracker(&tracker);

            assert!(lines.lock().unwrap().is_empty(), "{:?} narrated", verbosity);
        }
    }

    #[test]
    fn test_failed_shelving_is_narrated_with_path() {
        let path = Path::new("/p/comfyui");
        assert_eq!(
            format_step_message(path, &SyncStep::DiscardFailed),
            "Could not discard local changes in /p/comfyui; they are still present"
        );
        assert!(narrate_step(path, &SyncStep::StashFailed).contains("Could not stash"));
    }

    #[test]
    fn test_quiet_summary_smoke() {
        let path = Path::new("/projects/demo/comfyui");
        print_quiet_summary(&summary_with(vec![]));
        print_quiet_summary(&summary_with(vec![Issue::cancelled(path)]));
    }
}
