// Project discovery, per-project traversal, run-wide aggregation

use crate::config::SyncPolicy;
use crate::constants::{
    DEFAULT_PROJECT_NAME, IGNORED_PLUGIN_DIRS, MAIN_APP_DIR, PLUGINS_DIR, PROJECT_PATH_MARKER,
};
use crate::sync::{self, Issue, SyncCallbacks, SyncTarget};
use anyhow::Context;
use rayon::prelude::*;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

/// Milestones of one project's traversal, for narration and progress.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProjectEvent {
    Started { name: String },
    MainApp,
    CustomNodes,
    CustomNode { name: String },
    Finished { name: String },
}

/// Observer for project traversal; extends the per-checkout callbacks.
pub trait ProjectCallbacks: SyncCallbacks {
    fn on_project_event(&self, _event: &ProjectEvent) {}

    fn on_project_complete(&self, _report: &ProjectReport) {}
}

/// Issues collected for one project, in traversal order.
#[derive(Debug, Clone)]
pub struct ProjectReport {
    pub path: PathBuf,
    pub name: String,
    pub issues: Vec<Issue>,
    pub duration: Duration,
}

/// Checkouts that make up one project.
#[derive(Debug, Clone)]
pub struct ProjectLayout {
    pub main_app: Option<SyncTarget>,
    pub custom_nodes: Vec<SyncTarget>,
}

impl ProjectLayout {
    /// Main application first, then custom nodes sorted by directory name.
    /// Custom nodes are only looked for inside an existing main checkout.
    pub fn discover(project_dir: &Path) -> Self {
        let main_dir = project_dir.join(MAIN_APP_DIR);
        if !main_dir.is_dir() {
            return Self {
                main_app: None,
                custom_nodes: Vec::new(),
            };
        }

        let mut nodes: Vec<PathBuf> = std::fs::read_dir(main_dir.join(PLUGINS_DIR))
            .into_iter()
            .flatten()
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| p.is_dir() && !is_ignored_plugin_dir(p))
            .collect();
        nodes.sort();

        Self {
            main_app: Some(SyncTarget::new(main_dir)),
            custom_nodes: nodes.into_iter().map(SyncTarget::new).collect(),
        }
    }

    pub fn targets(&self) -> impl Iterator<Item = &SyncTarget> {
        self.main_app.iter().chain(self.custom_nodes.iter())
    }
}

fn is_ignored_plugin_dir(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .is_some_and(|name| IGNORED_PLUGIN_DIRS.contains(&name))
}

pub fn project_name(path: &Path) -> String {
    path.file_name()
        .and_then(|n| n.to_str())
        .unwrap_or(DEFAULT_PROJECT_NAME)
        .to_string()
}

/// Syncs the main checkout and every custom node of one project.
pub fn update_project<C>(project_dir: &Path, policy: &SyncPolicy, callbacks: &C) -> ProjectReport
where
    C: ProjectCallbacks + ?Sized,
{
    let start = Instant::now();
    let name = project_name(project_dir);
    let layout = ProjectLayout::discover(project_dir);
    let mut issues = Vec::new();

    callbacks.on_project_event(&ProjectEvent::Started { name: name.clone() });

    if let Some(main_app) = &layout.main_app {
        callbacks.on_project_event(&ProjectEvent::MainApp);
        issues.extend(sync::sync(main_app, policy, callbacks).issues);

        if !layout.custom_nodes.is_empty() {
            callbacks.on_project_event(&ProjectEvent::CustomNodes);
        }
        for node in &layout.custom_nodes {
            callbacks.on_project_event(&ProjectEvent::CustomNode {
                name: project_name(node.path()),
            });
            issues.extend(sync::sync(node, policy, callbacks).issues);
        }
    }

    callbacks.on_project_event(&ProjectEvent::Finished { name: name.clone() });

    let report = ProjectReport {
        path: project_dir.to_path_buf(),
        name,
        issues,
        duration: start.elapsed(),
    };
    callbacks.on_project_complete(&report);
    report
}

/// Which projects a run covers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunScope {
    /// Invoked from inside a project directory: only that project.
    SingleProject(PathBuf),
    /// Every project directory under the projects root.
    AllProjects(PathBuf),
}

impl RunScope {
    /// A cwd anywhere below `.../projects/<name>/` selects `<name>` only.
    pub fn resolve(cwd: &Path, projects_root: &Path) -> Self {
        let normalized = cwd.to_string_lossy().replace('\\', "/");
        let depth = normalized
            .find(PROJECT_PATH_MARKER)
            .map(|at| {
                normalized[at + PROJECT_PATH_MARKER.len()..]
                    .split('/')
                    .filter(|c| !c.is_empty())
                    .count()
            })
            .unwrap_or(0);

        match depth.checked_sub(1).and_then(|up| cwd.ancestors().nth(up)) {
            Some(project) => RunScope::SingleProject(project.to_path_buf()),
            None => RunScope::AllProjects(projects_root.to_path_buf()),
        }
    }

    pub fn projects(&self) -> anyhow::Result<Vec<PathBuf>> {
        match self {
            RunScope::SingleProject(path) => Ok(vec![path.clone()]),
            RunScope::AllProjects(root) => find_projects(root),
        }
    }
}

/// Direct child directories of `root`, sorted. A missing root is an error.
pub fn find_projects(root: &Path) -> anyhow::Result<Vec<PathBuf>> {
    let entries = std::fs::read_dir(root)
        .with_context(|| format!("Failed to read projects directory {}", root.display()))?;

    let mut projects: Vec<PathBuf> = entries
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| p.is_dir())
        .collect();
    projects.sort();
    Ok(projects)
}

/// Updates every project, keeping reports in input order.
///
/// With `jobs > 1` projects run on a dedicated thread pool; checkouts inside
/// one project are always synced one at a time. Verbose mode stays
/// sequential so narration does not interleave.
pub fn update_projects<C, F>(
    projects: &[PathBuf],
    policy: &SyncPolicy,
    jobs: usize,
    make_callbacks: F,
) -> anyhow::Result<Vec<ProjectReport>>
where
    C: ProjectCallbacks,
    F: Fn(&Path) -> C + Sync,
{
    let run_one = |project: &PathBuf| {
        update_project(project, policy, &make_callbacks(project.as_path()))
    };

    if jobs <= 1 || policy.is_verbose() {
        return Ok(projects.iter().map(run_one).collect());
    }

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(jobs)
        .build()
        .context("Failed to create worker thread pool")?;
    Ok(pool.install(|| projects.par_iter().map(run_one).collect()))
}

/// Aggregate of one whole run.
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub reports: Vec<ProjectReport>,
    pub duration: Duration,
}

impl RunSummary {
    pub fn issues(&self) -> impl Iterator<Item = &Issue> {
        self.reports.iter().flat_map(|r| r.issues.iter())
    }

    #[must_use]
    pub fn issue_count(&self) -> usize {
        self.reports.iter().map(|r| r.issues.len()).sum()
    }

    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.issue_count() == 0
    }
}
