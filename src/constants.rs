//! Application-wide constants.
//!
//! Centralized configuration values to avoid magic numbers throughout the codebase.

use anyhow::{Result, anyhow};
use std::ffi::OsString;
use std::path::PathBuf;
use std::time::Duration;

/// Default timeout for individual git operations (in seconds).
/// Pulls of large custom nodes can be slow, so this is generous.
const DEFAULT_GIT_TIMEOUT_SECS: u64 = 120;

/// Environment variable overriding the per-operation git timeout (seconds).
pub const TIMEOUT_ENV: &str = "COMFYUI_UPDATE_TIMEOUT";

/// Environment variable overriding the projects root directory.
pub const PROJECTS_ROOT_ENV: &str = "COMFYUI_PROJECTS_ROOT";

/// Returns the git command timeout.
///
/// Can be customized via the COMFYUI_UPDATE_TIMEOUT environment variable (in seconds).
/// Falls back to 120 seconds if not set or invalid.
///
/// Example: `COMFYUI_UPDATE_TIMEOUT=300 update-comfyui`
pub fn git_timeout() -> Duration {
    std::env::var(TIMEOUT_ENV)
        .ok()
        .and_then(|s| parse_timeout_secs(&s))
        .unwrap_or(Duration::from_secs(DEFAULT_GIT_TIMEOUT_SECS))
}

fn parse_timeout_secs(value: &str) -> Option<Duration> {
    value
        .trim()
        .parse::<u64>()
        .ok()
        .filter(|secs| *secs > 0)
        .map(Duration::from_secs)
}

/// Projects root, relative to the home directory.
pub const DEFAULT_PROJECTS_ROOT: &str = "comfyui-launcher/server/projects";

/// Path fragment identifying a working directory inside a single project.
pub const PROJECT_PATH_MARKER: &str = "/comfyui-launcher/server/projects/";

/// Returns the projects root, honoring COMFYUI_PROJECTS_ROOT.
///
/// Fails when no override is set and the home directory is unknown.
pub fn projects_root() -> Result<PathBuf> {
    resolve_projects_root(std::env::var_os(PROJECTS_ROOT_ENV), dirs::home_dir())
}

fn resolve_projects_root(
    override_root: Option<OsString>,
    home: Option<PathBuf>,
) -> Result<PathBuf> {
    if let Some(root) = override_root.filter(|v| !v.is_empty()) {
        return Ok(PathBuf::from(root));
    }
    let home = home.ok_or_else(|| {
        anyhow!(
            "Could not determine the home directory; set {} or pass --projects-root",
            PROJECTS_ROOT_ENV
        )
    })?;
    Ok(home.join(DEFAULT_PROJECTS_ROOT))
}

/// Main application checkout inside a project.
pub const MAIN_APP_DIR: &str = "comfyui";

/// Plugin checkouts directory inside the main application checkout.
pub const PLUGINS_DIR: &str = "custom_nodes";

/// Entries of the plugins directory that are never checkouts.
pub const IGNORED_PLUGIN_DIRS: &[&str] = &["__pycache__"];

/// Git directory name used to detect repositories.
pub const GIT_DIR: &str = ".git";

/// Remote assumed when a branch has no configured upstream.
pub const DEFAULT_REMOTE: &str = "origin";

/// Interval between checks of a running git process.
pub const PROCESS_POLL_MS: u64 = 20;

/// Progress bar width in cells.
pub const PROGRESS_BAR_WIDTH: u16 = 50;

/// Default name used when a project name cannot be determined from its path.
pub const DEFAULT_PROJECT_NAME: &str = "project";
