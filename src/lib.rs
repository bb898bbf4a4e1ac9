//! ComfyUI project updater library.
//!
//! This crate updates the git checkouts of ComfyUI projects by:
//! - Locating the main application checkout and its custom nodes
//! - Reapplying stashed work and shelving or discarding local changes
//! - Pulling with rebase
//! - Resolving conflicts automatically, or reporting what needs a human

pub mod cli;
pub mod config;
pub mod constants;
pub mod git;
pub mod output;
pub mod project;
pub mod sync;
