//! Workspace discovery and settings loading for the CLI.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use tuner_training::{StudioConfig, WorkspaceLayout};

/// Environment override for the workspace root.
pub const WORKSPACE_ENV_VAR: &str = "TUNER_WORKSPACE";

/// Resolved workspace root, its settings and directory layout.
#[derive(Debug, Clone)]
pub struct CliContext {
    pub workspace: PathBuf,
    pub studio: StudioConfig,
    pub layout: WorkspaceLayout,
}

impl CliContext {
    /// Workspace precedence:
    /// 1. `--workspace`
    /// 2. `TUNER_WORKSPACE`
    /// 3. Current directory
    pub fn load(workspace: Option<PathBuf>) -> Result<Self> {
        let workspace = match workspace.or_else(|| std::env::var_os(WORKSPACE_ENV_VAR).map(PathBuf::from)) {
            Some(path) => path,
            None => std::env::current_dir().context("Failed to read current directory")?,
        };
        Ok(Self::for_root(&workspace))
    }

    pub fn for_root(workspace: &Path) -> Self {
        let studio = StudioConfig::discover(workspace);
        let layout = WorkspaceLayout::from_config(workspace, &studio);
        Self { workspace: workspace.to_path_buf(), studio, layout }
    }
}
