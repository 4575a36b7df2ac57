use crate::config::StudioConfig;
use crate::error::{IngestionError, TrainingResult};
use crate::job::TrainingJobId;
use crate::normalizer;
use std::path::{Path, PathBuf};

/// Filesystem layout of a tuner workspace.
///
/// Default layout:
/// `data/` datasets, `models/` base models, `trained_models/<job_id>/` job outputs,
/// `training.log` at the root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkspaceLayout {
    root: PathBuf,
    data_dir: PathBuf,
    models_dir: PathBuf,
    trained_models_dir: PathBuf,
    log_file: PathBuf,
}

impl WorkspaceLayout {
    /// Layout with default directory names under `workspace_root`.
    #[must_use]
    pub fn for_workspace_root(workspace_root: &Path) -> Self {
        Self::from_config(workspace_root, &StudioConfig::default())
    }

    #[must_use]
    pub fn from_config(workspace_root: &Path, config: &StudioConfig) -> Self {
        let resolve = |p: &Path| if p.is_absolute() { p.to_path_buf() } else { workspace_root.join(p) };
        Self {
            root: workspace_root.to_path_buf(),
            data_dir: resolve(&config.data_dir),
            models_dir: resolve(&config.models_dir),
            trained_models_dir: resolve(&config.trained_models_dir),
            log_file: resolve(&config.log_file),
        }
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    #[must_use]
    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    #[must_use]
    pub fn models_dir(&self) -> &Path {
        &self.models_dir
    }

    #[must_use]
    pub fn trained_models_dir(&self) -> &Path {
        &self.trained_models_dir
    }

    #[must_use]
    pub fn log_file(&self) -> &Path {
        &self.log_file
    }

    #[must_use]
    pub fn job_dir(&self, job_id: &TrainingJobId) -> PathBuf {
        self.trained_models_dir.join(job_id.0.as_str())
    }

    pub fn ensure_dirs(&self) -> TrainingResult<()> {
        std::fs::create_dir_all(&self.data_dir)?;
        std::fs::create_dir_all(&self.models_dir)?;
        std::fs::create_dir_all(&self.trained_models_dir)?;
        Ok(())
    }

    pub fn list_datasets(&self) -> TrainingResult<Vec<PathBuf>> {
        Ok(normalizer::list_datasets(&self.data_dir)?)
    }

    /// Sub-directories of `models/`, by name.
    pub fn list_models(&self) -> TrainingResult<Vec<PathBuf>> {
        list_subdirs(&self.models_dir)
    }

    /// Resolves a dataset given as a path or as a name inside `data/`.
    pub fn resolve_dataset(&self, name_or_path: &str) -> Result<PathBuf, IngestionError> {
        resolve_in(&self.data_dir, name_or_path).ok_or_else(|| IngestionError::NotFound(PathBuf::from(name_or_path)))
    }

    /// Resolves a model given as a path or as a name inside `models/`.
    pub fn resolve_model(&self, name_or_path: &str) -> Option<PathBuf> {
        resolve_in(&self.models_dir, name_or_path)
    }
}

fn resolve_in(dir: &Path, name_or_path: &str) -> Option<PathBuf> {
    let direct = PathBuf::from(name_or_path);
    if direct.exists() {
        return Some(direct);
    }
    let nested = dir.join(name_or_path);
    nested.exists().then_some(nested)
}

pub(crate) fn list_subdirs(dir: &Path) -> TrainingResult<Vec<PathBuf>> {
    let entries = match std::fs::read_dir(dir) {
        Ok(d) => d,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e.into()),
    };

    let mut out = Vec::new();
    for entry in entries {
        let path = entry?.path();
        if path.is_dir() {
            out.push(path);
        }
    }
    out.sort();
    Ok(out)
}
