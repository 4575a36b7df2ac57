use crate::artifacts::{read_manifest, ArtifactKind, TrainingManifest, MANIFEST_FILE_NAME};
use crate::error::TrainingResult;
use crate::layout::list_subdirs;
use std::path::{Path, PathBuf};

/// A finished job found under the trained models directory.
#[derive(Debug, Clone)]
pub struct TrainedModelEntry {
    /// Stable identifier for display and selection (e.g. `trained:<job_id>`).
    pub trained_model_id: String,
    pub job_dir: PathBuf,
    /// Checkpoint recorded in the manifest, if any.
    pub checkpoint_path: Option<PathBuf>,
    pub manifest: TrainingManifest,
}

#[must_use]
pub fn trained_model_id_for_job(job_id: &str) -> String {
    format!("trained:{job_id}")
}

/// Lists job directories that carry a readable `training_manifest.json`.
///
/// Directories without a manifest (cancelled or failed jobs) are skipped; unreadable
/// manifests are logged and skipped.
pub fn discover_trained_models(trained_models_dir: &Path) -> TrainingResult<Vec<TrainedModelEntry>> {
    let mut out = Vec::new();

    for job_dir in list_subdirs(trained_models_dir)? {
        let manifest_path = job_dir.join(MANIFEST_FILE_NAME);
        if !manifest_path.is_file() {
            continue;
        }
        let manifest = match read_manifest(&manifest_path) {
            Ok(m) => m,
            Err(e) => {
                tracing::warn!(path = %manifest_path.display(), error = %e, "Skipping unreadable manifest");
                continue;
            }
        };

        let checkpoint_path = manifest
            .artifact(ArtifactKind::Checkpoint)
            .or_else(|| manifest.artifact(ArtifactKind::Adapter))
            .map(|a| a.path.clone());

        out.push(TrainedModelEntry {
            trained_model_id: trained_model_id_for_job(&manifest.job_id.0),
            job_dir,
            checkpoint_path,
            manifest,
        });
    }

    out.sort_by(|a, b| b.manifest.created_at.cmp(&a.manifest.created_at));
    Ok(out)
}
