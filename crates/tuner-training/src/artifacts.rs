use crate::dataset::DatasetId;
use crate::error::{TrainingError, TrainingResult};
use crate::job::{TrainingConfig, TrainingJobId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};

pub const MANIFEST_FILE_NAME: &str = "training_manifest.json";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactKind {
    Checkpoint,
    Adapter,
    Tokenizer,
    Config,
    Metrics,
    Other,
}

impl ArtifactKind {
    /// Best-effort classification of an engine output by file name.
    pub fn infer(path: &Path) -> Self {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_ascii_lowercase())
            .unwrap_or_default();
        if name.contains("adapter") {
            Self::Adapter
        } else if name.contains("tokenizer") || name.contains("vocab") {
            Self::Tokenizer
        } else if name.contains("checkpoint") || name.ends_with(".safetensors") || name.ends_with(".bin") {
            Self::Checkpoint
        } else if name.contains("metrics") {
            Self::Metrics
        } else if name.contains("config") {
            Self::Config
        } else {
            Self::Other
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrainingArtifact {
    pub kind: ArtifactKind,
    pub path: PathBuf,
    pub sha256: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct TrainingMetrics {
    pub steps: u64,
    pub epochs: f64,
    pub final_loss: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingManifest {
    pub job_id: TrainingJobId,
    pub created_at: DateTime<Utc>,
    pub engine: String,
    pub base_model: PathBuf,
    pub dataset_path: PathBuf,
    pub dataset_id: DatasetId,
    pub config: TrainingConfig,
    #[serde(default)]
    pub metrics: TrainingMetrics,
    pub artifacts: Vec<TrainingArtifact>,
}

impl TrainingManifest {
    pub fn artifact(&self, kind: ArtifactKind) -> Option<&TrainingArtifact> {
        self.artifacts.iter().find(|a| a.kind == kind)
    }
}

pub fn sha256_file(path: &Path) -> TrainingResult<String> {
    let bytes = std::fs::read(path)?;
    let mut hasher = Sha256::new();
    hasher.update(&bytes);
    Ok(hex::encode(hasher.finalize()))
}

pub fn make_artifact(kind: ArtifactKind, path: PathBuf) -> TrainingResult<TrainingArtifact> {
    if !path.is_file() {
        return Err(TrainingError::Artifact(format!("artifact path is not a file: {}", path.display())));
    }

    let hash = sha256_file(&path)?;
    Ok(TrainingArtifact { kind, path, sha256: hash })
}

/// Writes `training_manifest.json` into `job_dir` and returns its path.
pub fn write_manifest(job_dir: &Path, manifest: &TrainingManifest) -> TrainingResult<PathBuf> {
    std::fs::create_dir_all(job_dir)?;
    let path = job_dir.join(MANIFEST_FILE_NAME);
    let json = serde_json::to_string_pretty(manifest)?;
    std::fs::write(&path, json)?;
    Ok(path)
}

pub fn read_manifest(path: &Path) -> TrainingResult<TrainingManifest> {
    let bytes = std::fs::read(path)?;
    Ok(serde_json::from_slice(&bytes)?)
}
