use crate::state::JobPhase;
use std::path::PathBuf;
use thiserror::Error;

pub type TrainingResult<T> = std::result::Result<T, TrainingError>;

pub type EngineResult<T> = std::result::Result<T, EngineError>;

#[derive(Debug, Error)]
pub enum TrainingError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Ingestion(#[from] IngestionError),

    #[error(transparent)]
    Conversion(#[from] ConversionError),

    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error(transparent)]
    Orchestrator(#[from] OrchestratorError),

    #[error("artifact error: {0}")]
    Artifact(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// A hyperparameter failed validation. Jobs are never created from an invalid config.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid {field}: {reason}")]
pub struct ConfigError {
    pub field: &'static str,
    pub reason: String,
}

impl ConfigError {
    pub fn new(field: &'static str, reason: impl Into<String>) -> Self {
        Self { field, reason: reason.into() }
    }
}

/// File-level dataset failures. Row-level problems are recorded as warnings instead.
#[derive(Debug, Error)]
pub enum IngestionError {
    #[error("dataset path does not exist: {}", .0.display())]
    NotFound(PathBuf),

    #[error("text directory not found: {}", .0.display())]
    MissingTextDir(PathBuf),

    #[error("unsupported dataset format: {}", .0.display())]
    UnsupportedFormat(PathBuf),

    #[error("failed to read {}: {cause}", .path.display())]
    Read { path: PathBuf, cause: std::io::Error },

    #[error("failed to parse {}: {reason}", .path.display())]
    Parse { path: PathBuf, reason: String },

    #[error("csv dataset has no `text` column: {}", .0.display())]
    MissingTextColumn(PathBuf),

    #[error("no valid examples found in {}", .0.display())]
    Empty(PathBuf),
}

#[derive(Debug, Error)]
pub enum ConversionError {
    #[error("unrecognized source dataset format: {}", .0.display())]
    UnsupportedSource(PathBuf),

    #[error(transparent)]
    Source(IngestionError),

    #[error("refusing to overwrite the source dataset: {}", .0.display())]
    WouldOverwriteSource(PathBuf),

    #[error("target directory is not writable: {}: {cause}", .path.display())]
    TargetNotWritable { path: PathBuf, cause: std::io::Error },

    #[error("failed to serialize {format} output: {reason}")]
    Serialize { format: &'static str, reason: String },
}

impl From<IngestionError> for ConversionError {
    fn from(err: IngestionError) -> Self {
        match err {
            IngestionError::UnsupportedFormat(path) => Self::UnsupportedSource(path),
            other => Self::Source(other),
        }
    }
}

/// Failure reported by a training engine. Rendered with its whole cause chain.
#[derive(Debug, Error)]
#[error("{context}: {cause:#}")]
pub struct EngineError {
    context: String,
    cause: anyhow::Error,
}

impl EngineError {
    pub fn new(context: impl Into<String>, cause: impl Into<anyhow::Error>) -> Self {
        Self { context: context.into(), cause: cause.into() }
    }

    pub fn msg(context: impl Into<String>, message: impl std::fmt::Display) -> Self {
        Self::new(context, anyhow::anyhow!("{message}"))
    }

    pub fn context(&self) -> &str {
        &self.context
    }
}

/// Host or accelerator telemetry could not be queried.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("telemetry unavailable: {0}")]
pub struct TelemetryUnavailable(pub String);

#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("a training job is already in progress (phase: {0})")]
    NotIdle(JobPhase),

    #[error("no active training job (phase: {0})")]
    NotActive(JobPhase),

    #[error("job has not reached a terminal phase (phase: {0})")]
    NotTerminal(JobPhase),

    #[error("resource estimation is unavailable while a job is active")]
    JobActive,

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("training task did not finish cleanly: {0}")]
    Join(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_engine_error_renders_cause_chain() {
        let root = std::io::Error::other("CUDA out of memory");
        let err = EngineError::new(
            "training loop",
            anyhow::Error::new(root).context("step 3 failed"),
        );
        let text = err.to_string();
        assert!(text.starts_with("training loop: step 3 failed"));
        assert!(text.contains("CUDA out of memory"));
    }

    #[test]
    fn test_unsupported_ingestion_maps_to_unsupported_source() {
        let err: ConversionError = IngestionError::UnsupportedFormat(PathBuf::from("a.txt")).into();
        assert!(matches!(err, ConversionError::UnsupportedSource(_)));

        let err: ConversionError = IngestionError::Empty(PathBuf::from("a.json")).into();
        assert!(matches!(err, ConversionError::Source(IngestionError::Empty(_))));
    }
}
