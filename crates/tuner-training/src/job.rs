use crate::error::{ConfigError, TrainingResult};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use uuid::Uuid;

/// Identifier for a training job.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TrainingJobId(pub String);

impl TrainingJobId {
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

impl Default for TrainingJobId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for TrainingJobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// Where the operator would like training to run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DevicePreference {
    #[default]
    #[serde(rename = "CPU", alias = "cpu")]
    Cpu,
    #[serde(rename = "GPU", alias = "gpu")]
    Gpu,
}

impl std::fmt::Display for DevicePreference {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Cpu => f.write_str("CPU"),
            Self::Gpu => f.write_str("GPU"),
        }
    }
}

impl FromStr for DevicePreference {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "cpu" => Ok(Self::Cpu),
            "gpu" | "cuda" => Ok(Self::Gpu),
            other => Err(format!("unknown device `{other}` (expected CPU or GPU)")),
        }
    }
}

/// Operator-chosen hyperparameters for one job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainingConfig {
    pub batch_size: u32,
    pub epochs: u32,
    pub learning_rate: f64,
    pub max_sequence_length: u32,
    pub warmup_steps: u32,
    pub weight_decay: f64,
    pub gradient_accumulation_steps: u32,
    pub device_preference: DevicePreference,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            batch_size: 1,
            epochs: 1,
            learning_rate: 2e-5,
            max_sequence_length: 32,
            warmup_steps: 0,
            weight_decay: 0.01,
            gradient_accumulation_steps: 1,
            device_preference: DevicePreference::Cpu,
        }
    }
}

impl TrainingConfig {
    /// Checks every numeric field and reports the first one that is out of range.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.batch_size == 0 {
            return Err(ConfigError::new("batch_size", "must be >= 1"));
        }
        if self.epochs == 0 {
            return Err(ConfigError::new("epochs", "must be >= 1"));
        }
        if !self.learning_rate.is_finite() || self.learning_rate <= 0.0 {
            return Err(ConfigError::new("learning_rate", "must be a finite number > 0"));
        }
        if self.max_sequence_length == 0 {
            return Err(ConfigError::new("max_sequence_length", "must be >= 1"));
        }
        if !self.weight_decay.is_finite() || self.weight_decay < 0.0 {
            return Err(ConfigError::new("weight_decay", "must be a finite number >= 0"));
        }
        if self.gradient_accumulation_steps == 0 {
            return Err(ConfigError::new("gradient_accumulation_steps", "must be >= 1"));
        }
        Ok(())
    }

    /// Number of optimizer steps per epoch for a dataset of `dataset_len` examples.
    ///
    /// Incomplete accumulation windows at the end of an epoch are dropped, but every
    /// epoch performs at least one step.
    #[must_use]
    pub fn steps_per_epoch(&self, dataset_len: usize) -> u64 {
        let batch = u64::from(self.batch_size.max(1));
        let accumulation = u64::from(self.gradient_accumulation_steps.max(1));
        let batches = (dataset_len as u64).div_ceil(batch);
        (batches / accumulation).max(1)
    }

    #[must_use]
    pub fn total_steps(&self, dataset_len: usize) -> u64 {
        self.steps_per_epoch(dataset_len) * u64::from(self.epochs)
    }
}

/// Everything the orchestrator needs to start a job.
#[derive(Debug, Clone)]
pub struct JobRequest {
    pub dataset_path: PathBuf,
    pub model_path: PathBuf,
    /// Parent directory; each job writes into `<output_root>/<job_id>`.
    pub output_root: PathBuf,
    pub config: TrainingConfig,
}

/// On-disk job configuration: the `TrainingConfig` fields plus dataset and model selectors,
/// stored as one flat JSON object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobConfigFile {
    #[serde(default)]
    pub dataset: String,
    #[serde(default)]
    pub model: String,
    #[serde(flatten)]
    pub training: TrainingConfig,
}

impl JobConfigFile {
    pub fn load(path: &Path) -> TrainingResult<Self> {
        let bytes = std::fs::read(path)?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    pub fn save(&self, path: &Path) -> TrainingResult<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        tracing::info!(path = %path.display(), "Configuration saved");
        Ok(())
    }
}
