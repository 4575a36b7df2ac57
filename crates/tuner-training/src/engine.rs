//! Contract between the orchestrator and a model training engine.
//!
//! The engine owns the numerical work. The orchestrator only sees typed handles and
//! a per-step callback, so engines are free to drive their own loop.

use crate::config::AdapterConfig;
use crate::dataset::{EncodedDataset, Tokenizer};
use crate::error::EngineResult;
use crate::job::TrainingConfig;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

/// Concrete device a job runs on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Device {
    Cpu,
    Gpu(usize),
}

impl Device {
    #[must_use]
    pub const fn is_gpu(self) -> bool {
        matches!(self, Self::Gpu(_))
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Cpu => f.write_str("cpu"),
            Self::Gpu(idx) => write!(f, "cuda:{idx}"),
        }
    }
}

/// Observer verdict at a step or epoch boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopControl {
    Continue,
    Stop,
}

/// Reported after each optimizer step.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StepReport {
    /// 1-based global step.
    pub step: u64,
    pub total_steps: u64,
    /// Fractional epoch, e.g. `0.5` halfway through the first epoch.
    pub epoch: f64,
    pub loss: Option<f64>,
}

/// Reported after each completed epoch.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EpochReport {
    /// 1-based epoch just completed.
    pub epoch: u32,
    pub total_epochs: u32,
    pub step: u64,
    pub mean_loss: Option<f64>,
}

/// Callbacks invoked by the engine from inside its training loop.
///
/// Engines must honour [`LoopControl::Stop`] before starting the next step.
pub trait StepObserver: Send {
    fn on_train_begin(&mut self, _total_steps: u64) {}

    fn on_step(&mut self, report: StepReport) -> LoopControl;

    fn on_epoch(&mut self, report: EpochReport) -> LoopControl;
}

pub trait TrainingEngine: Send + Sync + 'static {
    type Model: Send;
    type Tokenizer: Tokenizer;

    fn id(&self) -> &'static str;

    fn load_model(&self, path: &Path, device: Device) -> EngineResult<Self::Model>;

    fn load_tokenizer(&self, path: &Path) -> EngineResult<Self::Tokenizer>;

    fn attach_adapter(&self, model: Self::Model, adapter: &AdapterConfig) -> EngineResult<Self::Model>;

    /// Runs the whole loop, calling `observer` after every optimizer step and epoch.
    fn run_training_loop(
        &self,
        model: &mut Self::Model,
        data: &EncodedDataset<'_, Self::Tokenizer>,
        config: &TrainingConfig,
        observer: &mut dyn StepObserver,
    ) -> EngineResult<()>;

    /// Persists the trained model and returns the files written.
    fn save(&self, model: &Self::Model, output_dir: &Path) -> EngineResult<Vec<PathBuf>>;

    /// Host-side garbage pass after a job's objects are dropped.
    fn collect_garbage(&self) {}

    /// Empty device caches and synchronize.
    fn release_device_memory(&self, _device: Device) -> EngineResult<()> {
        Ok(())
    }
}
