//! Tuner Training
//!
//! Engine-agnostic fine-tuning job control:
//! - Normalizing datasets from directories, JSONL, JSON and CSV (`normalizer`)
//! - Converting datasets between serialized formats (`convert`)
//! - Estimating memory needs against live telemetry (`estimate`)
//! - Running one training job at a time with pause/cancel (`orchestrator`)
//! - Writing trained artifacts + manifests (`artifacts`, `registry`)

pub mod accelerator;
pub mod artifacts;
pub mod config;
pub mod convert;
pub mod dataset;
pub mod engine;
pub mod error;
pub mod estimate;
pub mod job;
pub mod layout;
pub mod logging;
pub mod normalizer;
pub mod orchestrator;
pub mod progress;
pub mod registry;
pub mod state;
pub mod telemetry;

pub use accelerator::AcceleratorContext;
pub use artifacts::{ArtifactKind, TrainingArtifact, TrainingManifest, TrainingMetrics};
pub use config::{AdapterConfig, PauseMode, StudioConfig};
pub use convert::{convert, convert_into, TargetFormat};
pub use dataset::{
    Dataset, DatasetFormat, DatasetId, EncodedDataset, EncodedExample, Example, Tokenizer, IGNORE_INDEX,
    UNKNOWN_TOKEN_TEXT,
};
pub use engine::{Device, EpochReport, LoopControl, StepObserver, StepReport, TrainingEngine};
pub use error::{
    ConfigError, ConversionError, EngineError, EngineResult, IngestionError, OrchestratorError,
    TelemetryUnavailable, TrainingError, TrainingResult,
};
pub use estimate::{estimate, ResourceEstimate};
pub use job::{DevicePreference, JobConfigFile, JobRequest, TrainingConfig, TrainingJobId};
pub use layout::WorkspaceLayout;
pub use logging::{init_logging, LogSettings};
pub use normalizer::{list_datasets, load as load_dataset, preview, Record};
pub use orchestrator::{Confirmation, Orchestrator, OrchestratorSettings};
pub use progress::{progress_channel, ChannelProgressSink, ProgressSink, ProgressSnapshot};
pub use registry::{discover_trained_models, TrainedModelEntry};
pub use state::{JobPhase, JobState};
pub use telemetry::{HostTelemetry, Telemetry};
