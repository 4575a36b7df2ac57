//! Shared argument types for CLI commands.

use clap::{Args, Subcommand};
use std::path::PathBuf;
use tuner_training::{DevicePreference, TrainingConfig};

/// Hyperparameter overrides. Unset flags keep the base value.
#[derive(Args, Debug, Clone, Default)]
pub struct HyperParams {
    /// Examples per batch
    #[arg(long)]
    pub batch_size: Option<u32>,

    /// Passes over the dataset
    #[arg(long)]
    pub epochs: Option<u32>,

    #[arg(long)]
    pub learning_rate: Option<f64>,

    /// Token window; longer examples are truncated
    #[arg(long)]
    pub max_length: Option<u32>,

    #[arg(long)]
    pub warmup_steps: Option<u32>,

    #[arg(long)]
    pub weight_decay: Option<f64>,

    /// Batches accumulated per optimizer step
    #[arg(long)]
    pub grad_accum: Option<u32>,

    /// Device preference (CPU or GPU)
    #[arg(long)]
    pub device: Option<DevicePreference>,
}

impl HyperParams {
    pub fn apply(&self, mut base: TrainingConfig) -> TrainingConfig {
        if let Some(v) = self.batch_size {
            base.batch_size = v;
        }
        if let Some(v) = self.epochs {
            base.epochs = v;
        }
        if let Some(v) = self.learning_rate {
            base.learning_rate = v;
        }
        if let Some(v) = self.max_length {
            base.max_sequence_length = v;
        }
        if let Some(v) = self.warmup_steps {
            base.warmup_steps = v;
        }
        if let Some(v) = self.weight_decay {
            base.weight_decay = v;
        }
        if let Some(v) = self.grad_accum {
            base.gradient_accumulation_steps = v;
        }
        if let Some(v) = self.device {
            base.device_preference = v;
        }
        base
    }
}

#[derive(Args, Debug, Clone)]
pub struct TrainArgs {
    /// Dataset name in data/ or a path
    #[arg(long)]
    pub dataset: Option<String>,

    /// Base model name in models/ or a path
    #[arg(long)]
    pub model: Option<String>,

    /// Saved job configuration to start from
    #[arg(long)]
    pub config: Option<PathBuf>,

    #[command(flatten)]
    pub params: HyperParams,

    /// Hold the engine while paused instead of only hiding progress
    #[arg(long)]
    pub strict_pause: bool,

    /// Skip the cancel confirmation prompt
    #[arg(long)]
    pub yes: bool,
}

#[derive(Subcommand, Debug, Clone)]
pub enum ConfigCommand {
    /// Save dataset, model and hyperparameters to a job configuration file
    Save {
        file: PathBuf,

        #[arg(long, default_value = "")]
        dataset: String,

        #[arg(long, default_value = "")]
        model: String,

        #[command(flatten)]
        params: HyperParams,
    },

    /// Print a saved job configuration
    Show {
        file: PathBuf,

        #[arg(long)]
        json: bool,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unset_flags_keep_base_values() {
        let params = HyperParams { epochs: Some(3), device: Some(DevicePreference::Gpu), ..Default::default() };
        let config = params.apply(TrainingConfig::default());

        assert_eq!(config.epochs, 3);
        assert_eq!(config.device_preference, DevicePreference::Gpu);
        assert_eq!(config.batch_size, TrainingConfig::default().batch_size);
    }
}
