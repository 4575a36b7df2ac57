//! `tuner config`: save and show job configuration files.

use crate::commands::types::ConfigCommand;
use anyhow::{Context, Result};
use colored::Colorize;
use tuner_training::{JobConfigFile, TrainingConfig};

pub fn execute(command: ConfigCommand) -> Result<()> {
    match command {
        ConfigCommand::Save { file, dataset, model, params } => {
            let training = params.apply(TrainingConfig::default());
            training.validate()?;
            JobConfigFile { dataset, model, training }.save(&file)?;
            println!("{} {}", "Saved configuration to".green(), file.display());
            Ok(())
        }
        ConfigCommand::Show { file, json } => {
            let config = JobConfigFile::load(&file)
                .with_context(|| format!("Failed to read job configuration: {}", file.display()))?;
            if json {
                println!("{}", serde_json::to_string_pretty(&config)?);
                return Ok(());
            }

            let t = &config.training;
            println!();
            println!("{}", format!("Job Configuration ({})", file.display()).bold().cyan());
            println!();
            println!("  dataset:                     {}", config.dataset);
            println!("  model:                       {}", config.model);
            println!("  batch_size:                  {}", t.batch_size);
            println!("  epochs:                      {}", t.epochs);
            println!("  learning_rate:               {}", t.learning_rate);
            println!("  max_sequence_length:         {}", t.max_sequence_length);
            println!("  warmup_steps:                {}", t.warmup_steps);
            println!("  weight_decay:                {}", t.weight_decay);
            println!("  gradient_accumulation_steps: {}", t.gradient_accumulation_steps);
            println!("  device_preference:           {}", t.device_preference);
            println!();
            Ok(())
        }
    }
}
