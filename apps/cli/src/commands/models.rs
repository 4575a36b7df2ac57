//! `tuner models`: base models and finished training jobs.

use crate::config::CliContext;
use anyhow::{Context, Result};
use chrono::Local;
use colored::Colorize;
use serde_json::json;
use tuner_training::discover_trained_models;

pub fn execute(ctx: &CliContext, trained: bool, json_output: bool) -> Result<()> {
    if trained { list_trained(ctx, json_output) } else { list_base(ctx, json_output) }
}

fn list_base(ctx: &CliContext, json_output: bool) -> Result<()> {
    let models = ctx.layout.list_models().context("Failed to list base models")?;

    if json_output {
        let out: Vec<_> = models
            .iter()
            .map(|p| json!({ "name": p.file_name().map(|n| n.to_string_lossy().into_owned()), "path": p }))
            .collect();
        println!("{}", serde_json::to_string_pretty(&out)?);
        return Ok(());
    }

    println!();
    println!("{}", format!("Base Models ({})", models.len()).bold().cyan());
    println!();
    if models.is_empty() {
        println!("  {}", format!("No models found in {}", ctx.layout.models_dir().display()).dimmed());
        println!();
        return Ok(());
    }
    for path in &models {
        let name = path.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default();
        println!("  {} {}", name.cyan(), path.display().to_string().dimmed());
    }
    println!();
    Ok(())
}

fn list_trained(ctx: &CliContext, json_output: bool) -> Result<()> {
    let models =
        discover_trained_models(ctx.layout.trained_models_dir()).context("Failed to discover trained models")?;

    if json_output {
        let out: Vec<_> = models
            .into_iter()
            .map(|m| {
                json!({
                    "id": m.trained_model_id,
                    "job_id": m.manifest.job_id.0,
                    "engine": m.manifest.engine,
                    "checkpoint_path": m.checkpoint_path,
                    "created_at": m.manifest.created_at,
                    "base_model": m.manifest.base_model,
                    "dataset_id": m.manifest.dataset_id.0,
                    "steps": m.manifest.metrics.steps,
                    "final_loss": m.manifest.metrics.final_loss,
                })
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&out)?);
        return Ok(());
    }

    println!();
    println!("{}", format!("Trained Models ({})", models.len()).bold().cyan());
    println!();
    if models.is_empty() {
        println!("  {}", "No trained models found for this workspace.".dimmed());
        println!();
        println!("  {}", "Tip: run `tuner train --dataset <name> --model <name>` to produce one.".dimmed());
        return Ok(());
    }

    println!("{:<46} {:<18} {:>8} {}", "ID", "Created", "Loss", "Checkpoint");
    println!("{}", "─".repeat(100));
    for m in models {
        let created = m.manifest.created_at.with_timezone(&Local).format("%Y-%m-%d %H:%M").to_string();
        let loss = m.manifest.metrics.final_loss.map_or_else(|| "-".to_string(), |l| format!("{l:.4}"));
        let checkpoint = m.checkpoint_path.map(|p| p.display().to_string()).unwrap_or_default();
        println!("{:<46} {:<18} {:>8} {}", m.trained_model_id.cyan(), created, loss, checkpoint.dimmed());
    }
    println!();
    Ok(())
}
