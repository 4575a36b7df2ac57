//! `tuner estimate`: projected memory needs for a dataset and model.

use crate::config::CliContext;
use anyhow::{Context, Result};
use colored::Colorize;
use tuner_training::{estimate, HostTelemetry};

pub fn execute(ctx: &CliContext, dataset: &str, model: &str, json_output: bool) -> Result<()> {
    let dataset_path = ctx.layout.resolve_dataset(dataset)?;
    let model_path = ctx.layout.resolve_model(model).with_context(|| format!("Model not found: {model}"))?;
    let result = estimate(&dataset_path, &model_path, &HostTelemetry::new());

    if json_output {
        println!("{}", serde_json::to_string_pretty(&result)?);
        return Ok(());
    }

    let available = |mb: Option<f64>| mb.map_or_else(|| "unknown".dimmed().to_string(), |v| format!("{v:.0} MB"));

    println!();
    println!("{}", "Resource Estimate".bold().cyan());
    println!();
    println!("  RAM:  {:>10.1} MB projected, {} available", result.projected_ram_mb, available(result.available_ram_mb));
    println!(
        "  VRAM: {:>10.1} MB projected, {} available",
        result.projected_vram_mb,
        available(result.available_vram_mb)
    );
    println!();
    match result.warning() {
        Some(warning) => println!("  {}", warning.yellow().bold()),
        None => println!("  {}", "Sufficient memory available".green()),
    }
    println!();
    Ok(())
}
