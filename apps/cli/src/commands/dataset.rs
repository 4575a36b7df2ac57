//! Dataset commands: `convert`, `preview` and `datasets`.

use crate::config::CliContext;
use anyhow::{Context, Result};
use colored::Colorize;
use serde_json::Value;
use std::path::Path;
use tuner_training::{convert, convert_into, preview, DatasetFormat, TargetFormat};

pub fn convert_dataset(ctx: &CliContext, source: &str, target: TargetFormat, out_dir: Option<&Path>) -> Result<()> {
    let source_path = ctx.layout.resolve_dataset(source)?;
    let written = match out_dir {
        Some(dir) => convert_into(&source_path, target, dir)?,
        None => convert(&source_path, target)?,
    };

    println!("{} {}", "Converted".green().bold(), source_path.display());
    println!("  Wrote: {}", written.display().to_string().cyan());
    Ok(())
}

pub fn preview_dataset(ctx: &CliContext, dataset: &str, limit: usize, json_output: bool) -> Result<()> {
    let path = ctx.layout.resolve_dataset(dataset)?;
    let records = preview(&path, limit)?;

    if json_output {
        println!("{}", serde_json::to_string_pretty(&records)?);
        return Ok(());
    }

    println!();
    println!("{}", format!("Preview of {} (first {})", path.display(), records.len()).bold().cyan());
    println!();
    for (i, record) in records.iter().enumerate() {
        let text = record.get("text").and_then(Value::as_str).unwrap_or("");
        println!("  {} {}", format!("[{}]", i + 1).dimmed(), text);
        for (key, value) in record.iter().filter(|(k, _)| k.as_str() != "text") {
            match value {
                Value::Null => {}
                Value::String(s) => println!("      {}: {}", key.dimmed(), s),
                other => println!("      {}: {}", key.dimmed(), other),
            }
        }
    }
    println!();
    Ok(())
}

pub fn list(ctx: &CliContext, json_output: bool) -> Result<()> {
    let data_dir = ctx.layout.data_dir();
    let entries = ctx.layout.list_datasets().with_context(|| format!("Failed to list {}", data_dir.display()))?;

    if json_output {
        let out: Vec<_> = entries
            .iter()
            .map(|p| {
                serde_json::json!({
                    "name": p.file_name().map(|n| n.to_string_lossy().into_owned()),
                    "path": p,
                    "format": DatasetFormat::detect(p).map(|f| f.to_string()),
                })
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&out)?);
        return Ok(());
    }

    println!();
    println!("{}", format!("Datasets ({})", entries.len()).bold().cyan());
    println!();
    if entries.is_empty() {
        println!("  {}", format!("No datasets found in {}", data_dir.display()).dimmed());
        println!();
        return Ok(());
    }

    println!("{:<32} {}", "Name", "Format");
    println!("{}", "─".repeat(48));
    for path in &entries {
        let name = path.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default();
        let format = DatasetFormat::detect(path).map_or_else(|| "?".to_string(), |f| f.to_string());
        println!("{:<32} {}", name.cyan(), format.dimmed());
    }
    println!();
    Ok(())
}
