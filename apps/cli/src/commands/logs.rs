//! `tuner logs`: tail the training log.

use crate::config::CliContext;
use anyhow::{Context, Result};
use colored::Colorize;
use tuner_training::logging::read_log_tail;

pub fn execute(ctx: &CliContext, tail: usize) -> Result<()> {
    let path = ctx.layout.log_file();
    let lines = read_log_tail(path, tail).with_context(|| format!("Failed to read {}", path.display()))?;

    if lines.is_empty() {
        println!("{}", format!("No log entries in {}", path.display()).dimmed());
        return Ok(());
    }
    for line in lines {
        println!("{line}");
    }
    Ok(())
}
