//! `tuner train`: run one fine-tuning job with live progress.
//!
//! While the job runs, stdin lines act as controls: `p` toggles pause and `c` asks
//! to cancel. Ctrl-C cancels without asking.

use crate::commands::types::TrainArgs;
use crate::config::CliContext;
use crate::engine::BigramEngine;
use anyhow::{bail, Context, Result};
use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use std::io::BufRead;
use std::sync::Arc;
use tokio::sync::mpsc;
use tuner_training::{
    Confirmation, HostTelemetry, JobConfigFile, JobPhase, JobRequest, Orchestrator, OrchestratorError,
    OrchestratorSettings, PauseMode, ProgressSnapshot,
};

pub async fn execute(ctx: &CliContext, args: TrainArgs) -> Result<()> {
    let saved = match &args.config {
        Some(path) => Some(
            JobConfigFile::load(path)
                .with_context(|| format!("Failed to read job configuration: {}", path.display()))?,
        ),
        None => None,
    };
    let pick = |flag: &Option<String>, from_file: Option<&String>| {
        flag.clone().filter(|s| !s.is_empty()).or_else(|| from_file.filter(|s| !s.is_empty()).cloned())
    };
    let dataset = pick(&args.dataset, saved.as_ref().map(|c| &c.dataset))
        .context("No dataset selected. Pass --dataset or --config.")?;
    let model = pick(&args.model, saved.as_ref().map(|c| &c.model))
        .context("No model selected. Pass --model or --config.")?;
    let config = args.params.apply(saved.map(|c| c.training).unwrap_or_default());

    ctx.layout.ensure_dirs()?;
    let dataset_path = ctx.layout.resolve_dataset(&dataset)?;
    let model_path = ctx
        .layout
        .resolve_model(&model)
        .with_context(|| format!("Model not found: {model} (looked in {})", ctx.layout.models_dir().display()))?;

    let mut settings = OrchestratorSettings::from(&ctx.studio);
    if args.strict_pause {
        settings.pause_mode = PauseMode::Strict;
    }
    let (mut orch, mut progress) =
        Orchestrator::new(Arc::new(BigramEngine::new()), Arc::new(HostTelemetry::new()), settings);

    let estimate = orch.estimate(&dataset_path, &model_path)?;
    if let Some(warning) = estimate.warning() {
        println!("{}", warning.yellow().bold());
    }

    let mut states = orch.subscribe();
    let job_id = orch.start(JobRequest {
        dataset_path: dataset_path.clone(),
        model_path: model_path.clone(),
        output_root: ctx.layout.trained_models_dir().to_path_buf(),
        config,
    })?;

    println!();
    println!("{}", "Training started".bold().cyan());
    println!("  Job:     {}", job_id.0.cyan());
    println!("  Dataset: {}", dataset_path.display().to_string().dimmed());
    println!("  Model:   {}", model_path.display().to_string().dimmed());
    println!("  {}", "Controls: p + Enter to pause/resume, c + Enter to cancel".dimmed());
    println!();

    let bar = ProgressBar::new(0);
    bar.set_style(ProgressStyle::with_template("{bar:40.cyan/blue} {pos}/{len} {msg}")?.progress_chars("##-"));

    let mut input = spawn_stdin_reader();
    let mut stdin_open = true;
    let mut awaiting_confirmation = false;

    loop {
        tokio::select! {
            Some(snapshot) = progress.recv() => render(&bar, &snapshot),
            changed = states.changed() => {
                if changed.is_err() || states.borrow_and_update().phase.is_terminal() {
                    break;
                }
            }
            line = input.recv(), if stdin_open => match line {
                Some(line) => handle_input(&orch, &bar, &line, &mut awaiting_confirmation, args.yes),
                None => stdin_open = false,
            },
            _ = tokio::signal::ctrl_c() => {
                report(&bar, orch.cancel(Confirmation::Confirmed));
            }
        }
    }

    let state = orch.wait().await?;
    while let Ok(snapshot) = progress.try_recv() {
        render(&bar, &snapshot);
    }
    bar.finish_and_clear();

    match state.phase {
        JobPhase::Completed => {
            println!("{}", "Training complete".bold().green());
            println!("  Steps:  {}/{}", state.current_step, state.total_steps);
            if let Some(loss) = state.last_loss {
                println!("  Loss:   {loss:.4}");
            }
            println!("  Output: {}", ctx.layout.job_dir(&job_id).display().to_string().dimmed());
            println!();
            Ok(())
        }
        JobPhase::Cancelled => {
            println!("{}", "Training cancelled".bold().yellow());
            println!("  Stopped at step {}/{}", state.current_step, state.total_steps);
            println!();
            Ok(())
        }
        _ => bail!("Training failed: {}", state.last_error.as_deref().unwrap_or("unknown error")),
    }
}

fn render(bar: &ProgressBar, snapshot: &ProgressSnapshot) {
    if snapshot.total_steps > 0 {
        bar.set_length(snapshot.total_steps);
    }
    bar.set_position(snapshot.current_step);
    let message = match snapshot.loss {
        Some(loss) => format!("{} (loss {loss:.4})", snapshot.status_text),
        None => snapshot.status_text.clone(),
    };
    bar.set_message(message);
}

fn handle_input(
    orch: &Orchestrator<BigramEngine>,
    bar: &ProgressBar,
    line: &str,
    awaiting_confirmation: &mut bool,
    auto_confirm: bool,
) {
    let key = line.trim().to_lowercase();
    if *awaiting_confirmation {
        *awaiting_confirmation = false;
        if matches!(key.as_str(), "y" | "yes") {
            report(bar, orch.cancel(Confirmation::Confirmed));
        } else if orch.cancel(Confirmation::Declined).is_ok() {
            bar.println("Cancel aborted, training continues");
        }
        return;
    }

    match key.as_str() {
        "p" => report(bar, orch.pause()),
        "c" if auto_confirm => report(bar, orch.cancel(Confirmation::Confirmed)),
        "c" => {
            bar.println("Cancel training? [y/N]");
            *awaiting_confirmation = true;
        }
        "" => {}
        other => bar.println(format!("Unknown control `{other}` (p = pause/resume, c = cancel)")),
    }
}

fn report(bar: &ProgressBar, result: Result<JobPhase, OrchestratorError>) {
    match result {
        Ok(JobPhase::Paused) => bar.println("Training paused...".yellow().to_string()),
        Ok(JobPhase::Running) => bar.println("Training resumed".to_string()),
        Ok(JobPhase::Cancelling) => bar.println("Cancelling training...".yellow().to_string()),
        Ok(_) => {}
        Err(e) => bar.println(format!("{}", e.to_string().dimmed())),
    }
}

/// Forwards stdin lines from a plain thread; the channel closes at EOF.
fn spawn_stdin_reader() -> mpsc::UnboundedReceiver<String> {
    let (tx, rx) = mpsc::unbounded_channel();
    std::thread::spawn(move || {
        for line in std::io::stdin().lock().lines() {
            let Ok(line) = line else { break };
            if tx.send(line).is_err() {
                break;
            }
        }
    });
    rx
}
