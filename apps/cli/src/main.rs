//! Tuner CLI - Command-line front end for local fine-tuning jobs
//!
//! Provides a `tuner` command for preparing datasets, checking resources and
//! running one training job at a time with pause and cancel controls.

mod commands;
mod config;
mod engine;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tuner_training::{init_logging, LogSettings, TargetFormat};

use commands::{config as config_cmd, dataset, estimate, logs, models, train, ConfigCommand, TrainArgs};
use config::CliContext;

/// Tuner - Local fine-tuning studio
#[derive(Parser, Debug)]
#[command(
    name = "tuner",
    author,
    version,
    about = "Tuner - Local fine-tuning studio",
    long_about = "Tuner prepares text datasets, estimates memory needs and runs fine-tuning jobs\nwith live progress, pause and cancel."
)]
struct Args {
    /// Console log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "warn", global = true)]
    log_level: String,

    /// Workspace directory (overrides TUNER_WORKSPACE)
    #[arg(short = 'w', long, global = true)]
    workspace: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run a fine-tuning job
    ///
    /// Loads the dataset, attaches an adapter to the base model and trains it,
    /// writing the result under trained_models/<job_id>.
    Train(TrainArgs),

    /// Estimate memory needs for a dataset and model
    Estimate {
        #[arg(long)]
        dataset: String,

        #[arg(long)]
        model: String,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Convert a dataset to JSONL, JSON or CSV
    ///
    /// The converted file is named after the source and written next to it
    /// unless --out-dir is given.
    Convert {
        /// Dataset name in data/ or a path
        source: String,

        /// Target format (jsonl, json, csv)
        #[arg(long = "to")]
        to: TargetFormat,

        /// Directory for the converted file
        #[arg(long)]
        out_dir: Option<PathBuf>,
    },

    /// Show the first records of a dataset
    Preview {
        dataset: String,

        #[arg(long, default_value_t = 5)]
        limit: usize,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// List datasets in the data directory
    Datasets {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// List base models, or finished jobs with --trained
    Models {
        #[arg(long)]
        trained: bool,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Save or show job configuration files
    #[command(subcommand)]
    Config(ConfigCommand),

    /// Show the end of the training log
    Logs {
        #[arg(long, default_value_t = 50)]
        tail: usize,
    },
}

impl Command {
    /// Commands whose activity belongs in the training log.
    fn writes_log(&self) -> bool {
        matches!(self, Self::Train(_) | Self::Estimate { .. } | Self::Convert { .. })
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let ctx = CliContext::load(args.workspace)?;

    let settings = LogSettings {
        console_level: args.log_level,
        file_level: ctx.studio.log_level.clone(),
        file: args.command.writes_log().then(|| ctx.layout.log_file().to_path_buf()),
    };
    init_logging(&settings)?;
    tracing::debug!(workspace = %ctx.workspace.display(), "Workspace resolved");

    match args.command {
        Command::Train(train_args) => train::execute(&ctx, train_args).await,
        Command::Estimate { dataset, model, json } => estimate::execute(&ctx, &dataset, &model, json),
        Command::Convert { source, to, out_dir } => dataset::convert_dataset(&ctx, &source, to, out_dir.as_deref()),
        Command::Preview { dataset: name, limit, json } => dataset::preview_dataset(&ctx, &name, limit, json),
        Command::Datasets { json } => dataset::list(&ctx, json),
        Command::Models { trained, json } => models::execute(&ctx, trained, json),
        Command::Config(command) => config_cmd::execute(command),
        Command::Logs { tail } => logs::execute(&ctx, tail),
    }
}
