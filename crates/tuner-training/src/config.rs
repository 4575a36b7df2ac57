//! Studio settings file (`tuner.toml`).

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Environment variable that points at an explicit settings file.
pub const CONFIG_ENV_VAR: &str = "TUNER_CONFIG";

/// Settings file name looked up in the workspace root.
pub const CONFIG_FILE_NAME: &str = "tuner.toml";

/// How `pause` affects a running job.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PauseMode {
    /// Status and progress relay pause; the engine keeps stepping.
    #[default]
    Visual,
    /// The engine blocks at the next step boundary until resume or cancel.
    Strict,
}

/// Low-rank adapter settings handed to the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AdapterConfig {
    pub rank: u32,
    pub alpha: u32,
    pub target_modules: Vec<String>,
    pub dropout: f64,
}

impl Default for AdapterConfig {
    fn default() -> Self {
        Self {
            rank: 8,
            alpha: 32,
            target_modules: ["q_proj", "k_proj", "v_proj", "o_proj"].map(String::from).to_vec(),
            dropout: 0.05,
        }
    }
}

/// Workspace-wide settings. Relative paths resolve against the workspace root.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StudioConfig {
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    #[serde(default = "default_models_dir")]
    pub models_dir: PathBuf,

    #[serde(default = "default_trained_models_dir")]
    pub trained_models_dir: PathBuf,

    /// Append-only training log
    #[serde(default = "default_log_file")]
    pub log_file: PathBuf,

    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Bounded progress channel size
    #[serde(default = "default_progress_capacity")]
    pub progress_capacity: usize,

    #[serde(default)]
    pub pause_mode: PauseMode,

    #[serde(default)]
    pub adapter: AdapterConfig,
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("data")
}

fn default_models_dir() -> PathBuf {
    PathBuf::from("models")
}

fn default_trained_models_dir() -> PathBuf {
    PathBuf::from("trained_models")
}

fn default_log_file() -> PathBuf {
    PathBuf::from("training.log")
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_progress_capacity() -> usize {
    64
}

impl Default for StudioConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            models_dir: default_models_dir(),
            trained_models_dir: default_trained_models_dir(),
            log_file: default_log_file(),
            log_level: default_log_level(),
            progress_capacity: default_progress_capacity(),
            pause_mode: PauseMode::default(),
            adapter: AdapterConfig::default(),
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigFileError {
    #[error("Configuration file not found: {0}")]
    NotFound(String),

    #[error("Failed to read configuration file: {0}")]
    ReadError(String),

    #[error("Failed to parse configuration file: {0}")]
    ParseError(String),

    #[error("Failed to write configuration file: {0}")]
    WriteError(String),
}

pub type ConfigFileResult<T> = std::result::Result<T, ConfigFileError>;

impl StudioConfig {
    pub fn load_from_file(path: &Path) -> ConfigFileResult<Self> {
        if !path.exists() {
            return Err(ConfigFileError::NotFound(path.display().to_string()));
        }

        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigFileError::ReadError(format!("{}: {}", path.display(), e)))?;

        toml::from_str(&content).map_err(|e| ConfigFileError::ParseError(format!("{}: {}", path.display(), e)))
    }

    pub fn save_to_file(&self, path: &Path) -> ConfigFileResult<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| ConfigFileError::ParseError(format!("Failed to serialize: {}", e)))?;

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .map_err(|e| ConfigFileError::WriteError(format!("Failed to create directory: {}", e)))?;
        }

        std::fs::write(path, content)
            .map_err(|e| ConfigFileError::WriteError(format!("{}: {}", path.display(), e)))
    }

    /// Path of the settings file for `workspace_root`, honouring `TUNER_CONFIG`.
    pub fn default_path(workspace_root: &Path) -> PathBuf {
        std::env::var_os(CONFIG_ENV_VAR)
            .map_or_else(|| workspace_root.join(CONFIG_FILE_NAME), PathBuf::from)
    }

    /// Loads the workspace settings; a missing or unreadable file yields defaults.
    pub fn discover(workspace_root: &Path) -> Self {
        let path = Self::default_path(workspace_root);
        match Self::load_from_file(&path) {
            Ok(config) => config,
            Err(ConfigFileError::NotFound(_)) => Self::default(),
            Err(e) => {
                tracing::warn!(error = %e, "Ignoring settings file, using defaults");
                Self::default()
            }
        }
    }
}
