//! Tracing setup: a console layer plus an append-only log file.

use crate::error::TrainingResult;
use std::fs::OpenOptions;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

#[derive(Debug, Clone)]
pub struct LogSettings {
    /// Default console filter; `RUST_LOG` overrides it.
    pub console_level: String,
    pub file_level: String,
    /// Append-only log file. `None` disables the file layer.
    pub file: Option<PathBuf>,
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            console_level: "info".to_string(),
            file_level: "info".to_string(),
            file: Some(PathBuf::from("training.log")),
        }
    }
}

/// Installs the global subscriber. Returns `false` if one was already set.
pub fn init_logging(settings: &LogSettings) -> TrainingResult<bool> {
    let console_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&settings.console_level));
    let console = fmt::layer()
        .with_writer(std::io::stderr)
        .without_time()
        .with_target(false)
        .with_filter(console_filter);

    let file_layer = match &settings.file {
        Some(path) => {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent)?;
            }
            let file = OpenOptions::new().create(true).append(true).open(path)?;
            Some(
                fmt::layer()
                    .with_writer(Mutex::new(file))
                    .with_ansi(false)
                    .with_filter(EnvFilter::new(&settings.file_level)),
            )
        }
        None => None,
    };

    Ok(tracing_subscriber::registry().with(console).with(file_layer).try_init().is_ok())
}

/// Last `lines` lines of the log file; a missing file has none.
pub fn read_log_tail(path: &Path, lines: usize) -> std::io::Result<Vec<String>> {
    let file = match std::fs::File::open(path) {
        Ok(f) => f,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e),
    };

    let mut tail = std::collections::VecDeque::with_capacity(lines.min(4096));
    for line in BufReader::new(file).lines() {
        if tail.len() == lines {
            tail.pop_front();
        }
        if lines > 0 {
            tail.push_back(line?);
        }
    }
    Ok(tail.into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_read_log_tail_keeps_last_lines() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("training.log");
        std::fs::write(&path, "one\ntwo\nthree\nfour\n").unwrap();

        assert_eq!(read_log_tail(&path, 2).unwrap(), vec!["three", "four"]);
        assert_eq!(read_log_tail(&path, 10).unwrap().len(), 4);
        assert!(read_log_tail(&path, 0).unwrap().is_empty());
    }

    #[test]
    fn test_read_log_tail_missing_file() {
        let temp = TempDir::new().unwrap();
        assert!(read_log_tail(&temp.path().join("none.log"), 5).unwrap().is_empty());
    }
}
