use crate::error::{IngestionError, TrainingResult};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Placeholder substituted for text that is blank at materialization time.
pub const UNKNOWN_TOKEN_TEXT: &str = "[UNK]";

/// Label value excluded from the loss.
pub const IGNORE_INDEX: i64 = -100;

/// Stable identifier for a dataset (content hash).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DatasetId(pub String);

impl fmt::Display for DatasetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// A single training example.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Example {
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_ref: Option<PathBuf>,
}

impl Example {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into(), image_ref: None }
    }
}

/// Declared on-disk shape of a dataset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DatasetFormat {
    /// `<root>/text/*.txt|*.md`
    Directory,
    Jsonl,
    Json,
    Csv,
}

impl DatasetFormat {
    /// Maps a path to its format: directories by kind, files by extension.
    pub fn detect(path: &Path) -> Option<Self> {
        if path.is_dir() {
            return Some(Self::Directory);
        }
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "jsonl" => Some(Self::Jsonl),
            "json" => Some(Self::Json),
            "csv" => Some(Self::Csv),
            _ => None,
        }
    }

    /// File extension for file formats; `None` for directories.
    pub fn extension(self) -> Option<&'static str> {
        match self {
            Self::Directory => None,
            Self::Jsonl => Some("jsonl"),
            Self::Json => Some("json"),
            Self::Csv => Some("csv"),
        }
    }
}

impl fmt::Display for DatasetFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Directory => "directory",
            Self::Jsonl => "jsonl",
            Self::Json => "json",
            Self::Csv => "csv",
        })
    }
}

impl FromStr for DatasetFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "dir" | "directory" => Ok(Self::Directory),
            "jsonl" => Ok(Self::Jsonl),
            "json" => Ok(Self::Json),
            "csv" => Ok(Self::Csv),
            other => Err(format!("unknown dataset format `{other}`")),
        }
    }
}

/// Ordered, immutable collection of examples with provenance.
///
/// Always holds at least one example.
#[derive(Debug, Clone)]
pub struct Dataset {
    examples: Vec<Example>,
    source_path: PathBuf,
    format: DatasetFormat,
    warnings: Vec<String>,
}

impl Dataset {
    pub fn from_parts(
        examples: Vec<Example>,
        source_path: PathBuf,
        format: DatasetFormat,
        warnings: Vec<String>,
    ) -> Result<Self, IngestionError> {
        if examples.is_empty() {
            return Err(IngestionError::Empty(source_path));
        }
        Ok(Self { examples, source_path, format, warnings })
    }

    pub fn len(&self) -> usize {
        self.examples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.examples.is_empty()
    }

    pub fn get(&self, idx: usize) -> Option<&Example> {
        self.examples.get(idx)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Example> {
        self.examples.iter()
    }

    pub fn examples(&self) -> &[Example] {
        &self.examples
    }

    pub fn source_path(&self) -> &Path {
        &self.source_path
    }

    pub fn format(&self) -> DatasetFormat {
        self.format
    }

    /// Row-level problems recorded while loading.
    pub fn warnings(&self) -> &[String] {
        &self.warnings
    }

    pub fn id(&self) -> TrainingResult<DatasetId> {
        compute_dataset_id(&self.examples)
    }
}

impl<'a> IntoIterator for &'a Dataset {
    type Item = &'a Example;
    type IntoIter = std::slice::Iter<'a, Example>;

    fn into_iter(self) -> Self::IntoIter {
        self.examples.iter()
    }
}

pub fn compute_dataset_id(examples: &[Example]) -> TrainingResult<DatasetId> {
    let mut hasher = Sha256::new();

    for ex in examples {
        let bytes = serde_json::to_vec(ex)?;
        hasher.update(bytes);
        hasher.update(b"\n");
    }

    Ok(DatasetId(hex::encode(hasher.finalize())))
}

/// Text-to-token mapping supplied by the training engine.
pub trait Tokenizer: Send + Sync {
    fn encode(&self, text: &str) -> Vec<u32>;

    fn pad_token_id(&self) -> u32;
}

/// Fixed-length model input for one example.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedExample {
    pub input_ids: Vec<u32>,
    pub attention_mask: Vec<u8>,
    pub labels: Vec<i64>,
    pub image_ref: Option<PathBuf>,
}

/// Lazily tokenizes a [`Dataset`] to `max_len` tokens per example.
pub struct EncodedDataset<'a, T: Tokenizer + ?Sized> {
    dataset: &'a Dataset,
    tokenizer: &'a T,
    max_len: usize,
}

impl<'a, T: Tokenizer + ?Sized> EncodedDataset<'a, T> {
    pub fn new(dataset: &'a Dataset, tokenizer: &'a T, max_len: usize) -> Self {
        Self { dataset, tokenizer, max_len: max_len.max(1) }
    }

    pub fn len(&self) -> usize {
        self.dataset.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dataset.is_empty()
    }

    pub fn max_len(&self) -> usize {
        self.max_len
    }

    pub fn get(&self, idx: usize) -> Option<EncodedExample> {
        let example = self.dataset.get(idx)?;
        let text = if example.text.trim().is_empty() {
            tracing::warn!(index = idx, "Empty text at materialization, using placeholder");
            UNKNOWN_TOKEN_TEXT
        } else {
            example.text.as_str()
        };

        let mut input_ids = self.tokenizer.encode(text);
        input_ids.truncate(self.max_len);
        let real = input_ids.len();
        input_ids.resize(self.max_len, self.tokenizer.pad_token_id());

        let attention_mask: Vec<u8> = (0..self.max_len).map(|i| u8::from(i < real)).collect();
        let labels = input_ids
            .iter()
            .enumerate()
            .map(|(i, &id)| if i < real { i64::from(id) } else { IGNORE_INDEX })
            .collect();

        Some(EncodedExample {
            input_ids,
            attention_mask,
            labels,
            image_ref: example.image_ref.clone(),
        })
    }

    pub fn iter(&self) -> impl Iterator<Item = EncodedExample> + '_ {
        (0..self.len()).filter_map(|idx| self.get(idx))
    }
}
