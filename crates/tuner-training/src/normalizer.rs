//! Dataset normalization.
//!
//! Every supported source shape is read into a list of JSON object records first;
//! [`load`] then applies the row policy and builds a [`Dataset`]. The converter
//! reuses the record reader so extra fields survive a format change.

use crate::dataset::{Dataset, DatasetFormat, Example};
use crate::error::IngestionError;
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// One raw dataset row.
pub type Record = Map<String, Value>;

/// Number of records shown by [`preview`] when the caller has no preference.
pub const DEFAULT_PREVIEW_LIMIT: usize = 5;

const TEXT_EXTENSIONS: &[&str] = &["txt", "md"];

/// Raw rows read from a source, before the text policy is applied.
#[derive(Debug, Clone)]
pub struct RecordSet {
    pub format: DatasetFormat,
    pub records: Vec<Record>,
    pub warnings: Vec<String>,
}

/// Whether directory sources should look for `images/<stem>.jpg` companions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ImagePairing {
    Ignore,
    Pair,
}

/// Load a dataset from a directory, `.jsonl`, `.json` or `.csv` source.
pub fn load(source_path: &Path) -> Result<Dataset, IngestionError> {
    let set = read_records(source_path, ImagePairing::Ignore)?;
    let RecordSet { format, records, mut warnings } = set;
    let trim = matches!(format, DatasetFormat::Directory | DatasetFormat::Csv);

    let mut examples = Vec::with_capacity(records.len());
    for (idx, record) in records.into_iter().enumerate() {
        match example_from_record(&record, trim) {
            Ok(example) => examples.push(example),
            Err(reason) => {
                tracing::warn!(
                    path = %source_path.display(),
                    row = idx + 1,
                    reason = %reason,
                    "Dropping dataset row"
                );
                warnings.push(format!("row {}: {reason}", idx + 1));
            }
        }
    }

    let dataset = Dataset::from_parts(examples, source_path.to_path_buf(), format, warnings)?;
    tracing::info!(
        path = %source_path.display(),
        format = %format,
        examples = dataset.len(),
        warnings = dataset.warnings().len(),
        "Dataset loaded"
    );
    Ok(dataset)
}

/// First `limit` raw records of a dataset, for display.
pub fn preview(source_path: &Path, limit: usize) -> Result<Vec<Record>, IngestionError> {
    let mut set = read_records(source_path, ImagePairing::Pair)?;
    set.records.truncate(limit);
    Ok(set.records)
}

/// Selectable datasets in `data_dir`: sub-directories and structured files, by name.
pub fn list_datasets(data_dir: &Path) -> std::io::Result<Vec<PathBuf>> {
    if !data_dir.is_dir() {
        return Ok(Vec::new());
    }

    let mut out = Vec::new();
    for entry in WalkDir::new(data_dir).min_depth(1).max_depth(1).sort_by_file_name() {
        let entry = entry.map_err(std::io::Error::other)?;
        let path = entry.path();
        let is_dataset = entry.file_type().is_dir()
            || matches!(
                DatasetFormat::detect(path),
                Some(DatasetFormat::Jsonl | DatasetFormat::Json | DatasetFormat::Csv)
            );
        if is_dataset {
            out.push(path.to_path_buf());
        }
    }
    Ok(out)
}

fn example_from_record(record: &Record, trim: bool) -> Result<Example, String> {
    let text = match record.get("text") {
        None | Some(Value::Null) => return Err("missing `text`".to_string()),
        Some(Value::String(s)) => s,
        Some(other) => return Err(format!("`text` is not a string ({})", json_kind(other))),
    };
    let text = if trim { text.trim() } else { text.as_str() };
    if text.is_empty() {
        return Err("empty `text`".to_string());
    }

    let image_ref = match record.get("image") {
        Some(Value::String(s)) if !s.trim().is_empty() => Some(PathBuf::from(s.trim())),
        _ => None,
    };

    Ok(Example { text: text.to_string(), image_ref })
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

pub(crate) fn read_records(path: &Path, images: ImagePairing) -> Result<RecordSet, IngestionError> {
    if !path.exists() {
        return Err(IngestionError::NotFound(path.to_path_buf()));
    }
    let format =
        DatasetFormat::detect(path).ok_or_else(|| IngestionError::UnsupportedFormat(path.to_path_buf()))?;

    let mut warnings = Vec::new();
    let records = match format {
        DatasetFormat::Directory => read_directory(path, images, &mut warnings)?,
        DatasetFormat::Jsonl => read_jsonl(path, &mut warnings)?,
        DatasetFormat::Json => read_json(path, &mut warnings)?,
        DatasetFormat::Csv => read_csv(path, &mut warnings)?,
    };

    Ok(RecordSet { format, records, warnings })
}

fn read_to_string(path: &Path) -> Result<String, IngestionError> {
    std::fs::read_to_string(path).map_err(|cause| IngestionError::Read { path: path.to_path_buf(), cause })
}

fn read_directory(
    root: &Path,
    images: ImagePairing,
    warnings: &mut Vec<String>,
) -> Result<Vec<Record>, IngestionError> {
    let text_dir = root.join("text");
    if !text_dir.is_dir() {
        return Err(IngestionError::MissingTextDir(text_dir));
    }
    let image_dir = root.join("images");

    let mut records = Vec::new();
    for entry in WalkDir::new(&text_dir).min_depth(1).max_depth(1).sort_by_file_name() {
        let entry = match entry {
            Ok(e) => e,
            Err(e) => {
                tracing::warn!(dir = %text_dir.display(), error = %e, "Skipping unreadable entry");
                warnings.push(format!("unreadable entry: {e}"));
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }
        let path = entry.path();
        let is_text = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| TEXT_EXTENSIONS.iter().any(|t| e.eq_ignore_ascii_case(t)));
        if !is_text {
            continue;
        }

        let content = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) => {
                tracing::warn!(file = %path.display(), error = %e, "Skipping unreadable text file");
                warnings.push(format!("{}: {e}", path.display()));
                continue;
            }
        };

        let mut record = Record::new();
        record.insert("text".to_string(), Value::String(content.trim().to_string()));
        if images == ImagePairing::Pair {
            let image = path
                .file_stem()
                .map(|stem| image_dir.join(format!("{}.jpg", stem.to_string_lossy())))
                .filter(|p| p.is_file())
                .map_or(Value::Null, |p| Value::String(p.to_string_lossy().into_owned()));
            record.insert("image".to_string(), image);
        }
        records.push(record);
    }

    Ok(records)
}

fn read_jsonl(path: &Path, warnings: &mut Vec<String>) -> Result<Vec<Record>, IngestionError> {
    let contents = read_to_string(path)?;
    let mut records = Vec::new();

    for (idx, line) in contents.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        match serde_json::from_str::<Value>(line) {
            Ok(Value::Object(record)) => records.push(record),
            Ok(other) => {
                tracing::warn!(path = %path.display(), line = idx + 1, "Skipping non-object JSON line");
                warnings.push(format!("line {}: expected an object, found {}", idx + 1, json_kind(&other)));
            }
            Err(e) => {
                tracing::warn!(path = %path.display(), line = idx + 1, error = %e, "Skipping invalid JSON line");
                warnings.push(format!("line {}: {e}", idx + 1));
            }
        }
    }

    Ok(records)
}

fn read_json(path: &Path, warnings: &mut Vec<String>) -> Result<Vec<Record>, IngestionError> {
    let contents = read_to_string(path)?;
    let value: Value = serde_json::from_str(&contents)
        .map_err(|e| IngestionError::Parse { path: path.to_path_buf(), reason: e.to_string() })?;

    match value {
        Value::Object(record) => Ok(vec![record]),
        Value::Array(items) => {
            let mut records = Vec::with_capacity(items.len());
            for (idx, item) in items.into_iter().enumerate() {
                match item {
                    Value::Object(record) => records.push(record),
                    other => {
                        warnings.push(format!("item {}: expected an object, found {}", idx, json_kind(&other)));
                    }
                }
            }
            Ok(records)
        }
        other => Err(IngestionError::Parse {
            path: path.to_path_buf(),
            reason: format!("expected an array or object, found {}", json_kind(&other)),
        }),
    }
}

fn read_csv(path: &Path, warnings: &mut Vec<String>) -> Result<Vec<Record>, IngestionError> {
    let bytes = std::fs::read(path).map_err(|cause| IngestionError::Read { path: path.to_path_buf(), cause })?;
    let mut reader = csv::ReaderBuilder::new().flexible(true).from_reader(bytes.as_slice());

    let headers: Vec<String> = reader
        .headers()
        .map_err(|e| IngestionError::Parse { path: path.to_path_buf(), reason: e.to_string() })?
        .iter()
        .map(|h| h.trim().to_string())
        .collect();
    if !headers.iter().any(|h| h == "text") {
        return Err(IngestionError::MissingTextColumn(path.to_path_buf()));
    }

    let mut records = Vec::new();
    for (idx, row) in reader.records().enumerate() {
        let row = match row {
            Ok(r) => r,
            Err(e) => {
                tracing::warn!(path = %path.display(), row = idx + 1, error = %e, "Skipping malformed CSV row");
                warnings.push(format!("csv row {}: {e}", idx + 1));
                continue;
            }
        };
        let mut record = Record::new();
        for (i, header) in headers.iter().enumerate() {
            let value = match row.get(i) {
                Some(cell) if !cell.is_empty() => Value::String(cell.to_string()),
                _ => Value::Null,
            };
            record.insert(header.clone(), value);
        }
        records.push(record);
    }

    Ok(records)
}
