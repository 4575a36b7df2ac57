use crate::dataset::DatasetFormat;
use crate::error::ConversionError;
use crate::normalizer::{read_records, ImagePairing, Record};
use serde_json::Value;
use std::fmt;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Serialized formats a dataset can be converted into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TargetFormat {
    Jsonl,
    Json,
    Csv,
}

impl TargetFormat {
    pub fn extension(self) -> &'static str {
        match self {
            Self::Jsonl => "jsonl",
            Self::Json => "json",
            Self::Csv => "csv",
        }
    }
}

impl fmt::Display for TargetFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

impl FromStr for TargetFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "jsonl" => Ok(Self::Jsonl),
            "json" => Ok(Self::Json),
            "csv" => Ok(Self::Csv),
            other => Err(format!("unsupported target format `{other}` (expected jsonl, json or csv)")),
        }
    }
}

impl From<TargetFormat> for DatasetFormat {
    fn from(format: TargetFormat) -> Self {
        match format {
            TargetFormat::Jsonl => Self::Jsonl,
            TargetFormat::Json => Self::Json,
            TargetFormat::Csv => Self::Csv,
        }
    }
}

/// Convert a dataset, writing `<stem>.<ext>` next to the source.
pub fn convert(source_path: &Path, target: TargetFormat) -> Result<PathBuf, ConversionError> {
    let target_dir = match source_path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };
    convert_into(source_path, target, &target_dir)
}

/// Convert a dataset into `target_dir`. The source file is never overwritten.
pub fn convert_into(
    source_path: &Path,
    target: TargetFormat,
    target_dir: &Path,
) -> Result<PathBuf, ConversionError> {
    let set = read_records(source_path, ImagePairing::Pair)?;
    for warning in &set.warnings {
        tracing::warn!(source = %source_path.display(), "{warning}");
    }

    let stem = source_path
        .file_stem()
        .ok_or_else(|| ConversionError::UnsupportedSource(source_path.to_path_buf()))?;
    let mut file_name = stem.to_os_string();
    file_name.push(".");
    file_name.push(target.extension());
    let target_path = target_dir.join(file_name);

    if is_same_file(source_path, &target_path) {
        return Err(ConversionError::WouldOverwriteSource(source_path.to_path_buf()));
    }

    let bytes = match target {
        TargetFormat::Jsonl => to_jsonl(&set.records)?,
        TargetFormat::Json => to_json(&set.records)?,
        TargetFormat::Csv => to_csv(&set.records)?,
    };

    write_atomically(target_dir, &target_path, &bytes)?;
    tracing::info!(
        source = %source_path.display(),
        target = %target_path.display(),
        records = set.records.len(),
        "Dataset converted"
    );
    Ok(target_path)
}

fn is_same_file(a: &Path, b: &Path) -> bool {
    if a == b {
        return true;
    }
    match (a.canonicalize(), b.canonicalize()) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}

fn write_atomically(dir: &Path, target: &Path, bytes: &[u8]) -> Result<(), ConversionError> {
    let not_writable = |cause| ConversionError::TargetNotWritable { path: dir.to_path_buf(), cause };

    std::fs::create_dir_all(dir).map_err(not_writable)?;
    let mut tmp = tempfile::NamedTempFile::new_in(dir).map_err(not_writable)?;
    tmp.write_all(bytes).map_err(not_writable)?;
    tmp.persist(target).map_err(|e| not_writable(e.error))?;
    Ok(())
}

fn to_jsonl(records: &[Record]) -> Result<Vec<u8>, ConversionError> {
    let mut out = Vec::new();
    for record in records {
        serde_json::to_writer(&mut out, record)
            .map_err(|e| ConversionError::Serialize { format: "jsonl", reason: e.to_string() })?;
        out.push(b'\n');
    }
    Ok(out)
}

fn to_json(records: &[Record]) -> Result<Vec<u8>, ConversionError> {
    serde_json::to_vec_pretty(records)
        .map_err(|e| ConversionError::Serialize { format: "json", reason: e.to_string() })
}

/// Union of record keys in first-seen order; `text` alone when there are none.
fn csv_header(records: &[Record]) -> Vec<String> {
    let mut header: Vec<String> = Vec::new();
    for key in records.iter().flat_map(|r| r.keys()) {
        if !header.iter().any(|h| h == key) {
            header.push(key.clone());
        }
    }
    if header.is_empty() {
        header.push("text".to_string());
    }
    header
}

fn csv_cell(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    }
}

fn to_csv(records: &[Record]) -> Result<Vec<u8>, ConversionError> {
    let serialize_err = |e: csv::Error| ConversionError::Serialize { format: "csv", reason: e.to_string() };
    let header = csv_header(records);

    let mut writer = csv::WriterBuilder::new().from_writer(Vec::new());
    writer.write_record(&header).map_err(serialize_err)?;
    for record in records {
        writer
            .write_record(header.iter().map(|key| csv_cell(record.get(key))))
            .map_err(serialize_err)?;
    }
    writer
        .into_inner()
        .map_err(|e| ConversionError::Serialize { format: "csv", reason: e.to_string() })
}
