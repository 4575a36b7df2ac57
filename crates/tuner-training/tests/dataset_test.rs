//! Integration tests for dataset normalization across source shapes.

use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tuner_training::{
    convert_into, load_dataset, preview, DatasetFormat, EncodedDataset, Example, IngestionError, TargetFormat,
    Tokenizer, UNKNOWN_TOKEN_TEXT,
};

struct ByteTokenizer;

impl Tokenizer for ByteTokenizer {
    fn encode(&self, text: &str) -> Vec<u32> {
        text.bytes().map(|b| u32::from(b) + 1).collect()
    }

    fn pad_token_id(&self) -> u32 {
        0
    }
}

fn texts(examples: &[Example]) -> Vec<&str> {
    examples.iter().map(|e| e.text.as_str()).collect()
}

fn text_dir(root: &Path) -> PathBuf {
    let dir = root.join("text");
    fs::create_dir_all(&dir).unwrap();
    dir
}

#[test]
fn test_directory_with_no_valid_files_is_rejected() {
    let temp = TempDir::new().unwrap();
    let dir = text_dir(temp.path());
    fs::write(dir.join("blank.txt"), "   \n").unwrap();
    fs::write(dir.join("photo.png"), "not text").unwrap();

    let err = load_dataset(temp.path()).unwrap_err();
    assert!(matches!(err, IngestionError::Empty(_)));
}

#[test]
fn test_directory_with_one_valid_file() {
    let temp = TempDir::new().unwrap();
    let dir = text_dir(temp.path());
    fs::write(dir.join("only.txt"), "  a single poem \n").unwrap();

    let dataset = load_dataset(temp.path()).unwrap();
    assert_eq!(dataset.len(), 1);
    assert_eq!(dataset.format(), DatasetFormat::Directory);
    assert_eq!(dataset.get(0).unwrap().text, "a single poem");
    assert_eq!(dataset.get(0).unwrap().image_ref, None);
}

#[test]
fn test_directory_files_are_read_in_name_order() {
    let temp = TempDir::new().unwrap();
    let dir = text_dir(temp.path());
    fs::write(dir.join("b.md"), "second").unwrap();
    fs::write(dir.join("a.txt"), "first").unwrap();
    fs::write(dir.join("c.txt"), "third").unwrap();

    let dataset = load_dataset(temp.path()).unwrap();
    assert_eq!(texts(dataset.examples()), vec!["first", "second", "third"]);
}

#[test]
fn test_directory_without_text_subdir() {
    let temp = TempDir::new().unwrap();
    let err = load_dataset(temp.path()).unwrap_err();
    assert!(matches!(err, IngestionError::MissingTextDir(_)));
}

#[test]
fn test_jsonl_skips_malformed_lines_with_warning() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("d.jsonl");
    fs::write(&path, "{\"text\": \"one\"}\n{\"text\": \"two\"}\n{not json\n\n{\"text\": \"three\"}\n").unwrap();

    let dataset = load_dataset(&path).unwrap();
    assert_eq!(dataset.len(), 3);
    assert_eq!(dataset.warnings().len(), 1);
    assert!(dataset.warnings()[0].starts_with("line 3"));
}

#[test]
fn test_rows_without_usable_text_are_dropped() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("d.jsonl");
    fs::write(
        &path,
        "{\"text\": \"keep\", \"image\": \"img/1.jpg\"}\n{\"text\": \"\"}\n{\"text\": 42}\n{\"label\": 1}\n",
    )
    .unwrap();

    let dataset = load_dataset(&path).unwrap();
    assert_eq!(texts(dataset.examples()), vec!["keep"]);
    assert_eq!(dataset.get(0).unwrap().image_ref, Some(PathBuf::from("img/1.jpg")));
    assert_eq!(dataset.warnings().len(), 3);
}

#[test]
fn test_json_array_and_bare_object() {
    let temp = TempDir::new().unwrap();
    let array = temp.path().join("array.json");
    fs::write(&array, r#"[{"text": "a"}, {"text": "b"}]"#).unwrap();
    let object = temp.path().join("object.json");
    fs::write(&object, r#"{"text": "solo"}"#).unwrap();

    assert_eq!(load_dataset(&array).unwrap().len(), 2);
    assert_eq!(texts(load_dataset(&object).unwrap().examples()), vec!["solo"]);
}

#[test]
fn test_json_scalar_is_parse_error() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("bad.json");
    fs::write(&path, "17").unwrap();

    assert!(matches!(load_dataset(&path).unwrap_err(), IngestionError::Parse { .. }));
}

#[test]
fn test_csv_requires_text_column() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("d.csv");
    fs::write(&path, "caption,image\nhello,a.jpg\n").unwrap();

    assert!(matches!(load_dataset(&path).unwrap_err(), IngestionError::MissingTextColumn(_)));
}

#[test]
fn test_csv_trims_text_and_reads_images() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("d.csv");
    fs::write(&path, "text,image\n  hello  ,cat.jpg\n   ,dog.jpg\nbye,\n").unwrap();

    let dataset = load_dataset(&path).unwrap();
    assert_eq!(texts(dataset.examples()), vec!["hello", "bye"]);
    assert_eq!(dataset.get(0).unwrap().image_ref, Some(PathBuf::from("cat.jpg")));
    assert_eq!(dataset.get(1).unwrap().image_ref, None);
    assert_eq!(dataset.warnings().len(), 1);
}

#[test]
fn test_unsupported_and_missing_sources() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("d.parquet");
    fs::write(&path, "").unwrap();

    assert!(matches!(load_dataset(&path).unwrap_err(), IngestionError::UnsupportedFormat(_)));
    assert!(matches!(
        load_dataset(&temp.path().join("absent.jsonl")).unwrap_err(),
        IngestionError::NotFound(_)
    ));
}

#[test]
fn test_written_examples_load_back_in_every_format() {
    let temp = TempDir::new().unwrap();
    let source = temp.path().join("source.jsonl");
    fs::write(
        &source,
        "{\"text\": \"roses are red\", \"image\": \"img/rose.jpg\"}\n{\"text\": \"violets, \\\"blue\\\"\"}\n",
    )
    .unwrap();
    let original = load_dataset(&source).unwrap();

    for format in [TargetFormat::Json, TargetFormat::Csv] {
        let out_dir = temp.path().join(format.extension());
        let written = convert_into(&source, format, &out_dir).unwrap();
        let reloaded = load_dataset(&written).unwrap();
        assert_eq!(reloaded.examples(), original.examples(), "format {format}");
    }
}

#[test]
fn test_whitespace_text_passes_load_but_materializes_as_placeholder() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("d.json");
    fs::write(&path, r#"[{"text": "   "}, {"text": "ok"}]"#).unwrap();

    let dataset = load_dataset(&path).unwrap();
    assert_eq!(dataset.len(), 2);

    let encoded = EncodedDataset::new(&dataset, &ByteTokenizer, 8);
    let first = encoded.get(0).unwrap();
    let expected: Vec<u32> = UNKNOWN_TOKEN_TEXT.bytes().map(|b| u32::from(b) + 1).collect();
    assert_eq!(&first.input_ids[..expected.len()], expected.as_slice());
    assert_eq!(first.labels[expected.len()], -100);
}

#[test]
fn test_preview_returns_first_records() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("d.jsonl");
    let body: String = (0..8).map(|i| format!("{{\"text\": \"row {i}\"}}\n")).collect();
    fs::write(&path, body).unwrap();

    let records = preview(&path, 5).unwrap();
    assert_eq!(records.len(), 5);
    assert_eq!(records[4]["text"], "row 4");
}
