//! Integration tests for `tuner train`, `tuner estimate` and `tuner logs`.

use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use tempfile::TempDir;

fn workspace() -> TempDir {
    let temp = TempDir::new().unwrap();
    fs::create_dir_all(temp.path().join("data")).unwrap();
    fs::create_dir_all(temp.path().join("models/base")).unwrap();
    let body: String =
        (0..4).map(|i| format!("{{\"text\": \"the quick brown fox number {i}\"}}\n")).collect();
    fs::write(temp.path().join("data/poems.jsonl"), body).unwrap();
    temp
}

fn tuner(ws: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("tuner").unwrap();
    cmd.env_remove("TUNER_CONFIG").env_remove("RUST_LOG").arg("-w").arg(ws.path());
    cmd
}

#[test]
fn test_train_runs_to_completion_and_registers_model() {
    let ws = workspace();

    tuner(&ws)
        .args(["train", "--dataset", "poems.jsonl", "--model", "base", "--epochs", "2", "--batch-size", "2"])
        .write_stdin("")
        .assert()
        .success()
        .stdout(predicate::str::contains("Training complete"))
        .stdout(predicate::str::contains("Steps:  4/4"));

    let jobs: Vec<_> = fs::read_dir(ws.path().join("trained_models")).unwrap().map(|e| e.unwrap().path()).collect();
    assert_eq!(jobs.len(), 1);
    assert!(jobs[0].join("training_manifest.json").is_file());
    assert!(jobs[0].join("bigram_checkpoint.json").is_file());
    assert!(jobs[0].join("adapter_config.json").is_file());

    let output = tuner(&ws).args(["models", "--trained", "--json"]).output().unwrap();
    assert!(output.status.success());
    let listed: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(listed.as_array().unwrap().len(), 1);
    assert_eq!(listed[0]["engine"], "bigram");
    assert_eq!(listed[0]["steps"], 4);

    tuner(&ws)
        .args(["logs", "--tail", "200"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Training job started"));
}

#[test]
fn test_train_from_saved_configuration() {
    let ws = workspace();
    let config = ws.path().join("job.json");

    tuner(&ws)
        .args(["config", "save"])
        .arg(&config)
        .args(["--dataset", "poems.jsonl", "--model", "base", "--epochs", "1"])
        .assert()
        .success();

    tuner(&ws)
        .arg("train")
        .arg("--config")
        .arg(&config)
        .write_stdin("")
        .assert()
        .success()
        .stdout(predicate::str::contains("Steps:  4/4"));
}

#[test]
fn test_train_with_missing_model_fails() {
    let ws = workspace();

    tuner(&ws)
        .args(["train", "--dataset", "poems.jsonl", "--model", "absent"])
        .write_stdin("")
        .assert()
        .failure()
        .stderr(predicate::str::contains("Model not found: absent"));
}

#[test]
fn test_train_rejects_invalid_hyperparameters() {
    let ws = workspace();

    tuner(&ws)
        .args(["train", "--dataset", "poems.jsonl", "--model", "base", "--batch-size", "0"])
        .write_stdin("")
        .assert()
        .failure()
        .stderr(predicate::str::contains("batch_size"));
    assert!(!ws.path().join("trained_models").read_dir().unwrap().any(|_| true));
}

#[test]
fn test_estimate_json() {
    let ws = workspace();

    let output = tuner(&ws)
        .args(["estimate", "--dataset", "poems.jsonl", "--model", "base", "--json"])
        .output()
        .unwrap();
    assert!(output.status.success());

    let estimate: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    let ram = estimate["projected_ram_mb"].as_f64().unwrap();
    assert!((25.0..26.0).contains(&ram), "projected ram {ram}");
    assert!(estimate["is_sufficient"].is_boolean());
}

#[test]
fn test_logs_without_log_file() {
    let ws = workspace();

    tuner(&ws).args(["logs"]).assert().success().stdout(predicate::str::contains("No log entries"));
}
