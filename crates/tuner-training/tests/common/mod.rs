//! Shared fixtures for tuner-training integration tests.

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{mpsc, Mutex};
use std::time::Duration;
use tokio::sync::watch;
use tuner_training::{
    AdapterConfig, Device, EncodedDataset, EngineError, EngineResult, EpochReport, JobState, LoopControl,
    StepObserver, StepReport, TelemetryUnavailable, Telemetry, Tokenizer, TrainingConfig, TrainingEngine,
};

/// One token per char, shifted so that 0 stays free for padding.
pub struct CharTokenizer;

impl Tokenizer for CharTokenizer {
    fn encode(&self, text: &str) -> Vec<u32> {
        text.chars().map(|c| c as u32 + 1).collect()
    }

    fn pad_token_id(&self) -> u32 {
        0
    }
}

#[derive(Debug, Default)]
pub struct MockModel {
    pub device: Option<Device>,
    pub adapter_rank: Option<u32>,
    pub steps_trained: u64,
}

/// Engine that counts every collaborator call.
///
/// A gated engine waits for one permit per step; dropping the permit sender
/// lets the remaining steps run freely.
#[derive(Default)]
pub struct MockEngine {
    pub load_model_calls: AtomicUsize,
    pub save_calls: AtomicUsize,
    pub release_calls: AtomicUsize,
    pub gc_calls: AtomicUsize,
    pub steps: AtomicU64,
    gate: Option<Mutex<mpsc::Receiver<()>>>,
    fail_at_step: Option<u64>,
    panic_at_step: Option<u64>,
}

impl MockEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn gated() -> (Self, mpsc::Sender<()>) {
        let (tx, rx) = mpsc::channel();
        (Self { gate: Some(Mutex::new(rx)), ..Self::default() }, tx)
    }

    pub fn failing_at(step: u64) -> Self {
        Self { fail_at_step: Some(step), ..Self::default() }
    }

    pub fn panicking_at(step: u64) -> Self {
        Self { panic_at_step: Some(step), ..Self::default() }
    }

    pub fn count(counter: &AtomicUsize) -> usize {
        counter.load(Ordering::SeqCst)
    }

    fn wait_for_permit(&self) {
        if let Some(gate) = &self.gate {
            // A closed gate means the test released the remaining steps
            let _ = gate.lock().unwrap().recv();
        }
    }
}

impl TrainingEngine for MockEngine {
    type Model = MockModel;
    type Tokenizer = CharTokenizer;

    fn id(&self) -> &'static str {
        "mock"
    }

    fn load_model(&self, _path: &Path, device: Device) -> EngineResult<MockModel> {
        self.load_model_calls.fetch_add(1, Ordering::SeqCst);
        Ok(MockModel { device: Some(device), ..MockModel::default() })
    }

    fn load_tokenizer(&self, _path: &Path) -> EngineResult<CharTokenizer> {
        Ok(CharTokenizer)
    }

    fn attach_adapter(&self, mut model: MockModel, adapter: &AdapterConfig) -> EngineResult<MockModel> {
        model.adapter_rank = Some(adapter.rank);
        Ok(model)
    }

    fn run_training_loop(
        &self,
        model: &mut MockModel,
        data: &EncodedDataset<'_, CharTokenizer>,
        config: &TrainingConfig,
        observer: &mut dyn StepObserver,
    ) -> EngineResult<()> {
        let total_steps = config.total_steps(data.len());
        let steps_per_epoch = config.steps_per_epoch(data.len());
        observer.on_train_begin(total_steps);

        let mut step = 0;
        for epoch in 1..=config.epochs {
            for i in 0..steps_per_epoch {
                self.wait_for_permit();
                let example = data
                    .get(i as usize % data.len())
                    .ok_or_else(|| EngineError::msg("mock loop", "example out of range"))?;
                assert_eq!(example.input_ids.len(), data.max_len());

                step += 1;
                if self.panic_at_step == Some(step) {
                    panic!("kernel launch failed at step {step}");
                }
                if self.fail_at_step == Some(step) {
                    let root = std::io::Error::other("CUDA out of memory");
                    return Err(EngineError::new(
                        "training loop",
                        anyhow::Error::new(root).context(format!("step {step} failed")),
                    ));
                }
                self.steps.fetch_add(1, Ordering::SeqCst);
                model.steps_trained = step;

                let report = StepReport {
                    step,
                    total_steps,
                    epoch: f64::from(epoch - 1) + (i + 1) as f64 / steps_per_epoch as f64,
                    loss: Some(1.0 / step as f64),
                };
                if observer.on_step(report) == LoopControl::Stop {
                    return Ok(());
                }
            }
            let report = EpochReport { epoch, total_epochs: config.epochs, step, mean_loss: None };
            if observer.on_epoch(report) == LoopControl::Stop {
                return Ok(());
            }
        }
        Ok(())
    }

    fn save(&self, model: &MockModel, output_dir: &Path) -> EngineResult<Vec<PathBuf>> {
        self.save_calls.fetch_add(1, Ordering::SeqCst);
        let path = output_dir.join("mock_checkpoint.json");
        let body = format!("{{\"steps\": {}}}", model.steps_trained);
        std::fs::write(&path, body).map_err(|e| EngineError::new("save", e))?;
        Ok(vec![path])
    }

    fn collect_garbage(&self) {
        self.gc_calls.fetch_add(1, Ordering::SeqCst);
    }

    fn release_device_memory(&self, _device: Device) -> EngineResult<()> {
        self.release_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

pub struct MockTelemetry {
    pub ram_mb: Option<f64>,
    pub devices: usize,
    pub vram_mb: f64,
}

impl Default for MockTelemetry {
    fn default() -> Self {
        Self { ram_mb: Some(16_384.0), devices: 0, vram_mb: 0.0 }
    }
}

impl Telemetry for MockTelemetry {
    fn available_system_memory_mb(&self) -> Result<f64, TelemetryUnavailable> {
        self.ram_mb.ok_or_else(|| TelemetryUnavailable("mock".to_string()))
    }

    fn device_count(&self) -> usize {
        self.devices
    }

    fn available_device_memory_mb(&self, device_index: usize) -> Result<f64, TelemetryUnavailable> {
        if device_index < self.devices {
            Ok(self.vram_mb)
        } else {
            Err(TelemetryUnavailable(format!("no device {device_index}")))
        }
    }
}

/// Writes `count` JSONL examples and returns the file path.
pub fn write_jsonl_dataset(dir: &Path, count: usize) -> PathBuf {
    let path = dir.join("dataset.jsonl");
    let body: String = (0..count)
        .map(|i| format!("{{\"text\": \"example number {i}\"}}\n"))
        .collect();
    std::fs::write(&path, body).unwrap();
    path
}

pub async fn wait_until(
    rx: &mut watch::Receiver<JobState>,
    pred: impl FnMut(&JobState) -> bool,
) -> JobState {
    let state = tokio::time::timeout(Duration::from_secs(10), rx.wait_for(pred))
        .await
        .expect("timed out waiting for job state")
        .expect("orchestrator dropped");
    state.clone()
}
