//! Character-level bigram engine.
//!
//! A minimal local engine that learns byte transition counts, so the CLI can run a
//! job end to end without a deep learning runtime.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tuner_training::{
    AdapterConfig, Device, EncodedDataset, EngineError, EngineResult, EpochReport, LoopControl, StepObserver,
    StepReport, Tokenizer, TrainingConfig, TrainingEngine,
};

pub const CHECKPOINT_FILE: &str = "bigram_checkpoint.json";
pub const ADAPTER_FILE: &str = "adapter_config.json";

/// Byte vocabulary plus the padding id.
const VOCAB_SIZE: usize = 257;

/// Token id = byte + 1; id 0 pads.
pub struct ByteTokenizer;

impl Tokenizer for ByteTokenizer {
    fn encode(&self, text: &str) -> Vec<u32> {
        text.bytes().map(|b| u32::from(b) + 1).collect()
    }

    fn pad_token_id(&self) -> u32 {
        0
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct BigramCheckpoint {
    vocab_size: usize,
    transitions: Vec<Vec<f32>>,
}

pub struct BigramModel {
    transitions: Vec<Vec<f32>>,
    row_totals: Vec<f32>,
    device: Device,
    adapter: Option<AdapterConfig>,
}

impl BigramModel {
    fn fresh(device: Device) -> Self {
        // Laplace smoothing
        Self::from_transitions(vec![vec![1.0; VOCAB_SIZE]; VOCAB_SIZE], device)
    }

    fn from_transitions(transitions: Vec<Vec<f32>>, device: Device) -> Self {
        let row_totals = transitions.iter().map(|row| row.iter().sum()).collect();
        Self { transitions, row_totals, device, adapter: None }
    }

    fn nll(&self, prev: usize, next: usize) -> f64 {
        let p = f64::from(self.transitions[prev][next]) / f64::from(self.row_totals[prev]);
        -p.ln()
    }

    fn observe(&mut self, prev: usize, next: usize, weight: f32) {
        self.transitions[prev][next] += weight;
        self.row_totals[prev] += weight;
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct BigramEngine;

impl BigramEngine {
    pub fn new() -> Self {
        Self
    }
}

fn read_checkpoint(path: &Path) -> EngineResult<BigramCheckpoint> {
    let bytes = std::fs::read(path).map_err(|e| EngineError::new(format!("read {}", path.display()), e))?;
    let ckpt: BigramCheckpoint =
        serde_json::from_slice(&bytes).map_err(|e| EngineError::new(format!("parse {}", path.display()), e))?;
    if ckpt.vocab_size != VOCAB_SIZE || ckpt.transitions.len() != VOCAB_SIZE {
        return Err(EngineError::msg(
            "load model",
            format!("checkpoint vocab size {} does not match {VOCAB_SIZE}", ckpt.vocab_size),
        ));
    }
    Ok(ckpt)
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> EngineResult<()> {
    let json = serde_json::to_string(value).map_err(|e| EngineError::new("serialize", e))?;
    std::fs::write(path, json).map_err(|e| EngineError::new(format!("write {}", path.display()), e))
}

impl TrainingEngine for BigramEngine {
    type Model = BigramModel;
    type Tokenizer = ByteTokenizer;

    fn id(&self) -> &'static str {
        "bigram"
    }

    fn load_model(&self, path: &Path, device: Device) -> EngineResult<BigramModel> {
        let checkpoint = if path.is_dir() { path.join(CHECKPOINT_FILE) } else { path.to_path_buf() };
        if checkpoint.is_file() {
            let ckpt = read_checkpoint(&checkpoint)?;
            tracing::info!(path = %checkpoint.display(), "Resuming from bigram checkpoint");
            return Ok(BigramModel::from_transitions(ckpt.transitions, device));
        }
        if path.is_dir() {
            tracing::info!(path = %path.display(), "No checkpoint in model directory, starting fresh");
            return Ok(BigramModel::fresh(device));
        }
        Err(EngineError::msg("load model", format!("model path does not exist: {}", path.display())))
    }

    fn load_tokenizer(&self, _path: &Path) -> EngineResult<ByteTokenizer> {
        Ok(ByteTokenizer)
    }

    fn attach_adapter(&self, mut model: BigramModel, adapter: &AdapterConfig) -> EngineResult<BigramModel> {
        // A count table has no projection layers; the settings are kept for the saved config
        model.adapter = Some(adapter.clone());
        Ok(model)
    }

    fn run_training_loop(
        &self,
        model: &mut BigramModel,
        data: &EncodedDataset<'_, ByteTokenizer>,
        config: &TrainingConfig,
        observer: &mut dyn StepObserver,
    ) -> EngineResult<()> {
        let len = data.len();
        let steps_per_epoch = config.steps_per_epoch(len);
        let total_steps = config.total_steps(len);
        let per_step = (config.batch_size as usize).saturating_mul(config.gradient_accumulation_steps as usize);
        let decay = (1.0 - config.weight_decay * config.learning_rate).clamp(0.0, 1.0) as f32;
        tracing::debug!(device = %model.device, warmup_steps = config.warmup_steps, "Bigram loop starting");
        observer.on_train_begin(total_steps);

        let mut step = 0u64;
        for epoch in 1..=config.epochs {
            let mut epoch_loss = 0.0;
            let mut epoch_pairs = 0usize;
            for i in 0..steps_per_epoch {
                let start = (i as usize).saturating_mul(per_step).min(len);
                let end = if i + 1 == steps_per_epoch { len } else { start.saturating_add(per_step).min(len) };

                let mut loss = 0.0;
                let mut pairs = 0usize;
                for idx in start..end {
                    let Some(example) = data.get(idx) else { continue };
                    let real = example.attention_mask.iter().filter(|&&m| m == 1).count();
                    for w in example.input_ids[..real].windows(2) {
                        let (prev, next) = (w[0] as usize, w[1] as usize);
                        loss += model.nll(prev, next);
                        model.observe(prev, next, 1.0);
                        pairs += 1;
                    }
                }
                if decay < 1.0 {
                    for (row, total) in model.transitions.iter_mut().zip(model.row_totals.iter_mut()) {
                        row.iter_mut().for_each(|c| *c = (*c * decay).max(1e-3));
                        *total = row.iter().sum();
                    }
                }

                step += 1;
                epoch_loss += loss;
                epoch_pairs += pairs;
                let report = StepReport {
                    step,
                    total_steps,
                    epoch: f64::from(epoch - 1) + (i + 1) as f64 / steps_per_epoch as f64,
                    loss: (pairs > 0).then(|| loss / pairs as f64),
                };
                if observer.on_step(report) == LoopControl::Stop {
                    return Ok(());
                }
            }

            let report = EpochReport {
                epoch,
                total_epochs: config.epochs,
                step,
                mean_loss: (epoch_pairs > 0).then(|| epoch_loss / epoch_pairs as f64),
            };
            if observer.on_epoch(report) == LoopControl::Stop {
                return Ok(());
            }
        }
        Ok(())
    }

    fn save(&self, model: &BigramModel, output_dir: &Path) -> EngineResult<Vec<PathBuf>> {
        let mut written = Vec::new();

        let ckpt_path = output_dir.join(CHECKPOINT_FILE);
        let ckpt = BigramCheckpoint { vocab_size: VOCAB_SIZE, transitions: model.transitions.clone() };
        write_json(&ckpt_path, &ckpt)?;
        written.push(ckpt_path);

        if let Some(adapter) = &model.adapter {
            let adapter_path = output_dir.join(ADAPTER_FILE);
            write_json(&adapter_path, adapter)?;
            written.push(adapter_path);
        }
        Ok(written)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use tuner_training::{Dataset, DatasetFormat, Example};

    #[derive(Default)]
    struct Recorder {
        steps: Vec<StepReport>,
        epochs: u32,
    }

    impl StepObserver for Recorder {
        fn on_step(&mut self, report: StepReport) -> LoopControl {
            self.steps.push(report);
            LoopControl::Continue
        }

        fn on_epoch(&mut self, _report: EpochReport) -> LoopControl {
            self.epochs += 1;
            LoopControl::Continue
        }
    }

    fn dataset(texts: &[&str]) -> Dataset {
        Dataset::from_parts(
            texts.iter().map(|t| Example::new(*t)).collect(),
            PathBuf::from("mem.jsonl"),
            DatasetFormat::Jsonl,
            Vec::new(),
        )
        .unwrap()
    }

    #[test]
    fn test_loop_reports_every_step_and_loss_falls() {
        let engine = BigramEngine::new();
        let ds = dataset(&["abababab", "abababab", "abababab"]);
        let encoded = EncodedDataset::new(&ds, &ByteTokenizer, 16);
        let config = TrainingConfig { epochs: 2, ..Default::default() };
        let mut model = BigramModel::fresh(Device::Cpu);
        let mut recorder = Recorder::default();

        engine.run_training_loop(&mut model, &encoded, &config, &mut recorder).unwrap();

        assert_eq!(recorder.steps.len(), 6);
        assert_eq!(recorder.epochs, 2);
        assert_eq!(recorder.steps.last().unwrap().step, 6);
        let first = recorder.steps[0].loss.unwrap();
        let last = recorder.steps[5].loss.unwrap();
        assert!(last < first, "loss did not fall: {first} -> {last}");
    }

    #[test]
    fn test_large_batch_and_accumulation_take_whole_dataset_in_one_step() {
        let engine = BigramEngine::new();
        let ds = dataset(&["abab", "baba"]);
        let encoded = EncodedDataset::new(&ds, &ByteTokenizer, 8);
        let config = TrainingConfig { batch_size: 70_000, gradient_accumulation_steps: 70_000, ..Default::default() };
        config.validate().unwrap();
        let mut model = BigramModel::fresh(Device::Cpu);
        let mut recorder = Recorder::default();

        engine.run_training_loop(&mut model, &encoded, &config, &mut recorder).unwrap();

        assert_eq!(recorder.steps.len(), 1);
        assert_eq!(recorder.epochs, 1);
        assert!(recorder.steps[0].loss.is_some());
    }

    #[test]
    fn test_save_then_load_resumes_counts() {
        let temp = TempDir::new().unwrap();
        let engine = BigramEngine::new();
        let mut model = BigramModel::fresh(Device::Cpu);
        model.observe(2, 3, 5.0);
        let model = engine.attach_adapter(model, &AdapterConfig::default()).unwrap();

        let files = engine.save(&model, temp.path()).unwrap();
        assert_eq!(files, vec![temp.path().join(CHECKPOINT_FILE), temp.path().join(ADAPTER_FILE)]);

        let loaded = engine.load_model(temp.path(), Device::Cpu).unwrap();
        assert!((loaded.transitions[2][3] - 6.0).abs() < f32::EPSILON);
    }

    #[test]
    fn test_load_missing_model_fails() {
        let temp = TempDir::new().unwrap();
        let err = BigramEngine::new().load_model(&temp.path().join("absent"), Device::Cpu).err().unwrap();
        assert!(err.to_string().contains("does not exist"));
    }
}
