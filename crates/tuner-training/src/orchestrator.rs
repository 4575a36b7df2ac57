//! Single-job training orchestrator.
//!
//! The orchestrator lives on the interactive side and never blocks. Each job runs on
//! one `spawn_blocking` thread that owns the dataset, tokenizer, model and
//! accelerator. The two sides share three channels:
//!
//! - `JobState` watch, replaced as a whole value by whichever side changes the phase
//! - control watch (pause / cancel), written by the orchestrator and read by the job
//!   at step boundaries
//! - progress sink, written by the job with non-blocking sends

use crate::accelerator::AcceleratorContext;
use crate::artifacts::{make_artifact, write_manifest, ArtifactKind, TrainingManifest, TrainingMetrics};
use crate::config::{AdapterConfig, PauseMode, StudioConfig};
use crate::dataset::EncodedDataset;
use crate::engine::{Device, EpochReport, LoopControl, StepObserver, StepReport, TrainingEngine};
use crate::error::{OrchestratorError, TrainingResult};
use crate::estimate::{self, ResourceEstimate};
use crate::job::{JobRequest, TrainingJobId};
use crate::normalizer;
use crate::progress::{progress_channel, ProgressSink, ProgressSnapshot};
use crate::state::{JobPhase, JobState};
use crate::telemetry::Telemetry;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

#[derive(Debug, Clone, PartialEq)]
pub struct OrchestratorSettings {
    pub pause_mode: PauseMode,
    pub adapter: AdapterConfig,
    pub progress_capacity: usize,
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self::from(&StudioConfig::default())
    }
}

impl From<&StudioConfig> for OrchestratorSettings {
    fn from(config: &StudioConfig) -> Self {
        Self {
            pause_mode: config.pause_mode,
            adapter: config.adapter.clone(),
            progress_capacity: config.progress_capacity,
        }
    }
}

/// Operator answer to the "really cancel?" prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Confirmation {
    Confirmed,
    Declined,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct ControlState {
    paused: bool,
    cancel_requested: bool,
}

pub struct Orchestrator<E: TrainingEngine> {
    engine: Arc<E>,
    telemetry: Arc<dyn Telemetry>,
    settings: OrchestratorSettings,
    sink: Arc<dyn ProgressSink>,
    state: Arc<watch::Sender<JobState>>,
    control: Option<watch::Sender<ControlState>>,
    task: Option<JoinHandle<()>>,
}

impl<E: TrainingEngine> Orchestrator<E> {
    /// Creates an orchestrator that relays progress through a bounded channel.
    pub fn new(
        engine: Arc<E>,
        telemetry: Arc<dyn Telemetry>,
        settings: OrchestratorSettings,
    ) -> (Self, mpsc::Receiver<ProgressSnapshot>) {
        let (sink, rx) = progress_channel(settings.progress_capacity);
        (Self::with_sink(engine, telemetry, settings, Arc::new(sink)), rx)
    }

    pub fn with_sink(
        engine: Arc<E>,
        telemetry: Arc<dyn Telemetry>,
        settings: OrchestratorSettings,
        sink: Arc<dyn ProgressSink>,
    ) -> Self {
        let (state, _) = watch::channel(JobState::idle());
        Self { engine, telemetry, settings, sink, state: Arc::new(state), control: None, task: None }
    }

    pub fn snapshot(&self) -> JobState {
        self.state.borrow().clone()
    }

    pub fn phase(&self) -> JobPhase {
        self.state.borrow().phase
    }

    pub fn subscribe(&self) -> watch::Receiver<JobState> {
        self.state.subscribe()
    }

    pub fn settings(&self) -> &OrchestratorSettings {
        &self.settings
    }

    /// Validates `request` and starts it on a background thread.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn start(&mut self, request: JobRequest) -> Result<TrainingJobId, OrchestratorError> {
        let phase = self.phase();
        if phase != JobPhase::Idle {
            tracing::warn!(phase = %phase, "Rejected start: a job is already in progress");
            return Err(OrchestratorError::NotIdle(phase));
        }
        if let Err(e) = request.config.validate() {
            tracing::warn!(error = %e, "Rejected start: invalid configuration");
            return Err(e.into());
        }

        let job_id = TrainingJobId::new();
        let output_dir = request.output_root.join(job_id.0.as_str());
        self.state.send_replace(JobState::started(job_id.clone()));

        let (control_tx, control_rx) = watch::channel(ControlState::default());
        let ctx = JobContext {
            engine: Arc::clone(&self.engine),
            telemetry: Arc::clone(&self.telemetry),
            sink: Arc::clone(&self.sink),
            state: Arc::clone(&self.state),
            control: control_rx,
            pause_mode: self.settings.pause_mode,
            adapter: self.settings.adapter.clone(),
            request,
            job_id: job_id.clone(),
            output_dir,
        };

        tracing::info!(
            job_id = %job_id,
            engine = ctx.engine.id(),
            dataset = %ctx.request.dataset_path.display(),
            model = %ctx.request.model_path.display(),
            "Training job started"
        );
        self.control = Some(control_tx);
        self.task = Some(tokio::task::spawn_blocking(move || ctx.run()));
        self.publish();
        Ok(job_id)
    }

    /// Toggles between `Running` and `Paused`. Returns the new phase.
    pub fn pause(&self) -> Result<JobPhase, OrchestratorError> {
        let mut outcome = Err(OrchestratorError::NotActive(JobPhase::Idle));
        self.state.send_if_modified(|s| {
            let next = match s.phase {
                JobPhase::Running => JobPhase::Paused,
                JobPhase::Paused => JobPhase::Running,
                other => {
                    outcome = Err(OrchestratorError::NotActive(other));
                    return false;
                }
            };
            *s = s.clone().with_phase(next);
            outcome = Ok(next);
            true
        });

        let next = outcome?;
        if let Some(control) = &self.control {
            control.send_modify(|c| c.paused = next == JobPhase::Paused);
        }
        tracing::info!(phase = %next, mode = ?self.settings.pause_mode, "Pause toggled");
        self.publish();
        Ok(next)
    }

    /// Requests cancellation. `Declined` leaves the job untouched.
    pub fn cancel(&self, confirmation: Confirmation) -> Result<JobPhase, OrchestratorError> {
        let phase = self.phase();
        match phase {
            JobPhase::Running | JobPhase::Paused => {}
            JobPhase::Cancelling => return Ok(phase),
            other => return Err(OrchestratorError::NotActive(other)),
        }
        if confirmation == Confirmation::Declined {
            tracing::info!("Cancellation declined");
            return Ok(phase);
        }

        let moved = self.state.send_if_modified(|s| {
            if s.phase.can_transition_to(JobPhase::Cancelling) {
                *s = s.clone().with_phase(JobPhase::Cancelling);
                true
            } else {
                false
            }
        });
        if moved {
            if let Some(control) = &self.control {
                control.send_modify(|c| c.cancel_requested = true);
            }
            tracing::info!("Cancellation requested, stopping at next step boundary");
            self.publish();
        }
        Ok(self.phase())
    }

    /// Waits for the background job and returns the final state.
    pub async fn wait(&mut self) -> Result<JobState, OrchestratorError> {
        if let Some(task) = self.task.take()
            && let Err(e) = task.await
        {
            tracing::error!(error = %e, "Training task did not finish cleanly");
            self.state.send_if_modified(|s| {
                if s.phase.is_active() {
                    *s = s.clone().failed(format!("training task aborted: {e}"));
                    true
                } else {
                    false
                }
            });
            return Err(OrchestratorError::Join(e.to_string()));
        }
        Ok(self.snapshot())
    }

    /// Returns a finished orchestrator to `Idle`.
    pub fn reset(&mut self) -> Result<(), OrchestratorError> {
        let phase = self.phase();
        if phase == JobPhase::Idle {
            return Ok(());
        }
        if !phase.is_terminal() {
            return Err(OrchestratorError::NotTerminal(phase));
        }
        self.control = None;
        self.task = None;
        self.state.send_replace(JobState::idle());
        tracing::debug!(from = %phase, "Orchestrator reset");
        Ok(())
    }

    /// Resource estimate for a dataset/model pair. Refused while a job is active.
    pub fn estimate(&self, dataset_path: &Path, model_path: &Path) -> Result<ResourceEstimate, OrchestratorError> {
        if self.phase().is_active() {
            return Err(OrchestratorError::JobActive);
        }
        Ok(estimate::estimate(dataset_path, model_path, self.telemetry.as_ref()))
    }

    fn publish(&self) {
        let snapshot = ProgressSnapshot::from(&*self.state.borrow());
        self.sink.publish(snapshot);
    }
}

impl<E: TrainingEngine> Drop for Orchestrator<E> {
    fn drop(&mut self) {
        if let Some(control) = &self.control
            && self.state.borrow().phase.is_active()
        {
            control.send_modify(|c| c.cancel_requested = true);
        }
    }
}

enum Outcome {
    Completed,
    Cancelled,
    Failed(String),
}

/// Everything the background thread owns for one job.
struct JobContext<E: TrainingEngine> {
    engine: Arc<E>,
    telemetry: Arc<dyn Telemetry>,
    sink: Arc<dyn ProgressSink>,
    state: Arc<watch::Sender<JobState>>,
    control: watch::Receiver<ControlState>,
    pause_mode: PauseMode,
    adapter: AdapterConfig,
    request: JobRequest,
    job_id: TrainingJobId,
    output_dir: PathBuf,
}

impl<E: TrainingEngine> JobContext<E> {
    fn run(self) {
        let mut accel = AcceleratorContext::acquire(
            Arc::clone(&self.engine),
            self.request.config.device_preference,
            self.telemetry.as_ref(),
        );

        // Dataset, tokenizer and model are dropped when `train` returns or unwinds.
        let device = accel.device();
        let outcome = match std::panic::catch_unwind(AssertUnwindSafe(|| self.train(device))) {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(e)) => Outcome::Failed(e.to_string()),
            Err(payload) => {
                let reason = panic_message(payload.as_ref());
                tracing::error!(job_id = %self.job_id, reason = %reason, "Training engine panicked");
                Outcome::Failed(format!("training engine panicked: {reason}"))
            }
        };

        self.engine.collect_garbage();
        accel.release();
        self.log_free_memory(accel.device());
        drop(accel);

        self.finish(&outcome);
    }

    fn train(&self, device: Device) -> TrainingResult<Outcome> {
        let config = &self.request.config;
        let dataset = normalizer::load(&self.request.dataset_path)?;
        if self.cancel_requested() {
            return Ok(Outcome::Cancelled);
        }

        let tokenizer = self.engine.load_tokenizer(&self.request.model_path)?;
        let model = self.engine.load_model(&self.request.model_path, device)?;
        let mut model = self.engine.attach_adapter(model, &self.adapter)?;
        tracing::info!(
            job_id = %self.job_id,
            rank = self.adapter.rank,
            alpha = self.adapter.alpha,
            "Model loaded with adapter"
        );

        let encoded = EncodedDataset::new(&dataset, &tokenizer, config.max_sequence_length as usize);
        let total_steps = config.total_steps(dataset.len());
        self.state.send_modify(|s| *s = s.clone().with_total_steps(total_steps));

        let mut observer = JobObserver {
            state: &self.state,
            sink: self.sink.as_ref(),
            control: self.control.clone(),
            pause_mode: self.pause_mode,
            job_id: &self.job_id,
            stopped: false,
        };
        self.engine.run_training_loop(&mut model, &encoded, config, &mut observer)?;
        if observer.stopped || self.cancel_requested() {
            return Ok(Outcome::Cancelled);
        }

        std::fs::create_dir_all(&self.output_dir)?;
        let files = self.engine.save(&model, &self.output_dir)?;
        let manifest_path = self.write_manifest(files, dataset.id()?)?;
        tracing::info!(
            job_id = %self.job_id,
            output = %self.output_dir.display(),
            manifest = %manifest_path.display(),
            "Model saved"
        );
        Ok(Outcome::Completed)
    }

    fn write_manifest(&self, files: Vec<PathBuf>, dataset_id: crate::dataset::DatasetId) -> TrainingResult<PathBuf> {
        let mut artifacts = Vec::with_capacity(files.len());
        for path in files {
            if !path.is_file() {
                tracing::warn!(path = %path.display(), "Engine output is not a file, leaving it out of the manifest");
                continue;
            }
            artifacts.push(make_artifact(ArtifactKind::infer(&path), path)?);
        }

        let state = self.state.borrow().clone();
        let manifest = TrainingManifest {
            job_id: self.job_id.clone(),
            created_at: chrono::Utc::now(),
            engine: self.engine.id().to_string(),
            base_model: self.request.model_path.clone(),
            dataset_path: self.request.dataset_path.clone(),
            dataset_id,
            config: self.request.config.clone(),
            metrics: TrainingMetrics {
                steps: state.current_step,
                epochs: state.current_epoch,
                final_loss: state.last_loss,
            },
            artifacts,
        };
        write_manifest(&self.output_dir, &manifest)
    }

    fn cancel_requested(&self) -> bool {
        self.control.borrow().cancel_requested
    }

    fn log_free_memory(&self, device: Device) {
        match self.telemetry.available_system_memory_mb() {
            Ok(mb) => tracing::info!(job_id = %self.job_id, available_ram_mb = mb, "Memory cleaned"),
            Err(e) => tracing::info!(job_id = %self.job_id, error = %e, "Memory cleaned"),
        }
        if let Device::Gpu(idx) = device
            && let Ok(mb) = self.telemetry.available_device_memory_mb(idx)
        {
            tracing::info!(job_id = %self.job_id, device = idx, available_vram_mb = mb, "Device memory after cleanup");
        }
    }

    fn finish(&self, outcome: &Outcome) {
        self.state.send_modify(|s| *s = settle(s.clone(), outcome));
        let state = self.state.borrow().clone();
        match (&state.phase, &state.last_error) {
            (JobPhase::Failed, Some(err)) => {
                tracing::error!(job_id = %self.job_id, error = %err, "Training failed");
            }
            (phase, _) => tracing::info!(
                job_id = %self.job_id,
                phase = %phase,
                steps = state.current_step,
                total_steps = state.total_steps,
                "Training finished"
            ),
        }
        self.sink.publish(ProgressSnapshot::from(&state));
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Terminal state for `outcome`, passing through `Cancelling` where the lifecycle requires it.
fn settle(state: JobState, outcome: &Outcome) -> JobState {
    match outcome {
        Outcome::Completed if state.phase.can_transition_to(JobPhase::Completed) => {
            state.with_phase(JobPhase::Completed)
        }
        Outcome::Failed(err) if state.phase.can_transition_to(JobPhase::Failed) => state.failed(err.clone()),
        _ => {
            let state = if state.phase.can_transition_to(JobPhase::Cancelling) {
                state.with_phase(JobPhase::Cancelling)
            } else {
                state
            };
            state.with_phase(JobPhase::Cancelled)
        }
    }
}

struct JobObserver<'a> {
    state: &'a watch::Sender<JobState>,
    sink: &'a dyn ProgressSink,
    control: watch::Receiver<ControlState>,
    pause_mode: PauseMode,
    job_id: &'a TrainingJobId,
    stopped: bool,
}

impl JobObserver<'_> {
    /// Publishes the current state unless the job is visually paused.
    fn relay(&self) {
        let snapshot = {
            let state = self.state.borrow();
            if state.phase == JobPhase::Paused {
                return;
            }
            ProgressSnapshot::from(&*state)
        };
        self.sink.publish(snapshot);
    }

    fn check_control(&mut self) -> LoopControl {
        let control = *self.control.borrow();
        if control.cancel_requested {
            self.stopped = true;
            return LoopControl::Stop;
        }
        if !(control.paused && self.pause_mode == PauseMode::Strict) {
            return LoopControl::Continue;
        }

        tracing::info!(job_id = %self.job_id, "Training held at step boundary");
        let resumed = futures::executor::block_on(self.control.wait_for(|c| !c.paused || c.cancel_requested))
            .map(|c| *c);
        match resumed {
            Ok(c) if !c.cancel_requested => {
                tracing::info!(job_id = %self.job_id, "Training resumed");
                LoopControl::Continue
            }
            // Cancelled while held, or the orchestrator went away
            _ => {
                self.stopped = true;
                LoopControl::Stop
            }
        }
    }
}

impl StepObserver for JobObserver<'_> {
    fn on_train_begin(&mut self, total_steps: u64) {
        self.state.send_modify(|s| *s = s.clone().with_total_steps(total_steps));
        tracing::info!(job_id = %self.job_id, total_steps, "Training loop started");
        self.relay();
    }

    fn on_step(&mut self, report: StepReport) -> LoopControl {
        self.state.send_modify(|s| {
            *s = s.clone().with_step(report.step, report.total_steps, report.epoch, report.loss);
        });
        tracing::info!(
            job_id = %self.job_id,
            step = report.step,
            total_steps = report.total_steps,
            epoch = report.epoch,
            loss = ?report.loss,
            "Training step"
        );
        self.relay();
        self.check_control()
    }

    fn on_epoch(&mut self, report: EpochReport) -> LoopControl {
        self.state.send_modify(|s| *s = s.clone().with_epoch(report.epoch));
        tracing::info!(
            job_id = %self.job_id,
            epoch = report.epoch,
            total_epochs = report.total_epochs,
            mean_loss = ?report.mean_loss,
            "Epoch completed"
        );
        self.relay();
        self.check_control()
    }
}
