//! Job lifecycle state.
//!
//! `JobState` is owned by the orchestrator and published as whole-value snapshots;
//! readers never mutate it.

use crate::job::TrainingJobId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle phase of the (single) training job.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobPhase {
    #[default]
    Idle,
    Running,
    Paused,
    Cancelling,
    Cancelled,
    Completed,
    Failed,
}

impl JobPhase {
    /// Checks if the job can move from this phase to `to`.
    #[must_use]
    #[allow(clippy::match_same_arms)] // Each arm is a distinct rule of the lifecycle
    pub fn can_transition_to(self, to: Self) -> bool {
        match (self, to) {
            (Self::Idle, Self::Running) => true,
            // Pause is a toggle
            (Self::Running, Self::Paused) | (Self::Paused, Self::Running) => true,
            (Self::Running | Self::Paused, Self::Cancelling) => true,
            (Self::Cancelling, Self::Cancelled) => true,
            // A visual pause does not hold the engine, so the last step can land while paused
            (Self::Running | Self::Paused, Self::Completed) => true,
            (Self::Running | Self::Paused | Self::Cancelling, Self::Failed) => true,
            (Self::Completed | Self::Cancelled | Self::Failed, Self::Idle) => true,
            _ => false,
        }
    }

    /// A job is active from start until it settles in a terminal phase.
    #[must_use]
    pub fn is_active(self) -> bool {
        matches!(self, Self::Running | Self::Paused | Self::Cancelling)
    }

    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled | Self::Failed)
    }
}

impl fmt::Display for JobPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Idle => "idle",
            Self::Running => "running",
            Self::Paused => "paused",
            Self::Cancelling => "cancelling",
            Self::Cancelled => "cancelled",
            Self::Completed => "completed",
            Self::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Point-in-time state of the orchestrator's job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobState {
    pub job_id: Option<TrainingJobId>,
    pub phase: JobPhase,
    pub current_step: u64,
    pub total_steps: u64,
    pub current_epoch: f64,
    pub last_loss: Option<f64>,
    pub status_text: String,
    pub last_error: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl Default for JobState {
    fn default() -> Self {
        Self::idle()
    }
}

impl JobState {
    #[must_use]
    pub fn idle() -> Self {
        Self {
            job_id: None,
            phase: JobPhase::Idle,
            current_step: 0,
            total_steps: 0,
            current_epoch: 0.0,
            last_loss: None,
            status_text: "Ready".to_string(),
            last_error: None,
            started_at: None,
            finished_at: None,
        }
    }

    #[must_use]
    pub fn started(job_id: TrainingJobId) -> Self {
        Self {
            job_id: Some(job_id),
            phase: JobPhase::Running,
            status_text: "Training in progress...".to_string(),
            started_at: Some(Utc::now()),
            ..Self::idle()
        }
    }

    /// Progress as a percentage in `0.0..=100.0`.
    #[must_use]
    pub fn percent(&self) -> f64 {
        if self.total_steps == 0 {
            return 0.0;
        }
        (self.current_step as f64 / self.total_steps as f64 * 100.0).min(100.0)
    }

    #[must_use]
    pub fn with_total_steps(self, total_steps: u64) -> Self {
        Self { total_steps, ..self }
    }

    /// Records a finished optimizer step. Status text only moves while running.
    #[must_use]
    pub fn with_step(self, step: u64, total_steps: u64, epoch: f64, loss: Option<f64>) -> Self {
        let status_text = if self.phase == JobPhase::Running {
            format!("Training in progress... Step {step}/{total_steps}")
        } else {
            self.status_text.clone()
        };
        Self {
            current_step: step,
            total_steps,
            current_epoch: epoch,
            last_loss: loss.or(self.last_loss),
            status_text,
            ..self
        }
    }

    #[must_use]
    pub fn with_epoch(self, epoch: u32) -> Self {
        let status_text = if self.phase == JobPhase::Running {
            format!("Epoch {epoch} completed")
        } else {
            self.status_text.clone()
        };
        Self { current_epoch: f64::from(epoch), status_text, ..self }
    }

    /// Moves to `phase` with fresh status text. Terminal phases stamp `finished_at`.
    #[must_use]
    pub fn with_phase(self, phase: JobPhase) -> Self {
        let status_text = match phase {
            JobPhase::Idle => "Ready".to_string(),
            JobPhase::Running if self.current_step > 0 => {
                format!("Training in progress... Step {}/{}", self.current_step, self.total_steps)
            }
            JobPhase::Running => "Training in progress...".to_string(),
            JobPhase::Paused => "Training paused...".to_string(),
            JobPhase::Cancelling => "Cancelling training...".to_string(),
            JobPhase::Cancelled => "Training cancelled.".to_string(),
            JobPhase::Completed => "Training completed.".to_string(),
            JobPhase::Failed => "Training failed.".to_string(),
        };
        let finished_at = if phase.is_terminal() { Some(Utc::now()) } else { self.finished_at };
        Self { phase, status_text, finished_at, ..self }
    }

    #[must_use]
    pub fn failed(self, error: impl Into<String>) -> Self {
        Self { last_error: Some(error.into()), ..self.with_phase(JobPhase::Failed) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_idle_starts() {
        for phase in [
            JobPhase::Running,
            JobPhase::Paused,
            JobPhase::Cancelling,
            JobPhase::Cancelled,
            JobPhase::Completed,
            JobPhase::Failed,
        ] {
            assert!(!phase.can_transition_to(JobPhase::Running) || phase == JobPhase::Paused);
        }
        assert!(JobPhase::Idle.can_transition_to(JobPhase::Running));
    }

    #[test]
    fn test_cancel_goes_through_cancelling() {
        assert!(JobPhase::Running.can_transition_to(JobPhase::Cancelling));
        assert!(JobPhase::Paused.can_transition_to(JobPhase::Cancelling));
        assert!(JobPhase::Cancelling.can_transition_to(JobPhase::Cancelled));
        assert!(!JobPhase::Running.can_transition_to(JobPhase::Cancelled));
        assert!(!JobPhase::Idle.can_transition_to(JobPhase::Cancelling));
    }

    #[test]
    fn test_terminal_phases_reset_to_idle() {
        for phase in [JobPhase::Completed, JobPhase::Cancelled, JobPhase::Failed] {
            assert!(phase.is_terminal());
            assert!(!phase.is_active());
            assert!(phase.can_transition_to(JobPhase::Idle));
        }
        assert!(!JobPhase::Running.can_transition_to(JobPhase::Idle));
    }

    #[test]
    fn test_step_status_frozen_while_paused() {
        let state = JobState::started(TrainingJobId::new()).with_step(1, 4, 0.25, Some(2.0));
        assert_eq!(state.status_text, "Training in progress... Step 1/4");

        let paused = state.with_phase(JobPhase::Paused).with_step(2, 4, 0.5, None);
        assert_eq!(paused.status_text, "Training paused...");
        assert_eq!(paused.current_step, 2);
        assert_eq!(paused.last_loss, Some(2.0));
        assert!((paused.percent() - 50.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_failed_records_error_and_finish_time() {
        let state = JobState::started(TrainingJobId::new()).failed("boom");
        assert_eq!(state.phase, JobPhase::Failed);
        assert_eq!(state.last_error.as_deref(), Some("boom"));
        assert!(state.finished_at.is_some());
    }
}
