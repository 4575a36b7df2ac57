use crate::job::TrainingJobId;
use crate::state::{JobPhase, JobState};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

/// Immutable copy of job progress handed to the controlling surface.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressSnapshot {
    pub job_id: Option<TrainingJobId>,
    pub phase: JobPhase,
    pub current_step: u64,
    pub total_steps: u64,
    pub epoch: f64,
    pub loss: Option<f64>,
    pub status_text: String,
    pub percent: f64,
}

impl From<&JobState> for ProgressSnapshot {
    fn from(state: &JobState) -> Self {
        Self {
            job_id: state.job_id.clone(),
            phase: state.phase,
            current_step: state.current_step,
            total_steps: state.total_steps,
            epoch: state.current_epoch,
            loss: state.last_loss,
            status_text: state.status_text.clone(),
            percent: state.percent(),
        }
    }
}

/// Receives snapshots from the job context. Implementations must not block.
pub trait ProgressSink: Send + Sync {
    fn publish(&self, snapshot: ProgressSnapshot);
}

/// Bounded channel sink; drops snapshots when the surface falls behind.
#[derive(Debug, Clone)]
pub struct ChannelProgressSink {
    tx: mpsc::Sender<ProgressSnapshot>,
}

impl ChannelProgressSink {
    pub fn new(tx: mpsc::Sender<ProgressSnapshot>) -> Self {
        Self { tx }
    }
}

impl ProgressSink for ChannelProgressSink {
    fn publish(&self, snapshot: ProgressSnapshot) {
        match self.tx.try_send(snapshot) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(snapshot)) => {
                tracing::debug!(step = snapshot.current_step, "Progress channel full, dropping snapshot");
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                tracing::trace!("Progress receiver dropped");
            }
        }
    }
}

/// Creates a progress channel; capacity is at least one.
pub fn progress_channel(capacity: usize) -> (ChannelProgressSink, mpsc::Receiver<ProgressSnapshot>) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (ChannelProgressSink::new(tx), rx)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_full_channel_drops_without_blocking() {
        let (sink, mut rx) = progress_channel(1);
        let state = JobState::started(TrainingJobId::new());

        sink.publish(ProgressSnapshot::from(&state.clone().with_step(1, 3, 0.3, None)));
        sink.publish(ProgressSnapshot::from(&state.with_step(2, 3, 0.6, None)));

        assert_eq!(rx.try_recv().unwrap().current_step, 1);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_snapshot_copies_percent() {
        let state = JobState::started(TrainingJobId::new()).with_step(1, 4, 0.25, Some(1.5));
        let snapshot = ProgressSnapshot::from(&state);
        assert!((snapshot.percent - 25.0).abs() < f64::EPSILON);
        assert_eq!(snapshot.loss, Some(1.5));
    }
}
