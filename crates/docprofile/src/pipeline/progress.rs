use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use tokio::sync::broadcast;

use crate::broadcast::job_progress::JobProgressEvent;
use crate::job::{FailureKind, JobStatus};

/// Events emitted by the pipeline after each persisted change.
pub enum ProgressEvent {
    Stage {
        status: JobStatus,
        progress: u8,
        step: String,
    },
    Completed,
    Failed {
        error: String,
        kind: FailureKind,
    },
}

pub trait ProgressReporter: Send + Sync {
    fn report(&self, event: ProgressEvent);
}

/// No-op reporter for unit tests.
pub struct NoopProgress;

impl ProgressReporter for NoopProgress {
    fn report(&self, _event: ProgressEvent) {}
}

/// Bridges pipeline events of one job to the broadcast channel.
pub struct BroadcastProgress {
    job_id: String,
    last_progress: AtomicU8,
    sender: Arc<broadcast::Sender<JobProgressEvent>>,
}

impl BroadcastProgress {
    pub fn new(job_id: &str, sender: Arc<broadcast::Sender<JobProgressEvent>>) -> Self {
        Self {
            job_id: job_id.to_string(),
            last_progress: AtomicU8::new(0),
            sender,
        }
    }
}

impl ProgressReporter for BroadcastProgress {
    fn report(&self, event: ProgressEvent) {
        let event = match event {
            ProgressEvent::Stage {
                status,
                progress,
                step,
            } => {
                self.last_progress.fetch_max(progress, Ordering::Relaxed);
                JobProgressEvent::new(&self.job_id, status, progress, &step)
            }
            ProgressEvent::Completed => JobProgressEvent::completed(&self.job_id),
            ProgressEvent::Failed { error, kind } => JobProgressEvent::failed(
                &self.job_id,
                self.last_progress.load(Ordering::Relaxed),
                &error,
                kind,
            ),
        };
        let _ = self.sender.send(event);
    }
}
