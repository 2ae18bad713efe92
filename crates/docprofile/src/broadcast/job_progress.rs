//! Job progress broadcaster for real-time job status streaming.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::broadcast;

use crate::job::{FailureKind, JobStatus};

/// Progress event for a job. One is sent for every persisted status change.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobProgressEvent {
    pub job_id: String,
    pub status: JobStatus,
    pub progress: u8,
    /// Human-readable description of the current activity.
    pub current_step: String,
    /// Error message (set on failure).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<FailureKind>,
    pub timestamp: DateTime<Utc>,
}

impl JobProgressEvent {
    pub fn new(job_id: &str, status: JobStatus, progress: u8, current_step: &str) -> Self {
        Self {
            job_id: job_id.to_string(),
            status,
            progress,
            current_step: current_step.to_string(),
            error: None,
            error_kind: None,
            timestamp: Utc::now(),
        }
    }

    pub fn queued(job_id: &str, current_step: &str) -> Self {
        Self::new(job_id, JobStatus::Queued, 0, current_step)
    }

    pub fn completed(job_id: &str) -> Self {
        Self::new(job_id, JobStatus::Completed, 100, "Completed")
    }

    pub fn failed(job_id: &str, progress: u8, error: &str, kind: FailureKind) -> Self {
        Self {
            error: Some(error.to_string()),
            error_kind: Some(kind),
            ..Self::new(job_id, JobStatus::Failed, progress, "Failed")
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}

/// Broadcasts job progress events for streaming.
#[derive(Clone)]
pub struct JobProgressBroadcaster {
    sender: Arc<broadcast::Sender<JobProgressEvent>>,
}

impl JobProgressBroadcaster {
    /// Creates a new job progress broadcaster with the specified channel capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self {
            sender: Arc::new(sender),
        }
    }

    /// Sends a progress event to all subscribers.
    pub fn send(&self, event: JobProgressEvent) {
        // No active receivers is fine.
        let _ = self.sender.send(event);
    }

    /// Creates a new subscriber for progress events.
    pub fn subscribe(&self) -> broadcast::Receiver<JobProgressEvent> {
        self.sender.subscribe()
    }

    /// Gets the inner sender for creating per-job reporters.
    pub fn sender(&self) -> Arc<broadcast::Sender<JobProgressEvent>> {
        Arc::clone(&self.sender)
    }
}

impl Default for JobProgressBroadcaster {
    fn default() -> Self {
        Self::new(256)
    }
}
