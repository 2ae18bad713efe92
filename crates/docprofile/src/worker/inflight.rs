use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::error::WorkerError;

/// Set of job ids that currently have a pipeline execution scheduled or
/// running. A job id is in the set for as long as its [`ExecutionClaim`]
/// is alive.
#[derive(Clone, Debug, Default)]
pub struct InFlightRegistry {
    ids: Arc<Mutex<HashSet<String>>>,
}

/// Exclusive right to execute one job. Releases the id on drop.
#[derive(Debug)]
pub struct ExecutionClaim {
    job_id: String,
    ids: Arc<Mutex<HashSet<String>>>,
}

impl InFlightRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashSet<String>> {
        // The set stays consistent even if a holder panicked.
        self.ids.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Claims `job_id`, failing if another execution already holds it.
    pub fn claim(&self, job_id: &str) -> Result<ExecutionClaim, WorkerError> {
        if !self.lock().insert(job_id.to_string()) {
            return Err(WorkerError::AlreadyRunning(job_id.to_string()));
        }
        Ok(ExecutionClaim {
            job_id: job_id.to_string(),
            ids: Arc::clone(&self.ids),
        })
    }

    pub fn contains(&self, job_id: &str) -> bool {
        self.lock().contains(job_id)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}

impl ExecutionClaim {
    pub fn job_id(&self) -> &str {
        &self.job_id
    }
}

impl Drop for ExecutionClaim {
    fn drop(&mut self) {
        let mut ids = self.ids.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        ids.remove(&self.job_id);
    }
}
