//! Fake collaborators for driving the orchestrator through its failure
//! paths.

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Semaphore;

use docprofile::{
    AnalyzeError, ChunkVector, EmbeddingGenerator, ExtractError, ProfileData, ProfileExtractor,
    ServiceError, TextExtractor, VectorStore,
};

use super::builders::sample_profile;

/// Returns a fixed profile and records every text it was asked to analyze.
#[derive(Default)]
pub struct RecordingProfileExtractor {
    pub texts: Mutex<Vec<String>>,
    pub urls: Mutex<Vec<Option<String>>>,
}

#[async_trait]
impl ProfileExtractor for RecordingProfileExtractor {
    async fn analyze(
        &self,
        full_text: &str,
        external_profile_url: Option<&str>,
    ) -> Result<ProfileData, AnalyzeError> {
        self.texts.lock().unwrap().push(full_text.to_string());
        self.urls
            .lock()
            .unwrap()
            .push(external_profile_url.map(str::to_string));
        Ok(sample_profile())
    }
}

/// Fails the first `failures` calls with the given error, then succeeds.
pub struct FlakyProfileExtractor {
    failures: usize,
    error: AnalyzeError,
    calls: AtomicUsize,
}

impl FlakyProfileExtractor {
    pub fn new(failures: usize, error: AnalyzeError) -> Self {
        Self {
            failures,
            error,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn always(error: AnalyzeError) -> Self {
        Self::new(usize::MAX, error)
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ProfileExtractor for FlakyProfileExtractor {
    async fn analyze(&self, _: &str, _: Option<&str>) -> Result<ProfileData, AnalyzeError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if call < self.failures {
            return Err(self.error.clone());
        }
        Ok(sample_profile())
    }
}

/// Never answers within any reasonable timeout.
pub struct SlowProfileExtractor(pub Duration);

#[async_trait]
impl ProfileExtractor for SlowProfileExtractor {
    async fn analyze(&self, _: &str, _: Option<&str>) -> Result<ProfileData, AnalyzeError> {
        tokio::time::sleep(self.0).await;
        Ok(sample_profile())
    }
}

/// Plain UTF-8 extractor that blocks until the test opens the gate.
///
/// Every call takes one permit from `gate`; `entered` counts calls that
/// reached the gate.
pub struct GatedExtractor {
    gate: Arc<Semaphore>,
    entered: Arc<AtomicUsize>,
}

impl GatedExtractor {
    pub fn new() -> Self {
        Self {
            gate: Arc::new(Semaphore::new(0)),
            entered: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn release(&self, calls: usize) {
        self.gate.add_permits(calls);
    }

    pub fn entered(&self) -> usize {
        self.entered.load(Ordering::SeqCst)
    }

    /// Waits until `calls` executions are parked at the gate.
    pub async fn wait_entered(&self, calls: usize) {
        tokio::time::timeout(Duration::from_secs(10), async {
            while self.entered() < calls {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("executions never reached the gate");
    }
}

#[async_trait]
impl TextExtractor for GatedExtractor {
    async fn extract(&self, content: &[u8], _: &str) -> Result<String, ExtractError> {
        self.entered.fetch_add(1, Ordering::SeqCst);
        let permit = self
            .gate
            .acquire()
            .await
            .map_err(|e| ExtractError::Failed(e.to_string()))?;
        permit.forget();
        Ok(String::from_utf8_lossy(content).into_owned())
    }
}

/// Plain UTF-8 extractor that records how many calls overlap.
#[derive(Default)]
pub struct TrackingExtractor {
    current: AtomicUsize,
    max: AtomicUsize,
    delay: Duration,
}

impl TrackingExtractor {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            ..Self::default()
        }
    }

    pub fn max_concurrent(&self) -> usize {
        self.max.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TextExtractor for TrackingExtractor {
    async fn extract(&self, content: &[u8], _: &str) -> Result<String, ExtractError> {
        let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.max.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
        self.current.fetch_sub(1, Ordering::SeqCst);
        Ok(String::from_utf8_lossy(content).into_owned())
    }
}

/// Embedder whose every call fails.
pub struct FailingEmbedder;

#[async_trait]
impl EmbeddingGenerator for FailingEmbedder {
    async fn embed(&self, _: &str) -> Result<Vec<f32>, ServiceError> {
        Err(ServiceError::new("embedding model unavailable"))
    }
}

/// Vector store whose every write fails.
pub struct FailingVectorStore;

#[async_trait]
impl VectorStore for FailingVectorStore {
    async fn store(&self, _: &str, _: &[ChunkVector]) -> Result<(), ServiceError> {
        Err(ServiceError::new("vector index offline"))
    }
}
