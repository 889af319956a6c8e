//! Test embedders and stores shared by the unit tests.

use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use embed_dispatch_common::{
    default_queue_name, ClaimOutcome, EngineKind, Embeddings, ModelDescriptor, PutOutcome,
    ResultStore, RuntimeParams, StoreError, TaskRecord, TaskResult,
};

use crate::engine::{EmbedError, EmbedOptions, Embedder, EngineHealth};

pub fn descriptor(model_key: &str) -> ModelDescriptor {
    ModelDescriptor {
        model_key: model_key.to_string(),
        display_name: model_key.to_string(),
        queue_name: default_queue_name(model_key),
        description: String::new(),
        version: "1".to_string(),
        engine: EngineKind::Hash,
        runtime_params: RuntimeParams::new(),
    }
}

fn healthy() -> EngineHealth {
    EngineHealth {
        is_healthy: true,
        version: None,
        models: vec![],
    }
}

/// Returns a constant vector per text without touching a blocking pool.
pub struct FixedEmbedder {
    dimension: usize,
    pub calls: AtomicU32,
}

impl FixedEmbedder {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            calls: AtomicU32::new(0),
        }
    }
}

#[async_trait]
impl Embedder for FixedEmbedder {
    fn engine_type(&self) -> &'static str {
        "fixed"
    }

    fn dimension(&self) -> Option<usize> {
        Some(self.dimension)
    }

    async fn health_check(&self) -> Result<EngineHealth, EmbedError> {
        Ok(healthy())
    }

    async fn embed(&self, texts: &[String], _: &EmbedOptions) -> Result<Embeddings, EmbedError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(vec![vec![0.5; self.dimension]; texts.len()])
    }
}

/// Fails with a retryable error for the first `failures` calls.
pub struct FlakyEmbedder {
    failures: u32,
    inner: FixedEmbedder,
    pub calls: AtomicU32,
}

impl FlakyEmbedder {
    pub fn new(failures: u32, dimension: usize) -> Self {
        Self {
            failures,
            inner: FixedEmbedder::new(dimension),
            calls: AtomicU32::new(0),
        }
    }
}

#[async_trait]
impl Embedder for FlakyEmbedder {
    fn engine_type(&self) -> &'static str {
        "flaky"
    }

    fn dimension(&self) -> Option<usize> {
        self.inner.dimension()
    }

    async fn health_check(&self) -> Result<EngineHealth, EmbedError> {
        Ok(healthy())
    }

    async fn embed(&self, texts: &[String], options: &EmbedOptions) -> Result<Embeddings, EmbedError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if call < self.failures {
            return Err(EmbedError::Unavailable("warming up".to_string()));
        }
        self.inner.embed(texts, options).await
    }
}

/// Fails every call with the error built by `make_error`.
pub struct AlwaysFailing {
    make_error: Box<dyn Fn() -> EmbedError + Send + Sync>,
    pub calls: AtomicU32,
}

impl AlwaysFailing {
    pub fn new(make_error: impl Fn() -> EmbedError + Send + Sync + 'static) -> Self {
        Self {
            make_error: Box::new(make_error),
            calls: AtomicU32::new(0),
        }
    }

    pub fn unavailable(message: &'static str) -> Self {
        Self::new(move || EmbedError::Unavailable(message.to_string()))
    }
}

#[async_trait]
impl Embedder for AlwaysFailing {
    fn engine_type(&self) -> &'static str {
        "failing"
    }

    fn dimension(&self) -> Option<usize> {
        None
    }

    async fn health_check(&self) -> Result<EngineHealth, EmbedError> {
        Err((self.make_error)())
    }

    async fn embed(&self, _: &[String], _: &EmbedOptions) -> Result<Embeddings, EmbedError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err((self.make_error)())
    }
}

/// Sleeps before answering, for watchdog tests.
pub struct SlowEmbedder {
    delay: Duration,
}

impl SlowEmbedder {
    pub fn new(delay: Duration) -> Self {
        Self { delay }
    }
}

#[async_trait]
impl Embedder for SlowEmbedder {
    fn engine_type(&self) -> &'static str {
        "slow"
    }

    fn dimension(&self) -> Option<usize> {
        Some(1)
    }

    async fn health_check(&self) -> Result<EngineHealth, EmbedError> {
        Ok(healthy())
    }

    async fn embed(&self, texts: &[String], _: &EmbedOptions) -> Result<Embeddings, EmbedError> {
        tokio::time::sleep(self.delay).await;
        Ok(vec![vec![1.0]; texts.len()])
    }
}

/// A result store that is always down.
pub struct UnavailableStore;

#[async_trait]
impl ResultStore for UnavailableStore {
    fn store_type(&self) -> &'static str {
        "unavailable"
    }

    async fn ping(&self) -> Result<(), StoreError> {
        Err(down())
    }

    async fn mark_pending(&self, _: &str) -> Result<(), StoreError> {
        Err(down())
    }

    async fn discard(&self, _: &str) -> Result<(), StoreError> {
        Err(down())
    }

    async fn mark_started(&self, _: &str, _: u32) -> Result<ClaimOutcome, StoreError> {
        Err(down())
    }

    async fn mark_requeued(&self, _: &str, _: u32) -> Result<ClaimOutcome, StoreError> {
        Err(down())
    }

    async fn put(&self, _: TaskResult) -> Result<PutOutcome, StoreError> {
        Err(down())
    }

    async fn get(&self, _: &str) -> Result<Option<TaskRecord>, StoreError> {
        Err(down())
    }

    async fn purge_expired(&self) -> Result<usize, StoreError> {
        Err(down())
    }
}

fn down() -> StoreError {
    StoreError::Unavailable("connection refused".to_string())
}
