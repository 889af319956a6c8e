//! Worker pool: a fixed set of worker loops per model queue.

use std::sync::Arc;
use std::time::Duration;

use embed_dispatch_common::{Broker, ModelRegistry, ResultStore};
use tokio::sync::watch;
use tokio::task::JoinHandle;

use super::WorkerLoop;
use crate::config::WorkerConfig;
use crate::engine::EngineRegistry;
use crate::error::{Error, Result};

/// Running worker loops, stopped together on shutdown.
pub struct WorkerPool {
    shutdown: watch::Sender<bool>,
    handles: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    /// Spawn `slots_per_model` workers for every model bound by `config`.
    ///
    /// Models are selected with [`WorkerConfig::bound_models`]; a selected key
    /// missing from the registry is an error.
    pub async fn start(
        models: &ModelRegistry,
        engines: &EngineRegistry,
        broker: Arc<dyn Broker>,
        store: Arc<dyn ResultStore>,
        config: &WorkerConfig,
    ) -> Result<Self> {
        let (shutdown, shutdown_rx) = watch::channel(false);
        let slots = config.slots_per_model;
        let bound = config.bound_models(models)?;
        let mut handles = Vec::new();

        for descriptor in bound.iter().copied() {
            let engine = engines
                .get(&descriptor.model_key)
                .await
                .ok_or_else(|| Error::NoEngine(descriptor.model_key.clone()))?;

            for slot in 0..slots {
                let worker = WorkerLoop::new(
                    descriptor.clone(),
                    engine.clone(),
                    broker.clone(),
                    store.clone(),
                    config,
                )
                .with_slot(slot);
                let rx = shutdown_rx.clone();
                let delay = config.reconnect_delay();
                handles.push(tokio::spawn(supervise(worker, rx, delay)));
            }
        }

        if handles.is_empty() {
            tracing::info!("No models bound to this process, worker pool idle");
        } else {
            tracing::info!(
                models = bound.len(),
                workers = handles.len(),
                "Worker pool started"
            );
        }

        Ok(Self { shutdown, handles })
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    /// Signal every worker to stop and wait for in-flight tasks to settle.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        for handle in self.handles {
            if let Err(e) = handle.await {
                tracing::error!("Worker task panicked: {}", e);
            }
        }
        tracing::info!("Worker pool stopped");
    }
}

/// Keep a worker consuming, reopening its consumer after broker errors.
async fn supervise(worker: WorkerLoop, mut shutdown: watch::Receiver<bool>, delay: Duration) {
    loop {
        match worker.run(shutdown.clone()).await {
            Ok(()) => return,
            Err(e) => {
                tracing::error!(queue = %worker.queue(), "Worker error: {}", e);
            }
        }

        tracing::info!(
            queue = %worker.queue(),
            "Reconnecting in {} seconds...",
            delay.as_secs()
        );
        tokio::select! {
            _ = shutdown.changed() => return,
            _ = tokio::time::sleep(delay) => {}
        }
    }
}
