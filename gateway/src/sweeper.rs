//! Background eviction of expired task records.

use std::sync::Arc;
use std::time::Duration;

use embed_dispatch_common::ResultStore;
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Spawn a task purging expired records every `interval` until shutdown.
pub fn spawn(
    store: Arc<dyn ResultStore>,
    interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        // The first tick completes immediately.
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = shutdown.changed() => break,
                _ = ticker.tick() => {
                    match store.purge_expired().await {
                        Ok(0) => {}
                        Ok(evicted) => tracing::debug!(evicted, "Purged expired task records"),
                        Err(e) => tracing::warn!("Failed to purge expired task records: {}", e),
                    }
                }
            }
        }
    })
}
