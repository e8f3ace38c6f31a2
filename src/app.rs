//! Composition root: wires the pipeline together and runs it to shutdown.

use crate::audio::SpeechExtractor;
use crate::batch::{BatchManager, BatchMonitor};
use crate::clock::{Clock, SystemClock};
use crate::config::Config;
use crate::dispatch::Dispatcher;
use crate::error::{Result, ScribedError};
use crate::ingest::IngestWorker;
use crate::queue::{NotificationQueue, SqsQueue};
use crate::storage::{HttpObjectStore, ObjectStore};
use crate::store::{BatchStore, MemoryStore};
use crate::transcribe::{DeepgramProvider, TranscriptionProvider};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{error, info};

fn require(key: &'static str, value: &str) -> Result<()> {
    if value.is_empty() {
        return Err(ScribedError::ConfigInvalidValue {
            key: key.to_string(),
            message: "must be set".to_string(),
        });
    }
    Ok(())
}

/// Run the full pipeline until Ctrl+C.
pub async fn run(config: Config) -> Result<()> {
    require("queue.url", &config.queue.url)?;
    require("storage.base_url", &config.storage.base_url)?;
    require("transcription.api_key", &config.transcription.api_key)?;

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let store: Arc<dyn BatchStore> = Arc::new(MemoryStore::new());
    let queue: Arc<dyn NotificationQueue> = Arc::new(SqsQueue::new(
        config.queue.url.clone(),
        config.queue.visibility_timeout_seconds,
    ));
    let objects: Arc<dyn ObjectStore> =
        Arc::new(HttpObjectStore::new(config.storage.base_url.clone()));
    let provider: Arc<dyn TranscriptionProvider> = Arc::new(
        DeepgramProvider::new(config.transcription.clone()).map_err(|e| {
            ScribedError::Provider {
                message: e.to_string(),
            }
        })?,
    );

    let manager = Arc::new(BatchManager::new(
        store.clone(),
        clock.clone(),
        config.batching.clone(),
    ));
    let monitor = Arc::new(BatchMonitor::new(
        store.clone(),
        clock.clone(),
        config.batching.clone(),
    ));
    let dispatcher = Arc::new(Dispatcher::new(
        store.clone(),
        objects.clone(),
        provider,
        clock.clone(),
        config.dispatch.clone(),
    ));

    // Batches left PROCESSING by a previous run are orphaned claims.
    let recovered = dispatcher.recover_stale().await?;
    if recovered > 0 {
        info!(recovered, "re-queued stale claims from previous run");
    }

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let mut handles = Vec::new();

    for n in 0..config.ingest.workers {
        let worker = Arc::new(IngestWorker::new(
            queue.clone(),
            store.clone(),
            objects.clone(),
            SpeechExtractor::new(config.vad.clone()),
            manager.clone(),
            config.queue.clone(),
        ));
        let rx = shutdown_rx.clone();
        handles.push(tokio::spawn(async move {
            info!(worker = n, "ingest worker started");
            worker.run(rx).await;
        }));
    }

    {
        let monitor = monitor.clone();
        let rx = shutdown_rx.clone();
        handles.push(tokio::spawn(async move {
            info!("batch monitor started");
            monitor.run(rx).await;
        }));
    }

    for n in 0..config.dispatch.workers {
        let dispatcher = dispatcher.clone();
        let rx = shutdown_rx.clone();
        handles.push(tokio::spawn(async move {
            info!(worker = n, "dispatch worker started");
            dispatcher.run(rx).await;
        }));
    }

    info!(
        ingest_workers = config.ingest.workers,
        dispatch_workers = config.dispatch.workers,
        "scribed running"
    );

    tokio::signal::ctrl_c().await?;
    info!("shutdown requested");
    if shutdown_tx.send(true).is_err() {
        error!("all workers already gone");
    }
    for handle in handles {
        if let Err(e) = handle.await {
            error!(error = %e, "worker task panicked");
        }
    }
    info!("scribed stopped");
    Ok(())
}
