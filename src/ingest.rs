//! Ingestion: drains upload notifications into persisted, batch-assigned
//! segments.
//!
//! Every step is safe to repeat, so the worker leans on redelivery instead
//! of its own retry bookkeeping: a message is acknowledged only after the
//! segment is persisted and (if speech-bearing) assigned to a batch.

use crate::audio::{decode_wav, SpeechExtractor};
use crate::batch::BatchManager;
use crate::config::QueueConfig;
use crate::error::{Result, ScribedError};
use crate::model::AudioSegment;
use crate::queue::{NotificationQueue, QueueMessage};
use crate::storage::ObjectStore;
use crate::store::BatchStore;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

pub struct IngestWorker {
    queue: Arc<dyn NotificationQueue>,
    store: Arc<dyn BatchStore>,
    objects: Arc<dyn ObjectStore>,
    extractor: SpeechExtractor,
    manager: Arc<BatchManager>,
    queue_config: QueueConfig,
}

impl IngestWorker {
    pub fn new(
        queue: Arc<dyn NotificationQueue>,
        store: Arc<dyn BatchStore>,
        objects: Arc<dyn ObjectStore>,
        extractor: SpeechExtractor,
        manager: Arc<BatchManager>,
        queue_config: QueueConfig,
    ) -> Self {
        Self {
            queue,
            store,
            objects,
            extractor,
            manager,
            queue_config,
        }
    }

    /// Process one notification to completion, then acknowledge it.
    ///
    /// Returns without acknowledging on transient failure; the broker
    /// redelivers after the visibility timeout.
    pub async fn handle(&self, message: &QueueMessage) -> Result<()> {
        let notification = &message.notification;
        let segment_id = notification.segment_id();

        // Idempotency guard: a duplicate delivery of an already-ingested
        // segment only needs its acknowledgement. The one exception is a
        // segment persisted by a worker that crashed before assignment;
        // the duplicate repairs it by finishing that last step.
        if let Some(existing) = self.store.get_segment(&segment_id).await? {
            if existing.has_speech == Some(true) && existing.batch_id.is_none() {
                info!(segment_id = %segment_id, "repairing unassigned segment from duplicate delivery");
                self.manager.assign(&existing).await?;
            } else {
                debug!(segment_id = %segment_id, "duplicate delivery, already ingested");
            }
            return self.queue.acknowledge(&message.receipt).await;
        }

        let body = self
            .objects
            .fetch(&notification.storage_bucket, &notification.storage_key)
            .await?;

        let samples = match decode_wav(&body) {
            Ok(samples) => samples,
            Err(e @ ScribedError::AudioDecode { .. }) => {
                // Undecodable uploads never improve on retry. Left
                // unacknowledged, the message is redelivered until the
                // queue's receive limit moves it to the dead-letter list,
                // where an operator can still see it.
                warn!(segment_id = %segment_id, error = %e, "undecodable upload, leaving for dead-letter");
                return Err(e);
            }
            Err(e) => return Err(e),
        };

        let intervals = self.extractor.extract(&samples);
        let has_speech = !intervals.is_empty();
        let segment = AudioSegment {
            id: segment_id.clone(),
            user_id: notification.user_id.clone(),
            uploaded_at: notification.uploaded_at,
            storage_bucket: notification.storage_bucket.clone(),
            storage_key: notification.storage_key.clone(),
            has_speech: Some(has_speech),
            speech_intervals: intervals,
            batch_id: None,
        };
        self.store.put_segment(segment.clone()).await?;

        if has_speech {
            let batch_id = self.manager.assign(&segment).await?;
            info!(
                segment_id = %segment_id,
                batch_id = %batch_id,
                speech_ms = segment.speech_ms(),
                "ingested speech segment"
            );
        } else {
            debug!(segment_id = %segment_id, "segment is silence, skipping batch assignment");
        }

        self.queue.acknowledge(&message.receipt).await
    }

    /// Poll-and-process loop until shutdown is signalled.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        let wait = Duration::from_secs(self.queue_config.wait_time_seconds);
        loop {
            let receive = self.queue.receive(self.queue_config.max_messages, wait);
            let messages = tokio::select! {
                result = receive => match result {
                    Ok(messages) => messages,
                    Err(e) => {
                        error!(error = %e, "queue receive failed");
                        tokio::time::sleep(Duration::from_secs(1)).await;
                        continue;
                    }
                },
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!("ingest worker stopping");
                        return;
                    }
                    continue;
                }
            };

            for message in &messages {
                if let Err(e) = self.handle(message).await {
                    // Left unacknowledged on purpose; redelivery will retry.
                    error!(
                        segment = %message.notification.segment_id(),
                        error = %e,
                        "failed to ingest segment"
                    );
                }
            }

            if *shutdown.borrow() {
                info!("ingest worker stopping");
                return;
            }
        }
    }
}
