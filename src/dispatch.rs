//! Transcription dispatch.
//!
//! Dispatchers are stateless: the claim is the conditional READY ->
//! PROCESSING transition in the store, and everything else can be redone.
//! Audio is re-fetched from object storage on every attempt and reduced to
//! speech using the intervals recorded at ingest time, so a retry after a
//! crash needs nothing from the worker that died.

use crate::audio::{decode_wav, encode_wav, slice_speech};
use crate::clock::Clock;
use crate::config::DispatchConfig;
use crate::defaults;
use crate::error::Result;
use crate::model::{AudioBatch, BatchStatus, TranscriptionResult};
use crate::storage::ObjectStore;
use crate::store::BatchStore;
use crate::transcribe::TranscriptionProvider;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{error, info, warn};

pub struct Dispatcher {
    store: Arc<dyn BatchStore>,
    objects: Arc<dyn ObjectStore>,
    provider: Arc<dyn TranscriptionProvider>,
    clock: Arc<dyn Clock>,
    config: DispatchConfig,
}

impl Dispatcher {
    pub fn new(
        store: Arc<dyn BatchStore>,
        objects: Arc<dyn ObjectStore>,
        provider: Arc<dyn TranscriptionProvider>,
        clock: Arc<dyn Clock>,
        config: DispatchConfig,
    ) -> Self {
        Self {
            store,
            objects,
            provider,
            clock,
            config,
        }
    }

    /// One pass over READY batches. Returns how many this worker processed.
    ///
    /// The READY -> PROCESSING transition is the claim: whichever worker's
    /// compare-and-swap lands first owns the batch, everyone else moves on.
    pub async fn poll_once(&self) -> Result<usize> {
        let now = self.clock.now();
        let mut processed = 0;

        for batch in self.store.list_batches(BatchStatus::Ready).await? {
            if !batch.dispatchable_at(now) {
                continue;
            }
            if !self
                .store
                .transition(batch.id, BatchStatus::Ready, BatchStatus::Processing, now)
                .await?
            {
                continue;
            }
            self.process(&batch).await?;
            processed += 1;
        }
        Ok(processed)
    }

    /// Transcribe one claimed batch and settle its final status.
    async fn process(&self, batch: &AudioBatch) -> Result<()> {
        match self.assemble_and_transcribe(batch).await {
            Ok(()) => Ok(()),
            Err(Outcome::Retryable(reason)) => self.handle_retryable(batch, &reason).await,
            Err(Outcome::Permanent(reason)) => {
                error!(batch_id = %batch.id, reason = %reason, "batch failed permanently");
                self.store
                    .transition(
                        batch.id,
                        BatchStatus::Processing,
                        BatchStatus::Failed,
                        self.clock.now(),
                    )
                    .await?;
                Ok(())
            }
        }
    }

    async fn assemble_and_transcribe(&self, batch: &AudioBatch) -> std::result::Result<(), Outcome> {
        let wav_bytes = self.assemble_speech_audio(batch).await?;

        let transcription = self.provider.transcribe(&wav_bytes).await.map_err(|e| {
            if e.is_retryable() {
                Outcome::Retryable(e.to_string())
            } else {
                Outcome::Permanent(e.to_string())
            }
        })?;

        let completed_at = self.clock.now();
        let result = TranscriptionResult {
            batch_id: batch.id,
            text: transcription.text,
            confidence: transcription.confidence,
            detected_language: transcription.detected_language,
            provider_raw_response: transcription.raw_response,
            completed_at,
        };
        self.store
            .put_result(result)
            .await
            .map_err(|e| Outcome::Retryable(e.to_string()))?;
        self.store
            .transition(
                batch.id,
                BatchStatus::Processing,
                BatchStatus::Completed,
                completed_at,
            )
            .await
            .map_err(|e| Outcome::Retryable(e.to_string()))?;
        info!(batch_id = %batch.id, "batch transcribed");
        Ok(())
    }

    /// Fetch each member segment, cut it down to its recorded speech
    /// intervals, and concatenate the pieces in upload order.
    async fn assemble_speech_audio(&self, batch: &AudioBatch) -> std::result::Result<Vec<u8>, Outcome> {
        let segments = self
            .store
            .segments_for_batch(batch.id)
            .await
            .map_err(|e| Outcome::Retryable(e.to_string()))?;

        let mut speech = Vec::new();
        for segment in &segments {
            let body = self
                .objects
                .fetch(&segment.storage_bucket, &segment.storage_key)
                .await
                .map_err(|e| Outcome::Retryable(e.to_string()))?;
            let samples = match decode_wav(&body) {
                Ok(samples) => samples,
                // The object decoded at ingest time; if it no longer does,
                // the stored copy is damaged and retrying cannot help.
                Err(e) => return Err(Outcome::Permanent(e.to_string())),
            };
            speech.extend(slice_speech(
                &samples,
                defaults::SAMPLE_RATE,
                &segment.speech_intervals,
            ));
        }

        encode_wav(&speech).map_err(|e| Outcome::Permanent(e.to_string()))
    }

    async fn handle_retryable(&self, batch: &AudioBatch, reason: &str) -> Result<()> {
        let now = self.clock.now();
        let retry_count = batch.retry_count + 1;

        if retry_count >= self.config.max_retry_count {
            error!(
                batch_id = %batch.id,
                retry_count,
                reason = %reason,
                "retries exhausted, batch failed"
            );
            self.store.record_retry(batch.id, retry_count, None).await?;
            self.store
                .transition(batch.id, BatchStatus::Processing, BatchStatus::Failed, now)
                .await?;
            return Ok(());
        }

        let not_before = now + self.config.backoff_for(retry_count);
        warn!(
            batch_id = %batch.id,
            retry_count,
            reason = %reason,
            retry_at = %not_before,
            "transient failure, batch re-queued"
        );
        // Backoff gate is set before the batch becomes visible again.
        self.store
            .record_retry(batch.id, retry_count, Some(not_before))
            .await?;
        self.store
            .transition(batch.id, BatchStatus::Processing, BatchStatus::Ready, now)
            .await?;
        Ok(())
    }

    /// Settle batches stuck in PROCESSING past the grace period.
    ///
    /// A batch in PROCESSING with an old claim belongs to a worker that
    /// died mid-attempt. An expired claim is a provider call that never
    /// came back, so it goes through the same retry accounting as an
    /// explicit failure: retry count incremented, back to READY behind the
    /// backoff gate, or FAILED once retries are exhausted. Otherwise a
    /// batch whose dispatch reliably kills its worker would cycle forever.
    /// Run at startup and periodically thereafter.
    pub async fn recover_stale(&self) -> Result<usize> {
        let now = self.clock.now();
        let grace = self.config.processing_grace_period();
        let mut recovered = 0;

        for batch in self.store.list_batches(BatchStatus::Processing).await? {
            let stale = batch.dispatched_at.map_or(true, |at| now - at >= grace);
            if !stale {
                continue;
            }
            self.handle_retryable(&batch, "claim expired").await?;
            recovered += 1;
        }
        Ok(recovered)
    }

    /// Poll on a fixed cadence until shutdown is signalled.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        let mut interval =
            tokio::time::interval(Duration::from_secs(self.config.poll_interval_seconds));
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    if let Err(e) = self.recover_stale().await {
                        error!(error = %e, "stale claim recovery failed");
                    }
                    if let Err(e) = self.poll_once().await {
                        error!(error = %e, "dispatch poll failed");
                    }
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!("dispatcher stopping");
                        return;
                    }
                }
            }
        }
    }
}

/// How one dispatch attempt went wrong.
enum Outcome {
    /// Worth another attempt after backoff.
    Retryable(String),
    /// Retrying the same batch cannot succeed.
    Permanent(String),
}
