//! Persistence layer interface for segments, batches, and results.
//!
//! The store is the single source of truth. Every mutation of shared batch
//! state goes through the conditional primitives here (`append_segment`,
//! `transition`), so any number of stateless workers can run concurrently
//! without coordinating beyond the store itself.

pub mod memory;

pub use memory::MemoryStore;

use crate::error::Result;
use crate::model::{
    AudioBatch, AudioSegment, BatchId, BatchStatus, SegmentId, TranscriptionResult,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// Durable record of audio segments, batches, and transcription results.
#[async_trait]
pub trait BatchStore: Send + Sync {
    /// Look up a segment by id. The ingestion loop's idempotency guard.
    async fn get_segment(&self, id: &SegmentId) -> Result<Option<AudioSegment>>;

    /// Insert or replace a segment record.
    async fn put_segment(&self, segment: AudioSegment) -> Result<()>;

    /// Record the batch assignment on a segment.
    async fn set_segment_batch(&self, id: &SegmentId, batch_id: BatchId) -> Result<()>;

    /// Create a new batch. Fails if the id already exists.
    async fn create_batch(&self, batch: AudioBatch) -> Result<()>;

    async fn get_batch(&self, id: BatchId) -> Result<Option<AudioBatch>>;

    /// The user's open (ACCUMULATING) batch, if any.
    async fn open_batch_for_user(&self, user_id: &str) -> Result<Option<AudioBatch>>;

    /// Conditionally append a segment to a batch.
    ///
    /// Succeeds only while the batch is still ACCUMULATING; returns `false`
    /// if a concurrent sweep closed it first. The segment id is inserted in
    /// `uploaded_at` order and `last_segment_at` advances monotonically, so
    /// a late-but-in-window segment keeps the membership list time-ordered.
    async fn append_segment(
        &self,
        batch_id: BatchId,
        segment_id: &SegmentId,
        uploaded_at: DateTime<Utc>,
    ) -> Result<bool>;

    /// Compare-and-swap on batch status.
    ///
    /// Applies `expected -> next` atomically, returning `false` when the
    /// current status no longer matches `expected` (somebody else won the
    /// race). Illegal transitions are an error, not a lost race.
    ///
    /// Side effects on success: `closed_at` is stamped on ACCUMULATING ->
    /// READY, `dispatched_at` on READY -> PROCESSING (which also clears the
    /// retry backoff gate).
    async fn transition(
        &self,
        batch_id: BatchId,
        expected: BatchStatus,
        next: BatchStatus,
        at: DateTime<Utc>,
    ) -> Result<bool>;

    /// All batches currently in `status`.
    async fn list_batches(&self, status: BatchStatus) -> Result<Vec<AudioBatch>>;

    /// Record a retry attempt: new count plus the earliest re-pickup time.
    async fn record_retry(
        &self,
        batch_id: BatchId,
        retry_count: u32,
        not_before: Option<DateTime<Utc>>,
    ) -> Result<()>;

    /// The batch's segments, ordered by `uploaded_at`.
    async fn segments_for_batch(&self, batch_id: BatchId) -> Result<Vec<AudioSegment>>;

    /// Record a transcription result. Write-once: a second write for the
    /// same batch is an error.
    async fn put_result(&self, result: TranscriptionResult) -> Result<()>;

    async fn get_result(&self, batch_id: BatchId) -> Result<Option<TranscriptionResult>>;
}
