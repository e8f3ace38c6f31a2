//! In-memory store: one async mutex around all tables, so every conditional
//! operation is atomic. Used by tests and single-process deployments.

use super::BatchStore;
use crate::error::{Result, ScribedError};
use crate::model::{
    AudioBatch, AudioSegment, BatchId, BatchStatus, SegmentId, TranscriptionResult,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tokio::sync::Mutex;

#[derive(Default)]
struct Tables {
    segments: HashMap<SegmentId, AudioSegment>,
    batches: HashMap<BatchId, AudioBatch>,
    results: HashMap<BatchId, TranscriptionResult>,
}

/// In-memory [`BatchStore`] implementation.
#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of batches ever created (test helper).
    pub async fn batch_count(&self) -> usize {
        self.tables.lock().await.batches.len()
    }
}

#[async_trait]
impl BatchStore for MemoryStore {
    async fn get_segment(&self, id: &SegmentId) -> Result<Option<AudioSegment>> {
        Ok(self.tables.lock().await.segments.get(id).cloned())
    }

    async fn put_segment(&self, segment: AudioSegment) -> Result<()> {
        self.tables
            .lock()
            .await
            .segments
            .insert(segment.id.clone(), segment);
        Ok(())
    }

    async fn set_segment_batch(&self, id: &SegmentId, batch_id: BatchId) -> Result<()> {
        let mut tables = self.tables.lock().await;
        let segment = tables.segments.get_mut(id).ok_or_else(|| ScribedError::Store {
            message: format!("segment {} not found", id),
        })?;
        segment.batch_id = Some(batch_id);
        Ok(())
    }

    async fn create_batch(&self, batch: AudioBatch) -> Result<()> {
        let mut tables = self.tables.lock().await;
        if tables.batches.contains_key(&batch.id) {
            return Err(ScribedError::Store {
                message: format!("batch {} already exists", batch.id),
            });
        }
        tables.batches.insert(batch.id, batch);
        Ok(())
    }

    async fn get_batch(&self, id: BatchId) -> Result<Option<AudioBatch>> {
        Ok(self.tables.lock().await.batches.get(&id).cloned())
    }

    async fn open_batch_for_user(&self, user_id: &str) -> Result<Option<AudioBatch>> {
        let tables = self.tables.lock().await;
        let open = tables
            .batches
            .values()
            .filter(|b| b.user_id == user_id && b.status == BatchStatus::Accumulating)
            .max_by_key(|b| b.created_at)
            .cloned();
        Ok(open)
    }

    async fn append_segment(
        &self,
        batch_id: BatchId,
        segment_id: &SegmentId,
        uploaded_at: DateTime<Utc>,
    ) -> Result<bool> {
        let mut tables = self.tables.lock().await;

        // Insertion point: after the last member whose timestamp is <= ours.
        // Computed before the mutable borrow of the batch.
        let timestamps: HashMap<SegmentId, DateTime<Utc>> = tables
            .segments
            .iter()
            .map(|(id, s)| (id.clone(), s.uploaded_at))
            .collect();

        let batch = tables
            .batches
            .get_mut(&batch_id)
            .ok_or_else(|| ScribedError::BatchNotFound {
                batch_id: batch_id.to_string(),
            })?;

        if batch.status != BatchStatus::Accumulating {
            return Ok(false);
        }

        // Re-appending an existing member is a no-op, so duplicate
        // deliveries cannot double-count a segment.
        if batch.segment_ids.iter().any(|id| id == segment_id) {
            return Ok(true);
        }

        let pos = batch
            .segment_ids
            .iter()
            .take_while(|id| timestamps.get(*id).map_or(true, |t| *t <= uploaded_at))
            .count();
        batch.segment_ids.insert(pos, segment_id.clone());
        if uploaded_at > batch.last_segment_at {
            batch.last_segment_at = uploaded_at;
        }

        if let Some(segment) = tables.segments.get_mut(segment_id) {
            segment.batch_id = Some(batch_id);
        }

        Ok(true)
    }

    async fn transition(
        &self,
        batch_id: BatchId,
        expected: BatchStatus,
        next: BatchStatus,
        at: DateTime<Utc>,
    ) -> Result<bool> {
        if !expected.can_transition_to(next) {
            return Err(ScribedError::InvalidTransition {
                batch_id: batch_id.to_string(),
                from: expected,
                to: next,
            });
        }

        let mut tables = self.tables.lock().await;
        let batch = tables
            .batches
            .get_mut(&batch_id)
            .ok_or_else(|| ScribedError::BatchNotFound {
                batch_id: batch_id.to_string(),
            })?;

        if batch.status != expected {
            return Ok(false);
        }

        batch.status = next;
        match next {
            BatchStatus::Ready if expected == BatchStatus::Accumulating => {
                batch.closed_at = Some(at);
            }
            BatchStatus::Processing => {
                batch.dispatched_at = Some(at);
                batch.not_before = None;
            }
            _ => {}
        }

        Ok(true)
    }

    async fn list_batches(&self, status: BatchStatus) -> Result<Vec<AudioBatch>> {
        let tables = self.tables.lock().await;
        let mut batches: Vec<AudioBatch> = tables
            .batches
            .values()
            .filter(|b| b.status == status)
            .cloned()
            .collect();
        batches.sort_by_key(|b| b.created_at);
        Ok(batches)
    }

    async fn record_retry(
        &self,
        batch_id: BatchId,
        retry_count: u32,
        not_before: Option<DateTime<Utc>>,
    ) -> Result<()> {
        let mut tables = self.tables.lock().await;
        let batch = tables
            .batches
            .get_mut(&batch_id)
            .ok_or_else(|| ScribedError::BatchNotFound {
                batch_id: batch_id.to_string(),
            })?;
        batch.retry_count = retry_count;
        batch.not_before = not_before;
        Ok(())
    }

    async fn segments_for_batch(&self, batch_id: BatchId) -> Result<Vec<AudioSegment>> {
        let tables = self.tables.lock().await;
        let mut segments: Vec<AudioSegment> = tables
            .segments
            .values()
            .filter(|s| s.batch_id == Some(batch_id))
            .cloned()
            .collect();
        segments.sort_by_key(|s| s.uploaded_at);
        Ok(segments)
    }

    async fn put_result(&self, result: TranscriptionResult) -> Result<()> {
        let mut tables = self.tables.lock().await;
        if tables.results.contains_key(&result.batch_id) {
            return Err(ScribedError::Store {
                message: format!("result for batch {} already recorded", result.batch_id),
            });
        }
        tables.results.insert(result.batch_id, result);
        Ok(())
    }

    async fn get_result(&self, batch_id: BatchId) -> Result<Option<TranscriptionResult>> {
        Ok(self.tables.lock().await.results.get(&batch_id).cloned())
    }
}
