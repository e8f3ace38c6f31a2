//! Segment-to-batch assignment.
//!
//! All timing decisions here compare the segments' `uploaded_at` timestamps,
//! not receipt time: delivery is unordered and a delayed notification must
//! not stretch a session.

use crate::clock::Clock;
use crate::config::BatchingConfig;
use crate::error::Result;
use crate::model::{AudioBatch, AudioSegment, BatchId, BatchStatus};
use crate::store::BatchStore;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info};

/// Assigns speech-bearing segments to their user's batch.
pub struct BatchManager {
    store: Arc<dyn BatchStore>,
    clock: Arc<dyn Clock>,
    config: BatchingConfig,
    /// One lock per user serializes assignment decisions; cross-user
    /// assignments proceed in parallel.
    user_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl BatchManager {
    pub fn new(store: Arc<dyn BatchStore>, clock: Arc<dyn Clock>, config: BatchingConfig) -> Self {
        Self {
            store,
            clock,
            config,
            user_locks: Mutex::new(HashMap::new()),
        }
    }

    async fn lock_for_user(&self, user_id: &str) -> Arc<Mutex<()>> {
        let mut locks = self.user_locks.lock().await;
        locks
            .entry(user_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Assign a segment to its user's open batch, or open a new one.
    ///
    /// A segment continues the open batch when its `uploaded_at` is within
    /// the gap window of the batch's newest segment and the batch has not
    /// outlived the session timeout. Late arrivals inside the window append
    /// too; the store keeps membership in timestamp order. Anything outside
    /// the window closes the batch and seeds a fresh one.
    pub async fn assign(&self, segment: &AudioSegment) -> Result<BatchId> {
        let user_lock = self.lock_for_user(&segment.user_id).await;
        let _guard = user_lock.lock().await;

        if let Some(batch) = self.store.open_batch_for_user(&segment.user_id).await? {
            // Both bounds inclusive: a segment landing exactly on the gap
            // or timeout limit still continues the batch.
            let continues_session = segment.uploaded_at - batch.last_segment_at
                <= self.config.max_gap()
                && segment.uploaded_at - batch.created_at <= self.config.batch_timeout();

            if continues_session {
                if self
                    .store
                    .append_segment(batch.id, &segment.id, segment.uploaded_at)
                    .await?
                {
                    self.store.set_segment_batch(&segment.id, batch.id).await?;
                    debug!(batch_id = %batch.id, segment_id = %segment.id, "appended segment to open batch");
                    return Ok(batch.id);
                }
                // The sweep closed it between lookup and append. Fall
                // through and open a new batch.
            } else {
                // Window expired; close immediately instead of waiting for
                // the next sweep. Losing the race to the sweep is fine.
                self.store
                    .transition(
                        batch.id,
                        BatchStatus::Accumulating,
                        BatchStatus::Ready,
                        self.clock.now(),
                    )
                    .await?;
                info!(batch_id = %batch.id, user_id = %segment.user_id, "closed batch on window expiry");
            }
        }

        let batch = AudioBatch::open(&segment.user_id, &segment.id, segment.uploaded_at);
        let batch_id = batch.id;
        self.store.create_batch(batch).await?;
        self.store.set_segment_batch(&segment.id, batch_id).await?;
        info!(batch_id = %batch_id, user_id = %segment.user_id, "opened new batch");
        Ok(batch_id)
    }
}
