//! Periodic sweep that closes idle or expired batches.
//!
//! Assignment only runs when segments arrive, so a user who simply stops
//! talking would leave their last batch open forever. The monitor closes
//! ACCUMULATING batches once the gap window or the session timeout has
//! elapsed against wall-clock time.

use crate::clock::Clock;
use crate::config::BatchingConfig;
use crate::error::Result;
use crate::model::BatchStatus;
use crate::store::BatchStore;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{error, info};

pub struct BatchMonitor {
    store: Arc<dyn BatchStore>,
    clock: Arc<dyn Clock>,
    config: BatchingConfig,
}

impl BatchMonitor {
    pub fn new(store: Arc<dyn BatchStore>, clock: Arc<dyn Clock>, config: BatchingConfig) -> Self {
        Self {
            store,
            clock,
            config,
        }
    }

    /// One pass over all open batches. Returns how many were closed.
    ///
    /// Closure goes through the same conditional transition as everything
    /// else, so racing a concurrent append or a second monitor instance is
    /// harmless: one side wins, the other observes `false`.
    pub async fn sweep(&self) -> Result<usize> {
        let now = self.clock.now();
        let mut closed = 0;

        for batch in self.store.list_batches(BatchStatus::Accumulating).await? {
            // Strictly greater: a batch exactly at the limit is still
            // continuable by the manager, so it stays open one more sweep.
            let idle_expired = now - batch.last_segment_at > self.config.max_gap();
            let session_expired = now - batch.created_at > self.config.batch_timeout();
            if !idle_expired && !session_expired {
                continue;
            }

            if self
                .store
                .transition(batch.id, BatchStatus::Accumulating, BatchStatus::Ready, now)
                .await?
            {
                info!(
                    batch_id = %batch.id,
                    user_id = %batch.user_id,
                    segments = batch.segment_ids.len(),
                    reason = if session_expired { "session_timeout" } else { "idle_gap" },
                    "closed batch"
                );
                closed += 1;
            }
        }
        Ok(closed)
    }

    /// Sweep on a fixed cadence until shutdown is signalled.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        let mut interval =
            tokio::time::interval(Duration::from_secs(self.config.monitor_interval_seconds));
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    if let Err(e) = self.sweep().await {
                        error!(error = %e, "batch sweep failed");
                    }
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!("batch monitor stopping");
                        return;
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::model::{AudioBatch, SegmentId};
    use crate::store::MemoryStore;
    use chrono::{DateTime, TimeZone, Utc};

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
    }

    fn fixture() -> (BatchMonitor, Arc<MemoryStore>, Arc<ManualClock>) {
        let store = Arc::new(MemoryStore::new());
        let clock = Arc::new(ManualClock::new(t0()));
        let monitor = BatchMonitor::new(store.clone(), clock.clone(), BatchingConfig::default());
        (monitor, store, clock)
    }

    async fn open_batch(store: &MemoryStore, user: &str, at: DateTime<Utc>) -> AudioBatch {
        let sid = SegmentId::from_object("uploads", &format!("{}/seg.wav", user));
        let batch = AudioBatch::open(user, &sid, at);
        store.create_batch(batch.clone()).await.unwrap();
        batch
    }

    #[tokio::test]
    async fn fresh_batch_is_left_open() {
        let (monitor, store, clock) = fixture();
        let batch = open_batch(&store, "alice", t0()).await;

        clock.advance_secs(15);
        assert_eq!(monitor.sweep().await.unwrap(), 0);
        let batch = store.get_batch(batch.id).await.unwrap().unwrap();
        assert_eq!(batch.status, BatchStatus::Accumulating);
    }

    #[tokio::test]
    async fn idle_batch_closes_after_gap_window() {
        let (monitor, store, clock) = fixture();
        let batch = open_batch(&store, "alice", t0()).await;

        // Exactly at the gap limit a segment could still continue the
        // batch, so the sweep leaves it open.
        clock.advance_secs(30);
        assert_eq!(monitor.sweep().await.unwrap(), 0);

        clock.advance_secs(1);
        assert_eq!(monitor.sweep().await.unwrap(), 1);
        let batch = store.get_batch(batch.id).await.unwrap().unwrap();
        assert_eq!(batch.status, BatchStatus::Ready);
        assert_eq!(batch.closed_at, Some(clock.now()));
    }

    #[tokio::test]
    async fn active_batch_closes_at_session_timeout() {
        let (monitor, store, clock) = fixture();
        let batch = open_batch(&store, "alice", t0()).await;

        // Appends every 10s keep the batch inside the gap window, and the
        // sweep at exactly 120s of age still leaves it open.
        for i in 1..=12 {
            clock.advance_secs(10);
            let sid = SegmentId::from_object("uploads", &format!("alice/seg_{i}.wav"));
            assert!(store
                .append_segment(batch.id, &sid, clock.now())
                .await
                .unwrap());
            assert_eq!(monitor.sweep().await.unwrap(), 0);
        }

        // Past 120s of age the session timeout fires regardless of activity.
        clock.advance_secs(1);
        assert_eq!(monitor.sweep().await.unwrap(), 1);
        let batch = store.get_batch(batch.id).await.unwrap().unwrap();
        assert_eq!(batch.status, BatchStatus::Ready);
    }

    #[tokio::test]
    async fn sweep_only_counts_batches_it_closed() {
        let (monitor, store, clock) = fixture();
        open_batch(&store, "alice", t0()).await;
        open_batch(&store, "bob", t0()).await;
        let fresh = open_batch(&store, "carol", t0() + chrono::Duration::seconds(25)).await;

        clock.advance_secs(31);
        assert_eq!(monitor.sweep().await.unwrap(), 2);
        let fresh = store.get_batch(fresh.id).await.unwrap().unwrap();
        assert_eq!(fresh.status, BatchStatus::Accumulating);
    }

    #[tokio::test]
    async fn sweep_is_idempotent() {
        let (monitor, store, clock) = fixture();
        open_batch(&store, "alice", t0()).await;

        clock.advance_secs(40);
        assert_eq!(monitor.sweep().await.unwrap(), 1);
        assert_eq!(monitor.sweep().await.unwrap(), 0);
        let _ = store;
    }
}
