//! In-memory queue with at-least-once semantics, for tests and local runs.

use crate::clock::Clock;
use crate::defaults;
use crate::error::{Result, ScribedError};
use crate::model::UploadNotification;
use crate::queue::{NotificationQueue, QueueMessage};
use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use uuid::Uuid;

struct Entry {
    receipt: String,
    notification: UploadNotification,
    /// Hidden from `receive` until this instant passes.
    invisible_until: Option<DateTime<Utc>>,
    receive_count: u32,
}

struct Inner {
    entries: VecDeque<Entry>,
    dead_letters: Vec<UploadNotification>,
}

/// Queue backed by process memory.
///
/// Faithfully at-least-once: a received message is hidden for the visibility
/// timeout, then redelivered (with a fresh receipt) if not acknowledged.
/// After too many receives it moves to an internal dead-letter list instead.
pub struct MemoryQueue {
    inner: Mutex<Inner>,
    clock: Arc<dyn Clock>,
    visibility_timeout: ChronoDuration,
    max_receives: u32,
}

impl MemoryQueue {
    pub fn new(clock: Arc<dyn Clock>, visibility_timeout_seconds: u64) -> Self {
        Self {
            inner: Mutex::new(Inner {
                entries: VecDeque::new(),
                dead_letters: Vec::new(),
            }),
            clock,
            visibility_timeout: ChronoDuration::seconds(visibility_timeout_seconds as i64),
            max_receives: defaults::QUEUE_MAX_RECEIVES,
        }
    }

    /// Enqueue a notification, as the storage service would on upload.
    pub async fn push(&self, notification: UploadNotification) {
        let mut inner = self.inner.lock().await;
        inner.entries.push_back(Entry {
            receipt: Uuid::new_v4().to_string(),
            notification,
            invisible_until: None,
            receive_count: 0,
        });
    }

    /// Enqueue the same notification twice, simulating duplicate delivery.
    pub async fn push_duplicated(&self, notification: UploadNotification) {
        self.push(notification.clone()).await;
        self.push(notification).await;
    }

    pub async fn len(&self) -> usize {
        self.inner.lock().await.entries.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    pub async fn dead_letter_count(&self) -> usize {
        self.inner.lock().await.dead_letters.len()
    }
}

#[async_trait]
impl NotificationQueue for MemoryQueue {
    async fn receive(&self, max: usize, _wait: Duration) -> Result<Vec<QueueMessage>> {
        let now = self.clock.now();
        let mut inner = self.inner.lock().await;

        // Retire entries that exceeded the receive limit.
        let max_receives = self.max_receives;
        let mut retired = Vec::new();
        inner.entries.retain(|e| {
            let visible = e.invisible_until.map_or(true, |t| t <= now);
            if visible && e.receive_count >= max_receives {
                retired.push(e.notification.clone());
                false
            } else {
                true
            }
        });
        inner.dead_letters.extend(retired);

        let mut out = Vec::new();
        for entry in inner.entries.iter_mut() {
            if out.len() >= max {
                break;
            }
            if entry.invisible_until.map_or(true, |t| t <= now) {
                entry.receive_count += 1;
                entry.invisible_until = Some(now + self.visibility_timeout);
                // Receipts rotate per delivery, like a real broker's handles.
                entry.receipt = Uuid::new_v4().to_string();
                out.push(QueueMessage {
                    receipt: entry.receipt.clone(),
                    notification: entry.notification.clone(),
                });
            }
        }
        Ok(out)
    }

    async fn acknowledge(&self, receipt: &str) -> Result<()> {
        let mut inner = self.inner.lock().await;
        let before = inner.entries.len();
        inner.entries.retain(|e| e.receipt != receipt);
        if inner.entries.len() == before {
            return Err(ScribedError::QueueAcknowledge {
                receipt: receipt.to_string(),
                message: "unknown or expired receipt".to_string(),
            });
        }
        Ok(())
    }
}
