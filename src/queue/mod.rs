//! Notification queue interface.
//!
//! Delivery is at-least-once and unordered: messages may arrive duplicated
//! or out of order relative to upload time. Consumers must be idempotent.

pub mod memory;
pub mod sqs;

pub use memory::MemoryQueue;
pub use sqs::SqsQueue;

use crate::error::Result;
use crate::model::UploadNotification;
use async_trait::async_trait;
use std::time::Duration;

/// One received message plus the handle needed to acknowledge it.
#[derive(Debug, Clone)]
pub struct QueueMessage {
    /// Opaque receipt handle; valid until the visibility timeout expires.
    pub receipt: String,
    pub notification: UploadNotification,
}

/// Source of object-storage upload events.
#[async_trait]
pub trait NotificationQueue: Send + Sync {
    /// Long-poll for up to `max` messages, waiting at most `wait`.
    ///
    /// Received messages become invisible to other consumers for the queue's
    /// visibility timeout; unacknowledged messages are redelivered after it
    /// expires.
    async fn receive(&self, max: usize, wait: Duration) -> Result<Vec<QueueMessage>>;

    /// Delete a message after successful processing.
    async fn acknowledge(&self, receipt: &str) -> Result<()>;
}
