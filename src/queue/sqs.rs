//! SQS-compatible queue client.
//!
//! Speaks the `x-amz-json-1.0` wire protocol over plain HTTP, which is what
//! LocalStack- and ElasticMQ-style endpoints accept without signing. Message
//! bodies are S3 event notifications; each record becomes one
//! [`UploadNotification`], with the user id taken from the first path
//! component of the object key (`{user_id}/{filename}`).

use crate::error::{Result, ScribedError};
use crate::model::UploadNotification;
use crate::queue::{NotificationQueue, QueueMessage};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use tracing::warn;

pub struct SqsQueue {
    client: reqwest::Client,
    queue_url: String,
    visibility_timeout_seconds: u64,
}

#[derive(Debug, Deserialize)]
struct ReceiveResponse {
    #[serde(rename = "Messages", default)]
    messages: Vec<RawMessage>,
}

#[derive(Debug, Deserialize)]
struct RawMessage {
    #[serde(rename = "ReceiptHandle")]
    receipt_handle: String,
    #[serde(rename = "Body")]
    body: String,
}

#[derive(Debug, Deserialize)]
struct S3Event {
    #[serde(rename = "Records", default)]
    records: Vec<S3Record>,
}

#[derive(Debug, Deserialize)]
struct S3Record {
    #[serde(rename = "eventTime")]
    event_time: DateTime<Utc>,
    s3: S3Entity,
}

#[derive(Debug, Deserialize)]
struct S3Entity {
    bucket: S3Bucket,
    object: S3Object,
}

#[derive(Debug, Deserialize)]
struct S3Bucket {
    name: String,
}

#[derive(Debug, Deserialize)]
struct S3Object {
    key: String,
}

impl SqsQueue {
    pub fn new(queue_url: String, visibility_timeout_seconds: u64) -> Self {
        Self {
            client: reqwest::Client::new(),
            queue_url,
            visibility_timeout_seconds,
        }
    }

    async fn call(&self, action: &str, body: serde_json::Value) -> Result<serde_json::Value> {
        let response = self
            .client
            .post(&self.queue_url)
            .header("Content-Type", "application/x-amz-json-1.0")
            .header("X-Amz-Target", format!("AmazonSQS.{}", action))
            .json(&body)
            .send()
            .await
            .map_err(|e| ScribedError::QueueReceive {
                message: format!("{} request failed: {}", action, e),
            })?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| ScribedError::QueueReceive {
                message: format!("{} response unreadable: {}", action, e),
            })?;

        if !status.is_success() {
            return Err(ScribedError::QueueReceive {
                message: format!("{} returned {}: {}", action, status, text),
            });
        }

        if text.is_empty() {
            return Ok(serde_json::Value::Null);
        }
        serde_json::from_str(&text).map_err(|e| ScribedError::QueueReceive {
            message: format!("{} returned invalid JSON: {}", action, e),
        })
    }

    /// Expand one message body into notifications, skipping records that do
    /// not look like object uploads.
    fn parse_body(body: &str) -> Vec<UploadNotification> {
        let event: S3Event = match serde_json::from_str(body) {
            Ok(event) => event,
            Err(e) => {
                warn!(error = %e, "discarding undecodable queue message body");
                return Vec::new();
            }
        };

        let mut out = Vec::new();
        for record in event.records {
            let key = record.s3.object.key;
            let Some((user_id, _)) = key.split_once('/') else {
                warn!(key = %key, "object key has no user prefix, skipping");
                continue;
            };
            out.push(UploadNotification {
                user_id: user_id.to_string(),
                storage_bucket: record.s3.bucket.name,
                storage_key: key.clone(),
                uploaded_at: record.event_time,
            });
        }
        out
    }
}

#[async_trait]
impl NotificationQueue for SqsQueue {
    async fn receive(&self, max: usize, wait: Duration) -> Result<Vec<QueueMessage>> {
        let body = json!({
            "QueueUrl": self.queue_url,
            "MaxNumberOfMessages": max.min(10),
            "WaitTimeSeconds": wait.as_secs(),
            "VisibilityTimeout": self.visibility_timeout_seconds,
        });
        let value = self.call("ReceiveMessage", body).await?;
        let response: ReceiveResponse =
            serde_json::from_value(value).map_err(|e| ScribedError::QueueReceive {
                message: format!("ReceiveMessage shape mismatch: {}", e),
            })?;

        let mut out = Vec::new();
        for message in response.messages {
            // A single S3 event can carry several records; they share the
            // receipt, and acknowledging any of them deletes the message.
            for notification in Self::parse_body(&message.body) {
                out.push(QueueMessage {
                    receipt: message.receipt_handle.clone(),
                    notification,
                });
            }
        }
        Ok(out)
    }

    async fn acknowledge(&self, receipt: &str) -> Result<()> {
        let body = json!({
            "QueueUrl": self.queue_url,
            "ReceiptHandle": receipt,
        });
        self.call("DeleteMessage", body)
            .await
            .map_err(|e| ScribedError::QueueAcknowledge {
                receipt: receipt.to_string(),
                message: e.to_string(),
            })?;
        Ok(())
    }
}
