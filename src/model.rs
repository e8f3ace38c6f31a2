//! Core data model: audio segments, batches, and transcription results.
//!
//! The persistence layer is the source of truth for all of these; workers
//! never hold authoritative copies in memory.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Identifier of one uploaded audio object, derived from its storage location.
///
/// Storage keys are unique per object, so duplicate queue deliveries for the
/// same upload resolve to the same id — the basis of the idempotency guard.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SegmentId(String);

impl SegmentId {
    /// Derive the id from the object's bucket and key.
    pub fn from_object(bucket: &str, key: &str) -> Self {
        Self(format!("{}/{}", bucket, key))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SegmentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identifier of a batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BatchId(Uuid);

impl BatchId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for BatchId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for BatchId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// One detected speech interval, in milliseconds from segment start.
/// Half-open: `[start_ms, end_ms)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpeechInterval {
    pub start_ms: u64,
    pub end_ms: u64,
}

impl SpeechInterval {
    pub fn duration_ms(&self) -> u64 {
        self.end_ms.saturating_sub(self.start_ms)
    }
}

/// One uploaded raw audio object.
///
/// Immutable once speech extraction completes, except for `batch_id`, which
/// is owned by the batch manager.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AudioSegment {
    pub id: SegmentId,
    pub user_id: String,
    /// Source timestamp from the uploading device, not receipt time.
    pub uploaded_at: DateTime<Utc>,
    pub storage_bucket: String,
    pub storage_key: String,
    /// None until speech extraction has run.
    pub has_speech: Option<bool>,
    /// Ordered, non-overlapping. Empty if no speech was detected.
    pub speech_intervals: Vec<SpeechInterval>,
    /// None until assigned by the batch manager.
    pub batch_id: Option<BatchId>,
}

impl AudioSegment {
    /// Total detected speech duration in milliseconds.
    pub fn speech_ms(&self) -> u64 {
        self.speech_intervals.iter().map(|i| i.duration_ms()).sum()
    }
}

/// Lifecycle status of a batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BatchStatus {
    /// Open, accepting segments within the gap/timeout window.
    Accumulating,
    /// Closed, eligible for dispatch.
    Ready,
    /// Claimed by exactly one dispatcher worker.
    Processing,
    /// Transcription recorded.
    Completed,
    /// Retries exhausted or audio rejected; operator attention required.
    Failed,
}

impl BatchStatus {
    /// Whether a batch may move from `self` to `next`.
    ///
    /// Forward-only, with two retry edges: Processing -> Ready (provider
    /// failure under the retry limit) and Failed -> Ready (manual or
    /// automated re-drive).
    pub fn can_transition_to(self, next: BatchStatus) -> bool {
        use BatchStatus::*;
        matches!(
            (self, next),
            (Accumulating, Ready)
                | (Ready, Processing)
                | (Processing, Completed)
                | (Processing, Failed)
                | (Processing, Ready)
                | (Failed, Ready)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, BatchStatus::Completed)
    }
}

impl fmt::Display for BatchStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            BatchStatus::Accumulating => "accumulating",
            BatchStatus::Ready => "ready",
            BatchStatus::Processing => "processing",
            BatchStatus::Completed => "completed",
            BatchStatus::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// A contiguous, speech-bearing session for one user, transcribed as a unit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AudioBatch {
    pub id: BatchId,
    pub user_id: String,
    pub status: BatchStatus,
    /// Ordered by the segments' `uploaded_at`.
    pub segment_ids: Vec<SegmentId>,
    /// `uploaded_at` of the first segment.
    pub created_at: DateTime<Utc>,
    /// `uploaded_at` of the most recent segment.
    pub last_segment_at: DateTime<Utc>,
    /// Set on the Accumulating -> Ready transition.
    pub closed_at: Option<DateTime<Utc>>,
    /// Set each time a dispatcher claims the batch (Ready -> Processing).
    pub dispatched_at: Option<DateTime<Utc>>,
    /// Earliest time the batch may be re-picked after a retryable failure.
    pub not_before: Option<DateTime<Utc>>,
    pub retry_count: u32,
}

impl AudioBatch {
    /// Create a new accumulating batch seeded with one segment.
    pub fn open(user_id: &str, first_segment: &SegmentId, uploaded_at: DateTime<Utc>) -> Self {
        Self {
            id: BatchId::new(),
            user_id: user_id.to_string(),
            status: BatchStatus::Accumulating,
            segment_ids: vec![first_segment.clone()],
            created_at: uploaded_at,
            last_segment_at: uploaded_at,
            closed_at: None,
            dispatched_at: None,
            not_before: None,
            retry_count: 0,
        }
    }

    /// Whether the batch may be dispatched at `now` (READY and past backoff).
    pub fn dispatchable_at(&self, now: DateTime<Utc>) -> bool {
        self.status == BatchStatus::Ready && self.not_before.map_or(true, |nb| nb <= now)
    }
}

/// Output of transcribing a batch's speech-only audio. Written once, never
/// mutated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriptionResult {
    pub batch_id: BatchId,
    pub text: String,
    pub confidence: f32,
    pub detected_language: String,
    pub provider_raw_response: serde_json::Value,
    pub completed_at: DateTime<Utc>,
}

/// One object-storage upload event, as delivered by the notification queue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadNotification {
    pub user_id: String,
    pub storage_bucket: String,
    pub storage_key: String,
    pub uploaded_at: DateTime<Utc>,
}

impl UploadNotification {
    pub fn segment_id(&self) -> SegmentId {
        SegmentId::from_object(&self.storage_bucket, &self.storage_key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn segment_id_is_stable_across_deliveries() {
        let a = SegmentId::from_object("uploads", "u1/segment_001.wav");
        let b = SegmentId::from_object("uploads", "u1/segment_001.wav");
        assert_eq!(a, b);
        assert_eq!(a.as_str(), "uploads/u1/segment_001.wav");
    }

    #[test]
    fn segment_id_differs_per_object() {
        let a = SegmentId::from_object("uploads", "u1/segment_001.wav");
        let b = SegmentId::from_object("uploads", "u1/segment_002.wav");
        assert_ne!(a, b);
    }

    #[test]
    fn batch_ids_are_unique() {
        assert_ne!(BatchId::new(), BatchId::new());
    }

    #[test]
    fn forward_transitions_allowed() {
        use BatchStatus::*;
        assert!(Accumulating.can_transition_to(Ready));
        assert!(Ready.can_transition_to(Processing));
        assert!(Processing.can_transition_to(Completed));
        assert!(Processing.can_transition_to(Failed));
    }

    #[test]
    fn retry_transitions_allowed() {
        use BatchStatus::*;
        assert!(Processing.can_transition_to(Ready));
        assert!(Failed.can_transition_to(Ready));
    }

    #[test]
    fn backward_transitions_rejected() {
        use BatchStatus::*;
        assert!(!Ready.can_transition_to(Accumulating));
        assert!(!Processing.can_transition_to(Accumulating));
        assert!(!Completed.can_transition_to(Ready));
        assert!(!Completed.can_transition_to(Processing));
        assert!(!Accumulating.can_transition_to(Processing));
        assert!(!Accumulating.can_transition_to(Completed));
    }

    #[test]
    fn open_batch_seeds_timestamps_from_segment() {
        let sid = SegmentId::from_object("b", "k");
        let batch = AudioBatch::open("alice", &sid, t0());
        assert_eq!(batch.status, BatchStatus::Accumulating);
        assert_eq!(batch.segment_ids, vec![sid]);
        assert_eq!(batch.created_at, t0());
        assert_eq!(batch.last_segment_at, t0());
        assert_eq!(batch.retry_count, 0);
        assert!(batch.closed_at.is_none());
    }

    #[test]
    fn dispatchable_respects_backoff_gate() {
        let sid = SegmentId::from_object("b", "k");
        let mut batch = AudioBatch::open("alice", &sid, t0());
        batch.status = BatchStatus::Ready;

        assert!(batch.dispatchable_at(t0()));

        batch.not_before = Some(t0() + chrono::Duration::seconds(30));
        assert!(!batch.dispatchable_at(t0()));
        assert!(batch.dispatchable_at(t0() + chrono::Duration::seconds(30)));
    }

    #[test]
    fn speech_ms_sums_intervals() {
        let seg = AudioSegment {
            id: SegmentId::from_object("b", "k"),
            user_id: "alice".into(),
            uploaded_at: t0(),
            storage_bucket: "b".into(),
            storage_key: "k".into(),
            has_speech: Some(true),
            speech_intervals: vec![
                SpeechInterval {
                    start_ms: 100,
                    end_ms: 600,
                },
                SpeechInterval {
                    start_ms: 900,
                    end_ms: 1400,
                },
            ],
            batch_id: None,
        };
        assert_eq!(seg.speech_ms(), 1000);
    }

    #[test]
    fn notification_segment_id_matches_object_derivation() {
        let n = UploadNotification {
            user_id: "alice".into(),
            storage_bucket: "uploads".into(),
            storage_key: "alice/segment_7.wav".into(),
            uploaded_at: t0(),
        };
        assert_eq!(
            n.segment_id(),
            SegmentId::from_object("uploads", "alice/segment_7.wav")
        );
    }
}
