//! Default configuration constants for scribed.
//!
//! This module provides shared constants used across different configuration types
//! to ensure consistency and eliminate duplication.

/// Default audio sample rate in Hz.
///
/// 16kHz is the standard for speech recognition and provides a good balance
/// between quality and computational efficiency for voice applications.
pub const SAMPLE_RATE: u32 = 16000;

/// Default Voice Activity Detection (VAD) threshold.
///
/// This RMS-based threshold (0.0 to 1.0) determines when audio is considered speech.
/// A value of 0.02 is tuned for typical mobile microphone levels and provides
/// good sensitivity while filtering out background noise.
pub const VAD_THRESHOLD: f32 = 0.02;

/// Minimum speech run in milliseconds for an interval to count as speech.
///
/// Runs shorter than this are treated as pops/clicks and discarded.
pub const MIN_SPEECH_MS: u64 = 250;

/// Minimum silence run in milliseconds before a speech interval is closed.
///
/// Shorter dips stay inside the surrounding interval, so natural micro-pauses
/// don't fragment an utterance.
pub const MIN_SILENCE_MS: u64 = 100;

/// Padding in milliseconds added to both ends of each detected speech interval.
///
/// Captures soft onsets and word endings that sit below the energy threshold.
pub const SPEECH_PAD_MS: u64 = 30;

/// Analysis frame duration in milliseconds for the speech extractor.
pub const VAD_FRAME_MS: u64 = 30;

/// Maximum gap in seconds between consecutive segments of the same batch.
///
/// A longer pause signals a conversation boundary (new topic or location),
/// so the open batch is closed and the next segment starts a fresh one.
pub const MAX_GAP_SECONDS: u64 = 30;

/// Maximum age in seconds of an accumulating batch.
///
/// Bounds end-to-end latency during an unbroken conversation: the batch is
/// closed for transcription even though no gap was observed.
pub const BATCH_TIMEOUT_SECONDS: u64 = 120;

/// Interval in seconds between batch monitor sweeps.
///
/// Silence produces no new segment to trigger closure, so a time-based sweep
/// is required to close batches after the user stops talking.
pub const MONITOR_INTERVAL_SECONDS: u64 = 10;

/// Maximum number of transcription retries before a batch is marked failed.
pub const MAX_RETRY_COUNT: u32 = 3;

/// Grace period in seconds before a PROCESSING batch is considered abandoned.
///
/// A batch stuck in PROCESSING longer than this (crash mid-dispatch) is
/// treated as a failed provider call and returned to the retry path.
pub const PROCESSING_GRACE_PERIOD_SECONDS: u64 = 300;

/// Interval in seconds between dispatcher polls for READY batches.
pub const DISPATCH_POLL_INTERVAL_SECONDS: u64 = 5;

/// Base backoff in seconds between transcription retries (doubles per attempt).
pub const RETRY_BACKOFF_SECONDS: u64 = 30;

/// Long-poll wait in seconds for queue receives.
pub const QUEUE_WAIT_SECONDS: u64 = 20;

/// Maximum messages fetched per queue receive.
pub const QUEUE_MAX_MESSAGES: usize = 10;

/// Seconds a received message stays invisible to other consumers.
pub const QUEUE_VISIBILITY_TIMEOUT_SECONDS: u64 = 300;

/// Receives after which an unacknowledged message is dead-lettered.
pub const QUEUE_MAX_RECEIVES: u32 = 5;

/// Timeout in seconds for a single transcription provider request.
pub const PROVIDER_TIMEOUT_SECONDS: u64 = 300;

/// Default transcription provider endpoint.
pub const DEEPGRAM_BASE_URL: &str = "https://api.deepgram.com/v1/listen";

/// Default transcription model.
pub const DEEPGRAM_MODEL: &str = "nova-3";

/// Default number of ingestion workers.
pub const INGEST_WORKERS: usize = 2;

/// Default number of dispatcher workers.
pub const DISPATCH_WORKERS: usize = 2;
