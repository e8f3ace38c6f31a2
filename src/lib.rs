//! scribed - batch transcription backend for uploaded voice audio.
//!
//! Drains object-storage upload notifications, filters each segment down to
//! detected speech, groups segments into per-user session batches, and
//! dispatches closed batches to a transcription provider exactly once.

#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]
#![warn(clippy::let_underscore_must_use)]

pub mod app;
pub mod audio;
pub mod batch;
pub mod cli;
pub mod clock;
pub mod config;
pub mod defaults;
pub mod dispatch;
pub mod error;
pub mod ingest;
pub mod model;
pub mod queue;
pub mod storage;
pub mod store;
pub mod transcribe;

// Core traits (queue → store → provider)
pub use clock::{Clock, ManualClock, SystemClock};
pub use queue::NotificationQueue;
pub use storage::ObjectStore;
pub use store::BatchStore;
pub use transcribe::TranscriptionProvider;

// Pipeline
pub use batch::{BatchManager, BatchMonitor};
pub use dispatch::Dispatcher;
pub use ingest::IngestWorker;

// Data model
pub use model::{
    AudioBatch, AudioSegment, BatchId, BatchStatus, SegmentId, SpeechInterval,
    TranscriptionResult, UploadNotification,
};

// Error handling
pub use error::{Result, ScribedError};

// Config
pub use config::Config;
