//! Transcription provider interface.

pub mod deepgram;

pub use deepgram::DeepgramProvider;

use async_trait::async_trait;
use thiserror::Error;

/// Provider-side transcription output for one batch's speech audio.
#[derive(Debug, Clone)]
pub struct Transcription {
    pub text: String,
    pub confidence: f32,
    pub detected_language: String,
    /// Full provider response, kept verbatim for offline reprocessing.
    pub raw_response: serde_json::Value,
}

/// Failure modes of a transcription call, split by whether a retry can help.
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("provider rate limited the request")]
    RateLimited,
    #[error("provider request timed out")]
    Timeout,
    /// The provider rejected the audio itself. Retrying the same payload
    /// cannot succeed.
    #[error("provider rejected the audio: {0}")]
    MalformedAudio(String),
    #[error("provider error: {0}")]
    Upstream(String),
}

impl ProviderError {
    pub fn is_retryable(&self) -> bool {
        !matches!(self, ProviderError::MalformedAudio(_))
    }
}

/// A speech-to-text backend. Takes WAV bytes, returns a transcription.
#[async_trait]
pub trait TranscriptionProvider: Send + Sync {
    async fn transcribe(&self, wav_bytes: &[u8]) -> Result<Transcription, ProviderError>;
}

pub mod mock {
    //! Scripted provider for exercising dispatch outcomes in unit and
    //! integration tests.

    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::Mutex;

    pub enum Script {
        Succeed(String),
        Fail(ProviderError),
    }

    /// Plays back a fixed sequence of outcomes, then keeps repeating the
    /// last one. Counts calls so tests can assert dispatch-once behavior.
    pub struct MockProvider {
        script: Mutex<Vec<Script>>,
        calls: AtomicUsize,
    }

    impl MockProvider {
        pub fn new(script: Vec<Script>) -> Self {
            Self {
                script: Mutex::new(script),
                calls: AtomicUsize::new(0),
            }
        }

        pub fn succeeding(text: &str) -> Self {
            Self::new(vec![Script::Succeed(text.to_string())])
        }

        pub fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl TranscriptionProvider for MockProvider {
        async fn transcribe(&self, _wav_bytes: &[u8]) -> Result<Transcription, ProviderError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let mut script = self.script.lock().await;
            let outcome = if script.len() > 1 {
                script.remove(0)
            } else {
                match script.first() {
                    Some(Script::Succeed(text)) => Script::Succeed(text.clone()),
                    Some(Script::Fail(e)) => Script::Fail(clone_error(e)),
                    None => Script::Fail(ProviderError::Upstream("empty script".into())),
                }
            };

            match outcome {
                Script::Succeed(text) => Ok(Transcription {
                    text,
                    confidence: 0.97,
                    detected_language: "en".to_string(),
                    raw_response: serde_json::json!({"mock": true}),
                }),
                Script::Fail(e) => Err(e),
            }
        }
    }

    fn clone_error(e: &ProviderError) -> ProviderError {
        match e {
            ProviderError::RateLimited => ProviderError::RateLimited,
            ProviderError::Timeout => ProviderError::Timeout,
            ProviderError::MalformedAudio(m) => ProviderError::MalformedAudio(m.clone()),
            ProviderError::Upstream(m) => ProviderError::Upstream(m.clone()),
        }
    }
}
