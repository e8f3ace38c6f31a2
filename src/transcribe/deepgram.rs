//! Deepgram pre-recorded transcription client.

use crate::config::TranscriptionConfig;
use crate::transcribe::{ProviderError, Transcription, TranscriptionProvider};
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

pub struct DeepgramProvider {
    client: reqwest::Client,
    config: TranscriptionConfig,
}

#[derive(Debug, Deserialize)]
struct DeepgramResponse {
    results: DeepgramResults,
}

#[derive(Debug, Deserialize)]
struct DeepgramResults {
    channels: Vec<DeepgramChannel>,
}

#[derive(Debug, Deserialize)]
struct DeepgramChannel {
    alternatives: Vec<DeepgramAlternative>,
    detected_language: Option<String>,
}

#[derive(Debug, Deserialize)]
struct DeepgramAlternative {
    transcript: String,
    confidence: f32,
}

impl DeepgramProvider {
    pub fn new(config: TranscriptionConfig) -> Result<Self, ProviderError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_seconds))
            .build()
            .map_err(|e| ProviderError::Upstream(format!("failed to build HTTP client: {}", e)))?;
        Ok(Self { client, config })
    }

    /// Pull the first channel's best alternative out of a response body.
    fn parse_response(body: &str) -> Result<Transcription, ProviderError> {
        let raw_response: serde_json::Value = serde_json::from_str(body)
            .map_err(|e| ProviderError::Upstream(format!("invalid response JSON: {}", e)))?;

        let parsed: DeepgramResponse = serde_json::from_value(raw_response.clone())
            .map_err(|e| ProviderError::Upstream(format!("unexpected response shape: {}", e)))?;

        let channel = parsed
            .results
            .channels
            .into_iter()
            .next()
            .ok_or_else(|| ProviderError::Upstream("response has no channels".to_string()))?;
        let detected_language = channel.detected_language.unwrap_or_default();
        let alternative = channel
            .alternatives
            .into_iter()
            .next()
            .ok_or_else(|| ProviderError::Upstream("response has no alternatives".to_string()))?;

        Ok(Transcription {
            text: alternative.transcript,
            confidence: alternative.confidence,
            detected_language,
            raw_response,
        })
    }
}

#[async_trait]
impl TranscriptionProvider for DeepgramProvider {
    async fn transcribe(&self, wav_bytes: &[u8]) -> Result<Transcription, ProviderError> {
        debug!(bytes = wav_bytes.len(), model = %self.config.model, "sending audio for transcription");

        let response = self
            .client
            .post(&self.config.base_url)
            .query(&[
                ("model", self.config.model.as_str()),
                ("detect_language", "true"),
                ("punctuate", "true"),
                ("smart_format", "true"),
            ])
            .header("Authorization", format!("Token {}", self.config.api_key))
            .header("Content-Type", "audio/wav")
            .body(wav_bytes.to_vec())
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ProviderError::Timeout
                } else {
                    ProviderError::Upstream(e.to_string())
                }
            })?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| ProviderError::Upstream(format!("unreadable response body: {}", e)))?;

        match status.as_u16() {
            200..=299 => Self::parse_response(&body),
            429 => Err(ProviderError::RateLimited),
            400 => Err(ProviderError::MalformedAudio(body)),
            _ => Err(ProviderError::Upstream(format!("HTTP {}: {}", status, body))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_first_channel_first_alternative() {
        let body = json!({
            "results": {
                "channels": [{
                    "detected_language": "en",
                    "alternatives": [
                        { "transcript": "hello world", "confidence": 0.98 },
                        { "transcript": "hollow world", "confidence": 0.45 }
                    ]
                }]
            }
        })
        .to_string();

        let t = DeepgramProvider::parse_response(&body).unwrap();
        assert_eq!(t.text, "hello world");
        assert!((t.confidence - 0.98).abs() < f32::EPSILON);
        assert_eq!(t.detected_language, "en");
        assert!(t.raw_response.get("results").is_some());
    }

    #[test]
    fn missing_detected_language_defaults_to_empty() {
        let body = json!({
            "results": {
                "channels": [{
                    "alternatives": [
                        { "transcript": "bonjour", "confidence": 0.9 }
                    ]
                }]
            }
        })
        .to_string();

        let t = DeepgramProvider::parse_response(&body).unwrap();
        assert_eq!(t.detected_language, "");
    }

    #[test]
    fn empty_channels_is_an_error() {
        let body = json!({ "results": { "channels": [] } }).to_string();
        assert!(DeepgramProvider::parse_response(&body).is_err());
    }

    #[test]
    fn invalid_json_is_an_error() {
        assert!(DeepgramProvider::parse_response("not json").is_err());
    }
}
