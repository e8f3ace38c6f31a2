use crate::defaults;
use chrono::Duration;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Root configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct Config {
    pub batching: BatchingConfig,
    pub vad: VadSettings,
    pub queue: QueueConfig,
    pub storage: StorageConfig,
    pub transcription: TranscriptionConfig,
    pub dispatch: DispatchConfig,
    pub ingest: IngestConfig,
}

/// Batch lifecycle timing rules
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct BatchingConfig {
    pub max_gap_seconds: u64,
    pub batch_timeout_seconds: u64,
    pub monitor_interval_seconds: u64,
}

/// Voice activity detection parameters
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct VadSettings {
    pub threshold: f32,
    pub min_speech_ms: u64,
    pub min_silence_ms: u64,
    pub padding_ms: u64,
    pub sample_rate: u32,
}

/// Notification queue configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct QueueConfig {
    /// Queue URL (SQS-compatible endpoint). Empty disables the real client.
    pub url: String,
    pub wait_time_seconds: u64,
    pub max_messages: usize,
    pub visibility_timeout_seconds: u64,
}

/// Object storage configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct StorageConfig {
    /// Base URL of an S3-compatible gateway serving `{base_url}/{bucket}/{key}`.
    pub base_url: String,
}

/// Transcription provider configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TranscriptionConfig {
    pub api_key: String,
    pub base_url: String,
    pub model: String,
    pub request_timeout_seconds: u64,
}

/// Dispatcher and retry configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DispatchConfig {
    pub max_retry_count: u32,
    pub processing_grace_period_seconds: u64,
    pub poll_interval_seconds: u64,
    pub retry_backoff_seconds: u64,
    pub workers: usize,
}

/// Ingestion worker configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct IngestConfig {
    pub workers: usize,
}

impl Default for BatchingConfig {
    fn default() -> Self {
        Self {
            max_gap_seconds: defaults::MAX_GAP_SECONDS,
            batch_timeout_seconds: defaults::BATCH_TIMEOUT_SECONDS,
            monitor_interval_seconds: defaults::MONITOR_INTERVAL_SECONDS,
        }
    }
}

impl Default for VadSettings {
    fn default() -> Self {
        Self {
            threshold: defaults::VAD_THRESHOLD,
            min_speech_ms: defaults::MIN_SPEECH_MS,
            min_silence_ms: defaults::MIN_SILENCE_MS,
            padding_ms: defaults::SPEECH_PAD_MS,
            sample_rate: defaults::SAMPLE_RATE,
        }
    }
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            wait_time_seconds: defaults::QUEUE_WAIT_SECONDS,
            max_messages: defaults::QUEUE_MAX_MESSAGES,
            visibility_timeout_seconds: defaults::QUEUE_VISIBILITY_TIMEOUT_SECONDS,
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
        }
    }
}

impl Default for TranscriptionConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            base_url: defaults::DEEPGRAM_BASE_URL.to_string(),
            model: defaults::DEEPGRAM_MODEL.to_string(),
            request_timeout_seconds: defaults::PROVIDER_TIMEOUT_SECONDS,
        }
    }
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            max_retry_count: defaults::MAX_RETRY_COUNT,
            processing_grace_period_seconds: defaults::PROCESSING_GRACE_PERIOD_SECONDS,
            poll_interval_seconds: defaults::DISPATCH_POLL_INTERVAL_SECONDS,
            retry_backoff_seconds: defaults::RETRY_BACKOFF_SECONDS,
            workers: defaults::DISPATCH_WORKERS,
        }
    }
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            workers: defaults::INGEST_WORKERS,
        }
    }
}

impl BatchingConfig {
    pub fn max_gap(&self) -> Duration {
        Duration::seconds(self.max_gap_seconds as i64)
    }

    pub fn batch_timeout(&self) -> Duration {
        Duration::seconds(self.batch_timeout_seconds as i64)
    }
}

impl DispatchConfig {
    pub fn processing_grace_period(&self) -> Duration {
        Duration::seconds(self.processing_grace_period_seconds as i64)
    }

    /// Exponential backoff for the given (already incremented) retry count.
    pub fn backoff_for(&self, retry_count: u32) -> Duration {
        let shift = retry_count.saturating_sub(1).min(8);
        Duration::seconds((self.retry_backoff_seconds as i64) << shift)
    }
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// Returns an error if the file contains invalid TOML.
    /// Missing fields will use default values.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let contents = fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Load configuration from a file or return defaults if file doesn't exist
    ///
    /// Only returns defaults if the file is missing.
    /// Returns errors for invalid TOML.
    pub fn load_or_default(path: &Path) -> anyhow::Result<Self> {
        match Self::load(path) {
            Ok(config) => Ok(config),
            Err(e) => {
                if e.downcast_ref::<std::io::Error>()
                    .map(|io_err| io_err.kind() == std::io::ErrorKind::NotFound)
                    .unwrap_or(false)
                {
                    Ok(Self::default())
                } else {
                    Err(e)
                }
            }
        }
    }

    /// Apply environment variable overrides
    ///
    /// Supported environment variables:
    /// - SCRIBED_QUEUE_URL → queue.url
    /// - SCRIBED_STORAGE_BASE_URL → storage.base_url
    /// - SCRIBED_DEEPGRAM_API_KEY → transcription.api_key
    /// - SCRIBED_MAX_GAP_SECONDS → batching.max_gap_seconds
    /// - SCRIBED_BATCH_TIMEOUT_SECONDS → batching.batch_timeout_seconds
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(url) = std::env::var("SCRIBED_QUEUE_URL") {
            if !url.is_empty() {
                self.queue.url = url;
            }
        }

        if let Ok(base) = std::env::var("SCRIBED_STORAGE_BASE_URL") {
            if !base.is_empty() {
                self.storage.base_url = base;
            }
        }

        if let Ok(key) = std::env::var("SCRIBED_DEEPGRAM_API_KEY") {
            if !key.is_empty() {
                self.transcription.api_key = key;
            }
        }

        if let Ok(gap) = std::env::var("SCRIBED_MAX_GAP_SECONDS") {
            if let Ok(secs) = gap.parse() {
                self.batching.max_gap_seconds = secs;
            }
        }

        if let Ok(timeout) = std::env::var("SCRIBED_BATCH_TIMEOUT_SECONDS") {
            if let Ok(secs) = timeout.parse() {
                self.batching.batch_timeout_seconds = secs;
            }
        }

        self
    }

    /// Get the default configuration file path
    ///
    /// Returns ~/.config/scribed/config.toml on Linux
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("scribed")
            .join("config.toml")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn default_config_matches_constants() {
        let config = Config::default();
        assert_eq!(config.batching.max_gap_seconds, 30);
        assert_eq!(config.batching.batch_timeout_seconds, 120);
        assert_eq!(config.batching.monitor_interval_seconds, 10);
        assert_eq!(config.dispatch.max_retry_count, 3);
        assert_eq!(config.vad.sample_rate, 16000);
    }

    #[test]
    fn load_parses_partial_toml_with_defaults() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(
            file,
            "[batching]\nmax_gap_seconds = 45\n\n[transcription]\nmodel = \"nova-2\"\n"
        )
        .unwrap();

        let config = Config::load(file.path()).unwrap();
        assert_eq!(config.batching.max_gap_seconds, 45);
        // untouched fields fall back to defaults
        assert_eq!(config.batching.batch_timeout_seconds, 120);
        assert_eq!(config.transcription.model, "nova-2");
        assert_eq!(config.transcription.base_url, defaults::DEEPGRAM_BASE_URL);
    }

    #[test]
    fn load_rejects_invalid_toml() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "batching = = broken").unwrap();

        assert!(Config::load(file.path()).is_err());
    }

    #[test]
    fn load_or_default_returns_defaults_for_missing_file() {
        let config = Config::load_or_default(Path::new("/nonexistent/scribed.toml")).unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn backoff_doubles_per_retry() {
        let dispatch = DispatchConfig::default();
        assert_eq!(dispatch.backoff_for(1), Duration::seconds(30));
        assert_eq!(dispatch.backoff_for(2), Duration::seconds(60));
        assert_eq!(dispatch.backoff_for(3), Duration::seconds(120));
    }

    #[test]
    fn backoff_is_capped() {
        let dispatch = DispatchConfig::default();
        assert_eq!(dispatch.backoff_for(100), dispatch.backoff_for(9));
    }

    #[test]
    fn durations_convert_from_seconds() {
        let batching = BatchingConfig::default();
        assert_eq!(batching.max_gap(), Duration::seconds(30));
        assert_eq!(batching.batch_timeout(), Duration::seconds(120));
    }

    #[test]
    fn default_path_ends_with_crate_dir() {
        let path = Config::default_path();
        assert!(path.ends_with("scribed/config.toml"));
    }
}
