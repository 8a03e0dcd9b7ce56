//! Configuration structures for the receipt pipeline.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Main configuration for the ticket pipeline.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TicketConfig {
    /// OCR configuration.
    pub ocr: OcrConfig,

    /// Image preprocessing configuration.
    pub preprocess: PreprocessConfig,

    /// Structured-extraction fallback configuration.
    pub fallback: FallbackConfig,

    /// Spreadsheet persistence configuration.
    pub sheet: SheetConfig,

    /// Retry policy for every external call.
    pub retry: RetryPolicy,
}

/// OCR engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OcrConfig {
    /// Language hint passed to the engine.
    pub language: String,

    /// Directory holding `*.traineddata`; the library default when unset.
    pub tessdata_dir: Option<String>,

    /// Seconds to wait for one transcription.
    pub timeout_secs: u64,
}

impl Default for OcrConfig {
    fn default() -> Self {
        Self {
            language: "fra".to_string(),
            tessdata_dir: None,
            timeout_secs: 60,
        }
    }
}

/// Image preprocessing configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PreprocessConfig {
    /// Binarize images before OCR.
    pub enabled: bool,

    /// Maximum image dimension (longer side); larger images are scaled down.
    pub max_image_size: u32,
}

impl Default for PreprocessConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_image_size: 3000,
        }
    }
}

/// Language-model fallback configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FallbackConfig {
    /// Start with fallback mode on.
    pub enabled: bool,

    /// Base URL of an OpenAI-compatible API.
    pub base_url: String,

    /// Model name.
    pub model: String,

    /// Environment variable holding the API key.
    pub api_key_env: String,

    /// Sampling temperature.
    pub temperature: f64,

    /// Request timeout in seconds.
    pub timeout_secs: u64,

    /// Transcripts longer than this are truncated before sending.
    pub max_transcript_chars: usize,
}

impl Default for FallbackConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            base_url: "https://api.openai.com/v1".to_string(),
            model: "gpt-3.5-turbo".to_string(),
            api_key_env: "OPENAI_API_KEY".to_string(),
            temperature: 0.0,
            timeout_secs: 60,
            max_transcript_chars: 12_000,
        }
    }
}

/// Spreadsheet persistence configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SheetConfig {
    /// Spreadsheet key. When unset, records go to `ledger_path`.
    pub spreadsheet_id: Option<String>,

    /// Worksheet (tab) name.
    pub worksheet: String,

    /// Base URL of the Sheets API.
    pub base_url: String,

    /// Environment variable holding an OAuth bearer token.
    pub token_env: String,

    /// Request timeout in seconds.
    pub timeout_secs: u64,

    /// Local CSV ledger used when no spreadsheet is configured.
    pub ledger_path: PathBuf,
}

impl Default for SheetConfig {
    fn default() -> Self {
        Self {
            spreadsheet_id: None,
            worksheet: "Sheet1".to_string(),
            base_url: "https://sheets.googleapis.com/v4".to_string(),
            token_env: "GOOGLE_SHEETS_TOKEN".to_string(),
            timeout_secs: 30,
            ledger_path: PathBuf::from("ledger.csv"),
        }
    }
}

/// Bounded retry with exponential delay.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Total attempts including the first one.
    pub max_attempts: u32,

    /// Delay before the first retry in milliseconds.
    pub base_delay_ms: u64,

    /// Multiplier applied to each subsequent delay.
    pub backoff_factor: f64,

    /// Delay cap in milliseconds.
    pub max_delay_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 2,
            base_delay_ms: 500,
            backoff_factor: 2.0,
            max_delay_ms: 5_000,
        }
    }
}

impl RetryPolicy {
    /// A policy that never retries.
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// Delay to wait after failed attempt `attempt` (1-indexed).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }
        let delay_ms =
            self.base_delay_ms as f64 * self.backoff_factor.powi((attempt - 1) as i32);
        Duration::from_millis(delay_ms.min(self.max_delay_ms as f64) as u64)
    }

    /// Whether attempt `attempt` (1-indexed) may be followed by another.
    pub fn should_retry(&self, attempt: u32) -> bool {
        attempt < self.max_attempts.max(1)
    }
}

impl TicketConfig {
    /// Load configuration from a JSON file.
    pub fn from_file(path: &std::path::Path) -> Result<Self, std::io::Error> {
        let content = std::fs::read_to_string(path)?;
        serde_json::from_str(&content).map_err(|e| {
            std::io::Error::new(std::io::ErrorKind::InvalidData, e.to_string())
        })
    }

    /// Save configuration to a JSON file.
    pub fn save(&self, path: &std::path::Path) -> Result<(), std::io::Error> {
        let content = serde_json::to_string_pretty(self).map_err(|e| {
            std::io::Error::new(std::io::ErrorKind::InvalidData, e.to_string())
        })?;
        std::fs::write(path, content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_partial_config_uses_defaults() {
        let config: TicketConfig =
            serde_json::from_str(r#"{"fallback": {"enabled": true}}"#).unwrap();
        assert!(config.fallback.enabled);
        assert_eq!(config.fallback.model, "gpt-3.5-turbo");
        assert_eq!(config.ocr.language, "fra");
        assert_eq!(config.retry.max_attempts, 2);
    }

    #[test]
    fn test_retry_delays_grow_and_cap() {
        let policy = RetryPolicy {
            max_attempts: 5,
            base_delay_ms: 100,
            backoff_factor: 2.0,
            max_delay_ms: 300,
        };
        assert_eq!(policy.delay_for(1), Duration::from_millis(100));
        assert_eq!(policy.delay_for(2), Duration::from_millis(200));
        assert_eq!(policy.delay_for(3), Duration::from_millis(300));
        assert_eq!(policy.delay_for(8), Duration::from_millis(300));
    }

    #[test]
    fn test_default_policy_retries_once() {
        let policy = RetryPolicy::default();
        assert!(policy.should_retry(1));
        assert!(!policy.should_retry(2));
        assert!(!RetryPolicy::none().should_retry(1));
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");

        let mut config = TicketConfig::default();
        config.sheet.spreadsheet_id = Some("abc".to_string());
        config.save(&path).unwrap();

        let loaded = TicketConfig::from_file(&path).unwrap();
        assert_eq!(loaded.sheet.spreadsheet_id.as_deref(), Some("abc"));
    }
}
