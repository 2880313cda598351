//! Configuration settings for Quicktube.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Root configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
#[derive(Default)]
pub struct Settings {
    pub general: GeneralSettings,
    pub youtube: YoutubeSettings,
    pub chunking: ChunkingSettings,
    pub summarization: SummarizationSettings,
    pub retry: RetrySettings,
    pub timeouts: TimeoutSettings,
    pub store: StoreSettings,
    pub prompts: PromptSettings,
}

/// General application settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralSettings {
    /// Directory for storing application data.
    pub data_dir: String,
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,
}

impl Default for GeneralSettings {
    fn default() -> Self {
        Self {
            data_dir: "~/.quicktube".to_string(),
            log_level: "warn".to_string(),
        }
    }
}

/// YouTube caption acquisition settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct YoutubeSettings {
    /// yt-dlp executable (name on PATH or absolute path).
    pub ytdlp_path: String,
    /// Caption languages in order of preference.
    pub languages: Vec<String>,
    /// Optional cookies file handed to yt-dlp.
    pub cookies_path: Option<String>,
}

impl Default for YoutubeSettings {
    fn default() -> Self {
        Self {
            ytdlp_path: "yt-dlp".to_string(),
            languages: vec!["fr".to_string(), "en".to_string()],
            cookies_path: None,
        }
    }
}

/// Transcript chunking settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkingSettings {
    /// Maximum characters per chunk sent to a single summarization call.
    pub max_chunk_chars: usize,
}

impl Default for ChunkingSettings {
    fn default() -> Self {
        Self {
            max_chunk_chars: 12_000,
        }
    }
}

/// Layout of the generated summary.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SummaryStyle {
    /// Headed sections: overview, key points, main ideas, conclusion.
    #[default]
    Structured,
    /// Five to seven bullet points.
    Bullets,
    /// A single flowing paragraph.
    Paragraph,
}

impl std::str::FromStr for SummaryStyle {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "structured" => Ok(SummaryStyle::Structured),
            "bullets" => Ok(SummaryStyle::Bullets),
            "paragraph" => Ok(SummaryStyle::Paragraph),
            _ => Err(format!("Unknown summary style: {}", s)),
        }
    }
}

impl std::fmt::Display for SummaryStyle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SummaryStyle::Structured => write!(f, "structured"),
            SummaryStyle::Bullets => write!(f, "bullets"),
            SummaryStyle::Paragraph => write!(f, "paragraph"),
        }
    }
}

/// LLM summarization settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SummarizationSettings {
    /// Chat model used for chunk and merge summaries.
    pub model: String,
    /// Summary layout.
    pub style: SummaryStyle,
    /// Language the summary is written in.
    pub output_language: String,
    /// Sampling temperature.
    pub temperature: f32,
    /// Upper bound on generated tokens per call.
    pub max_tokens: u32,
    /// Maximum concurrent summarization calls per run.
    pub max_concurrent: usize,
    /// Largest share of chunks (0.0-1.0) allowed to fail before the run fails.
    pub failure_tolerance: f64,
}

impl Default for SummarizationSettings {
    fn default() -> Self {
        Self {
            model: "gpt-4o-mini".to_string(),
            style: SummaryStyle::Structured,
            output_language: "French".to_string(),
            temperature: 0.7,
            max_tokens: 1000,
            max_concurrent: 3,
            failure_tolerance: 0.5,
        }
    }
}

/// Retry policy for transient upstream failures.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrySettings {
    /// Total attempts per call, including the first one.
    pub max_attempts: u32,
    /// Delay before the first retry; doubled on every further retry.
    pub base_delay_ms: u64,
    /// Cap on a single backoff delay.
    pub max_delay_ms: u64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 500,
            max_delay_ms: 16_000,
        }
    }
}

/// Per-call and per-run time limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeoutSettings {
    /// Limit for one caption/metadata fetch.
    pub acquisition_secs: u64,
    /// Limit for one summarization attempt.
    pub summarize_secs: u64,
    /// Limit for one store read or write.
    pub store_secs: u64,
    /// Limit for a whole run, retries included.
    pub run_secs: u64,
}

impl Default for TimeoutSettings {
    fn default() -> Self {
        Self {
            acquisition_secs: 60,
            summarize_secs: 120,
            store_secs: 5,
            run_secs: 900,
        }
    }
}

impl TimeoutSettings {
    pub fn acquisition(&self) -> Duration {
        Duration::from_secs(self.acquisition_secs)
    }

    pub fn summarize(&self) -> Duration {
        Duration::from_secs(self.summarize_secs)
    }

    pub fn store(&self) -> Duration {
        Duration::from_secs(self.store_secs)
    }

    pub fn run(&self) -> Duration {
        Duration::from_secs(self.run_secs)
    }
}

/// Result store backend.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StoreProvider {
    /// SQLite database on disk (default).
    #[default]
    Sqlite,
    /// Process-local map, lost on exit.
    Memory,
}

/// Result store settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreSettings {
    /// Store backend.
    pub provider: StoreProvider,
    /// Path to the SQLite database (for the sqlite provider).
    pub sqlite_path: String,
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self {
            provider: StoreProvider::Sqlite,
            sqlite_path: "~/.quicktube/summaries.db".to_string(),
        }
    }
}

/// Prompt customization settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
#[derive(Default)]
pub struct PromptSettings {
    /// Directory for custom prompts (overrides defaults).
    pub custom_dir: Option<String>,
    /// Custom variables available in all prompts as {{variable_name}}.
    pub variables: std::collections::HashMap<String, String>,
}

impl Settings {
    /// Load settings from the default configuration file.
    pub fn load() -> crate::error::Result<Self> {
        Self::load_from(None)
    }

    /// Load settings from a specific path, or default location if None.
    pub fn load_from(path: Option<&PathBuf>) -> crate::error::Result<Self> {
        let config_path = match path {
            Some(p) => p.clone(),
            None => Self::default_config_path(),
        };

        if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)?;
            let settings: Settings = toml::from_str(&content)?;
            settings.validate()?;
            Ok(settings)
        } else {
            Ok(Settings::default())
        }
    }

    /// Reject values the pipeline cannot run with.
    pub fn validate(&self) -> crate::error::Result<()> {
        use crate::error::QuicktubeError;

        if self.chunking.max_chunk_chars == 0 {
            return Err(QuicktubeError::Config(
                "chunking.max_chunk_chars must be greater than zero".to_string(),
            ));
        }
        if self.summarization.max_concurrent == 0 {
            return Err(QuicktubeError::Config(
                "summarization.max_concurrent must be greater than zero".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.summarization.failure_tolerance) {
            return Err(QuicktubeError::Config(format!(
                "summarization.failure_tolerance must be between 0.0 and 1.0, got {}",
                self.summarization.failure_tolerance
            )));
        }
        if self.retry.max_attempts == 0 {
            return Err(QuicktubeError::Config(
                "retry.max_attempts must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Save settings to a specific path.
    pub fn save_to(&self, path: &PathBuf) -> crate::error::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)
            .map_err(|e| crate::error::QuicktubeError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Get the default configuration file path.
    pub fn default_config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("quicktube")
            .join("config.toml")
    }

    /// Expand shell variables in paths (e.g., ~).
    pub fn expand_path(path: &str) -> PathBuf {
        PathBuf::from(shellexpand::tilde(path).to_string())
    }

    /// Get the expanded data directory path.
    pub fn data_dir(&self) -> PathBuf {
        Self::expand_path(&self.general.data_dir)
    }

    /// Get the expanded SQLite database path.
    pub fn sqlite_path(&self) -> PathBuf {
        Self::expand_path(&self.store.sqlite_path)
    }
}
