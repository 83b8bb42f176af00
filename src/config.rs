//! Configuration file parser for `newsbrief.toml`.
//!
//! The config file is optional: a missing or empty file yields
//! `Config::default()`, which collects the built-in source list into
//! `public/news-summaries.json`. Unknown top-level keys are accepted but logged
//! as likely typos.
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::feed::SourceConfig;
use crate::types::Language;

// ============================================================================
// Error Types
// ============================================================================

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid TOML in config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Config file too large: {0}")]
    TooLarge(String),

    #[error("Invalid source '{name}': {reason}")]
    InvalidSource { name: String, reason: String },
}

// ============================================================================
// Configuration Structs
// ============================================================================

/// Top-level configuration.
///
/// All fields use `#[serde(default)]` so any subset of keys can be specified.
/// Giving any `[[sources]]` table replaces the whole built-in source list.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Archive JSON written at the end of every run.
    pub archive_path: PathBuf,

    /// Extra copies of the archive (e.g. a frontend's static directory).
    pub mirror_paths: Vec<PathBuf>,

    /// Summary cache JSON.
    pub cache_path: PathBuf,

    /// Maximum number of articles kept in the archive.
    pub archive_cap: usize,

    /// Maximum number of collected articles passed to the merge. 0 = unlimited.
    pub collect_limit: usize,

    /// Age at which cached summaries expire.
    pub cache_ttl_hours: u64,

    /// Pause between consecutive summarizer calls.
    pub summarize_delay_ms: u64,

    /// Feeds fetched at the same time.
    pub max_concurrent_fetches: usize,

    pub summarizer: SummarizerConfig,

    pub sources: Vec<SourceConfig>,
}

/// Ollama connection settings.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct SummarizerConfig {
    /// Base URL of the Ollama server. `OLLAMA_HOST` takes precedence.
    pub host: String,
    pub model: String,
    pub timeout_secs: u64,
}

impl Default for SummarizerConfig {
    fn default() -> Self {
        Self {
            host: "http://localhost:11434".to_string(),
            model: "phi3:mini".to_string(),
            timeout_secs: 120,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            archive_path: PathBuf::from("public/news-summaries.json"),
            mirror_paths: Vec::new(),
            cache_path: PathBuf::from("data/summary-cache.json"),
            archive_cap: 50,
            collect_limit: 50,
            cache_ttl_hours: 24,
            summarize_delay_ms: 2000,
            max_concurrent_fetches: 8,
            summarizer: SummarizerConfig::default(),
            sources: default_sources(),
        }
    }
}

/// Built-in feeds: Korean and English IT news.
fn default_sources() -> Vec<SourceConfig> {
    const FEEDS: &[(&str, &str, &str, Language)] = &[
        ("ZDNet Korea", "https://www.zdnet.co.kr/rss/all.xml", "ZDNet Korea", Language::Ko),
        ("전자신문 IT", "https://www.etnews.com/RSS/Section060101.xml", "전자신문", Language::Ko),
        ("보안뉴스", "https://www.boannews.com/media/news_rss.xml", "보안뉴스", Language::Ko),
        ("IT조선", "https://it.chosun.com/rss/all.xml", "IT조선", Language::Ko),
        ("블로터", "https://www.bloter.net/rss/all.xml", "블로터", Language::Ko),
        ("TechCrunch", "https://techcrunch.com/feed/", "TechCrunch", Language::En),
        ("The Verge", "https://www.theverge.com/rss/index.xml", "The Verge", Language::En),
        ("Ars Technica", "https://arstechnica.com/feed/", "Ars Technica", Language::En),
    ];

    FEEDS
        .iter()
        .map(|(name, url, source, language)| SourceConfig {
            name: name.to_string(),
            url: url.to_string(),
            source: Some(source.to_string()),
            language: *language,
        })
        .collect()
}

const KNOWN_KEYS: &[&str] = &[
    "archive_path",
    "mirror_paths",
    "cache_path",
    "archive_cap",
    "collect_limit",
    "cache_ttl_hours",
    "summarize_delay_ms",
    "max_concurrent_fetches",
    "summarizer",
    "sources",
];

impl Config {
    /// Maximum config file size (1 MB).
    const MAX_FILE_SIZE: u64 = 1_048_576;

    /// Upper bound for `cache_ttl_hours` (100 years).
    const MAX_TTL_HOURS: u64 = 24 * 365 * 100;

    /// Load configuration from a TOML file.
    ///
    /// - Missing file → defaults
    /// - Empty file → defaults
    /// - Invalid TOML → `Err(ConfigError::Parse)` with line number info
    /// - Unknown keys → accepted, logged as warning
    /// - Source URL that is not http(s) → `Err(ConfigError::InvalidSource)`
    ///
    /// `OLLAMA_HOST`, when set, overrides `summarizer.host`.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let config = Self::load_file(path)?;
        let config = config.with_ollama_host(std::env::var("OLLAMA_HOST").ok());
        config.validate()?;
        Ok(config)
    }

    fn load_file(path: &Path) -> Result<Self, ConfigError> {
        // Check size before reading so a huge file cannot exhaust memory.
        match std::fs::metadata(path) {
            Ok(meta) if meta.len() > Self::MAX_FILE_SIZE => {
                return Err(ConfigError::TooLarge(format!(
                    "Config file is {} bytes (max {} bytes)",
                    meta.len(),
                    Self::MAX_FILE_SIZE
                )));
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "No config file found, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(ConfigError::Io(e)),
            Ok(_) => {}
        }

        let content = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                // File deleted between metadata and read
                tracing::debug!(path = %path.display(), "Config file disappeared, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(ConfigError::Io(e)),
        };

        if content.trim().is_empty() {
            tracing::debug!(path = %path.display(), "Config file is empty, using defaults");
            return Ok(Self::default());
        }

        if let Ok(raw) = content.parse::<toml::Table>() {
            for key in raw.keys() {
                if !KNOWN_KEYS.contains(&key.as_str()) {
                    tracing::warn!(key = %key, "Unknown key in config file, ignoring");
                }
            }
        }

        let config: Config = toml::from_str(&content)?;
        tracing::info!(
            path = %path.display(),
            sources = config.sources.len(),
            "Loaded configuration"
        );
        Ok(config)
    }

    /// Applies an `OLLAMA_HOST` value, ignoring blanks.
    pub fn with_ollama_host(mut self, host: Option<String>) -> Self {
        if let Some(host) = host.map(|h| h.trim().to_string()).filter(|h| !h.is_empty()) {
            tracing::debug!(host = %host, "Summarizer host overridden by OLLAMA_HOST");
            self.summarizer.host = host;
        }
        self
    }

    /// Checks that every source has a name and an http(s) URL.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for source in &self.sources {
            let invalid = |reason: String| ConfigError::InvalidSource {
                name: source.name.clone(),
                reason,
            };
            if source.name.trim().is_empty() {
                return Err(invalid("name is empty".to_string()));
            }
            let url = url::Url::parse(&source.url)
                .map_err(|e| invalid(format!("bad url '{}': {e}", source.url)))?;
            if !matches!(url.scheme(), "http" | "https") {
                return Err(invalid(format!("unsupported scheme '{}'", url.scheme())));
            }
        }
        Ok(())
    }

    pub fn cache_ttl(&self) -> chrono::Duration {
        // Clamped so absurd values cannot overflow the duration type.
        let hours = self.cache_ttl_hours.min(Self::MAX_TTL_HOURS) as i64;
        chrono::Duration::hours(hours)
    }

    pub fn summarize_delay(&self) -> Duration {
        Duration::from_millis(self.summarize_delay_ms)
    }

    pub fn summarizer_timeout(&self) -> Duration {
        Duration::from_secs(self.summarizer.timeout_secs)
    }

    /// `collect_limit` as an option; 0 means no limit.
    pub fn collect_limit(&self) -> Option<usize> {
        (self.collect_limit > 0).then_some(self.collect_limit)
    }
}

// ============================================================================
// Tests
// ============================================================================
