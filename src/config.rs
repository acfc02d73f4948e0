//! Configuration file parser for ~/.config/newsdigest/config.toml.
//!
//! The config file is optional: a missing file yields `Config::default()`.
//! Unknown keys are accepted but logged as a warning, since they are usually
//! typos.
use crate::enrich::{
    DisabledScorer, GeminiScorer, ScoringError, ScoringService, API_KEY_ENV, DEFAULT_BASE_URL,
    DEFAULT_MODEL,
};
use crate::model::Score;
use crate::retry::RetryPolicy;
use crate::source::{SourceDescriptor, SourceLimits};
use secrecy::SecretString;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

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

    #[error("Config keys '{0}' and '{1}' set the same value; keep only one")]
    ConflictingKeys(&'static str, &'static str),
}

// ============================================================================
// Configuration Structs
// ============================================================================

/// Scoring service settings under `[scoring]`.
#[derive(Clone, Deserialize)]
#[serde(default)]
pub struct ScoringConfig {
    /// Gemini API key. The GEMINI_API_KEY env var takes precedence.
    pub api_key: Option<String>,
    pub model: String,
    pub base_url: String,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            model: DEFAULT_MODEL.to_string(),
            base_url: DEFAULT_BASE_URL.to_string(),
        }
    }
}

impl std::fmt::Debug for ScoringConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScoringConfig")
            .field("api_key", &self.api_key.as_ref().map(|_| "[REDACTED]"))
            .field("model", &self.model)
            .field("base_url", &self.base_url)
            .finish()
    }
}

/// Top-level application configuration.
///
/// All fields use `#[serde(default)]` so any subset of keys can be specified.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    pub sources: Vec<SourceDescriptor>,

    /// Articles per scoring request.
    pub batch_size: usize,

    /// Pause between scoring requests.
    pub batch_pause_seconds: u64,

    /// Pause between requests to the same origin.
    pub source_pause_seconds: u64,

    /// Articles older than this are not collected.
    #[serde(alias = "recency_cutoff")]
    pub recency_cutoff_hours: u64,

    /// How long a digest is served before it is rebuilt.
    #[serde(alias = "cache_ttl")]
    pub cache_ttl_minutes: u64,

    pub digest_limit: usize,

    /// Minimum relevance (0-100). 0 keeps everything.
    pub min_score: u8,

    pub feed_entry_limit: usize,
    pub aggregator_post_limit: usize,
    pub aggregator_min_popularity: i64,

    /// Per-request HTTP timeout.
    pub request_timeout_seconds: u64,

    /// Upper bound on one source's fetch, retries included.
    pub source_timeout_seconds: u64,

    pub max_concurrent_fetches: usize,

    /// Rebuild interval for `--watch`.
    pub refresh_interval_minutes: u64,

    pub scoring: ScoringConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            sources: default_sources(),
            batch_size: 5,
            batch_pause_seconds: 2,
            source_pause_seconds: 1,
            recency_cutoff_hours: 24,
            cache_ttl_minutes: 30,
            digest_limit: 15,
            min_score: 60,
            feed_entry_limit: 10,
            aggregator_post_limit: 5,
            aggregator_min_popularity: 50,
            request_timeout_seconds: 10,
            source_timeout_seconds: 45,
            max_concurrent_fetches: 10,
            refresh_interval_minutes: 30,
            scoring: ScoringConfig::default(),
        }
    }
}

fn default_sources() -> Vec<SourceDescriptor> {
    const FEEDS: [(&str, &str); 10] = [
        ("O'Reilly Radar", "https://feeds.feedburner.com/oreilly/radar"),
        ("VentureBeat", "https://venturebeat.com/feed/"),
        ("TechCrunch", "https://techcrunch.com/feed/"),
        ("Wired", "https://www.wired.com/feed/rss"),
        ("Ars Technica", "https://feeds.arstechnica.com/arstechnica/index"),
        ("The Verge", "https://www.theverge.com/rss/index.xml"),
        ("CNN", "https://rss.cnn.com/rss/edition.rss"),
        ("BBC News", "https://feeds.bbci.co.uk/news/rss.xml"),
        ("Reuters", "https://feeds.reuters.com/reuters/topNews"),
        (
            "NY Times Tech",
            "https://rss.nytimes.com/services/xml/rss/nyt/Technology.xml",
        ),
    ];
    const COMMUNITIES: [&str; 5] = [
        "artificial",
        "MachineLearning",
        "technology",
        "programming",
        "startups",
    ];

    FEEDS
        .iter()
        .map(|(name, url)| SourceDescriptor::feed(*name, *url))
        .chain(COMMUNITIES.iter().map(|c| SourceDescriptor::aggregator(*c)))
        .collect()
}

/// Cutoffs beyond a century are treated as a century.
const MAX_CUTOFF_HOURS: u64 = 24 * 365 * 100;

/// Alias pairs; a file may set at most one key of each.
const ALIASED_KEYS: [(&str, &str); 2] = [
    ("recency_cutoff_hours", "recency_cutoff"),
    ("cache_ttl_minutes", "cache_ttl"),
];

const KNOWN_KEYS: [&str; 18] = [
    "sources",
    "batch_size",
    "batch_pause_seconds",
    "source_pause_seconds",
    "recency_cutoff_hours",
    "recency_cutoff",
    "cache_ttl_minutes",
    "cache_ttl",
    "digest_limit",
    "min_score",
    "feed_entry_limit",
    "aggregator_post_limit",
    "aggregator_min_popularity",
    "request_timeout_seconds",
    "source_timeout_seconds",
    "max_concurrent_fetches",
    "refresh_interval_minutes",
    "scoring",
];

impl Config {
    /// Maximum config file size (1 MB).
    const MAX_FILE_SIZE: u64 = 1_048_576;

    /// `~/.config/newsdigest/config.toml`, if a home directory is known.
    pub fn default_path() -> Option<PathBuf> {
        std::env::var_os("HOME").map(|home| {
            PathBuf::from(home)
                .join(".config")
                .join("newsdigest")
                .join("config.toml")
        })
    }

    /// Load configuration from a TOML file.
    ///
    /// - Missing file → `Ok(Config::default())`
    /// - Empty file → `Ok(Config::default())`
    /// - Invalid TOML → `Err(ConfigError::Parse)` with line number info
    /// - Unknown keys → accepted, logged as warning
    ///
    /// Zero sizes are raised to 1.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
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
                tracing::debug!(path = %path.display(), "Config file disappeared, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(ConfigError::Io(e)),
        };

        if content.trim().is_empty() {
            tracing::debug!(path = %path.display(), "Config file is empty, using defaults");
            return Ok(Self::default());
        }

        let config = Self::from_toml(&content)?;
        tracing::info!(
            path = %path.display(),
            sources = config.sources.len(),
            "Loaded configuration"
        );
        Ok(config)
    }

    /// Parses TOML text, warning about unknown keys and clamping sizes.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        if let Ok(raw) = content.parse::<toml::Table>() {
            for key in raw.keys() {
                if !KNOWN_KEYS.contains(&key.as_str()) {
                    tracing::warn!(key = %key, "Unknown key in config file, ignoring");
                }
            }
            if let Some((key, alias)) = ALIASED_KEYS
                .into_iter()
                .find(|(key, alias)| raw.contains_key(*key) && raw.contains_key(*alias))
            {
                return Err(ConfigError::ConflictingKeys(key, alias));
            }
        }

        let config: Config = toml::from_str(content)?;
        Ok(config.validated())
    }

    fn validated(mut self) -> Self {
        self.batch_size = self.batch_size.max(1);
        self.digest_limit = self.digest_limit.max(1);
        self.feed_entry_limit = self.feed_entry_limit.max(1);
        self.aggregator_post_limit = self.aggregator_post_limit.max(1);
        self.max_concurrent_fetches = self.max_concurrent_fetches.max(1);
        self.request_timeout_seconds = self.request_timeout_seconds.max(1);
        self.source_timeout_seconds = self.source_timeout_seconds.max(1);
        self.min_score = self.min_score.min(Score::MAX.value());
        self
    }

    pub fn batch_pause(&self) -> Duration {
        Duration::from_secs(self.batch_pause_seconds)
    }

    pub fn source_pause(&self) -> Duration {
        Duration::from_secs(self.source_pause_seconds)
    }

    pub fn recency_cutoff(&self) -> chrono::Duration {
        let hours = self.recency_cutoff_hours.min(MAX_CUTOFF_HOURS);
        chrono::Duration::hours(hours as i64)
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_minutes.saturating_mul(60))
    }

    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.refresh_interval_minutes.saturating_mul(60))
    }

    pub fn source_timeout(&self) -> Duration {
        Duration::from_secs(self.source_timeout_seconds)
    }

    /// `None` when `min_score` is 0.
    pub fn min_score(&self) -> Option<Score> {
        (self.min_score > 0).then(|| Score::new(i64::from(self.min_score)))
    }

    pub fn source_limits(&self) -> SourceLimits {
        SourceLimits {
            feed_entry_limit: self.feed_entry_limit,
            aggregator_post_limit: self.aggregator_post_limit,
            aggregator_min_popularity: self.aggregator_min_popularity,
            request_timeout: Duration::from_secs(self.request_timeout_seconds),
            retry: RetryPolicy::default(),
            ..SourceLimits::default()
        }
    }

    /// API key from `GEMINI_API_KEY`, else from the config file.
    pub fn resolve_api_key(&self) -> Option<SecretString> {
        std::env::var(API_KEY_ENV)
            .ok()
            .or_else(|| self.scoring.api_key.clone())
            .map(|k| k.trim().to_string())
            .filter(|k| !k.is_empty())
            .map(SecretString::from)
    }

    /// A Gemini scorer when a key is available, otherwise a disabled one.
    pub fn build_scorer(
        &self,
        client: reqwest::Client,
    ) -> Result<Arc<dyn ScoringService>, ScoringError> {
        match self.resolve_api_key() {
            Some(key) => {
                let scorer = GeminiScorer::new(
                    client,
                    key,
                    self.scoring.model.clone(),
                    self.scoring.base_url.clone(),
                )?;
                Ok(Arc::new(scorer))
            }
            None => {
                tracing::warn!(
                    env = API_KEY_ENV,
                    "No scoring API key configured, articles get fallback scores"
                );
                Ok(Arc::new(DisabledScorer))
            }
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
