//! Application configuration structures.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};

/// Root application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// LLM relevance classification settings
    #[serde(default)]
    pub classifier: ClassifierConfig,

    /// Keyword search pagination and retry
    #[serde(default)]
    pub search: SearchConfig,

    /// Detail enrichment loop settings
    #[serde(default)]
    pub enrichment: EnrichmentConfig,

    /// Multi-attraction batch runs
    #[serde(default)]
    pub batch: BatchConfig,

    /// Platform HTTP transport
    #[serde(default)]
    pub platform: PlatformConfig,

    /// Output locations
    #[serde(default)]
    pub paths: PathsConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }

    /// Load configuration or return default if loading fails.
    pub fn load_or_default(path: impl AsRef<Path>) -> Self {
        Self::load(&path).unwrap_or_else(|e| {
            log::warn!(
                "Config load failed from {:?}: {}. Using defaults.",
                path.as_ref(),
                e
            );
            Self::default()
        })
    }

    /// Validate configuration values for basic sanity.
    pub fn validate(&self) -> Result<()> {
        if self.classifier.base_url.trim().is_empty() {
            return Err(AppError::validation("classifier.base_url is empty"));
        }
        url::Url::parse(&self.classifier.base_url)?;
        if !(0.0..=100.0).contains(&self.classifier.threshold) {
            return Err(AppError::validation(
                "classifier.threshold must be within 0..=100",
            ));
        }
        if self.classifier.batch_size == 0 {
            return Err(AppError::validation("classifier.batch_size must be > 0"));
        }
        if self.classifier.max_concurrent == 0 {
            return Err(AppError::validation(
                "classifier.max_concurrent must be > 0",
            ));
        }
        if self.search.max_pages == 0 {
            return Err(AppError::validation("search.max_pages must be > 0"));
        }
        if self.enrichment.batch_size == 0 {
            return Err(AppError::validation("enrichment.batch_size must be > 0"));
        }
        if self.enrichment.stale_limit == 0 {
            return Err(AppError::validation("enrichment.stale_limit must be > 0"));
        }
        if self.platform.user_agent.trim().is_empty() {
            return Err(AppError::validation("platform.user_agent is empty"));
        }
        if self.platform.timeout_secs == 0 {
            return Err(AppError::validation("platform.timeout_secs must be > 0"));
        }
        url::Url::parse(&self.platform.search_url)?;
        url::Url::parse(&self.platform.explore_url)?;
        if let Some(proxy) = &self.platform.proxy {
            url::Url::parse(proxy)?;
        }
        Ok(())
    }
}

/// Classification service and scheduling settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassifierConfig {
    /// OpenAI-compatible API root
    #[serde(default = "defaults::base_url")]
    pub base_url: String,

    /// Environment variable holding the API key
    #[serde(default = "defaults::api_key_env")]
    pub api_key_env: String,

    /// Environment variable holding the model / endpoint id
    #[serde(default = "defaults::model_env")]
    pub model_env: String,

    /// Request timeout in seconds
    #[serde(default = "defaults::classifier_timeout")]
    pub timeout_secs: u64,

    /// Attempts per batch
    #[serde(default = "defaults::max_retries")]
    pub max_retries: u32,

    /// Fixed delay between attempts in seconds
    #[serde(default = "defaults::retry_delay_secs")]
    pub retry_delay_secs: u64,

    /// Score at or above which a note is relevant
    #[serde(default = "defaults::threshold")]
    pub threshold: f64,

    /// Texts per classification request
    #[serde(default = "defaults::classifier_batch_size")]
    pub batch_size: usize,

    /// Maximum classification requests in flight
    #[serde(default = "defaults::max_concurrent")]
    pub max_concurrent: usize,
}

impl ClassifierConfig {
    pub fn retry_delay(&self) -> Duration {
        Duration::from_secs(self.retry_delay_secs)
    }
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            base_url: defaults::base_url(),
            api_key_env: defaults::api_key_env(),
            model_env: defaults::model_env(),
            timeout_secs: defaults::classifier_timeout(),
            max_retries: defaults::max_retries(),
            retry_delay_secs: defaults::retry_delay_secs(),
            threshold: defaults::threshold(),
            batch_size: defaults::classifier_batch_size(),
            max_concurrent: defaults::max_concurrent(),
        }
    }
}

/// Keyword search settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    /// Page ceiling per keyword
    #[serde(default = "defaults::max_pages")]
    pub max_pages: u32,

    #[serde(default = "defaults::page_size")]
    pub page_size: u32,

    #[serde(default = "defaults::sort")]
    pub sort: String,

    /// Attempts per page
    #[serde(default = "defaults::max_retries")]
    pub max_retries: u32,

    /// Base backoff in milliseconds, doubled after each failed attempt
    #[serde(default = "defaults::search_retry_delay")]
    pub retry_delay_ms: u64,
}

impl SearchConfig {
    /// Backoff before retry number `attempt` (1-based).
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 1u64 << attempt.saturating_sub(1).min(16);
        Duration::from_millis(self.retry_delay_ms.saturating_mul(factor))
    }
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            max_pages: defaults::max_pages(),
            page_size: defaults::page_size(),
            sort: defaults::sort(),
            max_retries: defaults::max_retries(),
            retry_delay_ms: defaults::search_retry_delay(),
        }
    }
}

/// Detail enrichment settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnrichmentConfig {
    /// Records per persisted increment
    #[serde(default = "defaults::enrichment_batch_size")]
    pub batch_size: usize,

    /// Delay between successive notes in milliseconds
    #[serde(default = "defaults::request_delay")]
    pub request_delay_ms: u64,

    /// Notes published before this instant count as stale
    #[serde(default = "defaults::stale_cutoff")]
    pub stale_cutoff: DateTime<Utc>,

    /// Consecutive stale notes that stop enrichment
    #[serde(default = "defaults::stale_limit")]
    pub stale_limit: usize,
}

impl EnrichmentConfig {
    pub fn request_delay(&self) -> Duration {
        Duration::from_millis(self.request_delay_ms)
    }

    pub fn cutoff_millis(&self) -> i64 {
        self.stale_cutoff.timestamp_millis()
    }
}

impl Default for EnrichmentConfig {
    fn default() -> Self {
        Self {
            batch_size: defaults::enrichment_batch_size(),
            request_delay_ms: defaults::request_delay(),
            stale_cutoff: defaults::stale_cutoff(),
            stale_limit: defaults::stale_limit(),
        }
    }
}

/// Batch runner settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchConfig {
    /// Pause between attractions in seconds
    #[serde(default = "defaults::item_delay")]
    pub item_delay_secs: u64,
}

impl BatchConfig {
    pub fn item_delay(&self) -> Duration {
        Duration::from_secs(self.item_delay_secs)
    }
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            item_delay_secs: defaults::item_delay(),
        }
    }
}

/// Platform transport settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlatformConfig {
    #[serde(default = "defaults::user_agent")]
    pub user_agent: String,

    #[serde(default = "defaults::timeout")]
    pub timeout_secs: u64,

    /// Search API endpoint
    #[serde(default = "defaults::search_url")]
    pub search_url: String,

    /// Note page prefix; the note id is appended
    #[serde(default = "defaults::explore_url")]
    pub explore_url: String,

    /// Optional HTTP proxy for detail fetches
    #[serde(default)]
    pub proxy: Option<String>,

    /// Extra headers added to every platform request (e.g. signatures from an external signer)
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
}

impl Default for PlatformConfig {
    fn default() -> Self {
        Self {
            user_agent: defaults::user_agent(),
            timeout_secs: defaults::timeout(),
            search_url: defaults::search_url(),
            explore_url: defaults::explore_url(),
            proxy: None,
            headers: BTreeMap::new(),
        }
    }
}

/// Output directories.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathsConfig {
    /// Raw, classified and detail datasets
    #[serde(default = "defaults::data_dir")]
    pub data_dir: PathBuf,

    /// Batch run summaries
    #[serde(default = "defaults::results_dir")]
    pub results_dir: PathBuf,

    /// Raw payloads of malformed responses
    #[serde(default = "defaults::error_dir")]
    pub error_dir: PathBuf,

    #[serde(default = "defaults::log_dir")]
    pub log_dir: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            data_dir: defaults::data_dir(),
            results_dir: defaults::results_dir(),
            error_dir: defaults::error_dir(),
            log_dir: defaults::log_dir(),
        }
    }
}

/// Logging settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "defaults::log_level")]
    pub level: String,

    /// Also write a log file under `paths.log_dir`
    #[serde(default = "defaults::log_file")]
    pub file: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: defaults::log_level(),
            file: defaults::log_file(),
        }
    }
}

mod defaults {
    use std::path::PathBuf;

    use chrono::{DateTime, TimeZone, Utc};

    // Classifier defaults
    pub fn base_url() -> String {
        "https://ark.cn-beijing.volces.com/api/v3/".into()
    }
    pub fn api_key_env() -> String {
        "ARK_API_KEY".into()
    }
    pub fn model_env() -> String {
        "ARK_ENDPOINT_ID".into()
    }
    pub fn classifier_timeout() -> u64 {
        120
    }
    pub fn max_retries() -> u32 {
        3
    }
    pub fn retry_delay_secs() -> u64 {
        5
    }
    pub fn threshold() -> f64 {
        25.0
    }
    pub fn classifier_batch_size() -> usize {
        10
    }
    pub fn max_concurrent() -> usize {
        28
    }

    // Search defaults
    pub fn max_pages() -> u32 {
        11
    }
    pub fn page_size() -> u32 {
        20
    }
    pub fn sort() -> String {
        "time_descending".into()
    }
    pub fn search_retry_delay() -> u64 {
        2000
    }

    // Enrichment defaults
    pub fn enrichment_batch_size() -> usize {
        5
    }
    pub fn request_delay() -> u64 {
        3000
    }
    pub fn stale_cutoff() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0)
            .single()
            .unwrap_or_default()
    }
    pub fn stale_limit() -> usize {
        2
    }

    // Batch defaults
    pub fn item_delay() -> u64 {
        10
    }

    // Platform defaults
    pub fn user_agent() -> String {
        "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0 Safari/537.36".into()
    }
    pub fn timeout() -> u64 {
        30
    }
    pub fn search_url() -> String {
        "https://edith.xiaohongshu.com/api/sns/web/v1/search/notes".into()
    }
    pub fn explore_url() -> String {
        "https://www.xiaohongshu.com/explore/".into()
    }

    // Path defaults
    pub fn data_dir() -> PathBuf {
        PathBuf::from("processed/rednote")
    }
    pub fn results_dir() -> PathBuf {
        PathBuf::from("results/rednote")
    }
    pub fn error_dir() -> PathBuf {
        PathBuf::from("error")
    }
    pub fn log_dir() -> PathBuf {
        PathBuf::from("logs")
    }

    // Logging defaults
    pub fn log_level() -> String {
        "info".into()
    }
    pub fn log_file() -> bool {
        true
    }
}
