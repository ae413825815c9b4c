use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub tmdb: TmdbConfig,

    #[serde(default)]
    pub sync: SyncConfig,

    #[serde(default)]
    pub database: DatabaseConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TmdbConfig {
    /// TMDb v3 API key. `TMDB_API_KEY` in the environment takes precedence.
    #[serde(default)]
    pub api_key: String,

    #[serde(default = "default_language")]
    pub language: String,

    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Prefix joined with each movie's `poster_path`.
    #[serde(default = "default_image_base_url")]
    pub image_base_url: String,

    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Client-side request budget, shared by every endpoint.
    #[serde(default = "default_requests_per_second")]
    pub requests_per_second: u32,
}

impl TmdbConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for TmdbConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            language: default_language(),
            base_url: default_base_url(),
            image_base_url: default_image_base_url(),
            timeout_secs: default_timeout_secs(),
            requests_per_second: default_requests_per_second(),
        }
    }
}

fn default_language() -> String {
    "en-US".to_string()
}

fn default_base_url() -> String {
    "https://api.themoviedb.org/3".to_string()
}

fn default_image_base_url() -> String {
    "https://image.tmdb.org/t/p/w500".to_string()
}

fn default_timeout_secs() -> u64 {
    10
}

fn default_requests_per_second() -> u32 {
    40
}

/// Pacing and sizing of a catalog sync.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SyncConfig {
    /// Entities per remote page; also the refresh-by-count step.
    #[serde(default = "default_page_size")]
    pub page_size: u32,

    #[serde(default = "default_refresh_interval_ms")]
    pub refresh_interval_ms: u64,

    /// Persisted count at which the first full view is revealed.
    #[serde(default = "default_reveal_threshold")]
    pub reveal_threshold: u64,

    #[serde(default = "default_reveal_delay_ms")]
    pub reveal_delay_ms: u64,

    #[serde(default = "default_enhanced_refresh_ms")]
    pub enhanced_refresh_ms: u64,

    #[serde(default = "default_final_refresh_ms")]
    pub final_refresh_ms: u64,

    /// Persisted count at which a bulk load is considered complete.
    #[serde(default = "default_target_count")]
    pub target_count: u64,

    #[serde(default = "default_max_concurrent_details")]
    pub max_concurrent_details: usize,

    #[serde(default = "default_browse_pages")]
    pub browse_pages: u32,

    #[serde(default = "default_search_pages")]
    pub search_pages: u32,

    /// Pages per staggered fetch.
    #[serde(default = "default_batch_pages")]
    pub batch_pages: u32,

    #[serde(default = "default_initial_delay_ms")]
    pub initial_delay_ms: u64,

    #[serde(default = "default_stagger_ms")]
    pub stagger_ms: u64,

    /// Pages fetched online when a local search finds nothing.
    #[serde(default = "default_fallback_search_pages")]
    pub fallback_search_pages: u32,

    #[serde(default = "default_fallback_search_delay_ms")]
    pub fallback_search_delay_ms: u64,

    /// Start a browse load as soon as the genre directory is ready.
    #[serde(default = "default_autoload")]
    pub autoload: bool,
}

impl SyncConfig {
    pub fn refresh_interval(&self) -> Duration {
        Duration::from_millis(self.refresh_interval_ms)
    }

    pub fn reveal_delay(&self) -> Duration {
        Duration::from_millis(self.reveal_delay_ms)
    }

    pub fn enhanced_refresh(&self) -> Duration {
        Duration::from_millis(self.enhanced_refresh_ms)
    }

    pub fn final_refresh(&self) -> Duration {
        Duration::from_millis(self.final_refresh_ms)
    }

    pub fn initial_delay(&self) -> Duration {
        Duration::from_millis(self.initial_delay_ms)
    }

    pub fn stagger(&self) -> Duration {
        Duration::from_millis(self.stagger_ms)
    }

    pub fn fallback_search_delay(&self) -> Duration {
        Duration::from_millis(self.fallback_search_delay_ms)
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            page_size: default_page_size(),
            refresh_interval_ms: default_refresh_interval_ms(),
            reveal_threshold: default_reveal_threshold(),
            reveal_delay_ms: default_reveal_delay_ms(),
            enhanced_refresh_ms: default_enhanced_refresh_ms(),
            final_refresh_ms: default_final_refresh_ms(),
            target_count: default_target_count(),
            max_concurrent_details: default_max_concurrent_details(),
            browse_pages: default_browse_pages(),
            search_pages: default_search_pages(),
            batch_pages: default_batch_pages(),
            initial_delay_ms: default_initial_delay_ms(),
            stagger_ms: default_stagger_ms(),
            fallback_search_pages: default_fallback_search_pages(),
            fallback_search_delay_ms: default_fallback_search_delay_ms(),
            autoload: default_autoload(),
        }
    }
}

fn default_page_size() -> u32 {
    20
}

fn default_refresh_interval_ms() -> u64 {
    1500
}

fn default_reveal_threshold() -> u64 {
    100
}

fn default_reveal_delay_ms() -> u64 {
    2000
}

fn default_enhanced_refresh_ms() -> u64 {
    3000
}

fn default_final_refresh_ms() -> u64 {
    8000
}

fn default_target_count() -> u64 {
    700
}

fn default_max_concurrent_details() -> usize {
    25
}

fn default_browse_pages() -> u32 {
    100
}

fn default_search_pages() -> u32 {
    50
}

fn default_batch_pages() -> u32 {
    3
}

fn default_initial_delay_ms() -> u64 {
    500
}

fn default_stagger_ms() -> u64 {
    150
}

fn default_fallback_search_pages() -> u32 {
    2
}

fn default_fallback_search_delay_ms() -> u64 {
    100
}

fn default_autoload() -> bool {
    true
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: PathBuf,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

fn default_db_path() -> PathBuf {
    PathBuf::from("cinesync.db")
}
