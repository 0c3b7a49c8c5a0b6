//! Configuration system for tagdex.
//!
//! tagdex uses TOML configuration files named `.tagdex.toml`. Configuration is resolved by
//! walking up the directory tree from the current working directory, collecting any
//! `.tagdex.toml` files found, then loading `~/.tagdex.toml` as the global config with
//! lowest precedence. Every setting has a default, so running without any file works.

#![warn(missing_docs)]

mod discovery;
mod error;
mod merge;
mod parse;
mod resolve;
mod templates;
#[cfg(test)]
mod test_support;
mod validate;

use std::{
    path::{Path, PathBuf},
    time::Duration,
};

pub use discovery::{CONFIG_FILENAME, discover_config_files, global_config_path};
pub use error::ConfigError;
pub use merge::{ParsedConfig, merge_configs};
pub use parse::{RawConfig, parse_config_file, parse_config_str};
pub use resolve::resolve_data_dir;
use serde::{Deserialize, Serialize};
pub use templates::config_template;
pub use validate::ConfigWarning;
use validate::validate_config;

/// Top-level merged configuration for tagdex.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Config {
    /// Upstream catalog access.
    pub upstream: UpstreamSettings,
    /// Sync engine behavior.
    pub sync: SyncSettings,
    /// Search request limits.
    pub search: SearchSettings,
    /// Tag resolution caches.
    pub cache: CacheSettings,
    /// On-disk locations.
    pub storage: StorageSettings,
    /// Public asset URLs.
    pub assets: AssetSettings,
    /// Directory containing the most specific config file.
    #[serde(skip)]
    pub config_root: Option<PathBuf>,
}

impl Config {
    /// Loads configuration by discovering and merging all relevant `.tagdex.toml` files.
    ///
    /// Returns `Ok(Config::default())` if no configuration files are found.
    pub fn load(cwd: &Path) -> Result<Self, ConfigError> {
        let config_files = discover_config_files(cwd);
        Self::load_from_files(&config_files)
    }

    /// Loads configuration from a specific list of config file paths.
    ///
    /// Files should be provided in precedence order: highest precedence first.
    pub fn load_from_files(files: &[PathBuf]) -> Result<Self, ConfigError> {
        if files.is_empty() {
            return Ok(Self::default());
        }

        let parsed: Vec<ParsedConfig> = files
            .iter()
            .map(|path| {
                let config = parse_config_file(path)?;
                Ok(ParsedConfig {
                    path: path.clone(),
                    config,
                })
            })
            .collect::<Result<Vec<_>, ConfigError>>()?;

        merge_configs(&parsed)
    }

    /// Validates the configuration and returns any warnings.
    pub fn validate(&self) -> Vec<ConfigWarning> {
        validate_config(self)
    }

    /// Serializes the effective settings to TOML format.
    pub fn settings_to_toml(&self) -> String {
        toml::to_string_pretty(self).unwrap_or_default()
    }
}

/// Upstream catalog access.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct UpstreamSettings {
    /// Catalog API base URL.
    pub base_url: String,
    /// Base URL of the daily database exports.
    pub export_base_url: String,
    /// User agent sent with every request.
    pub user_agent: String,
    /// Minimum gap between requests in milliseconds.
    pub request_interval_ms: u64,
    /// Extra delay per request already queued, in milliseconds.
    pub queue_backoff_ms: u64,
    /// Cap on the queue-depth delay, in milliseconds.
    pub max_queue_backoff_ms: u64,
    /// Per-request timeout in seconds.
    pub timeout_secs: u64,
}

impl Default for UpstreamSettings {
    fn default() -> Self {
        Self {
            base_url: "https://e621.net".into(),
            export_base_url: "https://e621.net/db_export".into(),
            user_agent: concat!("tagdex/", env!("CARGO_PKG_VERSION")).into(),
            request_interval_ms: 1000,
            queue_backoff_ms: 250,
            max_queue_backoff_ms: 10_000,
            timeout_secs: 30,
        }
    }
}

impl UpstreamSettings {
    /// Minimum gap between requests.
    pub fn request_interval(&self) -> Duration {
        Duration::from_millis(self.request_interval_ms)
    }

    /// Extra delay per queued request.
    pub fn queue_backoff(&self) -> Duration {
        Duration::from_millis(self.queue_backoff_ms)
    }

    /// Cap on the queue-depth delay.
    pub fn max_queue_backoff(&self) -> Duration {
        Duration::from_millis(self.max_queue_backoff_ms)
    }

    /// Per-request timeout.
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Sync engine behavior.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SyncSettings {
    /// Pause between successful passes in seconds.
    pub interval_secs: u64,
    /// Pause after a failed pass in seconds.
    pub retry_backoff_secs: u64,
    /// Records per upstream page.
    pub page_size: usize,
    /// Maximum pages walked while applying updates.
    pub max_update_pages: usize,
    /// Mutations per write batch.
    pub batch_size: usize,
    /// Rows per export chunk during full reconciliation.
    pub export_batch_size: usize,
    /// Concurrent record transforms.
    pub concurrency: usize,
    /// Aliases or implications per upstream page.
    pub alias_page_size: usize,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            interval_secs: 60,
            retry_backoff_secs: 60,
            page_size: 320,
            max_update_pages: 50,
            batch_size: 500,
            export_batch_size: 10_000,
            concurrency: 8,
            alias_page_size: 100,
        }
    }
}

impl SyncSettings {
    /// Pause between successful passes.
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    /// Pause after a failed pass.
    pub fn retry_backoff(&self) -> Duration {
        Duration::from_secs(self.retry_backoff_secs)
    }
}

/// Search request limits.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SearchSettings {
    /// Page size when the request gives none.
    pub default_limit: usize,
    /// Largest page size a request may ask for.
    pub max_limit: usize,
    /// Deepest offset reachable by page number.
    pub max_offset: usize,
    /// Recency window for `order:rank`, in hours.
    pub rank_window_hours: u64,
}

impl Default for SearchSettings {
    fn default() -> Self {
        Self {
            default_limit: 50,
            max_limit: 320,
            max_offset: 10_000,
            rank_window_hours: 48,
        }
    }
}

impl SearchSettings {
    /// Clamps a requested page size into `1..=max_limit`.
    pub fn clamp_limit(&self, requested: Option<usize>) -> usize {
        requested
            .unwrap_or(self.default_limit)
            .clamp(1, self.max_limit.max(1))
    }
}

/// Tag resolution caches.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CacheSettings {
    /// Maximum entries per cache.
    pub capacity: usize,
    /// Lifetime of a cached tag in seconds.
    pub positive_ttl_secs: u64,
    /// Lifetime of a cached miss in seconds.
    pub negative_ttl_secs: u64,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            capacity: 100_000,
            positive_ttl_secs: 3600,
            negative_ttl_secs: 300,
        }
    }
}

impl CacheSettings {
    /// Lifetime of a cached tag.
    pub fn positive_ttl(&self) -> Duration {
        Duration::from_secs(self.positive_ttl_secs)
    }

    /// Lifetime of a cached miss.
    pub fn negative_ttl(&self) -> Duration {
        Duration::from_secs(self.negative_ttl_secs)
    }
}

/// On-disk locations.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct StorageSettings {
    /// Directory holding the index, tag directory, hanging links and failed batches.
    pub data_dir: PathBuf,
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            data_dir: resolve::default_data_dir(),
        }
    }
}

impl StorageSettings {
    /// Directory of the record index.
    pub fn index_dir(&self) -> PathBuf {
        self.data_dir.join("index")
    }

    /// File holding the tag directory.
    pub fn tags_file(&self) -> PathBuf {
        self.data_dir.join("tags.json")
    }

    /// File holding deferred parent/child links.
    pub fn hanging_file(&self) -> PathBuf {
        self.data_dir.join("hanging.json")
    }

    /// Directory receiving failed write batches.
    pub fn failed_batches_dir(&self) -> PathBuf {
        self.data_dir.join("failed_batches")
    }

    /// Directory where downloaded exports are cached.
    pub fn exports_dir(&self) -> PathBuf {
        self.data_dir.join("exports")
    }
}

/// Public asset URLs.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AssetSettings {
    /// Base URL of the static file host.
    pub base_url: String,
}

impl Default for AssetSettings {
    fn default() -> Self {
        Self {
            base_url: "https://static1.e621.net/data".into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_upstream_limits() {
        let config = Config::default();
        assert_eq!(config.search.default_limit, 50);
        assert_eq!(config.search.max_limit, 320);
        assert_eq!(config.sync.page_size, 320);
        assert_eq!(config.upstream.request_interval(), Duration::from_secs(1));
        assert!(config.config_root.is_none());
    }

    #[test]
    fn clamp_limit_bounds_requests() {
        let search = SearchSettings::default();
        assert_eq!(search.clamp_limit(None), 50);
        assert_eq!(search.clamp_limit(Some(0)), 1);
        assert_eq!(search.clamp_limit(Some(1000)), 320);
        assert_eq!(search.clamp_limit(Some(75)), 75);
    }

    #[test]
    fn storage_paths_live_under_data_dir() {
        let storage = StorageSettings {
            data_dir: PathBuf::from("/var/lib/tagdex"),
        };
        assert_eq!(storage.index_dir(), PathBuf::from("/var/lib/tagdex/index"));
        assert_eq!(
            storage.failed_batches_dir(),
            PathBuf::from("/var/lib/tagdex/failed_batches")
        );
    }

    #[test]
    fn settings_to_toml_round_trips() {
        let config = Config::default();
        let rendered = config.settings_to_toml();
        assert!(rendered.contains("[search]"));
        assert!(rendered.contains("max_limit = 320"));
        let parsed = parse_config_str(&rendered, Path::new("rendered.toml")).unwrap();
        assert_eq!(parsed.search.unwrap().max_limit, Some(320));
    }
}
