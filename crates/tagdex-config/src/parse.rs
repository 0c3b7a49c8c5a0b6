//! Configuration file parsing.
//!
//! Parses individual `.tagdex.toml` files into intermediate `RawConfig` structures
//! that preserve the optional nature of all fields before merging.

use std::{fs, path::Path};

use serde::Deserialize;

use crate::ConfigError;

/// Raw configuration as parsed directly from a TOML file.
///
/// All fields are optional to support partial configs that will be merged.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RawConfig {
    /// When true, stop discovery here - ignore parent and global configs.
    pub root: Option<bool>,
    /// Upstream catalog section.
    pub upstream: Option<RawUpstreamSettings>,
    /// Sync engine section.
    pub sync: Option<RawSyncSettings>,
    /// Search section.
    pub search: Option<RawSearchSettings>,
    /// Tag cache section.
    pub cache: Option<RawCacheSettings>,
    /// Storage section.
    pub storage: Option<RawStorageSettings>,
    /// Asset URL section.
    pub assets: Option<RawAssetSettings>,
}

/// Raw upstream settings.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RawUpstreamSettings {
    /// Catalog API base URL.
    pub base_url: Option<String>,
    /// Base URL of the daily database exports.
    pub export_base_url: Option<String>,
    /// User agent sent with every request.
    pub user_agent: Option<String>,
    /// Minimum gap between requests.
    pub request_interval_ms: Option<u64>,
    /// Extra delay per request already queued.
    pub queue_backoff_ms: Option<u64>,
    /// Cap on the queue-depth delay.
    pub max_queue_backoff_ms: Option<u64>,
    /// Per-request timeout.
    pub timeout_secs: Option<u64>,
}

/// Raw sync settings.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RawSyncSettings {
    /// Pause between successful passes.
    pub interval_secs: Option<u64>,
    /// Pause after a failed pass.
    pub retry_backoff_secs: Option<u64>,
    /// Records per upstream page.
    pub page_size: Option<usize>,
    /// Maximum pages walked while applying updates.
    pub max_update_pages: Option<usize>,
    /// Mutations per write batch.
    pub batch_size: Option<usize>,
    /// Rows per export chunk during full reconciliation.
    pub export_batch_size: Option<usize>,
    /// Concurrent record transforms.
    pub concurrency: Option<usize>,
    /// Aliases or implications per upstream page.
    pub alias_page_size: Option<usize>,
}

/// Raw search settings.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RawSearchSettings {
    /// Page size when the request gives none.
    pub default_limit: Option<usize>,
    /// Largest page size a request may ask for.
    pub max_limit: Option<usize>,
    /// Deepest offset reachable by page number.
    pub max_offset: Option<usize>,
    /// Recency window for `order:rank`.
    pub rank_window_hours: Option<u64>,
}

/// Raw cache settings.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RawCacheSettings {
    /// Maximum entries per cache.
    pub capacity: Option<usize>,
    /// Lifetime of a cached tag.
    pub positive_ttl_secs: Option<u64>,
    /// Lifetime of a cached miss.
    pub negative_ttl_secs: Option<u64>,
}

/// Raw storage settings.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RawStorageSettings {
    /// Directory holding the index, tag directory and failed batches.
    pub data_dir: Option<String>,
}

/// Raw asset settings.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RawAssetSettings {
    /// Base URL of the static file host.
    pub base_url: Option<String>,
}

/// Parses a configuration file from disk.
pub fn parse_config_file(path: &Path) -> Result<RawConfig, ConfigError> {
    let contents = fs::read_to_string(path).map_err(|source| ConfigError::ReadFile {
        path: path.to_path_buf(),
        source,
    })?;

    parse_config_str(&contents, path)
}

/// Parses configuration from a TOML string.
///
/// The `path` parameter is used for error reporting.
pub fn parse_config_str(contents: &str, path: &Path) -> Result<RawConfig, ConfigError> {
    toml::from_str(contents).map_err(|source| ConfigError::ParseToml {
        path: path.to_path_buf(),
        source,
    })
}

/// Checks if a config file has `root = true` set.
///
/// Returns false if the file cannot be read or parsed.
pub fn is_root_config(path: &Path) -> bool {
    let Ok(contents) = fs::read_to_string(path) else {
        return false;
    };
    let Ok(config) = toml::from_str::<RawConfig>(&contents) else {
        return false;
    };
    config.root == Some(true)
}
