//! Configuration merging.
//!
//! Merges multiple `RawConfig` files into a single resolved `Config`, applying precedence
//! rules and resolving the data directory.

use std::path::PathBuf;

use crate::{
    AssetSettings, CacheSettings, Config, ConfigError, SearchSettings, StorageSettings,
    SyncSettings, UpstreamSettings,
    parse::{
        RawAssetSettings, RawCacheSettings, RawConfig, RawSearchSettings, RawStorageSettings,
        RawSyncSettings, RawUpstreamSettings,
    },
    resolve::resolve_data_dir,
};

/// A parsed config file with its source path.
pub struct ParsedConfig {
    /// Path to the config file.
    pub path: PathBuf,
    /// Parsed raw configuration.
    pub config: RawConfig,
}

/// Overwrites `target` with `value` when the value is present.
fn set<T: Clone>(target: &mut T, value: Option<&T>) {
    if let Some(v) = value {
        *target = v.clone();
    }
}

/// Merges multiple configuration files into a single resolved `Config`.
///
/// Configs should be provided in precedence order: highest precedence first (closest to
/// CWD), lowest precedence last (global config). For every scalar the first defined value
/// wins.
pub fn merge_configs(configs: &[ParsedConfig]) -> Result<Config, ConfigError> {
    let mut config = Config::default();

    // Lowest precedence first so closer files overwrite
    for parsed in configs.iter().rev() {
        let raw = &parsed.config;
        if let Some(upstream) = &raw.upstream {
            apply_upstream(&mut config.upstream, upstream);
        }
        if let Some(sync) = &raw.sync {
            apply_sync(&mut config.sync, sync);
        }
        if let Some(search) = &raw.search {
            apply_search(&mut config.search, search);
        }
        if let Some(cache) = &raw.cache {
            apply_cache(&mut config.cache, cache);
        }
        if let Some(storage) = &raw.storage {
            apply_storage(&mut config.storage, storage, parsed)?;
        }
        if let Some(assets) = &raw.assets {
            apply_assets(&mut config.assets, assets);
        }
    }

    config.config_root = configs
        .first()
        .and_then(|c| c.path.parent())
        .map(|p| p.to_path_buf());

    Ok(config)
}

/// Applies raw upstream settings.
fn apply_upstream(result: &mut UpstreamSettings, raw: &RawUpstreamSettings) {
    set(&mut result.base_url, raw.base_url.as_ref());
    set(&mut result.export_base_url, raw.export_base_url.as_ref());
    set(&mut result.user_agent, raw.user_agent.as_ref());
    set(&mut result.request_interval_ms, raw.request_interval_ms.as_ref());
    set(&mut result.queue_backoff_ms, raw.queue_backoff_ms.as_ref());
    set(&mut result.max_queue_backoff_ms, raw.max_queue_backoff_ms.as_ref());
    set(&mut result.timeout_secs, raw.timeout_secs.as_ref());
}

/// Applies raw sync settings.
fn apply_sync(result: &mut SyncSettings, raw: &RawSyncSettings) {
    set(&mut result.interval_secs, raw.interval_secs.as_ref());
    set(&mut result.retry_backoff_secs, raw.retry_backoff_secs.as_ref());
    set(&mut result.page_size, raw.page_size.as_ref());
    set(&mut result.max_update_pages, raw.max_update_pages.as_ref());
    set(&mut result.batch_size, raw.batch_size.as_ref());
    set(&mut result.export_batch_size, raw.export_batch_size.as_ref());
    set(&mut result.concurrency, raw.concurrency.as_ref());
    set(&mut result.alias_page_size, raw.alias_page_size.as_ref());
}

/// Applies raw search settings.
fn apply_search(result: &mut SearchSettings, raw: &RawSearchSettings) {
    set(&mut result.default_limit, raw.default_limit.as_ref());
    set(&mut result.max_limit, raw.max_limit.as_ref());
    set(&mut result.max_offset, raw.max_offset.as_ref());
    set(&mut result.rank_window_hours, raw.rank_window_hours.as_ref());
}

/// Applies raw cache settings.
fn apply_cache(result: &mut CacheSettings, raw: &RawCacheSettings) {
    set(&mut result.capacity, raw.capacity.as_ref());
    set(&mut result.positive_ttl_secs, raw.positive_ttl_secs.as_ref());
    set(&mut result.negative_ttl_secs, raw.negative_ttl_secs.as_ref());
}

/// Applies raw storage settings, resolving the data directory against the file's location.
fn apply_storage(
    result: &mut StorageSettings,
    raw: &RawStorageSettings,
    parsed: &ParsedConfig,
) -> Result<(), ConfigError> {
    if let Some(dir) = &raw.data_dir {
        let base = parsed.path.parent().unwrap_or(parsed.path.as_path());
        result.data_dir = resolve_data_dir(dir, base)?;
    }
    Ok(())
}

/// Applies raw asset settings.
fn apply_assets(result: &mut AssetSettings, raw: &RawAssetSettings) {
    set(&mut result.base_url, raw.base_url.as_ref());
}
