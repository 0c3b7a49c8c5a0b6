//! Configuration validation.
//!
//! Reports settings that load fine but will behave badly at runtime.

use std::fmt;

use crate::Config;

/// A non-fatal warning about the configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigWarning {
    /// The default page size exceeds the maximum and will be clamped.
    DefaultLimitAboveMax {
        /// Configured default.
        default_limit: usize,
        /// Configured maximum.
        max_limit: usize,
    },
    /// Requests are not rate limited at all.
    NoRequestInterval,
    /// A setting that must be positive is zero.
    ZeroSetting {
        /// Dotted key of the setting.
        key: &'static str,
    },
    /// The upstream URL is not http(s).
    InvalidUrl {
        /// Dotted key of the setting.
        key: &'static str,
        /// Configured value.
        value: String,
    },
}

impl fmt::Display for ConfigWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DefaultLimitAboveMax {
                default_limit,
                max_limit,
            } => write!(
                f,
                "search.default_limit ({default_limit}) exceeds search.max_limit ({max_limit})"
            ),
            Self::NoRequestInterval => {
                write!(f, "upstream.request_interval_ms is 0; upstream requests are not rate limited")
            }
            Self::ZeroSetting { key } => write!(f, "{key} must be greater than 0"),
            Self::InvalidUrl { key, value } => write!(f, "{key} is not an http(s) URL: {value}"),
        }
    }
}

/// Validates a configuration and returns any warnings.
pub fn validate_config(config: &Config) -> Vec<ConfigWarning> {
    let mut warnings = Vec::new();

    if config.search.default_limit > config.search.max_limit {
        warnings.push(ConfigWarning::DefaultLimitAboveMax {
            default_limit: config.search.default_limit,
            max_limit: config.search.max_limit,
        });
    }
    if config.upstream.request_interval_ms == 0 {
        warnings.push(ConfigWarning::NoRequestInterval);
    }

    let positive = [
        ("search.max_limit", config.search.max_limit),
        ("sync.page_size", config.sync.page_size),
        ("sync.batch_size", config.sync.batch_size),
        ("sync.export_batch_size", config.sync.export_batch_size),
        ("sync.concurrency", config.sync.concurrency),
        ("sync.alias_page_size", config.sync.alias_page_size),
        ("cache.capacity", config.cache.capacity),
    ];
    for (key, value) in positive {
        if value == 0 {
            warnings.push(ConfigWarning::ZeroSetting { key });
        }
    }

    for (key, value) in [
        ("upstream.base_url", &config.upstream.base_url),
        ("upstream.export_base_url", &config.upstream.export_base_url),
        ("assets.base_url", &config.assets.base_url),
    ] {
        if !value.starts_with("http://") && !value.starts_with("https://") {
            warnings.push(ConfigWarning::InvalidUrl {
                key,
                value: value.clone(),
            });
        }
    }

    warnings
}
