//! Error types for tagdex configuration.

use std::{io, path::PathBuf};

use thiserror::Error;
use toml::de;

/// Errors loading `.tagdex.toml` files.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A config file exists but could not be read.
    #[error("cannot read {path}: {source}")]
    ReadFile {
        /// Offending file.
        path: PathBuf,
        /// I/O failure.
        source: io::Error,
    },

    /// A config file is not valid TOML or has a mistyped setting.
    #[error("invalid configuration in {path}: {source}")]
    ParseToml {
        /// Offending file.
        path: PathBuf,
        /// Parser diagnostic, with line and column.
        source: de::Error,
    },

    /// `storage.data_dir` starts with `~` but there is no home directory.
    #[error("cannot expand ~ in storage.data_dir: no home directory")]
    NoHomeDirectory,
}
