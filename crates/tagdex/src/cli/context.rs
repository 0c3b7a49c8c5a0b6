//! Shared context for running CLI commands.

use std::{
    env,
    path::{Path, PathBuf},
    process::ExitCode,
    sync::Arc,
};

use tagdex_config::{Config, discover_config_files};
use tagdex_engine::{HttpUpstream, Services, SystemClock};

/// Command execution context built once per CLI invocation.
pub struct CommandContext {
    /// Current working directory.
    pub cwd: PathBuf,
    /// Config files in effect, highest precedence first.
    pub config_files: Vec<PathBuf>,
    /// Loaded configuration (default if no config files were found).
    pub config: Config,
}

impl CommandContext {
    /// Loads configuration from `explicit` when given, otherwise by discovery from the
    /// current directory.
    pub fn load(explicit: Option<&Path>) -> Result<Self, ExitCode> {
        let cwd = current_dir_or_failure()?;
        let config_files = match explicit {
            Some(path) => vec![cwd.join(path)],
            None => discover_config_files(&cwd),
        };
        let config = Config::load_from_files(&config_files).map_err(|e| {
            eprintln!("error: failed to load configuration: {e}");
            ExitCode::FAILURE
        })?;
        Ok(Self {
            cwd,
            config_files,
            config,
        })
    }

    /// Loads only the current directory, skipping configuration parsing.
    ///
    /// Used by `init`, which must work even when an existing config file is invalid.
    pub fn load_cwd_only() -> Result<Self, ExitCode> {
        Ok(Self {
            cwd: current_dir_or_failure()?,
            config_files: Vec::new(),
            config: Config::default(),
        })
    }

    /// Opens the data directory and connects the services to the live upstream.
    pub fn services(&self) -> Result<Services, ExitCode> {
        let upstream = HttpUpstream::new(&self.config.upstream).map_err(|e| {
            eprintln!("error: failed to create upstream client: {e}");
            ExitCode::FAILURE
        })?;
        Services::open(&self.config, Arc::new(upstream), Arc::new(SystemClock)).map_err(|e| {
            eprintln!(
                "error: failed to open data directory {}: {e}",
                self.config.storage.data_dir.display()
            );
            ExitCode::FAILURE
        })
    }
}

/// Returns the current working directory or exits with a consistent error.
fn current_dir_or_failure() -> Result<PathBuf, ExitCode> {
    env::current_dir().map_err(|e| {
        eprintln!("error: could not determine current directory: {e}");
        ExitCode::FAILURE
    })
}
