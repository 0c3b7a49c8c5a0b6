//! Path resolution for the data directory.
//!
//! Resolves relative and tilde-prefixed paths to absolute paths. The directory does not
//! need to exist yet; the index and tag directory create it on first use.

use std::path::{Path, PathBuf};

use directories::{BaseDirs, ProjectDirs};

use crate::ConfigError;

/// Resolves a configured data directory.
///
/// - Tilde paths (`~/tagdex`) expand to the home directory
/// - Relative paths resolve against `config_dir`
/// - Absolute paths are returned unchanged
pub fn resolve_data_dir(path: &str, config_dir: &Path) -> Result<PathBuf, ConfigError> {
    let expanded = expand_tilde(path)?;
    if expanded.is_absolute() {
        Ok(expanded)
    } else {
        Ok(config_dir.join(expanded))
    }
}

/// Platform data directory for tagdex, or `.tagdex` in the working directory.
pub fn default_data_dir() -> PathBuf {
    ProjectDirs::from("", "", "tagdex")
        .map(|dirs| dirs.data_dir().to_path_buf())
        .unwrap_or_else(|| PathBuf::from(".tagdex"))
}

/// Expands a tilde prefix to the home directory.
fn expand_tilde(path: &str) -> Result<PathBuf, ConfigError> {
    if path == "~" {
        return home_dir();
    }

    if let Some(rest) = path.strip_prefix("~/") {
        let home = home_dir()?;
        return Ok(home.join(rest));
    }

    Ok(PathBuf::from(path))
}

/// Returns the home directory.
fn home_dir() -> Result<PathBuf, ConfigError> {
    BaseDirs::new()
        .map(|dirs| dirs.home_dir().to_path_buf())
        .ok_or(ConfigError::NoHomeDirectory)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn relative_path_joins_config_dir() {
        let resolved = resolve_data_dir("./data", Path::new("/etc/tagdex")).unwrap();
        assert_eq!(resolved, PathBuf::from("/etc/tagdex/./data"));
    }

    #[test]
    fn absolute_path_is_unchanged() {
        let resolved = resolve_data_dir("/srv/tagdex", Path::new("/etc")).unwrap();
        assert_eq!(resolved, PathBuf::from("/srv/tagdex"));
    }

    #[test]
    fn tilde_expands_to_home() {
        let Some(dirs) = BaseDirs::new() else {
            return;
        };
        let resolved = resolve_data_dir("~/tagdex", Path::new("/etc")).unwrap();
        assert_eq!(resolved, dirs.home_dir().join("tagdex"));
    }
}
