//! Integration tests for tagdex-config.
//!
//! Tests the full configuration loading pipeline: discovery -> parse -> merge.

// Integration tests live outside cfg(test) by design
#![allow(clippy::tests_outside_test_module)]

use std::{
    fs,
    path::{Path, PathBuf},
};

use tagdex_config::{CONFIG_FILENAME, Config, ConfigError};

/// Test helper to create a temporary directory structure for tests.
struct TestEnv {
    /// Backing temporary directory.
    root: tempfile::TempDir,
}

impl TestEnv {
    fn new() -> Self {
        Self {
            root: tempfile::tempdir().unwrap(),
        }
    }

    fn path(&self) -> &Path {
        self.root.path()
    }

    /// Writes a config file in `rel_dir` and returns its path.
    fn write_config(&self, rel_dir: &str, content: &str) -> PathBuf {
        let dir = self.root.path().join(rel_dir);
        fs::create_dir_all(&dir).unwrap();
        let path = dir.join(CONFIG_FILENAME);
        fs::write(&path, content).unwrap();
        path
    }
}

#[test]
fn nested_configs_merge_with_closest_winning() {
    let env = TestEnv::new();
    env.write_config(
        "",
        "root = true\n[search]\ndefault_limit = 10\nmax_limit = 100\n",
    );
    env.write_config("service", "[search]\ndefault_limit = 25\n");

    let config = Config::load(&env.path().join("service")).unwrap();
    assert_eq!(config.search.default_limit, 25);
    assert_eq!(config.search.max_limit, 100);
    assert_eq!(config.config_root, Some(env.path().join("service")));
}

#[test]
fn data_dir_is_relative_to_declaring_file() {
    let env = TestEnv::new();
    env.write_config("", "root = true\n[storage]\ndata_dir = \"state\"\n");
    env.write_config("service", "[sync]\nconcurrency = 4\n");

    let config = Config::load(&env.path().join("service")).unwrap();
    assert_eq!(config.storage.data_dir, env.path().join("state"));
    assert_eq!(config.storage.index_dir(), env.path().join("state").join("index"));
    assert_eq!(config.sync.concurrency, 4);
}

#[test]
fn malformed_file_is_reported() {
    let env = TestEnv::new();
    let path = env.write_config("", "root = true\n[sync\n");

    match Config::load(env.path()) {
        Err(ConfigError::ParseToml { path: reported, .. }) => assert_eq!(reported, path),
        other => panic!("expected parse error, got {other:?}"),
    }
}

#[test]
fn explicit_file_list_skips_discovery() {
    let env = TestEnv::new();
    let path = env.write_config("elsewhere", "[cache]\ncapacity = 7\n");
    let config = Config::load_from_files(&[path]).unwrap();
    assert_eq!(config.cache.capacity, 7);
    assert!(config.validate().is_empty());
}
