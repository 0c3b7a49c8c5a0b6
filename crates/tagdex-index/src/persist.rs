//! JSON persistence for the side stores kept next to the index.

use std::{fs, path::Path};

use serde::{Serialize, de::DeserializeOwned};

use crate::IndexError;

/// Loads a JSON file, returning the default value when it does not exist.
pub fn load_json<T: DeserializeOwned + Default>(path: &Path) -> Result<T, IndexError> {
    if !path.exists() {
        return Ok(T::default());
    }
    let contents = fs::read_to_string(path)?;
    serde_json::from_str(&contents).map_err(|source| IndexError::Json {
        path: path.to_path_buf(),
        source,
    })
}

/// Writes a value as JSON, replacing the file atomically.
///
/// Creates parent directories if they don't exist.
pub fn save_json<T: Serialize>(path: &Path, value: &T) -> Result<(), IndexError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let contents = serde_json::to_vec(value).map_err(|source| IndexError::Json {
        path: path.to_path_buf(),
        source,
    })?;
    let staging = path.with_extension("json.tmp");
    fs::write(&staging, contents)?;
    fs::rename(&staging, path)?;
    Ok(())
}

#[cfg(test)]
mod test {
    use std::collections::BTreeMap;

    use tempfile::TempDir;

    use super::*;

    #[test]
    fn missing_file_loads_default() {
        let temp = TempDir::new().unwrap();
        let value: BTreeMap<u64, String> = load_json(&temp.path().join("none.json")).unwrap();
        assert!(value.is_empty());
    }

    #[test]
    fn saved_value_loads_back() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("nested").join("state.json");
        let value = BTreeMap::from([(1_u64, "a".to_string())]);
        save_json(&path, &value).unwrap();
        assert!(!path.with_extension("json.tmp").exists());
        let loaded: BTreeMap<u64, String> = load_json(&path).unwrap();
        assert_eq!(loaded, value);
    }

    #[test]
    fn garbage_is_reported_with_path() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("bad.json");
        fs::write(&path, "{nope").unwrap();
        let err = load_json::<BTreeMap<u64, String>>(&path).unwrap_err();
        assert!(err.to_string().contains("bad.json"));
    }
}
