//! Side channel for batches the store did not fully accept.
//!
//! Each failed batch is written as its own JSON file so it can be inspected and replayed
//! offline.

use std::{
    fs,
    path::{Path, PathBuf},
    sync::atomic::{AtomicU64, Ordering},
};

use chrono::Utc;
use serde::Serialize;
use tagdex_document::Record;
use tracing::warn;

use crate::{DocumentFailure, IndexError};

/// A batch that failed in whole or in part.
#[derive(Debug, Clone, Serialize)]
pub struct FailedBatch<'a> {
    /// Batch-level error, when the whole batch failed.
    pub error: Option<String>,
    /// Per-record failures.
    pub failures: &'a [DocumentFailure],
    /// Every record of the batch.
    pub records: &'a [Record],
}

/// Writes failed batches to `<dir>/<unix-millis>-<seq>.json`.
#[derive(Debug)]
pub struct FailedBatchLog {
    /// Target directory.
    dir: PathBuf,
    /// Sequence number disambiguating batches within one millisecond.
    seq: AtomicU64,
}

impl FailedBatchLog {
    /// Creates a log writing into `dir`. The directory is created on first use.
    pub fn new(dir: &Path) -> Self {
        Self {
            dir: dir.to_path_buf(),
            seq: AtomicU64::new(0),
        }
    }

    /// Persists a failed batch and returns the file written.
    pub fn record(&self, batch: &FailedBatch<'_>) -> Result<PathBuf, IndexError> {
        fs::create_dir_all(&self.dir)?;
        let seq = self.seq.fetch_add(1, Ordering::Relaxed);
        let path = self
            .dir
            .join(format!("{}-{seq}.json", Utc::now().timestamp_millis()));
        let contents = serde_json::to_vec_pretty(batch).map_err(|source| IndexError::Json {
            path: path.clone(),
            source,
        })?;
        fs::write(&path, contents)?;
        warn!(
            path = %path.display(),
            records = batch.records.len(),
            failures = batch.failures.len(),
            "persisted failed batch"
        );
        Ok(path)
    }

    /// Files currently in the log, oldest first.
    pub fn entries(&self) -> Result<Vec<PathBuf>, IndexError> {
        if !self.dir.exists() {
            return Ok(Vec::new());
        }
        let mut entries = fs::read_dir(&self.dir)?
            .filter_map(Result::ok)
            .map(|e| e.path())
            .filter(|p| p.extension().is_some_and(|ext| ext == "json"))
            .collect::<Vec<_>>();
        entries.sort();
        Ok(entries)
    }
}

#[cfg(test)]
mod test {
    use tempfile::TempDir;

    use super::*;

    #[test]
    fn writes_one_file_per_batch() {
        let temp = TempDir::new().unwrap();
        let log = FailedBatchLog::new(&temp.path().join("failed_batches"));
        assert!(log.entries().unwrap().is_empty());

        let failures = vec![DocumentFailure {
            id: 3,
            reason: "boom".into(),
        }];
        let first = log
            .record(&FailedBatch {
                error: None,
                failures: &failures,
                records: &[],
            })
            .unwrap();
        let second = log
            .record(&FailedBatch {
                error: Some("commit failed".into()),
                failures: &[],
                records: &[],
            })
            .unwrap();

        assert_ne!(first, second);
        assert_eq!(log.entries().unwrap().len(), 2);
        let json: serde_json::Value =
            serde_json::from_slice(&fs::read(&first).unwrap()).unwrap();
        assert_eq!(json["failures"][0]["reason"], "boom");
        assert!(first.file_name().unwrap().to_string_lossy().ends_with("-0.json"));
    }
}
