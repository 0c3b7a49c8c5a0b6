//! The stores that make up a data directory.

use std::{path::Path, sync::Arc};

use tagdex_config::StorageSettings;
use tagdex_index::{FailedBatchLog, HangingStore, IndexError, RecordIndex, TagDirectory};
use tracing::info;

/// Record index, tag directory, hanging links and failed-batch log, shared by the search
/// side and the sync engine.
#[derive(Clone)]
pub struct Catalog {
    /// Indexed records.
    pub index: Arc<RecordIndex>,
    /// Tag taxonomy.
    pub tags: Arc<TagDirectory>,
    /// Children waiting for their parent.
    pub hanging: Arc<HangingStore>,
    /// Batches the index did not fully accept.
    pub failures: Arc<FailedBatchLog>,
}

impl Catalog {
    /// Opens every store under the configured data directory.
    pub fn open(storage: &StorageSettings) -> Result<Self, IndexError> {
        let catalog = Self {
            index: Arc::new(RecordIndex::open(&storage.index_dir())?),
            tags: Arc::new(TagDirectory::open(&storage.tags_file())?),
            hanging: Arc::new(HangingStore::open(&storage.hanging_file())?),
            failures: Arc::new(FailedBatchLog::new(&storage.failed_batches_dir())),
        };
        info!(
            data_dir = %storage.data_dir.display(),
            records = catalog.index.num_records(),
            tags = catalog.tags.len(),
            "catalog opened"
        );
        Ok(catalog)
    }

    /// A catalog held in memory, except for failed batches which go to `failed_dir`.
    pub fn in_memory(failed_dir: &Path) -> Result<Self, IndexError> {
        Ok(Self {
            index: Arc::new(RecordIndex::in_memory()?),
            tags: Arc::new(TagDirectory::in_memory()),
            hanging: Arc::new(HangingStore::in_memory()),
            failures: Arc::new(FailedBatchLog::new(failed_dir)),
        })
    }

    /// Persists the tag directory and hanging links.
    pub fn save(&self) -> Result<(), IndexError> {
        self.tags.save()?;
        self.hanging.save()
    }
}
