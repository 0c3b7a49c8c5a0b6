//! The record store.
//!
//! Wraps a Tantivy index holding one document per record. A single writer lives behind a
//! mutex; readers reload after every commit, so searches observe a batch only once it is
//! committed.

use std::{fs, path::Path};

use parking_lot::Mutex;
use serde::Serialize;
use tagdex_document::Record;
use tantivy::{
    DocAddress, Index, IndexReader, IndexWriter as TantivyIndexWriter, Order, ReloadPolicy,
    Searcher, TantivyDocument, Term,
    collector::{Count, DocSetCollector, TopDocs},
    directory::MmapDirectory,
    indexer::UserOperation,
    query::{AllQuery, Query, TermQuery, TermSetQuery},
    schema::IndexRecordOption,
};
use tracing::{debug, warn};

use crate::{
    IndexError,
    document::{from_document, to_document},
    schema::{IndexSchema, signed},
    search::{SearchPage, SearchRequest, execute},
    translate::QueryTranslator,
};

/// Default heap size for the index writer (50 MB).
const DEFAULT_HEAP_SIZE: usize = 50_000_000;

/// A record the store refused, with the reason.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DocumentFailure {
    /// Id of the refused record.
    pub id: u64,
    /// Why it was refused.
    pub reason: String,
}

/// Outcome of writing one batch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchReport {
    /// Ids of the records now visible in the index.
    pub accepted: Vec<u64>,
    /// Records that could not be written.
    pub failures: Vec<DocumentFailure>,
}

impl BatchReport {
    /// Returns true when every record in the batch was written.
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Tantivy-backed store of catalog records.
pub struct RecordIndex {
    /// Reader reloaded after each commit.
    reader: IndexReader,
    /// The single writer.
    writer: Mutex<TantivyIndexWriter>,
    /// Schema with field handles.
    schema: IndexSchema,
    /// Compiled-tree translator.
    translator: QueryTranslator,
}

impl RecordIndex {
    /// Opens or creates an index at the given path.
    pub fn open(path: &Path) -> Result<Self, IndexError> {
        let schema = IndexSchema::new();
        fs::create_dir_all(path)?;

        let dir = MmapDirectory::open(path).map_err(|e| {
            let err: tantivy::TantivyError = e.into();
            IndexError::open_index(path.to_path_buf(), &err)
        })?;
        let index = Index::open_or_create(dir, schema.schema().clone())
            .map_err(|e| IndexError::open_index(path.to_path_buf(), &e))?;

        Self::from_index(&index, schema, path)
    }

    /// Creates an empty index held entirely in memory.
    pub fn in_memory() -> Result<Self, IndexError> {
        let schema = IndexSchema::new();
        let index = Index::create_in_ram(schema.schema().clone());
        Self::from_index(&index, schema, Path::new(":memory:"))
    }

    /// Attaches a reader and writer to an opened index.
    fn from_index(index: &Index, schema: IndexSchema, path: &Path) -> Result<Self, IndexError> {
        let writer = index
            .writer(DEFAULT_HEAP_SIZE)
            .map_err(|e| IndexError::open_index(path.to_path_buf(), &e))?;
        let reader = index
            .reader_builder()
            .reload_policy(ReloadPolicy::Manual)
            .try_into()
            .map_err(|e| IndexError::open_index(path.to_path_buf(), &e))?;
        Ok(Self {
            reader,
            writer: Mutex::new(writer),
            translator: QueryTranslator::new(schema.clone()),
            schema,
        })
    }

    /// Schema with field handles.
    pub fn schema(&self) -> &IndexSchema {
        &self.schema
    }

    /// Translator for compiled query trees.
    pub(crate) fn translator(&self) -> &QueryTranslator {
        &self.translator
    }

    /// A searcher over the last committed state.
    pub(crate) fn searcher(&self) -> Searcher {
        self.reader.searcher()
    }

    /// Number of committed records, deleted ones included.
    pub fn num_records(&self) -> u64 {
        self.searcher().num_docs()
    }

    /// Writes a batch of records, replacing any stored version with the same id.
    ///
    /// Records that cannot be encoded or added are reported back and the rest of the batch
    /// is still committed. A failed commit rolls the whole batch back and is an error.
    pub fn write_batch(&self, records: &[Record]) -> Result<BatchReport, IndexError> {
        let mut report = BatchReport::default();
        let mut writer = self.writer.lock();

        for record in records {
            let doc = match to_document(&self.schema, record) {
                Ok(doc) => doc,
                Err(e) => {
                    report.failures.push(DocumentFailure {
                        id: record.id,
                        reason: e.to_string(),
                    });
                    continue;
                }
            };
            let replace = [
                UserOperation::Delete(Term::from_field_i64(self.schema.id, signed(record.id))),
                UserOperation::Add(doc),
            ];
            match writer.run(replace) {
                Ok(_) => report.accepted.push(record.id),
                Err(e) => report.failures.push(DocumentFailure {
                    id: record.id,
                    reason: e.to_string(),
                }),
            }
        }

        if let Err(e) = writer.commit() {
            warn!(error = %e, "commit failed, rolling back batch");
            if let Err(rollback) = writer.rollback() {
                warn!(error = %rollback, "rollback failed");
            }
            return Err(IndexError::commit(&e));
        }
        drop(writer);

        self.reader.reload().map_err(|e| IndexError::commit(&e))?;
        debug!(
            accepted = report.accepted.len(),
            failed = report.failures.len(),
            "batch committed"
        );
        Ok(report)
    }

    /// Removes every record.
    pub fn clear(&self) -> Result<(), IndexError> {
        let mut writer = self.writer.lock();
        writer
            .delete_all_documents()
            .map_err(|e| IndexError::write(&e))?;
        writer.commit().map_err(|e| IndexError::commit(&e))?;
        drop(writer);
        self.reader.reload().map_err(|e| IndexError::commit(&e))
    }

    /// Retrieves a record by id.
    pub fn get(&self, id: u64) -> Result<Option<Record>, IndexError> {
        let searcher = self.searcher();
        let query = TermQuery::new(
            Term::from_field_i64(self.schema.id, signed(id)),
            IndexRecordOption::Basic,
        );
        let top_docs = searcher
            .search(&query, &TopDocs::with_limit(1))
            .map_err(|e| IndexError::search(&e))?;

        match top_docs.first() {
            Some((_, address)) => self.load(&searcher, *address).map(Some),
            None => Ok(None),
        }
    }

    /// Retrieves every stored record among `ids`, ordered by id.
    pub fn get_many(&self, ids: &[u64]) -> Result<Vec<Record>, IndexError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let query = TermSetQuery::new(
            ids.iter()
                .map(|id| Term::from_field_i64(self.schema.id, signed(*id))),
        );
        self.collect(&query)
    }

    /// Every record carrying the tag, deleted ones included, ordered by id.
    pub fn records_with_tag(&self, tag_id: u64) -> Result<Vec<Record>, IndexError> {
        let query = TermQuery::new(
            Term::from_field_u64(self.schema.tags, tag_id),
            IndexRecordOption::Basic,
        );
        self.collect(&query)
    }

    /// Number of records carrying the tag.
    pub fn count_with_tag(&self, tag_id: u64) -> Result<usize, IndexError> {
        let query = TermQuery::new(
            Term::from_field_u64(self.schema.tags, tag_id),
            IndexRecordOption::Basic,
        );
        self.searcher()
            .search(&query, &Count)
            .map_err(|e| IndexError::search(&e))
    }

    /// Highest record id in the index.
    pub fn latest_id(&self) -> Result<Option<u64>, IndexError> {
        let top = self
            .searcher()
            .search(
                &AllQuery,
                &TopDocs::with_limit(1).order_by_fast_field::<i64>("id", Order::Desc),
            )
            .map_err(|e| IndexError::search(&e))?;
        Ok(top
            .first()
            .and_then(|(id, _)| u64::try_from(*id).ok()))
    }

    /// Executes a compiled search.
    pub fn search(&self, request: &SearchRequest) -> Result<SearchPage, IndexError> {
        execute(self, request)
    }

    /// Loads every record matching a query, ordered by id.
    fn collect(&self, query: &dyn Query) -> Result<Vec<Record>, IndexError> {
        let searcher = self.searcher();
        let addresses = searcher
            .search(query, &DocSetCollector)
            .map_err(|e| IndexError::search(&e))?;
        let mut records = addresses
            .into_iter()
            .map(|address| self.load(&searcher, address))
            .collect::<Result<Vec<_>, _>>()?;
        records.sort_by_key(|r| r.id);
        Ok(records)
    }

    /// Decodes the record stored at an address.
    pub(crate) fn load(&self, searcher: &Searcher, address: DocAddress) -> Result<Record, IndexError> {
        let doc: TantivyDocument = searcher
            .doc(address)
            .map_err(|e| IndexError::search(&e))?;
        from_document(&self.schema, &doc)
    }
}
