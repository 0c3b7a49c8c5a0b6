//! Batched record writes.
//!
//! Each chunk is diffed against the stored records: unchanged records are skipped, tag
//! usage deltas are computed, and parent/child links are repaired. Parents that are not
//! indexed yet get a hanging relationship that the parent consumes when it arrives.

use std::{
    collections::{BTreeMap, BTreeSet, HashMap, HashSet},
    mem,
};

use tagdex_document::{HangingRelationship, Record};
use tagdex_index::{BatchReport, DocumentFailure, FailedBatch};
use tracing::{debug, error};

use crate::{Catalog, SyncError};

/// Outcome of writing a set of records.
#[derive(Debug, Default)]
pub(crate) struct WriteSummary {
    /// New or changed records the index accepted.
    pub written: usize,
    /// Records identical to the stored version.
    pub skipped: usize,
    /// Records the index refused, parents patched on their behalf included.
    pub failed: usize,
    /// The accepted new or changed records.
    pub accepted: Vec<Record>,
}

impl WriteSummary {
    /// Adds another summary to this one.
    fn absorb(&mut self, other: Self) {
        self.written += other.written;
        self.skipped += other.skipped;
        self.failed += other.failed;
        self.accepted.extend(other.accepted);
    }
}

/// Writes records in chunks of `batch_size`. Blocking.
///
/// The tag directory and hanging links are saved after every chunk's index commit.
pub(crate) fn write_records(
    catalog: &Catalog,
    mut records: Vec<Record>,
    batch_size: usize,
) -> Result<WriteSummary, SyncError> {
    let batch_size = batch_size.max(1);
    let mut summary = WriteSummary::default();
    while !records.is_empty() {
        let rest = records.split_off(batch_size.min(records.len()));
        let chunk = mem::replace(&mut records, rest);
        summary.absorb(write_chunk(catalog, chunk)?);
        catalog.save()?;
    }
    Ok(summary)
}

/// Writes records as they are, without diffing. Blocking.
///
/// Used for bulk patches that keep tag membership and timestamps intact.
pub(crate) fn patch_records(
    catalog: &Catalog,
    records: &[Record],
    batch_size: usize,
) -> usize {
    let mut written = 0;
    for chunk in records.chunks(batch_size.max(1)) {
        match catalog.index.write_batch(chunk) {
            Ok(report) => {
                written += report.accepted.len();
                capture_failures(catalog, &report, chunk);
            }
            Err(e) => capture_batch_error(catalog, &e.to_string(), chunk),
        }
    }
    written
}

/// Mutations of one chunk, built up before the write.
#[derive(Default)]
struct Batch {
    /// Stored versions of the incoming records, by id.
    existing: HashMap<u64, Record>,
    /// Records to write, by id.
    pending: BTreeMap<u64, Record>,
    /// Tag usage deltas per incoming record.
    deltas: HashMap<u64, HashMap<u64, i64>>,
    /// Hanging relationships consumed by this chunk.
    taken: Vec<HangingRelationship>,
}

impl Batch {
    /// Queues `record`, merging links it picked up from the store and from the chunk.
    fn stage(&mut self, catalog: &Catalog, mut record: Record) -> Result<bool, SyncError> {
        let previous = self.existing.remove(&record.id);
        let hanging = catalog.hanging.take(record.id);

        if let Some(old) = previous.as_ref().filter(|old| old.updated_at == record.updated_at) {
            let Some(hanging) = hanging else {
                return Ok(false);
            };
            // Unchanged, but children arrived before it did.
            let mut patched = self.pending.remove(&old.id).unwrap_or_else(|| old.clone());
            patched.children.extend(hanging.children.iter().copied());
            self.taken.push(hanging);
            self.pending.insert(patched.id, patched);
            return Ok(false);
        }

        if let Some(old) = &previous {
            record.children.extend(old.children.iter().copied());
        }
        if let Some(hanging) = &hanging {
            record.children.extend(hanging.children.iter().copied());
        }
        if let Some(patched) = self.pending.remove(&record.id) {
            record.children.extend(patched.children);
        }

        self.deltas
            .insert(record.id, tag_deltas(previous.as_ref(), &record));

        let old_parent = previous.as_ref().and_then(|r| r.parent_id);
        if old_parent != record.parent_id {
            if let Some(parent_id) = old_parent {
                self.detach(catalog, parent_id, record.id)?;
            }
        }
        if let Some(parent_id) = record.parent_id.filter(|p| *p != record.id) {
            self.attach(catalog, parent_id, record.id)?;
        }

        self.taken.extend(hanging);
        self.pending.insert(record.id, record);
        Ok(true)
    }

    /// Removes `child_id` from the children of `parent_id`.
    fn detach(&mut self, catalog: &Catalog, parent_id: u64, child_id: u64) -> Result<(), SyncError> {
        catalog.hanging.remove_child(parent_id, child_id);
        if let Some(old) = self.existing.get_mut(&parent_id) {
            old.children.remove(&child_id);
        }
        if let Some(parent) = self.pending.get_mut(&parent_id) {
            parent.children.remove(&child_id);
            return Ok(());
        }
        if let Some(mut parent) = catalog.index.get(parent_id)? {
            if parent.children.remove(&child_id) {
                self.pending.insert(parent_id, parent);
            }
        }
        Ok(())
    }

    /// Adds `child_id` to the children of `parent_id`, or leaves a hanging link when the
    /// parent is not indexed.
    fn attach(&mut self, catalog: &Catalog, parent_id: u64, child_id: u64) -> Result<(), SyncError> {
        if let Some(parent) = self.pending.get_mut(&parent_id) {
            parent.children.insert(child_id);
            return Ok(());
        }
        let stored = match self.existing.get(&parent_id) {
            Some(parent) => Some(parent.clone()),
            None => catalog.index.get(parent_id)?,
        };
        match stored {
            Some(parent) if parent.children.contains(&child_id) => {}
            Some(mut parent) => {
                parent.children.insert(child_id);
                self.pending.insert(parent_id, parent);
            }
            None => {
                debug!(parent_id, child_id, "parent not indexed, deferring link");
                catalog.hanging.add(parent_id, child_id);
            }
        }
        Ok(())
    }

    /// Puts back the hanging links of parents that were not written.
    fn restore_hanging(&self, catalog: &Catalog, failed: &HashSet<u64>) {
        for hanging in self.taken.iter().filter(|h| failed.contains(&h.parent_id)) {
            for child in &hanging.children {
                catalog.hanging.add(hanging.parent_id, *child);
            }
        }
    }
}

/// Writes one chunk.
fn write_chunk(catalog: &Catalog, incoming: Vec<Record>) -> Result<WriteSummary, SyncError> {
    let ids: Vec<u64> = incoming.iter().map(|r| r.id).collect();
    let mut batch = Batch {
        existing: catalog
            .index
            .get_many(&ids)?
            .into_iter()
            .map(|r| (r.id, r))
            .collect(),
        ..Batch::default()
    };

    let mut summary = WriteSummary::default();
    for record in incoming {
        if !batch.stage(catalog, record)? {
            summary.skipped += 1;
        }
    }
    if batch.pending.is_empty() {
        return Ok(summary);
    }

    let records: Vec<Record> = batch.pending.values().cloned().collect();
    let report = match catalog.index.write_batch(&records) {
        Ok(report) => report,
        Err(e) => {
            capture_batch_error(catalog, &e.to_string(), &records);
            let failed: HashSet<u64> = records.iter().map(|r| r.id).collect();
            batch.restore_hanging(catalog, &failed);
            summary.failed += records.len();
            return Ok(summary);
        }
    };

    capture_failures(catalog, &report, &records);
    let failed: HashSet<u64> = report.failures.iter().map(|f| f.id).collect();
    batch.restore_hanging(catalog, &failed);

    let accepted: HashSet<u64> = report.accepted.iter().copied().collect();
    let mut counts: HashMap<u64, i64> = HashMap::new();
    for (id, deltas) in &batch.deltas {
        if !accepted.contains(id) {
            continue;
        }
        for (tag, delta) in deltas {
            *counts.entry(*tag).or_default() += delta;
        }
    }
    catalog.tags.adjust_post_counts(&counts);

    summary.failed += failed.len();
    summary.accepted = batch
        .pending
        .into_values()
        .filter(|r| accepted.contains(&r.id) && batch.deltas.contains_key(&r.id))
        .collect();
    summary.written = summary.accepted.len();
    Ok(summary)
}

/// Per-tag usage change from `previous` to `record`. Deleted records count for nothing.
fn tag_deltas(previous: Option<&Record>, record: &Record) -> HashMap<u64, i64> {
    let counted = |r: &Record| {
        if r.flags.deleted {
            BTreeSet::new()
        } else {
            r.flattened_tags()
        }
    };
    let before = previous.map(counted).unwrap_or_default();
    let after = counted(record);

    let mut deltas = HashMap::new();
    for tag in after.difference(&before) {
        deltas.insert(*tag, 1);
    }
    for tag in before.difference(&after) {
        deltas.insert(*tag, -1);
    }
    deltas
}

/// Persists the refused part of a batch, if any.
pub(crate) fn capture_failures(catalog: &Catalog, report: &BatchReport, records: &[Record]) {
    if report.is_clean() {
        return;
    }
    persist(
        catalog,
        &FailedBatch {
            error: None,
            failures: &report.failures,
            records,
        },
    );
}

/// Persists a batch the index rejected as a whole.
fn capture_batch_error(catalog: &Catalog, message: &str, records: &[Record]) {
    error!(error = message, records = records.len(), "batch write failed");
    let failures: Vec<DocumentFailure> = Vec::new();
    persist(
        catalog,
        &FailedBatch {
            error: Some(message.to_string()),
            failures: &failures,
            records,
        },
    );
}

/// Writes a failed batch to the side channel, logging when even that fails.
fn persist(catalog: &Catalog, batch: &FailedBatch<'_>) {
    if let Err(e) = catalog.failures.record(batch) {
        error!(error = %e, records = batch.records.len(), "could not persist failed batch");
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use chrono::{DateTime, TimeZone, Utc};
    use tagdex_document::{Rating, RecordFlags, Tag, TagBuckets, TagCategory};
    use tempfile::TempDir;

    use super::*;

    /// Creation time of record `id`.
    fn at(id: u64, bump: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + (id as i64) * 60 + bump, 0)
            .single()
            .unwrap()
    }

    /// A record with the given tags and parent.
    fn record(id: u64, tags: &[u64], parent_id: Option<u64>) -> Record {
        let mut buckets = TagBuckets::new();
        for tag in tags {
            buckets.insert(TagCategory::General, *tag);
        }
        Record {
            id,
            tags: buckets,
            uploader_id: 1,
            approver_id: None,
            created_at: at(id, 0),
            updated_at: at(id, 0),
            content_hash: format!("{id:032x}"),
            sources: Vec::new(),
            rating: Rating::Safe,
            width: 100,
            height: 100,
            duration: 0.0,
            favorite_count: 0,
            score: 0,
            parent_id,
            children: BTreeSet::new(),
            file_type: "png".into(),
            file_size: 1,
            comment_count: 0,
            flags: RecordFlags::default(),
        }
    }

    /// In-memory catalog with tags 1..=3.
    fn catalog(dir: &TempDir) -> Catalog {
        let catalog = Catalog::in_memory(dir.path()).unwrap();
        for id in 1..=3 {
            catalog
                .tags
                .upsert_tag(Tag::new(id, format!("tag_{id}"), TagCategory::General));
        }
        catalog
    }

    /// Children of a stored record.
    fn children(catalog: &Catalog, id: u64) -> Vec<u64> {
        let record = catalog.index.get(id).unwrap().unwrap();
        record.children.into_iter().collect()
    }

    #[test]
    fn orphans_wait_for_their_parent() {
        let dir = TempDir::new().unwrap();
        let catalog = catalog(&dir);

        write_records(&catalog, vec![record(5, &[], Some(4))], 10).unwrap();
        assert_eq!(catalog.hanging.parent_ids(), vec![4]);

        write_records(&catalog, vec![record(4, &[], None)], 10).unwrap();
        assert_eq!(children(&catalog, 4), vec![5]);
        assert!(catalog.hanging.is_empty());
    }

    #[test]
    fn indexed_parents_are_patched() {
        let dir = TempDir::new().unwrap();
        let catalog = catalog(&dir);
        write_records(&catalog, vec![record(4, &[], None)], 10).unwrap();
        write_records(&catalog, vec![record(5, &[], Some(4)), record(6, &[], Some(4))], 10).unwrap();
        assert_eq!(children(&catalog, 4), vec![5, 6]);
        assert!(catalog.hanging.is_empty());
    }

    #[test]
    fn parent_and_child_in_one_chunk() {
        let dir = TempDir::new().unwrap();
        let catalog = catalog(&dir);
        write_records(&catalog, vec![record(5, &[], Some(4)), record(4, &[], None)], 10).unwrap();
        assert_eq!(children(&catalog, 4), vec![5]);
        assert!(catalog.hanging.is_empty());
    }

    #[test]
    fn reparenting_detaches_from_old_parent() {
        let dir = TempDir::new().unwrap();
        let catalog = catalog(&dir);
        write_records(
            &catalog,
            vec![record(1, &[], None), record(2, &[], None), record(5, &[], Some(1))],
            10,
        )
        .unwrap();
        assert_eq!(children(&catalog, 1), vec![5]);

        let mut moved = record(5, &[], Some(2));
        moved.updated_at = at(5, 30);
        write_records(&catalog, vec![moved], 10).unwrap();
        assert!(children(&catalog, 1).is_empty());
        assert_eq!(children(&catalog, 2), vec![5]);
    }

    #[test]
    fn unchanged_records_are_skipped() {
        let dir = TempDir::new().unwrap();
        let catalog = catalog(&dir);
        let first = write_records(&catalog, vec![record(1, &[1], None)], 10).unwrap();
        assert_eq!(first.written, 1);
        let again = write_records(&catalog, vec![record(1, &[1], None)], 10).unwrap();
        assert_eq!(again.written, 0);
        assert_eq!(again.skipped, 1);
        assert_eq!(catalog.tags.tag(1).unwrap().post_count, 1);
    }

    #[test]
    fn post_counts_follow_tag_changes() {
        let dir = TempDir::new().unwrap();
        let catalog = catalog(&dir);
        write_records(
            &catalog,
            vec![record(1, &[1, 2], None), record(2, &[2], None)],
            1,
        )
        .unwrap();
        assert_eq!(catalog.tags.tag(1).unwrap().post_count, 1);
        assert_eq!(catalog.tags.tag(2).unwrap().post_count, 2);

        let mut edited = record(1, &[3], None);
        edited.updated_at = at(1, 30);
        let mut deleted = record(2, &[2], None);
        deleted.updated_at = at(2, 30);
        deleted.flags.deleted = true;
        write_records(&catalog, vec![edited, deleted], 10).unwrap();

        assert_eq!(catalog.tags.tag(1).unwrap().post_count, 0);
        assert_eq!(catalog.tags.tag(2).unwrap().post_count, 0);
        assert_eq!(catalog.tags.tag(3).unwrap().post_count, 1);
    }

    #[test]
    fn refused_records_are_persisted() {
        let dir = TempDir::new().unwrap();
        let catalog = catalog(&dir);
        let records = vec![record(1, &[], None)];
        let report = BatchReport {
            accepted: Vec::new(),
            failures: vec![DocumentFailure {
                id: 1,
                reason: "mapper_parsing_exception".into(),
            }],
        };
        capture_failures(&catalog, &report, &records);

        let entries = catalog.failures.entries().unwrap();
        assert_eq!(entries.len(), 1);
        let contents = fs::read_to_string(&entries[0]).unwrap();
        assert!(contents.contains("mapper_parsing_exception"));
    }

    #[test]
    fn clean_batches_leave_no_trace() {
        let dir = TempDir::new().unwrap();
        let catalog = catalog(&dir);
        capture_failures(&catalog, &BatchReport::default(), &[record(1, &[], None)]);
        assert!(catalog.failures.entries().unwrap().is_empty());
    }
}
