//! Full reconciliation from the upstream's daily database export.
//!
//! Exports are gzip-compressed CSV files named `<table>-<YYYY-MM-DD>.csv.gz`. Tags are
//! applied first so that records resolve locally, then records stream through the normal
//! write path in chunks, then aliases. Post counts are recomputed from the export at the
//! end.

use std::{
    collections::{BTreeMap, HashMap},
    fs::File,
    io::BufReader,
    mem,
    path::Path,
};

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use flate2::read::MultiGzDecoder;
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use tagdex_index::TagChange;
use tokio::{fs, sync::mpsc, task};
use tracing::{debug, info, warn};

use super::{SyncEngine, blocking, transform};
use crate::{
    SyncError,
    upstream::{AliasPayload, FilePayload, FlagsPayload, PostPayload, RelationshipsPayload, ScorePayload, TagPayload},
};

/// Decoded export reader.
type ExportReader = csv::Reader<MultiGzDecoder<BufReader<File>>>;

/// A chunk of records, or the error that stopped the reader.
type PostChunk = Result<Vec<PostPayload>, SyncError>;

/// What a full reconciliation did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ResyncReport {
    /// Tag rows applied.
    pub tags: usize,
    /// Records whose category buckets were migrated.
    pub migrated_records: usize,
    /// Record rows processed.
    pub records: usize,
    /// New or changed records written.
    pub written: usize,
    /// Records the index refused.
    pub failed_records: usize,
    /// Aliases stored or removed.
    pub aliases: usize,
}

/// File names of the tag, alias and record exports for `date`.
pub fn export_names(date: NaiveDate) -> [String; 3] {
    ["tags", "tag_aliases", "posts"].map(|table| format!("{table}-{date}.csv.gz"))
}

/// Downloads and applies every export for `date`.
pub(super) async fn resync(engine: &SyncEngine, date: NaiveDate) -> Result<ResyncReport, SyncError> {
    let [tags_name, aliases_name, posts_name] = export_names(date);
    let dir = &engine.exports_dir;
    let tags_path = engine.upstream.fetch_export(&tags_name, dir).await?;
    let aliases_path = engine.upstream.fetch_export(&aliases_name, dir).await?;
    let posts_path = engine.upstream.fetch_export(&posts_name, dir).await?;
    info!(%date, "applying database export");

    let mut report = ResyncReport::default();

    let path = tags_path.clone();
    let tags: Vec<TagRow> = blocking(move || read_all(&path)).await?;
    let mut migrations = Vec::new();
    for row in tags {
        let Some(tag) = TagPayload::from(row).to_tag() else {
            continue;
        };
        let (id, category, name) = (tag.id, tag.category, tag.name.clone());
        if let TagChange::Updated {
            renamed_from,
            moved_from,
        } = engine.catalog.tags.upsert_tag(tag)
        {
            if let Some(old) = renamed_from {
                engine.resolver.forget(&old);
            }
            if moved_from.is_some() {
                migrations.push((id, category));
            }
        }
        engine.resolver.forget(&name);
        report.tags += 1;
    }
    for (tag_id, category) in migrations {
        report.migrated_records += engine.migrate_category(tag_id, category).await?;
    }
    info!(tags = report.tags, "tag export applied");

    let chunk_size = engine.settings.export_batch_size.max(1);
    let (tx, mut rx) = mpsc::channel::<PostChunk>(2);
    let path = posts_path.clone();
    let reader = task::spawn_blocking(move || stream_posts(&path, chunk_size, &tx));

    let mut counts: HashMap<u64, u64> = HashMap::new();
    while let Some(chunk) = rx.recv().await {
        let records =
            transform::to_records(&engine.resolver, chunk?, engine.settings.concurrency).await?;
        for record in records.iter().filter(|r| !r.flags.deleted) {
            for tag in record.flattened_tags() {
                *counts.entry(tag).or_default() += 1;
            }
        }
        report.records += records.len();
        let (written, failed) = engine.write(records).await?;
        report.written += written;
        report.failed_records += failed;
        info!(records = report.records, written = report.written, "record export progress");
    }
    reader.await.map_err(|e| SyncError::Task(e.to_string()))?;
    engine.catalog.tags.set_post_counts(&counts);

    let path = aliases_path.clone();
    let aliases: Vec<AliasRow> = blocking(move || read_all(&path)).await?;
    let aliases: Vec<AliasPayload> = aliases.into_iter().map(AliasPayload::from).collect();
    report.aliases = engine.apply_aliases(&aliases).await?;

    for path in [tags_path, aliases_path, posts_path] {
        if let Err(e) = fs::remove_file(&path).await {
            warn!(path = %path.display(), error = %e, "could not remove export");
        }
    }
    info!(?report, "database export applied");
    Ok(report)
}

/// Opens a gzip CSV export with headers.
fn open(path: &Path) -> Result<ExportReader, SyncError> {
    let file = File::open(path).map_err(|e| SyncError::export(path.to_path_buf(), e))?;
    Ok(csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(MultiGzDecoder::new(BufReader::new(file))))
}

/// Reads every well-formed row of an export. Malformed rows are skipped.
fn read_all<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>, SyncError> {
    let mut reader = open(path)?;
    let mut rows = Vec::new();
    for row in reader.deserialize::<T>() {
        if let Some(row) = accept_row(path, row)? {
            rows.push(row);
        }
    }
    Ok(rows)
}

/// Keeps a decoded row, skips a malformed one, fails on I/O errors.
fn accept_row<T>(path: &Path, row: Result<T, csv::Error>) -> Result<Option<T>, SyncError> {
    match row {
        Ok(row) => Ok(Some(row)),
        Err(e) if e.is_io_error() => Err(SyncError::export(path.to_path_buf(), e)),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "skipping malformed export row");
            Ok(None)
        }
    }
}

/// Sends record rows to `tx` in chunks of `chunk_size`. Blocking.
fn stream_posts(path: &Path, chunk_size: usize, tx: &mpsc::Sender<PostChunk>) {
    if let Err(e) = send_posts(path, chunk_size, tx) {
        if tx.blocking_send(Err(e)).is_err() {
            debug!("export consumer stopped");
        }
    }
}

/// Reads record rows, stopping quietly when the receiver goes away.
fn send_posts(path: &Path, chunk_size: usize, tx: &mpsc::Sender<PostChunk>) -> Result<(), SyncError> {
    let mut reader = open(path)?;
    let mut chunk = Vec::with_capacity(chunk_size);
    for row in reader.deserialize::<PostRow>() {
        let Some(row) = accept_row(path, row)? else {
            continue;
        };
        let id = row.id;
        match row.into_payload() {
            Some(post) => chunk.push(post),
            None => warn!(post_id = id, "skipping export row without a valid creation time"),
        }
        if chunk.len() >= chunk_size && tx.blocking_send(Ok(mem::take(&mut chunk))).is_err() {
            return Ok(());
        }
    }
    if !chunk.is_empty() && tx.blocking_send(Ok(chunk)).is_err() {
        debug!("export consumer stopped");
    }
    Ok(())
}

/// Parses an export timestamp: `YYYY-MM-DD HH:MM:SS[.fff]` in UTC, or RFC 3339.
fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S%.f")
        .map(|t| t.and_utc())
        .ok()
        .or_else(|| {
            DateTime::parse_from_rfc3339(raw)
                .ok()
                .map(|t| t.with_timezone(&Utc))
        })
}

/// Export booleans are `t` or `f`.
fn flag(raw: &str) -> bool {
    raw == "t"
}

/// A row of the tag export.
#[derive(Debug, Deserialize)]
struct TagRow {
    /// Tag id.
    id: u64,
    /// Tag name.
    name: String,
    /// Category code.
    category: u8,
    /// Upstream usage count.
    #[serde(default)]
    post_count: Option<u64>,
}

impl From<TagRow> for TagPayload {
    fn from(row: TagRow) -> Self {
        Self {
            id: row.id,
            name: row.name,
            category: row.category,
            post_count: row.post_count.unwrap_or_default(),
            updated_at: None,
        }
    }
}

/// A row of the alias export.
#[derive(Debug, Deserialize)]
struct AliasRow {
    /// Alias id.
    id: u64,
    /// Name being rewritten.
    antecedent_name: String,
    /// Name rewritten to.
    consequent_name: String,
    /// Creation time.
    #[serde(default)]
    created_at: Option<String>,
    /// Moderation status.
    status: String,
}

impl From<AliasRow> for AliasPayload {
    fn from(row: AliasRow) -> Self {
        Self {
            id: row.id,
            antecedent_name: row.antecedent_name,
            consequent_name: row.consequent_name,
            updated_at: row.created_at.as_deref().and_then(parse_timestamp),
            status: row.status,
        }
    }
}

/// A row of the record export. Absent numbers are empty fields.
#[derive(Debug, Deserialize)]
struct PostRow {
    /// Record id.
    id: u64,
    /// Uploading user.
    #[serde(default)]
    uploader_id: Option<u64>,
    /// Approving moderator.
    #[serde(default)]
    approver_id: Option<u64>,
    /// Creation time.
    created_at: String,
    /// Last modification time.
    #[serde(default)]
    updated_at: Option<String>,
    /// Content hash.
    #[serde(default)]
    md5: Option<String>,
    /// Newline-separated sources.
    #[serde(default)]
    source: String,
    /// Rating code.
    rating: String,
    /// Width in pixels.
    #[serde(default)]
    image_width: Option<u64>,
    /// Height in pixels.
    #[serde(default)]
    image_height: Option<u64>,
    /// Space-separated tag names.
    #[serde(default)]
    tag_string: String,
    /// Favorite count.
    #[serde(default)]
    fav_count: Option<u64>,
    /// File extension.
    #[serde(default)]
    file_ext: String,
    /// Size in bytes.
    #[serde(default)]
    file_size: Option<u64>,
    /// Declared parent.
    #[serde(default)]
    parent_id: Option<u64>,
    /// Comment count.
    #[serde(default)]
    comment_count: Option<u64>,
    /// Duration of animated content.
    #[serde(default)]
    duration: Option<f64>,
    /// Net score.
    #[serde(default)]
    score: Option<i64>,
    /// Deleted flag.
    #[serde(default)]
    is_deleted: String,
    /// Pending flag.
    #[serde(default)]
    is_pending: String,
    /// Flagged flag.
    #[serde(default)]
    is_flagged: String,
    /// Rating lock.
    #[serde(default)]
    is_rating_locked: String,
    /// Status lock.
    #[serde(default)]
    is_status_locked: String,
    /// Note lock.
    #[serde(default)]
    is_note_locked: String,
}

impl PostRow {
    /// Converts to the API payload shape, or `None` without a valid creation time.
    fn into_payload(self) -> Option<PostPayload> {
        let created_at = parse_timestamp(&self.created_at)?;
        let names: Vec<String> = self.tag_string.split_whitespace().map(str::to_string).collect();
        Some(PostPayload {
            id: self.id,
            created_at,
            updated_at: self.updated_at.as_deref().and_then(parse_timestamp),
            file: FilePayload {
                width: self.image_width.unwrap_or_default(),
                height: self.image_height.unwrap_or_default(),
                ext: self.file_ext,
                size: self.file_size.unwrap_or_default(),
                md5: self.md5.filter(|m| !m.is_empty()),
            },
            score: ScorePayload {
                total: self.score.unwrap_or_default(),
            },
            tags: BTreeMap::from([("all".to_string(), names)]),
            rating: self.rating,
            fav_count: self.fav_count.unwrap_or_default(),
            comment_count: self.comment_count.unwrap_or_default(),
            sources: self.source.lines().map(str::to_string).collect(),
            relationships: RelationshipsPayload {
                parent_id: self.parent_id,
                children: Vec::new(),
            },
            flags: FlagsPayload {
                pending: flag(&self.is_pending),
                flagged: flag(&self.is_flagged),
                note_locked: flag(&self.is_note_locked),
                status_locked: flag(&self.is_status_locked),
                rating_locked: flag(&self.is_rating_locked),
                deleted: flag(&self.is_deleted),
            },
            uploader_id: self.uploader_id,
            approver_id: self.approver_id,
            duration: self.duration,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_follow_the_export_layout() {
        let date = NaiveDate::from_ymd_opt(2024, 3, 9).unwrap();
        assert_eq!(
            export_names(date),
            [
                "tags-2024-03-09.csv.gz".to_string(),
                "tag_aliases-2024-03-09.csv.gz".to_string(),
                "posts-2024-03-09.csv.gz".to_string(),
            ]
        );
    }

    #[test]
    fn export_timestamps_are_utc() {
        let parsed = parse_timestamp("2024-03-09 12:30:45.123").unwrap();
        assert_eq!(parsed.to_rfc3339(), "2024-03-09T12:30:45.123+00:00");
        let whole = parse_timestamp("2024-03-09 12:30:45").unwrap();
        assert_eq!(whole.timestamp(), parsed.timestamp());
        assert!(parse_timestamp("").is_none());
        assert!(parse_timestamp("yesterday").is_none());
    }

    #[test]
    fn post_rows_become_payloads() {
        let row = PostRow {
            id: 7,
            uploader_id: Some(3),
            approver_id: None,
            created_at: "2024-03-09 12:00:00".into(),
            updated_at: Some(String::new()),
            md5: Some("abc".into()),
            source: "https://a.example/1\nhttps://b.example/2\n".into(),
            rating: "s".into(),
            image_width: Some(10),
            image_height: Some(20),
            tag_string: "wolf  blue_eyes".into(),
            fav_count: None,
            file_ext: "png".into(),
            file_size: Some(99),
            parent_id: Some(2),
            comment_count: Some(1),
            duration: None,
            score: Some(-4),
            is_deleted: "f".into(),
            is_pending: "t".into(),
            is_flagged: "f".into(),
            is_rating_locked: "f".into(),
            is_status_locked: "f".into(),
            is_note_locked: "f".into(),
        };
        let post = row.into_payload().unwrap();
        assert_eq!(post.tag_names().collect::<Vec<_>>(), vec!["wolf", "blue_eyes"]);
        assert_eq!(post.sources.len(), 2);
        assert_eq!(post.updated_at, None);
        assert_eq!(post.changed_at(), post.created_at);
        assert_eq!(post.relationships.parent_id, Some(2));
        assert!(post.flags.pending);
        assert!(!post.flags.deleted);
        assert_eq!(post.score.total, -4);
    }
}
