//! Upstream payloads to records.

use std::{collections::BTreeSet, str::FromStr};

use futures::{StreamExt, TryStreamExt, stream};
use tagdex_document::{Rating, Record, RecordFlags, TagBuckets};
use tracing::warn;

use crate::{SyncError, TagResolver, upstream::PostPayload};

/// Converts payloads to records, resolving up to `concurrency` records at a time.
///
/// Order is preserved. Payloads that cannot be represented are dropped with a warning.
pub(crate) async fn to_records(
    resolver: &TagResolver,
    posts: Vec<PostPayload>,
    concurrency: usize,
) -> Result<Vec<Record>, SyncError> {
    let records: Vec<Option<Record>> = stream::iter(posts)
        .map(|post| to_record(resolver, post))
        .buffered(concurrency.max(1))
        .try_collect()
        .await?;
    Ok(records.into_iter().flatten().collect())
}

/// Converts one payload. Tags are filed under the category the directory knows them by.
pub(crate) async fn to_record(
    resolver: &TagResolver,
    post: PostPayload,
) -> Result<Option<Record>, SyncError> {
    let Ok(rating) = Rating::from_str(&post.rating) else {
        warn!(post_id = post.id, rating = %post.rating, "unknown rating, skipping record");
        return Ok(None);
    };

    let mut tags = TagBuckets::new();
    for name in post.tag_names() {
        let name = name.trim();
        if name.is_empty() {
            continue;
        }
        match resolver.tag(name).await? {
            Some(tag) => tags.insert(tag.category, tag.id),
            None => warn!(post_id = post.id, tag = name, "unable to resolve tag"),
        }
    }

    let updated_at = post.changed_at();
    let flags = post.flags;
    Ok(Some(Record {
        id: post.id,
        tags,
        uploader_id: post.uploader_id.unwrap_or_default(),
        approver_id: post.approver_id,
        created_at: post.created_at,
        updated_at,
        content_hash: post.file.md5.unwrap_or_default(),
        sources: post
            .sources
            .into_iter()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect(),
        rating,
        width: post.file.width,
        height: post.file.height,
        duration: post.duration.filter(|d| d.is_finite()).unwrap_or_default(),
        favorite_count: post.fav_count,
        score: post.score.total,
        parent_id: post.relationships.parent_id,
        children: post
            .relationships
            .children
            .into_iter()
            .collect::<BTreeSet<u64>>(),
        file_type: post.file.ext,
        file_size: post.file.size,
        comment_count: post.comment_count,
        flags: RecordFlags {
            deleted: flags.deleted,
            pending: flags.pending,
            flagged: flags.flagged,
            rating_locked: flags.rating_locked,
            status_locked: flags.status_locked,
            note_locked: flags.note_locked,
        },
    }))
}
