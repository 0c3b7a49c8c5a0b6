//! Presentation form of a record.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tagdex_document::{AssetUrls, Rating, Record, RecordFlags, TagCategory};

use crate::TagDirectory;

/// A record with tag ids replaced by names and asset URLs filled in.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecordView {
    /// Upstream record id.
    pub id: u64,
    /// Tag names per category name. Ids the directory does not know are left out.
    pub tags: BTreeMap<&'static str, Vec<String>>,
    /// Content rating.
    pub rating: Rating,
    /// Net vote score.
    pub score: i64,
    /// Favorite count.
    pub favorite_count: u64,
    /// Comment count.
    pub comment_count: u64,
    /// Width in pixels.
    pub width: u64,
    /// Height in pixels.
    pub height: u64,
    /// Duration in seconds.
    pub duration: f64,
    /// File extension.
    pub file_type: String,
    /// File size in bytes.
    pub file_size: u64,
    /// MD5 of the file.
    pub md5: String,
    /// Declared sources.
    pub sources: Vec<String>,
    /// Uploading user.
    pub uploader_id: u64,
    /// Approving moderator.
    pub approver_id: Option<u64>,
    /// Parent record.
    pub parent_id: Option<u64>,
    /// Child records.
    pub children: BTreeSet<u64>,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Last modification time.
    pub updated_at: DateTime<Utc>,
    /// Status and lock flags.
    pub flags: RecordFlags,
    /// Original file.
    pub file_url: String,
    /// Preview thumbnail.
    pub preview_url: String,
    /// Sample image.
    pub sample_url: String,
}

impl RecordView {
    /// Builds the view of `record`, naming tags through `directory`.
    pub fn new(record: Record, directory: &TagDirectory, asset_base: &str) -> Self {
        let mut tags = BTreeMap::new();
        for category in TagCategory::ALL {
            let names: Vec<String> = record
                .tags
                .get(category)
                .iter()
                .filter_map(|id| directory.tag(*id))
                .map(|tag| tag.name)
                .collect();
            if !names.is_empty() {
                tags.insert(category.name(), names);
            }
        }
        let urls = AssetUrls::derive(asset_base, &record.content_hash, &record.file_type);

        Self {
            id: record.id,
            tags,
            rating: record.rating,
            score: record.score,
            favorite_count: record.favorite_count,
            comment_count: record.comment_count,
            width: record.width,
            height: record.height,
            duration: record.duration,
            file_type: record.file_type,
            file_size: record.file_size,
            md5: record.content_hash,
            sources: record.sources,
            uploader_id: record.uploader_id,
            approver_id: record.approver_id,
            parent_id: record.parent_id,
            children: record.children,
            created_at: record.created_at,
            updated_at: record.updated_at,
            flags: record.flags,
            file_url: urls.file,
            preview_url: urls.preview,
            sample_url: urls.sample,
        }
    }
}

#[cfg(test)]
mod tests {
    use tagdex_document::{Tag, TagBuckets};

    use super::*;

    #[test]
    fn names_tags_and_derives_urls() {
        let directory = TagDirectory::in_memory();
        directory.upsert_tag(Tag::new(1, "blue_eyes", TagCategory::General));
        directory.upsert_tag(Tag::new(2, "someartist", TagCategory::Artist));

        let mut tags = TagBuckets::new();
        tags.insert(TagCategory::General, 1);
        tags.insert(TagCategory::Artist, 2);
        tags.insert(TagCategory::General, 99);
        let record = Record {
            id: 7,
            tags,
            uploader_id: 1,
            approver_id: None,
            created_at: DateTime::<Utc>::UNIX_EPOCH,
            updated_at: DateTime::<Utc>::UNIX_EPOCH,
            content_hash: "abcdef0123456789abcdef0123456789".into(),
            sources: vec![],
            rating: Rating::Safe,
            width: 10,
            height: 10,
            duration: 0.0,
            favorite_count: 0,
            score: 0,
            parent_id: None,
            children: BTreeSet::new(),
            file_type: "png".into(),
            file_size: 1,
            comment_count: 0,
            flags: RecordFlags::default(),
        };

        let view = RecordView::new(record, &directory, "https://cdn.test/data/");
        assert_eq!(view.tags["general"], vec!["blue_eyes".to_string()]);
        assert_eq!(view.tags["artist"], vec!["someartist".to_string()]);
        assert!(!view.tags.contains_key("species"));
        assert_eq!(
            view.file_url,
            "https://cdn.test/data/ab/cd/abcdef0123456789abcdef0123456789.png"
        );
        assert_eq!(
            view.preview_url,
            "https://cdn.test/data/preview/ab/cd/abcdef0123456789abcdef0123456789.jpg"
        );
        assert!(view.sample_url.contains("/sample/ab/cd/"));

        let json = serde_json::to_value(&view).unwrap();
        assert_eq!(json["md5"], "abcdef0123456789abcdef0123456789");
    }
}
