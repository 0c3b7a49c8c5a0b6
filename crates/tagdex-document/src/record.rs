//! Catalog records.

use std::{collections::BTreeSet, fmt, str::FromStr};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{DocumentError, TagCategory};

/// Number of category buckets on a record, one per upstream category code.
pub const BUCKET_COUNT: usize = 9;

/// Content rating.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Rating {
    /// Safe for work.
    #[serde(rename = "s")]
    Safe,
    /// Questionable.
    #[serde(rename = "q")]
    Questionable,
    /// Explicit.
    #[serde(rename = "e")]
    Explicit,
}

impl Rating {
    /// Single-letter code stored in the index.
    pub fn code(self) -> &'static str {
        match self {
            Self::Safe => "s",
            Self::Questionable => "q",
            Self::Explicit => "e",
        }
    }
}

impl fmt::Display for Rating {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for Rating {
    type Err = DocumentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "s" | "safe" => Ok(Self::Safe),
            "q" | "questionable" => Ok(Self::Questionable),
            "e" | "explicit" => Ok(Self::Explicit),
            _ => Err(DocumentError::UnknownRating {
                value: s.to_string(),
            }),
        }
    }
}

/// Moderation and lock flags.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecordFlags {
    /// Removed upstream; kept indexed but hidden by default.
    pub deleted: bool,
    /// Awaiting approval.
    pub pending: bool,
    /// Flagged for review.
    pub flagged: bool,
    /// Rating may not be changed.
    pub rating_locked: bool,
    /// Status may not be changed.
    pub status_locked: bool,
    /// Notes may not be changed.
    pub note_locked: bool,
}

/// Tag ids grouped into one ordered bucket per category code.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TagBuckets([Vec<u64>; BUCKET_COUNT]);

impl TagBuckets {
    /// Creates empty buckets.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a tag to its category bucket unless it is already present there.
    pub fn insert(&mut self, category: TagCategory, tag_id: u64) {
        let bucket = &mut self.0[category.bucket()];
        if !bucket.contains(&tag_id) {
            bucket.push(tag_id);
        }
    }

    /// Tag ids in the given category, in insertion order.
    pub fn get(&self, category: TagCategory) -> &[u64] {
        &self.0[category.bucket()]
    }

    /// Number of tags in the given category.
    pub fn count(&self, category: TagCategory) -> usize {
        self.0[category.bucket()].len()
    }

    /// Iterates over every bucket as `(bucket index, ids)`.
    pub fn iter(&self) -> impl Iterator<Item = (usize, &[u64])> {
        self.0.iter().enumerate().map(|(i, ids)| (i, ids.as_slice()))
    }

    /// The category bucket currently holding `tag_id`, if any.
    pub fn category_of(&self, tag_id: u64) -> Option<TagCategory> {
        TagCategory::ALL
            .into_iter()
            .find(|c| self.0[c.bucket()].contains(&tag_id))
    }

    /// Moves a tag into the `to` bucket, removing it from every other bucket.
    ///
    /// Returns `false` when the record does not carry the tag at all.
    pub fn move_tag(&mut self, tag_id: u64, to: TagCategory) -> bool {
        let mut found = false;
        for (index, bucket) in self.0.iter_mut().enumerate() {
            if index == to.bucket() {
                continue;
            }
            let before = bucket.len();
            bucket.retain(|id| *id != tag_id);
            found |= bucket.len() != before;
        }
        if found || self.0[to.bucket()].contains(&tag_id) {
            self.insert(to, tag_id);
            return true;
        }
        false
    }

    /// Union of all buckets, deduplicated.
    pub fn flattened(&self) -> BTreeSet<u64> {
        self.0.iter().flatten().copied().collect()
    }
}

/// A catalog entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    /// Upstream record id.
    pub id: u64,
    /// Tags grouped by category.
    pub tags: TagBuckets,
    /// Uploading user.
    pub uploader_id: u64,
    /// Approving moderator, if approved.
    pub approver_id: Option<u64>,
    /// Creation time upstream.
    pub created_at: DateTime<Utc>,
    /// Last modification time upstream.
    pub updated_at: DateTime<Utc>,
    /// MD5 of the file contents, lowercase hex.
    pub content_hash: String,
    /// Declared origin URLs.
    pub sources: Vec<String>,
    /// Content rating.
    pub rating: Rating,
    /// Image width in pixels.
    pub width: u64,
    /// Image height in pixels.
    pub height: u64,
    /// Duration in seconds for animated content.
    pub duration: f64,
    /// Number of users who favorited the record.
    pub favorite_count: u64,
    /// Net vote score.
    pub score: i64,
    /// Declared parent record.
    pub parent_id: Option<u64>,
    /// Records naming this one as parent, maintained by relationship repair.
    #[serde(default)]
    pub children: BTreeSet<u64>,
    /// File extension.
    pub file_type: String,
    /// File size in bytes.
    pub file_size: u64,
    /// Number of comments.
    pub comment_count: u64,
    /// Moderation and lock flags.
    #[serde(default)]
    pub flags: RecordFlags,
}

impl Record {
    /// Every tag id on the record, deduplicated.
    pub fn flattened_tags(&self) -> BTreeSet<u64> {
        self.tags.flattened()
    }

    /// Width over height, rounded to two decimals. Zero when height is unknown.
    pub fn ratio(&self) -> f64 {
        if self.height == 0 {
            return 0.0;
        }
        let ratio = self.width as f64 / self.height as f64;
        (ratio * 100.0).round() / 100.0
    }

    /// Pixel count in millions.
    pub fn megapixels(&self) -> f64 {
        (self.width * self.height) as f64 / 1_000_000.0
    }
}
