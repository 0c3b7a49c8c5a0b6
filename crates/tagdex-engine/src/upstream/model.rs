//! Upstream JSON payloads.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tagdex_document::{Tag, TagCategory};

/// A record as the catalog API returns it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PostPayload {
    /// Record id.
    pub id: u64,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Last modification time, missing on records never edited.
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
    /// File metadata.
    pub file: FilePayload,
    /// Vote totals.
    pub score: ScorePayload,
    /// Tag names keyed by category name.
    pub tags: BTreeMap<String, Vec<String>>,
    /// Rating code.
    pub rating: String,
    /// Favorite count.
    #[serde(default)]
    pub fav_count: u64,
    /// Comment count.
    #[serde(default)]
    pub comment_count: u64,
    /// Declared sources.
    #[serde(default)]
    pub sources: Vec<String>,
    /// Parent and children.
    #[serde(default)]
    pub relationships: RelationshipsPayload,
    /// Status and lock flags.
    #[serde(default)]
    pub flags: FlagsPayload,
    /// Uploading user.
    #[serde(default)]
    pub uploader_id: Option<u64>,
    /// Approving moderator.
    #[serde(default)]
    pub approver_id: Option<u64>,
    /// Duration of animated content.
    #[serde(default)]
    pub duration: Option<f64>,
}

impl PostPayload {
    /// Modification time, falling back to creation time.
    pub fn changed_at(&self) -> DateTime<Utc> {
        self.updated_at.unwrap_or(self.created_at)
    }

    /// Every tag name on the record.
    pub fn tag_names(&self) -> impl Iterator<Item = &str> {
        self.tags.values().flatten().map(String::as_str)
    }
}

/// File metadata of a record.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FilePayload {
    /// Width in pixels.
    #[serde(default)]
    pub width: u64,
    /// Height in pixels.
    #[serde(default)]
    pub height: u64,
    /// File extension.
    #[serde(default)]
    pub ext: String,
    /// Size in bytes.
    #[serde(default)]
    pub size: u64,
    /// MD5 of the contents.
    #[serde(default)]
    pub md5: Option<String>,
}

/// Vote totals.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScorePayload {
    /// Net score.
    pub total: i64,
}

/// Parent and children of a record.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelationshipsPayload {
    /// Declared parent.
    #[serde(default)]
    pub parent_id: Option<u64>,
    /// Children as the catalog sees them.
    #[serde(default)]
    pub children: Vec<u64>,
}

/// Status and lock flags of a record.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FlagsPayload {
    /// Awaiting approval.
    pub pending: bool,
    /// Flagged for review.
    pub flagged: bool,
    /// Notes locked.
    pub note_locked: bool,
    /// Status locked.
    pub status_locked: bool,
    /// Rating locked.
    pub rating_locked: bool,
    /// Deleted.
    pub deleted: bool,
}

/// Envelope of the record listing endpoint.
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct PostsEnvelope {
    /// Records on the page.
    pub posts: Vec<PostPayload>,
}

/// A tag as the catalog API returns it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagPayload {
    /// Tag id.
    pub id: u64,
    /// Tag name.
    pub name: String,
    /// Upstream category code.
    pub category: u8,
    /// Usage count upstream.
    #[serde(default)]
    pub post_count: u64,
    /// Last modification time.
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

impl TagPayload {
    /// Converts to a tag, or `None` when the category code is not one we file.
    ///
    /// The usage count starts at zero; it counts indexed records, not upstream ones.
    pub fn to_tag(&self) -> Option<Tag> {
        let category = TagCategory::from_code(self.category).ok()?;
        Some(Tag {
            id: self.id,
            name: self.name.to_lowercase(),
            category,
            post_count: 0,
            updated_at: self.updated_at,
        })
    }
}

/// The tag listing answers `{"tags": []}` instead of `[]` when nothing matched.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub(crate) enum TagList {
    /// Matching tags.
    Tags(Vec<TagPayload>),
    /// No matches.
    Empty {
        /// Always empty.
        #[allow(dead_code)]
        tags: Vec<serde_json::Value>,
    },
}

impl TagList {
    /// The matching tags.
    pub(crate) fn into_tags(self) -> Vec<TagPayload> {
        match self {
            Self::Tags(tags) => tags,
            Self::Empty { .. } => Vec::new(),
        }
    }
}

/// An alias or implication as the catalog API returns it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AliasPayload {
    /// Alias or implication id.
    pub id: u64,
    /// Deprecated or implying tag name.
    pub antecedent_name: String,
    /// Canonical or implied tag name.
    pub consequent_name: String,
    /// Lifecycle status; only `active` entries are kept.
    pub status: String,
    /// Last modification time.
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

impl AliasPayload {
    /// Returns true for entries in force.
    pub fn is_active(&self) -> bool {
        self.status == "active"
    }
}
