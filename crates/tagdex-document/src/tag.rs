//! Tag taxonomy: categories, tags, aliases and implications.

use std::{fmt, str::FromStr};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::DocumentError;

/// Category a tag belongs to.
///
/// The numeric codes match the upstream catalog and double as bucket indexes on a record.
/// Code 2 is unused upstream, which is why records carry nine buckets for eight categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TagCategory {
    /// General descriptive tags.
    General,
    /// Creator of the content.
    Artist,
    /// Franchise or owner of the depicted property.
    Copyright,
    /// Named characters.
    Character,
    /// Depicted species.
    Species,
    /// Tags flagged as invalid.
    Invalid,
    /// Tags describing the file rather than its content.
    Meta,
    /// Background lore tags.
    Lore,
}

impl TagCategory {
    /// All categories in bucket order.
    pub const ALL: [Self; 8] = [
        Self::General,
        Self::Artist,
        Self::Copyright,
        Self::Character,
        Self::Species,
        Self::Invalid,
        Self::Meta,
        Self::Lore,
    ];

    /// Decodes an upstream category code.
    pub fn from_code(code: u8) -> Result<Self, DocumentError> {
        match code {
            0 => Ok(Self::General),
            1 => Ok(Self::Artist),
            3 => Ok(Self::Copyright),
            4 => Ok(Self::Character),
            5 => Ok(Self::Species),
            6 => Ok(Self::Invalid),
            7 => Ok(Self::Meta),
            8 => Ok(Self::Lore),
            _ => Err(DocumentError::UnknownCategory { code }),
        }
    }

    /// Upstream category code.
    pub fn code(self) -> u8 {
        match self {
            Self::General => 0,
            Self::Artist => 1,
            Self::Copyright => 3,
            Self::Character => 4,
            Self::Species => 5,
            Self::Invalid => 6,
            Self::Meta => 7,
            Self::Lore => 8,
        }
    }

    /// Index of this category's bucket on a record.
    pub fn bucket(self) -> usize {
        usize::from(self.code())
    }

    /// Lowercase name used in JSON output and upstream post payloads.
    pub fn name(self) -> &'static str {
        match self {
            Self::General => "general",
            Self::Artist => "artist",
            Self::Copyright => "copyright",
            Self::Character => "character",
            Self::Species => "species",
            Self::Invalid => "invalid",
            Self::Meta => "meta",
            Self::Lore => "lore",
        }
    }
}

impl fmt::Display for TagCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for TagCategory {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|c| c.name() == s)
            .ok_or_else(|| format!("unknown tag category: {s}"))
    }
}

/// A canonical tag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tag {
    /// Upstream tag id.
    pub id: u64,
    /// Canonical name, lowercase with underscores.
    pub name: String,
    /// Category the tag is filed under.
    pub category: TagCategory,
    /// Number of indexed records carrying this tag.
    #[serde(default)]
    pub post_count: u64,
    /// Last upstream modification time, when known.
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

impl Tag {
    /// Creates a tag with no recorded usage.
    pub fn new(id: u64, name: impl Into<String>, category: TagCategory) -> Self {
        Self {
            id,
            name: name.into(),
            category,
            post_count: 0,
            updated_at: None,
        }
    }

    /// Applies a signed usage delta, saturating at zero.
    pub fn adjust_post_count(&mut self, delta: i64) {
        self.post_count = self.post_count.saturating_add_signed(delta);
    }
}

/// A deprecated tag name that rewrites to a canonical tag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagAlias {
    /// Upstream alias id.
    pub id: u64,
    /// The deprecated name.
    pub antecedent_name: String,
    /// Id of the canonical tag.
    pub consequent_id: u64,
    /// Last upstream modification time, when known.
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

/// A directed edge stating that one tag implies another.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagImplication {
    /// Upstream implication id.
    pub id: u64,
    /// The implying (child) tag.
    pub antecedent_id: u64,
    /// The implied (parent) tag.
    pub consequent_id: u64,
    /// Last upstream modification time, when known.
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

impl TagImplication {
    /// Builds an implication, returning `None` for a self-loop.
    pub fn new(
        id: u64,
        antecedent_id: u64,
        consequent_id: u64,
        updated_at: Option<DateTime<Utc>>,
    ) -> Option<Self> {
        (antecedent_id != consequent_id).then_some(Self {
            id,
            antecedent_id,
            consequent_id,
            updated_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn category_codes_round_trip() {
        for category in TagCategory::ALL {
            assert_eq!(TagCategory::from_code(category.code()), Ok(category));
        }
    }

    #[test]
    fn unused_code_is_rejected() {
        assert_eq!(
            TagCategory::from_code(2),
            Err(DocumentError::UnknownCategory { code: 2 })
        );
        assert!(TagCategory::from_code(9).is_err());
    }

    #[test]
    fn category_parses_from_name() {
        assert_eq!("species".parse::<TagCategory>(), Ok(TagCategory::Species));
        assert!("people".parse::<TagCategory>().is_err());
    }

    #[test]
    fn self_loop_implication_is_dropped() {
        assert!(TagImplication::new(1, 5, 5, None).is_none());
        assert!(TagImplication::new(1, 5, 6, None).is_some());
    }

    #[test]
    fn post_count_saturates_at_zero() {
        let mut tag = Tag::new(1, "blue_eyes", TagCategory::General);
        tag.adjust_post_count(2);
        tag.adjust_post_count(-5);
        assert_eq!(tag.post_count, 0);
    }
}
