//! Index schema definition for the tagdex record index.
//!
//! Every integer attribute is indexed as `i64` so that one range path serves all of them,
//! and the sortable ones are also fast fields. Text attributes use the raw tokenizer and
//! are lowercased on the way in. The full record is stored as JSON in `record`.

use tagdex_document::TagCategory;
use tagdex_query::{FloatField, IntField, SortField};
use tantivy::schema::{FAST, Field, INDEXED, STORED, STRING, Schema};

/// Value stored in `parent_id` and `approver_id` when the record has none.
pub const NONE_ID: i64 = 0;

/// Handles to all fields in the index schema.
#[derive(Debug, Clone)]
pub struct IndexSchema {
    /// The underlying Tantivy schema.
    schema: Schema,
    /// Record id.
    pub id: Field,
    /// Every tag id on the record (multi-valued).
    pub tags: Field,
    /// Number of distinct tags.
    pub tag_count: Field,
    /// Per-category tag counts, in `TagCategory::ALL` order.
    category_counts: [Field; 8],
    /// Net vote score.
    pub score: Field,
    /// Favorite count.
    pub favorite_count: Field,
    /// Comment count.
    pub comment_count: Field,
    /// Width in pixels.
    pub width: Field,
    /// Height in pixels.
    pub height: Field,
    /// File size in bytes.
    pub file_size: Field,
    /// Creation time, unix seconds.
    pub created_at: Field,
    /// Last update time, unix seconds.
    pub updated_at: Field,
    /// Uploading user.
    pub uploader_id: Field,
    /// Approving user, `NONE_ID` when unapproved.
    pub approver_id: Field,
    /// Declared parent, `NONE_ID` when absent.
    pub parent_id: Field,
    /// Number of known children.
    pub children_count: Field,
    /// Number of sources.
    pub source_count: Field,
    /// Megapixels.
    pub megapixels: Field,
    /// Width over height, two decimals.
    pub ratio: Field,
    /// Duration in seconds.
    pub duration: Field,
    /// Rating code.
    pub rating: Field,
    /// File extension.
    pub file_type: Field,
    /// Content hash.
    pub md5: Field,
    /// Source URLs (multi-valued).
    pub sources: Field,
    /// Deleted flag.
    pub deleted: Field,
    /// Pending flag.
    pub pending: Field,
    /// Flagged flag.
    pub flagged: Field,
    /// Rating lock.
    pub rating_locked: Field,
    /// Note lock.
    pub note_locked: Field,
    /// Status lock.
    pub status_locked: Field,
    /// Stored JSON of the whole record.
    pub record: Field,
}

impl IndexSchema {
    /// Creates a new index schema with all fields configured.
    pub fn new() -> Self {
        let mut builder = Schema::builder();

        let id = builder.add_i64_field("id", INDEXED | FAST);
        let tags = builder.add_u64_field("tags", INDEXED);
        let tag_count = builder.add_i64_field("tag_count", INDEXED | FAST);
        let category_counts =
            TagCategory::ALL.map(|c| builder.add_i64_field(&category_count_name(c), INDEXED));

        let score = builder.add_i64_field("score", INDEXED | FAST);
        let favorite_count = builder.add_i64_field("favorite_count", INDEXED | FAST);
        let comment_count = builder.add_i64_field("comment_count", INDEXED | FAST);
        let width = builder.add_i64_field("width", INDEXED | FAST);
        let height = builder.add_i64_field("height", INDEXED | FAST);
        let file_size = builder.add_i64_field("file_size", INDEXED | FAST);
        let created_at = builder.add_i64_field("created_at", INDEXED | FAST);
        let updated_at = builder.add_i64_field("updated_at", INDEXED | FAST);
        let uploader_id = builder.add_i64_field("uploader_id", INDEXED);
        let approver_id = builder.add_i64_field("approver_id", INDEXED);
        let parent_id = builder.add_i64_field("parent_id", INDEXED);
        let children_count = builder.add_i64_field("children_count", INDEXED);
        let source_count = builder.add_i64_field("source_count", INDEXED);

        let megapixels = builder.add_f64_field("megapixels", INDEXED | FAST);
        let ratio = builder.add_f64_field("ratio", INDEXED | FAST);
        let duration = builder.add_f64_field("duration", INDEXED | FAST);

        let rating = builder.add_text_field("rating", STRING);
        let file_type = builder.add_text_field("file_type", STRING);
        let md5 = builder.add_text_field("md5", STRING);
        let sources = builder.add_text_field("sources", STRING);

        let deleted = builder.add_bool_field("deleted", INDEXED);
        let pending = builder.add_bool_field("pending", INDEXED);
        let flagged = builder.add_bool_field("flagged", INDEXED);
        let rating_locked = builder.add_bool_field("rating_locked", INDEXED);
        let note_locked = builder.add_bool_field("note_locked", INDEXED);
        let status_locked = builder.add_bool_field("status_locked", INDEXED);

        let record = builder.add_text_field("record", STORED);

        Self {
            schema: builder.build(),
            id,
            tags,
            tag_count,
            category_counts,
            score,
            favorite_count,
            comment_count,
            width,
            height,
            file_size,
            created_at,
            updated_at,
            uploader_id,
            approver_id,
            parent_id,
            children_count,
            source_count,
            megapixels,
            ratio,
            duration,
            rating,
            file_type,
            md5,
            sources,
            deleted,
            pending,
            flagged,
            rating_locked,
            note_locked,
            status_locked,
            record,
        }
    }

    /// Returns a reference to the underlying Tantivy schema.
    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    /// Field holding the tag count of one category.
    pub fn category_count(&self, category: TagCategory) -> Field {
        let position = TagCategory::ALL
            .iter()
            .position(|c| *c == category)
            .unwrap_or_default();
        self.category_counts[position]
    }

    /// Field backing an integer predicate.
    pub fn int_field(&self, field: IntField) -> Field {
        match field {
            IntField::Id => self.id,
            IntField::Score => self.score,
            IntField::FavoriteCount => self.favorite_count,
            IntField::CommentCount => self.comment_count,
            IntField::TagCount => self.tag_count,
            IntField::CategoryCount(category) => self.category_count(category),
            IntField::Width => self.width,
            IntField::Height => self.height,
            IntField::FileSize => self.file_size,
            IntField::CreatedAt => self.created_at,
            IntField::UploaderId => self.uploader_id,
            IntField::ApproverId => self.approver_id,
        }
    }

    /// Field backing a float predicate.
    pub fn float_field(&self, field: FloatField) -> Field {
        match field {
            FloatField::Megapixels => self.megapixels,
            FloatField::Ratio => self.ratio,
            FloatField::Duration => self.duration,
        }
    }

    /// Name of a field as registered in the schema.
    pub fn name(&self, field: Field) -> &str {
        self.schema.get_field_name(field)
    }
}

impl Default for IndexSchema {
    fn default() -> Self {
        Self::new()
    }
}

/// Fast column backing a sort key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortColumn {
    /// An `i64` fast field.
    Int(&'static str),
    /// An `f64` fast field.
    Float(&'static str),
}

/// Maps a sort field onto its fast column.
pub fn sort_column(field: SortField) -> SortColumn {
    match field {
        SortField::Id => SortColumn::Int("id"),
        SortField::Score => SortColumn::Int("score"),
        SortField::FavoriteCount => SortColumn::Int("favorite_count"),
        SortField::CommentCount => SortColumn::Int("comment_count"),
        SortField::TagCount => SortColumn::Int("tag_count"),
        SortField::FileSize => SortColumn::Int("file_size"),
        SortField::CreatedAt => SortColumn::Int("created_at"),
        SortField::UpdatedAt => SortColumn::Int("updated_at"),
        SortField::Width => SortColumn::Int("width"),
        SortField::Height => SortColumn::Int("height"),
        SortField::Megapixels => SortColumn::Float("megapixels"),
        SortField::Duration => SortColumn::Float("duration"),
    }
}

/// Schema name of a per-category count field.
fn category_count_name(category: TagCategory) -> String {
    format!("{}_tags", category.name())
}

/// Converts an unsigned attribute into its indexed form.
pub fn signed(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

#[cfg(test)]
mod test {
    use tantivy::schema::FieldType;

    use super::*;

    #[test]
    fn schema_has_all_fields() {
        let schema = IndexSchema::new();
        let tantivy_schema = schema.schema();

        for name in [
            "id",
            "tags",
            "tag_count",
            "general_tags",
            "lore_tags",
            "score",
            "created_at",
            "megapixels",
            "rating",
            "md5",
            "sources",
            "deleted",
            "record",
        ] {
            assert!(tantivy_schema.get_field(name).is_ok(), "missing {name}");
        }
    }

    #[test]
    fn sort_columns_are_fast() {
        let schema = IndexSchema::new();
        for field in [
            SortField::Id,
            SortField::Score,
            SortField::UpdatedAt,
            SortField::Megapixels,
            SortField::Duration,
        ] {
            let name = match sort_column(field) {
                SortColumn::Int(name) | SortColumn::Float(name) => name,
            };
            let handle = schema.schema().get_field(name).unwrap();
            assert!(schema.schema().get_field_entry(handle).is_fast(), "{name}");
        }
    }

    #[test]
    fn record_is_stored_only() {
        let schema = IndexSchema::new();
        let entry = schema.schema().get_field_entry(schema.record);
        assert!(entry.is_stored());
        assert!(!entry.is_indexed());
    }

    #[test]
    fn text_filters_use_raw_tokenizer() {
        let schema = IndexSchema::new();
        for field in [schema.rating, schema.md5, schema.sources] {
            let FieldType::Str(opts) = schema.schema().get_field_entry(field).field_type() else {
                panic!("expected text field");
            };
            assert_eq!(opts.get_indexing_options().unwrap().tokenizer(), "raw");
        }
    }

    #[test]
    fn category_counts_are_distinct() {
        let schema = IndexSchema::new();
        assert_eq!(schema.name(schema.category_count(TagCategory::Species)), "species_tags");
        assert_ne!(
            schema.category_count(TagCategory::General),
            schema.category_count(TagCategory::Artist)
        );
        assert_eq!(schema.name(schema.int_field(IntField::Score)), "score");
    }

    #[test]
    fn signed_saturates() {
        assert_eq!(signed(5), 5);
        assert_eq!(signed(u64::MAX), i64::MAX);
    }
}
