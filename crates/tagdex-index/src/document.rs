//! Conversion between records and Tantivy documents.

use tagdex_document::{Record, TagCategory};
use tantivy::{TantivyDocument, schema::Value};

use crate::{
    IndexError,
    schema::{IndexSchema, NONE_ID, signed},
};

/// Builds the indexed form of a record.
pub fn to_document(schema: &IndexSchema, record: &Record) -> Result<TantivyDocument, IndexError> {
    let json =
        serde_json::to_string(record).map_err(|e| IndexError::CorruptRecord(e.to_string()))?;
    let mut doc = TantivyDocument::new();

    doc.add_i64(schema.id, signed(record.id));
    let flattened = record.flattened_tags();
    for tag in &flattened {
        doc.add_u64(schema.tags, *tag);
    }
    doc.add_i64(schema.tag_count, signed(flattened.len() as u64));
    for category in TagCategory::ALL {
        doc.add_i64(
            schema.category_count(category),
            signed(record.tags.count(category) as u64),
        );
    }

    doc.add_i64(schema.score, record.score);
    doc.add_i64(schema.favorite_count, signed(record.favorite_count));
    doc.add_i64(schema.comment_count, signed(record.comment_count));
    doc.add_i64(schema.width, signed(record.width));
    doc.add_i64(schema.height, signed(record.height));
    doc.add_i64(schema.file_size, signed(record.file_size));
    doc.add_i64(schema.created_at, record.created_at.timestamp());
    doc.add_i64(schema.updated_at, record.updated_at.timestamp());
    doc.add_i64(schema.uploader_id, signed(record.uploader_id));
    doc.add_i64(
        schema.approver_id,
        record.approver_id.map_or(NONE_ID, signed),
    );
    doc.add_i64(schema.parent_id, record.parent_id.map_or(NONE_ID, signed));
    doc.add_i64(schema.children_count, signed(record.children.len() as u64));
    doc.add_i64(schema.source_count, signed(record.sources.len() as u64));

    doc.add_f64(schema.megapixels, record.megapixels());
    doc.add_f64(schema.ratio, record.ratio());
    doc.add_f64(schema.duration, record.duration);

    doc.add_text(schema.rating, record.rating.code());
    doc.add_text(schema.file_type, record.file_type.to_lowercase());
    doc.add_text(schema.md5, record.content_hash.to_lowercase());
    for source in &record.sources {
        doc.add_text(schema.sources, source.to_lowercase());
    }

    let flags = &record.flags;
    doc.add_bool(schema.deleted, flags.deleted);
    doc.add_bool(schema.pending, flags.pending);
    doc.add_bool(schema.flagged, flags.flagged);
    doc.add_bool(schema.rating_locked, flags.rating_locked);
    doc.add_bool(schema.note_locked, flags.note_locked);
    doc.add_bool(schema.status_locked, flags.status_locked);

    doc.add_text(schema.record, json);
    Ok(doc)
}

/// Decodes the stored record of a document.
pub fn from_document(schema: &IndexSchema, doc: &TantivyDocument) -> Result<Record, IndexError> {
    let json = doc
        .get_first(schema.record)
        .and_then(|v| v.as_str())
        .ok_or_else(|| IndexError::CorruptRecord("document has no stored record".into()))?;
    serde_json::from_str(json).map_err(|e| IndexError::CorruptRecord(e.to_string()))
}

#[cfg(test)]
mod test {
    use std::collections::BTreeSet;

    use chrono::DateTime;
    use tagdex_document::{Rating, RecordFlags, TagBuckets};

    use super::*;

    #[test]
    fn stored_record_round_trips() {
        let schema = IndexSchema::new();
        let mut tags = TagBuckets::new();
        tags.insert(TagCategory::General, 4);
        let record = Record {
            id: 12,
            tags,
            uploader_id: 1,
            approver_id: Some(2),
            created_at: DateTime::UNIX_EPOCH,
            updated_at: DateTime::UNIX_EPOCH,
            content_hash: "ABCDEF".into(),
            sources: vec!["https://Example.com/a".into()],
            rating: Rating::Questionable,
            width: 10,
            height: 5,
            duration: 0.0,
            favorite_count: 3,
            score: -2,
            parent_id: None,
            children: BTreeSet::from([13]),
            file_type: "PNG".into(),
            file_size: 100,
            comment_count: 0,
            flags: RecordFlags::default(),
        };

        let doc = to_document(&schema, &record).unwrap();
        assert_eq!(from_document(&schema, &doc).unwrap(), record);
        assert_eq!(
            doc.get_first(schema.md5).and_then(|v| v.as_str()),
            Some("abcdef")
        );
        assert_eq!(
            doc.get_first(schema.parent_id).and_then(|v| v.as_i64()),
            Some(NONE_ID)
        );
    }

    #[test]
    fn missing_record_is_corrupt() {
        let schema = IndexSchema::new();
        let doc = TantivyDocument::new();
        assert!(matches!(
            from_document(&schema, &doc),
            Err(IndexError::CorruptRecord(_))
        ));
    }
}
