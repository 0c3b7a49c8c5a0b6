//! Data model for tagdex.
//!
//! Records are catalog entries carrying a rating, file metadata, status flags and tags
//! bucketed by category. Tags, aliases and implications make up the taxonomy the query
//! language resolves against.

#![warn(missing_docs)]

mod assets;
mod error;
mod record;
mod relationship;
mod tag;

pub use assets::AssetUrls;
pub use error::DocumentError;
pub use record::{BUCKET_COUNT, Rating, Record, RecordFlags, TagBuckets};
pub use relationship::HangingRelationship;
pub use tag::{Tag, TagAlias, TagCategory, TagImplication};
