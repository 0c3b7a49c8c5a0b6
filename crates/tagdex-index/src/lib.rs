//! Tantivy-backed storage and search for tagdex.
//!
//! This crate owns everything that lives in the data directory:
//! - The record index, one Tantivy document per record
//! - The tag directory with aliases and implications
//! - Deferred parent/child links for parents not yet indexed
//! - Failed write batches kept for offline inspection
//!
//! It also executes compiled queries with cursor or page-number pagination.
//!
//! # Example
//!
//! ```no_run
//! use tagdex_index::{RecordIndex, SearchRequest};
//! use tagdex_query::{CompileOptions, QueryCompiler, RankingPlanner, Resolutions, parse};
//!
//! let index = RecordIndex::open("./data/index".as_ref()).unwrap();
//! let parsed = parse("rating:s order:score").unwrap();
//! let request = SearchRequest {
//!     query: QueryCompiler::new().compile(&parsed, &Resolutions::new(), &CompileOptions::default()),
//!     plan: RankingPlanner::default().plan(parsed.order(), false, chrono::Utc::now()),
//!     limit: 20,
//!     cursor: None,
//!     max_offset: 10_000,
//! };
//! let page = index.search(&request).unwrap();
//! println!("{} records", page.records.len());
//! ```

#![warn(missing_docs)]

mod directory;
mod document;
mod error;
mod failures;
mod hanging;
mod persist;
mod schema;
mod search;
mod store;
mod translate;
mod view;

pub use directory::{TagChange, TagDirectory};
pub use error::IndexError;
pub use failures::{FailedBatch, FailedBatchLog};
pub use hanging::HangingStore;
pub use schema::IndexSchema;
pub use search::{Cursor, SearchPage, SearchRequest, SortKey, page_offset};
pub use store::{BatchReport, DocumentFailure, RecordIndex};
pub use view::RecordView;
