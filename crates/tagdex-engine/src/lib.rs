//! Async services of tagdex.
//!
//! This crate connects the query language and the index to the upstream catalog:
//! - [`Upstream`] access over HTTP, paced by a global [`RateLimiter`]
//! - [`TagResolver`], which resolves names through aliases, the local directory and
//!   cached lazy upstream lookups
//! - [`SearchService`] and [`TagService`], the read side
//! - [`SyncEngine`], which keeps the catalog current pass by pass and can rebuild it from
//!   the daily database export
//! - [`ProvenanceRegistry`], the hook for source verification of new records
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use tagdex_config::Config;
//! use tagdex_engine::{HttpUpstream, SearchParams, Services, SystemClock};
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let config = Config::load(".".as_ref())?;
//! let upstream = Arc::new(HttpUpstream::new(&config.upstream)?);
//! let services = Services::open(&config, upstream, Arc::new(SystemClock))?;
//!
//! let params = SearchParams {
//!     query: "wolf ~ fox -rating:e order:score".into(),
//!     ..SearchParams::default()
//! };
//! let page = services.search.search(&params).await?;
//! println!("{} records", page.records.len());
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]

mod cache;
mod catalog;
mod clock;
mod error;
mod provenance;
mod ratelimit;
mod relationships;
mod resolver;
mod search;
mod services;
mod sync;
pub mod upstream;

pub use cache::TtlCache;
pub use catalog::Catalog;
pub use clock::{Clock, ManualClock, SystemClock};
pub use error::{ErrorResponse, SearchError, SyncError};
pub use provenance::{
    Candidate, ProvenanceChecker, ProvenanceQueue, ProvenanceRegistry, ProvenanceWorker, Verdict,
};
pub use ratelimit::RateLimiter;
pub use relationships::{MAX_LOOKUP_NAMES, Relation, TagRelations, TagService};
pub use resolver::TagResolver;
pub use search::{Explanation, SearchParams, SearchResponse, SearchService};
pub use services::Services;
pub use sync::{MAX_PARENT_LOOKUPS, PassReport, ResyncReport, Stage, SyncEngine, export_names};
pub use upstream::{HttpUpstream, MemoryUpstream, Upstream, UpstreamError};
