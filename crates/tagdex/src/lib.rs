//! tagdex: a tag-query search index kept in sync with an upstream image catalog.
//!
//! The `tagdex` binary exposes the services of `tagdex-engine` on the command line:
//! - `search` runs tag queries against the local index
//! - `sync` and `resync` keep the index current, incrementally or from the daily export
//! - `tags` shows tag metadata and implication relationships
//! - `init`, `config` and `check` manage `.tagdex.toml` files

#![warn(missing_docs)]

pub mod cli;
