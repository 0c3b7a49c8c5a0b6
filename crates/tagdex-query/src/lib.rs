//! Tag query language for tagdex.
//!
//! Queries are whitespace-separated tokens:
//!
//! - **Tags**: `blue_eyes` - records must carry the tag
//! - **Negation**: `-wolf` - records must not carry the tag
//! - **Union**: `blue_eyes ~ red_eyes` - either tag
//! - **Grouping**: `( a ~ b ) c` - standalone parentheses nest
//! - **Wildcards**: `fo*` - every tag whose name matches
//! - **Meta tags**: `rating:s`, `score:>=10`, `date:2024-01-01..2024-02-01`
//! - **Ordering**: `order:score`, `order:rank`, `order:random:42`
//!
//! # Example
//!
//! ```
//! use tagdex_query::{CompileOptions, QueryCompiler, Resolutions, parse};
//!
//! let parsed = parse("blue_eyes ~ red_eyes rating:s").unwrap();
//! let mut ids = Resolutions::new();
//! ids.insert("blue_eyes", vec![1]);
//! ids.insert("red_eyes", vec![2]);
//! let compiled = QueryCompiler::new().compile(&parsed, &ids, &CompileOptions::default());
//! assert_eq!(compiled.should.len(), 2);
//! ```

#![warn(missing_docs)]

mod classify;
mod compile;
mod error;
mod parser;
mod ranking;
mod tokenizer;

pub use classify::{
    Direction, FieldPredicate, Flag, FloatField, IntField, MetaTag, OrderDirective, Range,
    SortField, SourceMatch, Status, classify,
};
pub use compile::{BoolQuery, Clause, CompileOptions, QueryCompiler, Resolutions, is_wildcard};
pub use error::{QueryError, QueryErrorKind};
pub use parser::{Group, GroupToken, ParsedQuery, UNION, parse};
pub use ranking::{HotRank, Ordering, RankingPlan, RankingPlanner, ScoringStrategy, SortSpec};
pub use tokenizer::{NEGATE, Tokenizer};
