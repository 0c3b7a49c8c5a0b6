//! Error types for query parsing.

use std::fmt;

use thiserror::Error;

/// The specific way a query is malformed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryErrorKind {
    /// One or more groups were still open at end of input.
    UnclosedGroup {
        /// Number of groups left open.
        open: usize,
    },
    /// A `)` appeared with no open group.
    UnexpectedClose {
        /// Index of the offending token.
        token_index: usize,
    },
}

/// A malformed query.
///
/// Always a caller error: the query text must be fixed, retrying cannot help.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("malformed query: {kind}")]
pub struct QueryError {
    /// What went wrong.
    pub kind: QueryErrorKind,
    /// The original query string.
    pub query: String,
}

impl QueryError {
    /// Creates an error for `query`.
    pub fn new(kind: QueryErrorKind, query: impl Into<String>) -> Self {
        Self {
            kind,
            query: query.into(),
        }
    }

    /// Human-readable description without the query text.
    pub fn message(&self) -> String {
        self.kind.to_string()
    }

    /// A hint for fixing the query.
    pub fn suggestion(&self) -> &'static str {
        match self.kind {
            QueryErrorKind::UnclosedGroup { .. } => {
                "Close every '(' with a standalone ')', e.g. '( a ~ b )'"
            }
            QueryErrorKind::UnexpectedClose { .. } => {
                "Remove the extra ')' or add a matching standalone '('"
            }
        }
    }
}

impl fmt::Display for QueryErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnclosedGroup { open: 1 } => f.write_str("a group is missing its closing ')'"),
            Self::UnclosedGroup { open } => {
                write!(f, "{open} groups are missing their closing ')'")
            }
            Self::UnexpectedClose { token_index } => {
                write!(f, "unmatched ')' at token {}", token_index + 1)
            }
        }
    }
}
