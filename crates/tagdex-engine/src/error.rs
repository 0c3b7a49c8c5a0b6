//! Error types for the tagdex-engine crate.

use std::path::PathBuf;

use serde::Serialize;
use tagdex_index::IndexError;
use tagdex_query::QueryError;
use thiserror::Error;

use crate::UpstreamError;

/// Errors that abort a sync stage.
#[derive(Debug, Error)]
pub enum SyncError {
    /// The upstream catalog failed.
    #[error(transparent)]
    Upstream(#[from] UpstreamError),

    /// The index or a side store failed.
    #[error(transparent)]
    Index(#[from] IndexError),

    /// An export file could not be read.
    #[error("failed to read export {path}: {message}")]
    Export {
        /// Export file.
        path: PathBuf,
        /// Error message.
        message: String,
    },

    /// A blocking task panicked or was cancelled.
    #[error("background task failed: {0}")]
    Task(String),
}

impl SyncError {
    /// Whether the pass should simply be retried later.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Upstream(e) if e.is_transient())
    }

    /// Creates an `Export` error.
    pub(crate) fn export(path: PathBuf, message: impl ToString) -> Self {
        Self::Export {
            path,
            message: message.to_string(),
        }
    }
}

/// Errors answering a search or tag request.
#[derive(Debug, Error)]
pub enum SearchError {
    /// The query text is malformed.
    #[error(transparent)]
    Query(#[from] QueryError),

    /// The index failed, or refused the pagination parameters.
    #[error(transparent)]
    Index(#[from] IndexError),

    /// Too many names in one lookup.
    #[error("at most {max} names may be looked up at once, got {got}")]
    TooManyNames {
        /// Allowed maximum.
        max: usize,
        /// Names given.
        got: usize,
    },

    /// The blocking search task panicked or was cancelled.
    #[error("search task failed: {0}")]
    Task(String),
}

impl SearchError {
    /// Whether the caller can fix the request.
    pub fn is_client_error(&self) -> bool {
        match self {
            Self::Query(_) | Self::TooManyNames { .. } => true,
            Self::Index(e) => e.is_client_error(),
            Self::Task(_) => false,
        }
    }

    /// HTTP-style status code.
    pub fn status(&self) -> u16 {
        if self.is_client_error() { 400 } else { 500 }
    }

    /// The body sent back to a caller. Server errors never leak their detail.
    pub fn response(&self) -> ErrorResponse {
        let message = if self.is_client_error() {
            self.to_string()
        } else {
            "internal error".to_string()
        };
        ErrorResponse {
            status: self.status(),
            message,
        }
    }
}

/// Error body of the search surface.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorResponse {
    /// HTTP-style status code.
    pub status: u16,
    /// Human-readable message.
    pub message: String,
}
