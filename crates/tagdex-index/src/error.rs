//! Error types for the tagdex-index crate.

use std::{io, path::PathBuf};

use thiserror::Error;

/// Errors that can occur when working with the record index or its side stores.
#[derive(Debug, Error)]
pub enum IndexError {
    /// Failed to open or create the index.
    #[error("failed to open index at {path}: {message}")]
    OpenIndex {
        /// Path to the index directory.
        path: PathBuf,
        /// Error message.
        message: String,
    },

    /// Failed to write to the index.
    #[error("failed to write to index: {0}")]
    Write(String),

    /// Failed to commit changes to the index.
    #[error("failed to commit index: {0}")]
    Commit(String),

    /// Failed to read from the index.
    #[error("failed to search index: {0}")]
    Search(String),

    /// A stored record could not be decoded.
    #[error("corrupt stored record: {0}")]
    CorruptRecord(String),

    /// A page number would reach past the deepest allowed offset.
    #[error("page {page} is beyond the maximum offset of {max_offset}; use a cursor")]
    PageTooDeep {
        /// Requested page.
        page: usize,
        /// Deepest offset allowed.
        max_offset: usize,
    },

    /// A pagination cursor could not be decoded.
    #[error("invalid cursor: {0}")]
    InvalidCursor(String),

    /// A wildcard could not be turned into a matcher.
    #[error("invalid pattern {pattern:?}: {message}")]
    InvalidPattern {
        /// The offending pattern.
        pattern: String,
        /// Error message.
        message: String,
    },

    /// JSON (de)serialization of a side store failed.
    #[error("failed to encode {path}: {source}")]
    Json {
        /// File being read or written.
        path: PathBuf,
        /// Underlying error.
        source: serde_json::Error,
    },

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl IndexError {
    /// Creates an `OpenIndex` error from a path and Tantivy error.
    pub(crate) fn open_index(path: PathBuf, source: &tantivy::TantivyError) -> Self {
        Self::OpenIndex {
            path,
            message: source.to_string(),
        }
    }

    /// Creates a `Write` error from a Tantivy error.
    pub(crate) fn write(source: &tantivy::TantivyError) -> Self {
        Self::Write(source.to_string())
    }

    /// Creates a `Commit` error from a Tantivy error.
    pub(crate) fn commit(source: &tantivy::TantivyError) -> Self {
        Self::Commit(source.to_string())
    }

    /// Creates a `Search` error from a Tantivy error.
    pub(crate) fn search(source: &tantivy::TantivyError) -> Self {
        Self::Search(source.to_string())
    }

    /// Whether the error was caused by the request rather than the index.
    pub fn is_client_error(&self) -> bool {
        matches!(self, Self::PageTooDeep { .. } | Self::InvalidCursor(_))
    }
}
