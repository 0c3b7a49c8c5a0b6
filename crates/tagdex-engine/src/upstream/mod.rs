//! Access to the upstream catalog.
//!
//! [`Upstream`] is the seam between the engine and the catalog. [`HttpUpstream`] talks to
//! the real JSON API through the global rate limiter; [`MemoryUpstream`] serves canned data
//! for tests and offline runs.

mod http;
mod memory;
mod model;

use std::path::{Path, PathBuf};

use async_trait::async_trait;
pub use http::HttpUpstream;
pub use memory::MemoryUpstream;
pub use model::{AliasPayload, FilePayload, FlagsPayload, PostPayload, RelationshipsPayload, ScorePayload, TagPayload};
use thiserror::Error;

/// Errors talking to the upstream catalog.
#[derive(Debug, Error)]
pub enum UpstreamError {
    /// The catalog asked us to slow down.
    #[error("rate limited by {url}")]
    RateLimited {
        /// Requested URL.
        url: String,
    },

    /// The catalog answered with an error status.
    #[error("{url} returned HTTP {status}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Requested URL.
        url: String,
    },

    /// The request never got an answer: timeout, refused or reset connection.
    #[error("request to {url} failed: {message}")]
    Transport {
        /// Requested URL.
        url: String,
        /// Error message.
        message: String,
    },

    /// The answer could not be decoded.
    #[error("failed to decode response from {url}: {message}")]
    Decode {
        /// Requested URL.
        url: String,
        /// Error message.
        message: String,
    },

    /// A URL could not be built.
    #[error("invalid upstream url: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// Writing a download failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl UpstreamError {
    /// Whether retrying later may succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::RateLimited { .. } | Self::Transport { .. } => true,
            Self::Status { status, .. } => *status >= 500,
            Self::Decode { .. } | Self::InvalidUrl(_) | Self::Io(_) => false,
        }
    }
}

/// The upstream catalog's read API.
#[async_trait]
pub trait Upstream: Send + Sync {
    /// Up to `limit` records with ids greater than `after_id`.
    async fn posts_after(&self, after_id: u64, limit: usize) -> Result<Vec<PostPayload>, UpstreamError>;

    /// One page of records, most recently changed first. Pages start at 1.
    async fn posts_by_change(&self, page: usize, limit: usize) -> Result<Vec<PostPayload>, UpstreamError>;

    /// The records with the given ids that exist upstream.
    async fn posts_by_ids(&self, ids: &[u64]) -> Result<Vec<PostPayload>, UpstreamError>;

    /// The tag with exactly this name.
    async fn tag_by_name(&self, name: &str) -> Result<Option<TagPayload>, UpstreamError>;

    /// One page of tags, most recently updated first. Pages start at 1.
    async fn tags_by_update(&self, page: usize) -> Result<Vec<TagPayload>, UpstreamError>;

    /// Up to `limit` aliases with ids greater than `after_id`.
    async fn aliases_after(&self, after_id: u64, limit: usize) -> Result<Vec<AliasPayload>, UpstreamError>;

    /// Up to `limit` implications with ids greater than `after_id`.
    async fn implications_after(
        &self,
        after_id: u64,
        limit: usize,
    ) -> Result<Vec<AliasPayload>, UpstreamError>;

    /// Downloads the export file `name` into `dir`, returning its path.
    ///
    /// An already downloaded file is reused.
    async fn fetch_export(&self, name: &str, dir: &Path) -> Result<PathBuf, UpstreamError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_classification() {
        let url = || "https://example.test/posts.json".to_string();
        assert!(UpstreamError::RateLimited { url: url() }.is_transient());
        assert!(UpstreamError::Status { status: 503, url: url() }.is_transient());
        assert!(
            UpstreamError::Transport {
                url: url(),
                message: "timed out".into()
            }
            .is_transient()
        );
        assert!(!UpstreamError::Status { status: 404, url: url() }.is_transient());
        assert!(
            !UpstreamError::Decode {
                url: url(),
                message: "eof".into()
            }
            .is_transient()
        );
    }
}
