//! Public asset URLs derived from a record's content hash.

use serde::Serialize;

/// Location of a record's file and its thumbnails.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AssetUrls {
    /// Original file.
    pub file: String,
    /// Small preview thumbnail.
    pub preview: String,
    /// Medium sample image.
    pub sample: String,
}

impl AssetUrls {
    /// Derives URLs for a file with `hash` and extension `ext` under `base`.
    ///
    /// Files are sharded by the first two byte pairs of the hash:
    /// `{base}/ab/cd/abcd….ext`. Previews and samples are always JPEG.
    pub fn derive(base: &str, hash: &str, ext: &str) -> Self {
        let base = base.trim_end_matches('/');
        let shard = shard(hash);
        Self {
            file: format!("{base}/{shard}/{hash}.{ext}"),
            preview: format!("{base}/preview/{shard}/{hash}.jpg"),
            sample: format!("{base}/sample/{shard}/{hash}.jpg"),
        }
    }
}

/// Two-level directory prefix for a hash.
fn shard(hash: &str) -> String {
    match (hash.get(0..2), hash.get(2..4)) {
        (Some(a), Some(b)) => format!("{a}/{b}"),
        _ => "00/00".to_string(),
    }
}
