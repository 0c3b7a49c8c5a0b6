//! Pagination cursors.
//!
//! A page number is translated to an offset; an opaque cursor carries the sort key of the
//! last record of the previous page, encoded as URL-safe base64 of a JSON array.

use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use serde::{Deserialize, Serialize};

use crate::IndexError;

/// A position in a ranking. Greater keys come first.
///
/// Keys are `[primary, secondary, id]`, each already signed so that descending order of the
/// array is the requested order.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SortKey(pub [f64; 3]);

impl SortKey {
    /// Key given to documents at or before a cursor; filtered out after collection.
    pub(crate) const EXCLUDED: Self = Self([f64::NEG_INFINITY; 3]);

    /// Returns true for the exclusion sentinel.
    pub(crate) fn is_excluded(&self) -> bool {
        *self == Self::EXCLUDED
    }
}

/// Where a page starts.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Cursor {
    /// One-based page number.
    Page(usize),
    /// Strictly after this sort key.
    After(SortKey),
}

impl Cursor {
    /// Decodes an opaque cursor token.
    pub fn decode(token: &str) -> Result<Self, IndexError> {
        let bytes = URL_SAFE_NO_PAD
            .decode(token.trim())
            .map_err(|e| IndexError::InvalidCursor(e.to_string()))?;
        let key: SortKey =
            serde_json::from_slice(&bytes).map_err(|e| IndexError::InvalidCursor(e.to_string()))?;
        if key.0.iter().any(|v| !v.is_finite()) {
            return Err(IndexError::InvalidCursor("non-finite sort key".into()));
        }
        Ok(Self::After(key))
    }

    /// Encodes a sort key as an opaque token.
    pub fn encode(key: SortKey) -> String {
        let json = serde_json::to_vec(&key).unwrap_or_default();
        URL_SAFE_NO_PAD.encode(json)
    }
}

/// Converts a page number to an offset, refusing pages past `max_offset`.
pub fn page_offset(page: usize, limit: usize, max_offset: usize) -> Result<usize, IndexError> {
    let offset = page.saturating_sub(1).saturating_mul(limit);
    if offset.saturating_add(limit) > max_offset {
        return Err(IndexError::PageTooDeep { page, max_offset });
    }
    Ok(offset)
}
