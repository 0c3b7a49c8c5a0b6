//! Error types for the data model.

use thiserror::Error;

/// Errors raised when decoding model values from their wire representations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DocumentError {
    /// A tag category code outside the known set.
    #[error("unknown tag category code: {code}")]
    UnknownCategory {
        /// The offending code.
        code: u8,
    },

    /// A rating string that is not `s`, `q` or `e`.
    #[error("unknown rating: {value}")]
    UnknownRating {
        /// The offending value.
        value: String,
    },
}
