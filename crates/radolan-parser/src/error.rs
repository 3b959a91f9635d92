//! Error types for RADOLAN decoding.

use thiserror::Error;

/// Result type for RADOLAN decoder operations.
pub type Result<T> = std::result::Result<T, RadolanError>;

/// Error types for RADOLAN decoding.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RadolanError {
    /// The payload is not a readable bz2 stream
    #[error("Decompression failed: {0}")]
    DecompressionError(String),

    /// The decompressed payload is not a valid composite
    #[error("Corrupt composite: {0}")]
    CorruptComposite(String),
}

impl RadolanError {
    pub(crate) fn corrupt(msg: impl Into<String>) -> Self {
        RadolanError::CorruptComposite(msg.into())
    }

    /// True for errors raised before any header was read.
    pub fn is_decompression(&self) -> bool {
        matches!(self, RadolanError::DecompressionError(_))
    }
}
