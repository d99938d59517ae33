//! Shared error types (thiserror-based).

use thiserror::Error;

/// Encoder collaborator errors.
#[derive(Error, Debug)]
pub enum EncodeError {
    #[error("Encoder init failed: {0}")]
    EncoderInit(String),

    #[error("Encode failed at frame {frame}: {reason}")]
    EncodeFailed { frame: u64, reason: String },

    #[error("Destination buffer too small: need {needed} bytes, have {available}")]
    BufferTooSmall { needed: usize, available: usize },

    #[error("Unsupported encoder input: {0}")]
    Unsupported(String),
}

/// Convenience Result type for encoder operations.
pub type EncodeResult<T> = Result<T, EncodeError>;
