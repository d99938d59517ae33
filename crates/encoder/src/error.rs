//! Encoder-specific error types.
//!
//! Loading errors are kept separate from the common `EncodeError` so callers
//! can tell a missing library apart from a failing encode.

use fc_common::EncodeError;
use thiserror::Error;

/// Errors that can occur when loading the LAME library.
#[derive(Debug, Error)]
pub enum LameLoadError {
    #[error("LAME library not found: {0}")]
    LibraryNotFound(String),

    #[error("Required symbol not found: {0}")]
    SymbolNotFound(String),
}

impl From<LameLoadError> for EncodeError {
    fn from(err: LameLoadError) -> Self {
        EncodeError::EncoderInit(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lame_load_error_display() {
        let err = LameLoadError::LibraryNotFound("libmp3lame.so.0".to_string());
        assert!(err.to_string().contains("libmp3lame.so.0"));
    }

    #[test]
    fn lame_load_error_into_encode_error() {
        let err: EncodeError = LameLoadError::SymbolNotFound("lame_init".to_string()).into();
        assert!(matches!(err, EncodeError::EncoderInit(ref msg) if msg.contains("lame_init")));
    }
}
