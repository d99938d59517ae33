//! Muxer error types.

use fc_common::EncodeError;
use thiserror::Error;

/// Errors that can occur during AVI muxing.
#[derive(Error, Debug)]
pub enum MuxError {
    /// I/O error during file write.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The encoder behind an encoding stream failed.
    #[error("Encode error: {0}")]
    Encode(#[from] EncodeError),

    /// The writer has been closed.
    #[error("Writer is closed")]
    Closed,

    /// Writer-wide settings or the stream set changed after the first write.
    #[error("Writing has already started; streams and settings are fixed")]
    AlreadyStarted,

    #[error("Stream {stream} is frozen; its properties cannot change after the first write")]
    StreamFrozen { stream: usize },

    #[error("Stream {stream}: {property} is defined by the encoder")]
    DefinedByEncoder {
        stream: usize,
        property: &'static str,
    },

    /// Stream indexes are written as two decimal digits in chunk tags.
    #[error("At most {0} streams can be added")]
    TooManyStreams(usize),

    #[error("Unknown stream index {0}")]
    UnknownStream(usize),

    /// Invalid muxer configuration.
    #[error("Invalid muxer config: {0}")]
    InvalidConfig(String),

    /// The stream's super index reached its 256 entry ceiling.
    #[error("Stream {stream}: super index is full, no more frames can be indexed")]
    SuperIndexFull { stream: usize },

    /// A chunk with a pre-declared size received a different number of bytes.
    #[error("Chunk size mismatch: declared {declared} bytes, wrote {actual}")]
    SizeMismatch { declared: u32, actual: u64 },

    /// An item does not fit a 32-bit RIFF size field.
    #[error("Item of {0} bytes does not fit a RIFF size field")]
    ItemTooLarge(u64),

    /// The rewritten header did not fit the space reserved for it.
    #[error("Header rewrite overflowed: reserved {reserved} bytes, wrote {actual}")]
    HeaderGrew { reserved: u64, actual: u64 },

    /// A stream's ordering worker could not be started or has stopped.
    #[error("Stream worker unavailable: {0}")]
    WorkerUnavailable(String),
}

/// Convenience Result type for mux operations.
pub type MuxResult<T> = Result<T, MuxError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mux_error_display_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let mux_err = MuxError::from(io_err);
        assert!(mux_err.to_string().contains("IO error"));
        assert!(mux_err.to_string().contains("file not found"));
    }

    #[test]
    fn mux_error_display_invalid_config() {
        let err = MuxError::InvalidConfig("frame rate must be positive".into());
        assert_eq!(
            err.to_string(),
            "Invalid muxer config: frame rate must be positive"
        );
    }

    #[test]
    fn mux_error_display_size_mismatch() {
        let err = MuxError::SizeMismatch {
            declared: 10,
            actual: 12,
        };
        assert_eq!(
            err.to_string(),
            "Chunk size mismatch: declared 10 bytes, wrote 12"
        );
    }

    #[test]
    fn mux_error_display_defined_by_encoder() {
        let err = MuxError::DefinedByEncoder {
            stream: 1,
            property: "codec",
        };
        assert_eq!(err.to_string(), "Stream 1: codec is defined by the encoder");
    }

    #[test]
    fn mux_error_from_encode_error() {
        let err: MuxError = EncodeError::EncoderInit("no library".into()).into();
        assert!(matches!(err, MuxError::Encode(_)));
        assert!(err.to_string().contains("no library"));
    }
}
