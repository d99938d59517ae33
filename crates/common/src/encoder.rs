//! Encoder capability traits.
//!
//! The muxer never encodes by itself. Encoding streams hold one of these
//! collaborators and hand only the encoded bytes (plus a key-frame flag) to
//! the container writer.

use crate::codec::{AviCodec, BitsPerPixel};
use crate::error::EncodeResult;
use crate::wave::WaveFormat;

/// Initial size of growable encode buffers.
pub const INITIAL_ENCODE_BUFFER: usize = 1024;

/// Result of encoding one video frame.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct EncodedFrame {
    /// Bytes written to the destination buffer.
    pub len: usize,
    pub is_key_frame: bool,
}

/// A video encoder feeding one AVI video stream.
pub trait VideoEncoder: Send {
    /// Codec written to the stream header.
    fn codec(&self) -> AviCodec;

    /// Bits per pixel of the encoded frames.
    fn bits_per_pixel(&self) -> BitsPerPixel;

    /// Upper bound on the size of one encoded frame.
    fn max_encoded_size(&self) -> usize;

    /// Encode one source frame into `dst`, which holds at least
    /// [`max_encoded_size`](Self::max_encoded_size) bytes.
    fn encode_frame(&mut self, src: &[u8], dst: &mut [u8]) -> EncodeResult<EncodedFrame>;
}

/// An audio encoder feeding one AVI audio stream.
pub trait AudioEncoder: Send {
    /// Format written to the stream's `strf` chunk.
    fn wave_format(&self) -> WaveFormat;

    /// Upper bound on the encoded length of `source_len` input bytes.
    fn max_encoded_length(&self, source_len: usize) -> usize;

    /// Encode a block of source data, returning the number of bytes written.
    /// May write nothing while the encoder buffers input.
    fn encode(&mut self, src: &[u8], dst: &mut [u8]) -> EncodeResult<usize>;

    /// Drain any internally buffered data.
    fn flush(&mut self, dst: &mut [u8]) -> EncodeResult<usize>;
}

/// Grow `buf` so it holds at least `needed` bytes.
///
/// Buffers start at [`INITIAL_ENCODE_BUFFER`] and double, so repeated calls
/// with slowly increasing requirements reallocate rarely. Returns whether
/// the buffer was reallocated.
pub fn ensure_buffer_capacity(buf: &mut Vec<u8>, needed: usize) -> bool {
    if buf.len() >= needed && !buf.is_empty() {
        return false;
    }

    let mut len = if buf.is_empty() {
        INITIAL_ENCODE_BUFFER
    } else {
        buf.len() * 2
    };
    while len < needed {
        len *= 2;
    }

    *buf = vec![0; len];
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn buffer_starts_at_1024() {
        let mut buf = Vec::new();
        assert!(ensure_buffer_capacity(&mut buf, 10));
        assert_eq!(buf.len(), 1024);
        assert!(!ensure_buffer_capacity(&mut buf, 1024));
    }

    #[test]
    fn buffer_doubles_until_sufficient() {
        let mut buf = Vec::new();
        ensure_buffer_capacity(&mut buf, 10);
        assert!(ensure_buffer_capacity(&mut buf, 5000));
        assert_eq!(buf.len(), 8192);
        assert!(ensure_buffer_capacity(&mut buf, 8193));
        assert_eq!(buf.len(), 16384);
    }
}
