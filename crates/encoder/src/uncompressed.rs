//! Uncompressed BGR24 video "encoder".

use fc_common::{
    AviCodec, BitsPerPixel, EncodeError, EncodeResult, EncodedFrame, Resolution, VideoEncoder,
};

const SOURCE_BYTES_PER_PIXEL: usize = 4;
const TARGET_BYTES_PER_PIXEL: usize = 3;

/// Converts top-down BGR32 frames into the bottom-up BGR24 layout of an
/// uncompressed AVI stream. Every frame is a key frame.
#[derive(Debug)]
pub struct UncompressedVideoEncoder {
    resolution: Resolution,
}

impl UncompressedVideoEncoder {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            resolution: Resolution::new(width, height),
        }
    }

    fn source_size(&self) -> usize {
        self.resolution.bgr32_byte_size()
    }
}

impl VideoEncoder for UncompressedVideoEncoder {
    fn codec(&self) -> AviCodec {
        AviCodec::UNCOMPRESSED
    }

    fn bits_per_pixel(&self) -> BitsPerPixel {
        BitsPerPixel::Bpp24
    }

    fn max_encoded_size(&self) -> usize {
        self.resolution.pixel_count() as usize * TARGET_BYTES_PER_PIXEL
    }

    fn encode_frame(&mut self, src: &[u8], dst: &mut [u8]) -> EncodeResult<EncodedFrame> {
        if src.len() < self.source_size() {
            return Err(EncodeError::Unsupported(format!(
                "expected a {} BGR32 frame ({} bytes), got {} bytes",
                self.resolution,
                self.source_size(),
                src.len()
            )));
        }
        let len = self.max_encoded_size();
        if dst.len() < len {
            return Err(EncodeError::BufferTooSmall {
                needed: len,
                available: dst.len(),
            });
        }
        if len == 0 {
            return Ok(EncodedFrame {
                len,
                is_key_frame: true,
            });
        }

        let width = self.resolution.width as usize;
        let src_stride = width * SOURCE_BYTES_PER_PIXEL;
        let dst_stride = width * TARGET_BYTES_PER_PIXEL;
        let src_rows = src[..self.source_size()].chunks_exact(src_stride);
        let dst_rows = dst[..len].chunks_exact_mut(dst_stride).rev();
        for (src_row, dst_row) in src_rows.zip(dst_rows) {
            for (s, d) in src_row
                .chunks_exact(SOURCE_BYTES_PER_PIXEL)
                .zip(dst_row.chunks_exact_mut(TARGET_BYTES_PER_PIXEL))
            {
                d.copy_from_slice(&s[..TARGET_BYTES_PER_PIXEL]);
            }
        }

        Ok(EncodedFrame {
            len,
            is_key_frame: true,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flips_rows_and_drops_alpha() {
        let mut encoder = UncompressedVideoEncoder::new(2, 2);
        #[rustfmt::skip]
        let src = [
            1, 2, 3, 255,   4, 5, 6, 255,
            7, 8, 9, 255,   10, 11, 12, 255,
        ];
        let mut dst = vec![0; encoder.max_encoded_size()];

        let frame = encoder.encode_frame(&src, &mut dst).unwrap();

        assert_eq!(frame.len, 12);
        assert!(frame.is_key_frame);
        assert_eq!(dst, vec![7, 8, 9, 10, 11, 12, 1, 2, 3, 4, 5, 6]);
    }

    #[test]
    fn reports_codec_and_bits() {
        let encoder = UncompressedVideoEncoder::new(640, 480);
        assert_eq!(encoder.codec(), AviCodec::UNCOMPRESSED);
        assert_eq!(encoder.bits_per_pixel(), BitsPerPixel::Bpp24);
        assert_eq!(encoder.max_encoded_size(), 640 * 480 * 3);
    }

    #[test]
    fn rejects_short_input() {
        let mut encoder = UncompressedVideoEncoder::new(4, 4);
        let mut dst = vec![0; encoder.max_encoded_size()];
        assert!(matches!(
            encoder.encode_frame(&[0; 10], &mut dst),
            Err(EncodeError::Unsupported(_))
        ));
    }

    #[test]
    fn short_input_error_names_resolution() {
        let mut encoder = UncompressedVideoEncoder::new(3, 2);
        let mut dst = vec![0; encoder.max_encoded_size()];
        let err = encoder.encode_frame(&[0; 8], &mut dst).unwrap_err();
        assert!(err.to_string().contains("3x2 BGR32 frame (24 bytes)"));
    }

    #[test]
    fn rejects_small_destination() {
        let mut encoder = UncompressedVideoEncoder::new(2, 1);
        let mut dst = [0; 4];
        assert!(matches!(
            encoder.encode_frame(&[0; 8], &mut dst),
            Err(EncodeError::BufferTooSmall { needed: 6, available: 4 })
        ));
    }
}
