//! Shortcuts for adding encoding streams to an [`AviWriter`].

use std::sync::Arc;

use fc_common::{EncodeResult, Mp3EncoderConfig};
use fc_mux::{AudioStream, AviWriter, MuxResult, VideoStream};

use crate::lame::{LameLibrary, Mp3AudioEncoder};
use crate::single_threaded::{SingleThreadedVideoEncoder, ThreadBoundVideoEncoder};
use crate::uncompressed::UncompressedVideoEncoder;

/// Encoding stream constructors for [`AviWriter`].
pub trait EncodingStreamFactory {
    /// Video stream taking top-down BGR32 frames, stored as uncompressed
    /// BGR24.
    fn add_uncompressed_video_stream(&mut self, width: u32, height: u32)
        -> MuxResult<VideoStream>;

    /// Video stream whose encoder is created by `factory` and used only on
    /// its own thread.
    fn add_single_threaded_video_stream<E, F>(
        &mut self,
        factory: F,
        width: u32,
        height: u32,
    ) -> MuxResult<VideoStream>
    where
        E: ThreadBoundVideoEncoder + 'static,
        F: FnOnce() -> EncodeResult<E> + Send + 'static;

    /// Audio stream taking 16-bit PCM, stored as MP3.
    fn add_mp3_audio_stream(
        &mut self,
        library: Arc<LameLibrary>,
        config: Mp3EncoderConfig,
    ) -> MuxResult<AudioStream>;
}

impl EncodingStreamFactory for AviWriter {
    fn add_uncompressed_video_stream(
        &mut self,
        width: u32,
        height: u32,
    ) -> MuxResult<VideoStream> {
        let encoder = UncompressedVideoEncoder::new(width, height);
        self.add_encoding_video_stream(Box::new(encoder), width, height)
    }

    fn add_single_threaded_video_stream<E, F>(
        &mut self,
        factory: F,
        width: u32,
        height: u32,
    ) -> MuxResult<VideoStream>
    where
        E: ThreadBoundVideoEncoder + 'static,
        F: FnOnce() -> EncodeResult<E> + Send + 'static,
    {
        let encoder = SingleThreadedVideoEncoder::new(factory)?;
        self.add_encoding_video_stream(Box::new(encoder), width, height)
    }

    fn add_mp3_audio_stream(
        &mut self,
        library: Arc<LameLibrary>,
        config: Mp3EncoderConfig,
    ) -> MuxResult<AudioStream> {
        let encoder = Mp3AudioEncoder::new(library, config)?;
        self.add_encoding_audio_stream(Box::new(encoder))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fc_common::{AviCodec, BitsPerPixel, EncodeError, EncodedFrame};
    use fc_mux::{MuxError, MuxerConfig};
    use std::io::Cursor;

    fn writer() -> AviWriter {
        AviWriter::new(Cursor::new(Vec::new()), MuxerConfig::default()).unwrap()
    }

    struct MotionJpegStub;

    impl ThreadBoundVideoEncoder for MotionJpegStub {
        fn codec(&self) -> AviCodec {
            AviCodec::MOTION_JPEG
        }

        fn bits_per_pixel(&self) -> BitsPerPixel {
            BitsPerPixel::Bpp24
        }

        fn max_encoded_size(&self) -> usize {
            4
        }

        fn encode_frame(&mut self, _src: &[u8], dst: &mut [u8]) -> EncodeResult<EncodedFrame> {
            dst[..4].copy_from_slice(b"\xFF\xD8\xFF\xD9");
            Ok(EncodedFrame {
                len: 4,
                is_key_frame: true,
            })
        }
    }

    #[test]
    fn uncompressed_stream_properties_come_from_encoder() {
        let mut writer = writer();
        let video = writer.add_uncompressed_video_stream(2, 2).unwrap();
        assert_eq!(video.codec(), AviCodec::UNCOMPRESSED);
        assert_eq!(video.bits_per_pixel(), BitsPerPixel::Bpp24);
        assert!(matches!(
            video.set_codec(AviCodec::XVID),
            Err(MuxError::DefinedByEncoder { property: "codec", .. })
        ));

        video.write_frame(false, &[0; 16]).unwrap();
        assert_eq!(video.frames_written(), 1);
        writer.close().unwrap();
    }

    #[test]
    fn single_threaded_stream_uses_encoder_codec() {
        let mut writer = writer();
        let video = writer
            .add_single_threaded_video_stream(|| Ok(MotionJpegStub), 8, 8)
            .unwrap();
        assert_eq!(video.codec(), AviCodec::MOTION_JPEG);
        video.write_frame(false, &[0; 8 * 8 * 4]).unwrap();
        writer.close().unwrap();
        assert_eq!(video.chunk_tag().map(|t| t.to_string()), Some("00dc".into()));
    }

    #[test]
    fn encoder_failure_surfaces_as_mux_error() {
        let mut writer = writer();
        let video = writer.add_uncompressed_video_stream(4, 4).unwrap();
        assert!(matches!(
            video.write_frame(true, &[0; 3]),
            Err(MuxError::Encode(EncodeError::Unsupported(_)))
        ));
        writer.close().unwrap();
    }
}
