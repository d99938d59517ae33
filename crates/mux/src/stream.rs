//! Stream identity and freeze state.
//!
//! A stream starts mutable. The writer freezes every stream when the first
//! frame is admitted, generating its chunk tags; from then on its name,
//! geometry, and format are fixed.

use fc_common::{AviCodec, BitsPerPixel, FourCc, WaveFormat};

use crate::error::{MuxError, MuxResult};

/// Video stream properties.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VideoProps {
    pub width: u32,
    pub height: u32,
    pub bits_per_pixel: BitsPerPixel,
    pub codec: AviCodec,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StreamKind {
    Video(VideoProps),
    Audio(WaveFormat),
}

/// Identity and header properties of one stream.
#[derive(Clone, Debug)]
pub struct StreamInfo {
    index: usize,
    name: Option<String>,
    kind: StreamKind,
    /// Codec/bpp or wave format come from an encoder and cannot be set.
    encoder_defined: bool,
    /// Generated on freeze.
    chunk_tag: Option<FourCc>,
}

impl StreamInfo {
    pub fn video(index: usize, props: VideoProps, encoder_defined: bool) -> Self {
        Self {
            index,
            name: None,
            kind: StreamKind::Video(props),
            encoder_defined,
            chunk_tag: None,
        }
    }

    pub fn audio(index: usize, wave_format: WaveFormat, encoder_defined: bool) -> Self {
        Self {
            index,
            name: None,
            kind: StreamKind::Audio(wave_format),
            encoder_defined,
            chunk_tag: None,
        }
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn kind(&self) -> &StreamKind {
        &self.kind
    }

    pub fn is_video(&self) -> bool {
        matches!(self.kind, StreamKind::Video(_))
    }

    pub fn video_props(&self) -> Option<&VideoProps> {
        match &self.kind {
            StreamKind::Video(props) => Some(props),
            StreamKind::Audio(_) => None,
        }
    }

    pub fn wave_format(&self) -> Option<&WaveFormat> {
        match &self.kind {
            StreamKind::Audio(wave) => Some(wave),
            StreamKind::Video(_) => None,
        }
    }

    pub fn is_frozen(&self) -> bool {
        self.chunk_tag.is_some()
    }

    /// Data chunk tag (`NNdb`, `NNdc` or `NNwb`), known once frozen.
    pub fn chunk_tag(&self) -> Option<FourCc> {
        self.chunk_tag
    }

    /// Tag of this stream's standard index chunks (`ixNN`).
    pub fn index_chunk_tag(&self) -> FourCc {
        FourCc::prefixed(b"ix", self.index)
    }

    /// Fix all properties and generate the data chunk tag. Idempotent.
    pub fn freeze(&mut self) -> FourCc {
        if let Some(tag) = self.chunk_tag {
            return tag;
        }
        let suffix = match &self.kind {
            StreamKind::Video(props) if props.codec.is_uncompressed() => b"db",
            StreamKind::Video(_) => b"dc",
            StreamKind::Audio(_) => b"wb",
        };
        let tag = FourCc::indexed(self.index, suffix);
        self.chunk_tag = Some(tag);
        tag
    }

    pub fn set_name(&mut self, name: Option<String>) -> MuxResult<()> {
        self.check_not_frozen()?;
        self.name = name;
        Ok(())
    }

    pub fn set_width(&mut self, width: u32) -> MuxResult<()> {
        self.video_mut()?.width = width;
        Ok(())
    }

    pub fn set_height(&mut self, height: u32) -> MuxResult<()> {
        self.video_mut()?.height = height;
        Ok(())
    }

    pub fn set_bits_per_pixel(&mut self, bits_per_pixel: BitsPerPixel) -> MuxResult<()> {
        self.check_not_encoder_defined("bits per pixel")?;
        self.video_mut()?.bits_per_pixel = bits_per_pixel;
        Ok(())
    }

    pub fn set_codec(&mut self, codec: AviCodec) -> MuxResult<()> {
        self.check_not_encoder_defined("codec")?;
        self.video_mut()?.codec = codec;
        Ok(())
    }

    pub fn set_wave_format(&mut self, wave_format: WaveFormat) -> MuxResult<()> {
        self.check_not_encoder_defined("wave format")?;
        self.check_not_frozen()?;
        match &mut self.kind {
            StreamKind::Audio(wave) => {
                *wave = wave_format;
                Ok(())
            }
            StreamKind::Video(_) => Err(MuxError::InvalidConfig(format!(
                "stream {} is not an audio stream",
                self.index
            ))),
        }
    }

    fn video_mut(&mut self) -> MuxResult<&mut VideoProps> {
        self.check_not_frozen()?;
        let index = self.index;
        match &mut self.kind {
            StreamKind::Video(props) => Ok(props),
            StreamKind::Audio(_) => Err(MuxError::InvalidConfig(format!(
                "stream {index} is not a video stream"
            ))),
        }
    }

    fn check_not_frozen(&self) -> MuxResult<()> {
        if self.is_frozen() {
            return Err(MuxError::StreamFrozen { stream: self.index });
        }
        Ok(())
    }

    fn check_not_encoder_defined(&self, property: &'static str) -> MuxResult<()> {
        if self.encoder_defined {
            return Err(MuxError::DefinedByEncoder {
                stream: self.index,
                property,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn video(index: usize, codec: AviCodec) -> StreamInfo {
        StreamInfo::video(
            index,
            VideoProps {
                width: 320,
                height: 240,
                bits_per_pixel: BitsPerPixel::Bpp24,
                codec,
            },
            false,
        )
    }

    #[test]
    fn test_chunk_tags_generated_on_freeze() {
        let mut uncompressed = video(0, AviCodec::UNCOMPRESSED);
        assert_eq!(uncompressed.chunk_tag(), None);
        assert_eq!(uncompressed.freeze(), FourCc::new(b"00db"));

        let mut compressed = video(3, AviCodec::MOTION_JPEG);
        assert_eq!(compressed.freeze(), FourCc::new(b"03dc"));
        assert_eq!(compressed.index_chunk_tag(), FourCc::new(b"ix03"));

        let mut audio = StreamInfo::audio(1, WaveFormat::default(), false);
        assert_eq!(audio.freeze(), FourCc::new(b"01wb"));
    }

    #[test]
    fn test_codec_change_before_freeze_changes_tag() {
        let mut stream = video(0, AviCodec::UNCOMPRESSED);
        stream.set_codec(AviCodec::XVID).unwrap();
        assert_eq!(stream.freeze(), FourCc::new(b"00dc"));
    }

    #[test]
    fn test_frozen_stream_rejects_changes() {
        let mut stream = video(2, AviCodec::UNCOMPRESSED);
        stream.set_name(Some("screen".into())).unwrap();
        stream.freeze();

        assert!(matches!(
            stream.set_name(Some("other".into())),
            Err(MuxError::StreamFrozen { stream: 2 })
        ));
        assert!(matches!(
            stream.set_width(640),
            Err(MuxError::StreamFrozen { .. })
        ));
        assert!(matches!(
            stream.set_codec(AviCodec::X264),
            Err(MuxError::StreamFrozen { .. })
        ));
        assert_eq!(stream.name(), Some("screen"));
        assert_eq!(stream.video_props().map(|v| v.width), Some(320));
    }

    #[test]
    fn test_encoder_defined_properties() {
        let mut stream = StreamInfo::video(
            0,
            VideoProps {
                width: 16,
                height: 16,
                bits_per_pixel: BitsPerPixel::Bpp24,
                codec: AviCodec::UNCOMPRESSED,
            },
            true,
        );
        assert!(matches!(
            stream.set_codec(AviCodec::MOTION_JPEG),
            Err(MuxError::DefinedByEncoder {
                property: "codec",
                ..
            })
        ));
        // geometry stays settable
        stream.set_width(32).unwrap();

        let mut audio = StreamInfo::audio(1, WaveFormat::default(), true);
        assert!(matches!(
            audio.set_wave_format(WaveFormat::pcm(8_000, 8, 1)),
            Err(MuxError::DefinedByEncoder { .. })
        ));
    }

    #[test]
    fn test_kind_mismatch() {
        let mut audio = StreamInfo::audio(0, WaveFormat::default(), false);
        assert!(matches!(
            audio.set_width(10),
            Err(MuxError::InvalidConfig(_))
        ));
        assert!(!audio.is_video());
    }
}
