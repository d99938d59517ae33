//! Audio stream format descriptors (WAVEFORMATEX).

use byteorder::{LittleEndian, WriteBytesExt};
use serde::{Deserialize, Serialize};
use std::io::{self, Write};

/// `wFormatTag` values.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum WaveEncoding {
    Pcm,
    IeeeFloat,
    MpegLayer3,
    Other(u16),
}

impl WaveEncoding {
    pub fn tag(self) -> u16 {
        match self {
            Self::Pcm => 0x0001,
            Self::IeeeFloat => 0x0003,
            Self::MpegLayer3 => 0x0055,
            Self::Other(tag) => tag,
        }
    }
}

/// MP3 padding policy stored in the MPEGLAYER3 extra data.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Mp3Padding {
    /// Pad as needed to reach the stated average bit rate.
    Iso,
    On,
    #[default]
    Off,
}

impl Mp3Padding {
    fn flags(self) -> u32 {
        match self {
            Self::Iso => 0,
            Self::On => 1,
            Self::Off => 2,
        }
    }
}

/// Wave format of an audio stream, written verbatim as the stream's `strf`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WaveFormat {
    pub encoding: WaveEncoding,
    pub channels: u16,
    pub sample_rate: u32,
    pub average_bytes_per_second: u32,
    pub block_align: u16,
    pub bits_per_sample: u16,
    /// Codec-specific bytes following `cbSize`.
    pub extra: Vec<u8>,
}

impl WaveFormat {
    /// Size of the fixed WAVEFORMATEX part, including `cbSize`.
    pub const BASE_SIZE: usize = 18;

    /// Integer PCM with interleaved channels.
    pub fn pcm(sample_rate: u32, bits_per_sample: u16, channels: u16) -> Self {
        let block_align = channels * (bits_per_sample / 8);
        Self {
            encoding: WaveEncoding::Pcm,
            channels,
            sample_rate,
            average_bytes_per_second: sample_rate * block_align as u32,
            block_align,
            bits_per_sample,
            extra: Vec::new(),
        }
    }

    /// 32-bit IEEE float samples.
    pub fn ieee_float(sample_rate: u32, channels: u16) -> Self {
        let block_align = 4 * channels;
        Self {
            encoding: WaveEncoding::IeeeFloat,
            channels,
            sample_rate,
            average_bytes_per_second: sample_rate * block_align as u32,
            block_align,
            bits_per_sample: 32,
            extra: Vec::new(),
        }
    }

    /// Constant bit rate MPEG layer 3.
    ///
    /// `block_size` is the encoder's frame size in samples and `encoder_delay`
    /// its start-up delay in samples. Both are stored in the MPEGLAYER3 extra
    /// data.
    pub fn mp3(
        sample_rate: u32,
        channels: u16,
        bit_rate_kbps: u32,
        block_size: u16,
        encoder_delay: u16,
        padding: Mp3Padding,
    ) -> Self {
        let mut extra = Vec::with_capacity(12);
        extra.extend_from_slice(&1u16.to_le_bytes()); // MPEGLAYER3_ID_MPEG
        extra.extend_from_slice(&padding.flags().to_le_bytes());
        extra.extend_from_slice(&block_size.to_le_bytes());
        extra.extend_from_slice(&1u16.to_le_bytes()); // frames per block
        extra.extend_from_slice(&encoder_delay.to_le_bytes());

        Self {
            encoding: WaveEncoding::MpegLayer3,
            channels,
            sample_rate,
            average_bytes_per_second: bit_rate_kbps * 1000 / 8,
            block_align: 1,
            bits_per_sample: 0,
            extra,
        }
    }

    /// Serialized size in bytes.
    pub fn byte_size(&self) -> usize {
        Self::BASE_SIZE + self.extra.len()
    }

    pub fn write_to<W: Write + ?Sized>(&self, w: &mut W) -> io::Result<()> {
        w.write_u16::<LittleEndian>(self.encoding.tag())?;
        w.write_u16::<LittleEndian>(self.channels)?;
        w.write_u32::<LittleEndian>(self.sample_rate)?;
        w.write_u32::<LittleEndian>(self.average_bytes_per_second)?;
        w.write_u16::<LittleEndian>(self.block_align)?;
        w.write_u16::<LittleEndian>(self.bits_per_sample)?;
        w.write_u16::<LittleEndian>(self.extra.len() as u16)?;
        w.write_all(&self.extra)
    }
}

impl Default for WaveFormat {
    fn default() -> Self {
        Self::pcm(44_100, 16, 2)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pcm_derived_fields() {
        let f = WaveFormat::pcm(48_000, 16, 2);
        assert_eq!(f.block_align, 4);
        assert_eq!(f.average_bytes_per_second, 192_000);
        assert_eq!(f.byte_size(), 18);
    }

    #[test]
    fn ieee_float_derived_fields() {
        let f = WaveFormat::ieee_float(44_100, 1);
        assert_eq!(f.encoding.tag(), 3);
        assert_eq!(f.block_align, 4);
        assert_eq!(f.bits_per_sample, 32);
    }

    #[test]
    fn pcm_serialization_layout() {
        let mut buf = Vec::new();
        WaveFormat::pcm(44_100, 16, 2).write_to(&mut buf).unwrap();
        assert_eq!(buf.len(), 18);
        assert_eq!(&buf[0..2], &1u16.to_le_bytes());
        assert_eq!(&buf[2..4], &2u16.to_le_bytes());
        assert_eq!(&buf[4..8], &44_100u32.to_le_bytes());
        assert_eq!(&buf[8..12], &176_400u32.to_le_bytes());
        assert_eq!(&buf[16..18], &0u16.to_le_bytes());
    }

    #[test]
    fn mp3_extra_data() {
        let f = WaveFormat::mp3(44_100, 2, 160, 1152, 576, Mp3Padding::Off);
        assert_eq!(f.average_bytes_per_second, 20_000);
        assert_eq!(f.extra.len(), 12);
        assert_eq!(f.byte_size(), 30);

        let mut buf = Vec::new();
        f.write_to(&mut buf).unwrap();
        assert_eq!(&buf[0..2], &0x55u16.to_le_bytes());
        assert_eq!(&buf[16..18], &12u16.to_le_bytes());
        // id, padding flags, block size, frames per block, delay
        assert_eq!(&buf[18..20], &1u16.to_le_bytes());
        assert_eq!(&buf[20..24], &2u32.to_le_bytes());
        assert_eq!(&buf[24..26], &1152u16.to_le_bytes());
        assert_eq!(&buf[26..28], &1u16.to_le_bytes());
        assert_eq!(&buf[28..30], &576u16.to_le_bytes());
    }
}
