//! Video codec identifiers and pixel depths for AVI streams.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::types::FourCc;

/// A video codec as identified in AVI stream headers.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct AviCodec {
    pub fourcc: FourCc,
    pub name: &'static str,
}

impl AviCodec {
    pub const UNCOMPRESSED: Self = Self::new(FourCc::NULL, "Uncompressed");
    pub const MOTION_JPEG: Self = Self::new(FourCc::new(b"MJPG"), "Motion JPEG");
    pub const MS_MPEG4_V3: Self = Self::new(FourCc::new(b"MP43"), "Microsoft MPEG-4 v3");
    pub const MS_MPEG4_V2: Self = Self::new(FourCc::new(b"MP42"), "Microsoft MPEG-4 v2");
    pub const XVID: Self = Self::new(FourCc::new(b"XVID"), "Xvid MPEG-4");
    pub const DIVX: Self = Self::new(FourCc::new(b"DIVX"), "DivX MPEG-4");
    pub const X264: Self = Self::new(FourCc::new(b"X264"), "x264 H.264/MPEG-4 AVC");

    pub const fn new(fourcc: FourCc, name: &'static str) -> Self {
        Self { fourcc, name }
    }

    pub fn is_uncompressed(self) -> bool {
        self.fourcc.is_null()
    }

    /// All codecs known by name.
    pub fn known() -> &'static [AviCodec] {
        &[
            Self::UNCOMPRESSED,
            Self::MOTION_JPEG,
            Self::MS_MPEG4_V3,
            Self::MS_MPEG4_V2,
            Self::XVID,
            Self::DIVX,
            Self::X264,
        ]
    }

    pub fn from_fourcc(fourcc: FourCc) -> Option<Self> {
        Self::known().iter().copied().find(|c| c.fourcc == fourcc)
    }
}

impl Default for AviCodec {
    fn default() -> Self {
        Self::UNCOMPRESSED
    }
}

impl fmt::Display for AviCodec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

/// Bits per pixel of a video stream's frames.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BitsPerPixel {
    /// 8-bit palettized. Uncompressed streams get a grayscale palette.
    Bpp8,
    Bpp16,
    Bpp24,
    #[default]
    Bpp32,
}

impl BitsPerPixel {
    pub fn bits(self) -> u16 {
        match self {
            Self::Bpp8 => 8,
            Self::Bpp16 => 16,
            Self::Bpp24 => 24,
            Self::Bpp32 => 32,
        }
    }

    pub fn from_bits(bits: u16) -> Option<Self> {
        match bits {
            8 => Some(Self::Bpp8),
            16 => Some(Self::Bpp16),
            24 => Some(Self::Bpp24),
            32 => Some(Self::Bpp32),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uncompressed_is_null_fourcc() {
        assert!(AviCodec::UNCOMPRESSED.is_uncompressed());
        assert!(!AviCodec::MOTION_JPEG.is_uncompressed());
        assert_eq!(AviCodec::default(), AviCodec::UNCOMPRESSED);
    }

    #[test]
    fn lookup_by_fourcc() {
        assert_eq!(
            AviCodec::from_fourcc(FourCc::new(b"XVID")),
            Some(AviCodec::XVID)
        );
        assert_eq!(AviCodec::from_fourcc(FourCc::new(b"H265")), None);
    }

    #[test]
    fn bits_per_pixel_round_trip() {
        for bpp in [
            BitsPerPixel::Bpp8,
            BitsPerPixel::Bpp16,
            BitsPerPixel::Bpp24,
            BitsPerPixel::Bpp32,
        ] {
            assert_eq!(BitsPerPixel::from_bits(bpp.bits()), Some(bpp));
        }
        assert_eq!(BitsPerPixel::from_bits(12), None);
    }
}
