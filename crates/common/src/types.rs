//! Core value types with newtype pattern for type safety.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Four-character code identifying RIFF chunks, list types, and codecs.
///
/// Stored as the raw bytes in file order, so `FourCc(*b"avih")` is written
/// to disk as `a v i h`.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FourCc(pub [u8; 4]);

impl FourCc {
    /// The all-zero code, used as the "codec" of uncompressed video.
    pub const NULL: Self = Self([0; 4]);

    /// Number of stream indexes the two-digit tag forms can encode.
    pub const INDEX_LIMIT: usize = 100;

    pub const fn new(code: &[u8; 4]) -> Self {
        Self(*code)
    }

    /// Build a code from a two-digit stream index and a two-byte suffix,
    /// e.g. `(1, b"wb")` gives `01wb`.
    pub fn indexed(index: usize, suffix: &[u8; 2]) -> Self {
        debug_assert!(index < Self::INDEX_LIMIT, "stream index {index} has no two-digit tag");
        Self([
            b'0' + (index / 10) as u8,
            b'0' + (index % 10) as u8,
            suffix[0],
            suffix[1],
        ])
    }

    /// Build a code from a two-byte prefix and a two-digit stream index,
    /// e.g. `(b"ix", 3)` gives `ix03`.
    pub fn prefixed(prefix: &[u8; 2], index: usize) -> Self {
        debug_assert!(index < Self::INDEX_LIMIT, "stream index {index} has no two-digit tag");
        Self([
            prefix[0],
            prefix[1],
            b'0' + (index / 10) as u8,
            b'0' + (index % 10) as u8,
        ])
    }

    pub fn as_bytes(&self) -> &[u8; 4] {
        &self.0
    }

    /// Little-endian numeric value, as the code appears in `u32` header fields.
    pub fn as_u32(self) -> u32 {
        u32::from_le_bytes(self.0)
    }

    pub fn is_null(self) -> bool {
        self == Self::NULL
    }
}

impl fmt::Display for FourCc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for &b in &self.0 {
            if b.is_ascii_graphic() || b == b' ' {
                write!(f, "{}", b as char)?;
            } else {
                write!(f, "\\x{b:02x}")?;
            }
        }
        Ok(())
    }
}

/// Rational number for frame rates (e.g., 30000/1001 for 29.97fps).
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Rational {
    pub num: u32,
    pub den: u32,
}

impl Rational {
    pub const FPS_1: Self = Self { num: 1, den: 1 };
    pub const FPS_10: Self = Self { num: 10, den: 1 };
    pub const FPS_25: Self = Self { num: 25, den: 1 };
    pub const FPS_30: Self = Self { num: 30, den: 1 };

    pub fn new(num: u32, den: u32) -> Self {
        assert!(den > 0, "Rational denominator must be > 0");
        Self { num, den }
    }

    /// Split a decimal frame rate into the `rate / scale` pair stored in AVI
    /// headers.
    ///
    /// The value is rounded to 3 fractional digits and expressed with the
    /// smallest power-of-ten denominator that represents it exactly. Common
    /// factors of 2 and 5 are then removed, as some hardware players reject
    /// pairs that are not mutually prime.
    pub fn from_frame_rate(fps: f64) -> Self {
        let millis = (fps * 1000.0).round().max(0.0) as u64;

        let (mut num, mut den) = if millis % 1000 == 0 {
            (millis / 1000, 1)
        } else if millis % 100 == 0 {
            (millis / 100, 10)
        } else if millis % 10 == 0 {
            (millis / 10, 100)
        } else {
            (millis, 1000)
        };

        for factor in [2, 5] {
            while num % factor == 0 && den % factor == 0 {
                num /= factor;
                den /= factor;
            }
        }

        Self {
            num: num.min(u32::MAX as u64) as u32,
            den: den as u32,
        }
    }

    pub fn as_f64(self) -> f64 {
        self.num as f64 / self.den as f64
    }
}

impl fmt::Display for Rational {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.den == 1 {
            write!(f, "{}", self.num)
        } else {
            write!(f, "{}/{}", self.num, self.den)
        }
    }
}

/// Video frame dimensions.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

impl Resolution {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn pixel_count(self) -> u64 {
        self.width as u64 * self.height as u64
    }

    /// Byte size for top-down BGR32 pixel data, the format capture providers hand over.
    pub fn bgr32_byte_size(self) -> usize {
        self.width as usize * self.height as usize * 4
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}
