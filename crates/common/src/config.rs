//! Encoder configuration structs.

use serde::{Deserialize, Serialize};

use crate::error::EncodeError;

/// Output bit rates the MP3 encoder accepts, in kbps.
pub const MP3_SUPPORTED_BIT_RATES: [u32; 6] = [64, 96, 128, 160, 192, 320];

/// MP3 encoder configuration. Input is 16-bit interleaved PCM.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Mp3EncoderConfig {
    /// 1 (mono) or 2 (stereo).
    pub channels: u16,
    pub sample_rate: u32,
    /// Must be one of [`MP3_SUPPORTED_BIT_RATES`].
    pub bit_rate_kbps: u32,
}

impl Mp3EncoderConfig {
    pub fn validate(&self) -> Result<(), EncodeError> {
        if !matches!(self.channels, 1 | 2) {
            return Err(EncodeError::Unsupported(format!(
                "{} channels (MP3 supports 1 or 2)",
                self.channels
            )));
        }
        if self.sample_rate == 0 {
            return Err(EncodeError::Unsupported("sample rate 0".into()));
        }
        if !MP3_SUPPORTED_BIT_RATES.contains(&self.bit_rate_kbps) {
            return Err(EncodeError::Unsupported(format!(
                "MP3 bit rate {} kbps",
                self.bit_rate_kbps
            )));
        }
        Ok(())
    }
}

impl Default for Mp3EncoderConfig {
    fn default() -> Self {
        Self {
            channels: 2,
            sample_rate: 44_100,
            bit_rate_kbps: 160,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_valid() {
        let config = Mp3EncoderConfig::default();
        assert_eq!(config.bit_rate_kbps, 160);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn rejects_unsupported_bit_rate() {
        let config = Mp3EncoderConfig {
            bit_rate_kbps: 112,
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(EncodeError::Unsupported(_))
        ));
    }

    #[test]
    fn rejects_surround() {
        let config = Mp3EncoderConfig {
            channels: 6,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
