//! Writer configuration.

use serde::{Deserialize, Serialize};

use crate::error::{MuxError, MuxResult};
use crate::index::MAX_STANDARD_INDEX_ENTRIES;

const MIB: u64 = 1024 * 1024;

/// Configuration for an [`AviWriter`](crate::AviWriter).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MuxerConfig {
    /// Frame rate of video streams. Rounded to 3 fractional digits when
    /// writing starts.
    pub frames_per_second: f64,
    /// Emit the legacy `idx1` index after the first RIFF segment, for
    /// players that do not understand OpenDML indexes.
    pub emit_legacy_index: bool,
    /// Standard index entries per stream before an `ixNN` chunk is flushed.
    pub max_standard_index_entries: usize,
    /// Size budget of the first (`AVI `) RIFF segment.
    pub first_segment_threshold: u64,
    /// Size budget of every following (`AVIX`) RIFF segment.
    pub extended_segment_threshold: u64,
}

impl MuxerConfig {
    pub fn validate(&self) -> MuxResult<()> {
        if !self.frames_per_second.is_finite() || self.frames_per_second <= 0.0 {
            return Err(MuxError::InvalidConfig(format!(
                "frame rate must be positive, got {}",
                self.frames_per_second
            )));
        }
        if Self::round_frame_rate(self.frames_per_second) <= 0.0 {
            return Err(MuxError::InvalidConfig(format!(
                "frame rate {} rounds to zero",
                self.frames_per_second
            )));
        }
        if self.max_standard_index_entries == 0 {
            return Err(MuxError::InvalidConfig(
                "standard index capacity must be at least 1".into(),
            ));
        }
        for (name, threshold) in [
            ("first segment threshold", self.first_segment_threshold),
            ("extended segment threshold", self.extended_segment_threshold),
        ] {
            if threshold == 0 || threshold > u32::MAX as u64 {
                return Err(MuxError::InvalidConfig(format!(
                    "{name} must be between 1 and {} bytes, got {threshold}",
                    u32::MAX
                )));
            }
        }
        Ok(())
    }

    fn round_frame_rate(fps: f64) -> f64 {
        (fps * 1000.0).round() / 1000.0
    }
}

impl Default for MuxerConfig {
    fn default() -> Self {
        Self {
            frames_per_second: 1.0,
            emit_legacy_index: false,
            max_standard_index_entries: MAX_STANDARD_INDEX_ENTRIES,
            first_segment_threshold: 512 * MIB,
            extended_segment_threshold: i32::MAX as u64 - MIB,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = MuxerConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.first_segment_threshold, 536_870_912);
        assert_eq!(config.extended_segment_threshold, 2_146_435_071);
        assert_eq!(config.max_standard_index_entries, 15_000);
    }

    #[test]
    fn test_rejects_bad_frame_rates() {
        for fps in [0.0, -5.0, f64::NAN, f64::INFINITY, 0.0001] {
            let config = MuxerConfig {
                frames_per_second: fps,
                ..Default::default()
            };
            assert!(
                matches!(config.validate(), Err(MuxError::InvalidConfig(_))),
                "fps {fps} accepted"
            );
        }
    }

    #[test]
    fn test_rejects_zero_capacity_and_oversized_segments() {
        let config = MuxerConfig {
            max_standard_index_entries: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = MuxerConfig {
            extended_segment_threshold: 5 * 1024 * MIB,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
