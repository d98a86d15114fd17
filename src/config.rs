//! Configuration parameters for loop analysis

use crate::error::AnalysisError;

/// Engine configuration parameters
///
/// All fields have documented defaults; construct with `EngineConfig::default()`
/// and override individual fields, then pass to [`crate::analyze`]. The entry
/// point validates the configuration before any processing.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    // STFT parameters
    /// Frame length for STFT (default: 2048)
    pub frame_len: usize,

    /// Hop length between consecutive frames (default: 512)
    pub hop: usize,

    // Tempo estimation
    /// Minimum BPM to consider (default: 60.0)
    pub min_bpm: f32,

    /// Maximum BPM to consider (default: 200.0)
    pub max_bpm: f32,

    /// BPM reported for degenerate signals where tempo is unknowable
    /// (default: 120.0)
    pub default_bpm: f32,

    /// Octave-error correction: a half/double-lag peak is preferred when its
    /// strength is at least this fraction of the primary peak's (default: 0.7)
    pub octave_threshold: f32,

    /// BPM band considered "normal"; octave correction only fires when the
    /// primary estimate falls outside it (default: 90.0..160.0)
    pub normal_bpm_band: (f32, f32),

    // Beat tracking
    /// Transition tightness for the dynamic-programming beat tracker; larger
    /// values penalize deviation from the beat period harder (default: 100.0)
    pub tightness: f32,

    /// Beats per bar for loop-length alignment (default: 4)
    pub beats_per_bar: u32,

    // Loop search
    /// Bar fractions/multiples tried as loop lengths
    /// (default: [0.125, 0.25, 0.5, 1, 2, 4, 8])
    pub bar_multiples: Vec<f32>,

    /// Minimum analyzable buffer duration in seconds; shorter buffers are
    /// rejected with `InsufficientLength`. Individual loop candidates may
    /// still be shorter than this when a sub-bar length fits best
    /// (default: 2.0)
    pub min_loop_s: f32,

    /// Maximum loop duration in seconds (default: 8.0)
    pub max_loop_s: f32,

    /// Tracks shorter than this get the full track length as an explicit
    /// loop candidate (default: 15.0 seconds)
    pub short_track_s: f32,

    /// Half-width of the zero-crossing search window around each loop
    /// boundary, in milliseconds (default: 10.0)
    pub zero_cross_window_ms: f32,

    /// Crossfade length used when no zero crossing is found in range,
    /// in milliseconds (default: 10.0)
    pub crossfade_ms: f32,

    // Structural fallback
    /// Bar-aligned candidate confidence below which the recurrence-matrix
    /// analyzer is consulted (default: 0.5)
    pub structure_fallback_threshold: f32,

    /// Number of time-delayed feature copies stacked for the recurrence
    /// matrix (default: 4)
    pub embed_steps: usize,

    /// Frame-count cap for the recurrence matrix; longer inputs are
    /// decimated before the O(n²) matrix is built (default: 2048)
    pub max_structure_frames: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            frame_len: 2048,
            hop: 512,
            min_bpm: 60.0,
            max_bpm: 200.0,
            default_bpm: 120.0,
            octave_threshold: 0.7,
            normal_bpm_band: (90.0, 160.0),
            tightness: 100.0,
            beats_per_bar: 4,
            bar_multiples: vec![0.125, 0.25, 0.5, 1.0, 2.0, 4.0, 8.0],
            min_loop_s: 2.0,
            max_loop_s: 8.0,
            short_track_s: 15.0,
            zero_cross_window_ms: 10.0,
            crossfade_ms: 10.0,
            structure_fallback_threshold: 0.5,
            embed_steps: 4,
            max_structure_frames: 2048,
        }
    }
}

impl EngineConfig {
    /// Validate the configuration
    ///
    /// # Errors
    ///
    /// Returns `AnalysisError::InvalidParameter` describing the first
    /// offending field. Invalid configurations are never silently corrected.
    pub fn validate(&self) -> Result<(), AnalysisError> {
        if self.frame_len <= 1 {
            return Err(AnalysisError::InvalidParameter(format!(
                "frame_len must be > 1, got {}",
                self.frame_len
            )));
        }
        if self.hop < 1 {
            return Err(AnalysisError::InvalidParameter(
                "hop must be >= 1".to_string(),
            ));
        }
        if self.hop > self.frame_len {
            return Err(AnalysisError::InvalidParameter(format!(
                "hop ({}) must not exceed frame_len ({})",
                self.hop, self.frame_len
            )));
        }
        if !(self.min_bpm > 0.0 && self.max_bpm > self.min_bpm) {
            return Err(AnalysisError::InvalidParameter(format!(
                "invalid BPM range: [{:.1}, {:.1}]",
                self.min_bpm, self.max_bpm
            )));
        }
        if !(self.default_bpm > 0.0) {
            return Err(AnalysisError::InvalidParameter(format!(
                "default_bpm must be positive, got {:.1}",
                self.default_bpm
            )));
        }
        if !(0.0..=1.0).contains(&self.octave_threshold) {
            return Err(AnalysisError::InvalidParameter(format!(
                "octave_threshold must be in [0, 1], got {:.2}",
                self.octave_threshold
            )));
        }
        if self.normal_bpm_band.0 >= self.normal_bpm_band.1 {
            return Err(AnalysisError::InvalidParameter(format!(
                "invalid normal BPM band: [{:.1}, {:.1}]",
                self.normal_bpm_band.0, self.normal_bpm_band.1
            )));
        }
        if !(self.tightness > 0.0) {
            return Err(AnalysisError::InvalidParameter(
                "tightness must be positive".to_string(),
            ));
        }
        if self.beats_per_bar == 0 {
            return Err(AnalysisError::InvalidParameter(
                "beats_per_bar must be >= 1".to_string(),
            ));
        }
        if self.bar_multiples.is_empty() || self.bar_multiples.iter().any(|&m| !(m > 0.0)) {
            return Err(AnalysisError::InvalidParameter(
                "bar_multiples must be non-empty and positive".to_string(),
            ));
        }
        if !(self.min_loop_s > 0.0 && self.max_loop_s > self.min_loop_s) {
            return Err(AnalysisError::InvalidParameter(format!(
                "invalid loop duration bounds: [{:.1}, {:.1}] s",
                self.min_loop_s, self.max_loop_s
            )));
        }
        if !(self.zero_cross_window_ms > 0.0) || !(self.crossfade_ms > 0.0) {
            return Err(AnalysisError::InvalidParameter(
                "boundary windows must be positive".to_string(),
            ));
        }
        if self.embed_steps == 0 {
            return Err(AnalysisError::InvalidParameter(
                "embed_steps must be >= 1".to_string(),
            ));
        }
        if self.max_structure_frames < 16 {
            return Err(AnalysisError::InvalidParameter(
                "max_structure_frames must be >= 16".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(EngineConfig::default().validate().is_ok());
    }

    #[test]
    fn test_rejects_bad_frame_len() {
        let cfg = EngineConfig {
            frame_len: 1,
            ..EngineConfig::default()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_rejects_hop_larger_than_frame() {
        let cfg = EngineConfig {
            hop: 4096,
            ..EngineConfig::default()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_rejects_inverted_bpm_range() {
        let cfg = EngineConfig {
            min_bpm: 200.0,
            max_bpm: 60.0,
            ..EngineConfig::default()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_rejects_inverted_loop_bounds() {
        let cfg = EngineConfig {
            min_loop_s: 8.0,
            max_loop_s: 2.0,
            ..EngineConfig::default()
        };
        assert!(cfg.validate().is_err());
    }
}
