//! Loop boundary refinement
//!
//! Snaps tentative loop boundaries to nearby zero crossings so the seam cuts
//! the waveform where it changes sign, avoiding an audible click. When a
//! boundary has no zero crossing within the search window, the refiner keeps
//! the boundary (preserving musical timing) and emits a short equal-power
//! crossfade to be applied at playback time instead.

use serde::{Deserialize, Serialize};

use crate::config::EngineConfig;
use crate::error::AnalysisError;

/// Equal-power crossfade to apply across the loop seam at playback time
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CrossfadeSpec {
    /// Crossfade length in samples
    pub fade_samples: usize,
}

impl CrossfadeSpec {
    /// Fade-in and fade-out gain envelopes
    ///
    /// Equal-power law: `in[i] = sin(π/2 · i/(n-1))`, `out[i] = cos(π/2 ·
    /// i/(n-1))`, so `in² + out² = 1` at every sample.
    pub fn envelopes(&self) -> (Vec<f32>, Vec<f32>) {
        let n = self.fade_samples;
        if n == 0 {
            return (vec![], vec![]);
        }
        if n == 1 {
            return (vec![1.0], vec![0.0]);
        }
        let denom = (n - 1) as f32;
        let mut fade_in = Vec::with_capacity(n);
        let mut fade_out = Vec::with_capacity(n);
        for i in 0..n {
            let theta = std::f32::consts::FRAC_PI_2 * i as f32 / denom;
            fade_in.push(theta.sin());
            fade_out.push(theta.cos());
        }
        (fade_in, fade_out)
    }
}

/// A refined loop boundary pair
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RefinedLoop {
    /// First sample of the loop
    pub start: usize,

    /// One past the last sample of the loop
    pub end: usize,

    /// Present when one or both boundaries had no zero crossing in range
    pub crossfade: Option<CrossfadeSpec>,
}

/// Snap `(start, end)` to nearby zero crossings
///
/// Searches ±`config.zero_cross_window_ms` around each boundary for the
/// nearest adjacent-sample sign change. Boundaries with a crossing in range
/// are moved to it; if either has none, both boundaries stay put and a
/// crossfade of `min(config.crossfade_ms, loop_len/4)` samples is emitted.
///
/// The returned indices are always within the search window of the inputs
/// and preserve `start < end`.
///
/// # Errors
///
/// `InvalidParameter` if `start >= end` or `end > signal.len()`.
pub fn refine_boundaries(
    signal: &[f32],
    start: usize,
    end: usize,
    sample_rate: u32,
    config: &EngineConfig,
) -> Result<RefinedLoop, AnalysisError> {
    if start >= end {
        return Err(AnalysisError::InvalidParameter(format!(
            "inverted loop bounds: start {} >= end {}",
            start, end
        )));
    }
    if end > signal.len() {
        return Err(AnalysisError::InvalidParameter(format!(
            "loop end {} past signal length {}",
            end,
            signal.len()
        )));
    }

    let window = (config.zero_cross_window_ms / 1000.0 * sample_rate as f32).round() as usize;
    let snapped_start = nearest_zero_crossing(signal, start, window);
    let snapped_end = nearest_zero_crossing(signal, end, window);

    match (snapped_start, snapped_end) {
        (Some(s), Some(e)) if s < e => Ok(RefinedLoop {
            start: s,
            end: e,
            crossfade: None,
        }),
        _ => {
            let loop_len = end - start;
            let fade = ((config.crossfade_ms / 1000.0 * sample_rate as f32) as usize)
                .min(loop_len / 4)
                .max(1);
            log::debug!(
                "No usable zero crossing near ({}, {}), emitting {}-sample crossfade",
                start,
                end,
                fade
            );
            Ok(RefinedLoop {
                start,
                end,
                crossfade: Some(CrossfadeSpec { fade_samples: fade }),
            })
        }
    }
}

/// Nearest sample index within ±`window` of `pos` where the signal crosses
/// zero between adjacent samples
///
/// A crossing at index `i` means `signal[i-1]` and `signal[i]` have strictly
/// opposite signs, or `signal[i]` is exactly zero. Returns `None` when no
/// crossing lies in range.
pub fn nearest_zero_crossing(signal: &[f32], pos: usize, window: usize) -> Option<usize> {
    if signal.is_empty() {
        return None;
    }
    let pos = pos.min(signal.len() - 1);

    for offset in 0..=window {
        for candidate in [pos.checked_sub(offset), Some(pos + offset)]
            .into_iter()
            .flatten()
        {
            if candidate >= signal.len() {
                continue;
            }
            if is_zero_crossing(signal, candidate) {
                return Some(candidate);
            }
        }
    }
    None
}

fn is_zero_crossing(signal: &[f32], i: usize) -> bool {
    if signal[i] == 0.0 {
        return true;
    }
    if i == 0 {
        return false;
    }
    (signal[i - 1] < 0.0 && signal[i] > 0.0) || (signal[i - 1] > 0.0 && signal[i] < 0.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sine(n: usize, period: f32) -> Vec<f32> {
        (0..n)
            .map(|i| (2.0 * std::f32::consts::PI * i as f32 / period).sin())
            .collect()
    }

    #[test]
    fn test_snaps_to_sign_change() {
        // Sine with period 100: crossings every 50 samples
        let signal = sine(4000, 100.0);
        let refined =
            refine_boundaries(&signal, 130, 2130, 44100, &EngineConfig::default()).unwrap();
        assert!(refined.crossfade.is_none());
        // 130 is within 10 ms (441 samples) of the crossing at 150
        assert!(refined.start.abs_diff(130) <= 441);
        assert!(refined.end.abs_diff(2130) <= 441);
        assert!(refined.start < refined.end);
        // Snapped positions straddle a sign change (or are exact zeros)
        assert!(is_zero_crossing(&signal, refined.start));
        assert!(is_zero_crossing(&signal, refined.end));
    }

    #[test]
    fn test_within_window_bound() {
        let signal = sine(44100, 441.0);
        let cfg = EngineConfig::default();
        let window = (cfg.zero_cross_window_ms / 1000.0 * 44100.0) as usize;
        for (s, e) in [(1000, 9000), (137, 22050), (5, 40000)] {
            let refined = refine_boundaries(&signal, s, e, 44100, &cfg).unwrap();
            assert!(refined.start.abs_diff(s) <= window);
            assert!(refined.end.abs_diff(e) <= window);
        }
    }

    #[test]
    fn test_dc_signal_gets_crossfade() {
        // All-positive signal has no zero crossing anywhere
        let signal = vec![0.8f32; 44100];
        let refined =
            refine_boundaries(&signal, 1000, 23050, 44100, &EngineConfig::default()).unwrap();
        assert_eq!(refined.start, 1000);
        assert_eq!(refined.end, 23050);
        let fade = refined.crossfade.expect("crossfade for DC signal");
        // <= 10 ms
        assert!(fade.fade_samples <= 441);
        assert!(fade.fade_samples >= 1);
    }

    #[test]
    fn test_crossfade_capped_by_loop_length() {
        let signal = vec![0.5f32; 44100];
        let refined =
            refine_boundaries(&signal, 0, 400, 44100, &EngineConfig::default()).unwrap();
        let fade = refined.crossfade.unwrap();
        assert!(fade.fade_samples <= 100);
    }

    #[test]
    fn test_equal_power_envelopes() {
        let spec = CrossfadeSpec { fade_samples: 64 };
        let (fade_in, fade_out) = spec.envelopes();
        assert_eq!(fade_in.len(), 64);
        assert_eq!(fade_out.len(), 64);
        assert!(fade_in[0].abs() < 1e-6);
        assert!((fade_in[63] - 1.0).abs() < 1e-6);
        for i in 0..64 {
            let power = fade_in[i] * fade_in[i] + fade_out[i] * fade_out[i];
            assert!((power - 1.0).abs() < 1e-5);
        }
    }

    #[test]
    fn test_inverted_bounds_rejected() {
        let signal = sine(1000, 100.0);
        assert!(matches!(
            refine_boundaries(&signal, 500, 500, 44100, &EngineConfig::default()),
            Err(AnalysisError::InvalidParameter(_))
        ));
        assert!(matches!(
            refine_boundaries(&signal, 0, 2000, 44100, &EngineConfig::default()),
            Err(AnalysisError::InvalidParameter(_))
        ));
    }
}
