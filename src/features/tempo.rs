//! Autocorrelation-based tempo estimation
//!
//! Finds the dominant periodicity of the onset envelope, with half/double
//! tempo disambiguation.
//!
//! # Algorithm
//!
//! 1. Convert the admissible BPM range to a lag range in frames:
//!    `lag = 60 * sample_rate / (bpm * hop)`
//! 2. Compute the normalized autocorrelation of the onset envelope over that
//!    lag range: `ac[lag] = (1/count) Σ_i onset[i] * onset[i + lag]`
//! 3. Pick local maxima as tempo candidates
//! 4. Check the strongest peak against peaks near double and half its lag;
//!    when the primary lands outside the configured "normal" BPM band and a
//!    comparable-strength octave partner lands inside it, prefer the partner
//! 5. Confidence is the winning correlation normalized by the envelope's
//!    mean self-energy, clamped to [0, 1]
//!
//! A flat envelope (silence, constant spectrum) is not an error: the
//! estimator returns the configured default BPM with zero confidence, since
//! tempo is inherently unknowable for such signals.

use serde::{Deserialize, Serialize};

use crate::config::EngineConfig;
use crate::features::onset::OnsetEnvelope;

const EPSILON: f32 = 1e-10;

/// Relative lag tolerance when matching a peak to double/half the primary lag
const OCTAVE_LAG_TOLERANCE: f32 = 0.1;

/// One tempo hypothesis
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TempoCandidate {
    /// Tempo in beats per minute
    pub bpm: f32,

    /// Autocorrelation strength at this candidate's lag
    pub strength: f32,
}

/// Tempo estimate with alternatives
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TempoEstimate {
    /// Best tempo in beats per minute, within the configured admissible range
    pub bpm: f32,

    /// Confidence in [0, 1]; zero for degenerate signals
    pub confidence: f32,

    /// All candidate peaks, sorted by strength descending
    pub candidates: Vec<TempoCandidate>,
}

/// Convert a BPM value to its autocorrelation lag in frames
pub fn bpm_to_lag(bpm: f32, sample_rate: u32, hop: usize) -> f32 {
    60.0 * sample_rate as f32 / (bpm * hop as f32)
}

/// Convert an autocorrelation lag in frames to BPM
pub fn lag_to_bpm(lag: f32, sample_rate: u32, hop: usize) -> f32 {
    60.0 * sample_rate as f32 / (lag * hop as f32)
}

/// Estimate tempo from an onset envelope
///
/// Never fails: degenerate envelopes yield `confidence = 0.0` and
/// `config.default_bpm` with an empty candidate list.
pub fn estimate_tempo(envelope: &OnsetEnvelope, config: &EngineConfig) -> TempoEstimate {
    if envelope.is_empty() || envelope.is_flat() {
        log::debug!("Flat or empty onset envelope, tempo is unknowable");
        return TempoEstimate {
            bpm: config.default_bpm,
            confidence: 0.0,
            candidates: vec![],
        };
    }

    let sr = envelope.sample_rate;
    let hop = envelope.hop;
    let min_lag = bpm_to_lag(config.max_bpm, sr, hop).floor().max(1.0) as usize;
    let max_lag = bpm_to_lag(config.min_bpm, sr, hop).ceil() as usize;
    let strengths = &envelope.strengths;

    // Need at least one full period of material beyond the longest lag
    if strengths.len() <= min_lag + 1 || min_lag >= max_lag {
        log::warn!(
            "Envelope too short for tempo estimation: {} frames, lag range [{}, {}]",
            strengths.len(),
            min_lag,
            max_lag
        );
        return TempoEstimate {
            bpm: config.default_bpm,
            confidence: 0.0,
            candidates: vec![],
        };
    }
    let max_lag = max_lag.min(strengths.len() - 2);

    let ac = normalized_autocorrelation(strengths, min_lag, max_lag);

    // Mean self-energy normalizes confidence across loudness levels
    let self_energy =
        strengths.iter().map(|&s| s * s).sum::<f32>() / strengths.len() as f32;
    if self_energy < EPSILON {
        return TempoEstimate {
            bpm: config.default_bpm,
            confidence: 0.0,
            candidates: vec![],
        };
    }

    let peaks = find_local_maxima(&ac, min_lag);
    if peaks.is_empty() {
        log::debug!("No autocorrelation peaks in lag range [{}, {}]", min_lag, max_lag);
        return TempoEstimate {
            bpm: config.default_bpm,
            confidence: 0.0,
            candidates: vec![],
        };
    }

    let mut candidates: Vec<(usize, f32)> = peaks;
    candidates.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));

    let (primary_lag, primary_strength) = candidates[0];
    let (best_lag, best_strength) = correct_octave_error(
        (primary_lag, primary_strength),
        &candidates,
        sr,
        hop,
        config,
    );

    let bpm = lag_to_bpm(best_lag as f32, sr, hop).clamp(config.min_bpm, config.max_bpm);
    let confidence = (best_strength / self_energy).clamp(0.0, 1.0);

    let candidate_list: Vec<TempoCandidate> = candidates
        .iter()
        .map(|&(lag, strength)| TempoCandidate {
            bpm: lag_to_bpm(lag as f32, sr, hop),
            strength,
        })
        .collect();

    log::debug!(
        "Tempo estimate: {:.1} BPM (confidence {:.3}, {} candidates)",
        bpm,
        confidence,
        candidate_list.len()
    );

    TempoEstimate {
        bpm,
        confidence,
        candidates: candidate_list,
    }
}

/// Normalized autocorrelation over `[min_lag, max_lag]` inclusive
///
/// `ac[lag - min_lag] = (1/count) Σ_i x[i] * x[i + lag]`
fn normalized_autocorrelation(x: &[f32], min_lag: usize, max_lag: usize) -> Vec<f32> {
    let mut ac = Vec::with_capacity(max_lag - min_lag + 1);
    for lag in min_lag..=max_lag {
        let count = x.len() - lag;
        if count == 0 {
            ac.push(0.0);
            continue;
        }
        let sum: f32 = (0..count).map(|i| x[i] * x[i + lag]).sum();
        ac.push(sum / count as f32);
    }
    ac
}

/// Local maxima of `ac`, returned as `(absolute_lag, value)` pairs
fn find_local_maxima(ac: &[f32], lag_offset: usize) -> Vec<(usize, f32)> {
    let mut peaks = Vec::new();
    if ac.len() < 3 {
        return peaks;
    }
    let max_value = ac.iter().copied().fold(0.0f32, f32::max);
    if max_value < EPSILON {
        return peaks;
    }
    for i in 1..ac.len() - 1 {
        if ac[i] > ac[i - 1] && ac[i] >= ac[i + 1] && ac[i] > max_value * 0.1 {
            peaks.push((i + lag_offset, ac[i]));
        }
    }
    peaks
}

/// Half/double tempo disambiguation
///
/// When the primary peak's BPM falls outside the configured "normal" band and
/// a peak near 2x or 0.5x its lag carries at least `octave_threshold` of its
/// strength with a BPM inside the band, the partner wins.
fn correct_octave_error(
    primary: (usize, f32),
    candidates: &[(usize, f32)],
    sample_rate: u32,
    hop: usize,
    config: &EngineConfig,
) -> (usize, f32) {
    let (primary_lag, primary_strength) = primary;
    let primary_bpm = lag_to_bpm(primary_lag as f32, sample_rate, hop);
    let (band_lo, band_hi) = config.normal_bpm_band;

    if primary_bpm >= band_lo && primary_bpm <= band_hi {
        return primary;
    }

    for &factor in &[2.0f32, 0.5] {
        let target_lag = primary_lag as f32 * factor;
        let partner = candidates.iter().find(|&&(lag, strength)| {
            let rel_err = (lag as f32 - target_lag).abs() / target_lag;
            rel_err <= OCTAVE_LAG_TOLERANCE && strength >= config.octave_threshold * primary_strength
        });
        if let Some(&(lag, strength)) = partner {
            let partner_bpm = lag_to_bpm(lag as f32, sample_rate, hop);
            if partner_bpm >= band_lo && partner_bpm <= band_hi {
                log::debug!(
                    "Octave correction: {:.1} BPM -> {:.1} BPM (factor {})",
                    primary_bpm,
                    partner_bpm,
                    factor
                );
                return (lag, strength);
            }
        }
    }

    primary
}
