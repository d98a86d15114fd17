//! Structural self-similarity analysis
//!
//! Fallback loop-length detector used when bar-aligned search scores poorly.
//! Builds banded spectral features per frame, stacks time-delayed copies of
//! each feature vector to capture short-term context, computes a cosine
//! self-similarity matrix, and remaps it into lag space where a long
//! contiguous run of high similarity at a fixed lag marks a repeating
//! structural block. The longest run's lag, snapped to the beat, becomes a
//! loop-length candidate.
//!
//! The recurrence matrix is O(frames²); inputs longer than
//! `config.max_structure_frames` are decimated first and detected lags are
//! scaled back up, so memory stays bounded for arbitrarily long tracks.

use crate::config::EngineConfig;
use crate::features::beat::BeatGrid;
use crate::looper::candidates::{adjacent_window_correlation, LoopCandidate};
use crate::spectral::stft::Spectrogram;

const EPSILON: f32 = 1e-10;

/// Number of log-spaced frequency bands per feature vector
const N_BANDS: usize = 16;

/// Cosine similarity above which two embedded frames count as recurrent
const SIMILARITY_THRESHOLD: f32 = 0.75;

/// Smallest lag considered, in (decimated) frames; excludes the trivial
/// near-diagonal band
const MIN_LAG_FRAMES: usize = 4;

/// Detect a repeating structural block and propose it as a loop candidate
///
/// Returns `None` when the input is too short for embedding or no lag shows
/// a sustained high-similarity run.
pub fn structural_candidate(
    spec: &Spectrogram,
    signal: &[f32],
    bpm: f32,
    grid: &BeatGrid,
    config: &EngineConfig,
) -> Option<LoopCandidate> {
    let features = banded_features(spec);
    if features.len() < config.embed_steps + 2 * MIN_LAG_FRAMES {
        return None;
    }

    // Bound the O(n²) matrix by frame decimation
    let stride = features.len().div_ceil(config.max_structure_frames).max(1);
    let decimated: Vec<&Vec<f32>> = features.iter().step_by(stride).collect();

    let embedded = embed(&decimated, config.embed_steps);
    let n = embedded.len();
    if n < 2 * MIN_LAG_FRAMES {
        return None;
    }

    let recurrence = recurrence_matrix(&embedded);
    let (best_lag, run_len) = longest_run_lag(&recurrence, MIN_LAG_FRAMES)?;

    // Map the decimated lag back to samples, then snap to the beat
    let lag_frames = best_lag * stride;
    let lag_seconds = lag_frames as f32 * spec.hop as f32 / spec.sample_rate as f32;
    let len_samples = snap_to_beat(lag_seconds, bpm, spec.sample_rate)?;

    if len_samples < 2 || len_samples > signal.len() {
        return None;
    }

    let anchor = grid
        .frames
        .first()
        .map(|&f| f * grid.hop)
        .unwrap_or(0)
        .min(signal.len().saturating_sub(len_samples));
    let start = if anchor + 2 * len_samples <= signal.len() {
        anchor
    } else {
        signal.len().saturating_sub(2 * len_samples)
    };

    let correlation = adjacent_window_correlation(signal, start, len_samples);
    let run_confidence = run_len as f32 / (n - best_lag) as f32;
    let confidence = (0.5 * run_confidence + 0.5 * correlation.abs()).clamp(0.0, 1.0);

    let beat_samples = 60.0 / bpm * spec.sample_rate as f32;
    let division = len_samples as f32 / (beat_samples * config.beats_per_bar as f32);

    log::debug!(
        "Structural candidate: lag {:.3} s, run {}/{} frames, confidence {:.3}",
        lag_seconds,
        run_len,
        n - best_lag,
        confidence
    );

    Some(LoopCandidate {
        start_sample: start,
        end_sample: start + len_samples,
        correlation,
        musical_division: division,
        confidence,
    })
}

/// Reduce each magnitude spectrum to log-compressed log-spaced bands
fn banded_features(spec: &Spectrogram) -> Vec<Vec<f32>> {
    let n_bins = spec.n_bins();
    if n_bins == 0 {
        return vec![];
    }
    // Log-spaced band edges over the positive-frequency bins
    let edges: Vec<usize> = (0..=N_BANDS)
        .map(|b| {
            let frac = b as f32 / N_BANDS as f32;
            ((n_bins as f32).powf(frac).round() as usize).clamp(1, n_bins)
        })
        .collect();

    spec.magnitudes
        .iter()
        .map(|mags| {
            (0..N_BANDS)
                .map(|b| {
                    let lo = edges[b].min(edges[b + 1]);
                    let hi = edges[b + 1].max(lo + 1).min(n_bins);
                    let sum: f32 = mags[lo - 1..hi].iter().sum();
                    (sum / (hi - lo + 1) as f32).ln_1p()
                })
                .collect()
        })
        .collect()
}

/// Time-delay embedding: concatenate `steps` consecutive feature vectors
///
/// Vector `i` of the result stacks frames `i .. i+steps`, so repeated
/// single-frame coincidences stop registering as structure.
fn embed(features: &[&Vec<f32>], steps: usize) -> Vec<Vec<f32>> {
    if features.len() < steps {
        return vec![];
    }
    (0..=features.len() - steps)
        .map(|i| {
            let mut v = Vec::with_capacity(steps * features[0].len());
            for f in &features[i..i + steps] {
                v.extend_from_slice(f);
            }
            v
        })
        .collect()
}

/// Pairwise cosine similarity matrix
fn recurrence_matrix(embedded: &[Vec<f32>]) -> Vec<Vec<f32>> {
    let norms: Vec<f32> = embedded
        .iter()
        .map(|v| v.iter().map(|&x| x * x).sum::<f32>().sqrt())
        .collect();

    let n = embedded.len();
    let mut matrix = vec![vec![0.0f32; n]; n];
    for i in 0..n {
        for j in i..n {
            let denom = norms[i] * norms[j];
            let sim = if denom < EPSILON {
                0.0
            } else {
                let dot: f32 = embedded[i]
                    .iter()
                    .zip(&embedded[j])
                    .map(|(&a, &b)| a * b)
                    .sum();
                dot / denom
            };
            matrix[i][j] = sim;
            matrix[j][i] = sim;
        }
    }
    matrix
}

/// Lag with the longest contiguous run of similarity above threshold
///
/// The lag transform is implicit: cell `(lag, i)` is `R[i][i + lag]`. Returns
/// `(lag, run_length)` of the best run, or `None` when no run reaches two
/// frames.
fn longest_run_lag(recurrence: &[Vec<f32>], min_lag: usize) -> Option<(usize, usize)> {
    let n = recurrence.len();
    let mut best: Option<(usize, usize)> = None;

    for lag in min_lag..n {
        let mut run = 0usize;
        let mut longest = 0usize;
        for i in 0..n - lag {
            if recurrence[i][i + lag] >= SIMILARITY_THRESHOLD {
                run += 1;
                longest = longest.max(run);
            } else {
                run = 0;
            }
        }
        if longest >= 2 && best.map_or(true, |(_, len)| longest > len) {
            best = Some((lag, longest));
        }
    }
    best
}

/// Snap a duration to the nearest whole number of beats
///
/// Returns the snapped length in samples, or `None` for non-positive BPM or
/// a duration that rounds to zero beats.
fn snap_to_beat(duration_s: f32, bpm: f32, sample_rate: u32) -> Option<usize> {
    if bpm <= 0.0 || duration_s <= 0.0 {
        return None;
    }
    let beat_s = 60.0 / bpm;
    let beats = (duration_s / beat_s).round().max(1.0);
    Some((beats * beat_s * sample_rate as f32).round() as usize)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn empty_grid() -> BeatGrid {
        BeatGrid {
            frames: vec![],
            hop: 512,
            sample_rate: 44100,
        }
    }

    /// Signal alternating between two tones, one block per `block_s` seconds
    fn alternating_tones(block_s: f32, n_blocks: usize, sr: u32) -> Vec<f32> {
        let block_len = (block_s * sr as f32) as usize;
        let mut signal = Vec::with_capacity(block_len * n_blocks);
        for b in 0..n_blocks {
            let freq = if b % 2 == 0 { 220.0 } else { 660.0 };
            for i in 0..block_len {
                let t = i as f32 / sr as f32;
                signal.push(0.5 * (2.0 * std::f32::consts::PI * freq * t).sin());
            }
        }
        signal
    }

    #[test]
    fn test_detects_alternating_block_structure() {
        // A-B-A-B-A-B with 1 s blocks: the structure repeats every 2 s.
        // 120 BPM makes 2 s exactly 4 beats.
        let sr = 44100;
        let signal = alternating_tones(1.0, 6, sr);
        let spec = Spectrogram::compute(&signal, sr, 2048, 512).unwrap();
        let cfg = EngineConfig::default();

        let candidate = structural_candidate(&spec, &signal, 120.0, &empty_grid(), &cfg)
            .expect("structure should be found");

        let duration_s = candidate.duration() as f32 / sr as f32;
        assert!(
            (duration_s - 2.0).abs() < 0.2,
            "expected ~2 s structural loop, got {:.3} s",
            duration_s
        );
        assert!(candidate.confidence > 0.0);
    }

    #[test]
    fn test_too_short_input_yields_none() {
        let signal = vec![0.1f32; 4096];
        let spec = Spectrogram::compute(&signal, 44100, 2048, 512).unwrap();
        let cfg = EngineConfig::default();
        assert!(structural_candidate(&spec, &signal, 120.0, &empty_grid(), &cfg).is_none());
    }

    #[test]
    fn test_snap_to_beat_rounds_to_whole_beats() {
        // 120 BPM: beat = 0.5 s = 22050 samples
        assert_eq!(snap_to_beat(0.48, 120.0, 44100), Some(22050));
        assert_eq!(snap_to_beat(1.02, 120.0, 44100), Some(44100));
        // Never snaps below one beat
        assert_eq!(snap_to_beat(0.01, 120.0, 44100), Some(22050));
        assert_eq!(snap_to_beat(1.0, 0.0, 44100), None);
    }

    #[test]
    fn test_embed_stacks_consecutive_frames() {
        let f0 = vec![1.0, 2.0];
        let f1 = vec![3.0, 4.0];
        let f2 = vec![5.0, 6.0];
        let frames: Vec<&Vec<f32>> = vec![&f0, &f1, &f2];
        let embedded = embed(&frames, 2);
        assert_eq!(embedded.len(), 2);
        assert_eq!(embedded[0], vec![1.0, 2.0, 3.0, 4.0]);
        assert_eq!(embedded[1], vec![3.0, 4.0, 5.0, 6.0]);
    }

    #[test]
    fn test_longest_run_prefers_sustained_lag() {
        // 8x8 matrix with a sustained band at lag 4
        let n = 8;
        let mut m = vec![vec![0.0f32; n]; n];
        for i in 0..n - 4 {
            m[i][i + 4] = 0.9;
        }
        let (lag, run) = longest_run_lag(&m, 2).unwrap();
        assert_eq!(lag, 4);
        assert_eq!(run, 4);
    }

    #[test]
    fn test_recurrence_matrix_diagonal_is_one() {
        let embedded = vec![vec![1.0, 0.0], vec![0.5, 0.5]];
        let m = recurrence_matrix(&embedded);
        assert!((m[0][0] - 1.0).abs() < 1e-6);
        assert!((m[1][1] - 1.0).abs() < 1e-6);
        // Symmetric
        assert!((m[0][1] - m[1][0]).abs() < 1e-6);
    }
}
