//! Bar-aligned loop candidate generation and scoring
//!
//! Proposes loop lengths at musical fractions/multiples of a bar, scores each
//! by the normalized cross-correlation of two adjacent Hann-tapered windows,
//! and combines that with a musical-alignment bonus and a fade-boundary
//! penalty:
//!
//! `score = |correlation| * alignment_bonus * fade_penalty_factor`
//!
//! Near-tied scores break toward the shorter duration: the minimal repeating
//! unit is the canonical seamless loop.

use serde::{Deserialize, Serialize};

use crate::config::EngineConfig;
use crate::features::beat::BeatGrid;
use crate::spectral::framing::hann_window;

const EPSILON: f32 = 1e-10;

/// Common beat-count subdivisions rewarded by the alignment bonus
const COMMON_SUBDIVISIONS: [f32; 5] = [1.0, 2.0, 4.0, 8.0, 16.0];

/// Scores within this relative margin are considered tied
const TIE_MARGIN: f32 = 0.02;

/// Half-width of the length sweep around each nominal candidate length, in
/// milliseconds. Seamlessness is phase-sensitive at the sample level, so the
/// nominal bar-aligned length is only a starting point.
const REFINE_SWEEP_MS: f32 = 50.0;

/// Correlation sums during the coarse sweep are strided so the cost per
/// candidate stays near this many multiplies per tested length
const SWEEP_BUDGET: usize = 2048;

/// Number of runner-up candidates reported alongside the best
pub(crate) const MAX_RUNNERS_UP: usize = 4;

/// One scored loop hypothesis
///
/// Candidates are ephemeral: generated, ranked, and either returned or
/// discarded within a single analysis call, never mutated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoopCandidate {
    /// First sample of the loop
    pub start_sample: usize,

    /// One past the last sample of the loop
    pub end_sample: usize,

    /// Normalized cross-correlation of the two adjacent windows, in [-1, 1]
    pub correlation: f32,

    /// Loop duration expressed as a multiple of the bar implied by the BPM
    pub musical_division: f32,

    /// Combined score in [0, 1]
    pub confidence: f32,
}

impl LoopCandidate {
    /// Loop duration in samples
    pub fn duration(&self) -> usize {
        self.end_sample - self.start_sample
    }
}

/// Generate and rank bar-aligned loop candidates
///
/// Returns candidates sorted best-first (at most 1 + [`MAX_RUNNERS_UP`]).
/// The list is empty when no admissible length fits the track.
pub fn generate_candidates(
    signal: &[f32],
    sample_rate: u32,
    bpm: f32,
    grid: &BeatGrid,
    config: &EngineConfig,
) -> Vec<LoopCandidate> {
    if signal.is_empty() || bpm <= 0.0 {
        return vec![];
    }

    let sr = sample_rate as f32;
    let beat_samples = 60.0 / bpm * sr;
    let bar_samples = beat_samples * config.beats_per_bar as f32;
    let max_len = (config.max_loop_s * sr) as usize;
    let half_track = signal.len() / 2;

    // Anchor candidate windows on the first tracked beat when possible
    let anchor = grid
        .frames
        .first()
        .map(|&f| f * grid.hop)
        .unwrap_or(0)
        .min(signal.len().saturating_sub(1));

    let sweep = (REFINE_SWEEP_MS / 1000.0 * sr) as usize;
    let mut candidates = Vec::new();
    for &multiple in &config.bar_multiples {
        let nominal = (bar_samples * multiple).round() as usize;
        if nominal < 2 || nominal > max_len || nominal > half_track {
            continue;
        }
        let Some(start) = fit_start(anchor, nominal, signal.len()) else {
            continue;
        };

        // Sweep the length around the nominal bar multiple: the estimated
        // BPM quantizes the bar to whole frames, and a few samples of length
        // error already destroys the seam for tonal material
        let stride = (nominal / SWEEP_BUDGET).max(1);
        let (len, correlation) = best_length_near(signal, start, nominal, sweep, stride);

        let beats = len as f32 / beat_samples;
        let score =
            correlation.abs() * alignment_bonus(beats) * fade_penalty_factor(signal, start, len);

        candidates.push(LoopCandidate {
            start_sample: start,
            end_sample: start + len,
            correlation,
            musical_division: multiple,
            confidence: score.clamp(0.0, 1.0),
        });
    }

    // Short tracks are frequently intended to loop in their entirety
    let duration_s = signal.len() as f32 / sr;
    if duration_s < config.short_track_s {
        candidates.push(full_track_candidate(signal, bar_samples));
    }

    rank(&mut candidates);
    candidates.truncate(1 + MAX_RUNNERS_UP);

    log::debug!(
        "Generated {} loop candidates, best confidence {:.3}",
        candidates.len(),
        candidates.first().map_or(0.0, |c| c.confidence)
    );

    candidates
}

/// Fine-grained refinement of the best candidate's length
///
/// Perturbs the loop length within ±50 ms at sample resolution and keeps the
/// length whose adjacent windows correlate best. The candidate's musical
/// division and combined confidence are preserved from the coarse search;
/// only the end boundary moves.
pub fn refine_candidate_length(
    signal: &[f32],
    sample_rate: u32,
    candidate: &LoopCandidate,
) -> LoopCandidate {
    let sweep = (REFINE_SWEEP_MS / 1000.0 * sample_rate as f32) as usize;
    let start = candidate.start_sample;
    let stride = (candidate.duration() / (8 * SWEEP_BUDGET)).max(1);
    let (len, correlation) = best_length_near(signal, start, candidate.duration(), sweep, stride);

    if correlation <= candidate.correlation {
        return candidate.clone();
    }
    LoopCandidate {
        start_sample: start,
        end_sample: start + len,
        correlation,
        musical_division: candidate.musical_division,
        confidence: candidate.confidence,
    }
}

/// Length within `base ± sweep` whose adjacent windows correlate best
///
/// Scans every length in the range; the correlation sum itself is strided to
/// keep the scan affordable. Returns `(length, correlation)`; falls back to
/// `base` when no length fits the signal.
fn best_length_near(
    signal: &[f32],
    start: usize,
    base: usize,
    sweep: usize,
    stride: usize,
) -> (usize, f32) {
    let lo = base.saturating_sub(sweep).max(2);
    let hi = base + sweep;

    let mut best_len = base;
    let mut best_corr = f32::NEG_INFINITY;
    for len in lo..=hi {
        if start + 2 * len > signal.len() {
            break;
        }
        let corr = strided_correlation(signal, start, len, stride);
        if corr > best_corr {
            best_corr = corr;
            best_len = len;
        }
    }
    if best_corr == f32::NEG_INFINITY {
        (base, adjacent_window_correlation(signal, start, base))
    } else {
        // Final score with the tapered full-resolution correlation
        (best_len, adjacent_window_correlation(signal, start, best_len))
    }
}

/// Raw (untapered) normalized cross-correlation of the adjacent windows at
/// `start`, summed every `stride`-th sample
fn strided_correlation(signal: &[f32], start: usize, len: usize, stride: usize) -> f32 {
    if len == 0 || stride == 0 || start + 2 * len > signal.len() {
        return 0.0;
    }
    let a = &signal[start..start + len];
    let b = &signal[start + len..start + 2 * len];

    let mut dot = 0.0f64;
    let mut norm_a = 0.0f64;
    let mut norm_b = 0.0f64;
    let mut i = 0;
    while i < len {
        let x = a[i] as f64;
        let y = b[i] as f64;
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
        i += stride;
    }
    let denom = (norm_a * norm_b).sqrt();
    if denom < EPSILON as f64 {
        return 0.0;
    }
    (dot / denom) as f32
}

/// Normalized cross-correlation of the Hann-tapered windows
/// `[start, start+len)` and `[start+len, start+2len)`
///
/// Returns 0.0 when either window has no energy or the windows do not fit.
pub fn adjacent_window_correlation(signal: &[f32], start: usize, len: usize) -> f32 {
    if len == 0 || start + 2 * len > signal.len() {
        return 0.0;
    }
    let window = hann_window(len);
    let a = &signal[start..start + len];
    let b = &signal[start + len..start + 2 * len];

    let mut dot = 0.0f64;
    let mut norm_a = 0.0f64;
    let mut norm_b = 0.0f64;
    for i in 0..len {
        let wa = (a[i] * window[i]) as f64;
        let wb = (b[i] * window[i]) as f64;
        dot += wa * wb;
        norm_a += wa * wa;
        norm_b += wb * wb;
    }
    let denom = (norm_a * norm_b).sqrt();
    if denom < EPSILON as f64 {
        return 0.0;
    }
    (dot / denom) as f32
}

/// Musical-alignment bonus for a loop spanning `beats` beats
///
/// Rewards beat counts close to an integer and close to a common subdivision
/// (1, 2, 4, 8, 16). Maximum 1.0 when both hold exactly.
fn alignment_bonus(beats: f32) -> f32 {
    if !(beats > 0.0) {
        return 0.0;
    }
    let integer_err = (beats - beats.round()).abs().min(0.5);
    let integer_bonus = 1.0 - integer_err;

    let subdivision_err = COMMON_SUBDIVISIONS
        .iter()
        .map(|&d| (beats - d).abs() / d)
        .fold(f32::INFINITY, f32::min);
    let subdivision_bonus = 1.0 / (1.0 + subdivision_err);

    integer_bonus * subdivision_bonus
}

/// Fade-boundary penalty factor in [0.5, 1.0]
///
/// A segment whose leading/trailing 5% carries much less energy than its
/// middle fades in or out and makes a poor loop, so its score is halved at
/// the extreme.
fn fade_penalty_factor(signal: &[f32], start: usize, len: usize) -> f32 {
    let edge = (len / 20).max(1);
    if start + len > signal.len() || len < 4 * edge {
        return 1.0;
    }
    let seg = &signal[start..start + len];
    let head = rms(&seg[..edge]);
    let tail = rms(&seg[len - edge..]);
    let mid_lo = len / 2 - edge;
    let middle = rms(&seg[mid_lo..mid_lo + 2 * edge]);

    if middle < EPSILON {
        return 1.0;
    }
    let ratio = (head.min(tail) / middle).min(1.0);
    0.5 + 0.5 * (ratio / 0.5).min(1.0)
}

fn rms(x: &[f32]) -> f32 {
    if x.is_empty() {
        return 0.0;
    }
    (x.iter().map(|&v| v * v).sum::<f32>() / x.len() as f32).sqrt()
}

/// Full-track candidate for short clips, scored by correlating the first
/// half against the second half
fn full_track_candidate(signal: &[f32], bar_samples: f32) -> LoopCandidate {
    let len = signal.len();
    let correlation = adjacent_window_correlation(signal, 0, len / 2);
    let division = if bar_samples > 0.0 {
        len as f32 / bar_samples
    } else {
        0.0
    };
    LoopCandidate {
        start_sample: 0,
        end_sample: len,
        correlation,
        musical_division: division,
        confidence: correlation.abs().clamp(0.0, 1.0),
    }
}

/// Shift `anchor` so two adjacent windows of `len` samples fit in the signal
fn fit_start(anchor: usize, len: usize, signal_len: usize) -> Option<usize> {
    if 2 * len > signal_len {
        return None;
    }
    Some(anchor.min(signal_len - 2 * len))
}

/// Sort candidates best-first
///
/// Sorts by `(confidence desc, duration asc)`, then promotes the shortest
/// candidate whose confidence lies within [`TIE_MARGIN`] of the top score:
/// near-equal scores break toward the minimal repeating unit. The tie
/// preference is a post-pass so the sort comparator stays a total order and
/// the outcome is independent of input order.
pub fn rank(candidates: &mut [LoopCandidate]) {
    candidates.sort_by(|a, b| {
        b.confidence
            .partial_cmp(&a.confidence)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.duration().cmp(&b.duration()))
    });

    let Some(top) = candidates.first().map(|c| c.confidence) else {
        return;
    };
    let margin = TIE_MARGIN * top.abs().max(EPSILON);
    let tied = candidates
        .iter()
        .take_while(|c| top - c.confidence <= margin)
        .count();
    if let Some(shortest) = (0..tied).min_by_key(|&i| candidates[i].duration()) {
        candidates[..=shortest].rotate_right(1);
    }
}
