//! Beat tracking
//!
//! Two trackers over the onset envelope, both anchored to the estimated
//! tempo:
//!
//! * [`track_beats_greedy`] — fixed-interval stepping that anchors on the
//!   strongest onset within the first beat period and snaps each step to the
//!   nearest local onset peak.
//! * [`track_beats_dp`] — a Viterbi-style dynamic program whose transition
//!   score penalizes deviation from the expected beat period quadratically,
//!   with a predominant-local-pulse phase histogram anchoring the backtrack.
//!
//! Both produce a strictly increasing sequence of frame indices; an empty
//! envelope yields an empty grid.

use serde::{Deserialize, Serialize};

use crate::features::onset::OnsetEnvelope;
use crate::features::tempo::bpm_to_lag;
use crate::spectral::framing::frame_to_time;

/// Snap tolerance around each greedy step, as a fraction of the beat period
const SNAP_TOLERANCE: f32 = 0.125;

/// Beat-synchronous time grid
///
/// Frame indices are strictly increasing; `hop` and `sample_rate` convert
/// them to seconds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BeatGrid {
    /// Beat positions as frame indices, strictly increasing
    pub frames: Vec<usize>,

    /// Hop length of the originating envelope
    pub hop: usize,

    /// Sample rate of the analyzed signal in Hz
    pub sample_rate: u32,
}

impl BeatGrid {
    /// Beat positions in seconds
    pub fn times(&self) -> Vec<f32> {
        self.frames
            .iter()
            .map(|&f| frame_to_time(f, self.hop, self.sample_rate))
            .collect()
    }

    /// Number of beats
    pub fn len(&self) -> usize {
        self.frames.len()
    }

    /// True when the grid holds no beats
    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }
}

/// Greedy fixed-interval beat tracker
///
/// Anchors on the strongest onset within the first beat period, then steps
/// forward by the period, snapping each step to the local onset peak within
/// ±period/8.
pub fn track_beats_greedy(envelope: &OnsetEnvelope, bpm: f32) -> BeatGrid {
    let empty = BeatGrid {
        frames: vec![],
        hop: envelope.hop,
        sample_rate: envelope.sample_rate,
    };
    if envelope.is_empty() || bpm <= 0.0 {
        return empty;
    }

    let period = bpm_to_lag(bpm, envelope.sample_rate, envelope.hop);
    if period < 1.0 || period as usize >= envelope.len() {
        return empty;
    }
    let strengths = &envelope.strengths;

    // Anchor: strongest onset within the first beat period
    let first_window = (period.ceil() as usize).min(strengths.len());
    let anchor = argmax(&strengths[..first_window]);

    let tolerance = (period * SNAP_TOLERANCE).round().max(1.0) as usize;
    let mut frames = vec![anchor];
    let mut expected = anchor as f32 + period;

    while (expected.round() as usize) < strengths.len() {
        let center = expected.round() as usize;
        let lo = center.saturating_sub(tolerance);
        let hi = (center + tolerance + 1).min(strengths.len());
        let snapped = lo + argmax(&strengths[lo..hi]);

        // Strictly increasing: a snap can never move at or behind the
        // previous beat
        let last = *frames.last().unwrap();
        let beat = snapped.max(last + 1);
        if beat >= strengths.len() {
            break;
        }
        frames.push(beat);
        expected = beat as f32 + period;
    }

    log::debug!(
        "Greedy tracker: {} beats at {:.1} BPM (period {:.1} frames)",
        frames.len(),
        bpm,
        period
    );

    BeatGrid {
        frames,
        hop: envelope.hop,
        sample_rate: envelope.sample_rate,
    }
}

/// Phase-aware dynamic-programming beat tracker
///
/// Builds a cumulative score over frames where the transition from a
/// predecessor at gap `Δ` costs `tightness * ((Δ - period) / period)²`, then
/// backtracks from the best final state. The backtrack start is anchored to
/// the predominant local pulse: onset energy is histogrammed by
/// phase-within-period and the start frame is chosen near the maximal phase
/// bin.
pub fn track_beats_dp(envelope: &OnsetEnvelope, bpm: f32, tightness: f32) -> BeatGrid {
    let empty = BeatGrid {
        frames: vec![],
        hop: envelope.hop,
        sample_rate: envelope.sample_rate,
    };
    if envelope.is_empty() || bpm <= 0.0 || tightness <= 0.0 {
        return empty;
    }

    let period = bpm_to_lag(bpm, envelope.sample_rate, envelope.hop);
    let period_i = period.round() as usize;
    if period_i < 1 || period_i >= envelope.len() {
        return empty;
    }
    let strengths = &envelope.strengths;
    let n = strengths.len();

    // Admissible predecessor gaps: [period/2, 2*period]
    let gap_lo = (period / 2.0).floor().max(1.0) as usize;
    let gap_hi = ((period * 2.0).ceil() as usize).min(n - 1);

    // Forward pass
    let mut score = vec![0.0f32; n];
    let mut backlink = vec![None::<usize>; n];
    for t in 0..n {
        score[t] = strengths[t];
        if t < gap_lo {
            continue;
        }
        let lo = t.saturating_sub(gap_hi);
        let hi = t - gap_lo;
        let mut best: Option<(usize, f32)> = None;
        for prev in lo..=hi {
            let gap = (t - prev) as f32;
            let penalty = tightness * ((gap - period) / period).powi(2);
            let candidate = score[prev] - penalty;
            if best.map_or(true, |(_, b)| candidate > b) {
                best = Some((prev, candidate));
            }
        }
        if let Some((prev, candidate)) = best {
            if candidate > 0.0 {
                score[t] += candidate;
                backlink[t] = Some(prev);
            }
        }
    }

    // Predominant local pulse: histogram onset energy by phase within the
    // (rounded) period and take the maximal bin
    let mut phase_hist = vec![0.0f32; period_i];
    for (t, &s) in strengths.iter().enumerate() {
        phase_hist[t % period_i] += s;
    }
    let pulse_phase = argmax(&phase_hist);

    // Backtrack start: best-scoring frame within the last period whose phase
    // lies near the predominant pulse
    let tail_start = n.saturating_sub(period_i);
    let phase_tol = (period_i / 8).max(1);
    let mut start = None;
    let mut start_fallback = tail_start;
    for t in tail_start..n {
        if score[t] > score[start_fallback] {
            start_fallback = t;
        }
        let phase_dist = phase_distance(t % period_i, pulse_phase, period_i);
        if phase_dist <= phase_tol
            && start.map_or(true, |s: usize| score[t] > score[s])
        {
            start = Some(t);
        }
    }
    let start = start.unwrap_or(start_fallback);

    let mut frames = Vec::new();
    let mut cursor = Some(start);
    while let Some(t) = cursor {
        frames.push(t);
        cursor = backlink[t];
    }
    frames.reverse();

    log::debug!(
        "DP tracker: {} beats at {:.1} BPM, pulse phase {}/{}",
        frames.len(),
        bpm,
        pulse_phase,
        period_i
    );

    BeatGrid {
        frames,
        hop: envelope.hop,
        sample_rate: envelope.sample_rate,
    }
}

/// Circular distance between two phase bins
fn phase_distance(a: usize, b: usize, period: usize) -> usize {
    let d = a.abs_diff(b);
    d.min(period - d)
}

/// Index of the maximum value; first index wins ties, 0 for empty input
fn argmax(values: &[f32]) -> usize {
    let mut best = 0;
    for (i, &v) in values.iter().enumerate() {
        if v > values[best] {
            best = i;
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;

    fn click_envelope(period: usize, n: usize, offset: usize) -> OnsetEnvelope {
        let mut strengths = vec![0.0f32; n];
        let mut i = offset;
        while i < n {
            strengths[i] = 1.0;
            i += period;
        }
        OnsetEnvelope {
            strengths,
            hop: 512,
            sample_rate: 44100,
        }
    }

    fn assert_strictly_increasing(grid: &BeatGrid) {
        for pair in grid.frames.windows(2) {
            assert!(pair[0] < pair[1], "grid not strictly increasing: {:?}", pair);
        }
    }

    #[test]
    fn test_greedy_empty_envelope() {
        let env = OnsetEnvelope {
            strengths: vec![],
            hop: 512,
            sample_rate: 44100,
        };
        assert!(track_beats_greedy(&env, 120.0).is_empty());
    }

    #[test]
    fn test_dp_empty_envelope() {
        let env = OnsetEnvelope {
            strengths: vec![],
            hop: 512,
            sample_rate: 44100,
        };
        assert!(track_beats_dp(&env, 120.0, 100.0).is_empty());
    }

    #[test]
    fn test_greedy_locks_onto_clicks() {
        let period = bpm_to_lag(120.0, 44100, 512).round() as usize;
        let env = click_envelope(period, 600, 5);
        let grid = track_beats_greedy(&env, 120.0);

        assert!(!grid.is_empty());
        assert_strictly_increasing(&grid);
        // Anchor should land on the first click
        assert_eq!(grid.frames[0], 5);
        // Subsequent beats snap onto clicks
        for &f in grid.frames.iter().take(8) {
            assert_eq!((f - 5) % period, 0, "beat at frame {} off-click", f);
        }
    }

    #[test]
    fn test_dp_locks_onto_clicks() {
        let period = bpm_to_lag(120.0, 44100, 512).round() as usize;
        let env = click_envelope(period, 600, 5);
        let grid = track_beats_dp(&env, 120.0, 100.0);

        assert!(grid.len() > 5);
        assert_strictly_increasing(&grid);
        // Most emitted beats should coincide with clicks
        let on_click = grid
            .frames
            .iter()
            .filter(|&&f| f >= 5 && (f - 5) % period == 0)
            .count();
        assert!(
            on_click * 10 >= grid.len() * 8,
            "only {}/{} beats on clicks",
            on_click,
            grid.len()
        );
    }

    #[test]
    fn test_dp_beat_spacing_near_period() {
        let period = bpm_to_lag(130.0, 44100, 512).round() as usize;
        let env = click_envelope(period, 800, 0);
        let grid = track_beats_dp(&env, 130.0, 100.0);

        assert!(grid.len() > 3);
        for pair in grid.frames.windows(2) {
            let gap = pair[1] - pair[0];
            assert!(
                gap >= period / 2 && gap <= period * 2,
                "gap {} outside admissible range for period {}",
                gap,
                period
            );
        }
    }

    #[test]
    fn test_grid_times_within_signal() {
        let period = bpm_to_lag(120.0, 44100, 512).round() as usize;
        let n = 600;
        let env = click_envelope(period, n, 0);
        let duration = n as f32 * 512.0 / 44100.0;
        for strategy in [track_beats_greedy(&env, 120.0), track_beats_dp(&env, 120.0, 100.0)] {
            for t in strategy.times() {
                assert!((0.0..=duration).contains(&t));
            }
        }
    }

    #[test]
    fn test_zero_bpm_yields_empty_grid() {
        let env = click_envelope(43, 600, 0);
        assert!(track_beats_greedy(&env, 0.0).is_empty());
        assert!(track_beats_dp(&env, 0.0, 100.0).is_empty());
    }
}
