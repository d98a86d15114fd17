//! Onset strength extraction via half-wave-rectified spectral flux
//!
//! For frame `t` with magnitude spectrum `S_t`:
//!
//! `onset[t] = Σ_bin max(0, S_t[bin] - S_{t-1}[bin])`
//!
//! with `onset[0] = 0`. Positive spectral change captures percussive and
//! harmonic attacks independent of absolute loudness.

use crate::spectral::framing::frame_to_time;
use crate::spectral::stft::Spectrogram;

/// Variation below this fraction of the mean marks an envelope as flat
const FLATNESS_EPSILON: f32 = 1e-8;

/// Frame-rate envelope of onset strength
///
/// Invariants: one value per analysis frame, all values >= 0, first value 0.
#[derive(Debug, Clone)]
pub struct OnsetEnvelope {
    /// Per-frame onset strengths
    pub strengths: Vec<f32>,

    /// Hop length of the originating spectrogram
    pub hop: usize,

    /// Sample rate of the analyzed signal in Hz
    pub sample_rate: u32,
}

impl OnsetEnvelope {
    /// Extract the onset envelope from a magnitude spectrogram
    pub fn from_spectrogram(spec: &Spectrogram) -> Self {
        let mut strengths = Vec::with_capacity(spec.n_frames());
        for t in 0..spec.n_frames() {
            if t == 0 {
                strengths.push(0.0);
                continue;
            }
            let flux: f32 = spec.magnitudes[t]
                .iter()
                .zip(&spec.magnitudes[t - 1])
                .map(|(&cur, &prev)| (cur - prev).max(0.0))
                .sum();
            strengths.push(flux);
        }

        log::debug!(
            "Onset envelope: {} frames, peak strength {:.4}",
            strengths.len(),
            strengths.iter().copied().fold(0.0f32, f32::max)
        );

        Self {
            strengths,
            hop: spec.hop,
            sample_rate: spec.sample_rate,
        }
    }

    /// Number of frames
    pub fn len(&self) -> usize {
        self.strengths.len()
    }

    /// True when the envelope has no frames
    pub fn is_empty(&self) -> bool {
        self.strengths.is_empty()
    }

    /// True when the envelope carries no usable variation (silence or a
    /// constant spectrum)
    ///
    /// Later stages check this before normalizing by envelope energy, so a
    /// degenerate signal never turns into a division by zero.
    pub fn is_flat(&self) -> bool {
        self.strengths
            .iter()
            .all(|&s| s.abs() < FLATNESS_EPSILON)
    }

    /// Time in seconds of frame `idx`
    pub fn frame_time(&self, idx: usize) -> f32 {
        frame_to_time(idx, self.hop, self.sample_rate)
    }

    /// Frames per second of this envelope
    pub fn frame_rate(&self) -> f32 {
        self.sample_rate as f32 / self.hop as f32
    }
}
