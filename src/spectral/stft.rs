//! Short-time Fourier transform
//!
//! Computes per-frame magnitude spectra via a radix-2 FFT. Frames whose
//! length is not a power of two are zero-padded up to the next power of two
//! before the transform.

use rustfft::num_complex::Complex;
use rustfft::{Fft, FftPlanner};
use std::sync::Arc;

use crate::error::AnalysisError;
use crate::spectral::framing::FrameIterator;

/// Magnitude spectrogram: one row of `fft_size / 2` positive-frequency bins
/// per analysis frame
#[derive(Debug, Clone)]
pub struct Spectrogram {
    /// Per-frame magnitude spectra (`n_frames × n_bins`)
    pub magnitudes: Vec<Vec<f32>>,

    /// Hop length the frames were extracted with
    pub hop: usize,

    /// Sample rate of the analyzed signal in Hz
    pub sample_rate: u32,
}

impl Spectrogram {
    /// Compute the magnitude spectrogram of `signal`
    ///
    /// Frames are Hann-windowed before the transform. A single FFT plan is
    /// reused across all frames.
    ///
    /// # Errors
    ///
    /// * `InvalidParameter` for bad frame/hop lengths
    /// * `InsufficientLength` if the signal is shorter than one frame
    pub fn compute(
        signal: &[f32],
        sample_rate: u32,
        frame_len: usize,
        hop: usize,
    ) -> Result<Self, AnalysisError> {
        let frames = FrameIterator::new(signal, frame_len, hop)?;
        log::debug!(
            "Computing spectrogram: {} frames of {} samples, hop {}",
            frames.len(),
            frame_len,
            hop
        );

        let fft_size = frame_len.next_power_of_two();
        let mut planner = FftPlanner::new();
        let fft = planner.plan_fft_forward(fft_size);

        let magnitudes = frames
            .map(|frame| magnitude_spectrum_with(&frame, fft_size, &fft))
            .collect();

        Ok(Self {
            magnitudes,
            hop,
            sample_rate,
        })
    }

    /// Number of frames
    pub fn n_frames(&self) -> usize {
        self.magnitudes.len()
    }

    /// Number of frequency bins per frame
    pub fn n_bins(&self) -> usize {
        self.magnitudes.first().map_or(0, Vec::len)
    }
}

/// Compute the magnitude spectrum of one (already windowed) frame
///
/// Returns `fft_size / 2` positive-frequency bin magnitudes where `fft_size`
/// is the frame length rounded up to a power of two. All-zero input yields an
/// all-zero spectrum.
pub fn magnitude_spectrum(frame: &[f32]) -> Vec<f32> {
    let fft_size = frame.len().next_power_of_two().max(2);
    let mut planner = FftPlanner::new();
    let fft = planner.plan_fft_forward(fft_size);
    magnitude_spectrum_with(frame, fft_size, &fft)
}

fn magnitude_spectrum_with(frame: &[f32], fft_size: usize, fft: &Arc<dyn Fft<f32>>) -> Vec<f32> {
    let mut buf: Vec<Complex<f32>> = frame.iter().map(|&x| Complex::new(x, 0.0)).collect();
    buf.resize(fft_size, Complex::new(0.0, 0.0));

    fft.process(&mut buf);

    buf[..fft_size / 2].iter().map(|c| c.norm()).collect()
}
