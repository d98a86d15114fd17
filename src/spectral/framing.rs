//! Framing and windowing
//!
//! Slices a sample buffer into overlapping fixed-length frames, applies a
//! raised-cosine (Hann) taper, and provides the frame-index ↔ time ↔ sample
//! conversions the rest of the pipeline relies on.

use crate::error::AnalysisError;

/// Compute a Hann window of length `n`
///
/// `w[i] = 0.5 * (1 - cos(2π·i / (n - 1)))`
///
/// A length-1 window is `[1.0]` (the formula's denominator would be zero).
pub fn hann_window(n: usize) -> Vec<f32> {
    if n == 0 {
        return vec![];
    }
    if n == 1 {
        return vec![1.0];
    }
    let denom = (n - 1) as f32;
    (0..n)
        .map(|i| 0.5 * (1.0 - (2.0 * std::f32::consts::PI * i as f32 / denom).cos()))
        .collect()
}

/// Number of frames produced for a buffer of length `len`
///
/// `floor((len - frame_len) / hop) + 1`; zero when `len < frame_len`.
pub fn frame_count(len: usize, frame_len: usize, hop: usize) -> usize {
    if len < frame_len || hop == 0 {
        return 0;
    }
    (len - frame_len) / hop + 1
}

/// Convert a frame index to its start time in seconds
pub fn frame_to_time(frame: usize, hop: usize, sample_rate: u32) -> f32 {
    (frame * hop) as f32 / sample_rate as f32
}

/// Convert a time in seconds to the frame index whose start is nearest
pub fn time_to_frame(time_s: f32, hop: usize, sample_rate: u32) -> usize {
    ((time_s * sample_rate as f32) / hop as f32).round() as usize
}

/// Convert a frame index to its start sample offset
pub fn frame_to_sample(frame: usize, hop: usize) -> usize {
    frame * hop
}

/// Lazy iterator over Hann-windowed frames of a signal
///
/// Each call to `next()` copies one frame and multiplies it by the window;
/// frames are derived views, never stored long-term.
pub struct FrameIterator<'a> {
    signal: &'a [f32],
    window: Vec<f32>,
    frame_len: usize,
    hop: usize,
    cursor: usize,
}

impl<'a> FrameIterator<'a> {
    /// Create a frame iterator over `signal`
    ///
    /// # Errors
    ///
    /// * `InvalidParameter` if `frame_len <= 1` or `hop < 1`
    /// * `InsufficientLength` if the signal is shorter than one frame
    pub fn new(signal: &'a [f32], frame_len: usize, hop: usize) -> Result<Self, AnalysisError> {
        if frame_len <= 1 {
            return Err(AnalysisError::InvalidParameter(format!(
                "frame_len must be > 1, got {}",
                frame_len
            )));
        }
        if hop < 1 {
            return Err(AnalysisError::InvalidParameter(
                "hop must be >= 1".to_string(),
            ));
        }
        if signal.len() < frame_len {
            return Err(AnalysisError::InsufficientLength {
                required: frame_len,
                actual: signal.len(),
            });
        }
        Ok(Self {
            signal,
            window: hann_window(frame_len),
            frame_len,
            hop,
            cursor: 0,
        })
    }

    /// Total number of frames this iterator will yield
    pub fn len(&self) -> usize {
        frame_count(self.signal.len(), self.frame_len, self.hop)
    }

    /// True when the iterator yields no frames
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Iterator for FrameIterator<'_> {
    type Item = Vec<f32>;

    fn next(&mut self) -> Option<Vec<f32>> {
        let start = self.cursor * self.hop;
        if start + self.frame_len > self.signal.len() {
            return None;
        }
        self.cursor += 1;
        let frame = self.signal[start..start + self.frame_len]
            .iter()
            .zip(&self.window)
            .map(|(&s, &w)| s * w)
            .collect();
        Some(frame)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.len().saturating_sub(self.cursor);
        (remaining, Some(remaining))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hann_window_endpoints() {
        let w = hann_window(8);
        assert_eq!(w.len(), 8);
        assert!(w[0].abs() < 1e-6);
        assert!(w[7].abs() < 1e-6);
        // Symmetric
        for i in 0..4 {
            assert!((w[i] - w[7 - i]).abs() < 1e-6);
        }
    }

    #[test]
    fn test_hann_window_degenerate_lengths() {
        assert!(hann_window(0).is_empty());
        assert_eq!(hann_window(1), vec![1.0]);
    }

    #[test]
    fn test_frame_count_formula() {
        assert_eq!(frame_count(2048, 2048, 512), 1);
        assert_eq!(frame_count(2048 + 512, 2048, 512), 2);
        assert_eq!(frame_count(2047, 2048, 512), 0);
        assert_eq!(frame_count(44100, 2048, 512), (44100 - 2048) / 512 + 1);
    }

    #[test]
    fn test_iterator_yields_expected_frame_count() {
        let signal = vec![1.0f32; 4096];
        let it = FrameIterator::new(&signal, 1024, 256).unwrap();
        let expected = it.len();
        assert_eq!(it.count(), expected);
        assert_eq!(expected, (4096 - 1024) / 256 + 1);
    }

    #[test]
    fn test_iterator_applies_window() {
        let signal = vec![1.0f32; 1024];
        let mut it = FrameIterator::new(&signal, 1024, 512).unwrap();
        let frame = it.next().unwrap();
        // Constant input times the window is the window itself
        let w = hann_window(1024);
        for (a, b) in frame.iter().zip(&w) {
            assert!((a - b).abs() < 1e-6);
        }
    }

    #[test]
    fn test_invalid_params() {
        let signal = vec![0.0f32; 4096];
        assert!(matches!(
            FrameIterator::new(&signal, 1, 512),
            Err(AnalysisError::InvalidParameter(_))
        ));
        assert!(matches!(
            FrameIterator::new(&signal, 1024, 0),
            Err(AnalysisError::InvalidParameter(_))
        ));
    }

    #[test]
    fn test_short_signal_is_insufficient_length() {
        let signal = vec![0.0f32; 100];
        assert!(matches!(
            FrameIterator::new(&signal, 2048, 512),
            Err(AnalysisError::InsufficientLength {
                required: 2048,
                actual: 100
            })
        ));
    }

    #[test]
    fn test_frame_time_round_trip() {
        let hop = 512;
        let sr = 44100;
        for frame in 0..1000 {
            let t = frame_to_time(frame, hop, sr);
            assert_eq!(time_to_frame(t, hop, sr), frame);
        }
    }
}
