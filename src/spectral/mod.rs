//! Spectral front end
//!
//! Framing, windowing, and the short-time Fourier transform that feed the
//! onset and structure analyzers.

pub mod framing;
pub mod stft;
