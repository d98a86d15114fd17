//! Feature extraction
//!
//! Onset strength, tempo estimation, and beat tracking over the spectral
//! front end's output.

pub mod beat;
pub mod onset;
pub mod tempo;
