//! # loopgrid
//!
//! An audio analysis engine that estimates tempo, locates a beat-synchronous
//! time grid, and finds a pair of sample positions that loop seamlessly,
//! preferring loop lengths aligned to musical bar/beat boundaries.
//!
//! ## Features
//!
//! - **Tempo estimation**: spectral-flux onset envelope, autocorrelation
//!   period search, half/double-tempo disambiguation
//! - **Beat tracking**: greedy fixed-interval and phase-aware
//!   dynamic-programming trackers
//! - **Loop search**: bar-aligned candidate scoring with waveform
//!   self-similarity, plus a recurrence-matrix structural fallback
//! - **Boundary refinement**: zero-crossing snap or equal-power crossfade
//!
//! ## Quick start
//!
//! ```no_run
//! use loopgrid::{analyze, EngineConfig};
//!
//! // Decoded mono samples, normalized to [-1.0, 1.0]
//! let samples: Vec<f32> = vec![];
//! let result = analyze(&samples, 44100, &EngineConfig::default())?;
//!
//! println!("BPM: {:.1} (confidence {:.2})", result.bpm, result.bpm_confidence);
//! println!("Loop: {:.3}s - {:.3}s", result.loop_start, result.loop_end);
//! # Ok::<(), loopgrid::AnalysisError>(())
//! ```
//!
//! ## Architecture
//!
//! ```text
//! samples -> frames -> spectra -> onset envelope -> {tempo, beat grid}
//!         -> loop candidates (+ structural fallback) -> refined boundaries
//! ```
//!
//! The engine is synchronous and allocation-transient: every analysis call is
//! independent, holds no shared state, and may run concurrently with others
//! on separate buffers. The only shared resource is the optional
//! [`AnalysisCache`] the caller injects.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod analysis;
pub mod config;
pub mod error;
pub mod features;
pub mod looper;
pub mod spectral;

pub use analysis::cache::{content_key, AnalysisCache};
pub use analysis::result::LoopAnalysis;
pub use config::EngineConfig;
pub use error::AnalysisError;
pub use features::beat::{track_beats_dp, track_beats_greedy, BeatGrid};
pub use features::onset::OnsetEnvelope;
pub use features::tempo::{estimate_tempo, TempoCandidate, TempoEstimate};
pub use looper::candidates::LoopCandidate;
pub use looper::refine::{CrossfadeSpec, RefinedLoop};

use looper::candidates::{generate_candidates, rank, refine_candidate_length};
use looper::refine::refine_boundaries;
use looper::structure::structural_candidate;
use spectral::stft::Spectrogram;

/// Analyze a mono sample buffer
///
/// Runs the full pipeline: framing, STFT, onset extraction, tempo
/// estimation, beat tracking, loop candidate search with structural
/// fallback, and boundary refinement. All returned times are in seconds
/// relative to the start of the buffer.
///
/// Re-running with an identical buffer and configuration yields bit-identical
/// results; there is no hidden random state.
///
/// # Arguments
///
/// * `samples` - Decoded mono samples in [-1.0, 1.0]; multi-channel input
///   must be mixed down by the caller
/// * `sample_rate` - Sample rate in Hz
/// * `config` - Engine configuration; see [`EngineConfig`] for defaults
///
/// # Errors
///
/// * `InvalidParameter` for an empty buffer, zero sample rate, or an invalid
///   configuration
/// * `InsufficientLength` when the buffer is shorter than one analysis frame
///   or shorter than the configured minimum loop length
///
/// Silence and other degenerate signals are *not* errors: they yield a
/// result with `degenerate = true`, zero confidence, the default BPM, and a
/// full-track loop.
pub fn analyze(
    samples: &[f32],
    sample_rate: u32,
    config: &EngineConfig,
) -> Result<LoopAnalysis, AnalysisError> {
    config.validate()?;

    if samples.is_empty() {
        return Err(AnalysisError::InvalidParameter(
            "empty sample buffer".to_string(),
        ));
    }
    if sample_rate == 0 {
        return Err(AnalysisError::InvalidParameter(
            "sample rate must be positive".to_string(),
        ));
    }

    let min_loop_samples = (config.min_loop_s * sample_rate as f32) as usize;
    let required = config.frame_len.max(min_loop_samples);
    if samples.len() < required {
        return Err(AnalysisError::InsufficientLength {
            required,
            actual: samples.len(),
        });
    }

    log::debug!(
        "Analyzing {} samples at {} Hz ({:.2} s)",
        samples.len(),
        sample_rate,
        samples.len() as f32 / sample_rate as f32
    );

    let spec = Spectrogram::compute(samples, sample_rate, config.frame_len, config.hop)?;
    let envelope = OnsetEnvelope::from_spectrogram(&spec);

    if envelope.is_flat() {
        log::debug!("Degenerate signal: flat onset envelope");
        return Ok(degenerate_result(samples, sample_rate, config));
    }

    let tempo = estimate_tempo(&envelope, config);
    let grid = track_beats_dp(&envelope, tempo.bpm, config.tightness);

    let mut candidates = generate_candidates(samples, sample_rate, tempo.bpm, &grid, config);

    // Structural fallback: consult the recurrence-matrix analyzer when
    // bar-aligned search is unconvincing, merge by confidence
    let best_confidence = candidates.first().map_or(0.0, |c| c.confidence);
    if best_confidence < config.structure_fallback_threshold {
        if let Some(structural) = structural_candidate(&spec, samples, tempo.bpm, &grid, config) {
            log::debug!(
                "Merging structural candidate (confidence {:.3} vs {:.3})",
                structural.confidence,
                best_confidence
            );
            candidates.push(structural);
            rank(&mut candidates);
            candidates.truncate(1 + looper::candidates::MAX_RUNNERS_UP);
        }
    }

    let sr = sample_rate as f32;

    // No admissible loop length is not a degenerate signal: keep the tempo
    // and beat grid, loop the full track with zero loop confidence
    if candidates.is_empty() {
        log::warn!("No admissible loop candidate, falling back to full track");
        return Ok(LoopAnalysis {
            bpm: finite_or(tempo.bpm, config.default_bpm),
            bpm_confidence: finite_or(tempo.confidence, 0.0).clamp(0.0, 1.0),
            tempo_candidates: tempo.candidates,
            beat_grid: grid.times(),
            loop_start: 0.0,
            loop_end: samples.len() as f32 / sr,
            loop_confidence: 0.0,
            crossfade: None,
            candidates: vec![],
            degenerate: false,
        });
    }

    let best = refine_candidate_length(samples, sample_rate, &candidates[0]);
    candidates[0] = best.clone();

    let refined = refine_boundaries(
        samples,
        best.start_sample,
        best.end_sample,
        sample_rate,
        config,
    )?;

    Ok(LoopAnalysis {
        bpm: finite_or(tempo.bpm, config.default_bpm),
        bpm_confidence: finite_or(tempo.confidence, 0.0).clamp(0.0, 1.0),
        tempo_candidates: tempo.candidates,
        beat_grid: grid.times(),
        loop_start: refined.start as f32 / sr,
        loop_end: refined.end as f32 / sr,
        loop_confidence: finite_or(best.confidence, 0.0).clamp(0.0, 1.0),
        crossfade: refined.crossfade,
        candidates,
        degenerate: false,
    })
}

/// Analyze through a memoization cache
///
/// Returns the cached result when the same buffer, sample rate, and
/// configuration were analyzed before; otherwise runs [`analyze`] and stores
/// the outcome. Errors are never cached.
pub fn analyze_cached(
    cache: &AnalysisCache,
    samples: &[f32],
    sample_rate: u32,
    config: &EngineConfig,
) -> Result<LoopAnalysis, AnalysisError> {
    let key = content_key(samples, sample_rate, config);
    if let Some(hit) = cache.get(key) {
        log::debug!("Cache hit for key {:#018x}", key);
        return Ok(hit);
    }
    let result = analyze(samples, sample_rate, config)?;
    cache.put(key, result.clone());
    Ok(result)
}

/// Best-effort result for signals with no usable rhythmic information
fn degenerate_result(samples: &[f32], sample_rate: u32, config: &EngineConfig) -> LoopAnalysis {
    let duration = samples.len() as f32 / sample_rate as f32;
    LoopAnalysis {
        bpm: config.default_bpm,
        bpm_confidence: 0.0,
        tempo_candidates: vec![],
        beat_grid: vec![],
        loop_start: 0.0,
        loop_end: duration,
        loop_confidence: 0.0,
        crossfade: None,
        candidates: vec![],
        degenerate: true,
    }
}

/// Replace a non-finite value with a fallback
fn finite_or(value: f32, fallback: f32) -> f32 {
    if value.is_finite() {
        value
    } else {
        fallback
    }
}
