//! Analysis result types

use serde::{Deserialize, Serialize};

use crate::features::tempo::TempoCandidate;
use crate::looper::candidates::LoopCandidate;
use crate::looper::refine::CrossfadeSpec;

/// Complete result of one analysis call
///
/// All times are in seconds relative to the start of the analyzed buffer.
/// Every field is guaranteed finite: numerical edge cases inside the engine
/// resolve to safe defaults rather than propagating NaN or infinity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoopAnalysis {
    /// Estimated tempo in beats per minute
    pub bpm: f32,

    /// Tempo confidence in [0, 1]; zero for degenerate signals
    pub bpm_confidence: f32,

    /// Alternative tempo hypotheses, sorted by strength descending
    pub tempo_candidates: Vec<TempoCandidate>,

    /// Beat positions in seconds, strictly increasing
    pub beat_grid: Vec<f32>,

    /// Loop start in seconds
    pub loop_start: f32,

    /// Loop end in seconds
    pub loop_end: f32,

    /// Confidence of the chosen loop in [0, 1]
    pub loop_confidence: f32,

    /// Crossfade to apply at the loop seam when no clean zero crossing was
    /// found near the boundaries
    pub crossfade: Option<CrossfadeSpec>,

    /// The chosen candidate plus runners-up, best first
    pub candidates: Vec<LoopCandidate>,

    /// True when the signal was silent or otherwise carried no usable
    /// rhythmic information; the tempo and loop fields then hold best-effort
    /// defaults
    pub degenerate: bool,
}
