//! Loop point search
//!
//! Bar-aligned candidate generation and scoring, sample-accurate boundary
//! refinement, and the recurrence-matrix structural fallback.

pub mod candidates;
pub mod refine;
pub mod structure;
