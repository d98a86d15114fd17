//! Error types for the loop analysis engine

use std::fmt;

/// Errors that can occur during loop analysis
///
/// Degenerate signals (silence, flat spectrum) are deliberately *not* errors:
/// they produce a [`crate::LoopAnalysis`] with `degenerate = true` and zero
/// confidence, since "no tempo" is a valid analytical outcome.
#[derive(Debug, Clone, PartialEq)]
pub enum AnalysisError {
    /// Malformed caller input: bad frame/hop lengths, empty buffer,
    /// inverted loop bounds, invalid configuration
    InvalidParameter(String),

    /// Buffer too short for the requested analysis. Distinct from
    /// `InvalidParameter` because it depends on the data, not a caller
    /// mistake.
    InsufficientLength {
        /// Minimum number of samples required
        required: usize,
        /// Number of samples actually supplied
        actual: usize,
    },
}

impl fmt::Display for AnalysisError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AnalysisError::InvalidParameter(msg) => write!(f, "Invalid parameter: {}", msg),
            AnalysisError::InsufficientLength { required, actual } => write!(
                f,
                "Insufficient signal length: need at least {} samples, got {}",
                required, actual
            ),
        }
    }
}

impl std::error::Error for AnalysisError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_invalid_parameter() {
        let err = AnalysisError::InvalidParameter("hop must be >= 1".to_string());
        assert!(err.to_string().contains("hop must be >= 1"));
    }

    #[test]
    fn test_display_insufficient_length() {
        let err = AnalysisError::InsufficientLength {
            required: 2048,
            actual: 100,
        };
        let msg = err.to_string();
        assert!(msg.contains("2048"));
        assert!(msg.contains("100"));
    }
}
