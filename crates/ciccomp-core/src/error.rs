//! Error taxonomy for design runs.
//!
//! A run yields exactly one success or one typed failure; no partial result is
//! ever exposed as if it were final. [`DesignError::Diverged`] carries the
//! last valid coefficients and the per-iteration error trace so a failed run
//! can still be diagnosed.

use crate::remez::FilterDesign;

/// Result type for design operations.
pub type DesignResult<T> = Result<T, DesignError>;

/// Errors that can occur during a filter design run.
#[derive(Debug, Clone, thiserror::Error)]
pub enum DesignError {
    /// Malformed input: bad band edges, overlapping bands, non-positive
    /// weight, or an unusable filter order. Detected before iteration begins
    /// and never retried automatically.
    #[error("invalid specification: {0}")]
    InvalidSpecification(String),

    /// The eigenvalue decomposition failed to converge, or a matrix or
    /// interpolation system was numerically singular at the active precision.
    /// Aborts the run immediately; retrying with a higher-precision context
    /// may succeed.
    #[error("numerical failure: {0}")]
    NumericalFailure(String),

    /// The maximum weighted error stopped improving, or the reference set
    /// degenerated (points merged or left the band union). `last_taps` holds
    /// the coefficients from the last valid iteration and `error_trace` the
    /// recorded maximum weighted error per iteration.
    #[error("design diverged after {iterations} iterations")]
    Diverged {
        /// Iterations completed before divergence was declared.
        iterations: usize,
        /// Coefficients from the last iteration that produced a valid
        /// reference set. Diagnostic only; not an optimal filter.
        last_taps: Vec<f64>,
        /// Maximum weighted dense-grid error recorded at each iteration.
        error_trace: Vec<f64>,
    },

    /// The iteration bound was reached without convergence or divergence.
    /// The best design found so far is attached; whether callers treat this
    /// as usable is their decision, the engine does not pretend it converged.
    #[error("iteration limit of {iterations} reached without convergence")]
    MaxIterationsExceeded {
        /// The configured iteration bound that was exhausted.
        iterations: usize,
        /// Best-effort design state at the point the bound was hit, with
        /// `converged` set to `false`.
        best: Box<FilterDesign>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_messages() {
        let e = DesignError::InvalidSpecification("band edge above 0.5".into());
        assert!(e.to_string().contains("invalid specification"));

        let e = DesignError::NumericalFailure("QR did not converge".into());
        assert!(e.to_string().contains("numerical failure"));

        let e = DesignError::Diverged {
            iterations: 12,
            last_taps: vec![0.0; 3],
            error_trace: vec![1.0, 0.9],
        };
        assert!(e.to_string().contains("12 iterations"));
    }
}
