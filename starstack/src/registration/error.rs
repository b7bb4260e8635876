use thiserror::Error;

/// Why correlation optimization stopped without an acceptable transform.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConvergenceReason {
    #[error("transform parameters became non-finite")]
    NonFinite,
    #[error("Gauss-Newton system is singular")]
    SingularHessian,
    #[error("image has no intensity variation in the overlap")]
    ZeroVariance,
    #[error("images are uncorrelated or do not overlap")]
    Uncorrelated,
    #[error("only {valid} of {total} pixels overlap")]
    InsufficientOverlap { valid: usize, total: usize },
    #[error("correlation {correlation:.4} is below the minimum {min:.4}")]
    LowCorrelation { correlation: f64, min: f64 },
}

/// Specific reason for RANSAC failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum RansacFailureReason {
    #[error("not enough correspondences for the model")]
    TooFewCorrespondences,
    #[error("no hypothesis passed validation")]
    NoValidHypothesis,
    #[error("too few inliers")]
    TooFewInliers,
    #[error("inlier ratio too low")]
    LowInlierRatio,
}

/// A frame could not be registered. Always recoverable at batch level.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RegistrationError {
    #[error("correlation optimization failed after {iterations} iterations: {reason}")]
    ConvergenceFailure {
        iterations: usize,
        reason: ConvergenceReason,
    },

    #[error("insufficient stars: found {found}, required {required}")]
    InsufficientStars { found: usize, required: usize },

    #[error("no matching star patterns")]
    NoMatchingPatterns,

    #[error("RANSAC failed ({reason}) after {iterations} iterations, best inlier count {best_inlier_count}")]
    RansacFailed {
        reason: RansacFailureReason,
        iterations: usize,
        best_inlier_count: usize,
    },

    #[error("registration accuracy too low: RMS {rms_error:.3} px > {max_allowed:.3} px")]
    AccuracyTooLow { rms_error: f64, max_allowed: f64 },

    #[error("frame is {width}x{height}, reference is {reference_width}x{reference_height}")]
    DimensionMismatch {
        width: usize,
        height: usize,
        reference_width: usize,
        reference_height: usize,
    },
}

impl RegistrationError {
    /// The optimizer or point matcher ran and did not find a usable transform.
    pub fn is_convergence_failure(&self) -> bool {
        !matches!(self, Self::DimensionMismatch { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_carry_context() {
        let err = RegistrationError::ConvergenceFailure {
            iterations: 12,
            reason: ConvergenceReason::LowCorrelation {
                correlation: 0.05,
                min: 0.3,
            },
        };
        assert_eq!(
            err.to_string(),
            "correlation optimization failed after 12 iterations: correlation 0.0500 is below the minimum 0.3000"
        );

        let err = RegistrationError::InsufficientStars {
            found: 1,
            required: 6,
        };
        assert_eq!(err.to_string(), "insufficient stars: found 1, required 6");
        assert!(err.is_convergence_failure());
    }

    #[test]
    fn dimension_mismatch_is_not_convergence() {
        let err = RegistrationError::DimensionMismatch {
            width: 10,
            height: 10,
            reference_width: 12,
            reference_height: 10,
        };
        assert!(!err.is_convergence_failure());
        assert_eq!(err.to_string(), "frame is 10x10, reference is 12x10");
    }
}
