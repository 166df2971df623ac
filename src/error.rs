//! Error types.
//!
//! The per-sample update path of [`crate::Ahrs`] never fails; these errors
//! only surface from explicit operations with a precondition the caller can
//! violate (normalizing a zero vector, building a filter with an unusable
//! cutoff, evaluating a calibration fit without enough data).

use thiserror::Error;

/// Errors raised by the vector, matrix and quaternion types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum AlgebraError {
    /// Normalization of a vector whose norm is zero (or not finite).
    #[error("cannot normalize a vector with zero norm")]
    ZeroNorm,
}

/// Errors raised when constructing a [`crate::Pt2`] filter.
#[derive(Debug, Clone, Copy, PartialEq, Error)]
pub enum FilterError {
    /// The cutoff ratio `Fc / Fs` must lie in the open interval `(0, 0.5)`.
    #[error("cutoff ratio {ratio} is outside of (0, 0.5)")]
    CutoffOutOfRange {
        /// The rejected ratio.
        ratio: f64,
    },
}

/// Errors raised when evaluating a magnetometer calibration fit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum CalibrationError {
    /// The fit for this axis has not seen enough samples yet.
    #[error("axis {axis}: {samples} samples are not enough for a fit")]
    InsufficientSamples {
        /// Sensor axis index.
        axis: usize,
        /// Number of samples collected so far.
        samples: u64,
    },
    /// The samples for this axis carry no excitation (constant input), so the
    /// slope is undetermined.
    #[error("axis {axis}: samples are degenerate, slope is undetermined")]
    Degenerate {
        /// Sensor axis index.
        axis: usize,
    },
}

/// Errors raised by the [`crate::Ahrs`] estimator outside of its update cycle.
#[derive(Debug, Clone, Copy, PartialEq, Error)]
pub enum AhrsError {
    /// A parameter failed validation.
    #[error("invalid AHRS parameter `{name}`")]
    InvalidParameter {
        /// Name of the offending parameter field.
        name: &'static str,
    },
    /// One of the output smoothing filters could not be built.
    #[error(transparent)]
    Filter(#[from] FilterError),
    /// The magnetometer calibration could not be computed.
    #[error(transparent)]
    Calibration(#[from] CalibrationError),
    /// Sensor vectors given for an attitude setup are degenerate (zero, or
    /// acceleration parallel to the induction).
    #[error(transparent)]
    Algebra(#[from] AlgebraError),
}
