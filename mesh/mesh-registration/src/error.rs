//! Error types for point-set registration.

use thiserror::Error;

/// Errors that can occur during registration.
///
/// Every variant describes a problem with one alignment attempt. Callers
/// comparing several candidates usually log the error and move on.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RegistrationError {
    /// The moving point set is empty.
    #[error("source point set is empty")]
    EmptySource,

    /// The fixed point set is empty.
    #[error("target point set is empty")]
    EmptyTarget,

    /// Every correspondence was rejected by the distance filter.
    #[error("no correspondences survived filtering")]
    NoCorrespondences,

    /// Too few paired points, or too few distinct ones, to determine a
    /// rotation. All pairs landing on a single target point reports
    /// `provided: 1`.
    #[error("at least {required} distinct point pairs required, got {provided}")]
    InsufficientData {
        /// Number of pairs required.
        required: usize,
        /// Number of pairs (or distinct positions) available.
        provided: usize,
    },

    /// The paired points lie on a line, leaving the rotation about it free.
    #[error("paired points are collinear; rotation is undetermined")]
    Collinear,

    /// SVD computation failed during transform estimation.
    #[error("SVD computation failed during transform estimation")]
    SvdFailed,

    /// Invalid parameter value.
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    /// The alignment was cancelled between iterations.
    #[error("registration cancelled")]
    Cancelled,
}

/// Result type for registration operations.
pub type RegistrationResult<T> = Result<T, RegistrationError>;
