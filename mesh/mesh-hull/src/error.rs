//! Error types for hull construction.

use thiserror::Error;

/// Errors that can occur when building a convex hull.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum HullError {
    /// Fewer than four usable points, or all points coincide.
    #[error("convex hull needs at least 4 distinct points, found {count}")]
    TooFewPoints {
        /// Number of usable (finite) points, or 1 when they all coincide.
        count: usize,
    },

    /// All points lie on a single line.
    #[error("points are collinear")]
    Collinear,

    /// All points lie in a single plane.
    #[error("points are coplanar")]
    Coplanar,

    /// The tolerance was negative or not finite.
    #[error("hull tolerance must be finite and non-negative, got {0}")]
    InvalidTolerance(f64),
}

impl HullError {
    /// Whether the error describes the input geometry rather than the
    /// parameters.
    ///
    /// Degenerate inputs are expected for noisy scan clusters and callers
    /// usually skip them.
    #[must_use]
    pub const fn is_degenerate(&self) -> bool {
        matches!(
            self,
            Self::TooFewPoints { .. } | Self::Collinear | Self::Coplanar
        )
    }
}

/// Result type for hull operations.
pub type HullResult<T> = Result<T, HullError>;
