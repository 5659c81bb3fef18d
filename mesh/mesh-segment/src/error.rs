//! Error types for scene segmentation.

use mesh_types::MeshError;
use thiserror::Error;

/// Errors that can occur while segmenting a scene.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SegmentError {
    /// The scene mesh failed structural validation.
    #[error("invalid scene mesh: {0}")]
    InvalidMesh(#[from] MeshError),

    /// The exclusion margin was negative or not finite.
    #[error("exclusion margin must be finite and non-negative, got {0}")]
    InvalidMargin(f64),
}

/// Result type for segmentation operations.
pub type SegmentResult<T> = Result<T, SegmentError>;
