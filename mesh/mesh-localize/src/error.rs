//! Error types for registration and localization.

use mesh_hull::HullError;
use mesh_segment::SegmentError;
use thiserror::Error;

/// Errors surfaced by the registrar and the localization session.
///
/// Per-cluster failures never appear here; they are logged and the cluster
/// is skipped. Everything below is terminal for the attempt that raised it.
#[derive(Debug, Error)]
pub enum LocalizeError {
    /// The robot model could not produce a hull.
    #[error("robot model is degenerate: {0}")]
    RobotModel(#[source] HullError),

    /// The scene mesh or segmentation parameters were rejected.
    #[error("invalid scene: {0}")]
    InvalidScene(#[from] SegmentError),

    /// No cluster produced an acceptable fit.
    #[error("no acceptable fit: {rejected} of {clusters} clusters rejected")]
    NoAcceptableFit {
        /// Clusters produced by segmentation.
        clusters: usize,
        /// Clusters that failed hull construction, ICP, or the error limit.
        rejected: usize,
    },

    /// Registration was cancelled before it finished.
    #[error("registration cancelled")]
    Cancelled,

    /// A configuration value was out of range.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// JSON encoding or decoding failed.
    #[error("serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A decoded transform was not finite or had non-positive scale.
    #[error("stored transform is invalid")]
    InvalidTransform,

    /// Nothing is stored under the key.
    #[error("no transform stored under {0:?}")]
    MissingKey(String),

    /// The transform store reported a failure.
    #[error("transform store failed: {0}")]
    Store(String),

    /// No registered frame is available.
    #[error("no registered frame")]
    NoFrame,

    /// The background worker could not be started.
    #[error("failed to spawn registration worker: {0}")]
    Spawn(#[from] std::io::Error),

    /// The background worker exited without reporting.
    #[error("registration worker stopped unexpectedly")]
    WorkerLost,
}

impl LocalizeError {
    /// Whether the error means the session needs a fallback, such as manual
    /// placement, rather than a retry.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::RobotModel(_) | Self::NoAcceptableFit { .. })
    }
}

/// Result type for localization operations.
pub type LocalizeResult<T> = Result<T, LocalizeError>;
