//! The registered robot frame and its shared handle.

use std::sync::{Arc, PoisonError, RwLock};

use mesh_registration::RigidTransform;
use nalgebra::{Point3, UnitQuaternion, Vector3};
use tracing::debug;

/// The robot's pose in the world, fixed once registration succeeds.
///
/// The transform maps robot-model coordinates to world coordinates. The
/// inverse rotation and scale are computed once here; a new registration
/// builds a new frame instead of mutating this one.
///
/// # Example
///
/// ```
/// use mesh_localize::RegisteredFrame;
/// use mesh_registration::RigidTransform;
/// use nalgebra::{Point3, UnitQuaternion, Vector3};
///
/// let transform = RigidTransform::new(
///     UnitQuaternion::from_axis_angle(&Vector3::z_axis(), 0.5),
///     Vector3::new(2.0, 1.0, 0.0),
/// );
/// let frame = RegisteredFrame::new(transform, 0.0);
///
/// let p = Point3::new(0.3, -0.2, 1.0);
/// let back = frame.world_to_robot_point(&frame.robot_to_world_point(&p));
/// assert!((back - p).norm() < 1e-12);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct RegisteredFrame {
    transform: RigidTransform,
    fit_error: Option<f64>,
    cluster_index: Option<usize>,
    inverse_rotation: UnitQuaternion<f64>,
    inverse_scale: f64,
}

impl RegisteredFrame {
    /// Creates a frame from a robot-to-world transform and its RMS fit
    /// error.
    #[must_use]
    pub fn new(transform: RigidTransform, fit_error: f64) -> Self {
        let transform = transform.renormalize();
        Self {
            inverse_rotation: transform.rotation.inverse(),
            inverse_scale: 1.0 / transform.scale,
            transform,
            fit_error: Some(fit_error),
            cluster_index: None,
        }
    }

    /// Creates a frame from a stored transform. It carries no fit error.
    #[must_use]
    pub fn restored(transform: RigidTransform) -> Self {
        Self {
            fit_error: None,
            ..Self::new(transform, 0.0)
        }
    }

    /// Records which scene cluster the frame was fitted to.
    #[must_use]
    pub const fn with_cluster_index(mut self, index: usize) -> Self {
        self.cluster_index = Some(index);
        self
    }

    /// The robot-to-world transform.
    #[must_use]
    pub const fn transform(&self) -> &RigidTransform {
        &self.transform
    }

    /// RMS error of the winning fit; `None` for restored frames.
    #[must_use]
    pub const fn fit_error(&self) -> Option<f64> {
        self.fit_error
    }

    /// Scene cluster the frame was fitted to; `None` for restored frames.
    #[must_use]
    pub const fn cluster_index(&self) -> Option<usize> {
        self.cluster_index
    }

    /// Maps a point from robot coordinates to world coordinates.
    #[must_use]
    pub fn robot_to_world_point(&self, point: &Point3<f64>) -> Point3<f64> {
        self.transform.transform_point(point)
    }

    /// Maps a point from world coordinates to robot coordinates.
    #[must_use]
    pub fn world_to_robot_point(&self, point: &Point3<f64>) -> Point3<f64> {
        Point3::from(
            self.inverse_rotation * (point.coords - self.transform.translation) * self.inverse_scale,
        )
    }

    /// Maps a direction from robot to world coordinates, without translation.
    #[must_use]
    pub fn robot_to_world_vector(&self, vector: &Vector3<f64>) -> Vector3<f64> {
        self.transform.rotation * vector
    }

    /// Maps a direction from world to robot coordinates, without translation.
    #[must_use]
    pub fn world_to_robot_vector(&self, vector: &Vector3<f64>) -> Vector3<f64> {
        self.inverse_rotation * vector
    }

    /// Maps an orientation expressed in the robot frame into the world.
    #[must_use]
    pub fn robot_to_world_rotation(&self, rotation: &UnitQuaternion<f64>) -> UnitQuaternion<f64> {
        self.transform.transform_rotation(rotation)
    }

    /// Maps a world orientation into the robot frame.
    #[must_use]
    pub fn world_to_robot_rotation(&self, rotation: &UnitQuaternion<f64>) -> UnitQuaternion<f64> {
        self.inverse_rotation * rotation
    }
}

/// Shared, swappable access to the current [`RegisteredFrame`].
///
/// Clones share the same slot. Readers get an `Arc` snapshot that stays
/// valid after a re-registration replaces the frame, so they see either the
/// old frame or the new one in full.
#[derive(Debug, Clone, Default)]
pub struct FrameHandle {
    slot: Arc<RwLock<Option<Arc<RegisteredFrame>>>>,
}

impl FrameHandle {
    /// Creates an empty handle.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the current frame.
    #[must_use]
    pub fn current(&self) -> Option<Arc<RegisteredFrame>> {
        self.slot
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Whether a registered frame is available.
    #[must_use]
    pub fn is_available(&self) -> bool {
        self.slot
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    /// Installs `frame`, returning the one it replaced.
    pub(crate) fn publish(&self, frame: Arc<RegisteredFrame>) -> Option<Arc<RegisteredFrame>> {
        debug!(fit_error = ?frame.fit_error(), "Publishing registered frame");
        self.slot
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .replace(frame)
    }

    /// Removes the current frame, returning it.
    pub(crate) fn clear(&self) -> Option<Arc<RegisteredFrame>> {
        self.slot
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }
}
