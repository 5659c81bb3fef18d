//! Similarity transform produced by registration.

use nalgebra::{Matrix4, Point3, Quaternion, UnitQuaternion, Vector3};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// A rigid transformation consisting of rotation, translation, and optional
/// uniform scale.
///
/// The transformation is applied in the order: scale -> rotate -> translate,
/// so `target = scale * (rotation * source) + translation`. Scale stays at
/// `1.0` unless scale estimation was requested.
///
/// # Example
///
/// ```
/// use mesh_registration::RigidTransform;
/// use nalgebra::{Point3, UnitQuaternion, Vector3};
/// use std::f64::consts::FRAC_PI_2;
///
/// let rotation = UnitQuaternion::from_axis_angle(&Vector3::z_axis(), FRAC_PI_2);
/// let transform = RigidTransform::new(rotation, Vector3::new(1.0, 2.0, 3.0));
///
/// let moved = transform.transform_point(&Point3::new(1.0, 0.0, 0.0));
/// assert!((moved - Point3::new(1.0, 3.0, 3.0)).norm() < 1e-12);
///
/// let back = transform.inverse_transform_point(&moved);
/// assert!((back - Point3::new(1.0, 0.0, 0.0)).norm() < 1e-12);
/// ```
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct RigidTransform {
    /// Rotation as a unit quaternion.
    pub rotation: UnitQuaternion<f64>,
    /// Translation vector.
    pub translation: Vector3<f64>,
    /// Uniform scale factor (default 1.0).
    pub scale: f64,
}

impl Default for RigidTransform {
    fn default() -> Self {
        Self::identity()
    }
}

impl RigidTransform {
    /// Creates a new rigid transform with scale 1.0.
    #[must_use]
    pub const fn new(rotation: UnitQuaternion<f64>, translation: Vector3<f64>) -> Self {
        Self {
            rotation,
            translation,
            scale: 1.0,
        }
    }

    /// Creates a new transform with rotation, translation, and scale.
    #[must_use]
    pub const fn with_scale(
        rotation: UnitQuaternion<f64>,
        translation: Vector3<f64>,
        scale: f64,
    ) -> Self {
        Self {
            rotation,
            translation,
            scale,
        }
    }

    /// The identity transform.
    #[must_use]
    pub fn identity() -> Self {
        Self::new(UnitQuaternion::identity(), Vector3::zeros())
    }

    /// Creates a transform with only translation.
    #[must_use]
    pub fn from_translation(translation: Vector3<f64>) -> Self {
        Self::new(UnitQuaternion::identity(), translation)
    }

    /// Creates a transform with only rotation.
    #[must_use]
    pub fn from_rotation(rotation: UnitQuaternion<f64>) -> Self {
        Self::new(rotation, Vector3::zeros())
    }

    /// Creates a transform with only uniform scale.
    #[must_use]
    pub fn from_scale(scale: f64) -> Self {
        Self::with_scale(UnitQuaternion::identity(), Vector3::zeros(), scale)
    }

    /// Transforms a 3D point.
    #[must_use]
    pub fn transform_point(&self, point: &Point3<f64>) -> Point3<f64> {
        Point3::from(self.rotation * (point.coords * self.scale) + self.translation)
    }

    /// Applies the inverse transform to a point without building the
    /// inverse.
    #[must_use]
    pub fn inverse_transform_point(&self, point: &Point3<f64>) -> Point3<f64> {
        let unrotated = self
            .rotation
            .inverse_transform_vector(&(point.coords - self.translation));
        Point3::from(unrotated / self.scale)
    }

    /// Transforms a direction: scaled and rotated, never translated.
    #[must_use]
    pub fn transform_vector(&self, vector: &Vector3<f64>) -> Vector3<f64> {
        self.rotation * (vector * self.scale)
    }

    /// Rotates an orientation into the target frame (`rotation * q`).
    #[must_use]
    pub fn transform_rotation(&self, orientation: &UnitQuaternion<f64>) -> UnitQuaternion<f64> {
        self.rotation * orientation
    }

    /// Composes this transform with another (`self * other`).
    ///
    /// The result applies `other` first, then `self`. The rotation is
    /// renormalized so repeated composition does not drift off the unit
    /// sphere.
    #[must_use]
    pub fn compose(&self, other: &Self) -> Self {
        Self {
            rotation: self.rotation * other.rotation,
            translation: self.translation + self.rotation * (other.translation * self.scale),
            scale: self.scale * other.scale,
        }
        .renormalize()
    }

    /// Re-projects the rotation onto a unit quaternion.
    #[must_use]
    pub fn renormalize(mut self) -> Self {
        let q: Quaternion<f64> = self.rotation.into_inner();
        self.rotation = UnitQuaternion::new_normalize(q);
        self
    }

    /// Computes the inverse of this transform.
    #[must_use]
    pub fn inverse(&self) -> Self {
        let inv_scale = 1.0 / self.scale;
        let inv_rotation = self.rotation.inverse();
        Self {
            rotation: inv_rotation,
            translation: inv_rotation * (-self.translation * inv_scale),
            scale: inv_scale,
        }
    }

    /// Angle in radians between this rotation and another's.
    #[must_use]
    pub fn rotation_angle_to(&self, other: &Self) -> f64 {
        self.rotation.angle_to(&other.rotation)
    }

    /// Whether every component is finite and the scale is positive.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.rotation.coords.iter().all(|c| c.is_finite())
            && self.translation.iter().all(|c| c.is_finite())
            && self.scale.is_finite()
            && self.scale > 0.0
    }

    /// Converts to a 4x4 homogeneous transformation matrix.
    #[must_use]
    pub fn to_matrix4(&self) -> Matrix4<f64> {
        let mut mat = Matrix4::identity();
        let rot = self.rotation.to_rotation_matrix();
        mat.fixed_view_mut::<3, 3>(0, 0)
            .copy_from(&(rot.matrix() * self.scale));
        mat.fixed_view_mut::<3, 1>(0, 3).copy_from(&self.translation);
        mat
    }

    /// Returns true if this transform is approximately the identity.
    #[must_use]
    pub fn is_identity(&self, epsilon: f64) -> bool {
        self.rotation.angle().abs() < epsilon
            && self.translation.norm() < epsilon
            && (self.scale - 1.0).abs() < epsilon
    }
}

#[cfg(test)]
#[allow(clippy::float_cmp)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use std::f64::consts::PI;

    #[test]
    fn identity_leaves_points() {
        let p = Point3::new(1.0, 2.0, 3.0);
        assert_relative_eq!(RigidTransform::identity().transform_point(&p), p);
        assert_eq!(RigidTransform::default(), RigidTransform::identity());
    }

    #[test]
    fn rotation_then_translation() {
        let rotation = UnitQuaternion::from_axis_angle(&Vector3::z_axis(), PI / 2.0);
        let transform = RigidTransform::new(rotation, Vector3::new(0.0, 0.0, 5.0));
        let result = transform.transform_point(&Point3::new(1.0, 0.0, 0.0));
        assert_relative_eq!(result, Point3::new(0.0, 1.0, 5.0), epsilon = 1e-12);
    }

    #[test]
    fn scale_applies_before_translation() {
        let transform = RigidTransform::with_scale(
            UnitQuaternion::identity(),
            Vector3::new(1.0, 0.0, 0.0),
            2.0,
        );
        let result = transform.transform_point(&Point3::new(1.0, 1.0, 1.0));
        assert_relative_eq!(result, Point3::new(3.0, 2.0, 2.0));
    }

    #[test]
    fn inverse_round_trips_with_scale() {
        let rotation = UnitQuaternion::from_euler_angles(0.3, -1.2, 2.5);
        let transform = RigidTransform::with_scale(rotation, Vector3::new(1.0, -2.0, 3.0), 1.5);
        let p = Point3::new(0.4, 7.0, -3.0);

        let moved = transform.transform_point(&p);
        assert_relative_eq!(transform.inverse().transform_point(&moved), p, epsilon = 1e-12);
        assert_relative_eq!(transform.inverse_transform_point(&moved), p, epsilon = 1e-12);
    }

    #[test]
    fn compose_applies_right_operand_first() {
        let spin = RigidTransform::from_rotation(UnitQuaternion::from_axis_angle(
            &Vector3::z_axis(),
            PI / 2.0,
        ));
        let shift = RigidTransform::from_translation(Vector3::new(1.0, 0.0, 0.0));

        // shift then spin: (0,0,0) -> (1,0,0) -> (0,1,0)
        let p = spin.compose(&shift).transform_point(&Point3::origin());
        assert_relative_eq!(p, Point3::new(0.0, 1.0, 0.0), epsilon = 1e-12);
    }

    #[test]
    fn repeated_composition_stays_unit() {
        let step = RigidTransform::new(
            UnitQuaternion::from_axis_angle(&Vector3::x_axis(), 0.001),
            Vector3::new(0.0, 0.0, 0.001),
        );
        let mut acc = RigidTransform::identity();
        for _ in 0..10_000 {
            acc = step.compose(&acc);
        }
        assert_relative_eq!(acc.rotation.quaternion().norm(), 1.0, epsilon = 1e-12);
        let det = acc.rotation.to_rotation_matrix().matrix().determinant();
        assert_relative_eq!(det, 1.0, epsilon = 1e-9);
    }

    #[test]
    fn renormalize_fixes_drifted_quaternion() {
        let drifted = UnitQuaternion::new_unchecked(Quaternion::new(1.001, 0.0, 0.0, 0.0));
        let fixed = RigidTransform::from_rotation(drifted).renormalize();
        assert_relative_eq!(fixed.rotation.quaternion().norm(), 1.0, epsilon = 1e-15);
    }

    #[test]
    fn transform_rotation_premultiplies() {
        let frame = RigidTransform::from_rotation(UnitQuaternion::from_axis_angle(
            &Vector3::z_axis(),
            PI / 2.0,
        ));
        let heading = UnitQuaternion::from_axis_angle(&Vector3::x_axis(), PI / 2.0);
        let world = frame.transform_rotation(&heading);

        // The local y axis of the rotated object, seen in the target frame.
        let axis = world * Vector3::y();
        assert_relative_eq!(axis, frame.rotation * (heading * Vector3::y()), epsilon = 1e-12);
    }

    #[test]
    fn angle_between_rotations() {
        let about_y = |angle| {
            RigidTransform::from_rotation(UnitQuaternion::from_axis_angle(&Vector3::y_axis(), angle))
        };
        let (a, b) = (about_y(0.2), about_y(0.5));
        assert_relative_eq!(a.rotation_angle_to(&b), 0.3, epsilon = 1e-12);
    }

    #[test]
    fn matrix_layout() {
        let transform = RigidTransform::with_scale(
            UnitQuaternion::identity(),
            Vector3::new(1.0, 2.0, 3.0),
            2.0,
        );
        let mat = transform.to_matrix4();
        assert_relative_eq!(mat[(0, 0)], 2.0);
        assert_relative_eq!(mat[(0, 3)], 1.0);
        assert_relative_eq!(mat[(2, 3)], 3.0);
        assert_relative_eq!(mat[(3, 3)], 1.0);
    }

    #[test]
    fn validity() {
        assert!(RigidTransform::identity().is_valid());
        assert!(!RigidTransform::from_scale(0.0).is_valid());
        assert!(!RigidTransform::from_translation(Vector3::new(f64::NAN, 0.0, 0.0)).is_valid());
    }

    #[test]
    fn identity_check_tolerance() {
        let nudged = RigidTransform::from_translation(Vector3::new(0.001, 0.0, 0.0));
        assert!(!nudged.is_identity(1e-10));
        assert!(nudged.is_identity(0.01));
    }
}
