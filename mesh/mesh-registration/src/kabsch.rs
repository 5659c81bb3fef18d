//! Kabsch/Umeyama solve for paired point sets.
//!
//! Given pairs `(s_i, t_i)`, finds the rotation, translation, and optionally
//! the uniform scale minimizing `sum w_i |s R s_i + t - t_i|^2`.

use crate::{RegistrationError, RegistrationResult, RigidTransform};
use nalgebra::{Matrix3, Point3, Rotation3, UnitQuaternion, Vector3};

/// Minimum number of pairs that can pin down a rotation.
pub const MIN_PAIRS: usize = 3;

/// Ratio of the second to the first singular value of the cross-covariance
/// below which the pairs are treated as collinear.
const COLLINEAR_RATIO: f64 = 1e-10;

/// Computes the optimal transform mapping `source_points` onto
/// `target_points`, paired by index.
///
/// # Errors
///
/// - [`RegistrationError::EmptySource`] / [`RegistrationError::EmptyTarget`]
/// - [`RegistrationError::InvalidParameter`] if the lengths differ
/// - [`RegistrationError::InsufficientData`] for fewer than three pairs, or
///   when every weighted source or target point sits at one position
/// - [`RegistrationError::Collinear`] if the pairs lie on a line
/// - [`RegistrationError::SvdFailed`] if the decomposition does not converge
///
/// # Example
///
/// ```
/// use mesh_registration::compute_rigid_transform;
/// use nalgebra::Point3;
///
/// let source = vec![
///     Point3::new(0.0, 0.0, 0.0),
///     Point3::new(1.0, 0.0, 0.0),
///     Point3::new(0.0, 1.0, 0.0),
/// ];
/// let target: Vec<_> = source
///     .iter()
///     .map(|p| Point3::new(p.x + 1.0, p.y + 2.0, p.z + 3.0))
///     .collect();
///
/// let transform = compute_rigid_transform(&source, &target, false).unwrap();
/// let aligned = transform.transform_point(&source[0]);
/// assert!((aligned - target[0]).norm() < 1e-9);
/// ```
pub fn compute_rigid_transform(
    source_points: &[Point3<f64>],
    target_points: &[Point3<f64>],
    compute_scale: bool,
) -> RegistrationResult<RigidTransform> {
    let weights = vec![1.0; source_points.len()];
    compute_weighted_rigid_transform(source_points, target_points, &weights, compute_scale)
}

/// Computes the optimal transform using weighted pairs.
///
/// Weights must be non-negative with a positive sum. Robust estimators pass
/// down-weighted outliers through here.
///
/// # Errors
///
/// As [`compute_rigid_transform`], plus [`RegistrationError::InvalidParameter`]
/// for mismatched or non-positive weights.
pub fn compute_weighted_rigid_transform(
    source_points: &[Point3<f64>],
    target_points: &[Point3<f64>],
    weights: &[f64],
    compute_scale: bool,
) -> RegistrationResult<RigidTransform> {
    if source_points.is_empty() {
        return Err(RegistrationError::EmptySource);
    }
    if target_points.is_empty() {
        return Err(RegistrationError::EmptyTarget);
    }
    if source_points.len() != target_points.len() || source_points.len() != weights.len() {
        return Err(RegistrationError::InvalidParameter(format!(
            "point sets and weights must have equal length: {} vs {} vs {}",
            source_points.len(),
            target_points.len(),
            weights.len()
        )));
    }
    if source_points.len() < MIN_PAIRS {
        return Err(RegistrationError::InsufficientData {
            required: MIN_PAIRS,
            provided: source_points.len(),
        });
    }
    if weights.iter().any(|w| !w.is_finite() || *w < 0.0) {
        return Err(RegistrationError::InvalidParameter(
            "weights must be finite and non-negative".to_string(),
        ));
    }
    let total_weight: f64 = weights.iter().sum();
    if total_weight <= 0.0 {
        return Err(RegistrationError::InvalidParameter(
            "total weight must be positive".to_string(),
        ));
    }

    if coincident(source_points, weights) || coincident(target_points, weights) {
        return Err(RegistrationError::InsufficientData {
            required: MIN_PAIRS,
            provided: 1,
        });
    }

    let source_centroid = weighted_centroid(source_points, weights, total_weight);
    let target_centroid = weighted_centroid(target_points, weights, total_weight);

    let source_centered: Vec<Vector3<f64>> = source_points
        .iter()
        .map(|p| p.coords - source_centroid)
        .collect();
    let target_centered: Vec<Vector3<f64>> = target_points
        .iter()
        .map(|p| p.coords - target_centroid)
        .collect();

    // Cross-covariance H = sum w * s * t^T
    let mut h = Matrix3::zeros();
    for ((s, t), &w) in source_centered
        .iter()
        .zip(&target_centered)
        .zip(weights)
    {
        h += w * s * t.transpose();
    }

    let svd = h.svd(true, true);
    let mut singular: Vec<f64> = svd.singular_values.iter().copied().collect();
    singular.sort_unstable_by(|a, b| b.total_cmp(a));
    if singular[0] <= f64::MIN_POSITIVE || singular[1] <= COLLINEAR_RATIO * singular[0] {
        return Err(RegistrationError::Collinear);
    }

    let u = svd.u.ok_or(RegistrationError::SvdFailed)?;
    let v_t = svd.v_t.ok_or(RegistrationError::SvdFailed)?;

    // R = V * U^T
    let mut rotation_matrix = v_t.transpose() * u.transpose();

    // A negative determinant is a reflection; flip the singular vector of the
    // smallest singular value to get the closest proper rotation.
    if rotation_matrix.determinant() < 0.0 {
        let smallest = svd
            .singular_values
            .iter()
            .enumerate()
            .min_by(|a, b| a.1.total_cmp(b.1))
            .map_or(2, |(i, _)| i);
        let mut v = v_t.transpose();
        v.column_mut(smallest).neg_mut();
        rotation_matrix = v * u.transpose();
    }

    let rotation =
        UnitQuaternion::from_rotation_matrix(&Rotation3::from_matrix_unchecked(rotation_matrix));

    let scale = if compute_scale {
        optimal_scale(&source_centered, &target_centered, weights, &rotation)
    } else {
        1.0
    };

    // t = c_T - s R c_S
    let translation = target_centroid - scale * (rotation * source_centroid);

    Ok(RigidTransform::with_scale(rotation, translation, scale))
}

/// Whether all points carrying weight share one exact position.
fn coincident(points: &[Point3<f64>], weights: &[f64]) -> bool {
    let mut live = points
        .iter()
        .zip(weights)
        .filter(|&(_, &w)| w > 0.0)
        .map(|(p, _)| p);
    match live.next() {
        Some(first) => live.all(|p| p == first),
        None => true,
    }
}

fn weighted_centroid(points: &[Point3<f64>], weights: &[f64], total_weight: f64) -> Vector3<f64> {
    let sum: Vector3<f64> = points
        .iter()
        .zip(weights)
        .map(|(p, &w)| p.coords * w)
        .sum();
    sum / total_weight
}

/// Umeyama scale: `sum w (R s) . t / sum w |s|^2`.
fn optimal_scale(
    source_centered: &[Vector3<f64>],
    target_centered: &[Vector3<f64>],
    weights: &[f64],
    rotation: &UnitQuaternion<f64>,
) -> f64 {
    let mut source_variance = 0.0;
    let mut cross_variance = 0.0;

    for ((s, t), &w) in source_centered
        .iter()
        .zip(target_centered)
        .zip(weights)
    {
        source_variance += w * s.norm_squared();
        cross_variance += w * (rotation * s).dot(t);
    }

    if source_variance > 1e-10 && cross_variance > 0.0 {
        cross_variance / source_variance
    } else {
        1.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use std::f64::consts::PI;

    fn tetra() -> Vec<Point3<f64>> {
        vec![
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(1.0, 0.0, 0.0),
            Point3::new(0.5, 1.0, 0.0),
            Point3::new(0.3, 0.4, 0.8),
        ]
    }

    fn apply(transform: &RigidTransform, points: &[Point3<f64>]) -> Vec<Point3<f64>> {
        points.iter().map(|p| transform.transform_point(p)).collect()
    }

    #[test]
    fn recovers_rotation_and_translation() {
        let truth = RigidTransform::new(
            UnitQuaternion::from_euler_angles(0.4, -0.9, 2.8),
            Vector3::new(10.0, 5.0, -1.0),
        );
        let source = tetra();
        let target = apply(&truth, &source);

        let transform = compute_rigid_transform(&source, &target, false).unwrap();
        assert_relative_eq!(transform.rotation_angle_to(&truth), 0.0, epsilon = 1e-9);
        assert_relative_eq!(transform.translation, truth.translation, epsilon = 1e-9);
        assert_relative_eq!(transform.scale, 1.0);
    }

    #[test]
    fn half_turn_is_recovered() {
        let truth = RigidTransform::from_rotation(UnitQuaternion::from_axis_angle(
            &Vector3::x_axis(),
            PI,
        ));
        let source = tetra();
        let target = apply(&truth, &source);

        let transform = compute_rigid_transform(&source, &target, false).unwrap();
        for (s, t) in source.iter().zip(&target) {
            assert_relative_eq!(transform.transform_point(s), *t, epsilon = 1e-9);
        }
    }

    #[test]
    fn planar_pairs_are_enough() {
        let source = vec![
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(1.0, 0.0, 0.0),
            Point3::new(0.5, 1.0, 0.0),
        ];
        let truth = RigidTransform::new(
            UnitQuaternion::from_axis_angle(&Vector3::y_axis(), PI / 3.0),
            Vector3::new(1.0, 2.0, 3.0),
        );
        let target = apply(&truth, &source);

        let transform = compute_rigid_transform(&source, &target, false).unwrap();
        for (s, t) in source.iter().zip(&target) {
            assert_relative_eq!(transform.transform_point(s), *t, epsilon = 1e-9);
        }
    }

    #[test]
    fn scale_is_estimated_when_requested() {
        let truth = RigidTransform::with_scale(
            UnitQuaternion::from_axis_angle(&Vector3::z_axis(), 0.7),
            Vector3::new(-2.0, 0.0, 4.0),
            2.5,
        );
        let source = tetra();
        let target = apply(&truth, &source);

        let transform = compute_rigid_transform(&source, &target, true).unwrap();
        assert_relative_eq!(transform.scale, 2.5, epsilon = 1e-9);

        let fixed = compute_rigid_transform(&source, &target, false).unwrap();
        assert_relative_eq!(fixed.scale, 1.0);
    }

    #[test]
    fn reflection_yields_proper_rotation() {
        let source = tetra();
        // Mirror through the YZ plane.
        let target: Vec<_> = source.iter().map(|p| Point3::new(-p.x, p.y, p.z)).collect();

        let transform = compute_rigid_transform(&source, &target, false).unwrap();
        let det = transform.rotation.to_rotation_matrix().matrix().determinant();
        assert_relative_eq!(det, 1.0, epsilon = 1e-9);
    }

    #[test]
    fn equal_weights_match_unweighted() {
        let truth = RigidTransform::from_translation(Vector3::new(5.0, 5.0, 5.0));
        let source = tetra();
        let target = apply(&truth, &source);

        let weighted =
            compute_weighted_rigid_transform(&source, &target, &[2.0; 4], false).unwrap();
        assert_relative_eq!(weighted.translation, truth.translation, epsilon = 1e-9);
    }

    #[test]
    fn zero_weight_ignores_outlier() {
        let truth = RigidTransform::from_translation(Vector3::new(1.0, 0.0, 0.0));
        let source = tetra();
        let mut target = apply(&truth, &source);
        target.push(Point3::new(100.0, 100.0, 100.0));
        let mut source = source;
        source.push(Point3::new(0.2, 0.2, 0.2));

        let weights = [1.0, 1.0, 1.0, 1.0, 0.0];
        let transform = compute_weighted_rigid_transform(&source, &target, &weights, false).unwrap();
        assert_relative_eq!(transform.translation, truth.translation, epsilon = 1e-9);
    }

    #[test]
    fn too_few_pairs() {
        let source = vec![Point3::origin(), Point3::new(1.0, 0.0, 0.0)];
        assert_eq!(
            compute_rigid_transform(&source, &source, false),
            Err(RegistrationError::InsufficientData {
                required: 3,
                provided: 2
            })
        );
    }

    #[test]
    fn all_pairs_on_one_target() {
        let target = vec![Point3::new(1.0, 1.0, 1.0); 4];
        assert_eq!(
            compute_rigid_transform(&tetra(), &target, false),
            Err(RegistrationError::InsufficientData {
                required: 3,
                provided: 1
            })
        );

        // Only weighted points count as distinct.
        let mut source = vec![Point3::origin(); 4];
        source[3] = Point3::new(1.0, 0.0, 0.0);
        assert!(matches!(
            compute_weighted_rigid_transform(&source, &tetra(), &[1.0, 1.0, 1.0, 0.0], false),
            Err(RegistrationError::InsufficientData { provided: 1, .. })
        ));
    }

    #[test]
    fn collinear_pairs() {
        let source: Vec<_> = (0..5).map(|i| Point3::new(f64::from(i), 0.0, 0.0)).collect();
        assert_eq!(
            compute_rigid_transform(&source, &source, false),
            Err(RegistrationError::Collinear)
        );
    }

    #[test]
    fn empty_and_mismatched_inputs() {
        let one = vec![Point3::origin()];
        assert_eq!(
            compute_rigid_transform(&[], &one, false),
            Err(RegistrationError::EmptySource)
        );
        assert_eq!(
            compute_rigid_transform(&one, &[], false),
            Err(RegistrationError::EmptyTarget)
        );
        assert!(matches!(
            compute_rigid_transform(&tetra(), &one, false),
            Err(RegistrationError::InvalidParameter(_))
        ));
    }

    #[test]
    fn negative_weights_rejected() {
        let source = tetra();
        let weights = [1.0, -1.0, 1.0, 1.0];
        assert!(matches!(
            compute_weighted_rigid_transform(&source, &source, &weights, false),
            Err(RegistrationError::InvalidParameter(_))
        ));
    }
}
