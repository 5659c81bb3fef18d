//! Iterative Closest Point (ICP) alignment of point sets.
//!
//! ICP iteratively refines the alignment between two point sets by:
//! 1. Finding the exact nearest target point for every moved source point
//! 2. Solving for the best transform of those pairs (Kabsch)
//! 3. Composing it onto the running transform and measuring the new error
//!
//! It stops when the mean squared error changes by less than the threshold
//! or the iteration budget runs out. Running out is not an error; the caller
//! judges the fit by its error.

use std::sync::atomic::{AtomicBool, Ordering};

use crate::kabsch::{compute_rigid_transform, compute_weighted_rigid_transform};
use crate::{RegistrationError, RegistrationResult, RigidTransform};
use kiddo::{ImmutableKdTree, SquaredEuclidean};
use nalgebra::Point3;
use rayon::prelude::*;
use tracing::{debug, trace};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Targets up to this size are searched linearly.
const BRUTE_FORCE_LIMIT: usize = 256;

/// Parameters for ICP registration.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct IcpParams {
    /// Maximum number of iterations (default: 10).
    pub max_iterations: u32,
    /// Stop when the mean squared error changes by less than this
    /// (default: 1e-5).
    pub convergence_threshold: f64,
    /// Pairs farther apart than this are dropped. `None` keeps every pair
    /// (default: `None`).
    pub max_correspondence_distance: Option<f64>,
    /// Huber threshold. Pairs farther apart than this are down-weighted by
    /// `threshold / distance` in the solve (default: `None`).
    pub huber_threshold: Option<f64>,
    /// Whether to estimate uniform scale (default: false).
    pub compute_scale: bool,
    /// Starting transform (default: identity).
    pub initial_transform: RigidTransform,
}

impl Default for IcpParams {
    fn default() -> Self {
        Self {
            max_iterations: 10,
            convergence_threshold: 1e-5,
            max_correspondence_distance: None,
            huber_threshold: None,
            compute_scale: false,
            initial_transform: RigidTransform::identity(),
        }
    }
}

impl IcpParams {
    /// Creates new ICP parameters with defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the maximum number of iterations.
    #[must_use]
    pub const fn with_max_iterations(mut self, max_iterations: u32) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    /// Sets the convergence threshold.
    #[must_use]
    pub const fn with_convergence_threshold(mut self, threshold: f64) -> Self {
        self.convergence_threshold = threshold;
        self
    }

    /// Sets the maximum correspondence distance.
    #[must_use]
    pub const fn with_max_correspondence_distance(mut self, distance: f64) -> Self {
        self.max_correspondence_distance = Some(distance);
        self
    }

    /// Enables Huber re-weighting with the given threshold.
    #[must_use]
    pub const fn with_huber_threshold(mut self, threshold: f64) -> Self {
        self.huber_threshold = Some(threshold);
        self
    }

    /// Enables or disables scale computation.
    #[must_use]
    pub const fn with_scale(mut self, compute_scale: bool) -> Self {
        self.compute_scale = compute_scale;
        self
    }

    /// Sets the initial transform guess.
    #[must_use]
    pub const fn with_initial_transform(mut self, transform: RigidTransform) -> Self {
        self.initial_transform = transform;
        self
    }

    fn validate(&self) -> RegistrationResult<()> {
        if !self.convergence_threshold.is_finite() || self.convergence_threshold < 0.0 {
            return Err(RegistrationError::InvalidParameter(format!(
                "convergence threshold must be finite and non-negative, got {}",
                self.convergence_threshold
            )));
        }
        for (name, value) in [
            ("max correspondence distance", self.max_correspondence_distance),
            ("huber threshold", self.huber_threshold),
        ] {
            if let Some(v) = value {
                if !v.is_finite() || v <= 0.0 {
                    return Err(RegistrationError::InvalidParameter(format!(
                        "{name} must be finite and positive, got {v}"
                    )));
                }
            }
        }
        if !self.initial_transform.is_valid() {
            return Err(RegistrationError::InvalidParameter(
                "initial transform is not finite".to_string(),
            ));
        }
        Ok(())
    }
}

/// Result of ICP registration.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct IcpResult {
    /// Transform mapping source points onto the target.
    pub transform: RigidTransform,
    /// Root mean squared pair distance at the final transform.
    pub rms_error: f64,
    /// Mean squared pair distance at the final transform.
    pub mean_squared_error: f64,
    /// Number of transform updates applied.
    pub iterations: u32,
    /// Whether the error change fell below the threshold.
    pub converged: bool,
    /// Pairs used in the final error measurement.
    pub correspondence_count: usize,
    /// Mean squared error at the start and after each update.
    pub error_history: Vec<f64>,
}

/// Aligns source points to target points using ICP.
///
/// # Errors
///
/// - [`RegistrationError::EmptySource`] / [`RegistrationError::EmptyTarget`]
/// - [`RegistrationError::NoCorrespondences`] if the distance filter rejects
///   every pair
/// - [`RegistrationError::InsufficientData`] / [`RegistrationError::Collinear`]
///   if the pairs cannot determine a rotation
/// - [`RegistrationError::InvalidParameter`] for out-of-range parameters
///
/// # Example
///
/// ```
/// use mesh_registration::{icp_align_points, IcpParams, RigidTransform};
/// use nalgebra::{Point3, Vector3};
///
/// let source = vec![
///     Point3::new(0.0, 0.0, 0.0),
///     Point3::new(1.0, 0.0, 0.0),
///     Point3::new(0.0, 1.0, 0.0),
///     Point3::new(0.0, 0.0, 1.0),
///     Point3::new(1.0, 1.0, 1.0),
/// ];
/// let shift = RigidTransform::from_translation(Vector3::new(0.2, 0.1, -0.1));
/// let target: Vec<_> = source.iter().map(|p| shift.transform_point(p)).collect();
///
/// let result = icp_align_points(&source, &target, &IcpParams::default()).unwrap();
/// assert!(result.converged);
/// assert!(result.rms_error < 1e-6);
/// ```
pub fn icp_align_points(
    source_points: &[Point3<f64>],
    target_points: &[Point3<f64>],
    params: &IcpParams,
) -> RegistrationResult<IcpResult> {
    icp_align_points_cancellable(source_points, target_points, params, &AtomicBool::new(false))
}

/// [`icp_align_points`] that checks `cancel` before every iteration.
///
/// # Errors
///
/// As [`icp_align_points`], plus [`RegistrationError::Cancelled`] once the
/// flag is observed set.
pub fn icp_align_points_cancellable(
    source_points: &[Point3<f64>],
    target_points: &[Point3<f64>],
    params: &IcpParams,
    cancel: &AtomicBool,
) -> RegistrationResult<IcpResult> {
    params.validate()?;
    if source_points.is_empty() {
        return Err(RegistrationError::EmptySource);
    }
    if target_points.is_empty() {
        return Err(RegistrationError::EmptyTarget);
    }

    let index = TargetIndex::new(target_points);
    let max_dist_sq = params
        .max_correspondence_distance
        .map_or(f64::INFINITY, |d| d * d);

    let mut transform = params.initial_transform.renormalize();
    let mut pairs = index.correspondences(source_points, &transform, max_dist_sq)?;
    let mut mse = mean_squared(&pairs);

    let mut error_history = Vec::with_capacity(params.max_iterations as usize + 1);
    error_history.push(mse);
    let mut converged = false;
    let mut iterations = 0;

    for iter in 0..params.max_iterations {
        if cancel.load(Ordering::Relaxed) {
            debug!(iteration = iter, "ICP cancelled");
            return Err(RegistrationError::Cancelled);
        }

        let (matched_source, matched_target): (Vec<Point3<f64>>, Vec<Point3<f64>>) = pairs
            .iter()
            .map(|c| (c.source_point, target_points[c.target_idx]))
            .unzip();

        let incremental = match params.huber_threshold {
            Some(k) => {
                let weights: Vec<f64> = pairs
                    .iter()
                    .map(|c| {
                        let d = c.distance_sq.sqrt();
                        if d <= k {
                            1.0
                        } else {
                            k / d
                        }
                    })
                    .collect();
                compute_weighted_rigid_transform(
                    &matched_source,
                    &matched_target,
                    &weights,
                    params.compute_scale,
                )?
            }
            None => {
                compute_rigid_transform(&matched_source, &matched_target, params.compute_scale)?
            }
        };

        transform = incremental.compose(&transform);
        iterations = iter + 1;

        pairs = index.correspondences(source_points, &transform, max_dist_sq)?;
        let next = mean_squared(&pairs);
        error_history.push(next);
        trace!(iteration = iterations, mse = next, pairs = pairs.len(), "ICP step");

        let change = (mse - next).abs();
        mse = next;
        if change < params.convergence_threshold {
            converged = true;
            break;
        }
    }

    debug!(
        iterations,
        converged,
        mse,
        pairs = pairs.len(),
        "ICP finished"
    );

    Ok(IcpResult {
        transform,
        rms_error: mse.sqrt(),
        mean_squared_error: mse,
        iterations,
        converged,
        correspondence_count: pairs.len(),
        error_history,
    })
}

/// A moved source point and its nearest target.
#[derive(Debug, Clone, Copy)]
struct Correspondence {
    source_point: Point3<f64>,
    target_idx: usize,
    distance_sq: f64,
}

/// Exact nearest-neighbour lookup over the target set.
///
/// The tree is built in one pass so that many targets sharing a coordinate
/// (rings and grids from CAD meshes) do not overflow a bucket.
struct TargetIndex<'a> {
    points: &'a [Point3<f64>],
    tree: Option<ImmutableKdTree<f64, 3>>,
}

impl<'a> TargetIndex<'a> {
    fn new(points: &'a [Point3<f64>]) -> Self {
        let tree = (points.len() > BRUTE_FORCE_LIMIT).then(|| {
            let entries: Vec<[f64; 3]> = points.iter().map(|p| [p.x, p.y, p.z]).collect();
            ImmutableKdTree::new_from_slice(&entries)
        });
        Self { points, tree }
    }

    fn nearest(&self, p: &Point3<f64>) -> (usize, f64) {
        match &self.tree {
            Some(tree) => {
                let hit = tree.nearest_one::<SquaredEuclidean>(&[p.x, p.y, p.z]);
                #[allow(clippy::cast_possible_truncation)]
                let idx = hit.item as usize;
                (idx, hit.distance)
            }
            None => self
                .points
                .iter()
                .enumerate()
                .map(|(i, t)| (i, (t - p).norm_squared()))
                .fold((0, f64::INFINITY), |best, cur| {
                    if cur.1 < best.1 {
                        cur
                    } else {
                        best
                    }
                }),
        }
    }

    /// Pair every moved source point with its nearest target, dropping pairs
    /// beyond the distance limit.
    fn correspondences(
        &self,
        source: &[Point3<f64>],
        transform: &RigidTransform,
        max_dist_sq: f64,
    ) -> RegistrationResult<Vec<Correspondence>> {
        let pairs: Vec<Correspondence> = source
            .par_iter()
            .filter_map(|p| {
                let moved = transform.transform_point(p);
                let (target_idx, distance_sq) = self.nearest(&moved);
                (distance_sq <= max_dist_sq).then_some(Correspondence {
                    source_point: moved,
                    target_idx,
                    distance_sq,
                })
            })
            .collect();

        if pairs.is_empty() {
            Err(RegistrationError::NoCorrespondences)
        } else {
            Ok(pairs)
        }
    }
}

fn mean_squared(pairs: &[Correspondence]) -> f64 {
    let sum: f64 = pairs.iter().map(|c| c.distance_sq).sum();
    #[allow(clippy::cast_precision_loss)]
    let n = pairs.len() as f64;
    sum / n
}
