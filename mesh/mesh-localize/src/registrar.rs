//! Cluster-by-cluster registration of the robot model against a scene.

use std::sync::atomic::{AtomicBool, Ordering};

use mesh_hull::convex_hull;
use mesh_registration::{icp_align_points_cancellable, RegistrationError, RigidTransform};
use mesh_segment::{segment_scene, ExclusionVolume, PointCluster};
use mesh_types::IndexedMesh;
use nalgebra::Point3;
use rayon::prelude::*;
use tracing::{debug, info, warn};

use crate::{LocalizeConfig, LocalizeError, LocalizeResult, RegisteredFrame};

/// The outcome of fitting the robot hull to one scene cluster.
#[derive(Debug, Clone, PartialEq)]
pub struct FitResult {
    /// Robot-to-world transform found by ICP.
    pub transform: RigidTransform,
    /// RMS distance between the moved robot hull and the cluster hull.
    pub rms_error: f64,
    /// Index of the cluster in the segmentation.
    pub cluster_index: usize,
    /// ICP updates applied.
    pub iterations: u32,
    /// Whether ICP met its convergence threshold.
    pub converged: bool,
}

/// Per-cluster fits plus how many clusters were tried.
struct Evaluation {
    fits: Vec<FitResult>,
    cluster_count: usize,
}

/// Finds where the robot sits in a scanned scene.
///
/// The robot model's hull is built once per call. The scene is segmented
/// into clusters, each cluster is hulled, and ICP aligns the robot hull onto
/// every cluster hull. The lowest-error fit wins.
///
/// # Example
///
/// ```
/// use mesh_localize::{LocalizeConfig, Registrar};
/// use mesh_types::{unit_cube, Vector3};
///
/// let robot = unit_cube();
/// let mut scene = unit_cube();
/// scene.translate(Vector3::new(3.0, -2.0, 0.0));
///
/// let registrar = Registrar::new(LocalizeConfig::default());
/// let frame = registrar.register(&robot.vertices, &scene, &[]).unwrap();
///
/// assert!(frame.fit_error().unwrap() < 1e-6);
/// assert!((frame.transform().translation - Vector3::new(3.0, -2.0, 0.0)).norm() < 1e-6);
/// ```
#[derive(Debug, Clone, Default)]
pub struct Registrar {
    config: LocalizeConfig,
}

impl Registrar {
    /// Creates a registrar with the given configuration.
    #[must_use]
    pub const fn new(config: LocalizeConfig) -> Self {
        Self { config }
    }

    /// The active configuration.
    #[must_use]
    pub const fn config(&self) -> &LocalizeConfig {
        &self.config
    }

    /// Registers the robot against the scene.
    ///
    /// `robot_points` are the robot model's vertices in its own frame.
    /// `exclusions` describe known scene objects whose points are dropped
    /// before clustering.
    ///
    /// Clusters are connected components of the scene mesh, and each one is
    /// fitted against the whole robot hull. A robot whose scan arrives as
    /// several disconnected pieces (parts sharing no vertices) yields one
    /// cluster per piece, none of which matches the full hull; weld or
    /// stitch the pieces before registering.
    ///
    /// # Errors
    ///
    /// - [`LocalizeError::RobotModel`] if the robot points cannot form a hull
    /// - [`LocalizeError::InvalidScene`] if the scene mesh is malformed
    /// - [`LocalizeError::NoAcceptableFit`] if every cluster fails
    /// - [`LocalizeError::InvalidConfig`] for out-of-range configuration
    pub fn register(
        &self,
        robot_points: &[Point3<f64>],
        scene: &IndexedMesh,
        exclusions: &[ExclusionVolume],
    ) -> LocalizeResult<RegisteredFrame> {
        self.register_seeded(robot_points, scene, exclusions, None, &AtomicBool::new(false))
    }

    /// [`register`](Self::register) with an optional starting transform and
    /// a cancel flag.
    ///
    /// A `seed` (for example a transform saved by an earlier session)
    /// replaces the centroid-offset guess ICP otherwise starts from. The
    /// flag is checked between stages and between ICP iterations.
    ///
    /// # Errors
    ///
    /// As [`register`](Self::register), plus [`LocalizeError::Cancelled`].
    pub fn register_seeded(
        &self,
        robot_points: &[Point3<f64>],
        scene: &IndexedMesh,
        exclusions: &[ExclusionVolume],
        seed: Option<&RigidTransform>,
        cancel: &AtomicBool,
    ) -> LocalizeResult<RegisteredFrame> {
        info!(
            robot_points = robot_points.len(),
            scene_vertices = scene.vertices.len(),
            exclusions = exclusions.len(),
            seeded = seed.is_some(),
            "Starting registration"
        );

        let Evaluation {
            fits,
            cluster_count,
        } = self.evaluate(robot_points, scene, exclusions, seed, cancel)?;

        let limit = self.config.max_fit_error.unwrap_or(f64::INFINITY);
        let best = fits
            .iter()
            .filter(|fit| {
                let accepted = fit.rms_error <= limit;
                if !accepted {
                    warn!(
                        cluster = fit.cluster_index,
                        rms_error = fit.rms_error,
                        limit,
                        "Rejecting fit above error limit"
                    );
                }
                accepted
            })
            // Fits arrive in cluster order, so `min_by` keeps the lowest
            // index among equal errors.
            .min_by(|a, b| a.rms_error.total_cmp(&b.rms_error));

        let Some(best) = best else {
            let rejected = cluster_count;
            warn!(clusters = cluster_count, rejected, "Registration failed");
            return Err(LocalizeError::NoAcceptableFit {
                clusters: cluster_count,
                rejected,
            });
        };

        info!(
            cluster = best.cluster_index,
            rms_error = best.rms_error,
            iterations = best.iterations,
            converged = best.converged,
            candidates = fits.len(),
            "Registration complete"
        );

        Ok(RegisteredFrame::new(best.transform, best.rms_error).with_cluster_index(best.cluster_index))
    }

    /// Fits the robot to every cluster and returns all successful fits in
    /// cluster order, without choosing one.
    ///
    /// The error limit is not applied here.
    ///
    /// # Errors
    ///
    /// [`LocalizeError::RobotModel`], [`LocalizeError::InvalidScene`] or
    /// [`LocalizeError::InvalidConfig`]. Clusters that fail are omitted.
    pub fn evaluate_clusters(
        &self,
        robot_points: &[Point3<f64>],
        scene: &IndexedMesh,
        exclusions: &[ExclusionVolume],
    ) -> LocalizeResult<Vec<FitResult>> {
        self.evaluate(robot_points, scene, exclusions, None, &AtomicBool::new(false))
            .map(|evaluation| evaluation.fits)
    }

    fn evaluate(
        &self,
        robot_points: &[Point3<f64>],
        scene: &IndexedMesh,
        exclusions: &[ExclusionVolume],
        seed: Option<&RigidTransform>,
        cancel: &AtomicBool,
    ) -> LocalizeResult<Evaluation> {
        self.config.validate()?;
        let hull_params = self.config.hull_params();

        let robot_hull = convex_hull(robot_points, &hull_params).map_err(LocalizeError::RobotModel)?;
        debug!(
            vertices = robot_hull.vertex_count(),
            faces = robot_hull.face_count(),
            "Robot hull built"
        );
        check_cancel(cancel)?;

        let segmentation = segment_scene(scene, exclusions, &self.config.segment_params())?;
        let cluster_count = segmentation.clusters.len();
        check_cancel(cancel)?;

        let robot_centroid = robot_hull.centroid();
        let fits: Vec<FitResult> = segmentation
            .clusters
            .par_iter()
            .enumerate()
            .filter_map(|(index, cluster)| {
                self.fit_cluster(index, cluster, &robot_hull.vertices, robot_centroid, seed, cancel)
            })
            .collect();
        check_cancel(cancel)?;

        debug!(clusters = cluster_count, fits = fits.len(), "Clusters evaluated");
        Ok(Evaluation {
            fits,
            cluster_count,
        })
    }

    /// Hull and align one cluster. `None` means the cluster is skipped.
    fn fit_cluster(
        &self,
        index: usize,
        cluster: &PointCluster,
        robot_hull: &[Point3<f64>],
        robot_centroid: Point3<f64>,
        seed: Option<&RigidTransform>,
        cancel: &AtomicBool,
    ) -> Option<FitResult> {
        let cluster_hull = match convex_hull(&cluster.points, &self.config.hull_params()) {
            Ok(hull) => hull,
            Err(e) => {
                warn!(cluster = index, points = cluster.len(), error = %e, "Skipping cluster");
                return None;
            }
        };

        let initial = seed.copied().unwrap_or_else(|| {
            RigidTransform::from_translation(cluster_hull.centroid() - robot_centroid)
        });
        let params = self.config.icp_params(initial);

        match icp_align_points_cancellable(robot_hull, &cluster_hull.vertices, &params, cancel) {
            Ok(result) => {
                debug!(
                    cluster = index,
                    rms_error = result.rms_error,
                    iterations = result.iterations,
                    converged = result.converged,
                    "Cluster fitted"
                );
                Some(FitResult {
                    transform: result.transform,
                    rms_error: result.rms_error,
                    cluster_index: index,
                    iterations: result.iterations,
                    converged: result.converged,
                })
            }
            Err(RegistrationError::Cancelled) => None,
            Err(e) => {
                warn!(cluster = index, error = %e, "ICP failed, skipping cluster");
                None
            }
        }
    }
}

fn check_cancel(cancel: &AtomicBool) -> LocalizeResult<()> {
    if cancel.load(Ordering::Relaxed) {
        debug!("Registration cancelled");
        Err(LocalizeError::Cancelled)
    } else {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mesh_types::{unit_cube, Aabb, Vector3};
    use nalgebra::UnitQuaternion;
    use std::f64::consts::PI;

    /// A lopsided robot: a base plate with a column and an arm tip.
    fn robot_points() -> Vec<Point3<f64>> {
        let mut points = Vec::new();
        for &z in &[0.0, 0.15] {
            for &(x, y) in &[(-0.3, -0.2), (0.3, -0.2), (0.3, 0.2), (-0.3, 0.2)] {
                points.push(Point3::new(x, y, z));
            }
        }
        points.extend([
            Point3::new(0.1, 0.0, 1.0),
            Point3::new(0.25, 0.1, 0.8),
            // Interior vertices, as a real model would have.
            Point3::new(0.0, 0.0, 0.1),
            Point3::new(0.1, 0.0, 0.5),
        ]);
        points
    }

    /// Connects all points through a triangle fan so they form one cluster.
    fn fan_mesh(points: &[Point3<f64>]) -> IndexedMesh {
        let faces = (1..points.len() as u32 - 1).map(|i| [0, i, i + 1]).collect();
        IndexedMesh::from_parts(points.to_vec(), faces)
    }

    fn moved(points: &[Point3<f64>], transform: &RigidTransform) -> Vec<Point3<f64>> {
        points.iter().map(|p| transform.transform_point(p)).collect()
    }

    fn truth() -> RigidTransform {
        RigidTransform::new(
            UnitQuaternion::from_axis_angle(&Vector3::z_axis(), 0.2),
            Vector3::new(2.0, 1.0, 0.0),
        )
    }

    /// The robot placed by `truth`, next to a table.
    fn scene() -> IndexedMesh {
        let mut scene = fan_mesh(&moved(&robot_points(), &truth()));
        let mut table = unit_cube();
        table.translate(Vector3::new(-3.0, 0.0, 0.0));
        scene.merge(&table);
        scene
    }

    fn table_volume() -> Aabb {
        Aabb::new(Point3::new(-3.0, 0.0, 0.0), Point3::new(-2.0, 1.0, 1.0))
    }

    #[test]
    fn clean_scene_recovers_transform() {
        let registrar = Registrar::default();
        let frame = registrar.register(&robot_points(), &scene(), &[]).unwrap();

        assert!(frame.fit_error().unwrap() < 1e-6);
        assert_eq!(frame.cluster_index(), Some(0));
        assert!(frame.transform().rotation_angle_to(&truth()) < 1e-6);
        assert!((frame.transform().translation - truth().translation).norm() < 1e-6);

        let tip = Point3::new(0.1, 0.0, 1.0);
        assert!((frame.robot_to_world_point(&tip) - truth().transform_point(&tip)).norm() < 1e-6);
    }

    #[test]
    fn every_cluster_is_evaluated_in_order() {
        let fits = Registrar::default()
            .evaluate_clusters(&robot_points(), &scene(), &[])
            .unwrap();

        assert_eq!(fits.len(), 2);
        assert_eq!(fits[0].cluster_index, 0);
        assert_eq!(fits[1].cluster_index, 1);
        assert!(fits[0].rms_error < 1e-6);
        assert!(fits[1].rms_error > fits[0].rms_error);
    }

    #[test]
    fn exclusions_remove_known_objects() {
        let exclusions = [ExclusionVolume::bounded(table_volume())];
        let fits = Registrar::default()
            .evaluate_clusters(&robot_points(), &scene(), &exclusions)
            .unwrap();

        assert_eq!(fits.len(), 1);
        assert!(fits[0].rms_error < 1e-6);
    }

    #[test]
    fn seed_allows_large_rotation() {
        let truth = RigidTransform::new(
            UnitQuaternion::from_axis_angle(&Vector3::z_axis(), 0.8 * PI),
            Vector3::new(-1.0, 4.0, 0.5),
        );
        let scene = fan_mesh(&moved(&robot_points(), &truth));
        // A nearby estimate, as restored from an earlier session.
        let seed = RigidTransform::new(
            UnitQuaternion::from_axis_angle(&Vector3::z_axis(), 0.8 * PI + 0.05),
            Vector3::new(-1.02, 4.01, 0.5),
        );

        let frame = Registrar::default()
            .register_seeded(&robot_points(), &scene, &[], Some(&seed), &AtomicBool::new(false))
            .unwrap();
        assert!(frame.fit_error().unwrap() < 1e-6);
        assert!(frame.transform().rotation_angle_to(&truth) < 1e-6);
    }

    #[test]
    fn small_clusters_fail_registration() {
        // Separate triangles: three points each.
        let mut scene = IndexedMesh::new();
        for i in 0..4 {
            let mut tri = IndexedMesh::from_parts(
                vec![
                    Point3::new(0.0, 0.0, 0.0),
                    Point3::new(1.0, 0.0, 0.0),
                    Point3::new(0.0, 1.0, 0.0),
                ],
                vec![[0, 1, 2]],
            );
            tri.translate(Vector3::new(f64::from(i) * 5.0, 0.0, 0.0));
            scene.merge(&tri);
        }

        let err = Registrar::default()
            .register(&robot_points(), &scene, &[])
            .unwrap_err();
        assert!(matches!(
            err,
            LocalizeError::NoAcceptableFit {
                clusters: 0,
                rejected: 0
            }
        ));
        assert!(err.is_terminal());

        // Keeping them lets the hull builder reject each one.
        let config = LocalizeConfig {
            min_cluster_size: 1,
            ..LocalizeConfig::default()
        };
        let err = Registrar::new(config)
            .register(&robot_points(), &scene, &[])
            .unwrap_err();
        assert!(matches!(
            err,
            LocalizeError::NoAcceptableFit {
                clusters: 4,
                rejected: 4
            }
        ));
    }

    #[test]
    fn flat_cluster_is_skipped() {
        let mut scene = scene();
        let flat = fan_mesh(&[
            Point3::new(5.0, 5.0, 0.0),
            Point3::new(6.0, 5.0, 0.0),
            Point3::new(6.0, 6.0, 0.0),
            Point3::new(5.0, 6.0, 0.0),
            Point3::new(5.5, 5.5, 0.0),
        ]);
        scene.merge(&flat);

        let registrar = Registrar::default();
        let fits = registrar
            .evaluate_clusters(&robot_points(), &scene, &[])
            .unwrap();
        assert_eq!(fits.len(), 2);
        assert!(fits.iter().all(|fit| fit.cluster_index != 2));

        let frame = registrar.register(&robot_points(), &scene, &[]).unwrap();
        assert_eq!(frame.cluster_index(), Some(0));
    }

    #[test]
    fn error_limit_rejects_poor_fits() {
        let exclusions = [ExclusionVolume::bounded(Aabb::new(
            Point3::new(1.0, 0.0, -1.0),
            Point3::new(3.0, 2.0, 2.0),
        ))];
        let config = LocalizeConfig {
            max_fit_error: Some(1e-6),
            ..LocalizeConfig::default()
        };
        // Only the table remains, and it does not look like the robot.
        let err = Registrar::new(config)
            .register(&robot_points(), &scene(), &exclusions)
            .unwrap_err();
        assert!(matches!(
            err,
            LocalizeError::NoAcceptableFit {
                clusters: 1,
                rejected: 1
            }
        ));
    }

    #[test]
    fn degenerate_robot_model() {
        let flat: Vec<_> = robot_points()
            .iter()
            .map(|p| Point3::new(p.x, p.y, 0.0))
            .collect();
        let err = Registrar::default().register(&flat, &scene(), &[]).unwrap_err();
        assert!(matches!(err, LocalizeError::RobotModel(ref e) if e.is_degenerate()));
        assert!(err.is_terminal());
    }

    #[test]
    fn malformed_scene() {
        let scene = IndexedMesh::from_parts(vec![Point3::origin()], vec![[0, 1, 2]]);
        let err = Registrar::default()
            .register(&robot_points(), &scene, &[])
            .unwrap_err();
        assert!(matches!(err, LocalizeError::InvalidScene(_)));
        assert!(!err.is_terminal());
    }

    #[test]
    fn cancelled_before_start() {
        let err = Registrar::default()
            .register_seeded(&robot_points(), &scene(), &[], None, &AtomicBool::new(true))
            .unwrap_err();
        assert!(matches!(err, LocalizeError::Cancelled));
    }

    #[test]
    fn invalid_config_is_reported() {
        let config = LocalizeConfig {
            icp_convergence: f64::NAN,
            ..LocalizeConfig::default()
        };
        let err = Registrar::new(config)
            .register(&robot_points(), &scene(), &[])
            .unwrap_err();
        assert!(matches!(err, LocalizeError::InvalidConfig(_)));
    }
}
