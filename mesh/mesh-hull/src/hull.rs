//! Quickhull construction and the resulting hull type.

use hashbrown::{HashMap, HashSet};
use mesh_types::{Aabb, IndexedMesh};
use nalgebra::{Point3, Vector3};
use tracing::debug;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::error::{HullError, HullResult};

/// Default coincidence tolerance, relative to the input's bounding-box
/// diagonal.
pub const DEFAULT_TOLERANCE: f64 = 1e-9;

/// Parameters for [`convex_hull`].
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct HullParams {
    /// Relative tolerance. Multiplied by the bounding-box diagonal to give
    /// the absolute distance below which points are treated as coincident,
    /// collinear, coplanar, or not beyond a face.
    pub tolerance: f64,
}

impl Default for HullParams {
    fn default() -> Self {
        Self {
            tolerance: DEFAULT_TOLERANCE,
        }
    }
}

impl HullParams {
    /// Set the relative tolerance.
    #[must_use]
    pub const fn with_tolerance(mut self, tolerance: f64) -> Self {
        self.tolerance = tolerance;
        self
    }
}

/// A closed convex triangulated surface.
///
/// Faces wind counter-clockwise seen from outside; `normals[i]` is the unit
/// outward normal of `faces[i]`. Every vertex is an exact copy of an input
/// point.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ConvexHull {
    /// Hull vertices.
    pub vertices: Vec<Point3<f64>>,
    /// Triangles as indices into `vertices`.
    pub faces: Vec<[u32; 3]>,
    /// Unit outward normal per face.
    pub normals: Vec<Vector3<f64>>,
}

impl ConvexHull {
    /// Number of hull vertices.
    #[must_use]
    pub fn vertex_count(&self) -> usize {
        self.vertices.len()
    }

    /// Number of hull faces.
    #[must_use]
    pub fn face_count(&self) -> usize {
        self.faces.len()
    }

    /// Largest signed distance from `point` to any face plane.
    ///
    /// Negative inside the hull, zero on the surface, positive outside.
    #[must_use]
    pub fn max_plane_distance(&self, point: &Point3<f64>) -> f64 {
        self.faces
            .iter()
            .zip(&self.normals)
            .map(|(face, n)| n.dot(&(point - self.vertices[face[0] as usize])))
            .fold(f64::NEG_INFINITY, f64::max)
    }

    /// Whether `point` is inside the hull or within `tolerance` of it.
    ///
    /// # Example
    ///
    /// ```
    /// use mesh_hull::{convex_hull, HullParams};
    /// use mesh_types::{unit_cube, Point3};
    ///
    /// let hull = convex_hull(&unit_cube().vertices, &HullParams::default()).unwrap();
    /// assert!(hull.contains(&Point3::new(0.5, 0.5, 0.5), 0.0));
    /// assert!(hull.contains(&Point3::new(1.0, 0.5, 0.5), 1e-12));
    /// assert!(!hull.contains(&Point3::new(1.1, 0.5, 0.5), 1e-3));
    /// ```
    #[must_use]
    pub fn contains(&self, point: &Point3<f64>, tolerance: f64) -> bool {
        self.max_plane_distance(point) <= tolerance
    }

    /// Mean of the hull vertices.
    ///
    /// Always strictly inside a non-degenerate hull.
    #[must_use]
    pub fn centroid(&self) -> Point3<f64> {
        if self.vertices.is_empty() {
            return Point3::origin();
        }
        #[allow(clippy::cast_precision_loss)]
        let n = self.vertices.len() as f64;
        let sum = self
            .vertices
            .iter()
            .fold(Vector3::zeros(), |acc, p| acc + p.coords);
        Point3::from(sum / n)
    }

    /// Enclosed volume.
    #[must_use]
    pub fn volume(&self) -> f64 {
        self.to_mesh().signed_volume()
    }

    /// Copy the hull into an indexed mesh.
    #[must_use]
    pub fn to_mesh(&self) -> IndexedMesh {
        IndexedMesh::from_parts(self.vertices.clone(), self.faces.clone())
    }
}

/// Build the convex hull of a point set with Quickhull.
///
/// Non-finite points are ignored. Points within the tolerance of the hull
/// surface are not added as vertices, so duplicates and near-duplicates never
/// produce zero-area faces.
///
/// # Errors
///
/// - [`HullError::TooFewPoints`] for fewer than four usable points or when
///   all points coincide
/// - [`HullError::Collinear`] / [`HullError::Coplanar`] for flat inputs
/// - [`HullError::InvalidTolerance`] for a negative or non-finite tolerance
///
/// # Example
///
/// ```
/// use mesh_hull::{convex_hull, HullParams};
/// use mesh_types::Point3;
///
/// let points = vec![
///     Point3::new(0.0, 0.0, 0.0),
///     Point3::new(1.0, 0.0, 0.0),
///     Point3::new(0.0, 1.0, 0.0),
///     Point3::new(0.0, 0.0, 1.0),
///     Point3::new(0.1, 0.1, 0.1), // interior
/// ];
///
/// let hull = convex_hull(&points, &HullParams::default()).unwrap();
/// assert_eq!(hull.vertex_count(), 4);
/// assert_eq!(hull.face_count(), 4);
/// ```
pub fn convex_hull(points: &[Point3<f64>], params: &HullParams) -> HullResult<ConvexHull> {
    if !params.tolerance.is_finite() || params.tolerance < 0.0 {
        return Err(HullError::InvalidTolerance(params.tolerance));
    }

    let usable: Vec<Point3<f64>> = points
        .iter()
        .filter(|p| p.coords.iter().all(|c| c.is_finite()))
        .copied()
        .collect();
    if usable.len() < 4 {
        return Err(HullError::TooFewPoints {
            count: usable.len(),
        });
    }

    let eps = params.tolerance * Aabb::from_points(usable.iter()).diagonal();
    let simplex = initial_simplex(&usable, eps)?;

    let mut builder = Builder::new(&usable, eps);
    builder.seed(simplex);
    let expansions = builder.expand();
    let hull = builder.finish();

    debug!(
        points = points.len(),
        vertices = hull.vertex_count(),
        faces = hull.face_count(),
        expansions,
        "Convex hull built"
    );

    Ok(hull)
}

/// Pick four affinely independent points spanning as much volume as cheaply
/// possible.
fn initial_simplex(points: &[Point3<f64>], eps: f64) -> HullResult<[usize; 4]> {
    // Extreme points along each axis.
    let mut extremes = [0usize; 6];
    for (i, p) in points.iter().enumerate() {
        for axis in 0..3 {
            if p[axis] < points[extremes[2 * axis]][axis] {
                extremes[2 * axis] = i;
            }
            if p[axis] > points[extremes[2 * axis + 1]][axis] {
                extremes[2 * axis + 1] = i;
            }
        }
    }

    let mut pair = (extremes[0], extremes[1]);
    let mut widest = -1.0;
    for (k, &a) in extremes.iter().enumerate() {
        for &b in &extremes[k + 1..] {
            let d = (points[a] - points[b]).norm();
            if d > widest {
                widest = d;
                pair = (a, b);
            }
        }
    }
    if widest <= eps {
        return Err(HullError::TooFewPoints { count: 1 });
    }
    let (i0, i1) = pair;

    let axis = (points[i1] - points[i0]) / widest;
    let (i2, line_dist) = farthest(points, |p| {
        let d = p - points[i0];
        (d - axis * axis.dot(&d)).norm()
    });
    if line_dist <= eps {
        return Err(HullError::Collinear);
    }

    let plane = (points[i1] - points[i0])
        .cross(&(points[i2] - points[i0]))
        .normalize();
    let (i3, plane_dist) = farthest(points, |p| plane.dot(&(p - points[i0])).abs());
    if plane_dist <= eps {
        return Err(HullError::Coplanar);
    }

    Ok([i0, i1, i2, i3])
}

/// Index and value of the first point maximizing `measure`.
fn farthest(points: &[Point3<f64>], measure: impl Fn(&Point3<f64>) -> f64) -> (usize, f64) {
    points
        .iter()
        .enumerate()
        .fold((0, f64::NEG_INFINITY), |(best, best_d), (i, p)| {
            let d = measure(p);
            if d > best_d {
                (i, d)
            } else {
                (best, best_d)
            }
        })
}

struct Face {
    vertices: [usize; 3],
    normal: Vector3<f64>,
    offset: f64,
    /// Points beyond this face not yet on the hull.
    outside: Vec<usize>,
    alive: bool,
}

impl Face {
    fn distance(&self, p: &Point3<f64>) -> f64 {
        self.normal.dot(&p.coords) - self.offset
    }

    fn edges(&self) -> [(usize, usize); 3] {
        let [a, b, c] = self.vertices;
        [(a, b), (b, c), (c, a)]
    }
}

struct Builder<'a> {
    points: &'a [Point3<f64>],
    eps: f64,
    faces: Vec<Face>,
    /// Directed edge to the face that owns it.
    edges: HashMap<(usize, usize), usize>,
    /// Faces that received outside points. May hold dead or drained faces,
    /// which are skipped when popped.
    pending: Vec<usize>,
}

impl<'a> Builder<'a> {
    fn new(points: &'a [Point3<f64>], eps: f64) -> Self {
        Self {
            points,
            eps,
            faces: Vec::new(),
            edges: HashMap::new(),
            pending: Vec::new(),
        }
    }

    fn add_face(&mut self, vertices: [usize; 3], fallback: Vector3<f64>) -> usize {
        let [a, b, c] = vertices.map(|i| self.points[i]);
        let normal = (b - a)
            .cross(&(c - a))
            .try_normalize(f64::MIN_POSITIVE)
            .unwrap_or(fallback);
        let id = self.faces.len();
        let face = Face {
            vertices,
            normal,
            offset: normal.dot(&a.coords),
            outside: Vec::new(),
            alive: true,
        };
        for edge in face.edges() {
            self.edges.insert(edge, id);
        }
        self.faces.push(face);
        id
    }

    /// Create the tetrahedron and distribute the remaining points.
    fn seed(&mut self, simplex: [usize; 4]) {
        let [i0, i1, i2, i3] = simplex;
        for (x, y, z, opposite) in [
            (i0, i1, i2, i3),
            (i0, i1, i3, i2),
            (i0, i2, i3, i1),
            (i1, i2, i3, i0),
        ] {
            let p = self.points;
            let n = (p[y] - p[x]).cross(&(p[z] - p[x]));
            let tri = if n.dot(&(p[opposite] - p[x])) > 0.0 {
                [x, z, y]
            } else {
                [x, y, z]
            };
            self.add_face(tri, Vector3::z());
        }

        let candidates: Vec<usize> = (0..self.points.len())
            .filter(|i| !simplex.contains(i))
            .collect();
        self.assign(candidates, &[0, 1, 2, 3]);
    }

    /// Attach each point to the face it is farthest beyond, if any.
    fn assign(&mut self, candidates: Vec<usize>, faces: &[usize]) {
        for i in candidates {
            let p = &self.points[i];
            let mut best: Option<(usize, f64)> = None;
            for &f in faces {
                let d = self.faces[f].distance(p);
                if d > self.eps && best.map_or(true, |(_, bd)| d > bd) {
                    best = Some((f, d));
                }
            }
            if let Some((f, _)) = best {
                let outside = &mut self.faces[f].outside;
                if outside.is_empty() {
                    self.pending.push(f);
                }
                outside.push(i);
            }
        }
    }

    /// Grow the hull until no face has outside points. Returns the number of
    /// points added after the initial simplex.
    fn expand(&mut self) -> usize {
        let mut added = 0;
        while let Some(seed) = self.pending.pop() {
            if !self.faces[seed].alive || self.faces[seed].outside.is_empty() {
                continue;
            }
            let apex = {
                let face = &self.faces[seed];
                let mut best = face.outside[0];
                let mut best_d = face.distance(&self.points[best]);
                for &i in &face.outside[1..] {
                    let d = face.distance(&self.points[i]);
                    if d > best_d {
                        best = i;
                        best_d = d;
                    }
                }
                best
            };
            let apex_point = self.points[apex];

            // Flood the connected region of faces the apex can see.
            let mut visible: Vec<usize> = vec![seed];
            let mut seen: HashSet<usize> = HashSet::new();
            seen.insert(seed);
            let mut stack = vec![seed];
            while let Some(f) = stack.pop() {
                for (a, b) in self.faces[f].edges() {
                    if let Some(&n) = self.edges.get(&(b, a)) {
                        if !seen.contains(&n) && self.faces[n].distance(&apex_point) > self.eps {
                            seen.insert(n);
                            visible.push(n);
                            stack.push(n);
                        }
                    }
                }
            }

            let mut horizon = Vec::new();
            for &f in &visible {
                for (a, b) in self.faces[f].edges() {
                    let across = self.edges.get(&(b, a));
                    if across.map_or(true, |n| !seen.contains(n)) {
                        horizon.push(([a, b, apex], self.faces[f].normal));
                    }
                }
            }

            let mut orphans = Vec::new();
            for &f in &visible {
                let face = &mut self.faces[f];
                face.alive = false;
                orphans.append(&mut face.outside);
                for edge in face.edges() {
                    self.edges.remove(&edge);
                }
            }

            let cone: Vec<usize> = horizon
                .into_iter()
                .map(|(tri, fallback)| self.add_face(tri, fallback))
                .collect();
            orphans.retain(|&i| i != apex);
            self.assign(orphans, &cone);
            added += 1;
        }
        added
    }

    fn finish(self) -> ConvexHull {
        let mut remap: Vec<Option<u32>> = vec![None; self.points.len()];
        for face in self.faces.iter().filter(|f| f.alive) {
            for &v in &face.vertices {
                remap[v] = Some(0);
            }
        }

        let mut vertices = Vec::new();
        for (i, slot) in remap.iter_mut().enumerate() {
            if slot.is_some() {
                #[allow(clippy::cast_possible_truncation)]
                let index = vertices.len() as u32;
                *slot = Some(index);
                vertices.push(self.points[i]);
            }
        }

        let mut faces = Vec::new();
        let mut normals = Vec::new();
        for face in self.faces.into_iter().filter(|f| f.alive) {
            faces.push(face.vertices.map(|v| remap[v].unwrap_or_default()));
            normals.push(face.normal);
        }

        ConvexHull {
            vertices,
            faces,
            normals,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use mesh_types::{unit_cube, Triangle};
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn assert_closed(hull: &ConvexHull) {
        assert_eq!(hull.face_count(), 2 * hull.vertex_count() - 4);
        let mut directed = HashSet::new();
        for &[a, b, c] in &hull.faces {
            for edge in [(a, b), (b, c), (c, a)] {
                assert!(directed.insert(edge), "edge {edge:?} used twice");
            }
        }
        for &(a, b) in &directed {
            assert!(directed.contains(&(b, a)), "edge ({a}, {b}) has no twin");
        }
    }

    fn assert_outward(hull: &ConvexHull) {
        let c = hull.centroid();
        for (face, n) in hull.faces.iter().zip(&hull.normals) {
            assert_relative_eq!(n.norm(), 1.0, epsilon = 1e-12);
            assert!(n.dot(&(c - hull.vertices[face[0] as usize])) < 0.0);
        }
    }

    #[test]
    fn cube_with_interior_points() {
        let mut points = unit_cube().vertices;
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..200 {
            points.push(Point3::new(
                rng.gen_range(0.05..0.95),
                rng.gen_range(0.05..0.95),
                rng.gen_range(0.05..0.95),
            ));
        }

        let hull = convex_hull(&points, &HullParams::default()).unwrap();
        assert_eq!(hull.vertex_count(), 8);
        assert_eq!(hull.face_count(), 12);
        assert_closed(&hull);
        assert_outward(&hull);
        assert_relative_eq!(hull.volume(), 1.0, epsilon = 1e-12);
    }

    /// Points spread evenly over the unit sphere, with no four coplanar.
    fn fibonacci_sphere(count: u32) -> Vec<Point3<f64>> {
        let golden = std::f64::consts::PI * (3.0 - 5.0_f64.sqrt());
        (0..count)
            .map(|i| {
                let z = 1.0 - 2.0 * (f64::from(i) + 0.5) / f64::from(count);
                let r = (1.0 - z * z).sqrt();
                let theta = golden * f64::from(i);
                Point3::new(r * theta.cos(), r * theta.sin(), z)
            })
            .collect()
    }

    #[test]
    fn dense_sphere_keeps_every_point() {
        let points = fibonacci_sphere(3600);
        let hull = convex_hull(&points, &HullParams::default()).unwrap();

        assert_eq!(hull.vertex_count(), 3600);
        assert_closed(&hull);
        assert_outward(&hull);
        for p in &points {
            assert!(hull.contains(p, 1e-9));
        }
    }

    #[test]
    fn expansion_visits_each_point_once() {
        let points = fibonacci_sphere(500);
        let eps = HullParams::default().tolerance * Aabb::from_points(points.iter()).diagonal();
        let simplex = initial_simplex(&points, eps).unwrap();

        let mut builder = Builder::new(&points, eps);
        builder.seed(simplex);
        assert_eq!(builder.expand(), points.len() - 4);
        assert!(builder.pending.is_empty());
        assert!(builder
            .faces
            .iter()
            .all(|f| !f.alive || f.outside.is_empty()));
    }

    #[test]
    fn duplicates_do_not_create_faces() {
        let cube = unit_cube().vertices;
        let mut points = Vec::new();
        for _ in 0..3 {
            points.extend_from_slice(&cube);
        }
        // Near-duplicates well inside the tolerance.
        points.push(Point3::new(1.0 + 1e-12, 1.0, 1.0));
        points.push(Point3::new(0.0, -1e-12, 0.0));

        let hull = convex_hull(&points, &HullParams::default()).unwrap();
        assert_eq!(hull.vertex_count(), 8);
        assert_closed(&hull);
        for face in &hull.faces {
            let [a, b, c] = face.map(|i| hull.vertices[i as usize]);
            assert!(Triangle::new(a, b, c).area() > 0.1);
        }
    }

    #[test]
    fn vertices_are_input_copies() {
        let mut rng = StdRng::seed_from_u64(11);
        let points: Vec<Point3<f64>> = (0..100)
            .map(|_| {
                Point3::new(
                    rng.gen_range(-2.0..2.0),
                    rng.gen_range(-2.0..2.0),
                    rng.gen_range(-2.0..2.0),
                )
            })
            .collect();

        let hull = convex_hull(&points, &HullParams::default()).unwrap();
        for v in &hull.vertices {
            assert!(points.contains(v));
        }
        for p in &points {
            assert!(hull.contains(p, 1e-7));
        }
        assert_closed(&hull);
        assert_outward(&hull);
    }

    #[test]
    fn too_few_points() {
        let points = [Point3::origin(), Point3::new(1.0, 0.0, 0.0), Point3::new(0.0, 1.0, 0.0)];
        assert_eq!(
            convex_hull(&points, &HullParams::default()),
            Err(HullError::TooFewPoints { count: 3 })
        );
    }

    #[test]
    fn coincident_points() {
        let points = vec![Point3::new(2.0, 2.0, 2.0); 10];
        let err = convex_hull(&points, &HullParams::default()).unwrap_err();
        assert!(matches!(err, HullError::TooFewPoints { .. }));
        assert!(err.is_degenerate());
    }

    #[test]
    fn collinear_points() {
        let points: Vec<_> = (0..10)
            .map(|i| Point3::new(f64::from(i), 2.0 * f64::from(i), 0.0))
            .collect();
        assert_eq!(
            convex_hull(&points, &HullParams::default()),
            Err(HullError::Collinear)
        );
    }

    #[test]
    fn coplanar_points() {
        let points: Vec<_> = (0..5)
            .flat_map(|i| (0..5).map(move |j| Point3::new(f64::from(i), f64::from(j), 3.0)))
            .collect();
        assert_eq!(
            convex_hull(&points, &HullParams::default()),
            Err(HullError::Coplanar)
        );
    }

    #[test]
    fn non_finite_points_are_ignored() {
        let mut points = unit_cube().vertices;
        points.push(Point3::new(f64::NAN, 0.0, 0.0));
        points.push(Point3::new(f64::INFINITY, 0.0, 0.0));
        let hull = convex_hull(&points, &HullParams::default()).unwrap();
        assert_eq!(hull.vertex_count(), 8);
    }

    #[test]
    fn invalid_tolerance() {
        let params = HullParams::default().with_tolerance(-1.0);
        let err = convex_hull(&unit_cube().vertices, &params).unwrap_err();
        assert!(!err.is_degenerate());
    }

    #[test]
    fn plane_distance_sign() {
        let hull = convex_hull(&unit_cube().vertices, &HullParams::default()).unwrap();
        let inside = hull.max_plane_distance(&Point3::new(0.5, 0.5, 0.5));
        let above = hull.max_plane_distance(&Point3::new(0.5, 0.5, 3.0));
        assert_relative_eq!(inside, -0.5, epsilon = 1e-12);
        assert_relative_eq!(above, 2.0, epsilon = 1e-12);
    }
}
