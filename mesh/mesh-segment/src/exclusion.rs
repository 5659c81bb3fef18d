//! Known-object regions removed from the scan before clustering.
//!
//! Scene understanding reports furniture, walls and floors as anchors. Some
//! have a volume (a table's bounding box), others only a surface (a wall
//! plane). The segmenter only needs one question answered per vertex: is this
//! point part of a known object? [`ExclusionVolume`] wraps either capability.

use std::fmt;
use std::sync::Arc;

use mesh_types::Aabb;
use nalgebra::{Point3, Unit, Vector3};

/// A region with an inside/outside test.
pub trait BoundedVolume: Send + Sync {
    /// Whether `point` lies inside the volume grown by `margin`.
    fn contains(&self, point: &Point3<f64>, margin: f64) -> bool;
}

/// A surface with a point-distance query.
pub trait Surface: Send + Sync {
    /// Distance from `point` to the closest point on the surface.
    fn distance_to(&self, point: &Point3<f64>) -> f64;
}

impl BoundedVolume for Aabb {
    fn contains(&self, point: &Point3<f64>, margin: f64) -> bool {
        self.expanded(margin).contains(point)
    }
}

impl<F> BoundedVolume for F
where
    F: Fn(&Point3<f64>, f64) -> bool + Send + Sync,
{
    fn contains(&self, point: &Point3<f64>, margin: f64) -> bool {
        self(point, margin)
    }
}

impl<F> Surface for F
where
    F: Fn(&Point3<f64>) -> f64 + Send + Sync,
{
    fn distance_to(&self, point: &Point3<f64>) -> f64 {
        self(point)
    }
}

/// A finite planar rectangle, the shape of wall, floor and ceiling anchors.
///
/// # Example
///
/// ```
/// use mesh_segment::{PlaneSurface, Surface};
/// use nalgebra::{Point3, Vector3};
///
/// // 4 m x 3 m floor centered at the origin
/// let floor = PlaneSurface::new(
///     Point3::origin(),
///     Vector3::z(),
///     Vector3::x(),
///     [2.0, 1.5],
/// ).unwrap();
///
/// assert!((floor.distance_to(&Point3::new(1.0, 1.0, 0.3)) - 0.3).abs() < 1e-12);
/// assert!((floor.distance_to(&Point3::new(3.0, 0.0, 0.0)) - 1.0).abs() < 1e-12);
/// ```
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlaneSurface {
    center: Point3<f64>,
    normal: Unit<Vector3<f64>>,
    u_axis: Unit<Vector3<f64>>,
    v_axis: Unit<Vector3<f64>>,
    half_extents: [f64; 2],
}

impl PlaneSurface {
    /// Create a rectangle from its center, normal, an in-plane axis for the
    /// first extent, and the half extents along that axis and its
    /// perpendicular.
    ///
    /// Infinite half extents give an unbounded plane. Returns `None` if the
    /// normal is zero or `u_axis` is parallel to it.
    #[must_use]
    pub fn new(
        center: Point3<f64>,
        normal: Vector3<f64>,
        u_axis: Vector3<f64>,
        half_extents: [f64; 2],
    ) -> Option<Self> {
        let normal = Unit::try_new(normal, f64::EPSILON)?;
        // Project the axis into the plane in case the caller's frame is not
        // exactly orthogonal.
        let u = u_axis - normal.into_inner() * normal.dot(&u_axis);
        let u_axis = Unit::try_new(u, f64::EPSILON)?;
        let v_axis = Unit::new_normalize(normal.cross(&u_axis));
        Some(Self {
            center,
            normal,
            u_axis,
            v_axis,
            half_extents: [half_extents[0].abs(), half_extents[1].abs()],
        })
    }

    /// Create an unbounded plane through `point`.
    #[must_use]
    pub fn infinite(point: Point3<f64>, normal: Vector3<f64>) -> Option<Self> {
        let helper = if normal.x.abs() < 0.9 {
            Vector3::x()
        } else {
            Vector3::y()
        };
        Self::new(point, normal, helper, [f64::INFINITY, f64::INFINITY])
    }

    /// Unit normal of the plane.
    #[must_use]
    pub const fn normal(&self) -> &Unit<Vector3<f64>> {
        &self.normal
    }
}

impl Surface for PlaneSurface {
    fn distance_to(&self, point: &Point3<f64>) -> f64 {
        let d = point - self.center;
        let height = self.normal.dot(&d);
        let du = (self.u_axis.dot(&d).abs() - self.half_extents[0]).max(0.0);
        let dv = (self.v_axis.dot(&d).abs() - self.half_extents[1]).max(0.0);
        height.hypot(du.hypot(dv))
    }
}

/// A region whose points belong to a known object.
///
/// Cloning is cheap: both variants share the underlying shape.
#[derive(Clone)]
pub enum ExclusionVolume {
    /// Exclude points inside the volume grown by the margin.
    Bounded(Arc<dyn BoundedVolume>),
    /// Exclude points within the margin of the surface.
    Surface(Arc<dyn Surface>),
}

impl ExclusionVolume {
    /// Wrap a bounded volume.
    pub fn bounded(volume: impl BoundedVolume + 'static) -> Self {
        Self::Bounded(Arc::new(volume))
    }

    /// Wrap a surface.
    pub fn surface(surface: impl Surface + 'static) -> Self {
        Self::Surface(Arc::new(surface))
    }

    /// Whether `point` belongs to this known object at the given margin.
    ///
    /// # Example
    ///
    /// ```
    /// use mesh_segment::ExclusionVolume;
    /// use mesh_types::Aabb;
    /// use nalgebra::Point3;
    ///
    /// let crate_box = ExclusionVolume::bounded(Aabb::new(
    ///     Point3::new(0.0, 0.0, 0.0),
    ///     Point3::new(1.0, 1.0, 1.0),
    /// ));
    ///
    /// assert!(crate_box.excludes(&Point3::new(1.04, 0.5, 0.5), 0.05));
    /// assert!(!crate_box.excludes(&Point3::new(1.10, 0.5, 0.5), 0.05));
    /// ```
    #[must_use]
    pub fn excludes(&self, point: &Point3<f64>, margin: f64) -> bool {
        match self {
            Self::Bounded(volume) => volume.contains(point, margin),
            Self::Surface(surface) => surface.distance_to(point) <= margin,
        }
    }
}

impl fmt::Debug for ExclusionVolume {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bounded(_) => f.write_str("ExclusionVolume::Bounded(..)"),
            Self::Surface(_) => f.write_str("ExclusionVolume::Surface(..)"),
        }
    }
}
