//! Scene segmentation for registration.
//!
//! A scanned room contains the robot somewhere among walls, floors and
//! furniture. Scene understanding already knows the furniture and the room
//! shell; this crate removes their points and splits what remains into
//! connected clusters, each a candidate location for the robot.
//!
//! - [`UnionFind`] - Disjoint-set forest with union by rank and path halving
//! - [`ExclusionVolume`] - A known object, tested either as a volume or as a
//!   surface with a distance margin
//! - [`segment_scene`] - Exclusion filtering followed by triangle-connectivity
//!   clustering
//!
//! # Layer 0
//!
//! This is a Layer 0 crate with no engine dependencies.
//!
//! # Example
//!
//! ```
//! use mesh_segment::{segment_scene, ExclusionVolume, PlaneSurface, SegmentParams};
//! use mesh_types::{unit_cube, Point3, Vector3};
//!
//! let mut scene = unit_cube();
//! let mut robot = unit_cube();
//! robot.translate(Vector3::new(3.0, 0.0, 0.5));
//! scene.merge(&robot);
//!
//! // The first cube rests on a floor at z = 0; its bottom is excluded.
//! let floor = PlaneSurface::infinite(Point3::origin(), Vector3::z()).unwrap();
//! let seg = segment_scene(
//!     &scene,
//!     &[ExclusionVolume::surface(floor)],
//!     &SegmentParams::default().with_min_cluster_size(4),
//! )
//! .unwrap();
//!
//! assert_eq!(seg.clusters.len(), 2);
//! assert_eq!(seg.clusters[1].len(), 8);
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![cfg_attr(not(test), deny(clippy::unwrap_used, clippy::expect_used))]

mod error;
mod exclusion;
mod segment;
mod union_find;

pub use error::{SegmentError, SegmentResult};
pub use exclusion::{BoundedVolume, ExclusionVolume, PlaneSurface, Surface};
pub use segment::{segment_scene, PointCluster, SegmentParams, Segmentation, DEFAULT_MARGIN};
pub use union_find::UnionFind;
