//! Convex hulls of 3D point sets.
//!
//! Registration compares shapes through their convex hulls: the robot model
//! and every scene cluster are reduced to hull vertices before alignment,
//! which removes interior scan noise and shrinks the point sets ICP has to
//! match.
//!
//! # Algorithm
//!
//! [`convex_hull`] runs Quickhull. It starts from a tetrahedron of extreme
//! points, then repeatedly lifts the farthest outside point of a face, removes
//! every face that point can see, and cones the horizon to it.
//!
//! All geometric predicates share one absolute tolerance,
//! `tolerance * bbox_diagonal`, so the result does not depend on the units of
//! the input.
//!
//! # Example
//!
//! ```
//! use mesh_hull::{convex_hull, HullParams};
//! use mesh_types::unit_cube;
//!
//! let hull = convex_hull(&unit_cube().vertices, &HullParams::default()).unwrap();
//! assert_eq!(hull.vertex_count(), 8);
//! assert_eq!(hull.face_count(), 12);
//! assert!((hull.volume() - 1.0).abs() < 1e-12);
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![cfg_attr(not(test), deny(clippy::unwrap_used, clippy::expect_used))]

mod error;
mod hull;

pub use error::{HullError, HullResult};
pub use hull::{convex_hull, ConvexHull, HullParams, DEFAULT_TOLERANCE};
