//! Point set alignment.
//!
//! This crate finds the transform that carries one point set onto another:
//! - **Kabsch algorithm** - Optimal rigid (or similarity) transform from
//!   paired points, optionally weighted
//! - **ICP (Iterative Closest Point)** - Alignment without known pairs, by
//!   alternating nearest-neighbour matching and Kabsch solves
//!
//! # Layer 0
//!
//! This is a Layer 0 crate with no engine dependencies.
//!
//! # Quick Start
//!
//! ## Known correspondences
//!
//! ```
//! use mesh_registration::compute_rigid_transform;
//! use nalgebra::Point3;
//!
//! let source = vec![
//!     Point3::new(0.0, 0.0, 0.0),
//!     Point3::new(1.0, 0.0, 0.0),
//!     Point3::new(0.0, 1.0, 0.0),
//! ];
//! let target = vec![
//!     Point3::new(5.0, 5.0, 0.0),
//!     Point3::new(6.0, 5.0, 0.0),
//!     Point3::new(5.0, 6.0, 0.0),
//! ];
//!
//! let transform = compute_rigid_transform(&source, &target, false).unwrap();
//! let moved = transform.transform_point(&source[1]);
//! assert!((moved - target[1]).norm() < 1e-10);
//! ```
//!
//! ## Unknown correspondences
//!
//! ```
//! use mesh_registration::{icp_align_points, IcpParams, RigidTransform};
//! use nalgebra::{Point3, UnitQuaternion, Vector3};
//!
//! let source: Vec<Point3<f64>> = (0..27)
//!     .map(|i| Point3::new(f64::from(i % 3), f64::from((i / 3) % 3), f64::from(i / 9) * 1.5))
//!     .collect();
//! let truth = RigidTransform::new(
//!     UnitQuaternion::from_axis_angle(&Vector3::z_axis(), 0.02),
//!     Vector3::new(0.1, -0.05, 0.0),
//! );
//! let target: Vec<_> = source.iter().map(|p| truth.transform_point(p)).collect();
//!
//! let params = IcpParams::default().with_max_iterations(30);
//! let result = icp_align_points(&source, &target, &params).unwrap();
//! assert!(result.rms_error < 1e-6);
//! ```
//!
//! # Choosing parameters
//!
//! | Scenario | Setting |
//! |----------|---------|
//! | Large initial offset | `IcpParams::with_initial_transform` |
//! | Outliers in the target | `with_max_correspondence_distance` or `with_huber_threshold` |
//! | Different units | `with_scale(true)` |
//!
//! Targets above a few hundred points are searched through a KD-tree;
//! smaller ones are scanned linearly. Both return the exact nearest point.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![cfg_attr(not(test), deny(clippy::unwrap_used, clippy::expect_used))]

mod error;
mod icp;
mod kabsch;
mod transform;

pub use error::{RegistrationError, RegistrationResult};
pub use icp::{icp_align_points, icp_align_points_cancellable, IcpParams, IcpResult};
pub use kabsch::{compute_rigid_transform, compute_weighted_rigid_transform, MIN_PAIRS};
pub use transform::RigidTransform;
