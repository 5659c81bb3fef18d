//! Registering a robot model against a scanned scene.
//!
//! Given the robot's geometry in its own frame and a triangulated scan of
//! the room, this crate finds the robot-to-world transform and hands it to
//! everything that needs to convert between the two frames.
//!
//! - [`Registrar`] - Segment the scene, hull every cluster, align the robot
//!   hull to each with ICP, keep the best fit
//! - [`RegisteredFrame`] - Immutable result with point and orientation
//!   conversions in both directions
//! - [`FrameHandle`] - Shared read access; re-registration swaps the whole
//!   frame at once
//! - [`LocalizationSession`] - Background or blocking registration with
//!   cancellation, plus saving and restoring through a [`TransformStore`]
//!
//! # Layer 0
//!
//! This is a Layer 0 crate with no engine dependencies. Logging goes through
//! `tracing`; install a subscriber in the host to see it.
//!
//! # Example
//!
//! ```
//! use mesh_localize::{LocalizeConfig, Registrar};
//! use mesh_segment::{ExclusionVolume, PlaneSurface};
//! use mesh_types::{unit_cube, Point3, Vector3};
//!
//! // The robot, standing one unit off the floor, next to a known table.
//! let robot = unit_cube();
//! let mut scene = unit_cube();
//! scene.translate(Vector3::new(2.0, 0.0, 1.0));
//! let mut table = unit_cube();
//! table.translate(Vector3::new(-3.0, 0.0, 0.0));
//! scene.merge(&table);
//!
//! let table_zone = mesh_types::Aabb::new(Point3::new(-3.0, 0.0, 0.0), Point3::new(-2.0, 1.0, 1.0));
//! let floor = PlaneSurface::infinite(Point3::origin(), Vector3::z()).unwrap();
//!
//! let registrar = Registrar::new(LocalizeConfig::default());
//! let frame = registrar
//!     .register(
//!         &robot.vertices,
//!         &scene,
//!         &[ExclusionVolume::bounded(table_zone), ExclusionVolume::surface(floor)],
//!     )
//!     .unwrap();
//!
//! let world = frame.robot_to_world_point(&Point3::new(0.5, 0.5, 0.5));
//! assert!((world - Point3::new(2.5, 0.5, 1.5)).norm() < 1e-6);
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![cfg_attr(not(test), deny(clippy::unwrap_used, clippy::expect_used))]

mod config;
mod error;
mod frame;
mod registrar;
mod session;
mod store;

pub use config::LocalizeConfig;
pub use error::{LocalizeError, LocalizeResult};
pub use frame::{FrameHandle, RegisteredFrame};
pub use registrar::{FitResult, Registrar};
pub use session::{LocalizationSession, RegistrationRequest, RegistrationStatus};
pub use store::{decode_transform, encode_transform, MemoryStore, TransformStore};
