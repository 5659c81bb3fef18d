//! Scene-to-robot spatial registration.
//!
//! This umbrella crate re-exports the registration crates, providing one
//! API for locating a robot model inside a scanned room. All crates are
//! Layer 0 (no engine dependencies) and can run on a headset, a robot
//! controller, or a server.
//!
//! # Quick Start
//!
//! ```
//! use mesh::prelude::*;
//!
//! // The robot model in its own frame, and a scan with the robot in it.
//! let robot = unit_cube();
//! let mut scene = unit_cube();
//! scene.translate(Vector3::new(1.5, -0.5, 0.0));
//!
//! let mut session = LocalizationSession::new(LocalizeConfig::default());
//! let frames = session.frame_handle();
//! session
//!     .register_blocking(&RegistrationRequest::new(robot.vertices, scene))
//!     .unwrap();
//!
//! let frame = frames.current().unwrap();
//! let tool = frame.world_to_robot_point(&Point3::new(2.0, 0.0, 0.5));
//! assert!((tool - Point3::new(0.5, 0.5, 0.5)).norm() < 1e-6);
//! ```
//!
//! # Module Organization
//!
//! ## Foundation
//! - [`types`] - Core data structures: `IndexedMesh`, `Triangle`, `Aabb`
//!
//! ## Geometry
//! - [`hull`] - Quickhull convex hulls with degeneracy detection
//! - [`segment`] - Union-find, exclusion volumes, scene clustering
//!
//! ## Alignment
//! - [`registration`] - Kabsch solver and point-to-point ICP
//!
//! ## Orchestration
//! - [`localize`] - Registrar, registered frames, background sessions,
//!   transform persistence
//!
//! # Feature Flags
//!
//! - `serde` - Serialize meshes, hulls, clusters and parameters

#![warn(missing_docs)]
#![cfg_attr(not(test), deny(clippy::unwrap_used, clippy::expect_used))]

// =============================================================================
// Re-exports
// =============================================================================

/// Core data structures: `IndexedMesh`, `Triangle`, `Aabb`.
pub use mesh_types as types;

/// Convex hull construction.
pub use mesh_hull as hull;

/// Union-find, exclusion volumes and scene segmentation.
pub use mesh_segment as segment;

/// Kabsch and ICP alignment.
pub use mesh_registration as registration;

/// Registration orchestration and frame management.
pub use mesh_localize as localize;

// =============================================================================
// Prelude
// =============================================================================

/// Common imports for registration.
///
/// # Usage
///
/// ```
/// use mesh::prelude::*;
/// ```
pub mod prelude {
    // Core types
    pub use mesh_types::{unit_cube, Aabb, IndexedMesh, MeshBounds, MeshTopology, Point3, Vector3};

    // Geometry
    pub use mesh_hull::{convex_hull, ConvexHull, HullParams};
    pub use mesh_segment::{segment_scene, ExclusionVolume, PlaneSurface, SegmentParams};

    // Alignment
    pub use mesh_registration::{icp_align_points, IcpParams, RigidTransform};

    // Orchestration (main use case)
    pub use mesh_localize::{
        FrameHandle, LocalizationSession, LocalizeConfig, LocalizeError, RegisteredFrame,
        Registrar, RegistrationRequest, RegistrationStatus,
    };
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prelude_imports() {
        use prelude::*;

        let mesh = IndexedMesh::new();
        assert_eq!(mesh.vertex_count(), 0);
        assert_eq!(mesh.face_count(), 0);
        assert_eq!(LocalizeConfig::default().icp_max_iterations, 10);
    }

    #[test]
    fn test_module_reexports() {
        let _ = types::IndexedMesh::new();
        let _ = hull::HullParams::default();
        let _ = segment::SegmentParams::default();
        let _ = registration::IcpParams::default();
        let _ = localize::LocalizeConfig::default();
    }
}
