//! Core geometry types for scene registration.
//!
//! This crate provides the foundational types shared by the registration
//! pipeline:
//!
//! - [`IndexedMesh`] - A triangle mesh with indexed vertices (scanned rooms,
//!   robot model parts)
//! - [`Triangle`] - A concrete triangle with vertex positions
//! - [`Aabb`] - Axis-aligned bounding box
//! - [`MeshError`] - Structural validation errors
//!
//! # Layer 0 Crate
//!
//! This crate has **no engine or UI dependencies**. Points arrive from
//! whatever scene-understanding or model-loading collaborator produced them and
//! are plain `nalgebra` points.
//!
//! # Units
//!
//! This library is **unit-agnostic**. All coordinates are `f64`.
//! The registration crates downstream assume meters (exclusion margins default
//! to 5 cm).
//!
//! # Coordinate System
//!
//! Uses a **right-handed coordinate system**. Face winding is
//! **counter-clockwise (CCW) when viewed from outside**, so normals point
//! outward by the right-hand rule.
//!
//! # Example
//!
//! ```
//! use mesh_types::{IndexedMesh, Point3, MeshTopology};
//!
//! let mut mesh = IndexedMesh::new();
//! mesh.vertices.push(Point3::new(0.0, 0.0, 0.0));
//! mesh.vertices.push(Point3::new(1.0, 0.0, 0.0));
//! mesh.vertices.push(Point3::new(0.5, 1.0, 0.0));
//! mesh.faces.push([0, 1, 2]);
//!
//! assert_eq!(mesh.face_count(), 1);
//! assert!(mesh.validate().is_ok());
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]

mod bounds;
mod error;
mod mesh;
mod traits;
mod triangle;

pub use bounds::Aabb;
pub use error::{MeshError, MeshResult};
pub use mesh::{unit_cube, IndexedMesh};
pub use traits::{MeshBounds, MeshTopology};
pub use triangle::Triangle;

// Re-export nalgebra types for convenience
pub use nalgebra::{Point3, Vector3};
