//! Scene segmentation into candidate clusters.

use hashbrown::HashMap;
use mesh_types::IndexedMesh;
use nalgebra::Point3;
use rayon::prelude::*;
use tracing::{debug, info};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::error::{SegmentError, SegmentResult};
use crate::exclusion::ExclusionVolume;
use crate::union_find::UnionFind;

/// Default distance (meters) within which a point counts as touching a known
/// object.
pub const DEFAULT_MARGIN: f64 = 0.05;

/// Parameters for [`segment_scene`].
///
/// # Example
///
/// ```
/// use mesh_segment::SegmentParams;
///
/// let params = SegmentParams::default()
///     .with_margin(0.1)
///     .with_min_cluster_size(4);
/// assert_eq!(params.min_cluster_size, 4);
/// ```
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SegmentParams {
    /// Distance tolerance applied to every exclusion volume.
    pub margin: f64,

    /// Clusters with fewer retained points are dropped.
    pub min_cluster_size: usize,
}

impl Default for SegmentParams {
    fn default() -> Self {
        Self {
            margin: DEFAULT_MARGIN,
            min_cluster_size: 1,
        }
    }
}

impl SegmentParams {
    /// Set the exclusion margin.
    #[must_use]
    pub const fn with_margin(mut self, margin: f64) -> Self {
        self.margin = margin;
        self
    }

    /// Set the minimum cluster size.
    #[must_use]
    pub const fn with_min_cluster_size(mut self, size: usize) -> Self {
        self.min_cluster_size = size;
        self
    }
}

/// A connected group of retained scene vertices.
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct PointCluster {
    /// Scene vertex indices, ascending.
    pub indices: Vec<u32>,
    /// Positions of those vertices, in the same order.
    pub points: Vec<Point3<f64>>,
}

impl PointCluster {
    /// Number of points in the cluster.
    #[must_use]
    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// Whether the cluster has no points.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}

/// Output of [`segment_scene`].
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Segmentation {
    /// Candidate clusters, ordered by their smallest vertex index.
    pub clusters: Vec<PointCluster>,
    /// Vertices that survived exclusion (including those in dropped clusters).
    pub retained_count: usize,
    /// Vertices removed by an exclusion volume.
    pub excluded_count: usize,
}

/// Remove points belonging to known objects and group the rest into
/// connected clusters.
///
/// A vertex is retained unless some exclusion volume claims it at
/// `params.margin`. Two retained vertices share a cluster when a chain of
/// triangles whose three vertices are all retained connects them. Triangles
/// touching any excluded vertex contribute no connectivity.
///
/// Retained vertices not referenced by any fully retained triangle become
/// singleton clusters, which `min_cluster_size` can filter out.
///
/// # Errors
///
/// Returns [`SegmentError::InvalidMesh`] when a face references a missing
/// vertex or a vertex is not finite, and [`SegmentError::InvalidMargin`] for
/// a negative or non-finite margin.
///
/// # Example
///
/// ```
/// use mesh_segment::{segment_scene, ExclusionVolume, SegmentParams};
/// use mesh_types::{Aabb, IndexedMesh, Point3};
///
/// // Two triangles far apart; the second sits inside a known box.
/// let scene = IndexedMesh::from_parts(
///     vec![
///         Point3::new(0.0, 0.0, 0.0),
///         Point3::new(1.0, 0.0, 0.0),
///         Point3::new(0.0, 1.0, 0.0),
///         Point3::new(5.0, 5.0, 0.0),
///         Point3::new(6.0, 5.0, 0.0),
///         Point3::new(5.0, 6.0, 0.0),
///     ],
///     vec![[0, 1, 2], [3, 4, 5]],
/// );
/// let table = ExclusionVolume::bounded(Aabb::new(
///     Point3::new(4.0, 4.0, -1.0),
///     Point3::new(7.0, 7.0, 1.0),
/// ));
///
/// let seg = segment_scene(&scene, &[table], &SegmentParams::default()).unwrap();
/// assert_eq!(seg.clusters.len(), 1);
/// assert_eq!(seg.clusters[0].indices, vec![0, 1, 2]);
/// assert_eq!(seg.excluded_count, 3);
/// ```
pub fn segment_scene(
    mesh: &IndexedMesh,
    exclusions: &[ExclusionVolume],
    params: &SegmentParams,
) -> SegmentResult<Segmentation> {
    if !params.margin.is_finite() || params.margin < 0.0 {
        return Err(SegmentError::InvalidMargin(params.margin));
    }
    mesh.validate()?;

    info!(
        vertices = mesh.vertices.len(),
        faces = mesh.faces.len(),
        exclusions = exclusions.len(),
        margin = params.margin,
        "Segmenting scene"
    );

    let retained: Vec<bool> = mesh
        .vertices
        .par_iter()
        .map(|p| !exclusions.iter().any(|volume| volume.excludes(p, params.margin)))
        .collect();
    let retained_count = retained.iter().filter(|&&keep| keep).count();
    let excluded_count = retained.len() - retained_count;

    let mut uf = UnionFind::new(mesh.vertices.len());
    let mut linked_faces = 0usize;
    for &[a, b, c] in &mesh.faces {
        let (a, b, c) = (a as usize, b as usize, c as usize);
        if retained[a] && retained[b] && retained[c] {
            uf.union(a, b);
            uf.union(a, c);
            linked_faces += 1;
        }
    }

    // Visiting vertices in ascending order makes cluster order follow the
    // smallest member index.
    let mut slot_of_root: HashMap<usize, usize> = HashMap::new();
    let mut clusters: Vec<PointCluster> = Vec::new();
    for (vertex, _) in retained.iter().enumerate().filter(|(_, &keep)| keep) {
        let root = uf.find(vertex);
        let slot = *slot_of_root.entry(root).or_insert_with(|| {
            clusters.push(PointCluster::default());
            clusters.len() - 1
        });
        let cluster = &mut clusters[slot];
        #[allow(clippy::cast_possible_truncation)] // validate() bounds indices by u32 faces
        cluster.indices.push(vertex as u32);
        cluster.points.push(mesh.vertices[vertex]);
    }

    let found = clusters.len();
    clusters.retain(|c| c.len() >= params.min_cluster_size);
    debug!(
        linked_faces,
        found,
        dropped = found - clusters.len(),
        "Clustered retained vertices"
    );

    info!(
        clusters = clusters.len(),
        retained = retained_count,
        excluded = excluded_count,
        "Segmentation complete"
    );

    Ok(Segmentation {
        clusters,
        retained_count,
        excluded_count,
    })
}
