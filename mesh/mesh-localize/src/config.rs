//! Registration configuration.

use mesh_hull::{HullParams, DEFAULT_TOLERANCE};
use mesh_registration::{IcpParams, RigidTransform};
use mesh_segment::{SegmentParams, DEFAULT_MARGIN};
use serde::{Deserialize, Serialize};

use crate::{LocalizeError, LocalizeResult};

/// Tunable options for [`Registrar`](crate::Registrar).
///
/// Every field has a default, so a partial JSON document loads:
///
/// ```
/// use mesh_localize::LocalizeConfig;
///
/// let config = LocalizeConfig::from_json(r#"{ "icp_max_iterations": 40 }"#).unwrap();
/// assert_eq!(config.icp_max_iterations, 40);
/// assert!((config.exclusion_margin - 0.05).abs() < 1e-12);
/// ```
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LocalizeConfig {
    /// Distance within which scene points near an excluded object are
    /// dropped (meters).
    #[serde(default = "default_exclusion_margin")]
    pub exclusion_margin: f64,

    /// Maximum ICP iterations per cluster.
    #[serde(default = "default_icp_max_iterations")]
    pub icp_max_iterations: u32,

    /// ICP stops once the mean squared error changes by less than this.
    #[serde(default = "default_icp_convergence")]
    pub icp_convergence: f64,

    /// Relative tolerance for hull degeneracy checks.
    #[serde(default = "default_hull_tolerance")]
    pub hull_tolerance: f64,

    /// Estimate a uniform scale along with the rigid motion.
    ///
    /// Off by default, so the fit is rigid and a scan in the model's units
    /// keeps scale `1.0`. Enable it for scans in unknown or drifting units.
    #[serde(default)]
    pub estimate_scale: bool,

    /// Drop ICP pairs farther apart than this.
    #[serde(default)]
    pub max_correspondence_distance: Option<f64>,

    /// Down-weight ICP pairs farther apart than this.
    #[serde(default)]
    pub huber_threshold: Option<f64>,

    /// Reject fits whose RMS error exceeds this.
    #[serde(default)]
    pub max_fit_error: Option<f64>,

    /// Clusters with fewer points are not considered.
    #[serde(default = "default_min_cluster_size")]
    pub min_cluster_size: usize,
}

fn default_exclusion_margin() -> f64 {
    DEFAULT_MARGIN
}

fn default_icp_max_iterations() -> u32 {
    10
}

fn default_icp_convergence() -> f64 {
    1e-5
}

fn default_hull_tolerance() -> f64 {
    DEFAULT_TOLERANCE
}

fn default_min_cluster_size() -> usize {
    4 // Smallest point count that can span a hull
}

impl Default for LocalizeConfig {
    fn default() -> Self {
        Self {
            exclusion_margin: default_exclusion_margin(),
            icp_max_iterations: default_icp_max_iterations(),
            icp_convergence: default_icp_convergence(),
            hull_tolerance: default_hull_tolerance(),
            estimate_scale: false,
            max_correspondence_distance: None,
            huber_threshold: None,
            max_fit_error: None,
            min_cluster_size: default_min_cluster_size(),
        }
    }
}

impl LocalizeConfig {
    /// Parses a JSON configuration. Missing fields take their defaults.
    ///
    /// # Errors
    ///
    /// [`LocalizeError::Serialization`] for malformed JSON and
    /// [`LocalizeError::InvalidConfig`] for out-of-range values.
    pub fn from_json(json: &str) -> LocalizeResult<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Serializes to pretty-printed JSON.
    ///
    /// # Errors
    ///
    /// [`LocalizeError::Serialization`] if a value cannot be represented.
    pub fn to_json(&self) -> LocalizeResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Checks every value is in range.
    ///
    /// # Errors
    ///
    /// [`LocalizeError::InvalidConfig`] naming the first bad field.
    pub fn validate(&self) -> LocalizeResult<()> {
        let non_negative = [
            ("exclusion_margin", Some(self.exclusion_margin)),
            ("icp_convergence", Some(self.icp_convergence)),
            ("hull_tolerance", Some(self.hull_tolerance)),
            ("max_fit_error", self.max_fit_error),
        ];
        for (name, value) in non_negative {
            if let Some(v) = value {
                if !v.is_finite() || v < 0.0 {
                    return Err(LocalizeError::InvalidConfig(format!(
                        "{name} must be finite and non-negative, got {v}"
                    )));
                }
            }
        }

        let positive = [
            ("max_correspondence_distance", self.max_correspondence_distance),
            ("huber_threshold", self.huber_threshold),
        ];
        for (name, value) in positive {
            if let Some(v) = value {
                if !v.is_finite() || v <= 0.0 {
                    return Err(LocalizeError::InvalidConfig(format!(
                        "{name} must be finite and positive, got {v}"
                    )));
                }
            }
        }
        Ok(())
    }

    /// Hull parameters for robot and cluster hulls.
    #[must_use]
    pub fn hull_params(&self) -> HullParams {
        HullParams::default().with_tolerance(self.hull_tolerance)
    }

    /// Segmentation parameters for the scene.
    #[must_use]
    pub fn segment_params(&self) -> SegmentParams {
        SegmentParams::default()
            .with_margin(self.exclusion_margin)
            .with_min_cluster_size(self.min_cluster_size)
    }

    /// ICP parameters starting from `initial`.
    #[must_use]
    pub fn icp_params(&self, initial: RigidTransform) -> IcpParams {
        let mut params = IcpParams::default()
            .with_max_iterations(self.icp_max_iterations)
            .with_convergence_threshold(self.icp_convergence)
            .with_scale(self.estimate_scale)
            .with_initial_transform(initial);
        params.max_correspondence_distance = self.max_correspondence_distance;
        params.huber_threshold = self.huber_threshold;
        params
    }
}
