use serde::{Deserialize, Serialize};

/// Neighbourhood used to fit a plane around each point.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NormalSettings {
    /// Neighbours farther away than this are ignored.
    #[serde(default = "default_normal_radius")]
    pub radius: f64,
    /// At most this many of the closest neighbours are used.
    #[serde(default = "default_normal_max_neighbors")]
    pub max_neighbors: usize,
}

impl Default for NormalSettings {
    fn default() -> Self {
        Self {
            radius: default_normal_radius(),
            max_neighbors: default_normal_max_neighbors(),
        }
    }
}

fn default_normal_radius() -> f64 {
    0.5
}

fn default_normal_max_neighbors() -> usize {
    30
}

/// The settings of [`IcpAligner`](crate::IcpAligner).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct IcpSettings {
    /// Both clouds need at least this many points, otherwise the identity is returned.
    #[serde(default = "default_min_points")]
    pub min_points: usize,
    /// Correspondences farther apart than this are not used.
    #[serde(default = "default_max_correspondence_distance")]
    pub max_correspondence_distance: f64,
    #[serde(default = "default_max_iterations")]
    pub max_iterations: usize,
    /// Iteration stops once the update moves less than this.
    #[serde(default = "default_convergence_epsilon")]
    pub convergence_epsilon: f64,
    /// Estimate a uniform scale from the bounding boxes before refining.
    #[serde(default = "default_estimate_scale")]
    pub estimate_scale: bool,
    /// Source axes shorter than this do not vote on the scale.
    #[serde(default = "default_min_extent")]
    pub min_extent: f64,
    #[serde(default = "default_min_scale")]
    pub min_scale: f64,
    #[serde(default = "default_max_scale")]
    pub max_scale: f64,
    /// A fitness under this is logged as a warning.
    #[serde(default = "default_low_fitness")]
    pub low_fitness: f64,
    #[serde(default)]
    pub normals: NormalSettings,
}

impl Default for IcpSettings {
    fn default() -> Self {
        Self {
            min_points: default_min_points(),
            max_correspondence_distance: default_max_correspondence_distance(),
            max_iterations: default_max_iterations(),
            convergence_epsilon: default_convergence_epsilon(),
            estimate_scale: default_estimate_scale(),
            min_extent: default_min_extent(),
            min_scale: default_min_scale(),
            max_scale: default_max_scale(),
            low_fitness: default_low_fitness(),
            normals: NormalSettings::default(),
        }
    }
}

impl IcpSettings {
    pub fn max_correspondence_distance(self, max_correspondence_distance: f64) -> Self {
        Self {
            max_correspondence_distance,
            ..self
        }
    }

    pub fn max_iterations(self, max_iterations: usize) -> Self {
        Self {
            max_iterations,
            ..self
        }
    }

    pub fn estimate_scale(self, estimate_scale: bool) -> Self {
        Self {
            estimate_scale,
            ..self
        }
    }
}

fn default_min_points() -> usize {
    10
}

fn default_max_correspondence_distance() -> f64 {
    0.5
}

fn default_max_iterations() -> usize {
    50
}

fn default_convergence_epsilon() -> f64 {
    1e-6
}

fn default_estimate_scale() -> bool {
    true
}

fn default_min_extent() -> f64 {
    0.1
}

fn default_min_scale() -> f64 {
    0.5
}

fn default_max_scale() -> f64 {
    2.0
}

fn default_low_fitness() -> f64 {
    0.1
}
