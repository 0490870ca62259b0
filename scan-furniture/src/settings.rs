use crate::FurniturePriors;
use scan_align::IcpSettings;
use scan_reconstruction::PointCloudSettings;
use serde::{Deserialize, Serialize};

/// Constants of both localization strategies and of depth back-projection.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FurnitureSettings {
    /// Percentile of the reference cloud's vertical coordinate taken as the floor.
    #[serde(default = "default_floor_percentile")]
    pub floor_percentile: f64,
    /// DBSCAN neighbourhood radius on the horizontal plane.
    #[serde(default = "default_cluster_radius")]
    pub cluster_radius: f64,
    /// DBSCAN core point threshold, also the fewest points at a label's height worth
    /// clustering.
    #[serde(default = "default_cluster_min_samples")]
    pub cluster_min_samples: usize,
    /// Confidence given to detections found by clustering.
    #[serde(default = "default_cluster_confidence")]
    pub cluster_confidence: f64,
    /// About this many 2D detections are assumed per physical object when capping the
    /// number of clusters used for a label.
    #[serde(default = "default_detections_per_object")]
    pub detections_per_object: usize,
    /// Allowed relative deviation from the depth observed inside a detection.
    #[serde(default = "default_depth_tolerance")]
    pub depth_tolerance: f64,
    /// Fraction of the box trimmed from every side when no mask is available.
    #[serde(default = "default_bbox_margin")]
    pub bbox_margin: f64,
    /// Points closer to the camera than this are discarded.
    #[serde(default = "default_min_camera_depth")]
    pub min_camera_depth: f64,
    /// More depth samples than this are needed to trust the observed depth.
    #[serde(default = "default_min_depth_samples")]
    pub min_depth_samples: usize,
    /// Fewer matched points than this rejects a projected detection.
    #[serde(default = "default_min_detection_points")]
    pub min_detection_points: usize,
    /// Points kept per detection.
    #[serde(default = "default_max_detection_points")]
    pub max_detection_points: usize,
    /// Valid depths a back-projected detection needs inside its region.
    #[serde(default = "default_min_backprojected_depths")]
    pub min_backprojected_depths: usize,
    /// Valid samples a back-projected detection needs.
    #[serde(default = "default_min_backprojected_samples")]
    pub min_backprojected_samples: usize,
    #[serde(default = "default_seed")]
    pub seed: u64,
}

impl Default for FurnitureSettings {
    fn default() -> Self {
        Self {
            floor_percentile: default_floor_percentile(),
            cluster_radius: default_cluster_radius(),
            cluster_min_samples: default_cluster_min_samples(),
            cluster_confidence: default_cluster_confidence(),
            detections_per_object: default_detections_per_object(),
            depth_tolerance: default_depth_tolerance(),
            bbox_margin: default_bbox_margin(),
            min_camera_depth: default_min_camera_depth(),
            min_depth_samples: default_min_depth_samples(),
            min_detection_points: default_min_detection_points(),
            max_detection_points: default_max_detection_points(),
            min_backprojected_depths: default_min_backprojected_depths(),
            min_backprojected_samples: default_min_backprojected_samples(),
            seed: default_seed(),
        }
    }
}

fn default_floor_percentile() -> f64 {
    5.0
}

fn default_cluster_radius() -> f64 {
    0.5
}

fn default_cluster_min_samples() -> usize {
    30
}

fn default_cluster_confidence() -> f64 {
    0.8
}

fn default_detections_per_object() -> usize {
    3
}

fn default_depth_tolerance() -> f64 {
    0.5
}

fn default_bbox_margin() -> f64 {
    0.15
}

fn default_min_camera_depth() -> f64 {
    0.01
}

fn default_min_depth_samples() -> usize {
    5
}

fn default_min_detection_points() -> usize {
    3
}

fn default_max_detection_points() -> usize {
    100
}

fn default_min_backprojected_depths() -> usize {
    10
}

fn default_min_backprojected_samples() -> usize {
    5
}

fn default_seed() -> u64 {
    5
}

/// How close two candidates of the same label must be to count as one object.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MergeSettings {
    /// The threshold never drops below this.
    #[serde(default = "default_min_distance")]
    pub min_distance: f64,
    /// Fraction of the scene size used as the threshold.
    #[serde(default = "default_scene_ratio")]
    pub scene_ratio: f64,
}

impl Default for MergeSettings {
    fn default() -> Self {
        Self {
            min_distance: default_min_distance(),
            scene_ratio: default_scene_ratio(),
        }
    }
}

fn default_min_distance() -> f64 {
    0.5
}

fn default_scene_ratio() -> f64 {
    0.08
}

/// Everything [`FurniturePipeline`](crate::FurniturePipeline) needs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocalizationSettings {
    #[serde(default)]
    pub priors: FurniturePriors,
    #[serde(default)]
    pub furniture: FurnitureSettings,
    #[serde(default)]
    pub merge: MergeSettings,
    #[serde(default = "default_icp")]
    pub icp: IcpSettings,
    /// How the oracle depth is turned into the cloud registered against the reference.
    #[serde(default = "PointCloudSettings::alignment")]
    pub depth_cloud: PointCloudSettings,
    /// ICP only runs when the depth cloud has more points than this.
    #[serde(default = "default_min_alignment_points")]
    pub min_alignment_points: usize,
    /// Reference clouds are randomly reduced to this many points when loaded.
    #[serde(default = "default_reference_max_points")]
    pub reference_max_points: usize,
    /// Detections may stick out of the reference bounds by this much before a warning.
    #[serde(default = "default_bounds_margin")]
    pub bounds_margin: f64,
}

impl Default for LocalizationSettings {
    fn default() -> Self {
        Self {
            priors: FurniturePriors::default(),
            furniture: FurnitureSettings::default(),
            merge: MergeSettings::default(),
            icp: default_icp(),
            depth_cloud: PointCloudSettings::alignment(),
            min_alignment_points: default_min_alignment_points(),
            reference_max_points: default_reference_max_points(),
            bounds_margin: default_bounds_margin(),
        }
    }
}

fn default_icp() -> IcpSettings {
    IcpSettings::default().max_iterations(100)
}

fn default_min_alignment_points() -> usize {
    100
}

fn default_reference_max_points() -> usize {
    500_000
}

fn default_bounds_margin() -> f64 {
    0.3
}
