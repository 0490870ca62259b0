use scan_depth::DepthCompletionSettings;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// How pixels are turned into world points.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PointCloudSettings {
    /// Pixels with confidence below this percentile (`0..=100`) of the job's confidences
    /// are dropped. `0` disables the filter.
    #[serde(default = "default_confidence_percentile")]
    pub confidence_percentile: f64,
    /// Only every `pixel_stride`-th row and column is unprojected.
    #[serde(default = "default_pixel_stride")]
    pub pixel_stride: usize,
    /// Depths must be strictly greater than this.
    #[serde(default)]
    pub min_depth: f32,
    /// Depths must be strictly less than this, when set.
    #[serde(default)]
    pub max_depth: Option<f32>,
    /// Random cap applied to each view before fusion.
    #[serde(default)]
    pub max_points_per_view: Option<usize>,
    /// Random cap applied to the fused cloud.
    #[serde(default = "default_max_points")]
    pub max_points: Option<usize>,
    /// Negate Y and Z to go from the camera convention to the asset convention.
    #[serde(default = "default_flip_yz")]
    pub flip_yz: bool,
    /// Seed of the subsampling generator.
    #[serde(default = "default_seed")]
    pub seed: u64,
}

impl Default for PointCloudSettings {
    fn default() -> Self {
        Self {
            confidence_percentile: default_confidence_percentile(),
            pixel_stride: default_pixel_stride(),
            min_depth: 0.0,
            max_depth: None,
            max_points_per_view: None,
            max_points: default_max_points(),
            flip_yz: default_flip_yz(),
            seed: default_seed(),
        }
    }
}

impl PointCloudSettings {
    /// A sparse, unflipped cloud meant for registration against a reference cloud.
    pub fn alignment() -> Self {
        Self {
            confidence_percentile: 0.0,
            pixel_stride: 8,
            min_depth: 0.01,
            max_depth: Some(100.0),
            max_points_per_view: Some(5000),
            max_points: None,
            flip_yz: false,
            seed: default_seed(),
        }
    }
}

fn default_confidence_percentile() -> f64 {
    30.0
}

fn default_pixel_stride() -> usize {
    1
}

fn default_max_points() -> Option<usize> {
    Some(1_000_000)
}

fn default_flip_yz() -> bool {
    true
}

fn default_seed() -> u64 {
    5
}

/// One level of detail.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LodTier {
    pub name: String,
    pub max_points: usize,
}

impl LodTier {
    pub fn new(name: impl Into<String>, max_points: usize) -> Self {
        Self {
            name: name.into(),
            max_points,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LodSettings {
    /// Tiers ordered from the smallest budget to the largest.
    #[serde(default = "default_tiers")]
    pub tiers: Vec<LodTier>,
    /// Asset files are named `{file_stem}_{tier}.glb`.
    #[serde(default = "default_file_stem")]
    pub file_stem: String,
    /// Extra downsampling passes with a coarser grid when a tier overshoots its budget.
    #[serde(default = "default_voxel_refinements")]
    pub voxel_refinements: usize,
    /// Relative overshoot tolerated before refining.
    #[serde(default = "default_overshoot_tolerance")]
    pub overshoot_tolerance: f64,
    /// Factor applied to the voxel edge on each refinement.
    #[serde(default = "default_voxel_growth")]
    pub voxel_growth: f64,
}

impl Default for LodSettings {
    fn default() -> Self {
        Self {
            tiers: default_tiers(),
            file_stem: default_file_stem(),
            voxel_refinements: default_voxel_refinements(),
            overshoot_tolerance: default_overshoot_tolerance(),
            voxel_growth: default_voxel_growth(),
        }
    }
}

fn default_tiers() -> Vec<LodTier> {
    vec![
        LodTier::new("preview", 50_000),
        LodTier::new("medium", 250_000),
        LodTier::new("full", 1_000_000),
    ]
}

fn default_file_stem() -> String {
    "scene".to_string()
}

fn default_voxel_refinements() -> usize {
    2
}

fn default_overshoot_tolerance() -> f64 {
    0.1
}

fn default_voxel_growth() -> f64 {
    1.25
}

/// Best-effort post-processing with an external glTF optimizer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompressionSettings {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_compressor_program")]
    pub program: PathBuf,
    #[serde(default = "default_compressor_args")]
    pub args: Vec<String>,
}

impl Default for CompressionSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            program: default_compressor_program(),
            args: default_compressor_args(),
        }
    }
}

fn default_compressor_program() -> PathBuf {
    PathBuf::from("gltfpack")
}

fn default_compressor_args() -> Vec<String> {
    vec!["-cc".to_string()]
}

/// Volumetric fusion used by the mesh fallback.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TsdfSettings {
    /// Voxel edge as a fraction of the first view's median depth.
    #[serde(default = "default_voxel_depth_ratio")]
    pub voxel_depth_ratio: f64,
    /// The voxel is never finer than this many pixel footprints at the median depth.
    #[serde(default = "default_min_pixel_footprints")]
    pub min_pixel_footprints: f64,
    #[serde(default = "default_min_voxel_length")]
    pub min_voxel_length: f64,
    #[serde(default = "default_max_voxel_length")]
    pub max_voxel_length: f64,
    /// Truncation distance in voxels.
    #[serde(default = "default_truncation_voxels")]
    pub truncation_voxels: f64,
    /// Depths beyond the first view's 95th percentile times this are ignored.
    #[serde(default = "default_depth_limit_factor")]
    pub depth_limit_factor: f64,
    #[serde(default = "default_max_weight")]
    pub max_weight: f32,
    /// Meshes with more triangles are simplified down to this count.
    #[serde(default = "default_target_triangles")]
    pub target_triangles: usize,
}

impl Default for TsdfSettings {
    fn default() -> Self {
        Self {
            voxel_depth_ratio: default_voxel_depth_ratio(),
            min_pixel_footprints: default_min_pixel_footprints(),
            min_voxel_length: default_min_voxel_length(),
            max_voxel_length: default_max_voxel_length(),
            truncation_voxels: default_truncation_voxels(),
            depth_limit_factor: default_depth_limit_factor(),
            max_weight: default_max_weight(),
            target_triangles: default_target_triangles(),
        }
    }
}

fn default_voxel_depth_ratio() -> f64 {
    0.005
}

fn default_min_pixel_footprints() -> f64 {
    1.5
}

fn default_min_voxel_length() -> f64 {
    0.004
}

fn default_max_voxel_length() -> f64 {
    0.05
}

fn default_truncation_voxels() -> f64 {
    4.0
}

fn default_depth_limit_factor() -> f64 {
    1.2
}

fn default_max_weight() -> f32 {
    64.0
}

fn default_target_triangles() -> usize {
    300_000
}

/// The settings for a reconstruction job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReconstructionSettings {
    /// Fill depth holes before building the cloud.
    #[serde(default)]
    pub complete_depth: bool,
    #[serde(default)]
    pub depth_completion: DepthCompletionSettings,
    #[serde(default)]
    pub point_cloud: PointCloudSettings,
    #[serde(default)]
    pub lod: LodSettings,
    #[serde(default)]
    pub compression: CompressionSettings,
    #[serde(default)]
    pub mesh: TsdfSettings,
    /// Asset urls are `{asset_url_prefix}/{job_id}/{filename}`.
    #[serde(default = "default_asset_url_prefix")]
    pub asset_url_prefix: String,
    /// Longest side of the thumbnail, `0` to skip it.
    #[serde(default = "default_thumbnail_size")]
    pub thumbnail_size: u32,
}

impl Default for ReconstructionSettings {
    fn default() -> Self {
        Self {
            complete_depth: false,
            depth_completion: DepthCompletionSettings::default(),
            point_cloud: PointCloudSettings::default(),
            lod: LodSettings::default(),
            compression: CompressionSettings::default(),
            mesh: TsdfSettings::default(),
            asset_url_prefix: default_asset_url_prefix(),
            thumbnail_size: default_thumbnail_size(),
        }
    }
}

fn default_asset_url_prefix() -> String {
    "/api/assets".to_string()
}

fn default_thumbnail_size() -> u32 {
    512
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_json_keeps_defaults() {
        let settings: ReconstructionSettings =
            serde_json::from_str(r#"{"lod": {"file_stem": "room"}, "complete_depth": true}"#)
                .unwrap();
        assert!(settings.complete_depth);
        assert_eq!(settings.lod.file_stem, "room");
        assert_eq!(settings.lod.tiers, default_tiers());
        assert_eq!(settings.point_cloud, PointCloudSettings::default());
    }
}
