use crate::compress::{compress_in_place, AssetCompressor};
use crate::export::{write_file, write_points_glb};
use crate::voxel::{voxel_downsample, voxel_size_for_target};
use crate::{LodSettings, LodTier};
use log::*;
use scan_core::{LodAsset, PointCloud, Result};
use std::path::Path;
use std::sync::Arc;

/// The outcome of exporting every tier. A tier that failed is listed in `failures`.
#[derive(Debug, Default)]
pub struct LodReport {
    /// Smallest budget first.
    pub assets: Vec<LodAsset>,
    /// Tier name and error message.
    pub failures: Vec<(String, String)>,
}

/// Writes a point cloud as a set of binary glTF files with increasing point budgets.
pub struct LodExporter {
    settings: LodSettings,
    compressor: Option<Arc<dyn AssetCompressor + Send + Sync>>,
}

impl LodExporter {
    pub fn new(settings: LodSettings) -> Self {
        Self {
            settings,
            compressor: None,
        }
    }

    /// Post-processes each written file with `compressor`.
    pub fn compressor(self, compressor: Arc<dyn AssetCompressor + Send + Sync>) -> Self {
        Self {
            compressor: Some(compressor),
            ..self
        }
    }

    pub fn settings(&self) -> &LodSettings {
        &self.settings
    }

    /// Produces one cloud per tier, smallest budget first.
    ///
    /// Tiers are derived from each other, largest first, so a smaller tier never holds
    /// more points than a larger one. A tier whose budget is not exceeded keeps its input
    /// unchanged.
    pub fn downsample_tiers(&self, cloud: &PointCloud) -> Vec<(LodTier, PointCloud)> {
        let mut tiers = self.settings.tiers.clone();
        tiers.sort_by_key(|tier| std::cmp::Reverse(tier.max_points));

        let mut levels = Vec::with_capacity(tiers.len());
        let mut current = cloud.clone();
        for tier in tiers {
            if current.len() > tier.max_points {
                current = self.downsample(&current, tier.max_points);
            }
            info!(
                "lod {} holds {} points for a budget of {}",
                tier.name,
                current.len(),
                tier.max_points
            );
            levels.push((tier, current.clone()));
        }
        levels.reverse();
        levels
    }

    /// Voxel downsampling toward `target` points, refined with coarser grids on overshoot.
    fn downsample(&self, cloud: &PointCloud, target: usize) -> PointCloud {
        let bounds = match cloud.bounds() {
            Some(bounds) => bounds,
            None => return cloud.clone(),
        };
        let limit = (target as f64 * (1.0 + self.settings.overshoot_tolerance)) as usize;
        let mut voxel = voxel_size_for_target(&bounds, target);
        let mut out = voxel_downsample(cloud, voxel);
        for _ in 0..self.settings.voxel_refinements {
            if out.len() <= limit {
                break;
            }
            voxel *= self.settings.voxel_growth;
            debug!(
                "{} points overshoot {}, retrying with voxel {:.4}",
                out.len(),
                target,
                voxel
            );
            out = voxel_downsample(cloud, voxel);
        }
        out
    }

    /// Writes `{file_stem}_{tier}.glb` for one level into `dir`.
    pub fn export_level(
        &self,
        tier: &LodTier,
        cloud: &PointCloud,
        dir: &Path,
        url: &str,
    ) -> Result<LodAsset> {
        let filename = format!("{}_{}.glb", self.settings.file_stem, tier.name);
        let path = dir.join(&filename);
        let mut file_size_bytes = write_file(&path, |w| write_points_glb(cloud, w))?;
        let compressed = match &self.compressor {
            Some(compressor) => compress_in_place(compressor.as_ref(), &path),
            None => false,
        };
        if compressed {
            file_size_bytes = std::fs::metadata(&path)?.len();
        }
        Ok(LodAsset {
            level: tier.name.clone(),
            url: format!("{}/{}", url.trim_end_matches('/'), filename),
            filename,
            path,
            format: "glb".to_string(),
            point_count: cloud.len(),
            file_size_bytes,
            compressed,
        })
    }

    /// Downsamples and writes every tier. One tier failing does not stop the others.
    ///
    /// `url` is the prefix under which files in `dir` are served. `on_level` is called
    /// before each tier with the number of tiers already handled and the total.
    pub fn export(
        &self,
        cloud: &PointCloud,
        dir: &Path,
        url: &str,
        mut on_level: impl FnMut(&LodTier, usize, usize),
    ) -> LodReport {
        let levels = self.downsample_tiers(cloud);
        let total = levels.len();
        let mut report = LodReport::default();
        for (done, (tier, level)) in levels.iter().enumerate() {
            on_level(tier, done, total);
            match self.export_level(tier, level, dir, url) {
                Ok(asset) => {
                    info!(
                        "wrote {} with {} points ({} bytes)",
                        asset.filename, asset.point_count, asset.file_size_bytes
                    );
                    report.assets.push(asset);
                }
                Err(e) => {
                    warn!("lod {} failed: {}", tier.name, e);
                    report.failures.push((tier.name.clone(), e.to_string()));
                }
            }
        }
        report
    }
}

impl Default for LodExporter {
    fn default() -> Self {
        Self::new(LodSettings::default())
    }
}

impl std::fmt::Debug for LodExporter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LodExporter")
            .field("settings", &self.settings)
            .field("compressor", &self.compressor.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{Rng, SeedableRng};
    use rand_pcg::Pcg64;
    use scan_core::nalgebra::Point3;

    fn random_cloud(n: usize) -> PointCloud {
        let mut rng = Pcg64::from_seed([5; 32]);
        PointCloud::from_points(
            (0..n)
                .map(|_| {
                    Point3::new(
                        rng.gen_range(0.0..4.0),
                        rng.gen_range(0.0..3.0),
                        rng.gen_range(0.0..5.0),
                    )
                })
                .collect(),
        )
    }

    fn exporter(budgets: [usize; 3]) -> LodExporter {
        LodExporter::new(LodSettings {
            tiers: vec![
                LodTier::new("preview", budgets[0]),
                LodTier::new("medium", budgets[1]),
                LodTier::new("full", budgets[2]),
            ],
            ..Default::default()
        })
    }

    #[test]
    fn tiers_are_monotonic() {
        let levels = exporter([500, 2000, 8000]).downsample_tiers(&random_cloud(20_000));
        let names: Vec<&str> = levels.iter().map(|(t, _)| t.name.as_str()).collect();
        assert_eq!(names, ["preview", "medium", "full"]);
        let counts: Vec<usize> = levels.iter().map(|(_, c)| c.len()).collect();
        assert!(counts[0] <= counts[1] && counts[1] <= counts[2], "{:?}", counts);
        assert!(counts[2] < 20_000);
        assert!(counts[0] > 0);
    }

    #[test]
    fn small_clouds_are_not_upsampled() {
        let cloud = random_cloud(300);
        let levels = exporter([100, 1000, 5000]).downsample_tiers(&cloud);
        assert_eq!(levels[1].1, cloud);
        assert_eq!(levels[2].1, cloud);
        assert!(levels[0].1.len() <= 300);
    }
}
