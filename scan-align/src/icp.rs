use crate::{estimate_normals, IcpSettings, PointIndex};
use log::*;
use nalgebra::{Matrix6, Point3, Rotation3, Vector3, Vector6};
use rayon::prelude::*;
use scan_core::{AlignmentTransform, PointCloud};

/// Registers a source cloud onto a target cloud with a uniform scale, a rotation and a
/// translation.
#[derive(Debug, Clone, Default)]
pub struct IcpAligner {
    settings: IcpSettings,
}

/// A source point matched to its nearest target point.
struct Correspondence {
    source: Point3<f64>,
    target: usize,
    distance_2: f64,
}

impl IcpAligner {
    pub fn new(settings: IcpSettings) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &IcpSettings {
        &self.settings
    }

    /// Estimates the transform taking `source` onto `target`.
    ///
    /// Never fails. With fewer than `min_points` points in either cloud the identity with
    /// zero fitness is returned.
    ///
    /// Normals are estimated on `target` only. The point-to-plane residual never reads
    /// source normals.
    pub fn align(&self, source: &PointCloud, target: &PointCloud) -> AlignmentTransform {
        if source.len() < self.settings.min_points || target.len() < self.settings.min_points {
            warn!(
                "not enough points to align ({} source, {} target, need {})",
                source.len(),
                target.len(),
                self.settings.min_points
            );
            return AlignmentTransform::identity();
        }
        let (source_centroid, target_centroid) = match (source.centroid(), target.centroid()) {
            (Some(s), Some(t)) => (s, t),
            _ => return AlignmentTransform::identity(),
        };

        let scale = if self.settings.estimate_scale {
            self.estimate_scale(source, target)
        } else {
            1.0
        };
        let mut rotation = Rotation3::identity();
        let mut translation = target_centroid.coords - source_centroid.coords * scale;
        info!(
            "initial alignment: scale {:.4}, translation {:?}",
            scale,
            translation.as_slice()
        );

        let index = PointIndex::new(&target.points);
        let normals = estimate_normals(&target.points, &index, &self.settings.normals);
        let scaled: Vec<Point3<f64>> = source.points.iter().map(|p| p * scale).collect();

        for iteration in 0..self.settings.max_iterations {
            let correspondences = self.correspondences(&scaled, &index, &rotation, &translation);
            let update = match point_to_plane_step(&correspondences, &target.points, &normals) {
                Some(update) => update,
                None => {
                    debug!("icp system is singular at iteration {}", iteration);
                    break;
                }
            };
            let omega = Vector3::new(update[0], update[1], update[2]);
            let delta = Vector3::new(update[3], update[4], update[5]);
            let step = Rotation3::from_scaled_axis(omega);
            rotation = step * rotation;
            translation = step * translation + delta;
            debug!(
                "icp iteration {}: {} correspondences, update {:e}",
                iteration,
                correspondences.len(),
                update.norm()
            );
            if update.norm() < self.settings.convergence_epsilon {
                break;
            }
        }

        let correspondences = self.correspondences(&scaled, &index, &rotation, &translation);
        let fitness = correspondences.len() as f64 / source.len() as f64;
        let inlier_rmse = if correspondences.is_empty() {
            0.0
        } else {
            (correspondences.iter().map(|c| c.distance_2).sum::<f64>()
                / correspondences.len() as f64)
                .sqrt()
        };
        if fitness < self.settings.low_fitness {
            warn!(
                "low icp fitness {:.3} (rmse {:.4}), alignment is unreliable",
                fitness, inlier_rmse
            );
        } else {
            info!("icp fitness {:.3}, rmse {:.4}", fitness, inlier_rmse);
        }
        AlignmentTransform {
            rotation,
            translation,
            scale,
            fitness,
            inlier_rmse,
        }
    }

    /// Median of the per-axis extent ratios, clamped to the configured range.
    pub fn estimate_scale(&self, source: &PointCloud, target: &PointCloud) -> f64 {
        let (source_bounds, target_bounds) = match (source.bounds(), target.bounds()) {
            (Some(s), Some(t)) => (s, t),
            _ => return 1.0,
        };
        let source_extents = source_bounds.extents();
        let target_extents = target_bounds.extents();
        let mut ratios: Vec<f64> = (0..3)
            .filter(|&d| source_extents[d] > self.settings.min_extent)
            .map(|d| target_extents[d] / source_extents[d])
            .collect();
        let scale = match scan_core::stats::median(&mut ratios) {
            Some(scale) => scale,
            None => {
                warn!("source cloud is flat on every axis, keeping unit scale");
                return 1.0;
            }
        };
        let clamped = scale.clamp(self.settings.min_scale, self.settings.max_scale);
        if clamped != scale {
            warn!("scale estimate {:.4} clamped to {:.4}", scale, clamped);
        }
        clamped
    }

    fn correspondences(
        &self,
        scaled: &[Point3<f64>],
        index: &PointIndex,
        rotation: &Rotation3<f64>,
        translation: &Vector3<f64>,
    ) -> Vec<Correspondence> {
        let max_2 = self.settings.max_correspondence_distance.powi(2);
        scaled
            .par_iter()
            .filter_map(|p| {
                let source = rotation * p + translation;
                let (target, distance_2) = index.nearest(&source)?;
                (distance_2 <= max_2).then(|| Correspondence {
                    source,
                    target,
                    distance_2,
                })
            })
            .collect()
    }
}

/// Solves the linearized point-to-plane problem for a small rotation `[omega]` and
/// translation `[delta]`, stacked as one vector.
///
/// Correspondences whose target has no normal do not constrain the step.
fn point_to_plane_step(
    correspondences: &[Correspondence],
    targets: &[Point3<f64>],
    normals: &[Vector3<f64>],
) -> Option<Vector6<f64>> {
    let mut ata = Matrix6::zeros();
    let mut atb = Vector6::zeros();
    let mut constraints = 0usize;
    for c in correspondences {
        let n = normals[c.target];
        if n.norm_squared() == 0.0 {
            continue;
        }
        let cross = c.source.coords.cross(&n);
        let row = Vector6::new(cross.x, cross.y, cross.z, n.x, n.y, n.z);
        let residual = (targets[c.target] - c.source).dot(&n);
        ata += row * row.transpose();
        atb += row * residual;
        constraints += 1;
    }
    if constraints < 6 {
        return None;
    }
    match ata.cholesky() {
        Some(cholesky) => Some(cholesky.solve(&atb)),
        None => ata.lu().solve(&atb),
    }
}
