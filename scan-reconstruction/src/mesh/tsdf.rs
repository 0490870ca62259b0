use rayon::prelude::*;
use scan_core::nalgebra::Point3;
use scan_core::{Result, View};
use std::collections::{HashMap, HashSet};

/// Grid coordinates of a voxel. Voxel `i` sits at world position `i * voxel_length`.
pub type VoxelKey = [i32; 3];

/// One observed voxel.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TsdfVoxel {
    /// Signed distance over the truncation, in `-1..=1`, positive in front of surfaces.
    pub tsdf: f32,
    pub weight: f32,
    pub color: [f32; 3],
}

/// A sparse truncated signed distance volume.
///
/// Only voxels within the truncation band of some depth sample are stored.
#[derive(Debug, Clone)]
pub struct TsdfVolume {
    voxel_length: f64,
    truncation: f64,
    max_weight: f32,
    voxels: HashMap<VoxelKey, TsdfVoxel>,
}

impl TsdfVolume {
    pub fn new(voxel_length: f64, truncation: f64, max_weight: f32) -> Self {
        Self {
            voxel_length,
            truncation,
            max_weight,
            voxels: HashMap::new(),
        }
    }

    pub fn voxel_length(&self) -> f64 {
        self.voxel_length
    }

    pub fn len(&self) -> usize {
        self.voxels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.voxels.is_empty()
    }

    pub fn get(&self, key: &VoxelKey) -> Option<&TsdfVoxel> {
        self.voxels.get(key)
    }

    /// Overwrites one voxel.
    pub fn insert(&mut self, key: VoxelKey, voxel: TsdfVoxel) {
        self.voxels.insert(key, voxel);
    }

    pub fn iter(&self) -> impl Iterator<Item = (&VoxelKey, &TsdfVoxel)> + '_ {
        self.voxels.iter()
    }

    pub fn position(&self, key: &VoxelKey) -> Point3<f64> {
        Point3::new(key[0] as f64, key[1] as f64, key[2] as f64) * self.voxel_length
    }

    fn key_of(&self, point: &Point3<f64>) -> VoxelKey {
        let p = point / self.voxel_length;
        [
            p.x.round() as i32,
            p.y.round() as i32,
            p.z.round() as i32,
        ]
    }

    /// Fuses one depth map into the volume. Depths at or beyond `depth_limit` are ignored.
    pub fn integrate(&mut self, view: &View<'_>, depth_limit: f32) -> Result<()> {
        let camera_to_world = view.world_to_camera.inverse()?;
        let valid = |d: f32| d.is_finite() && d > 0.0 && d < depth_limit;

        // Every voxel near a ray's surface crossing is a candidate for this frame.
        let step = 0.5 * self.voxel_length;
        let mut candidates = HashSet::new();
        for ((row, col), &depth) in view.depth.indexed_iter() {
            if !valid(depth) {
                continue;
            }
            let depth = depth as f64;
            let mut z = (depth - self.truncation).max(step);
            while z <= depth + self.truncation {
                let camera = view.intrinsics.unproject(col as f64, row as f64, z);
                candidates.insert(self.key_of(&camera_to_world.transform_point(&camera)));
                z += step;
            }
        }

        let updates: Vec<(VoxelKey, f32, [f32; 3])> = candidates
            .into_par_iter()
            .filter_map(|key| {
                let camera = view.world_to_camera.transform_point(&self.position(&key));
                if camera.z <= 0.0 {
                    return None;
                }
                let pixel = view.intrinsics.project(&camera);
                let (col, row) = (pixel.x.round(), pixel.y.round());
                if col < 0.0
                    || row < 0.0
                    || col >= view.width() as f64
                    || row >= view.height() as f64
                {
                    return None;
                }
                let (row, col) = (row as usize, col as usize);
                let depth = view.depth[[row, col]];
                if !valid(depth) {
                    return None;
                }
                let sdf = depth as f64 - camera.z;
                if sdf < -self.truncation {
                    return None;
                }
                let tsdf = (sdf / self.truncation).min(1.0) as f32;
                let color = view
                    .color(row, col)
                    .map(|c| c.map(f32::from))
                    .unwrap_or([128.0; 3]);
                Some((key, tsdf, color))
            })
            .collect();

        for (key, tsdf, color) in updates {
            let voxel = self.voxels.entry(key).or_insert(TsdfVoxel {
                tsdf: 0.0,
                weight: 0.0,
                color: [0.0; 3],
            });
            let w = voxel.weight;
            voxel.tsdf = (voxel.tsdf * w + tsdf) / (w + 1.0);
            for c in 0..3 {
                voxel.color[c] = (voxel.color[c] * w + color[c]) / (w + 1.0);
            }
            voxel.weight = (w + 1.0).min(self.max_weight);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array3;
    use scan_core::ViewPrediction;

    #[test]
    fn voxels_change_sign_across_the_surface() {
        let mut intrinsics = Array3::zeros((1, 3, 3));
        intrinsics[[0, 0, 0]] = 20.0;
        intrinsics[[0, 1, 1]] = 20.0;
        intrinsics[[0, 0, 2]] = 10.0;
        intrinsics[[0, 1, 2]] = 10.0;
        intrinsics[[0, 2, 2]] = 1.0;
        let mut extrinsics = Array3::zeros((1, 4, 4));
        for d in 0..4 {
            extrinsics[[0, d, d]] = 1.0;
        }
        let prediction =
            ViewPrediction::new(Array3::from_elem((1, 20, 20), 1.0), intrinsics, extrinsics);
        let view = prediction.view(0).unwrap();

        let mut volume = TsdfVolume::new(0.05, 0.2, 64.0);
        volume.integrate(&view, 10.0).unwrap();
        let front = volume.get(&[0, 0, 18]).unwrap();
        let behind = volume.get(&[0, 0, 22]).unwrap();
        assert!(front.tsdf > 0.0);
        assert!(behind.tsdf < 0.0);
        assert!(volume.get(&[0, 0, 10]).is_none());
    }
}
