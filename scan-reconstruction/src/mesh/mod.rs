//! Triangle mesh fallback.
//!
//! When the point path yields nothing usable, the depth maps are fused into a sparse
//! truncated signed distance volume, a surface is pulled out of it with surface nets,
//! the result is cleaned and, if it is very dense, simplified with quadric edge collapse.

pub mod cleanup;
pub mod decimate;
pub mod surface_nets;
pub mod tsdf;

use crate::TsdfSettings;
use log::*;
use scan_core::nalgebra::{Point3, Vector3};
use scan_core::{flip_yz, stats, Aabb, ReconstructionError, Result, ViewPrediction};
use serde::{Deserialize, Serialize};
use tsdf::TsdfVolume;

/// An indexed triangle mesh with per-vertex normals and colors.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TriangleMesh {
    pub vertices: Vec<Point3<f64>>,
    /// Either empty or parallel to `vertices`.
    pub normals: Vec<Vector3<f64>>,
    /// Parallel to `vertices`.
    pub colors: Vec<[u8; 3]>,
    /// Counter-clockwise when seen from outside.
    pub triangles: Vec<[u32; 3]>,
}

impl TriangleMesh {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn vertex_count(&self) -> usize {
        self.vertices.len()
    }

    pub fn triangle_count(&self) -> usize {
        self.triangles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.triangles.is_empty()
    }

    pub fn bounds(&self) -> Option<Aabb> {
        Aabb::from_points(&self.vertices)
    }

    pub fn push_vertex(&mut self, vertex: Point3<f64>, color: [u8; 3]) -> u32 {
        self.vertices.push(vertex);
        self.colors.push(color);
        (self.vertices.len() - 1) as u32
    }

    /// Twice the area of the triangle, as a vector along its normal.
    pub fn triangle_normal(&self, triangle: &[u32; 3]) -> Vector3<f64> {
        let [a, b, c] = triangle.map(|i| self.vertices[i as usize]);
        (b - a).cross(&(c - a))
    }

    pub fn triangle_area(&self, triangle: &[u32; 3]) -> f64 {
        0.5 * self.triangle_normal(triangle).norm()
    }

    /// Recomputes vertex normals as the area-weighted average of the incident faces.
    pub fn compute_vertex_normals(&mut self) {
        let mut normals = vec![Vector3::zeros(); self.vertices.len()];
        for triangle in &self.triangles {
            let n = self.triangle_normal(triangle);
            for &i in triangle {
                normals[i as usize] += n;
            }
        }
        for n in &mut normals {
            *n = n.try_normalize(1e-12).unwrap_or_else(Vector3::zeros);
        }
        self.normals = normals;
    }

    /// Moves every vertex through `f`. Normals are dropped.
    pub fn map_vertices(&mut self, f: impl Fn(Point3<f64>) -> Point3<f64>) {
        for v in &mut self.vertices {
            *v = f(*v);
        }
        self.normals.clear();
    }
}

/// Fuses the depth maps of a prediction into a mesh.
#[derive(Debug, Clone, Default)]
pub struct MeshFallbackReconstructor {
    settings: TsdfSettings,
}

impl MeshFallbackReconstructor {
    pub fn new(settings: TsdfSettings) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &TsdfSettings {
        &self.settings
    }

    /// Builds a cleaned, Y-up mesh with vertex normals.
    ///
    /// The voxel size, truncation and depth limit come from the first view with valid
    /// depth. Fails with [`ReconstructionError::DegenerateGeometry`] when there is no
    /// valid depth or no surface.
    pub fn reconstruct(&self, prediction: &ViewPrediction) -> Result<TriangleMesh> {
        let views = prediction.views()?;
        let (median, p95, focal) = views
            .iter()
            .find_map(|view| {
                let mut depths: Vec<f64> = view
                    .depth
                    .iter()
                    .filter(|d| d.is_finite() && **d > 0.0)
                    .map(|&d| d as f64)
                    .collect();
                let median = stats::percentile(&mut depths, 50.0)?;
                let p95 = stats::percentile(&mut depths, 95.0)?;
                Some((median, p95, view.intrinsics.focals.x))
            })
            .ok_or_else(|| {
                ReconstructionError::DegenerateGeometry("no view has valid depth".to_string())
            })?;

        let s = &self.settings;
        let footprint = if focal > 0.0 {
            s.min_pixel_footprints / focal
        } else {
            0.0
        };
        let voxel = (median * s.voxel_depth_ratio.max(footprint))
            .clamp(s.min_voxel_length, s.max_voxel_length);
        let truncation = s.truncation_voxels * voxel;
        let depth_limit = (p95 * s.depth_limit_factor) as f32;
        info!(
            "fusing {} views with voxel {:.4}, truncation {:.4}, depth limit {:.2}",
            views.len(),
            voxel,
            truncation,
            depth_limit
        );

        let mut volume = TsdfVolume::new(voxel, truncation, s.max_weight);
        for view in &views {
            volume.integrate(view, depth_limit)?;
        }
        debug!("volume holds {} voxels", volume.len());

        let mut mesh = surface_nets::extract(&volume);
        if mesh.is_empty() {
            return Err(ReconstructionError::DegenerateGeometry(
                "fused volume contains no surface".to_string(),
            ));
        }
        mesh.map_vertices(flip_yz);
        cleanup::clean(&mut mesh);
        if mesh.triangle_count() > s.target_triangles {
            let before = mesh.triangle_count();
            mesh = decimate::decimate(&mesh, s.target_triangles);
            cleanup::clean(&mut mesh);
            info!(
                "simplified mesh from {} to {} triangles",
                before,
                mesh.triangle_count()
            );
        }
        if mesh.is_empty() {
            return Err(ReconstructionError::DegenerateGeometry(
                "mesh is empty after cleanup".to_string(),
            ));
        }
        mesh.compute_vertex_normals();
        info!(
            "reconstructed mesh with {} vertices and {} triangles",
            mesh.vertex_count(),
            mesh.triangle_count()
        );
        Ok(mesh)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn normals_are_area_weighted() {
        let mut mesh = TriangleMesh::new();
        for p in [
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(1.0, 0.0, 0.0),
            Point3::new(0.0, 1.0, 0.0),
        ] {
            mesh.push_vertex(p, [0, 0, 0]);
        }
        mesh.triangles.push([0, 1, 2]);
        mesh.compute_vertex_normals();
        assert_relative_eq!(mesh.triangle_area(&[0, 1, 2]), 0.5);
        for n in &mesh.normals {
            assert_relative_eq!(*n, Vector3::z());
        }
    }
}
