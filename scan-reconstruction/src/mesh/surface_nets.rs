//! Surface nets over a sparse [`TsdfVolume`].
//!
//! Each cell whose eight corners are all observed and straddle the surface gets one vertex,
//! placed at the average of the zero crossings on its edges. Each grid edge crossing the
//! surface is shared by four cells and yields one quad between their vertices.

use super::tsdf::{TsdfVolume, TsdfVoxel, VoxelKey};
use super::TriangleMesh;
use scan_core::nalgebra::{Point3, Vector3};
use std::collections::HashMap;

const CORNERS: [[i32; 3]; 8] = [
    [0, 0, 0],
    [1, 0, 0],
    [0, 1, 0],
    [1, 1, 0],
    [0, 0, 1],
    [1, 0, 1],
    [0, 1, 1],
    [1, 1, 1],
];

/// Pairs of indices into [`CORNERS`].
const EDGES: [(usize, usize); 12] = [
    (0, 1),
    (2, 3),
    (4, 5),
    (6, 7),
    (0, 2),
    (1, 3),
    (4, 6),
    (5, 7),
    (0, 4),
    (1, 5),
    (2, 6),
    (3, 7),
];

fn offset(key: &VoxelKey, delta: [i32; 3]) -> VoxelKey {
    [key[0] + delta[0], key[1] + delta[1], key[2] + delta[2]]
}

fn unit(axis: usize) -> [i32; 3] {
    let mut e = [0; 3];
    e[axis] = 1;
    e
}

fn negate(v: [i32; 3]) -> [i32; 3] {
    v.map(|c| -c)
}

fn inside(voxel: &TsdfVoxel) -> bool {
    voxel.tsdf < 0.0
}

/// Extracts the zero level set of the volume in world coordinates.
pub fn extract(volume: &TsdfVolume) -> TriangleMesh {
    let observed = |key: &VoxelKey| volume.get(key).filter(|v| v.weight > 0.0);

    let mut cells: Vec<VoxelKey> = volume
        .iter()
        .flat_map(|(key, _)| CORNERS.iter().map(move |&c| offset(key, negate(c))))
        .collect();
    cells.sort_unstable();
    cells.dedup();

    let mut mesh = TriangleMesh::new();
    let mut cell_vertices: HashMap<VoxelKey, u32> = HashMap::new();
    for cell in cells {
        let mut corners = [None; 8];
        for (slot, c) in corners.iter_mut().zip(CORNERS.iter()) {
            *slot = observed(&offset(&cell, *c));
        }
        let corners: Option<Vec<&TsdfVoxel>> = corners.into_iter().collect();
        let corners = match corners {
            Some(corners) => corners,
            None => continue,
        };

        let mut position = Vector3::zeros();
        let mut color = [0.0f32; 3];
        let mut crossings = 0;
        for &(a, b) in &EDGES {
            let (va, vb) = (corners[a], corners[b]);
            if inside(va) == inside(vb) {
                continue;
            }
            let t = (va.tsdf / (va.tsdf - vb.tsdf)) as f64;
            let pa = Vector3::from(CORNERS[a].map(f64::from));
            let pb = Vector3::from(CORNERS[b].map(f64::from));
            position += pa + (pb - pa) * t;
            for c in 0..3 {
                color[c] += va.color[c] + (vb.color[c] - va.color[c]) * t as f32;
            }
            crossings += 1;
        }
        if crossings == 0 {
            continue;
        }
        let n = crossings as f64;
        let local = position / n;
        let world = Point3::new(
            (cell[0] as f64 + local.x) * volume.voxel_length(),
            (cell[1] as f64 + local.y) * volume.voxel_length(),
            (cell[2] as f64 + local.z) * volume.voxel_length(),
        );
        let color = color.map(|c| (c / n as f32).round().clamp(0.0, 255.0) as u8);
        cell_vertices.insert(cell, mesh.push_vertex(world, color));
    }

    let mut keys: Vec<&VoxelKey> = volume.iter().map(|(k, _)| k).collect();
    keys.sort_unstable();
    for key in keys {
        let here = match observed(key) {
            Some(v) => v,
            None => continue,
        };
        for axis in 0..3 {
            let there = match observed(&offset(key, unit(axis))) {
                Some(v) => v,
                None => continue,
            };
            if inside(here) == inside(there) {
                continue;
            }
            let (b, c) = ((axis + 1) % 3, (axis + 2) % 3);
            let quad = [
                *key,
                offset(key, negate(unit(b))),
                offset(&offset(key, negate(unit(b))), negate(unit(c))),
                offset(key, negate(unit(c))),
            ];
            let quad: Option<Vec<u32>> =
                quad.iter().map(|k| cell_vertices.get(k).copied()).collect();
            let mut quad = match quad {
                Some(quad) => quad,
                None => continue,
            };
            // The winding above faces +axis, which is outward when `here` is inside.
            if !inside(here) {
                quad.reverse();
            }
            mesh.triangles.push([quad[0], quad[1], quad[2]]);
            mesh.triangles.push([quad[0], quad[2], quad[3]]);
        }
    }
    mesh
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sphere_is_closed_and_outward_facing() {
        let voxel: f64 = 0.1;
        let radius: f64 = 0.45;
        let mut volume = TsdfVolume::new(voxel, 0.3, 64.0);
        let mut samples = vec![];
        for x in -8..=8 {
            for y in -8..=8 {
                for z in -8..=8 {
                    let key = [x, y, z];
                    let sdf = volume.position(&key).coords.norm() - radius;
                    samples.push((key, (sdf / 0.3).clamp(-1.0, 1.0) as f32));
                }
            }
        }
        for (key, tsdf) in samples {
            volume.insert(
                key,
                TsdfVoxel {
                    tsdf,
                    weight: 1.0,
                    color: [200.0, 100.0, 50.0],
                },
            );
        }

        let mesh = extract(&volume);
        assert!(!mesh.is_empty());
        assert_eq!(mesh.colors[0], [200, 100, 50]);
        for v in &mesh.vertices {
            let r = v.coords.norm();
            assert!((r - radius).abs() < voxel, "vertex at radius {}", r);
        }
        // Outward winding gives a positive enclosed volume.
        let enclosed: f64 = mesh
            .triangles
            .iter()
            .map(|t| {
                let [a, b, c] = t.map(|i| mesh.vertices[i as usize].coords);
                a.dot(&b.cross(&c)) / 6.0
            })
            .sum();
        let sphere = 4.0 / 3.0 * std::f64::consts::PI * radius.powi(3);
        assert!((enclosed - sphere).abs() < 0.25 * sphere, "volume {}", enclosed);
    }
}
