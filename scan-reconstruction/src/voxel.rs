use scan_core::nalgebra::{Point3, Vector3};
use scan_core::{Aabb, PointCloud};
use std::collections::HashMap;

/// Extents below this are treated as flat.
const FLAT_EXTENT: f64 = 1e-9;

/// Voxel edge length that spreads `target_points` evenly through `bounds`.
///
/// This is `(volume / target)^(1/3)`. Flat axes are left out, so a planar cloud uses
/// `(area / target)^(1/2)` and a linear one `length / target`.
pub fn voxel_size_for_target(bounds: &Aabb, target_points: usize) -> f64 {
    let target = target_points.max(1) as f64;
    let extents: Vec<f64> = bounds
        .extents()
        .iter()
        .copied()
        .filter(|&e| e > FLAT_EXTENT)
        .collect();
    if extents.is_empty() {
        return 1.0;
    }
    let measure: f64 = extents.iter().product();
    (measure / target).powf(1.0 / extents.len() as f64)
}

#[derive(Default)]
struct Cell {
    position: Vector3<f64>,
    color: [u32; 3],
    count: u32,
    view: Option<u32>,
}

/// Keeps one point per occupied voxel, averaging position and color.
///
/// The grid is anchored at the minimum corner of the cloud's bounds. Output order
/// follows voxel coordinates, so the result is deterministic.
pub fn voxel_downsample(cloud: &PointCloud, voxel: f64) -> PointCloud {
    let bounds = match cloud.bounds() {
        Some(b) if voxel > 0.0 => b,
        _ => return cloud.clone(),
    };
    let origin = bounds.min;
    let mut cells: HashMap<[i64; 3], Cell> = HashMap::new();
    for (i, (point, color)) in cloud.iter().enumerate() {
        let key = voxel_key(point, &origin, voxel);
        let cell = cells.entry(key).or_default();
        cell.position += point.coords;
        for c in 0..3 {
            cell.color[c] += color[c] as u32;
        }
        cell.count += 1;
        if cell.view.is_none() {
            cell.view = cloud.views.as_ref().map(|v| v[i]);
        }
    }

    let mut keys: Vec<[i64; 3]> = cells.keys().copied().collect();
    keys.sort_unstable();
    let mut out = PointCloud::with_capacity(keys.len());
    let mut views = cloud.views.as_ref().map(|_| Vec::with_capacity(keys.len()));
    for key in keys {
        let cell = &cells[&key];
        let n = cell.count as f64;
        out.push(
            Point3::from(cell.position / n),
            [
                (cell.color[0] as f64 / n).round() as u8,
                (cell.color[1] as f64 / n).round() as u8,
                (cell.color[2] as f64 / n).round() as u8,
            ],
        );
        if let (Some(views), Some(view)) = (views.as_mut(), cell.view) {
            views.push(view);
        }
    }
    out.views = views;
    out
}

fn voxel_key(point: &Point3<f64>, origin: &Point3<f64>, voxel: f64) -> [i64; 3] {
    let rel = (point - origin) / voxel;
    [
        rel.x.floor() as i64,
        rel.y.floor() as i64,
        rel.z.floor() as i64,
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn voxel_size_matches_volume() {
        let bounds = Aabb {
            min: Point3::origin(),
            max: Point3::new(2.0, 4.0, 8.0),
        };
        assert_relative_eq!(voxel_size_for_target(&bounds, 8), 2.0, epsilon = 1e-12);

        let flat = Aabb {
            min: Point3::origin(),
            max: Point3::new(3.0, 0.0, 3.0),
        };
        assert_relative_eq!(voxel_size_for_target(&flat, 9), 1.0, epsilon = 1e-12);
    }

    #[test]
    fn averages_points_in_the_same_voxel() {
        let cloud = PointCloud::from_points_and_colors(
            vec![
                Point3::new(0.0, 0.0, 0.0),
                Point3::new(0.2, 0.2, 0.2),
                Point3::new(5.0, 5.0, 5.0),
            ],
            vec![[0, 0, 0], [100, 50, 10], [255, 255, 255]],
        )
        .unwrap();
        let out = voxel_downsample(&cloud, 1.0);
        assert_eq!(out.len(), 2);
        assert_relative_eq!(out.points[0], Point3::new(0.1, 0.1, 0.1));
        assert_eq!(out.colors[0], [50, 25, 5]);
        assert_eq!(out.points[1], Point3::new(5.0, 5.0, 5.0));
    }
}
