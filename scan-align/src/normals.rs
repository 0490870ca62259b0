use crate::{NormalSettings, PointIndex};
use nalgebra::{Matrix3, Point3, SymmetricEigen, Vector3};
use rayon::prelude::*;

/// Fits a plane to the neighbourhood of every point and returns its unit normal.
///
/// Points with fewer than three neighbours get a zero normal. Normals are not
/// consistently oriented, which point-to-plane residuals do not need.
pub fn estimate_normals(
    points: &[Point3<f64>],
    index: &PointIndex,
    settings: &NormalSettings,
) -> Vec<Vector3<f64>> {
    points
        .par_iter()
        .map(|p| {
            let neighbors = index.neighbors(p, settings.radius, settings.max_neighbors);
            if neighbors.len() < 3 {
                return Vector3::zeros();
            }
            let centroid = neighbors
                .iter()
                .map(|&ix| points[ix].coords)
                .sum::<Vector3<f64>>()
                / neighbors.len() as f64;
            let covariance = neighbors
                .iter()
                .map(|&ix| {
                    let d = points[ix].coords - centroid;
                    d * d.transpose()
                })
                .sum::<Matrix3<f64>>();
            let eigen = SymmetricEigen::new(covariance);
            let smallest = eigen.eigenvalues.imin();
            eigen.eigenvectors.column(smallest).normalize()
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn plane_normals_are_perpendicular() {
        let points: Vec<Point3<f64>> = (0..20)
            .flat_map(|x| (0..20).map(move |z| Point3::new(x as f64 * 0.1, 1.0, z as f64 * 0.1)))
            .collect();
        let index = PointIndex::new(&points);
        let normals = estimate_normals(&points, &index, &NormalSettings::default());
        for n in normals {
            assert_relative_eq!(n.y.abs(), 1.0, epsilon = 1e-9);
        }
    }

    #[test]
    fn isolated_points_have_no_normal() {
        let points = vec![Point3::origin(), Point3::new(10.0, 0.0, 0.0)];
        let index = PointIndex::new(&points);
        let normals = estimate_normals(&points, &index, &NormalSettings::default());
        assert!(normals.iter().all(|n| n.norm() == 0.0));
    }
}
