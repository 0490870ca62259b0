use nalgebra::Point3;
use rstar::primitives::PointWithData;
use rstar::RTree;

type IndexedPoint = PointWithData<usize, [f64; 3]>;

/// Nearest-neighbour queries over a fixed set of points.
pub struct PointIndex {
    tree: RTree<IndexedPoint>,
}

impl PointIndex {
    pub fn new(points: &[Point3<f64>]) -> Self {
        let points = points
            .iter()
            .enumerate()
            .map(|(ix, p)| IndexedPoint::new(ix, [p.x, p.y, p.z]))
            .collect();
        Self {
            tree: RTree::bulk_load(points),
        }
    }

    pub fn len(&self) -> usize {
        self.tree.size()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The index of the closest point and its squared distance.
    pub fn nearest(&self, point: &Point3<f64>) -> Option<(usize, f64)> {
        let query = [point.x, point.y, point.z];
        self.tree
            .nearest_neighbor(&query)
            .map(|found| (found.data, squared_distance(found.position(), &query)))
    }

    /// Up to `max_neighbors` closest points within `radius`, closest first.
    pub fn neighbors(&self, point: &Point3<f64>, radius: f64, max_neighbors: usize) -> Vec<usize> {
        let query = [point.x, point.y, point.z];
        let radius_2 = radius * radius;
        self.tree
            .nearest_neighbor_iter(&query)
            .take(max_neighbors)
            .take_while(|found| squared_distance(found.position(), &query) <= radius_2)
            .map(|found| found.data)
            .collect()
    }
}

fn squared_distance(a: &[f64; 3], b: &[f64; 3]) -> f64 {
    a.iter().zip(b).map(|(a, b)| (a - b) * (a - b)).sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn neighbors_respect_radius_and_count() {
        let points: Vec<Point3<f64>> = (0..10).map(|i| Point3::new(i as f64, 0.0, 0.0)).collect();
        let index = PointIndex::new(&points);
        assert_eq!(index.len(), 10);
        assert_eq!(index.nearest(&Point3::new(3.2, 0.0, 0.0)).map(|n| n.0), Some(3));
        assert_eq!(index.neighbors(&Point3::new(5.0, 0.0, 0.0), 1.5, 30).len(), 3);
        assert_eq!(index.neighbors(&Point3::new(5.0, 0.0, 0.0), 100.0, 4).len(), 4);
        assert_eq!(index.neighbors(&Point3::new(5.0, 0.0, 0.0), 100.0, 1), vec![5]);
    }
}
