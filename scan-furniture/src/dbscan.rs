use log::*;
use rstar::primitives::PointWithData;
use rstar::RTree;

type IndexedPoint = PointWithData<usize, [f64; 2]>;

/// Density-based clustering of planar points.
///
/// A point with at least `min_samples` points (itself included) within `radius` is a
/// core point. Clusters are the points reachable from core points. Everything else is
/// noise.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Dbscan {
    pub radius: f64,
    pub min_samples: usize,
}

impl Dbscan {
    pub fn new(radius: f64, min_samples: usize) -> Self {
        Self {
            radius,
            min_samples,
        }
    }

    /// Returns the cluster of every point, `None` for noise. Clusters are numbered in the
    /// order they are discovered.
    pub fn cluster(&self, points: &[[f64; 2]]) -> Vec<Option<usize>> {
        let tree = RTree::bulk_load(
            points
                .iter()
                .enumerate()
                .map(|(ix, &p)| IndexedPoint::new(ix, p))
                .collect(),
        );
        let radius_2 = self.radius * self.radius;
        let neighbors = |ix: usize| -> Vec<usize> {
            tree.locate_within_distance(points[ix], radius_2)
                .map(|found| found.data)
                .collect()
        };

        let mut labels: Vec<Option<usize>> = vec![None; points.len()];
        let mut visited = vec![false; points.len()];
        let mut clusters = 0;
        for start in 0..points.len() {
            if visited[start] {
                continue;
            }
            visited[start] = true;
            let seeds = neighbors(start);
            if seeds.len() < self.min_samples {
                continue;
            }
            let cluster = clusters;
            clusters += 1;
            labels[start] = Some(cluster);
            let mut frontier = seeds;
            while let Some(ix) = frontier.pop() {
                if labels[ix].is_none() {
                    labels[ix] = Some(cluster);
                }
                if visited[ix] {
                    continue;
                }
                visited[ix] = true;
                let reachable = neighbors(ix);
                if reachable.len() >= self.min_samples {
                    frontier.extend(reachable.into_iter().filter(|&n| !visited[n]));
                }
            }
        }
        debug!(
            "dbscan found {} clusters among {} points",
            clusters,
            points.len()
        );
        labels
    }
}
