use crate::{ReconstructionError, Result};
use nalgebra::{Point3, Vector3};
use serde::{Deserialize, Serialize};

/// Color given to points when the oracle returned no frames.
pub const DEFAULT_POINT_COLOR: [u8; 3] = [128, 128, 128];

/// A colored set of world-space points.
///
/// `points` and `colors` are parallel arrays. `normals` and `views` are optional
/// per-point attributes and, when present, are parallel to `points` as well.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PointCloud {
    pub points: Vec<Point3<f64>>,
    pub colors: Vec<[u8; 3]>,
    #[serde(default)]
    pub normals: Option<Vec<Vector3<f64>>>,
    /// Index of the view each point was unprojected from.
    #[serde(default)]
    pub views: Option<Vec<u32>>,
}

impl PointCloud {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            points: Vec::with_capacity(capacity),
            colors: Vec::with_capacity(capacity),
            normals: None,
            views: None,
        }
    }

    /// Builds a cloud from bare positions, painting them [`DEFAULT_POINT_COLOR`].
    pub fn from_points(points: Vec<Point3<f64>>) -> Self {
        let colors = vec![DEFAULT_POINT_COLOR; points.len()];
        Self {
            points,
            colors,
            normals: None,
            views: None,
        }
    }

    /// Fails with [`ReconstructionError::InvalidInput`] unless there is one color per point.
    pub fn from_points_and_colors(
        points: Vec<Point3<f64>>,
        colors: Vec<[u8; 3]>,
    ) -> Result<Self> {
        if points.len() != colors.len() {
            return Err(ReconstructionError::InvalidInput(format!(
                "{} points but {} colors",
                points.len(),
                colors.len()
            )));
        }
        Ok(Self {
            points,
            colors,
            normals: None,
            views: None,
        })
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn push(&mut self, point: Point3<f64>, color: [u8; 3]) {
        self.points.push(point);
        self.colors.push(color);
    }

    /// Pushes a point and records the view it came from.
    pub fn push_from_view(&mut self, point: Point3<f64>, color: [u8; 3], view: u32) {
        let len = self.points.len();
        self.push(point, color);
        self.views
            .get_or_insert_with(|| Vec::with_capacity(len + 1))
            .resize(len, u32::MAX);
        if let Some(views) = self.views.as_mut() {
            views.push(view);
        }
    }

    /// Appends another cloud, dropping per-point attributes only one side has.
    pub fn extend(&mut self, other: PointCloud) {
        if other.is_empty() {
            return;
        }
        if self.is_empty() {
            *self = other;
            return;
        }
        let both_views = self.views.is_some() || self.is_empty();
        let both_normals = self.normals.is_some() || self.is_empty();
        self.views = match (self.views.take(), other.views, both_views) {
            (Some(mut a), Some(b), true) => {
                a.extend(b);
                Some(a)
            }
            (None, Some(b), true) => Some(b),
            _ => None,
        };
        self.normals = match (self.normals.take(), other.normals, both_normals) {
            (Some(mut a), Some(b), true) => {
                a.extend(b);
                Some(a)
            }
            (None, Some(b), true) => Some(b),
            _ => None,
        };
        self.points.extend(other.points);
        self.colors.extend(other.colors);
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Point3<f64>, &[u8; 3])> + '_ {
        self.points.iter().zip(self.colors.iter())
    }

    /// Copies out the points at `indices`, keeping every per-point attribute.
    pub fn select(&self, indices: &[usize]) -> PointCloud {
        PointCloud {
            points: indices.iter().map(|&i| self.points[i]).collect(),
            colors: indices.iter().map(|&i| self.colors[i]).collect(),
            normals: self
                .normals
                .as_ref()
                .map(|n| indices.iter().map(|&i| n[i]).collect()),
            views: self
                .views
                .as_ref()
                .map(|v| indices.iter().map(|&i| v[i]).collect()),
        }
    }

    /// Produces a new cloud with every position mapped through `f`.
    ///
    /// Normals are dropped since `f` is not known to be rigid.
    pub fn map_points(&self, f: impl Fn(&Point3<f64>) -> Point3<f64>) -> PointCloud {
        PointCloud {
            points: self.points.iter().map(f).collect(),
            colors: self.colors.clone(),
            normals: None,
            views: self.views.clone(),
        }
    }

    pub fn bounds(&self) -> Option<Aabb> {
        Aabb::from_points(&self.points)
    }

    pub fn centroid(&self) -> Option<Point3<f64>> {
        if self.is_empty() {
            return None;
        }
        let sum = self
            .points
            .iter()
            .fold(Vector3::zeros(), |acc, p| acc + p.coords);
        Some(Point3::from(sum / self.len() as f64))
    }
}

/// An axis-aligned bounding box.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Aabb {
    pub min: Point3<f64>,
    pub max: Point3<f64>,
}

impl Aabb {
    pub fn from_points<'a>(points: impl IntoIterator<Item = &'a Point3<f64>>) -> Option<Self> {
        let mut points = points.into_iter();
        let first = *points.next()?;
        Some(points.fold(
            Self {
                min: first,
                max: first,
            },
            |bounds, p| bounds.grow(p),
        ))
    }

    pub fn grow(self, point: &Point3<f64>) -> Self {
        Self {
            min: self.min.inf(point),
            max: self.max.sup(point),
        }
    }

    pub fn extents(&self) -> Vector3<f64> {
        self.max - self.min
    }

    pub fn center(&self) -> Point3<f64> {
        nalgebra::center(&self.min, &self.max)
    }

    pub fn diagonal(&self) -> f64 {
        self.extents().norm()
    }

    pub fn volume(&self) -> f64 {
        self.extents().iter().product()
    }

    /// Whether `other` lies within this box grown by `margin` on every side.
    pub fn contains_box(&self, other: &Aabb, margin: f64) -> bool {
        let m = Vector3::repeat(margin);
        let lo = self.min - m;
        let hi = self.max + m;
        (0..3).all(|d| other.min[d] >= lo[d] && other.max[d] <= hi[d])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn bounds_and_centroid() {
        let cloud = PointCloud::from_points(vec![
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(2.0, 1.0, 4.0),
            Point3::new(1.0, -1.0, 2.0),
        ]);
        let bounds = cloud.bounds().unwrap();
        assert_eq!(bounds.min, Point3::new(0.0, -1.0, 0.0));
        assert_eq!(bounds.max, Point3::new(2.0, 1.0, 4.0));
        assert_relative_eq!(bounds.volume(), 16.0);
        assert_relative_eq!(cloud.centroid().unwrap(), Point3::new(1.0, 0.0, 2.0));
    }

    #[test]
    fn view_tags_stay_parallel() {
        let mut cloud = PointCloud::new();
        cloud.push(Point3::origin(), [1, 2, 3]);
        cloud.push_from_view(Point3::new(1.0, 0.0, 0.0), [4, 5, 6], 7);
        assert_eq!(cloud.views, Some(vec![u32::MAX, 7]));
        let picked = cloud.select(&[1]);
        assert_eq!(picked.colors, vec![[4, 5, 6]]);
        assert_eq!(picked.views, Some(vec![7]));
    }

    #[test]
    fn extending_with_an_empty_cloud_keeps_view_tags() {
        let mut cloud = PointCloud::new();
        cloud.extend(PointCloud::new());
        let mut first = PointCloud::new();
        first.push_from_view(Point3::origin(), [0; 3], 0);
        cloud.extend(first);
        cloud.extend(PointCloud::new());
        let mut last = PointCloud::new();
        last.push_from_view(Point3::new(1.0, 0.0, 0.0), [0; 3], 2);
        cloud.extend(last);
        assert_eq!(cloud.views, Some(vec![0, 2]));

        cloud.extend(PointCloud::from_points(vec![Point3::origin()]));
        assert_eq!(cloud.views, None);
        assert_eq!(cloud.len(), 3);
    }

    #[test]
    fn colors_must_match_points() {
        let points = vec![Point3::origin(), Point3::new(1.0, 1.0, 1.0)];
        assert!(matches!(
            PointCloud::from_points_and_colors(points.clone(), vec![[1, 2, 3]]),
            Err(ReconstructionError::InvalidInput(_))
        ));
        let cloud =
            PointCloud::from_points_and_colors(points, vec![[1, 2, 3], [4, 5, 6]]).unwrap();
        assert_eq!(cloud.len(), 2);
    }

    #[test]
    fn empty_cloud_has_no_bounds() {
        assert!(PointCloud::new().bounds().is_none());
        assert!(PointCloud::new().centroid().is_none());
    }
}
