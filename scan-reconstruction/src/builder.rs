use crate::PointCloudSettings;
use log::*;
use rand::SeedableRng;
use rand_pcg::Pcg64;
use rayon::prelude::*;
use scan_core::{
    flip_yz, stats, PointCloud, ReconstructionError, Result, View, ViewPrediction,
    DEFAULT_POINT_COLOR,
};

/// Unprojects every view of a prediction into one world-space colored cloud.
#[derive(Debug, Clone, Default)]
pub struct PointCloudBuilder {
    settings: PointCloudSettings,
}

impl PointCloudBuilder {
    pub fn new(settings: PointCloudSettings) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &PointCloudSettings {
        &self.settings
    }

    /// Fuses all views into a single cloud.
    ///
    /// Fails with [`ReconstructionError::MissingInput`] when depth, intrinsics or extrinsics
    /// are absent and with [`ReconstructionError::DegenerateGeometry`] when no view yields
    /// a single valid point.
    pub fn build(&self, prediction: &ViewPrediction) -> Result<PointCloud> {
        let views = prediction.views()?;
        if prediction.colors.is_none() {
            warn!("prediction has no frames, points will be painted gray");
        }
        let confidence_floor = self.confidence_floor(prediction);
        if let Some(floor) = confidence_floor {
            debug!("dropping pixels with confidence below {}", floor);
        }

        let clouds = views
            .par_iter()
            .map(|view| self.unproject_view(view, confidence_floor))
            .collect::<Result<Vec<_>>>()?;

        let mut cloud = PointCloud::new();
        for (view, view_cloud) in clouds.into_iter().enumerate() {
            if view_cloud.is_empty() {
                debug!("view {} produced no valid points", view);
            }
            cloud.extend(view_cloud);
        }
        if cloud.is_empty() {
            return Err(ReconstructionError::DegenerateGeometry(
                "no view produced a valid point".to_string(),
            ));
        }

        if let Some(max_points) = self.settings.max_points {
            let mut rng = Pcg64::seed_from_u64(self.settings.seed);
            cloud = subsample(&cloud, max_points, &mut rng);
        }
        info!(
            "built point cloud with {} points from {} views",
            cloud.len(),
            views.len()
        );
        Ok(cloud)
    }

    /// The confidence value below which pixels are discarded, if filtering applies.
    fn confidence_floor(&self, prediction: &ViewPrediction) -> Option<f32> {
        let percentile = self.settings.confidence_percentile;
        if percentile <= 0.0 {
            return None;
        }
        let (depth, confidence) = (prediction.depth.as_ref()?, prediction.confidence.as_ref()?);
        let mut values: Vec<f64> = depth
            .iter()
            .zip(confidence.iter())
            .filter(|(d, c)| d.is_finite() && **d > 0.0 && c.is_finite())
            .map(|(_, &c)| c as f64)
            .collect();
        stats::percentile(&mut values, percentile).map(|v| v as f32)
    }

    fn unproject_view(&self, view: &View<'_>, confidence_floor: Option<f32>) -> Result<PointCloud> {
        let camera_to_world = view.world_to_camera.inverse()?;
        let stride = self.settings.pixel_stride.max(1);
        let min_depth = self.settings.min_depth;
        let max_depth = self.settings.max_depth.unwrap_or(f32::INFINITY);

        let mut cloud = PointCloud::new();
        for row in (0..view.height()).step_by(stride) {
            for col in (0..view.width()).step_by(stride) {
                let depth = view.depth[[row, col]];
                if !depth.is_finite() || depth <= min_depth || depth >= max_depth {
                    continue;
                }
                if let (Some(confidence), Some(floor)) = (&view.confidence, confidence_floor) {
                    if confidence[[row, col]] < floor {
                        continue;
                    }
                }
                let camera = view
                    .intrinsics
                    .unproject(col as f64, row as f64, depth as f64);
                let world = camera_to_world.transform_point(&camera);
                let world = if self.settings.flip_yz {
                    flip_yz(world)
                } else {
                    world
                };
                let color = view.color(row, col).unwrap_or(DEFAULT_POINT_COLOR);
                cloud.push_from_view(world, color, view.index as u32);
            }
        }

        match self.settings.max_points_per_view {
            Some(max) if cloud.len() > max => {
                let mut rng = Pcg64::seed_from_u64(self.settings.seed ^ view.index as u64);
                Ok(subsample(&cloud, max, &mut rng))
            }
            _ => Ok(cloud),
        }
    }
}

/// Randomly keeps `max_points` points, preserving their relative order.
pub fn subsample(cloud: &PointCloud, max_points: usize, rng: &mut Pcg64) -> PointCloud {
    if cloud.len() <= max_points {
        return cloud.clone();
    }
    let mut indices = rand::seq::index::sample(rng, cloud.len(), max_points).into_vec();
    indices.sort_unstable();
    cloud.select(&indices)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use scan_core::nalgebra::Point3;
    use ndarray::{Array3, Array4};

    fn identity_prediction(depth: Array3<f32>) -> ViewPrediction {
        let n = depth.dim().0;
        let mut intrinsics = Array3::zeros((n, 3, 3));
        let mut extrinsics = Array3::zeros((n, 4, 4));
        for i in 0..n {
            for d in 0..3 {
                intrinsics[[i, d, d]] = 1.0;
            }
            for d in 0..4 {
                extrinsics[[i, d, d]] = 1.0;
            }
        }
        ViewPrediction::new(depth, intrinsics, extrinsics)
    }

    #[test]
    fn two_by_two_unit_depth() {
        let prediction = identity_prediction(Array3::ones((1, 2, 2)));
        let cloud = PointCloudBuilder::default().build(&prediction).unwrap();
        assert_eq!(cloud.len(), 4);
        let expected = [
            Point3::new(0.0, -0.0, -1.0),
            Point3::new(1.0, -0.0, -1.0),
            Point3::new(0.0, -1.0, -1.0),
            Point3::new(1.0, -1.0, -1.0),
        ];
        for (p, e) in cloud.points.iter().zip(expected.iter()) {
            assert_relative_eq!(*p, *e);
        }
        assert!(cloud.colors.iter().all(|&c| c == DEFAULT_POINT_COLOR));
        assert_eq!(cloud.views, Some(vec![0; 4]));
    }

    #[test]
    fn empty_views_keep_later_view_tags() {
        let mut depth = Array3::ones((3, 2, 2));
        depth.index_axis_mut(ndarray::Axis(0), 1).fill(0.0);
        let cloud = PointCloudBuilder::default()
            .build(&identity_prediction(depth))
            .unwrap();
        assert_eq!(cloud.len(), 8);
        assert_eq!(cloud.views, Some(vec![0, 0, 0, 0, 2, 2, 2, 2]));
    }

    #[test]
    fn camera_to_world_inverts_the_extrinsic() {
        let mut prediction = identity_prediction(Array3::from_elem((1, 1, 1), 2.0));
        // world-to-camera translates by +3 on x, so the camera sits at x = -3
        prediction.extrinsics.as_mut().unwrap()[[0, 0, 3]] = 3.0;
        let settings = PointCloudSettings {
            flip_yz: false,
            ..Default::default()
        };
        let cloud = PointCloudBuilder::new(settings).build(&prediction).unwrap();
        assert_relative_eq!(cloud.points[0], Point3::new(-3.0, 0.0, 2.0));
    }

    #[test]
    fn colors_follow_pixels() {
        let mut colors = Array4::zeros((1, 1, 2, 3));
        colors[[0, 0, 1, 0]] = 200;
        let prediction = identity_prediction(Array3::ones((1, 1, 2))).with_colors(colors);
        let cloud = PointCloudBuilder::default().build(&prediction).unwrap();
        assert_eq!(cloud.colors, vec![[0, 0, 0], [200, 0, 0]]);
    }

    #[test]
    fn low_confidence_pixels_are_dropped() {
        let mut confidence = Array3::from_elem((1, 4, 4), 0.9f32);
        for x in 0..4 {
            confidence[[0, 0, x]] = 0.05;
        }
        let prediction =
            identity_prediction(Array3::ones((1, 4, 4))).with_confidence(confidence);
        let cloud = PointCloudBuilder::default().build(&prediction).unwrap();
        assert_eq!(cloud.len(), 12);
    }

    #[test]
    fn missing_and_degenerate_inputs_fail() {
        let builder = PointCloudBuilder::default();
        let mut prediction = identity_prediction(Array3::zeros((2, 3, 3)));
        assert!(matches!(
            builder.build(&prediction),
            Err(ReconstructionError::DegenerateGeometry(_))
        ));
        prediction.extrinsics = None;
        assert!(matches!(
            builder.build(&prediction),
            Err(ReconstructionError::MissingInput("extrinsics"))
        ));
    }

    #[test]
    fn caps_are_applied() {
        let prediction = identity_prediction(Array3::ones((2, 10, 10)));
        let settings = PointCloudSettings {
            max_points_per_view: Some(30),
            max_points: Some(50),
            ..Default::default()
        };
        let cloud = PointCloudBuilder::new(settings).build(&prediction).unwrap();
        assert_eq!(cloud.len(), 50);
        let views = cloud.views.unwrap();
        assert!(views.iter().filter(|&&v| v == 0).count() <= 30);
    }
}
