use crate::{Dbscan, FurniturePriors, FurnitureSettings};
use log::*;
use nalgebra::Point3;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_pcg::Pcg64;
use scan_core::{
    stats, AlignmentTransform, Detection2D, Detection3D, PointCloud, Result, View, ViewPrediction,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// How the 3D candidates of a run were found.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LocalizationStrategy {
    /// Density clusters of the reference cloud at each label's expected height.
    Clustering,
    /// Reference points projected into each detection's view.
    Projection,
    /// Oracle depth lifted directly, used when there is no reference cloud.
    Backprojection,
}

/// Finds where detected furniture sits in a reference cloud.
#[derive(Debug, Clone, Default)]
pub struct FurnitureLocalizer {
    settings: FurnitureSettings,
    priors: FurniturePriors,
}

impl FurnitureLocalizer {
    pub fn new(settings: FurnitureSettings) -> Self {
        Self {
            settings,
            priors: FurniturePriors::default(),
        }
    }

    pub fn priors(self, priors: FurniturePriors) -> Self {
        Self { priors, ..self }
    }

    pub fn settings(&self) -> &FurnitureSettings {
        &self.settings
    }

    /// A low percentile of the reference cloud's vertical coordinate.
    pub fn floor_height(&self, reference: &PointCloud) -> Option<f64> {
        let mut heights: Vec<f64> = reference
            .points
            .iter()
            .map(|p| p.y)
            .filter(|y| y.is_finite())
            .collect();
        stats::percentile(&mut heights, self.settings.floor_percentile)
    }

    /// Tries clustering first and falls back to projection when it finds nothing.
    ///
    /// Clustering needs a floor estimate. Projection needs the views the detections were
    /// made in.
    pub fn localize(
        &self,
        reference: &PointCloud,
        floor: Option<f64>,
        detections: &[Detection2D],
        prediction: &ViewPrediction,
        alignment: &AlignmentTransform,
    ) -> Result<(LocalizationStrategy, Vec<Detection3D>)> {
        match floor {
            Some(floor) => {
                let found = self.cluster(reference, floor, detections);
                if !found.is_empty() {
                    info!("clustering located {} candidates", found.len());
                    return Ok((LocalizationStrategy::Clustering, found));
                }
                info!("clustering found nothing, projecting detections instead");
            }
            None => info!("no floor estimate, projecting detections instead"),
        }

        let views = prediction.views()?;
        let mut rng = Pcg64::seed_from_u64(self.settings.seed);
        let mut found = vec![];
        for detection in detections {
            let view = match views.get(detection.frame_index) {
                Some(view) => view,
                None => {
                    warn!(
                        "{} refers to missing view {}",
                        detection.label, detection.frame_index
                    );
                    continue;
                }
            };
            if let Some(located) =
                self.project(detection, view, reference, floor, alignment, &mut rng)
            {
                found.push(located);
            }
        }
        info!(
            "projection located {} of {} detections",
            found.len(),
            detections.len()
        );
        Ok((LocalizationStrategy::Projection, found))
    }

    /// One candidate per density cluster at the height each detected label is expected.
    ///
    /// A label uses its largest clusters, at most one per `detections_per_object` of its
    /// 2D detections but always at least one.
    pub fn cluster(
        &self,
        reference: &PointCloud,
        floor: f64,
        detections: &[Detection2D],
    ) -> Vec<Detection3D> {
        let mut counts: BTreeMap<&str, (usize, usize)> = BTreeMap::new();
        for detection in detections {
            let label = self.priors.canonical_label(&detection.label);
            counts.entry(label).or_insert((0, detection.frame_index)).0 += 1;
        }

        let dbscan = Dbscan::new(
            self.settings.cluster_radius,
            self.settings.cluster_min_samples,
        );
        let mut found = vec![];
        for (label, (count, frame_index)) in counts {
            let range = self.priors.height_range(label);
            let at_height: Vec<Point3<f64>> = reference
                .points
                .iter()
                .filter(|p| range.contains(floor, p.y))
                .copied()
                .collect();
            if at_height.len() < self.settings.cluster_min_samples {
                info!(
                    "{}: {} points at the expected height, not clustering",
                    label,
                    at_height.len()
                );
                continue;
            }

            let planar: Vec<[f64; 2]> = at_height.iter().map(|p| [p.x, p.z]).collect();
            let mut clusters: Vec<Vec<Point3<f64>>> = vec![];
            for (point, cluster) in at_height.iter().zip(dbscan.cluster(&planar)) {
                if let Some(cluster) = cluster {
                    if cluster >= clusters.len() {
                        clusters.resize_with(cluster + 1, Vec::new);
                    }
                    clusters[cluster].push(*point);
                }
            }
            clusters.sort_by_key(|cluster| std::cmp::Reverse(cluster.len()));
            let wanted = (count / self.settings.detections_per_object.max(1)).max(1);
            let used = clusters.len().min(wanted);
            info!(
                "{}: {} clusters for {} detections, using {}",
                label,
                clusters.len(),
                count,
                used
            );
            for cluster in clusters.iter().take(used) {
                if let Some(center) = stats::median_point(cluster) {
                    found.push(Detection3D {
                        label: label.to_string(),
                        center,
                        confidence: self.settings.cluster_confidence,
                        points: vec![center],
                        frame_index,
                    });
                }
            }
        }
        found
    }

    /// Reference points that project inside a detection at a depth consistent with the
    /// view's own depth map.
    ///
    /// Reference points are taken back into the oracle frame with the inverse of
    /// `alignment`. Returns `None` when fewer than `min_detection_points` points remain.
    pub fn project(
        &self,
        detection: &Detection2D,
        view: &View,
        reference: &PointCloud,
        floor: Option<f64>,
        alignment: &AlignmentTransform,
        rng: &mut Pcg64,
    ) -> Option<Detection3D> {
        let (height, width) = (view.height(), view.width());
        let rect = detection.pixel_rect(width, height)?;
        let range = self.priors.height_range(&detection.label);

        let inner = rect.inner_half();
        let samples = (inner.y1..inner.y2)
            .flat_map(|y| (inner.x1..inner.x2).map(move |x| (y, x)))
            .map(|(y, x)| view.depth[[y, x]])
            .filter(|d| d.is_finite() && *d > 0.0);
        let mut samples: Vec<f64> = samples.map(f64::from).collect();
        let expected_depth = if samples.len() > self.settings.min_depth_samples {
            stats::median(&mut samples)
        } else {
            None
        };
        let depth_range = expected_depth.map(|d| {
            (
                d * (1.0 - self.settings.depth_tolerance),
                d * (1.0 + self.settings.depth_tolerance),
            )
        });

        let mask = detection
            .mask
            .as_ref()
            .filter(|mask| mask.dim() == (height, width));
        let margin_x = rect.width() as f64 * self.settings.bbox_margin;
        let margin_y = rect.height() as f64 * self.settings.bbox_margin;
        let inside = |u: f64, v: f64| match mask {
            Some(mask) => {
                u >= 0.0
                    && v >= 0.0
                    && u < width as f64
                    && v < height as f64
                    && mask[[v as usize, u as usize]]
            }
            None => {
                u >= rect.x1 as f64 + margin_x
                    && u <= rect.x2 as f64 - margin_x
                    && v >= rect.y1 as f64 + margin_y
                    && v <= rect.y2 as f64 - margin_y
            }
        };

        let points: Vec<Point3<f64>> = reference
            .points
            .iter()
            .filter(|p| floor.map_or(true, |floor| range.contains(floor, p.y)))
            .filter(|p| {
                let camera = view
                    .world_to_camera
                    .transform_point(&alignment.apply_inverse(p));
                if camera.z <= self.settings.min_camera_depth {
                    return false;
                }
                let pixel = view.intrinsics.project(&camera);
                inside(pixel.x, pixel.y)
                    && depth_range.map_or(true, |(lo, hi)| camera.z >= lo && camera.z <= hi)
            })
            .copied()
            .collect();
        if points.len() < self.settings.min_detection_points {
            debug!(
                "{} in view {}: {} matching points, rejected",
                detection.label,
                view.index,
                points.len()
            );
            return None;
        }

        let center = stats::median_point(&points)?;
        let points = if points.len() > self.settings.max_detection_points {
            points
                .choose_multiple(rng, self.settings.max_detection_points)
                .copied()
                .collect()
        } else {
            points
        };
        Some(Detection3D {
            label: self.priors.canonical_label(&detection.label).to_string(),
            center,
            confidence: detection.confidence,
            points,
            frame_index: detection.frame_index,
        })
    }
}
