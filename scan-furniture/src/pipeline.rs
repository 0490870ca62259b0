use crate::{
    backproject_detection, DetectionMerger, FurnitureLocalizer, LocalizationSettings,
    LocalizationStrategy,
};
use log::*;
use rand::SeedableRng;
use rand_pcg::Pcg64;
use scan_align::IcpAligner;
use scan_core::{
    Aabb, AlignmentTransform, Detection2D, Detection3D, Object3D, PointCloud, Result,
    ViewPrediction,
};
use scan_reconstruction::PointCloudBuilder;
use serde::{Deserialize, Serialize};

/// What a localization run found.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocalizationResult {
    pub objects: Vec<Object3D>,
    /// `None` when there was nothing to locate.
    pub strategy: Option<LocalizationStrategy>,
    /// Maps the oracle frame onto the reference cloud.
    pub alignment: AlignmentTransform,
    /// Estimated floor height of the reference cloud.
    pub floor: Option<f64>,
    /// Whether every candidate lies within the reference bounds, up to the margin.
    pub within_bounds: bool,
}

/// Aligns oracle depth to a reference scan, locates every detection and merges them.
#[derive(Debug, Clone, Default)]
pub struct FurniturePipeline {
    settings: LocalizationSettings,
}

impl FurniturePipeline {
    pub fn new(settings: LocalizationSettings) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &LocalizationSettings {
        &self.settings
    }

    /// Runs localization for one scan.
    ///
    /// Without a reference cloud, detections are lifted straight out of the oracle depth.
    /// Poor alignment or detections outside the scene are logged, never errors.
    pub fn run(
        &self,
        prediction: &ViewPrediction,
        detections: &[Detection2D],
        reference: Option<&PointCloud>,
    ) -> Result<LocalizationResult> {
        let detections: Vec<Detection2D> = detections
            .iter()
            .map(|d| Detection2D {
                label: self.settings.priors.canonical_label(&d.label).to_string(),
                ..d.clone()
            })
            .collect();
        info!("localizing {} detections", detections.len());
        let localizer = FurnitureLocalizer::new(self.settings.furniture)
            .priors(self.settings.priors.clone());

        let mut alignment = AlignmentTransform::identity();
        let mut floor = None;
        let reference = reference.filter(|cloud| !cloud.is_empty());
        let (strategy, located) = match reference {
            Some(reference) => {
                floor = localizer.floor_height(reference);
                if let Some(floor) = floor {
                    info!("floor height {:.3}", floor);
                }
                alignment = self.align(prediction, reference);
                localizer.localize(reference, floor, &detections, prediction, &alignment)?
            }
            None => {
                info!("no reference cloud, lifting detections from depth");
                (
                    LocalizationStrategy::Backprojection,
                    self.backproject(prediction, &detections)?,
                )
            }
        };

        let scene = reference.and_then(PointCloud::bounds);
        let within_bounds = self.check_bounds(&located, scene.as_ref());
        let objects = DetectionMerger::new(self.settings.merge)
            .priors(self.settings.priors.clone())
            .merge(&located, scene.as_ref());
        Ok(LocalizationResult {
            strategy: (!located.is_empty()).then(|| strategy),
            objects,
            alignment,
            floor,
            within_bounds,
        })
    }

    /// Registers a sparse cloud of the oracle depth onto the reference.
    ///
    /// Falls back to the identity when the depth yields too few points.
    fn align(&self, prediction: &ViewPrediction, reference: &PointCloud) -> AlignmentTransform {
        let depth_cloud = match PointCloudBuilder::new(self.settings.depth_cloud.clone())
            .build(prediction)
        {
            Ok(cloud) => cloud,
            Err(e) => {
                warn!("no depth cloud to align: {}", e);
                return AlignmentTransform::identity();
            }
        };
        if depth_cloud.len() <= self.settings.min_alignment_points {
            warn!(
                "depth cloud has {} points, skipping alignment",
                depth_cloud.len()
            );
            return AlignmentTransform::identity();
        }
        IcpAligner::new(self.settings.icp).align(&depth_cloud, reference)
    }

    fn backproject(
        &self,
        prediction: &ViewPrediction,
        detections: &[Detection2D],
    ) -> Result<Vec<Detection3D>> {
        let views = prediction.views()?;
        let mut rng = Pcg64::seed_from_u64(self.settings.furniture.seed);
        let mut located = vec![];
        for detection in detections {
            match views.get(detection.frame_index) {
                Some(view) => {
                    if let Some(found) = backproject_detection(
                        detection,
                        view,
                        &self.settings.furniture,
                        &mut rng,
                    )? {
                        located.push(found);
                    }
                }
                None => warn!(
                    "{} refers to missing view {}",
                    detection.label, detection.frame_index
                ),
            }
        }
        Ok(located)
    }

    fn check_bounds(&self, located: &[Detection3D], scene: Option<&Aabb>) -> bool {
        let centers = Aabb::from_points(located.iter().map(|d| &d.center));
        match (scene, centers) {
            (Some(scene), Some(centers)) => {
                let inside = scene.contains_box(&centers, self.settings.bounds_margin);
                if inside {
                    info!("all candidates lie within the reference bounds");
                } else {
                    warn!(
                        "candidates span {:?} to {:?}, outside the reference bounds {:?} to {:?}",
                        centers.min, centers.max, scene.min, scene.max
                    );
                }
                inside
            }
            _ => true,
        }
    }
}
