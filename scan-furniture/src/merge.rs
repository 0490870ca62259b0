use crate::{FurniturePriors, MergeSettings};
use itertools::Itertools;
use log::*;
use nalgebra::{Point3, Vector3};
use scan_core::{stats, Aabb, Detection3D, Object3D};

/// Collapses candidate detections of the same label that lie close together.
#[derive(Debug, Clone, Default)]
pub struct DetectionMerger {
    settings: MergeSettings,
    priors: FurniturePriors,
}

/// Detections gathered around a running mean of their centers.
struct Group<'a> {
    members: Vec<&'a Detection3D>,
    center_sum: Vector3<f64>,
}

impl<'a> Group<'a> {
    fn new(detection: &'a Detection3D) -> Self {
        Self {
            members: vec![detection],
            center_sum: detection.center.coords,
        }
    }

    fn mean(&self) -> Point3<f64> {
        Point3::from(self.center_sum / self.members.len() as f64)
    }

    fn push(&mut self, detection: &'a Detection3D) {
        self.center_sum += detection.center.coords;
        self.members.push(detection);
    }
}

impl DetectionMerger {
    pub fn new(settings: MergeSettings) -> Self {
        Self {
            settings,
            priors: FurniturePriors::default(),
        }
    }

    /// Labels are colored from `priors`.
    pub fn priors(self, priors: FurniturePriors) -> Self {
        Self { priors, ..self }
    }

    pub fn settings(&self) -> &MergeSettings {
        &self.settings
    }

    /// The merge distance for a scene.
    ///
    /// With scene bounds it is proportional to their diagonal. Without, the largest extent
    /// of the detection centers stands in for the scene size.
    pub fn threshold(&self, detections: &[Detection3D], scene: Option<&Aabb>) -> f64 {
        let size = match scene {
            Some(scene) => scene.diagonal(),
            None => Aabb::from_points(detections.iter().map(|d| &d.center))
                .map(|bounds| bounds.extents().max())
                .unwrap_or(0.0),
        };
        (size * self.settings.scene_ratio).max(self.settings.min_distance)
    }

    /// Groups detections per label and returns one object per group, ordered by label.
    pub fn merge(&self, detections: &[Detection3D], scene: Option<&Aabb>) -> Vec<Object3D> {
        if detections.is_empty() {
            return vec![];
        }
        let threshold = self.threshold(detections, scene);
        info!("merging {} detections within {:.3}", detections.len(), threshold);

        let by_label = detections
            .iter()
            .map(|d| (d.label.as_str(), d))
            .into_group_map();
        let mut objects = vec![];
        for (label, members) in by_label.into_iter().sorted_by_key(|(label, _)| *label) {
            let mut groups: Vec<Group> = vec![];
            for detection in members {
                match groups
                    .iter_mut()
                    .find(|g| (detection.center - g.mean()).norm() < threshold)
                {
                    Some(group) => group.push(detection),
                    None => groups.push(Group::new(detection)),
                }
            }
            debug!("{}: {} groups", label, groups.len());
            objects.extend(groups.into_iter().map(|group| self.object(label, &group)));
        }
        info!("merged into {} objects", objects.len());
        objects
    }

    fn object(&self, label: &str, group: &Group) -> Object3D {
        let points: Vec<Point3<f64>> = group
            .members
            .iter()
            .flat_map(|d| d.points.iter().copied())
            .collect();
        let center = stats::median_point(&points).unwrap_or_else(|| group.mean());
        let confidence = group
            .members
            .iter()
            .map(|d| d.confidence)
            .fold(f64::NEG_INFINITY, f64::max);
        Object3D {
            label: label.to_string(),
            center,
            confidence,
            color: self.priors.color(label),
            points,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn detection(label: &str, center: [f64; 3], confidence: f64) -> Detection3D {
        let center = Point3::from(center);
        Detection3D {
            label: label.to_string(),
            center,
            confidence,
            points: vec![center],
            frame_index: 0,
        }
    }

    fn room() -> Aabb {
        Aabb {
            min: Point3::origin(),
            max: Point3::new(0.0, 6.0, 8.0),
        }
    }

    #[test]
    fn nearby_detections_become_one_object() {
        let merger = DetectionMerger::default();
        let detections = [
            detection("chair", [1.0, 0.5, 1.0], 0.6),
            detection("chair", [1.05, 0.5, 1.0], 0.9),
        ];
        assert_relative_eq!(merger.threshold(&detections, Some(&room())), 0.8);
        let objects = merger.merge(&detections, Some(&room()));
        assert_eq!(objects.len(), 1);
        assert_relative_eq!(objects[0].confidence, 0.9);
        assert_relative_eq!(objects[0].center, Point3::new(1.025, 0.5, 1.0));
        assert_eq!(objects[0].color, [1.0, 0.2, 0.2]);
        assert_eq!(objects[0].points.len(), 2);
    }

    #[test]
    fn distant_detections_stay_apart() {
        let objects = DetectionMerger::default().merge(
            &[
                detection("chair", [1.0, 0.5, 1.0], 0.6),
                detection("chair", [6.0, 0.5, 1.0], 0.9),
            ],
            Some(&room()),
        );
        assert_eq!(objects.len(), 2);
    }

    #[test]
    fn labels_never_merge() {
        let objects = DetectionMerger::default().merge(
            &[
                detection("table", [1.0, 0.5, 1.0], 0.6),
                detection("chair", [1.0, 0.5, 1.0], 0.9),
                detection("piano", [1.0, 0.5, 1.0], 0.9),
            ],
            None,
        );
        let labels: Vec<&str> = objects.iter().map(|o| o.label.as_str()).collect();
        assert_eq!(labels, ["chair", "piano", "table"]);
        assert_eq!(objects[1].color, [0.5, 0.5, 0.5]);
    }

    #[test]
    fn threshold_without_scene_uses_center_spread() {
        let merger = DetectionMerger::default();
        let detections = [
            detection("bed", [0.0, 0.0, 0.0], 0.5),
            detection("bed", [20.0, 1.0, 0.0], 0.5),
        ];
        assert_relative_eq!(merger.threshold(&detections, None), 1.6);
        assert_relative_eq!(merger.threshold(&detections[..1], None), 0.5);
    }
}
