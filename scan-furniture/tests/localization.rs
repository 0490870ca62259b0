use approx::assert_relative_eq;
use nalgebra::Point3;
use rand::SeedableRng;
use rand_pcg::Pcg64;
use scan_core::ndarray::{Array2, Array3};
use scan_core::{AlignmentTransform, Detection2D, PointCloud, ViewPrediction};
use scan_furniture::{
    backproject_detection, FurnitureLocalizer, FurniturePipeline, FurnitureSettings,
    LocalizationStrategy,
};

/// `n` cameras at the origin looking down `+Z` at a constant depth.
fn prediction(n: usize, width: usize, height: usize, depth: f32) -> ViewPrediction {
    let mut intrinsics = Array3::zeros((n, 3, 3));
    let mut extrinsics = Array3::zeros((n, 3, 4));
    for i in 0..n {
        intrinsics[[i, 0, 0]] = 50.0;
        intrinsics[[i, 1, 1]] = 50.0;
        intrinsics[[i, 0, 2]] = width as f64 / 2.0;
        intrinsics[[i, 1, 2]] = height as f64 / 2.0;
        intrinsics[[i, 2, 2]] = 1.0;
        for d in 0..3 {
            extrinsics[[i, d, d]] = 1.0;
        }
    }
    ViewPrediction::new(
        Array3::from_elem((n, height, width), depth),
        intrinsics,
        extrinsics,
    )
}

fn grid(n: usize, step: f64) -> impl Iterator<Item = f64> {
    let half = (n / 2) as f64;
    (0..n).map(move |i| (i as f64 - half) * step)
}

/// A floor at `y = 0` with a box of points sitting at seat height around `(0, 0.5, 0)`.
fn room_with_chair() -> PointCloud {
    let mut points = vec![];
    for x in grid(61, 0.1) {
        for z in grid(61, 0.1) {
            points.push(Point3::new(x, 0.0, z));
        }
    }
    for x in grid(11, 0.04) {
        for y in grid(11, 0.035) {
            for z in grid(11, 0.04) {
                points.push(Point3::new(x, 0.5 + y, z));
            }
        }
    }
    PointCloud::from_points(points)
}

#[test]
fn chair_is_found_by_clustering() {
    let detections: Vec<Detection2D> = (0..4)
        .map(|frame| Detection2D::new("chair", 0.7, [2.0, 2.0, 12.0, 12.0], frame))
        .collect();
    let reference = room_with_chair();
    let result = FurniturePipeline::default()
        .run(&prediction(4, 16, 16, 2.0), &detections, Some(&reference))
        .unwrap();

    assert_eq!(result.strategy, Some(LocalizationStrategy::Clustering));
    assert_relative_eq!(result.floor.unwrap(), 0.0);
    assert!(result.alignment.is_identity());
    assert!(result.within_bounds);
    assert_eq!(result.objects.len(), 1);
    let chair = &result.objects[0];
    assert_eq!(chair.label, "chair");
    assert!((chair.center - Point3::new(0.0, 0.5, 0.0)).norm() < 0.1);
    assert_relative_eq!(chair.confidence, 0.8);
}

/// A square patch of reference points two units in front of the camera.
fn patch() -> PointCloud {
    let mut points = vec![];
    for x in grid(11, 0.04) {
        for y in grid(11, 0.04) {
            points.push(Point3::new(x, y, 2.0));
        }
    }
    PointCloud::from_points(points)
}

#[test]
fn projection_is_used_without_a_floor() {
    let prediction = prediction(1, 64, 48, 2.0);
    let detections = [
        Detection2D::new("chair", 0.9, [20.0, 14.0, 44.0, 34.0], 0),
        Detection2D::new("chair", 0.9, [0.0, 0.0, 10.0, 10.0], 0),
        Detection2D::new("chair", 0.9, [20.0, 14.0, 44.0, 34.0], 7),
    ];
    let (strategy, found) = FurnitureLocalizer::default()
        .localize(
            &patch(),
            None,
            &detections,
            &prediction,
            &AlignmentTransform::identity(),
        )
        .unwrap();
    assert_eq!(strategy, LocalizationStrategy::Projection);
    assert_eq!(found.len(), 1);
    assert_relative_eq!(found[0].center, Point3::new(0.0, 0.0, 2.0), epsilon = 1e-9);
    assert_eq!(found[0].points.len(), 100);
}

#[test]
fn projection_rejects_inconsistent_depth() {
    let prediction = prediction(1, 64, 48, 5.0);
    let view = prediction.view(0).unwrap();
    let detection = Detection2D::new("chair", 0.9, [20.0, 14.0, 44.0, 34.0], 0);
    let located = FurnitureLocalizer::default().project(
        &detection,
        &view,
        &patch(),
        None,
        &AlignmentTransform::identity(),
        &mut Pcg64::from_seed([5; 32]),
    );
    assert!(located.is_none());
}

#[test]
fn masks_select_the_lifted_pixels() {
    let prediction = prediction(1, 64, 48, 2.0);
    let view = prediction.view(0).unwrap();
    let mut mask = Array2::from_elem((48, 64), false);
    for y in 20..28 {
        for x in 30..34 {
            mask[[y, x]] = true;
        }
    }
    let detection = Detection2D::new("tv", 0.5, [30.0, 20.0, 34.0, 28.0], 0).with_mask(mask);
    let located = backproject_detection(
        &detection,
        &view,
        &FurnitureSettings::default(),
        &mut Pcg64::from_seed([5; 32]),
    )
    .unwrap()
    .unwrap();
    assert_eq!(located.points.len(), 32);
    // Pixels 30..34 and 20..28 around a principal point of (32, 24).
    assert_relative_eq!(
        located.center,
        Point3::new(-0.02, -0.02, 2.0),
        epsilon = 1e-9
    );
}

#[test]
fn detections_are_lifted_from_depth_without_a_reference() {
    let detections = [
        Detection2D::new("couch", 0.6, [20.0, 14.0, 44.0, 34.0], 0),
        Detection2D::new("couch", 0.8, [21.0, 14.0, 45.0, 34.0], 1),
    ];
    let result = FurniturePipeline::default()
        .run(&prediction(2, 64, 48, 2.0), &detections, None)
        .unwrap();
    assert_eq!(result.strategy, Some(LocalizationStrategy::Backprojection));
    assert!(result.floor.is_none());
    assert_eq!(result.objects.len(), 1);
    let sofa = &result.objects[0];
    assert_eq!(sofa.label, "sofa");
    assert_relative_eq!(sofa.confidence, 0.8);
    assert_eq!(sofa.color, [0.2, 0.8, 0.2]);
    assert_relative_eq!(sofa.center.z, 2.0, epsilon = 1e-9);
    assert!(sofa.center.x.abs() < 0.15 && sofa.center.y.abs() < 0.15);
}

#[test]
fn nothing_located_means_no_strategy() {
    let result = FurniturePipeline::default()
        .run(&prediction(1, 64, 48, 2.0), &[], Some(&patch()))
        .unwrap();
    assert!(result.objects.is_empty());
    assert!(result.strategy.is_none());
    let json = serde_json::to_string(&result).unwrap();
    assert!(json.contains("\"objects\":[]"));
}
