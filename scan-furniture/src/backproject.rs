use crate::FurnitureSettings;
use log::*;
use nalgebra::{Point3, Vector3};
use rand::seq::SliceRandom;
use rand::Rng;
use rand_pcg::Pcg64;
use scan_core::{Detection2D, Detection3D, Result, View};

fn valid(depth: f32) -> bool {
    depth.is_finite() && depth > 0.0
}

/// Lifts a detection straight out of its view's depth map, without a reference cloud.
///
/// Pixels come from the mask when there is one and from the box otherwise. The center is
/// the mean of the lifted points. Returns `None` when the region holds too little depth.
pub fn backproject_detection(
    detection: &Detection2D,
    view: &View,
    settings: &FurnitureSettings,
    rng: &mut Pcg64,
) -> Result<Option<Detection3D>> {
    let (height, width) = (view.height(), view.width());
    let rect = match detection.pixel_rect(width, height) {
        Some(rect) => rect,
        None => return Ok(None),
    };

    let mask = detection
        .mask
        .as_ref()
        .filter(|mask| mask.dim() == (height, width));
    let region_depths = match mask {
        Some(mask) => (rect.y1..rect.y2)
            .flat_map(|y| (rect.x1..rect.x2).map(move |x| (y, x)))
            .filter(|&(y, x)| mask[[y, x]] && valid(view.depth[[y, x]]))
            .count(),
        None => {
            let inner = rect.inner_half();
            (inner.y1..inner.y2)
                .flat_map(|y| (inner.x1..inner.x2).map(move |x| (y, x)))
                .filter(|&(y, x)| valid(view.depth[[y, x]]))
                .count()
        }
    };
    if region_depths < settings.min_backprojected_depths {
        debug!(
            "{} in view {}: only {} valid depths",
            detection.label, view.index, region_depths
        );
        return Ok(None);
    }

    let budget = settings.max_detection_points;
    let pixels: Vec<(usize, usize)> = match mask {
        Some(mask) => {
            let covered: Vec<(usize, usize)> = mask
                .indexed_iter()
                .filter(|(_, inside)| **inside)
                .map(|(pixel, _)| pixel)
                .collect();
            covered.choose_multiple(rng, budget).copied().collect()
        }
        None => {
            let samples = budget.min(rect.width() * rect.height());
            (0..samples)
                .map(|_| {
                    (
                        rng.gen_range(rect.y1..rect.y2),
                        rng.gen_range(rect.x1..rect.x2),
                    )
                })
                .collect()
        }
    };

    let camera_to_world = view.world_to_camera.inverse()?;
    let points: Vec<Point3<f64>> = pixels
        .into_iter()
        .filter(|&(y, x)| valid(view.depth[[y, x]]))
        .map(|(y, x)| {
            let camera = view
                .intrinsics
                .unproject(x as f64, y as f64, f64::from(view.depth[[y, x]]));
            camera_to_world.transform_point(&camera)
        })
        .collect();
    if points.len() < settings.min_backprojected_samples {
        return Ok(None);
    }
    let center = Point3::from(
        points.iter().map(|p| p.coords).sum::<Vector3<f64>>() / points.len() as f64,
    );
    Ok(Some(Detection3D {
        label: detection.label.clone(),
        center,
        confidence: detection.confidence,
        points,
        frame_index: detection.frame_index,
    }))
}
