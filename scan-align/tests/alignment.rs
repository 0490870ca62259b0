use approx::assert_relative_eq;
use nalgebra::{Point3, Rotation3, Vector3};
use rand::{Rng, SeedableRng};
use rand_pcg::Pcg64;
use scan_align::{IcpAligner, IcpSettings};
use scan_core::PointCloud;

/// A floor and two walls meeting in a corner, like the inside of a room.
fn room_corner(points_per_face: usize) -> PointCloud {
    let mut rng = Pcg64::from_seed([5; 32]);
    let mut points = Vec::with_capacity(points_per_face * 3);
    for _ in 0..points_per_face {
        let (a, b) = (rng.gen_range(0.0..4.0), rng.gen_range(0.0..4.0));
        points.push(Point3::new(a, 0.0, b));
        let (a, b) = (rng.gen_range(0.0..3.0), rng.gen_range(0.0..4.0));
        points.push(Point3::new(0.0, a, b));
        let (a, b) = (rng.gen_range(0.0..4.0), rng.gen_range(0.0..3.0));
        points.push(Point3::new(a, b, 0.0));
    }
    PointCloud::from_points(points)
}

#[test]
fn recovers_uniform_scale() {
    let source = room_corner(1500);
    let target = source.map_points(|p| Point3::from(p.coords * 1.5));
    let transform = IcpAligner::new(IcpSettings::default().max_iterations(100)).align(&source, &target);
    assert_relative_eq!(transform.scale, 1.5, epsilon = 1e-3);
    assert!(transform.fitness > 0.95, "fitness {}", transform.fitness);
    assert!(transform.inlier_rmse < 1e-3);
    for (s, t) in source.points.iter().zip(&target.points).step_by(97) {
        assert_relative_eq!(transform.apply(s), *t, epsilon = 1e-2);
    }
}

#[test]
fn refines_rotation_and_translation() {
    let source = room_corner(1500);
    let rotation = Rotation3::from_axis_angle(&Vector3::y_axis(), 3f64.to_radians());
    let translation = Vector3::new(0.1, 0.0, -0.05);
    let target = source.map_points(|p| rotation * p + translation);
    let settings = IcpSettings::default().estimate_scale(false);
    let transform = IcpAligner::new(settings).align(&source, &target);
    assert_eq!(transform.scale, 1.0);
    assert!(transform.fitness > 0.95, "fitness {}", transform.fitness);
    assert!(transform.rotation.angle_to(&rotation) < 0.01);
    assert_relative_eq!(transform.translation, translation, epsilon = 0.05);
}

#[test]
fn degenerate_input_is_a_no_op() {
    let points: Vec<Point3<f64>> = (0..5).map(|i| Point3::new(i as f64, 1.0, 2.0)).collect();
    let cloud = PointCloud::from_points(points);
    let transform = IcpAligner::default().align(&cloud, &cloud);
    assert_eq!(transform.fitness, 0.0);
    assert!(transform.is_identity());
}
