use nalgebra::{Matrix4, Point3, Rotation3, Vector3};
use serde::{Deserialize, Serialize};

/// A uniform-scale rigid transform mapping a source cloud onto a target cloud.
///
/// A source point `p` lands at `rotation * (scale * p) + translation`.
/// `fitness` is the fraction of source points with a target correspondence inside
/// the ICP threshold; consumers should check it before trusting the transform.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AlignmentTransform {
    pub rotation: Rotation3<f64>,
    pub translation: Vector3<f64>,
    pub scale: f64,
    pub fitness: f64,
    pub inlier_rmse: f64,
}

impl Default for AlignmentTransform {
    fn default() -> Self {
        Self::identity()
    }
}

impl AlignmentTransform {
    /// The no-op alignment returned when there is nothing to align.
    pub fn identity() -> Self {
        Self {
            rotation: Rotation3::identity(),
            translation: Vector3::zeros(),
            scale: 1.0,
            fitness: 0.0,
            inlier_rmse: 0.0,
        }
    }

    pub fn apply(&self, point: &Point3<f64>) -> Point3<f64> {
        Point3::from(self.rotation * (point.coords * self.scale) + self.translation)
    }

    /// Maps a target-space point back into the unscaled source frame.
    pub fn apply_inverse(&self, point: &Point3<f64>) -> Point3<f64> {
        Point3::from(self.rotation.inverse() * (point.coords - self.translation) / self.scale)
    }

    /// The similarity transform as a homogeneous matrix.
    pub fn matrix(&self) -> Matrix4<f64> {
        let mut m = Matrix4::identity();
        m.fixed_slice_mut::<3, 3>(0, 0)
            .copy_from(&(self.rotation.matrix() * self.scale));
        m.fixed_slice_mut::<3, 1>(0, 3).copy_from(&self.translation);
        m
    }

    pub fn is_identity(&self) -> bool {
        self.rotation == Rotation3::identity()
            && self.translation == Vector3::zeros()
            && self.scale == 1.0
    }
}
