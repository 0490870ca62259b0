use crate::{ReconstructionError, Result};
use derive_more::{AsRef, Deref, From, Into};
use nalgebra::{Matrix3, Matrix4, Point2, Point3, Vector2};
use ndarray::ArrayView2;
use serde::{Deserialize, Serialize};

/// This contains intrinsic camera parameters as per
/// [this Wikipedia page](https://en.wikipedia.org/wiki/Camera_resectioning#Intrinsic_parameters).
///
/// The oracle reports intrinsics at the resolution of its processed frames, so pixel
/// coordinates handed to [`CameraIntrinsics::unproject`] must be in that resolution too.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CameraIntrinsics {
    pub focals: Vector2<f64>,
    pub principal_point: Point2<f64>,
    pub skew: f64,
}

impl CameraIntrinsics {
    /// Creates camera intrinsics that would create an identity intrinsic matrix.
    pub fn identity() -> Self {
        Self {
            focals: Vector2::new(1.0, 1.0),
            skew: 0.0,
            principal_point: Point2::new(0.0, 0.0),
        }
    }

    /// Reads `fx`, `fy`, `cx`, `cy` and skew out of an upper-triangular `K` matrix.
    pub fn from_matrix(k: &Matrix3<f64>) -> Self {
        Self {
            focals: Vector2::new(k[(0, 0)], k[(1, 1)]),
            principal_point: Point2::new(k[(0, 2)], k[(1, 2)]),
            skew: k[(0, 1)],
        }
    }

    pub fn focals(self, focals: Vector2<f64>) -> Self {
        Self { focals, ..self }
    }

    pub fn focal(self, focal: f64) -> Self {
        Self {
            focals: Vector2::new(focal, focal),
            ..self
        }
    }

    pub fn principal_point(self, principal_point: Point2<f64>) -> Self {
        Self {
            principal_point,
            ..self
        }
    }

    #[rustfmt::skip]
    pub fn matrix(&self) -> Matrix3<f64> {
        Matrix3::new(
            self.focals.x,  self.skew,      self.principal_point.x,
            0.0,            self.focals.y,  self.principal_point.y,
            0.0,            0.0,            1.0,
        )
    }

    /// Lifts pixel `(u, v)` observed at `depth` into camera space.
    ///
    /// Skew is ignored, matching the oracle's pinhole model.
    pub fn unproject(&self, u: f64, v: f64, depth: f64) -> Point3<f64> {
        Point3::new(
            (u - self.principal_point.x) * depth / self.focals.x,
            (v - self.principal_point.y) * depth / self.focals.y,
            depth,
        )
    }

    /// Projects a camera-space point onto the image plane.
    ///
    /// The caller is responsible for rejecting points behind the camera.
    pub fn project(&self, point: &Point3<f64>) -> Point2<f64> {
        Point2::new(
            point.x * self.focals.x / point.z + self.principal_point.x,
            point.y * self.focals.y / point.z + self.principal_point.y,
        )
    }
}

/// The world-to-camera transform reported by the oracle for one view, in homogeneous form.
#[derive(Debug, Clone, Copy, PartialEq, AsRef, Deref, From, Into)]
pub struct WorldToCamera(pub Matrix4<f64>);

impl WorldToCamera {
    /// Normalizes a `3x4` or `4x4` extrinsic into a homogeneous `4x4` matrix.
    pub fn from_extrinsic(extrinsic: ArrayView2<f64>) -> Result<Self> {
        let (rows, cols) = extrinsic.dim();
        if !(rows == 3 || rows == 4) || cols != 4 {
            return Err(ReconstructionError::InvalidInput(format!(
                "extrinsic must be 3x4 or 4x4, got {}x{}",
                rows, cols
            )));
        }
        let mut matrix = Matrix4::identity();
        for r in 0..3 {
            for c in 0..4 {
                matrix[(r, c)] = extrinsic[[r, c]];
            }
        }
        Ok(Self(matrix))
    }

    pub fn transform_point(&self, point: &Point3<f64>) -> Point3<f64> {
        self.0.transform_point(point)
    }

    /// Computes camera-to-world as the inverse of the extrinsic.
    pub fn inverse(&self) -> Result<CameraToWorld> {
        self.0.try_inverse().map(CameraToWorld).ok_or_else(|| {
            ReconstructionError::InvalidInput("extrinsic is not invertible".to_string())
        })
    }
}

/// Maps camera-space points into the oracle's world frame.
#[derive(Debug, Clone, Copy, PartialEq, AsRef, Deref, From, Into)]
pub struct CameraToWorld(pub Matrix4<f64>);

impl CameraToWorld {
    pub fn transform_point(&self, point: &Point3<f64>) -> Point3<f64> {
        self.0.transform_point(point)
    }
}

/// Converts from the oracle's Y-down/Z-forward world into the Y-up/Z-backward asset convention.
#[inline]
pub fn flip_yz(point: Point3<f64>) -> Point3<f64> {
    Point3::new(point.x, -point.y, -point.z)
}
