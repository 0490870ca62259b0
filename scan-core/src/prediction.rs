use crate::{CameraIntrinsics, ReconstructionError, Result, WorldToCamera};
use nalgebra::Matrix3;
use ndarray::{s, Array3, Array4, ArrayView2, ArrayView3, Axis};
use serde::{Deserialize, Serialize};

/// Everything the depth/pose oracle returns for one job.
///
/// Every field is optional because the oracle may omit any of them. Stages check for
/// the fields they need through [`ViewPrediction::validate`] and [`ViewPrediction::views`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ViewPrediction {
    /// `[N, H, W]` depth in an arbitrary positive scale.
    #[serde(default)]
    pub depth: Option<Array3<f32>>,
    /// `[N, H, W]` confidence in `0..=1`.
    #[serde(default)]
    pub confidence: Option<Array3<f32>>,
    /// `[N, 3, 3]` pinhole intrinsics.
    #[serde(default)]
    pub intrinsics: Option<Array3<f64>>,
    /// `[N, 3, 4]` or `[N, 4, 4]` world-to-camera extrinsics.
    #[serde(default)]
    pub extrinsics: Option<Array3<f64>>,
    /// `[N, H, W, 3]` processed RGB frames.
    #[serde(default)]
    pub colors: Option<Array4<u8>>,
}

/// A borrowed, validated view into one frame of a [`ViewPrediction`].
#[derive(Debug, Clone)]
pub struct View<'a> {
    pub index: usize,
    pub depth: ArrayView2<'a, f32>,
    pub confidence: Option<ArrayView2<'a, f32>>,
    pub intrinsics: CameraIntrinsics,
    pub world_to_camera: WorldToCamera,
    pub colors: Option<ArrayView3<'a, u8>>,
}

impl<'a> View<'a> {
    pub fn height(&self) -> usize {
        self.depth.nrows()
    }

    pub fn width(&self) -> usize {
        self.depth.ncols()
    }

    pub fn color(&self, row: usize, col: usize) -> Option<[u8; 3]> {
        self.colors
            .as_ref()
            .map(|c| [c[[row, col, 0]], c[[row, col, 1]], c[[row, col, 2]]])
    }
}

impl ViewPrediction {
    pub fn new(depth: Array3<f32>, intrinsics: Array3<f64>, extrinsics: Array3<f64>) -> Self {
        Self {
            depth: Some(depth),
            intrinsics: Some(intrinsics),
            extrinsics: Some(extrinsics),
            ..Default::default()
        }
    }

    pub fn with_confidence(self, confidence: Array3<f32>) -> Self {
        Self {
            confidence: Some(confidence),
            ..self
        }
    }

    pub fn with_colors(self, colors: Array4<u8>) -> Self {
        Self {
            colors: Some(colors),
            ..self
        }
    }

    /// Number of views, taken from the depth stack.
    pub fn len(&self) -> usize {
        self.depth.as_ref().map_or(0, |d| d.len_of(Axis(0)))
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Checks presence of the geometric fields and the shape invariants across fields.
    pub fn validate(&self) -> Result<()> {
        let depth = self
            .depth
            .as_ref()
            .ok_or(ReconstructionError::MissingInput("depth"))?;
        let intrinsics = self
            .intrinsics
            .as_ref()
            .ok_or(ReconstructionError::MissingInput("intrinsics"))?;
        let extrinsics = self
            .extrinsics
            .as_ref()
            .ok_or(ReconstructionError::MissingInput("extrinsics"))?;

        let (n, h, w) = depth.dim();
        let mismatch = |what: &str, got: String| {
            Err(ReconstructionError::InvalidInput(format!(
                "{} has shape {} but depth is [{}, {}, {}]",
                what, got, n, h, w
            )))
        };
        if intrinsics.dim() != (n, 3, 3) {
            return mismatch("intrinsics", format!("{:?}", intrinsics.shape()));
        }
        let (en, er, ec) = extrinsics.dim();
        if en != n || !(er == 3 || er == 4) || ec != 4 {
            return mismatch("extrinsics", format!("{:?}", extrinsics.shape()));
        }
        if let Some(confidence) = &self.confidence {
            if confidence.dim() != (n, h, w) {
                return mismatch("confidence", format!("{:?}", confidence.shape()));
            }
        }
        if let Some(colors) = &self.colors {
            if colors.dim() != (n, h, w, 3) {
                return mismatch("colors", format!("{:?}", colors.shape()));
            }
        }
        Ok(())
    }

    /// Borrows view `index` after validating the whole prediction.
    pub fn view(&self, index: usize) -> Result<View<'_>> {
        self.validate()?;
        if index >= self.len() {
            return Err(ReconstructionError::InvalidInput(format!(
                "view {} out of range for {} views",
                index,
                self.len()
            )));
        }
        self.view_unchecked(index)
    }

    /// Borrows every view after validating the whole prediction once.
    pub fn views(&self) -> Result<Vec<View<'_>>> {
        self.validate()?;
        (0..self.len()).map(|i| self.view_unchecked(i)).collect()
    }

    fn view_unchecked(&self, index: usize) -> Result<View<'_>> {
        let depth = self
            .depth
            .as_ref()
            .ok_or(ReconstructionError::MissingInput("depth"))?;
        let intrinsics = self
            .intrinsics
            .as_ref()
            .ok_or(ReconstructionError::MissingInput("intrinsics"))?;
        let extrinsics = self
            .extrinsics
            .as_ref()
            .ok_or(ReconstructionError::MissingInput("extrinsics"))?;

        let k = intrinsics.slice(s![index, .., ..]);
        let k = Matrix3::from_fn(|r, c| k[[r, c]]);
        Ok(View {
            index,
            depth: depth.index_axis(Axis(0), index),
            confidence: self
                .confidence
                .as_ref()
                .map(|c| c.index_axis(Axis(0), index)),
            intrinsics: CameraIntrinsics::from_matrix(&k),
            world_to_camera: WorldToCamera::from_extrinsic(
                extrinsics.index_axis(Axis(0), index),
            )?,
            colors: self.colors.as_ref().map(|c| c.index_axis(Axis(0), index)),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{Array3, Array4};

    fn identity_extrinsics(n: usize) -> Array3<f64> {
        let mut e = Array3::zeros((n, 3, 4));
        for i in 0..n {
            for d in 0..3 {
                e[[i, d, d]] = 1.0;
            }
        }
        e
    }

    fn identity_intrinsics(n: usize) -> Array3<f64> {
        let mut k = Array3::zeros((n, 3, 3));
        for i in 0..n {
            for d in 0..3 {
                k[[i, d, d]] = 1.0;
            }
        }
        k
    }

    #[test]
    fn missing_fields_are_reported_by_name() {
        let prediction = ViewPrediction {
            depth: Some(Array3::ones((1, 2, 2))),
            ..Default::default()
        };
        match prediction.validate() {
            Err(ReconstructionError::MissingInput(field)) => assert_eq!(field, "intrinsics"),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn color_shape_must_match_depth() {
        let prediction = ViewPrediction::new(
            Array3::ones((2, 4, 4)),
            identity_intrinsics(2),
            identity_extrinsics(2),
        )
        .with_colors(Array4::zeros((2, 4, 5, 3)));
        assert!(matches!(
            prediction.validate(),
            Err(ReconstructionError::InvalidInput(_))
        ));
    }

    #[test]
    fn views_borrow_each_frame() {
        let prediction = ViewPrediction::new(
            Array3::ones((3, 2, 5)),
            identity_intrinsics(3),
            identity_extrinsics(3),
        );
        let views = prediction.views().unwrap();
        assert_eq!(views.len(), 3);
        assert_eq!(views[2].index, 2);
        assert_eq!((views[0].height(), views[0].width()), (2, 5));
        assert!(views[0].color(0, 0).is_none());
    }
}
