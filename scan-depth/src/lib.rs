//! # Scan Depth
//!
//! Classical, CPU-only hole filling for monocular depth maps.
//!
//! The depth range of the valid pixels is stretched over the full `u16` range, then:
//!
//! 1. a small elliptical dilation closes pinholes,
//! 2. a large elliptical closing bridges wider gaps,
//! 3. a bilateral (or Gaussian) filter smooths the fill,
//! 4. optionally a tall, narrow dilation extrapolates into unobserved regions such as ceilings.
//!
//! The result is mapped back into the original depth scale and every originally valid pixel
//! is restored bit-for-bit, so the fill never touches good measurements.

pub mod filter;
pub mod morphology;
mod settings;

pub use settings::*;

use log::*;
use morphology::StructuringElement;
use ndarray::{Array2, Array3, ArrayView2, ArrayView3, Axis, Zip};
use rayon::prelude::*;
use scan_core::{ReconstructionError, Result};

/// Fills holes in depth maps.
#[derive(Debug, Clone)]
pub struct DepthCompletion {
    settings: DepthCompletionSettings,
    small_kernel: StructuringElement,
    large_kernel: StructuringElement,
    extrapolate_kernel: StructuringElement,
}

impl Default for DepthCompletion {
    fn default() -> Self {
        Self::new(DepthCompletionSettings::default())
    }
}

impl DepthCompletion {
    pub fn new(settings: DepthCompletionSettings) -> Self {
        Self {
            small_kernel: StructuringElement::ellipse(settings.small_kernel_size),
            large_kernel: StructuringElement::ellipse(settings.large_kernel_size),
            extrapolate_kernel: StructuringElement::rect(
                settings.extrapolate_kernel_width,
                settings.large_kernel_size,
            ),
            settings,
        }
    }

    pub fn settings(&self) -> &DepthCompletionSettings {
        &self.settings
    }

    /// Fills holes in one `[H, W]` depth map.
    ///
    /// A pixel is valid when its depth is finite and positive and, if a confidence map is
    /// given, its confidence is at least the configured threshold. Inputs with no valid
    /// pixels or a zero valid depth range are returned unchanged.
    pub fn complete(
        &self,
        depth: ArrayView2<f32>,
        confidence: Option<ArrayView2<f32>>,
    ) -> Result<Array2<f32>> {
        if let Some(confidence) = &confidence {
            if confidence.dim() != depth.dim() {
                return Err(ReconstructionError::InvalidInput(format!(
                    "confidence {:?} does not match depth {:?}",
                    confidence.shape(),
                    depth.shape()
                )));
            }
        }
        let threshold = self.settings.confidence_threshold;
        let valid = match &confidence {
            Some(confidence) => Zip::from(&depth)
                .and(confidence)
                .map_collect(|&d, &c| c >= threshold && d > 0.0 && d.is_finite()),
            None => depth.map(|&d| d > 0.0 && d.is_finite()),
        };

        let (min, max) = Zip::from(&depth).and(&valid).fold(
            (f64::INFINITY, f64::NEG_INFINITY),
            |(lo, hi), &d, &v| {
                if v {
                    (lo.min(d as f64), hi.max(d as f64))
                } else {
                    (lo, hi)
                }
            },
        );
        if min > max {
            warn!("no valid depth values found, returning the input");
            return Ok(depth.to_owned());
        }
        let range = max - min;
        if range <= 0.0 {
            warn!("zero depth range, returning the input");
            return Ok(depth.to_owned());
        }

        let normalized = Zip::from(&depth).and(&valid).map_collect(|&d, &v| {
            if v {
                ((d as f64 - min) / range * 65535.0) as f32 as u16
            } else {
                0
            }
        });

        let filled = morphology::dilate(&normalized, &self.small_kernel);
        let filled = morphology::close(&filled, &self.large_kernel);
        let filled = match self.settings.smoothing {
            Smoothing::Bilateral {
                diameter,
                sigma_color,
                sigma_space,
            } => filter::bilateral_filter(&filled, diameter, sigma_color, sigma_space),
            Smoothing::Gaussian { kernel_size, sigma } => {
                filter::gaussian_blur(&filled, kernel_size, sigma)
            }
        };
        let filled = if self.settings.extrapolate {
            morphology::dilate(&filled, &self.extrapolate_kernel)
        } else {
            filled
        };

        let mut holes = 0usize;
        let result = Zip::from(&filled)
            .and(&depth)
            .and(&valid)
            .map_collect(|&f, &d, &v| {
                if v {
                    d
                } else {
                    holes += 1;
                    (f as f64 / 65535.0 * range + min) as f32
                }
            });
        debug!("filled {} of {} depth pixels", holes, depth.len());
        Ok(result)
    }

    /// Fills holes in every frame of an `[N, H, W]` stack independently, in parallel.
    pub fn complete_batch(
        &self,
        depth: ArrayView3<f32>,
        confidence: Option<ArrayView3<f32>>,
    ) -> Result<Array3<f32>> {
        if let Some(confidence) = &confidence {
            if confidence.dim() != depth.dim() {
                return Err(ReconstructionError::InvalidInput(format!(
                    "confidence {:?} does not match depth {:?}",
                    confidence.shape(),
                    depth.shape()
                )));
            }
        }
        let frames = (0..depth.len_of(Axis(0)))
            .into_par_iter()
            .map(|i| {
                self.complete(
                    depth.index_axis(Axis(0), i),
                    confidence.as_ref().map(|c| c.index_axis(Axis(0), i)),
                )
            })
            .collect::<Result<Vec<_>>>()?;

        let mut out = Array3::zeros(depth.raw_dim());
        for (mut slot, frame) in out.outer_iter_mut().zip(frames) {
            slot.assign(&frame);
        }
        info!("completed {} depth maps", out.len_of(Axis(0)));
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array2;

    fn ramp(height: usize, width: usize) -> Array2<f32> {
        Array2::from_shape_fn((height, width), |(y, x)| 1.0 + 0.05 * y as f32 + 0.01 * x as f32)
    }

    #[test]
    fn fills_a_hole_within_the_valid_range() {
        let mut depth = ramp(40, 40);
        for y in 18..22 {
            for x in 18..22 {
                depth[[y, x]] = 0.0;
            }
        }
        let out = DepthCompletion::default().complete(depth.view(), None).unwrap();
        let (lo, hi) = (1.0f32, 1.0 + 0.05 * 39.0 + 0.01 * 39.0);
        for y in 18..22 {
            for x in 18..22 {
                assert!(out[[y, x]] > 0.0);
                assert!(out[[y, x]] >= lo - 1e-3 && out[[y, x]] <= hi + 1e-3);
            }
        }
    }

    #[test]
    fn low_confidence_pixels_are_replaced() {
        let depth = ramp(16, 16);
        let mut confidence = Array2::from_elem((16, 16), 0.9f32);
        confidence[[8, 8]] = 0.1;
        let out = DepthCompletion::default()
            .complete(depth.view(), Some(confidence.view()))
            .unwrap();
        for ((y, x), &v) in out.indexed_iter() {
            if (y, x) != (8, 8) {
                assert_eq!(v.to_bits(), depth[[y, x]].to_bits());
            }
        }
    }

    #[test]
    fn degenerate_inputs_pass_through() {
        let completion = DepthCompletion::default();
        let empty = Array2::from_elem((4, 4), f32::NAN);
        let out = completion.complete(empty.view(), None).unwrap();
        assert!(out.iter().all(|v| v.is_nan()));

        let mut flat = Array2::from_elem((4, 4), 2.0f32);
        flat[[1, 1]] = 0.0;
        assert_eq!(completion.complete(flat.view(), None).unwrap(), flat);
    }

    #[test]
    fn gaussian_smoothing_preserves_valid_pixels() {
        let settings = DepthCompletionSettings {
            smoothing: Smoothing::Gaussian {
                kernel_size: 5,
                sigma: 0.0,
            },
            extrapolate: false,
            ..Default::default()
        };
        let mut depth = ramp(20, 30);
        depth[[3, 4]] = 0.0;
        depth[[10, 10]] = f32::INFINITY;
        let out = DepthCompletion::new(settings)
            .complete(depth.view(), None)
            .unwrap();
        assert!(out[[3, 4]].is_finite() && out[[3, 4]] > 0.0);
        assert!(out[[10, 10]].is_finite());
        assert_eq!(out[[0, 0]], depth[[0, 0]]);
    }

    #[test]
    fn even_gaussian_kernel_from_settings_is_accepted() {
        let settings: DepthCompletionSettings = serde_json::from_str(
            r#"{"smoothing": {"kind": "gaussian", "kernel_size": 4, "sigma": 0.0}}"#,
        )
        .unwrap();
        let mut depth = ramp(12, 12);
        depth[[6, 6]] = 0.0;
        let out = DepthCompletion::new(settings)
            .complete(depth.view(), None)
            .unwrap();
        assert!(out[[6, 6]] > 0.0);
        assert_eq!(out[[0, 0]].to_bits(), depth[[0, 0]].to_bits());
    }

    #[test]
    fn rejects_mismatched_confidence() {
        let depth = ramp(4, 4);
        let confidence = Array2::from_elem((4, 5), 1.0f32);
        assert!(DepthCompletion::default()
            .complete(depth.view(), Some(confidence.view()))
            .is_err());
    }
}
