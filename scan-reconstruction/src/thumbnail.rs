use image::{imageops::FilterType, DynamicImage, ImageFormat, RgbImage};
use scan_core::{ReconstructionError, Result, ViewPrediction};
use std::path::Path;

/// Saves the first frame of the prediction as a JPEG whose longest side is at most `max_side`.
///
/// Returns `false` when the prediction has no frames.
pub fn write_thumbnail(prediction: &ViewPrediction, path: &Path, max_side: u32) -> Result<bool> {
    let colors = match &prediction.colors {
        Some(colors) if !colors.is_empty() => colors,
        _ => return Ok(false),
    };
    let (_, height, width, _) = colors.dim();
    let pixels = colors
        .index_axis(ndarray::Axis(0), 0)
        .iter()
        .copied()
        .collect();
    let frame = RgbImage::from_raw(width as u32, height as u32, pixels).ok_or_else(|| {
        ReconstructionError::InvalidInput("frame does not hold RGB pixels".to_string())
    })?;
    let frame = DynamicImage::ImageRgb8(frame);
    let frame = if frame.width().max(frame.height()) > max_side {
        frame.resize(max_side, max_side, FilterType::Triangle)
    } else {
        frame
    };
    frame
        .save_with_format(path, ImageFormat::Jpeg)
        .map_err(|e| ReconstructionError::Serialization(e.to_string()))?;
    Ok(true)
}
