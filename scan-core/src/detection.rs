use nalgebra::Point3;
use ndarray::Array2;
use serde::{Deserialize, Serialize};

/// A 2D furniture detection in one processed frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection2D {
    pub label: String,
    pub confidence: f64,
    /// `[x1, y1, x2, y2]` in pixel coordinates of the frame.
    pub bbox: [f64; 4],
    /// Optional `[H, W]` instance mask in the same pixel space as `bbox`.
    #[serde(default)]
    pub mask: Option<Array2<bool>>,
    pub frame_index: usize,
}

/// A pixel rectangle `[x1, x2) x [y1, y2)` clamped to an image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PixelRect {
    pub x1: usize,
    pub y1: usize,
    pub x2: usize,
    pub y2: usize,
}

impl PixelRect {
    pub fn width(&self) -> usize {
        self.x2 - self.x1
    }

    pub fn height(&self) -> usize {
        self.y2 - self.y1
    }

    /// Shrinks the rectangle by a quarter of its size on every side.
    pub fn inner_half(&self) -> PixelRect {
        let mx = self.width() / 4;
        let my = self.height() / 4;
        PixelRect {
            x1: self.x1 + mx,
            y1: self.y1 + my,
            x2: self.x2 - mx,
            y2: self.y2 - my,
        }
    }
}

impl Detection2D {
    pub fn new(label: impl Into<String>, confidence: f64, bbox: [f64; 4], frame_index: usize) -> Self {
        Self {
            label: label.into(),
            confidence,
            bbox,
            mask: None,
            frame_index,
        }
    }

    pub fn with_mask(self, mask: Array2<bool>) -> Self {
        Self {
            mask: Some(mask),
            ..self
        }
    }

    /// Truncates the bbox to integers and clamps it to a `width x height` image.
    ///
    /// Returns `None` when nothing of the box remains.
    pub fn pixel_rect(&self, width: usize, height: usize) -> Option<PixelRect> {
        let clamp = |v: f64, hi: usize| (v.max(0.0) as usize).min(hi);
        let [x1, y1, x2, y2] = self.bbox;
        let rect = PixelRect {
            x1: clamp(x1, width),
            y1: clamp(y1, height),
            x2: clamp(x2, width),
            y2: clamp(y2, height),
        };
        (rect.x2 > rect.x1 && rect.y2 > rect.y1).then(|| rect)
    }
}

/// A candidate 3D location of a detected object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection3D {
    pub label: String,
    pub center: Point3<f64>,
    pub confidence: f64,
    pub points: Vec<Point3<f64>>,
    pub frame_index: usize,
}

/// One de-duplicated physical object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Object3D {
    pub label: String,
    pub center: Point3<f64>,
    pub confidence: f64,
    /// Marker color, RGB in `0..=1`.
    pub color: [f64; 3],
    pub points: Vec<Point3<f64>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pixel_rect_clamps_to_image() {
        let det = Detection2D::new("chair", 0.9, [-5.0, 2.7, 120.0, 40.2], 0);
        let rect = det.pixel_rect(100, 30).unwrap();
        assert_eq!(
            rect,
            PixelRect {
                x1: 0,
                y1: 2,
                x2: 100,
                y2: 30
            }
        );
        assert_eq!(
            rect.inner_half(),
            PixelRect {
                x1: 25,
                y1: 9,
                x2: 75,
                y2: 23
            }
        );
    }

    #[test]
    fn empty_rect_is_none() {
        let det = Detection2D::new("tv", 0.5, [50.0, 10.0, 50.0, 20.0], 0);
        assert!(det.pixel_rect(100, 100).is_none());
    }
}
