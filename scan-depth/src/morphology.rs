//! Grayscale morphology on `u16` images.
//!
//! Structuring elements are stored as horizontal runs, one per kernel row. Every run is
//! symmetric about the anchor column, which holds for ellipses and rectangles anchored
//! at their center. This lets each row be reduced with a sliding-window extreme and
//! the rows combined afterwards.

use ndarray::Array2;
use std::collections::{BTreeMap, VecDeque};

/// A symmetric structuring element anchored at its center.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StructuringElement {
    /// `(row offset, half width)` of every kernel row.
    rows: Vec<(isize, usize)>,
}

impl StructuringElement {
    /// The elliptical element OpenCV produces for `MORPH_ELLIPSE` with an odd `size`.
    pub fn ellipse(size: usize) -> Self {
        let r = (size / 2) as isize;
        if r == 0 {
            return Self { rows: vec![(0, 0)] };
        }
        let inv_r2 = 1.0 / (r * r) as f64;
        let rows = (-r..=r)
            .map(|dy| {
                let dx = (r as f64 * (((r * r - dy * dy) as f64) * inv_r2).sqrt()).round();
                (dy, dx as usize)
            })
            .collect();
        Self { rows }
    }

    /// A `width x height` rectangle. Both dimensions should be odd.
    pub fn rect(width: usize, height: usize) -> Self {
        let half_h = (height / 2) as isize;
        Self {
            rows: (-half_h..=half_h).map(|dy| (dy, width / 2)).collect(),
        }
    }

    /// Number of pixels covered by the element.
    pub fn area(&self) -> usize {
        self.rows.iter().map(|&(_, half)| 2 * half + 1).sum()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Extreme {
    Max,
    Min,
}

impl Extreme {
    fn keeps(self, kept: u16, incoming: u16) -> bool {
        match self {
            Extreme::Max => kept > incoming,
            Extreme::Min => kept < incoming,
        }
    }

    fn pick(self, a: u16, b: u16) -> u16 {
        match self {
            Extreme::Max => a.max(b),
            Extreme::Min => a.min(b),
        }
    }

    fn neutral(self) -> u16 {
        match self {
            Extreme::Max => u16::MIN,
            Extreme::Min => u16::MAX,
        }
    }
}

/// Writes the extreme of `row[x - half..=x + half]` into `out[x]`, ignoring pixels past the ends.
fn sliding_extreme(row: &[u16], half: usize, extreme: Extreme, out: &mut [u16]) {
    let n = row.len();
    let mut window: VecDeque<usize> = VecDeque::with_capacity(2 * half + 1);
    let mut next = 0;
    for (x, o) in out.iter_mut().enumerate() {
        let hi = (x + half).min(n - 1);
        while next <= hi {
            while let Some(&back) = window.back() {
                if extreme.keeps(row[back], row[next]) {
                    break;
                }
                window.pop_back();
            }
            window.push_back(next);
            next += 1;
        }
        let lo = x.saturating_sub(half);
        while let Some(&front) = window.front() {
            if front >= lo {
                break;
            }
            window.pop_front();
        }
        *o = window.front().map_or(extreme.neutral(), |&i| row[i]);
    }
}

fn morph(image: &Array2<u16>, element: &StructuringElement, extreme: Extreme) -> Array2<u16> {
    let (height, width) = image.dim();
    if height == 0 || width == 0 {
        return image.clone();
    }

    // One horizontally-reduced image per distinct run width.
    let mut reduced: BTreeMap<usize, Array2<u16>> = BTreeMap::new();
    for &(_, half) in &element.rows {
        reduced.entry(half).or_insert_with(|| {
            let mut out = Array2::zeros((height, width));
            for (row_in, mut row_out) in image.outer_iter().zip(out.outer_iter_mut()) {
                let row_in = row_in.to_vec();
                let mut buffer = vec![0u16; width];
                sliding_extreme(&row_in, half, extreme, &mut buffer);
                row_out
                    .iter_mut()
                    .zip(buffer)
                    .for_each(|(o, v)| *o = v);
            }
            out
        });
    }

    let mut output = Array2::from_elem((height, width), extreme.neutral());
    for &(dy, half) in &element.rows {
        let source = &reduced[&half];
        for y in 0..height {
            let sy = y as isize + dy;
            if sy < 0 || sy >= height as isize {
                continue;
            }
            let sy = sy as usize;
            for x in 0..width {
                output[[y, x]] = extreme.pick(output[[y, x]], source[[sy, x]]);
            }
        }
    }
    output
}

/// Grayscale dilation. Pixels outside the image do not contribute.
pub fn dilate(image: &Array2<u16>, element: &StructuringElement) -> Array2<u16> {
    morph(image, element, Extreme::Max)
}

/// Grayscale erosion. Pixels outside the image do not contribute.
pub fn erode(image: &Array2<u16>, element: &StructuringElement) -> Array2<u16> {
    morph(image, element, Extreme::Min)
}

/// Morphological closing: dilation followed by erosion with the same element.
pub fn close(image: &Array2<u16>, element: &StructuringElement) -> Array2<u16> {
    erode(&dilate(image, element), element)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn ellipse_matches_opencv_5x5() {
        let e = StructuringElement::ellipse(5);
        assert_eq!(e.rows, vec![(-2, 0), (-1, 2), (0, 2), (1, 2), (2, 0)]);
        assert_eq!(e.area(), 17);
    }

    #[test]
    fn dilate_spreads_a_single_pixel() {
        let mut image = Array2::zeros((5, 5));
        image[[2, 2]] = 9u16;
        let out = dilate(&image, &StructuringElement::ellipse(5));
        assert_eq!(out[[2, 0]], 9);
        assert_eq!(out[[0, 2]], 9);
        assert_eq!(out[[0, 1]], 0);
        assert_eq!(out[[1, 0]], 9);
    }

    #[test]
    fn closing_fills_a_pinhole() {
        let image = array![
            [5u16, 5, 5, 5],
            [5, 0, 5, 5],
            [5, 5, 5, 5],
            [5, 5, 5, 5]
        ];
        let out = close(&image, &StructuringElement::rect(3, 3));
        assert!(out.iter().all(|&v| v == 5));
    }

    #[test]
    fn vertical_rect_only_reaches_up_and_down() {
        let mut image = Array2::zeros((7, 3));
        image[[3, 1]] = 4u16;
        let out = dilate(&image, &StructuringElement::rect(1, 7));
        for y in 0..7 {
            assert_eq!(out[[y, 1]], 4);
            assert_eq!(out[[y, 0]], 0);
        }
    }

    #[test]
    fn sliding_extreme_clips_at_edges() {
        let row = [3u16, 1, 4, 1, 5, 9, 2, 6];
        let mut out = [0u16; 8];
        sliding_extreme(&row, 1, Extreme::Max, &mut out);
        assert_eq!(out, [3, 4, 4, 5, 9, 9, 9, 6]);
        sliding_extreme(&row, 1, Extreme::Min, &mut out);
        assert_eq!(out, [1, 1, 1, 1, 1, 2, 2, 2]);
    }
}
