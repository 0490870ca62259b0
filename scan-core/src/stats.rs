//! Order statistics used throughout the pipeline.
//!
//! Percentiles interpolate linearly between the two closest ranks.

use float_ord::FloatOrd;
use nalgebra::Point3;

/// Returns the `q`-th percentile (`0..=100`) of `values`, reordering them in place.
///
/// NaNs must be filtered out by the caller.
pub fn percentile(values: &mut [f64], q: f64) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    values.sort_unstable_by_key(|&v| FloatOrd(v));
    let rank = (q.clamp(0.0, 100.0) / 100.0) * (values.len() - 1) as f64;
    let lo = rank.floor() as usize;
    let hi = rank.ceil() as usize;
    let frac = rank - lo as f64;
    Some(values[lo] + (values[hi] - values[lo]) * frac)
}

pub fn median(values: &mut [f64]) -> Option<f64> {
    percentile(values, 50.0)
}

/// Component-wise median of a point set.
pub fn median_point<'a>(points: impl IntoIterator<Item = &'a Point3<f64>>) -> Option<Point3<f64>> {
    let (mut xs, mut ys, mut zs) = (vec![], vec![], vec![]);
    for p in points {
        xs.push(p.x);
        ys.push(p.y);
        zs.push(p.z);
    }
    Some(Point3::new(
        median(&mut xs)?,
        median(&mut ys)?,
        median(&mut zs)?,
    ))
}

/// Median of an iterator of depth samples, skipping non-finite and non-positive values.
pub fn median_valid_depth(samples: impl IntoIterator<Item = f32>) -> Option<f64> {
    let mut valid: Vec<f64> = samples
        .into_iter()
        .filter(|d| d.is_finite() && *d > 0.0)
        .map(f64::from)
        .collect();
    median(&mut valid)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn percentile_interpolates() {
        let mut v = vec![4.0, 1.0, 3.0, 2.0];
        assert_relative_eq!(median(&mut v).unwrap(), 2.5);
        assert_relative_eq!(percentile(&mut v, 0.0).unwrap(), 1.0);
        assert_relative_eq!(percentile(&mut v, 100.0).unwrap(), 4.0);
        assert_relative_eq!(percentile(&mut v, 5.0).unwrap(), 1.15);
    }

    #[test]
    fn empty_has_no_median() {
        assert!(median(&mut []).is_none());
        assert!(median_point(&[]).is_none());
        assert!(median_valid_depth(vec![0.0, f32::NAN, -1.0]).is_none());
    }

    #[test]
    fn median_point_is_componentwise() {
        let points = [
            Point3::new(0.0, 10.0, -1.0),
            Point3::new(1.0, 0.0, 5.0),
            Point3::new(100.0, 1.0, 0.0),
        ];
        assert_eq!(median_point(&points).unwrap(), Point3::new(1.0, 1.0, 0.0));
    }
}
