//! Smoothing filters applied after morphological filling.
//!
//! Borders are handled by reflecting about the edge pixel without repeating it
//! (`gfedcb|abcdefgh|gfedcba`).

use ndarray::Array2;

/// Reflects `i` into `0..n` without duplicating the border pixel.
#[inline]
fn reflect101(i: isize, n: usize) -> usize {
    let n = n as isize;
    if n == 1 {
        return 0;
    }
    let period = 2 * (n - 1);
    let mut i = i.rem_euclid(period);
    if i >= n {
        i = period - i;
    }
    i as usize
}

/// The binomial kernel used for a 5-tap Gaussian when no sigma is given.
const GAUSSIAN_5: [f32; 5] = [1.0 / 16.0, 4.0 / 16.0, 6.0 / 16.0, 4.0 / 16.0, 1.0 / 16.0];

/// The Gaussian function.
fn gaussian(x: f32, sigma: f32) -> f32 {
    (-x.powi(2) / (2.0 * sigma.powi(2))).exp()
}

/// Generates a normalized Gaussian kernel of `kernel_size` taps, rounded up to odd.
///
/// A non-positive `sigma` selects the fixed 5-tap binomial kernel for size 5 and
/// otherwise derives sigma from the size.
pub fn gaussian_kernel(sigma: f32, kernel_size: usize) -> Vec<f32> {
    let kernel_size = kernel_size | 1;
    if sigma <= 0.0 && kernel_size == 5 {
        return GAUSSIAN_5.to_vec();
    }
    let sigma = if sigma > 0.0 {
        sigma
    } else {
        0.3 * ((kernel_size as f32 - 1.0) * 0.5 - 1.0) + 0.8
    };
    let half = (kernel_size / 2) as i32;
    let mut kernel: Vec<f32> = (-half..=half).map(|i| gaussian(i as f32, sigma)).collect();
    let sum: f32 = kernel.iter().sum();
    kernel.iter_mut().for_each(|v| *v /= sum);
    kernel
}

/// Separable Gaussian blur of a `u16` image, rounding back to integers.
pub fn gaussian_blur(image: &Array2<u16>, kernel_size: usize, sigma: f32) -> Array2<u16> {
    let (height, width) = image.dim();
    if height == 0 || width == 0 {
        return image.clone();
    }
    let kernel = gaussian_kernel(sigma, kernel_size);
    let half = (kernel.len() / 2) as isize;

    let mut horizontal = Array2::<f32>::zeros((height, width));
    for y in 0..height {
        for x in 0..width {
            horizontal[[y, x]] = kernel
                .iter()
                .enumerate()
                .map(|(k, w)| {
                    let sx = reflect101(x as isize + k as isize - half, width);
                    w * image[[y, sx]] as f32
                })
                .sum();
        }
    }

    Array2::from_shape_fn((height, width), |(y, x)| {
        let v: f32 = kernel
            .iter()
            .enumerate()
            .map(|(k, w)| {
                let sy = reflect101(y as isize + k as isize - half, height);
                w * horizontal[[sy, x]]
            })
            .sum();
        v.round().clamp(0.0, u16::MAX as f32) as u16
    })
}

/// Edge-preserving bilateral filter over a circular window of the given `diameter`.
///
/// Values are truncated back to `u16`.
pub fn bilateral_filter(
    image: &Array2<u16>,
    diameter: usize,
    sigma_color: f32,
    sigma_space: f32,
) -> Array2<u16> {
    let (height, width) = image.dim();
    if height == 0 || width == 0 {
        return image.clone();
    }
    let radius = (diameter / 2).max(1) as isize;
    let space_coeff = -0.5 / (sigma_space * sigma_space);
    let color_coeff = -0.5 / (sigma_color * sigma_color);

    let taps: Vec<(isize, isize, f32)> = (-radius..=radius)
        .flat_map(|dy| (-radius..=radius).map(move |dx| (dy, dx)))
        .filter(|&(dy, dx)| ((dy * dy + dx * dx) as f32).sqrt() <= radius as f32)
        .map(|(dy, dx)| (dy, dx, ((dy * dy + dx * dx) as f32 * space_coeff).exp()))
        .collect();

    Array2::from_shape_fn((height, width), |(y, x)| {
        let center = image[[y, x]] as f32;
        let (sum, norm) = taps
            .iter()
            .fold((0.0f32, 0.0f32), |(sum, norm), &(dy, dx, ws)| {
                let sy = reflect101(y as isize + dy, height);
                let sx = reflect101(x as isize + dx, width);
                let v = image[[sy, sx]] as f32;
                let diff = v - center;
                let w = ws * (diff * diff * color_coeff).exp();
                (sum + w * diff, norm + w)
            });
        (center + sum / norm).clamp(0.0, u16::MAX as f32) as u16
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reflect101_indices() {
        let idx: Vec<usize> = (-3..8).map(|i| reflect101(i, 5)).collect();
        assert_eq!(idx, vec![3, 2, 1, 0, 1, 2, 3, 4, 3, 2, 1]);
        assert_eq!(reflect101(-4, 1), 0);
    }

    #[test]
    fn gaussian_kernel_correct() {
        let kernel = gaussian_kernel(3.0, 7);
        let known_correct_kernel = [
            0.1062_8852,
            0.1403_2133,
            0.1657_7007,
            0.1752_4014,
            0.1657_7007,
            0.1403_2133,
            0.1062_8852,
        ];
        for (i, j) in kernel.iter().zip(known_correct_kernel.iter()) {
            assert!(f32::abs(*i - *j) < 0.0001);
        }
        assert_eq!(gaussian_kernel(0.0, 5), GAUSSIAN_5.to_vec());
    }

    #[test]
    fn even_kernel_sizes_round_up() {
        assert_eq!(gaussian_kernel(0.0, 4), GAUSSIAN_5.to_vec());
        let kernel = gaussian_kernel(1.5, 6);
        assert_eq!(kernel.len(), 7);
        assert!((kernel.iter().sum::<f32>() - 1.0).abs() < 1e-5);
        assert_eq!(gaussian_kernel(0.0, 0), vec![1.0]);
    }

    #[test]
    fn filters_keep_flat_images_flat() {
        let image = Array2::from_elem((6, 9), 1234u16);
        assert_eq!(gaussian_blur(&image, 5, 0.0), image);
        assert_eq!(bilateral_filter(&image, 9, 75.0, 75.0), image);
    }

    #[test]
    fn bilateral_keeps_strong_edges() {
        let image = Array2::from_shape_fn((8, 8), |(_, x)| if x < 4 { 1000u16 } else { 60000 });
        let out = bilateral_filter(&image, 9, 75.0, 75.0);
        assert_eq!(out[[4, 3]], 1000);
        assert_eq!(out[[4, 4]], 60000);
    }
}
