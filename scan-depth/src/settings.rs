use serde::{Deserialize, Serialize};

/// Smoothing pass applied after morphological filling.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum Smoothing {
    /// Edge-preserving, slower.
    Bilateral {
        diameter: usize,
        sigma_color: f32,
        sigma_space: f32,
    },
    /// Faster but blurs depth discontinuities. A non-positive sigma derives it from the size.
    Gaussian { kernel_size: usize, sigma: f32 },
}

impl Default for Smoothing {
    fn default() -> Self {
        Smoothing::Bilateral {
            diameter: 9,
            sigma_color: 75.0,
            sigma_space: 75.0,
        }
    }
}

/// The settings for depth completion.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DepthCompletionSettings {
    /// Pixels whose confidence is below this are treated as holes.
    #[serde(default = "default_confidence_threshold")]
    pub confidence_threshold: f32,
    /// Size of the elliptical kernel used to close pinholes.
    #[serde(default = "default_small_kernel_size")]
    pub small_kernel_size: usize,
    /// Size of the elliptical kernel used by the closing pass.
    #[serde(default = "default_large_kernel_size")]
    pub large_kernel_size: usize,
    #[serde(default)]
    pub smoothing: Smoothing,
    /// Whether to run the tall vertical dilation that extrapolates into unobserved ceilings.
    #[serde(default = "default_extrapolate")]
    pub extrapolate: bool,
    /// Width of the vertical extrapolation kernel. Its height is `large_kernel_size`.
    #[serde(default = "default_extrapolate_kernel_width")]
    pub extrapolate_kernel_width: usize,
}

impl Default for DepthCompletionSettings {
    fn default() -> Self {
        Self {
            confidence_threshold: default_confidence_threshold(),
            small_kernel_size: default_small_kernel_size(),
            large_kernel_size: default_large_kernel_size(),
            smoothing: Smoothing::default(),
            extrapolate: default_extrapolate(),
            extrapolate_kernel_width: default_extrapolate_kernel_width(),
        }
    }
}

fn default_confidence_threshold() -> f32 {
    0.3
}

fn default_small_kernel_size() -> usize {
    5
}

fn default_large_kernel_size() -> usize {
    31
}

fn default_extrapolate() -> bool {
    true
}

fn default_extrapolate_kernel_width() -> usize {
    3
}
