use std::{io, path::PathBuf};
use thiserror::Error;

pub type Result<T, E = ReconstructionError> = std::result::Result<T, E>;

/// Errors raised by the reconstruction and localization stages.
///
/// Low-confidence results (poor ICP fitness, detections with too few matched points)
/// are not errors. They are returned as values carrying a fitness or as `None`.
#[derive(Debug, Error)]
pub enum ReconstructionError {
    /// A field required by the stage is absent from the oracle output.
    #[error("prediction is missing `{0}`")]
    MissingInput(&'static str),
    /// The input is present but malformed (shape mismatch, singular extrinsic, bad file).
    #[error("invalid input: {0}")]
    InvalidInput(String),
    /// A numeric stage finished but produced no usable geometry.
    #[error("degenerate geometry: {0}")]
    DegenerateGeometry(String),
    /// Asset compression failed. Callers recover by keeping the uncompressed asset.
    #[error("asset compression failed: {0}")]
    Compression(String),
    #[error("asset serialization failed: {0}")]
    Serialization(String),
    #[error("job directory {0:?} already exists")]
    JobDirectoryExists(PathBuf),
    #[error("i/o error: {0}")]
    Io(#[from] io::Error),
}

impl ReconstructionError {
    /// Whether a job hitting this error should surface as `failed`.
    ///
    /// Compression errors are always absorbed where they occur.
    pub fn fails_job(&self) -> bool {
        !matches!(self, Self::Compression(_))
    }

    pub fn is_degenerate(&self) -> bool {
        matches!(self, Self::DegenerateGeometry(_))
    }
}
