use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Descriptor of one exported level-of-detail asset.
///
/// `point_count` and `file_size_bytes` are what was actually written, not what was requested.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LodAsset {
    pub level: String,
    pub filename: String,
    pub path: PathBuf,
    pub url: String,
    pub format: String,
    pub point_count: usize,
    pub file_size_bytes: u64,
    pub compressed: bool,
}

/// Descriptor of a fallback triangle mesh asset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MeshAsset {
    pub filename: String,
    pub path: PathBuf,
    pub url: String,
    pub format: String,
    pub vertex_count: usize,
    pub triangle_count: usize,
    pub file_size_bytes: u64,
    pub compressed: bool,
}

/// A progress milestone of a job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressUpdate {
    pub stage: String,
    /// Percentage in `0..=100`.
    pub progress: f32,
    pub message: String,
}

impl ProgressUpdate {
    pub fn new(stage: impl Into<String>, progress: f32, message: impl Into<String>) -> Self {
        Self {
            stage: stage.into(),
            progress: progress.clamp(0.0, 100.0),
            message: message.into(),
        }
    }
}

/// Receives progress milestones from a running job.
pub trait ProgressSink {
    fn report(&mut self, update: ProgressUpdate);
}

impl<F> ProgressSink for F
where
    F: FnMut(ProgressUpdate),
{
    fn report(&mut self, update: ProgressUpdate) {
        self(update)
    }
}
