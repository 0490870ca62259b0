use crate::compress::{compress_in_place, AssetCompressor, Gltfpack};
use crate::export::{write_file, write_mesh_glb};
use crate::{
    write_thumbnail, LodExporter, MeshFallbackReconstructor, PointCloudBuilder,
    ReconstructionSettings,
};
use log::*;
use scan_core::{
    LodAsset, MeshAsset, ProgressSink, ProgressUpdate, ReconstructionError, Result,
    ViewPrediction,
};
use scan_depth::DepthCompletion;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::{mpsc, Arc};
use std::thread::{self, JoinHandle};

pub const RESULT_FILE: &str = "result.json";
pub const THUMBNAIL_FILE: &str = "thumbnail.jpg";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

/// What a finished job produced. This is also what `result.json` holds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobResult {
    pub job_id: String,
    pub status: JobStatus,
    /// Set when the job failed.
    #[serde(default)]
    pub message: Option<String>,
    /// Size of the fused cloud before level-of-detail reduction.
    #[serde(default)]
    pub point_count: usize,
    /// Keyed by level name.
    #[serde(default)]
    pub assets: BTreeMap<String, LodAsset>,
    /// Level name to error message for levels that could not be written.
    #[serde(default)]
    pub failed_levels: BTreeMap<String, String>,
    #[serde(default)]
    pub mesh: Option<MeshAsset>,
    #[serde(default)]
    pub thumbnail: Option<String>,
}

impl JobResult {
    fn new(job_id: &str, status: JobStatus) -> Self {
        Self {
            job_id: job_id.to_string(),
            status,
            message: None,
            point_count: 0,
            assets: BTreeMap::new(),
            failed_levels: BTreeMap::new(),
            mesh: None,
            thumbnail: None,
        }
    }
}

/// A job's private output directory.
#[derive(Debug, Clone)]
pub struct JobWorkspace {
    job_id: String,
    dir: PathBuf,
}

impl JobWorkspace {
    /// Creates `root/job_id`. Fails with [`ReconstructionError::JobDirectoryExists`] if
    /// another job already owns that directory.
    pub fn create(root: &Path, job_id: &str) -> Result<Self> {
        let separator = |c: char| c == '/' || c == '\\';
        if job_id.is_empty() || job_id.contains(separator) || job_id == "." || job_id == ".." {
            return Err(ReconstructionError::InvalidInput(format!(
                "invalid job id {:?}",
                job_id
            )));
        }
        std::fs::create_dir_all(root)?;
        let dir = root.join(job_id);
        match std::fs::create_dir(&dir) {
            Ok(()) => Ok(Self {
                job_id: job_id.to_string(),
                dir,
            }),
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                Err(ReconstructionError::JobDirectoryExists(dir))
            }
            Err(e) => Err(e.into()),
        }
    }

    pub fn job_id(&self) -> &str {
        &self.job_id
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

/// Runs the whole reconstruction for one prediction.
pub struct ReconstructionJob {
    workspace: JobWorkspace,
    settings: ReconstructionSettings,
    compressor: Option<Arc<dyn AssetCompressor + Send + Sync>>,
}

/// A job running on its own thread.
pub struct JobHandle {
    pub progress: mpsc::Receiver<ProgressUpdate>,
    handle: JoinHandle<JobResult>,
}

impl JobHandle {
    /// Waits for the job. Only fails if the worker thread panicked.
    pub fn join(self) -> thread::Result<JobResult> {
        self.handle.join()
    }
}

impl ReconstructionJob {
    pub fn new(workspace: JobWorkspace, settings: ReconstructionSettings) -> Self {
        let compressor: Option<Arc<dyn AssetCompressor + Send + Sync>> =
            if settings.compression.enabled {
                Some(Arc::new(Gltfpack::new(&settings.compression)))
            } else {
                None
            };
        Self {
            workspace,
            settings,
            compressor,
        }
    }

    /// Replaces the compressor chosen from the settings.
    pub fn compressor(self, compressor: Arc<dyn AssetCompressor + Send + Sync>) -> Self {
        Self {
            compressor: Some(compressor),
            ..self
        }
    }

    pub fn workspace(&self) -> &JobWorkspace {
        &self.workspace
    }

    /// Runs the job to completion and persists `result.json`.
    ///
    /// Missing inputs and unrecoverable geometry produce a [`JobStatus::Failed`] result.
    pub fn run(&self, prediction: ViewPrediction, progress: &mut dyn ProgressSink) -> JobResult {
        let job_id = self.workspace.job_id();
        info!("starting reconstruction job {}", job_id);
        let result = match self.execute(prediction, progress) {
            Ok(result) => {
                progress.report(ProgressUpdate::new(
                    "Complete",
                    100.0,
                    "reconstruction complete",
                ));
                result
            }
            Err(e) => {
                error!("job {} failed: {}", job_id, e);
                progress.report(ProgressUpdate::new("Failed", 100.0, e.to_string()));
                let mut result = JobResult::new(job_id, JobStatus::Failed);
                result.message = Some(e.to_string());
                result
            }
        };
        if let Err(e) = self.write_result(&result) {
            error!("unable to save {} for job {}: {}", RESULT_FILE, job_id, e);
        }
        result
    }

    /// Runs the job on a named worker thread, streaming progress through a channel.
    pub fn spawn(self, prediction: ViewPrediction) -> Result<JobHandle> {
        let (sender, receiver) = mpsc::channel();
        let handle = thread::Builder::new()
            .name(format!("reconstruction-{}", self.workspace.job_id()))
            .spawn(move || {
                let mut sink = |update: ProgressUpdate| {
                    // The caller may have stopped listening.
                    sender.send(update).ok();
                };
                self.run(prediction, &mut sink)
            })?;
        Ok(JobHandle {
            progress: receiver,
            handle,
        })
    }

    fn execute(
        &self,
        mut prediction: ViewPrediction,
        progress: &mut dyn ProgressSink,
    ) -> Result<JobResult> {
        let dir = self.workspace.dir();
        let mut result = JobResult::new(self.workspace.job_id(), JobStatus::Completed);
        prediction.validate()?;

        if self.settings.complete_depth {
            progress.report(ProgressUpdate::new(
                "Completing depth",
                30.0,
                format!("filling holes in {} depth maps", prediction.len()),
            ));
            complete_depth(&mut prediction, &self.settings)?;
        }

        progress.report(ProgressUpdate::new(
            "Building point cloud",
            45.0,
            format!("unprojecting {} views", prediction.len()),
        ));
        let builder = PointCloudBuilder::new(self.settings.point_cloud.clone());
        let cloud = match builder.build(&prediction) {
            Ok(cloud) => Some(cloud),
            Err(e) if e.is_degenerate() => {
                warn!("point cloud export unavailable: {}", e);
                None
            }
            Err(e) => return Err(e),
        };

        if let Some(cloud) = &cloud {
            result.point_count = cloud.len();
            let mut exporter = LodExporter::new(self.settings.lod.clone());
            if let Some(compressor) = &self.compressor {
                exporter = exporter.compressor(compressor.clone());
            }
            let report = exporter.export(cloud, dir, &self.asset_url(), |tier, done, total| {
                progress.report(ProgressUpdate::new(
                    "Exporting LODs",
                    60.0 + 30.0 * done as f32 / total.max(1) as f32,
                    format!("exporting {} level", tier.name),
                ))
            });
            result.assets = report
                .assets
                .into_iter()
                .map(|asset| (asset.level.clone(), asset))
                .collect();
            result.failed_levels = report.failures.into_iter().collect();
        }

        if result.assets.is_empty() {
            progress.report(ProgressUpdate::new(
                "Meshing",
                90.0,
                "no point cloud level was written, fusing a mesh",
            ));
            result.mesh = Some(self.export_mesh(&prediction)?);
        }

        if self.settings.thumbnail_size > 0 {
            let path = dir.join(THUMBNAIL_FILE);
            match write_thumbnail(&prediction, &path, self.settings.thumbnail_size) {
                Ok(true) => result.thumbnail = Some(THUMBNAIL_FILE.to_string()),
                Ok(false) => debug!("no frames for a thumbnail"),
                Err(e) => warn!("unable to write thumbnail: {}", e),
            }
        }
        Ok(result)
    }

    fn export_mesh(&self, prediction: &ViewPrediction) -> Result<MeshAsset> {
        let mesh =
            MeshFallbackReconstructor::new(self.settings.mesh.clone()).reconstruct(prediction)?;
        let filename = format!("{}_mesh.glb", self.settings.lod.file_stem);
        let path = self.workspace.dir().join(&filename);
        let mut file_size_bytes = write_file(&path, |w| write_mesh_glb(&mesh, w))?;
        let compressed = match &self.compressor {
            Some(compressor) => compress_in_place(compressor.as_ref(), &path),
            None => false,
        };
        if compressed {
            file_size_bytes = std::fs::metadata(&path)?.len();
        }
        info!("wrote fallback mesh {} ({} bytes)", filename, file_size_bytes);
        Ok(MeshAsset {
            url: format!("{}/{}", self.asset_url(), filename),
            filename,
            path,
            format: "glb".to_string(),
            vertex_count: mesh.vertex_count(),
            triangle_count: mesh.triangle_count(),
            file_size_bytes,
            compressed,
        })
    }

    fn asset_url(&self) -> String {
        format!(
            "{}/{}",
            self.settings.asset_url_prefix.trim_end_matches('/'),
            self.workspace.job_id()
        )
    }

    fn write_result(&self, result: &JobResult) -> Result<()> {
        let file = File::create(self.workspace.dir().join(RESULT_FILE))?;
        serde_json::to_writer_pretty(file, result)
            .map_err(|e| ReconstructionError::Serialization(e.to_string()))
    }
}

/// Fills depth holes in place. Confidence is dropped since filled pixels have none.
fn complete_depth(
    prediction: &mut ViewPrediction,
    settings: &ReconstructionSettings,
) -> Result<()> {
    let depth = prediction
        .depth
        .as_ref()
        .ok_or(ReconstructionError::MissingInput("depth"))?;
    let completion = DepthCompletion::new(settings.depth_completion);
    let filled = completion.complete_batch(
        depth.view(),
        prediction.confidence.as_ref().map(|c| c.view()),
    )?;
    prediction.depth = Some(filled);
    prediction.confidence = None;
    Ok(())
}
