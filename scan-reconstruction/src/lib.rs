//! # Scan Reconstruction
//!
//! Turns a [`ViewPrediction`](scan_core::ViewPrediction) into browser-ready assets.
//!
//! - [`PointCloudBuilder`] unprojects every view into one colored cloud.
//! - [`LodExporter`] writes that cloud as a handful of binary glTF files with increasing
//!   point budgets.
//! - [`MeshFallbackReconstructor`] fuses the depth maps into a TSDF volume and extracts a
//!   triangle mesh when the point path can not produce anything.
//! - [`ReconstructionJob`] chains these together, reports progress and persists a
//!   `result.json` per job.

mod builder;
pub mod compress;
pub mod export;
pub mod import;
mod job;
mod lod;
pub mod mesh;
mod settings;
mod thumbnail;
pub mod voxel;

pub use builder::*;
pub use compress::{AssetCompressor, Gltfpack};
pub use import::load_reference_cloud;
pub use job::*;
pub use lod::*;
pub use mesh::{MeshFallbackReconstructor, TriangleMesh};
pub use settings::*;
pub use thumbnail::write_thumbnail;
