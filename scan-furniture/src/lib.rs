//! # Scan Furniture
//!
//! Places the furniture a 2D detector saw in the processed frames inside the reference
//! scan of the room.
//!
//! [`FurnitureLocalizer`] turns [`Detection2D`](scan_core::Detection2D)s into candidate
//! [`Detection3D`](scan_core::Detection3D)s, either by clustering the reference cloud at
//! the height where a label is expected or, failing that, by projecting the reference
//! cloud into each detection's view. [`DetectionMerger`] collapses candidates that
//! describe the same physical object into one [`Object3D`](scan_core::Object3D).
//! [`FurniturePipeline`] runs the whole thing, including the ICP alignment between the
//! oracle's depth and the reference scan.

mod backproject;
mod dbscan;
mod localize;
mod merge;
mod pipeline;
mod priors;
mod settings;

pub use backproject::*;
pub use dbscan::*;
pub use localize::*;
pub use merge::*;
pub use pipeline::*;
pub use priors::*;
pub use settings::*;
