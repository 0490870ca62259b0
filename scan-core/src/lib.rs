//! # Scan Core
//!
//! This crate holds the types shared by every stage of the room scan pipeline.
//! The depth/pose oracle hands us a [`ViewPrediction`], which is unprojected into a
//! [`PointCloud`], exported as [`LodAsset`]s, and (on the furniture side) matched
//! against [`Detection2D`]s to produce [`Detection3D`]s and finally [`Object3D`]s.
//!
//! ## Coordinate conventions
//!
//! Oracle extrinsics are **world-to-camera** ([`WorldToCamera`]) with the camera looking
//! down `+Z` and `+Y` pointing down the image. Exported assets use a `Y`-up, `Z`-backward
//! convention, which is obtained by negating `Y` and `Z` (see [`flip_yz`]).

mod alignment;
mod asset;
mod camera;
mod cloud;
mod detection;
mod error;
mod prediction;
pub mod stats;

pub use alignment::*;
pub use asset::*;
pub use camera::*;
pub use cloud::*;
pub use detection::*;
pub use error::*;
pub use prediction::*;

pub use nalgebra;
pub use ndarray;
