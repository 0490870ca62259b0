//! # Scan Align
//!
//! Registers the sparse cloud built from oracle depth onto a reference scan.
//!
//! The two clouds come from unrelated coordinate systems, and monocular depth only
//! knows its geometry up to scale. [`IcpAligner`] therefore estimates a uniform scale
//! from the bounding boxes first, seeds the translation from the centroids, and only
//! then refines rotation and translation with point-to-plane ICP.
//!
//! A poor fit is not an error. Check [`AlignmentTransform::fitness`](scan_core::AlignmentTransform)
//! before trusting the result.

mod icp;
mod index;
mod normals;
mod settings;

pub use icp::*;
pub use index::*;
pub use normals::*;
pub use settings::*;
