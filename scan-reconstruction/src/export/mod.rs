//! Writers for the asset formats served to the viewer.

pub mod glb;
pub mod ply;

pub use glb::{write_mesh_glb, write_points_glb};
pub use ply::{write_mesh_ply, write_points_ply};

use scan_core::Result;
use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

/// Creates `path` and hands a buffered writer to `write`, returning the size of the file.
pub(crate) fn write_file(
    path: &Path,
    write: impl FnOnce(&mut BufWriter<File>) -> Result<()>,
) -> Result<u64> {
    let mut writer = BufWriter::new(File::create(path)?);
    write(&mut writer)?;
    writer.into_inner().map_err(|e| e.into_error())?.sync_all()?;
    Ok(std::fs::metadata(path)?.len())
}
