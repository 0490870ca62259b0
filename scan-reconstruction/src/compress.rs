//! Optional post-processing of written glTF files by an external optimizer.
//!
//! Compression never fails a job. Any error leaves the uncompressed file in place.

use crate::CompressionSettings;
use log::*;
use scan_core::{ReconstructionError, Result};
use std::path::{Path, PathBuf};
use std::process::Command;

/// Rewrites a binary glTF file into a smaller one.
pub trait AssetCompressor {
    /// Reads `input` and writes the compressed result to `output`.
    fn compress(&self, input: &Path, output: &Path) -> Result<()>;
}

/// Runs the `gltfpack` command line tool.
#[derive(Debug, Clone)]
pub struct Gltfpack {
    program: PathBuf,
    args: Vec<String>,
}

impl Gltfpack {
    pub fn new(settings: &CompressionSettings) -> Self {
        Self {
            program: settings.program.clone(),
            args: settings.args.clone(),
        }
    }
}

impl AssetCompressor for Gltfpack {
    fn compress(&self, input: &Path, output: &Path) -> Result<()> {
        let result = Command::new(&self.program)
            .arg("-i")
            .arg(input)
            .arg("-o")
            .arg(output)
            .args(&self.args)
            .output()
            .map_err(|e| {
                ReconstructionError::Compression(format!(
                    "failed to run {}: {}",
                    self.program.display(),
                    e
                ))
            })?;
        if !result.status.success() {
            return Err(ReconstructionError::Compression(format!(
                "{} exited with {}: {}",
                self.program.display(),
                result.status,
                String::from_utf8_lossy(&result.stderr).trim()
            )));
        }
        Ok(())
    }
}

/// Compresses `path` through a sibling temporary file and replaces it on success.
///
/// Returns whether the file was replaced. Failures are logged and the original is kept.
pub fn compress_in_place(compressor: &dyn AssetCompressor, path: &Path) -> bool {
    let temporary = path.with_extension("packed.glb");
    let outcome = compressor.compress(path, &temporary).and_then(|()| {
        if !temporary.is_file() {
            return Err(ReconstructionError::Compression(format!(
                "compressor produced no output for {}",
                path.display()
            )));
        }
        std::fs::rename(&temporary, path)?;
        Ok(())
    });
    match outcome {
        Ok(()) => {
            debug!("compressed {}", path.display());
            true
        }
        Err(e) => {
            warn!(
                "keeping uncompressed {}: {}",
                path.display(),
                e
            );
            if temporary.exists() {
                if let Err(e) = std::fs::remove_file(&temporary) {
                    debug!("could not remove {}: {}", temporary.display(), e);
                }
            }
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Truncate;

    impl AssetCompressor for Truncate {
        fn compress(&self, input: &Path, output: &Path) -> Result<()> {
            let bytes = std::fs::read(input)?;
            std::fs::write(output, &bytes[..bytes.len() / 2])?;
            Ok(())
        }
    }

    #[test]
    fn replaces_the_file_on_success() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scene_full.glb");
        std::fs::write(&path, [7u8; 64]).unwrap();
        assert!(compress_in_place(&Truncate, &path));
        assert_eq!(std::fs::read(&path).unwrap().len(), 32);
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[test]
    fn missing_program_keeps_the_original() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scene_full.glb");
        std::fs::write(&path, [7u8; 64]).unwrap();
        let compressor = Gltfpack::new(&CompressionSettings {
            enabled: true,
            program: dir.path().join("no-such-gltfpack"),
            args: vec![],
        });
        assert!(!compress_in_place(&compressor, &path));
        assert_eq!(std::fs::read(&path).unwrap(), vec![7u8; 64]);
    }
}
