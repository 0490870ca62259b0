//! Loading previously exported clouds back into memory.
//!
//! The furniture stage localizes objects against the reconstruction's own asset, so this
//! reads the same formats [`crate::export`] writes.

use crate::subsample;
use log::*;
use ply_rs::parser::Parser;
use ply_rs::ply::{DefaultElement, Property};
use rand::SeedableRng;
use rand_pcg::Pcg64;
use scan_core::nalgebra::{Matrix4, Point3};
use scan_core::{PointCloud, ReconstructionError, Result, DEFAULT_POINT_COLOR};
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

/// Reads a `.glb`/`.gltf` or `.ply` cloud and caps it at `max_points` with a seeded draw.
pub fn load_reference_cloud(path: &Path, max_points: usize, seed: u64) -> Result<PointCloud> {
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase());
    let cloud = match extension.as_deref() {
        Some("glb") | Some("gltf") => {
            let mut bytes = vec![];
            File::open(path)?.read_to_end(&mut bytes)?;
            read_gltf_points(&bytes)?
        }
        Some("ply") => read_ply_points(BufReader::new(File::open(path)?))?,
        _ => {
            return Err(ReconstructionError::InvalidInput(format!(
                "unsupported reference cloud format: {}",
                path.display()
            )))
        }
    };
    if cloud.is_empty() {
        return Err(ReconstructionError::DegenerateGeometry(format!(
            "{} holds no points",
            path.display()
        )));
    }
    let total = cloud.len();
    let cloud = subsample(&cloud, max_points, &mut Pcg64::seed_from_u64(seed));
    info!(
        "loaded {} of {} reference points from {}",
        cloud.len(),
        total,
        path.display()
    );
    Ok(cloud)
}

/// Collects the vertices of every primitive reachable from the scenes, in world space.
pub fn read_gltf_points(bytes: &[u8]) -> Result<PointCloud> {
    let (document, buffers, _) = gltf::import_slice(bytes)
        .map_err(|e| ReconstructionError::Serialization(e.to_string()))?;
    let mut cloud = PointCloud::new();
    let mut stack: Vec<(gltf::Node, Matrix4<f64>)> = document
        .scenes()
        .flat_map(|scene| scene.nodes())
        .map(|node| (node, Matrix4::identity()))
        .collect();
    while let Some((node, parent)) = stack.pop() {
        let local: Matrix4<f32> = Matrix4::from(node.transform().matrix());
        let world = parent * local.cast::<f64>();
        if let Some(mesh) = node.mesh() {
            for primitive in mesh.primitives() {
                let reader = primitive
                    .reader(|buffer| buffers.get(buffer.index()).map(|data| data.0.as_slice()));
                let positions = match reader.read_positions() {
                    Some(positions) => positions,
                    None => continue,
                };
                let mut colors = reader.read_colors(0).map(|c| c.into_rgb_u8());
                for position in positions {
                    let local = Point3::new(position[0], position[1], position[2]).cast::<f64>();
                    let color = colors
                        .as_mut()
                        .and_then(|c| c.next())
                        .unwrap_or(DEFAULT_POINT_COLOR);
                    cloud.push(world.transform_point(&local), color);
                }
            }
        }
        stack.extend(node.children().map(|child| (child, world)));
    }
    debug!("read {} points from glTF", cloud.len());
    Ok(cloud)
}

fn scalar(property: Option<&Property>) -> Option<f64> {
    match property? {
        Property::Float(v) => Some(*v as f64),
        Property::Double(v) => Some(*v),
        Property::Char(v) => Some(*v as f64),
        Property::UChar(v) => Some(*v as f64),
        Property::Short(v) => Some(*v as f64),
        Property::UShort(v) => Some(*v as f64),
        Property::Int(v) => Some(*v as f64),
        Property::UInt(v) => Some(*v as f64),
        _ => None,
    }
}

/// Reads the `vertex` element of a PLY file. Colors default to gray when absent.
pub fn read_ply_points(mut reader: impl std::io::BufRead) -> Result<PointCloud> {
    let ply = Parser::<DefaultElement>::new().read_ply(&mut reader)?;
    let vertices = ply.payload.get("vertex").ok_or_else(|| {
        ReconstructionError::InvalidInput("PLY file has no vertex element".to_string())
    })?;
    let mut cloud = PointCloud::with_capacity(vertices.len());
    for vertex in vertices {
        let coordinate = |name: &str| {
            scalar(vertex.get(name)).ok_or_else(|| {
                ReconstructionError::InvalidInput(format!("PLY vertex is missing {}", name))
            })
        };
        let point = Point3::new(coordinate("x")?, coordinate("y")?, coordinate("z")?);
        let channel = |name: &str, fallback: u8| {
            scalar(vertex.get(name)).map_or(fallback, |v| v.clamp(0.0, 255.0) as u8)
        };
        let [r, g, b] = DEFAULT_POINT_COLOR;
        cloud.push(
            point,
            [channel("red", r), channel("green", g), channel("blue", b)],
        );
    }
    Ok(cloud)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::export::{write_points_glb, write_points_ply};
    use approx::assert_relative_eq;

    fn cloud() -> PointCloud {
        PointCloud::from_points_and_colors(
            vec![
                Point3::new(0.0, 1.0, 2.0),
                Point3::new(-1.5, 0.25, 3.0),
                Point3::new(4.0, -2.0, 0.5),
            ],
            vec![[255, 0, 0], [0, 255, 0], [1, 2, 3]],
        )
        .unwrap()
    }

    #[test]
    fn glb_points_read_back() {
        let mut bytes = vec![];
        write_points_glb(&cloud(), &mut bytes).unwrap();
        assert_eq!(&bytes[..4], b"glTF");
        let read = read_gltf_points(&bytes).unwrap();
        assert_eq!(read.colors, cloud().colors);
        for (a, b) in read.points.iter().zip(&cloud().points) {
            assert_relative_eq!(*a, *b, epsilon = 1e-6);
        }
    }

    #[test]
    fn ply_points_read_back() {
        let mut bytes = vec![];
        write_points_ply(&cloud(), &mut bytes).unwrap();
        let read = read_ply_points(&bytes[..]).unwrap();
        assert_eq!(read.colors, cloud().colors);
        for (a, b) in read.points.iter().zip(&cloud().points) {
            assert_relative_eq!(*a, *b, epsilon = 1e-6);
        }
    }

    #[test]
    fn unknown_extensions_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cloud.xyz");
        std::fs::write(&path, b"0 0 0").unwrap();
        assert!(matches!(
            load_reference_cloud(&path, 10, 5),
            Err(ReconstructionError::InvalidInput(_))
        ));
    }
}
