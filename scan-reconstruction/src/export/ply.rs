use crate::mesh::TriangleMesh;
use ply_rs::{
    ply::{
        Addable, DefaultElement, ElementDef, Encoding, Ply, Property, PropertyDef, PropertyType,
        ScalarType,
    },
    writer::Writer,
};
use scan_core::nalgebra::Point3;
use scan_core::{PointCloud, Result};
use std::io::Write;

fn header(faces: bool) -> Ply<DefaultElement> {
    let mut ply = Ply::<DefaultElement>::new();
    ply.header.encoding = Encoding::BinaryLittleEndian;
    ply.header
        .comments
        .push("Exported from a room scan reconstruction".to_string());

    let mut vertex = ElementDef::new("vertex".to_string());
    for name in ["x", "y", "z"] {
        vertex.properties.add(PropertyDef::new(
            name.to_string(),
            PropertyType::Scalar(ScalarType::Float),
        ));
    }
    for name in ["red", "green", "blue"] {
        vertex.properties.add(PropertyDef::new(
            name.to_string(),
            PropertyType::Scalar(ScalarType::UChar),
        ));
    }
    ply.header.elements.add(vertex);

    if faces {
        let mut face = ElementDef::new("face".to_string());
        face.properties.add(PropertyDef::new(
            "vertex_indices".to_string(),
            PropertyType::List(ScalarType::UChar, ScalarType::Int),
        ));
        ply.header.elements.add(face);
    }
    ply
}

fn vertex(p: &Point3<f64>, [r, g, b]: [u8; 3]) -> DefaultElement {
    let mut vertex = DefaultElement::new();
    vertex.insert("x".to_string(), Property::Float(p.x as f32));
    vertex.insert("y".to_string(), Property::Float(p.y as f32));
    vertex.insert("z".to_string(), Property::Float(p.z as f32));
    vertex.insert("red".to_string(), Property::UChar(r));
    vertex.insert("green".to_string(), Property::UChar(g));
    vertex.insert("blue".to_string(), Property::UChar(b));
    vertex
}

/// Writes a colored point cloud as a binary PLY.
pub fn write_points_ply(cloud: &PointCloud, mut writer: impl Write) -> Result<()> {
    let mut ply = header(false);
    let vertices = cloud.iter().map(|(p, &c)| vertex(p, c)).collect();
    ply.payload.insert("vertex".to_string(), vertices);
    Writer::new().write_ply(&mut writer, &mut ply)?;
    Ok(())
}

/// Writes a triangle mesh as a binary PLY with per-vertex colors.
pub fn write_mesh_ply(mesh: &TriangleMesh, mut writer: impl Write) -> Result<()> {
    let mut ply = header(true);
    let vertices = mesh
        .vertices
        .iter()
        .zip(mesh.colors.iter())
        .map(|(p, &c)| vertex(p, c))
        .collect();
    let faces = mesh
        .triangles
        .iter()
        .map(|t| {
            let mut face = DefaultElement::new();
            face.insert(
                "vertex_indices".to_string(),
                Property::ListInt(t.iter().map(|&i| i as i32).collect()),
            );
            face
        })
        .collect();
    ply.payload.insert("vertex".to_string(), vertices);
    ply.payload.insert("face".to_string(), faces);
    Writer::new().write_ply(&mut writer, &mut ply)?;
    Ok(())
}
