//! Binary glTF output.
//!
//! Every file holds one mesh with one primitive backed by one interleaved buffer view.
//! Point clouds use `POINTS` mode with a normalized `u8` vertex color. Meshes add normals
//! and an index buffer.

use crate::mesh::TriangleMesh;
use gltf::binary::{Glb, Header};
use gltf::json;
use json::validation::{Checked::Valid, USize64};
use scan_core::nalgebra::{Point3, Vector3};
use scan_core::{PointCloud, ReconstructionError, Result};
use std::borrow::Cow;
use std::collections::BTreeMap;
use std::io::Write;
use std::mem::size_of;

/// `f32x3` position followed by `u8x4` color.
const POINT_STRIDE: usize = 16;
/// `f32x3` position, `f32x3` normal, `u8x4` color.
const MESH_STRIDE: usize = 28;

/// Writes a colored point cloud as a single `POINTS` primitive.
pub fn write_points_glb(cloud: &PointCloud, writer: impl Write) -> Result<()> {
    if cloud.is_empty() {
        return Err(ReconstructionError::DegenerateGeometry(
            "can not write an empty point cloud".to_string(),
        ));
    }
    let mut bin = Vec::with_capacity(cloud.len() * POINT_STRIDE);
    for (point, color) in cloud.iter() {
        push_position(&mut bin, point);
        push_color(&mut bin, color);
    }

    let mut root = json::Root::default();
    let buffer = push_buffer(&mut root, bin.len());
    let vertices = push_view(
        &mut root,
        buffer,
        0,
        bin.len(),
        Some(POINT_STRIDE),
        json::buffer::Target::ArrayBuffer,
    );
    let positions = push_positions(&mut root, vertices, cloud.points.iter());
    let colors = push_accessor(
        &mut root,
        vertices,
        12,
        cloud.len(),
        json::accessor::ComponentType::U8,
        json::accessor::Type::Vec4,
        true,
    );

    let mut attributes = BTreeMap::new();
    attributes.insert(Valid(json::mesh::Semantic::Positions), positions);
    attributes.insert(Valid(json::mesh::Semantic::Colors(0)), colors);
    push_scene(&mut root, attributes, None, json::mesh::Mode::Points);
    write_glb(&root, bin, writer)
}

/// Writes an indexed triangle mesh with per-vertex normals and colors.
pub fn write_mesh_glb(mesh: &TriangleMesh, writer: impl Write) -> Result<()> {
    if mesh.triangles.is_empty() {
        return Err(ReconstructionError::DegenerateGeometry(
            "can not write a mesh without triangles".to_string(),
        ));
    }
    let vertex_bytes = mesh.vertices.len() * MESH_STRIDE;
    let index_bytes = mesh.triangles.len() * 3 * size_of::<u32>();
    let mut bin = Vec::with_capacity(vertex_bytes + index_bytes);
    for (i, vertex) in mesh.vertices.iter().enumerate() {
        push_position(&mut bin, vertex);
        let normal = mesh.normals.get(i).copied().unwrap_or_else(Vector3::zeros);
        for c in normal.iter() {
            bin.extend_from_slice(&(*c as f32).to_le_bytes());
        }
        push_color(&mut bin, &mesh.colors[i]);
    }
    for index in mesh.triangles.iter().flatten() {
        bin.extend_from_slice(&index.to_le_bytes());
    }

    let mut root = json::Root::default();
    let buffer = push_buffer(&mut root, bin.len());
    let vertices = push_view(
        &mut root,
        buffer,
        0,
        vertex_bytes,
        Some(MESH_STRIDE),
        json::buffer::Target::ArrayBuffer,
    );
    let indices_view = push_view(
        &mut root,
        buffer,
        vertex_bytes,
        index_bytes,
        None,
        json::buffer::Target::ElementArrayBuffer,
    );
    let positions = push_positions(&mut root, vertices, mesh.vertices.iter());
    let normals = push_accessor(
        &mut root,
        vertices,
        12,
        mesh.vertices.len(),
        json::accessor::ComponentType::F32,
        json::accessor::Type::Vec3,
        false,
    );
    let colors = push_accessor(
        &mut root,
        vertices,
        24,
        mesh.vertices.len(),
        json::accessor::ComponentType::U8,
        json::accessor::Type::Vec4,
        true,
    );
    let indices = push_accessor(
        &mut root,
        indices_view,
        0,
        mesh.triangles.len() * 3,
        json::accessor::ComponentType::U32,
        json::accessor::Type::Scalar,
        false,
    );

    let mut attributes = BTreeMap::new();
    attributes.insert(Valid(json::mesh::Semantic::Positions), positions);
    attributes.insert(Valid(json::mesh::Semantic::Normals), normals);
    attributes.insert(Valid(json::mesh::Semantic::Colors(0)), colors);
    push_scene(
        &mut root,
        attributes,
        Some(indices),
        json::mesh::Mode::Triangles,
    );
    write_glb(&root, bin, writer)
}

fn push_position(bin: &mut Vec<u8>, point: &Point3<f64>) {
    for c in point.iter() {
        bin.extend_from_slice(&(*c as f32).to_le_bytes());
    }
}

fn push_color(bin: &mut Vec<u8>, [r, g, b]: &[u8; 3]) {
    bin.extend_from_slice(&[*r, *g, *b, 255]);
}

fn push_buffer(root: &mut json::Root, len: usize) -> json::Index<json::Buffer> {
    root.push(json::Buffer {
        byte_length: USize64::from(padded_len(len)),
        extensions: Default::default(),
        extras: Default::default(),
        name: None,
        uri: None,
    })
}

fn push_view(
    root: &mut json::Root,
    buffer: json::Index<json::Buffer>,
    offset: usize,
    len: usize,
    stride: Option<usize>,
    target: json::buffer::Target,
) -> json::Index<json::buffer::View> {
    root.push(json::buffer::View {
        buffer,
        byte_length: USize64::from(len),
        byte_offset: Some(USize64::from(offset)),
        byte_stride: stride.map(json::buffer::Stride),
        extensions: Default::default(),
        extras: Default::default(),
        name: None,
        target: Some(Valid(target)),
    })
}

fn push_accessor(
    root: &mut json::Root,
    view: json::Index<json::buffer::View>,
    offset: usize,
    count: usize,
    component: json::accessor::ComponentType,
    type_: json::accessor::Type,
    normalized: bool,
) -> json::Index<json::Accessor> {
    root.push(json::Accessor {
        buffer_view: Some(view),
        byte_offset: Some(USize64::from(offset)),
        count: USize64::from(count),
        component_type: Valid(json::accessor::GenericComponentType(component)),
        extensions: Default::default(),
        extras: Default::default(),
        type_: Valid(type_),
        min: None,
        max: None,
        name: None,
        normalized,
        sparse: None,
    })
}

/// Positions need `min` and `max` to be valid glTF.
fn push_positions<'a>(
    root: &mut json::Root,
    view: json::Index<json::buffer::View>,
    points: impl ExactSizeIterator<Item = &'a Point3<f64>>,
) -> json::Index<json::Accessor> {
    let count = points.len();
    let (min, max) = points.fold(
        ([f32::INFINITY; 3], [f32::NEG_INFINITY; 3]),
        |(mut lo, mut hi), p| {
            for d in 0..3 {
                lo[d] = lo[d].min(p[d] as f32);
                hi[d] = hi[d].max(p[d] as f32);
            }
            (lo, hi)
        },
    );
    let index = push_accessor(
        root,
        view,
        0,
        count,
        json::accessor::ComponentType::F32,
        json::accessor::Type::Vec3,
        false,
    );
    let accessor = &mut root.accessors[index.value()];
    accessor.min = Some(json::Value::from(min.to_vec()));
    accessor.max = Some(json::Value::from(max.to_vec()));
    index
}

fn push_scene(
    root: &mut json::Root,
    attributes: BTreeMap<json::validation::Checked<json::mesh::Semantic>, json::Index<json::Accessor>>,
    indices: Option<json::Index<json::Accessor>>,
    mode: json::mesh::Mode,
) {
    let primitive = json::mesh::Primitive {
        attributes,
        extensions: Default::default(),
        extras: Default::default(),
        indices,
        material: None,
        mode: Valid(mode),
        targets: None,
    };
    let mesh = root.push(json::Mesh {
        extensions: Default::default(),
        extras: Default::default(),
        name: None,
        primitives: vec![primitive],
        weights: None,
    });
    let node = root.push(json::Node {
        mesh: Some(mesh),
        ..Default::default()
    });
    let scene = root.push(json::Scene {
        extensions: Default::default(),
        extras: Default::default(),
        name: None,
        nodes: vec![node],
    });
    root.scene = Some(scene);
}

fn write_glb(root: &json::Root, mut bin: Vec<u8>, writer: impl Write) -> Result<()> {
    let json = json::serialize::to_vec(root)
        .map_err(|e| ReconstructionError::Serialization(e.to_string()))?;
    bin.resize(padded_len(bin.len()), 0);
    let length = 12 + 8 + padded_len(json.len()) + 8 + bin.len();
    let glb = Glb {
        header: Header {
            magic: *b"glTF",
            version: 2,
            length: u32::try_from(length).map_err(|_| {
                ReconstructionError::Serialization(format!(
                    "{} bytes exceed the binary glTF limit",
                    length
                ))
            })?,
        },
        json: Cow::Owned(json),
        bin: Some(Cow::Owned(bin)),
    };
    glb.to_writer(writer)
        .map_err(|e| ReconstructionError::Serialization(e.to_string()))
}

fn padded_len(len: usize) -> usize {
    (len + 3) & !3
}
