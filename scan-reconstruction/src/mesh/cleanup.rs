//! Topological cleanup of extracted and simplified meshes.

use super::TriangleMesh;
use float_ord::FloatOrd;
use itertools::Itertools;
use log::*;
use std::collections::{HashMap, HashSet};

/// Runs every cleanup pass in order and drops vertex normals.
pub fn clean(mesh: &mut TriangleMesh) {
    let before = (mesh.vertex_count(), mesh.triangle_count());
    merge_duplicate_vertices(mesh);
    remove_degenerate_triangles(mesh);
    remove_duplicate_triangles(mesh);
    remove_non_manifold_edges(mesh);
    remove_unreferenced_vertices(mesh);
    mesh.normals.clear();
    debug!(
        "cleanup went from {:?} to {:?} vertices and triangles",
        before,
        (mesh.vertex_count(), mesh.triangle_count())
    );
}

/// Welds vertices with bit-identical positions.
pub fn merge_duplicate_vertices(mesh: &mut TriangleMesh) {
    let mut seen: HashMap<[u64; 3], u32> = HashMap::new();
    let mut remap = Vec::with_capacity(mesh.vertices.len());
    let mut vertices = Vec::with_capacity(mesh.vertices.len());
    let mut colors = Vec::with_capacity(mesh.vertices.len());
    for (v, c) in mesh.vertices.iter().zip(&mesh.colors) {
        let key = [v.x.to_bits(), v.y.to_bits(), v.z.to_bits()];
        let index = *seen.entry(key).or_insert_with(|| {
            vertices.push(*v);
            colors.push(*c);
            (vertices.len() - 1) as u32
        });
        remap.push(index);
    }
    if vertices.len() == mesh.vertices.len() {
        return;
    }
    for t in &mut mesh.triangles {
        *t = t.map(|i| remap[i as usize]);
    }
    mesh.vertices = vertices;
    mesh.colors = colors;
    mesh.normals.clear();
}

/// Drops triangles that repeat a vertex or have no area.
pub fn remove_degenerate_triangles(mesh: &mut TriangleMesh) {
    let kept: Vec<[u32; 3]> = mesh
        .triangles
        .iter()
        .copied()
        .filter(|t| t[0] != t[1] && t[1] != t[2] && t[0] != t[2])
        .filter(|t| mesh.triangle_normal(t).norm_squared() > 0.0)
        .collect();
    mesh.triangles = kept;
}

/// Drops triangles over the same three vertices as an earlier one, regardless of winding.
pub fn remove_duplicate_triangles(mesh: &mut TriangleMesh) {
    let mut seen = HashSet::new();
    mesh.triangles.retain(|t| {
        let mut key = *t;
        key.sort_unstable();
        seen.insert(key)
    });
}

/// Ensures no edge is shared by more than two triangles by keeping the two largest.
pub fn remove_non_manifold_edges(mesh: &mut TriangleMesh) {
    let mut edges: HashMap<(u32, u32), Vec<usize>> = HashMap::new();
    for (i, t) in mesh.triangles.iter().enumerate() {
        for (a, b) in [(t[0], t[1]), (t[1], t[2]), (t[2], t[0])] {
            edges.entry((a.min(b), a.max(b))).or_default().push(i);
        }
    }
    let mut removed = HashSet::new();
    for faces in edges.into_values().filter(|f| f.len() > 2) {
        let live = faces
            .into_iter()
            .filter(|f| !removed.contains(f))
            .sorted_by_key(|&f| FloatOrd(-mesh.triangle_area(&mesh.triangles[f])))
            .collect_vec();
        removed.extend(live.into_iter().skip(2));
    }
    if removed.is_empty() {
        return;
    }
    trace!("removing {} triangles on non-manifold edges", removed.len());
    let triangles = std::mem::take(&mut mesh.triangles);
    mesh.triangles = triangles
        .into_iter()
        .enumerate()
        .filter(|(i, _)| !removed.contains(i))
        .map(|(_, t)| t)
        .collect();
}

/// Drops vertices that no triangle uses and compacts the indices.
pub fn remove_unreferenced_vertices(mesh: &mut TriangleMesh) {
    let mut used = vec![false; mesh.vertices.len()];
    for &i in mesh.triangles.iter().flatten() {
        used[i as usize] = true;
    }
    let mut remap = vec![u32::MAX; mesh.vertices.len()];
    let mut next = 0;
    for (i, &u) in used.iter().enumerate() {
        if u {
            remap[i] = next;
            next += 1;
        }
    }
    retain_used(&mut mesh.vertices, &used);
    retain_used(&mut mesh.colors, &used);
    if mesh.normals.len() == used.len() {
        retain_used(&mut mesh.normals, &used);
    } else {
        mesh.normals.clear();
    }
    for t in &mut mesh.triangles {
        *t = t.map(|i| remap[i as usize]);
    }
}

fn retain_used<T>(items: &mut Vec<T>, used: &[bool]) {
    let mut index = 0;
    items.retain(|_| {
        index += 1;
        used[index - 1]
    });
}
