//! Quadric error edge collapse.
//!
//! Each vertex carries the sum of the plane quadrics of its faces. Edges are collapsed
//! cheapest first into the position minimizing the combined quadric. Heap entries record
//! the versions of both endpoints and are skipped once either endpoint has moved.

use super::TriangleMesh;
use float_ord::FloatOrd;
use log::*;
use scan_core::nalgebra::{Matrix3, Matrix4, Point3, Vector3, Vector4};
use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashSet};

/// Collapses whose face normals turn by more than this (as a cosine) are rejected.
const MIN_NORMAL_COSINE: f64 = 0.2;

type HeapEntry = Reverse<(FloatOrd<f64>, u32, u32, u32, u32)>;

struct Collapse {
    cost: f64,
    position: Point3<f64>,
}

fn plane_quadric(mesh: &TriangleMesh, triangle: &[u32; 3]) -> Matrix4<f64> {
    let n = mesh.triangle_normal(triangle);
    let n = match n.try_normalize(1e-15) {
        Some(n) => n,
        None => return Matrix4::zeros(),
    };
    let d = -n.dot(&mesh.vertices[triangle[0] as usize].coords);
    let plane = Vector4::new(n.x, n.y, n.z, d);
    plane * plane.transpose()
}

fn quadric_error(q: &Matrix4<f64>, p: &Point3<f64>) -> f64 {
    let h = p.to_homogeneous();
    (h.transpose() * q * h)[0].max(0.0)
}

fn best_collapse(q: &Matrix4<f64>, a: &Point3<f64>, b: &Point3<f64>) -> Collapse {
    let system: Matrix3<f64> = q.fixed_slice::<3, 3>(0, 0).into_owned();
    let rhs: Vector3<f64> = -q.fixed_slice::<3, 1>(0, 3).into_owned();
    if system.determinant().abs() > 1e-12 {
        if let Some(position) = system.lu().solve(&rhs).map(Point3::from) {
            return Collapse {
                cost: quadric_error(q, &position),
                position,
            };
        }
    }
    [*a, *b, midpoint(a, b)]
        .into_iter()
        .map(|position| Collapse {
            cost: quadric_error(q, &position),
            position,
        })
        .min_by_key(|c| FloatOrd(c.cost))
        .unwrap_or(Collapse {
            cost: 0.0,
            position: *a,
        })
}

fn midpoint(a: &Point3<f64>, b: &Point3<f64>) -> Point3<f64> {
    Point3::from((a.coords + b.coords) * 0.5)
}

struct Decimator {
    vertices: Vec<Point3<f64>>,
    colors: Vec<[f64; 3]>,
    quadrics: Vec<Matrix4<f64>>,
    versions: Vec<u32>,
    vertex_alive: Vec<bool>,
    vertex_faces: Vec<Vec<usize>>,
    triangles: Vec<[u32; 3]>,
    face_alive: Vec<bool>,
    live_faces: usize,
    heap: BinaryHeap<HeapEntry>,
}

impl Decimator {
    fn new(mesh: &TriangleMesh) -> Self {
        let n = mesh.vertices.len();
        let mut quadrics = vec![Matrix4::zeros(); n];
        let mut vertex_faces = vec![vec![]; n];
        for (f, t) in mesh.triangles.iter().enumerate() {
            let q = plane_quadric(mesh, t);
            for &v in t {
                quadrics[v as usize] += q;
                vertex_faces[v as usize].push(f);
            }
        }
        let mut decimator = Self {
            vertices: mesh.vertices.clone(),
            colors: mesh.colors.iter().map(|c| c.map(f64::from)).collect(),
            quadrics,
            versions: vec![0; n],
            vertex_alive: vec![true; n],
            vertex_faces,
            triangles: mesh.triangles.clone(),
            face_alive: vec![true; mesh.triangles.len()],
            live_faces: mesh.triangles.len(),
            heap: BinaryHeap::new(),
        };
        let edges: HashSet<(u32, u32)> = mesh
            .triangles
            .iter()
            .flat_map(|t| [(t[0], t[1]), (t[1], t[2]), (t[2], t[0])])
            .map(|(a, b)| (a.min(b), a.max(b)))
            .collect();
        for (a, b) in edges {
            decimator.push_edge(a, b);
        }
        decimator
    }

    fn push_edge(&mut self, a: u32, b: u32) {
        let (ai, bi) = (a as usize, b as usize);
        let q = self.quadrics[ai] + self.quadrics[bi];
        let collapse = best_collapse(&q, &self.vertices[ai], &self.vertices[bi]);
        self.heap.push(Reverse((
            FloatOrd(collapse.cost),
            a,
            b,
            self.versions[ai],
            self.versions[bi],
        )));
    }

    fn live_faces_of(&self, v: usize) -> impl Iterator<Item = usize> + '_ {
        self.vertex_faces[v]
            .iter()
            .copied()
            .filter(move |&f| self.face_alive[f])
    }

    /// Whether moving `v` to `position` flips or squashes any face that survives the collapse.
    fn folds_over(&self, v: usize, other: u32, position: &Point3<f64>) -> bool {
        self.live_faces_of(v)
            .filter(|&f| !self.triangles[f].contains(&other))
            .any(|f| {
                let t = self.triangles[f];
                let [a, b, c] = t.map(|i| self.vertices[i as usize]);
                let before = (b - a).cross(&(c - a));
                let [a, b, c] = t.map(|i| {
                    if i as usize == v {
                        *position
                    } else {
                        self.vertices[i as usize]
                    }
                });
                let after = (b - a).cross(&(c - a));
                match (before.try_normalize(1e-15), after.try_normalize(1e-15)) {
                    (Some(before), Some(after)) => before.dot(&after) < MIN_NORMAL_COSINE,
                    _ => true,
                }
            })
    }

    fn run(&mut self, target: usize) {
        while self.live_faces > target {
            let Reverse((_, a, b, va, vb)) = match self.heap.pop() {
                Some(entry) => entry,
                None => break,
            };
            let (ai, bi) = (a as usize, b as usize);
            if !self.vertex_alive[ai]
                || !self.vertex_alive[bi]
                || self.versions[ai] != va
                || self.versions[bi] != vb
            {
                continue;
            }
            let q = self.quadrics[ai] + self.quadrics[bi];
            let collapse = best_collapse(&q, &self.vertices[ai], &self.vertices[bi]);
            if self.folds_over(ai, b, &collapse.position)
                || self.folds_over(bi, a, &collapse.position)
            {
                continue;
            }
            self.collapse(ai, bi, collapse.position, q);
        }
    }

    /// Merges `b` into `a`.
    fn collapse(&mut self, a: usize, b: usize, position: Point3<f64>, q: Matrix4<f64>) {
        for f in self.vertex_faces[b].clone() {
            if !self.face_alive[f] {
                continue;
            }
            if self.triangles[f].contains(&(a as u32)) {
                self.face_alive[f] = false;
                self.live_faces -= 1;
            } else {
                for i in self.triangles[f].iter_mut() {
                    if *i as usize == b {
                        *i = a as u32;
                    }
                }
                self.vertex_faces[a].push(f);
            }
        }
        self.vertex_faces[b].clear();
        self.vertex_alive[b] = false;
        self.vertices[a] = position;
        for c in 0..3 {
            self.colors[a][c] = 0.5 * (self.colors[a][c] + self.colors[b][c]);
        }
        self.quadrics[a] = q;
        self.versions[a] += 1;

        let neighbors: HashSet<u32> = self
            .live_faces_of(a)
            .flat_map(|f| self.triangles[f])
            .filter(|&v| v as usize != a)
            .collect();
        for n in neighbors {
            let a = a as u32;
            self.push_edge(a.min(n), a.max(n));
        }
    }

    fn into_mesh(self) -> TriangleMesh {
        let mut mesh = TriangleMesh::new();
        let mut remap = vec![u32::MAX; self.vertices.len()];
        for (f, t) in self.triangles.iter().enumerate() {
            if !self.face_alive[f] {
                continue;
            }
            let mut out = [0; 3];
            for (slot, &v) in out.iter_mut().zip(t) {
                let v = v as usize;
                if remap[v] == u32::MAX {
                    let color = self.colors[v].map(|c| c.round().clamp(0.0, 255.0) as u8);
                    remap[v] = mesh.push_vertex(self.vertices[v], color);
                }
                *slot = remap[v];
            }
            mesh.triangles.push(out);
        }
        mesh
    }
}

/// Simplifies `mesh` down to at most `target_triangles` faces where possible.
///
/// Collapses that would flip a face are skipped, so the target may not be reached.
pub fn decimate(mesh: &TriangleMesh, target_triangles: usize) -> TriangleMesh {
    if mesh.triangle_count() <= target_triangles {
        return mesh.clone();
    }
    let mut decimator = Decimator::new(mesh);
    decimator.run(target_triangles);
    if decimator.live_faces > target_triangles {
        warn!(
            "decimation stopped at {} triangles, above the target of {}",
            decimator.live_faces, target_triangles
        );
    }
    decimator.into_mesh()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grid(n: u32) -> TriangleMesh {
        let mut mesh = TriangleMesh::new();
        for y in 0..=n {
            for x in 0..=n {
                mesh.push_vertex(Point3::new(x as f64, y as f64, 0.0), [10, 20, 30]);
            }
        }
        let index = |x: u32, y: u32| y * (n + 1) + x;
        for y in 0..n {
            for x in 0..n {
                mesh.triangles
                    .push([index(x, y), index(x + 1, y), index(x + 1, y + 1)]);
                mesh.triangles
                    .push([index(x, y), index(x + 1, y + 1), index(x, y + 1)]);
            }
        }
        mesh
    }

    #[test]
    fn flat_grid_simplifies_without_leaving_the_plane() {
        let mesh = grid(10);
        assert_eq!(mesh.triangle_count(), 200);
        let simplified = decimate(&mesh, 100);
        assert!(simplified.triangle_count() <= 100);
        assert!(!simplified.is_empty());
        for v in &simplified.vertices {
            assert!(v.z.abs() < 1e-9);
            assert!(v.x >= -1e-9 && v.x <= 10.0 + 1e-9);
        }
        for t in &simplified.triangles {
            assert!(simplified.triangle_normal(t).z > 0.0);
        }
        assert!(simplified.colors.iter().all(|&c| c == [10, 20, 30]));
    }

    #[test]
    fn small_meshes_are_untouched() {
        let mesh = grid(2);
        assert_eq!(decimate(&mesh, 100), mesh);
    }
}
