// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Polyframe Inc.

//! Inside/outside classification of intersected triangles
//!
//! Triangles are grouped into patches across manifold edges, and a test
//! point just off a triangle is classified against every operand by casting
//! a handful of slightly perturbed axis rays and summing signed crossings.

use super::bbox::calc_face_bounding_boxes;
use super::bvh::BVH;
use super::mesh::{IMesh, NO_INDEX};
use super::overlap::ShapeFn;
use super::robust_predicates::orient3d;
use ahash::AHashMap;
use nalgebra::Vector3;
use std::fmt;

/// Distance the test point is moved off its triangle along the unit normal
const TEST_POINT_OFFSET: f64 = 1e-5;

const R1: f64 = 0.998_702_529_519_966_3;
const RA: f64 = 0.049_935_126_475_998_32;
const RB: f64 = 0.009_987_025_295_199_663;

/// Unit rays close to the six axis directions, tilted off the axes so
/// they rarely run along a seam between triangles.
const TEST_RAYS: [[f64; 3]; 6] = [
    [R1, RA, RB],
    [-R1, -RA, -RB],
    [RB, R1, RA],
    [-RB, -R1, -RA],
    [RA, RB, R1],
    [-RA, -RB, -R1],
];

/// Barycentric slack of the ray/triangle test
const RAY_TRI_EPSILON: f64 = f32::EPSILON as f64;

/// Undirected edge keyed by vertex ids
type EdgeKey = (usize, usize);

fn edge_key(a: usize, b: usize) -> EdgeKey {
    if a <= b {
        (a, b)
    } else {
        (b, a)
    }
}

/// Edge to incident triangles map of a triangle mesh
#[derive(Debug, Default)]
pub struct TriMeshTopology {
    edge_tri: AHashMap<EdgeKey, Vec<usize>>,
}

impl TriMeshTopology {
    pub fn new(tm: &IMesh) -> Self {
        let mut edge_tri: AHashMap<EdgeKey, Vec<usize>> = AHashMap::with_capacity(3 * tm.face_size());
        for (t, f) in tm.faces().enumerate() {
            debug_assert!(f.is_tri());
            for i in 0..3 {
                let e = edge_key(f[i].id, f[f.next_pos(i)].id);
                let tris = edge_tri.entry(e).or_default();
                if !tris.contains(&t) {
                    tris.push(t);
                }
            }
        }
        Self { edge_tri }
    }

    pub fn edge_tris(&self, v0: usize, v1: usize) -> Option<&[usize]> {
        self.edge_tri.get(&edge_key(v0, v1)).map(Vec::as_slice)
    }

    /// The other triangle on the edge when it has exactly two, else None
    pub fn other_tri_if_manifold(&self, v0: usize, v1: usize, t: usize) -> Option<usize> {
        match self.edge_tris(v0, v1)? {
            [a, b] if *a == t => Some(*b),
            [a, b] if *b == t => Some(*a),
            _ => None,
        }
    }
}

/// Triangles connected through manifold edges
#[derive(Debug, Clone, Default)]
pub struct Patch {
    tris: Vec<usize>,
}

impl Patch {
    pub fn tri(&self, index: usize) -> usize {
        self.tris[index]
    }

    pub fn tris(&self) -> &[usize] {
        &self.tris
    }

    pub fn tot_tri(&self) -> usize {
        self.tris.len()
    }
}

impl fmt::Display for Patch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Patch{:?}", self.tris)
    }
}

#[derive(Debug, Clone)]
pub struct PatchesInfo {
    patches: Vec<Patch>,
    tri_patch: Vec<i32>,
}

impl PatchesInfo {
    fn new(ntri: usize) -> Self {
        Self {
            patches: Vec::new(),
            tri_patch: vec![NO_INDEX; ntri],
        }
    }

    pub fn tri_patch(&self, t: usize) -> i32 {
        self.tri_patch[t]
    }

    pub fn tot_patch(&self) -> usize {
        self.patches.len()
    }

    pub fn patch(&self, p: usize) -> &Patch {
        &self.patches[p]
    }

    pub fn patches(&self) -> &[Patch] {
        &self.patches
    }
}

/// Grow patches from unassigned seeds in triangle order, crossing only
/// edges shared by exactly two triangles.
pub fn find_patches(tm: &IMesh, topo: &TriMeshTopology) -> PatchesInfo {
    let mut pinfo = PatchesInfo::new(tm.face_size());
    let mut stack = Vec::new();
    for seed in 0..tm.face_size() {
        if pinfo.tri_patch[seed] != NO_INDEX {
            continue;
        }
        let p = pinfo.patches.len();
        pinfo.patches.push(Patch::default());
        stack.push(seed);
        while let Some(t) = stack.pop() {
            if pinfo.tri_patch[t] != NO_INDEX {
                continue;
            }
            pinfo.tri_patch[t] = p as i32;
            pinfo.patches[p].tris.push(t);
            let f = tm.face(t);
            for i in 0..3 {
                if let Some(t_other) = topo.other_tri_if_manifold(f[i].id, f[f.next_pos(i)].id, t) {
                    if pinfo.tri_patch[t_other] == NO_INDEX {
                        stack.push(t_other);
                    }
                }
            }
        }
    }
    pinfo
}

/// Ray/triangle hit test in the style of Möller and Trumbore, with a small
/// barycentric slack so rays through shared edges count on both sides.
fn ray_hits_tri(
    origin: &Vector3<f64>,
    dir: &Vector3<f64>,
    v0: &Vector3<f64>,
    v1: &Vector3<f64>,
    v2: &Vector3<f64>,
) -> bool {
    let e1 = v1 - v0;
    let e2 = v2 - v0;
    let p = dir.cross(&e2);
    let a = e1.dot(&p);
    if a == 0.0 {
        return false;
    }
    let f = 1.0 / a;
    let s = origin - v0;
    let u = f * s.dot(&p);
    if !(-RAY_TRI_EPSILON..=1.0 + RAY_TRI_EPSILON).contains(&u) {
        return false;
    }
    let q = s.cross(&e1);
    let v = f * dir.dot(&q);
    if v < -RAY_TRI_EPSILON || u + v > 1.0 + RAY_TRI_EPSILON {
        return false;
    }
    f * e2.dot(&q) >= 0.0
}

/// Ray-cast acceleration over every triangle of a mesh
pub struct RaycastTree<'a> {
    tm: &'a IMesh,
    bvh: BVH,
}

impl<'a> RaycastTree<'a> {
    pub fn new(tm: &'a IMesh) -> Self {
        let bvh = BVH::build(calc_face_bounding_boxes(tm).into_iter().enumerate().collect());
        Self { tm, bvh }
    }

    /// Confidence in `[0, 1]` that triangle `test_t` lies inside each shape.
    /// A triangle is always fully inside its own shape; triangles outside
    /// every shape get all zeros.
    pub fn test_tri_inside_shapes(&self, shape_fn: ShapeFn<'_>, nshapes: usize, test_t: usize) -> Vec<f32> {
        let tri_test = self.tm.face(test_t);
        let shape = shape_fn(tri_test.orig);
        if shape < 0 {
            return vec![0.0; nshapes];
        }
        let centroid = (tri_test[0].co + tri_test[1].co + tri_test[2].co) / 3.0;
        tri_test.populate_plane(false);
        let norm = tri_test.populated_plane().norm.try_normalize(0.0).unwrap_or_else(Vector3::zeros);
        let origin = centroid + norm * TEST_POINT_OFFSET;

        let mut count_insides = vec![0usize; nshapes];
        let mut hit_parity = vec![0i32; nshapes];
        for ray in &TEST_RAYS {
            let dir = Vector3::new(ray[0], ray[1], ray[2]);
            hit_parity.fill(0);
            self.bvh.raycast_all(&origin, &dir, |t| {
                let tri = self.tm.face(t);
                let Ok(s) = usize::try_from(shape_fn(tri.orig)) else {
                    return;
                };
                if ray_hits_tri(&origin, &dir, &tri[0].co, &tri[1].co, &tri[2].co) {
                    // +1 when the ray leaves through the front of the triangle.
                    hit_parity[s] += orient3d(&tri[0].co, &tri[1].co, &tri[2].co, &origin);
                }
            });
            for (j, &parity) in hit_parity.iter().enumerate() {
                if j as i32 != shape && parity > 0 {
                    count_insides[j] += 1;
                }
            }
        }
        (0..nshapes)
            .map(|j| {
                if j as i32 == shape {
                    1.0
                } else {
                    count_insides[j] as f32 / TEST_RAYS.len() as f32
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::test_util::cube_mesh;
    use crate::geometry::IMeshArena;

    #[test]
    fn test_test_rays_are_unit_length() {
        for r in &TEST_RAYS {
            approx::assert_relative_eq!(Vector3::new(r[0], r[1], r[2]).norm(), 1.0, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_ray_hits_tri() {
        let v0 = Vector3::new(0.0, 0.0, 1.0);
        let v1 = Vector3::new(1.0, 0.0, 1.0);
        let v2 = Vector3::new(0.0, 1.0, 1.0);
        let o = Vector3::new(0.2, 0.2, 0.0);
        assert!(ray_hits_tri(&o, &Vector3::z(), &v0, &v1, &v2));
        assert!(!ray_hits_tri(&o, &-Vector3::z(), &v0, &v1, &v2));
        let outside = Vector3::new(0.9, 0.9, 0.0);
        assert!(!ray_hits_tri(&outside, &Vector3::z(), &v0, &v1, &v2));
    }

    #[test]
    fn test_closed_cube_is_one_patch() {
        let arena = IMeshArena::new();
        let cube = cube_mesh(&arena, [0.0; 3], 1.0, 0);
        let topo = TriMeshTopology::new(&cube);
        let pinfo = find_patches(&cube, &topo);
        assert_eq!(pinfo.tot_patch(), 1);
        assert_eq!(pinfo.patch(0).tot_tri(), 12);
    }

    #[test]
    fn test_inner_cube_inside_outer() {
        let arena = IMeshArena::new();
        let outer = cube_mesh(&arena, [0.0; 3], 4.0, 0);
        let inner = cube_mesh(&arena, [1.0; 3], 1.0, 12);
        let mut faces = outer.into_faces();
        faces.extend(inner.into_faces());
        let tm = IMesh::from_faces(faces);
        let shape = |orig: i32| if orig < 12 { 0 } else { 1 };
        let tree = RaycastTree::new(&tm);
        let inner_in = tree.test_tri_inside_shapes(&shape, 2, 12);
        assert_eq!(inner_in, vec![1.0, 1.0]);
        let outer_in = tree.test_tri_inside_shapes(&shape, 2, 0);
        assert_eq!(outer_in, vec![1.0, 0.0]);
    }
}
