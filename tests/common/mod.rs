// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Polyframe Inc.

//! Shared fixtures for integration tests

#![allow(dead_code)]

use meshintersect::geometry::{FaceRef, IMesh, IMeshArena, NO_INDEX};
use meshintersect::PolyMesh;
use nalgebra::Vector3;

/// One face per triangle, `orig = index`, edges numbered `3 * index + k`
pub fn tri_mesh(arena: &IMeshArena, tris: &[[[f64; 3]; 3]]) -> IMesh {
    let faces: Vec<FaceRef> = tris
        .iter()
        .enumerate()
        .map(|(i, pts)| {
            let v = pts
                .iter()
                .map(|p| arena.add_or_find_vert(&Vector3::new(p[0], p[1], p[2]), NO_INDEX))
                .collect();
            let base = 3 * i as i32;
            arena.add_face_with_edges(v, i as i32, vec![base, base + 1, base + 2])
        })
        .collect();
    IMesh::from_faces(faces)
}

/// Axis-aligned cube of six outward quads tagged with `shape`
pub fn cube_polymesh(min: [f64; 3], size: f64, shape: usize) -> PolyMesh {
    let mut pm = PolyMesh::new();
    for i in 0..8 {
        pm.add_vertex([
            min[0] + size * (i & 1) as f64,
            min[1] + size * ((i >> 1) & 1) as f64,
            min[2] + size * ((i >> 2) & 1) as f64,
        ]);
    }
    for quad in [
        [0, 4, 6, 2],
        [1, 3, 7, 5],
        [0, 1, 5, 4],
        [2, 6, 7, 3],
        [0, 2, 3, 1],
        [4, 5, 7, 6],
    ] {
        pm.add_face(quad.to_vec(), shape);
    }
    pm
}

/// Volume enclosed by a closed, outward-facing mesh
pub fn signed_volume(pm: &PolyMesh) -> f64 {
    let co = |i: usize| Vector3::from(pm.vertices[i]);
    pm.faces
        .iter()
        .map(|f| {
            (1..f.len() - 1)
                .map(|k| co(f[0]).dot(&co(f[k]).cross(&co(f[k + 1]))) / 6.0)
                .sum::<f64>()
        })
        .sum()
}

pub fn face_area(f: &FaceRef) -> f64 {
    0.5 * (f[1].co - f[0].co).cross(&(f[2].co - f[0].co)).norm()
}
