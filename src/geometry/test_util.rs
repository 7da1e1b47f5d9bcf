// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Polyframe Inc.

//! Mesh fixtures shared by unit tests

use super::{IMesh, IMeshArena, VertRef, NO_INDEX};
use nalgebra::Vector3;

/// Quads of an axis-aligned cube over corner indices `x | y << 1 | z << 2`,
/// counter-clockwise seen from outside
const CUBE_QUADS: [[usize; 4]; 6] = [
    [0, 4, 6, 2],
    [1, 3, 7, 5],
    [0, 1, 5, 4],
    [2, 6, 7, 3],
    [0, 2, 3, 1],
    [4, 5, 7, 6],
];

/// Closed, outward-facing cube of 12 triangles with face origs
/// `orig_base..orig_base + 12`
pub fn cube_mesh(arena: &IMeshArena, min: [f64; 3], size: f64, orig_base: i32) -> IMesh {
    let corners = cube_corners(arena, min, size);
    let mut faces = Vec::with_capacity(12);
    for q in &CUBE_QUADS {
        for tri in [[q[0], q[1], q[2]], [q[0], q[2], q[3]]] {
            let orig = orig_base + faces.len() as i32;
            faces.push(arena.add_face_simple(tri.iter().map(|&c| corners[c].clone()).collect(), orig));
        }
    }
    IMesh::from_faces(faces)
}

/// Cube of six quads with face origs `orig_base..orig_base + 6` and edge
/// origs `4 * orig + k`
pub fn cube_quads(arena: &IMeshArena, min: [f64; 3], size: f64, orig_base: i32) -> IMesh {
    let corners = cube_corners(arena, min, size);
    let faces = CUBE_QUADS
        .iter()
        .enumerate()
        .map(|(i, q)| {
            let orig = orig_base + i as i32;
            arena.add_face_with_edges(
                q.iter().map(|&c| corners[c].clone()).collect(),
                orig,
                (0..4).map(|k| 4 * orig + k).collect(),
            )
        })
        .collect();
    IMesh::from_faces(faces)
}

fn cube_corners(arena: &IMeshArena, min: [f64; 3], size: f64) -> Vec<VertRef> {
    (0..8)
        .map(|i| {
            let co = Vector3::new(
                min[0] + size * (i & 1) as f64,
                min[1] + size * ((i >> 1) & 1) as f64,
                min[2] + size * ((i >> 2) & 1) as f64,
            );
            arena.add_or_find_vert(&co, NO_INDEX)
        })
        .collect()
}
