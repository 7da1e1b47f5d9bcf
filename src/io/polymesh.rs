// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Polyframe Inc.

//! Plain polygon mesh exchanged with files

use crate::geometry::{IMesh, IMeshArena};
use nalgebra::Vector3;
use serde::{Deserialize, Serialize};

/// Indexed polygon mesh with an operand index per face
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PolyMesh {
    pub vertices: Vec<[f64; 3]>,
    pub faces: Vec<Vec<usize>>,
    pub face_shape: Vec<usize>,
}

impl PolyMesh {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_vertex(&mut self, co: [f64; 3]) -> usize {
        self.vertices.push(co);
        self.vertices.len() - 1
    }

    pub fn add_face(&mut self, face: Vec<usize>, shape: usize) {
        self.faces.push(face);
        self.face_shape.push(shape);
    }

    /// Number of operands, i.e. one past the largest face shape
    pub fn nshapes(&self) -> usize {
        self.face_shape.iter().max().map_or(0, |&s| s + 1)
    }

    pub fn is_triangulated(&self) -> bool {
        self.faces.iter().all(|f| f.len() == 3)
    }

    /// Append another mesh's vertices and faces; its shapes are offset so
    /// they follow this mesh's shapes.
    pub fn append(&mut self, other: &PolyMesh) {
        let voff = self.vertices.len();
        let soff = self.nshapes();
        self.vertices.extend_from_slice(&other.vertices);
        for (face, &shape) in other.faces.iter().zip(&other.face_shape) {
            self.add_face(face.iter().map(|&v| v + voff).collect(), shape + soff);
        }
    }

    /// Build the engine mesh. Face `i` gets `orig = i`, vertex `j` gets
    /// `orig = j`, and edges are numbered in face order. Returns the mesh
    /// and the shape of every face orig.
    pub fn to_imesh(&self, arena: &IMeshArena) -> (IMesh, Vec<usize>) {
        arena.reserve(self.vertices.len(), self.faces.len());
        let verts: Vec<_> = self
            .vertices
            .iter()
            .enumerate()
            .map(|(j, co)| arena.add_or_find_vert(&Vector3::new(co[0], co[1], co[2]), j as i32))
            .collect();
        let mut next_edge = 0i32;
        let faces = self
            .faces
            .iter()
            .enumerate()
            .map(|(i, face)| {
                let edge_orig: Vec<i32> = (0..face.len() as i32).map(|k| next_edge + k).collect();
                next_edge += face.len() as i32;
                arena.add_face_with_edges(face.iter().map(|&v| verts[v].clone()).collect(), i as i32, edge_orig)
            })
            .collect();
        (IMesh::from_faces(faces), self.face_shape.clone())
    }

    /// Flatten an engine mesh. Face shapes are looked up by face orig;
    /// origs outside `shapes` map to shape 0.
    pub fn from_imesh(m: &mut IMesh, shapes: &[usize]) -> Self {
        m.populate_vert();
        let vertices = m.vertices().iter().map(|v| [v.co.x, v.co.y, v.co.z]).collect();
        let mut faces = Vec::with_capacity(m.face_size());
        let mut face_shape = Vec::with_capacity(m.face_size());
        for f in m.faces() {
            faces.push(f.vert.iter().filter_map(|v| m.lookup_vert(v)).collect());
            let shape = usize::try_from(f.orig)
                .ok()
                .and_then(|o| shapes.get(o).copied())
                .unwrap_or(0);
            face_shape.push(shape);
        }
        Self {
            vertices,
            faces,
            face_shape,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quad() -> PolyMesh {
        let mut pm = PolyMesh::new();
        for co in [[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [1.0, 1.0, 0.0], [0.0, 1.0, 0.0]] {
            pm.add_vertex(co);
        }
        pm.add_face(vec![0, 1, 2, 3], 0);
        pm
    }

    #[test]
    fn test_to_imesh_provenance() {
        let arena = IMeshArena::new();
        let (m, shapes) = quad().to_imesh(&arena);
        assert_eq!(m.face_size(), 1);
        assert_eq!(m.face(0).orig, 0);
        assert_eq!(m.face(0).edge_orig, vec![0, 1, 2, 3]);
        assert_eq!(m.face(0)[2].orig, 2);
        assert_eq!(shapes, vec![0]);
    }

    #[test]
    fn test_append_offsets_shapes() {
        let mut a = quad();
        a.append(&quad());
        assert_eq!(a.vertices.len(), 8);
        assert_eq!(a.faces[1], vec![4, 5, 6, 7]);
        assert_eq!(a.nshapes(), 2);
    }

    #[test]
    fn test_from_imesh_keeps_shapes() {
        let arena = IMeshArena::new();
        let mut pm = quad();
        pm.append(&quad());
        let (mut m, shapes) = pm.to_imesh(&arena);
        let back = PolyMesh::from_imesh(&mut m, &shapes);
        // Both quads share coordinates, so the arena merges their vertices.
        assert_eq!(back.vertices.len(), 4);
        assert_eq!(back.face_shape, vec![0, 1]);
        assert_eq!(back.faces[0], back.faces[1]);
    }
}
