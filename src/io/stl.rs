// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Polyframe Inc.

//! STL reading and writing through `stl_io`

use super::PolyMesh;
use crate::error::{MeshError, Result};
use crate::geometry::IMesh;
use nalgebra::Vector3;
use std::fs::File;
use std::io::BufWriter;
use std::path::Path;
use stl_io::{Normal, Triangle as StlTriangle, Vertex as StlVertex};

/// Read an STL file as a single-shape triangle mesh
pub fn read_stl(path: impl AsRef<Path>) -> Result<PolyMesh> {
    let path = path.as_ref();
    let mut file = File::open(path).map_err(|e| MeshError::io(path, e))?;
    let stl = stl_io::read_stl(&mut file).map_err(|e| MeshError::Stl(e.to_string()))?;
    let mut pm = PolyMesh::new();
    for v in &stl.vertices {
        pm.add_vertex([f64::from(v[0]), f64::from(v[1]), f64::from(v[2])]);
    }
    for face in &stl.faces {
        pm.add_face(face.vertices.to_vec(), 0);
    }
    Ok(pm)
}

/// Write a triangle mesh as binary STL
pub fn write_stl(m: &IMesh, path: impl AsRef<Path>) -> Result<()> {
    let path = path.as_ref();
    let mut triangles = Vec::with_capacity(m.face_size());
    for (i, f) in m.faces().enumerate() {
        if !f.is_tri() {
            return Err(MeshError::NonTriangle { face: i, size: f.size() });
        }
        f.populate_plane(false);
        let n = f
            .populated_plane()
            .norm
            .try_normalize(0.0)
            .unwrap_or_else(Vector3::zeros);
        let corner = |k: usize| {
            let co = &f[k].co;
            StlVertex::new([co.x as f32, co.y as f32, co.z as f32])
        };
        triangles.push(StlTriangle {
            normal: Normal::new([n.x as f32, n.y as f32, n.z as f32]),
            vertices: [corner(0), corner(1), corner(2)],
        });
    }
    let file = File::create(path).map_err(|e| MeshError::io(path, e))?;
    let mut writer = BufWriter::new(file);
    stl_io::write_stl(&mut writer, triangles.iter()).map_err(|e| MeshError::io(path, e))
}
