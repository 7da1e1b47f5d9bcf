// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Polyframe Inc.

//! Wavefront OBJ reading and writing
//!
//! Only `v` and `f` records carry geometry. Each `o` or `g` record that
//! follows faces starts a new operand shape. Texture and normal indices in
//! `f` records are ignored.

use super::PolyMesh;
use crate::error::{MeshError, Result};
use crate::geometry::IMesh;
use std::fmt::Write as _;
use std::path::Path;

fn parse_index(token: &str, nverts: usize, line: usize) -> Result<usize> {
    let first = token.split('/').next().unwrap_or_default();
    let raw: i64 = first
        .parse()
        .map_err(|_| MeshError::parse(line, format!("bad vertex index '{token}'")))?;
    let index = match raw {
        0 => None,
        r if r > 0 => usize::try_from(r - 1).ok(),
        r => usize::try_from(nverts as i64 + r).ok(),
    };
    index
        .filter(|&i| i < nverts)
        .ok_or_else(|| MeshError::parse(line, format!("vertex index {raw} out of range")))
}

/// Parse OBJ text
pub fn parse_obj(text: &str) -> Result<PolyMesh> {
    let mut pm = PolyMesh::new();
    let mut shape = 0;
    let mut shape_has_faces = false;
    for (lineno, raw_line) in text.lines().enumerate() {
        let line = lineno + 1;
        let content = raw_line.split('#').next().unwrap_or_default();
        let mut tokens = content.split_whitespace();
        match tokens.next() {
            Some("v") => {
                let co: Vec<f64> = tokens
                    .take(3)
                    .map(str::parse::<f64>)
                    .collect::<std::result::Result<_, _>>()
                    .map_err(|e| MeshError::parse(line, format!("bad coordinate: {e}")))?;
                if co.len() != 3 {
                    return Err(MeshError::parse(line, "vertex needs three coordinates"));
                }
                pm.add_vertex([co[0], co[1], co[2]]);
            }
            Some("f") => {
                let nverts = pm.vertices.len();
                let face = tokens
                    .map(|t| parse_index(t, nverts, line))
                    .collect::<Result<Vec<_>>>()?;
                if face.len() < 3 {
                    return Err(MeshError::parse(line, "face needs at least three vertices"));
                }
                pm.add_face(face, shape);
                shape_has_faces = true;
            }
            Some("o") | Some("g") => {
                if shape_has_faces {
                    shape += 1;
                    shape_has_faces = false;
                }
            }
            _ => {}
        }
    }
    Ok(pm)
}

pub fn read_obj(path: impl AsRef<Path>) -> Result<PolyMesh> {
    let path = path.as_ref();
    let text = std::fs::read_to_string(path).map_err(|e| MeshError::io(path, e))?;
    parse_obj(&text)
}

/// Format a polygon mesh as OBJ text, one `o` record per shape run
pub fn format_obj(pm: &PolyMesh) -> String {
    let mut out = String::new();
    for v in &pm.vertices {
        let _ = writeln!(out, "v {} {} {}", v[0], v[1], v[2]);
    }
    let mut current_shape = None;
    for (face, &shape) in pm.faces.iter().zip(&pm.face_shape) {
        if current_shape != Some(shape) {
            let _ = writeln!(out, "o shape{shape}");
            current_shape = Some(shape);
        }
        out.push('f');
        for &v in face {
            let _ = write!(out, " {}", v + 1);
        }
        out.push('\n');
    }
    out
}

pub fn write_obj(pm: &PolyMesh, path: impl AsRef<Path>) -> Result<()> {
    let path = path.as_ref();
    std::fs::write(path, format_obj(pm)).map_err(|e| MeshError::io(path, e))
}

/// Dump an engine mesh as OBJ, for inspecting intermediate results
pub fn write_obj_mesh(m: &mut IMesh, path: impl AsRef<Path>) -> Result<()> {
    write_obj(&PolyMesh::from_imesh(m, &[]), path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_groups_and_relative_indices() {
        let text = "\
# two triangles in two objects
o first
v 0 0 0
v 1 0 0
v 0 1 0
f 1 2 3
o second
v 0 0 1
v 1 0 1
v 0 1 1
f -3/1 -2/2 -1/3
";
        let pm = parse_obj(text).unwrap();
        assert_eq!(pm.vertices.len(), 6);
        assert_eq!(pm.faces, vec![vec![0, 1, 2], vec![3, 4, 5]]);
        assert_eq!(pm.face_shape, vec![0, 1]);
    }

    #[test]
    fn test_leading_group_does_not_skip_shape() {
        let pm = parse_obj("g a\nv 0 0 0\nv 1 0 0\nv 0 1 0\nf 1 2 3\n").unwrap();
        assert_eq!(pm.face_shape, vec![0]);
    }

    #[test]
    fn test_bad_index_reports_line() {
        let err = parse_obj("v 0 0 0\nf 1 2 3\n").unwrap_err();
        assert!(matches!(err, MeshError::Parse { line: 2, .. }));
    }

    #[test]
    fn test_format_parse_round_trip() {
        let text = "v 0 0 0\nv 1 0 0\nv 1 1 0\nv 0 1 0\nf 1 2 3 4\n";
        let pm = parse_obj(text).unwrap();
        assert_eq!(parse_obj(&format_obj(&pm)).unwrap(), pm);
    }
}
