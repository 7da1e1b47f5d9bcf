// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Polyframe Inc.

//! I/O module - mesh files in and out

mod obj;
mod polymesh;
mod stl;

pub use obj::{format_obj, parse_obj, read_obj, write_obj, write_obj_mesh};
pub use polymesh::PolyMesh;
pub use stl::{read_stl, write_stl};

use crate::error::{MeshError, Result};
use std::path::Path;

/// Read a mesh, choosing the format by file extension
pub fn read_mesh(path: impl AsRef<Path>) -> Result<PolyMesh> {
    let path = path.as_ref();
    match extension(path).as_str() {
        "obj" => read_obj(path),
        "stl" => read_stl(path),
        other => Err(MeshError::parse(0, format!("unsupported mesh format '{other}'"))),
    }
}

pub(crate) fn extension(path: &Path) -> String {
    path.extension()
        .and_then(|e| e.to_str())
        .unwrap_or_default()
        .to_ascii_lowercase()
}
