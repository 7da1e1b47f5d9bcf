// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Polyframe Inc.

//! Polyframe meshintersect
//!
//! Exact-arithmetic triangle mesh intersection and Boolean operations.
//! Every topological decision is made with rational arithmetic, behind
//! floating-point filters with proven error bounds.

pub mod config;
pub mod error;
pub mod geometry;
pub mod io;
pub mod layers;

pub use config::IntersectConfig;
pub use error::{MeshError, Result};
pub use geometry::{
    boolean_mesh, boolean_trimesh, triangulate_polymesh, trimesh_nary_intersect, trimesh_self_intersect,
    BoolOpType, IMesh, IMeshArena,
};
pub use io::PolyMesh;
pub use layers::{cdf_layer_add, cdf_layer_find, LayerFile, LayerInfo};

/// Resolve all self-intersections of a polygon mesh. Polygons are
/// triangulated first; operands are ignored.
pub fn self_intersect(pm: &PolyMesh, config: &IntersectConfig) -> Result<PolyMesh> {
    config.install(|| {
        let arena = IMeshArena::new();
        let (m, shapes) = pm.to_imesh(&arena);
        let tm = triangulate_polymesh(&m, &arena);
        let mut out = trimesh_self_intersect(&tm, &arena);
        PolyMesh::from_imesh(&mut out, &shapes)
    })
}

/// Boolean of the operands of a polygon mesh, as tagged by its face shapes
pub fn boolean(pm: &PolyMesh, op: BoolOpType, config: &IntersectConfig) -> Result<PolyMesh> {
    config.install(|| {
        let arena = IMeshArena::new();
        let (m, shapes) = pm.to_imesh(&arena);
        let shape_fn = |orig: i32| {
            usize::try_from(orig)
                .ok()
                .and_then(|o| shapes.get(o))
                .map_or(-1, |&s| s as i32)
        };
        let mut out = boolean_mesh(
            &m,
            op,
            pm.nshapes().max(1),
            &shape_fn,
            config.use_self,
            config.hole_tolerant,
            None,
            &arena,
        );
        PolyMesh::from_imesh(&mut out, &shapes)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_self_intersect_passes_clean_mesh() {
        let mut pm = PolyMesh::new();
        for co in [[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [1.0, 1.0, 0.0], [0.0, 1.0, 0.0]] {
            pm.add_vertex(co);
        }
        pm.add_face(vec![0, 1, 2, 3], 0);
        let out = self_intersect(&pm, &IntersectConfig::default()).unwrap();
        assert_eq!(out.faces.len(), 2);
        assert!(out.is_triangulated());
    }
}
