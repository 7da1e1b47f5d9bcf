// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Polyframe Inc.

//! Triangle mesh intersection driver
//!
//! Pipeline: drop degenerate triangles, bound them, find overlapping pairs,
//! intersect each pair exactly, group coplanar clusters, re-triangulate,
//! and concatenate the pieces. The output mesh has no two triangles that
//! cross except along shared edges or vertices.

use super::arena::IMeshArena;
use super::bbox::calc_face_bounding_boxes;
use super::cluster::find_clusters;
use super::exact::Mpq3;
use super::mesh::{Face, IMesh};
use super::overlap::{ShapeFn, TriOverlaps};
use super::robust_predicates::{supremum_dot_cross, INDEX_DOT_CROSS};
use super::subdivide::{calc_cluster_subdivided, calc_cluster_tris, calc_subdivided_non_cluster_tris};
use super::tri_tri::calc_overlap_itts;
use log::debug;
use rayon::prelude::*;
use std::sync::Arc;
use std::time::Instant;

/// True if the triangle has a repeated vertex or collinear vertices
pub fn face_is_degenerate(f: &Face) -> bool {
    let (v0, v1, v2) = (&f[0], &f[1], &f[2]);
    if Arc::ptr_eq(v0, v1) || Arc::ptr_eq(v0, v2) || Arc::ptr_eq(v1, v2) {
        return true;
    }
    let da = v2.co - v0.co;
    let db = v2.co - v1.co;
    let dab = da.cross(&db);
    let err_bound = supremum_dot_cross(&dab, &dab) * f64::from(INDEX_DOT_CROSS) * f64::EPSILON;
    if dab.norm_squared() > err_bound {
        return false;
    }
    let a: Mpq3 = &v2.co_exact - &v0.co_exact;
    let b: Mpq3 = &v2.co_exact - &v1.co_exact;
    a.cross(&b).is_zero()
}

fn has_degenerate_tris(tm: &IMesh) -> bool {
    tm.faces()
        .collect::<Vec<_>>()
        .par_iter()
        .with_min_len(1000)
        .any(|f| face_is_degenerate(f))
}

/// Copy of `tm_in` without its degenerate triangles
pub fn remove_degenerate_tris(tm_in: &IMesh) -> IMesh {
    IMesh::from_faces(tm_in.faces().filter(|f| !face_is_degenerate(f)).cloned().collect())
}

fn union_tri_subdivides(tri_subdivided: Vec<IMesh>) -> IMesh {
    let tot: usize = tri_subdivided.iter().map(IMesh::face_size).sum();
    let mut faces = Vec::with_capacity(tot);
    for m in tri_subdivided {
        faces.extend(m.into_faces());
    }
    IMesh::from_faces(faces)
}

/// Intersect all triangles of one mesh with each other
pub fn trimesh_self_intersect(tm_in: &IMesh, arena: &IMeshArena) -> IMesh {
    trimesh_nary_intersect(tm_in, 1, &|_| 0, true, arena)
}

/// Intersect the triangles of `tm_in`, split into `nshapes` operands by
/// `shape_fn` over each face's `orig`. Without `use_self`, triangles of the
/// same operand are never intersected with each other. Faces in operand
/// -1 are ignored by the overlap search but still copied to the output.
pub fn trimesh_nary_intersect(
    tm_in: &IMesh,
    nshapes: usize,
    shape_fn: ShapeFn<'_>,
    use_self: bool,
    arena: &IMeshArena,
) -> IMesh {
    debug!(
        "trimesh_nary_intersect: {} tris, nshapes={nshapes} use_self={use_self}",
        tm_in.face_size()
    );
    debug_assert!(tm_in.faces().all(|f| f.is_tri()));
    let start = Instant::now();

    let cleaned;
    let tm_clean = if has_degenerate_tris(tm_in) {
        cleaned = remove_degenerate_tris(tm_in);
        debug!(
            "removed {} degenerate triangles",
            tm_in.face_size() - cleaned.face_size()
        );
        &cleaned
    } else {
        tm_in
    };
    let mut phase = Instant::now();
    let mut lap = |what: &str| {
        debug!("{what}, time = {:?}", phase.elapsed());
        phase = Instant::now();
    };

    let tri_bb = calc_face_bounding_boxes(tm_clean);
    lap("bounding boxes calculated");
    let tri_ov = TriOverlaps::new(tm_clean, &tri_bb, nshapes, shape_fn, use_self);
    lap("overlaps calculated");

    (0..tm_clean.face_size())
        .into_par_iter()
        .with_min_len(1024)
        .filter(|&t| tri_ov.first_overlap_index(t).is_some())
        .for_each(|t| tm_clean.face(t).populate_plane(true));
    lap("planes populated");

    let itt_map = calc_overlap_itts(tm_clean, &tri_ov);
    lap("intersections found");
    let clinfo = find_clusters(tm_clean, &tri_bb, &itt_map);
    lap("clusters found");

    let mut tri_subdivided = vec![IMesh::new(); tm_clean.face_size()];
    calc_subdivided_non_cluster_tris(&mut tri_subdivided, tm_clean, &itt_map, &clinfo, &tri_ov, arena);
    lap("non-cluster triangles subdivided");

    let cluster_subdivided: Vec<_> = (0..clinfo.tot_cluster())
        .map(|c| calc_cluster_subdivided(&clinfo, c, tm_clean, &tri_ov, &itt_map))
        .collect();
    lap("clusters subdivided");
    calc_cluster_tris(&mut tri_subdivided, tm_clean, &clinfo, &cluster_subdivided, arena);
    lap("cluster triangles extracted");

    let combined = union_tri_subdivides(tri_subdivided);
    debug!(
        "trimesh_nary_intersect done: {} tris out, total time = {:?}",
        combined.face_size(),
        start.elapsed()
    );
    combined
}
