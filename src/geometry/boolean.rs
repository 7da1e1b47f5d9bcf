// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Polyframe Inc.

//! Boolean operations on intersected meshes

use super::arena::IMeshArena;
use super::classification::{find_patches, RaycastTree, TriMeshTopology};
use super::dissolve::polymesh_from_trimesh_with_dissolve;
use super::intersect::trimesh_nary_intersect;
use super::mesh::{Face, FaceRef, IMesh};
use super::overlap::ShapeFn;
use super::triangulate::triangulate_polymesh;
use log::debug;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BoolOpType {
    /// Intersect only, keep everything
    None,
    Intersect,
    Union,
    /// Shape 0 minus the union of all other shapes
    Difference,
}

impl fmt::Display for BoolOpType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            BoolOpType::None => "none",
            BoolOpType::Intersect => "intersect",
            BoolOpType::Union => "union",
            BoolOpType::Difference => "difference",
        };
        write!(f, "{name}")
    }
}

impl FromStr for BoolOpType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "none" => Ok(BoolOpType::None),
            "intersect" | "intersection" => Ok(BoolOpType::Intersect),
            "union" => Ok(BoolOpType::Union),
            "difference" | "diff" => Ok(BoolOpType::Difference),
            other => Err(format!("unknown boolean operation '{other}'")),
        }
    }
}

/// Whether a region with the given per-shape winding numbers belongs to
/// the result of `op`
pub fn apply_bool_op(op: BoolOpType, winding: &[i32]) -> bool {
    debug_assert!(!winding.is_empty());
    match op {
        BoolOpType::Intersect => winding.iter().all(|&w| w != 0),
        BoolOpType::Union => winding.iter().any(|&w| w != 0),
        BoolOpType::Difference => winding[0] != 0 && winding[1..].iter().all(|&w| w < 1),
        BoolOpType::None => false,
    }
}

/// Returns `(remove, flip)` for a triangle of `shape`. The triangle stays
/// when toggling its own shape's winding changes the outcome; kept cutters
/// of a Difference face the other way.
pub fn raycast_test_remove(op: BoolOpType, winding: &mut [i32], shape: usize) -> (bool, bool) {
    winding[shape] = 0;
    let in_output_volume_0 = apply_bool_op(op, winding);
    winding[shape] = 1;
    let in_output_volume_1 = apply_bool_op(op, winding);
    let do_remove = in_output_volume_0 == in_output_volume_1;
    let do_flip = !do_remove && op == BoolOpType::Difference && shape != 0;
    (do_remove, do_flip)
}

fn flipped(tri: &Face, arena: &IMeshArena) -> FaceRef {
    arena.add_face(
        vec![tri[0].clone(), tri[2].clone(), tri[1].clone()],
        tri.orig,
        vec![tri.edge_orig[2], tri.edge_orig[1], tri.edge_orig[0]],
        vec![tri.is_intersect[2], tri.is_intersect[1], tri.is_intersect[0]],
    )
}

/// Winding guess for the test triangle `t` against every other shape
fn classify_winding(
    tree: &RaycastTree<'_>,
    op: BoolOpType,
    nshapes: usize,
    shape_fn: ShapeFn<'_>,
    t: usize,
    shape: usize,
    winding: &mut [i32],
) {
    let in_shape = tree.test_tri_inside_shapes(shape_fn, nshapes, t);
    // Cutters of a Difference and Intersect operands need a clear majority.
    let need_high_confidence = (op == BoolOpType::Difference && shape != 0) || op == BoolOpType::Intersect;
    let threshold = if need_high_confidence { 0.5 } else { 0.1 };
    for (other, w) in winding.iter_mut().enumerate() {
        if other != shape {
            *w = i32::from(in_shape[other] >= threshold);
        }
    }
}

fn raycast_tris_boolean(
    tm: &IMesh,
    op: BoolOpType,
    nshapes: usize,
    shape_fn: ShapeFn<'_>,
    arena: &IMeshArena,
) -> IMesh {
    let tree = RaycastTree::new(tm);
    let mut out_faces = Vec::with_capacity(tm.face_size());
    let mut winding = vec![0; nshapes];
    for (t, tri) in tm.faces().enumerate() {
        let Ok(shape) = usize::try_from(shape_fn(tri.orig)) else {
            continue;
        };
        classify_winding(&tree, op, nshapes, shape_fn, t, shape, &mut winding);
        match raycast_test_remove(op, &mut winding, shape) {
            (true, _) => {}
            (false, false) => out_faces.push(tri.clone()),
            (false, true) => out_faces.push(flipped(tri, arena)),
        }
    }
    IMesh::from_faces(out_faces)
}

fn raycast_patches_boolean(
    tm: &IMesh,
    op: BoolOpType,
    nshapes: usize,
    shape_fn: ShapeFn<'_>,
    arena: &IMeshArena,
) -> IMesh {
    let topo = TriMeshTopology::new(tm);
    let pinfo = find_patches(tm, &topo);
    debug!("raycast boolean over {} patches", pinfo.tot_patch());
    let tree = RaycastTree::new(tm);
    let mut out_faces = Vec::with_capacity(tm.face_size());
    let mut winding = vec![0; nshapes];
    for patch in pinfo.patches() {
        // Triangles near the start of a patch can sit close to its neighbours.
        let test_t = patch.tri(patch.tot_tri() / 2);
        let Ok(shape) = usize::try_from(shape_fn(tm.face(test_t).orig)) else {
            continue;
        };
        classify_winding(&tree, op, nshapes, shape_fn, test_t, shape, &mut winding);
        let (do_remove, do_flip) = raycast_test_remove(op, &mut winding, shape);
        if do_remove {
            continue;
        }
        for &t in patch.tris() {
            let f = tm.face(t);
            out_faces.push(if do_flip { flipped(f, arena) } else { f.clone() });
        }
    }
    IMesh::from_faces(out_faces)
}

/// Boolean of the operands of a triangle mesh. `shape_fn` maps a face
/// `orig` to its operand in `0..nshapes`. With `hole_tolerant` every
/// triangle is classified on its own, which copes with open operands at
/// the cost of one ray test per triangle.
pub fn boolean_trimesh(
    tm_in: &IMesh,
    op: BoolOpType,
    nshapes: usize,
    shape_fn: ShapeFn<'_>,
    use_self: bool,
    hole_tolerant: bool,
    arena: &IMeshArena,
) -> IMesh {
    debug!(
        "boolean of {nshapes} operand{} op={op}",
        if nshapes == 1 { "" } else { "s" }
    );
    if tm_in.face_size() == 0 {
        return tm_in.clone();
    }
    let start = Instant::now();
    let tm_si = trimesh_nary_intersect(tm_in, nshapes, shape_fn, use_self, arena);
    debug!("intersected, time = {:?}", start.elapsed());
    if tm_si.face_size() == 0 || op == BoolOpType::None {
        return tm_si;
    }
    let tm_out = if hole_tolerant {
        raycast_tris_boolean(&tm_si, op, nshapes, shape_fn, arena)
    } else {
        raycast_patches_boolean(&tm_si, op, nshapes, shape_fn, arena)
    };
    debug!(
        "boolean_trimesh done: {} tris, total time = {:?}",
        tm_out.face_size(),
        start.elapsed()
    );
    tm_out
}

/// Boolean of a polygon mesh. Pass `triangulated` when a triangulation of
/// `pm` already exists. Output triangles from the same face of `pm` are
/// merged back into polygons, so face `orig`s of `pm` must equal their index.
#[allow(clippy::too_many_arguments)]
pub fn boolean_mesh(
    pm: &IMesh,
    op: BoolOpType,
    nshapes: usize,
    shape_fn: ShapeFn<'_>,
    use_self: bool,
    hole_tolerant: bool,
    triangulated: Option<&IMesh>,
    arena: &IMeshArena,
) -> IMesh {
    let ours;
    let tm_in = match triangulated {
        Some(tm) => tm,
        None => {
            ours = triangulate_polymesh(pm, arena);
            &ours
        }
    };
    let tm_out = boolean_trimesh(tm_in, op, nshapes, shape_fn, use_self, hole_tolerant, arena);
    let start = Instant::now();
    let out = polymesh_from_trimesh_with_dissolve(&tm_out, pm, arena);
    debug!("polymesh from dissolving, time = {:?}", start.elapsed());
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::test_util::{cube_mesh, cube_quads};

    #[test]
    fn test_apply_bool_op_table() {
        assert!(apply_bool_op(BoolOpType::Intersect, &[1, 1]));
        assert!(!apply_bool_op(BoolOpType::Intersect, &[1, 0]));
        assert!(apply_bool_op(BoolOpType::Union, &[0, 1]));
        assert!(!apply_bool_op(BoolOpType::Union, &[0, 0]));
        assert!(apply_bool_op(BoolOpType::Difference, &[1, 0, 0]));
        assert!(!apply_bool_op(BoolOpType::Difference, &[1, 0, 1]));
        assert!(apply_bool_op(BoolOpType::Difference, &[1]));
        assert!(!apply_bool_op(BoolOpType::None, &[1, 1]));
    }

    #[test]
    fn test_remove_and_flip_decisions() {
        let mut w = vec![0, 1];
        // Shape 0 triangle inside shape 1: kept by intersect, dropped by union.
        assert_eq!(raycast_test_remove(BoolOpType::Intersect, &mut w, 0), (false, false));
        w = vec![0, 1];
        assert_eq!(raycast_test_remove(BoolOpType::Union, &mut w, 0), (true, false));
        // Cutter inside shape 0 bounds the difference, facing inward.
        w = vec![1, 0];
        assert_eq!(raycast_test_remove(BoolOpType::Difference, &mut w, 1), (false, true));
    }

    #[test]
    fn test_op_names_round_trip() {
        for op in [BoolOpType::None, BoolOpType::Intersect, BoolOpType::Union, BoolOpType::Difference] {
            assert_eq!(op.to_string().parse::<BoolOpType>(), Ok(op));
        }
        assert!("xor".parse::<BoolOpType>().is_err());
    }

    #[test]
    fn test_disjoint_union_keeps_both() {
        let arena = IMeshArena::new();
        let a = cube_mesh(&arena, [0.0; 3], 1.0, 0);
        let b = cube_mesh(&arena, [3.0; 3], 1.0, 12);
        let mut faces = a.into_faces();
        faces.extend(b.into_faces());
        let tm = IMesh::from_faces(faces);
        let shape = |orig: i32| if orig < 12 { 0 } else { 1 };
        let out = boolean_trimesh(&tm, BoolOpType::Union, 2, &shape, false, false, &arena);
        assert_eq!(out.face_size(), 24);
        let inter = boolean_trimesh(&tm, BoolOpType::Intersect, 2, &shape, false, false, &arena);
        assert_eq!(inter.face_size(), 0);
    }

    #[test]
    fn test_nested_difference_flips_cutter() {
        let arena = IMeshArena::new();
        let outer = cube_mesh(&arena, [0.0; 3], 4.0, 0);
        let inner = cube_mesh(&arena, [1.0; 3], 1.0, 12);
        let mut faces = outer.into_faces();
        faces.extend(inner.into_faces());
        let tm = IMesh::from_faces(faces);
        let shape = |orig: i32| if orig < 12 { 0 } else { 1 };
        let out = boolean_trimesh(&tm, BoolOpType::Difference, 2, &shape, false, true, &arena);
        assert_eq!(out.face_size(), 24);
        let flipped_inner = out.faces().filter(|f| f.orig >= 12).count();
        assert_eq!(flipped_inner, 12);
        assert!(out
            .faces()
            .filter(|f| f.orig >= 12)
            .all(|f| !tm.faces().any(|g| std::sync::Arc::ptr_eq(f, g))));
    }

    #[test]
    fn test_disjoint_union_restores_input_quads() {
        let arena = IMeshArena::new();
        let mut faces = cube_quads(&arena, [0.0; 3], 1.0, 0).into_faces();
        faces.extend(cube_quads(&arena, [3.0; 3], 1.0, 6).into_faces());
        let pm = IMesh::from_faces(faces);
        let shape = |orig: i32| if orig < 6 { 0 } else { 1 };
        let out = boolean_mesh(&pm, BoolOpType::Union, 2, &shape, false, false, None, &arena);
        assert_eq!(out.face_size(), 12);
        assert!(out
            .faces()
            .all(|f| pm.faces().any(|g| std::sync::Arc::ptr_eq(f, g))));
    }

    #[test]
    fn test_nested_difference_gives_quads() {
        let arena = IMeshArena::new();
        let mut faces = cube_quads(&arena, [0.0; 3], 4.0, 0).into_faces();
        faces.extend(cube_quads(&arena, [1.0; 3], 1.0, 6).into_faces());
        let pm = IMesh::from_faces(faces);
        let shape = |orig: i32| if orig < 6 { 0 } else { 1 };
        let out = boolean_mesh(&pm, BoolOpType::Difference, 2, &shape, false, true, None, &arena);
        assert_eq!(out.face_size(), 12);
        assert!(out.faces().all(|f| f.size() == 4));
        // Cutter quads come back reversed.
        for f in out.faces().filter(|f| f.orig >= 6) {
            let input = pm.face(f.orig as usize);
            assert!(!f.cyclic_equal(input));
            let reversed: Vec<_> = input.vert.iter().rev().cloned().collect();
            assert!(crate::geometry::mesh::verts_cyclic_equal(&f.vert, &reversed));
        }
    }
}
