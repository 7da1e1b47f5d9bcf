// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Polyframe Inc.

//! Polygon reconstruction after a Boolean
//!
//! Output triangles that came from the same input face are merged back by
//! dissolving triangulation edges, i.e. edges with no original edge that
//! are not intersection edges. Afterwards synthetic vertices left in the
//! middle of a straight boundary run are removed.

use super::arena::IMeshArena;
use super::mesh::{verts_cyclic_equal, Face, FaceRef, IMesh, Vert, VertRef, NO_INDEX};
use ahash::AHashMap;
use log::debug;
use nalgebra::Vector3;
use rayon::prelude::*;
use std::sync::Arc;

/// Cosine tolerance for "straight" in [`find_dissolve_verts`]
const IN_LINE_TOLERANCE: f64 = 1e-4;

#[derive(Debug, Clone)]
struct MergeEdge {
    len_squared: f64,
    /// Ends ordered by vertex key, smaller first
    v1: VertRef,
    v2: VertRef,
    /// Face traversing the edge from `v1` to `v2`
    left_face: Option<usize>,
    right_face: Option<usize>,
    orig: i32,
    dissolvable: bool,
    is_intersect: bool,
}

#[derive(Debug, Clone)]
struct MergeFace {
    vert: Vec<VertRef>,
    /// Index into `FaceMergeState::edge` for every position
    edge: Vec<usize>,
    merge_to: Option<usize>,
    orig: i32,
}

/// Planar edge/face topology of the triangles of one input face
#[derive(Debug, Default)]
struct FaceMergeState {
    face: Vec<MergeFace>,
    edge: Vec<MergeEdge>,
    edge_map: AHashMap<(usize, usize), usize>,
}

/// Position of `v` in the populated vertex index of `tm`. Vertex ids are
/// handed out in thread order, so they are not used for ordering.
fn vert_key(tm: &IMesh, v: &Vert) -> usize {
    tm.lookup_vert(v).unwrap_or(v.id)
}

impl FaceMergeState {
    /// Topology of the triangles `tris` of `tm` that face along `norm`
    fn new(tris: &[usize], tm: &IMesh, norm: &Vector3<f64>) -> Self {
        let mut fms = Self {
            face: Vec::with_capacity(tris.len() + 1),
            edge: Vec::with_capacity(3 * tris.len()),
            edge_map: AHashMap::with_capacity(3 * tris.len()),
        };
        for &t in tris {
            let tri = tm.face(t);
            if norm.dot(&tri.populated_plane().norm) <= 0.0 {
                continue;
            }
            let f = fms.face.len();
            fms.face.push(MergeFace {
                vert: tri.vert.clone(),
                edge: Vec::with_capacity(3),
                merge_to: None,
                orig: tri.orig,
            });
            for i in 0..3 {
                let va = &tri[i];
                let vb = &tri[tri.next_pos(i)];
                let (ka, kb) = (vert_key(tm, va), vert_key(tm, vb));
                let (v1, v2, canon) = if ka < kb {
                    (va, vb, (ka, kb))
                } else {
                    (vb, va, (kb, ka))
                };
                let me_index = match fms.edge_map.get(&canon) {
                    Some(&e) => e,
                    None => {
                        let orig = tri.edge_orig[i];
                        let is_intersect = tri.is_intersect[i];
                        fms.edge.push(MergeEdge {
                            len_squared: (v2.co - v1.co).norm_squared(),
                            v1: v1.clone(),
                            v2: v2.clone(),
                            left_face: None,
                            right_face: None,
                            orig,
                            dissolvable: orig == NO_INDEX && !is_intersect,
                            is_intersect,
                        });
                        fms.edge_map.insert(canon, fms.edge.len() - 1);
                        fms.edge.len() - 1
                    }
                };
                let me = &mut fms.edge[me_index];
                // The other side may know the edge is real.
                if me.dissolvable && tri.edge_orig[i] != NO_INDEX {
                    me.dissolvable = false;
                    me.orig = tri.edge_orig[i];
                }
                if me.dissolvable && tri.is_intersect[i] {
                    me.dissolvable = false;
                    me.is_intersect = true;
                }
                if Arc::ptr_eq(&me.v1, va) {
                    me.left_face = Some(f);
                } else {
                    me.right_face = Some(f);
                }
                fms.face[f].edge.push(me_index);
            }
        }
        fms
    }

    /// Removing the edge must not leave a face that touches itself: the two
    /// faces may share no other edge and no other vertex.
    fn dissolve_leaves_valid_face(&self, me_index: usize, left: usize, right: usize) -> bool {
        let me = &self.edge[me_index];
        let mf_left = &self.face[left];
        let mf_right = &self.face[right];
        let shares_other_edge = mf_left.edge.iter().any(|&e| {
            e != me_index && (self.edge[e].left_face == Some(right) || self.edge[e].right_face == Some(right))
        });
        if shares_other_edge {
            return false;
        }
        !mf_left
            .vert
            .iter()
            .filter(|v| !Arc::ptr_eq(v, &me.v1) && !Arc::ptr_eq(v, &me.v2))
            .any(|v| mf_right.vert.iter().any(|w| Arc::ptr_eq(v, w)))
    }

    /// Splice the right face of edge `me_index` into its left face
    fn splice_faces(&mut self, me_index: usize, left: usize, right: usize) {
        let Some(a_start) = self.face[left].edge.iter().position(|&e| e == me_index) else {
            return;
        };
        let Some(b_start) = self.face[right].edge.iter().position(|&e| e == me_index) else {
            return;
        };
        let right_vert = std::mem::take(&mut self.face[right].vert);
        let right_edge = std::mem::take(&mut self.face[right].edge);
        let mf_left = &self.face[left];
        let alen = mf_left.vert.len();
        let blen = right_vert.len();
        let mut splice_vert = Vec::with_capacity(alen + blen - 2);
        let mut splice_edge = Vec::with_capacity(alen + blen - 2);
        splice_vert.extend_from_slice(&mf_left.vert[..a_start]);
        splice_edge.extend_from_slice(&mf_left.edge[..a_start]);
        for k in 1..blen {
            let bi = (b_start + k) % blen;
            let e = right_edge[bi];
            splice_vert.push(right_vert[bi].clone());
            splice_edge.push(e);
            if Arc::ptr_eq(&right_vert[bi], &self.edge[e].v1) {
                self.edge[e].left_face = Some(left);
            } else {
                self.edge[e].right_face = Some(left);
            }
        }
        let mf_left = &mut self.face[left];
        splice_vert.extend_from_slice(&mf_left.vert[a_start + 1..]);
        splice_edge.extend_from_slice(&mf_left.edge[a_start + 1..]);
        mf_left.vert = splice_vert;
        mf_left.edge = splice_edge;
        self.face[right].merge_to = Some(left);
        self.edge[me_index].left_face = None;
        self.edge[me_index].right_face = None;
    }

    /// Dissolve every edge that can go, longest first so long skinny
    /// diagonals disappear before short ones.
    fn do_dissolve(&mut self) {
        let mut dissolve_edges: Vec<usize> = (0..self.edge.len()).filter(|&e| self.edge[e].dissolvable).collect();
        dissolve_edges.sort_by(|&a, &b| self.edge[b].len_squared.total_cmp(&self.edge[a].len_squared));
        for me_index in dissolve_edges {
            let (Some(left), Some(right)) = (self.edge[me_index].left_face, self.edge[me_index].right_face) else {
                continue;
            };
            if left == right || !self.dissolve_leaves_valid_face(me_index, left, right) {
                continue;
            }
            self.splice_faces(me_index, left, right);
        }
    }
}

/// Starting positions of the edge `tri1` and `tri2` share in opposite
/// directions
fn find_tris_common_edge(tri1: &Face, tri2: &Face) -> Option<(usize, usize)> {
    (0..3)
        .flat_map(|i| (0..3).map(move |j| (i, j)))
        .find(|&(i, j)| Arc::ptr_eq(&tri1[(i + 1) % 3], &tri2[j]) && Arc::ptr_eq(&tri1[i], &tri2[(j + 1) % 3]))
}

/// Two triangles that still form the input quad give back the input face
fn recover_quad(tri1: &Face, tri2: &Face, in_face: &FaceRef) -> Option<FaceRef> {
    if in_face.size() != 4 {
        return None;
    }
    let (i0, j0) = find_tris_common_edge(tri1, tri2)?;
    if tri1.edge_orig[i0] != NO_INDEX || tri1.is_intersect[i0] {
        return None;
    }
    let quad = [
        tri1[(i0 + 1) % 3].clone(),
        tri1[(i0 + 2) % 3].clone(),
        tri1[i0].clone(),
        tri2[(j0 + 2) % 3].clone(),
    ];
    verts_cyclic_equal(&quad, &in_face.vert).then(|| in_face.clone())
}

/// Merge the output triangles `tris` of one input face. Triangles facing
/// against the first one are merged among themselves.
fn merge_tris_for_face(tris: &[usize], tm: &IMesh, in_face: Option<&FaceRef>, arena: &IMeshArena) -> Vec<FaceRef> {
    match tris {
        [] => return Vec::new(),
        [t] => return vec![tm.face(*t).clone()],
        _ => {}
    }
    let first_normal = tm.face(tris[0]).populated_plane().norm;
    if let ([t1, t2], Some(in_face)) = (tris, in_face) {
        let (tri1, tri2) = (tm.face(*t1), tm.face(*t2));
        if first_normal.dot(&tri2.populated_plane().norm) > 0.0 {
            if let Some(face) = recover_quad(tri1, tri2, in_face) {
                return vec![face];
            }
        }
    }
    let mut out = Vec::new();
    for norm in [first_normal, -first_normal] {
        let mut fms = FaceMergeState::new(tris, tm, &norm);
        fms.do_dissolve();
        for mf in fms.face.iter().filter(|mf| mf.merge_to.is_none()) {
            out.push(arena.add_face(
                mf.vert.clone(),
                mf.orig,
                mf.edge.iter().map(|&e| fms.edge[e].orig).collect(),
                mf.edge.iter().map(|&e| fms.edge[e].is_intersect).collect(),
            ));
        }
    }
    out
}

fn approx_in_line(a: &Vector3<f64>, b: &Vector3<f64>, c: &Vector3<f64>) -> bool {
    match ((b - a).try_normalize(0.0), (c - b).try_normalize(0.0)) {
        (Some(d1), Some(d2)) => (d1.dot(&d2) - 1.0).abs() < IN_LINE_TOLERANCE,
        _ => false,
    }
}

/// Which vertices of `imesh` can go: synthetic, used by faces that all
/// agree on the same two neighbours, and in line with them. Parallels the
/// populated vertex index.
fn find_dissolve_verts(imesh: &mut IMesh) -> (Vec<bool>, usize) {
    imesh.populate_vert();
    let mut dissolve: Vec<bool> = imesh.vertices().iter().map(|v| v.orig == NO_INDEX).collect();
    let mut neighbors: Vec<Option<(VertRef, VertRef)>> = vec![None; dissolve.len()];
    for face in imesh.faces() {
        for i in 0..face.size() {
            let Some(vi) = imesh.lookup_vert(&face[i]) else {
                continue;
            };
            if !dissolve[vi] {
                continue;
            }
            let n1 = &face[face.next_pos(i)];
            let n2 = &face[face.prev_pos(i)];
            match &neighbors[vi] {
                Some((f1, f2)) => {
                    let same = (Arc::ptr_eq(n1, f2) && Arc::ptr_eq(n2, f1))
                        || (Arc::ptr_eq(n1, f1) && Arc::ptr_eq(n2, f2));
                    if !same {
                        dissolve[vi] = false;
                    }
                }
                None => neighbors[vi] = Some((n1.clone(), n2.clone())),
            }
        }
    }
    let mut count = 0;
    for (vi, flag) in dissolve.iter_mut().enumerate() {
        if *flag {
            *flag = neighbors[vi]
                .as_ref()
                .is_some_and(|(a, b)| approx_in_line(&a.co, &imesh.vert(vi).co, &b.co));
            count += usize::from(*flag);
        }
    }
    (dissolve, count)
}

/// Drop the marked vertices from every face of `imesh`
fn dissolve_verts(imesh: &mut IMesh, dissolve: &[bool], arena: &IMeshArena) {
    let mut any_faces_erased = false;
    for f in 0..imesh.face_size() {
        let face = imesh.face(f).clone();
        let erase: Vec<bool> = face
            .vert
            .iter()
            .map(|v| imesh.lookup_vert(v).is_some_and(|vi| dissolve[vi]))
            .collect();
        if erase.contains(&true) {
            any_faces_erased |= imesh.erase_face_positions(f, &erase, arena);
        }
    }
    imesh.set_dirty_verts();
    if any_faces_erased {
        imesh.remove_null_faces();
    }
}

/// Rebuild polygons from the triangle output `tm_out` of a Boolean on
/// `imesh_in`. Output face `orig`s must index faces of `imesh_in`. Edges
/// carrying an original edge or lying on an intersection stay.
pub fn polymesh_from_trimesh_with_dissolve(tm_out: &IMesh, imesh_in: &IMesh, arena: &IMeshArena) -> IMesh {
    let mut tm = tm_out.clone();
    tm.populate_vert();
    (0..tm.face_size())
        .into_par_iter()
        .for_each(|t| tm.face(t).populate_plane(false));

    let mut face_output_tris = vec![Vec::new(); imesh_in.face_size()];
    let mut unmatched = Vec::new();
    for (t, tri) in tm.faces().enumerate() {
        match usize::try_from(tri.orig).ok().and_then(|o| face_output_tris.get_mut(o)) {
            Some(tris) => tris.push(t),
            None => unmatched.push(tri.clone()),
        }
    }

    let merged: Vec<Vec<FaceRef>> = face_output_tris
        .par_iter()
        .enumerate()
        .map(|(in_f, tris)| merge_tris_for_face(tris, &tm, Some(imesh_in.face(in_f)), arena))
        .collect();
    let mut faces: Vec<FaceRef> = merged.into_iter().flatten().collect();
    faces.extend(unmatched);

    let mut imesh_out = IMesh::from_faces(faces);
    let (dissolve, count) = find_dissolve_verts(&mut imesh_out);
    debug!(
        "dissolve: {} tris -> {} faces, {count} verts dissolved",
        tm_out.face_size(),
        imesh_out.face_size()
    );
    if count > 0 {
        dissolve_verts(&mut imesh_out, &dissolve, arena);
    }
    imesh_out
}
