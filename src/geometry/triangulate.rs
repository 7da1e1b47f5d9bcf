// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Polyframe Inc.

//! Polygon mesh to triangle mesh
//!
//! A fast float ear-clipper is tried first. If it produces a sliver, the
//! face is re-triangulated with the exact CDT instead. Triangle edges that
//! lie on an edge of the source polygon inherit its `edge_orig`; added
//! diagonals get `NO_INDEX`.

use super::arena::IMeshArena;
use super::cdt::{delaunay_2d_calc, CdtInput, CdtOutputType};
use super::mesh::{Face, FaceRef, IMesh, NO_INDEX};
use super::robust_predicates::{dominant_axis, is_quad_flip_first_third};
use ahash::AHashMap;
use log::trace;
use nalgebra::{Vector2, Vector3};
use rayon::prelude::*;

/// Squared sine below which a triangle counts as a sliver
const SLIVER_SIN_SQUARED: f64 = 1e-8;

/// Orthonormal basis of the plane with normal `no`, oriented so that a
/// polygon wound counter-clockwise about `no` projects counter-clockwise.
fn plane_basis(no: &Vector3<f64>) -> (Vector3<f64>, Vector3<f64>) {
    let n = no.try_normalize(0.0).unwrap_or_else(Vector3::z);
    let helper = match dominant_axis(&n) {
        0 => Vector3::y(),
        _ => Vector3::x(),
    };
    let u = helper.cross(&n).normalize();
    let v = n.cross(&u);
    (u, v)
}

fn area2(a: &Vector2<f64>, b: &Vector2<f64>, c: &Vector2<f64>) -> f64 {
    (b.x - a.x) * (c.y - a.y) - (b.y - a.y) * (c.x - a.x)
}

fn point_in_tri(p: &Vector2<f64>, a: &Vector2<f64>, b: &Vector2<f64>, c: &Vector2<f64>) -> bool {
    area2(a, b, p) >= 0.0 && area2(b, c, p) >= 0.0 && area2(c, a, p) >= 0.0
}

/// Ear clipping over a counter-clockwise polygon. Always returns
/// `len - 2` triangles of polygon positions, even for degenerate input.
fn ear_clip(pts: &[Vector2<f64>]) -> Vec<[usize; 3]> {
    let mut remaining: Vec<usize> = (0..pts.len()).collect();
    let mut tris = Vec::with_capacity(pts.len().saturating_sub(2));
    while remaining.len() > 3 {
        let n = remaining.len();
        let is_ear = |i: usize| {
            let (a, b, c) = (remaining[(i + n - 1) % n], remaining[i], remaining[(i + 1) % n]);
            if area2(&pts[a], &pts[b], &pts[c]) <= 0.0 {
                return false;
            }
            !remaining
                .iter()
                .filter(|&&r| r != a && r != b && r != c)
                .any(|&r| point_in_tri(&pts[r], &pts[a], &pts[b], &pts[c]))
        };
        // With no true ear left the polygon is degenerate; clip the least
        // reflex corner so the output size stays fixed.
        let ear = (0..n).find(|&i| is_ear(i)).unwrap_or_else(|| {
            (0..n)
                .max_by(|&i, &j| {
                    let corner = |k: usize| {
                        area2(
                            &pts[remaining[(k + n - 1) % n]],
                            &pts[remaining[k]],
                            &pts[remaining[(k + 1) % n]],
                        )
                    };
                    corner(i).total_cmp(&corner(j))
                })
                .unwrap_or(0)
        });
        tris.push([remaining[(ear + n - 1) % n], remaining[ear], remaining[(ear + 1) % n]]);
        remaining.remove(ear);
    }
    if remaining.len() == 3 {
        tris.push([remaining[0], remaining[1], remaining[2]]);
    }
    tris
}

/// Float triangulation of a face with four or more vertices
pub fn polyfill_triangulate_poly(f: &Face, arena: &IMeshArena) -> Vec<FaceRef> {
    let flen = f.size();
    debug_assert!(flen >= 4);
    f.populate_plane(false);
    if flen == 4 {
        let (v0, v1, v2, v3) = (f[0].clone(), f[1].clone(), f[2].clone(), f[3].clone());
        let eo = &f.edge_orig;
        let no_isect = || vec![false; 3];
        return if is_quad_flip_first_third(&v0.co, &v1.co, &v2.co, &v3.co) {
            vec![
                arena.add_face(vec![v0, v1.clone(), v3.clone()], f.orig, vec![eo[0], NO_INDEX, eo[3]], no_isect()),
                arena.add_face(vec![v1, v2, v3], f.orig, vec![eo[1], eo[2], NO_INDEX], no_isect()),
            ]
        } else {
            vec![
                arena.add_face(vec![v0.clone(), v1, v2.clone()], f.orig, vec![eo[0], eo[1], NO_INDEX], no_isect()),
                arena.add_face(vec![v0, v2, v3], f.orig, vec![NO_INDEX, eo[2], eo[3]], no_isect()),
            ]
        };
    }

    let (u, v) = plane_basis(&f.populated_plane().norm);
    let projected: Vec<Vector2<f64>> = f.vert.iter().map(|vert| Vector2::new(vert.co.dot(&u), vert.co.dot(&v))).collect();
    ear_clip(&projected)
        .into_iter()
        .map(|tri| {
            let mut eo = [NO_INDEX; 3];
            for k in 0..3 {
                if (tri[k] + 1) % flen == tri[(k + 1) % 3] {
                    eo[k] = f.edge_orig[tri[k]];
                }
            }
            arena.add_face(
                tri.iter().map(|&i| f[i].clone()).collect(),
                f.orig,
                eo.to_vec(),
                vec![false; 3],
            )
        })
        .collect()
}

/// Exact triangulation through the CDT. Falls back to the float path when
/// the polygon self-intersects and the CDT would need extra vertices.
pub fn exact_triangulate_poly(f: &Face, arena: &IMeshArena) -> Vec<FaceRef> {
    let flen = f.size();
    f.populate_plane(false);
    let poly_normal = f.populated_plane().norm;
    let axis = dominant_axis(&poly_normal);
    // Looking down y flips handedness; so does a normal against the axis.
    let rev = (axis == 1) ^ (poly_normal[axis] < 0.0);
    let input = CdtInput {
        vert: f.vert.iter().map(|v| v.co_exact.project(axis)).collect(),
        edge: Vec::new(),
        face: vec![(0..flen).collect()],
    };
    let cdt_out = delaunay_2d_calc(&input, CdtOutputType::Inside);
    if cdt_out.face.iter().flatten().any(|&v| cdt_out.vert_orig[v].is_empty()) {
        trace!("exact triangulation of f{} needs Steiner points", f.id);
        return polyfill_triangulate_poly(f, arena);
    }

    let verts_to_edge: AHashMap<(usize, usize), usize> = cdt_out
        .edge
        .iter()
        .enumerate()
        .map(|(e, &(a, b))| ((a.min(b), a.max(b)), e))
        .collect();
    let foff = cdt_out.face_edge_offset;
    cdt_out
        .face
        .iter()
        .map(|tri| {
            let v: Vec<_> = tri.iter().map(|&i| f[cdt_out.vert_orig[i][0]].clone()).collect();
            let mut eo = [NO_INDEX; 3];
            for i in 0..3 {
                let (a, b) = (tri[i], tri[(i + 1) % 3]);
                if let Some(&e) = verts_to_edge.get(&(a.min(b), a.max(b))) {
                    if let Some(&orig) = cdt_out.edge_orig[e].iter().find(|&&o| o >= foff) {
                        eo[i] = f.edge_orig[orig % foff];
                    }
                }
            }
            if rev {
                arena.add_face(
                    vec![v[0].clone(), v[2].clone(), v[1].clone()],
                    f.orig,
                    vec![eo[2], eo[1], eo[0]],
                    vec![false; 3],
                )
            } else {
                arena.add_face(v, f.orig, eo.to_vec(), vec![false; 3])
            }
        })
        .collect()
}

/// Quick sliver check. False positives only cost an exact re-triangulation.
pub fn any_degenerate_tris_fast(triangulation: &[FaceRef]) -> bool {
    triangulation.iter().any(|f| {
        let (v0, v1, v2) = (&f[0], &f[1], &f[2]);
        if std::sync::Arc::ptr_eq(v0, v1) || std::sync::Arc::ptr_eq(v0, v2) || std::sync::Arc::ptr_eq(v1, v2) {
            return true;
        }
        let da = v2.co - v0.co;
        let db = v2.co - v1.co;
        let da_len2 = da.norm_squared();
        let db_len2 = db.norm_squared();
        if da_len2 == 0.0 || db_len2 == 0.0 {
            return true;
        }
        da.cross(&db).norm_squared() / (da_len2 * db_len2) < SLIVER_SIN_SQUARED
    })
}

fn triangulate_poly(f: &Face, arena: &IMeshArena) -> Vec<FaceRef> {
    let ans = polyfill_triangulate_poly(f, arena);
    if any_degenerate_tris_fast(&ans) {
        exact_triangulate_poly(f, arena)
    } else {
        ans
    }
}

/// Triangulate every face with more than three vertices. Triangles pass
/// through unchanged and output order follows input face order.
pub fn triangulate_polymesh(imesh: &IMesh, arena: &IMeshArena) -> IMesh {
    imesh
        .faces()
        .collect::<Vec<_>>()
        .par_iter()
        .with_min_len(2048)
        .filter(|f| f.size() >= 4)
        .for_each(|f| f.populate_plane(false));

    let mut face_tris = Vec::with_capacity(3 * imesh.face_size());
    for f in imesh.faces() {
        if f.size() == 3 {
            face_tris.push(f.clone());
        } else {
            face_tris.extend(triangulate_poly(f, arena));
        }
    }
    IMesh::from_faces(face_tris)
}
