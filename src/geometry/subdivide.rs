// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Polyframe Inc.

//! Re-triangulation of intersected triangles
//!
//! Each intersected triangle (or coplanar cluster) is projected to 2D along
//! the dominant axis of its normal, triangulated together with the points
//! and segments where other triangles cut it, and lifted back to 3D through
//! its plane equation. Provenance of original edges survives the round trip.

use super::arena::IMeshArena;
use super::cdt::{delaunay_2d_calc, CdtInput, CdtOutputType, CdtResult};
use super::cluster::CoplanarClusterInfo;
use super::exact::{sgn, Mpq2, Mpq3};
use super::mesh::{FaceRef, IMesh, Plane, NO_INDEX};
use super::overlap::TriOverlaps;
use super::tri_tri::{IttMap, IttValue};
use ahash::AHashMap;
use log::{debug, warn};
use rayon::prelude::*;

/// Output edge count from which edge lookups go through a map
const MAKE_EDGE_MAP_THRESHOLD: usize = 15;

/// 2D problem and solution for one triangle or one cluster
#[derive(Debug, Clone)]
pub struct CdtData {
    pub t_plane: Plane,
    pub vert: Vec<Mpq2>,
    pub edge: Vec<(usize, usize)>,
    pub face: Vec<Vec<usize>>,
    /// Mesh triangle of each CDT input face
    pub input_face: Vec<usize>,
    /// Whether each input face was fed with reversed orientation
    pub is_reversed: Vec<bool>,
    pub cdt_out: CdtResult,
    /// Sorted output vertex pair to output edge; only for large outputs
    pub verts_to_edge: AHashMap<(usize, usize), usize>,
    pub proj_axis: usize,
}

impl CdtData {
    fn new(t_plane: Plane) -> Self {
        debug_assert!(t_plane.exact_populated());
        let proj_axis = t_plane.norm_exact.dominant_axis();
        Self {
            t_plane,
            vert: Vec::new(),
            edge: Vec::new(),
            face: Vec::new(),
            input_face: Vec::new(),
            is_reversed: Vec::new(),
            cdt_out: CdtResult::default(),
            verts_to_edge: AHashMap::new(),
            proj_axis,
        }
    }

    /// Points are not deduplicated here; the CDT merges them.
    fn prepare_need_vert(&mut self, p3d: &Mpq3) -> usize {
        self.vert.push(p3d.project(self.proj_axis));
        self.vert.len() - 1
    }

    fn prepare_need_edge(&mut self, p1: &Mpq3, p2: &Mpq3) {
        let v1 = self.prepare_need_vert(p1);
        let v2 = self.prepare_need_vert(p2);
        self.edge.push((v1, v2));
    }

    fn prepare_need_tri(&mut self, tm: &IMesh, t: usize) {
        let tri = tm.face(t);
        let v0 = self.prepare_need_vert(&tri[0].co_exact);
        let v1 = self.prepare_need_vert(&tri[1].co_exact);
        let v2 = self.prepare_need_vert(&tri[2].co_exact);
        // Looking down y flips the handedness of the remaining (x, z) axes.
        let n_sign = sgn(&tri.populated_plane().norm_exact[self.proj_axis]);
        let rev = if n_sign >= 0 {
            self.proj_axis == 1
        } else {
            self.proj_axis != 1
        };
        self.face.push(if rev { vec![v0, v2, v1] } else { vec![v0, v1, v2] });
        self.input_face.push(t);
        self.is_reversed.push(rev);
    }

    /// Lift a projected point back onto the supporting plane
    fn unproject_cdt_vert(&self, p2d: &Mpq2) -> Mpq3 {
        let n = &self.t_plane.norm_exact;
        let d = &self.t_plane.d_exact;
        let axis = self.proj_axis;
        debug_assert!(sgn(&n[axis]) != 0);
        let (i, j) = match axis {
            0 => (1, 2),
            1 => (0, 2),
            _ => (0, 1),
        };
        let num = -(&n[i] * &p2d.x + &n[j] * &p2d.y + d);
        let mut p3d = Mpq3::zero();
        p3d[axis] = num / &n[axis];
        p3d[i] = p2d.x.clone();
        p3d[j] = p2d.y.clone();
        p3d
    }
}

/// CDT problem for triangle `t` cut by the outcomes `itts`
pub fn prepare_cdt_input(tm: &IMesh, t: usize, itts: &[IttValue]) -> CdtData {
    let mut ans = CdtData::new(tm.face(t).populated_plane().clone());
    ans.prepare_need_tri(tm, t);
    for itt in itts {
        match itt {
            IttValue::None => {}
            IttValue::Point(p) => {
                ans.prepare_need_vert(p);
            }
            IttValue::Segment(p1, p2) => ans.prepare_need_edge(p1, p2),
            IttValue::Coplanar { source } => ans.prepare_need_tri(tm, *source),
        }
    }
    ans
}

/// CDT problem for cluster `c`: all its triangles plus the points and
/// segments of `itts`
pub fn prepare_cdt_input_for_cluster(
    tm: &IMesh,
    clinfo: &CoplanarClusterInfo,
    c: usize,
    itts: &[IttValue],
) -> CdtData {
    let cl = clinfo.cluster(c);
    debug_assert!(cl.tot_tri() > 0);
    let mut ans = CdtData::new(tm.face(cl.tri(0)).populated_plane().clone());
    for &t in cl.tris() {
        ans.prepare_need_tri(tm, t);
    }
    for itt in itts {
        match itt {
            IttValue::Point(p) => {
                ans.prepare_need_vert(p);
            }
            IttValue::Segment(p1, p2) => ans.prepare_need_edge(p1, p2),
            _ => {}
        }
    }
    ans
}

fn sorted_pair(a: usize, b: usize) -> (usize, usize) {
    if a <= b {
        (a, b)
    } else {
        (b, a)
    }
}

/// Run the CDT on the prepared input
pub fn do_cdt(cd: &mut CdtData) {
    let input = CdtInput {
        vert: std::mem::take(&mut cd.vert),
        edge: std::mem::take(&mut cd.edge),
        face: std::mem::take(&mut cd.face),
    };
    cd.cdt_out = delaunay_2d_calc(&input, CdtOutputType::Inside);
    cd.vert = input.vert;
    cd.edge = input.edge;
    cd.face = input.face;
    if cd.cdt_out.edge.len() >= MAKE_EDGE_MAP_THRESHOLD {
        cd.verts_to_edge = cd
            .cdt_out
            .edge
            .iter()
            .enumerate()
            .map(|(e, &(a, b))| (sorted_pair(a, b), e))
            .collect();
    }
}

/// Original edge of the output edge `i0-i1`, and whether it came from an
/// intersection segment rather than a face boundary. Face provenance wins.
pub fn get_cdt_edge_orig(i0: usize, i1: usize, cd: &CdtData, in_tm: &IMesh) -> (i32, bool) {
    let foff = cd.cdt_out.face_edge_offset;
    let e = if cd.verts_to_edge.is_empty() {
        cd.cdt_out
            .edge
            .iter()
            .position(|&(a, b)| (a == i0 && b == i1) || (a == i1 && b == i0))
    } else {
        cd.verts_to_edge.get(&sorted_pair(i0, i1)).copied()
    };
    let Some(e) = e else {
        return (NO_INDEX, false);
    };

    let mut face_eorig = NO_INDEX;
    let mut have_non_face_eorig = false;
    for &orig_index in &cd.cdt_out.edge_orig[e] {
        if orig_index >= foff {
            if face_eorig == NO_INDEX {
                let in_face_index = orig_index / foff - 1;
                let pos = orig_index % foff;
                let facep = in_tm.face(cd.input_face[in_face_index]);
                debug_assert!(pos < facep.size());
                let eorig = if cd.is_reversed[in_face_index] {
                    facep.edge_orig[2 - pos]
                } else {
                    facep.edge_orig[pos]
                };
                if eorig != NO_INDEX {
                    face_eorig = eorig;
                }
            }
        } else {
            have_non_face_eorig = true;
        }
        if face_eorig != NO_INDEX && have_non_face_eorig {
            break;
        }
    }
    if face_eorig != NO_INDEX {
        (face_eorig, false)
    } else {
        (NO_INDEX, have_non_face_eorig)
    }
}

/// 3D face for CDT output triangle `cdt_out_t`, attributed to CDT input
/// face `cdt_in_t`
pub fn cdt_tri_as_imesh_face(
    cdt_out_t: usize,
    cdt_in_t: usize,
    cd: &CdtData,
    tm: &IMesh,
    arena: &IMeshArena,
) -> FaceRef {
    let cdt_out = &cd.cdt_out;
    let t_orig = tm.face(cd.input_face[cdt_in_t]).orig;
    let [i0, i1, i2] = cdt_out.face[cdt_out_t];
    // Coordinates already in the arena keep their original orig.
    let v0 = arena.add_or_find_vert_exact(cd.unproject_cdt_vert(&cdt_out.vert[i0]), NO_INDEX);
    let v1 = arena.add_or_find_vert_exact(cd.unproject_cdt_vert(&cdt_out.vert[i1]), NO_INDEX);
    let v2 = arena.add_or_find_vert_exact(cd.unproject_cdt_vert(&cdt_out.vert[i2]), NO_INDEX);
    let (verts, pairs) = if cd.is_reversed[cdt_in_t] {
        (vec![v0, v2, v1], [(i0, i2), (i2, i1), (i1, i0)])
    } else {
        (vec![v0, v1, v2], [(i0, i1), (i1, i2), (i2, i0)])
    };
    let mut edge_origs = Vec::with_capacity(3);
    let mut is_intersect = Vec::with_capacity(3);
    for (a, b) in pairs {
        let (eo, isect) = get_cdt_edge_orig(a, b, cd, tm);
        edge_origs.push(eo);
        is_intersect.push(isect);
    }
    let facep = arena.add_face(verts, t_orig, edge_origs, is_intersect);
    facep.populate_plane(false);
    facep
}

/// Pieces of triangle `t` in a solved CDT
pub fn extract_subdivided_tri(cd: &CdtData, in_tm: &IMesh, t: usize, arena: &IMeshArena) -> IMesh {
    let Some(t_in_cdt) = cd.input_face.iter().rposition(|&f| f == t) else {
        debug_assert!(false, "triangle {t} not in its CDT input");
        return IMesh::new();
    };
    let faces = (0..cd.cdt_out.face.len())
        .filter(|&f| cd.cdt_out.face_orig[f].contains(&t_in_cdt))
        .map(|f| cdt_tri_as_imesh_face(f, t_in_cdt, cd, in_tm, arena))
        .collect();
    IMesh::from_faces(faces)
}

struct OverlapTriRange {
    tri_index: usize,
    overlap_start: usize,
    len: usize,
}

/// Subdivide every intersected triangle outside clusters. Unaffected
/// triangles outside clusters are copied as one-face meshes.
pub fn calc_subdivided_non_cluster_tris(
    r_tri_subdivided: &mut [IMesh],
    tm: &IMesh,
    itt_map: &IttMap,
    clinfo: &CoplanarClusterInfo,
    ov: &TriOverlaps,
    arena: &IMeshArena,
) {
    let overlap = ov.overlap();
    let mut overlap_tri_range = Vec::new();
    let mut overlap_index = 0;
    while overlap_index < overlap.len() {
        let t = overlap[overlap_index].0;
        let mut i = overlap_index;
        while i + 1 < overlap.len() && overlap[i + 1].0 == t {
            i += 1;
        }
        if clinfo.tri_cluster(t) == NO_INDEX {
            let len = i - overlap_index + 1;
            if !(len == 1 && overlap[overlap_index].1 == t) {
                overlap_tri_range.push(OverlapTriRange {
                    tri_index: t,
                    overlap_start: overlap_index,
                    len,
                });
            }
        }
        overlap_index = i + 1;
    }

    let mut cd_data: Vec<Option<CdtData>> = vec![None; overlap_tri_range.len()];
    cd_data
        .par_iter_mut()
        .zip(overlap_tri_range.par_iter())
        .with_min_len(64)
        .for_each(|(slot, otr)| {
            let t = otr.tri_index;
            let itts: Vec<IttValue> = overlap[otr.overlap_start..otr.overlap_start + otr.len]
                .iter()
                .filter(|&&(_, t_other)| t_other != t)
                .filter_map(|&(_, t_other)| itt_map.get(t, t_other))
                .filter(|itt| !itt.is_none())
                .cloned()
                .collect();
            if !itts.is_empty() {
                let mut cd = prepare_cdt_input(tm, t, &itts);
                do_cdt(&mut cd);
                *slot = Some(cd);
            }
        });

    // Serial extraction keeps arena ids independent of scheduling.
    for (otr, cd) in overlap_tri_range.iter().zip(&cd_data) {
        if let Some(cd) = cd {
            let t = otr.tri_index;
            r_tri_subdivided[t] = extract_subdivided_tri(cd, tm, t, arena);
        }
    }

    r_tri_subdivided
        .par_iter_mut()
        .enumerate()
        .with_min_len(2048)
        .for_each(|(t, slot)| {
            if slot.face_size() == 0 && clinfo.tri_cluster(t) == NO_INDEX {
                *slot = IMesh::from_faces(vec![tm.face(t).clone()]);
            }
        });
    debug!(
        "subdivided {} intersected triangles",
        cd_data.iter().filter(|cd| cd.is_some()).count()
    );
}

/// Solve the CDT of cluster `c` with the cuts from triangles outside it
pub fn calc_cluster_subdivided(
    clinfo: &CoplanarClusterInfo,
    c: usize,
    tm: &IMesh,
    ov: &TriOverlaps,
    itt_map: &IttMap,
) -> CdtData {
    let cl = clinfo.cluster(c);
    let c_index = c as i32;
    let mut itts = Vec::new();
    for &t in cl.tris() {
        for &(_, t_other) in ov.overlaps_of(t) {
            if clinfo.tri_cluster(t_other) == c_index {
                continue;
            }
            if let Some(itt) = itt_map.get(t, t_other) {
                if !itt.is_none() && !itt.is_coplanar() {
                    itts.push(itt.clone());
                }
            }
        }
    }
    let mut cd = prepare_cdt_input_for_cluster(tm, clinfo, c, &itts);
    do_cdt(&mut cd);
    cd
}

/// Distribute the cluster solutions to the member triangles. An output
/// triangle inside several members is emitted once per member.
pub fn calc_cluster_tris(
    tri_subdivided: &mut [IMesh],
    tm: &IMesh,
    clinfo: &CoplanarClusterInfo,
    cluster_subdivided: &[CdtData],
    arena: &IMeshArena,
) {
    for (c, cd) in cluster_subdivided.iter().enumerate() {
        let n_cluster_tris = clinfo.cluster(c).tot_tri();
        if cd.input_face.len() != n_cluster_tris {
            warn!(
                "cluster {c}: {} CDT input faces for {n_cluster_tris} triangles",
                cd.input_face.len()
            );
        }
        let mut face_vec: Vec<Vec<FaceRef>> = vec![Vec::new(); cd.input_face.len()];
        for cdt_out_t in 0..cd.cdt_out.face.len() {
            for &cdt_in_t in &cd.cdt_out.face_orig[cdt_out_t] {
                face_vec[cdt_in_t].push(cdt_tri_as_imesh_face(cdt_out_t, cdt_in_t, cd, tm, arena));
            }
        }
        for (cdt_in_t, faces) in face_vec.into_iter().enumerate() {
            let tm_t = cd.input_face[cdt_in_t];
            debug_assert_eq!(tri_subdivided[tm_t].face_size(), 0);
            tri_subdivided[tm_t] = IMesh::from_faces(faces);
        }
    }
}
