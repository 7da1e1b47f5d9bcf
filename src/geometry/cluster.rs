// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Polyframe Inc.

//! Coplanar triangle clusters
//!
//! Triangles that share a plane and overlap must be re-triangulated
//! together, so they are grouped before subdivision.

use super::bbox::{bbs_might_intersect, BoundingBox};
use super::mesh::{IMesh, Plane, NO_INDEX};
use super::tri_tri::IttMap;
use ahash::{AHashMap, AHashSet};
use log::debug;
use std::fmt;

/// Triangles of one plane whose boxes chain together
#[derive(Debug, Clone)]
pub struct CoplanarCluster {
    tris: Vec<usize>,
    bbox: BoundingBox,
}

impl CoplanarCluster {
    pub fn new(t: usize, bbox: BoundingBox) -> Self {
        Self {
            tris: vec![t],
            bbox,
        }
    }

    fn empty() -> Self {
        Self {
            tris: Vec::new(),
            bbox: BoundingBox::empty(),
        }
    }

    pub fn add_tri(&mut self, t: usize, bbox: &BoundingBox) {
        self.tris.push(t);
        self.bbox.combine(bbox);
    }

    pub fn tot_tri(&self) -> usize {
        self.tris.len()
    }

    pub fn tri(&self, index: usize) -> usize {
        self.tris[index]
    }

    pub fn tris(&self) -> &[usize] {
        &self.tris
    }

    pub fn bounding_box(&self) -> &BoundingBox {
        &self.bbox
    }
}

impl fmt::Display for CoplanarCluster {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{")?;
        for (i, t) in self.tris.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{t}")?;
        }
        write!(f, "}}")
    }
}

/// All clusters of a mesh plus the cluster of every triangle
#[derive(Debug, Clone)]
pub struct CoplanarClusterInfo {
    clusters: Vec<CoplanarCluster>,
    tri_cluster: Vec<i32>,
}

impl CoplanarClusterInfo {
    pub fn new(num_tris: usize) -> Self {
        Self {
            clusters: Vec::new(),
            tri_cluster: vec![NO_INDEX; num_tris],
        }
    }

    /// Cluster index of triangle `t`, or `NO_INDEX`
    pub fn tri_cluster(&self, t: usize) -> i32 {
        self.tri_cluster[t]
    }

    pub fn add_cluster(&mut self, cluster: CoplanarCluster) {
        let c_index = self.clusters.len() as i32;
        for &t in cluster.tris() {
            debug_assert_eq!(self.tri_cluster[t], NO_INDEX, "triangle {t} in two clusters");
            self.tri_cluster[t] = c_index;
        }
        self.clusters.push(cluster);
    }

    pub fn tot_cluster(&self) -> usize {
        self.clusters.len()
    }

    pub fn cluster(&self, c: usize) -> &CoplanarCluster {
        &self.clusters[c]
    }

    pub fn clusters(&self) -> &[CoplanarCluster] {
        &self.clusters
    }
}

impl fmt::Display for CoplanarClusterInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Coplanar Cluster Info:")?;
        for (c, cluster) in self.clusters.iter().enumerate() {
            writeln!(f, "  {c}: {cluster}")?;
        }
        Ok(())
    }
}

/// Group the triangles of coplanar outcomes by plane, then by chained
/// bounding-box overlap. Clusters of a single triangle are dropped.
pub fn find_clusters(tm: &IMesh, tri_bb: &[BoundingBox], itt_map: &IttMap) -> CoplanarClusterInfo {
    let mut ans = CoplanarClusterInfo::new(tm.face_size());

    // First-seen order over the sorted pair keys keeps runs reproducible.
    let mut seen = AHashSet::new();
    let mut maybe_coplanar_tris = Vec::new();
    for (&(t1, t2), itt) in itt_map.iter() {
        if itt.is_coplanar() {
            for t in [t1, t2] {
                if seen.insert(t) {
                    maybe_coplanar_tris.push(t);
                }
            }
        }
    }
    if maybe_coplanar_tris.is_empty() {
        return ans;
    }

    let mut plane_index: AHashMap<Plane, usize> = AHashMap::new();
    let mut plane_cls: Vec<Vec<CoplanarCluster>> = Vec::new();
    for &t in &maybe_coplanar_tris {
        // Canonical copy as key; the face keeps its oriented plane.
        let mut tplane = tm.face(t).populated_plane().clone();
        debug_assert!(tplane.exact_populated());
        tplane.make_canonical();

        let Some(&p) = plane_index.get(&tplane) else {
            plane_index.insert(tplane, plane_cls.len());
            plane_cls.push(vec![CoplanarCluster::new(t, tri_bb[t])]);
            continue;
        };
        let curcls = &mut plane_cls[p];
        let (int_cls, no_int_cls): (Vec<usize>, Vec<usize>) = (0..curcls.len())
            .partition(|&c| bbs_might_intersect(&tri_bb[t], curcls[c].bounding_box()));
        match int_cls.len() {
            0 => curcls.push(CoplanarCluster::new(t, tri_bb[t])),
            1 => curcls[int_cls[0]].add_tri(t, &tri_bb[t]),
            _ => {
                let mut mergecl = CoplanarCluster::empty();
                mergecl.add_tri(t, &tri_bb[t]);
                for &c in &int_cls {
                    for &ct in curcls[c].tris() {
                        mergecl.add_tri(ct, &tri_bb[ct]);
                    }
                }
                let mut newvec = Vec::with_capacity(no_int_cls.len() + 1);
                newvec.push(mergecl);
                newvec.extend(no_int_cls.iter().map(|&c| curcls[c].clone()));
                *curcls = newvec;
            }
        }
    }

    for cl in plane_cls.into_iter().flatten() {
        if cl.tot_tri() > 1 {
            ans.add_cluster(cl);
        }
    }
    debug!(
        "find_clusters: {} candidate tris, {} clusters",
        maybe_coplanar_tris.len(),
        ans.tot_cluster()
    );
    ans
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::bbox::calc_face_bounding_boxes;
    use crate::geometry::overlap::TriOverlaps;
    use crate::geometry::tri_tri::calc_overlap_itts;
    use crate::geometry::IMeshArena;
    use nalgebra::Vector3;

    fn clusters_of(tris: &[[[f64; 3]; 3]]) -> CoplanarClusterInfo {
        let arena = IMeshArena::new();
        let faces = tris
            .iter()
            .enumerate()
            .map(|(i, pts)| {
                let v = pts
                    .iter()
                    .map(|p| arena.add_or_find_vert(&Vector3::new(p[0], p[1], p[2]), NO_INDEX))
                    .collect();
                let f = arena.add_face_simple(v, i as i32);
                f.populate_plane(true);
                f
            })
            .collect();
        let tm = IMesh::from_faces(faces);
        let bb = calc_face_bounding_boxes(&tm);
        let ov = TriOverlaps::new(&tm, &bb, 1, &|_| 0, true);
        let itts = calc_overlap_itts(&tm, &ov);
        find_clusters(&tm, &bb, &itts)
    }

    #[test]
    fn test_identical_triangles_form_one_cluster() {
        let t = [[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]];
        let info = clusters_of(&[t, t]);
        assert_eq!(info.tot_cluster(), 1);
        assert_eq!(info.cluster(0).tris(), &[0, 1]);
        assert_eq!(info.tri_cluster(1), 0);
    }

    #[test]
    fn test_opposite_orientation_shares_plane() {
        let a = [[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]];
        let b = [[0.2, 0.2, 0.0], [0.2, 0.8, 0.0], [0.8, 0.2, 0.0]];
        let info = clusters_of(&[a, b]);
        assert_eq!(info.tot_cluster(), 1);
    }

    #[test]
    fn test_bridge_triangle_merges_clusters() {
        let left = [[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]];
        let left2 = [[0.1, 0.1, 0.0], [0.9, 0.0, 0.0], [0.0, 0.9, 0.0]];
        let right = [[5.0, 0.0, 0.0], [6.0, 0.0, 0.0], [5.0, 1.0, 0.0]];
        let right2 = [[5.1, 0.1, 0.0], [5.9, 0.0, 0.0], [5.0, 0.9, 0.0]];
        let bridge = [[0.5, 0.1, 0.0], [5.5, 0.1, 0.0], [3.0, 0.4, 0.0]];
        let info = clusters_of(&[left, left2, right, right2, bridge]);
        assert_eq!(info.tot_cluster(), 1);
        assert_eq!(info.cluster(0).tot_tri(), 5);
    }

    #[test]
    fn test_no_coplanar_pairs_no_clusters() {
        let a = [[0.0, 0.0, 0.0], [4.0, 0.0, 0.0], [0.0, 4.0, 0.0]];
        let b = [[1.0, 1.0, -1.0], [1.0, 1.0, 1.0], [2.0, -3.0, 0.0]];
        let info = clusters_of(&[a, b]);
        assert_eq!(info.tot_cluster(), 0);
        assert_eq!(info.tri_cluster(0), NO_INDEX);
    }
}
