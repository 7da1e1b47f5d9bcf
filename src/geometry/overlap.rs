// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Polyframe Inc.

//! Broad-phase detection of possibly intersecting triangle pairs

use super::bbox::BoundingBox;
use super::bvh::BVH;
use super::mesh::IMesh;
use log::debug;

/// Candidate pair of triangle indices, ordered `(a, b)`
pub type OverlapPair = (usize, usize);

/// Maps a face `orig` to its operand shape, or -1 for "in no shape"
pub type ShapeFn<'a> = &'a (dyn Fn(i32) -> i32 + Sync);

/// Sorted list of triangle pairs whose padded boxes overlap.
///
/// Every pair appears in both orders, so the overlaps of triangle `t` as
/// first element form one contiguous run starting at
/// [`TriOverlaps::first_overlap_index`].
#[derive(Debug, Clone)]
pub struct TriOverlaps {
    overlap: Vec<OverlapPair>,
    first_overlap: Vec<Option<usize>>,
}

impl TriOverlaps {
    pub fn new(
        tm: &IMesh,
        tri_bb: &[BoundingBox],
        nshapes: usize,
        shape_fn: ShapeFn<'_>,
        use_self: bool,
    ) -> Self {
        let shape_of = |t: usize| shape_fn(tm.face(t).orig);
        let two_trees_no_self = nshapes == 2 && !use_self;

        let mut overlap = if two_trees_no_self {
            let tree_for = |shape: i32| {
                BVH::build(
                    (0..tm.face_size())
                        .filter(|&t| shape_of(t) == shape)
                        .map(|t| (t, tri_bb[t]))
                        .collect(),
                )
            };
            let tree0 = tree_for(0);
            let tree1 = tree_for(1);
            let mut pairs = tree0.overlap(&tree1, |_, _| true);
            let mirrored: Vec<OverlapPair> = pairs.iter().map(|&(a, b)| (b, a)).collect();
            pairs.extend(mirrored);
            pairs
        } else {
            let tree = BVH::build(
                (0..tm.face_size())
                    .filter(|&t| shape_of(t) != -1)
                    .map(|t| (t, tri_bb[t]))
                    .collect(),
            );
            if nshapes == 1 || use_self {
                tree.overlap(&tree, |_, _| true)
            } else {
                tree.overlap(&tree, |a, b| shape_of(a) != shape_of(b))
            }
        };
        overlap.sort_unstable();
        overlap.dedup();

        let mut first_overlap = vec![None; tm.face_size()];
        for (i, &(a, _)) in overlap.iter().enumerate() {
            if first_overlap[a].is_none() {
                first_overlap[a] = Some(i);
            }
        }
        debug!(
            "tri overlaps: {} pairs over {} triangles ({})",
            overlap.len(),
            tm.face_size(),
            if two_trees_no_self { "two trees" } else { "one tree" }
        );
        Self {
            overlap,
            first_overlap,
        }
    }

    pub fn overlap(&self) -> &[OverlapPair] {
        &self.overlap
    }

    pub fn size(&self) -> usize {
        self.overlap.len()
    }

    /// Index of the first pair whose first element is `t`
    pub fn first_overlap_index(&self, t: usize) -> Option<usize> {
        self.first_overlap[t]
    }

    /// All pairs with `t` as first element
    pub fn overlaps_of(&self, t: usize) -> &[OverlapPair] {
        match self.first_overlap[t] {
            Some(start) => {
                let len = self.overlap[start..]
                    .iter()
                    .take_while(|(a, _)| *a == t)
                    .count();
                &self.overlap[start..start + len]
            }
            None => &[],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::bbox::calc_face_bounding_boxes;
    use crate::geometry::IMeshArena;
    use nalgebra::Vector3;

    fn tri(arena: &IMeshArena, pts: [(f64, f64, f64); 3], orig: i32) -> crate::geometry::FaceRef {
        let v = pts
            .iter()
            .map(|&(x, y, z)| arena.add_or_find_vert(&Vector3::new(x, y, z), crate::geometry::NO_INDEX))
            .collect();
        arena.add_face_simple(v, orig)
    }

    fn fixture(arena: &IMeshArena) -> IMesh {
        IMesh::from_faces(vec![
            tri(arena, [(0.0, 0.0, 0.0), (1.0, 0.0, 0.0), (0.0, 1.0, 0.0)], 0),
            tri(arena, [(0.2, 0.2, -1.0), (0.2, 0.2, 1.0), (0.8, 0.8, 0.0)], 1),
            tri(arena, [(5.0, 5.0, 5.0), (6.0, 5.0, 5.0), (5.0, 6.0, 5.0)], 2),
        ])
    }

    #[test]
    fn test_self_overlaps_are_symmetric_and_sorted() {
        let arena = IMeshArena::new();
        let tm = fixture(&arena);
        let bb = calc_face_bounding_boxes(&tm);
        let ov = TriOverlaps::new(&tm, &bb, 1, &|_| 0, true);
        assert_eq!(ov.overlap(), &[(0, 0), (0, 1), (1, 0), (1, 1), (2, 2)]);
        assert_eq!(ov.first_overlap_index(1), Some(2));
        assert_eq!(ov.overlaps_of(0), &[(0, 0), (0, 1)]);
    }

    #[test]
    fn test_two_tree_strategy_mirrors_pairs() {
        let arena = IMeshArena::new();
        let tm = fixture(&arena);
        let bb = calc_face_bounding_boxes(&tm);
        let shape = |orig: i32| if orig == 0 { 0 } else { 1 };
        let ov = TriOverlaps::new(&tm, &bb, 2, &shape, false);
        assert_eq!(ov.overlap(), &[(0, 1), (1, 0)]);
        assert_eq!(ov.first_overlap_index(2), None);
    }

    #[test]
    fn test_excluded_shape_is_skipped() {
        let arena = IMeshArena::new();
        let tm = fixture(&arena);
        let bb = calc_face_bounding_boxes(&tm);
        let shape = |orig: i32| if orig == 1 { -1 } else { 0 };
        let ov = TriOverlaps::new(&tm, &bb, 1, &shape, true);
        assert!(ov.overlap().iter().all(|&(a, b)| a != 1 && b != 1));
    }
}
