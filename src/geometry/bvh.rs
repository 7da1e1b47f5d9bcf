// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Polyframe Inc.

//! Bounding Volume Hierarchy (BVH) for spatial acceleration
//! Used to find candidate triangle pairs and to cast classification rays

use super::BoundingBox;
use nalgebra::Vector3;
use rayon::prelude::*;

/// Maximum number of children per internal node
pub const BVH_BRANCHING: usize = 8;

const MAX_LEAF_ITEMS: usize = 8;
const MAX_DEPTH: usize = 24;

/// BVH node
#[derive(Debug, Clone)]
pub struct BVHNode {
    /// Bounding box of this node
    pub bbox: BoundingBox,
    /// Up to eight children; empty for a leaf
    pub children: Vec<BVHNode>,
    /// Items with their boxes (only for leaf nodes)
    pub items: Vec<(usize, BoundingBox)>,
}

impl BVHNode {
    fn leaf(bbox: BoundingBox, items: Vec<(usize, BoundingBox)>) -> Self {
        Self {
            bbox,
            children: Vec::new(),
            items,
        }
    }

    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }
}

/// Eight-way BVH over indexed bounding boxes
pub struct BVH {
    root: BVHNode,
    items: Vec<(usize, BoundingBox)>,
}

impl BVH {
    /// Build from `(item_index, bbox)` pairs
    pub fn build(items: Vec<(usize, BoundingBox)>) -> Self {
        if items.is_empty() {
            return Self {
                root: BVHNode::leaf(BoundingBox::empty(), Vec::new()),
                items,
            };
        }
        let root = Self::build_recursive(items.clone(), 0);
        Self { root, items }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    fn build_recursive(items: Vec<(usize, BoundingBox)>, depth: usize) -> BVHNode {
        let bbox = Self::compute_union_bbox(&items);
        if items.len() <= MAX_LEAF_ITEMS || depth >= MAX_DEPTH {
            return BVHNode::leaf(bbox, items);
        }

        // Three rounds of median splits give up to eight groups.
        let mut groups = vec![items];
        for _ in 0..3 {
            let mut next = Vec::with_capacity(groups.len() * 2);
            for mut group in groups {
                if group.len() <= MAX_LEAF_ITEMS {
                    next.push(group);
                    continue;
                }
                let axis = Self::find_best_split_axis(&group);
                group.sort_by(|(ia, a), (ib, b)| {
                    a.center()[axis]
                        .total_cmp(&b.center()[axis])
                        .then(ia.cmp(ib))
                });
                let right = group.split_off(group.len() / 2);
                next.push(group);
                next.push(right);
            }
            groups = next;
        }

        let children = groups
            .into_iter()
            .map(|group| Self::build_recursive(group, depth + 1))
            .collect();
        BVHNode {
            bbox,
            children,
            items: Vec::new(),
        }
    }

    /// Longest axis of the items' union box
    fn find_best_split_axis(items: &[(usize, BoundingBox)]) -> usize {
        let size = Self::compute_union_bbox(items).size();
        if size.x >= size.y && size.x >= size.z {
            0
        } else if size.y >= size.z {
            1
        } else {
            2
        }
    }

    fn compute_union_bbox(items: &[(usize, BoundingBox)]) -> BoundingBox {
        let mut bbox = BoundingBox::empty();
        for (_, item_bbox) in items {
            bbox.combine(item_bbox);
        }
        bbox
    }

    /// Items whose boxes intersect `bbox`
    pub fn query_triangles(&self, bbox: &BoundingBox) -> Vec<usize> {
        let mut result = Vec::new();
        Self::query_recursive(&self.root, bbox, &mut result);
        result
    }

    fn query_recursive(node: &BVHNode, bbox: &BoundingBox, result: &mut Vec<usize>) {
        if !node.bbox.intersects(bbox) {
            return;
        }
        if node.is_leaf() {
            result.extend(
                node.items
                    .iter()
                    .filter(|(_, item_bbox)| item_bbox.intersects(bbox))
                    .map(|(idx, _)| *idx),
            );
        } else {
            for child in &node.children {
                Self::query_recursive(child, bbox, result);
            }
        }
    }

    /// All ordered pairs `(a, b)` with `a` from `self` and `b` from `other`
    /// whose boxes intersect and which pass `filter`. Passing the same tree
    /// twice yields self overlaps, including `(a, a)`.
    pub fn overlap<F>(&self, other: &BVH, filter: F) -> Vec<(usize, usize)>
    where
        F: Fn(usize, usize) -> bool + Sync,
    {
        let mut pairs: Vec<(usize, usize)> = self
            .items
            .par_iter()
            .flat_map_iter(|(a, bbox)| {
                let a = *a;
                other
                    .query_triangles(bbox)
                    .into_iter()
                    .filter(|&b| filter(a, b))
                    .map(move |b| (a, b))
                    .collect::<Vec<_>>()
            })
            .collect();
        pairs.par_sort_unstable();
        pairs.dedup();
        pairs
    }

    /// Visit every item whose box is pierced by the ray `origin + t * dir`, `t >= 0`
    pub fn raycast_all<F>(&self, origin: &Vector3<f64>, dir: &Vector3<f64>, mut visit: F)
    where
        F: FnMut(usize),
    {
        let inv_dir = dir.map(|d| 1.0 / d);
        Self::raycast_recursive(&self.root, origin, &inv_dir, &mut visit);
    }

    fn raycast_recursive<F>(
        node: &BVHNode,
        origin: &Vector3<f64>,
        inv_dir: &Vector3<f64>,
        visit: &mut F,
    ) where
        F: FnMut(usize),
    {
        if !ray_hits_box(&node.bbox, origin, inv_dir) {
            return;
        }
        if node.is_leaf() {
            for (idx, item_bbox) in &node.items {
                if ray_hits_box(item_bbox, origin, inv_dir) {
                    visit(*idx);
                }
            }
        } else {
            for child in &node.children {
                Self::raycast_recursive(child, origin, inv_dir, visit);
            }
        }
    }

    /// Get root node (for testing)
    #[cfg(test)]
    pub fn root(&self) -> &BVHNode {
        &self.root
    }
}

/// Slab test of a ray against a closed box
fn ray_hits_box(bbox: &BoundingBox, origin: &Vector3<f64>, inv_dir: &Vector3<f64>) -> bool {
    if bbox.is_empty() {
        return false;
    }
    let mut t_min = 0.0f64;
    let mut t_max = f64::INFINITY;
    for axis in 0..3 {
        let lo = f64::from(bbox.min[axis]);
        let hi = f64::from(bbox.max[axis]);
        if inv_dir[axis].is_infinite() {
            if origin[axis] < lo || origin[axis] > hi {
                return false;
            }
            continue;
        }
        let t0 = (lo - origin[axis]) * inv_dir[axis];
        let t1 = (hi - origin[axis]) * inv_dir[axis];
        let (near, far) = if t0 <= t1 { (t0, t1) } else { (t1, t0) };
        t_min = t_min.max(near);
        t_max = t_max.min(far);
        if t_min > t_max {
            return false;
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::Point3;

    fn grid_boxes(n: usize) -> Vec<(usize, BoundingBox)> {
        (0..n)
            .map(|i| {
                let x = i as f32;
                (
                    i,
                    BoundingBox::new(Point3::new(x, 0.0, 0.0), Point3::new(x + 0.5, 1.0, 1.0)),
                )
            })
            .collect()
    }

    #[test]
    fn test_bvh_build() {
        let bvh = BVH::build(grid_boxes(100));
        let root = bvh.root();
        assert!(!root.is_leaf());
        assert!(root.children.len() <= BVH_BRANCHING);
        assert_eq!(bvh.len(), 100);
    }

    #[test]
    fn test_bvh_query() {
        let bvh = BVH::build(grid_boxes(100));
        let query = BoundingBox::new(Point3::new(10.2, 0.2, 0.2), Point3::new(10.3, 0.3, 0.3));
        assert_eq!(bvh.query_triangles(&query), vec![10]);
    }

    #[test]
    fn test_self_overlap_matches_brute_force() {
        let mut boxes = grid_boxes(40);
        // Make every fifth box span its neighbour.
        for (i, b) in boxes.iter_mut() {
            if *i % 5 == 0 {
                b.max.x += 1.0;
            }
        }
        let bvh = BVH::build(boxes.clone());
        let pairs = bvh.overlap(&bvh, |_, _| true);
        let mut expected = Vec::new();
        for (a, ba) in &boxes {
            for (b, bb) in &boxes {
                if ba.intersects(bb) {
                    expected.push((*a, *b));
                }
            }
        }
        expected.sort_unstable();
        assert_eq!(pairs, expected);
    }

    #[test]
    fn test_raycast_visits_pierced_boxes() {
        let bvh = BVH::build(grid_boxes(50));
        let mut seen = Vec::new();
        bvh.raycast_all(
            &Vector3::new(-1.0, 0.5, 0.5),
            &Vector3::new(1.0, 0.0, 0.0),
            |i| seen.push(i),
        );
        seen.sort_unstable();
        assert_eq!(seen, (0..50).collect::<Vec<_>>());

        let mut none = Vec::new();
        bvh.raycast_all(
            &Vector3::new(-1.0, 0.5, 0.5),
            &Vector3::new(-1.0, 0.0, 0.0),
            |i| none.push(i),
        );
        assert!(none.is_empty());
    }
}
