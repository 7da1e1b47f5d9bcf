// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Polyframe Inc.

//! Bounding box utilities
//!
//! Boxes are stored in f32 to keep the BVH small. Face boxes are padded so
//! that rounding from the f64 coordinates can never make them too tight.

use super::mesh::{Face, IMesh};
use nalgebra::{Point3, Vector3};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

/// Axis-aligned bounding box
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub min: Point3<f32>,
    pub max: Point3<f32>,
}

impl BoundingBox {
    pub fn new(min: Point3<f32>, max: Point3<f32>) -> Self {
        Self { min, max }
    }

    pub fn empty() -> Self {
        Self {
            min: Point3::new(f32::INFINITY, f32::INFINITY, f32::INFINITY),
            max: Point3::new(f32::NEG_INFINITY, f32::NEG_INFINITY, f32::NEG_INFINITY),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.min.x > self.max.x || self.min.y > self.max.y || self.min.z > self.max.z
    }

    pub fn expand_to_include(&mut self, point: &Point3<f32>) {
        self.min.x = self.min.x.min(point.x);
        self.min.y = self.min.y.min(point.y);
        self.min.z = self.min.z.min(point.z);

        self.max.x = self.max.x.max(point.x);
        self.max.y = self.max.y.max(point.y);
        self.max.z = self.max.z.max(point.z);
    }

    /// Include an f64 point. The rounding error is covered by [`BoundingBox::expand`].
    pub fn expand_to_include_f64(&mut self, co: &Vector3<f64>) {
        self.expand_to_include(&Point3::new(co.x as f32, co.y as f32, co.z as f32));
    }

    pub fn combine(&mut self, other: &BoundingBox) {
        self.expand_to_include(&other.min);
        self.expand_to_include(&other.max);
    }

    /// Grow by `pad` on every side
    pub fn expand(&mut self, pad: f32) {
        self.min.x -= pad;
        self.min.y -= pad;
        self.min.z -= pad;
        self.max.x += pad;
        self.max.y += pad;
        self.max.z += pad;
    }

    /// Closed-interval overlap test on all three axes
    pub fn intersects(&self, other: &BoundingBox) -> bool {
        self.min.x <= other.max.x
            && self.max.x >= other.min.x
            && self.min.y <= other.max.y
            && self.max.y >= other.min.y
            && self.min.z <= other.max.z
            && self.max.z >= other.min.z
    }

    pub fn center(&self) -> Point3<f32> {
        Point3::new(
            (self.min.x + self.max.x) / 2.0,
            (self.min.y + self.max.y) / 2.0,
            (self.min.z + self.max.z) / 2.0,
        )
    }

    pub fn size(&self) -> Vector3<f32> {
        Vector3::new(
            self.max.x - self.min.x,
            self.max.y - self.min.y,
            self.max.z - self.min.z,
        )
    }
}

/// Padding that absorbs f64 to f32 rounding of coordinates up to `max_abs`
pub fn rounding_pad(max_abs: f64) -> f32 {
    let pad = if max_abs == 0.0 {
        f32::EPSILON
    } else {
        2.0 * f32::EPSILON * max_abs as f32
    };
    10.0 * pad
}

/// Largest absolute coordinate over every vertex of `mesh`
pub fn mesh_max_abs(mesh: &IMesh) -> f64 {
    (0..mesh.face_size())
        .into_par_iter()
        .map(|i| {
            mesh.face(i)
                .vert
                .iter()
                .flat_map(|v| v.co.iter())
                .fold(0.0f64, |acc, c| acc.max(c.abs()))
        })
        .reduce(|| 0.0, f64::max)
}

/// Box of a single face grown by `pad` on every side
pub fn face_bounding_box(face: &Face, pad: f32) -> BoundingBox {
    let mut bbox = BoundingBox::empty();
    for v in &face.vert {
        bbox.expand_to_include_f64(&v.co);
    }
    bbox.expand(pad);
    bbox
}

/// Boxes of every face in `mesh`, in face order, all grown by the same pad
/// derived from the largest coordinate in the mesh
pub fn calc_face_bounding_boxes(mesh: &IMesh) -> Vec<BoundingBox> {
    let pad = rounding_pad(mesh_max_abs(mesh));
    (0..mesh.face_size())
        .into_par_iter()
        .map(|i| face_bounding_box(mesh.face(i), pad))
        .collect()
}

/// Whether two boxes may overlap
pub fn bbs_might_intersect(a: &BoundingBox, b: &BoundingBox) -> bool {
    a.intersects(b)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::IMeshArena;

    #[test]
    fn test_bounding_box() {
        let mut bbox = BoundingBox::empty();
        assert!(bbox.is_empty());
        bbox.expand_to_include(&Point3::new(1.0, 2.0, 3.0));
        bbox.expand_to_include(&Point3::new(-1.0, -2.0, -3.0));

        assert_eq!(bbox.min, Point3::new(-1.0, -2.0, -3.0));
        assert_eq!(bbox.max, Point3::new(1.0, 2.0, 3.0));
        assert_eq!(bbox.center(), Point3::new(0.0, 0.0, 0.0));
    }

    #[test]
    fn test_face_box_contains_exact_coordinates() {
        let arena = IMeshArena::new();
        // 0.1 rounds up in f32; the padded box must still contain it.
        let v0 = arena.add_or_find_vert(&Vector3::new(0.1, 0.1, 0.1), 0);
        let v1 = arena.add_or_find_vert(&Vector3::new(1e6 + 0.3, 0.2, 0.1), 1);
        let v2 = arena.add_or_find_vert(&Vector3::new(0.3, 1e-7, 0.7), 2);
        let face = arena.add_face_simple(vec![v0.clone(), v1.clone(), v2.clone()], 0);
        let bbox = face_bounding_box(&face, rounding_pad(1e6 + 0.3));
        for v in [&v0, &v1, &v2] {
            for axis in 0..3 {
                assert!(f64::from(bbox.min[axis]) <= v.co[axis]);
                assert!(f64::from(bbox.max[axis]) >= v.co[axis]);
            }
        }
    }

    #[test]
    fn test_every_box_gets_the_mesh_pad() {
        let arena = IMeshArena::new();
        let v = |x: f64, y: f64, z: f64| arena.add_or_find_vert(&Vector3::new(x, y, z), -1);
        let small = arena.add_face_simple(vec![v(0.0, 0.0, 0.0), v(1.0, 0.0, 0.0), v(0.0, 1.0, 0.0)], 0);
        let large = arena.add_face_simple(vec![v(-1e4, 0.0, 0.0), v(-1e4, 1.0, 0.0), v(-1e4, 0.0, 1.0)], 1);
        let mesh = IMesh::from_faces(vec![small, large]);
        assert_eq!(mesh_max_abs(&mesh), 1e4);
        let pad = rounding_pad(1e4);
        let boxes = calc_face_bounding_boxes(&mesh);
        // The small face is padded for the large coordinate, not its own.
        assert_eq!(boxes[0].min.x, -pad);
        assert_eq!(boxes[0].max.y, 1.0 + pad);
        assert!(pad > rounding_pad(1.0));
    }

    #[test]
    fn test_touching_boxes_intersect() {
        let a = BoundingBox::new(Point3::new(0.0, 0.0, 0.0), Point3::new(1.0, 1.0, 1.0));
        let b = BoundingBox::new(Point3::new(1.0, 0.0, 0.0), Point3::new(2.0, 1.0, 1.0));
        let c = BoundingBox::new(Point3::new(1.5, 0.0, 0.0), Point3::new(2.0, 1.0, 1.0));
        assert!(bbs_might_intersect(&a, &b));
        assert!(!bbs_might_intersect(&a, &c));
    }
}
