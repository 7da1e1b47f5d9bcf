// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Polyframe Inc.

//! Geometry module - exact mesh representation, intersection and booleans

pub mod arena;
pub mod bbox;
pub mod boolean;
pub mod bvh;
pub mod cdt;
pub mod classification;
pub mod cluster;
pub mod dissolve;
pub mod exact;
pub mod intersect;
pub mod mesh;
pub mod overlap;
pub mod robust_predicates;
pub mod subdivide;
pub mod tri_tri;
pub mod triangulate;

#[cfg(test)]
pub(crate) mod test_util;

pub use arena::IMeshArena;
pub use bbox::BoundingBox;
pub use boolean::{boolean_mesh, boolean_trimesh, BoolOpType};
pub use cluster::{CoplanarCluster, CoplanarClusterInfo};
pub use dissolve::polymesh_from_trimesh_with_dissolve;
pub use exact::{Mpq2, Mpq3};
pub use intersect::{trimesh_nary_intersect, trimesh_self_intersect};
pub use mesh::{Face, FaceRef, IMesh, Plane, Vert, VertRef, NO_INDEX};
pub use overlap::{ShapeFn, TriOverlaps};
pub use tri_tri::{intersect_tri_tri, IttValue};
pub use triangulate::triangulate_polymesh;
