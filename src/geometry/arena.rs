// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Polyframe Inc.

//! Thread-safe allocator for vertices and faces
//!
//! Vertices are deduplicated by exact coordinate, so two requests for the
//! same point (from any thread) return the same handle. Faces are never
//! deduplicated.

use super::exact::Mpq3;
use super::mesh::{verts_cyclic_equal, Face, FaceRef, Vert, VertRef, NO_INDEX};
use ahash::AHashSet;
use nalgebra::Vector3;
use std::borrow::Borrow;
use std::hash::{Hash, Hasher};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Set entry keyed by the exact coordinate of its vertex
struct VertKey(VertRef);

impl Borrow<Mpq3> for VertKey {
    fn borrow(&self) -> &Mpq3 {
        &self.0.co_exact
    }
}

impl PartialEq for VertKey {
    fn eq(&self, other: &Self) -> bool {
        self.0.co_exact == other.0.co_exact
    }
}

impl Eq for VertKey {}

impl Hash for VertKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.co_exact.hash(state);
    }
}

#[derive(Default)]
struct ArenaInner {
    vset: AHashSet<VertKey>,
    allocated_verts: Vec<VertRef>,
    allocated_faces: Vec<FaceRef>,
    next_vert_id: usize,
    next_face_id: usize,
}

/// Owner of every vertex and face of one intersection run
#[derive(Default)]
pub struct IMeshArena {
    inner: Mutex<ArenaInner>,
}

impl IMeshArena {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, ArenaInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Pre-size internal storage
    pub fn reserve(&self, vert_num_hint: usize, face_num_hint: usize) {
        let mut inner = self.lock();
        inner.vset.reserve(vert_num_hint);
        inner.allocated_verts.reserve(vert_num_hint);
        inner.allocated_faces.reserve(face_num_hint);
    }

    pub fn tot_allocated_verts(&self) -> usize {
        self.lock().allocated_verts.len()
    }

    pub fn tot_allocated_faces(&self) -> usize {
        self.lock().allocated_faces.len()
    }

    /// Handle of the vertex at `co`, creating it with `orig` if absent.
    /// An existing vertex keeps its original `orig`.
    pub fn add_or_find_vert_exact(&self, co: Mpq3, orig: i32) -> VertRef {
        let co_f64 = co.to_f64();
        self.add_or_find(co, co_f64, orig)
    }

    pub fn add_or_find_vert(&self, co: &Vector3<f64>, orig: i32) -> VertRef {
        self.add_or_find(Mpq3::from_f64(co), *co, orig)
    }

    fn add_or_find(&self, co: Mpq3, co_f64: Vector3<f64>, orig: i32) -> VertRef {
        let mut inner = self.lock();
        if let Some(found) = inner.vset.get(&co) {
            return found.0.clone();
        }
        let id = inner.next_vert_id;
        inner.next_vert_id += 1;
        let v = Arc::new(Vert::new(co, co_f64, id, orig));
        inner.vset.insert(VertKey(v.clone()));
        inner.allocated_verts.push(v.clone());
        v
    }

    pub fn add_face(
        &self,
        verts: Vec<VertRef>,
        orig: i32,
        edge_origs: Vec<i32>,
        is_intersect: Vec<bool>,
    ) -> FaceRef {
        let mut inner = self.lock();
        let id = inner.next_face_id;
        inner.next_face_id += 1;
        let f = Arc::new(Face::new(verts, id, orig, edge_origs, is_intersect));
        inner.allocated_faces.push(f.clone());
        f
    }

    /// Face with no edge provenance
    pub fn add_face_simple(&self, verts: Vec<VertRef>, orig: i32) -> FaceRef {
        let n = verts.len();
        self.add_face(verts, orig, vec![NO_INDEX; n], vec![false; n])
    }

    pub fn add_face_with_edges(
        &self,
        verts: Vec<VertRef>,
        orig: i32,
        edge_origs: Vec<i32>,
    ) -> FaceRef {
        let n = verts.len();
        self.add_face(verts, orig, edge_origs, vec![false; n])
    }

    pub fn find_vert(&self, co: &Mpq3) -> Option<VertRef> {
        self.lock().vset.get(co).map(|key| key.0.clone())
    }

    /// Linear search for a face with the same vertex handles in the same
    /// cyclic order. The first face allocated wins.
    pub fn find_face(&self, verts: &[VertRef]) -> Option<FaceRef> {
        self.lock()
            .allocated_faces
            .iter()
            .find(|f| verts_cyclic_equal(&f.vert, verts))
            .cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rayon::prelude::*;

    #[test]
    fn test_vertices_dedup_by_exact_coordinate() {
        let arena = IMeshArena::new();
        let a = arena.add_or_find_vert(&Vector3::new(1.0, 2.0, 3.0), 0);
        let b = arena.add_or_find_vert_exact(Mpq3::from_ints(1, 2, 3), 9);
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(b.orig, 0);
        assert_eq!(arena.tot_allocated_verts(), 1);
    }

    #[test]
    fn test_faces_are_not_deduplicated() {
        let arena = IMeshArena::new();
        let v: Vec<VertRef> = (0..3)
            .map(|i| arena.add_or_find_vert(&Vector3::new(i as f64, (i * i) as f64, 0.0), i))
            .collect();
        let f1 = arena.add_face_simple(v.clone(), 0);
        let f2 = arena.add_face_simple(v.clone(), 0);
        assert_ne!(f1.id, f2.id);
        assert_eq!(arena.tot_allocated_faces(), 2);
        assert!(Arc::ptr_eq(&arena.find_face(&v).unwrap(), &f1));
    }

    #[test]
    fn test_find_face_matches_any_rotation() {
        let arena = IMeshArena::new();
        let v: Vec<VertRef> = (0..3)
            .map(|i| arena.add_or_find_vert(&Vector3::new(i as f64, (i * i) as f64, 1.0), i))
            .collect();
        let f = arena.add_face_simple(v.clone(), 0);
        let rotated = [v[1].clone(), v[2].clone(), v[0].clone()];
        assert!(Arc::ptr_eq(&arena.find_face(&rotated).unwrap(), &f));
        // Reversed winding is a different face.
        assert!(arena.find_face(&[v[1].clone(), v[0].clone(), v[2].clone()]).is_none());
        assert!(arena.find_face(&v[..2]).is_none());
    }

    #[test]
    fn test_concurrent_dedup() {
        let arena = IMeshArena::new();
        let handles: Vec<VertRef> = (0..256)
            .into_par_iter()
            .map(|i| arena.add_or_find_vert_exact(Mpq3::from_ints(i % 8, 0, 0), NO_INDEX))
            .collect();
        assert_eq!(arena.tot_allocated_verts(), 8);
        for (i, h) in handles.iter().enumerate() {
            assert!(Arc::ptr_eq(h, &handles[i % 8]));
        }
    }
}
