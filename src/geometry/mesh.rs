// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Polyframe Inc.

//! Mesh representation for the intersection engine
//!
//! `Vert` and `Face` are created by an [`IMeshArena`](super::IMeshArena) and
//! shared through `Arc` handles. `IMesh` is an ordered list of face handles
//! with a lazily built, deterministic vertex index.

use super::arena::IMeshArena;
use super::exact::{cross_poly, rational_to_f64, Mpq3};
use ahash::{AHashMap, AHashSet};
use nalgebra::Vector3;
use num_rational::BigRational;
use num_traits::{One, Zero};
use rayon::prelude::*;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::ops::Index;
use std::sync::{Arc, OnceLock};

/// Sentinel for "no original element"
pub const NO_INDEX: i32 = -1;

/// Shared handle to an arena-owned vertex
pub type VertRef = Arc<Vert>;

/// Shared handle to an arena-owned face
pub type FaceRef = Arc<Face>;

/// A vertex with exact and rounded coordinates.
///
/// Equality and hashing use `co_exact` only.
#[derive(Debug)]
pub struct Vert {
    pub co_exact: Mpq3,
    pub co: Vector3<f64>,
    pub id: usize,
    pub orig: i32,
}

impl Vert {
    pub(crate) fn new(co_exact: Mpq3, co: Vector3<f64>, id: usize, orig: i32) -> Self {
        Self {
            co_exact,
            co,
            id,
            orig,
        }
    }
}

impl PartialEq for Vert {
    fn eq(&self, other: &Self) -> bool {
        self.co_exact == other.co_exact
    }
}

impl Eq for Vert {}

impl Hash for Vert {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.co_exact.hash(state);
    }
}

impl fmt::Display for Vert {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}", self.id)?;
        if self.orig != NO_INDEX {
            write!(f, "o{}", self.orig)?;
        }
        write!(f, "({},{},{})", self.co.x, self.co.y, self.co.z)
    }
}

/// Plane `dot(norm, p) + d = 0` in exact and f64 form.
///
/// A plane built by the f64 pass has a zero exact normal, which is how
/// [`Plane::exact_populated`] tells the two apart.
#[derive(Debug, Clone)]
pub struct Plane {
    pub norm: Vector3<f64>,
    pub d: f64,
    pub norm_exact: Mpq3,
    pub d_exact: BigRational,
}

impl Plane {
    pub fn from_exact(norm_exact: Mpq3, d_exact: BigRational) -> Self {
        Self {
            norm: norm_exact.to_f64(),
            d: rational_to_f64(&d_exact),
            norm_exact,
            d_exact,
        }
    }

    pub fn from_f64(norm: Vector3<f64>, d: f64) -> Self {
        Self {
            norm,
            d,
            norm_exact: Mpq3::zero(),
            d_exact: BigRational::zero(),
        }
    }

    pub fn exact_populated(&self) -> bool {
        !self.norm_exact.is_zero()
    }

    /// Scale so the first nonzero exact normal component is 1.
    /// Orientation is lost; the result is only good as a lookup key.
    pub fn make_canonical(&mut self) {
        let lead = (0..3).find(|&axis| !self.norm_exact[axis].is_zero());
        match lead {
            Some(axis) => {
                let den = self.norm_exact[axis].clone();
                for i in 0..3 {
                    self.norm_exact[i] = if i == axis {
                        BigRational::one()
                    } else {
                        &self.norm_exact[i] / &den
                    };
                }
                self.d_exact = &self.d_exact / &den;
            }
            None => self.d_exact = BigRational::zero(),
        }
        self.norm = self.norm_exact.to_f64();
        self.d = rational_to_f64(&self.d_exact);
    }
}

impl PartialEq for Plane {
    fn eq(&self, other: &Self) -> bool {
        self.norm_exact == other.norm_exact && self.d_exact == other.d_exact
    }
}

impl Eq for Plane {}

impl Hash for Plane {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.norm_exact.hash(state);
        self.d_exact.hash(state);
    }
}

impl fmt::Display for Plane {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{},{},{};{}]",
            self.norm.x, self.norm.y, self.norm.z, self.d
        )
    }
}

/// A planar polygon with per-edge provenance.
///
/// Edge `i` runs from `vert[i]` to `vert[(i + 1) % len]`.
#[derive(Debug)]
pub struct Face {
    pub vert: Vec<VertRef>,
    pub edge_orig: Vec<i32>,
    pub is_intersect: Vec<bool>,
    pub id: usize,
    pub orig: i32,
    plane: OnceLock<Plane>,
    plane_exact: OnceLock<Plane>,
}

impl Face {
    pub(crate) fn new(
        vert: Vec<VertRef>,
        id: usize,
        orig: i32,
        edge_orig: Vec<i32>,
        is_intersect: Vec<bool>,
    ) -> Self {
        assert_eq!(vert.len(), edge_orig.len(), "edge_orig length mismatch");
        assert_eq!(vert.len(), is_intersect.len(), "is_intersect length mismatch");
        Self {
            vert,
            edge_orig,
            is_intersect,
            id,
            orig,
            plane: OnceLock::new(),
            plane_exact: OnceLock::new(),
        }
    }

    pub fn size(&self) -> usize {
        self.vert.len()
    }

    pub fn is_tri(&self) -> bool {
        self.vert.len() == 3
    }

    pub fn next_pos(&self, pos: usize) -> usize {
        (pos + 1) % self.vert.len()
    }

    pub fn prev_pos(&self, pos: usize) -> usize {
        (pos + self.vert.len() - 1) % self.vert.len()
    }

    /// The best plane computed so far, exact if available
    pub fn plane(&self) -> Option<&Plane> {
        self.plane_exact.get().or_else(|| self.plane.get())
    }

    pub fn plane_populated(&self) -> bool {
        self.plane().is_some()
    }

    /// Compute the supporting plane if not done yet. With `need_exact` the
    /// exact normal and offset are computed as well.
    pub fn populate_plane(&self, need_exact: bool) {
        if need_exact {
            self.plane_exact.get_or_init(|| self.compute_exact_plane());
        } else if self.plane_exact.get().is_none() {
            self.plane.get_or_init(|| self.compute_f64_plane());
        }
    }

    /// Plane accessor for code paths that have already populated it
    pub(crate) fn populated_plane(&self) -> &Plane {
        match self.plane() {
            Some(plane) => plane,
            None => panic!("plane of face f{} used before populate_plane", self.id),
        }
    }

    fn compute_exact_plane(&self) -> Plane {
        let normal = if self.vert.len() > 3 {
            let co: Vec<Mpq3> = self.vert.iter().map(|v| v.co_exact.clone()).collect();
            cross_poly(&co)
        } else {
            let tr02 = &self.vert[0].co_exact - &self.vert[2].co_exact;
            let tr12 = &self.vert[1].co_exact - &self.vert[2].co_exact;
            tr02.cross(&tr12)
        };
        let d = -normal.dot(&self.vert[0].co_exact);
        Plane::from_exact(normal, d)
    }

    fn compute_f64_plane(&self) -> Plane {
        let normal = if self.vert.len() > 3 {
            let mut n = Vector3::zeros();
            let mut prev = &self.vert[self.vert.len() - 1].co;
            for v in &self.vert {
                let cur = &v.co;
                n.x += (prev.y - cur.y) * (prev.z + cur.z);
                n.y += (prev.z - cur.z) * (prev.x + cur.x);
                n.z += (prev.x - cur.x) * (prev.y + cur.y);
                prev = cur;
            }
            n
        } else {
            let tr02 = self.vert[0].co - self.vert[2].co;
            let tr12 = self.vert[1].co - self.vert[2].co;
            tr02.cross(&tr12)
        };
        let d = -normal.dot(&self.vert[0].co);
        Plane::from_f64(normal, d)
    }

    /// Same vertex handles in the same cyclic order, any starting position
    pub fn cyclic_equal(&self, other: &Face) -> bool {
        verts_cyclic_equal(&self.vert, &other.vert)
    }
}

/// Same vertex handles in the same cyclic order, starting anywhere
pub fn verts_cyclic_equal(a: &[VertRef], b: &[VertRef]) -> bool {
    let n = a.len();
    if n != b.len() {
        return false;
    }
    if n == 0 {
        return true;
    }
    (0..n).any(|shift| (0..n).all(|i| Arc::ptr_eq(&a[i], &b[(shift + i) % n])))
}

impl Index<usize> for Face {
    type Output = VertRef;

    fn index(&self, pos: usize) -> &VertRef {
        &self.vert[pos]
    }
}

impl PartialEq for Face {
    fn eq(&self, other: &Self) -> bool {
        self.size() == other.size()
            && self
                .vert
                .iter()
                .zip(&other.vert)
                .all(|(a, b)| Arc::ptr_eq(a, b))
    }
}

impl fmt::Display for Face {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "f{}o{}[", self.id, self.orig)?;
        for (i, v) in self.vert.iter().enumerate() {
            if i > 0 {
                write!(f, " ")?;
            }
            write!(f, "{v}")?;
        }
        write!(f, "] e_orig[")?;
        for i in 0..self.size() {
            if i > 0 {
                write!(f, " ")?;
            }
            write!(f, "{}", self.edge_orig[i])?;
            if self.is_intersect[i] {
                write!(f, "#")?;
            }
        }
        write!(f, "]")
    }
}

/// Ordered collection of faces with a derived vertex index
#[derive(Debug, Clone, Default)]
pub struct IMesh {
    faces: Vec<Option<FaceRef>>,
    verts: Vec<VertRef>,
    vert_to_index: AHashMap<usize, usize>,
    vert_populated: bool,
}

impl IMesh {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_faces(faces: Vec<FaceRef>) -> Self {
        Self {
            faces: faces.into_iter().map(Some).collect(),
            ..Self::default()
        }
    }

    pub fn set_faces(&mut self, faces: Vec<FaceRef>) {
        self.faces = faces.into_iter().map(Some).collect();
        self.set_dirty_verts();
    }

    pub fn face_size(&self) -> usize {
        self.faces.len()
    }

    /// Face at `index`. Null placeholders are a caller error.
    pub fn face(&self, index: usize) -> &FaceRef {
        match &self.faces[index] {
            Some(face) => face,
            None => panic!("face slot {index} is null; call remove_null_faces first"),
        }
    }

    pub fn faces(&self) -> impl Iterator<Item = &FaceRef> + '_ {
        self.faces.iter().flatten()
    }

    pub fn into_faces(self) -> Vec<FaceRef> {
        self.faces.into_iter().flatten().collect()
    }

    pub fn has_verts(&self) -> bool {
        self.vert_populated
    }

    /// Build the vertex index. Verts with an original index come first in
    /// `orig` order, then synthetic verts by position.
    pub fn populate_vert(&mut self) {
        const ESTIMATE_VERTS_PER_FACE: usize = 4;
        self.populate_vert_with_capacity(ESTIMATE_VERTS_PER_FACE * self.faces.len());
    }

    pub fn populate_vert_with_capacity(&mut self, max_verts: usize) {
        if self.vert_populated {
            return;
        }
        let mut seen: AHashSet<usize> = AHashSet::with_capacity(max_verts);
        let mut verts = Vec::with_capacity(max_verts);
        for face in self.faces.iter().flatten() {
            for v in &face.vert {
                if seen.insert(v.id) {
                    verts.push(v.clone());
                }
            }
        }
        verts.par_sort_unstable_by(|a, b| {
            let a_synthetic = a.orig == NO_INDEX;
            let b_synthetic = b.orig == NO_INDEX;
            a_synthetic
                .cmp(&b_synthetic)
                .then_with(|| {
                    // New verts get ids in thread order; sort them by position.
                    if a_synthetic {
                        a.co_exact.cmp(&b.co_exact)
                    } else {
                        a.orig.cmp(&b.orig)
                    }
                })
                .then_with(|| a.id.cmp(&b.id))
        });
        self.vert_to_index = verts
            .iter()
            .enumerate()
            .map(|(i, v)| (v.id, i))
            .collect();
        self.verts = verts;
        self.vert_populated = true;
    }

    pub fn set_dirty_verts(&mut self) {
        self.vert_populated = false;
        self.verts.clear();
        self.vert_to_index.clear();
    }

    pub fn vert_size(&self) -> usize {
        assert!(self.vert_populated, "populate_vert must be called first");
        self.verts.len()
    }

    pub fn vert(&self, index: usize) -> &VertRef {
        assert!(self.vert_populated, "populate_vert must be called first");
        &self.verts[index]
    }

    pub fn vertices(&self) -> &[VertRef] {
        assert!(self.vert_populated, "populate_vert must be called first");
        &self.verts
    }

    pub fn lookup_vert(&self, v: &Vert) -> Option<usize> {
        assert!(self.vert_populated, "populate_vert must be called first");
        self.vert_to_index.get(&v.id).copied()
    }

    /// Drop the marked positions of face `f_index`.
    ///
    /// Returns `true` when the face lost so many vertices that its slot was
    /// nulled; the caller must then run [`IMesh::remove_null_faces`].
    pub fn erase_face_positions(
        &mut self,
        f_index: usize,
        face_pos_erase: &[bool],
        arena: &IMeshArena,
    ) -> bool {
        let cur = self.face(f_index).clone();
        let to_erase = face_pos_erase.iter().filter(|&&erase| erase).count();
        if to_erase == 0 {
            return false;
        }
        if cur.size() - to_erase < 3 {
            self.faces[f_index] = None;
            return true;
        }
        let keep: Vec<usize> = (0..cur.size()).filter(|&i| !face_pos_erase[i]).collect();
        let new_face = arena.add_face(
            keep.iter().map(|&i| cur.vert[i].clone()).collect(),
            cur.orig,
            keep.iter().map(|&i| cur.edge_orig[i]).collect(),
            keep.iter().map(|&i| cur.is_intersect[i]).collect(),
        );
        self.faces[f_index] = Some(new_face);
        false
    }

    pub fn remove_null_faces(&mut self) {
        self.faces.retain(Option::is_some);
    }
}

impl fmt::Display for IMesh {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.vert_populated {
            writeln!(f, "Verts:")?;
            for (i, v) in self.verts.iter().enumerate() {
                writeln!(f, "{i}: {v}")?;
            }
        }
        writeln!(f, "\nFaces:")?;
        for (i, face) in self.faces.iter().enumerate() {
            match face {
                Some(face) => {
                    writeln!(f, "{i}: {face}")?;
                    if let Some(plane) = face.plane() {
                        writeln!(f, "    plane={plane}")?;
                    }
                }
                None => writeln!(f, "{i}: null")?,
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit_tri(arena: &IMeshArena, orig: i32) -> FaceRef {
        let v0 = arena.add_or_find_vert(&Vector3::new(0.0, 0.0, 0.0), 0);
        let v1 = arena.add_or_find_vert(&Vector3::new(1.0, 0.0, 0.0), 1);
        let v2 = arena.add_or_find_vert(&Vector3::new(0.0, 1.0, 0.0), 2);
        arena.add_face(vec![v0, v1, v2], orig, vec![10, 11, 12], vec![false; 3])
    }

    #[test]
    fn test_plane_population_is_lazy() {
        let arena = IMeshArena::new();
        let f = unit_tri(&arena, 0);
        assert!(!f.plane_populated());
        f.populate_plane(false);
        assert!(!f.populated_plane().exact_populated());
        f.populate_plane(true);
        let plane = f.populated_plane();
        assert!(plane.exact_populated());
        assert_eq!(plane.norm_exact, Mpq3::from_ints(0, 0, 1));
        assert_eq!(plane.norm, Vector3::new(0.0, 0.0, 1.0));
    }

    #[test]
    fn test_make_canonical_drops_orientation() {
        let mut up = Plane::from_exact(Mpq3::from_ints(0, 0, 4), BigRational::from_integer((-8).into()));
        let mut down = Plane::from_exact(Mpq3::from_ints(0, 0, -2), BigRational::from_integer(4.into()));
        up.make_canonical();
        down.make_canonical();
        assert_eq!(up, down);
        assert_eq!(up.norm_exact, Mpq3::from_ints(0, 0, 1));
    }

    #[test]
    fn test_cyclic_equal() {
        let arena = IMeshArena::new();
        let f = unit_tri(&arena, 0);
        let rotated = arena.add_face_simple(vec![f[1].clone(), f[2].clone(), f[0].clone()], 0);
        let flipped = arena.add_face_simple(vec![f[0].clone(), f[2].clone(), f[1].clone()], 0);
        assert!(f.cyclic_equal(&rotated));
        assert!(*f != *rotated);
        assert!(!f.cyclic_equal(&flipped));
    }

    #[test]
    fn test_populate_vert_order() {
        let arena = IMeshArena::new();
        let synthetic = arena.add_or_find_vert(&Vector3::new(5.0, 5.0, 5.0), NO_INDEX);
        let b = arena.add_or_find_vert(&Vector3::new(1.0, 0.0, 0.0), 7);
        let a = arena.add_or_find_vert(&Vector3::new(0.0, 1.0, 0.0), 3);
        let f = arena.add_face_simple(vec![synthetic.clone(), b.clone(), a.clone()], 0);
        let mut mesh = IMesh::from_faces(vec![f]);
        mesh.populate_vert();
        assert_eq!(mesh.vert_size(), 3);
        assert!(Arc::ptr_eq(mesh.vert(0), &a));
        assert!(Arc::ptr_eq(mesh.vert(1), &b));
        assert!(Arc::ptr_eq(mesh.vert(2), &synthetic));
        assert_eq!(mesh.lookup_vert(&synthetic), Some(2));
    }

    #[test]
    fn test_synthetic_verts_sort_by_position() {
        let arena = IMeshArena::new();
        // Created far point first, so id order and position order disagree.
        let far = arena.add_or_find_vert(&Vector3::new(2.0, 0.0, 0.0), NO_INDEX);
        let near = arena.add_or_find_vert(&Vector3::new(0.0, 0.0, 3.0), NO_INDEX);
        let mid = arena.add_or_find_vert(&Vector3::new(1.0, 0.0, 0.0), NO_INDEX);
        assert!(far.id < near.id);
        let f = arena.add_face_simple(vec![far.clone(), mid.clone(), near.clone()], 0);
        let mut mesh = IMesh::from_faces(vec![f]);
        mesh.populate_vert();
        assert!(Arc::ptr_eq(mesh.vert(0), &near));
        assert!(Arc::ptr_eq(mesh.vert(1), &mid));
        assert!(Arc::ptr_eq(mesh.vert(2), &far));
    }

    #[test]
    fn test_erase_face_positions() {
        let arena = IMeshArena::new();
        let v: Vec<VertRef> = [(0.0, 0.0), (1.0, 0.0), (1.0, 1.0), (0.0, 1.0)]
            .iter()
            .enumerate()
            .map(|(i, &(x, y))| arena.add_or_find_vert(&Vector3::new(x, y, 0.0), i as i32))
            .collect();
        let quad = arena.add_face(v.clone(), 4, vec![0, 1, 2, 3], vec![false, true, false, false]);
        let tri = arena.add_face_simple(v[..3].to_vec(), 5);
        let mut mesh = IMesh::from_faces(vec![quad, tri]);

        assert!(!mesh.erase_face_positions(0, &[false, false, true, false], &arena));
        let shrunk = mesh.face(0);
        assert_eq!(shrunk.size(), 3);
        assert_eq!(shrunk.orig, 4);
        assert_eq!(shrunk.edge_orig, vec![0, 1, 3]);
        assert_eq!(shrunk.is_intersect, vec![false, true, false]);

        assert!(mesh.erase_face_positions(1, &[true, false, false], &arena));
        mesh.remove_null_faces();
        assert_eq!(mesh.face_size(), 1);
    }
}
