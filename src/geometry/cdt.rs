// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Polyframe Inc.

//! Exact 2D constrained Delaunay triangulation
//!
//! Works on rational points so that crossings, splits and in-circle tests
//! are decided exactly. The pipeline is:
//!
//! 1. merge duplicate input points;
//! 2. add the crossing points of constraint segments and split every
//!    segment at the points lying on it;
//! 3. sweep-triangulate the points in lexicographic order;
//! 4. recover constraints by edge flips, then restore the Delaunay property
//!    on unconstrained edges by Lawson flips;
//! 5. tag each triangle with the input faces that contain it.
//!
//! Output edges and faces remember which inputs produced them, which is how
//! callers map a re-triangulation back to their own mesh.

use super::exact::Mpq2;
use super::robust_predicates::{incircle, orient2d, segment_crossing};
use ahash::{AHashMap, AHashSet};
use log::warn;
use nalgebra::Vector2;
use num_rational::BigRational;
use std::collections::{BTreeMap, VecDeque};

/// Which triangles to report
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CdtOutputType {
    /// Every triangle of the convex hull
    Full,
    /// Triangles inside at least one input face, unused points dropped
    Inside,
}

/// Points, constraint edges and constraint faces
#[derive(Debug, Clone, Default)]
pub struct CdtInput {
    pub vert: Vec<Mpq2>,
    pub edge: Vec<(usize, usize)>,
    pub face: Vec<Vec<usize>>,
}

/// Triangulation with provenance.
///
/// `edge_orig` holds input edge indices directly, and face edges encoded as
/// `(f + 1) * face_edge_offset + pos` for edge `pos` of input face `f`.
#[derive(Debug, Clone, Default)]
pub struct CdtResult {
    pub vert: Vec<Mpq2>,
    /// Input points merged into each output point; empty for added points
    pub vert_orig: Vec<Vec<usize>>,
    pub edge: Vec<(usize, usize)>,
    pub edge_orig: Vec<Vec<usize>>,
    /// Counter-clockwise triangles
    pub face: Vec<[usize; 3]>,
    /// Input faces containing each triangle
    pub face_orig: Vec<Vec<usize>>,
    pub face_edge_offset: usize,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
struct Edge(usize, usize);

impl Edge {
    #[inline]
    fn new(a: usize, b: usize) -> Self {
        if a < b {
            Edge(a, b)
        } else {
            Edge(b, a)
        }
    }
}

/// Smallest power of ten that is at least `n`
fn power_of_10_greater_equal_to(n: usize) -> usize {
    let mut ans = 1;
    while ans < n {
        ans *= 10;
    }
    ans
}

/// Exact points with f64 shadows for cheap box rejection
struct PointSet {
    pts: Vec<Mpq2>,
    approx: Vec<Vector2<f64>>,
    index: AHashMap<Mpq2, usize>,
    orig: Vec<Vec<usize>>,
}

impl PointSet {
    fn new() -> Self {
        Self {
            pts: Vec::new(),
            approx: Vec::new(),
            index: AHashMap::new(),
            orig: Vec::new(),
        }
    }

    fn add_or_find(&mut self, p: Mpq2) -> usize {
        if let Some(&i) = self.index.get(&p) {
            return i;
        }
        let i = self.pts.len();
        self.approx.push(p.to_f64());
        self.index.insert(p.clone(), i);
        self.pts.push(p);
        self.orig.push(Vec::new());
        i
    }

    fn len(&self) -> usize {
        self.pts.len()
    }

    fn orient(&self, a: usize, b: usize, c: usize) -> i32 {
        orient2d(&self.pts[a], &self.pts[b], &self.pts[c])
    }

    /// Conservative box test; `false` only when the boxes of segments
    /// `ab` and `cd` are certainly disjoint.
    fn boxes_may_touch(&self, a: usize, b: usize, c: usize, d: usize) -> bool {
        let (pa, pb, pc, pd) = (&self.approx[a], &self.approx[b], &self.approx[c], &self.approx[d]);
        (0..2).all(|axis| {
            let lo1 = pa[axis].min(pb[axis]);
            let hi1 = pa[axis].max(pb[axis]);
            let lo2 = pc[axis].min(pd[axis]);
            let hi2 = pc[axis].max(pd[axis]);
            let scale = lo1.abs().max(hi1.abs()).max(lo2.abs()).max(hi2.abs());
            let slack = 4.0 * f64::EPSILON * scale + f64::MIN_POSITIVE;
            lo1 <= hi2 + slack && lo2 <= hi1 + slack
        })
    }

    /// Whether `p` lies strictly inside segment `ab`
    fn on_open_segment(&self, p: usize, a: usize, b: usize) -> bool {
        if p == a || p == b || !self.boxes_may_touch(p, p, a, b) {
            return false;
        }
        if self.orient(a, b, p) != 0 {
            return false;
        }
        let (pa, pb, pp) = (&self.pts[a], &self.pts[b], &self.pts[p]);
        let within = |lo: &BigRational, hi: &BigRational, v: &BigRational| {
            if lo <= hi {
                lo <= v && v <= hi
            } else {
                hi <= v && v <= lo
            }
        };
        within(&pa.x, &pb.x, &pp.x) && within(&pa.y, &pb.y, &pp.y)
    }

    fn segments_cross_properly(&self, a: usize, b: usize, c: usize, d: usize) -> bool {
        if a == c || a == d || b == c || b == d || !self.boxes_may_touch(a, b, c, d) {
            return false;
        }
        self.orient(a, b, c) * self.orient(a, b, d) < 0
            && self.orient(c, d, a) * self.orient(c, d, b) < 0
    }
}

/// Triangles with a directed-edge index
struct Triangulation {
    tris: Vec<[usize; 3]>,
    edge_tri: AHashMap<(usize, usize), usize>,
}

impl Triangulation {
    fn new() -> Self {
        Self {
            tris: Vec::new(),
            edge_tri: AHashMap::new(),
        }
    }

    fn add_tri(&mut self, tri: [usize; 3]) {
        let t = self.tris.len();
        self.tris.push(tri);
        self.link(t);
    }

    fn link(&mut self, t: usize) {
        let tri = self.tris[t];
        for k in 0..3 {
            self.edge_tri.insert((tri[k], tri[(k + 1) % 3]), t);
        }
    }

    fn unlink(&mut self, t: usize) {
        let tri = self.tris[t];
        for k in 0..3 {
            self.edge_tri.remove(&(tri[k], tri[(k + 1) % 3]));
        }
    }

    fn has_edge(&self, a: usize, b: usize) -> bool {
        self.edge_tri.contains_key(&(a, b)) || self.edge_tri.contains_key(&(b, a))
    }

    fn third(&self, t: usize, a: usize, b: usize) -> usize {
        let tri = self.tris[t];
        tri.into_iter()
            .find(|&v| v != a && v != b)
            .unwrap_or(tri[0])
    }

    /// Undirected edges in a fixed order
    fn edges(&self) -> Vec<Edge> {
        let mut edges: Vec<Edge> = self
            .edge_tri
            .keys()
            .map(|&(a, b)| Edge::new(a, b))
            .collect();
        edges.sort_unstable();
        edges.dedup();
        edges
    }

    /// Replace the triangles on both sides of `a-b` by the two on `c-d`.
    /// Returns the new edge, or `None` when `a-b` is on the hull or the
    /// quad is not strictly convex.
    fn flip(&mut self, pts: &PointSet, a: usize, b: usize) -> Option<Edge> {
        let (&t1, &t2) = match (self.edge_tri.get(&(a, b)), self.edge_tri.get(&(b, a))) {
            (Some(t1), Some(t2)) => (t1, t2),
            _ => return None,
        };
        let c = self.third(t1, a, b);
        let d = self.third(t2, a, b);
        if pts.orient(c, d, a) * pts.orient(c, d, b) >= 0 {
            return None;
        }
        self.unlink(t1);
        self.unlink(t2);
        self.tris[t1] = [a, d, c];
        self.tris[t2] = [d, b, c];
        self.link(t1);
        self.link(t2);
        Some(Edge::new(c, d))
    }
}

/// Sweep triangulation of the points in lexicographic order
fn sweep_triangulate(pts: &PointSet) -> Triangulation {
    let mut tr = Triangulation::new();
    let mut order: Vec<usize> = (0..pts.len()).collect();
    order.sort_by(|&a, &b| pts.pts[a].cmp(&pts.pts[b]));
    if order.len() < 3 {
        return tr;
    }

    let (s0, s1) = (order[0], order[1]);
    let Some(m) = (2..order.len()).find(|&i| pts.orient(s0, s1, order[i]) != 0) else {
        return tr;
    };
    let apex = order[m];
    let left = pts.orient(s0, s1, apex) > 0;
    for i in 0..m - 1 {
        let (a, b) = (order[i], order[i + 1]);
        tr.add_tri(if left { [a, b, apex] } else { [b, a, apex] });
    }
    let mut hull: Vec<usize> = if left {
        order[..=m].to_vec()
    } else {
        let mut h = vec![s0, apex];
        h.extend(order[1..m].iter().rev());
        h
    };

    for &p in &order[m + 1..] {
        let n = hull.len();
        let visible: Vec<bool> = (0..n)
            .map(|i| pts.orient(hull[i], hull[(i + 1) % n], p) < 0)
            .collect();
        let Some(start) = (0..n).find(|&i| visible[i] && !visible[(i + n - 1) % n]) else {
            // Cannot happen for a point beyond the hull; keep going regardless.
            continue;
        };
        let mut count = 0;
        while count < n && visible[(start + count) % n] {
            let a = hull[(start + count) % n];
            let b = hull[(start + count + 1) % n];
            tr.add_tri([b, a, p]);
            count += 1;
        }
        let mut new_hull = Vec::with_capacity(n + 1);
        new_hull.push(hull[start]);
        new_hull.push(p);
        for k in count..n {
            new_hull.push(hull[(start + k) % n]);
        }
        hull = new_hull;
    }
    tr
}

/// Flip edges crossing `u-v` until it is an edge of the triangulation
fn insert_constraint(tr: &mut Triangulation, pts: &PointSet, u: usize, v: usize) {
    if tr.has_edge(u, v) {
        return;
    }
    let mut queue: VecDeque<Edge> = tr
        .edges()
        .into_iter()
        .filter(|e| pts.segments_cross_properly(u, v, e.0, e.1))
        .collect();
    let cap = 64 * (queue.len() + 1) * (queue.len() + 1);
    let mut iterations = 0;
    while let Some(e) = queue.pop_front() {
        iterations += 1;
        if iterations > cap {
            warn!("cdt: constraint ({u}, {v}) not recovered after {cap} flips");
            return;
        }
        if !tr.has_edge(e.0, e.1) {
            continue;
        }
        match tr.flip(pts, e.0, e.1) {
            Some(new_edge) => {
                if pts.segments_cross_properly(u, v, new_edge.0, new_edge.1) {
                    queue.push_back(new_edge);
                }
            }
            None => queue.push_back(e),
        }
    }
}

/// Lawson flips on unconstrained edges until every one is locally Delaunay
fn make_delaunay(tr: &mut Triangulation, pts: &PointSet, constrained: &AHashSet<Edge>) {
    let mut stack: Vec<Edge> = tr.edges();
    stack.reverse();
    while let Some(e) = stack.pop() {
        if constrained.contains(&e) {
            continue;
        }
        let (a, b) = (e.0, e.1);
        let (Some(&t1), Some(&t2)) = (tr.edge_tri.get(&(a, b)), tr.edge_tri.get(&(b, a))) else {
            continue;
        };
        let c = tr.third(t1, a, b);
        let d = tr.third(t2, a, b);
        // (a, b, c) is counter-clockwise.
        if incircle(&pts.pts[a], &pts.pts[b], &pts.pts[c], &pts.pts[d]) <= 0 {
            continue;
        }
        if tr.flip(pts, a, b).is_some() {
            stack.extend([Edge::new(a, d), Edge::new(d, b), Edge::new(b, c), Edge::new(c, a)]);
        }
    }
}

/// Even-odd containment of `q` in the polygon `poly`
fn point_in_polygon(q: &Mpq2, poly: &[&Mpq2]) -> bool {
    let n = poly.len();
    let mut inside = false;
    for i in 0..n {
        let pi = poly[i];
        let pj = poly[(i + 1) % n];
        if (pi.y > q.y) != (pj.y > q.y) {
            let s = orient2d(pi, pj, q);
            if (pj.y > pi.y && s > 0) || (pj.y < pi.y && s < 0) {
                inside = !inside;
            }
        }
    }
    inside
}

/// Constrained Delaunay triangulation of `input`
pub fn delaunay_2d_calc(input: &CdtInput, output_type: CdtOutputType) -> CdtResult {
    let ne = input.edge.len();
    let maxflen = input.face.iter().map(Vec::len).max().unwrap_or(0);
    let foff = power_of_10_greater_equal_to(ne.max(maxflen));

    let mut pts = PointSet::new();
    let in_to_pt: Vec<usize> = input
        .vert
        .iter()
        .enumerate()
        .map(|(i, p)| {
            let idx = pts.add_or_find(p.clone());
            pts.orig[idx].push(i);
            idx
        })
        .collect();

    // Constraint segments with their orig codes.
    let mut segments: Vec<(usize, usize, usize)> = Vec::new();
    for (i, &(a, b)) in input.edge.iter().enumerate() {
        let (a, b) = (in_to_pt[a], in_to_pt[b]);
        if a != b {
            segments.push((a, b, i));
        }
    }
    let faces: Vec<Vec<usize>> = input
        .face
        .iter()
        .map(|f| f.iter().map(|&v| in_to_pt[v]).collect())
        .collect();
    for (f, face) in faces.iter().enumerate() {
        let flen = face.len();
        for pos in 0..flen {
            let (a, b) = (face[pos], face[(pos + 1) % flen]);
            if a != b {
                segments.push((a, b, (f + 1) * foff + pos));
            }
        }
    }

    // Crossings of constraint segments become points.
    let nseg = segments.len();
    for i in 0..nseg {
        for j in i + 1..nseg {
            let (a, b, _) = segments[i];
            let (c, d, _) = segments[j];
            if pts.segments_cross_properly(a, b, c, d) {
                let x = segment_crossing(&pts.pts[a], &pts.pts[b], &pts.pts[c], &pts.pts[d]);
                pts.add_or_find(x);
            }
        }
    }

    // Split segments at every point on them; merge coincident pieces.
    let mut sub_segments: BTreeMap<Edge, Vec<usize>> = BTreeMap::new();
    for &(a, b, orig) in &segments {
        let mut on: Vec<usize> = (0..pts.len())
            .filter(|&p| pts.on_open_segment(p, a, b))
            .collect();
        let forward = pts.pts[a] < pts.pts[b];
        on.sort_by(|&p, &q| {
            let ord = pts.pts[p].cmp(&pts.pts[q]);
            if forward {
                ord
            } else {
                ord.reverse()
            }
        });
        let mut chain = Vec::with_capacity(on.len() + 2);
        chain.push(a);
        chain.extend(on);
        chain.push(b);
        for w in chain.windows(2) {
            sub_segments.entry(Edge::new(w[0], w[1])).or_default().push(orig);
        }
    }

    let mut tr = sweep_triangulate(&pts);
    for e in sub_segments.keys() {
        insert_constraint(&mut tr, &pts, e.0, e.1);
    }
    let constrained: AHashSet<Edge> = sub_segments.keys().copied().collect();
    make_delaunay(&mut tr, &pts, &constrained);

    // Region marking.
    let face_polys: Vec<Vec<&Mpq2>> = faces
        .iter()
        .map(|f| f.iter().map(|&v| &pts.pts[v]).collect())
        .collect();
    let three = BigRational::from_integer(3.into());
    let mut kept: Vec<([usize; 3], Vec<usize>)> = Vec::with_capacity(tr.tris.len());
    for tri in &tr.tris {
        let sum = &(&pts.pts[tri[0]] + &pts.pts[tri[1]]) + &pts.pts[tri[2]];
        let centroid = Mpq2::new(&sum.x / &three, &sum.y / &three);
        let containing: Vec<usize> = face_polys
            .iter()
            .enumerate()
            .filter(|(_, poly)| poly.len() >= 3 && point_in_polygon(&centroid, poly))
            .map(|(f, _)| f)
            .collect();
        if output_type == CdtOutputType::Full || !containing.is_empty() {
            kept.push((*tri, containing));
        }
    }

    // Compact points; Full mode keeps all of them.
    let used: AHashSet<usize> = kept.iter().flat_map(|(t, _)| t.iter().copied()).collect();
    let mut pt_map: Vec<Option<usize>> = vec![None; pts.len()];
    let mut result = CdtResult {
        face_edge_offset: foff,
        ..CdtResult::default()
    };
    for p in 0..pts.len() {
        if output_type == CdtOutputType::Full || used.contains(&p) {
            pt_map[p] = Some(result.vert.len());
            result.vert.push(pts.pts[p].clone());
            result.vert_orig.push(pts.orig[p].clone());
        }
    }
    let remap = |p: usize| pt_map[p].unwrap_or(0);

    let mut edge_index: AHashMap<Edge, usize> = AHashMap::new();
    let mut push_edge = |e: Edge, result: &mut CdtResult| {
        if edge_index.contains_key(&e) {
            return;
        }
        edge_index.insert(e, result.edge.len());
        result.edge.push((remap(e.0), remap(e.1)));
        let mut origs = sub_segments.get(&e).cloned().unwrap_or_default();
        origs.sort_unstable();
        origs.dedup();
        result.edge_orig.push(origs);
    };
    for (tri, containing) in kept {
        for k in 0..3 {
            push_edge(Edge::new(tri[k], tri[(k + 1) % 3]), &mut result);
        }
        result.face.push([remap(tri[0]), remap(tri[1]), remap(tri[2])]);
        result.face_orig.push(containing);
    }
    if output_type == CdtOutputType::Full {
        for &e in sub_segments.keys() {
            push_edge(e, &mut result);
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    fn square_input() -> CdtInput {
        CdtInput {
            vert: vec![
                Mpq2::from_ints(0, 0),
                Mpq2::from_ints(4, 0),
                Mpq2::from_ints(4, 4),
                Mpq2::from_ints(0, 4),
            ],
            edge: Vec::new(),
            face: vec![vec![0, 1, 2, 3]],
        }
    }

    fn area2(r: &CdtResult, f: usize) -> BigRational {
        let [a, b, c] = r.face[f];
        (&r.vert[b] - &r.vert[a]).cross(&(&r.vert[c] - &r.vert[a]))
    }

    #[test]
    fn test_square_is_two_ccw_triangles() {
        let r = delaunay_2d_calc(&square_input(), CdtOutputType::Inside);
        assert_eq!(r.face.len(), 2);
        assert_eq!(r.vert.len(), 4);
        assert_eq!(r.edge.len(), 5);
        assert_eq!(r.face_edge_offset, 10);
        for f in 0..2 {
            assert!(area2(&r, f) > BigRational::from_integer(0.into()));
            assert_eq!(r.face_orig[f], vec![0]);
        }
        let boundary = r.edge_orig.iter().filter(|o| !o.is_empty()).count();
        assert_eq!(boundary, 4);
    }

    #[test]
    fn test_crossing_edges_add_steiner_point() {
        let mut input = square_input();
        input.edge = vec![(0, 2), (1, 3)];
        let r = delaunay_2d_calc(&input, CdtOutputType::Inside);
        assert_eq!(r.vert.len(), 5);
        assert_eq!(r.face.len(), 4);
        let center = r
            .vert
            .iter()
            .position(|p| *p == Mpq2::from_ints(2, 2))
            .expect("crossing point");
        assert!(r.vert_orig[center].is_empty());
        // Each diagonal half carries its input edge index.
        let diag_pieces = r.edge_orig.iter().filter(|o| o.len() == 1 && o[0] < 10).count();
        assert_eq!(diag_pieces, 4);
    }

    #[test]
    fn test_duplicate_points_merge() {
        let mut input = square_input();
        input.vert.push(Mpq2::from_ints(4, 4));
        input.face = vec![vec![0, 1, 4, 3]];
        let r = delaunay_2d_calc(&input, CdtOutputType::Inside);
        assert_eq!(r.vert.len(), 4);
        let merged = r
            .vert
            .iter()
            .position(|p| *p == Mpq2::from_ints(4, 4))
            .expect("merged corner");
        assert_eq!(r.vert_orig[merged], vec![2, 4]);
    }

    #[test]
    fn test_point_on_edge_splits_it() {
        let mut input = square_input();
        input.vert.push(Mpq2::from_ints(2, 0));
        let r = delaunay_2d_calc(&input, CdtOutputType::Inside);
        assert_eq!(r.vert.len(), 5);
        assert_eq!(r.face.len(), 3);
        // Both halves of the split bottom edge keep face-edge provenance.
        let bottom = r.edge_orig.iter().filter(|o| o.as_slice() == [10]).count();
        assert_eq!(bottom, 2);
    }

    #[test]
    fn test_inside_mode_drops_concavity() {
        // L-shaped polygon; the hull triangle over the notch is outside.
        let input = CdtInput {
            vert: vec![
                Mpq2::from_ints(0, 0),
                Mpq2::from_ints(2, 0),
                Mpq2::from_ints(2, 1),
                Mpq2::from_ints(1, 1),
                Mpq2::from_ints(1, 2),
                Mpq2::from_ints(0, 2),
            ],
            edge: Vec::new(),
            face: vec![vec![0, 1, 2, 3, 4, 5]],
        };
        let full = delaunay_2d_calc(&input, CdtOutputType::Full);
        let inside = delaunay_2d_calc(&input, CdtOutputType::Inside);
        assert_eq!(inside.face.len(), 4);
        assert!(full.face.len() > inside.face.len());
        let total: BigRational = (0..inside.face.len()).map(|f| area2(&inside, f)).sum();
        assert_eq!(total, BigRational::from_integer(6.into()));
    }

    #[test]
    fn test_delaunay_flip() {
        // Thin quad: the short diagonal must win.
        let input = CdtInput {
            vert: vec![
                Mpq2::from_ints(0, 0),
                Mpq2::from_ints(5, -1),
                Mpq2::from_ints(10, 0),
                Mpq2::from_ints(5, 1),
            ],
            edge: Vec::new(),
            face: Vec::new(),
        };
        let r = delaunay_2d_calc(&input, CdtOutputType::Full);
        assert_eq!(r.face.len(), 2);
        let short = Edge::new(1, 3);
        assert!(r
            .edge
            .iter()
            .any(|&(a, b)| Edge::new(a, b) == short));
    }

    #[test]
    fn test_constraint_overrides_delaunay() {
        let input = CdtInput {
            vert: vec![
                Mpq2::from_ints(0, 0),
                Mpq2::from_ints(5, -1),
                Mpq2::from_ints(10, 0),
                Mpq2::from_ints(5, 1),
            ],
            edge: vec![(0, 2)],
            face: Vec::new(),
        };
        let r = delaunay_2d_calc(&input, CdtOutputType::Full);
        let long = Edge::new(0, 2);
        let pos = r
            .edge
            .iter()
            .position(|&(a, b)| Edge::new(a, b) == long)
            .expect("constraint edge");
        assert_eq!(r.edge_orig[pos], vec![0]);
    }
}
