// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Polyframe Inc.

//! Exact triangle-triangle intersection
//!
//! Guigue–Devillers classification: plane-side signs decide most pairs,
//! first with an error-bounded f64 filter and then exactly. Pairs that
//! survive are put in canonical vertex order and their intervals along the
//! plane-plane intersection line are compared with orientation tests.

use super::exact::{sgn, Mpq3};
use super::mesh::IMesh;
use super::overlap::TriOverlaps;
use super::robust_predicates::filter_plane_side;
use log::{debug, trace};
use rayon::prelude::*;
use std::fmt;
use std::sync::Arc;

/// Outcome of intersecting two triangles
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum IttValue {
    #[default]
    None,
    Point(Mpq3),
    Segment(Mpq3, Mpq3),
    /// Both triangles lie in one plane. `source` is the second triangle of
    /// the tested pair.
    Coplanar { source: usize },
}

impl IttValue {
    pub fn is_none(&self) -> bool {
        matches!(self, IttValue::None)
    }

    pub fn is_coplanar(&self) -> bool {
        matches!(self, IttValue::Coplanar { .. })
    }
}

impl fmt::Display for IttValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IttValue::None => write!(f, "none"),
            IttValue::Point(p) => write!(f, "point {}", p.to_f64()),
            IttValue::Segment(p1, p2) => {
                let (a, b) = (p1.to_f64(), p2.to_f64());
                write!(f, "segment ({},{},{})-({},{},{})", a.x, a.y, a.z, b.x, b.y, b.z)
            }
            IttValue::Coplanar { source } => write!(f, "co-planar t{source}"),
        }
    }
}

/// `a - (dot(a - c, n) / dot(a - b, n)) * (a - b)`: where line `ab` meets
/// the plane through `c` with normal `n`. The denominator is nonzero for
/// the edges the classification hands in.
fn tti_interp(a: &Mpq3, b: &Mpq3, c: &Mpq3, n: &Mpq3) -> Mpq3 {
    let ab = a - b;
    let ac = a - c;
    let den = ab.dot(n);
    debug_assert!(sgn(&den) != 0);
    let alpha = ac.dot(n) / den;
    a - &ab.scale(&alpha)
}

/// Sign of `a + ad` against the plane through CCW `a, b, c`
fn tti_above(a: &Mpq3, b: &Mpq3, c: &Mpq3, ad: &Mpq3) -> i32 {
    let ba = b - a;
    let ca = c - a;
    sgn(&ad.dot(&ba.cross(&ca)))
}

/// Interval test on canonically ordered triangles. `p1` (resp. `p2`) is
/// alone on its side of the other plane, so `p1q1`, `p1r1`, `p2q2` and
/// `p2r2` each cross the line of intersection exactly once.
#[allow(clippy::too_many_arguments)]
fn itt_canon2(
    p1: &Mpq3,
    q1: &Mpq3,
    r1: &Mpq3,
    p2: &Mpq3,
    q2: &Mpq3,
    r2: &Mpq3,
    n1: &Mpq3,
    n2: &Mpq3,
) -> IttValue {
    let p1p2 = p2 - p1;
    let (intersect_1, intersect_2) = if tti_above(p1, q1, r2, &p1p2) > 0 {
        if tti_above(p1, r1, r2, &p1p2) <= 0 {
            if tti_above(p1, r1, q2, &p1p2) > 0 {
                // [k [i l] j]
                (tti_interp(p1, r1, p2, n2), tti_interp(p2, r2, p1, n1))
            } else {
                // [i [k l] j]
                (tti_interp(p2, q2, p1, n1), tti_interp(p2, r2, p1, n1))
            }
        } else {
            // [k l] [i j]
            return IttValue::None;
        }
    } else if tti_above(p1, q1, q2, &p1p2) < 0 {
        // [i j] [k l]
        return IttValue::None;
    } else if tti_above(p1, r1, q2, &p1p2) >= 0 {
        // [k [i j] l]
        (tti_interp(p1, r1, p2, n2), tti_interp(p1, q1, p2, n2))
    } else {
        // [i [k j] l]
        (tti_interp(p2, q2, p1, n1), tti_interp(p1, q1, p2, n2))
    };
    if intersect_1 == intersect_2 {
        IttValue::Point(intersect_1)
    } else {
        IttValue::Segment(intersect_1, intersect_2)
    }
}

/// Canonicalize the second triangle given the first is already canonical
#[allow(clippy::too_many_arguments)]
fn itt_canon1(
    p1: &Mpq3,
    q1: &Mpq3,
    r1: &Mpq3,
    p2: &Mpq3,
    q2: &Mpq3,
    r2: &Mpq3,
    n1: &Mpq3,
    n2: &Mpq3,
    sp2: i32,
    sq2: i32,
    sr2: i32,
) -> Option<IttValue> {
    let ans = if sp2 > 0 {
        if sq2 > 0 {
            itt_canon2(p1, r1, q1, r2, p2, q2, n1, n2)
        } else if sr2 > 0 {
            itt_canon2(p1, r1, q1, q2, r2, p2, n1, n2)
        } else {
            itt_canon2(p1, q1, r1, p2, q2, r2, n1, n2)
        }
    } else if sp2 < 0 {
        if sq2 < 0 {
            itt_canon2(p1, q1, r1, r2, p2, q2, n1, n2)
        } else if sr2 < 0 {
            itt_canon2(p1, q1, r1, q2, r2, p2, n1, n2)
        } else {
            itt_canon2(p1, r1, q1, p2, q2, r2, n1, n2)
        }
    } else if sq2 < 0 {
        if sr2 >= 0 {
            itt_canon2(p1, r1, q1, q2, r2, p2, n1, n2)
        } else {
            itt_canon2(p1, q1, r1, p2, q2, r2, n1, n2)
        }
    } else if sq2 > 0 {
        if sr2 > 0 {
            itt_canon2(p1, r1, q1, p2, q2, r2, n1, n2)
        } else {
            itt_canon2(p1, q1, r1, q2, r2, p2, n1, n2)
        }
    } else if sr2 > 0 {
        itt_canon2(p1, q1, r1, r2, p2, q2, n1, n2)
    } else if sr2 < 0 {
        itt_canon2(p1, r1, q1, r2, p2, q2, n1, n2)
    } else {
        // Coplanar
        return None;
    };
    Some(ans)
}

fn same_strict_sign(a: i32, b: i32, c: i32) -> bool {
    (a > 0 && b > 0 && c > 0) || (a < 0 && b < 0 && c < 0)
}

/// Intersect triangles `t1` and `t2` of `tm`. Both need exact planes.
pub fn intersect_tri_tri(tm: &IMesh, t1: usize, t2: usize) -> IttValue {
    let tri1 = tm.face(t1);
    let tri2 = tm.face(t2);
    let plane1 = tri1.populated_plane();
    let plane2 = tri2.populated_plane();
    debug_assert!(plane1.exact_populated() && plane2.exact_populated());
    let (vp1, vq1, vr1) = (&tri1[0], &tri1[1], &tri1[2]);
    let (vp2, vq2, vr2) = (&tri2[0], &tri2[1], &tri2[2]);

    // f64 signs; a nonzero filter result equals the exact sign.
    let d_n2 = &plane2.norm;
    let abs_d_r2 = vr2.co.abs();
    let abs_d_n2 = d_n2.abs();
    let side_of_2 = |co: &nalgebra::Vector3<f64>| {
        filter_plane_side(co, &vr2.co, d_n2, &co.abs(), &abs_d_r2, &abs_d_n2)
    };
    let mut sp1 = side_of_2(&vp1.co);
    let mut sq1 = side_of_2(&vq1.co);
    let mut sr1 = side_of_2(&vr1.co);
    if same_strict_sign(sp1, sq1, sr1) {
        return IttValue::None;
    }

    let d_n1 = &plane1.norm;
    let abs_d_r1 = vr1.co.abs();
    let abs_d_n1 = d_n1.abs();
    let side_of_1 = |co: &nalgebra::Vector3<f64>| {
        filter_plane_side(co, &vr1.co, d_n1, &co.abs(), &abs_d_r1, &abs_d_n1)
    };
    let mut sp2 = side_of_1(&vp2.co);
    let mut sq2 = side_of_1(&vq2.co);
    let mut sr2 = side_of_1(&vr2.co);
    if same_strict_sign(sp2, sq2, sr2) {
        return IttValue::None;
    }

    let (p1, q1, r1) = (&vp1.co_exact, &vq1.co_exact, &vr1.co_exact);
    let (p2, q2, r2) = (&vp2.co_exact, &vq2.co_exact, &vr2.co_exact);

    let n2 = &plane2.norm_exact;
    let exact_side_2 = |p: &Mpq3| sgn(&(p - r2).dot(n2));
    if sp1 == 0 {
        sp1 = exact_side_2(p1);
    }
    if sq1 == 0 {
        sq1 = exact_side_2(q1);
    }
    if sr1 == 0 {
        sr1 = exact_side_2(r1);
    }
    if sp1 * sq1 > 0 && sp1 * sr1 > 0 {
        return IttValue::None;
    }

    let n1 = &plane1.norm_exact;
    let exact_side_1 = |p: &Mpq3| sgn(&(p - r1).dot(n1));
    if sp2 == 0 {
        sp2 = exact_side_1(p2);
    }
    if sq2 == 0 {
        sq2 = exact_side_1(q2);
    }
    if sr2 == 0 {
        sr2 = exact_side_1(r2);
    }
    if sp2 * sq2 > 0 && sp2 * sr2 > 0 {
        return IttValue::None;
    }

    // Reorder t1 so p1 is alone on its side, or on the plane with q1 and
    // r1 strictly on one side. t2's order flips with it to keep orientation.
    let ans = if sp1 > 0 {
        if sq1 > 0 {
            itt_canon1(r1, p1, q1, p2, r2, q2, n1, n2, sp2, sr2, sq2)
        } else if sr1 > 0 {
            itt_canon1(q1, r1, p1, p2, r2, q2, n1, n2, sp2, sr2, sq2)
        } else {
            itt_canon1(p1, q1, r1, p2, q2, r2, n1, n2, sp2, sq2, sr2)
        }
    } else if sp1 < 0 {
        if sq1 < 0 {
            itt_canon1(r1, p1, q1, p2, q2, r2, n1, n2, sp2, sq2, sr2)
        } else if sr1 < 0 {
            itt_canon1(q1, r1, p1, p2, q2, r2, n1, n2, sp2, sq2, sr2)
        } else {
            itt_canon1(p1, q1, r1, p2, r2, q2, n1, n2, sp2, sr2, sq2)
        }
    } else if sq1 < 0 {
        if sr1 >= 0 {
            itt_canon1(q1, r1, p1, p2, r2, q2, n1, n2, sp2, sr2, sq2)
        } else {
            itt_canon1(p1, q1, r1, p2, q2, r2, n1, n2, sp2, sq2, sr2)
        }
    } else if sq1 > 0 {
        if sr1 > 0 {
            itt_canon1(p1, q1, r1, p2, r2, q2, n1, n2, sp2, sr2, sq2)
        } else {
            itt_canon1(q1, r1, p1, p2, q2, r2, n1, n2, sp2, sq2, sr2)
        }
    } else if sr1 > 0 {
        itt_canon1(r1, p1, q1, p2, q2, r2, n1, n2, sp2, sq2, sr2)
    } else if sr1 < 0 {
        itt_canon1(r1, p1, q1, p2, r2, q2, n1, n2, sp2, sr2, sq2)
    } else {
        None
    };

    match ans {
        None => IttValue::Coplanar { source: t2 },
        Some(IttValue::Point(p)) if is_shared_vert(tri1, tri2, &p) => IttValue::None,
        Some(value) => value,
    }
}

/// Touching only at a vertex both triangles already own is not a new
/// intersection.
fn is_shared_vert(tri1: &super::Face, tri2: &super::Face, p: &Mpq3) -> bool {
    tri1.vert.iter().any(|v1| {
        v1.co_exact == *p && tri2.vert.iter().any(|v2| Arc::ptr_eq(v1, v2))
    })
}

/// Intersection outcomes for canonical `(min, max)` triangle pairs.
///
/// Keys are sorted, so lookups are binary searches and iteration order is
/// fixed regardless of how the values were computed.
#[derive(Debug, Clone, Default)]
pub struct IttMap {
    keys: Vec<(usize, usize)>,
    values: Vec<IttValue>,
}

impl IttMap {
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn get(&self, a: usize, b: usize) -> Option<&IttValue> {
        let key = if a <= b { (a, b) } else { (b, a) };
        self.keys
            .binary_search(&key)
            .ok()
            .map(|i| &self.values[i])
    }

    pub fn iter(&self) -> impl Iterator<Item = (&(usize, usize), &IttValue)> + '_ {
        self.keys.iter().zip(&self.values)
    }
}

/// Intersect every distinct overlapping pair in parallel. Pairs `(t, t)`
/// are skipped.
pub fn calc_overlap_itts(tm: &IMesh, ov: &TriOverlaps) -> IttMap {
    let mut keys: Vec<(usize, usize)> = ov
        .overlap()
        .iter()
        .filter(|(a, b)| a != b)
        .map(|&(a, b)| if a < b { (a, b) } else { (b, a) })
        .collect();
    keys.sort_unstable();
    keys.dedup();

    let mut values = vec![IttValue::None; keys.len()];
    values
        .par_iter_mut()
        .zip(keys.par_iter())
        .for_each(|(slot, &(a, b))| {
            *slot = intersect_tri_tri(tm, a, b);
        });

    if log::log_enabled!(log::Level::Trace) {
        for (&(a, b), itt) in keys.iter().zip(&values) {
            trace!("itt t{a} t{b}: {itt}");
        }
    }
    let nontrivial = values.iter().filter(|v| !v.is_none()).count();
    debug!("calc_overlap_itts: {} pairs, {} intersecting", keys.len(), nontrivial);
    IttMap { keys, values }
}
