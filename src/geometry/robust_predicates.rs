// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Polyframe Inc.

//! Robust geometric predicates
//!
//! Floating-point filters with Burnikel–Funke–Seel error bounds, and exact
//! predicates over rationals for the cases the filters cannot decide.
//!
//! For expressions built from `+`, `-` and `*` the supremum is the same
//! expression evaluated on absolute values with every `-` replaced by `+`.
//! The index follows `index(x ± y) = 1 + max(index(x), index(y))`,
//! `index(x * y) = 1 + index(x) + index(y)`, with exact inputs at index 0
//! and rounded inputs at index 1. Then
//! `|E_exact - E| <= supremum(E) * index(E) * f64::EPSILON`.

use super::exact::{sgn, Mpq2, Mpq3};
use nalgebra::Vector3;
use num_rational::BigRational;
use num_traits::Zero;

/// Index of a dot product whose inputs are computed plane coordinates
pub const INDEX_DOT_PLANE_COORDS: u32 = 15;

/// Index of `dot(cross(a, b), cross(a, b))` for inputs of index 1
pub const INDEX_DOT_CROSS: u32 = 11;

/// Index of the plane-side expression used by [`filter_plane_side`]
pub const INDEX_PLANE_SIDE: u32 = 3 + 2 * INDEX_DOT_PLANE_COORDS;

/// Sign of `dot(p - plane_p, plane_no)` if the f64 evaluation can prove it,
/// else 0. A zero return means "undecided", not "on the plane".
pub fn filter_plane_side(
    p: &Vector3<f64>,
    plane_p: &Vector3<f64>,
    plane_no: &Vector3<f64>,
    abs_p: &Vector3<f64>,
    abs_plane_p: &Vector3<f64>,
    abs_plane_no: &Vector3<f64>,
) -> i32 {
    let d = (p - plane_p).dot(plane_no);
    if d == 0.0 {
        return 0;
    }
    let supremum = (abs_p + abs_plane_p).dot(abs_plane_no);
    let err_bound = supremum * f64::from(INDEX_PLANE_SIDE) * f64::EPSILON;
    if d.abs() > err_bound {
        if d > 0.0 {
            1
        } else {
            -1
        }
    } else {
        0
    }
}

/// Supremum of `dot(cross(a, b), cross(a, b))`
pub fn supremum_dot_cross(a: &Vector3<f64>, b: &Vector3<f64>) -> f64 {
    let abs_a = a.abs();
    let abs_b = b.abs();
    let c = Vector3::new(
        abs_a.y * abs_b.z + abs_a.z * abs_b.y,
        abs_a.z * abs_b.x + abs_a.x * abs_b.z,
        abs_a.x * abs_b.y + abs_a.y * abs_b.x,
    );
    c.dot(&c)
}

/// Axis of the largest-magnitude component of an f64 vector
pub fn dominant_axis(v: &Vector3<f64>) -> usize {
    let (x, y, z) = (v.x.abs(), v.y.abs(), v.z.abs());
    if x > y {
        if x > z {
            0
        } else {
            2
        }
    } else if y > z {
        1
    } else {
        2
    }
}

/// Exact orientation of `c` relative to the directed line `a -> b`.
/// Positive when `a, b, c` is counter-clockwise.
pub fn orient2d(a: &Mpq2, b: &Mpq2, c: &Mpq2) -> i32 {
    let ab = b - a;
    let ac = c - a;
    sgn(&ab.cross(&ac))
}

/// Exact in-circle test. For counter-clockwise `a, b, c` the result is
/// positive when `d` lies strictly inside their circumcircle.
pub fn incircle(a: &Mpq2, b: &Mpq2, c: &Mpq2, d: &Mpq2) -> i32 {
    let ad = a - d;
    let bd = b - d;
    let cd = c - d;
    let alift = &ad.x * &ad.x + &ad.y * &ad.y;
    let blift = &bd.x * &bd.x + &bd.y * &bd.y;
    let clift = &cd.x * &cd.x + &cd.y * &cd.y;
    let det = alift * bd.cross(&cd) + blift * cd.cross(&ad) + clift * ad.cross(&bd);
    sgn(&det)
}

/// Exact parameter along `a -> b` where it crosses the line through `c, d`.
/// Callers guarantee the segments properly cross.
pub fn segment_crossing(a: &Mpq2, b: &Mpq2, c: &Mpq2, d: &Mpq2) -> Mpq2 {
    let cd = d - c;
    let num = cd.cross(&(a - c));
    let den = &num - &cd.cross(&(b - c));
    debug_assert!(!den.is_zero());
    let t: BigRational = num / den;
    let ab = b - a;
    a + &(&ab * &t)
}

fn coord3d(v: &Vector3<f64>) -> robust::Coord3D<f64> {
    robust::Coord3D {
        x: v.x,
        y: v.y,
        z: v.z,
    }
}

/// Sign of the determinant of `[a - d; b - d; c - d]`, exact for f64 input
/// through Shewchuk's adaptive predicate.
///
/// Positive when `d` lies below the plane through `a, b, c`, where "above"
/// is the side their counter-clockwise order faces.
pub fn orient3d(
    a: &Vector3<f64>,
    b: &Vector3<f64>,
    c: &Vector3<f64>,
    d: &Vector3<f64>,
) -> i32 {
    let det = robust::orient3d(coord3d(a), coord3d(b), coord3d(c), coord3d(d));
    if det > 0.0 {
        1
    } else if det < 0.0 {
        -1
    } else {
        0
    }
}

/// Exact counterpart of [`orient3d`]
pub fn orient3d_exact(a: &Mpq3, b: &Mpq3, c: &Mpq3, d: &Mpq3) -> i32 {
    let ad = a - d;
    let bd = b - d;
    let cd = c - d;
    sgn(&ad.dot(&bd.cross(&cd)))
}

/// True when splitting quad `v1 v2 v3 v4` along `v1 v3` would fold it
pub fn is_quad_flip_first_third(
    v1: &Vector3<f64>,
    v2: &Vector3<f64>,
    v3: &Vector3<f64>,
    v4: &Vector3<f64>,
) -> bool {
    let d_12 = v2 - v1;
    let d_13 = v3 - v1;
    let d_14 = v4 - v1;
    let cross_a = d_12.cross(&d_13);
    let cross_b = d_14.cross(&d_13);
    cross_a.dot(&cross_b) > 0.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filter_plane_side_clear_cases() {
        let n = Vector3::new(0.0, 0.0, 1.0);
        let origin = Vector3::zeros();
        let above = Vector3::new(0.3, 0.2, 1.0);
        let below = Vector3::new(0.3, 0.2, -1.0);
        assert_eq!(
            filter_plane_side(&above, &origin, &n, &above.abs(), &origin.abs(), &n.abs()),
            1
        );
        assert_eq!(
            filter_plane_side(&below, &origin, &n, &below.abs(), &origin.abs(), &n.abs()),
            -1
        );
    }

    #[test]
    fn test_filter_plane_side_undecided_near_plane() {
        let n = Vector3::new(1.0, 1.0, 1.0);
        let origin = Vector3::new(1e8, 1e8, 1e8);
        let p = Vector3::new(1e8, 1e8, 1e8 + 1e-9);
        assert_eq!(
            filter_plane_side(&p, &origin, &n, &p.abs(), &origin.abs(), &n.abs()),
            0
        );
    }

    #[test]
    fn test_orient2d() {
        let a = Mpq2::from_ints(0, 0);
        let b = Mpq2::from_ints(1, 0);
        assert_eq!(orient2d(&a, &b, &Mpq2::from_ints(0, 1)), 1);
        assert_eq!(orient2d(&a, &b, &Mpq2::from_ints(0, -1)), -1);
        assert_eq!(orient2d(&a, &b, &Mpq2::from_ints(5, 0)), 0);
    }

    #[test]
    fn test_incircle() {
        let a = Mpq2::from_ints(0, 0);
        let b = Mpq2::from_ints(2, 0);
        let c = Mpq2::from_ints(0, 2);
        assert_eq!(incircle(&a, &b, &c, &Mpq2::from_ints(1, 1)), 1);
        assert_eq!(incircle(&a, &b, &c, &Mpq2::from_ints(2, 2)), 0);
        assert_eq!(incircle(&a, &b, &c, &Mpq2::from_ints(3, 3)), -1);
    }

    #[test]
    fn test_segment_crossing() {
        let p = segment_crossing(
            &Mpq2::from_ints(0, 0),
            &Mpq2::from_ints(2, 2),
            &Mpq2::from_ints(0, 2),
            &Mpq2::from_ints(2, 0),
        );
        assert_eq!(p, Mpq2::from_ints(1, 1));
    }

    #[test]
    fn test_orient3d_sign_convention() {
        let a = Vector3::new(0.0, 0.0, 0.0);
        let b = Vector3::new(1.0, 0.0, 0.0);
        let c = Vector3::new(0.0, 1.0, 0.0);
        assert_eq!(orient3d(&a, &b, &c, &Vector3::new(0.2, 0.2, -1.0)), 1);
        assert_eq!(orient3d(&a, &b, &c, &Vector3::new(0.2, 0.2, 1.0)), -1);
        assert_eq!(orient3d(&a, &b, &c, &Vector3::new(5.0, 7.0, 0.0)), 0);
    }

    #[test]
    fn test_orient3d_agrees_with_exact_near_plane() {
        let a = Vector3::new(0.1, 0.2, 0.3);
        let b = Vector3::new(1e3 + 0.7, 0.1, 0.9);
        let c = Vector3::new(0.3, 1e3 + 0.1, 0.2);
        let exact = |d: &Vector3<f64>| {
            orient3d_exact(&Mpq3::from_f64(&a), &Mpq3::from_f64(&b), &Mpq3::from_f64(&c), &Mpq3::from_f64(d))
        };
        // Points a hair off the plane, where a plain f64 determinant is noise.
        for t in [0.25, 0.5, 0.75] {
            let on = a + (b - a) * t + (c - a) * (1.0 - t) * 0.5;
            for eps in [0.0, 1e-13, -1e-13] {
                let d = Vector3::new(on.x, on.y, on.z + eps);
                assert_eq!(orient3d(&a, &b, &c, &d), exact(&d));
            }
        }
    }

    #[test]
    fn test_quad_flip() {
        let v1 = Vector3::new(0.0, 0.0, 0.0);
        let v2 = Vector3::new(1.0, 0.0, 0.0);
        let v3 = Vector3::new(1.0, 1.0, 0.0);
        let v4 = Vector3::new(0.0, 1.0, 0.0);
        assert!(!is_quad_flip_first_third(&v1, &v2, &v3, &v4));
        // A reflex v4 puts v2 and v4 on the same side of the v1-v3 diagonal.
        let reflex = Vector3::new(0.6, 0.4, 0.0);
        assert!(is_quad_flip_first_third(&v1, &v2, &v3, &reflex));
    }
}
