// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Polyframe Inc.

//! Exact rational vectors
//!
//! `Mpq3` and `Mpq2` are small fixed-size vectors over `BigRational`. They
//! carry the authoritative coordinates of every vertex and plane; the f64
//! values stored next to them are rounded caches.

use nalgebra::{Vector2, Vector3};
use num_rational::BigRational;
use num_traits::{Signed, ToPrimitive, Zero};
use std::fmt;
use std::ops::{Add, Index, IndexMut, Mul, Neg, Sub};

/// Sign of an exact value as -1, 0 or 1
pub fn sgn(value: &BigRational) -> i32 {
    if value.is_positive() {
        1
    } else if value.is_negative() {
        -1
    } else {
        0
    }
}

/// Exact conversion of a finite f64. Non-finite input maps to zero.
pub fn rational_from_f64(value: f64) -> BigRational {
    debug_assert!(value.is_finite(), "non-finite coordinate {value}");
    BigRational::from_float(value).unwrap_or_else(BigRational::zero)
}

/// Nearest f64 of an exact value
pub fn rational_to_f64(value: &BigRational) -> f64 {
    value.to_f64().unwrap_or(f64::NAN)
}

/// Exact 3D vector
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Mpq3 {
    pub x: BigRational,
    pub y: BigRational,
    pub z: BigRational,
}

impl Mpq3 {
    pub fn new(x: BigRational, y: BigRational, z: BigRational) -> Self {
        Self { x, y, z }
    }

    pub fn zero() -> Self {
        Self::new(BigRational::zero(), BigRational::zero(), BigRational::zero())
    }

    /// Build from integer coordinates, handy for tests and fixtures
    pub fn from_ints(x: i64, y: i64, z: i64) -> Self {
        Self::new(
            BigRational::from_integer(x.into()),
            BigRational::from_integer(y.into()),
            BigRational::from_integer(z.into()),
        )
    }

    pub fn from_f64(co: &Vector3<f64>) -> Self {
        Self::new(
            rational_from_f64(co.x),
            rational_from_f64(co.y),
            rational_from_f64(co.z),
        )
    }

    pub fn to_f64(&self) -> Vector3<f64> {
        Vector3::new(
            rational_to_f64(&self.x),
            rational_to_f64(&self.y),
            rational_to_f64(&self.z),
        )
    }

    pub fn is_zero(&self) -> bool {
        self.x.is_zero() && self.y.is_zero() && self.z.is_zero()
    }

    pub fn dot(&self, other: &Mpq3) -> BigRational {
        &self.x * &other.x + &self.y * &other.y + &self.z * &other.z
    }

    pub fn cross(&self, other: &Mpq3) -> Mpq3 {
        Mpq3::new(
            &self.y * &other.z - &self.z * &other.y,
            &self.z * &other.x - &self.x * &other.z,
            &self.x * &other.y - &self.y * &other.x,
        )
    }

    pub fn scale(&self, s: &BigRational) -> Mpq3 {
        Mpq3::new(&self.x * s, &self.y * s, &self.z * s)
    }

    /// Axis of the component with the largest magnitude. Ties go to the later axis.
    pub fn dominant_axis(&self) -> usize {
        let x = self.x.abs();
        let y = self.y.abs();
        let z = self.z.abs();
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

    /// Drop `axis` and keep the other two coordinates in order
    pub fn project(&self, axis: usize) -> Mpq2 {
        match axis {
            0 => Mpq2::new(self.y.clone(), self.z.clone()),
            1 => Mpq2::new(self.x.clone(), self.z.clone()),
            _ => Mpq2::new(self.x.clone(), self.y.clone()),
        }
    }
}

impl Index<usize> for Mpq3 {
    type Output = BigRational;

    fn index(&self, axis: usize) -> &BigRational {
        match axis {
            0 => &self.x,
            1 => &self.y,
            2 => &self.z,
            _ => panic!("Mpq3 axis out of range: {axis}"),
        }
    }
}

impl IndexMut<usize> for Mpq3 {
    fn index_mut(&mut self, axis: usize) -> &mut BigRational {
        match axis {
            0 => &mut self.x,
            1 => &mut self.y,
            2 => &mut self.z,
            _ => panic!("Mpq3 axis out of range: {axis}"),
        }
    }
}

impl<'a> Sub<&'a Mpq3> for &'a Mpq3 {
    type Output = Mpq3;

    fn sub(self, rhs: &'a Mpq3) -> Mpq3 {
        Mpq3::new(&self.x - &rhs.x, &self.y - &rhs.y, &self.z - &rhs.z)
    }
}

impl<'a> Add<&'a Mpq3> for &'a Mpq3 {
    type Output = Mpq3;

    fn add(self, rhs: &'a Mpq3) -> Mpq3 {
        Mpq3::new(&self.x + &rhs.x, &self.y + &rhs.y, &self.z + &rhs.z)
    }
}

impl<'a> Mul<&'a BigRational> for &'a Mpq3 {
    type Output = Mpq3;

    fn mul(self, rhs: &'a BigRational) -> Mpq3 {
        self.scale(rhs)
    }
}

impl Neg for Mpq3 {
    type Output = Mpq3;

    fn neg(self) -> Mpq3 {
        Mpq3::new(-self.x, -self.y, -self.z)
    }
}

impl fmt::Display for Mpq3 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{},{},{}]", self.x, self.y, self.z)
    }
}

/// Newell normal of a closed polygon
pub fn cross_poly(poly: &[Mpq3]) -> Mpq3 {
    let mut n = Mpq3::zero();
    let Some(last) = poly.last() else {
        return n;
    };
    let mut prev = last;
    for cur in poly {
        n.x += (&prev.y - &cur.y) * (&prev.z + &cur.z);
        n.y += (&prev.z - &cur.z) * (&prev.x + &cur.x);
        n.z += (&prev.x - &cur.x) * (&prev.y + &cur.y);
        prev = cur;
    }
    n
}

/// Exact 2D point, ordered lexicographically by (x, y)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Mpq2 {
    pub x: BigRational,
    pub y: BigRational,
}

impl Mpq2 {
    pub fn new(x: BigRational, y: BigRational) -> Self {
        Self { x, y }
    }

    pub fn from_ints(x: i64, y: i64) -> Self {
        Self::new(
            BigRational::from_integer(x.into()),
            BigRational::from_integer(y.into()),
        )
    }

    pub fn from_f64(x: f64, y: f64) -> Self {
        Self::new(rational_from_f64(x), rational_from_f64(y))
    }

    pub fn to_f64(&self) -> Vector2<f64> {
        Vector2::new(rational_to_f64(&self.x), rational_to_f64(&self.y))
    }

    pub fn cross(&self, other: &Mpq2) -> BigRational {
        &self.x * &other.y - &self.y * &other.x
    }
}

impl<'a> Sub<&'a Mpq2> for &'a Mpq2 {
    type Output = Mpq2;

    fn sub(self, rhs: &'a Mpq2) -> Mpq2 {
        Mpq2::new(&self.x - &rhs.x, &self.y - &rhs.y)
    }
}

impl<'a> Add<&'a Mpq2> for &'a Mpq2 {
    type Output = Mpq2;

    fn add(self, rhs: &'a Mpq2) -> Mpq2 {
        Mpq2::new(&self.x + &rhs.x, &self.y + &rhs.y)
    }
}

impl<'a> Mul<&'a BigRational> for &'a Mpq2 {
    type Output = Mpq2;

    fn mul(self, rhs: &'a BigRational) -> Mpq2 {
        Mpq2::new(&self.x * rhs, &self.y * rhs)
    }
}

impl fmt::Display for Mpq2 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{},{}]", self.x, self.y)
    }
}
