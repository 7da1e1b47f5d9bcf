// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Polyframe Inc.

//! Intersection and boolean benchmarks

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use meshintersect::{boolean, self_intersect, triangulate_polymesh, BoolOpType, IMeshArena, IntersectConfig, PolyMesh};

/// Axis-aligned box with every side split into `n * n` quads
fn grid_cube(min: [f64; 3], size: f64, n: usize, shape: usize) -> PolyMesh {
    let mut pm = PolyMesh::new();
    let step = size / n as f64;
    // (normal axis, side, first in-plane axis, second in-plane axis); the
    // axis order makes every side face outward.
    let sides = [(0, 0.0, 2, 1), (0, 1.0, 1, 2), (1, 0.0, 0, 2), (1, 1.0, 2, 0), (2, 0.0, 1, 0), (2, 1.0, 0, 1)];
    for (axis, side, a, b) in sides {
        let base = pm.vertices.len();
        for i in 0..=n {
            for j in 0..=n {
                let mut co = min;
                co[axis] += side * size;
                co[a] += i as f64 * step;
                co[b] += j as f64 * step;
                pm.add_vertex(co);
            }
        }
        let at = |i: usize, j: usize| base + i * (n + 1) + j;
        for i in 0..n {
            for j in 0..n {
                pm.add_face(vec![at(i, j), at(i + 1, j), at(i + 1, j + 1), at(i, j + 1)], shape);
            }
        }
    }
    pm
}

fn overlapping(n: usize) -> PolyMesh {
    let mut pm = grid_cube([0.0; 3], 1.0, n, 0);
    pm.append(&grid_cube([0.37, 0.29, 0.41], 1.0, n, 0));
    pm
}

fn bench_triangulate(c: &mut Criterion) {
    let mut group = c.benchmark_group("triangulate");
    for n in [8, 32] {
        let pm = grid_cube([0.0; 3], 1.0, n, 0);
        group.bench_with_input(BenchmarkId::new("grid_cube", n), &pm, |b, pm| {
            b.iter(|| {
                let arena = IMeshArena::new();
                let (m, _) = pm.to_imesh(&arena);
                triangulate_polymesh(black_box(&m), &arena)
            });
        });
    }
    group.finish();
}

fn bench_self_intersect(c: &mut Criterion) {
    let mut group = c.benchmark_group("self_intersect");
    group.sample_size(10);
    let config = IntersectConfig::default();
    for n in [4, 16] {
        let pm = overlapping(n);
        group.bench_with_input(BenchmarkId::new("two_cubes", n), &pm, |b, pm| {
            b.iter(|| self_intersect(black_box(pm), &config).unwrap());
        });
    }
    group.finish();
}

fn bench_boolean(c: &mut Criterion) {
    let mut group = c.benchmark_group("boolean");
    group.sample_size(10);
    let config = IntersectConfig::default();
    let pm = overlapping(8);
    for op in [BoolOpType::Union, BoolOpType::Intersect, BoolOpType::Difference] {
        group.bench_with_input(BenchmarkId::new("two_cubes", op), &pm, |b, pm| {
            b.iter(|| boolean(black_box(pm), op, &config).unwrap());
        });
    }
    group.finish();
}

criterion_group!(benches, bench_triangulate, bench_self_intersect, bench_boolean);
criterion_main!(benches);
