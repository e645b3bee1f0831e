// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

//! Benchmarks for the occupancy pipeline.
//!
//! Measures:
//! - Full frame processing at various point cloud sizes
//! - Fixed plane vs RANSAC ground fitting
//! - Warmup behavior (buffer reuse after first frame)
//!
//! Run with: cargo bench --bench engine_bench
//!
//! For on-target profiling, cross-compile and run:
//!   cargo bench --bench engine_bench --target aarch64-unknown-linux-gnu

use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use edgefirst_occupancy::{FixedPlane, GridConfig, GridParams, OccupancyEngine, Points};

/// Generate a synthetic street scene.
///
/// Points are spread over a full 360 degree sweep out to 50 m, so roughly a
/// quarter falls inside the forward cone. The ground sits at -1.73 m with a
/// gentle slope, every 40th point belongs to a 2 m tall obstacle.
fn generate_scene(total: usize) -> Points {
    let mut points = Points::with_capacity(total);
    for i in 0..total {
        let angle = i as f32 * 2.399; // golden angle
        let range = 1.0 + 49.0 * (i as f32 / total as f32).sqrt();
        let x = range * angle.cos();
        let y = range * angle.sin();
        let z = if i % 40 == 0 {
            -1.73 + 2.0 * ((i as f32 * 0.37).sin() * 0.5 + 0.5)
        } else {
            -1.73 + 0.01 * x + 0.02 * (i as f32 * 1.7).sin()
        };
        points.push(x, y, z);
    }
    points
}

fn config() -> GridConfig {
    GridConfig::new(GridParams::default()).unwrap()
}

/// Benchmark full frames at different point cloud sizes.
fn bench_engine_sizes(c: &mut Criterion) {
    let mut group = c.benchmark_group("engine_ransac");

    // Sizes representing: small scene, E1R typical, Ouster 512x10, Ouster 1024x10
    for &n_points in &[10_000, 26_000, 32_768, 65_536] {
        let scene = generate_scene(n_points);

        group.throughput(Throughput::Elements(n_points as u64));
        group.bench_with_input(BenchmarkId::new("points", n_points), &scene, |b, scene| {
            let mut engine = OccupancyEngine::with_ransac(config(), Some(42));
            // Warmup: one frame to size buffers
            let _ = engine.process_points(scene);

            b.iter(|| engine.process_points(scene));
        });
    }

    group.finish();
}

/// Benchmark the pipeline without plane fitting.
fn bench_fixed_plane(c: &mut Criterion) {
    let mut group = c.benchmark_group("engine_fixed_plane");

    for &n_points in &[26_000, 65_536] {
        let scene = generate_scene(n_points);

        group.throughput(Throughput::Elements(n_points as u64));
        group.bench_with_input(BenchmarkId::new("points", n_points), &scene, |b, scene| {
            let mut engine = OccupancyEngine::new(config(), FixedPlane::below_sensor(1.73));
            let _ = engine.process_points(scene);
            b.iter(|| engine.process_points(scene));
        });
    }

    group.finish();
}

/// Benchmark warmup vs steady-state buffer reuse.
fn bench_warmup(c: &mut Criterion) {
    let mut group = c.benchmark_group("engine_warmup");

    let n_points = 26_000;
    let scene = generate_scene(n_points);

    // Cold start: fresh engine each iteration
    group.throughput(Throughput::Elements(n_points as u64));
    group.bench_function("cold", |b| {
        b.iter(|| {
            let mut engine = OccupancyEngine::new(config(), FixedPlane::below_sensor(1.73));
            engine.process_points(&scene)
        });
    });

    // Warm: reuse the engine across iterations
    group.bench_function("warm", |b| {
        let mut engine = OccupancyEngine::new(config(), FixedPlane::below_sensor(1.73));
        let _ = engine.process_points(&scene);
        b.iter(|| engine.process_points(&scene));
    });

    group.finish();
}

criterion_group!(benches, bench_engine_sizes, bench_fixed_plane, bench_warmup);
criterion_main!(benches);
