//! Criterion benchmarks for component discovery.

use std::hint::black_box;

use criterion::{Criterion, criterion_group, criterion_main};
use voltaic_spatial::{BlockPos, ConnectivityGraph};

/// A solid `side x side x side` cube of occupied cells.
fn cube(side: i32) -> ConnectivityGraph {
    let mut positions = Vec::with_capacity((side * side * side) as usize);
    for x in 0..side {
        for y in 0..side {
            for z in 0..side {
                positions.push(BlockPos::new(x, y, z));
            }
        }
    }
    ConnectivityGraph::from_positions(positions)
}

fn bench_connectivity(c: &mut Criterion) {
    let mut group = c.benchmark_group("connectivity");
    group.sample_size(50);

    // Benchmark: BFS over a 10k-cell straight cable.
    let line = ConnectivityGraph::from_positions((0..10_000).map(|x| BlockPos::new(x, 0, 0)));
    group.bench_function("component_line_10k", |b| {
        b.iter(|| black_box(line.component_containing(BlockPos::new(5_000, 0, 0))));
    });

    // Benchmark: BFS over a 20^3 cube.
    let solid = cube(20);
    group.bench_function("component_cube_8k", |b| {
        b.iter(|| black_box(solid.component_containing(BlockPos::new(0, 0, 0))));
    });

    // Benchmark: split analysis after removing the middle of a long cable.
    group.bench_function("removal_split_line_10k", |b| {
        b.iter(|| black_box(line.components_after_removal(BlockPos::new(5_000, 0, 0))));
    });

    group.finish();
}

criterion_group!(benches, bench_connectivity);
criterion_main!(benches);
