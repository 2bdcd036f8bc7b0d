// Pathfinding benchmarks: A* across grids of increasing size and clutter.
//
// The mover recomputes a path every step of every agent, so `astar` is
// the hottest function in the simulation.

use criterion::{Criterion, criterion_group, criterion_main};
use std::hint::black_box;
use homestead_prng::SimRng;
use homestead_sim::pathfinding::{CostGrid, astar};
use homestead_sim::types::Location;

/// An open grid with a sprinkling of expensive (tree-like) cells.
fn cluttered_grid(size: i32, clutter: f64, seed: u64) -> CostGrid {
    let mut rng = SimRng::new(seed);
    let costs = (0..size * size)
        .map(|_| if rng.random_bool(clutter) { 10 } else { 1 })
        .collect();
    CostGrid::new(size, size, costs)
}

fn bench_astar(c: &mut Criterion) {
    let mut group = c.benchmark_group("astar");

    for size in [32, 64, 128] {
        let costs = cluttered_grid(size, 0.15, 42);
        let start = Location::new(0, 0);
        let goal = Location::new(size - 1, size - 1);
        group.bench_function(format!("corner_to_corner_{size}x{size}"), |b| {
            b.iter(|| astar(black_box(&costs), black_box(start), black_box(goal)))
        });
    }

    // Dense clutter: the worst realistic case (deep forest).
    let costs = cluttered_grid(64, 0.5, 7);
    group.bench_function("dense_forest_64x64", |b| {
        b.iter(|| {
            astar(
                black_box(&costs),
                black_box(Location::new(0, 0)),
                black_box(Location::new(63, 63)),
            )
        })
    });

    group.finish();
}

criterion_group!(benches, bench_astar);
criterion_main!(benches);
