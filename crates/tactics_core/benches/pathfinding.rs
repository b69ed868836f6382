//! Pathfinding and tick benchmarks for tactics_core.
//!
//! Run with: `cargo bench -p tactics_core`

// Benchmark binaries don't need docs on macro-generated functions
#![allow(missing_docs)]

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use tactics_core::config::SimConfig;
use tactics_core::grid::Grid;
use tactics_core::math::GridPos;
use tactics_core::pathfinding::{bfs_find_path, MapView, NoOccupancy};
use tactics_core::security_map::SecurityMap;
use tactics_test_utils::fixtures::generated_skirmish;

fn generated_map(seed: u64) -> (SimConfig, Grid, SecurityMap) {
    let config = SimConfig::default().with_seed(seed);
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let grid = Grid::generate(&config.grid, &mut rng);
    let mut risk = SecurityMap::new(grid.size());
    risk.rebuild(&grid, &config.risk, weapon_range(&config));
    (config, grid, risk)
}

fn weapon_range(config: &SimConfig) -> i32 {
    config.combat.fire_range.max(config.combat.grenade_range)
}

/// Walkable cell closest to `from`.
fn walkable_near(grid: &Grid, from: GridPos) -> GridPos {
    grid.positions()
        .filter(|&p| grid.at(p).is_walkable())
        .min_by_key(|&p| p.manhattan(from))
        .unwrap_or(from)
}

/// Corner-to-corner routing on a generated map.
pub fn pathfinding_benchmark(c: &mut Criterion) {
    let (config, grid, risk) = generated_map(7);
    let n = grid.size();
    let start = walkable_near(&grid, GridPos::new(n / 8, n / 8));
    let goal = walkable_near(&grid, GridPos::new(n - n / 8, n - n / 8));
    let view = MapView::new(&grid, &risk, &NoOccupancy);
    let weight = config.movement.astar_risk_weight;

    c.bench_function("astar_across_map", |b| {
        b.iter(|| view.astar(None, black_box(start), black_box(goal), weight, 0.0));
    });
    c.bench_function("bfs_across_map", |b| {
        b.iter(|| bfs_find_path(&grid, black_box(start), black_box(goal)));
    });
}

/// Full risk-field rebuild.
pub fn risk_field_benchmark(c: &mut Criterion) {
    let (config, grid, mut risk) = generated_map(11);
    c.bench_function("risk_field_rebuild", |b| {
        b.iter(|| risk.rebuild(black_box(&grid), &config.risk, weapon_range(&config)));
    });
}

/// Ten ticks of a small generated skirmish.
pub fn tick_benchmark(c: &mut Criterion) {
    c.bench_function("skirmish_10_ticks", |b| {
        b.iter_batched(
            || generated_skirmish(3),
            |mut world| {
                for _ in 0..10 {
                    black_box(world.tick());
                }
            },
            criterion::BatchSize::SmallInput,
        );
    });
}

criterion_group!(
    benches,
    pathfinding_benchmark,
    risk_field_benchmark,
    tick_benchmark
);
criterion_main!(benches);
