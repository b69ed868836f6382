//! Risk field integration tests.

use tactics_core::config::SimConfig;
use tactics_core::math::GridPos;
use tactics_core::world::World;
use tactics_test_utils::fixtures::{ascii_grid, SMALL_SKIRMISH};

#[test]
fn rebuild_twice_yields_identical_field() {
    let config = SimConfig::default().with_seed(11).with_grid_size(60);
    let mut world = World::generate(config).unwrap();
    world.rebuild_risk();
    let first = world.risk_snapshot();
    world.rebuild_risk();
    let second = world.risk_snapshot();
    assert_eq!(first, second);
    assert!(first.iter().all(|v| *v >= 0.0));
    assert!(first.iter().any(|v| *v > 0.0));
}

#[test]
fn same_terrain_gives_same_field_across_worlds() {
    let a = World::new(SimConfig::default(), ascii_grid(&SMALL_SKIRMISH)).unwrap();
    let b = World::new(SimConfig::default().with_seed(99), ascii_grid(&SMALL_SKIRMISH)).unwrap();
    assert_eq!(a.risk_snapshot(), b.risk_snapshot());
}

#[test]
fn max_value_is_floored_at_one_for_empty_field() {
    let mut world = World::new(SimConfig::default(), ascii_grid(&SMALL_SKIRMISH)).unwrap();
    world.context_mut().risk.clear();
    assert!((world.context().risk.max_value() - 1.0).abs() < f32::EPSILON);
    assert!(world.context().risk_norm(GridPos::new(3, 3)).abs() < f32::EPSILON);
}
