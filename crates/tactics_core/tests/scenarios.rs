//! End-to-end behaviour scenarios.
//!
//! Each test builds a small world, sets up one situation and checks what the
//! core does with it over one or a few ticks.

use tactics_core::combat::{CombatEvent, CombatSystem};
use tactics_core::config::{CombatConfig, SimConfig};
use tactics_core::error::{OrderRejection, SimError};
use tactics_core::events::{Channel, EventKind, Subscriber};
use tactics_core::fsm::{change_state, update_unit, Healing, State, StateKind};
use tactics_core::grid::{Grid, Playfield};
use tactics_core::math::GridPos;
use tactics_core::orders::Order;
use tactics_core::security_map::SecurityMap;
use tactics_core::config::UnitConfig;
use tactics_core::units::{Role, Team, UnitArena};
use tactics_core::warrior;
use tactics_test_utils::fixtures::{facing_squads, open_grid, quiet_world, RosterBuilder};

#[test]
fn same_order_twice_in_cooldown_changes_state_once() {
    let (mut world, ids) = facing_squads();
    let warrior = ids[1];
    let hold = world.unit(warrior).unwrap().pos;

    world
        .issue_order(Team::Blue, warrior, Order::DefendAt(hold))
        .unwrap();
    // Already on the spot: the move settles on the next update.
    update_unit(world.context_mut(), warrior);
    assert_eq!(world.unit(warrior).unwrap().state_kind(), StateKind::Idle);
    let settled = world.unit(warrior).unwrap().transitions();

    let again = world.issue_order(Team::Blue, warrior, Order::DefendAt(hold));
    assert!(matches!(
        again,
        Err(SimError::OrderRejected {
            reason: OrderRejection::Debounced,
            ..
        })
    ));
    assert_eq!(world.unit(warrior).unwrap().transitions(), settled);
    assert_eq!(world.commander(Team::Blue).orders_issued(), 1);
}

#[test]
fn bullet_survives_on_last_row_and_dies_one_step_later() {
    let grid = Grid::empty(12, Playfield::open());
    let mut risk = SecurityMap::new(12);
    let mut units = UnitArena::new();
    let config = CombatConfig {
        bullet_speed: 1.0,
        ..CombatConfig::default()
    };
    let mut combat = CombatSystem::new(config);

    assert!(combat.fire_bullet(GridPos::new(5, 9), GridPos::new(5, 11), Team::Blue));
    combat.tick(&grid, &mut risk, &mut units);
    combat.tick(&grid, &mut risk, &mut units);
    assert_eq!(combat.bullets().len(), 1);
    assert!((combat.bullets()[0].pos.c - 11.0).abs() < 1e-4);

    combat.tick(&grid, &mut risk, &mut units);
    assert!(combat.bullets().is_empty());
}

#[test]
fn adjacent_medic_heals_exactly_the_missing_amount() {
    let mut world = quiet_world(open_grid(16));
    let ids = RosterBuilder::new()
        .unit(Team::Blue, Role::Medic, GridPos::new(5, 5))
        .unit(Team::Blue, Role::Warrior, GridPos::new(6, 6))
        .unit(Team::Orange, Role::Warrior, GridPos::new(14, 14))
        .spawn(&mut world);
    let (medic, patient) = (ids[0], ids[1]);

    let ctx = world.context_mut();
    ctx.units.get_mut(patient).unwrap().stats.hp = 40;
    let pool_before = ctx.units.get(medic).unwrap().stock.amount();
    change_state(ctx, medic, State::Healing(Healing::new(patient)));
    update_unit(ctx, medic);

    let healed = ctx.units.get(patient).unwrap().stats.hp - 40;
    let spent = pool_before - ctx.units.get(medic).unwrap().stock.amount();
    let expected = ctx.config.units.medic.heal_amount.min(60).min(pool_before);
    assert_eq!(healed, expected);
    assert_eq!(spent, expected);
}

#[test]
fn dry_warrior_reports_low_ammo_once_and_retreats() {
    let mut world = quiet_world(open_grid(24));
    let ids = RosterBuilder::new()
        .unit(Team::Blue, Role::Commander, GridPos::new(1, 1))
        .unit(Team::Blue, Role::Warrior, GridPos::new(10, 4))
        .unit(Team::Orange, Role::Warrior, GridPos::new(10, 14))
        .spawn(&mut world);
    let me = ids[1];
    world.context_mut().bus.subscribe(Channel::Broadcast, Subscriber::Observer(9));
    world.context_mut().units.get_mut(me).unwrap().stats.ammo = 0;

    warrior::check_and_report(world.context_mut(), me);
    warrior::check_and_report(world.context_mut(), me);

    let low_ammo = world
        .context_mut()
        .bus
        .drain(Subscriber::Observer(9))
        .into_iter()
        .filter(|m| m.kind == EventKind::LowAmmo)
        .count();
    assert_eq!(low_ammo, 1);
    let state = world.unit(me).unwrap().state_kind();
    assert!(matches!(
        state,
        StateKind::MovingToTarget | StateKind::WaitingForSupport
    ));
}

#[test]
fn dropped_grenade_damages_by_falloff_inside_radius_only() {
    let grid = Grid::empty(16, Playfield::open());
    let config = CombatConfig::default();
    let unit_config = UnitConfig::default();
    let mut units = UnitArena::new();
    let thrower = GridPos::new(8, 8);
    units.spawn(Team::Blue, Role::Warrior, thrower, &unit_config);
    let near = units.spawn(Team::Orange, Role::Warrior, GridPos::new(8, 9), &unit_config);
    let edge = units.spawn(Team::Orange, Role::Warrior, GridPos::new(10, 8), &unit_config);
    let far = units.spawn(Team::Orange, Role::Warrior, GridPos::new(8, 11), &unit_config);

    let mut combat = CombatSystem::new(config.clone());
    combat.drop_grenade(&grid, &mut units, thrower, Team::Blue);

    let expected = |d: f32| {
        let t = (1.0 - d / config.blast_radius).clamp(0.0, 1.0);
        (config.blast_edge_damage + (config.blast_center_damage - config.blast_edge_damage) * t)
            .round() as i32
    };
    let hp_max = unit_config.hp_max;
    assert_eq!(hp_max - units.get(near).unwrap().stats.hp, expected(1.0));
    assert_eq!(hp_max - units.get(edge).unwrap().stats.hp, expected(2.0));
    assert_eq!(units.get(far).unwrap().stats.hp, hp_max);
    assert_eq!(units.get(units.ids()[0]).unwrap().stats.hp, hp_max);

    let events = combat.drain_events();
    assert!(events.contains(&CombatEvent::Detonated {
        at: thrower,
        team: Team::Blue
    }));
}

#[test]
fn each_commander_defends_its_own_unit_under_fire() {
    let mut world = quiet_world(open_grid(24));
    let ids = RosterBuilder::new()
        .unit(Team::Blue, Role::Commander, GridPos::new(1, 1))
        .unit(Team::Blue, Role::Warrior, GridPos::new(6, 6))
        .unit(Team::Orange, Role::Commander, GridPos::new(22, 22))
        .unit(Team::Orange, Role::Warrior, GridPos::new(17, 17))
        .spawn(&mut world);
    let (blue, orange) = (ids[1], ids[3]);

    // Hot cells under both warriors and nowhere else.
    let ctx = world.context_mut();
    ctx.risk.set(GridPos::new(6, 6), 10.0);
    ctx.risk.set(GridPos::new(17, 17), 10.0);
    world.set_commanders_enabled(true);
    world.tick();

    let blue_order = world.commander(Team::Blue).last_order(blue).map(|(o, _)| o);
    let orange_order = world.commander(Team::Orange).last_order(orange).map(|(o, _)| o);
    assert_eq!(blue_order, Some(Order::DefendAt(GridPos::new(6, 6))));
    assert_eq!(orange_order, Some(Order::DefendAt(GridPos::new(17, 17))));
    assert!(world.commander(Team::Blue).last_order(orange).is_none());
    assert!(world.commander(Team::Orange).last_order(blue).is_none());
}

#[test]
fn config_round_trips_through_ron_and_validates() {
    let config = SimConfig::default().with_seed(5).with_grid_size(64);
    let text = config.to_ron_string().unwrap();
    let parsed = SimConfig::from_ron_str(&text).unwrap();
    assert_eq!(parsed, config);
    parsed.validate().unwrap();
}
