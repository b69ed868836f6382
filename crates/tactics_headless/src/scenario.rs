//! Scenario bootstrap and config loading.
//!
//! The reference skirmish lines each squad up on its own side of the river,
//! scatters the warriors across their half, parks each commander on a safe
//! anchor and hands control to the commanders.

use std::path::Path;

use rand::Rng;
use tactics_core::config::SimConfig;
use tactics_core::grid::Grid;
use tactics_core::math::GridPos;
use tactics_core::units::{Role, Team, UnitId};
use tactics_core::world::World;

use crate::error::Result;

/// Squad composition, in spawn order.
pub const SQUAD: [Role; 5] = [
    Role::Commander,
    Role::Warrior,
    Role::Medic,
    Role::Supplier,
    Role::Warrior,
];

/// Random draws per warrior when scattering.
pub const SCATTER_TRIES: u32 = 500;

/// Load and validate a RON config file.
pub fn load_config(path: &Path) -> Result<SimConfig> {
    let text = std::fs::read_to_string(path)?;
    let config: SimConfig = ron::from_str(&text)?;
    config.validate()?;
    tracing::info!(path = %path.display(), seed = config.seed, "Loaded config");
    Ok(config)
}

/// How the skirmish is set up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SkirmishOptions {
    /// Move warriors off the spawn row onto random cells in their half.
    pub scatter_warriors: bool,
    /// Run the commanders' loop.
    pub commanders: bool,
}

impl Default for SkirmishOptions {
    fn default() -> Self {
        Self {
            scatter_warriors: true,
            commanders: true,
        }
    }
}

/// First spawn cell and column step of `team`'s squad on a `size` map.
#[must_use]
pub const fn spawn_row(team: Team, size: i32) -> (GridPos, i32) {
    match team {
        Team::Blue => (GridPos::new(size / 6, size / 10), 3),
        Team::Orange => (GridPos::new(size - size / 6, size - size / 10), -3),
    }
}

/// Whether `team` could stand on `pos` at spawn time.
fn spawnable(world: &World, team: Team, pos: GridPos) -> bool {
    let grid = world.grid();
    grid.in_playfield(pos)
        && grid.at(pos).is_walkable()
        && team.owns_column(pos.col, grid.size())
        && world.context().units.unit_at(pos).is_none()
}

/// Nearest spawnable cell to `want`, searching outward ring by ring.
fn nearest_spawnable(world: &World, team: Team, want: GridPos) -> Option<GridPos> {
    let size = world.grid().size();
    (0..size).find_map(|radius| {
        ring(want, radius).find(|&pos| spawnable(world, team, pos))
    })
}

fn ring(center: GridPos, radius: i32) -> impl Iterator<Item = GridPos> {
    (-radius..=radius).flat_map(move |dr| {
        (-radius..=radius)
            .filter(move |dc| dr.abs() == radius || dc.abs() == radius)
            .map(move |dc| center.offset(dr, dc))
    })
}

/// Generate terrain from `config` and set up the reference skirmish.
pub fn skirmish(config: SimConfig, options: SkirmishOptions) -> Result<World> {
    let mut world = World::generate(config)?;
    populate(&mut world, options)?;
    Ok(world)
}

/// Set up the reference skirmish on an existing, empty world.
pub fn populate(world: &mut World, options: SkirmishOptions) -> Result<()> {
    let size = world.grid().size();
    for team in Team::ALL {
        let (start, step) = spawn_row(team, size);
        let mut ids: Vec<(Role, UnitId)> = Vec::with_capacity(SQUAD.len());
        for (i, role) in SQUAD.into_iter().enumerate() {
            let want = start.offset(0, step * i as i32);
            let pos = nearest_spawnable(world, team, want).unwrap_or(want);
            ids.push((role, world.spawn_unit(team, role, pos)?));
        }

        if options.scatter_warriors {
            for &(_, id) in ids.iter().filter(|(role, _)| *role == Role::Warrior) {
                scatter(world, team, id)?;
            }
        }

        if let Some(anchor) = world.select_anchor(team) {
            let commander = ids.iter().find(|(role, _)| *role == Role::Commander);
            if let Some(&(_, id)) = commander {
                if spawnable(world, team, anchor) {
                    world.place_unit(id, anchor)?;
                } else {
                    tracing::debug!(?team, %anchor, "Anchor taken, commander stays in line");
                }
            }
        }
    }
    world.set_commanders_enabled(options.commanders);
    tracing::info!(
        units = world.unit_snapshots().len(),
        commanders = options.commanders,
        "Skirmish ready"
    );
    Ok(())
}

/// Move `id` to a random free cell in `team`'s half, if one turns up.
fn scatter(world: &mut World, team: Team, id: UnitId) -> Result<()> {
    let size = world.grid().size();
    for _ in 0..SCATTER_TRIES {
        let rng = &mut world.context_mut().rng;
        let pos = GridPos::new(rng.gen_range(0..size), rng.gen_range(0..size));
        if spawnable(world, team, pos) {
            world.place_unit(id, pos)?;
            return Ok(());
        }
    }
    tracing::debug!(unit = %id, ?team, "No scatter cell found");
    Ok(())
}

/// Every cell a unit of `team` may spawn on, ignoring occupancy.
#[must_use]
pub fn spawn_cells(grid: &Grid, team: Team) -> Vec<GridPos> {
    grid.positions()
        .filter(|&p| grid.in_playfield(p) && grid.at(p).is_walkable())
        .filter(|&p| team.owns_column(p.col, grid.size()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small_config(seed: u64) -> SimConfig {
        SimConfig::default().with_seed(seed).with_grid_size(48)
    }

    #[test]
    fn test_spawn_rows_mirror() {
        let (blue, blue_step) = spawn_row(Team::Blue, 120);
        let (orange, orange_step) = spawn_row(Team::Orange, 120);
        assert_eq!(blue, GridPos::new(20, 12));
        assert_eq!(orange, GridPos::new(100, 108));
        assert_eq!(blue_step, -orange_step);
    }

    #[test]
    fn test_skirmish_places_both_squads_in_their_halves() {
        let world = skirmish(small_config(4), SkirmishOptions::default()).unwrap();
        let units = world.unit_snapshots();
        assert_eq!(units.len(), 10);
        for unit in &units {
            assert!(unit.team.owns_column(unit.pos.col, 48), "{unit:?}");
            assert!(world.grid().at(unit.pos).is_walkable());
        }
        assert!(world.commanders_enabled());
    }

    #[test]
    fn test_skirmish_units_start_on_distinct_cells() {
        let world = skirmish(small_config(9), SkirmishOptions::default()).unwrap();
        let mut cells: Vec<_> = world.unit_snapshots().iter().map(|u| u.pos).collect();
        cells.sort_by_key(|p| (p.row, p.col));
        cells.dedup();
        assert_eq!(cells.len(), 10);
    }

    #[test]
    fn test_commanders_can_stay_off() {
        let options = SkirmishOptions {
            commanders: false,
            ..SkirmishOptions::default()
        };
        let world = skirmish(small_config(2), options).unwrap();
        assert!(!world.commanders_enabled());
        assert!(world.commander(Team::Blue).anchor().is_some());
    }

    #[test]
    fn test_spawn_cells_stay_in_half() {
        let world = skirmish(small_config(5), SkirmishOptions::default()).unwrap();
        let cells = spawn_cells(world.grid(), Team::Orange);
        assert!(!cells.is_empty());
        assert!(cells.iter().all(|p| p.col >= 24));
    }
}
