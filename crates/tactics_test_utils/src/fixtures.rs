//! Test fixtures and helpers.
//!
//! Hand-drawn maps, roster builders and pre-built worlds for consistent
//! testing. Glyphs follow [`CellKind::glyph`]: `.` empty, `#` rock, `T`
//! tree, `~` water, `A` ammo depot, `M` medical depot.

use tactics_core::config::SimConfig;
use tactics_core::grid::{CellKind, Grid, Playfield};
use tactics_core::math::GridPos;
use tactics_core::units::{Role, Team, UnitId};
use tactics_core::world::World;

/// A 12x12 map split by a rock wall with a single gap at row 9.
pub const WALL_WITH_GAP: [&str; 12] = [
    "......#.....",
    "......#.....",
    "......#.....",
    "......#.....",
    "......#.....",
    "......#.....",
    "......#.....",
    "......#.....",
    "......#.....",
    "............",
    "......#.....",
    "......#.....",
];

/// A 10x10 map with a river down column 5 and no crossing.
pub const UNCROSSABLE_RIVER: [&str; 10] = [
    ".....~....",
    ".....~....",
    ".....~....",
    ".....~....",
    ".....~....",
    ".....~....",
    ".....~....",
    ".....~....",
    ".....~....",
    ".....~....",
];

/// A 10x10 map with a grove and a boulder, plus one depot of each kind per
/// side.
pub const SMALL_SKIRMISH: [&str; 10] = [
    "A........A",
    "M........M",
    "..........",
    "...TT.....",
    "...TT.....",
    "......#...",
    "......#...",
    "..........",
    "..........",
    "..........",
];

/// Parse a square ASCII map with no playfield margins.
///
/// # Panics
///
/// Panics if the rows do not form a square.
#[must_use]
pub fn ascii_grid(rows: &[&str]) -> Grid {
    Grid::from_rows(rows, Playfield::open()).expect("fixture map must be square")
}

/// An all-empty `n`x`n` map with no playfield margins.
#[must_use]
pub fn open_grid(n: i32) -> Grid {
    Grid::empty(n, Playfield::open())
}

/// An `n`x`n` map where every cell listed in `rocks` is rock.
#[must_use]
pub fn grid_with_rocks(n: i32, rocks: &[GridPos]) -> Grid {
    let mut grid = open_grid(n);
    for &pos in rocks {
        grid.set(pos, CellKind::Rock);
    }
    grid
}

/// Default configuration with a fixed seed.
#[must_use]
pub fn test_config(seed: u64) -> SimConfig {
    SimConfig::default().with_seed(seed)
}

/// World over `grid` with the risk field zeroed, so pathing is pure
/// distance.
///
/// # Panics
///
/// Panics if the default configuration fails validation.
#[must_use]
pub fn quiet_world(grid: Grid) -> World {
    let mut world = World::new(test_config(1), grid).expect("default config is valid");
    world.context_mut().risk.clear();
    world
}

/// World over `grid` with the risk field built from terrain.
///
/// # Panics
///
/// Panics if the default configuration fails validation.
#[must_use]
pub fn risky_world(grid: Grid) -> World {
    World::new(test_config(1), grid).expect("default config is valid")
}

/// Builder for a roster of units to drop into a [`World`].
#[derive(Debug, Clone, Default)]
pub struct RosterBuilder {
    units: Vec<(Team, Role, GridPos)>,
}

impl RosterBuilder {
    /// Empty roster.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add one unit.
    #[must_use]
    pub fn unit(mut self, team: Team, role: Role, pos: GridPos) -> Self {
        self.units.push((team, role, pos));
        self
    }

    /// Add a full squad (commander, warrior, medic, supplier, warrior) in a
    /// row starting at `start`, stepping `step` columns.
    #[must_use]
    pub fn squad(mut self, team: Team, start: GridPos, step: i32) -> Self {
        let roles = [
            Role::Commander,
            Role::Warrior,
            Role::Medic,
            Role::Supplier,
            Role::Warrior,
        ];
        for (i, role) in roles.into_iter().enumerate() {
            self.units.push((team, role, start.offset(0, step * i as i32)));
        }
        self
    }

    /// Spawn every unit into `world`, returning ids in insertion order.
    ///
    /// # Panics
    ///
    /// Panics if any position is off the grid.
    pub fn spawn(self, world: &mut World) -> Vec<UnitId> {
        self.units
            .into_iter()
            .map(|(team, role, pos)| {
                world
                    .spawn_unit(team, role, pos)
                    .expect("fixture unit must be on the grid")
            })
            .collect()
    }
}

/// A quiet 24x24 world with one squad per team facing each other across
/// open ground. Commanders are left disabled.
#[must_use]
pub fn facing_squads() -> (World, Vec<UnitId>) {
    let mut world = quiet_world(open_grid(24));
    let ids = RosterBuilder::new()
        .squad(Team::Blue, GridPos::new(4, 2), 2)
        .squad(Team::Orange, GridPos::new(19, 21), -2)
        .spawn(&mut world);
    (world, ids)
}

/// A generated 48x48 world with one squad per team, anchors picked and
/// commanders enabled.
///
/// # Panics
///
/// Panics if the configuration fails validation.
#[must_use]
pub fn generated_skirmish(seed: u64) -> World {
    let config = test_config(seed).with_grid_size(48);
    let mut world = World::generate(config).expect("fixture config is valid");
    let grid = world.grid().clone();
    let free = |team: Team| -> Vec<GridPos> {
        grid.positions()
            .filter(|&p| grid.in_playfield(p) && grid.at(p).is_walkable())
            .filter(|&p| team.owns_column(p.col, grid.size()))
            .take(5)
            .collect()
    };
    let blue = free(Team::Blue);
    let orange = free(Team::Orange);
    let mut roster = RosterBuilder::new();
    let roles = [
        Role::Commander,
        Role::Warrior,
        Role::Medic,
        Role::Supplier,
        Role::Warrior,
    ];
    for (role, pos) in roles.iter().zip(&blue) {
        roster = roster.unit(Team::Blue, *role, *pos);
    }
    for (role, pos) in roles.iter().zip(&orange) {
        roster = roster.unit(Team::Orange, *role, *pos);
    }
    roster.spawn(&mut world);
    for team in Team::ALL {
        world.select_anchor(team);
    }
    world.set_commanders_enabled(true);
    tracing::debug!(seed, "Generated skirmish fixture");
    world
}
