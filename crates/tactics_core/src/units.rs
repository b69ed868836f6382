//! Units and the generational arena that owns them.
//!
//! Units are never deallocated during a match: death flips `alive` and the
//! slot stays resolvable so ids carried by in-flight messages still look
//! up. Clearing the arena bumps its generation, which turns every id from
//! the previous match into a stale id.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::config::UnitConfig;
use crate::fsm::{State, StateKind, StateMachine};
use crate::math::GridPos;
use crate::pathfinding::Occupancy;

/// One of the two sides.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Team {
    /// Starts at the top-left.
    Blue,
    /// Starts at the bottom-right.
    Orange,
}

impl Team {
    /// Both teams, in index order.
    pub const ALL: [Self; 2] = [Self::Blue, Self::Orange];

    /// The other team.
    #[must_use]
    pub const fn opponent(self) -> Self {
        match self {
            Self::Blue => Self::Orange,
            Self::Orange => Self::Blue,
        }
    }

    /// Stable index for per-team arrays.
    #[must_use]
    pub const fn index(self) -> usize {
        match self {
            Self::Blue => 0,
            Self::Orange => 1,
        }
    }

    /// Whether column `col` lies in this team's half of a `size`-wide map.
    #[must_use]
    pub const fn owns_column(self, col: i32, size: i32) -> bool {
        match self {
            Self::Blue => col < size / 2,
            Self::Orange => col >= size / 2,
        }
    }
}

impl fmt::Display for Team {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Blue => "Blue",
            Self::Orange => "Orange",
        })
    }
}

/// What a unit does for its team.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Role {
    /// Issues orders; fights only when its warriors are gone.
    Commander,
    /// Front-line shooter.
    Warrior,
    /// Heals teammates from a heal pool.
    Medic,
    /// Hands out ammunition from a stock.
    Supplier,
}

impl Role {
    /// One-letter tag used by renderers.
    #[must_use]
    pub const fn letter(self) -> char {
        match self {
            Self::Commander => 'C',
            Self::Warrior => 'W',
            Self::Medic => 'M',
            Self::Supplier => 'P',
        }
    }
}

/// Generational handle into a [`UnitArena`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct UnitId {
    index: u32,
    generation: u32,
}

impl UnitId {
    /// Slot index.
    #[must_use]
    pub const fn index(self) -> u32 {
        self.index
    }

    /// Arena generation this id was issued in.
    #[must_use]
    pub const fn generation(self) -> u32 {
        self.generation
    }
}

impl fmt::Display for UnitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.index + 1)
    }
}

/// Combat stats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stats {
    /// Health, never negative.
    pub hp: i32,
    /// Rounds left.
    pub ammo: i32,
    /// Grenades left.
    pub grenades: i32,
}

/// The single role-specific counter a support unit carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RoleStock {
    /// Commanders and warriors carry nothing.
    None,
    /// Medic heal pool.
    HealPool(i32),
    /// Supplier ammunition stock.
    AmmoStock(i32),
}

impl RoleStock {
    /// Initial stock for `role`.
    #[must_use]
    pub const fn for_role(role: Role, config: &UnitConfig) -> Self {
        match role {
            Role::Medic => Self::HealPool(config.medic.initial_pool),
            Role::Supplier => Self::AmmoStock(config.supplier.initial_stock),
            Role::Commander | Role::Warrior => Self::None,
        }
    }

    /// Current amount (zero for [`RoleStock::None`]).
    #[must_use]
    pub const fn amount(self) -> i32 {
        match self {
            Self::None => 0,
            Self::HealPool(v) | Self::AmmoStock(v) => v,
        }
    }

    /// Add `delta`, clamping at zero. No-op for [`RoleStock::None`].
    pub fn adjust(&mut self, delta: i32) {
        match self {
            Self::None => {}
            Self::HealPool(v) | Self::AmmoStock(v) => *v = (*v + delta).max(0),
        }
    }
}

/// Soft support assignment set by the commander or an autonomous reaction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Assignment {
    /// Unit this medic is committed to.
    pub heal_target: Option<UnitId>,
    /// Unit this supplier is committed to.
    pub supply_target: Option<UnitId>,
    /// Frame at which the lock lapses.
    pub lock_until: u64,
}

impl Assignment {
    /// The target this unit is committed to, if any.
    #[must_use]
    pub fn target(&self) -> Option<UnitId> {
        self.heal_target.or(self.supply_target)
    }

    /// Drop both targets.
    pub fn clear(&mut self) {
        self.heal_target = None;
        self.supply_target = None;
    }
}

/// Latches that keep a warrior from repeating the same report every tick.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReportLatch {
    /// Injured was reported and the unit has not healed above the threshold.
    pub injured: bool,
    /// LowAmmo was reported and the unit has not been resupplied.
    pub low_ammo: bool,
    /// UnderFire was reported and risk has not dropped back.
    pub under_fire: bool,
    /// Ticks until the next EnemySighted report.
    pub sight_cooldown: u32,
    /// Ticks until the next automatic grenade.
    pub grenade_cooldown: u32,
}

/// A soldier on the map.
#[derive(Debug, Clone)]
pub struct Unit {
    /// Handle of this unit.
    pub id: UnitId,
    /// Side.
    pub team: Team,
    /// Function.
    pub role: Role,
    /// Current cell.
    pub pos: GridPos,
    /// Logical liveness; dead units stay in the arena.
    pub alive: bool,
    /// Set while a movement-driven state is active.
    pub moving: bool,
    /// Health and munitions.
    pub stats: Stats,
    /// Heal pool or ammo stock.
    pub stock: RoleStock,
    /// Burdened units route more cautiously.
    pub carrying_objective: bool,
    /// Commander fighting as a warrior, or a team in last-stand mode.
    pub fighting: bool,
    /// Holding a cover position.
    pub in_cover: bool,
    /// Acting without a commander.
    pub autonomous: bool,
    /// Cells still to walk; includes the current cell while moving.
    pub path: Vec<GridPos>,
    /// Commander soft lock.
    pub assignment: Assignment,
    /// Report latches (warriors only).
    pub reports: ReportLatch,
    pub(crate) fsm: StateMachine,
}

impl Unit {
    /// Create a unit with full stats and an idle state machine.
    #[must_use]
    pub fn new(id: UnitId, team: Team, role: Role, pos: GridPos, config: &UnitConfig) -> Self {
        Self {
            id,
            team,
            role,
            pos,
            alive: true,
            moving: false,
            stats: Stats {
                hp: config.hp_max,
                ammo: config.ammo_init,
                grenades: config.grenade_init,
            },
            stock: RoleStock::for_role(role, config),
            carrying_objective: false,
            fighting: false,
            in_cover: false,
            autonomous: false,
            path: Vec::new(),
            assignment: Assignment::default(),
            reports: ReportLatch::default(),
            fsm: StateMachine::default(),
        }
    }

    /// Health as a fraction of `hp_max`, clamped to `[0, 1]`.
    #[must_use]
    pub fn hp_norm(&self, hp_max: i32) -> f32 {
        if hp_max <= 0 {
            return 0.0;
        }
        (self.stats.hp as f32 / hp_max as f32).clamp(0.0, 1.0)
    }

    /// Apply damage. Returns `true` if this killed the unit.
    pub fn take_damage(&mut self, amount: i32) -> bool {
        if !self.alive || amount <= 0 {
            return false;
        }
        self.stats.hp = (self.stats.hp - amount).max(0);
        if self.stats.hp == 0 {
            self.alive = false;
            self.moving = false;
            self.path.clear();
            return true;
        }
        false
    }

    /// Kind of the state currently driving this unit.
    #[must_use]
    pub fn state_kind(&self) -> StateKind {
        self.fsm.kind()
    }

    /// The state currently driving this unit.
    #[must_use]
    pub fn state(&self) -> &State {
        self.fsm.current()
    }

    /// Whether this unit accepts commander orders right now.
    #[must_use]
    pub fn is_interruptible(&self) -> bool {
        self.alive && self.fsm.can_report()
    }

    /// Number of state changes this unit has gone through.
    #[must_use]
    pub fn transitions(&self) -> u64 {
        self.fsm.transitions()
    }
}

/// Slot array of units addressed by [`UnitId`].
#[derive(Debug, Clone, Default)]
pub struct UnitArena {
    generation: u32,
    units: Vec<Unit>,
}

impl UnitArena {
    /// Empty arena.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a unit and return its id.
    pub fn spawn(&mut self, team: Team, role: Role, pos: GridPos, config: &UnitConfig) -> UnitId {
        let id = UnitId {
            index: self.units.len() as u32,
            generation: self.generation,
        };
        self.units.push(Unit::new(id, team, role, pos, config));
        id
    }

    /// Drop every unit; ids issued so far become stale.
    pub fn clear(&mut self) {
        self.units.clear();
        self.generation = self.generation.wrapping_add(1);
    }

    /// Whether `id` was issued by this arena in its current generation.
    #[must_use]
    pub fn contains(&self, id: UnitId) -> bool {
        self.get(id).is_some()
    }

    /// Look up a unit, dead or alive.
    #[must_use]
    pub fn get(&self, id: UnitId) -> Option<&Unit> {
        if id.generation != self.generation {
            return None;
        }
        self.units.get(id.index as usize)
    }

    /// Mutable lookup, dead or alive.
    pub fn get_mut(&mut self, id: UnitId) -> Option<&mut Unit> {
        if id.generation != self.generation {
            return None;
        }
        self.units.get_mut(id.index as usize)
    }

    /// Look up a living unit.
    #[must_use]
    pub fn living(&self, id: UnitId) -> Option<&Unit> {
        self.get(id).filter(|u| u.alive)
    }

    /// Number of slots (dead units included).
    #[must_use]
    pub fn len(&self) -> usize {
        self.units.len()
    }

    /// Whether no unit was ever spawned in this generation.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }

    /// Every unit in spawn order.
    pub fn iter(&self) -> impl Iterator<Item = &Unit> {
        self.units.iter()
    }

    /// Every unit in spawn order, mutably.
    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Unit> {
        self.units.iter_mut()
    }

    /// All ids in spawn order.
    #[must_use]
    pub fn ids(&self) -> Vec<UnitId> {
        self.units.iter().map(|u| u.id).collect()
    }

    /// Living units of `team`.
    pub fn team(&self, team: Team) -> impl Iterator<Item = &Unit> {
        self.units.iter().filter(move |u| u.alive && u.team == team)
    }

    /// Living units not on `team`.
    pub fn enemies_of(&self, team: Team) -> impl Iterator<Item = &Unit> {
        self.units.iter().filter(move |u| u.alive && u.team != team)
    }

    /// The living unit standing on `pos`, if any.
    #[must_use]
    pub fn unit_at(&self, pos: GridPos) -> Option<&Unit> {
        self.units.iter().find(|u| u.alive && u.pos == pos)
    }

    /// Living unit of `team` and `role`, first in spawn order.
    #[must_use]
    pub fn find_role(&self, team: Team, role: Role) -> Option<&Unit> {
        self.team(team).find(|u| u.role == role)
    }

    /// Whether any living unit of `team` has `role`.
    #[must_use]
    pub fn any_alive(&self, team: Team, role: Role) -> bool {
        self.find_role(team, role).is_some()
    }
}

impl Occupancy for UnitArena {
    fn is_occupied(&self, pos: GridPos, ignore: Option<UnitId>) -> bool {
        self.units
            .iter()
            .any(|u| u.alive && u.pos == pos && Some(u.id) != ignore)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> UnitConfig {
        UnitConfig::default()
    }

    #[test]
    fn test_spawn_sets_role_stock() {
        let mut arena = UnitArena::new();
        let cfg = config();
        let medic = arena.spawn(Team::Blue, Role::Medic, GridPos::new(1, 1), &cfg);
        let supplier = arena.spawn(Team::Blue, Role::Supplier, GridPos::new(1, 2), &cfg);
        let warrior = arena.spawn(Team::Orange, Role::Warrior, GridPos::new(1, 3), &cfg);

        assert_eq!(arena.get(medic).unwrap().stock, RoleStock::HealPool(120));
        assert_eq!(arena.get(supplier).unwrap().stock, RoleStock::AmmoStock(20));
        assert_eq!(arena.get(warrior).unwrap().stock, RoleStock::None);
        assert_eq!(arena.get(warrior).unwrap().stats.ammo, 20);
    }

    #[test]
    fn test_stale_ids_after_clear() {
        let mut arena = UnitArena::new();
        let id = arena.spawn(Team::Blue, Role::Warrior, GridPos::new(0, 0), &config());
        assert!(arena.contains(id));
        arena.clear();
        assert!(!arena.contains(id));

        let fresh = arena.spawn(Team::Blue, Role::Warrior, GridPos::new(0, 0), &config());
        assert_eq!(fresh.index(), id.index());
        assert_ne!(fresh, id);
        assert!(arena.get(id).is_none());
    }

    #[test]
    fn test_damage_clamps_and_kills() {
        let mut unit = Unit::new(
            UnitArena::new().spawn(Team::Blue, Role::Warrior, GridPos::new(0, 0), &config()),
            Team::Blue,
            Role::Warrior,
            GridPos::new(0, 0),
            &config(),
        );
        assert!(!unit.take_damage(30));
        assert_eq!(unit.stats.hp, 70);
        assert!(unit.take_damage(500));
        assert_eq!(unit.stats.hp, 0);
        assert!(!unit.alive);
        assert!(!unit.take_damage(5));
    }

    #[test]
    fn test_hp_norm() {
        let mut arena = UnitArena::new();
        let id = arena.spawn(Team::Blue, Role::Warrior, GridPos::new(0, 0), &config());
        let unit = arena.get_mut(id).unwrap();
        unit.stats.hp = 25;
        assert!((unit.hp_norm(100) - 0.25).abs() < 1e-6);
        assert_eq!(unit.hp_norm(0), 0.0);
    }

    #[test]
    fn test_occupancy_ignores_self_and_dead() {
        let mut arena = UnitArena::new();
        let a = arena.spawn(Team::Blue, Role::Warrior, GridPos::new(2, 2), &config());
        let b = arena.spawn(Team::Orange, Role::Warrior, GridPos::new(3, 3), &config());

        assert!(arena.is_occupied(GridPos::new(2, 2), None));
        assert!(!arena.is_occupied(GridPos::new(2, 2), Some(a)));
        assert!(arena.is_occupied(GridPos::new(3, 3), Some(a)));

        arena.get_mut(b).unwrap().alive = false;
        assert!(!arena.is_occupied(GridPos::new(3, 3), None));
    }

    #[test]
    fn test_stock_adjust_clamps() {
        let mut s = RoleStock::HealPool(30);
        s.adjust(-50);
        assert_eq!(s.amount(), 0);
        let mut none = RoleStock::None;
        none.adjust(10);
        assert_eq!(none.amount(), 0);
    }

    #[test]
    fn test_team_half() {
        assert!(Team::Blue.owns_column(59, 120));
        assert!(!Team::Blue.owns_column(60, 120));
        assert!(Team::Orange.owns_column(60, 120));
        assert_eq!(Team::Blue.opponent(), Team::Orange);
    }
}
