//! Shared simulation state passed explicitly to every behaviour.
//!
//! A [`SimContext`] bundles the terrain, the risk field, the unit roster,
//! the projectile system, the message bus, the seeded RNG and the frame
//! counter. States, warriors and commanders receive it as `&mut SimContext`
//! instead of reaching for globals.

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

use crate::combat::CombatSystem;
use crate::config::SimConfig;
use crate::events::{EventBus, Message};
use crate::fsm::StateMachine;
use crate::grid::{CellKind, Grid};
use crate::math::GridPos;
use crate::pathfinding::{risk_weight_for_unit, MapView, Path};
use crate::security_map::SecurityMap;
use crate::units::{Team, Unit, UnitArena, UnitId};
use crate::visibility::has_line_of_sight;

/// Everything a behaviour may read or mutate during a tick.
#[derive(Debug, Clone)]
pub struct SimContext {
    /// Tuning.
    pub config: SimConfig,
    /// Terrain.
    pub grid: Grid,
    /// Accumulated danger per cell.
    pub risk: SecurityMap,
    /// Every unit, dead or alive.
    pub units: UnitArena,
    /// Bullets and grenades in flight.
    pub combat: CombatSystem,
    /// Message routing.
    pub bus: EventBus,
    /// The only source of randomness after construction.
    pub rng: ChaCha8Rng,
    /// Ticks simulated so far.
    pub frame: u64,
    in_flight: Vec<UnitId>,
}

impl SimContext {
    /// Context over `grid` with an empty roster and a freshly built risk
    /// field. The RNG is seeded from `config.seed`.
    #[must_use]
    pub fn new(config: SimConfig, grid: Grid) -> Self {
        let rng = ChaCha8Rng::seed_from_u64(config.seed);
        let mut ctx = Self {
            risk: SecurityMap::new(grid.size()),
            combat: CombatSystem::new(config.combat.clone()),
            config,
            grid,
            units: UnitArena::new(),
            bus: EventBus::new(),
            rng,
            frame: 0,
            in_flight: Vec::new(),
        };
        ctx.rebuild_risk();
        ctx
    }

    /// Recompute the static risk field from terrain.
    pub fn rebuild_risk(&mut self) {
        let range = self.weapon_range();
        self.risk.rebuild(&self.grid, &self.config.risk, range);
    }

    /// Longest reach of any weapon, in cells.
    #[must_use]
    pub fn weapon_range(&self) -> i32 {
        self.config.combat.fire_range.max(self.config.combat.grenade_range)
    }

    /// Read-only tactical view over terrain, risk and current occupancy.
    #[must_use]
    pub fn view(&self) -> MapView<'_> {
        MapView::new(&self.grid, &self.risk, &self.units)
    }

    /// Normalised risk at `pos`.
    ///
    /// Scans the whole field for its maximum; repeated queries go through
    /// one [`view`](Self::view) instead.
    #[must_use]
    pub fn risk_norm(&self, pos: GridPos) -> f32 {
        self.view().risk_norm(pos)
    }

    /// A* risk weight for `unit`.
    #[must_use]
    pub fn risk_weight(&self, unit: &Unit) -> f32 {
        risk_weight_for_unit(
            unit,
            self.config.movement.astar_risk_weight,
            self.config.units.hp_max,
        )
    }

    /// Risk-aware path for unit `id` from its cell to `goal`.
    ///
    /// Empty when the unit does not exist or the goal is unreachable.
    #[must_use]
    pub fn plan_path(&self, id: UnitId, goal: GridPos) -> Path {
        let Some(unit) = self.units.get(id) else {
            return Path::new();
        };
        self.plan_path_weighted(id, goal, self.risk_weight(unit))
    }

    /// Like [`plan_path`](Self::plan_path) with an explicit risk weight.
    #[must_use]
    pub fn plan_path_weighted(&self, id: UnitId, goal: GridPos, risk_weight: f32) -> Path {
        let Some(unit) = self.units.get(id) else {
            return Path::new();
        };
        self.view().astar(
            Some(id),
            unit.pos,
            goal,
            risk_weight,
            self.config.movement.occupancy_penalty,
        )
    }

    /// Nearest living enemy of `id` inside sight range with line of sight.
    #[must_use]
    pub fn nearest_visible_enemy(&self, id: UnitId) -> Option<&Unit> {
        let me = self.units.living(id)?;
        let r2 = self.config.units.sight_range * self.config.units.sight_range;
        self.units
            .enemies_of(me.team)
            .filter(|e| me.pos.dist2(e.pos) <= r2)
            .filter(|e| has_line_of_sight(&self.grid, me.pos, e.pos))
            .min_by_key(|e| me.pos.dist2(e.pos))
    }

    /// Best visible enemy target seen from `from`, where enemies hiding in
    /// trees count as farther away by the tree cover penalty.
    #[must_use]
    pub fn best_visible_enemy(&self, from: GridPos, team: Team) -> Option<&Unit> {
        let r2 = self.config.units.sight_range * self.config.units.sight_range;
        self.units
            .enemies_of(team)
            .filter(|e| from.dist2(e.pos) <= r2)
            .filter(|e| has_line_of_sight(&self.grid, from, e.pos))
            .map(|e| (self.cover_adjusted_dist2(from, e.pos), e))
            .min_by(|a, b| a.0.total_cmp(&b.0))
            .map(|(_, e)| e)
    }

    /// Nearest living enemy of `team` from `from`, ignoring sight.
    #[must_use]
    pub fn nearest_enemy(&self, from: GridPos, team: Team) -> Option<&Unit> {
        self.units
            .enemies_of(team)
            .min_by_key(|e| from.dist2(e.pos))
    }

    /// Whether any living enemy of `team` is within `range` of `from`.
    #[must_use]
    pub fn enemy_in_range(&self, from: GridPos, team: Team, range: i32) -> bool {
        self.units
            .enemies_of(team)
            .any(|e| from.dist2(e.pos) <= range * range)
    }

    /// Squared distance inflated by the tree cover penalty when `to` is a
    /// tree cell.
    #[must_use]
    pub fn cover_adjusted_dist2(&self, from: GridPos, to: GridPos) -> f32 {
        let d2 = from.dist2(to) as f32;
        if self.grid.at(to) == CellKind::Tree {
            d2 * self.config.risk.tree_cover_penalty
        } else {
            d2
        }
    }

    /// Closest living teammate of `id` (excluding itself) matching `pred`.
    #[must_use]
    pub fn closest_teammate(&self, id: UnitId, pred: impl Fn(&Unit) -> bool) -> Option<UnitId> {
        let me = self.units.living(id)?;
        self.units
            .team(me.team)
            .filter(|u| u.id != id && pred(u))
            .min_by_key(|u| me.pos.dist2(u.pos))
            .map(|u| u.id)
    }

    /// Publish on the bus.
    pub fn publish(&mut self, message: Message) -> usize {
        self.bus.publish(message)
    }

    /// Detach the state machine of `id` so it can run against `self`.
    ///
    /// Returns `None` for unknown ids and for a unit whose machine is
    /// already detached further up the call stack.
    pub(crate) fn take_fsm(&mut self, id: UnitId) -> Option<StateMachine> {
        if self.in_flight.contains(&id) {
            tracing::warn!(unit = %id, "Nested state machine access ignored");
            return None;
        }
        let Some(unit) = self.units.get_mut(id) else {
            tracing::warn!(unit = %id, "State machine requested for unknown unit");
            return None;
        };
        self.in_flight.push(id);
        Some(std::mem::take(&mut unit.fsm))
    }

    /// Reattach a machine detached with [`take_fsm`](Self::take_fsm).
    pub(crate) fn restore_fsm(&mut self, id: UnitId, fsm: StateMachine) {
        self.in_flight.retain(|&other| other != id);
        if let Some(unit) = self.units.get_mut(id) {
            unit.fsm = fsm;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::Playfield;
    use crate::units::Role;

    fn ctx(rows: &[&str]) -> SimContext {
        let grid = Grid::from_rows(rows, Playfield::open()).unwrap();
        SimContext::new(SimConfig::default(), grid)
    }

    #[test]
    fn test_nearest_visible_enemy_skips_hidden() {
        let mut c = ctx(&[
            ".........", //
            "....#....", //
            ".........", //
            ".........", //
            ".........", //
            ".........", //
            ".........", //
            ".........", //
            ".........",
        ]);
        let cfg = c.config.units.clone();
        let me = c.units.spawn(Team::Blue, Role::Warrior, GridPos::new(1, 2), &cfg);
        c.units.spawn(Team::Orange, Role::Warrior, GridPos::new(1, 6), &cfg);
        let far = c.units.spawn(Team::Orange, Role::Warrior, GridPos::new(6, 2), &cfg);
        c.units.spawn(Team::Blue, Role::Warrior, GridPos::new(2, 2), &cfg);

        assert_eq!(c.nearest_visible_enemy(me).map(|u| u.id), Some(far));
        assert_eq!(c.nearest_enemy(GridPos::new(1, 2), Team::Blue).map(|u| u.pos), Some(GridPos::new(1, 6)));
    }

    #[test]
    fn test_tree_cover_penalty_changes_preference() {
        let mut c = ctx(&[
            ".......", //
            ".......", //
            "...T...", //
            ".......", //
            ".......", //
            ".......", //
            ".......",
        ]);
        let cfg = c.config.units.clone();
        c.units.spawn(Team::Orange, Role::Warrior, GridPos::new(2, 3), &cfg);
        let open = c.units.spawn(Team::Orange, Role::Warrior, GridPos::new(0, 5), &cfg);
        // d2 = 4 * 1.5 = 6 for the tree, 5 for the open cell.
        let best = c.best_visible_enemy(GridPos::new(0, 3), Team::Blue).map(|u| u.id);
        assert_eq!(best, Some(open));
    }

    #[test]
    fn test_take_fsm_rejects_nested_access() {
        let mut c = ctx(&["....."; 5]);
        let cfg = c.config.units.clone();
        let id = c.units.spawn(Team::Blue, Role::Warrior, GridPos::new(0, 0), &cfg);
        let fsm = c.take_fsm(id).unwrap();
        assert!(c.take_fsm(id).is_none());
        c.restore_fsm(id, fsm);
        assert!(c.take_fsm(id).is_some());
    }

    #[test]
    fn test_closest_teammate_excludes_self() {
        let mut c = ctx(&["....."; 5]);
        let cfg = c.config.units.clone();
        let me = c.units.spawn(Team::Blue, Role::Medic, GridPos::new(0, 0), &cfg);
        let near = c.units.spawn(Team::Blue, Role::Warrior, GridPos::new(0, 1), &cfg);
        c.units.spawn(Team::Blue, Role::Warrior, GridPos::new(4, 4), &cfg);
        c.units.spawn(Team::Orange, Role::Warrior, GridPos::new(1, 0), &cfg);
        assert_eq!(c.closest_teammate(me, |_| true), Some(near));
        assert!(c.closest_teammate(me, |u| u.pos.row == 4).is_some());
    }
}
