//! Medic and supplier behaviours, and the lazy navigator they share with
//! the depot run.

use super::{RefillAtDepot, State, Transition};
use crate::context::SimContext;
use crate::math::GridPos;
use crate::pathfinding::Occupancy;
use crate::units::{Role, UnitId};

/// Follows a cached path one cell per tick, replanning only when the
/// cached path runs out.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct Navigator {
    path: Vec<GridPos>,
    next: usize,
}

impl Navigator {
    pub(crate) fn reset(&mut self) {
        self.path.clear();
        self.next = 0;
    }

    /// Take one step toward `goal`. Returns `false` when no path exists.
    ///
    /// A cell taken by another living unit triggers one replan; if the new
    /// path is blocked too the unit waits in place this tick.
    pub(crate) fn step(&mut self, ctx: &mut SimContext, id: UnitId, goal: GridPos) -> bool {
        if self.next >= self.path.len() && !self.replan(ctx, id, goal) {
            return false;
        }
        let Some(pos) = ctx.units.get(id).map(|u| u.pos) else {
            return false;
        };
        let Some(mut cell) = self.next_cell(pos) else {
            return true;
        };
        if ctx.units.is_occupied(cell, Some(id)) {
            if !self.replan(ctx, id, goal) {
                return false;
            }
            match self.next_cell(pos) {
                Some(free) if !ctx.units.is_occupied(free, Some(id)) => cell = free,
                _ => return true,
            }
        }
        if let Some(unit) = ctx.units.get_mut(id) {
            unit.pos = cell;
        }
        self.next += 1;
        true
    }

    fn replan(&mut self, ctx: &mut SimContext, id: UnitId, goal: GridPos) -> bool {
        self.path = ctx.plan_path(id, goal);
        self.next = 0;
        !self.path.is_empty()
    }

    /// Next cell on the path, skipping the one we are standing on.
    fn next_cell(&mut self, pos: GridPos) -> Option<GridPos> {
        while self.path.get(self.next) == Some(&pos) {
            self.next += 1;
        }
        self.path.get(self.next).copied()
    }
}

/// Medic walking to a teammate and healing it.
#[derive(Debug, Clone, PartialEq)]
pub struct Healing {
    target: UnitId,
    nav: Navigator,
}

impl Healing {
    /// Heal `target`.
    #[must_use]
    pub fn new(target: UnitId) -> Self {
        Self {
            target,
            nav: Navigator::default(),
        }
    }

    /// Unit being healed.
    #[must_use]
    pub const fn target(&self) -> UnitId {
        self.target
    }

    pub(super) fn enter(&mut self, ctx: &mut SimContext, id: UnitId) -> Transition {
        let Some(unit) = ctx.units.get_mut(id) else {
            return Transition::Stay;
        };
        if unit.role != Role::Medic {
            tracing::warn!(unit = %id, role = ?unit.role, "Only medics can heal");
            return Transition::Switch(State::Idle);
        }
        unit.moving = true;
        unit.assignment.heal_target = Some(self.target);
        self.nav.reset();
        Transition::Stay
    }

    pub(super) fn update(&mut self, ctx: &mut SimContext, id: UnitId) -> Transition {
        let Some(goal) = ctx.units.living(self.target).map(|t| t.pos) else {
            return Transition::Switch(State::Idle);
        };
        let Some(pos) = ctx.units.get(id).map(|u| u.pos) else {
            return Transition::Stay;
        };

        if pos.chebyshev(goal) <= 1 {
            let given = heal_once(ctx, id, self.target);
            let hp_max = ctx.config.units.hp_max;
            let target_full = ctx
                .units
                .get(self.target)
                .map_or(true, |t| t.stats.hp >= hp_max);
            let pool_empty = ctx.units.get(id).map_or(true, |u| u.stock.amount() <= 0);
            if given == 0 || target_full || pool_empty {
                return Transition::Switch(State::RefillAtDepot(RefillAtDepot::new(
                    Role::Medic,
                    None,
                )));
            }
            return Transition::Stay;
        }

        if !self.nav.step(ctx, id, goal) {
            tracing::debug!(unit = %id, target = %self.target, "Patient unreachable");
            return Transition::Switch(State::Idle);
        }
        Transition::Stay
    }

    pub(super) fn exit(&mut self, ctx: &mut SimContext, id: UnitId) {
        if let Some(unit) = ctx.units.get_mut(id) {
            unit.moving = false;
            unit.assignment.heal_target = None;
        }
    }
}

/// Transfer one contact tick of healing. Returns the HP given.
fn heal_once(ctx: &mut SimContext, medic: UnitId, target: UnitId) -> i32 {
    let hp_max = ctx.config.units.hp_max;
    let per_tick = ctx.config.units.medic.heal_amount;
    let Some(pool) = ctx.units.get(medic).map(|u| u.stock.amount()) else {
        return 0;
    };
    let Some(patient) = ctx.units.get_mut(target) else {
        return 0;
    };
    let need = (hp_max - patient.stats.hp).max(0);
    let give = per_tick.min(need).min(pool);
    if give <= 0 {
        return 0;
    }
    patient.stats.hp = (patient.stats.hp + give).min(hp_max);
    if let Some(unit) = ctx.units.get_mut(medic) {
        unit.stock.adjust(-give);
    }
    tracing::debug!(medic = %medic, patient = %target, amount = give, "Healed");
    give
}

/// Supplier walking to a teammate and handing over ammunition.
#[derive(Debug, Clone, PartialEq)]
pub struct Supplying {
    target: UnitId,
    nav: Navigator,
}

impl Supplying {
    /// Resupply `target`.
    #[must_use]
    pub fn new(target: UnitId) -> Self {
        Self {
            target,
            nav: Navigator::default(),
        }
    }

    /// Unit being resupplied.
    #[must_use]
    pub const fn target(&self) -> UnitId {
        self.target
    }

    pub(super) fn enter(&mut self, ctx: &mut SimContext, id: UnitId) -> Transition {
        let Some(unit) = ctx.units.get_mut(id) else {
            return Transition::Stay;
        };
        if unit.role != Role::Supplier {
            tracing::warn!(unit = %id, role = ?unit.role, "Only suppliers can resupply");
            return Transition::Switch(State::Idle);
        }
        unit.moving = true;
        unit.assignment.supply_target = Some(self.target);
        self.nav.reset();
        Transition::Stay
    }

    pub(super) fn update(&mut self, ctx: &mut SimContext, id: UnitId) -> Transition {
        let restock = || Transition::Switch(State::RefillAtDepot(RefillAtDepot::new(Role::Supplier, None)));
        let Some(goal) = ctx.units.living(self.target).map(|t| t.pos) else {
            return restock();
        };
        let Some(pos) = ctx.units.get(id).map(|u| u.pos) else {
            return Transition::Stay;
        };

        if pos.chebyshev(goal) <= 1 {
            let max_ammo = ctx.config.units.ammo_init;
            let per_tick = ctx.config.units.supplier.supply_amount;
            let stock = ctx.units.get(id).map_or(0, |u| u.stock.amount());
            let Some(patient) = ctx.units.get_mut(self.target) else {
                return restock();
            };
            if patient.stats.ammo >= max_ammo {
                return restock();
            }
            let give = per_tick.min(stock).min(max_ammo - patient.stats.ammo);
            if give > 0 {
                patient.stats.ammo += give;
                if let Some(unit) = ctx.units.get_mut(id) {
                    unit.stock.adjust(-give);
                }
                tracing::debug!(supplier = %id, target = %self.target, amount = give, "Resupplied");
            }
            let target_full = ctx
                .units
                .get(self.target)
                .map_or(true, |t| t.stats.ammo >= max_ammo);
            if target_full || stock - give <= 0 {
                return restock();
            }
            return Transition::Stay;
        }

        if !self.nav.step(ctx, id, goal) {
            tracing::debug!(unit = %id, target = %self.target, "Resupply target unreachable");
            return restock();
        }
        Transition::Stay
    }

    pub(super) fn exit(&mut self, ctx: &mut SimContext, id: UnitId) {
        if let Some(unit) = ctx.units.get_mut(id) {
            unit.moving = false;
            unit.assignment.supply_target = None;
        }
    }
}
