use super::{State, Transition};
use crate::config::CombatConfig;
use crate::context::SimContext;
use crate::events::{EventKind, Message};
use crate::math::{line, GridPos};
use crate::units::{Team, UnitId};
use crate::visibility::has_line_of_sight;

/// Engage the nearest visible enemy.
///
/// Each update re-acquires a target, ticks the weapon cooldown, lobs a
/// grenade when it pays off, and fires when the shot is clean. When no shot
/// is possible the unit walks to a vantage point and re-enters a fresh
/// `Attacking` there. Running dry sends it to cover.
#[derive(Debug, Clone, PartialEq)]
pub struct Attacking {
    target: GridPos,
    range: i32,
    cooldown_frames: u32,
    cooldown: u32,
}

impl Attacking {
    /// Attack around `target` with the rifle settings from `config`.
    #[must_use]
    pub fn new(target: GridPos, config: &CombatConfig) -> Self {
        Self {
            target,
            range: config.fire_range.max(1),
            cooldown_frames: config.attack_cooldown.max(1),
            cooldown: 0,
        }
    }

    /// Cell currently aimed at.
    #[must_use]
    pub const fn target(&self) -> GridPos {
        self.target
    }

    /// Ticks until the next shot.
    #[must_use]
    pub const fn cooldown(&self) -> u32 {
        self.cooldown
    }

    pub(super) fn enter(&mut self, ctx: &mut SimContext, id: UnitId) -> Transition {
        self.cooldown = 0;
        if let Some(target) = ctx.nearest_visible_enemy(id).map(|e| e.pos) {
            self.target = target;
        }
        if let Some(unit) = ctx.units.get_mut(id) {
            unit.moving = false;
        }
        Transition::Stay
    }

    pub(super) fn update(&mut self, ctx: &mut SimContext, id: UnitId) -> Transition {
        if ctx.units.living(id).is_none() {
            return Transition::Stay;
        }
        if let Some(target) = ctx.nearest_visible_enemy(id).map(|e| e.pos) {
            self.target = target;
        }
        self.cooldown = self.cooldown.saturating_sub(1);

        if self.cooldown == 0 && self.should_throw_grenade(ctx, id) {
            self.throw_grenade(ctx, id);
        }

        if self.can_shoot(ctx, id) {
            let Some(unit) = ctx.units.get_mut(id) else {
                return Transition::Stay;
            };
            unit.moving = false;
            if self.cooldown == 0 {
                let (from, team) = (unit.pos, unit.team);
                unit.stats.ammo -= 1;
                ctx.combat.fire_bullet(from, self.target, team);
                self.cooldown = self.cooldown_frames;
                tracing::trace!(unit = %id, target = %self.target, "Shot fired");
            }
            return Transition::Stay;
        }

        let Some(unit) = ctx.units.get_mut(id) else {
            return Transition::Stay;
        };
        if unit.stats.ammo <= 0 {
            let pos = unit.pos;
            unit.reports.low_ammo = true;
            ctx.publish(Message::report(EventKind::LowAmmo, id, pos, 0));
            tracing::debug!(unit = %id, "Out of ammo while attacking; retreating");
            return Transition::Switch(State::RetreatingToCover);
        }

        self.approach(ctx, id)
    }

    /// Walk toward a firing position, falling back to the target cell.
    fn approach(&self, ctx: &mut SimContext, id: UnitId) -> Transition {
        let Some(pos) = ctx.units.get(id).map(|u| u.pos) else {
            return Transition::Stay;
        };
        let movement = &ctx.config.movement;
        let destination = ctx
            .view()
            .pick_vantage_point(
                pos,
                self.target,
                self.range,
                movement.vantage_distance_weight,
                movement.vantage_search_radius,
            )
            .unwrap_or(self.target);

        let path = ctx.plan_path_weighted(id, destination, movement.astar_risk_weight);
        if path.is_empty() {
            tracing::debug!(unit = %id, %destination, "No route to attack position");
            return Transition::Switch(State::Idle);
        }
        let again = State::Attacking(Self::new(self.target, &ctx.config.combat));
        Transition::Switch(State::move_to(destination, again, &ctx.config))
    }

    fn can_shoot(&self, ctx: &SimContext, id: UnitId) -> bool {
        let Some(me) = ctx.units.living(id) else {
            return false;
        };
        if me.stats.ammo <= 0 {
            return false;
        }
        let enemy_on_target = ctx
            .units
            .unit_at(self.target)
            .is_some_and(|u| u.team != me.team);
        enemy_on_target
            && me.pos.dist2(self.target) <= self.range * self.range
            && has_line_of_sight(&ctx.grid, me.pos, self.target)
            && !friendly_in_line(ctx, me.team, me.pos, self.target)
    }

    fn should_throw_grenade(&self, ctx: &SimContext, id: UnitId) -> bool {
        let Some(me) = ctx.units.living(id) else {
            return false;
        };
        let combat = &ctx.config.combat;
        if me.stats.grenades <= 0 {
            return false;
        }
        let reach = combat.grenade_throw_range;
        if me.pos.dist2(self.target) > reach * reach {
            return false;
        }
        if !has_line_of_sight(&ctx.grid, me.pos, self.target) {
            return true;
        }
        let r2 = combat.grenade_cluster_radius * combat.grenade_cluster_radius;
        let clustered = ctx
            .units
            .enemies_of(me.team)
            .filter(|e| e.pos.dist2(self.target) <= r2)
            .count();
        clustered >= combat.grenade_min_enemies
    }

    fn throw_grenade(&mut self, ctx: &mut SimContext, id: UnitId) {
        let Some(unit) = ctx.units.get_mut(id) else {
            return;
        };
        let (from, team) = (unit.pos, unit.team);
        unit.stats.grenades = (unit.stats.grenades - 1).max(0);
        if from == self.target {
            ctx.combat.drop_grenade(&ctx.grid, &mut ctx.units, from, team);
        } else {
            ctx.combat.throw_grenade(from, self.target, team);
        }
        self.cooldown = self.cooldown.max(ctx.config.combat.grenade_cooldown);
        tracing::debug!(unit = %id, target = %self.target, "Grenade thrown while attacking");
    }
}

pub(super) fn exit(ctx: &mut SimContext, id: UnitId) {
    if let Some(unit) = ctx.units.get_mut(id) {
        unit.moving = false;
        unit.path.clear();
    }
}

/// Whether a living unit of `team` stands strictly between the endpoints.
fn friendly_in_line(ctx: &SimContext, team: Team, from: GridPos, to: GridPos) -> bool {
    line(from, to)
        .filter(|&cell| cell != from && cell != to)
        .any(|cell| ctx.units.unit_at(cell).is_some_and(|u| u.team == team))
}
