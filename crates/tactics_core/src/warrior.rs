//! Per-tick warrior self-check.
//!
//! After the state machines have run, every living warrior:
//!
//! 1. ticks its report and grenade cooldowns,
//! 2. considers an automatic grenade,
//! 3. if autonomous, picks its own engagement;
//!    otherwise reports its condition to the commander.
//!
//! Units in a non-interruptible state skip step 3.

use crate::context::SimContext;
use crate::events::{EventKind, Message};
use crate::fsm::{change_state, State, StateKind};
use crate::math::GridPos;
use crate::units::{ReportLatch, Role, UnitId};
use crate::visibility::has_line_of_sight;

/// Run the self-check for every unit in `ids`, in order.
///
/// The risk normaliser is taken once for the whole pass; nothing in the
/// pass deposits risk, so it stays valid until the next combat step.
pub fn check_all(ctx: &mut SimContext, ids: &[UnitId]) {
    let max_risk = ctx.risk.max_value();
    for &id in ids {
        check_with(ctx, id, max_risk);
    }
}

/// Run the self-check for warrior `id`. Non-warriors and dead units are
/// ignored.
pub fn check_and_report(ctx: &mut SimContext, id: UnitId) {
    let max_risk = ctx.risk.max_value();
    check_with(ctx, id, max_risk);
}

fn check_with(ctx: &mut SimContext, id: UnitId, max_risk: f32) {
    let Some(unit) = ctx.units.get_mut(id) else {
        return;
    };
    if !unit.alive || unit.role != Role::Warrior {
        return;
    }
    unit.reports.grenade_cooldown = unit.reports.grenade_cooldown.saturating_sub(1);

    consider_auto_grenade(ctx, id, max_risk);

    let Some(unit) = ctx.units.living(id) else {
        return;
    };
    if !unit.is_interruptible() {
        return;
    }
    if unit.autonomous {
        act_autonomously(ctx, id, max_risk);
    } else {
        report_status(ctx, id, max_risk);
    }
}

fn consider_auto_grenade(ctx: &mut SimContext, id: UnitId, max_risk: f32) {
    let Some(me) = ctx.units.living(id) else {
        return;
    };
    if me.stats.grenades <= 0 || me.reports.grenade_cooldown > 0 {
        return;
    }
    let (pos, team) = (me.pos, me.team);
    let Some(target) = ctx.nearest_visible_enemy(id).map(|e| e.pos) else {
        return;
    };
    if !ctx.enemy_in_range(pos, team, ctx.config.combat.fire_range) {
        return;
    }

    let cfg = &ctx.config.units;
    let d2 = pos.dist2(target) as f32;
    if d2 > cfg.auto_grenade_max_dist * cfg.auto_grenade_max_dist {
        return;
    }
    let friend_r2 = cfg.auto_grenade_friend_radius * cfg.auto_grenade_friend_radius;
    let friend_near = ctx
        .units
        .team(team)
        .any(|u| u.id != id && (u.pos.dist2(target) as f32) <= friend_r2);
    if friend_near {
        return;
    }
    let cluster_r2 = cfg.auto_grenade_cluster_radius * cfg.auto_grenade_cluster_radius;
    let clustered = ctx
        .units
        .enemies_of(team)
        .filter(|e| (e.pos.dist2(target) as f32) <= cluster_r2)
        .count();
    let under_fire = ctx.risk.normalized(pos, max_risk) >= cfg.under_fire_threshold;
    if clustered < cfg.auto_grenade_min_enemies && !under_fire {
        return;
    }

    let cooldown = cfg.auto_grenade_cooldown;
    if target == pos {
        ctx.combat.drop_grenade(&ctx.grid, &mut ctx.units, pos, team);
    } else {
        ctx.combat.throw_grenade(pos, target, team);
    }
    if let Some(me) = ctx.units.get_mut(id) {
        me.stats.grenades -= 1;
        me.reports.grenade_cooldown = cooldown;
    }
    tracing::debug!(unit = %id, %target, clustered, under_fire, "Automatic grenade");
}

/// Commander-less engagement: fight what is visible, chase what is not,
/// dig in when the ground is hot, otherwise idle.
fn act_autonomously(ctx: &mut SimContext, id: UnitId, max_risk: f32) {
    let Some(me) = ctx.units.living(id) else {
        return;
    };
    let (pos, team, current) = (me.pos, me.team, me.state_kind());

    let target = ctx
        .nearest_visible_enemy(id)
        .or_else(|| ctx.nearest_enemy(pos, team))
        .map(|e| e.pos);

    let next = match target {
        Some(target) => {
            let reachable = !ctx
                .plan_path_weighted(id, target, ctx.config.movement.astar_risk_weight)
                .is_empty();
            if reachable {
                (current != StateKind::Attacking).then(|| State::attack(target, &ctx.config))
            } else {
                Some(State::move_to(target, State::Idle, &ctx.config))
            }
        }
        None => {
            let hot = ctx.config.units.under_fire_threshold * ctx.config.units.autonomous_defend_factor;
            if ctx.risk.normalized(pos, max_risk) >= hot {
                (current != StateKind::Defending).then(|| State::defend(pos, &ctx.config))
            } else {
                (current != StateKind::Idle).then_some(State::Idle)
            }
        }
    };

    if let Some(next) = next {
        tracing::debug!(unit = %id, next = %next.kind(), "Autonomous warrior decision");
        change_state(ctx, id, next);
    }
}

fn report_status(ctx: &mut SimContext, id: UnitId, max_risk: f32) {
    let Some(me) = ctx.units.living(id) else {
        return;
    };
    let (pos, team) = (me.pos, me.team);
    let (hp, ammo) = (me.stats.hp, me.stats.ammo);
    let mut latch = me.reports;
    let cfg = &ctx.config.units;
    let mut outbox: Vec<Message> = Vec::new();

    if ammo <= 0 && ctx.enemy_in_range(pos, team, ctx.config.combat.fire_range) {
        if !latch.low_ammo {
            outbox.push(Message::report(EventKind::LowAmmo, id, pos, ammo));
            latch.low_ammo = true;
        }
        flush(ctx, id, latch, outbox);
        tracing::debug!(unit = %id, "Out of ammo under threat; retreating");
        change_state(ctx, id, State::RetreatingToCover);
        return;
    }

    if hp <= cfg.injured_report_hp && !latch.injured {
        outbox.push(Message::report(EventKind::Injured, id, pos, hp));
        latch.injured = true;
    } else if hp > cfg.injured_report_hp {
        latch.injured = false;
    }

    let risk = ctx.risk.normalized(pos, max_risk);
    if risk >= cfg.under_fire_threshold && !latch.under_fire {
        outbox.push(Message::report(EventKind::UnderFire, id, pos, 0));
        latch.under_fire = true;
    } else if risk < cfg.under_fire_threshold {
        latch.under_fire = false;
    }

    if ammo <= 0 && !latch.low_ammo {
        outbox.push(Message::report(EventKind::LowAmmo, id, pos, ammo));
        latch.low_ammo = true;
    } else if ammo > 0 {
        latch.low_ammo = false;
    }

    latch.sight_cooldown = latch.sight_cooldown.saturating_sub(1);
    if latch.sight_cooldown == 0 {
        if let Some(enemy) = ctx.nearest_visible_enemy(id).map(|e| e.pos) {
            outbox.push(Message::report(EventKind::EnemySighted, id, enemy, 0));
            latch.sight_cooldown = cfg.sighting_report_cooldown;
        }
    }

    flush(ctx, id, latch, outbox);
}

fn flush(ctx: &mut SimContext, id: UnitId, latch: ReportLatch, outbox: Vec<Message>) {
    if let Some(unit) = ctx.units.get_mut(id) {
        unit.reports = latch;
    }
    for msg in outbox {
        tracing::trace!(unit = %id, kind = ?msg.kind, "Warrior report");
        ctx.publish(msg);
    }
}

/// Cell of the first enemy `id` can see, used by the periodic sighting
/// sweep that every unit takes part in.
#[must_use]
pub fn first_visible_enemy(ctx: &SimContext, id: UnitId) -> Option<GridPos> {
    let me = ctx.units.living(id)?;
    let r2 = ctx.config.units.sight_range * ctx.config.units.sight_range;
    ctx.units
        .enemies_of(me.team)
        .find(|e| {
            me.pos.dist2(e.pos) <= r2
                && has_line_of_sight(&ctx.grid, me.pos, e.pos)
        })
        .map(|e| e.pos)
}
