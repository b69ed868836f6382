use super::{State, Transition};
use crate::context::SimContext;
use crate::units::{Role, UnitId};

pub(super) fn enter(ctx: &mut SimContext, id: UnitId) -> Transition {
    if let Some(unit) = ctx.units.get_mut(id) {
        unit.moving = false;
        unit.in_cover = true;
    }
    Transition::Stay
}

/// Keep waiting (re-entering each tick) while out of ammo or hurt.
pub(super) fn update_support(ctx: &mut SimContext, id: UnitId) -> Transition {
    let Some(unit) = ctx.units.living(id) else {
        return Transition::Stay;
    };
    if unit.stats.ammo <= 0 || unit.stats.hp < ctx.config.units.hp_med {
        Transition::Switch(State::WaitingForSupport)
    } else {
        Transition::Switch(State::Idle)
    }
}

/// Hold still until healed past the injury threshold or until no medic is
/// committed to this unit any more.
pub(super) fn update_medic(ctx: &mut SimContext, id: UnitId) -> Transition {
    let Some(unit) = ctx.units.living(id) else {
        return Transition::Stay;
    };
    if unit.stats.hp > ctx.config.units.injured_report_hp {
        return Transition::Switch(State::Idle);
    }
    let medic_coming = ctx.units.team(unit.team).any(|u| {
        u.role == Role::Medic && u.id != id && u.assignment.heal_target == Some(id)
    });
    if medic_coming {
        Transition::Stay
    } else {
        tracing::debug!(unit = %id, "No medic assigned any more; stopping wait");
        Transition::Switch(State::Idle)
    }
}

pub(super) fn exit(ctx: &mut SimContext, id: UnitId) {
    if let Some(unit) = ctx.units.get_mut(id) {
        unit.in_cover = false;
    }
}
