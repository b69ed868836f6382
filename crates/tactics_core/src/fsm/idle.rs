use super::{support_state, State, Transition};
use crate::context::SimContext;
use crate::units::{Role, UnitId};

/// Idle never hands over on enter; it only stops the unit.
pub(super) fn enter(ctx: &mut SimContext, id: UnitId) {
    if let Some(unit) = ctx.units.get_mut(id) {
        unit.moving = false;
    }
}

/// Commanded units wait for orders. Autonomous units look for work: warriors
/// fall back when badly hurt and otherwise engage, support units go to the
/// closest teammate that needs them.
pub(super) fn update(ctx: &mut SimContext, id: UnitId) -> Transition {
    let Some(me) = ctx.units.living(id) else {
        return Transition::Stay;
    };
    if !me.autonomous {
        return Transition::Stay;
    }
    let hp_max = ctx.config.units.hp_max;

    let next = match me.role {
        Role::Warrior if me.stats.hp < ctx.config.units.hp_critical => {
            Some(State::RetreatingToCover)
        }
        Role::Warrior => ctx
            .best_visible_enemy(me.pos, me.team)
            .map(|enemy| State::attack(enemy.pos, &ctx.config)),
        Role::Supplier => ctx
            .closest_teammate(id, |u| u.role == Role::Warrior && u.stats.ammo <= 0)
            .map(|target| support_state(me, target, &ctx.config)),
        Role::Medic => ctx
            .closest_teammate(id, |u| u.stats.hp < hp_max)
            .map(|target| support_state(me, target, &ctx.config)),
        Role::Commander => None,
    };

    match next {
        Some(state) => {
            tracing::debug!(unit = %id, next = %state.kind(), "Autonomous pick");
            Transition::Switch(state)
        }
        None => Transition::Stay,
    }
}
