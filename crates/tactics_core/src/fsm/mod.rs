//! Per-unit behaviour state machine.
//!
//! Every unit owns one [`StateMachine`] holding a [`State`], a closed enum
//! over the ten behaviours. A state's hooks receive the whole
//! [`SimContext`] and the id of the unit they drive, and answer with a
//! [`Transition`]. The machine applies transitions as
//! exit(old) → replace → enter(new); an `enter` hook may itself ask for a
//! further switch, which is followed immediately.
//!
//! While a unit's state runs, its machine is detached from the roster, so a
//! state may freely mutate any unit (its own included) through the context.
//!
//! ## Interruptibility
//!
//! | State               | Commander may interrupt |
//! |---------------------|-------------------------|
//! | `MovingToTarget`    | no                      |
//! | `RetreatingToCover` | no                      |
//! | `WaitingForMedic`   | no                      |
//! | everything else     | yes                     |

mod attacking;
mod defending;
mod idle;
mod moving;
mod refill;
mod retreat;
mod support;
mod waiting;

use std::fmt;

use serde::{Deserialize, Serialize};

pub use attacking::Attacking;
pub use defending::Defending;
pub use moving::MovingToTarget;
pub use refill::RefillAtDepot;
pub use support::{Healing, Supplying};

use crate::config::SimConfig;
use crate::context::SimContext;
use crate::math::GridPos;
use crate::units::{Role, Unit, UnitId};

/// Upper bound on switches followed during one change; guards against two
/// states that keep handing control to each other from `enter`.
const MAX_CHAINED_TRANSITIONS: usize = 16;

/// Discriminant of a [`State`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StateKind {
    /// Waiting for orders; autonomous units look for work.
    Idle,
    /// Walking a path, then switching to a follow-up state.
    MovingToTarget,
    /// Engaging an enemy.
    Attacking,
    /// Looking for a covered cell near an anchor.
    Defending,
    /// Medic walking to and healing a teammate.
    Healing,
    /// Supplier walking to and resupplying a teammate.
    Supplying,
    /// Support unit restocking at its depot.
    RefillAtDepot,
    /// Choosing a cover cell to fall back to.
    RetreatingToCover,
    /// In cover until ammunition and health recover.
    WaitingForSupport,
    /// In cover until a medic is done.
    WaitingForMedic,
}

impl StateKind {
    /// Whether a commander may override a unit in this state.
    #[must_use]
    pub const fn can_report(self) -> bool {
        !matches!(
            self,
            Self::MovingToTarget | Self::RetreatingToCover | Self::WaitingForMedic
        )
    }

    /// Short display name.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Idle => "Idle",
            Self::MovingToTarget => "MovingToTarget",
            Self::Attacking => "Attacking",
            Self::Defending => "Defending",
            Self::Healing => "Healing",
            Self::Supplying => "Supplying",
            Self::RefillAtDepot => "RefillAtDepot",
            Self::RetreatingToCover => "RetreatingToCover",
            Self::WaitingForSupport => "WaitingForSupport",
            Self::WaitingForMedic => "WaitingForMedic",
        }
    }
}

impl fmt::Display for StateKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// What a hook wants the machine to do next.
#[derive(Debug, Clone, PartialEq)]
#[must_use]
pub enum Transition {
    /// Keep the current state.
    Stay,
    /// Exit the current state and enter this one.
    Switch(State),
}

/// One behaviour and its private data.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum State {
    /// See [`StateKind::Idle`].
    #[default]
    Idle,
    /// See [`MovingToTarget`].
    MovingToTarget(MovingToTarget),
    /// See [`Attacking`].
    Attacking(Attacking),
    /// See [`Defending`].
    Defending(Defending),
    /// See [`Healing`].
    Healing(Healing),
    /// See [`Supplying`].
    Supplying(Supplying),
    /// See [`RefillAtDepot`].
    RefillAtDepot(RefillAtDepot),
    /// See [`StateKind::RetreatingToCover`].
    RetreatingToCover,
    /// See [`StateKind::WaitingForSupport`].
    WaitingForSupport,
    /// See [`StateKind::WaitingForMedic`].
    WaitingForMedic,
}

impl State {
    /// Walk to `target`, then become `on_arrival`.
    #[must_use]
    pub fn move_to(target: GridPos, on_arrival: Self, config: &SimConfig) -> Self {
        Self::MovingToTarget(MovingToTarget::new(
            target,
            on_arrival,
            config.movement.frames_per_step,
        ))
    }

    /// Engage around `target` with the configured weapon.
    #[must_use]
    pub fn attack(target: GridPos, config: &SimConfig) -> Self {
        Self::Attacking(Attacking::new(target, &config.combat))
    }

    /// Hold near `anchor` with the configured radius and risk ceiling.
    #[must_use]
    pub fn defend(anchor: GridPos, config: &SimConfig) -> Self {
        Self::Defending(Defending::new(
            anchor,
            config.movement.defend_radius,
            config.movement.defend_risk_threshold,
        ))
    }

    /// Discriminant.
    #[must_use]
    pub const fn kind(&self) -> StateKind {
        match self {
            Self::Idle => StateKind::Idle,
            Self::MovingToTarget(_) => StateKind::MovingToTarget,
            Self::Attacking(_) => StateKind::Attacking,
            Self::Defending(_) => StateKind::Defending,
            Self::Healing(_) => StateKind::Healing,
            Self::Supplying(_) => StateKind::Supplying,
            Self::RefillAtDepot(_) => StateKind::RefillAtDepot,
            Self::RetreatingToCover => StateKind::RetreatingToCover,
            Self::WaitingForSupport => StateKind::WaitingForSupport,
            Self::WaitingForMedic => StateKind::WaitingForMedic,
        }
    }

    /// Whether a commander may override this state.
    #[must_use]
    pub const fn can_report(&self) -> bool {
        self.kind().can_report()
    }

    fn enter(&mut self, ctx: &mut SimContext, id: UnitId) -> Transition {
        match self {
            Self::Idle => {
                idle::enter(ctx, id);
                Transition::Stay
            }
            Self::MovingToTarget(s) => s.enter(ctx, id),
            Self::Attacking(s) => s.enter(ctx, id),
            Self::Defending(s) => s.enter(ctx, id),
            Self::Healing(s) => s.enter(ctx, id),
            Self::Supplying(s) => s.enter(ctx, id),
            Self::RefillAtDepot(s) => s.enter(ctx, id),
            Self::RetreatingToCover => retreat::enter(ctx, id),
            Self::WaitingForSupport | Self::WaitingForMedic => waiting::enter(ctx, id),
        }
    }

    fn update(&mut self, ctx: &mut SimContext, id: UnitId) -> Transition {
        match self {
            Self::Idle => idle::update(ctx, id),
            Self::MovingToTarget(s) => s.update(ctx, id),
            Self::Attacking(s) => s.update(ctx, id),
            Self::Defending(s) => s.update(ctx, id),
            Self::Healing(s) => s.update(ctx, id),
            Self::Supplying(s) => s.update(ctx, id),
            Self::RefillAtDepot(s) => s.update(ctx, id),
            Self::RetreatingToCover => retreat::update(),
            Self::WaitingForSupport => waiting::update_support(ctx, id),
            Self::WaitingForMedic => waiting::update_medic(ctx, id),
        }
    }

    fn exit(&mut self, ctx: &mut SimContext, id: UnitId) {
        match self {
            Self::Idle => {}
            Self::MovingToTarget(s) => s.exit(ctx, id),
            Self::Attacking(_) => attacking::exit(ctx, id),
            Self::Defending(_) | Self::RetreatingToCover => stop_moving(ctx, id),
            Self::Healing(s) => s.exit(ctx, id),
            Self::Supplying(s) => s.exit(ctx, id),
            Self::RefillAtDepot(_) => stop_moving(ctx, id),
            Self::WaitingForSupport | Self::WaitingForMedic => waiting::exit(ctx, id),
        }
    }
}

/// A unit's behaviour driver.
#[derive(Debug, Clone, Default)]
pub struct StateMachine {
    current: State,
    transitions: u64,
}

impl StateMachine {
    /// The active state.
    #[must_use]
    pub const fn current(&self) -> &State {
        &self.current
    }

    /// Kind of the active state.
    #[must_use]
    pub const fn kind(&self) -> StateKind {
        self.current.kind()
    }

    /// Whether the active state accepts commander orders.
    #[must_use]
    pub const fn can_report(&self) -> bool {
        self.current.can_report()
    }

    /// Number of states entered since spawn.
    #[must_use]
    pub const fn transitions(&self) -> u64 {
        self.transitions
    }

    fn change(&mut self, ctx: &mut SimContext, id: UnitId, next: State) {
        let mut next = next;
        for _ in 0..MAX_CHAINED_TRANSITIONS {
            self.current.exit(ctx, id);
            let from = self.current.kind();
            self.current = next;
            self.transitions += 1;
            tracing::debug!(
                unit = %id,
                tick = ctx.frame,
                from = %from,
                to = %self.current.kind(),
                "State change"
            );
            match self.current.enter(ctx, id) {
                Transition::Stay => return,
                Transition::Switch(s) => next = s,
            }
        }

        tracing::warn!(unit = %id, "Transition chain did not settle; forcing Idle");
        self.current.exit(ctx, id);
        self.current = State::Idle;
        self.transitions += 1;
        idle::enter(ctx, id);
    }

    fn update(&mut self, ctx: &mut SimContext, id: UnitId) {
        if let Transition::Switch(next) = self.current.update(ctx, id) {
            self.change(ctx, id, next);
        }
    }
}

/// Replace the state of unit `id` with `next`, running exit and enter hooks.
///
/// Returns `false` if the unit is unknown or its machine is already running
/// further up the call stack.
pub fn change_state(ctx: &mut SimContext, id: UnitId, next: State) -> bool {
    let Some(mut fsm) = ctx.take_fsm(id) else {
        return false;
    };
    fsm.change(ctx, id, next);
    ctx.restore_fsm(id, fsm);
    true
}

/// Run one update of a living unit's state.
pub fn update_unit(ctx: &mut SimContext, id: UnitId) {
    if ctx.units.living(id).is_none() {
        return;
    }
    let Some(mut fsm) = ctx.take_fsm(id) else {
        return;
    };
    fsm.update(ctx, id);
    ctx.restore_fsm(id, fsm);
}

/// The state a support unit should enter to serve `target`: straight to
/// work when its stock is high enough, via its depot otherwise.
///
/// Commanders and warriors have nothing to give and stay idle.
#[must_use]
pub fn support_state(unit: &Unit, target: UnitId, config: &SimConfig) -> State {
    let stock = unit.stock.amount();
    match unit.role {
        Role::Medic if stock < config.units.medic.refill_threshold => {
            State::RefillAtDepot(RefillAtDepot::new(Role::Medic, Some(target)))
        }
        Role::Medic => State::Healing(Healing::new(target)),
        Role::Supplier if stock < config.units.supplier.refill_threshold => {
            State::RefillAtDepot(RefillAtDepot::new(Role::Supplier, Some(target)))
        }
        Role::Supplier => State::Supplying(Supplying::new(target)),
        Role::Commander | Role::Warrior => State::Idle,
    }
}

fn stop_moving(ctx: &mut SimContext, id: UnitId) {
    if let Some(unit) = ctx.units.get_mut(id) {
        unit.moving = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::{Grid, Playfield};
    use crate::units::Team;

    fn ctx() -> SimContext {
        let grid = Grid::from_rows(&["........"; 8], Playfield::open()).unwrap();
        SimContext::new(SimConfig::default(), grid)
    }

    #[test]
    fn test_interruptibility_table() {
        assert!(StateKind::Idle.can_report());
        assert!(StateKind::Attacking.can_report());
        assert!(StateKind::WaitingForSupport.can_report());
        assert!(!StateKind::MovingToTarget.can_report());
        assert!(!StateKind::RetreatingToCover.can_report());
        assert!(!StateKind::WaitingForMedic.can_report());
    }

    #[test]
    fn test_change_runs_exit_then_enter() {
        let mut c = ctx();
        let cfg = c.config.units.clone();
        let id = c.units.spawn(Team::Blue, Role::Warrior, GridPos::new(2, 2), &cfg);

        assert!(change_state(&mut c, id, State::WaitingForSupport));
        assert!(c.units.get(id).unwrap().in_cover);
        assert_eq!(c.units.get(id).unwrap().state_kind(), StateKind::WaitingForSupport);

        assert!(change_state(&mut c, id, State::Idle));
        let unit = c.units.get(id).unwrap();
        assert!(!unit.in_cover);
        assert_eq!(unit.transitions(), 2);
    }

    #[test]
    fn test_enter_can_chain_switches() {
        let mut c = ctx();
        let cfg = c.config.units.clone();
        let id = c.units.spawn(Team::Blue, Role::Warrior, GridPos::new(2, 2), &cfg);
        // Rock goals are unreachable, so the move collapses to Idle on enter.
        c.grid.set(GridPos::new(6, 6), crate::grid::CellKind::Rock);
        let next = State::move_to(GridPos::new(6, 6), State::WaitingForSupport, &c.config);

        assert!(change_state(&mut c, id, next));
        let unit = c.units.get(id).unwrap();
        assert_eq!(unit.state_kind(), StateKind::Idle);
        assert_eq!(unit.transitions(), 2);
        assert!(!unit.moving);
    }

    #[test]
    fn test_unknown_unit_is_ignored() {
        let mut c = ctx();
        let cfg = c.config.units.clone();
        let id = c.units.spawn(Team::Blue, Role::Warrior, GridPos::new(2, 2), &cfg);
        c.units.clear();
        assert!(!change_state(&mut c, id, State::Idle));
        update_unit(&mut c, id);
    }

    #[test]
    fn test_support_state_routes_through_depot() {
        let mut c = ctx();
        let cfg = c.config.units.clone();
        let medic = c.units.spawn(Team::Blue, Role::Medic, GridPos::new(0, 0), &cfg);
        let patient = c.units.spawn(Team::Blue, Role::Warrior, GridPos::new(0, 1), &cfg);

        let unit = c.units.get(medic).unwrap().clone();
        assert_eq!(support_state(&unit, patient, &c.config).kind(), StateKind::Healing);

        c.units.get_mut(medic).unwrap().stock.adjust(-100);
        let unit = c.units.get(medic).unwrap().clone();
        assert_eq!(
            support_state(&unit, patient, &c.config).kind(),
            StateKind::RefillAtDepot
        );
    }
}
