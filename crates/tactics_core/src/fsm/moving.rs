use super::{State, Transition};
use crate::context::SimContext;
use crate::events::{EventKind, Message};
use crate::math::GridPos;
use crate::pathfinding::RiskSample;
use crate::units::UnitId;

/// Walk a risk-aware path to `target`, one cell every `frames_per_step`
/// ticks, then hand over to the arrival state.
///
/// The path is planned on enter. Before each step the next cell is
/// checked: an illegal or occupied cell, or a path head whose sampled risk
/// reaches the replan threshold, triggers a fresh plan. Arriving next to an
/// occupied goal counts as arrival. An empty plan collapses to Idle.
#[derive(Debug, Clone, PartialEq)]
pub struct MovingToTarget {
    target: GridPos,
    on_arrival: Box<State>,
    frames_per_step: u32,
    step_counter: u32,
}

impl MovingToTarget {
    /// Move to `target`, then enter `on_arrival`.
    #[must_use]
    pub fn new(target: GridPos, on_arrival: State, frames_per_step: u32) -> Self {
        Self {
            target,
            on_arrival: Box::new(on_arrival),
            frames_per_step: frames_per_step.max(1),
            step_counter: 0,
        }
    }

    /// Goal cell.
    #[must_use]
    pub const fn target(&self) -> GridPos {
        self.target
    }

    /// State entered on arrival.
    #[must_use]
    pub fn on_arrival(&self) -> &State {
        &self.on_arrival
    }

    pub(super) fn enter(&mut self, ctx: &mut SimContext, id: UnitId) -> Transition {
        self.step_counter = 0;
        let path = ctx.plan_path(id, self.target);
        let Some(unit) = ctx.units.get_mut(id) else {
            return Transition::Stay;
        };
        unit.moving = true;
        if path.is_empty() {
            unit.path.clear();
            tracing::debug!(unit = %id, target = %self.target, "No path to move target");
            return Transition::Switch(State::Idle);
        }
        unit.path = path;
        Transition::Stay
    }

    pub(super) fn update(&mut self, ctx: &mut SimContext, id: UnitId) -> Transition {
        let Some(unit) = ctx.units.living(id) else {
            return Transition::Stay;
        };
        if unit.path.len() <= 1 {
            return self.arrive(ctx, id);
        }

        self.step_counter += 1;
        if self.step_counter < self.frames_per_step {
            return Transition::Stay;
        }
        self.step_counter = 0;

        let pos = unit.pos;
        let mut next = unit.path[1];
        let movement = &ctx.config.movement;
        let view = ctx.view();

        let needs_replan = if !is_legal_step(ctx, next) {
            true
        } else if view.occupancy.is_occupied(next, Some(id)) {
            if next == self.target && pos.manhattan(self.target) == 1 {
                return self.arrive(ctx, id);
            }
            true
        } else {
            view.path_risk_sample(&unit.path, movement.path_risk_sample_len, RiskSample::Max)
                >= movement.replan_risk_delta
        };

        if needs_replan {
            let path = ctx.plan_path(id, self.target);
            let Some(unit) = ctx.units.get_mut(id) else {
                return Transition::Stay;
            };
            if path.is_empty() {
                unit.path.clear();
                tracing::debug!(unit = %id, target = %self.target, "Replan failed");
                return Transition::Switch(State::Idle);
            }
            let step = path.get(1).copied();
            unit.path = path;
            let Some(step) = step else {
                return Transition::Stay;
            };
            if !is_legal_step(ctx, step) || ctx.view().occupancy.is_occupied(step, Some(id)) {
                return Transition::Stay;
            }
            next = step;
        }

        if let Some(unit) = ctx.units.get_mut(id) {
            unit.pos = next;
            if !unit.path.is_empty() {
                unit.path.remove(0);
            }
        }
        Transition::Stay
    }

    pub(super) fn exit(&mut self, ctx: &mut SimContext, id: UnitId) {
        if let Some(unit) = ctx.units.get_mut(id) {
            unit.moving = false;
            unit.path.clear();
        }
    }

    fn arrive(&mut self, ctx: &mut SimContext, id: UnitId) -> Transition {
        if let Some(unit) = ctx.units.living(id) {
            let msg = Message::report(EventKind::ReachedTarget, id, unit.pos, 0);
            ctx.publish(msg);
        }
        Transition::Switch(std::mem::take(&mut *self.on_arrival))
    }
}

fn is_legal_step(ctx: &SimContext, pos: GridPos) -> bool {
    ctx.grid.in_bounds(pos) && ctx.grid.at(pos).is_walkable()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SimConfig;
    use crate::fsm::{change_state, update_unit, StateKind};
    use crate::grid::{Grid, Playfield};
    use crate::units::{Role, Team};

    fn ctx(rows: &[&str]) -> SimContext {
        let grid = Grid::from_rows(rows, Playfield::open()).unwrap();
        let mut config = SimConfig::default();
        config.movement.frames_per_step = 1;
        let mut ctx = SimContext::new(config, grid);
        ctx.risk.clear();
        ctx
    }

    #[test]
    fn test_walks_to_target_then_arrives() {
        let mut c = ctx(&["......"; 6]);
        let cfg = c.config.units.clone();
        let id = c.units.spawn(Team::Blue, Role::Warrior, GridPos::new(0, 0), &cfg);
        let next = State::move_to(GridPos::new(0, 3), State::WaitingForSupport, &c.config);
        change_state(&mut c, id, next);
        assert!(c.units.get(id).unwrap().moving);

        for _ in 0..3 {
            update_unit(&mut c, id);
        }
        assert_eq!(c.units.get(id).unwrap().pos, GridPos::new(0, 3));
        update_unit(&mut c, id);

        let unit = c.units.get(id).unwrap();
        assert_eq!(unit.state_kind(), StateKind::WaitingForSupport);
        assert!(!unit.moving);
        assert!(unit.path.is_empty());
    }

    #[test]
    fn test_frames_per_step_paces_movement() {
        let mut c = ctx(&["......"; 6]);
        let cfg = c.config.units.clone();
        let id = c.units.spawn(Team::Blue, Role::Warrior, GridPos::new(0, 0), &cfg);
        let next = State::MovingToTarget(MovingToTarget::new(GridPos::new(0, 5), State::Idle, 3));
        change_state(&mut c, id, next);

        update_unit(&mut c, id);
        update_unit(&mut c, id);
        assert_eq!(c.units.get(id).unwrap().pos, GridPos::new(0, 0));
        update_unit(&mut c, id);
        assert_eq!(c.units.get(id).unwrap().pos, GridPos::new(0, 1));
    }

    #[test]
    fn test_occupied_goal_adjacent_counts_as_arrival() {
        let mut c = ctx(&["......"; 6]);
        let cfg = c.config.units.clone();
        let id = c.units.spawn(Team::Blue, Role::Warrior, GridPos::new(0, 0), &cfg);
        let next = State::move_to(GridPos::new(0, 2), State::WaitingForSupport, &c.config);
        change_state(&mut c, id, next);
        update_unit(&mut c, id);
        assert_eq!(c.units.get(id).unwrap().pos, GridPos::new(0, 1));

        c.units.spawn(Team::Orange, Role::Warrior, GridPos::new(0, 2), &cfg);
        update_unit(&mut c, id);
        let unit = c.units.get(id).unwrap();
        assert_eq!(unit.pos, GridPos::new(0, 1));
        assert_eq!(unit.state_kind(), StateKind::WaitingForSupport);
    }

    #[test]
    fn test_blocked_step_replans_around() {
        let mut c = ctx(&["......"; 6]);
        let cfg = c.config.units.clone();
        let id = c.units.spawn(Team::Blue, Role::Warrior, GridPos::new(0, 0), &cfg);
        let next = State::move_to(GridPos::new(0, 4), State::Idle, &c.config);
        change_state(&mut c, id, next);

        c.grid.set(GridPos::new(0, 1), crate::grid::CellKind::Rock);
        update_unit(&mut c, id);
        let unit = c.units.get(id).unwrap();
        assert_eq!(unit.pos, GridPos::new(1, 0));
        assert_eq!(unit.state_kind(), StateKind::MovingToTarget);
    }

    #[test]
    fn test_walled_off_target_collapses_to_idle() {
        let mut c = ctx(&["......"; 6]);
        let cfg = c.config.units.clone();
        let id = c.units.spawn(Team::Blue, Role::Warrior, GridPos::new(0, 0), &cfg);
        let next = State::move_to(GridPos::new(0, 4), State::WaitingForSupport, &c.config);
        change_state(&mut c, id, next);

        for r in 0..6 {
            c.grid.set(GridPos::new(r, 2), crate::grid::CellKind::Water);
        }
        // The first step is still legal; the second runs into the water.
        update_unit(&mut c, id);
        assert_eq!(c.units.get(id).unwrap().pos, GridPos::new(0, 1));
        update_unit(&mut c, id);
        assert_eq!(c.units.get(id).unwrap().state_kind(), StateKind::Idle);
    }

    #[test]
    fn test_risk_spike_on_path_replans() {
        let mut c = ctx(&["........"; 8]);
        c.config.movement.astar_risk_weight = 50.0;
        let cfg = c.config.units.clone();
        let start = GridPos::new(0, 0);
        let id = c.units.spawn(Team::Blue, Role::Warrior, start, &cfg);
        let next = State::move_to(GridPos::new(0, 6), State::Idle, &c.config);
        change_state(&mut c, id, next);

        let planned = c.units.get(id).unwrap().path.clone();
        assert!(planned.len() > 4);
        let hot: Vec<GridPos> = planned[1..=3].to_vec();
        for &cell in &hot {
            c.risk.set(cell, 1.0);
        }

        update_unit(&mut c, id);
        let unit = c.units.get(id).unwrap();
        assert_eq!(unit.state_kind(), StateKind::MovingToTarget);
        assert_eq!(unit.pos.manhattan(start), 1);
        assert!(!hot.contains(&unit.pos));
        assert!(unit.path.iter().all(|cell| !hot.contains(cell)));
        assert_eq!(unit.path.last(), Some(&GridPos::new(0, 6)));
    }
}
