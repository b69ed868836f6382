use super::{State, Transition};
use crate::context::SimContext;
use crate::math::GridPos;
use crate::units::UnitId;

/// Find a defensible cell near an anchor and settle there.
///
/// Defending is a decision point rather than a resting state: both `enter`
/// and `update` search for cover and hand over to a move (or to Idle when
/// already in place).
#[derive(Debug, Clone, PartialEq)]
pub struct Defending {
    anchor: GridPos,
    radius: i32,
    risk_threshold: f32,
}

impl Defending {
    /// Defend around `anchor`. A non-positive radius falls back to 6; the
    /// threshold is clamped to `[0, 1]`.
    #[must_use]
    pub fn new(anchor: GridPos, radius: i32, risk_threshold: f32) -> Self {
        Self {
            anchor,
            radius: if radius > 0 { radius } else { 6 },
            risk_threshold: risk_threshold.clamp(0.0, 1.0),
        }
    }

    /// Cell being defended.
    #[must_use]
    pub const fn anchor(&self) -> GridPos {
        self.anchor
    }

    pub(super) fn enter(&mut self, ctx: &mut SimContext, id: UnitId) -> Transition {
        self.settle(ctx, id)
    }

    pub(super) fn update(&mut self, ctx: &mut SimContext, id: UnitId) -> Transition {
        self.settle(ctx, id)
    }

    fn settle(&self, ctx: &SimContext, id: UnitId) -> Transition {
        let Some(pos) = ctx.units.living(id).map(|u| u.pos) else {
            return Transition::Stay;
        };
        let spot = ctx
            .view()
            .find_cover_near(self.anchor, self.radius, self.risk_threshold, Some(id));

        match spot {
            Some(cell) if pos.manhattan(cell) <= 1 => Transition::Switch(State::Idle),
            Some(cell) => Transition::Switch(State::move_to(cell, State::Idle, &ctx.config)),
            None if ctx.grid.in_bounds(self.anchor) && ctx.grid.at(self.anchor).is_walkable() => {
                Transition::Switch(State::move_to(self.anchor, State::Idle, &ctx.config))
            }
            None => Transition::Switch(State::Idle),
        }
    }
}
