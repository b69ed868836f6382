//! Falling back to cover.
//!
//! On enter the unit scores every free cell within `retreat_radius` of it.
//! Cells touching rock are preferred and ranked by risk, distance and
//! whether the nearest enemy can see them; open cells are a fallback ranked
//! by risk, distance and distance from the enemy. The first reachable
//! candidate wins and the unit walks there, then waits for support. With
//! nothing reachable it waits in place.

use std::cmp::Ordering;

use super::{State, Transition};
use crate::context::SimContext;
use crate::grid::CellKind;
use crate::math::GridPos;
use crate::units::UnitId;
use crate::visibility::has_line_of_sight;

#[derive(Debug, Clone, Copy)]
struct Candidate {
    pos: GridPos,
    score: f32,
}

fn by_score(a: &Candidate, b: &Candidate) -> Ordering {
    a.score
        .total_cmp(&b.score)
        .then_with(|| (a.pos.row, a.pos.col).cmp(&(b.pos.row, b.pos.col)))
}

pub(super) fn enter(ctx: &mut SimContext, id: UnitId) -> Transition {
    let Some(me) = ctx.units.living(id) else {
        return Transition::Stay;
    };
    let (pos, team) = (me.pos, me.team);
    let radius = ctx.config.movement.retreat_radius.max(1);
    let r = radius as f32;
    let enemy = ctx.nearest_enemy(pos, team).map(|e| e.pos);

    let view = ctx.view();
    let mut covered = Vec::new();
    let mut open = Vec::new();
    for dr in -radius..=radius {
        for dc in -radius..=radius {
            let cell = pos.offset(dr, dc);
            if pos.dist2(cell) > radius * radius || !view.is_free(cell, Some(id)) {
                continue;
            }
            let risk = view.risk_norm(cell);
            let dist = (pos.dist2(cell) as f32).sqrt();
            let by_rock = cell
                .neighbors8()
                .iter()
                .any(|&n| ctx.grid.get(n) == Some(CellKind::Rock));

            if by_rock {
                let exposed = enemy.is_some_and(|e| has_line_of_sight(&ctx.grid, e, cell));
                let score = risk * 1.5 + dist / r + if exposed { 2.0 } else { 0.0 };
                covered.push(Candidate { pos: cell, score });
            } else {
                let away = enemy.map_or(0.0, |e| (e.dist2(cell) as f32).sqrt());
                let score = risk * 2.0 + dist / r * 0.5 - away / (2.0 * r) * 1.5;
                open.push(Candidate { pos: cell, score });
            }
        }
    }
    covered.sort_by(by_score);
    open.sort_by(by_score);

    for candidate in covered.iter().chain(open.iter()) {
        if !ctx.plan_path(id, candidate.pos).is_empty() {
            tracing::debug!(
                unit = %id,
                cover = %candidate.pos,
                score = candidate.score,
                "Retreating to cover"
            );
            return Transition::Switch(State::move_to(
                candidate.pos,
                State::WaitingForSupport,
                &ctx.config,
            ));
        }
    }

    tracing::debug!(unit = %id, "No reachable cover; holding position");
    Transition::Switch(State::WaitingForSupport)
}

/// Retreat only lives for the duration of its `enter`; if it is ever
/// updated it hands over to waiting.
pub(super) fn update() -> Transition {
    Transition::Switch(State::WaitingForSupport)
}
