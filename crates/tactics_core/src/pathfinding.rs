//! Grid pathfinding and tactical cell selection.
//!
//! All searches are four-connected. Paths are returned as the full cell
//! sequence from start to goal, start included; an empty path means the goal
//! is unreachable (or off-map, or not walkable). Callers must handle the
//! empty case by falling back to a safe state.
//!
//! Risk-aware queries go through a [`MapView`], which bundles terrain, the
//! risk field and current occupancy, and computes the risk normaliser once.

use std::cmp::Ordering;
use std::collections::{BinaryHeap, VecDeque};

use crate::grid::{CellKind, Grid};
use crate::math::GridPos;
use crate::security_map::SecurityMap;
use crate::units::{Unit, UnitId};
use crate::visibility::{explosive_cover_blocked, has_line_of_sight};

/// A walkable cell sequence, start first.
pub type Path = Vec<GridPos>;

/// Who is standing where.
pub trait Occupancy {
    /// Whether a living unit other than `ignore` stands on `pos`.
    fn is_occupied(&self, pos: GridPos, ignore: Option<UnitId>) -> bool;
}

/// Occupancy of an empty map.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOccupancy;

impl Occupancy for NoOccupancy {
    fn is_occupied(&self, _pos: GridPos, _ignore: Option<UnitId>) -> bool {
        false
    }
}

/// Whether a unit may stand on `kind`. Rock and water block; everything
/// else (trees and depots included) is walkable.
#[must_use]
pub const fn is_walkable(kind: CellKind) -> bool {
    kind.is_walkable()
}

/// A* risk weight for `unit`: wounded and burdened units avoid danger
/// harder.
#[must_use]
pub fn risk_weight_for_unit(unit: &Unit, base: f32, hp_max: i32) -> f32 {
    let hp_factor = 1.0 + (1.0 - unit.hp_norm(hp_max)) * 0.75;
    let carrying = if unit.carrying_objective { 1.25 } else { 1.0 };
    base * hp_factor * carrying
}

/// How [`MapView::path_risk_sample`] aggregates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RiskSample {
    /// Worst cell.
    Max,
    /// Average cell.
    Mean,
}

/// Unweighted shortest path.
///
/// Returns an empty path if either end is off-map, the goal is not
/// walkable, or the goal cannot be reached.
#[must_use]
pub fn bfs_find_path(grid: &Grid, start: GridPos, goal: GridPos) -> Path {
    if !grid.in_bounds(start) || !grid.in_bounds(goal) || !grid.at(goal).is_walkable() {
        return Path::new();
    }

    let n = grid.size() as usize;
    let idx = |p: GridPos| p.row as usize * n + p.col as usize;
    let mut parent: Vec<Option<GridPos>> = vec![None; n * n];
    let mut visited = vec![false; n * n];
    let mut queue = VecDeque::new();

    visited[idx(start)] = true;
    queue.push_back(start);

    while let Some(cur) = queue.pop_front() {
        if cur == goal {
            break;
        }
        for next in cur.neighbors4() {
            if !grid.in_bounds(next) || visited[idx(next)] || !grid.at(next).is_walkable() {
                continue;
            }
            visited[idx(next)] = true;
            parent[idx(next)] = Some(cur);
            queue.push_back(next);
        }
    }

    reconstruct_path(&parent, n, start, goal)
}

/// A node in the A* open set.
#[derive(Debug, Clone, Copy)]
struct AStarNode {
    pos: GridPos,
    f_score: f32,
    /// Deterministic ordering when f-scores tie.
    tie_breaker: u64,
}

impl PartialEq for AStarNode {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for AStarNode {}

impl Ord for AStarNode {
    fn cmp(&self, other: &Self) -> Ordering {
        // BinaryHeap is a max-heap; reverse for lowest f first.
        match other.f_score.total_cmp(&self.f_score) {
            Ordering::Equal => other.tie_breaker.cmp(&self.tie_breaker),
            ord => ord,
        }
    }
}

impl PartialOrd for AStarNode {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

#[inline]
fn coords_to_tie_breaker(pos: GridPos) -> u64 {
    ((pos.row as u32 as u64) << 32) | u64::from(pos.col as u32)
}

fn reconstruct_path(parent: &[Option<GridPos>], n: usize, start: GridPos, goal: GridPos) -> Path {
    if goal == start {
        return vec![start];
    }
    let idx = |p: GridPos| p.row as usize * n + p.col as usize;
    let mut path = vec![goal];
    let mut cur = goal;
    while cur != start {
        match parent[idx(cur)] {
            Some(prev) => {
                path.push(prev);
                cur = prev;
            }
            None => return Path::new(),
        }
    }
    path.reverse();
    path
}

/// Read-only tactical view of the map for one query burst.
#[derive(Clone, Copy)]
pub struct MapView<'a> {
    /// Terrain.
    pub grid: &'a Grid,
    /// Risk field.
    pub risk: &'a SecurityMap,
    /// Unit positions.
    pub occupancy: &'a dyn Occupancy,
    max_risk: f32,
}

impl std::fmt::Debug for MapView<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MapView")
            .field("size", &self.grid.size())
            .field("max_risk", &self.max_risk)
            .finish_non_exhaustive()
    }
}

impl<'a> MapView<'a> {
    /// Bundle the inputs. Scans the risk field once for its maximum.
    #[must_use]
    pub fn new(grid: &'a Grid, risk: &'a SecurityMap, occupancy: &'a dyn Occupancy) -> Self {
        Self {
            grid,
            risk,
            occupancy,
            max_risk: risk.max_value().max(1e-4),
        }
    }

    /// The normaliser used by every risk query on this view.
    #[must_use]
    pub const fn max_risk(&self) -> f32 {
        self.max_risk
    }

    /// Risk at `pos` divided by the field maximum, clamped to `[0, 1]`.
    /// Off-map cells count as fully dangerous.
    #[must_use]
    pub fn risk_norm(&self, pos: GridPos) -> f32 {
        if !self.grid.in_bounds(pos) {
            return 1.0;
        }
        let v = self.risk.at(pos);
        if v <= 0.0 {
            0.0
        } else {
            (v / self.max_risk).min(1.0)
        }
    }

    /// Whether `pos` is on the map, walkable and free of other units.
    #[must_use]
    pub fn is_free(&self, pos: GridPos, mover: Option<UnitId>) -> bool {
        self.grid.in_bounds(pos)
            && self.grid.at(pos).is_walkable()
            && !self.occupancy.is_occupied(pos, mover)
    }

    /// Risk-weighted A*.
    ///
    /// Entering a cell costs `1 + risk_weight * risk_norm`, plus
    /// `occupancy_penalty` if a living unit other than `mover` stands there.
    /// The Manhattan heuristic stays admissible because every step costs at
    /// least one.
    #[must_use]
    pub fn astar(
        &self,
        mover: Option<UnitId>,
        start: GridPos,
        goal: GridPos,
        risk_weight: f32,
        occupancy_penalty: f32,
    ) -> Path {
        let grid = self.grid;
        if !grid.in_bounds(start) || !grid.in_bounds(goal) || !grid.at(goal).is_walkable() {
            return Path::new();
        }

        let n = grid.size() as usize;
        let idx = |p: GridPos| p.row as usize * n + p.col as usize;
        let mut g_score = vec![f32::INFINITY; n * n];
        let mut parent: Vec<Option<GridPos>> = vec![None; n * n];
        let mut closed = vec![false; n * n];
        let mut open = BinaryHeap::new();

        g_score[idx(start)] = 0.0;
        open.push(AStarNode {
            pos: start,
            f_score: start.manhattan(goal) as f32,
            tie_breaker: coords_to_tie_breaker(start),
        });

        while let Some(current) = open.pop() {
            let ci = idx(current.pos);
            if closed[ci] {
                continue;
            }
            closed[ci] = true;
            if current.pos == goal {
                break;
            }

            for next in current.pos.neighbors4() {
                if !grid.in_bounds(next) || closed[idx(next)] || !grid.at(next).is_walkable() {
                    continue;
                }
                let mut step = 1.0 + risk_weight * self.risk_norm(next);
                if self.occupancy.is_occupied(next, mover) {
                    step += occupancy_penalty;
                }
                let tentative = g_score[ci] + step;
                let ni = idx(next);
                if tentative < g_score[ni] {
                    g_score[ni] = tentative;
                    parent[ni] = Some(current.pos);
                    open.push(AStarNode {
                        pos: next,
                        f_score: tentative + next.manhattan(goal) as f32,
                        tie_breaker: coords_to_tie_breaker(next),
                    });
                }
            }
        }

        reconstruct_path(&parent, n, start, goal)
    }

    /// Best cell to hold near `anchor`.
    ///
    /// Scans the disc of `radius` (at least 1) for in-playfield, walkable,
    /// unoccupied cells and minimises raw risk, minus `cover_bonus` when
    /// explosive-blocking terrain stands between `anchor` and the cell, plus
    /// a small pull toward `self_pos`.
    #[must_use]
    pub fn pick_best_defend_cell(
        &self,
        anchor: GridPos,
        radius: i32,
        self_pos: GridPos,
        mover: Option<UnitId>,
        cover_bonus: f32,
    ) -> Option<GridPos> {
        let r = radius.max(1);
        let mut best: Option<(f32, GridPos)> = None;
        for dr in -r..=r {
            for dc in -r..=r {
                if dr * dr + dc * dc > r * r {
                    continue;
                }
                let cell = anchor.offset(dr, dc);
                if !self.grid.in_playfield(cell) || !self.is_free(cell, mover) {
                    continue;
                }
                let cover = if explosive_cover_blocked(self.grid, anchor, cell) {
                    -cover_bonus
                } else {
                    0.0
                };
                let score = self.risk.at(cell) + cover + cell.manhattan(self_pos) as f32 * 0.01;
                if best.map_or(true, |(s, _)| score < s) {
                    best = Some((score, cell));
                }
            }
        }
        best.map(|(_, cell)| cell)
    }

    /// Firing position for an attack on `target`.
    ///
    /// Scans a square window of `search_radius` around the target for
    /// walkable cells within Manhattan `range` of it that can see it, and
    /// minimises `risk_norm + dist_weight * distance_from_agent`.
    #[must_use]
    pub fn pick_vantage_point(
        &self,
        agent: GridPos,
        target: GridPos,
        range: i32,
        dist_weight: f32,
        search_radius: i32,
    ) -> Option<GridPos> {
        let n = self.grid.size();
        let r0 = (target.row - search_radius).max(0);
        let r1 = (target.row + search_radius).min(n - 1);
        let c0 = (target.col - search_radius).max(0);
        let c1 = (target.col + search_radius).min(n - 1);

        let mut best: Option<(f32, GridPos)> = None;
        for r in r0..=r1 {
            for c in c0..=c1 {
                let cell = GridPos::new(r, c);
                if !self.grid.at(cell).is_walkable() || cell.manhattan(target) > range {
                    continue;
                }
                if !has_line_of_sight(self.grid, cell, target) {
                    continue;
                }
                let score =
                    self.risk.at(cell) / self.max_risk + dist_weight * cell.manhattan(agent) as f32;
                if best.map_or(true, |(s, _)| score < s) {
                    best = Some((score, cell));
                }
            }
        }
        best.map(|(_, cell)| cell)
    }

    /// One step toward lower risk.
    ///
    /// Prefers the 4-neighbour with the largest risk drop of at least
    /// `min_drop`. Otherwise finds the best such cell within a square of
    /// `radius` and returns the first neighbour that gets closer to it.
    #[must_use]
    pub fn find_local_cover_step(
        &self,
        from: GridPos,
        radius: i32,
        min_drop: f32,
    ) -> Option<GridPos> {
        if !self.grid.in_bounds(from) {
            return None;
        }
        let here = self.risk_norm(from);
        let walkable = |p: GridPos| self.grid.in_bounds(p) && self.grid.at(p).is_walkable();

        let mut best_drop = 0.0;
        let mut best = None;
        for next in from.neighbors4() {
            if !walkable(next) {
                continue;
            }
            let drop = here - self.risk_norm(next);
            if drop >= min_drop && drop > best_drop {
                best_drop = drop;
                best = Some(next);
            }
        }
        if best.is_some() {
            return best;
        }

        let n = self.grid.size();
        let mut target = None;
        let mut target_drop = 0.0;
        for r in (from.row - radius).max(0)..=(from.row + radius).min(n - 1) {
            for c in (from.col - radius).max(0)..=(from.col + radius).min(n - 1) {
                let cell = GridPos::new(r, c);
                if !walkable(cell) {
                    continue;
                }
                let drop = here - self.risk_norm(cell);
                if drop >= min_drop && drop > target_drop {
                    target_drop = drop;
                    target = Some(cell);
                }
            }
        }
        let target = target?;

        let mut best_d = from.manhattan(target);
        let mut step = None;
        for next in from.neighbors4() {
            if !walkable(next) {
                continue;
            }
            let d = next.manhattan(target);
            if d < best_d {
                best_d = d;
                step = Some(next);
            }
        }
        step
    }

    /// Normalised risk over the first `len` cells of `path`.
    #[must_use]
    pub fn path_risk_sample(&self, path: &[GridPos], len: usize, mode: RiskSample) -> f32 {
        let sample = &path[..len.min(path.len())];
        if sample.is_empty() {
            return 0.0;
        }
        let values = sample.iter().map(|&p| self.risk_norm(p));
        match mode {
            RiskSample::Max => values.fold(0.0, f32::max),
            RiskSample::Mean => values.sum::<f32>() / sample.len() as f32,
        }
    }

    /// Nearest defensible cell around `anchor`, by breadth-first ring
    /// expansion up to Manhattan `radius`.
    ///
    /// A defensible cell is walkable, free of other units, no riskier than
    /// `risk_threshold` (normalised) and 4-adjacent to rock or trees. The
    /// anchor itself is checked first.
    #[must_use]
    pub fn find_cover_near(
        &self,
        anchor: GridPos,
        radius: i32,
        risk_threshold: f32,
        mover: Option<UnitId>,
    ) -> Option<GridPos> {
        if !self.grid.in_bounds(anchor) {
            return None;
        }
        let is_cover = |p: GridPos| {
            self.is_free(p, mover)
                && self.risk_norm(p) <= risk_threshold
                && p.neighbors4()
                    .iter()
                    .any(|&n| self.grid.in_bounds(n) && self.grid.at(n).is_cover())
        };
        if is_cover(anchor) {
            return Some(anchor);
        }

        let n = self.grid.size() as usize;
        let mut visited = vec![false; n * n];
        let idx = |p: GridPos| p.row as usize * n + p.col as usize;
        let mut queue = VecDeque::new();
        visited[idx(anchor)] = true;
        queue.push_back((anchor, 0));

        while let Some((cur, depth)) = queue.pop_front() {
            if depth >= radius {
                continue;
            }
            for next in cur.neighbors4() {
                if !self.grid.in_bounds(next) || visited[idx(next)] {
                    continue;
                }
                visited[idx(next)] = true;
                if next.manhattan(anchor) > radius {
                    continue;
                }
                if is_cover(next) {
                    return Some(next);
                }
                queue.push_back((next, depth + 1));
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::Playfield;

    fn grid(rows: &[&str]) -> Grid {
        Grid::from_rows(rows, Playfield::open()).unwrap()
    }

    struct At(Vec<GridPos>);

    impl Occupancy for At {
        fn is_occupied(&self, pos: GridPos, _ignore: Option<UnitId>) -> bool {
            self.0.contains(&pos)
        }
    }

    fn is_valid_path(grid: &Grid, path: &[GridPos]) -> bool {
        path.windows(2).all(|w| w[0].manhattan(w[1]) == 1)
            && path.iter().all(|&p| grid.at(p).is_walkable())
    }

    #[test]
    fn test_bfs_around_wall() {
        let g = grid(&[
            ".....", //
            ".###.", //
            "...#.", //
            ".#.#.", //
            ".....",
        ]);
        let path = bfs_find_path(&g, GridPos::new(2, 2), GridPos::new(2, 4));
        assert_eq!(path.first(), Some(&GridPos::new(2, 2)));
        assert_eq!(path.last(), Some(&GridPos::new(2, 4)));
        assert!(is_valid_path(&g, &path));
        assert_eq!(path.len(), 7);
    }

    #[test]
    fn test_unreachable_and_blocked_goal() {
        let g = grid(&["..#..", "..#..", "..#..", "..#..", "..#.."]);
        assert!(bfs_find_path(&g, GridPos::new(0, 0), GridPos::new(0, 4)).is_empty());
        assert!(bfs_find_path(&g, GridPos::new(0, 0), GridPos::new(0, 2)).is_empty());
        assert!(bfs_find_path(&g, GridPos::new(0, 0), GridPos::new(9, 9)).is_empty());

        let risk = SecurityMap::new(5);
        let view = MapView::new(&g, &risk, &NoOccupancy);
        assert!(view.astar(None, GridPos::new(0, 0), GridPos::new(0, 4), 5.5, 25.0).is_empty());
    }

    #[test]
    fn test_start_equals_goal() {
        let g = grid(&["...", "...", "..."]);
        let p = GridPos::new(1, 1);
        assert_eq!(bfs_find_path(&g, p, p), vec![p]);
        let risk = SecurityMap::new(3);
        let view = MapView::new(&g, &risk, &NoOccupancy);
        assert_eq!(view.astar(None, p, p, 5.5, 25.0), vec![p]);
    }

    #[test]
    fn test_astar_avoids_risk() {
        let g = grid(&[".....", ".....", ".....", ".....", "....."]);
        let mut risk = SecurityMap::new(5);
        for c in 1..4 {
            risk.set(GridPos::new(2, c), 1.0);
        }
        let view = MapView::new(&g, &risk, &NoOccupancy);
        let start = GridPos::new(2, 0);
        let goal = GridPos::new(2, 4);

        let careless = view.astar(None, start, goal, 0.0, 25.0);
        assert_eq!(careless.len(), 5);

        let careful = view.astar(None, start, goal, 10.0, 25.0);
        assert!(is_valid_path(&g, &careful));
        assert!(careful.iter().all(|p| risk.at(*p) == 0.0));
        assert!(careful.len() > careless.len());
    }

    #[test]
    fn test_astar_routes_around_occupied_cell() {
        let g = grid(&["...", "...", "..."]);
        let risk = SecurityMap::new(3);
        let occupied = At(vec![GridPos::new(1, 1)]);
        let view = MapView::new(&g, &risk, &occupied);
        let path = view.astar(None, GridPos::new(1, 0), GridPos::new(1, 2), 0.0, 25.0);
        assert_eq!(path.len(), 5);
        assert!(!path.contains(&GridPos::new(1, 1)));
    }

    #[test]
    fn test_risk_weight_for_unit() {
        use crate::config::UnitConfig;
        use crate::units::{Role, Team, UnitArena};

        let mut arena = UnitArena::new();
        let id = arena.spawn(Team::Blue, Role::Warrior, GridPos::new(0, 0), &UnitConfig::default());
        let unit = arena.get_mut(id).unwrap();
        assert!((risk_weight_for_unit(unit, 5.5, 100) - 5.5).abs() < 1e-5);

        unit.stats.hp = 0;
        unit.carrying_objective = true;
        let w = risk_weight_for_unit(unit, 5.5, 100);
        assert!((w - 5.5 * 1.75 * 1.25).abs() < 1e-4);
    }

    #[test]
    fn test_vantage_point_needs_sight() {
        let g = grid(&[
            ".......", //
            ".......", //
            "...#...", //
            "...#...", //
            "...#...", //
            ".......", //
            ".......",
        ]);
        let risk = SecurityMap::new(7);
        let view = MapView::new(&g, &risk, &NoOccupancy);
        let agent = GridPos::new(3, 0);
        let target = GridPos::new(3, 6);
        let spot = view.pick_vantage_point(agent, target, 4, 0.15, 10).unwrap();
        assert!(has_line_of_sight(&g, spot, target));
        assert!(spot.manhattan(target) <= 4);
    }

    #[test]
    fn test_defend_cell_prefers_cover() {
        let g = grid(&[
            ".......", //
            ".......", //
            ".......", //
            "...T...", //
            ".......", //
            ".......", //
            ".......",
        ]);
        let risk = SecurityMap::new(7);
        let anchor = GridPos::new(3, 1);
        let view = MapView::new(&g, &risk, &NoOccupancy);
        let cell = view
            .pick_best_defend_cell(anchor, 3, GridPos::new(3, 4), None, 0.25)
            .unwrap();
        assert!(explosive_cover_blocked(&g, anchor, cell));
    }

    #[test]
    fn test_local_cover_step() {
        let g = grid(&[".....", ".....", ".....", ".....", "....."]);
        let mut risk = SecurityMap::new(5);
        risk.fill(1.0);
        risk.set(GridPos::new(2, 3), 0.0);
        let view = MapView::new(&g, &risk, &NoOccupancy);
        assert_eq!(
            view.find_local_cover_step(GridPos::new(2, 2), 2, 0.22),
            Some(GridPos::new(2, 3))
        );

        let mut risk = SecurityMap::new(5);
        risk.fill(1.0);
        risk.set(GridPos::new(0, 4), 0.0);
        let view = MapView::new(&g, &risk, &NoOccupancy);
        let step = view.find_local_cover_step(GridPos::new(2, 2), 2, 0.22).unwrap();
        assert_eq!(step.manhattan(GridPos::new(0, 4)), 3);

        let mut flat = SecurityMap::new(5);
        flat.fill(1.0);
        let view = MapView::new(&g, &flat, &NoOccupancy);
        assert_eq!(view.find_local_cover_step(GridPos::new(2, 2), 2, 0.22), None);
    }

    #[test]
    fn test_path_risk_sample() {
        let g = grid(&["....", "....", "....", "...."]);
        let mut risk = SecurityMap::new(4);
        risk.set(GridPos::new(0, 1), 2.0);
        risk.set(GridPos::new(0, 3), 1.0);
        let view = MapView::new(&g, &risk, &NoOccupancy);
        let path: Vec<_> = (0..4).map(|c| GridPos::new(0, c)).collect();
        assert!((view.path_risk_sample(&path, 8, RiskSample::Max) - 1.0).abs() < 1e-6);
        assert!((view.path_risk_sample(&path, 8, RiskSample::Mean) - 0.375).abs() < 1e-6);
        assert!((view.path_risk_sample(&path, 1, RiskSample::Max)).abs() < 1e-6);
        assert_eq!(view.path_risk_sample(&[], 8, RiskSample::Max), 0.0);
    }

    #[test]
    fn test_cover_near_anchor_needs_blocking_neighbor() {
        let g = grid(&[
            ".......", //
            ".......", //
            ".......", //
            ".......", //
            ".....T.", //
            ".......", //
            ".......",
        ]);
        let risk = SecurityMap::new(7);
        let view = MapView::new(&g, &risk, &NoOccupancy);
        let anchor = GridPos::new(2, 2);
        assert_eq!(view.find_cover_near(anchor, 2, 0.25, None), None);
        let cell = view.find_cover_near(anchor, 4, 0.25, None).unwrap();
        assert!(cell.neighbors4().contains(&GridPos::new(4, 5)));
        assert!(cell.manhattan(anchor) <= 4);

        let occupied = At(vec![cell]);
        let view = MapView::new(&g, &risk, &occupied);
        assert_ne!(view.find_cover_near(anchor, 4, 0.25, None), Some(cell));
    }
}
