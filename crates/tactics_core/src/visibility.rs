//! Line of sight and per-team visibility masks.
//!
//! Only rock blocks sight. Trees, water and depots are see-through, which
//! is deliberately looser than the explosive-cover rule used for blasts
//! (see [`explosive_cover_blocked`]).

use crate::grid::Grid;
use crate::math::{line, GridPos};
use crate::units::{Team, UnitArena};

/// Whether `to` can be seen from `from`.
///
/// The origin cell never blocks; every later cell on the line, the target
/// included, blocks if it is rock.
#[must_use]
pub fn has_line_of_sight(grid: &Grid, from: GridPos, to: GridPos) -> bool {
    line(from, to)
        .skip(1)
        .all(|cell| !grid.at(cell).blocks_sight())
}

/// Whether explosive-blocking terrain lies between a blast centre and a
/// target cell. The centre cell counts, the target cell does not.
#[must_use]
pub fn explosive_cover_blocked(grid: &Grid, center: GridPos, target: GridPos) -> bool {
    line(center, target)
        .take_while(|&cell| cell != target)
        .any(|cell| grid.at(cell).blocks_explosive())
}

/// Boolean per-cell mask, row-major.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VisibilityMask {
    size: i32,
    cells: Vec<bool>,
}

impl VisibilityMask {
    /// Nothing visible.
    #[must_use]
    pub fn new(size: i32) -> Self {
        let side = size.max(0) as usize;
        Self {
            size,
            cells: vec![false; side * side],
        }
    }

    /// Side length.
    #[must_use]
    pub const fn size(&self) -> i32 {
        self.size
    }

    /// Whether `pos` is visible. Off-map cells never are.
    #[must_use]
    pub fn is_visible(&self, pos: GridPos) -> bool {
        self.index(pos).is_some_and(|i| self.cells[i])
    }

    /// Number of visible cells.
    #[must_use]
    pub fn count(&self) -> usize {
        self.cells.iter().filter(|&&v| v).count()
    }

    /// Row-major view.
    #[must_use]
    pub fn cells(&self) -> &[bool] {
        &self.cells
    }

    /// Union `other` into this mask.
    pub fn merge(&mut self, other: &Self) {
        for (a, b) in self.cells.iter_mut().zip(&other.cells) {
            *a |= *b;
        }
    }

    fn mark(&mut self, pos: GridPos) {
        if let Some(i) = self.index(pos) {
            self.cells[i] = true;
        }
    }

    fn index(&self, pos: GridPos) -> Option<usize> {
        (pos.row >= 0 && pos.row < self.size && pos.col >= 0 && pos.col < self.size)
            .then(|| (pos.row * self.size + pos.col) as usize)
    }
}

/// Cells visible from `origin` within `sight_range` (Euclidean).
#[must_use]
pub fn unit_visibility(grid: &Grid, origin: GridPos, sight_range: i32) -> VisibilityMask {
    let mut mask = VisibilityMask::new(grid.size());
    mark_visible(grid, origin, sight_range, &mut mask);
    mask
}

/// Union of [`unit_visibility`] over every living unit of `team`.
#[must_use]
pub fn team_visibility(
    grid: &Grid,
    units: &UnitArena,
    team: Team,
    sight_range: i32,
) -> VisibilityMask {
    let mut mask = VisibilityMask::new(grid.size());
    for unit in units.team(team) {
        mark_visible(grid, unit.pos, sight_range, &mut mask);
    }
    mask
}

fn mark_visible(grid: &Grid, origin: GridPos, sight_range: i32, mask: &mut VisibilityMask) {
    let r2 = sight_range * sight_range;
    let n = grid.size();
    let rmin = (origin.row - sight_range).max(0);
    let rmax = (origin.row + sight_range).min(n - 1);
    let cmin = (origin.col - sight_range).max(0);
    let cmax = (origin.col + sight_range).min(n - 1);

    for r in rmin..=rmax {
        for c in cmin..=cmax {
            let cell = GridPos::new(r, c);
            if origin.dist2(cell) > r2 || mask.is_visible(cell) {
                continue;
            }
            if has_line_of_sight(grid, origin, cell) {
                mask.mark(cell);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::UnitConfig;
    use crate::grid::Playfield;
    use crate::units::Role;

    fn grid(rows: &[&str]) -> Grid {
        Grid::from_rows(rows, Playfield::open()).unwrap()
    }

    #[test]
    fn test_rock_blocks_trees_do_not() {
        let g = grid(&[
            ".....", //
            ".T...", //
            ".....", //
            "..#..", //
            ".....",
        ]);
        assert!(has_line_of_sight(&g, GridPos::new(1, 0), GridPos::new(1, 4)));
        assert!(!has_line_of_sight(&g, GridPos::new(3, 0), GridPos::new(3, 4)));
        // The rock itself cannot be targeted.
        assert!(!has_line_of_sight(&g, GridPos::new(3, 0), GridPos::new(3, 2)));
        // Standing on rock does not blind the viewer.
        assert!(has_line_of_sight(&g, GridPos::new(3, 2), GridPos::new(3, 4)));
    }

    #[test]
    fn test_water_does_not_block_sight() {
        let g = grid(&["..~..", ".....", ".....", ".....", "....."]);
        assert!(has_line_of_sight(&g, GridPos::new(0, 0), GridPos::new(0, 4)));
    }

    #[test]
    fn test_explosive_cover_includes_start_excludes_end() {
        let g = grid(&["T...T", ".....", ".....", ".....", "....."]);
        assert!(explosive_cover_blocked(&g, GridPos::new(0, 0), GridPos::new(0, 3)));
        assert!(!explosive_cover_blocked(&g, GridPos::new(0, 1), GridPos::new(0, 4)));
        assert!(!explosive_cover_blocked(&g, GridPos::new(2, 2), GridPos::new(2, 2)));
    }

    #[test]
    fn test_unit_visibility_respects_radius_and_rock() {
        let g = grid(&[
            ".......", //
            ".......", //
            ".......", //
            "...#...", //
            ".......", //
            ".......", //
            ".......",
        ]);
        let mask = unit_visibility(&g, GridPos::new(3, 1), 3);
        assert!(mask.is_visible(GridPos::new(3, 1)));
        assert!(mask.is_visible(GridPos::new(0, 1)));
        assert!(!mask.is_visible(GridPos::new(3, 4)));
        assert!(!mask.is_visible(GridPos::new(6, 5)));
    }

    #[test]
    fn test_team_visibility_is_union_of_living() {
        let g = grid(&["........."; 9]);
        let cfg = UnitConfig::default();
        let mut units = UnitArena::new();
        let a = units.spawn(Team::Blue, Role::Warrior, GridPos::new(0, 0), &cfg);
        units.spawn(Team::Blue, Role::Warrior, GridPos::new(8, 8), &cfg);
        units.spawn(Team::Orange, Role::Warrior, GridPos::new(4, 4), &cfg);

        let mask = team_visibility(&g, &units, Team::Blue, 2);
        assert!(mask.is_visible(GridPos::new(1, 1)));
        assert!(mask.is_visible(GridPos::new(7, 7)));
        assert!(!mask.is_visible(GridPos::new(4, 4)));

        units.get_mut(a).unwrap().alive = false;
        let mask = team_visibility(&g, &units, Team::Blue, 2);
        assert!(!mask.is_visible(GridPos::new(1, 1)));
        assert!(mask.is_visible(GridPos::new(7, 7)));
    }
}
