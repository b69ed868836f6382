//! Proptest strategies for maps, cells and positions.

use proptest::prelude::*;
use tactics_core::grid::{CellKind, Grid, Playfield};
use tactics_core::math::GridPos;

/// Any cell kind.
pub fn cell_kind() -> impl Strategy<Value = CellKind> {
    prop_oneof![
        Just(CellKind::Empty),
        Just(CellKind::Rock),
        Just(CellKind::Tree),
        Just(CellKind::Water),
        Just(CellKind::AmmoDepot),
        Just(CellKind::MedDepot),
    ]
}

/// A position inside an `n`x`n` grid.
pub fn grid_pos(n: i32) -> impl Strategy<Value = GridPos> {
    (0..n, 0..n).prop_map(|(r, c)| GridPos::new(r, c))
}

/// Terrain weighted towards open ground: roughly one cell in five blocks
/// movement.
fn sparse_cell() -> impl Strategy<Value = CellKind> {
    prop_oneof![
        14 => Just(CellKind::Empty),
        2 => Just(CellKind::Tree),
        3 => Just(CellKind::Rock),
        1 => Just(CellKind::Water),
    ]
}

/// A random `n`x`n` map with sparse obstacles and no playfield margins.
pub fn sparse_grid(n: i32) -> impl Strategy<Value = Grid> {
    let cells = (n * n) as usize;
    prop::collection::vec(sparse_cell(), cells).prop_map(move |kinds| {
        let mut grid = Grid::empty(n, Playfield::open());
        for (i, kind) in kinds.into_iter().enumerate() {
            let i = i as i32;
            grid.set(GridPos::new(i / n, i % n), kind);
        }
        grid
    })
}

/// A random map together with two positions on it.
pub fn grid_and_endpoints(n: i32) -> impl Strategy<Value = (Grid, GridPos, GridPos)> {
    (sparse_grid(n), grid_pos(n), grid_pos(n))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::strategy::ValueTree;
    use proptest::test_runner::TestRunner;

    #[test]
    fn test_sparse_grid_has_requested_size() {
        let mut runner = TestRunner::default();
        let grid = sparse_grid(9).new_tree(&mut runner).unwrap().current();
        assert_eq!(grid.size(), 9);
        assert_eq!(grid.cells().len(), 81);
    }

    proptest! {
        #[test]
        fn grid_pos_stays_in_bounds(pos in grid_pos(16)) {
            prop_assert!(pos.row >= 0 && pos.row < 16);
            prop_assert!(pos.col >= 0 && pos.col < 16);
        }
    }
}
