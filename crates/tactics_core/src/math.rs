//! Grid coordinates, distance metrics and integer line walking.
//!
//! Every spatial query in the simulation works on integer cells addressed
//! as `(row, col)`. Projectiles are the only thing that lives between cells,
//! and they use [`Vec2`].

use std::fmt;

use serde::{Deserialize, Serialize};

/// A cell coordinate on the grid.
///
/// Coordinates are signed so that neighbour arithmetic and off-grid lookups
/// never need casts; bounds are checked by [`crate::grid::Grid::in_bounds`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub struct GridPos {
    /// Row index (grows downwards).
    pub row: i32,
    /// Column index (grows rightwards).
    pub col: i32,
}

impl GridPos {
    /// Create a new coordinate.
    #[must_use]
    pub const fn new(row: i32, col: i32) -> Self {
        Self { row, col }
    }

    /// Offset this coordinate by a row and column delta.
    #[must_use]
    pub const fn offset(self, dr: i32, dc: i32) -> Self {
        Self::new(self.row + dr, self.col + dc)
    }

    /// Manhattan (4-connected) distance.
    #[must_use]
    pub const fn manhattan(self, other: Self) -> i32 {
        (self.row - other.row).abs() + (self.col - other.col).abs()
    }

    /// Chebyshev (8-connected) distance.
    #[must_use]
    pub fn chebyshev(self, other: Self) -> i32 {
        (self.row - other.row).abs().max((self.col - other.col).abs())
    }

    /// Squared Euclidean distance.
    #[must_use]
    pub const fn dist2(self, other: Self) -> i32 {
        let dr = self.row - other.row;
        let dc = self.col - other.col;
        dr * dr + dc * dc
    }

    /// The four orthogonal neighbours, in up/down/left/right order.
    #[must_use]
    pub const fn neighbors4(self) -> [Self; 4] {
        [
            self.offset(-1, 0),
            self.offset(1, 0),
            self.offset(0, -1),
            self.offset(0, 1),
        ]
    }

    /// All eight surrounding cells.
    #[must_use]
    pub const fn neighbors8(self) -> [Self; 8] {
        [
            self.offset(-1, -1),
            self.offset(-1, 0),
            self.offset(-1, 1),
            self.offset(0, -1),
            self.offset(0, 1),
            self.offset(1, -1),
            self.offset(1, 0),
            self.offset(1, 1),
        ]
    }

    /// Centre of the cell in continuous coordinates.
    #[must_use]
    pub fn center(self) -> Vec2 {
        Vec2::new(self.row as f32 + 0.5, self.col as f32 + 0.5)
    }
}

impl fmt::Display for GridPos {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.row, self.col)
    }
}

/// Continuous position used by projectiles, in cell units.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Vec2 {
    /// Row axis.
    pub r: f32,
    /// Column axis.
    pub c: f32,
}

impl Vec2 {
    /// Create a new vector.
    #[must_use]
    pub const fn new(r: f32, c: f32) -> Self {
        Self { r, c }
    }

    /// Euclidean length.
    #[must_use]
    pub fn length(self) -> f32 {
        (self.r * self.r + self.c * self.c).sqrt()
    }

    /// Scale both components.
    #[must_use]
    pub fn scale(self, k: f32) -> Self {
        Self::new(self.r * k, self.c * k)
    }

    /// Unit vector pointing the same way, or `None` for a near-zero vector.
    #[must_use]
    pub fn normalized(self) -> Option<Self> {
        let len = self.length();
        if len < 1e-4 {
            None
        } else {
            Some(self.scale(1.0 / len))
        }
    }

    /// The cell containing this point (floor of both axes).
    #[must_use]
    pub fn cell(self) -> GridPos {
        GridPos::new(self.r.floor() as i32, self.c.floor() as i32)
    }
}

impl std::ops::Add for Vec2 {
    type Output = Self;

    fn add(self, rhs: Self) -> Self::Output {
        Self::new(self.r + rhs.r, self.c + rhs.c)
    }
}

impl std::ops::Sub for Vec2 {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self::Output {
        Self::new(self.r - rhs.r, self.c - rhs.c)
    }
}

/// Iterator over the cells of an integer Bresenham line, both endpoints
/// included.
#[derive(Debug, Clone)]
pub struct BresenhamLine {
    cur: GridPos,
    end: GridPos,
    dr: i32,
    dc: i32,
    sr: i32,
    sc: i32,
    err: i32,
    done: bool,
}

impl BresenhamLine {
    /// Walk from `start` to `end`.
    #[must_use]
    pub fn new(start: GridPos, end: GridPos) -> Self {
        let dr = (end.row - start.row).abs();
        let dc = (end.col - start.col).abs();
        Self {
            cur: start,
            end,
            dr,
            dc,
            sr: if start.row < end.row { 1 } else { -1 },
            sc: if start.col < end.col { 1 } else { -1 },
            err: dr - dc,
            done: false,
        }
    }
}

impl Iterator for BresenhamLine {
    type Item = GridPos;

    fn next(&mut self) -> Option<GridPos> {
        if self.done {
            return None;
        }
        let out = self.cur;
        if self.cur == self.end {
            self.done = true;
        } else {
            let e2 = 2 * self.err;
            if e2 > -self.dc {
                self.err -= self.dc;
                self.cur.row += self.sr;
            }
            if e2 < self.dr {
                self.err += self.dr;
                self.cur.col += self.sc;
            }
        }
        Some(out)
    }
}

/// Cells of the line from `start` to `end`, both endpoints included.
#[must_use]
pub fn line(start: GridPos, end: GridPos) -> BresenhamLine {
    BresenhamLine::new(start, end)
}
