//! Static-per-match terrain.
//!
//! The grid is generated once per match:
//! - a single-column river splits the map into two halves
//! - tree clusters and rocks are scattered off the river, away from depots
//!   and out of the UI-reserved bottom band
//! - four depots are stamped last with a guaranteed 3x3 clearance
//!
//! After generation the terrain never changes, apart from the border
//! sanitation pass the world runs once before spawning units.

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::config::GridConfig;
use crate::error::{Result, SimError};
use crate::math::GridPos;
use crate::units::Team;

/// Terrain classification of a single cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum CellKind {
    /// Open ground.
    #[default]
    Empty,
    /// Blocks movement, sight, bullets and blasts.
    Rock,
    /// Walkable; muffles blasts and risk rays but not sight.
    Tree,
    /// The river. Blocks movement only.
    Water,
    /// Ammunition depot (supplier refill point).
    AmmoDepot,
    /// Medical depot (medic refill point).
    MedDepot,
}

impl CellKind {
    /// Whether a unit may stand on this cell.
    #[must_use]
    pub const fn is_walkable(self) -> bool {
        !matches!(self, Self::Rock | Self::Water)
    }

    /// Whether this cell blocks line of sight and bullets.
    #[must_use]
    pub const fn blocks_sight(self) -> bool {
        matches!(self, Self::Rock)
    }

    /// Whether this cell shields a unit from a blast.
    #[must_use]
    pub const fn blocks_explosive(self) -> bool {
        matches!(
            self,
            Self::Rock | Self::Tree | Self::AmmoDepot | Self::MedDepot
        )
    }

    /// Whether a defender may use this cell as cover.
    #[must_use]
    pub const fn is_cover(self) -> bool {
        matches!(self, Self::Rock | Self::Tree)
    }

    /// ASCII glyph used by fixtures and the headless renderer.
    #[must_use]
    pub const fn glyph(self) -> char {
        match self {
            Self::Empty => '.',
            Self::Rock => '#',
            Self::Tree => 'T',
            Self::Water => '~',
            Self::AmmoDepot => 'A',
            Self::MedDepot => 'M',
        }
    }

    /// Parse a glyph produced by [`CellKind::glyph`].
    #[must_use]
    pub const fn from_glyph(c: char) -> Option<Self> {
        match c {
            '.' => Some(Self::Empty),
            '#' => Some(Self::Rock),
            'T' => Some(Self::Tree),
            '~' => Some(Self::Water),
            'A' => Some(Self::AmmoDepot),
            'M' => Some(Self::MedDepot),
            _ => None,
        }
    }
}

/// Margins that separate the playable area from the map border.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Playfield {
    /// Rows excluded at the top.
    pub top: i32,
    /// Rows excluded at the bottom.
    pub bottom: i32,
    /// Columns excluded on the left.
    pub left: i32,
    /// Columns excluded on the right.
    pub right: i32,
}

impl Default for Playfield {
    fn default() -> Self {
        Self {
            top: 8,
            bottom: 8,
            left: 3,
            right: 3,
        }
    }
}

impl Playfield {
    /// No margins at all.
    #[must_use]
    pub const fn open() -> Self {
        Self {
            top: 0,
            bottom: 0,
            left: 0,
            right: 0,
        }
    }

    /// Whether `pos` lies inside the playable area of a `size`x`size` grid.
    #[must_use]
    pub const fn contains(&self, pos: GridPos, size: i32) -> bool {
        pos.row >= self.top
            && pos.row <= size - 1 - self.bottom
            && pos.col >= self.left
            && pos.col <= size - 1 - self.right
    }
}

/// Depot coordinates, two per team.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Landmarks {
    /// Blue ammunition depot.
    pub ammo_blue: GridPos,
    /// Blue medical depot.
    pub med_blue: GridPos,
    /// Orange ammunition depot.
    pub ammo_orange: GridPos,
    /// Orange medical depot.
    pub med_orange: GridPos,
}

impl Landmarks {
    /// Reference depot layout for a `size`x`size` map.
    #[must_use]
    pub const fn for_size(size: i32) -> Self {
        Self {
            ammo_blue: GridPos::new(size / 10, size / 10),
            med_blue: GridPos::new(size / 5, size / 12),
            ammo_orange: GridPos::new(size / 10, size - size / 10),
            med_orange: GridPos::new(size / 5, size - size / 12),
        }
    }

    /// Ammunition depot of `team`.
    #[must_use]
    pub const fn ammo_depot(&self, team: Team) -> GridPos {
        match team {
            Team::Blue => self.ammo_blue,
            Team::Orange => self.ammo_orange,
        }
    }

    /// Medical depot of `team`.
    #[must_use]
    pub const fn med_depot(&self, team: Team) -> GridPos {
        match team {
            Team::Blue => self.med_blue,
            Team::Orange => self.med_orange,
        }
    }

    /// All four depots.
    #[must_use]
    pub const fn all(&self) -> [GridPos; 4] {
        [self.ammo_blue, self.med_blue, self.ammo_orange, self.med_orange]
    }
}

/// The terrain of one match.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Grid {
    size: i32,
    cells: Vec<CellKind>,
    landmarks: Landmarks,
    playfield: Playfield,
}

impl Grid {
    /// An all-empty grid with reference landmarks (not stamped).
    #[must_use]
    pub fn empty(size: i32, playfield: Playfield) -> Self {
        let side = size.max(0) as usize;
        Self {
            size,
            cells: vec![CellKind::Empty; side * side],
            landmarks: Landmarks::for_size(size),
            playfield,
        }
    }

    /// Generate terrain procedurally.
    pub fn generate<R: Rng + ?Sized>(config: &GridConfig, rng: &mut R) -> Self {
        let mut grid = Self::empty(config.size, config.playfield);
        let n = config.size;

        grid.carve_river();

        let area = n * n;
        let num_trees = config.min_tree_clusters.max(area / config.tree_area_divisor);
        let num_rocks = config.min_rocks.max(area / config.rock_area_divisor);

        let placed_trees = grid.scatter(config, num_trees, rng, Self::place_tree_cluster);
        let placed_rocks = grid.scatter(config, num_rocks, rng, Self::place_rock);

        grid.stamp_depots();

        tracing::debug!(
            size = n,
            trees = placed_trees,
            rocks = placed_rocks,
            "Generated terrain"
        );
        grid
    }

    /// Build a grid from ASCII rows (see [`CellKind::glyph`]).
    ///
    /// Depot glyphs override the reference landmarks: the first and second
    /// `A` become the Blue and Orange ammo depots, likewise for `M`. Unknown
    /// glyphs are treated as empty.
    ///
    /// # Errors
    ///
    /// Returns [`SimError::InvalidConfig`] if the rows do not form a square.
    pub fn from_rows(rows: &[&str], playfield: Playfield) -> Result<Self> {
        let size = rows.len() as i32;
        if rows.iter().any(|r| r.chars().count() != rows.len()) {
            return Err(SimError::InvalidConfig {
                field: "grid.rows",
                reason: format!("expected {size} rows of {size} cells"),
            });
        }

        let mut grid = Self::empty(size, playfield);
        let mut ammo = Vec::new();
        let mut med = Vec::new();
        for (r, line) in rows.iter().enumerate() {
            for (c, ch) in line.chars().enumerate() {
                let pos = GridPos::new(r as i32, c as i32);
                let kind = CellKind::from_glyph(ch).unwrap_or_default();
                match kind {
                    CellKind::AmmoDepot => ammo.push(pos),
                    CellKind::MedDepot => med.push(pos),
                    _ => {}
                }
                grid.set(pos, kind);
            }
        }

        if let Some(&p) = ammo.first() {
            grid.landmarks.ammo_blue = p;
        }
        if let Some(&p) = ammo.get(1) {
            grid.landmarks.ammo_orange = p;
        }
        if let Some(&p) = med.first() {
            grid.landmarks.med_blue = p;
        }
        if let Some(&p) = med.get(1) {
            grid.landmarks.med_orange = p;
        }
        Ok(grid)
    }

    /// Side length.
    #[must_use]
    pub const fn size(&self) -> i32 {
        self.size
    }

    /// Depot coordinates.
    #[must_use]
    pub const fn landmarks(&self) -> &Landmarks {
        &self.landmarks
    }

    /// Playable-area margins.
    #[must_use]
    pub const fn playfield(&self) -> &Playfield {
        &self.playfield
    }

    /// Central column (the river).
    #[must_use]
    pub const fn mid(&self) -> i32 {
        self.size / 2
    }

    /// Whether `pos` is on the map.
    #[must_use]
    pub const fn in_bounds(&self, pos: GridPos) -> bool {
        pos.row >= 0 && pos.row < self.size && pos.col >= 0 && pos.col < self.size
    }

    /// Whether `pos` is inside the playable area.
    #[must_use]
    pub const fn in_playfield(&self, pos: GridPos) -> bool {
        self.playfield.contains(pos, self.size)
    }

    /// Cell kind at `pos`.
    ///
    /// Off-grid coordinates read as [`CellKind::Rock`], so every lookup past
    /// the border is blocked for movement, sight and blasts alike.
    #[must_use]
    pub fn at(&self, pos: GridPos) -> CellKind {
        self.index(pos).map_or(CellKind::Rock, |i| self.cells[i])
    }

    /// Cell kind at `pos`, or `None` off the map.
    #[must_use]
    pub fn get(&self, pos: GridPos) -> Option<CellKind> {
        self.index(pos).map(|i| self.cells[i])
    }

    /// Overwrite a cell. Off-grid writes are ignored.
    pub fn set(&mut self, pos: GridPos, kind: CellKind) {
        if let Some(i) = self.index(pos) {
            self.cells[i] = kind;
        }
    }

    /// Row-major view of every cell.
    #[must_use]
    pub fn cells(&self) -> &[CellKind] {
        &self.cells
    }

    /// Iterate over all coordinates in row-major order.
    pub fn positions(&self) -> impl Iterator<Item = GridPos> + '_ {
        (0..self.size).flat_map(move |r| (0..self.size).map(move |c| GridPos::new(r, c)))
    }

    /// Clear obstacles outside the playfield. Depots are left in place.
    ///
    /// Returns how many cells were cleared.
    pub fn sanitize_border(&mut self) -> usize {
        let mut cleared = 0;
        for i in 0..self.cells.len() {
            let pos = self.pos_of(i);
            if self.in_playfield(pos) {
                continue;
            }
            if matches!(
                self.cells[i],
                CellKind::Rock | CellKind::Tree | CellKind::Water
            ) {
                self.cells[i] = CellKind::Empty;
                cleared += 1;
            }
        }
        cleared
    }

    /// Render the terrain as ASCII rows.
    #[must_use]
    pub fn to_rows(&self) -> Vec<String> {
        self.cells
            .chunks(self.size.max(1) as usize)
            .map(|row| row.iter().map(|k| k.glyph()).collect())
            .collect()
    }

    fn index(&self, pos: GridPos) -> Option<usize> {
        self.in_bounds(pos)
            .then(|| (pos.row * self.size + pos.col) as usize)
    }

    fn pos_of(&self, index: usize) -> GridPos {
        let i = index as i32;
        GridPos::new(i / self.size, i % self.size)
    }

    fn is_river(&self, pos: GridPos) -> bool {
        pos.col == self.mid()
    }

    fn carve_river(&mut self) {
        let mid = self.mid();
        for r in self.size / 6..self.size - self.size / 6 {
            self.set(GridPos::new(r, mid), CellKind::Water);
        }
    }

    fn can_place(&self, config: &GridConfig, pos: GridPos) -> bool {
        if pos.row >= self.size - config.ui_reserved_rows {
            return false;
        }
        if !self.in_bounds(pos) || self.is_river(pos) || self.at(pos) != CellKind::Empty {
            return false;
        }
        !self
            .landmarks
            .all()
            .iter()
            .any(|d| d.manhattan(pos) <= config.depot_keepout)
    }

    fn random_col_off_river<R: Rng + ?Sized>(&self, rng: &mut R) -> i32 {
        let mid = self.mid();
        if rng.gen_bool(0.5) {
            rng.gen_range(0..=mid - 2)
        } else {
            rng.gen_range(mid + 2..self.size)
        }
    }

    fn scatter<R: Rng + ?Sized>(
        &mut self,
        config: &GridConfig,
        count: i32,
        rng: &mut R,
        place: fn(&mut Self, &GridConfig, GridPos, &mut R),
    ) -> i32 {
        let max_attempts = count * config.attempts_per_obstacle;
        let mut placed = 0;
        let mut attempts = 0;
        while placed < count && attempts < max_attempts {
            attempts += 1;
            let pos = GridPos::new(rng.gen_range(0..self.size), self.random_col_off_river(rng));
            if !self.can_place(config, pos) {
                continue;
            }
            place(self, config, pos, rng);
            placed += 1;
        }
        placed
    }

    fn place_tree_cluster<R: Rng + ?Sized>(
        &mut self,
        config: &GridConfig,
        start: GridPos,
        rng: &mut R,
    ) {
        self.set(start, CellKind::Tree);
        let extra = rng.gen_range(1..=3);
        let mut cur = start;
        for _ in 0..extra {
            let next = cur.offset(rng.gen_range(-1..=1), rng.gen_range(-1..=1));
            if self.can_place(config, next) {
                self.set(next, CellKind::Tree);
                cur = next;
            }
        }
    }

    fn place_rock<R: Rng + ?Sized>(&mut self, config: &GridConfig, start: GridPos, rng: &mut R) {
        const DIRS: [(i32, i32); 4] = [(1, 0), (-1, 0), (0, 1), (0, -1)];

        self.set(start, CellKind::Rock);
        if !rng.gen_bool(config.rock_extend_chance) {
            return;
        }
        let (dr, dc) = DIRS[rng.gen_range(0..DIRS.len())];
        let len = rng.gen_range(1..=2);
        let mut cur = start;
        for _ in 0..len {
            cur = cur.offset(dr, dc);
            if !self.can_place(config, cur) {
                break;
            }
            self.set(cur, CellKind::Rock);
        }
    }

    fn stamp_depots(&mut self) {
        let marks = self.landmarks;
        for depot in marks.all() {
            for dr in -1..=1 {
                for dc in -1..=1 {
                    self.set(depot.offset(dr, dc), CellKind::Empty);
                }
            }
        }
        self.set(marks.ammo_blue, CellKind::AmmoDepot);
        self.set(marks.ammo_orange, CellKind::AmmoDepot);
        self.set(marks.med_blue, CellKind::MedDepot);
        self.set(marks.med_orange, CellKind::MedDepot);
    }
}
