//! The risk field.
//!
//! A per-cell danger score built by casting simulated sight lines from the
//! map edges toward the centre. Live bullets add small increments on top as
//! they travel. Consumers normalise by [`SecurityMap::max_value`], which is
//! a full scan: compute it once per query, never per cell.

use crate::config::RiskConfig;
use crate::grid::{CellKind, Grid};
use crate::math::{GridPos, Vec2};

/// Same-sized companion field to [`Grid`] holding non-negative risk.
#[derive(Debug, Clone, PartialEq)]
pub struct SecurityMap {
    size: i32,
    values: Vec<f32>,
}

/// One emitter ray.
#[derive(Debug, Clone, Copy)]
struct Ray {
    origin: Vec2,
    dir: Vec2,
    power: f32,
    max_steps: i32,
}

impl SecurityMap {
    /// An all-zero field.
    #[must_use]
    pub fn new(size: i32) -> Self {
        let side = size.max(0) as usize;
        Self {
            size,
            values: vec![0.0; side * side],
        }
    }

    /// Side length.
    #[must_use]
    pub const fn size(&self) -> i32 {
        self.size
    }

    /// Row-major view of the field.
    #[must_use]
    pub fn values(&self) -> &[f32] {
        &self.values
    }

    /// Reset every cell to zero.
    pub fn clear(&mut self) {
        self.fill(0.0);
    }

    /// Set every cell to `v`.
    pub fn fill(&mut self, v: f32) {
        self.values.iter_mut().for_each(|x| *x = v);
    }

    /// Risk at `pos`; zero off the map.
    #[must_use]
    pub fn at(&self, pos: GridPos) -> f32 {
        self.index(pos).map_or(0.0, |i| self.values[i])
    }

    /// Deposit `v` at `pos`. Off-map coordinates are ignored.
    pub fn add(&mut self, pos: GridPos, v: f32) {
        if let Some(i) = self.index(pos) {
            self.values[i] += v;
        }
    }

    /// Overwrite the risk at `pos`. Off-map coordinates are ignored.
    pub fn set(&mut self, pos: GridPos, v: f32) {
        if let Some(i) = self.index(pos) {
            self.values[i] = v;
        }
    }

    /// Current maximum, or `1.0` when the field holds nothing positive.
    #[must_use]
    pub fn max_value(&self) -> f32 {
        let m = self.values.iter().copied().fold(0.0_f32, f32::max);
        if m <= 0.0 {
            1.0
        } else {
            m
        }
    }

    /// `at(pos) / max` clamped to `[0, 1]`, where `max` came from
    /// [`SecurityMap::max_value`].
    #[must_use]
    pub fn normalized(&self, pos: GridPos, max: f32) -> f32 {
        (self.at(pos) / max.max(1e-4)).clamp(0.0, 1.0)
    }

    /// Rebuild the field from terrain.
    ///
    /// `weapon_range` is the longest engagement range; rays live for
    /// `ceil(1.2 * weapon_range)` steps (half that for the centre rays).
    /// The result depends only on `grid`, `config` and `weapon_range`.
    pub fn rebuild(&mut self, grid: &Grid, config: &RiskConfig, weapon_range: i32) {
        if grid.size() != self.size {
            *self = Self::new(grid.size());
        } else {
            self.clear();
        }

        let rays = emitter_layout(grid.size(), config, weapon_range);
        for ray in &rays {
            self.trace(grid, config, ray);
        }

        tracing::debug!(
            rays = rays.len(),
            max = self.max_value(),
            "Rebuilt security map"
        );
    }

    fn trace(&mut self, grid: &Grid, config: &RiskConfig, ray: &Ray) {
        let mut p = ray.origin;
        let mut power = ray.power;
        let mut step = 0;
        while step < ray.max_steps && power > config.epsilon {
            let cell = GridPos::new(p.r.round() as i32, p.c.round() as i32);
            let Some(kind) = grid.get(cell) else {
                break;
            };
            match kind {
                CellKind::Rock => break,
                CellKind::Tree => {
                    self.add(cell, power * config.tree_factor);
                    power *= config.tree_factor;
                }
                _ => self.add(cell, power),
            }
            p = p + ray.dir;
            power *= config.decay;
            step += 1;
        }
    }

    fn index(&self, pos: GridPos) -> Option<usize> {
        (pos.row >= 0 && pos.row < self.size && pos.col >= 0 && pos.col < self.size)
            .then(|| (pos.row * self.size + pos.col) as usize)
    }
}

fn toward(from: Vec2, to: Vec2) -> Vec2 {
    (to - from).normalized().unwrap_or_default()
}

/// Fixed emitter geometry: edge rays aimed at the centre line plus pairs
/// of short rays crossing the river.
fn emitter_layout(n: i32, config: &RiskConfig, weapon_range: i32) -> Vec<Ray> {
    let s = config.samples;
    let half = (s / 2).max(1);
    let mid = (n / 2) as f32;
    let nf = n as f32;
    let ttl = (1.2 * weapon_range as f32).ceil() as i32;

    let mut rays = Vec::with_capacity((s * 2 + half * 4) as usize);

    for i in 0..s {
        let fi = i as f32;
        let r0 = 2.0 + fi * (nf - 4.0) / s as f32;

        let left = Vec2::new(r0, 2.0);
        rays.push(Ray {
            origin: left,
            dir: toward(left, Vec2::new(r0 + 15.0 * (0.31 * fi).sin(), mid)),
            power: 1.0,
            max_steps: ttl,
        });

        let right = Vec2::new(r0, nf - 3.0);
        rays.push(Ray {
            origin: right,
            dir: toward(right, Vec2::new(r0 + 15.0 * (0.29 * fi).cos(), mid)),
            power: 1.0,
            max_steps: ttl,
        });
    }

    for i in 0..half {
        let fi = i as f32;
        let c0 = 2.0 + fi * (nf - 4.0) / half as f32;

        let bottom = Vec2::new(nf - 3.0, c0);
        rays.push(Ray {
            origin: bottom,
            dir: toward(bottom, Vec2::new(mid, c0 + 10.0 * (0.37 * fi).sin())),
            power: config.vertical_power,
            max_steps: ttl,
        });

        let top = Vec2::new(2.0, c0);
        rays.push(Ray {
            origin: top,
            dir: toward(top, Vec2::new(mid, c0 + 10.0 * (0.41 * fi).cos())),
            power: config.vertical_power,
            max_steps: ttl,
        });
    }

    for i in 0..half {
        let r0 = 3.0 + i as f32 * (nf - 6.0) / half as f32;
        rays.push(Ray {
            origin: Vec2::new(r0, mid - 3.0),
            dir: Vec2::new(0.0, 1.0),
            power: config.center_power,
            max_steps: ttl / 2,
        });
        rays.push(Ray {
            origin: Vec2::new(r0, mid + 3.0),
            dir: Vec2::new(0.0, -1.0),
            power: config.center_power,
            max_steps: ttl / 2,
        });
    }

    rays
}
