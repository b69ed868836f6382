//! Projectile simulation and damage resolution.
//!
//! Bullets fly in straight lines through continuous cell-index space (a
//! unit on cell `(r, c)` sits at point `(r, c)`), die on leaving the map or
//! entering rock, and leave a small risk deposit on every cell they cross.
//! Grenades fly a parabola, detonate on landing or on striking rock near
//! the ground, deal falloff damage attenuated by explosive cover, and burst
//! into shrapnel bullets.
//!
//! ## Per-tick order
//!
//! 1. Every live bullet advances and resolves its hit test
//! 2. Every live grenade advances; detonations apply blast damage and spawn
//!    shrapnel, which first moves on the next tick

use serde::{Deserialize, Serialize};

use crate::config::CombatConfig;
use crate::grid::Grid;
use crate::math::{GridPos, Vec2};
use crate::security_map::SecurityMap;
use crate::units::{Team, UnitArena, UnitId};
use crate::visibility::explosive_cover_blocked;

/// A bullet or shrapnel fragment.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bullet {
    /// Current position.
    pub pos: Vec2,
    /// Unit direction.
    pub dir: Vec2,
    /// Side that fired it.
    pub team: Team,
    /// Remaining steps before it fizzles.
    pub ttl: u32,
    /// Spawned by a grenade rather than a rifle.
    pub shrapnel: bool,
}

/// A grenade in flight.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Grenade {
    /// Planar position.
    pub pos: Vec2,
    /// Height above ground.
    pub z: f32,
    /// Planar velocity per tick.
    pub vel: Vec2,
    /// Vertical velocity per tick.
    pub vz: f32,
    /// Vertical acceleration per tick (negative).
    pub gravity: f32,
    /// Side that threw it.
    pub team: Team,
}

/// Something that happened during a combat step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CombatEvent {
    /// A unit took damage.
    Hit {
        /// Damaged unit.
        target: UnitId,
        /// Damage dealt.
        damage: i32,
        /// Attacking side.
        by: Team,
    },
    /// A unit died.
    Killed {
        /// Dead unit.
        target: UnitId,
        /// Killing side.
        by: Team,
    },
    /// A grenade went off.
    Detonated {
        /// Blast centre cell.
        at: GridPos,
        /// Throwing side.
        team: Team,
    },
}

enum GrenadeStep {
    Flying,
    Lost,
    Detonated(GridPos),
}

/// Owns every projectile in flight.
#[derive(Debug, Clone)]
pub struct CombatSystem {
    config: CombatConfig,
    bullets: Vec<Bullet>,
    grenades: Vec<Grenade>,
    events: Vec<CombatEvent>,
    shots_fired: u64,
    grenades_thrown: u64,
}

impl CombatSystem {
    /// Empty combat system.
    #[must_use]
    pub fn new(config: CombatConfig) -> Self {
        Self {
            config,
            bullets: Vec::new(),
            grenades: Vec::new(),
            events: Vec::new(),
            shots_fired: 0,
            grenades_thrown: 0,
        }
    }

    /// Tuning in use.
    #[must_use]
    pub const fn config(&self) -> &CombatConfig {
        &self.config
    }

    /// Bullets in flight.
    #[must_use]
    pub fn bullets(&self) -> &[Bullet] {
        &self.bullets
    }

    /// Grenades in flight.
    #[must_use]
    pub fn grenades(&self) -> &[Grenade] {
        &self.grenades
    }

    /// Rifle shots fired since construction.
    #[must_use]
    pub const fn shots_fired(&self) -> u64 {
        self.shots_fired
    }

    /// Grenades thrown or dropped since construction.
    #[must_use]
    pub const fn grenades_thrown(&self) -> u64 {
        self.grenades_thrown
    }

    /// Take the events recorded since the last drain.
    pub fn drain_events(&mut self) -> Vec<CombatEvent> {
        std::mem::take(&mut self.events)
    }

    /// Remove all projectiles and pending events.
    pub fn clear(&mut self) {
        self.bullets.clear();
        self.grenades.clear();
        self.events.clear();
    }

    /// Fire a bullet from `from` toward `target`.
    ///
    /// Returns `false` (and fires nothing) if the two cells coincide.
    pub fn fire_bullet(&mut self, from: GridPos, target: GridPos, team: Team) -> bool {
        let origin = Vec2::new(from.row as f32, from.col as f32);
        let aim = Vec2::new(target.row as f32, target.col as f32);
        let Some(dir) = (aim - origin).normalized() else {
            return false;
        };
        self.bullets.push(Bullet {
            pos: origin,
            dir,
            team,
            ttl: self.config.bullet_ttl,
            shrapnel: false,
        });
        self.shots_fired += 1;
        true
    }

    /// Lob a grenade from `from` at `target`.
    ///
    /// Flight time is the centre-to-centre distance over the throw speed,
    /// rounded and clamped; vertical velocity is chosen so the grenade
    /// lands when the flight time elapses.
    pub fn throw_grenade(&mut self, from: GridPos, target: GridPos, team: Team) {
        let c = &self.config;
        let start = from.center();
        let delta = target.center() - start;
        let frames = ((delta.length() / c.throw_speed).round() as i32)
            .clamp(c.throw_min_frames, c.throw_max_frames)
            .max(1);
        let t = frames as f32;

        self.grenades.push(Grenade {
            pos: start,
            z: 0.0,
            vel: delta.scale(1.0 / t),
            vz: -0.5 * c.gravity * t,
            gravity: c.gravity,
            team,
        });
        self.grenades_thrown += 1;
        tracing::trace!(%from, %target, frames, "Grenade thrown");
    }

    /// Detonate a grenade at the thrower's feet this instant.
    pub fn drop_grenade(&mut self, grid: &Grid, units: &mut UnitArena, at: GridPos, team: Team) {
        self.grenades_thrown += 1;
        self.detonate(grid, units, at, team);
    }

    /// Advance every projectile by one tick.
    pub fn tick(&mut self, grid: &Grid, risk: &mut SecurityMap, units: &mut UnitArena) {
        let mut bullets = std::mem::take(&mut self.bullets);
        bullets.retain_mut(|b| self.step_bullet(b, grid, risk, units));
        self.bullets = bullets;

        let mut grenades = std::mem::take(&mut self.grenades);
        let mut blasts = Vec::new();
        grenades.retain_mut(|g| match step_grenade(g, grid, self.config.rock_detonation_height) {
            GrenadeStep::Flying => true,
            GrenadeStep::Lost => false,
            GrenadeStep::Detonated(cell) => {
                blasts.push((cell, g.team));
                false
            }
        });
        // Shrapnel spawned below joins the list after this tick's bullets moved.
        self.grenades = grenades;
        for (cell, team) in blasts {
            self.detonate(grid, units, cell, team);
        }
    }

    fn step_bullet(
        &mut self,
        b: &mut Bullet,
        grid: &Grid,
        risk: &mut SecurityMap,
        units: &mut UnitArena,
    ) -> bool {
        if b.ttl == 0 {
            return false;
        }
        b.ttl -= 1;

        let next = b.pos + b.dir.scale(self.config.bullet_speed);
        let n = grid.size() as f32;
        if next.r < 0.0 || next.r >= n || next.c < 0.0 || next.c >= n {
            return false;
        }
        let cell = next.cell();
        if grid.at(cell).blocks_sight() {
            return false;
        }
        b.pos = next;
        risk.add(cell, self.config.bullet_risk_deposit);

        let hit2 = self.config.bullet_hit_radius * self.config.bullet_hit_radius;
        let friendly_fire = self.config.friendly_fire;
        let victim = units.iter_mut().find(|u| {
            if !u.alive || (!friendly_fire && u.team == b.team) {
                return false;
            }
            let d = Vec2::new(u.pos.row as f32, u.pos.col as f32) - b.pos;
            d.r * d.r + d.c * d.c <= hit2
        });
        match victim {
            Some(unit) => {
                let damage = self.config.bullet_damage;
                let killed = unit.take_damage(damage);
                self.record_damage(unit.id, damage, killed, b.team);
                false
            }
            None => true,
        }
    }

    fn detonate(&mut self, grid: &Grid, units: &mut UnitArena, at: GridPos, team: Team) {
        self.events.push(CombatEvent::Detonated { at, team });
        self.apply_blast(grid, units, at, team);
        self.spawn_shrapnel(at, team);
    }

    fn apply_blast(&mut self, grid: &Grid, units: &mut UnitArena, at: GridPos, team: Team) {
        let c = &self.config;
        let radius = c.blast_radius;
        let center = at.center();
        let friendly_fire = c.friendly_fire;
        let (edge, core, cover) = (c.blast_edge_damage, c.blast_center_damage, c.blast_cover_factor);

        let mut hits = Vec::new();
        for unit in units.iter_mut() {
            if !unit.alive || (!friendly_fire && unit.team == team) {
                continue;
            }
            let d = (unit.pos.center() - center).length();
            if d > radius {
                continue;
            }
            let t = (1.0 - d / radius).clamp(0.0, 1.0);
            let mut dmg = edge + (core - edge) * t;
            if explosive_cover_blocked(grid, at, unit.pos) {
                dmg *= cover;
            }
            let dmg = dmg.round() as i32;
            if dmg <= 0 {
                continue;
            }
            let killed = unit.take_damage(dmg);
            hits.push((unit.id, dmg, killed));
        }
        for (id, dmg, killed) in hits {
            self.record_damage(id, dmg, killed, team);
        }
    }

    fn spawn_shrapnel(&mut self, at: GridPos, team: Team) {
        let count = self.config.shrapnel_count.max(1);
        let origin = Vec2::new(at.row as f32, at.col as f32);
        let step = std::f32::consts::TAU / count as f32;
        for i in 0..count {
            let a = i as f32 * step;
            self.bullets.push(Bullet {
                pos: origin,
                dir: Vec2::new(a.cos(), a.sin()),
                team,
                ttl: self.config.bullet_ttl,
                shrapnel: true,
            });
        }
    }

    fn record_damage(&mut self, target: UnitId, damage: i32, killed: bool, by: Team) {
        self.events.push(CombatEvent::Hit { target, damage, by });
        if killed {
            tracing::debug!(unit = %target, team = ?by, "Unit killed");
            self.events.push(CombatEvent::Killed { target, by });
        }
    }
}

fn step_grenade(g: &mut Grenade, grid: &Grid, rock_height: f32) -> GrenadeStep {
    let next = g.pos + g.vel;
    let nz = g.z + g.vz + 0.5 * g.gravity;
    g.vz += g.gravity;

    let n = grid.size() as f32;
    if next.r < 0.0 || next.r >= n || next.c < 0.0 || next.c >= n {
        return GrenadeStep::Lost;
    }
    let cell = next.cell();
    if grid.at(cell).blocks_sight() && nz <= rock_height {
        // Strikes the rock face before it can move into the cell.
        return GrenadeStep::Detonated(g.pos.cell());
    }
    g.pos = next;
    if nz <= 0.0 {
        g.z = 0.0;
        return GrenadeStep::Detonated(cell);
    }
    g.z = nz;
    GrenadeStep::Flying
}
