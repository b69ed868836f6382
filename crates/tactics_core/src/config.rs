//! Tunable simulation parameters.
//!
//! Every constant the simulation reads lives here, grouped by concern.
//! `SimConfig::default()` reproduces the reference balance; a RON document
//! only needs to name the fields it changes.
//!
//! # Example RON
//!
//! ```ron
//! SimConfig(
//!     seed: 7,
//!     grid: (size: 60),
//!     combat: (friendly_fire: true),
//! )
//! ```

use serde::{Deserialize, Serialize};

use crate::error::{Result, SimError};
use crate::grid::Playfield;

/// Terrain generation and map geometry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GridConfig {
    /// Side length N of the square grid.
    pub size: i32,
    /// Bottom rows kept free of obstacles (reserved for the HUD).
    pub ui_reserved_rows: i32,
    /// Margins outside which units may not go and terrain is cleared.
    pub playfield: Playfield,
    /// Minimum number of tree clusters.
    pub min_tree_clusters: i32,
    /// Tree clusters = area / this, when larger than the minimum.
    pub tree_area_divisor: i32,
    /// Minimum number of rocks.
    pub min_rocks: i32,
    /// Rocks = area / this, when larger than the minimum.
    pub rock_area_divisor: i32,
    /// Placement attempts allowed per requested obstacle.
    pub attempts_per_obstacle: i32,
    /// Probability that a rock grows a straight extension.
    pub rock_extend_chance: f64,
    /// Obstacles may not be placed within this Manhattan distance of a depot.
    pub depot_keepout: i32,
}

impl Default for GridConfig {
    fn default() -> Self {
        Self {
            size: 120,
            ui_reserved_rows: 15,
            playfield: Playfield::default(),
            min_tree_clusters: 18,
            tree_area_divisor: 70,
            min_rocks: 15,
            rock_area_divisor: 90,
            attempts_per_obstacle: 20,
            rock_extend_chance: 0.35,
            depot_keepout: 2,
        }
    }
}

/// Risk field construction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RiskConfig {
    /// Rays per side edge (top/bottom and centre get half).
    pub samples: i32,
    /// Per-step power multiplier.
    pub decay: f32,
    /// Power kept (and deposited) when a ray crosses a tree.
    pub tree_factor: f32,
    /// Rays stop once their power drops below this.
    pub epsilon: f32,
    /// Starting power of top/bottom rays.
    pub vertical_power: f32,
    /// Starting power of the river-crossing centre rays.
    pub center_power: f32,
    /// Enemies standing in trees score this much further away when picking targets.
    pub tree_cover_penalty: f32,
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            samples: 60,
            decay: 0.985,
            tree_factor: 0.65,
            epsilon: 0.001,
            vertical_power: 0.9,
            center_power: 0.6,
            tree_cover_penalty: 1.5,
        }
    }
}

/// Medic pool sizes and refill rules.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MedicConfig {
    /// Heal pool a medic spawns with.
    pub initial_pool: i32,
    /// Maximum HP transferred per contact tick.
    pub heal_amount: i32,
    /// Pool added by a depot visit.
    pub refill_amount: i32,
    /// Pool added by a depot visit while the team is fighting.
    pub refill_amount_fighting: i32,
    /// Below this pool a medic refills before healing.
    pub refill_threshold: i32,
}

impl Default for MedicConfig {
    fn default() -> Self {
        Self {
            initial_pool: 120,
            heal_amount: 60,
            refill_amount: 100,
            refill_amount_fighting: 60,
            refill_threshold: 40,
        }
    }
}

/// Supplier stock sizes and refill rules.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SupplierConfig {
    /// Ammo stock a supplier spawns with.
    pub initial_stock: i32,
    /// Maximum rounds handed over per contact tick.
    pub supply_amount: i32,
    /// Stock added by a depot visit.
    pub refill_amount: i32,
    /// Stock added by a depot visit while the team is fighting.
    pub refill_amount_fighting: i32,
    /// Below this stock a supplier refills before resupplying.
    pub refill_threshold: i32,
}

impl Default for SupplierConfig {
    fn default() -> Self {
        Self {
            initial_stock: 20,
            supply_amount: 10,
            refill_amount: 20,
            refill_amount_fighting: 10,
            refill_threshold: 10,
        }
    }
}

/// Unit stats and self-reporting thresholds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UnitConfig {
    /// Maximum (and starting) hit points.
    pub hp_max: i32,
    /// Autonomous warriors below this HP retreat.
    pub hp_critical: i32,
    /// Units waiting for support keep waiting below this HP.
    pub hp_med: i32,
    /// Starting (and maximum) ammo.
    pub ammo_init: i32,
    /// Starting grenades.
    pub grenade_init: i32,
    /// Sight radius in cells.
    pub sight_range: i32,
    /// Warriors report Injured at or below this HP.
    pub injured_report_hp: i32,
    /// Normalized risk at which a warrior reports UnderFire.
    pub under_fire_threshold: f32,
    /// Fraction of the under-fire threshold at which an autonomous warrior digs in.
    pub autonomous_defend_factor: f32,
    /// Ticks between two EnemySighted reports from the same warrior.
    pub sighting_report_cooldown: u32,
    /// Ticks between two automatic grenades from the same warrior.
    pub auto_grenade_cooldown: u32,
    /// Automatic grenades only target enemies within this distance.
    pub auto_grenade_max_dist: f32,
    /// Enemies within this radius of the target count towards a cluster.
    pub auto_grenade_cluster_radius: f32,
    /// No automatic grenade when a friendly unit is within this radius of the target.
    pub auto_grenade_friend_radius: f32,
    /// Enemies needed near the target for an automatic grenade.
    pub auto_grenade_min_enemies: usize,
    /// Medic settings.
    pub medic: MedicConfig,
    /// Supplier settings.
    pub supplier: SupplierConfig,
}

impl Default for UnitConfig {
    fn default() -> Self {
        Self {
            hp_max: 100,
            hp_critical: 40,
            hp_med: 50,
            ammo_init: 20,
            grenade_init: 2,
            sight_range: 140,
            injured_report_hp: 75,
            under_fire_threshold: 0.35,
            autonomous_defend_factor: 0.8,
            sighting_report_cooldown: 20,
            auto_grenade_cooldown: 180,
            auto_grenade_max_dist: 12.0,
            auto_grenade_cluster_radius: 2.8,
            auto_grenade_friend_radius: 2.2,
            auto_grenade_min_enemies: 2,
            medic: MedicConfig::default(),
            supplier: SupplierConfig::default(),
        }
    }
}

/// Weapons, projectiles and explosions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CombatConfig {
    /// Maximum shooting distance in cells.
    pub fire_range: i32,
    /// Reference grenade range; feeds the risk ray length.
    pub grenade_range: i32,
    /// Ticks between two shots of an attacking unit.
    pub attack_cooldown: u32,
    /// Attacking units throw grenades at targets within this distance.
    pub grenade_throw_range: i32,
    /// Radius used to count enemies clustered around a target.
    pub grenade_cluster_radius: i32,
    /// Enemies needed in that radius before an attacking unit throws.
    pub grenade_min_enemies: usize,
    /// Cooldown applied to an attacking unit after a throw.
    pub grenade_cooldown: u32,
    /// Bullet travel per tick, in cells.
    pub bullet_speed: f32,
    /// Bullet lifetime in ticks.
    pub bullet_ttl: u32,
    /// Damage of a bullet hit.
    pub bullet_damage: i32,
    /// Distance within which a bullet hits a unit.
    pub bullet_hit_radius: f32,
    /// Risk deposited on every cell a bullet enters.
    pub bullet_risk_deposit: f32,
    /// Whether projectiles hurt the shooter's own team.
    pub friendly_fire: bool,
    /// Horizontal grenade speed used to estimate flight time.
    pub throw_speed: f32,
    /// Shortest flight, in ticks.
    pub throw_min_frames: i32,
    /// Longest flight, in ticks.
    pub throw_max_frames: i32,
    /// Vertical acceleration per tick (negative).
    pub gravity: f32,
    /// Grenades striking a rock at or below this height detonate.
    pub rock_detonation_height: f32,
    /// Blast radius in cells.
    pub blast_radius: f32,
    /// Damage at the blast centre.
    pub blast_center_damage: f32,
    /// Damage at the blast edge.
    pub blast_edge_damage: f32,
    /// Multiplier applied when explosive-blocking terrain shields a unit.
    pub blast_cover_factor: f32,
    /// Shrapnel bullets spawned by a detonation.
    pub shrapnel_count: u32,
}

impl Default for CombatConfig {
    fn default() -> Self {
        Self {
            fire_range: 24,
            grenade_range: 18,
            attack_cooldown: 15,
            grenade_throw_range: 7,
            grenade_cluster_radius: 2,
            grenade_min_enemies: 2,
            grenade_cooldown: 25,
            bullet_speed: 0.55,
            bullet_ttl: 140,
            bullet_damage: 1,
            bullet_hit_radius: 0.35,
            bullet_risk_deposit: 0.0015,
            friendly_fire: false,
            throw_speed: 0.40,
            throw_min_frames: 10,
            throw_max_frames: 90,
            gravity: -0.08,
            rock_detonation_height: 0.25,
            blast_radius: 2.5,
            blast_center_damage: 50.0,
            blast_edge_damage: 10.0,
            blast_cover_factor: 0.35,
            shrapnel_count: 8,
        }
    }
}

/// Path planning and tactical positioning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MovementConfig {
    /// Ticks between two steps of a moving unit.
    pub frames_per_step: u32,
    /// Base risk weight for A*.
    pub astar_risk_weight: f32,
    /// Extra step cost for entering a cell held by another unit.
    pub occupancy_penalty: f32,
    /// Path cells sampled when checking whether to replan.
    pub path_risk_sample_len: usize,
    /// Replan when the sampled path risk reaches this.
    pub replan_risk_delta: f32,
    /// Search radius of the local cover step.
    pub local_cover_radius: i32,
    /// Minimum risk drop the local cover step looks for.
    pub local_cover_delta: f32,
    /// Radius searched by the Defending state.
    pub defend_radius: i32,
    /// Highest normalized risk acceptable for a defend cell.
    pub defend_risk_threshold: f32,
    /// Bonus subtracted from a defend cell's score when terrain shields it.
    pub defend_cover_bonus: f32,
    /// Radius of the retreat search.
    pub retreat_radius: i32,
    /// Window half-size searched for a vantage point.
    pub vantage_search_radius: i32,
    /// Weight of travel distance when scoring vantage points.
    pub vantage_distance_weight: f32,
}

impl Default for MovementConfig {
    fn default() -> Self {
        Self {
            frames_per_step: 6,
            astar_risk_weight: 5.5,
            occupancy_penalty: 25.0,
            path_risk_sample_len: 8,
            replan_risk_delta: 0.18,
            local_cover_radius: 2,
            local_cover_delta: 0.22,
            defend_radius: 6,
            defend_risk_threshold: 0.25,
            defend_cover_bonus: 0.25,
            retreat_radius: 35,
            vantage_search_radius: 10,
            vantage_distance_weight: 0.15,
        }
    }
}

/// Commander decision loop.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CommanderConfig {
    /// Ticks between full decision passes.
    pub decision_interval: u32,
    /// Ticks between enemy-sighting sweeps.
    pub sighting_interval: u32,
    /// Sightings older than this many ticks are forgotten.
    pub enemy_ttl: u32,
    /// Sightings within this squared distance are merged.
    pub merge_dist2: i32,
    /// Lifetime of a support soft lock.
    pub support_lock_frames: u32,
    /// Window during which a similar order is suppressed.
    pub order_cooldown: u32,
    /// AttackTo orders within this Manhattan distance count as similar.
    pub hysteresis_attack: i32,
    /// DefendAt orders within this Manhattan distance count as similar.
    pub hysteresis_defend: i32,
    /// MoveTo orders within this Manhattan distance count as similar.
    pub hysteresis_move: i32,
    /// Highest acceptable anchor risk.
    pub safe_risk_max: f32,
    /// Anchor sampling stops early at or below this risk.
    pub anchor_early_accept: f32,
    /// Random samples per anchor search pass.
    pub anchor_retries: u32,
    /// Ticks between safety checks of the anchor.
    pub safety_interval: u32,
    /// Band above `safe_risk_max` tolerated before re-anchoring.
    pub safety_hysteresis: f32,
    /// Minimum ticks between two re-anchors.
    pub reanchor_cooldown: u32,
    /// Enemies closer than this raise the hybrid risk of a cell.
    pub proximity_radius: f32,
}

impl Default for CommanderConfig {
    fn default() -> Self {
        Self {
            decision_interval: 30,
            sighting_interval: 15,
            enemy_ttl: 360,
            merge_dist2: 4,
            support_lock_frames: 480,
            order_cooldown: 45,
            hysteresis_attack: 3,
            hysteresis_defend: 2,
            hysteresis_move: 2,
            safe_risk_max: 0.18,
            anchor_early_accept: 0.05,
            anchor_retries: 400,
            safety_interval: 30,
            safety_hysteresis: 0.05,
            reanchor_cooldown: 180,
            proximity_radius: 15.0,
        }
    }
}

/// Complete simulation configuration.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    /// Seed for terrain generation and every other random choice.
    pub seed: u64,
    /// Map geometry.
    pub grid: GridConfig,
    /// Risk field.
    pub risk: RiskConfig,
    /// Unit stats.
    pub units: UnitConfig,
    /// Weapons.
    pub combat: CombatConfig,
    /// Path planning.
    pub movement: MovementConfig,
    /// Commander loop.
    pub commander: CommanderConfig,
}

impl SimConfig {
    /// Parse a RON document and validate it.
    pub fn from_ron_str(text: &str) -> Result<Self> {
        let config: Self = ron::from_str(text).map_err(|e| SimError::ConfigParse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Render this configuration as pretty RON.
    pub fn to_ron_string(&self) -> Result<String> {
        ron::ser::to_string_pretty(self, ron::ser::PrettyConfig::default())
            .map_err(|e| SimError::ConfigParse(e.to_string()))
    }

    /// Set the seed.
    pub const fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Set the grid size.
    pub const fn with_grid_size(mut self, size: i32) -> Self {
        self.grid.size = size;
        self
    }

    /// Check that every value is usable.
    pub fn validate(&self) -> Result<()> {
        fn invalid(field: &'static str, reason: &str) -> SimError {
            SimError::InvalidConfig {
                field,
                reason: reason.to_owned(),
            }
        }
        fn unit_interval(field: &'static str, v: f32) -> Result<()> {
            if (0.0..=1.0).contains(&v) {
                Ok(())
            } else {
                Err(invalid(field, "must be within [0, 1]"))
            }
        }

        let g = &self.grid;
        if g.size < 24 {
            return Err(invalid("grid.size", "must be at least 24"));
        }
        let p = &g.playfield;
        if p.top < 0 || p.bottom < 0 || p.left < 0 || p.right < 0 {
            return Err(invalid("grid.playfield", "margins must be non-negative"));
        }
        if p.top + p.bottom >= g.size || p.left + p.right >= g.size {
            return Err(invalid("grid.playfield", "margins leave no playable area"));
        }
        if g.tree_area_divisor <= 0 || g.rock_area_divisor <= 0 {
            return Err(invalid("grid.*_area_divisor", "must be positive"));
        }
        if !(0.0..=1.0).contains(&g.rock_extend_chance) {
            return Err(invalid("grid.rock_extend_chance", "must be within [0, 1]"));
        }

        let r = &self.risk;
        if r.samples < 2 {
            return Err(invalid("risk.samples", "must be at least 2"));
        }
        if !(r.decay > 0.0 && r.decay < 1.0) {
            return Err(invalid("risk.decay", "must be in (0, 1)"));
        }
        unit_interval("risk.tree_factor", r.tree_factor)?;

        let u = &self.units;
        if u.hp_max <= 0 {
            return Err(invalid("units.hp_max", "must be positive"));
        }
        if u.sight_range <= 0 {
            return Err(invalid("units.sight_range", "must be positive"));
        }
        unit_interval("units.under_fire_threshold", u.under_fire_threshold)?;

        let c = &self.combat;
        if c.fire_range <= 0 || c.grenade_range <= 0 {
            return Err(invalid("combat.*_range", "must be positive"));
        }
        if c.bullet_speed <= 0.0 || c.throw_speed <= 0.0 {
            return Err(invalid("combat.*_speed", "must be positive"));
        }
        if c.throw_min_frames <= 0 || c.throw_min_frames > c.throw_max_frames {
            return Err(invalid("combat.throw_*_frames", "need 0 < min <= max"));
        }
        if c.gravity >= 0.0 {
            return Err(invalid("combat.gravity", "must be negative"));
        }
        unit_interval("combat.blast_cover_factor", c.blast_cover_factor)?;

        let m = &self.movement;
        if m.frames_per_step == 0 {
            return Err(invalid("movement.frames_per_step", "must be positive"));
        }
        unit_interval("movement.replan_risk_delta", m.replan_risk_delta)?;
        unit_interval("movement.defend_risk_threshold", m.defend_risk_threshold)?;

        let k = &self.commander;
        if k.decision_interval == 0 || k.sighting_interval == 0 || k.safety_interval == 0 {
            return Err(invalid("commander.*_interval", "must be positive"));
        }
        unit_interval("commander.safe_risk_max", k.safe_risk_max)?;
        Ok(())
    }
}
