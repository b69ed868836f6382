//! Fixed-tick match runner.

use serde::{Deserialize, Serialize};
use tactics_core::combat::CombatEvent;
use tactics_core::config::SimConfig;
use tactics_core::world::{TickEvents, World};

use crate::error::Result;
use crate::metrics::{MatchMetrics, MetricsCollector};
use crate::scenario::{self, SkirmishOptions};

/// Default tick limit: ten minutes at 60 ticks per second.
pub const DEFAULT_MAX_TICKS: u64 = 36_000;

/// Settings for one match.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchConfig {
    /// Simulation parameters, seed included.
    pub sim: SimConfig,
    /// Stop after this many ticks even if undecided.
    pub max_ticks: u64,
    /// Run the commanders' loop.
    pub commanders: bool,
    /// Scatter warriors at spawn.
    pub scatter_warriors: bool,
}

impl Default for MatchConfig {
    fn default() -> Self {
        Self {
            sim: SimConfig::default(),
            max_ticks: DEFAULT_MAX_TICKS,
            commanders: true,
            scatter_warriors: true,
        }
    }
}

impl MatchConfig {
    /// Default match over `sim`.
    #[must_use]
    pub fn new(sim: SimConfig) -> Self {
        Self {
            sim,
            ..Default::default()
        }
    }

    /// Set the tick limit.
    #[must_use]
    pub fn with_max_ticks(mut self, max_ticks: u64) -> Self {
        self.max_ticks = max_ticks;
        self
    }

    /// Set the seed.
    #[must_use]
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.sim.seed = seed;
        self
    }

    /// Enable or disable commanders.
    #[must_use]
    pub fn with_commanders(mut self, enabled: bool) -> Self {
        self.commanders = enabled;
        self
    }
}

/// Drives one world tick by tick and records what happens.
#[derive(Debug)]
pub struct MatchRunner {
    world: World,
    collector: MetricsCollector,
    max_ticks: u64,
}

impl MatchRunner {
    /// Generate and populate the reference skirmish.
    pub fn new(config: &MatchConfig) -> Result<Self> {
        let options = SkirmishOptions {
            scatter_warriors: config.scatter_warriors,
            commanders: config.commanders,
        };
        let seed = config.sim.seed;
        let world = scenario::skirmish(config.sim.clone(), options)?;
        Ok(Self::from_world(world, config.max_ticks, &format!("match_{seed}")))
    }

    /// Run an already populated world.
    #[must_use]
    pub fn from_world(world: World, max_ticks: u64, match_id: &str) -> Self {
        let seed = world.context().config.seed;
        Self {
            world,
            collector: MetricsCollector::new(match_id, seed),
            max_ticks,
        }
    }

    /// The world being run.
    #[must_use]
    pub const fn world(&self) -> &World {
        &self.world
    }

    /// Whether the match is decided or out of ticks.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.world.outcome().is_some() || self.world.frame() >= self.max_ticks
    }

    /// Advance one tick. Returns `false` once the match is over.
    pub fn step(&mut self) -> bool {
        if self.is_finished() {
            return false;
        }
        let tick = self.world.frame();
        let events = self.world.tick();
        self.collector.set_tick(tick);
        self.record(&events);
        !self.is_finished()
    }

    /// Tick until finished.
    pub fn run(&mut self) {
        while self.step() {}
        tracing::info!(
            ticks = self.world.frame(),
            outcome = ?self.world.outcome(),
            "Match finished"
        );
    }

    /// Stop and produce the metrics, handing back the final world.
    #[must_use]
    pub fn finish(self) -> (World, MatchMetrics) {
        let metrics = self.collector.finalize(&self.world);
        (self.world, metrics)
    }

    fn record(&mut self, events: &TickEvents) {
        for event in &events.combat {
            match *event {
                CombatEvent::Hit { damage, by, .. } => self.collector.on_damage(by, damage),
                CombatEvent::Killed { by, .. } => self.collector.on_kill(by),
                CombatEvent::Detonated { at, team } => {
                    self.collector.on_detonation(team, &at.to_string());
                }
            }
        }
        for &id in &events.deaths {
            if let Some(unit) = self.world.unit(id) {
                self.collector.on_unit_lost(unit.team, unit.role);
            }
        }
        for &team in &events.went_autonomous {
            self.collector.on_went_autonomous(team);
        }
        for &team in &events.commander_fighting {
            self.collector.on_commander_fighting(team);
        }
        if let Some(outcome) = events.outcome {
            self.collector.on_outcome(outcome);
        }
    }
}

/// Play one match to the end.
pub fn run_match(config: &MatchConfig) -> Result<(World, MatchMetrics)> {
    let mut runner = MatchRunner::new(config)?;
    runner.run();
    Ok(runner.finish())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn short_match(seed: u64) -> MatchConfig {
        MatchConfig::new(SimConfig::default().with_grid_size(48))
            .with_seed(seed)
            .with_max_ticks(300)
    }

    #[test]
    fn test_match_config_builder() {
        let config = MatchConfig::default().with_seed(9).with_max_ticks(10).with_commanders(false);
        assert_eq!(config.sim.seed, 9);
        assert_eq!(config.max_ticks, 10);
        assert!(!config.commanders);
    }

    #[test]
    fn test_runner_respects_tick_limit() {
        let (world, metrics) = run_match(&short_match(3)).unwrap();
        assert!(world.frame() <= 300);
        assert_eq!(metrics.duration_ticks, world.frame());
        if world.outcome().is_none() {
            assert_eq!(metrics.duration_ticks, 300);
            assert_eq!(metrics.end_condition, "tick_limit");
        }
    }

    #[test]
    fn test_step_stops_after_finish() {
        let mut runner = MatchRunner::new(&short_match(1).with_max_ticks(5)).unwrap();
        let mut steps = 0;
        while runner.step() {
            steps += 1;
        }
        assert!(runner.is_finished());
        assert!(!runner.step());
        assert!(steps < 5);
        assert_eq!(runner.world().frame(), steps + 1);
    }

    #[test]
    fn test_survivors_match_world() {
        let (world, metrics) = run_match(&short_match(7)).unwrap();
        let alive = world.unit_snapshots().iter().filter(|u| u.alive).count() as u32;
        let counted: u32 = metrics.teams.values().map(|t| t.survivor_count()).sum();
        assert_eq!(alive, counted);
    }
}
