//! Match metrics collection.
//!
//! A [`MetricsCollector`] is fed from each tick's events while a match runs
//! and finalized from the end state; [`BatchSummary`] aggregates many
//! finished matches.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tactics_core::units::{Role, Team};
use tactics_core::world::{MatchOutcome, World};

/// Complete metrics for a single match.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MatchMetrics {
    /// Unique match identifier.
    pub match_id: String,
    /// Seed the match was generated from.
    pub seed: u64,
    /// Ticks played.
    pub duration_ticks: u64,
    /// Winning team (None = tick limit reached first).
    pub winner: Option<String>,
    /// How the match ended.
    pub end_condition: String,
    /// Per-team metrics.
    pub teams: HashMap<String, TeamMetrics>,
    /// Rifle shots fired by both sides. Grenade shrapnel is not counted.
    pub shots_fired: u64,
    /// Grenades thrown or dropped by both sides.
    pub grenades_thrown: u64,
    /// Timed events log.
    pub events: Vec<TimedEvent>,
    /// Final state hash.
    pub final_state_hash: u64,
}

impl MatchMetrics {
    /// Create an empty record.
    #[must_use]
    pub fn new(match_id: impl Into<String>, seed: u64) -> Self {
        let mut metrics = Self {
            match_id: match_id.into(),
            seed,
            ..Default::default()
        };
        for team in Team::ALL {
            metrics.team_mut(team);
        }
        metrics
    }

    /// Get or create team metrics.
    pub fn team_mut(&mut self, team: Team) -> &mut TeamMetrics {
        self.teams
            .entry(team.to_string())
            .or_insert_with(|| TeamMetrics::new(team))
    }

    /// Metrics for `team`, if any were recorded.
    #[must_use]
    pub fn team(&self, team: Team) -> Option<&TeamMetrics> {
        self.teams.get(&team.to_string())
    }

    /// Record a timed event.
    pub fn record_event(&mut self, tick: u64, event_type: EventType, team: Team, details: &str) {
        self.events.push(TimedEvent {
            tick,
            event_type,
            team: team.to_string(),
            details: details.to_string(),
        });
    }
}

/// Metrics for one team in a match.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TeamMetrics {
    /// Team name.
    pub team: String,
    /// Living units at the end, by role.
    pub survivors: HashMap<String, u32>,
    /// Units lost, by role.
    pub units_lost: HashMap<String, u32>,
    /// Enemy units this team killed.
    pub kills: u32,
    /// Total damage dealt.
    pub damage_dealt: i64,
    /// Orders the commander issued.
    pub orders_issued: u64,
    /// Tick the warriors went autonomous.
    pub autonomous_tick: Option<u64>,
    /// Tick the commander started fighting.
    pub commander_fighting_tick: Option<u64>,
}

impl TeamMetrics {
    /// Create empty team metrics.
    #[must_use]
    pub fn new(team: Team) -> Self {
        Self {
            team: team.to_string(),
            ..Default::default()
        }
    }

    /// Total living units at the end.
    #[must_use]
    pub fn survivor_count(&self) -> u32 {
        self.survivors.values().sum()
    }

    /// Record the loss of a unit.
    pub fn record_unit_lost(&mut self, role: Role) {
        *self.units_lost.entry(role_name(role)).or_insert(0) += 1;
    }
}

/// Types of timed events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventType {
    /// A unit died.
    UnitKilled,
    /// A grenade went off.
    GrenadeDetonated,
    /// Warriors lost their commander.
    WentAutonomous,
    /// A commander took up a rifle.
    CommanderFighting,
    /// The match was decided.
    MatchDecided,
}

/// A timestamped event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimedEvent {
    /// Tick when the event occurred.
    pub tick: u64,
    /// Type of event.
    pub event_type: EventType,
    /// Team involved.
    pub team: String,
    /// Additional details.
    pub details: String,
}

/// Aggregate statistics over a batch of matches.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BatchSummary {
    /// Matches played.
    pub total_matches: u32,
    /// Wins by team.
    pub wins_by_team: HashMap<String, u32>,
    /// Matches stopped by the tick limit.
    pub undecided: u32,
    /// Win rate by team.
    pub win_rates: HashMap<String, f64>,
    /// Mean match length in ticks.
    pub avg_duration_ticks: f64,
    /// Mean rifle shots per match.
    pub avg_shots_fired: f64,
    /// Mean grenades per match.
    pub avg_grenades_thrown: f64,
}

impl BatchSummary {
    /// Aggregate finished matches.
    #[must_use]
    pub fn from_matches(matches: &[MatchMetrics]) -> Self {
        let mut summary = Self {
            total_matches: matches.len() as u32,
            ..Default::default()
        };
        if matches.is_empty() {
            return summary;
        }

        for m in matches {
            match &m.winner {
                Some(team) => *summary.wins_by_team.entry(team.clone()).or_insert(0) += 1,
                None => summary.undecided += 1,
            }
        }
        let n = matches.len() as f64;
        summary.win_rates = summary
            .wins_by_team
            .iter()
            .map(|(team, wins)| (team.clone(), f64::from(*wins) / n))
            .collect();
        summary.avg_duration_ticks = matches.iter().map(|m| m.duration_ticks as f64).sum::<f64>() / n;
        summary.avg_shots_fired = matches.iter().map(|m| m.shots_fired as f64).sum::<f64>() / n;
        summary.avg_grenades_thrown =
            matches.iter().map(|m| m.grenades_thrown as f64).sum::<f64>() / n;
        summary
    }
}

/// Tracks events as a match runs.
#[derive(Debug, Default)]
pub struct MetricsCollector {
    metrics: MatchMetrics,
    current_tick: u64,
}

impl MetricsCollector {
    /// Create a collector for one match.
    #[must_use]
    pub fn new(match_id: &str, seed: u64) -> Self {
        Self {
            metrics: MatchMetrics::new(match_id, seed),
            current_tick: 0,
        }
    }

    /// Update the current tick.
    pub fn set_tick(&mut self, tick: u64) {
        self.current_tick = tick;
    }

    /// Record damage dealt by `by`.
    pub fn on_damage(&mut self, by: Team, amount: i32) {
        self.metrics.team_mut(by).damage_dealt += i64::from(amount);
    }

    /// Record a kill credited to `by`.
    pub fn on_kill(&mut self, by: Team) {
        self.metrics.team_mut(by).kills += 1;
    }

    /// Record a death.
    pub fn on_unit_lost(&mut self, team: Team, role: Role) {
        self.metrics.team_mut(team).record_unit_lost(role);
        self.metrics
            .record_event(self.current_tick, EventType::UnitKilled, team, &role_name(role));
    }

    /// Record a detonation.
    pub fn on_detonation(&mut self, team: Team, details: &str) {
        self.metrics
            .record_event(self.current_tick, EventType::GrenadeDetonated, team, details);
    }

    /// Record a team's warriors going autonomous.
    pub fn on_went_autonomous(&mut self, team: Team) {
        let tick = self.current_tick;
        let team_metrics = self.metrics.team_mut(team);
        if team_metrics.autonomous_tick.is_none() {
            team_metrics.autonomous_tick = Some(tick);
            self.metrics
                .record_event(tick, EventType::WentAutonomous, team, "Commander lost");
        }
    }

    /// Record a commander entering fighting mode.
    pub fn on_commander_fighting(&mut self, team: Team) {
        let tick = self.current_tick;
        let team_metrics = self.metrics.team_mut(team);
        if team_metrics.commander_fighting_tick.is_none() {
            team_metrics.commander_fighting_tick = Some(tick);
            self.metrics
                .record_event(tick, EventType::CommanderFighting, team, "No warriors left");
        }
    }

    /// Record the deciding tick.
    pub fn on_outcome(&mut self, outcome: MatchOutcome) {
        let MatchOutcome::Winner(team) = outcome;
        self.metrics
            .record_event(self.current_tick, EventType::MatchDecided, team, "Elimination");
    }

    /// Finalize from the end state of `world`.
    #[must_use]
    pub fn finalize(mut self, world: &World) -> MatchMetrics {
        let m = &mut self.metrics;
        m.duration_ticks = world.frame();
        (m.winner, m.end_condition) = match world.outcome() {
            Some(MatchOutcome::Winner(team)) => (Some(team.to_string()), "elimination".to_string()),
            None => (None, "tick_limit".to_string()),
        };
        m.shots_fired = world.context().combat.shots_fired();
        m.grenades_thrown = world.context().combat.grenades_thrown();
        m.final_state_hash = world.state_hash();

        for team in Team::ALL {
            m.team_mut(team).orders_issued = world.commander(team).orders_issued();
        }
        for unit in world.unit_snapshots().into_iter().filter(|u| u.alive) {
            *m.team_mut(unit.team)
                .survivors
                .entry(role_name(unit.role))
                .or_insert(0) += 1;
        }
        self.metrics
    }

    /// Get current metrics (immutable).
    #[must_use]
    pub fn current(&self) -> &MatchMetrics {
        &self.metrics
    }
}

/// Stable key for a role in the metrics maps.
#[must_use]
pub fn role_name(role: Role) -> String {
    format!("{role:?}").to_lowercase()
}
