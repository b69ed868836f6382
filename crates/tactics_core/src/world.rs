//! The match world and its fixed-tick loop.
//!
//! A [`World`] owns the [`SimContext`] and both team commanders and
//! advances them one tick at a time.
//!
//! # Tick Order
//!
//! 1. **Combat** - bullets and grenades move, hit and detonate
//! 2. **Outcome** - a team without warriors loses
//! 3. **Contingencies** - leaderless warriors go autonomous, a commander
//!    without warriors starts fighting
//! 4. **Mailboxes** - units react to broadcasts and acknowledge orders
//! 5. **State machines** - every living unit updates its current state
//! 6. **Warrior self-checks** - grenades, autonomous engagement, reports
//! 7. **Sighting sweep** - periodic EnemySighted reports from every unit
//! 8. **Commanders** - mailbox, safety monitor, periodic decision pass
//!
//! Bullets therefore resolve before any unit acts in the same tick.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

use crate::combat::CombatEvent;
use crate::commander::Commander;
use crate::config::SimConfig;
use crate::context::SimContext;
use crate::error::{Result, SimError};
use crate::events::{Channel, EventKind, Message, Subscriber};
use crate::fsm::{change_state, support_state, update_unit, State, StateKind};
use crate::grid::Grid;
use crate::math::GridPos;
use crate::orders::Order;
use crate::units::{Role, Team, Unit, UnitId};
use crate::visibility::{team_visibility, VisibilityMask};
use crate::warrior;

/// How a match ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MatchOutcome {
    /// The named team still has warriors; the other has none.
    Winner(Team),
}

/// Everything notable that happened during one tick.
#[derive(Debug, Clone, Default)]
pub struct TickEvents {
    /// Hits, kills and detonations from the combat system.
    pub combat: Vec<CombatEvent>,
    /// Units that died this tick.
    pub deaths: Vec<UnitId>,
    /// Teams whose warriors went autonomous this tick.
    pub went_autonomous: Vec<Team>,
    /// Teams whose commander started fighting this tick.
    pub commander_fighting: Vec<Team>,
    /// Set on the tick the match was decided.
    pub outcome: Option<MatchOutcome>,
}

/// Read-only view of a unit for renderers and metrics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnitSnapshot {
    /// Handle.
    pub id: UnitId,
    /// Side.
    pub team: Team,
    /// Function.
    pub role: Role,
    /// Cell.
    pub pos: GridPos,
    /// Health.
    pub hp: i32,
    /// Rifle ammunition.
    pub ammo: i32,
    /// Grenades left.
    pub grenades: i32,
    /// Heal pool or ammo stock.
    pub stock: i32,
    /// Liveness.
    pub alive: bool,
    /// Current state.
    pub state: StateKind,
    /// Acting without a commander.
    pub autonomous: bool,
}

impl From<&Unit> for UnitSnapshot {
    fn from(unit: &Unit) -> Self {
        Self {
            id: unit.id,
            team: unit.team,
            role: unit.role,
            pos: unit.pos,
            hp: unit.stats.hp,
            ammo: unit.stats.ammo,
            grenades: unit.stats.grenades,
            stock: unit.stock.amount(),
            alive: unit.alive,
            state: unit.state_kind(),
            autonomous: unit.autonomous,
        }
    }
}

/// A running match.
#[derive(Debug, Clone)]
pub struct World {
    ctx: SimContext,
    commanders: [Commander; 2],
    commanders_enabled: bool,
    outcome: Option<MatchOutcome>,
}

impl World {
    /// World over an existing terrain.
    ///
    /// Validates `config`, clears blocking terrain outside the playfield and
    /// builds the risk field. The roster starts empty and commanders start
    /// disabled.
    ///
    /// # Errors
    ///
    /// Returns [`SimError::InvalidConfig`] when `config` fails validation.
    pub fn new(config: SimConfig, mut grid: Grid) -> Result<Self> {
        config.validate()?;
        let cleared = grid.sanitize_border();
        if cleared > 0 {
            tracing::debug!(cleared, "Cleared terrain outside the playfield");
        }
        let cooldown = config.commander.reanchor_cooldown;
        let ctx = SimContext::new(config, grid);
        tracing::info!(size = ctx.grid.size(), seed = ctx.config.seed, "World created");
        Ok(Self {
            ctx,
            commanders: [
                Commander::new(Team::Blue, None, cooldown),
                Commander::new(Team::Orange, None, cooldown),
            ],
            commanders_enabled: false,
            outcome: None,
        })
    }

    /// World over freshly generated terrain.
    ///
    /// Terrain generation and every later random draw share one PRNG stream
    /// seeded from `config.seed`.
    ///
    /// # Errors
    ///
    /// Returns [`SimError::InvalidConfig`] when `config` fails validation.
    pub fn generate(config: SimConfig) -> Result<Self> {
        config.validate()?;
        let mut rng = ChaCha8Rng::seed_from_u64(config.seed);
        let grid = Grid::generate(&config.grid, &mut rng);
        let mut world = Self::new(config, grid)?;
        world.ctx.rng = rng;
        Ok(world)
    }

    /// Add a unit to the roster.
    ///
    /// A Commander becomes its team's commander unit (replacing any
    /// previous one).
    ///
    /// # Errors
    ///
    /// Returns [`SimError::OutOfBounds`] when `pos` is off the grid.
    pub fn spawn_unit(&mut self, team: Team, role: Role, pos: GridPos) -> Result<UnitId> {
        if !self.ctx.grid.in_bounds(pos) {
            return Err(SimError::OutOfBounds {
                pos,
                size: self.ctx.grid.size(),
            });
        }
        if !self.ctx.grid.at(pos).is_walkable() || self.ctx.units.unit_at(pos).is_some() {
            tracing::warn!(?team, ?role, %pos, "Spawning onto a blocked or occupied cell");
        }

        let config = self.ctx.config.units.clone();
        let id = self.ctx.units.spawn(team, role, pos, &config);
        self.ctx.bus.subscribe(Channel::Broadcast, Subscriber::Unit(id));
        self.ctx.bus.subscribe(Channel::Unit(id), Subscriber::Unit(id));

        if role == Role::Commander {
            let commander = Commander::new(team, Some(id), self.ctx.config.commander.reanchor_cooldown);
            commander.subscribe(&mut self.ctx.bus);
            self.commanders[team.index()] = commander;
        }
        tracing::debug!(unit = %id, ?team, ?role, %pos, "Unit spawned");
        Ok(id)
    }

    /// Move a unit before the match starts (spawn placement).
    ///
    /// # Errors
    ///
    /// Returns [`SimError::UnknownUnit`] for a stale id and
    /// [`SimError::OutOfBounds`] for an off-grid cell.
    pub fn place_unit(&mut self, id: UnitId, pos: GridPos) -> Result<()> {
        if !self.ctx.grid.in_bounds(pos) {
            return Err(SimError::OutOfBounds {
                pos,
                size: self.ctx.grid.size(),
            });
        }
        let unit = self.ctx.units.get_mut(id).ok_or(SimError::UnknownUnit(id))?;
        unit.pos = pos;
        unit.moving = false;
        unit.path.clear();
        Ok(())
    }

    /// Advance one tick.
    pub fn tick(&mut self) -> TickEvents {
        let mut events = TickEvents::default();
        if self.outcome.is_some() {
            return events;
        }

        // 1. Combat System
        let ctx = &mut self.ctx;
        ctx.combat.tick(&ctx.grid, &mut ctx.risk, &mut ctx.units);
        events.combat = ctx.combat.drain_events();
        events.deaths = events
            .combat
            .iter()
            .filter_map(|e| match e {
                CombatEvent::Killed { target, .. } => Some(*target),
                _ => None,
            })
            .collect();
        for dead in &events.deaths {
            tracing::debug!(unit = %dead, tick = self.ctx.frame, "Unit killed");
        }

        // 2. Outcome Check
        if let Some(outcome) = self.check_outcome() {
            tracing::info!(?outcome, tick = self.ctx.frame, "Match decided");
            self.outcome = Some(outcome);
            events.outcome = Some(outcome);
            self.ctx.frame += 1;
            return events;
        }

        // 3. Contingency System
        self.run_contingencies(&mut events);

        // 4. Mailbox System
        let ids = self.ctx.units.ids();
        for &id in &ids {
            self.process_mailbox(id);
        }

        // 5. State Machine System
        for &id in &ids {
            if self.ctx.units.living(id).is_some() {
                update_unit(&mut self.ctx, id);
            }
        }

        // 6. Warrior Self-Check System
        warrior::check_all(&mut self.ctx, &ids);

        // 7. Sighting Sweep
        let sweep = u64::from(self.ctx.config.commander.sighting_interval.max(1));
        if self.commanders_enabled && self.ctx.frame % sweep == 0 {
            self.run_sighting_sweep(&ids);
        }

        // 8. Commander System
        if self.commanders_enabled {
            for commander in &mut self.commanders {
                commander.tick(&mut self.ctx);
            }
        }

        self.ctx.frame += 1;

        #[cfg(debug_assertions)]
        {
            let hash = self.state_hash();
            tracing::debug!(tick = self.ctx.frame, state_hash = hash, "Simulation state hash");
        }

        events
    }

    /// Tick until the match is decided or `max_ticks` ticks have run.
    /// Returns the number of ticks played.
    pub fn run(&mut self, max_ticks: u64) -> u64 {
        let mut played = 0;
        while played < max_ticks && self.outcome.is_none() {
            self.tick();
            played += 1;
        }
        played
    }

    fn check_outcome(&self) -> Option<MatchOutcome> {
        let blue = self.ctx.units.any_alive(Team::Blue, Role::Warrior);
        let orange = self.ctx.units.any_alive(Team::Orange, Role::Warrior);
        match (blue, orange) {
            (true, false) => Some(MatchOutcome::Winner(Team::Blue)),
            (false, true) => Some(MatchOutcome::Winner(Team::Orange)),
            _ => None,
        }
    }

    fn run_contingencies(&mut self, events: &mut TickEvents) {
        for team in Team::ALL {
            let commander_alive = self.ctx.units.any_alive(team, Role::Commander);
            let warriors_alive = self.ctx.units.any_alive(team, Role::Warrior);

            if !commander_alive && warriors_alive {
                let mut changed = false;
                for unit in self.ctx.units.iter_mut() {
                    if unit.alive && unit.team == team && unit.role == Role::Warrior && !unit.autonomous {
                        unit.autonomous = true;
                        changed = true;
                    }
                }
                if changed {
                    tracing::info!(?team, tick = self.ctx.frame, "Commander down; warriors autonomous");
                    events.went_autonomous.push(team);
                }
            } else if commander_alive && !warriors_alive {
                let commander = self
                    .ctx
                    .units
                    .iter_mut()
                    .find(|u| u.alive && u.team == team && u.role == Role::Commander);
                if let Some(unit) = commander.filter(|u| !u.fighting) {
                    unit.fighting = true;
                    tracing::info!(?team, tick = self.ctx.frame, "Warriors down; commander fights");
                    events.commander_fighting.push(team);
                }
            }
        }
    }

    fn process_mailbox(&mut self, id: UnitId) {
        let inbox = self.ctx.bus.drain(Subscriber::Unit(id));
        if self.ctx.units.living(id).is_none() {
            return;
        }
        for msg in &inbox {
            self.handle_unit_message(id, msg);
        }
    }

    fn handle_unit_message(&mut self, id: UnitId, msg: &Message) {
        let Some(me) = self.ctx.units.living(id) else {
            return;
        };
        let (team, role, pos) = (me.team, me.role, me.pos);
        let sender_team = msg.from.and_then(|f| self.ctx.units.get(f)).map(|u| u.team);

        match msg.kind {
            EventKind::CommanderDown => {
                if msg.extra != team.index() as i32 || role == Role::Commander {
                    return;
                }
                let interruptible = me.is_interruptible();
                if let Some(unit) = self.ctx.units.get_mut(id) {
                    unit.autonomous = true;
                }
                if interruptible {
                    change_state(&mut self.ctx, id, State::Idle);
                }
            }
            EventKind::Injured | EventKind::LowAmmo => {
                let serves = match msg.kind {
                    EventKind::Injured => Role::Medic,
                    _ => Role::Supplier,
                };
                let Some(patient) = msg.from else {
                    return;
                };
                let busy_helping = matches!(
                    me.state_kind(),
                    StateKind::Healing | StateKind::Supplying | StateKind::RefillAtDepot
                );
                if role != serves
                    || !me.autonomous
                    || !me.is_interruptible()
                    || busy_helping
                    || patient == id
                    || sender_team != Some(team)
                {
                    return;
                }
                let next = support_state(me, patient, &self.ctx.config);
                tracing::debug!(unit = %id, patient = %patient, next = %next.kind(), "Autonomous support");
                change_state(&mut self.ctx, id, next);
            }
            EventKind::OrderIssued if msg.to == Channel::Unit(id) => {
                self.ctx.publish(Message {
                    kind: EventKind::OrderAck,
                    from: Some(id),
                    to: Channel::Broadcast,
                    pos: Some(pos),
                    extra: msg.extra,
                });
            }
            _ => {}
        }
    }

    fn run_sighting_sweep(&mut self, ids: &[UnitId]) {
        for &id in ids {
            let Some(enemy) = warrior::first_visible_enemy(&self.ctx, id) else {
                continue;
            };
            self.ctx.publish(Message::report(EventKind::EnemySighted, id, enemy, 0));
        }
    }

    /// Deterministic hash of the observable state.
    pub fn state_hash(&self) -> u64 {
        let mut hasher = DefaultHasher::new();
        self.ctx.frame.hash(&mut hasher);
        for unit in self.ctx.units.iter() {
            unit.id.hash(&mut hasher);
            unit.pos.hash(&mut hasher);
            unit.alive.hash(&mut hasher);
            unit.stats.hp.hash(&mut hasher);
            unit.stats.ammo.hash(&mut hasher);
            unit.stats.grenades.hash(&mut hasher);
            unit.stock.amount().hash(&mut hasher);
            unit.state_kind().hash(&mut hasher);
        }
        self.ctx.combat.bullets().len().hash(&mut hasher);
        self.ctx.combat.grenades().len().hash(&mut hasher);
        hasher.finish()
    }

    // ------------------------------------------------------------------
    // External operations
    // ------------------------------------------------------------------

    /// Turn the commanders' loop (and the sighting sweep) on or off.
    pub fn set_commanders_enabled(&mut self, enabled: bool) {
        tracing::info!(enabled, "Commanders toggled");
        self.commanders_enabled = enabled;
    }

    /// Whether commanders are running.
    #[must_use]
    pub const fn commanders_enabled(&self) -> bool {
        self.commanders_enabled
    }

    /// Kill `team`'s commander outright and announce it. Returns `false`
    /// when the team has no living commander.
    pub fn kill_commander(&mut self, team: Team) -> bool {
        let Some(id) = self.commanders[team.index()].unit() else {
            return false;
        };
        let Some(unit) = self.ctx.units.get_mut(id).filter(|u| u.alive) else {
            return false;
        };
        unit.alive = false;
        unit.moving = false;
        unit.path.clear();
        self.commanders[team.index()].announce_down(&mut self.ctx);
        true
    }

    /// Issue an order on behalf of `team`'s commander.
    ///
    /// # Errors
    ///
    /// See [`Commander::issue_order`].
    pub fn issue_order(&mut self, team: Team, id: UnitId, order: Order) -> Result<()> {
        self.commanders[team.index()].issue_order(&mut self.ctx, id, order)
    }

    /// Pick a new anchor for `team`.
    pub fn select_anchor(&mut self, team: Team) -> Option<GridPos> {
        self.commanders[team.index()].select_anchor(&mut self.ctx)
    }

    /// Force `team`'s anchor.
    pub fn set_anchor(&mut self, team: Team, anchor: Option<GridPos>) {
        self.commanders[team.index()].set_anchor(anchor);
    }

    /// Rebuild the risk field from terrain.
    pub fn rebuild_risk(&mut self) {
        self.ctx.rebuild_risk();
    }

    /// Whether `id` is alive and may be given a new order.
    #[must_use]
    pub fn is_interruptible(&self, id: UnitId) -> bool {
        self.ctx.units.living(id).is_some_and(Unit::is_interruptible)
    }

    /// Cells currently visible to `team`.
    #[must_use]
    pub fn team_visibility(&self, team: Team) -> VisibilityMask {
        team_visibility(
            &self.ctx.grid,
            &self.ctx.units,
            team,
            self.ctx.config.units.sight_range,
        )
    }

    /// Snapshot of every unit, dead ones included.
    #[must_use]
    pub fn unit_snapshots(&self) -> Vec<UnitSnapshot> {
        self.ctx.units.iter().map(UnitSnapshot::from).collect()
    }

    /// Copy of the risk field, row-major.
    #[must_use]
    pub fn risk_snapshot(&self) -> Vec<f32> {
        self.ctx.risk.values().to_vec()
    }

    // ------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------

    /// Shared simulation state.
    #[must_use]
    pub const fn context(&self) -> &SimContext {
        &self.ctx
    }

    /// Mutable simulation state, for setup and tests.
    pub fn context_mut(&mut self) -> &mut SimContext {
        &mut self.ctx
    }

    /// Terrain.
    #[must_use]
    pub const fn grid(&self) -> &Grid {
        &self.ctx.grid
    }

    /// Ticks simulated so far.
    #[must_use]
    pub const fn frame(&self) -> u64 {
        self.ctx.frame
    }

    /// Result, once decided.
    #[must_use]
    pub const fn outcome(&self) -> Option<MatchOutcome> {
        self.outcome
    }

    /// `team`'s commander.
    #[must_use]
    pub fn commander(&self, team: Team) -> &Commander {
        &self.commanders[team.index()]
    }

    /// Unit `id`, dead or alive.
    #[must_use]
    pub fn unit(&self, id: UnitId) -> Option<&Unit> {
        self.ctx.units.get(id)
    }
}
