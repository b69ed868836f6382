//! Team commanders.
//!
//! A [`Commander`] listens on the bus for its own team's reports, keeps a
//! short memory of enemy sightings, and periodically turns that picture
//! into orders:
//!
//! - units under fire dig in where they stand,
//! - one free medic per injured report, one free supplier per dry warrior,
//! - every other warrior attacks the current target, or holds the anchor,
//!   or heads for the map centre,
//! - the commander itself walks to the anchor.
//!
//! A safety monitor re-picks the anchor when it becomes dangerous. When the
//! commander is the last fighter of its team it fights like a warrior, and
//! when it dies it announces `CommanderDown` once.

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::context::SimContext;
use crate::error::{OrderRejection, Result, SimError};
use crate::events::{Channel, EventBus, EventKind, Message, Subscriber};
use crate::fsm::{change_state, support_state, State, StateKind};
use crate::grid::Grid;
use crate::math::GridPos;
use crate::orders::{Order, OrderCache};
use crate::pathfinding::MapView;
use crate::units::{Role, Team, UnitArena, UnitId};

/// A remembered enemy sighting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnemyInfo {
    /// Where the enemy was seen.
    pub pos: GridPos,
    /// Frame of the latest sighting.
    pub last_seen: u64,
}

/// The decision maker of one team.
#[derive(Debug, Clone)]
pub struct Commander {
    team: Team,
    unit: Option<UnitId>,
    anchor: Option<GridPos>,
    known_enemies: Vec<EnemyInfo>,
    under_fire: Vec<UnitId>,
    injured: Vec<UnitId>,
    low_ammo: Vec<UnitId>,
    orders: OrderCache,
    last_reanchor: i64,
    down_announced: bool,
    orders_issued: u64,
}

impl Commander {
    /// Commander of `team`, embodied by `unit` (if the team has one).
    #[must_use]
    pub fn new(team: Team, unit: Option<UnitId>, reanchor_cooldown: u32) -> Self {
        Self {
            team,
            unit,
            anchor: None,
            known_enemies: Vec::new(),
            under_fire: Vec::new(),
            injured: Vec::new(),
            low_ammo: Vec::new(),
            orders: OrderCache::new(),
            last_reanchor: -i64::from(reanchor_cooldown),
            down_announced: false,
            orders_issued: 0,
        }
    }

    /// Register this commander's mailbox on the broadcast channel and on
    /// its own unit's channel.
    pub fn subscribe(&self, bus: &mut EventBus) {
        let me = Subscriber::Commander(self.team);
        bus.subscribe(Channel::Broadcast, me);
        if let Some(unit) = self.unit {
            bus.subscribe(Channel::Unit(unit), me);
        }
    }

    /// Team commanded.
    #[must_use]
    pub const fn team(&self) -> Team {
        self.team
    }

    /// The commander's own unit.
    #[must_use]
    pub const fn unit(&self) -> Option<UnitId> {
        self.unit
    }

    /// Current rally point.
    #[must_use]
    pub const fn anchor(&self) -> Option<GridPos> {
        self.anchor
    }

    /// Force the rally point (external bootstrap or tests).
    pub fn set_anchor(&mut self, anchor: Option<GridPos>) {
        self.anchor = anchor;
    }

    /// Sightings still remembered.
    #[must_use]
    pub fn known_enemies(&self) -> &[EnemyInfo] {
        &self.known_enemies
    }

    /// Units whose Injured report has not been served yet.
    #[must_use]
    pub fn pending_injured(&self) -> &[UnitId] {
        &self.injured
    }

    /// Units whose LowAmmo report has not been served yet.
    #[must_use]
    pub fn pending_low_ammo(&self) -> &[UnitId] {
        &self.low_ammo
    }

    /// Units whose UnderFire report has not been served yet.
    #[must_use]
    pub fn pending_under_fire(&self) -> &[UnitId] {
        &self.under_fire
    }

    /// Last order sent to `unit` and the frame it went out.
    #[must_use]
    pub fn last_order(&self, unit: UnitId) -> Option<(Order, u64)> {
        self.orders.last(unit)
    }

    /// Orders and support assignments issued so far.
    #[must_use]
    pub const fn orders_issued(&self) -> u64 {
        self.orders_issued
    }

    /// Whether `CommanderDown` has gone out for this team.
    #[must_use]
    pub const fn is_down_announced(&self) -> bool {
        self.down_announced
    }

    /// Take in everything that arrived in this commander's mailbox.
    pub fn drain_mailbox(&mut self, ctx: &mut SimContext) {
        let inbox = ctx.bus.drain(Subscriber::Commander(self.team));
        for msg in &inbox {
            self.handle_message(ctx, msg);
        }
    }

    /// React to one message. Messages sent by units of the other team are
    /// dropped.
    pub fn handle_message(&mut self, ctx: &SimContext, msg: &Message) {
        if let Some(from) = msg.from {
            match ctx.units.get(from) {
                Some(sender) if sender.team == self.team => {}
                _ => return,
            }
        }

        match msg.kind {
            EventKind::EnemySighted => {
                let Some(pos) = msg.pos else {
                    return;
                };
                self.remember_sighting(pos, ctx.frame, ctx.config.commander.merge_dist2);
            }
            EventKind::UnderFire => push_unique(&mut self.under_fire, msg.from),
            EventKind::LowAmmo => push_unique(&mut self.low_ammo, msg.from),
            EventKind::Injured => push_unique(&mut self.injured, msg.from),
            _ => {}
        }
    }

    fn remember_sighting(&mut self, pos: GridPos, frame: u64, merge_dist2: i32) {
        if let Some(known) = self
            .known_enemies
            .iter_mut()
            .find(|k| k.pos.dist2(pos) <= merge_dist2)
        {
            known.pos = pos;
            known.last_seen = frame;
            return;
        }
        tracing::debug!(team = ?self.team, %pos, "New enemy sighting");
        self.known_enemies.push(EnemyInfo {
            pos,
            last_seen: frame,
        });
    }

    /// Issue `order` to unit `id`.
    ///
    /// Refuses unknown ids, dead units, units of the other team, units whose
    /// state cannot be interrupted, and orders similar to one sent within
    /// the cooldown window. On success the unit is told through an
    /// `OrderIssued` message and switches state immediately.
    pub fn issue_order(&mut self, ctx: &mut SimContext, id: UnitId, order: Order) -> Result<()> {
        let Some(unit) = ctx.units.get(id) else {
            tracing::warn!(team = ?self.team, unit = %id, ?order, "Order to unknown unit");
            return Err(SimError::UnknownUnit(id));
        };
        let rejection = if !unit.alive {
            Some(OrderRejection::Dead)
        } else if unit.team != self.team {
            Some(OrderRejection::EnemyTeam)
        } else if !unit.is_interruptible() {
            Some(OrderRejection::Busy)
        } else if self
            .orders
            .is_debounced(id, &order, ctx.frame, &ctx.config.commander)
        {
            Some(OrderRejection::Debounced)
        } else {
            None
        };
        if let Some(reason) = rejection {
            match reason {
                OrderRejection::Dead | OrderRejection::EnemyTeam => {
                    tracing::warn!(team = ?self.team, unit = %id, ?order, %reason, "Order rejected");
                }
                OrderRejection::Busy | OrderRejection::Debounced => {
                    tracing::debug!(team = ?self.team, unit = %id, ?order, %reason, "Order skipped");
                }
            }
            return Err(SimError::OrderRejected { unit: id, reason });
        }

        let next = match order {
            Order::MoveTo(cell) => State::move_to(cell, State::Idle, &ctx.config),
            Order::AttackTo(cell) => State::attack(cell, &ctx.config),
            Order::DefendAt(cell) => State::defend(cell, &ctx.config),
            Order::Heal(target) | Order::Resupply(target) => {
                support_state(unit, target, &ctx.config)
            }
        };

        tracing::debug!(team = ?self.team, unit = %id, ?order, tick = ctx.frame, "Order issued");
        ctx.publish(Message::direct(EventKind::OrderIssued, self.unit, id, order.code()));
        match order {
            Order::Heal(target) => self.lock_support(ctx, id, target, true),
            Order::Resupply(target) => self.lock_support(ctx, id, target, false),
            _ => {}
        }
        change_state(ctx, id, next);
        self.orders.remember(id, order, ctx.frame);
        self.orders_issued += 1;
        Ok(())
    }

    fn lock_support(&self, ctx: &mut SimContext, helper: UnitId, target: UnitId, heal: bool) {
        let until = ctx.frame + u64::from(ctx.config.commander.support_lock_frames);
        if let Some(unit) = ctx.units.get_mut(helper) {
            if heal {
                unit.assignment.heal_target = Some(target);
            } else {
                unit.assignment.supply_target = Some(target);
            }
            unit.assignment.lock_until = until;
        }
    }

    /// Run this commander for the current frame.
    pub fn tick(&mut self, ctx: &mut SimContext) {
        self.drain_mailbox(ctx);

        let Some(me) = self.unit.and_then(|id| ctx.units.living(id)) else {
            self.announce_down(ctx);
            return;
        };
        if me.fighting {
            self.fight_as_warrior(ctx);
            return;
        }

        let frame = ctx.frame;
        let ttl = u64::from(ctx.config.commander.enemy_ttl);
        self.known_enemies
            .retain(|k| frame.saturating_sub(k.last_seen) <= ttl);
        if ctx.units.enemies_of(self.team).next().is_none() {
            self.known_enemies.clear();
        }

        if self.safety_monitor(ctx) {
            if let (Some(me), Some(anchor)) = (self.unit, self.anchor) {
                let _ = self.issue_order(ctx, me, Order::MoveTo(anchor));
            }
        }

        let interval = u64::from(ctx.config.commander.decision_interval.max(1));
        if frame % interval == 0 {
            self.decide(ctx);
        }
    }

    /// Broadcast `CommanderDown` for this team, once.
    pub fn announce_down(&mut self, ctx: &mut SimContext) {
        if self.down_announced {
            return;
        }
        self.down_announced = true;
        tracing::info!(team = ?self.team, tick = ctx.frame, "Commander down; team goes autonomous");
        ctx.publish(Message {
            kind: EventKind::CommanderDown,
            from: self.unit,
            to: Channel::Broadcast,
            pos: None,
            extra: self.team.index() as i32,
        });
    }

    /// Hybrid danger of `cell`: the normalized field risk, or the proximity
    /// of the nearest living enemy, whichever is higher.
    #[must_use]
    pub fn hybrid_risk(&self, ctx: &SimContext, cell: GridPos) -> f32 {
        let radius = ctx.config.commander.proximity_radius;
        hybrid_risk_in(&ctx.view(), &ctx.units, self.team, radius, cell)
    }

    /// Sample random cells in this team's half of the playfield for a new
    /// anchor.
    ///
    /// A first pass only accepts cells at or below the safe risk ceiling and
    /// stops early on a very quiet cell; if that finds nothing a second pass
    /// takes the lowest-risk cell sampled. Sets and returns the anchor, or
    /// clears it when no walkable cell was hit.
    pub fn select_anchor(&mut self, ctx: &mut SimContext) -> Option<GridPos> {
        let cfg = &ctx.config.commander;
        let size = ctx.grid.size();
        let team = self.team;
        let view = MapView::new(&ctx.grid, &ctx.risk, &ctx.units);
        let rng = &mut ctx.rng;
        let risk_of = |cell| hybrid_risk_in(&view, &ctx.units, team, cfg.proximity_radius, cell);

        let mut best: Option<(GridPos, f32)> = None;
        for _ in 0..cfg.anchor_retries {
            let Some(cell) = sample_cell(rng, &ctx.grid, team, size) else {
                continue;
            };
            let risk = risk_of(cell);
            if risk <= cfg.safe_risk_max && best.map_or(true, |(_, r)| risk < r) {
                best = Some((cell, risk));
                if risk <= cfg.anchor_early_accept {
                    break;
                }
            }
        }

        if best.is_none() {
            for _ in 0..cfg.anchor_retries {
                let Some(cell) = sample_cell(rng, &ctx.grid, team, size) else {
                    continue;
                };
                let risk = risk_of(cell);
                if best.map_or(true, |(_, r)| risk < r) {
                    best = Some((cell, risk));
                }
            }
        }

        self.anchor = best.map(|(cell, _)| cell);
        match best {
            Some((cell, risk)) => {
                tracing::debug!(team = ?team, anchor = %cell, risk, "Selected anchor");
            }
            None => tracing::warn!(team = ?team, "No anchor candidate found"),
        }
        self.anchor
    }

    /// Re-anchor when due. Returns `true` when a new anchor was picked.
    fn safety_monitor(&mut self, ctx: &mut SimContext) -> bool {
        let cfg = &ctx.config.commander;
        let interval = u64::from(cfg.safety_interval.max(1));
        if ctx.frame % interval != 0 {
            return false;
        }
        let frame = ctx.frame as i64;
        let cooldown = i64::from(cfg.reanchor_cooldown);
        let threshold = cfg.safe_risk_max + cfg.safety_hysteresis;

        let Some(anchor) = self.anchor else {
            if self.select_anchor(ctx).is_some() {
                self.last_reanchor = frame;
                return true;
            }
            return false;
        };

        let risk = self.hybrid_risk(ctx, anchor);
        if risk > threshold && frame - self.last_reanchor >= cooldown {
            if self.select_anchor(ctx).is_some() {
                self.last_reanchor = frame;
                tracing::debug!(team = ?self.team, risk, "Anchor became unsafe; moved it");
                return true;
            }
            self.last_reanchor = frame - cooldown / 2;
        }
        false
    }

    /// Current target: the best enemy the commander can see, else the
    /// freshest remembered sighting.
    fn pick_target(&self, ctx: &SimContext) -> Option<GridPos> {
        let me = self.unit.and_then(|id| ctx.units.living(id))?;
        ctx.best_visible_enemy(me.pos, self.team)
            .map(|e| e.pos)
            .or_else(|| {
                self.known_enemies
                    .iter()
                    .max_by_key(|k| k.last_seen)
                    .map(|k| k.pos)
            })
    }

    /// One full decision pass.
    pub fn decide(&mut self, ctx: &mut SimContext) {
        let target = self.pick_target(ctx);
        let mut reserved: Vec<UnitId> = Vec::new();

        let units = &ctx.units;
        self.under_fire.retain(|&id| units.living(id).is_some());
        self.injured.retain(|&id| units.living(id).is_some());
        self.low_ammo.retain(|&id| units.living(id).is_some());

        // 1. Units under fire hold where they stand.
        for id in std::mem::take(&mut self.under_fire) {
            let Some(pos) = ctx
                .units
                .living(id)
                .filter(|u| u.is_interruptible())
                .map(|u| u.pos)
            else {
                self.under_fire.push(id);
                continue;
            };
            let _ = self.issue_order(ctx, id, Order::DefendAt(pos));
            reserved.push(id);
        }

        // 2. Support assignments.
        let mut medics = self.available(ctx, Role::Medic, &reserved);
        let mut suppliers = self.available(ctx, Role::Supplier, &reserved);
        self.assign_support(ctx, Role::Medic, &mut medics, &mut reserved);
        self.assign_support(ctx, Role::Supplier, &mut suppliers, &mut reserved);

        // 3. Everyone else.
        let roster: Vec<(UnitId, Role, GridPos, i32)> = ctx
            .units
            .team(self.team)
            .filter(|u| !reserved.contains(&u.id) && u.is_interruptible())
            .map(|u| (u.id, u.role, u.pos, u.stats.ammo))
            .collect();
        let mid = ctx.grid.mid();
        for (id, role, pos, ammo) in roster {
            match role {
                Role::Warrior if ammo > 0 => {
                    let order = match (target, self.anchor) {
                        (Some(t), _) => Order::AttackTo(t),
                        (None, Some(a)) => Order::DefendAt(a),
                        (None, None) => Order::MoveTo(GridPos::new(mid, mid)),
                    };
                    let _ = self.issue_order(ctx, id, order);
                }
                Role::Commander => {
                    if let Some(anchor) = self.anchor.filter(|&a| a != pos) {
                        let _ = self.issue_order(ctx, id, Order::MoveTo(anchor));
                    }
                }
                _ => {}
            }
        }
    }

    fn available(&self, ctx: &SimContext, role: Role, reserved: &[UnitId]) -> Vec<UnitId> {
        ctx.units
            .team(self.team)
            .filter(|u| u.role == role && u.is_interruptible() && !reserved.contains(&u.id))
            .map(|u| u.id)
            .collect()
    }

    /// Hand out one free helper of `role` per pending report, oldest report
    /// first. Helpers soft-locked to a different target are skipped.
    fn assign_support(
        &mut self,
        ctx: &mut SimContext,
        role: Role,
        helpers: &mut Vec<UnitId>,
        reserved: &mut Vec<UnitId>,
    ) {
        let heal = role == Role::Medic;
        let pending = if heal {
            std::mem::take(&mut self.injured)
        } else {
            std::mem::take(&mut self.low_ammo)
        };
        let mut unserved = Vec::new();

        for target in pending {
            if ctx.units.living(target).is_none() {
                continue;
            }
            if helpers.is_empty() {
                unserved.push(target);
                continue;
            }
            let frame = ctx.frame;
            let pick = helpers.iter().position(|&h| {
                let Some(unit) = ctx.units.get_mut(h) else {
                    return false;
                };
                let lock = &mut unit.assignment;
                if lock.lock_until <= frame {
                    lock.clear();
                }
                let current = if heal { lock.heal_target } else { lock.supply_target };
                !matches!(current, Some(other) if other != target && lock.lock_until > frame)
            });
            let Some(index) = pick else {
                unserved.push(target);
                continue;
            };
            let helper = helpers.remove(index);
            let Some(unit) = ctx.units.get(helper) else {
                continue;
            };
            let next = support_state(unit, target, &ctx.config);
            tracing::debug!(
                team = ?self.team,
                helper = %helper,
                target = %target,
                next = %next.kind(),
                "Support assigned"
            );
            change_state(ctx, helper, next);
            self.lock_support(ctx, helper, target, heal);
            let order = if heal {
                Order::Heal(target)
            } else {
                Order::Resupply(target)
            };
            self.orders.remember(helper, order, ctx.frame);
            self.orders_issued += 1;
            reserved.push(helper);

            if heal {
                let waiting = ctx
                    .units
                    .living(target)
                    .is_some_and(|u| u.state_kind() == StateKind::Idle && u.role != Role::Medic);
                if waiting {
                    change_state(ctx, target, State::WaitingForMedic);
                }
            }
        }

        if heal {
            self.injured = unserved;
        } else {
            self.low_ammo = unserved;
        }
    }

    /// Last-stand behaviour: engage the best visible enemy, otherwise go
    /// after the nearest one, otherwise stand down.
    pub fn fight_as_warrior(&mut self, ctx: &mut SimContext) {
        let Some(id) = self.unit else {
            return;
        };
        let Some(me) = ctx.units.living(id) else {
            return;
        };
        let (pos, current) = (me.pos, me.state_kind());

        if let Some(enemy) = ctx.best_visible_enemy(pos, self.team).map(|e| e.pos) {
            if current != StateKind::Attacking {
                let next = State::attack(enemy, &ctx.config);
                change_state(ctx, id, next);
            }
            return;
        }

        let nearest = ctx
            .units
            .enemies_of(self.team)
            .map(|e| (ctx.cover_adjusted_dist2(pos, e.pos), e.pos))
            .min_by(|a, b| a.0.total_cmp(&b.0))
            .map(|(_, p)| p);

        let next = match nearest {
            Some(enemy) if current == StateKind::Idle => {
                if ctx.plan_path(id, enemy).is_empty() {
                    let mid = ctx.grid.mid();
                    Some(State::move_to(GridPos::new(mid, mid), State::Idle, &ctx.config))
                } else {
                    Some(State::attack(enemy, &ctx.config))
                }
            }
            Some(_) => None,
            None if current != StateKind::Idle && current != StateKind::MovingToTarget => {
                Some(State::Idle)
            }
            None => None,
        };
        if let Some(next) = next {
            tracing::debug!(team = ?self.team, next = %next.kind(), "Commander fighting");
            change_state(ctx, id, next);
        }
    }
}

fn push_unique(list: &mut Vec<UnitId>, id: Option<UnitId>) {
    if let Some(id) = id {
        if !list.contains(&id) {
            list.push(id);
        }
    }
}

fn hybrid_risk_in(
    view: &MapView<'_>,
    units: &UnitArena,
    team: Team,
    radius: f32,
    cell: GridPos,
) -> f32 {
    let radius = radius.max(f32::EPSILON);
    let nearest = units.enemies_of(team).map(|e| e.pos.dist2(cell)).min();
    let proximity = nearest.map_or(0.0, |d2| {
        let d = (d2 as f32).sqrt();
        if d <= radius {
            1.0 - d / radius
        } else {
            0.0
        }
    });
    view.risk_norm(cell).max(proximity)
}

fn sample_cell(rng: &mut impl Rng, grid: &Grid, team: Team, size: i32) -> Option<GridPos> {
    let cell = GridPos::new(rng.gen_range(0..size), rng.gen_range(0..size));
    let usable =
        grid.in_playfield(cell) && team.owns_column(cell.col, size) && grid.at(cell).is_walkable();
    usable.then_some(cell)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SimConfig;
    use crate::grid::{Grid, Playfield};

    fn ctx(n: usize) -> SimContext {
        let row = ".".repeat(n);
        let rows: Vec<&str> = vec![row.as_str(); n];
        let grid = Grid::from_rows(&rows, Playfield::open()).unwrap();
        let mut ctx = SimContext::new(SimConfig::default(), grid);
        ctx.risk.clear();
        ctx
    }

    fn commander(c: &mut SimContext, team: Team, pos: GridPos) -> Commander {
        let cfg = c.config.units.clone();
        let id = c.units.spawn(team, Role::Commander, pos, &cfg);
        let cmd = Commander::new(team, Some(id), c.config.commander.reanchor_cooldown);
        cmd.subscribe(&mut c.bus);
        cmd
    }

    #[test]
    fn test_issue_order_rejections() {
        let mut c = ctx(24);
        let cfg = c.config.units.clone();
        let mut blue = commander(&mut c, Team::Blue, GridPos::new(1, 1));
        let enemy = c.units.spawn(Team::Orange, Role::Warrior, GridPos::new(20, 20), &cfg);
        let dead = c.units.spawn(Team::Blue, Role::Warrior, GridPos::new(3, 3), &cfg);
        c.units.get_mut(dead).unwrap().alive = false;

        let err = blue.issue_order(&mut c, enemy, Order::MoveTo(GridPos::new(5, 5)));
        assert!(matches!(
            err,
            Err(SimError::OrderRejected {
                reason: OrderRejection::EnemyTeam,
                ..
            })
        ));
        let err = blue.issue_order(&mut c, dead, Order::MoveTo(GridPos::new(5, 5)));
        assert!(matches!(
            err,
            Err(SimError::OrderRejected {
                reason: OrderRejection::Dead,
                ..
            })
        ));

        let busy = c.units.spawn(Team::Blue, Role::Warrior, GridPos::new(4, 4), &cfg);
        blue.issue_order(&mut c, busy, Order::MoveTo(GridPos::new(10, 10)))
            .unwrap();
        let err = blue.issue_order(&mut c, busy, Order::AttackTo(GridPos::new(20, 20)));
        assert!(matches!(
            err,
            Err(SimError::OrderRejected {
                reason: OrderRejection::Busy,
                ..
            })
        ));
    }

    #[test]
    fn test_same_order_twice_changes_state_once() {
        let mut c = ctx(24);
        let cfg = c.config.units.clone();
        let mut blue = commander(&mut c, Team::Blue, GridPos::new(1, 1));
        let w = c.units.spawn(Team::Blue, Role::Warrior, GridPos::new(4, 4), &cfg);

        blue.issue_order(&mut c, w, Order::DefendAt(GridPos::new(4, 4))).unwrap();
        crate::fsm::update_unit(&mut c, w);
        assert_eq!(c.units.get(w).unwrap().state_kind(), StateKind::Idle);
        let after_first = c.units.get(w).unwrap().transitions();
        // Within the cooldown and the hysteresis band.
        c.frame += 10;
        let again = blue.issue_order(&mut c, w, Order::DefendAt(GridPos::new(4, 5)));
        assert!(matches!(
            again,
            Err(SimError::OrderRejected {
                reason: OrderRejection::Debounced,
                ..
            })
        ));
        assert_eq!(c.units.get(w).unwrap().transitions(), after_first);
        assert_eq!(blue.orders_issued(), 1);
    }

    #[test]
    fn test_order_issued_message_reaches_unit_channel() {
        let mut c = ctx(24);
        let cfg = c.config.units.clone();
        let mut blue = commander(&mut c, Team::Blue, GridPos::new(1, 1));
        let w = c.units.spawn(Team::Blue, Role::Warrior, GridPos::new(4, 4), &cfg);
        c.bus.subscribe(Channel::Unit(w), Subscriber::Unit(w));

        blue.issue_order(&mut c, w, Order::AttackTo(GridPos::new(9, 9))).unwrap();
        let inbox = c.bus.drain(Subscriber::Unit(w));
        assert_eq!(inbox.len(), 1);
        assert_eq!(inbox[0].kind, EventKind::OrderIssued);
        assert_eq!(inbox[0].extra, Order::AttackTo(GridPos::new(9, 9)).code());
    }

    #[test]
    fn test_ignores_enemy_reports_and_merges_sightings() {
        let mut c = ctx(24);
        let cfg = c.config.units.clone();
        let mut blue = commander(&mut c, Team::Blue, GridPos::new(1, 1));
        let mine = c.units.spawn(Team::Blue, Role::Warrior, GridPos::new(4, 4), &cfg);
        let theirs = c.units.spawn(Team::Orange, Role::Warrior, GridPos::new(20, 20), &cfg);

        blue.handle_message(&c, &Message::report(EventKind::Injured, theirs, GridPos::new(20, 20), 30));
        assert!(blue.pending_injured().is_empty());

        blue.handle_message(&c, &Message::report(EventKind::EnemySighted, mine, GridPos::new(10, 10), 0));
        c.frame = 5;
        blue.handle_message(&c, &Message::report(EventKind::EnemySighted, mine, GridPos::new(11, 10), 0));
        assert_eq!(blue.known_enemies().len(), 1);
        assert_eq!(blue.known_enemies()[0].pos, GridPos::new(11, 10));
        assert_eq!(blue.known_enemies()[0].last_seen, 5);

        blue.handle_message(&c, &Message::report(EventKind::EnemySighted, mine, GridPos::new(16, 10), 0));
        assert_eq!(blue.known_enemies().len(), 2);
    }

    #[test]
    fn test_under_fire_unit_defends_in_place() {
        let mut c = ctx(24);
        let cfg = c.config.units.clone();
        let mut blue = commander(&mut c, Team::Blue, GridPos::new(1, 1));
        let w = c.units.spawn(Team::Blue, Role::Warrior, GridPos::new(6, 6), &cfg);
        c.publish(Message::report(EventKind::UnderFire, w, GridPos::new(6, 6), 0));

        blue.drain_mailbox(&mut c);
        blue.decide(&mut c);
        assert_eq!(blue.last_order(w).map(|(o, _)| o), Some(Order::DefendAt(GridPos::new(6, 6))));
        assert!(blue.pending_under_fire().is_empty());
    }

    #[test]
    fn test_injured_report_assigns_one_medic_with_lock() {
        let mut c = ctx(24);
        let cfg = c.config.units.clone();
        let mut blue = commander(&mut c, Team::Blue, GridPos::new(1, 1));
        let m1 = c.units.spawn(Team::Blue, Role::Medic, GridPos::new(2, 2), &cfg);
        let m2 = c.units.spawn(Team::Blue, Role::Medic, GridPos::new(2, 3), &cfg);
        let hurt = c.units.spawn(Team::Blue, Role::Warrior, GridPos::new(8, 8), &cfg);
        c.units.get_mut(hurt).unwrap().stats.hp = 50;
        c.publish(Message::report(EventKind::Injured, hurt, GridPos::new(8, 8), 50));

        blue.drain_mailbox(&mut c);
        blue.decide(&mut c);

        let medic = c.units.get(m1).unwrap();
        assert_eq!(medic.state_kind(), StateKind::Healing);
        assert_eq!(medic.assignment.heal_target, Some(hurt));
        assert_eq!(medic.assignment.lock_until, 480);
        assert_eq!(c.units.get(m2).unwrap().state_kind(), StateKind::Idle);
        assert_eq!(c.units.get(hurt).unwrap().state_kind(), StateKind::WaitingForMedic);
        assert!(blue.pending_injured().is_empty());
        assert_eq!(blue.last_order(m1).map(|(o, _)| o), Some(Order::Heal(hurt)));
    }

    #[test]
    fn test_low_stock_supplier_goes_via_depot() {
        let mut c = ctx(24);
        let cfg = c.config.units.clone();
        let mut blue = commander(&mut c, Team::Blue, GridPos::new(1, 1));
        let sup = c.units.spawn(Team::Blue, Role::Supplier, GridPos::new(5, 5), &cfg);
        c.units.get_mut(sup).unwrap().stock.adjust(-15);
        let dry = c.units.spawn(Team::Blue, Role::Warrior, GridPos::new(8, 8), &cfg);
        c.units.get_mut(dry).unwrap().stats.ammo = 0;
        c.publish(Message::report(EventKind::LowAmmo, dry, GridPos::new(8, 8), 0));

        blue.drain_mailbox(&mut c);
        blue.decide(&mut c);
        let unit = c.units.get(sup).unwrap();
        assert_eq!(unit.state_kind(), StateKind::RefillAtDepot);
        assert_eq!(unit.assignment.supply_target, Some(dry));
    }

    #[test]
    fn test_warriors_attack_visible_target() {
        let mut c = ctx(24);
        let cfg = c.config.units.clone();
        let mut blue = commander(&mut c, Team::Blue, GridPos::new(1, 1));
        let w = c.units.spawn(Team::Blue, Role::Warrior, GridPos::new(4, 4), &cfg);
        c.units.spawn(Team::Orange, Role::Warrior, GridPos::new(4, 20), &cfg);

        blue.decide(&mut c);
        assert_eq!(blue.last_order(w).map(|(o, _)| o), Some(Order::AttackTo(GridPos::new(4, 20))));
    }

    #[test]
    fn test_warriors_hold_anchor_without_target() {
        let mut c = ctx(24);
        let cfg = c.config.units.clone();
        let mut blue = commander(&mut c, Team::Blue, GridPos::new(1, 1));
        let w = c.units.spawn(Team::Blue, Role::Warrior, GridPos::new(4, 4), &cfg);
        blue.set_anchor(Some(GridPos::new(6, 6)));

        blue.decide(&mut c);
        assert_eq!(blue.last_order(w).map(|(o, _)| o), Some(Order::DefendAt(GridPos::new(6, 6))));
        let cmd_id = blue.unit().unwrap();
        assert_eq!(blue.last_order(cmd_id).map(|(o, _)| o), Some(Order::MoveTo(GridPos::new(6, 6))));
    }

    #[test]
    fn test_dead_commander_announces_once() {
        let mut c = ctx(24);
        let mut blue = commander(&mut c, Team::Blue, GridPos::new(1, 1));
        c.bus.subscribe(Channel::Broadcast, Subscriber::Observer(3));
        let id = blue.unit().unwrap();
        c.units.get_mut(id).unwrap().alive = false;

        blue.tick(&mut c);
        blue.tick(&mut c);
        let downs = c
            .bus
            .drain(Subscriber::Observer(3))
            .into_iter()
            .filter(|m| m.kind == EventKind::CommanderDown)
            .count();
        assert_eq!(downs, 1);
        assert!(blue.is_down_announced());
    }

    #[test]
    fn test_anchor_lands_in_own_half() {
        let mut c = ctx(40);
        let mut orange = commander(&mut c, Team::Orange, GridPos::new(30, 30));
        let anchor = orange.select_anchor(&mut c).unwrap();
        assert!(anchor.col >= 20);
        assert!(c.grid.at(anchor).is_walkable());
    }

    #[test]
    fn test_hybrid_risk_rises_near_enemies() {
        let mut c = ctx(40);
        let cfg = c.config.units.clone();
        let blue = commander(&mut c, Team::Blue, GridPos::new(1, 1));
        c.units.spawn(Team::Orange, Role::Warrior, GridPos::new(10, 10), &cfg);
        assert!((blue.hybrid_risk(&c, GridPos::new(10, 10)) - 1.0).abs() < 1e-6);
        assert!(blue.hybrid_risk(&c, GridPos::new(10, 17)) > 0.5);
        assert!(blue.hybrid_risk(&c, GridPos::new(35, 35)).abs() < 1e-6);
    }

    #[test]
    fn test_fighting_commander_engages() {
        let mut c = ctx(24);
        let cfg = c.config.units.clone();
        let mut blue = commander(&mut c, Team::Blue, GridPos::new(4, 4));
        c.units.spawn(Team::Orange, Role::Warrior, GridPos::new(4, 12), &cfg);
        let id = blue.unit().unwrap();
        c.units.get_mut(id).unwrap().fighting = true;

        blue.tick(&mut c);
        assert_eq!(c.units.get(id).unwrap().state_kind(), StateKind::Attacking);
    }

    /// 40x40 open map whose risk maximum sits in Orange's corner, so any
    /// value written on Blue's side reads back as its own normalised risk.
    fn scaled_ctx() -> SimContext {
        let mut c = ctx(40);
        c.risk.set(GridPos::new(39, 39), 1.0);
        c
    }

    #[test]
    fn test_anchor_inside_hysteresis_band_is_kept() {
        let mut c = scaled_ctx();
        let mut blue = Commander::new(Team::Blue, None, c.config.commander.reanchor_cooldown);
        let anchor = GridPos::new(5, 5);
        blue.anchor = Some(anchor);
        // Above the safe ceiling (0.18) but within the 0.05 hysteresis.
        c.risk.set(anchor, 0.2);
        c.frame = 600;

        assert!(!blue.safety_monitor(&mut c));
        assert_eq!(blue.anchor, Some(anchor));
        assert_eq!(blue.last_reanchor, -180);
    }

    #[test]
    fn test_unsafe_anchor_waits_for_cooldown() {
        let mut c = scaled_ctx();
        let mut blue = Commander::new(Team::Blue, None, c.config.commander.reanchor_cooldown);
        let anchor = GridPos::new(5, 5);
        blue.anchor = Some(anchor);
        blue.last_reanchor = 300;
        c.risk.set(anchor, 0.5);

        c.frame = 420;
        assert!(!blue.safety_monitor(&mut c));
        assert_eq!(blue.anchor, Some(anchor));
        assert_eq!(blue.last_reanchor, 300);

        c.frame = 480;
        assert!(blue.safety_monitor(&mut c));
        let moved = blue.anchor.unwrap();
        assert_ne!(moved, anchor);
        assert!(moved.col < 20);
        assert!(blue.hybrid_risk(&c, moved) <= c.config.commander.safe_risk_max);
        assert_eq!(blue.last_reanchor, 480);
    }

    #[test]
    fn test_failed_reanchor_halves_cooldown() {
        // Blue's half is solid rock, so no anchor candidate can be sampled.
        let row = format!("{}{}", "#".repeat(20), ".".repeat(20));
        let rows: Vec<&str> = vec![row.as_str(); 40];
        let grid = Grid::from_rows(&rows, Playfield::open()).unwrap();
        let mut c = SimContext::new(SimConfig::default(), grid);
        c.risk.clear();
        let mut blue = Commander::new(Team::Blue, None, c.config.commander.reanchor_cooldown);
        let anchor = GridPos::new(5, 25);
        blue.anchor = Some(anchor);
        c.risk.set(anchor, 1.0);
        c.frame = 600;

        assert!(!blue.safety_monitor(&mut c));
        assert_eq!(blue.last_reanchor, 600 - 90);
    }

    #[test]
    fn test_anchor_fallback_takes_best_risky_cell() {
        let mut c = ctx(40);
        c.risk.fill(1.0);
        let mut blue = Commander::new(Team::Blue, None, c.config.commander.reanchor_cooldown);

        let anchor = blue.select_anchor(&mut c).unwrap();
        assert!(anchor.col < 20);
        assert!(c.grid.at(anchor).is_walkable());
        assert!(blue.hybrid_risk(&c, anchor) > c.config.commander.safe_risk_max);
        assert_eq!(blue.anchor, Some(anchor));
    }
}
