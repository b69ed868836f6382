use super::support::Navigator;
use super::{Healing, State, Supplying, Transition};
use crate::context::SimContext;
use crate::events::{EventKind, Message};
use crate::pathfinding::Occupancy;
use crate::units::{Role, UnitId};

/// Walk to the team depot for this role, restock, then resume work.
#[derive(Debug, Clone, PartialEq)]
pub struct RefillAtDepot {
    role: Role,
    follow_up: Option<UnitId>,
    nav: Navigator,
}

impl RefillAtDepot {
    /// Restock a `role` unit, then serve `follow_up` if given.
    #[must_use]
    pub fn new(role: Role, follow_up: Option<UnitId>) -> Self {
        Self {
            role,
            follow_up,
            nav: Navigator::default(),
        }
    }

    /// Unit served after the refill.
    #[must_use]
    pub const fn follow_up(&self) -> Option<UnitId> {
        self.follow_up
    }

    pub(super) fn enter(&mut self, ctx: &mut SimContext, id: UnitId) -> Transition {
        self.nav.reset();
        let Some(unit) = ctx.units.get_mut(id) else {
            return Transition::Stay;
        };
        unit.moving = true;
        let pos = unit.pos;
        if self.role == Role::Supplier {
            ctx.publish(Message::report(EventKind::NeedResupply, id, pos, 0));
        }
        Transition::Stay
    }

    pub(super) fn update(&mut self, ctx: &mut SimContext, id: UnitId) -> Transition {
        let Some(unit) = ctx.units.living(id) else {
            return Transition::Stay;
        };
        let landmarks = ctx.grid.landmarks();
        let depot = match self.role {
            Role::Medic => landmarks.med_depot(unit.team),
            Role::Supplier => landmarks.ammo_depot(unit.team),
            Role::Commander | Role::Warrior => return Transition::Switch(State::Idle),
        };

        // Someone parked on the depot: serving from the next cell is enough.
        let blocked = unit.pos.chebyshev(depot) <= 1 && ctx.units.is_occupied(depot, Some(id));
        if unit.pos != depot && !blocked {
            if !self.nav.step(ctx, id, depot) {
                tracing::debug!(unit = %id, %depot, "Depot unreachable");
                return Transition::Switch(State::Idle);
            }
            return Transition::Stay;
        }

        let amount = match (self.role, unit.fighting) {
            (Role::Medic, false) => ctx.config.units.medic.refill_amount,
            (Role::Medic, true) => ctx.config.units.medic.refill_amount_fighting,
            (_, false) => ctx.config.units.supplier.refill_amount,
            (_, true) => ctx.config.units.supplier.refill_amount_fighting,
        };
        if let Some(unit) = ctx.units.get_mut(id) {
            unit.stock.adjust(amount);
            tracing::debug!(unit = %id, amount, stock = unit.stock.amount(), "Refilled at depot");
        }

        match (self.role, self.follow_up) {
            (Role::Medic, Some(target)) => Transition::Switch(State::Healing(Healing::new(target))),
            (Role::Supplier, Some(target)) => {
                Transition::Switch(State::Supplying(Supplying::new(target)))
            }
            _ => Transition::Switch(State::Idle),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SimConfig;
    use crate::events::{Channel, Subscriber};
    use crate::fsm::{change_state, update_unit, StateKind};
    use crate::grid::{Grid, Playfield};
    use crate::math::GridPos;
    use crate::units::{RoleStock, Team};

    fn ctx() -> SimContext {
        let grid = Grid::from_rows(&["...................."; 20], Playfield::open()).unwrap();
        let mut ctx = SimContext::new(SimConfig::default(), grid);
        ctx.risk.clear();
        ctx
    }

    #[test]
    fn test_supplier_restocks_and_resumes() {
        let mut c = ctx();
        let cfg = c.config.units.clone();
        let depot = c.grid.landmarks().ammo_depot(Team::Blue);
        let supplier = c.units.spawn(Team::Blue, Role::Supplier, depot.offset(0, 2), &cfg);
        let needy = c.units.spawn(Team::Blue, Role::Warrior, GridPos::new(10, 10), &cfg);
        c.units.get_mut(supplier).unwrap().stock = RoleStock::AmmoStock(0);
        c.bus.subscribe(Channel::Broadcast, Subscriber::Observer(1));

        let refill = State::RefillAtDepot(RefillAtDepot::new(Role::Supplier, Some(needy)));
        change_state(&mut c, supplier, refill);
        let inbox = c.bus.drain(Subscriber::Observer(1));
        assert!(inbox.iter().any(|m| m.kind == EventKind::NeedResupply));

        update_unit(&mut c, supplier);
        update_unit(&mut c, supplier);
        assert_eq!(c.units.get(supplier).unwrap().pos, depot);
        update_unit(&mut c, supplier);

        let unit = c.units.get(supplier).unwrap();
        assert_eq!(unit.stock, RoleStock::AmmoStock(20));
        assert_eq!(unit.state_kind(), StateKind::Supplying);
        assert_eq!(unit.assignment.supply_target, Some(needy));
    }

    #[test]
    fn test_fighting_medic_gets_smaller_refill() {
        let mut c = ctx();
        let cfg = c.config.units.clone();
        let depot = c.grid.landmarks().med_depot(Team::Orange);
        let medic = c.units.spawn(Team::Orange, Role::Medic, depot, &cfg);
        {
            let unit = c.units.get_mut(medic).unwrap();
            unit.stock = RoleStock::HealPool(0);
            unit.fighting = true;
        }

        change_state(&mut c, medic, State::RefillAtDepot(RefillAtDepot::new(Role::Medic, None)));
        update_unit(&mut c, medic);

        let unit = c.units.get(medic).unwrap();
        assert_eq!(unit.stock, RoleStock::HealPool(60));
        assert_eq!(unit.state_kind(), StateKind::Idle);
        assert!(!unit.moving);
    }

    #[test]
    fn test_occupied_depot_is_served_from_next_cell() {
        let mut c = ctx();
        let cfg = c.config.units.clone();
        let depot = c.grid.landmarks().ammo_depot(Team::Blue);
        let beside = depot.offset(0, 1);
        let supplier = c.units.spawn(Team::Blue, Role::Supplier, beside, &cfg);
        let squatter = c.units.spawn(Team::Blue, Role::Warrior, depot, &cfg);
        c.units.get_mut(supplier).unwrap().stock = RoleStock::AmmoStock(0);

        let refill = State::RefillAtDepot(RefillAtDepot::new(Role::Supplier, None));
        change_state(&mut c, supplier, refill);
        update_unit(&mut c, supplier);

        let unit = c.units.get(supplier).unwrap();
        assert_eq!(unit.pos, beside);
        assert_eq!(unit.stock, RoleStock::AmmoStock(20));
        assert_eq!(c.units.get(squatter).unwrap().pos, depot);
    }
}
