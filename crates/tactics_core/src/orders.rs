//! Commander orders and the per-unit debounce cache.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::config::CommanderConfig;
use crate::math::GridPos;
use crate::units::UnitId;

/// An instruction for one unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Order {
    /// Walk to a cell.
    MoveTo(GridPos),
    /// Engage around a cell.
    AttackTo(GridPos),
    /// Hold a defensive position near a cell.
    DefendAt(GridPos),
    /// Bring ammunition to a unit.
    Resupply(UnitId),
    /// Heal a unit.
    Heal(UnitId),
}

impl Order {
    /// Small integer code carried in `OrderIssued` messages.
    #[must_use]
    pub const fn code(&self) -> i32 {
        match self {
            Self::MoveTo(_) => 0,
            Self::AttackTo(_) => 1,
            Self::DefendAt(_) => 2,
            Self::Resupply(_) => 3,
            Self::Heal(_) => 4,
        }
    }

    /// Target cell of a movement order.
    #[must_use]
    pub const fn cell(&self) -> Option<GridPos> {
        match self {
            Self::MoveTo(p) | Self::AttackTo(p) | Self::DefendAt(p) => Some(*p),
            Self::Resupply(_) | Self::Heal(_) => None,
        }
    }

    /// Whether `self` and `other` are close enough to count as the same
    /// order for debouncing.
    #[must_use]
    pub fn is_similar(&self, other: &Self, config: &CommanderConfig) -> bool {
        match (self, other) {
            (Self::AttackTo(a), Self::AttackTo(b)) => a.manhattan(*b) <= config.hysteresis_attack,
            (Self::DefendAt(a), Self::DefendAt(b)) => a.manhattan(*b) <= config.hysteresis_defend,
            (Self::MoveTo(a), Self::MoveTo(b)) => a.manhattan(*b) <= config.hysteresis_move,
            (Self::Heal(a), Self::Heal(b)) | (Self::Resupply(a), Self::Resupply(b)) => a == b,
            _ => false,
        }
    }
}

/// Last order issued to each unit and when.
#[derive(Debug, Clone, Default)]
pub struct OrderCache {
    last: HashMap<UnitId, (Order, u64)>,
}

impl OrderCache {
    /// Empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether `order` to `unit` at `frame` repeats a recent similar one.
    #[must_use]
    pub fn is_debounced(&self, unit: UnitId, order: &Order, frame: u64, config: &CommanderConfig) -> bool {
        self.last.get(&unit).is_some_and(|(prev, at)| {
            frame.saturating_sub(*at) < u64::from(config.order_cooldown) && prev.is_similar(order, config)
        })
    }

    /// Record that `order` went to `unit` at `frame`.
    pub fn remember(&mut self, unit: UnitId, order: Order, frame: u64) {
        self.last.insert(unit, (order, frame));
    }

    /// Last order sent to `unit`.
    #[must_use]
    pub fn last(&self, unit: UnitId) -> Option<(Order, u64)> {
        self.last.get(&unit).copied()
    }

    /// Drop everything.
    pub fn clear(&mut self) {
        self.last.clear();
    }
}
