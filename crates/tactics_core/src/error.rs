//! Error types for the tactical simulation.
//!
//! Errors only surface from setup-time and explicit API calls. Everything
//! that happens inside a tick degrades softly (log and fall back to a safe
//! state) instead of returning an error.

use thiserror::Error;

use crate::math::GridPos;
use crate::units::UnitId;

/// Result type alias using [`SimError`].
pub type Result<T> = std::result::Result<T, SimError>;

/// Why the commander (or an external caller) could not issue an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderRejection {
    /// The recipient is dead.
    Dead,
    /// The recipient belongs to the other team.
    EnemyTeam,
    /// The recipient's current state cannot be interrupted.
    Busy,
    /// A similar order went out recently.
    Debounced,
}

impl std::fmt::Display for OrderRejection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let reason = match self {
            Self::Dead => "unit is dead",
            Self::EnemyTeam => "unit belongs to the enemy team",
            Self::Busy => "unit is busy and cannot be interrupted",
            Self::Debounced => "a similar order was issued recently",
        };
        f.write_str(reason)
    }
}

/// Top-level error type for all simulation errors.
#[derive(Debug, Error)]
pub enum SimError {
    /// The id does not name a live slot (never issued, or from a previous world).
    #[error("Unknown or stale unit id: {0}")]
    UnknownUnit(UnitId),

    /// A position outside the grid was supplied.
    #[error("Position {pos} is outside the {size}x{size} grid")]
    OutOfBounds {
        /// Offending position.
        pos: GridPos,
        /// Grid side length.
        size: i32,
    },

    /// A configuration value failed validation.
    #[error("Invalid configuration for '{field}': {reason}")]
    InvalidConfig {
        /// Dotted path of the field.
        field: &'static str,
        /// What is wrong with it.
        reason: String,
    },

    /// A configuration document could not be parsed.
    #[error("Failed to parse configuration: {0}")]
    ConfigParse(String),

    /// An order was refused.
    #[error("Order to unit {unit} rejected: {reason}")]
    OrderRejected {
        /// Intended recipient.
        unit: UnitId,
        /// Why it was refused.
        reason: OrderRejection,
    },
}
