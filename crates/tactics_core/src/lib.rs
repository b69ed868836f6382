//! # Tactics Core
//!
//! Simulation core for a two-team, grid-based squad tactics game.
//!
//! Commanders, warriors, medics and suppliers move over a shared obstacle
//! map, avoid or seek danger using a precomputed risk field, fight with
//! rifles and grenades, and coordinate through a message bus.
//!
//! This crate contains **only** simulation logic:
//! - No rendering
//! - No IO
//! - No wall-clock time
//! - All randomness flows from one seeded PRNG
//!
//! ## Crate Structure
//!
//! - [`grid`] - Terrain, playfield and depot landmarks
//! - [`security_map`] - Risk field built from sight-line rays
//! - [`visibility`] - Line of sight and per-team visibility masks
//! - [`pathfinding`] - BFS, risk-weighted A* and tactical cell selection
//! - [`fsm`] - Per-unit state machines and the ten behaviour states
//! - [`warrior`] - Warrior self-checks and status reports
//! - [`events`] - Message bus with per-subscriber mailboxes
//! - [`commander`] - Team commanders: orders, support locks, anchors
//! - [`combat`] - Bullets, grenades and blast damage
//! - [`world`] - Match world and the fixed-tick loop

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic)]

pub mod combat;
pub mod commander;
pub mod config;
pub mod context;
pub mod error;
pub mod events;
pub mod fsm;
pub mod grid;
pub mod math;
pub mod orders;
pub mod pathfinding;
pub mod security_map;
pub mod units;
pub mod visibility;
pub mod warrior;
pub mod world;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::combat::{CombatEvent, CombatSystem};
    pub use crate::commander::{Commander, EnemyInfo};
    pub use crate::config::SimConfig;
    pub use crate::context::SimContext;
    pub use crate::error::{OrderRejection, Result, SimError};
    pub use crate::events::{Channel, EventBus, EventKind, Message, Subscriber};
    pub use crate::fsm::{State, StateKind};
    pub use crate::grid::{CellKind, Grid, Playfield};
    pub use crate::math::GridPos;
    pub use crate::orders::Order;
    pub use crate::security_map::SecurityMap;
    pub use crate::units::{Role, Team, Unit, UnitId};
    pub use crate::visibility::VisibilityMask;
    pub use crate::world::{MatchOutcome, TickEvents, UnitSnapshot, World};
}
