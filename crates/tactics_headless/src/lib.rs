//! Headless match runner for batch play and CI verification.
//!
//! This crate sets up matches for the simulation core and drives them
//! without graphics:
//!
//! - **Scenario bootstrap**: squad placement, warrior scatter, anchors
//! - **Config loading**: RON files validated before use
//! - **Match runner**: the fixed-tick loop with per-tick metrics
//! - **Batch runs**: many seeds in parallel with aggregate win rates
//!
//! Summaries go to stdout as JSON; logs go to stderr.
//!
//! # Example
//!
//! ```bash
//! # One match on seed 7, JSON summary and a final ASCII map
//! cargo run -p tactics_headless -- run --seed 7 --json --render
//!
//! # A hundred seeds in parallel
//! cargo run -p tactics_headless -- batch --count 100 --seed 0
//! ```

pub mod batch;
pub mod error;
pub mod metrics;
pub mod render;
pub mod runner;
pub mod scenario;

pub use batch::{run_batch, BatchConfig, BatchResults};
pub use error::{HeadlessError, Result};
pub use metrics::{BatchSummary, MatchMetrics, MetricsCollector};
pub use render::{render_ascii, AsciiConfig};
pub use runner::{run_match, MatchConfig, MatchRunner};
pub use scenario::{load_config, skirmish, SkirmishOptions};
