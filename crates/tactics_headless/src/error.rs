//! Error type for the headless runner.

use thiserror::Error;

/// Anything that can stop the runner before or between matches.
#[derive(Error, Debug)]
pub enum HeadlessError {
    /// Failed to read or write a file.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// Config file is not valid RON.
    #[error("Failed to parse config: {0}")]
    Ron(#[from] ron::error::SpannedError),
    /// Failed to encode results.
    #[error("Failed to encode JSON: {0}")]
    Json(#[from] serde_json::Error),
    /// The simulation refused a setup step.
    #[error("Simulation error: {0}")]
    Sim(#[from] tactics_core::error::SimError),
}

/// Result alias for runner operations.
pub type Result<T> = std::result::Result<T, HeadlessError>;
