//! Batch match runner.
//!
//! Plays many seeds of the reference skirmish in parallel with rayon and
//! aggregates the results.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Instant;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tactics_core::config::SimConfig;
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::metrics::{BatchSummary, MatchMetrics};
use crate::runner::{run_match, MatchConfig, DEFAULT_MAX_TICKS};

/// Configuration for a batch run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchConfig {
    /// Number of matches.
    pub match_count: u32,
    /// Seed of the first match; match `i` uses `seed_start + i`.
    pub seed_start: u64,
    /// Tick limit per match.
    pub max_ticks: u64,
    /// Run the commanders' loop.
    pub commanders: bool,
    /// Worker threads (0 = rayon default).
    pub parallel: u32,
    /// Simulation parameters shared by every match.
    pub sim: SimConfig,
    /// Where to write the results file, if anywhere.
    pub output: Option<PathBuf>,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            match_count: 100,
            seed_start: 0,
            max_ticks: DEFAULT_MAX_TICKS,
            commanders: true,
            parallel: 0,
            sim: SimConfig::default(),
            output: None,
        }
    }
}

impl BatchConfig {
    /// Config for `match_count` matches over `sim`.
    #[must_use]
    pub fn new(sim: SimConfig, match_count: u32) -> Self {
        Self {
            sim,
            match_count,
            ..Default::default()
        }
    }

    /// Set seed start.
    #[must_use]
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed_start = seed;
        self
    }

    /// Set the per-match tick limit.
    #[must_use]
    pub fn with_max_ticks(mut self, max_ticks: u64) -> Self {
        self.max_ticks = max_ticks;
        self
    }

    /// Match settings for the `index`th match.
    #[must_use]
    pub fn match_config(&self, index: u32) -> MatchConfig {
        MatchConfig::new(self.sim.clone())
            .with_seed(self.seed_start.wrapping_add(u64::from(index)))
            .with_max_ticks(self.max_ticks)
            .with_commanders(self.commanders)
    }
}

/// Results from a batch run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchResults {
    /// Individual match metrics, in seed order.
    pub matches: Vec<MatchMetrics>,
    /// Aggregate summary.
    pub summary: BatchSummary,
    /// Total runtime.
    pub duration_seconds: f64,
    /// Matches that failed to set up.
    pub errors: Vec<BatchError>,
}

impl BatchResults {
    /// Save results to a JSON file.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    /// Load results from a JSON file.
    pub fn load(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&json)?)
    }
}

/// A match that could not be played.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchError {
    /// Match index.
    pub match_index: u32,
    /// Seed used.
    pub seed: u64,
    /// Error message.
    pub message: String,
}

/// Play every match in the batch.
pub fn run_batch(config: &BatchConfig) -> BatchResults {
    let start = Instant::now();
    info!(
        matches = config.match_count,
        seed = config.seed_start,
        max_ticks = config.max_ticks,
        "Starting batch"
    );

    let completed = AtomicU32::new(0);
    let play = || -> Vec<std::result::Result<MatchMetrics, BatchError>> {
        (0..config.match_count)
            .into_par_iter()
            .map(|i| {
                let match_config = config.match_config(i);
                let seed = match_config.sim.seed;
                let result = run_match(&match_config)
                    .map(|(_, metrics)| metrics)
                    .map_err(|e| {
                        warn!(index = i, seed, error = %e, "Match failed");
                        BatchError {
                            match_index: i,
                            seed,
                            message: e.to_string(),
                        }
                    });
                let done = completed.fetch_add(1, Ordering::Relaxed) + 1;
                if done % 10 == 0 {
                    debug!("Progress: {}/{}", done, config.match_count);
                }
                result
            })
            .collect()
    };

    let results = if config.parallel > 0 {
        match rayon::ThreadPoolBuilder::new()
            .num_threads(config.parallel as usize)
            .build()
        {
            Ok(pool) => pool.install(play),
            Err(e) => {
                warn!(error = %e, "Thread pool unavailable, using the global pool");
                play()
            }
        }
    } else {
        play()
    };

    let (matches, errors): (Vec<_>, Vec<_>) = results.into_iter().partition(|r| r.is_ok());
    let matches: Vec<MatchMetrics> = matches.into_iter().filter_map(|r| r.ok()).collect();
    let errors: Vec<BatchError> = errors.into_iter().filter_map(|r| r.err()).collect();

    let summary = BatchSummary::from_matches(&matches);
    let duration_seconds = start.elapsed().as_secs_f64();
    info!(
        matches = matches.len(),
        failed = errors.len(),
        secs = format!("{duration_seconds:.1}"),
        "Batch complete"
    );

    BatchResults {
        matches,
        summary,
        duration_seconds,
        errors,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small_batch(count: u32) -> BatchConfig {
        BatchConfig::new(SimConfig::default().with_grid_size(32), count)
            .with_seed(100)
            .with_max_ticks(120)
    }

    #[test]
    fn test_batch_config_default() {
        let config = BatchConfig::default();
        assert_eq!(config.match_count, 100);
        assert_eq!(config.max_ticks, DEFAULT_MAX_TICKS);
    }

    #[test]
    fn test_match_configs_use_consecutive_seeds() {
        let config = small_batch(3);
        assert_eq!(config.match_config(0).sim.seed, 100);
        assert_eq!(config.match_config(2).sim.seed, 102);
        assert_eq!(config.match_config(2).max_ticks, 120);
    }

    #[test]
    fn test_run_batch_small() {
        let results = run_batch(&small_batch(4));
        assert!(results.errors.is_empty());
        assert_eq!(results.matches.len(), 4);
        assert_eq!(results.summary.total_matches, 4);
        let seeds: Vec<u64> = results.matches.iter().map(|m| m.seed).collect();
        assert_eq!(seeds, vec![100, 101, 102, 103]);
        assert!(results.matches.iter().all(|m| m.duration_ticks <= 120));
    }

    #[test]
    fn test_invalid_config_is_reported_per_match() {
        let mut config = small_batch(2);
        config.sim.grid.size = 4;
        let results = run_batch(&config);
        assert!(results.matches.is_empty());
        assert_eq!(results.errors.len(), 2);
        assert_eq!(results.errors[1].seed, 101);
    }
}
