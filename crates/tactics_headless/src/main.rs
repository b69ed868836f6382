//! Headless squad tactics runner.
//!
//! Runs matches without graphics. Summaries are written to stdout as JSON,
//! logs and human-readable reports to stderr.
//!
//! # Usage
//!
//! ```bash
//! # One match with the reference config
//! cargo run -p tactics_headless -- run --seed 42
//!
//! # One match from a config file, JSON summary plus final map
//! cargo run -p tactics_headless -- run --config match.ron --json --render
//!
//! # Batch of matches on consecutive seeds
//! cargo run -p tactics_headless -- batch --count 200 --seed 1000 --output results/batch.json
//! ```

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use tactics_core::config::SimConfig;
use tactics_headless::{
    batch::{run_batch, BatchConfig},
    error::Result,
    render::{render_ascii, AsciiConfig},
    runner::{run_match, MatchConfig, DEFAULT_MAX_TICKS},
    scenario::load_config,
};

#[derive(Parser)]
#[command(name = "tactics_headless")]
#[command(about = "Headless squad tactics runner for batch play and CI")]
#[command(version)]
struct Cli {
    /// Enable verbose logging to stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Play a single match
    Run {
        /// Seed (overrides the config file)
        #[arg(long)]
        seed: Option<u64>,

        /// Stop after this many ticks
        #[arg(long, default_value_t = DEFAULT_MAX_TICKS)]
        max_ticks: u64,

        /// RON config file
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Leave the commanders switched off
        #[arg(long)]
        no_commanders: bool,

        /// Print the match metrics as JSON on stdout
        #[arg(long)]
        json: bool,

        /// Draw the final map on stderr
        #[arg(long)]
        render: bool,

        /// Disable colored map output
        #[arg(long)]
        no_color: bool,
    },

    /// Play many matches in parallel
    Batch {
        /// Number of matches
        #[arg(short = 'n', long, default_value = "100")]
        count: u32,

        /// Seed of the first match
        #[arg(long, default_value = "0")]
        seed: u64,

        /// Tick limit per match
        #[arg(long, default_value_t = DEFAULT_MAX_TICKS)]
        max_ticks: u64,

        /// RON config file
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Leave the commanders switched off
        #[arg(long)]
        no_commanders: bool,

        /// Worker threads (0 = auto)
        #[arg(short, long, default_value = "0")]
        parallel: u32,

        /// Write full results JSON here
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

fn main() {
    let cli = Cli::parse();

    // Logs go to stderr; stdout is for JSON.
    let default_level = if cli.verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_ansi(true),
        )
        .with(filter)
        .init();

    let result = match cli.command {
        Commands::Run {
            seed,
            max_ticks,
            config,
            no_commanders,
            json,
            render,
            no_color,
        } => cmd_run(
            seed,
            max_ticks,
            config.as_deref(),
            no_commanders,
            json,
            render.then_some(!no_color),
        ),
        Commands::Batch {
            count,
            seed,
            max_ticks,
            config,
            no_commanders,
            parallel,
            output,
        } => cmd_batch(
            count,
            seed,
            max_ticks,
            config.as_deref(),
            no_commanders,
            parallel,
            output,
        ),
    };

    if let Err(e) = result {
        tracing::error!(error = %e, "Run failed");
        eprintln!("FATAL: {e}");
        std::process::exit(1);
    }
}

fn sim_config(path: Option<&Path>) -> Result<SimConfig> {
    match path {
        Some(path) => load_config(path),
        None => Ok(SimConfig::default()),
    }
}

/// Play one match. `render` carries the color choice when a map is wanted.
fn cmd_run(
    seed: Option<u64>,
    max_ticks: u64,
    config: Option<&Path>,
    no_commanders: bool,
    json: bool,
    render: Option<bool>,
) -> Result<()> {
    let mut sim = sim_config(config)?;
    if let Some(seed) = seed {
        sim.seed = seed;
    }
    let match_config = MatchConfig::new(sim)
        .with_max_ticks(max_ticks)
        .with_commanders(!no_commanders);

    let (world, metrics) = run_match(&match_config)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&metrics)?);
    } else {
        eprintln!("Seed: {}", metrics.seed);
        eprintln!("Ticks: {}", metrics.duration_ticks);
        eprintln!(
            "Winner: {}",
            metrics.winner.as_deref().unwrap_or("none (tick limit)")
        );
        eprintln!(
            "Shots: {}  Grenades: {}",
            metrics.shots_fired, metrics.grenades_thrown
        );
        let mut teams: Vec<_> = metrics.teams.values().collect();
        teams.sort_by(|a, b| a.team.cmp(&b.team));
        for team in teams {
            eprintln!(
                "  {}: {} alive, {} kills, {} orders",
                team.team,
                team.survivor_count(),
                team.kills,
                team.orders_issued
            );
        }
    }

    if let Some(use_color) = render {
        let config = AsciiConfig {
            show_legend: true,
            use_color,
        };
        eprintln!("{}", render_ascii(&world, &config));
    }
    Ok(())
}

fn cmd_batch(
    count: u32,
    seed: u64,
    max_ticks: u64,
    config: Option<&Path>,
    no_commanders: bool,
    parallel: u32,
    output: Option<PathBuf>,
) -> Result<()> {
    let sim = sim_config(config)?;
    let batch = BatchConfig {
        match_count: count,
        seed_start: seed,
        max_ticks,
        commanders: !no_commanders,
        parallel,
        sim,
        output,
    };

    let results = run_batch(&batch);

    if let Some(path) = &batch.output {
        results.save(path)?;
        eprintln!("Results saved to: {}", path.display());
    }
    println!("{}", serde_json::to_string_pretty(&results.summary)?);

    eprintln!("\n{}", "=".repeat(50));
    eprintln!("BATCH COMPLETE");
    eprintln!("{}", "=".repeat(50));
    eprintln!("Matches played: {}", results.matches.len());
    if !results.errors.is_empty() {
        eprintln!("Matches FAILED: {}", results.errors.len());
        for error in results.errors.iter().take(10) {
            eprintln!(
                "  Match {} (seed {}): {}",
                error.match_index, error.seed, error.message
            );
        }
    }
    eprintln!("Duration: {:.1}s", results.duration_seconds);
    eprintln!(
        "Mean length: {:.0} ticks",
        results.summary.avg_duration_ticks
    );
    eprintln!("Undecided: {}", results.summary.undecided);
    let mut rates: Vec<_> = results.summary.win_rates.iter().collect();
    rates.sort_by(|a, b| a.0.cmp(b.0));
    for (team, rate) in rates {
        eprintln!("  {}: {:.1}%", team, rate * 100.0);
    }
    Ok(())
}
