//! Command-line parsing for the limit runner.
//!
//! The goal of this module is to keep **argument parsing** and **command dispatch**
//! separate from the orchestration code.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::domain::GridSpacing;

/// Top-level CLI.
#[derive(Debug, Parser)]
#[command(
    name = "compute-limit",
    version,
    about = "Upper limits per signal point with asymptotic -> profile-likelihood -> full-CLs fallback"
)]
pub struct Cli {
    /// Log verbosity level (trace, debug, info, warn, error).
    #[arg(long, global = true, default_value = "info")]
    pub log_level: tracing::Level,

    #[command(subcommand)]
    pub command: Command,
}

/// CLI subcommands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Compute limits for one point and append the records to the result store.
    ///
    /// This is the default: `compute-limit --model ...` means `compute-limit run --model ...`.
    Run(RunArgs),
    /// Print the best record per point from a result store.
    Summary(SummaryArgs),
}

/// Options for one point.
#[derive(Debug, Parser, Clone)]
pub struct RunArgs {
    /// Model name (e.g. T5wg).
    #[arg(long)]
    pub model: String,

    /// Point label within the model (e.g. 900_425).
    #[arg(long)]
    pub point: String,

    /// Datacard passed to the tool.
    #[arg(long, value_name = "PATH")]
    pub datacard: PathBuf,

    /// Working directory for this point. Emptied at the start of every run.
    #[arg(long, value_name = "DIR")]
    pub workdir: PathBuf,

    /// Result store (CSV, appended).
    #[arg(long, value_name = "CSV")]
    pub output: PathBuf,

    /// Also run profile likelihood when asymptotic converged.
    #[arg(long)]
    pub force_profile_likelihood: bool,

    /// Run the full-CLs grid scan (expensive).
    #[arg(long)]
    pub full_cls: bool,

    /// Invocation log. Defaults to `<workdir>.log`.
    #[arg(long, value_name = "PATH")]
    pub log: Option<PathBuf>,

    /// Cross-section table (`point xsec xsec_err n_events` per line).
    #[arg(long, value_name = "PATH")]
    pub xsecs: Option<PathBuf>,

    /// Maximum number of tool processes alive at once.
    #[arg(long, default_value_t = 4)]
    pub concurrency: usize,

    /// Number of seeded toy ensembles for profile likelihood.
    #[arg(long, default_value_t = 8)]
    pub toy_seeds: u32,

    /// Toys per profile-likelihood ensemble.
    #[arg(long, default_value_t = 100)]
    pub toys_per_job: u32,

    /// Signal-strength values in the full-CLs grid.
    #[arg(long, default_value_t = 100)]
    pub grid_points: usize,

    /// Spacing of the full-CLs grid.
    #[arg(long, value_enum, default_value_t = GridSpacing::Linear)]
    pub grid_spacing: GridSpacing,

    /// Multiplier on m2s for the lower grid bound.
    #[arg(long, default_value_t = 1.0)]
    pub grid_low_factor: f64,

    /// Multiplier on p2s for the upper grid bound.
    #[arg(long, default_value_t = 1.0)]
    pub grid_high_factor: f64,

    /// Toys per full-CLs grid point.
    #[arg(long, default_value_t = 1000)]
    pub toys_per_grid_point: u32,

    /// Polling interval for running processes (milliseconds).
    #[arg(long, default_value_t = 1000)]
    pub poll_ms: u64,

    /// Per-invocation timeout in seconds (0 = wait forever).
    #[arg(long, default_value_t = 0)]
    pub timeout_secs: u64,
}

/// Options for summarising a result store.
#[derive(Debug, Parser, Clone)]
pub struct SummaryArgs {
    /// Result store written by `compute-limit run`.
    #[arg(long, value_name = "CSV")]
    pub store: PathBuf,

    /// Only points of this model.
    #[arg(long)]
    pub model: Option<String>,

    /// Also write the summary as JSON.
    #[arg(long, value_name = "PATH")]
    pub json: Option<PathBuf>,
}
