//! Top-level application orchestration.
//!
//! `src/main.rs` is intentionally tiny; this module is the "real main" that:
//! - parses CLI arguments and environment
//! - initialises logging
//! - runs one point through the method escalation, or summarises a store

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;

use crate::cli::{Command, RunArgs, SummaryArgs};
use crate::domain::{LimitConfig, LimitPoint, MethodSettings, ToolConfig, default_error_markers};
use crate::error::{AppError, EXIT_USAGE};

pub mod pipeline;

pub const ENV_SETENV: &str = "LIMITS_SETENV";
pub const ENV_TOOL: &str = "LIMITS_TOOL";
pub const ENV_MERGE: &str = "LIMITS_MERGE";
pub const ENV_ARTIFACT_EXT: &str = "LIMITS_ARTIFACT_EXT";
pub const ENV_ERROR_MARKERS: &str = "LIMITS_ERROR_MARKERS";

/// Entry point for the `compute-limit` binary.
pub fn run() -> Result<(), AppError> {
    // `compute-limit --model ...` behaves like `compute-limit run --model ...`.
    let argv = rewrite_args(std::env::args().collect());
    let cli = crate::cli::Cli::parse_from(argv);

    tracing_subscriber::fmt()
        .with_max_level(cli.log_level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Command::Run(args) => handle_run(args),
        Command::Summary(args) => handle_summary(args),
    }
}

fn handle_run(args: RunArgs) -> Result<(), AppError> {
    dotenvy::dotenv().ok();
    let config = limit_config_from_args(&args, |key| std::env::var(key).ok())?;
    let run = pipeline::process_point(&config)?;

    let rows: Vec<_> = run
        .stored
        .iter()
        .map(crate::report::PointSummary::from_record)
        .collect();
    println!("{}", crate::report::format_summary(&rows));
    for (method, err) in &run.escalation.failures {
        println!("{method}: {err}");
    }
    if run.escalation.full_cls_skipped {
        println!("fullCLs: skipped, no (m2s, p2s) band available");
    }
    println!("log: {}", run.log.display());
    Ok(())
}

fn handle_summary(args: SummaryArgs) -> Result<(), AppError> {
    let records = crate::io::read_store(&args.store)?;
    let rows = crate::report::summarize(&records, args.model.as_deref());
    print!("{}", crate::report::format_summary(&rows));

    if let Some(path) = &args.json {
        crate::io::write_summary_json(path, &args.store, &rows)?;
    }
    Ok(())
}

/// Build the run configuration from flags plus environment (`lookup`).
pub fn limit_config_from_args(
    args: &RunArgs,
    lookup: impl Fn(&str) -> Option<String>,
) -> Result<LimitConfig, AppError> {
    if args.concurrency == 0 {
        return Err(AppError::new(EXIT_USAGE, "--concurrency must be >= 1."));
    }
    if args.toy_seeds == 0 || args.toys_per_job == 0 {
        return Err(AppError::new(EXIT_USAGE, "--toy-seeds and --toys-per-job must be >= 1."));
    }
    if args.grid_points == 0 || args.toys_per_grid_point == 0 {
        return Err(AppError::new(EXIT_USAGE, "--grid-points and --toys-per-grid-point must be >= 1."));
    }
    for (flag, v) in [("--grid-low-factor", args.grid_low_factor), ("--grid-high-factor", args.grid_high_factor)] {
        if !(v.is_finite() && v > 0.0) {
            return Err(AppError::new(EXIT_USAGE, format!("{flag} must be finite and > 0 (got {v}).")));
        }
    }
    if args.poll_ms == 0 {
        return Err(AppError::new(EXIT_USAGE, "--poll-ms must be >= 1."));
    }

    let timeout = (args.timeout_secs > 0).then(|| Duration::from_secs(args.timeout_secs));
    let tool = tool_config_from_env(&lookup, Duration::from_millis(args.poll_ms), timeout);

    Ok(LimitConfig {
        point: LimitPoint::new(args.model.clone(), args.point.clone()),
        datacard: args.datacard.clone(),
        workdir: args.workdir.clone(),
        output: args.output.clone(),
        log: args.log.clone().unwrap_or_else(|| default_log_path(&args.workdir)),
        xsecs: args.xsecs.clone(),
        force_profile_likelihood: args.force_profile_likelihood,
        full_cls: args.full_cls,
        methods: MethodSettings {
            concurrency: args.concurrency,
            toy_seeds: args.toy_seeds,
            toys_per_job: args.toys_per_job,
            grid_points: args.grid_points,
            grid_spacing: args.grid_spacing,
            grid_low_factor: args.grid_low_factor,
            grid_high_factor: args.grid_high_factor,
            toys_per_grid_point: args.toys_per_grid_point,
        },
        tool,
    })
}

/// Tool settings from the environment; unset variables keep their defaults.
///
/// `LIMITS_ERROR_MARKERS` is comma separated; setting it to an empty string
/// disables the marker scan.
pub fn tool_config_from_env(
    lookup: impl Fn(&str) -> Option<String>,
    poll_interval: Duration,
    timeout: Option<Duration>,
) -> ToolConfig {
    let defaults = ToolConfig::default();
    let non_empty = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

    let error_markers = match lookup(ENV_ERROR_MARKERS) {
        Some(list) => list
            .split(',')
            .map(str::trim)
            .filter(|m| !m.is_empty())
            .map(str::to_string)
            .collect(),
        None => default_error_markers(),
    };

    ToolConfig {
        setenv: lookup(ENV_SETENV).unwrap_or(defaults.setenv),
        tool: non_empty(ENV_TOOL).unwrap_or(defaults.tool),
        merge: non_empty(ENV_MERGE).unwrap_or(defaults.merge),
        artifact_ext: non_empty(ENV_ARTIFACT_EXT)
            .map(|ext| ext.trim_start_matches('.').to_string())
            .unwrap_or(defaults.artifact_ext),
        error_markers,
        poll_interval,
        timeout,
    }
}

/// `<workdir>.log`, next to the working directory.
fn default_log_path(workdir: &std::path::Path) -> PathBuf {
    // Normalise away a trailing separator so the log never lands inside the workdir.
    let normalized: PathBuf = workdir.components().collect();
    let mut name = normalized.into_os_string();
    name.push(".log");
    PathBuf::from(name)
}

/// Rewrite argv so bare flags mean `run`.
///
/// Rules:
/// - `compute-limit --model T5wg ...`          -> `compute-limit run --model T5wg ...`
/// - `compute-limit --log-level debug --model` -> `compute-limit --log-level debug run --model`
/// - subcommands, `--help`/`--version`         -> unchanged
fn rewrite_args(mut argv: Vec<String>) -> Vec<String> {
    // The global flag may precede the subcommand.
    let mut idx = 1;
    while let Some(arg) = argv.get(idx) {
        if arg == "--log-level" {
            idx += 2;
        } else if arg.starts_with("--log-level=") {
            idx += 1;
        } else {
            break;
        }
    }

    let Some(first) = argv.get(idx) else {
        return argv;
    };
    let is_help_version_or_subcommand = matches!(
        first.as_str(),
        "-h" | "--help" | "-V" | "--version" | "help" | "run" | "summary"
    );
    if !is_help_version_or_subcommand && first.starts_with('-') {
        argv.insert(idx, "run".to_string());
    }
    argv
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn argv(s: &str) -> Vec<String> {
        s.split_whitespace().map(str::to_string).collect()
    }

    fn run_args(extra: &str) -> RunArgs {
        let line = format!(
            "compute-limit run --model T5wg --point 900_425 --datacard c.dat --workdir /scratch/T5wg_900_425/ --output o.csv {extra}"
        );
        match crate::cli::Cli::try_parse_from(argv(&line)).unwrap().command {
            Command::Run(args) => args,
            Command::Summary(_) => panic!("expected run"),
        }
    }

    #[test]
    fn bare_flags_default_to_run() {
        assert_eq!(rewrite_args(argv("compute-limit --model T5wg")), argv("compute-limit run --model T5wg"));
        assert_eq!(
            rewrite_args(argv("compute-limit --log-level debug --model T5wg")),
            argv("compute-limit --log-level debug run --model T5wg")
        );
        assert_eq!(rewrite_args(argv("compute-limit summary --store a.csv")), argv("compute-limit summary --store a.csv"));
        assert_eq!(rewrite_args(argv("compute-limit --help")), argv("compute-limit --help"));
        assert_eq!(rewrite_args(argv("compute-limit")), argv("compute-limit"));
    }

    #[test]
    fn config_uses_defaults_without_environment() {
        let cfg = limit_config_from_args(&run_args(""), |_| None).unwrap();
        assert_eq!(cfg.point.name(), "T5wg_900_425");
        assert_eq!(cfg.log, PathBuf::from("/scratch/T5wg_900_425.log"));
        assert_eq!(cfg.tool.tool, "combine");
        assert_eq!(cfg.tool.merge, "hadd");
        assert_eq!(cfg.tool.error_markers, default_error_markers());
        assert_eq!(cfg.tool.timeout, None);
        assert_eq!(cfg.methods.concurrency, 4);
    }

    #[test]
    fn environment_overrides_tool_settings() {
        let env: HashMap<&str, &str> = [
            (ENV_SETENV, "source /opt/combine/env.sh;"),
            (ENV_TOOL, "/opt/combine/bin/combine"),
            (ENV_ARTIFACT_EXT, ".tsv"),
            (ENV_ERROR_MARKERS, "FATAL, Abort ,"),
        ]
        .into_iter()
        .collect();
        let cfg = limit_config_from_args(&run_args("--timeout-secs 600 --poll-ms 250"), |k| {
            env.get(k).map(|v| v.to_string())
        })
        .unwrap();

        assert_eq!(cfg.tool.setenv, "source /opt/combine/env.sh;");
        assert_eq!(cfg.tool.tool, "/opt/combine/bin/combine");
        assert_eq!(cfg.tool.merge, "hadd");
        assert_eq!(cfg.tool.artifact_ext, "tsv");
        assert_eq!(cfg.tool.error_markers, vec!["FATAL".to_string(), "Abort".to_string()]);
        assert_eq!(cfg.tool.timeout, Some(Duration::from_secs(600)));
        assert_eq!(cfg.tool.poll_interval, Duration::from_millis(250));
    }

    #[test]
    fn invalid_tuning_is_a_usage_error() {
        let err = limit_config_from_args(&run_args("--concurrency 0"), |_| None).unwrap_err();
        assert_eq!(err.exit_code(), EXIT_USAGE);
        let err = limit_config_from_args(&run_args("--grid-low-factor 0"), |_| None).unwrap_err();
        assert_eq!(err.exit_code(), EXIT_USAGE);
    }
}
