//! Tool command lines.
//!
//! Shape: `<tool> <datacard> -M <method> -s <seed> [flags...] -n <name>`.
//! `-n` names the invocation; the tool embeds it in its result file name
//! (`higgsCombine<name>.<Method>...`).

use std::path::Path;

use crate::domain::{Method, ToolConfig};
use crate::worker::{quote_path, shell_quote};

/// Seed value asking the tool to pick a random seed.
pub const RANDOM_SEED: i64 = -1;

fn base(tool: &ToolConfig, card: &Path, method: Method, seed: i64, name: &str) -> String {
    format!(
        "{} {} -M {} -s {seed} -n {}",
        tool.tool,
        quote_path(card),
        method.tool_tag(),
        shell_quote(name)
    )
}

pub fn asymptotic(tool: &ToolConfig, card: &Path) -> String {
    base(tool, card, Method::Asymptotic, RANDOM_SEED, "Asymptotic")
}

/// One toy ensemble of the profile-likelihood method.
pub fn profile_toys(tool: &ToolConfig, card: &Path, seed: u32, toys: u32) -> String {
    format!(
        "{} -t {toys}",
        base(tool, card, Method::ProfileLikelihood, i64::from(seed), "Toys")
    )
}

/// Profile-likelihood fit to the observed data.
pub fn profile_observed(tool: &ToolConfig, card: &Path) -> String {
    base(tool, card, Method::ProfileLikelihood, RANDOM_SEED, "Observed")
}

/// Toys at one fixed signal strength for the full-CLs grid.
pub fn grid_point(tool: &ToolConfig, card: &Path, index: usize, r: f64, toys: u32) -> String {
    format!(
        "{} --freq --clsAcc 0 -T {toys} -i 1 --saveToys --saveHybridResult --singlePoint {r:.4}",
        base(tool, card, Method::FullCls, RANDOM_SEED, &grid_name(index))
    )
}

/// Limit from a precomputed grid; `fraction = None` asks for the observed limit.
pub fn grid_scan(tool: &ToolConfig, card: &Path, index: usize, grid_file: &str, fraction: Option<f64>) -> String {
    let mut cmd = format!(
        "{} --freq --grid {}",
        base(tool, card, Method::FullCls, RANDOM_SEED, &scan_name(index)),
        shell_quote(grid_file)
    );
    if let Some(q) = fraction {
        cmd.push_str(&format!(" --expectedFromGrid {q}"));
    }
    cmd
}

/// Merge tables: `<merge> -f <output> <inputs...>` (inputs already quoted).
pub fn merge(tool: &ToolConfig, output: &str, inputs: &[String]) -> String {
    format!("{} -f {} {}", tool.merge, shell_quote(output), inputs.join(" "))
}

pub fn grid_name(index: usize) -> String {
    format!("Grid{index}")
}

pub fn scan_name(index: usize) -> String {
    format!("Expected{index}")
}
