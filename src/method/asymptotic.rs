//! Asymptotic CLs: one invocation, tagged result table.

use crate::domain::Method;
use crate::error::MethodError;
use crate::extract::{ParseMode, parse_artifact};
use crate::io::artifact::find_artifact;
use crate::method::{MethodContext, MethodResult, command};
use crate::worker::WorkItem;

const SCAN_LINE: &str = "At r = ";
const NAN_MARKER: &str = "q_mu = nan";

const NAME: &str = "Asymptotic";

/// True when the last `At r = ...` scan line is not flagged with `q_mu = nan`,
/// either on the same line or on the line right after it.
pub fn scan_converged(output: &str) -> bool {
    let lines: Vec<&str> = output.lines().collect();
    let Some(idx) = lines.iter().rposition(|l| l.contains(SCAN_LINE)) else {
        return false;
    };
    let tail = lines[idx].split_once(SCAN_LINE).map_or("", |(_, rest)| rest);
    if tail.contains(NAN_MARKER) {
        return false;
    }
    !lines.get(idx + 1).is_some_and(|next| next.contains(NAN_MARKER))
}

pub fn run_asymptotic(ctx: &MethodContext) -> MethodResult {
    let cmd = command::asymptotic(&ctx.tool, &ctx.datacard);
    let done = ctx.run_single(WorkItem::new(NAME, cmd))?;
    ctx.check_completion(&done)?;

    if !scan_converged(&done.output) {
        return Err(MethodError::NonConvergence);
    }

    let artifact = find_artifact(ctx.workdir(), NAME, Method::Asymptotic, &ctx.tool.artifact_ext)?;
    parse_artifact(&artifact, ParseMode::Tagged, Method::Asymptotic)
}
