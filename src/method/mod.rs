//! One runner per limit-setting method.
//!
//! Every runner follows the same shape: build tool invocations, run them
//! (single or through the worker pool), merge result tables, and hand the
//! merged table to the extractor. All captured output goes to the run log.

use std::path::{Path, PathBuf};

use crate::domain::{LimitRecord, MethodSettings, ToolConfig};
use crate::error::MethodError;
use crate::io::runlog::RunLog;
use crate::worker::{Completion, Launcher, WorkItem, WorkerPool, quote_path};

pub mod asymptotic;
pub mod command;
pub mod fullcls;
pub mod profile;

pub use asymptotic::{run_asymptotic, scan_converged};
pub use fullcls::{grid_bounds, grid_values, run_full_cls};
pub use profile::run_profile_likelihood;

/// Everything a method runner needs for one point.
#[derive(Debug, Clone)]
pub struct MethodContext {
    pub datacard: PathBuf,
    pub launcher: Launcher,
    pub tool: ToolConfig,
    pub settings: MethodSettings,
    pub log: RunLog,
}

impl MethodContext {
    pub fn workdir(&self) -> &Path {
        &self.launcher.workdir
    }

    pub fn pool(&self) -> WorkerPool {
        WorkerPool::new(self.launcher.clone(), self.settings.concurrency)
    }

    /// File name of a merged table in the working directory.
    pub fn merged_name(&self, stem: &str) -> String {
        format!("{stem}.{}", self.tool.artifact_ext)
    }

    /// Run one invocation and log its output.
    pub fn run_single(&self, item: WorkItem) -> Result<Completion, MethodError> {
        let done = WorkerPool::new(self.launcher.clone(), 1).run_one(item)?;
        self.log_completion(&done);
        Ok(done)
    }

    /// Run a batch through the pool, logging each completion as it arrives.
    pub fn run_batch(&self, items: Vec<WorkItem>) -> Result<Vec<Completion>, MethodError> {
        let total = items.len();
        let mut done = Vec::with_capacity(total);
        let stats = self.pool().run(items, |c| {
            self.log_completion(&c);
            done.push(c);
        })?;
        tracing::info!(
            total,
            failed = stats.failed,
            timed_out = stats.timed_out,
            max_running = stats.max_running,
            "batch finished"
        );
        Ok(done)
    }

    fn log_completion(&self, done: &Completion) {
        tracing::debug!(label = %done.label, status = %done.status(), elapsed_ms = done.elapsed.as_millis() as u64, "invocation finished");
        self.log.section(&done.label, &done.status(), &done.output);
    }

    /// Fail on timeouts or on configured error markers in the captured output.
    pub fn check_completion(&self, done: &Completion) -> Result<(), MethodError> {
        if done.timed_out {
            return Err(MethodError::TimedOut(done.label.clone()));
        }
        if let Some(line) = find_error_marker(&done.output, &self.tool.error_markers) {
            return Err(MethodError::ToolError {
                label: done.label.clone(),
                line: line.to_string(),
            });
        }
        if done.exit_code != Some(0) {
            tracing::warn!(label = %done.label, status = %done.status(), "tool exited abnormally");
        }
        Ok(())
    }

    /// Merge tables with the external merge utility. A non-zero exit or a
    /// missing output fails the method.
    pub fn merge(&self, label: &str, output: &str, inputs: &[PathBuf]) -> Result<PathBuf, MethodError> {
        let out_path = self.workdir().join(output);
        if inputs.is_empty() {
            return Err(MethodError::MissingArtifact(format!("no inputs to merge into {output}")));
        }
        let args: Vec<String> = inputs.iter().map(|p| quote_path(p)).collect();
        let cmd = command::merge(&self.tool, output, &args);
        let done = self.run_single(WorkItem::new(label, cmd))?;
        if done.timed_out || done.exit_code != Some(0) || !out_path.is_file() {
            return Err(MethodError::MergeFailed {
                output: out_path,
                code: done.exit_code,
            });
        }
        Ok(out_path)
    }
}

/// First output line that starts with one of the markers.
///
/// Leading whitespace and a RooFit message tag (`[#1] `) are skipped, so
/// `[#1] ERROR:Eval ...` matches `ERROR` while a fit summary that merely
/// mentions an error does not.
pub fn find_error_marker<'a>(output: &'a str, markers: &[String]) -> Option<&'a str> {
    output.lines().find(|line| {
        let text = strip_message_tag(line.trim_start());
        markers.iter().any(|m| !m.is_empty() && text.starts_with(m.as_str()))
    })
}

fn strip_message_tag(line: &str) -> &str {
    line.strip_prefix("[#")
        .and_then(|rest| rest.split_once(']'))
        .filter(|(level, _)| level.bytes().all(|b| b.is_ascii_digit()))
        .map_or(line, |(_, rest)| rest.trim_start())
}

/// Outcome of one method attempt.
pub type MethodResult = Result<LimitRecord, MethodError>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::default_error_markers;

    #[test]
    fn error_markers_match_line_starts() {
        let markers = default_error_markers();
        let out = "Computing limit\n[#1] ERROR:Eval -- fit failed\nDone\n";
        assert_eq!(find_error_marker(out, &markers), Some("[#1] ERROR:Eval -- fit failed"));
        assert_eq!(
            find_error_marker("  Error in <TFile::Open>: no such file\n", &markers),
            Some("  Error in <TFile::Open>: no such file")
        );
        assert_eq!(
            find_error_marker(" *** Break *** segmentation violation\n", &markers),
            Some(" *** Break *** segmentation violation")
        );
        assert_eq!(find_error_marker("all good\n", &markers), None);
        assert_eq!(find_error_marker("Error", &[String::new()]), None);
    }

    #[test]
    fn benign_mentions_of_errors_are_ignored() {
        let markers = default_error_markers();
        let out = "At r = 1.2:\tq_mu = 2.7\nr_sig  1.2 +/- 0.3 (Error estimated with MINOS)\n[#0] PROGRESS:Minimization -- ERROR level 1\n";
        assert_eq!(find_error_marker(out, &markers), None);
    }
}
