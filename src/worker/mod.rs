//! Bounded-concurrency execution of external tool invocations.
//!
//! Everything runs on one thread: processes are spawned through `sh -c` and
//! polled with `try_wait` at a fixed interval. Combined stdout/stderr of each
//! process is redirected into a capture file and read back once it exits.
//! Each process leads its own process group; a timeout kills the group.

use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::domain::ToolConfig;

pub mod pool;

pub use pool::{PoolStats, WorkerPool};

/// A pending invocation: a shell command plus a label for logs (seed, r-value, ...).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkItem {
    pub label: String,
    pub command: String,
}

impl WorkItem {
    pub fn new(label: impl Into<String>, command: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            command: command.into(),
        }
    }
}

/// A finished invocation.
#[derive(Debug, Clone)]
pub struct Completion {
    pub label: String,
    /// Combined stdout + stderr.
    pub output: String,
    /// `None` when killed by a signal or when the process never started.
    pub exit_code: Option<i32>,
    pub timed_out: bool,
    pub elapsed: Duration,
}

impl Completion {
    pub fn succeeded(&self) -> bool {
        !self.timed_out && self.exit_code == Some(0)
    }

    /// Short status for log headers.
    pub fn status(&self) -> String {
        if self.timed_out {
            return "timeout".to_string();
        }
        match self.exit_code {
            Some(code) => format!("exit={code}"),
            None => "killed".to_string(),
        }
    }
}

/// Where and how invocations run.
#[derive(Debug, Clone)]
pub struct Launcher {
    pub workdir: PathBuf,
    /// Shell prefix run before `cd <workdir>`.
    pub setenv: String,
    pub poll_interval: Duration,
    pub timeout: Option<Duration>,
}

impl Launcher {
    pub fn new(workdir: impl Into<PathBuf>, tool: &ToolConfig) -> Self {
        Self {
            workdir: workdir.into(),
            setenv: tool.setenv.clone(),
            poll_interval: tool.poll_interval,
            timeout: tool.timeout,
        }
    }

    /// Full shell line for a command: environment setup, then `cd` into the workdir.
    pub fn shell_line(&self, command: &str) -> String {
        let cd = format!("cd {}", shell_quote(&self.workdir.to_string_lossy()));
        let setenv = self.setenv.trim();
        if setenv.is_empty() {
            format!("{cd}; {command}")
        } else {
            format!("{setenv} {cd}; {command}")
        }
    }

    pub fn capture_dir(&self) -> PathBuf {
        self.workdir.join(".capture")
    }
}

/// Single-quote a string for `sh`.
pub fn shell_quote(s: &str) -> String {
    if !s.is_empty() && s.bytes().all(|b| b.is_ascii_alphanumeric() || b"/._-+=:,".contains(&b)) {
        return s.to_string();
    }
    format!("'{}'", s.replace('\'', r"'\''"))
}

/// Quote a path argument.
pub fn quote_path(path: &Path) -> String {
    shell_quote(&path.to_string_lossy())
}
