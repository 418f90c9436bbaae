//! Per-point invocation log.
//!
//! Every tool invocation's combined stdout/stderr ends up here, successful or
//! not. It is the only durable trace of a failed run.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::Local;

use crate::error::{AppError, EXIT_RUNTIME};

const RULE: &str = "--------------------";

#[derive(Debug, Clone)]
pub struct RunLog {
    path: PathBuf,
}

impl RunLog {
    /// Create (or truncate) the log file.
    pub fn create(path: impl Into<PathBuf>) -> Result<Self, AppError> {
        let path = path.into();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| {
                AppError::new(EXIT_RUNTIME, format!("Failed to create log dir '{}': {e}", parent.display()))
            })?;
        }
        File::create(&path)
            .map_err(|e| AppError::new(EXIT_RUNTIME, format!("Failed to create log '{}': {e}", path.display())))?;
        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one section. Write failures are reported but never abort a run.
    pub fn section(&self, label: &str, status: &str, content: &str) {
        if let Err(e) = self.try_section(label, status, content) {
            tracing::warn!(path = %self.path.display(), error = %e, "failed to append to run log");
        }
    }

    fn try_section(&self, label: &str, status: &str, content: &str) -> std::io::Result<()> {
        let mut file = OpenOptions::new().create(true).append(true).open(&self.path)?;
        writeln!(file, "{RULE} {label} {RULE}")?;
        writeln!(file, "# {} status={status}", Local::now().to_rfc3339())?;
        file.write_all(content.as_bytes())?;
        if !content.is_empty() && !content.ends_with('\n') {
            writeln!(file)?;
        }
        Ok(())
    }
}
