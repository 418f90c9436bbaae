//! JSON export of the per-point summary.
//!
//! The file carries the store it was built from, a generation timestamp, and
//! the best record per point (see `report::PointSummary`).

use std::fs::File;
use std::path::Path;

use chrono::Utc;
use serde::Serialize;

use crate::error::{AppError, EXIT_USAGE};
use crate::report::PointSummary;

#[derive(Debug, Serialize)]
struct SummaryFile<'a> {
    tool: &'static str,
    store: String,
    generated_at: String,
    points: &'a [PointSummary],
}

/// Write a summary JSON file.
pub fn write_summary_json(path: &Path, store: &Path, points: &[PointSummary]) -> Result<(), AppError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .map_err(|e| AppError::new(EXIT_USAGE, format!("Failed to create '{}': {e}", parent.display())))?;
    }
    let file = File::create(path)
        .map_err(|e| AppError::new(EXIT_USAGE, format!("Failed to create summary JSON '{}': {e}", path.display())))?;

    let summary = SummaryFile {
        tool: "compute-limit",
        store: store.display().to_string(),
        generated_at: Utc::now().to_rfc3339(),
        points,
    };

    serde_json::to_writer_pretty(file, &summary)
        .map_err(|e| AppError::new(EXIT_USAGE, format!("Failed to write summary JSON: {e}")))?;

    Ok(())
}
