//! Quantile-limit extraction from tool result tables.
//!
//! Two modes:
//! - `Tagged`: every row carries a continuous `quantileExpected` tag which is
//!   bucketed into one of the six quantiles (`tagged`).
//! - `RawToys`: rows are individual toy outcomes; the expected band is taken
//!   from empirical quantiles after trimming the high tail (`toys`).

use std::path::Path;

use crate::domain::{LimitRecord, Method, Quantile, ToyRow};
use crate::error::MethodError;
use crate::io::artifact::read_toy_rows;

pub mod tagged;
pub mod toys;

pub use tagged::{bucket, classify_tagged};
pub use toys::{empirical_quantiles, expected_from_toys, observed_limit, trim_high_tail};

/// How to interpret a result table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseMode {
    Tagged,
    /// `exclude_observed` drops the toy-index-0 row from the ensemble and
    /// reports it as `obs` instead.
    RawToys { exclude_observed: bool },
}

/// Parse a result artifact into a limit record.
///
/// Tagged mode only succeeds with all six quantiles. Raw-toy mode yields the
/// five expected quantiles (plus `obs` when the observed toy is present and
/// excluded from the ensemble).
pub fn parse_artifact(path: &Path, mode: ParseMode, method: Method) -> Result<LimitRecord, MethodError> {
    if !path.is_file() {
        return Err(MethodError::MissingArtifact(path.display().to_string()));
    }
    let table = read_toy_rows(path)?;
    if table.skipped > 0 {
        tracing::warn!(path = %path.display(), skipped = table.skipped, "skipped unreadable result rows");
    }
    parse_rows(&table.rows, mode, method)
}

/// Same as [`parse_artifact`] on rows already in memory.
pub fn parse_rows(rows: &[ToyRow], mode: ParseMode, method: Method) -> Result<LimitRecord, MethodError> {
    match mode {
        ParseMode::Tagged => {
            let record = classify_tagged(rows, method);
            if !record.is_complete() {
                let missing: Vec<&str> = record.missing().into_iter().map(Quantile::key).collect();
                return Err(MethodError::InsufficientData(format!(
                    "missing quantiles: {}",
                    missing.join(", ")
                )));
            }
            Ok(record)
        }
        ParseMode::RawToys { exclude_observed } => expected_from_toys(rows, exclude_observed, method),
    }
}
