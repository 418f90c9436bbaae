//! Read-only scans of a datacard.
//!
//! The datacard itself is handed to the tool untouched; we only pick out the
//! per-channel signal event counts for the result store. Those live on the
//! statistical-uncertainty lines of the signal process:
//!
//! ```text
//! elLowPt_signal gmN 12 0.0031 - - ...
//! ```

use std::collections::BTreeMap;
use std::path::Path;

use crate::error::{AppError, EXIT_USAGE};

const SIGNAL_SUFFIX: &str = "_signal";

/// Channel name -> raw signal event count.
pub fn signal_yields(text: &str) -> BTreeMap<String, u64> {
    let mut out = BTreeMap::new();
    for line in text.lines() {
        let cols: Vec<&str> = line.split_whitespace().collect();
        let Some(first) = cols.first() else { continue };
        let Some(channel) = first.strip_suffix(SIGNAL_SUFFIX) else { continue };
        if channel.is_empty() {
            continue;
        }
        if let Some(count) = cols.get(2).and_then(|c| c.parse::<u64>().ok()) {
            out.insert(channel.to_string(), count);
        }
    }
    out
}

pub fn read_signal_yields(path: &Path) -> Result<BTreeMap<String, u64>, AppError> {
    let text = std::fs::read_to_string(path)
        .map_err(|e| AppError::new(EXIT_USAGE, format!("Failed to read datacard '{}': {e}", path.display())))?;
    Ok(signal_yields(&text))
}
