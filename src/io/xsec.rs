//! Cross-section tables.
//!
//! Plain text, one point per line: `<point name> <xsec> <xsec_err> <n_events>`.
//! Blank lines and `#` comments are ignored.

use std::collections::HashMap;
use std::path::Path;

use crate::domain::{LimitPoint, XsecEntry};
use crate::error::{AppError, EXIT_USAGE};

/// Parse a whole table. Malformed lines are reported with their line number.
pub fn parse_xsec_table(text: &str) -> Result<HashMap<String, XsecEntry>, AppError> {
    let mut out = HashMap::new();
    for (idx, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let cols: Vec<&str> = line.split_whitespace().collect();
        let [name, xsec, err, n] = cols.as_slice() else {
            return Err(AppError::new(
                EXIT_USAGE,
                format!("Cross-section line {}: expected 4 columns, got {}.", idx + 1, cols.len()),
            ));
        };
        let bad = |what: &str| AppError::new(EXIT_USAGE, format!("Cross-section line {}: invalid {what}.", idx + 1));
        let entry = XsecEntry {
            xsec: xsec.parse().map_err(|_| bad("xsec"))?,
            xsec_err: err.parse().map_err(|_| bad("uncertainty"))?,
            n_events: n.parse().map_err(|_| bad("event count"))?,
        };
        out.insert((*name).to_string(), entry);
    }
    Ok(out)
}

/// Look up one point in a table file.
pub fn lookup_xsec(path: &Path, point: &LimitPoint) -> Result<XsecEntry, AppError> {
    let text = std::fs::read_to_string(path).map_err(|e| {
        AppError::new(EXIT_USAGE, format!("Failed to read cross sections '{}': {e}", path.display()))
    })?;
    let table = parse_xsec_table(&text)?;
    table
        .get(&point.name())
        .copied()
        .ok_or_else(|| AppError::new(EXIT_USAGE, format!("No point {point} found in '{}'.", path.display())))
}
