//! Expected limits from raw toy ensembles.
//!
//! Toy fits occasionally fail numerically and report absurdly large limits.
//! Before taking empirical quantiles we cut the high tail with a histogram
//! heuristic:
//!
//! 1. bin width = (median - min) / 5, bins anchored at the minimum
//! 2. scan from the highest bin downwards for the first pair of consecutive
//!    empty bins above the median's bin
//! 3. drop every value above the lower edge of that pair
//!
//! This is a tunable heuristic, not a statistically rigorous procedure. It
//! only ever truncates the high tail; values at or below the median are kept.

use crate::domain::{LimitRecord, Method, Quantile, ToyRow};
use crate::error::MethodError;

/// Number of bins between the minimum and the median.
pub const BINS_BELOW_MEDIAN: f64 = 5.0;

/// Empirical fractions used for the expected band.
pub const TOY_FRACTIONS: [(Quantile, f64); 5] = [
    (Quantile::M2s, 0.05),
    (Quantile::M1s, 0.32),
    (Quantile::Med, 0.5),
    (Quantile::P1s, 0.68),
    (Quantile::P2s, 0.95),
];

/// Trim the high tail of an ascending-sorted slice. Returns a prefix.
pub fn trim_high_tail(sorted: &[f64]) -> &[f64] {
    let n = sorted.len();
    if n < 2 {
        return sorted;
    }
    let min = sorted[0];
    let median = sorted[n / 2];
    let width = (median - min) / BINS_BELOW_MEDIAN;
    if !(width.is_finite() && width > 0.0) {
        return sorted;
    }

    let bin_of = |v: f64| ((v - min) / width).floor();
    let median_bin = bin_of(median);

    // Occupied bins are non-decreasing along the sorted values, so a run of at
    // least two empty bins shows up as a jump of >= 3 between neighbours.
    for i in (1..n).rev() {
        let upper = bin_of(sorted[i]);
        let lower = bin_of(sorted[i - 1]);
        if upper - lower < 3.0 {
            continue;
        }
        let first_empty = upper - 2.0;
        if first_empty <= median_bin {
            break;
        }
        let edge = (min + first_empty * width).max(median);
        let keep = sorted.partition_point(|&v| v <= edge);
        return &sorted[..keep.max(i)];
    }
    sorted
}

/// Quantile values by index `floor(fraction * n)` into a sorted slice.
pub fn empirical_quantiles(sorted: &[f64]) -> Vec<(Quantile, f64)> {
    let n = sorted.len();
    if n == 0 {
        return Vec::new();
    }
    TOY_FRACTIONS
        .iter()
        .map(|&(q, fraction)| {
            let idx = ((fraction * n as f64).floor() as usize).min(n - 1);
            (q, sorted[idx])
        })
        .collect()
}

/// Observed limit: the last positive row of toy 0.
///
/// Tables without a toy index fall back to the negative quantile tag.
pub fn observed_limit(rows: &[ToyRow]) -> Option<f64> {
    let indexed = has_toy_index(rows);
    rows.iter()
        .filter(|r| is_observed(r, indexed) && r.limit.is_finite() && r.limit > 0.0)
        .map(|r| r.limit)
        .last()
}

// Toy ensembles tag every row with -1, so the tag only identifies the
// observed fit when there is no toy index to go by.
fn is_observed(row: &ToyRow, indexed: bool) -> bool {
    if indexed {
        row.toy == Some(0)
    } else {
        row.quantile.is_some_and(|q| q < 0.0)
    }
}

fn has_toy_index(rows: &[ToyRow]) -> bool {
    rows.iter().any(|r| r.toy.is_some())
}

/// Build the expected band from toy rows.
pub fn expected_from_toys(rows: &[ToyRow], exclude_observed: bool, method: Method) -> Result<LimitRecord, MethodError> {
    let indexed = has_toy_index(rows);
    let mut values: Vec<f64> = rows
        .iter()
        .filter(|r| !(exclude_observed && is_observed(r, indexed)))
        .map(|r| r.limit)
        .filter(|v| v.is_finite() && *v > 0.0)
        .collect();

    if values.is_empty() {
        return Err(MethodError::InsufficientData("no usable toys".to_string()));
    }
    values.sort_by(f64::total_cmp);

    let trimmed = trim_high_tail(&values);
    if trimmed.len() < values.len() {
        tracing::debug!(
            total = values.len(),
            kept = trimmed.len(),
            cut_above = trimmed.last().copied().unwrap_or(f64::NAN),
            "trimmed toy high tail"
        );
    }

    let mut record = LimitRecord::new(method);
    for (q, v) in empirical_quantiles(trimmed) {
        record.set(q, v);
    }
    if exclude_observed {
        if let Some(obs) = observed_limit(rows) {
            record.set(Quantile::Obs, obs);
        }
    }
    Ok(record)
}
