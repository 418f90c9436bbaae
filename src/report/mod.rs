//! Reporting utilities: best record per point, cross-section scaling.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::domain::{Method, Quantile, StoredRecord};

pub mod format;

pub use format::format_summary;

/// Limits in units of the signal strength and, when the cross section is
/// known, in cross-section units.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PointSummary {
    pub point: String,
    pub model: String,
    pub method: Method,
    /// Keyed by quantile name (`obs`, `m2s`, ...).
    pub limits: BTreeMap<Quantile, f64>,
    pub xsec: Option<f64>,
    pub xsec_err: Option<f64>,
    /// `limit * xsec` per quantile.
    pub xsec_limits: Option<BTreeMap<Quantile, f64>>,
    pub n_events: Option<u64>,
    pub recorded_at: String,
}

impl PointSummary {
    pub fn from_record(r: &StoredRecord) -> Self {
        let limits: BTreeMap<Quantile, f64> = Quantile::ALL.into_iter().map(|q| (q, r.value(q))).collect();
        let xsec_limits = r
            .xsec
            .map(|xsec| limits.iter().map(|(q, v)| (*q, v * xsec)).collect());
        Self {
            point: r.point.clone(),
            model: r.model.clone(),
            method: r.method,
            limits,
            xsec: r.xsec,
            xsec_err: r.xsec_err,
            xsec_limits,
            n_events: r.n_events,
            recorded_at: r.recorded_at.clone(),
        }
    }
}

/// Highest-priority record per point, sorted by point name.
///
/// Priority is the method order, never recency; among rows of the same
/// method the later row wins.
pub fn select_best(records: &[StoredRecord]) -> Vec<StoredRecord> {
    let mut best: BTreeMap<&str, &StoredRecord> = BTreeMap::new();
    for r in records {
        match best.get(r.point.as_str()) {
            Some(current) if current.method > r.method => {}
            _ => {
                best.insert(r.point.as_str(), r);
            }
        }
    }
    best.into_values().cloned().collect()
}

/// Best records of one model (all models when `model` is `None`).
pub fn summarize(records: &[StoredRecord], model: Option<&str>) -> Vec<PointSummary> {
    let filtered: Vec<StoredRecord> = records
        .iter()
        .filter(|r| model.is_none_or(|m| r.model == m))
        .cloned()
        .collect();
    select_best(&filtered).iter().map(PointSummary::from_record).collect()
}
