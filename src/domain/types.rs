//! Shared domain types.
//!
//! Records are kept serializable so they can be appended to the result store
//! and reloaded later for summaries.

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

/// One signal hypothesis: a model name plus a point label (e.g. `T5wg` / `900_425`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct LimitPoint {
    pub model: String,
    pub point: String,
}

impl LimitPoint {
    pub fn new(model: impl Into<String>, point: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            point: point.into(),
        }
    }

    /// Full point name, `<model>_<point>`. This is the key in the result store
    /// and in cross-section tables.
    pub fn name(&self) -> String {
        format!("{}_{}", self.model, self.point)
    }
}

impl fmt::Display for LimitPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}", self.model, self.point)
    }
}

/// Observed limit plus the five expected-band quantiles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Quantile {
    Obs,
    M2s,
    M1s,
    Med,
    P1s,
    P2s,
}

impl Quantile {
    pub const ALL: [Quantile; 6] = [
        Quantile::Obs,
        Quantile::M2s,
        Quantile::M1s,
        Quantile::Med,
        Quantile::P1s,
        Quantile::P2s,
    ];

    pub fn key(self) -> &'static str {
        match self {
            Quantile::Obs => "obs",
            Quantile::M2s => "m2s",
            Quantile::M1s => "m1s",
            Quantile::Med => "med",
            Quantile::P1s => "p1s",
            Quantile::P2s => "p2s",
        }
    }

    /// Probability passed to the tool when asking for this expected quantile
    /// from a precomputed grid. `None` for the observed limit.
    pub fn grid_fraction(self) -> Option<f64> {
        match self {
            Quantile::Obs => None,
            Quantile::M2s => Some(0.025),
            Quantile::M1s => Some(0.16),
            Quantile::Med => Some(0.5),
            Quantile::P1s => Some(0.84),
            Quantile::P2s => Some(0.975),
        }
    }
}

/// Limit-setting method, declared in priority order (cheapest first).
///
/// The derived `Ord` is the priority: a later variant supersedes an earlier one
/// when both produced a record for the same point.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, ValueEnum,
)]
pub enum Method {
    #[serde(rename = "asymptotic")]
    #[value(name = "asymptotic")]
    Asymptotic,
    #[serde(rename = "profileLikelihood")]
    #[value(name = "profileLikelihood")]
    ProfileLikelihood,
    #[serde(rename = "fullCLs")]
    #[value(name = "fullCLs")]
    FullCls,
}

impl Method {
    pub const ALL: [Method; 3] = [Method::Asymptotic, Method::ProfileLikelihood, Method::FullCls];

    /// Name used in the result store and in logs.
    pub fn name(self) -> &'static str {
        match self {
            Method::Asymptotic => "asymptotic",
            Method::ProfileLikelihood => "profileLikelihood",
            Method::FullCls => "fullCLs",
        }
    }

    /// Value of the tool's `-M` flag, also embedded in its artifact file names.
    pub fn tool_tag(self) -> &'static str {
        match self {
            Method::Asymptotic => "Asymptotic",
            Method::ProfileLikelihood => "ProfileLikelihood",
            Method::FullCls => "HybridNew",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Method {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Method::ALL
            .into_iter()
            .find(|m| m.name().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("Unknown method '{s}'."))
    }
}

/// Quantile limits produced by one method attempt.
///
/// Records can be partial while a method assembles them; only complete records
/// (all six quantiles) are accepted by the result store.
#[derive(Debug, Clone, PartialEq)]
pub struct LimitRecord {
    pub method: Method,
    pub values: BTreeMap<Quantile, f64>,
}

impl LimitRecord {
    pub fn new(method: Method) -> Self {
        Self {
            method,
            values: BTreeMap::new(),
        }
    }

    pub fn get(&self, q: Quantile) -> Option<f64> {
        self.values.get(&q).copied()
    }

    /// Set a quantile, overwriting any previous value.
    pub fn set(&mut self, q: Quantile, value: f64) {
        self.values.insert(q, value);
    }

    pub fn is_complete(&self) -> bool {
        Quantile::ALL.iter().all(|q| self.values.contains_key(q))
    }

    pub fn missing(&self) -> Vec<Quantile> {
        Quantile::ALL
            .into_iter()
            .filter(|q| !self.values.contains_key(q))
            .collect()
    }

    /// Merge another partial record into this one. Values from `other` win.
    pub fn union(mut self, other: &LimitRecord) -> Self {
        for (q, v) in &other.values {
            self.values.insert(*q, *v);
        }
        self
    }

    /// The `(m2s, p2s)` pair used as the signal-strength range of a grid scan.
    pub fn band(&self) -> Option<(f64, f64)> {
        Some((self.get(Quantile::M2s)?, self.get(Quantile::P2s)?))
    }
}

/// One row of a tool result table.
///
/// `quantile` is the continuous quantile tag (negative for the observed limit),
/// `toy` the toy index when the row comes from a toy ensemble (0 = observed).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ToyRow {
    pub quantile: Option<f64>,
    pub limit: f64,
    pub toy: Option<i64>,
}

/// Signal-strength spacing for the full-CLs grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum GridSpacing {
    /// Evenly spaced values between the bounds.
    Linear,
    /// Evenly spaced in `ln r`.
    Log,
}

/// Cross-section table entry for one point.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct XsecEntry {
    pub xsec: f64,
    pub xsec_err: f64,
    pub n_events: u64,
}

/// How to reach the external tools.
#[derive(Debug, Clone)]
pub struct ToolConfig {
    /// Shell prefix run before every invocation (environment setup).
    pub setenv: String,
    pub tool: String,
    pub merge: String,
    /// Extension of the tool's result tables.
    pub artifact_ext: String,
    /// Substrings in captured output that mark a failed invocation.
    pub error_markers: Vec<String>,
    pub poll_interval: Duration,
    /// Per-invocation timeout. `None` waits forever.
    pub timeout: Option<Duration>,
}

impl Default for ToolConfig {
    fn default() -> Self {
        Self {
            setenv: String::new(),
            tool: "combine".to_string(),
            merge: "hadd".to_string(),
            artifact_ext: "csv".to_string(),
            error_markers: default_error_markers(),
            poll_interval: Duration::from_secs(1),
            timeout: None,
        }
    }
}

/// Line prefixes that mark a failed invocation.
pub fn default_error_markers() -> Vec<String> {
    ["Error", "ERROR", "*** Break ***", "Segmentation violation"]
        .into_iter()
        .map(str::to_string)
        .collect()
}

/// Parameters of the individual methods.
#[derive(Debug, Clone)]
pub struct MethodSettings {
    pub concurrency: usize,
    pub toy_seeds: u32,
    pub toys_per_job: u32,
    pub grid_points: usize,
    pub grid_spacing: GridSpacing,
    pub grid_low_factor: f64,
    pub grid_high_factor: f64,
    pub toys_per_grid_point: u32,
}

impl Default for MethodSettings {
    fn default() -> Self {
        Self {
            concurrency: 4,
            toy_seeds: 8,
            toys_per_job: 100,
            grid_points: 100,
            grid_spacing: GridSpacing::Linear,
            grid_low_factor: 1.0,
            grid_high_factor: 1.0,
            toys_per_grid_point: 1000,
        }
    }
}

/// A full run's configuration as understood by the pipeline.
///
/// This is derived from CLI flags plus environment.
#[derive(Debug, Clone)]
pub struct LimitConfig {
    pub point: LimitPoint,
    pub datacard: PathBuf,
    pub workdir: PathBuf,
    pub output: PathBuf,
    pub log: PathBuf,
    pub xsecs: Option<PathBuf>,
    pub force_profile_likelihood: bool,
    pub full_cls: bool,
    pub methods: MethodSettings,
    pub tool: ToolConfig,
}

/// One row of the result store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredRecord {
    pub point: String,
    pub model: String,
    pub method: Method,
    pub obs: f64,
    pub m2s: f64,
    pub m1s: f64,
    pub med: f64,
    pub p1s: f64,
    pub p2s: f64,
    pub xsec: Option<f64>,
    pub xsec_err: Option<f64>,
    pub n_events: Option<u64>,
    /// `channel=count` pairs joined with `;`.
    pub signal_yields: String,
    pub recorded_at: String,
}

impl StoredRecord {
    pub fn value(&self, q: Quantile) -> f64 {
        match q {
            Quantile::Obs => self.obs,
            Quantile::M2s => self.m2s,
            Quantile::M1s => self.m1s,
            Quantile::Med => self.med,
            Quantile::P1s => self.p1s,
            Quantile::P2s => self.p2s,
        }
    }

    pub fn to_limit_record(&self) -> LimitRecord {
        let mut record = LimitRecord::new(self.method);
        for q in Quantile::ALL {
            record.set(q, self.value(q));
        }
        record
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn method_order_is_priority_order() {
        assert!(Method::Asymptotic < Method::ProfileLikelihood);
        assert!(Method::ProfileLikelihood < Method::FullCls);
        for pair in Method::ALL.windows(2) {
            assert!(pair[0] < pair[1]);
        }
    }

    #[test]
    fn method_parses_store_names() {
        assert_eq!("fullCLs".parse::<Method>().unwrap(), Method::FullCls);
        assert_eq!("profilelikelihood".parse::<Method>().unwrap(), Method::ProfileLikelihood);
        assert!("hybrid".parse::<Method>().is_err());
    }

    #[test]
    fn record_completeness_and_union() {
        let mut expected = LimitRecord::new(Method::ProfileLikelihood);
        for (i, q) in Quantile::ALL[1..].iter().copied().enumerate() {
            expected.set(q, 1.0 + i as f64);
        }
        assert!(!expected.is_complete());
        assert_eq!(expected.missing(), vec![Quantile::Obs]);

        let mut observed = LimitRecord::new(Method::ProfileLikelihood);
        observed.set(Quantile::Obs, 2.2);

        let full = expected.union(&observed);
        assert!(full.is_complete());
        assert_eq!(full.band(), Some((1.0, 5.0)));
    }

    #[test]
    fn point_name_joins_model_and_label() {
        let p = LimitPoint::new("T5wg", "900_425");
        assert_eq!(p.name(), "T5wg_900_425");
        assert_eq!(p.to_string(), p.name());
    }
}
