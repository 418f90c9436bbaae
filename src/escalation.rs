//! Method escalation for one point.
//!
//! Order: asymptotic -> profileLikelihood -> fullCLs.
//!
//! - asymptotic always runs
//! - profileLikelihood runs when asymptotic failed, or when forced
//! - fullCLs runs only when enabled and a band `(m2s, p2s)` is available,
//!   from this run's best record or from a previously stored one
//!
//! Every complete record is kept; consumers pick the highest-priority one.

use crate::domain::{LimitRecord, Method, Quantile};
use crate::error::MethodError;
use crate::method::{self, MethodContext, MethodResult};

/// The three methods as seen by the escalation policy.
pub trait LimitMethods {
    fn asymptotic(&mut self) -> MethodResult;
    fn profile_likelihood(&mut self) -> MethodResult;
    fn full_cls(&mut self, band: (f64, f64)) -> MethodResult;
}

/// Runs the methods with the external tool.
#[derive(Debug)]
pub struct CombineMethods<'a> {
    ctx: &'a MethodContext,
}

impl<'a> CombineMethods<'a> {
    pub fn new(ctx: &'a MethodContext) -> Self {
        Self { ctx }
    }
}

impl LimitMethods for CombineMethods<'_> {
    fn asymptotic(&mut self) -> MethodResult {
        method::run_asymptotic(self.ctx)
    }

    fn profile_likelihood(&mut self) -> MethodResult {
        method::run_profile_likelihood(self.ctx)
    }

    fn full_cls(&mut self, band: (f64, f64)) -> MethodResult {
        method::run_full_cls(self.ctx, band)
    }
}

/// Which optional methods to attempt.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EscalationPolicy {
    pub force_profile_likelihood: bool,
    pub full_cls: bool,
}

/// Result of escalating through the methods for one point.
#[derive(Debug, Default)]
pub struct Escalation {
    /// Complete records in the order they were produced.
    pub records: Vec<LimitRecord>,
    pub failures: Vec<(Method, MethodError)>,
    /// Set when fullCLs was enabled but skipped for lack of a band.
    pub full_cls_skipped: bool,
}

impl Escalation {
    /// Highest-priority record.
    pub fn best(&self) -> Option<&LimitRecord> {
        self.records.iter().max_by_key(|r| r.method)
    }

    pub fn attempted(&self) -> Vec<Method> {
        let mut out: Vec<Method> = self
            .records
            .iter()
            .map(|r| r.method)
            .chain(self.failures.iter().map(|(m, _)| *m))
            .collect();
        out.sort();
        out
    }

    fn accept(&mut self, method: Method, result: MethodResult) -> bool {
        let result = result.and_then(|record| {
            if record.is_complete() {
                Ok(record)
            } else {
                let missing: Vec<&str> = record.missing().into_iter().map(Quantile::key).collect();
                Err(MethodError::InsufficientData(format!("missing quantiles: {}", missing.join(", "))))
            }
        });
        match result {
            Ok(record) => {
                tracing::info!(method = %method, med = record.get(Quantile::Med), "method succeeded");
                self.records.push(record);
                true
            }
            Err(err) => {
                tracing::warn!(method = %method, error = %err, "method failed");
                self.failures.push((method, err));
                false
            }
        }
    }
}

/// Run the escalation. `stored_band` is the band of a record already in the
/// result store for this point, used for fullCLs when this run produced none.
pub fn escalate<M: LimitMethods>(
    methods: &mut M,
    policy: EscalationPolicy,
    stored_band: Option<(f64, f64)>,
) -> Escalation {
    let mut out = Escalation::default();

    let asymptotic_ok = out.accept(Method::Asymptotic, methods.asymptotic());

    if !asymptotic_ok || policy.force_profile_likelihood {
        out.accept(Method::ProfileLikelihood, methods.profile_likelihood());
    }

    if policy.full_cls {
        let band = out.best().and_then(LimitRecord::band).or(stored_band);
        match band {
            Some(band) => {
                out.accept(Method::FullCls, methods.full_cls(band));
            }
            None => {
                tracing::warn!("fullCLs requested but no (m2s, p2s) band is available, skipping");
                out.full_cls_skipped = true;
            }
        }
    }

    out
}
