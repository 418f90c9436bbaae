//! Append-only result store (CSV).
//!
//! One row per accepted limit record, keyed by point name. Several rows may
//! exist for the same point (one per successful method); readers pick the
//! highest-priority method (see `report::select_best`).
//!
//! Records are buffered in memory during a run and appended in one go by
//! [`ResultStore::flush`].

use std::collections::BTreeMap;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

use chrono::Utc;

use crate::domain::{LimitPoint, LimitRecord, Quantile, StoredRecord, XsecEntry};
use crate::error::{AppError, EXIT_RUNTIME, EXIT_USAGE};

#[derive(Debug)]
pub struct ResultStore {
    path: PathBuf,
    pending: Vec<StoredRecord>,
}

impl ResultStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            pending: Vec::new(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn pending(&self) -> &[StoredRecord] {
        &self.pending
    }

    /// Queue a record. Incomplete records are refused.
    pub fn push(
        &mut self,
        point: &LimitPoint,
        record: &LimitRecord,
        xsec: Option<XsecEntry>,
        signal_yields: &BTreeMap<String, u64>,
    ) -> Result<(), AppError> {
        let stored = to_stored(point, record, xsec, signal_yields)?;
        self.pending.push(stored);
        Ok(())
    }

    /// Append queued records to the store file, writing a header if the file is new.
    pub fn flush(&mut self) -> Result<usize, AppError> {
        if self.pending.is_empty() {
            return Ok(0);
        }
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| {
                AppError::new(EXIT_RUNTIME, format!("Failed to create '{}': {e}", parent.display()))
            })?;
        }

        let is_new = std::fs::metadata(&self.path).map(|m| m.len() == 0).unwrap_or(true);
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| AppError::new(EXIT_RUNTIME, format!("Failed to open store '{}': {e}", self.path.display())))?;

        let mut writer = csv::WriterBuilder::new().has_headers(is_new).from_writer(file);
        for record in &self.pending {
            writer
                .serialize(record)
                .map_err(|e| AppError::new(EXIT_RUNTIME, format!("Failed to write store row: {e}")))?;
        }
        writer
            .flush()
            .map_err(|e| AppError::new(EXIT_RUNTIME, format!("Failed to flush store: {e}")))?;

        let written = self.pending.len();
        self.pending.clear();
        Ok(written)
    }
}

/// Read every row of a store file.
pub fn read_store(path: &Path) -> Result<Vec<StoredRecord>, AppError> {
    let file = File::open(path)
        .map_err(|e| AppError::new(EXIT_USAGE, format!("Failed to open store '{}': {e}", path.display())))?;
    let mut reader = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(file);
    let mut out = Vec::new();
    for (idx, row) in reader.deserialize::<StoredRecord>().enumerate() {
        let row = row.map_err(|e| {
            AppError::new(
                EXIT_USAGE,
                format!("Invalid store row {} in '{}': {e}", idx + 2, path.display()),
            )
        })?;
        out.push(row);
    }
    Ok(out)
}

/// Rows for one point, or nothing if the store does not exist yet.
pub fn read_point_records(path: &Path, point: &LimitPoint) -> Result<Vec<StoredRecord>, AppError> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let name = point.name();
    Ok(read_store(path)?.into_iter().filter(|r| r.point == name).collect())
}

fn to_stored(
    point: &LimitPoint,
    record: &LimitRecord,
    xsec: Option<XsecEntry>,
    signal_yields: &BTreeMap<String, u64>,
) -> Result<StoredRecord, AppError> {
    let value = |q: Quantile| {
        record.get(q).ok_or_else(|| {
            AppError::new(
                EXIT_RUNTIME,
                format!("Refusing incomplete {} record for {point}: missing {}", record.method, q.key()),
            )
        })
    };

    Ok(StoredRecord {
        point: point.name(),
        model: point.model.clone(),
        method: record.method,
        obs: value(Quantile::Obs)?,
        m2s: value(Quantile::M2s)?,
        m1s: value(Quantile::M1s)?,
        med: value(Quantile::Med)?,
        p1s: value(Quantile::P1s)?,
        p2s: value(Quantile::P2s)?,
        xsec: xsec.map(|x| x.xsec),
        xsec_err: xsec.map(|x| x.xsec_err),
        n_events: xsec.map(|x| x.n_events),
        signal_yields: format_yields(signal_yields),
        recorded_at: Utc::now().to_rfc3339(),
    })
}

fn format_yields(yields: &BTreeMap<String, u64>) -> String {
    yields
        .iter()
        .map(|(ch, n)| format!("{ch}={n}"))
        .collect::<Vec<_>>()
        .join(";")
}
