//! Tool result tables.
//!
//! The tool writes one table per invocation into the working directory, named
//! `higgsCombine<name>.<MethodTag>.<anything>.<ext>`. Tables are comma
//! separated with a header row; columns are bound by name:
//!
//! | column             | field              | required |
//! |--------------------|--------------------|----------|
//! | `quantileExpected` | `ToyRow::quantile` | no       |
//! | `limit`            | `ToyRow::limit`    | yes      |
//! | `iToy`             | `ToyRow::toy`      | no       |
//!
//! Unknown columns are ignored. Rows that fail to parse are skipped and counted.

use std::collections::HashMap;
use std::fs::File;
use std::path::{Path, PathBuf};

use csv::StringRecord;

use crate::domain::{Method, ToyRow};
use crate::error::MethodError;

pub const COL_QUANTILE: &str = "quantileexpected";
pub const COL_LIMIT: &str = "limit";
pub const COL_TOY: &str = "itoy";

/// Rows read from one table.
#[derive(Debug, Clone, Default)]
pub struct ToyTable {
    pub rows: Vec<ToyRow>,
    pub skipped: usize,
}

/// File-name prefix of the artifacts produced by an invocation named `name`.
pub fn artifact_prefix(name: &str, method: Method) -> String {
    format!("higgsCombine{name}.{}.", method.tool_tag())
}

/// List artifacts in `dir` matching the prefix convention, sorted by file name.
pub fn find_artifacts(dir: &Path, name: &str, method: Method, ext: &str) -> Result<Vec<PathBuf>, MethodError> {
    let prefix = artifact_prefix(name, method);
    let suffix = format!(".{ext}");
    let mut found = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let file_name = entry.file_name();
        let Some(file_name) = file_name.to_str() else { continue };
        if file_name.starts_with(&prefix) && file_name.ends_with(&suffix) {
            found.push(entry.path());
        }
    }
    found.sort();
    Ok(found)
}

/// First artifact matching the prefix convention.
pub fn find_artifact(dir: &Path, name: &str, method: Method, ext: &str) -> Result<PathBuf, MethodError> {
    find_artifacts(dir, name, method, ext)?
        .into_iter()
        .next()
        .ok_or_else(|| MethodError::MissingArtifact(format!("{}*.{ext} in '{}'", artifact_prefix(name, method), dir.display())))
}

/// Read a result table.
pub fn read_toy_rows(path: &Path) -> Result<ToyTable, MethodError> {
    let file = File::open(path)
        .map_err(|e| MethodError::MissingArtifact(format!("{}: {e}", path.display())))?;

    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(file);

    let headers = reader
        .headers()
        .map_err(|e| MethodError::Io(format!("Failed to read header of '{}': {e}", path.display())))?
        .clone();
    let header_map = build_header_map(&headers);

    let limit_idx = *header_map.get(COL_LIMIT).ok_or_else(|| {
        MethodError::InsufficientData(format!("'{}' has no `limit` column", path.display()))
    })?;
    let quantile_idx = header_map.get(COL_QUANTILE).copied();
    let toy_idx = header_map.get(COL_TOY).copied();

    let mut table = ToyTable::default();
    for result in reader.records() {
        let Ok(record) = result else {
            table.skipped += 1;
            continue;
        };
        match parse_row(&record, limit_idx, quantile_idx, toy_idx) {
            Some(row) => table.rows.push(row),
            None => table.skipped += 1,
        }
    }
    Ok(table)
}

fn build_header_map(headers: &StringRecord) -> HashMap<String, usize> {
    headers
        .iter()
        .enumerate()
        .map(|(idx, name)| (normalize_header_name(name), idx))
        .collect()
}

fn normalize_header_name(name: &str) -> String {
    let name = name.trim().trim_start_matches('\u{feff}');
    name.to_ascii_lowercase()
}

fn parse_row(
    record: &StringRecord,
    limit_idx: usize,
    quantile_idx: Option<usize>,
    toy_idx: Option<usize>,
) -> Option<ToyRow> {
    // NaN limits are kept here; the extractors decide what to drop.
    let limit = record.get(limit_idx)?.parse::<f64>().ok()?;
    let quantile = match quantile_idx {
        Some(idx) => Some(record.get(idx)?.parse::<f64>().ok()?),
        None => None,
    };
    let toy = match toy_idx {
        Some(idx) => Some(parse_toy_index(record.get(idx)?)?),
        None => None,
    };
    Some(ToyRow { quantile, limit, toy })
}

// The tool stores the toy index as a float branch in some versions.
fn parse_toy_index(s: &str) -> Option<i64> {
    if let Ok(i) = s.parse::<i64>() {
        return Some(i);
    }
    let f = s.parse::<f64>().ok()?;
    (f.is_finite() && f.fract() == 0.0).then_some(f as i64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_columns_by_name() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("t.csv");
        std::fs::write(
            &path,
            "\u{feff}iToy, mh ,limit,quantileExpected\n0,120,4.5,-1\n1,120,nan,0.5\n2,120,oops,0.5\n3.0,120,2.0,0.16\n",
        )
        .unwrap();

        let table = read_toy_rows(&path).unwrap();
        assert_eq!(table.skipped, 1);
        assert_eq!(table.rows.len(), 3);
        assert_eq!(table.rows[0], ToyRow { quantile: Some(-1.0), limit: 4.5, toy: Some(0) });
        assert!(table.rows[1].limit.is_nan());
        assert_eq!(table.rows[2].toy, Some(3));
    }

    #[test]
    fn missing_limit_column_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("t.csv");
        std::fs::write(&path, "quantileExpected,r\n0.5,1.0\n").unwrap();
        assert!(matches!(read_toy_rows(&path), Err(MethodError::InsufficientData(_))));
    }

    #[test]
    fn finds_artifacts_by_prefix() {
        let dir = tempfile::tempdir().unwrap();
        for name in [
            "higgsCombineToys.ProfileLikelihood.mH120.2.csv",
            "higgsCombineToys.ProfileLikelihood.mH120.1.csv",
            "higgsCombineToys.ProfileLikelihood.mH120.1.root",
            "higgsCombineObserved.ProfileLikelihood.mH120.csv",
        ] {
            std::fs::write(dir.path().join(name), "limit\n1\n").unwrap();
        }

        let found = find_artifacts(dir.path(), "Toys", Method::ProfileLikelihood, "csv").unwrap();
        let names: Vec<_> = found
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(
            names,
            vec![
                "higgsCombineToys.ProfileLikelihood.mH120.1.csv",
                "higgsCombineToys.ProfileLikelihood.mH120.2.csv",
            ]
        );

        let err = find_artifact(dir.path(), "Grid", Method::FullCls, "csv").unwrap_err();
        assert!(matches!(err, MethodError::MissingArtifact(_)));
    }
}
