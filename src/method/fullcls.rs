//! Full CLs from a toy grid.
//!
//! Phase 1 runs one toy invocation per signal-strength value between the
//! bounds and merges them into a grid table. Phase 2 asks the tool for each
//! expected quantile (and the observed limit) from that grid and merges the
//! six answers into a tagged table.

use std::path::{Path, PathBuf};

use crate::domain::{GridSpacing, Method, MethodSettings, Quantile};
use crate::error::MethodError;
use crate::extract::{ParseMode, parse_artifact};
use crate::io::artifact::{find_artifact, find_artifacts};
use crate::method::{MethodContext, MethodResult, command};
use crate::worker::WorkItem;

const GRID_STEM: &str = "HybridGrid";
const EXPECTED_STEM: &str = "HybridExpected";

/// Signal-strength range of the grid from an `(m2s, p2s)` band.
pub fn grid_bounds(band: (f64, f64), settings: &MethodSettings) -> Result<(f64, f64), MethodError> {
    let low = band.0 * settings.grid_low_factor;
    let high = band.1 * settings.grid_high_factor;
    if !(low.is_finite() && high.is_finite() && low > 0.0 && high > low) {
        return Err(MethodError::InsufficientData(format!(
            "invalid grid range: low={low}, high={high} (must be finite, >0, and high>low)"
        )));
    }
    Ok((low, high))
}

/// `n` values starting at `low`, stepping towards `high` (exclusive).
pub fn grid_values(low: f64, high: f64, n: usize, spacing: GridSpacing) -> Vec<f64> {
    let steps = n as f64;
    match spacing {
        GridSpacing::Linear => {
            let step = (high - low) / steps;
            (0..n).map(|i| low + step * i as f64).collect()
        }
        GridSpacing::Log => {
            let ln_low = low.ln();
            let step = (high.ln() - ln_low) / steps;
            (0..n).map(|i| (ln_low + step * i as f64).exp()).collect()
        }
    }
}

pub fn run_full_cls(ctx: &MethodContext, band: (f64, f64)) -> MethodResult {
    let (low, high) = grid_bounds(band, &ctx.settings)?;
    if ctx.settings.grid_points == 0 {
        return Err(MethodError::InsufficientData("grid has no points".to_string()));
    }
    tracing::info!(low, high, points = ctx.settings.grid_points, "building full CLs grid");

    let grid = make_grid(ctx, low, high)?;
    scan(ctx, &grid)
}

fn make_grid(ctx: &MethodContext, low: f64, high: f64) -> Result<PathBuf, MethodError> {
    let s = &ctx.settings;
    let values = grid_values(low, high, s.grid_points, s.grid_spacing);
    let items: Vec<WorkItem> = values
        .iter()
        .enumerate()
        .map(|(i, &r)| {
            WorkItem::new(
                format!("Grid {r:.4}"),
                command::grid_point(&ctx.tool, &ctx.datacard, i, r, s.toys_per_grid_point),
            )
        })
        .collect();
    for done in ctx.run_batch(items)? {
        ctx.check_completion(&done)?;
    }

    let ext = &ctx.tool.artifact_ext;
    let mut tables = Vec::with_capacity(values.len());
    let mut missing = 0usize;
    for i in 0..values.len() {
        let found = find_artifacts(ctx.workdir(), &command::grid_name(i), Method::FullCls, ext)?;
        if found.is_empty() {
            missing += 1;
        }
        tables.extend(found);
    }
    if tables.is_empty() {
        return Err(MethodError::MissingArtifact(format!(
            "no grid tables in '{}'",
            ctx.workdir().display()
        )));
    }
    if missing > 0 {
        tracing::warn!(missing, total = values.len(), "grid points without a result table");
    }

    ctx.merge("Merge Grid", &ctx.merged_name(GRID_STEM), &tables)
}

fn scan(ctx: &MethodContext, grid: &Path) -> MethodResult {
    let grid_file = grid
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| ctx.merged_name(GRID_STEM));

    let items: Vec<WorkItem> = Quantile::ALL
        .iter()
        .enumerate()
        .map(|(i, q)| {
            WorkItem::new(
                format!("Expected {}", q.key()),
                command::grid_scan(&ctx.tool, &ctx.datacard, i, &grid_file, q.grid_fraction()),
            )
        })
        .collect();
    for done in ctx.run_batch(items)? {
        ctx.check_completion(&done)?;
    }

    let ext = &ctx.tool.artifact_ext;
    let tables = (0..Quantile::ALL.len())
        .map(|i| find_artifact(ctx.workdir(), &command::scan_name(i), Method::FullCls, ext))
        .collect::<Result<Vec<_>, _>>()?;

    let merged = ctx.merge("Merge Expected", &ctx.merged_name(EXPECTED_STEM), &tables)?;
    parse_artifact(&merged, ParseMode::Tagged, Method::FullCls)
}


#[cfg(all(test, unix))]
mod run_tests {
    use super::*;
    use crate::method::testing::fake_context;

    const TOOL: &str = r#"
case "$name" in
  Grid*)
    echo "$point" >> grid_points.txt
    emit "0,$point,1" ;;
  Expected*)
    case "$expq" in
      "") emit "-1,2.2,0" ;;
      0.025) emit "0.025,1.1,0" ;;
      0.16) emit "0.16,1.6,0" ;;
      0.5) emit "0.5,2.0,0" ;;
      0.84) emit "0.84,2.6,0" ;;
      0.975) emit "0.975,3.3,0" ;;
    esac ;;
esac
"#;

    #[test]
    fn grid_then_scan_yields_full_record() {
        let dir = tempfile::tempdir().unwrap();
        let mut ctx = fake_context(dir.path(), TOOL);
        ctx.settings.grid_points = 6;

        let record = run_full_cls(&ctx, (1.0, 4.0)).unwrap();
        assert_eq!(record.method, Method::FullCls);
        assert!(record.is_complete());
        assert_eq!(record.get(Quantile::Obs), Some(2.2));
        assert_eq!(record.get(Quantile::M2s), Some(1.1));
        assert_eq!(record.get(Quantile::P2s), Some(3.3));

        let points = std::fs::read_to_string(dir.path().join("grid_points.txt")).unwrap();
        let mut points: Vec<f64> = points.lines().map(|l| l.parse().unwrap()).collect();
        points.sort_by(f64::total_cmp);
        let expected = [1.0, 1.5, 2.0, 2.5, 3.0, 3.5];
        assert_eq!(points.len(), expected.len());
        assert!(points.iter().zip(expected).all(|(p, e)| (p - e).abs() < 1e-9), "{points:?}");
        assert!(dir.path().join("HybridGrid.csv").is_file());
    }

    #[test]
    fn missing_grid_points_are_tolerated() {
        let dir = tempfile::tempdir().unwrap();
        let tool = format!("if [ \"$name\" = Grid0 ] || [ \"$name\" = Grid2 ]; then exit 0; fi\n{TOOL}");
        let mut ctx = fake_context(dir.path(), &tool);
        ctx.settings.grid_points = 4;
        assert!(run_full_cls(&ctx, (1.0, 4.0)).is_ok());
    }

    #[test]
    fn empty_grid_fails() {
        let dir = tempfile::tempdir().unwrap();
        let mut ctx = fake_context(dir.path(), "exit 0");
        ctx.settings.grid_points = 3;
        assert!(matches!(run_full_cls(&ctx, (1.0, 4.0)), Err(MethodError::MissingArtifact(_))));
    }

    #[test]
    fn invalid_band_runs_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = fake_context(dir.path(), "touch called");
        assert!(matches!(run_full_cls(&ctx, (2.0, 1.0)), Err(MethodError::InsufficientData(_))));
        assert!(!dir.path().join("called").exists());
    }

    #[test]
    fn missing_scan_quantile_fails() {
        let dir = tempfile::tempdir().unwrap();
        let tool = format!("if [ \"$expq\" = 0.84 ]; then exit 0; fi\n{TOOL}");
        let mut ctx = fake_context(dir.path(), &tool);
        ctx.settings.grid_points = 2;
        assert!(matches!(run_full_cls(&ctx, (1.0, 4.0)), Err(MethodError::MissingArtifact(_))));
    }
}
