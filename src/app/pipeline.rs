//! Per-point pipeline.
//!
//! cross section lookup -> fresh working directory -> run log -> escalation
//! over the methods -> append accepted records to the result store.

use std::path::{Path, PathBuf};

use crate::domain::{LimitConfig, StoredRecord};
use crate::error::{AppError, EXIT_NO_LIMIT, EXIT_RUNTIME, EXIT_USAGE};
use crate::escalation::{CombineMethods, Escalation, EscalationPolicy, escalate};
use crate::io::{ResultStore, RunLog, lookup_xsec, read_point_records, read_signal_yields};
use crate::method::MethodContext;
use crate::worker::Launcher;

/// Outputs of one `compute-limit run`.
#[derive(Debug)]
pub struct PointRun {
    pub escalation: Escalation,
    /// Rows appended to the result store.
    pub stored: Vec<StoredRecord>,
    pub log: PathBuf,
}

/// Process one point. Fails with `EXIT_NO_LIMIT` when no method produced a
/// complete record; nothing is written to the store in that case.
pub fn process_point(config: &LimitConfig) -> Result<PointRun, AppError> {
    // Validate inputs before touching the working directory.
    let xsec = config
        .xsecs
        .as_deref()
        .map(|path| lookup_xsec(path, &config.point))
        .transpose()?;
    let datacard = std::fs::canonicalize(&config.datacard).map_err(|e| {
        AppError::new(EXIT_USAGE, format!("Datacard '{}' not found: {e}", config.datacard.display()))
    })?;
    let yields = read_signal_yields(&datacard)?;

    guard_workdir(config)?;
    let workdir = prepare_workdir(&config.workdir)?;
    let log = RunLog::create(&config.log)?;
    tracing::info!(point = %config.point, workdir = %workdir.display(), log = %log.path().display(), "processing point");

    let stored_band = if config.full_cls {
        stored_band(config)?
    } else {
        None
    };

    let ctx = MethodContext {
        datacard,
        launcher: Launcher::new(&workdir, &config.tool),
        tool: config.tool.clone(),
        settings: config.methods.clone(),
        log,
    };
    let policy = EscalationPolicy {
        force_profile_likelihood: config.force_profile_likelihood,
        full_cls: config.full_cls,
    };
    let escalation = escalate(&mut CombineMethods::new(&ctx), policy, stored_band);

    if escalation.records.is_empty() {
        return Err(AppError::new(
            EXIT_NO_LIMIT,
            format!(
                "No method produced a limit for {} (tried {}); see '{}'.",
                config.point,
                escalation
                    .attempted()
                    .iter()
                    .map(|m| m.name())
                    .collect::<Vec<_>>()
                    .join(", "),
                ctx.log.path().display()
            ),
        ));
    }

    let mut store = ResultStore::new(&config.output);
    for record in &escalation.records {
        store.push(&config.point, record, xsec, &yields)?;
    }
    let stored = store.pending().to_vec();
    let written = store.flush()?;
    tracing::info!(point = %config.point, written, store = %store.path().display(), "records stored");

    Ok(PointRun {
        escalation,
        stored,
        log: ctx.log.path().to_path_buf(),
    })
}

/// Remove and recreate the working directory. Returns its absolute path.
pub fn prepare_workdir(path: &Path) -> Result<PathBuf, AppError> {
    if path.exists() {
        std::fs::remove_dir_all(path).map_err(|e| {
            AppError::new(EXIT_RUNTIME, format!("Failed to clear workdir '{}': {e}", path.display()))
        })?;
    }
    std::fs::create_dir_all(path)
        .map_err(|e| AppError::new(EXIT_RUNTIME, format!("Failed to create workdir '{}': {e}", path.display())))?;
    std::fs::canonicalize(path)
        .map_err(|e| AppError::new(EXIT_RUNTIME, format!("Failed to resolve workdir '{}': {e}", path.display())))
}

/// Refuse to clear a working directory that holds the run's own inputs or
/// outputs, or the current directory.
pub fn guard_workdir(config: &LimitConfig) -> Result<(), AppError> {
    let cwd = std::env::current_dir()
        .map_err(|e| AppError::new(EXIT_RUNTIME, format!("Failed to read the current directory: {e}")))?;
    let workdir = resolve(&cwd, &config.workdir);

    let mut protected = vec![
        ("datacard", config.datacard.as_path()),
        ("result store", config.output.as_path()),
        ("run log", config.log.as_path()),
        ("current directory", cwd.as_path()),
    ];
    if let Some(xsecs) = config.xsecs.as_deref() {
        protected.push(("cross-section table", xsecs));
    }

    for (what, path) in protected {
        if resolve(&cwd, path).starts_with(&workdir) {
            return Err(AppError::new(
                EXIT_USAGE,
                format!(
                    "Refusing to clear workdir '{}': it contains the {what} '{}'.",
                    config.workdir.display(),
                    path.display()
                ),
            ));
        }
    }
    Ok(())
}

/// Absolute path with symlinks resolved as far as the path exists.
fn resolve(cwd: &Path, path: &Path) -> PathBuf {
    let absolute: PathBuf = cwd.join(path).components().collect();
    let mut existing = absolute.as_path();
    let mut rest = Vec::new();
    loop {
        if let Ok(mut resolved) = std::fs::canonicalize(existing) {
            resolved.extend(rest.iter().rev());
            return resolved;
        }
        match (existing.parent(), existing.file_name()) {
            (Some(parent), Some(name)) => {
                rest.push(name);
                existing = parent;
            }
            _ => return absolute,
        }
    }
}

/// Band of the best record already stored for this point.
fn stored_band(config: &LimitConfig) -> Result<Option<(f64, f64)>, AppError> {
    let rows = read_point_records(&config.output, &config.point)?;
    Ok(crate::report::select_best(&rows)
        .first()
        .and_then(|r| r.to_limit_record().band()))
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::domain::{LimitPoint, Method, MethodSettings};
    use crate::io::read_store;
    use crate::method::testing::fake_tool;

    const TOOL: &str = r#"
case "$method" in
  Asymptotic)
    echo "At r = 1.2:	q_mu = 2.7"
    emit "-1,5.0,0" "0.025,1.0,0" "0.16,1.5,0" "0.5,2.0,0" "0.84,2.5,0" "0.975,3.0,0" ;;
  ProfileLikelihood)
    if [ "$name" = Observed ]; then emit "-1,4.5,0"; else emit "-1,1,1" "-1,2,2" "-1,3,3"; fi ;;
  HybridNew)
    case "$name" in
      Grid*) emit "0,$point,1" ;;
      *) if [ -z "$expq" ]; then emit "-1,2.2,0"; else emit "$expq,$expq,0"; fi ;;
    esac ;;
esac
"#;

    const CARD: &str = "imax 1\njmax 1\nkmax *\nel_signal gmN 12 0.003 -\nmu_signal gmN 7 - 0.002\n";

    fn config(dir: &Path, body: &str) -> LimitConfig {
        let datacard = dir.join("T5wg_900_425.dat");
        std::fs::write(&datacard, CARD).unwrap();
        LimitConfig {
            point: LimitPoint::new("T5wg", "900_425"),
            datacard,
            workdir: dir.join("work"),
            output: dir.join("results/T5wg.csv"),
            log: dir.join("logs/T5wg_900_425.log"),
            xsecs: None,
            force_profile_likelihood: false,
            full_cls: false,
            methods: MethodSettings {
                toy_seeds: 2,
                grid_points: 3,
                ..MethodSettings::default()
            },
            tool: fake_tool(dir, body),
        }
    }

    #[test]
    fn converged_point_is_stored_with_yields_and_xsec() {
        let dir = tempfile::tempdir().unwrap();
        let mut cfg = config(dir.path(), TOOL);
        let xsecs = dir.path().join("T5wg.xsecs");
        std::fs::write(&xsecs, "T5wg_900_425 0.046 0.21 60000\n").unwrap();
        cfg.xsecs = Some(xsecs);

        let run = process_point(&cfg).unwrap();
        assert_eq!(run.stored.len(), 1);

        let rows = read_store(&cfg.output).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].point, "T5wg_900_425");
        assert_eq!(rows[0].method, Method::Asymptotic);
        assert_eq!(rows[0].med, 2.0);
        assert_eq!(rows[0].n_events, Some(60000));
        assert_eq!(rows[0].signal_yields, "el=12;mu=7");
        assert!(std::fs::read_to_string(&cfg.log).unwrap().contains(" Asymptotic "));
    }

    #[test]
    fn all_methods_failing_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = config(dir.path(), "echo 'nothing to see'");

        let err = process_point(&cfg).unwrap_err();
        assert_eq!(err.exit_code(), EXIT_NO_LIMIT);
        assert!(!cfg.output.exists());
        let log = std::fs::read_to_string(&cfg.log).unwrap();
        assert!(log.contains(" Asymptotic ") && log.contains(" Toys seed 1 "));
    }

    #[test]
    fn stale_workdir_contents_are_removed() {
        let dir = tempfile::tempdir().unwrap();
        // Converges textually, but never writes a table.
        let cfg = config(dir.path(), r#"echo "At r = 1.2:	q_mu = 2.7""#);
        std::fs::create_dir_all(&cfg.workdir).unwrap();
        std::fs::write(
            cfg.workdir.join("higgsCombineAsymptotic.Asymptotic.mH120.-1.csv"),
            "quantileExpected,limit\n-1,5\n0.025,1\n0.16,1.5\n0.5,2\n0.84,2.5\n0.975,3\n",
        )
        .unwrap();

        let err = process_point(&cfg).unwrap_err();
        assert_eq!(err.exit_code(), EXIT_NO_LIMIT);
        assert_eq!(std::fs::read_dir(&cfg.workdir).unwrap().filter_map(Result::ok).filter(|e| e.file_name().to_string_lossy().starts_with("higgsCombine")).count(), 0);
    }

    #[test]
    fn full_escalation_stores_every_method() {
        let dir = tempfile::tempdir().unwrap();
        let mut cfg = config(dir.path(), TOOL);
        cfg.force_profile_likelihood = true;
        cfg.full_cls = true;

        let run = process_point(&cfg).unwrap();
        assert_eq!(run.escalation.best().map(|r| r.method), Some(Method::FullCls));

        let rows = read_store(&cfg.output).unwrap();
        let methods: Vec<Method> = rows.iter().map(|r| r.method).collect();
        assert_eq!(methods, vec![Method::Asymptotic, Method::ProfileLikelihood, Method::FullCls]);

        let best = crate::report::select_best(&rows);
        assert_eq!(best.len(), 1);
        assert_eq!(best[0].method, Method::FullCls);
    }

    #[test]
    fn full_cls_reuses_stored_band() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = config(dir.path(), TOOL);
        process_point(&cfg).unwrap();

        // Second run: asymptotic now fails, profile likelihood is not forced.
        let mut cfg = config(
            dir.path(),
            &format!("if [ \"$method\" != HybridNew ]; then exit 0; fi\n{TOOL}"),
        );
        cfg.full_cls = true;
        let run = process_point(&cfg).unwrap();
        assert_eq!(run.stored.len(), 1);
        assert_eq!(run.stored[0].method, Method::FullCls);
        assert_eq!(read_store(&cfg.output).unwrap().len(), 2);
    }

    #[test]
    fn store_inside_workdir_is_never_wiped() {
        let dir = tempfile::tempdir().unwrap();
        let mut cfg = config(dir.path(), TOOL);
        cfg.output = cfg.workdir.join("results.csv");
        std::fs::create_dir_all(&cfg.workdir).unwrap();
        std::fs::write(&cfg.output, "kept\n").unwrap();

        let err = process_point(&cfg).unwrap_err();
        assert_eq!(err.exit_code(), EXIT_USAGE);
        assert_eq!(std::fs::read_to_string(&cfg.output).unwrap(), "kept\n");
    }

    #[test]
    fn workdir_holding_inputs_is_refused() {
        let dir = tempfile::tempdir().unwrap();
        let mut cfg = config(dir.path(), TOOL);

        // Not created yet: the guard still sees the output would land inside.
        cfg.output = cfg.workdir.join("nested/results.csv");
        assert_eq!(guard_workdir(&cfg).unwrap_err().exit_code(), EXIT_USAGE);

        let mut cfg = config(dir.path(), TOOL);
        cfg.workdir = dir.path().to_path_buf();
        assert_eq!(guard_workdir(&cfg).unwrap_err().exit_code(), EXIT_USAGE);

        let cfg = config(dir.path(), TOOL);
        assert!(guard_workdir(&cfg).is_ok());
    }

    #[test]
    fn unknown_xsec_point_fails_before_running() {
        let dir = tempfile::tempdir().unwrap();
        let mut cfg = config(dir.path(), "touch ran");
        let xsecs = dir.path().join("T5wg.xsecs");
        std::fs::write(&xsecs, "T5wg_1000_25 0.03 0.2 60000\n").unwrap();
        cfg.xsecs = Some(xsecs);

        let err = process_point(&cfg).unwrap_err();
        assert_eq!(err.exit_code(), EXIT_USAGE);
        assert!(!cfg.workdir.exists());
    }
}
