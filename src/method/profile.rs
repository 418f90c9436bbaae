//! Profile likelihood with toys.
//!
//! `N` seeded toy ensembles run through the pool and are merged into one
//! table; the expected band comes from the empirical quantiles of that table.
//! The observed limit comes from one extra fit to data.

use crate::domain::{LimitRecord, Method, Quantile};
use crate::error::MethodError;
use crate::extract::{ParseMode, observed_limit, parse_artifact};
use crate::io::artifact::{find_artifact, find_artifacts, read_toy_rows};
use crate::method::{MethodContext, MethodResult, command};
use crate::worker::WorkItem;

const TOYS: &str = "Toys";
const OBSERVED: &str = "Observed";
const MERGED_STEM: &str = "ProfileLikelihoodToys";

pub fn run_profile_likelihood(ctx: &MethodContext) -> MethodResult {
    let expected = toy_band(ctx)?;
    let obs = observed(ctx)?;

    let mut observed = LimitRecord::new(Method::ProfileLikelihood);
    observed.set(Quantile::Obs, obs);
    let record = expected.union(&observed);

    if !record.is_complete() {
        let missing: Vec<&str> = record.missing().into_iter().map(Quantile::key).collect();
        return Err(MethodError::InsufficientData(format!("missing quantiles: {}", missing.join(", "))));
    }
    Ok(record)
}

fn toy_band(ctx: &MethodContext) -> MethodResult {
    let seeds = ctx.settings.toy_seeds;
    if seeds == 0 {
        return Err(MethodError::InsufficientData("no toy seeds configured".to_string()));
    }

    let items: Vec<WorkItem> = (1..=seeds)
        .map(|seed| {
            WorkItem::new(
                format!("Toys seed {seed}"),
                command::profile_toys(&ctx.tool, &ctx.datacard, seed, ctx.settings.toys_per_job),
            )
        })
        .collect();
    for done in ctx.run_batch(items)? {
        ctx.check_completion(&done)?;
    }

    // One table per seed; all of them are needed.
    let tables = find_artifacts(ctx.workdir(), TOYS, Method::ProfileLikelihood, &ctx.tool.artifact_ext)?;
    if tables.len() < seeds as usize {
        return Err(MethodError::MissingArtifact(format!(
            "{} of {seeds} toy tables in '{}'",
            tables.len(),
            ctx.workdir().display()
        )));
    }

    let merged = ctx.merge("Merge Toys", &ctx.merged_name(MERGED_STEM), &tables)?;
    parse_artifact(
        &merged,
        ParseMode::RawToys {
            exclude_observed: true,
        },
        Method::ProfileLikelihood,
    )
}

fn observed(ctx: &MethodContext) -> Result<f64, MethodError> {
    let cmd = command::profile_observed(&ctx.tool, &ctx.datacard);
    let done = ctx.run_single(WorkItem::new(OBSERVED, cmd))?;
    ctx.check_completion(&done)?;

    let path = find_artifact(ctx.workdir(), OBSERVED, Method::ProfileLikelihood, &ctx.tool.artifact_ext)?;
    let table = read_toy_rows(&path)?;
    observed_limit(&table.rows)
        .ok_or_else(|| MethodError::InsufficientData(format!("no observed limit in '{}'", path.display())))
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::method::testing::fake_context;

    // Every seed writes toys 1..3 tagged -1, like the tool; seed 8 has an outlier.
    const TOOL: &str = r#"
case "$name" in
  Toys)
    if [ "$seed" = 8 ]; then
      emit "-1,1,1" "-1,2,2" "-1,900,3"
    else
      emit "-1,1,1" "-1,2,2" "-1,3,3"
    fi ;;
  Observed)
    emit "-1,4.5,0" ;;
esac
"#;

    #[test]
    fn merges_all_seeds_and_adds_observed() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = fake_context(dir.path(), TOOL);

        let record = run_profile_likelihood(&ctx).unwrap();
        assert!(record.is_complete());
        assert_eq!(record.method, Method::ProfileLikelihood);
        assert_eq!(record.get(Quantile::Obs), Some(4.5));
        // 23 values after trimming 900: eight 1s, eight 2s, seven 3s.
        assert_eq!(record.get(Quantile::M2s), Some(1.0));
        assert_eq!(record.get(Quantile::Med), Some(2.0));
        assert_eq!(record.get(Quantile::P2s), Some(3.0));

        let log = std::fs::read_to_string(ctx.log.path()).unwrap();
        for seed in 1..=8 {
            assert!(log.contains(&format!(" Toys seed {seed} ")));
        }
        assert!(log.contains(" Merge Toys "));
        assert!(log.contains(" Observed "));
    }

    #[test]
    fn a_missing_seed_fails_the_method() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = fake_context(
            dir.path(),
            r#"
if [ "$name" = Toys ] && [ "$seed" != 3 ]; then emit "-1,1,1"; fi
if [ "$name" = Observed ]; then emit "-1,4.5,0"; fi
"#,
        );
        assert!(matches!(run_profile_likelihood(&ctx), Err(MethodError::MissingArtifact(_))));
    }

    #[test]
    fn missing_observed_limit_fails() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = fake_context(
            dir.path(),
            r#"
if [ "$name" = Toys ]; then emit "-1,1,1" "-1,2,2"; fi
if [ "$name" = Observed ]; then emit "0.5,-3,1"; fi
"#,
        );
        assert!(matches!(run_profile_likelihood(&ctx), Err(MethodError::InsufficientData(_))));
    }

    #[test]
    fn failed_merge_fails_the_method() {
        let dir = tempfile::tempdir().unwrap();
        let mut ctx = fake_context(dir.path(), TOOL);
        ctx.tool.merge = "false".to_string();
        assert!(matches!(run_profile_likelihood(&ctx), Err(MethodError::MergeFailed { .. })));
    }
}
