use crate::cli::{ReportArgs, RunArgs};
use crate::config::RunnerConfig;
use crate::core::{self, BuildOutcome, ConfigError, SkipReason, Target};
use crate::project::Project;
use crate::registry::ProjectRegistry;
use crate::{adapter_for, BuildAdapter};
use anyhow::{bail, Context, Result};
use tracing::{error, info, warn};

/// One full batch: build every project under the patch-scoped loop, check
/// every (project, target) pair, print the per-target reports, persist the
/// registry. Returns the number of failed checks.
pub async fn run(args: &RunArgs) -> Result<usize> {
    let cfg = RunnerConfig::from_args(args).await?;
    let targets = core::load_targets(&cfg.targets_file).await?;

    let mut registry = if cfg.append {
        if !cfg.data_file.is_file() {
            return Err(ConfigError::MissingDataFile(cfg.data_file.clone()).into());
        }
        ProjectRegistry::from_data_file(&cfg.data_file, Some(&cfg.examples_dir)).await?
    } else {
        ProjectRegistry::discover(&cfg.project_dir, &cfg.examples_dir)?
    };
    let adapter = adapter_for(&cfg)?;
    registry.apply_exclusions(&cfg.exclude_text, adapter.name());
    info!(
        "{} projects, {} targets, build system {}",
        registry.len(),
        targets.len(),
        adapter.name()
    );

    let interrupted = tokio::select! {
        res = drive(&cfg, &mut registry, adapter.as_ref(), &targets) => {
            res?;
            false
        }
        _ = tokio::signal::ctrl_c() => {
            error!("aborting builds");
            true
        }
    };

    // collected results survive an interrupt; outstanding work does not
    registry
        .save(&cfg.data_file, Some(&cfg.examples_dir))
        .await?;

    if interrupted {
        bail!(
            "interrupted; partial results written to {}",
            cfg.data_file.display()
        );
    }
    Ok(registry.failed_checks(adapter.name()))
}

async fn drive(
    cfg: &RunnerConfig,
    registry: &mut ProjectRegistry,
    adapter: &dyn BuildAdapter,
    targets: &[Target],
) -> Result<()> {
    // strictly sequential: one build at a time, and at most one project's
    // patch applied to the shared SDK checkout
    for project in registry.iter() {
        build_one(cfg, project, adapter).await?;
    }
    for project in registry.iter_mut() {
        for target in targets {
            adapter.check(project, target).await?;
        }
    }
    for target in targets {
        registry.print_report(target, adapter.name());
    }
    Ok(())
}

/// Builds one project inside its patch scope. The patch is reverted even
/// when the build fails; a revert failure is fatal because it poisons every
/// later build against the same checkout.
async fn build_one(
    cfg: &RunnerConfig,
    project: &Project,
    adapter: &dyn BuildAdapter,
) -> Result<BuildOutcome> {
    if let Some(sdk) = cfg.sdk_dir.as_deref() {
        if let Err(err) = project.apply_patch_to_sdk(sdk).await {
            // git apply is all-or-nothing, so the checkout is still clean;
            // the project simply has nothing to build this run
            error!("patch for {} did not apply: {err:#}", project.title);
            return Ok(BuildOutcome::Skipped(SkipReason::PatchRejected));
        }
    }

    let outcome = adapter.build(project).await;

    if let Some(sdk) = cfg.sdk_dir.as_deref() {
        project
            .revert_patch_to_sdk(sdk)
            .await
            .with_context(|| format!("SDK checkout left dirty after {}", project.title))?;
    }

    let outcome = outcome?;
    match outcome {
        BuildOutcome::Built => info!("built {}", project.title),
        BuildOutcome::BuiltWithWarnings => warn!("built {} with warnings", project.title),
        BuildOutcome::Skipped(reason) => info!("skipped {} ({reason:?})", project.title),
        BuildOutcome::Failed(code) => {
            error!("build of {} failed with exit code {code}", project.title)
        }
    }
    Ok(outcome)
}

/// Re-prints the per-target reports from a persisted data file.
pub async fn report(args: &ReportArgs) -> Result<()> {
    let targets = core::load_targets(&args.targets).await?;
    let base = tokio::fs::canonicalize(&args.examples_dir)
        .await
        .with_context(|| format!("resolving {}", args.examples_dir.display()))?;
    let registry = ProjectRegistry::from_data_file(&args.datafile, Some(&base)).await?;
    for target in &targets {
        registry.print_report(target, args.buildsystem.id());
    }
    Ok(())
}
