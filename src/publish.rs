use crate::cli::PublishArgs;
use crate::config::PublishConfig;
use crate::core::{self, Target};
use crate::project::Project;
use crate::registry::ProjectRegistry;
use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::process::Command;
use tracing::{info, warn};

pub const DEFAULT_BUCKET: &str = "lpccs-sdk6-examples-ci";

/// One row of the per-target metadata file written into the artifacts tree.
/// `bin_path` points at the copied binary, relative to the artifacts root.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArtifactRecord {
    pub path: PathBuf,
    pub group: String,
    pub title: String,
    #[serde(rename = "readmePath")]
    pub readme_path: Option<PathBuf>,
    #[serde(rename = "binPath")]
    pub bin_path: PathBuf,
}

/// Assembles the artifacts tree from a persisted data file: per target, a
/// `projectData.json` listing the passing projects plus a copy of each
/// passing binary, laid out as `<acronym>/<project path>/<binary>`. Then
/// syncs the tree to the bucket unless --no-sync was given.
pub async fn publish(args: &PublishArgs) -> Result<()> {
    let cfg = PublishConfig::from_args(args).await?;
    let targets = core::load_targets(&cfg.targets_file).await?;
    let registry = ProjectRegistry::from_data_file(&cfg.data_file, Some(&cfg.examples_dir)).await?;

    for target in &targets {
        assemble_target(&cfg, &registry, target).await?;
    }

    if cfg.sync {
        sync_to_bucket(&cfg.artifacts_dir, &cfg.bucket).await?;
    } else {
        info!("skipping cloud sync");
    }
    Ok(())
}

async fn assemble_target(
    cfg: &PublishConfig,
    registry: &ProjectRegistry,
    target: &Target,
) -> Result<()> {
    let target_dir = cfg.artifacts_dir.join(&target.acronym);
    tokio::fs::create_dir_all(&target_dir)
        .await
        .with_context(|| format!("creating {}", target_dir.display()))?;

    let mut records = Vec::new();
    for project in registry.iter() {
        if let Some(record) = stage_artifact(cfg, project, target, &target_dir).await? {
            records.push(record);
        }
    }

    let metadata = serde_json::to_string_pretty(&records)?;
    let metadata_file = target_dir.join("projectData.json");
    tokio::fs::write(&metadata_file, metadata)
        .await
        .with_context(|| format!("writing {}", metadata_file.display()))?;
    info!("{}: staged {} artifacts", target.name, records.len());
    Ok(())
}

/// Copies one project's passing binary for `target` into the tree and
/// returns its metadata row; `None` when the project has no passing entry
/// or the binary has since disappeared (skipped with a warning).
async fn stage_artifact(
    cfg: &PublishConfig,
    project: &Project,
    target: &Target,
    target_dir: &Path,
) -> Result<Option<ArtifactRecord>> {
    let Some(entry) = project
        .ledger()
        .filter(|r| r.target.name == target.name && r.passed)
        .last()
    else {
        return Ok(None);
    };

    let source = project.abs_path.join(&entry.bin_path);
    if !source.is_file() {
        warn!(
            "binary for {} / {} is gone: {}",
            project.title,
            target.name,
            source.display()
        );
        return Ok(None);
    }
    let file_name = source
        .file_name()
        .ok_or_else(|| anyhow::anyhow!("artifact {} has no file name", source.display()))?;

    let dest_dir = target_dir.join(&project.path);
    tokio::fs::create_dir_all(&dest_dir)
        .await
        .with_context(|| format!("creating {}", dest_dir.display()))?;
    let dest = dest_dir.join(file_name);
    tokio::fs::copy(&source, &dest)
        .await
        .with_context(|| format!("copying {} to {}", source.display(), dest.display()))?;

    let readme_path = project
        .readme_path
        .as_deref()
        .map(|p| p.strip_prefix(&cfg.examples_dir).unwrap_or(p).to_path_buf());
    let bin_path = dest
        .strip_prefix(&cfg.artifacts_dir)
        .unwrap_or(&dest)
        .to_path_buf();

    Ok(Some(ArtifactRecord {
        path: project.path.clone(),
        group: project.group.clone(),
        title: project.title.clone(),
        readme_path,
        bin_path,
    }))
}

async fn sync_to_bucket(artifacts_dir: &Path, bucket: &str) -> Result<()> {
    info!("syncing {} to s3://{bucket}", artifacts_dir.display());
    let output = Command::new("aws")
        .arg("s3")
        .arg("sync")
        .arg(artifacts_dir)
        .arg(format!("s3://{bucket}"))
        .output()
        .await
        .context("spawning aws")?;
    if !output.status.success() {
        bail!(
            "aws s3 sync failed: {}",
            String::from_utf8_lossy(&output.stderr)
        );
    }
    Ok(())
}
