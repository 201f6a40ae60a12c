use crate::cli::{BuildSystemKind, PublishArgs, RunArgs};
use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

/// Everything one `run` invocation needs, resolved once up front and passed
/// by reference. Directories that must already exist are canonicalized so
/// the recorded paths stay stable regardless of the invocation directory.
#[derive(Debug, Clone)]
pub struct RunnerConfig {
    pub project_dir: PathBuf,
    pub examples_dir: PathBuf,
    pub sdk_dir: Option<PathBuf>,
    pub data_file: PathBuf,
    pub targets_file: PathBuf,
    pub exclude_text: String,
    pub buildsystem: BuildSystemKind,
    pub append: bool,
    pub uv4_path: PathBuf,
    pub jobs: u32,
    pub verbose: bool,
}

impl RunnerConfig {
    pub async fn from_args(args: &RunArgs) -> Result<Self> {
        let project_dir = canonical(&args.projdir).await?;
        let examples_dir = match &args.examples_dir {
            Some(dir) => canonical(dir).await?,
            None => project_dir.clone(),
        };
        let sdk_dir = match &args.sdkdir {
            Some(dir) => Some(canonical(dir).await?),
            None => None,
        };
        let exclude_text = load_exclude_text(&args.exclude).await?;
        Ok(Self {
            project_dir,
            examples_dir,
            sdk_dir,
            data_file: args.datafile.clone(),
            targets_file: args.targets.clone(),
            exclude_text,
            buildsystem: args.buildsystem,
            append: args.append,
            uv4_path: args.uv4.clone(),
            jobs: args.jobs,
            verbose: args.verbose,
        })
    }
}

#[derive(Debug, Clone)]
pub struct PublishConfig {
    pub data_file: PathBuf,
    pub targets_file: PathBuf,
    pub artifacts_dir: PathBuf,
    pub bucket: String,
    pub sync: bool,
    pub examples_dir: PathBuf,
}

impl PublishConfig {
    pub async fn from_args(args: &PublishArgs) -> Result<Self> {
        Ok(Self {
            data_file: args.datafile.clone(),
            targets_file: args.targets.clone(),
            artifacts_dir: args.artifacts_dir.clone(),
            bucket: args.bucket.clone(),
            sync: !args.no_sync,
            examples_dir: canonical(&args.examples_dir).await?,
        })
    }
}

async fn canonical(path: &Path) -> Result<PathBuf> {
    tokio::fs::canonicalize(path)
        .await
        .with_context(|| format!("resolving {}", path.display()))
}

/// The exclude argument accepts either a file (a build report, a plain list,
/// any text mentioning the titles) or a literal string of titles.
pub async fn load_exclude_text(arg: &str) -> Result<String> {
    if arg.is_empty() {
        return Ok(String::new());
    }
    let path = Path::new(arg);
    if path.is_file() {
        tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("reading exclude file {arg}"))
    } else {
        Ok(arg.to_string())
    }
}
