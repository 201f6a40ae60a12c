use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// One hardware variant from the target matrix (`targets.json`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Target {
    pub name: String,
    pub acronym: String,
}

pub async fn load_targets(path: &Path) -> Result<Vec<Target>> {
    let raw = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("reading targets file {}", path.display()))?;
    let targets: Vec<Target> = serde_json::from_str(&raw)
        .with_context(|| format!("parsing targets file {}", path.display()))?;
    Ok(targets)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    Excluded,
    MissingBuildConfig,
    PatchRejected,
}

/// What one `build()` came to. Skips count as failures in the aggregate
/// result but never invoke the toolchain and never abort the run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildOutcome {
    Built,
    /// Toolchain reported warnings but produced output (Keil exit code 1).
    BuiltWithWarnings,
    Skipped(SkipReason),
    Failed(i32),
}

impl BuildOutcome {
    pub fn succeeded(&self) -> bool {
        matches!(self, BuildOutcome::Built | BuildOutcome::BuiltWithWarnings)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("build system {kind} requires {missing}")]
    MissingAdapterParameter {
        kind: &'static str,
        missing: &'static str,
    },
    #[error("data file {0} does not exist (required for append mode)")]
    MissingDataFile(PathBuf),
}
