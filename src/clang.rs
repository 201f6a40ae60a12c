use crate::config::RunnerConfig;
use crate::core::{BuildOutcome, ConfigError, SkipReason, Target};
use crate::project::Project;
use crate::sizes;
use crate::BuildAdapter;
use anyhow::{Context, Result};
use async_trait::async_trait;
use std::path::PathBuf;
use tokio::process::Command;
use tracing::{debug, error, info, warn};

pub const NAME: &str = "clang";
const SIZE_TOOL: &str = "llvm-size";

/// Experimental clang build path. A single shared Makefile under the
/// examples tree builds any project; there is no per-target opt-in, so
/// `check` only distinguishes projects with a CMake description (the same
/// population the gcc path builds).
pub struct Clang {
    examples_dir: PathBuf,
    sdk_dir: PathBuf,
    size_tool: String,
}

impl Clang {
    pub fn new(cfg: &RunnerConfig) -> Result<Self, ConfigError> {
        let sdk_dir = cfg.sdk_dir.clone().ok_or(ConfigError::MissingAdapterParameter {
            kind: NAME,
            missing: "an SDK directory (--sdkdir)",
        })?;
        Ok(Self {
            examples_dir: cfg.examples_dir.clone(),
            sdk_dir,
            size_tool: SIZE_TOOL.to_string(),
        })
    }

    pub fn with_size_tool(mut self, tool: &str) -> Self {
        self.size_tool = tool.to_string();
        self
    }

    /// The clang build writes next to, not into, the CMake build directory.
    fn build_dir(project: &Project) -> PathBuf {
        let mut dir = project.builddir.as_os_str().to_os_string();
        dir.push("_clang");
        PathBuf::from(dir)
    }
}

#[async_trait]
impl BuildAdapter for Clang {
    fn name(&self) -> &'static str {
        NAME
    }

    async fn build(&self, project: &Project) -> Result<BuildOutcome> {
        if project.is_excluded(NAME) {
            warn!("not building {}: excluded for {NAME}", project.title);
            return Ok(BuildOutcome::Skipped(SkipReason::Excluded));
        }
        info!("building {} with {NAME}", project.title);

        let makefile = self.examples_dir.join("build_utils/clang/Makefile");
        let output = Command::new("make")
            .arg("-f")
            .arg(&makefile)
            .env("DIALOG_SDK_PATH", &self.sdk_dir)
            .current_dir(&project.abs_path)
            .output()
            .await
            .context("spawning make")?;
        debug!("make: {}", String::from_utf8_lossy(&output.stdout));
        if !output.status.success() {
            error!(
                "build of {} failed: {}",
                project.title,
                String::from_utf8_lossy(&output.stderr)
            );
            return Ok(BuildOutcome::Failed(output.status.code().unwrap_or(-1)));
        }
        Ok(BuildOutcome::Built)
    }

    async fn check(&self, project: &mut Project, target: &Target) -> Result<()> {
        if project.is_excluded(NAME) {
            let bin = Self::build_dir(project).join(format!("{}.bin", project.title));
            project.add_build_status(NAME, target, false, bin, None);
            return Ok(());
        }
        if project.cmakelists_file.is_none() {
            return Ok(());
        }

        // one image per project; it counts for every target it was checked
        // against
        let bin = Self::build_dir(project).join(format!("{}.bin", project.title));
        let bin_abs = project.abs_path.join(&bin);
        if bin_abs.is_file() {
            let elf = bin_abs.with_extension("elf");
            let report = match sizes::read_gnu_sizes(&self.size_tool, &elf).await {
                Ok(report) => Some(report),
                Err(err) => {
                    debug!("no size metrics for {}: {err:#}", bin_abs.display());
                    None
                }
            };
            project.add_build_status(NAME, target, true, bin, report);
        } else {
            project.add_build_status(NAME, target, false, bin, None);
        }
        Ok(())
    }
}
