use crate::config::RunnerConfig;
use crate::core::{BuildOutcome, ConfigError, SkipReason, Target};
use crate::project::Project;
use crate::sizes;
use crate::BuildAdapter;
use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use std::path::PathBuf;
use tokio::process::Command;
use tracing::{debug, error, info, warn};

pub const NAME: &str = "CMake/gcc10";
const SIZE_TOOL: &str = "arm-none-eabi-size";
const GCC_TOOL: &str = "arm-none-eabi-gcc";

/// Drives the CMake + GNU Arm toolchain. A project opts a target in by
/// setting `BUILD_FOR_<acronym>` in its CMakeLists; the build then leaves
/// `<title>_<acronym>.bin` (and a sibling ELF) in the build directory.
pub struct Cmake {
    examples_dir: PathBuf,
    sdk_dir: PathBuf,
    size_tool: String,
    jobs: u32,
}

impl Cmake {
    pub fn new(cfg: &RunnerConfig) -> Result<Self, ConfigError> {
        let sdk_dir = cfg.sdk_dir.clone().ok_or(ConfigError::MissingAdapterParameter {
            kind: NAME,
            missing: "an SDK directory (--sdkdir)",
        })?;
        Ok(Self {
            examples_dir: cfg.examples_dir.clone(),
            sdk_dir,
            size_tool: SIZE_TOOL.to_string(),
            jobs: cfg.jobs,
        })
    }

    pub fn with_size_tool(mut self, tool: &str) -> Self {
        self.size_tool = tool.to_string();
        self
    }

    fn bin_path(project: &Project, target: &Target) -> PathBuf {
        project
            .builddir
            .join(format!("{}_{}.bin", project.title, target.acronym))
    }
}

#[async_trait]
impl BuildAdapter for Cmake {
    fn name(&self) -> &'static str {
        NAME
    }

    async fn build(&self, project: &Project) -> Result<BuildOutcome> {
        if project.cmakelists_file.is_none() {
            warn!("not building {}: no CMakeLists.txt", project.title);
            return Ok(BuildOutcome::Skipped(SkipReason::MissingBuildConfig));
        }
        if project.is_excluded(NAME) {
            warn!("not building {}: excluded for {NAME}", project.title);
            return Ok(BuildOutcome::Skipped(SkipReason::Excluded));
        }
        info!("building {} with {NAME}", project.title);

        // every run starts from a clean build directory
        let build_dir = project.abs_path.join(&project.builddir);
        if build_dir.exists() {
            tokio::fs::remove_dir_all(&build_dir)
                .await
                .with_context(|| format!("clearing {}", build_dir.display()))?;
        }
        tokio::fs::create_dir_all(&build_dir)
            .await
            .with_context(|| format!("creating {}", build_dir.display()))?;

        let gcc = resolve_tool(GCC_TOOL).await?;
        let toolchain_file = self.examples_dir.join("build_utils/gcc/arm-none-eabi.cmake");
        let configure = Command::new("cmake")
            .arg(format!("-DDEVICE_NAME={}", project.title))
            .arg("-DCMAKE_BUILD_TYPE=DEBUG")
            .arg(format!("-DCMAKE_TOOLCHAIN_FILE={}", toolchain_file.display()))
            .arg(format!("-DGCC_TOOLCHAIN_PATH={gcc}"))
            .arg(format!("-DDIALOG_SDK_PATH={}", self.sdk_dir.display()))
            .arg(format!("-DDIALOG_EXAMPLE_PATH={}", self.examples_dir.display()))
            .arg("-S")
            .arg(".")
            .arg("-B")
            .arg(&project.builddir)
            .current_dir(&project.abs_path)
            .output()
            .await
            .context("spawning cmake")?;
        debug!(
            "cmake configure: {}",
            String::from_utf8_lossy(&configure.stdout)
        );
        if !configure.status.success() {
            error!(
                "cmake configure failed for {}: {}",
                project.title,
                String::from_utf8_lossy(&configure.stderr)
            );
            return Ok(BuildOutcome::Failed(configure.status.code().unwrap_or(-1)));
        }

        let make = Command::new("make")
            .arg(format!("-j{}", self.jobs))
            .current_dir(&build_dir)
            .output()
            .await
            .context("spawning make")?;
        debug!("make: {}", String::from_utf8_lossy(&make.stdout));
        if !make.status.success() {
            error!(
                "build of {} failed: {}",
                project.title,
                String::from_utf8_lossy(&make.stderr)
            );
            return Ok(BuildOutcome::Failed(make.status.code().unwrap_or(-1)));
        }
        Ok(BuildOutcome::Built)
    }

    async fn check(&self, project: &mut Project, target: &Target) -> Result<()> {
        if project.is_excluded(NAME) {
            // never built, so it counts against every target
            let bin = Self::bin_path(project, target);
            project.add_build_status(NAME, target, false, bin, None);
            return Ok(());
        }
        let Some(cmakelists) = project.cmakelists_file.clone() else {
            return Ok(());
        };
        let contents = tokio::fs::read_to_string(&cmakelists)
            .await
            .with_context(|| format!("reading {}", cmakelists.display()))?;
        let marker = format!("set(BUILD_FOR_{} TRUE)", target.acronym);
        if !contents.contains(&marker) {
            // target not enabled; its status stays unknown
            debug!("{} does not build for {}", project.title, target.name);
            return Ok(());
        }

        let bin = Self::bin_path(project, target);
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

/// Locates a toolchain binary on PATH, the way the CI images expose the
/// cross toolchain.
async fn resolve_tool(name: &str) -> Result<String> {
    let output = Command::new("which")
        .arg(name)
        .output()
        .await
        .context("spawning which")?;
    if !output.status.success() {
        bail!("{name} not found on PATH");
    }
    Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
}
