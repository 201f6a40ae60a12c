use crate::config::RunnerConfig;
use crate::core::{BuildOutcome, ConfigError, SkipReason, Target};
use crate::project::Project;
use crate::sizes::{self, SizeReport};
use crate::BuildAdapter;
use anyhow::{Context, Result};
use async_trait::async_trait;
use std::ffi::OsString;
use std::path::PathBuf;
use tokio::process::Command;
use tracing::{debug, error, info, warn};

pub const NAME: &str = "Keil/armcomp6";

/// Suffix of the per-target success line in a uVision batch log; the full
/// marker is the target acronym followed by this, e.g.
/// `531.axf" - 0 Error(s),`.
const PASS_MARKER: &str = ".axf\" - 0 Error(s),";
const PROGRAM_SIZE: &str = "Program Size:";

/// Drives uVision in batch mode. UV4 builds every declared target in one
/// invocation and leaves a log next to the project file; `check` reads
/// per-target results back out of that log.
pub struct Keil {
    uv4_path: PathBuf,
}

impl Keil {
    pub fn new(cfg: &RunnerConfig) -> Result<Self, ConfigError> {
        // the SDK checkout is not passed to UV4 (the project files reference
        // it), but a run without one is misconfigured
        if cfg.sdk_dir.is_none() {
            return Err(ConfigError::MissingAdapterParameter {
                kind: NAME,
                missing: "an SDK directory (--sdkdir)",
            });
        }
        Ok(Self {
            uv4_path: cfg.uv4_path.clone(),
        })
    }

    fn bin_path(project: &Project, target: &Target) -> PathBuf {
        let keil_dir = project
            .uvprojx_file
            .parent()
            .and_then(|d| d.file_name())
            .map(PathBuf::from)
            .unwrap_or_default();
        keil_dir
            .join(format!("out_{}", target.name))
            .join("Objects")
            .join(format!("{}_{}.bin", project.title, target.acronym))
    }
}

#[async_trait]
impl BuildAdapter for Keil {
    fn name(&self) -> &'static str {
        NAME
    }

    async fn build(&self, project: &Project) -> Result<BuildOutcome> {
        if project.is_excluded(NAME) {
            warn!("not building {}: excluded for {NAME}", project.title);
            return Ok(BuildOutcome::Skipped(SkipReason::Excluded));
        }
        info!("building {} with {NAME}", project.title);

        let log_file = project.uvision_log_file();
        let log_name = log_file
            .file_name()
            .map(OsString::from)
            .unwrap_or_else(|| OsString::from("uv4_log.txt"));
        let keil_dir = project.uvprojx_file.parent().unwrap_or(&project.abs_path);
        let output = Command::new(&self.uv4_path)
            .arg("-b")
            .arg(&project.uvprojx_file)
            .arg("-z")
            .arg("-o")
            .arg(&log_name)
            .current_dir(keil_dir)
            .output()
            .await
            .with_context(|| format!("spawning {}", self.uv4_path.display()))?;

        let code = output.status.code().unwrap_or(-1);
        let outcome = classify_uv4_exit(code);
        // the batch log is the only diagnostics uVision leaves behind
        match tokio::fs::read_to_string(&log_file).await {
            Ok(log) => match outcome {
                BuildOutcome::Built => debug!("uVision log for {}:\n{log}", project.title),
                BuildOutcome::BuiltWithWarnings => {
                    warn!("uVision warnings for {}:\n{log}", project.title)
                }
                _ => error!(
                    "uVision build of {} failed (exit {code}):\n{log}",
                    project.title
                ),
            },
            Err(err) => warn!("cannot read uVision log {}: {err}", log_file.display()),
        }
        Ok(outcome)
    }

    async fn check(&self, project: &mut Project, target: &Target) -> Result<()> {
        if project.is_excluded(NAME) {
            let bin = Self::bin_path(project, target);
            project.add_build_status(NAME, target, false, bin, None);
            return Ok(());
        }
        let project_xml = tokio::fs::read_to_string(&project.uvprojx_file)
            .await
            .with_context(|| format!("reading {}", project.uvprojx_file.display()))?;
        let declared = format!("<TargetName>{}</TargetName>", target.name);
        if !project_xml.contains(&declared) {
            // the project file does not carry this target; status stays
            // unknown
            debug!("{} has no uVision target {}", project.title, target.name);
            return Ok(());
        }

        // a missing log (never built) reads as an empty one: no pass marker
        let log = tokio::fs::read_to_string(project.uvision_log_file())
            .await
            .unwrap_or_default();
        let marker = format!("{}{PASS_MARKER}", target.acronym);
        let (passed, report) = scan_log(&log, &marker);
        let bin = Self::bin_path(project, target);
        project.add_build_status(NAME, target, passed, bin, report);
        Ok(())
    }
}

/// uVision exit codes: 0 is a clean build, 1 a build with warnings, 2-20
/// graded build errors. Anything undocumented is treated as a failure too.
pub fn classify_uv4_exit(code: i32) -> BuildOutcome {
    match code {
        0 => BuildOutcome::Built,
        1 => BuildOutcome::BuiltWithWarnings,
        other => BuildOutcome::Failed(other),
    }
}

/// Scans a uVision batch log for one target's pass marker. uVision prints a
/// `Program Size:` line per built image before the closing error tally, so
/// the sizes belonging to the marker are the nearest such line above it.
fn scan_log(log: &str, marker: &str) -> (bool, Option<SizeReport>) {
    let mut last_sizes = None;
    for line in log.lines() {
        if line.trim_start().starts_with(PROGRAM_SIZE) {
            last_sizes = sizes::parse_armlink_size(line).ok();
        }
        if line.contains(marker) {
            return (true, last_sizes);
        }
    }
    (false, None)
}
