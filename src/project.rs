use anyhow::{anyhow, bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::process::Command;
use tracing::info;
use walkdir::WalkDir;

use crate::core::Target;
use crate::sizes::SizeReport;

/// At most one status entry per (build system, target name).
pub type LedgerKey = (String, String);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BuildRecord {
    pub buildsystem: String,
    pub target: Target,
    pub passed: bool,
    #[serde(rename = "binPath")]
    pub bin_path: PathBuf,
    #[serde(flatten)]
    pub sizes: Option<SizeReport>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildStatusClass {
    Passed,
    Failed,
    /// No ledger entry: never checked, or the target is not enabled for
    /// this project.
    Unknown,
}

/// The serialized form of a project, as written to `projectData.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectRecord {
    #[serde(rename = "absPath")]
    pub abs_path: PathBuf,
    pub path: PathBuf,
    pub title: String,
    pub group: String,
    #[serde(rename = "excludeBuilds")]
    pub exclude_builds: Vec<String>,
    #[serde(rename = "patchFile")]
    pub patch_file: Option<PathBuf>,
    #[serde(rename = "uvprojxFile")]
    pub uvprojx_file: PathBuf,
    #[serde(rename = "cmakelistsFile")]
    pub cmakelists_file: Option<PathBuf>,
    #[serde(rename = "readmePath")]
    pub readme_path: Option<PathBuf>,
    pub builddir: PathBuf,
    #[serde(rename = "buildStatus", default)]
    pub build_status: Vec<BuildRecord>,
}

/// One example firmware build unit. Path fields are stable identifiers;
/// `from_record` is the exact inverse of `to_record`.
#[derive(Debug, Clone, PartialEq)]
pub struct Project {
    pub abs_path: PathBuf,
    pub path: PathBuf,
    pub title: String,
    pub group: String,
    pub exclude_builds: Vec<String>,
    pub patch_file: Option<PathBuf>,
    pub uvprojx_file: PathBuf,
    pub cmakelists_file: Option<PathBuf>,
    pub readme_path: Option<PathBuf>,
    pub builddir: PathBuf,
    ledger: BTreeMap<LedgerKey, BuildRecord>,
}

impl Project {
    /// Builds a project from a discovered `.uvprojx` path. The project root
    /// is the grandparent of the project file
    /// (`<group>/<title>/Keil_5/<title>.uvprojx`); both arguments must be
    /// absolute and the file must live under `examples_root`.
    pub fn from_discovered_path(uvprojx: &Path, examples_root: &Path) -> Result<Self> {
        let abs_path = uvprojx
            .parent()
            .and_then(Path::parent)
            .ok_or_else(|| anyhow!("project file {} has no project dir", uvprojx.display()))?
            .to_path_buf();
        let rel_file = uvprojx.strip_prefix(examples_root).with_context(|| {
            format!(
                "project file {} is not under {}",
                uvprojx.display(),
                examples_root.display()
            )
        })?;
        let path = abs_path
            .strip_prefix(examples_root)
            .unwrap_or(&abs_path)
            .to_path_buf();
        let title = abs_path
            .file_name()
            .ok_or_else(|| anyhow!("project dir {} has no name", abs_path.display()))?
            .to_string_lossy()
            .into_owned();
        let group = rel_file
            .components()
            .next()
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .unwrap_or_default();

        let patch = abs_path.join("patch/SDK6patch.diff");
        let patch_file = patch.is_file().then_some(patch);

        Ok(Self {
            cmakelists_file: find_first_named(&abs_path, "CMakeLists.txt"),
            readme_path: find_first_named(&abs_path, "Readme.md"),
            abs_path,
            path,
            title,
            group,
            exclude_builds: Vec::new(),
            patch_file,
            uvprojx_file: uvprojx.to_path_buf(),
            builddir: PathBuf::from("build"),
            ledger: BTreeMap::new(),
        })
    }

    /// Reconstructs a project from its serialized record; with a `base`,
    /// stored paths are resolved against it.
    pub fn from_record(record: ProjectRecord, base: Option<&Path>) -> Self {
        let ledger = record
            .build_status
            .into_iter()
            .map(|r| ((r.buildsystem.clone(), r.target.name.clone()), r))
            .collect();
        Self {
            abs_path: resolve(base, record.abs_path),
            path: record.path,
            title: record.title,
            group: record.group,
            exclude_builds: record.exclude_builds,
            patch_file: record.patch_file.map(|p| resolve(base, p)),
            uvprojx_file: resolve(base, record.uvprojx_file),
            cmakelists_file: record.cmakelists_file.map(|p| resolve(base, p)),
            readme_path: record.readme_path.map(|p| resolve(base, p)),
            builddir: record.builddir,
            ledger,
        }
    }

    /// Serializes to the wire form. With a `base`, absolute paths are stored
    /// relative to it; a path outside `base` is an error.
    pub fn to_record(&self, base: Option<&Path>) -> Result<ProjectRecord> {
        Ok(ProjectRecord {
            abs_path: relativize(base, &self.abs_path, "project dir")?,
            path: self.path.clone(),
            title: self.title.clone(),
            group: self.group.clone(),
            exclude_builds: self.exclude_builds.clone(),
            patch_file: self
                .patch_file
                .as_deref()
                .map(|p| relativize(base, p, "patch file"))
                .transpose()?,
            uvprojx_file: relativize(base, &self.uvprojx_file, "project file")?,
            cmakelists_file: self
                .cmakelists_file
                .as_deref()
                .map(|p| relativize(base, p, "CMakeLists"))
                .transpose()?,
            readme_path: self
                .readme_path
                .as_deref()
                .map(|p| relativize(base, p, "readme"))
                .transpose()?,
            builddir: self.builddir.clone(),
            build_status: self.ledger.values().cloned().collect(),
        })
    }

    /// uVision writes its batch-build log next to the project file.
    pub fn uvision_log_file(&self) -> PathBuf {
        match self.uvprojx_file.parent() {
            Some(dir) => dir.join(format!("{}_log.txt", self.title)),
            None => PathBuf::from(format!("{}_log.txt", self.title)),
        }
    }

    pub fn is_excluded(&self, buildsystem: &str) -> bool {
        self.exclude_builds.iter().any(|b| b == buildsystem)
    }

    /// Upsert: a later result for the same (build system, target) pair
    /// replaces the earlier one.
    pub fn add_build_status(
        &mut self,
        buildsystem: &str,
        target: &Target,
        passed: bool,
        bin_path: PathBuf,
        sizes: Option<SizeReport>,
    ) {
        self.ledger.insert(
            (buildsystem.to_string(), target.name.clone()),
            BuildRecord {
                buildsystem: buildsystem.to_string(),
                target: target.clone(),
                passed,
                bin_path,
                sizes,
            },
        );
    }

    pub fn build_status(&self, buildsystem: &str, target_name: &str) -> Option<&BuildRecord> {
        self.ledger
            .get(&(buildsystem.to_string(), target_name.to_string()))
    }

    pub fn classify(&self, buildsystem: &str, target: &Target) -> BuildStatusClass {
        match self.build_status(buildsystem, &target.name) {
            Some(record) if record.passed => BuildStatusClass::Passed,
            Some(_) => BuildStatusClass::Failed,
            None => BuildStatusClass::Unknown,
        }
    }

    pub fn ledger(&self) -> impl Iterator<Item = &BuildRecord> {
        self.ledger.values()
    }

    /// Applies the project patch to the SDK checkout. No-op without a patch
    /// file. `git apply` validates the whole patch before touching anything,
    /// so a rejected patch leaves the checkout clean.
    pub async fn apply_patch_to_sdk(&self, sdk_dir: &Path) -> Result<()> {
        let Some(patch) = &self.patch_file else {
            return Ok(());
        };
        info!("applying patch for {}", self.title);
        git_apply(sdk_dir, patch, false).await
    }

    /// Reverses the project patch. Must run after every build attempt for a
    /// patched project, pass or fail, to restore the shared checkout.
    pub async fn revert_patch_to_sdk(&self, sdk_dir: &Path) -> Result<()> {
        let Some(patch) = &self.patch_file else {
            return Ok(());
        };
        info!("removing patch for {}", self.title);
        git_apply(sdk_dir, patch, true).await
    }
}

async fn git_apply(sdk_dir: &Path, patch: &Path, reverse: bool) -> Result<()> {
    let mut cmd = Command::new("git");
    cmd.arg("apply");
    if reverse {
        cmd.arg("--reverse");
    }
    cmd.arg(patch).current_dir(sdk_dir);
    let output = cmd.output().await.context("spawning git apply")?;
    if !output.status.success() {
        bail!(
            "git apply{} {} failed in {}: {}",
            if reverse { " --reverse" } else { "" },
            patch.display(),
            sdk_dir.display(),
            String::from_utf8_lossy(&output.stderr)
        );
    }
    Ok(())
}

/// First file named `name` under `root`, in lexicographic walk order.
fn find_first_named(root: &Path, name: &str) -> Option<PathBuf> {
    WalkDir::new(root)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|e| e.ok())
        .find(|e| e.file_type().is_file() && e.file_name() == name)
        .map(|e| e.into_path())
}

fn resolve(base: Option<&Path>, path: PathBuf) -> PathBuf {
    match base {
        // join() keeps already-absolute paths intact
        Some(base) => base.join(path),
        None => path,
    }
}

fn relativize(base: Option<&Path>, path: &Path, what: &str) -> Result<PathBuf> {
    match base {
        Some(base) => Ok(path
            .strip_prefix(base)
            .with_context(|| {
                format!("{what} {} is not under {}", path.display(), base.display())
            })?
            .to_path_buf()),
        None => Ok(path.to_path_buf()),
    }
}
