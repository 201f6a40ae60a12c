use anyhow::{Context, Result};
use std::path::Path;
use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::core::Target;
use crate::project::{BuildStatusClass, Project, ProjectRecord};

/// The ordered set of projects for one run; order is the discovery scan
/// order (or data-file order) and is kept only for reproducibility.
#[derive(Debug, Default, PartialEq)]
pub struct ProjectRegistry {
    projects: Vec<Project>,
}

#[derive(Debug, Default, PartialEq)]
pub struct ReportTally {
    pub passed: Vec<String>,
    pub failed: Vec<String>,
    pub unknown: Vec<String>,
}

impl ProjectRegistry {
    /// Scans `project_dir` recursively for `.uvprojx` files and derives each
    /// project's metadata from its location relative to `examples_root`.
    pub fn discover(project_dir: &Path, examples_root: &Path) -> Result<Self> {
        let mut projects = Vec::new();
        for entry in WalkDir::new(project_dir).sort_by_file_name() {
            let entry =
                entry.with_context(|| format!("scanning {}", project_dir.display()))?;
            if entry.file_type().is_file()
                && entry.path().extension().map_or(false, |e| e == "uvprojx")
            {
                debug!("found project file: {}", entry.path().display());
                projects.push(Project::from_discovered_path(entry.path(), examples_root)?);
            }
        }
        Ok(Self { projects })
    }

    /// Deserializes a previous run's data file (append/resume mode).
    pub async fn from_data_file(path: &Path, base: Option<&Path>) -> Result<Self> {
        let raw = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("reading data file {}", path.display()))?;
        let records: Vec<ProjectRecord> = serde_json::from_str(&raw)
            .with_context(|| format!("parsing data file {}", path.display()))?;
        Ok(Self {
            projects: records
                .into_iter()
                .map(|r| Project::from_record(r, base))
                .collect(),
        })
    }

    pub async fn save(&self, path: &Path, base: Option<&Path>) -> Result<()> {
        let records = self
            .projects
            .iter()
            .map(|p| p.to_record(base))
            .collect::<Result<Vec<_>>>()?;
        let json = serde_json::to_string_pretty(&records)?;
        tokio::fs::write(path, json)
            .await
            .with_context(|| format!("writing data file {}", path.display()))
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Project> {
        self.projects.iter()
    }

    pub fn iter_mut(&mut self) -> std::slice::IterMut<'_, Project> {
        self.projects.iter_mut()
    }

    pub fn len(&self) -> usize {
        self.projects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.projects.is_empty()
    }

    /// Marks every project whose title occurs in `exclude_text` (file
    /// contents or a literal CLI string) as excluded for `buildsystem`.
    pub fn apply_exclusions(&mut self, exclude_text: &str, buildsystem: &str) {
        if exclude_text.is_empty() {
            return;
        }
        for project in &mut self.projects {
            if exclude_text.contains(&project.title) && !project.is_excluded(buildsystem) {
                warn!("excluding {} from {} builds", project.title, buildsystem);
                project.exclude_builds.push(buildsystem.to_string());
            }
        }
    }

    pub fn report(&self, target: &Target, buildsystem: &str) -> ReportTally {
        let mut tally = ReportTally::default();
        for project in &self.projects {
            match project.classify(buildsystem, target) {
                BuildStatusClass::Passed => tally.passed.push(project.title.clone()),
                BuildStatusClass::Failed => tally.failed.push(project.title.clone()),
                BuildStatusClass::Unknown => tally.unknown.push(project.title.clone()),
            }
        }
        tally
    }

    /// Prints the pass/fail tally for one (target, build system) pair.
    /// Projects with no ledger entry for the pair stay out of the counts.
    pub fn print_report(&self, target: &Target, buildsystem: &str) {
        let tally = self.report(target, buildsystem);
        println!("\npassed {}:", target.name);
        for title in &tally.passed {
            println!("{title}");
        }
        println!("\nfailed {}:", target.name);
        for title in &tally.failed {
            println!("{title}");
        }
        println!("\n---------------");
        println!("| PASSED: {} ", tally.passed.len());
        println!("| FAILED: {} ", tally.failed.len());
        println!("---------------");
    }

    /// Failed entries recorded for `buildsystem` across all projects and
    /// targets; drives the process exit status.
    pub fn failed_checks(&self, buildsystem: &str) -> usize {
        self.projects
            .iter()
            .flat_map(|p| p.ledger())
            .filter(|r| r.buildsystem == buildsystem && !r.passed)
            .count()
    }
}
