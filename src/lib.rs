pub mod batch;
pub mod clang;
pub mod cli;
pub mod cmake;
pub mod config;
pub mod core;
pub mod keil;
pub mod project;
pub mod publish;
pub mod registry;
pub mod sizes;

use crate::cli::BuildSystemKind;
use crate::config::RunnerConfig;
use crate::core::{BuildOutcome, Target};
use crate::project::Project;
use anyhow::Result;
use async_trait::async_trait;

/// A strategy that drives one external toolchain and interprets what it
/// leaves behind. `build` runs the toolchain over a whole project; `check`
/// inspects the tree for one target's artifact and records the result in the
/// project ledger, building nothing.
#[async_trait]
pub trait BuildAdapter: Send + Sync {
    /// Identifier recorded in ledger entries, e.g. "CMake/gcc10".
    fn name(&self) -> &'static str;

    async fn build(&self, project: &Project) -> Result<BuildOutcome>;

    async fn check(&self, project: &mut Project, target: &Target) -> Result<()>;
}

pub fn adapter_for(cfg: &RunnerConfig) -> Result<Box<dyn BuildAdapter>> {
    let adapter: Box<dyn BuildAdapter> = match cfg.buildsystem {
        BuildSystemKind::CmakeGcc => Box::new(cmake::Cmake::new(cfg)?),
        BuildSystemKind::KeilArmcc => Box::new(keil::Keil::new(cfg)?),
        BuildSystemKind::Clang => Box::new(clang::Clang::new(cfg)?),
    };
    Ok(adapter)
}
