use crate::publish::DEFAULT_BUCKET;
use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "sdk6-runner")]
#[command(about = "Build and release automation for the BLE SDK6 example projects")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Build every project, check artifacts against the target matrix,
    /// report, and persist the results.
    Run(RunArgs),
    /// Print the per-target pass/fail report from a persisted data file.
    Report(ReportArgs),
    /// Assemble the artifacts tree from a data file and sync it to cloud
    /// storage.
    Publish(PublishArgs),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum BuildSystemKind {
    #[value(name = "CMake/gcc10")]
    CmakeGcc,
    #[value(name = "Keil/armcomp6")]
    KeilArmcc,
    #[value(name = "clang")]
    Clang,
}

impl BuildSystemKind {
    /// The build-system identifier recorded in ledger entries.
    pub fn id(self) -> &'static str {
        match self {
            Self::CmakeGcc => "CMake/gcc10",
            Self::KeilArmcc => "Keil/armcomp6",
            Self::Clang => "clang",
        }
    }
}

#[derive(Args)]
pub struct RunArgs {
    /// The directory to search for project files.
    #[arg(short = 'p', long = "projdir", default_value = ".")]
    pub projdir: PathBuf,

    /// Root of the examples tree; stored paths are made relative to it.
    /// Defaults to the project directory.
    #[arg(long = "examples-dir")]
    pub examples_dir: Option<PathBuf>,

    /// The SDK checkout to build against.
    #[arg(short = 's', long = "sdkdir")]
    pub sdkdir: Option<PathBuf>,

    /// Projects to exclude from the build: a file path (its contents are
    /// used) or a literal string of project titles.
    #[arg(short = 'x', long = "exclude", default_value = "")]
    pub exclude: String,

    /// The projects data file; the run's output, and with --append also its
    /// input.
    #[arg(short = 'f', long = "datafile", default_value = "projectData.json")]
    pub datafile: PathBuf,

    /// The targets definition file.
    #[arg(short = 't', long = "targets", default_value = "targets.json")]
    pub targets: PathBuf,

    /// The build system to drive.
    #[arg(short = 'b', long = "buildsystem", value_enum, default_value = "CMake/gcc10")]
    pub buildsystem: BuildSystemKind,

    /// Resume from the data file instead of scanning for projects.
    #[arg(long)]
    pub append: bool,

    /// The uVision command-line executable.
    #[arg(long = "uv4", default_value = "C:/Keil_v5/UV4/UV4.exe")]
    pub uv4: PathBuf,

    /// Parallel jobs for the compile step of a single project.
    #[arg(long, default_value_t = 7)]
    pub jobs: u32,

    /// Verbose logging.
    #[arg(short, long)]
    pub verbose: bool,
}

#[derive(Args)]
pub struct ReportArgs {
    #[arg(short = 'f', long = "datafile", default_value = "projectData.json")]
    pub datafile: PathBuf,

    #[arg(short = 't', long = "targets", default_value = "targets.json")]
    pub targets: PathBuf,

    #[arg(short = 'b', long = "buildsystem", value_enum, default_value = "CMake/gcc10")]
    pub buildsystem: BuildSystemKind,

    /// Root the data file's relative paths are resolved against.
    #[arg(long = "examples-dir", default_value = ".")]
    pub examples_dir: PathBuf,

    /// Verbose logging.
    #[arg(short, long)]
    pub verbose: bool,
}

#[derive(Args)]
pub struct PublishArgs {
    #[arg(short = 'f', long = "datafile", default_value = "projectData.json")]
    pub datafile: PathBuf,

    #[arg(short = 't', long = "targets", default_value = "targets.json")]
    pub targets: PathBuf,

    /// Directory where the artifacts tree is assembled.
    #[arg(short = 'a', long = "artifacts-dir", default_value = "artifacts")]
    pub artifacts_dir: PathBuf,

    /// Cloud storage bucket the artifacts tree is synced into.
    #[arg(long, default_value = DEFAULT_BUCKET)]
    pub bucket: String,

    /// Assemble the tree but skip the cloud sync.
    #[arg(long = "no-sync")]
    pub no_sync: bool,

    /// Root the data file's relative paths are resolved against.
    #[arg(long = "examples-dir", default_value = ".")]
    pub examples_dir: PathBuf,

    /// Verbose logging.
    #[arg(short, long)]
    pub verbose: bool,
}
