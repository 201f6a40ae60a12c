use async_trait::async_trait;
use sdk6_runner::batch;
use sdk6_runner::cli::{BuildSystemKind, RunArgs};
use sdk6_runner::config::load_exclude_text;
use sdk6_runner::core::{BuildOutcome, ConfigError, Target};
use sdk6_runner::project::Project;
use sdk6_runner::registry::ProjectRegistry;
use sdk6_runner::BuildAdapter;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

fn da14531() -> Target {
    Target {
        name: "DA14531".to_string(),
        acronym: "531".to_string(),
    }
}

fn create_test_example_project(root: &Path, group: &str, title: &str, with_cmake: bool) {
    let project_dir = root.join(group).join(title);
    let keil_dir = project_dir.join("Keil_5");
    fs::create_dir_all(&keil_dir).unwrap();
    fs::write(
        keil_dir.join(format!("{title}.uvprojx")),
        "<Project><Targets><Target><TargetName>DA14531</TargetName></Target></Targets></Project>",
    )
    .unwrap();
    if with_cmake {
        fs::write(
            project_dir.join("CMakeLists.txt"),
            "cmake_minimum_required(VERSION 3.10)\nset(BUILD_FOR_531 TRUE)\n",
        )
        .unwrap();
    }
}

fn write_targets_file(path: &Path) {
    fs::write(
        path,
        r#"[{"name": "DA14531", "acronym": "531"}, {"name": "DA14585", "acronym": "585"}]"#,
    )
    .unwrap();
}

fn run_args(root: &Path) -> RunArgs {
    fs::create_dir_all(root.join("sdk")).unwrap();
    let targets = root.join("targets.json");
    write_targets_file(&targets);
    RunArgs {
        projdir: root.to_path_buf(),
        examples_dir: None,
        sdkdir: Some(root.join("sdk")),
        exclude: String::new(),
        datafile: root.join("projectData.json"),
        targets,
        buildsystem: BuildSystemKind::CmakeGcc,
        append: false,
        uv4: PathBuf::from("UV4.exe"),
        jobs: 2,
        verbose: false,
    }
}

#[tokio::test]
async fn test_run_counts_excluded_checks_and_persists() {
    let temp = TempDir::new().unwrap();
    let root = temp.path().canonicalize().unwrap();
    // alpha is buildable but excluded; keil_only has no CMake description
    create_test_example_project(&root, "features", "alpha", true);
    create_test_example_project(&root, "features", "keil_only", false);

    let mut args = run_args(&root);
    args.exclude = "alpha".to_string();

    let failed = batch::run(&args).await.unwrap();
    // the excluded project fails its check for both targets
    assert_eq!(failed, 2);

    let registry = ProjectRegistry::from_data_file(&args.datafile, Some(&root))
        .await
        .unwrap();
    assert_eq!(registry.len(), 2);

    let alpha = registry.iter().find(|p| p.title == "alpha").unwrap();
    assert!(alpha.is_excluded("CMake/gcc10"));
    assert!(!alpha.build_status("CMake/gcc10", "DA14531").unwrap().passed);
    assert!(!alpha.build_status("CMake/gcc10", "DA14585").unwrap().passed);

    // never checked: no CMakeLists means no ledger entries
    let keil_only = registry.iter().find(|p| p.title == "keil_only").unwrap();
    assert!(keil_only.build_status("CMake/gcc10", "DA14531").is_none());
}

#[tokio::test]
async fn test_append_requires_existing_data_file() {
    let temp = TempDir::new().unwrap();
    let root = temp.path().canonicalize().unwrap();
    create_test_example_project(&root, "features", "alpha", true);

    let mut args = run_args(&root);
    args.append = true;

    let err = batch::run(&args).await.unwrap_err();
    assert!(matches!(
        err.downcast_ref::<ConfigError>(),
        Some(ConfigError::MissingDataFile(_))
    ));
}

#[tokio::test]
async fn test_append_run_resumes_and_upserts() {
    let temp = TempDir::new().unwrap();
    let root = temp.path().canonicalize().unwrap();
    create_test_example_project(&root, "features", "alpha", true);

    let mut args = run_args(&root);
    args.exclude = "alpha".to_string();

    let first = batch::run(&args).await.unwrap();
    assert_eq!(first, 2);

    // resume from the data file; results replace, never accumulate
    args.append = true;
    let second = batch::run(&args).await.unwrap();
    assert_eq!(second, 2);

    let registry = ProjectRegistry::from_data_file(&args.datafile, Some(&root))
        .await
        .unwrap();
    let alpha = registry.iter().find(|p| p.title == "alpha").unwrap();
    assert_eq!(alpha.ledger().count(), 2);
    assert_eq!(alpha.exclude_builds, vec!["CMake/gcc10".to_string()]);
}

#[tokio::test]
async fn test_patch_apply_and_revert_restore_checkout() {
    let temp = TempDir::new().unwrap();
    let root = temp.path().canonicalize().unwrap();
    let sdk = root.join("sdk");
    fs::create_dir_all(&sdk).unwrap();
    fs::write(
        sdk.join("config.h"),
        "#define A 1\n#define FEATURE 0\n#define B 2\n",
    )
    .unwrap();

    let project_dir = root.join("features/patched");
    fs::create_dir_all(project_dir.join("Keil_5")).unwrap();
    fs::write(project_dir.join("Keil_5/patched.uvprojx"), "<Project/>").unwrap();
    fs::create_dir_all(project_dir.join("patch")).unwrap();
    fs::write(
        project_dir.join("patch/SDK6patch.diff"),
        "--- a/config.h\n+++ b/config.h\n@@ -1,3 +1,3 @@\n #define A 1\n-#define FEATURE 0\n+#define FEATURE 1\n #define B 2\n",
    )
    .unwrap();

    let project =
        Project::from_discovered_path(&project_dir.join("Keil_5/patched.uvprojx"), &root).unwrap();
    let before = fs::read(sdk.join("config.h")).unwrap();

    project.apply_patch_to_sdk(&sdk).await.unwrap();
    let patched = fs::read_to_string(sdk.join("config.h")).unwrap();
    assert!(patched.contains("#define FEATURE 1"));

    project.revert_patch_to_sdk(&sdk).await.unwrap();
    assert_eq!(fs::read(sdk.join("config.h")).unwrap(), before);
}

#[tokio::test]
async fn test_rejected_patch_errors_and_leaves_checkout_clean() {
    let temp = TempDir::new().unwrap();
    let root = temp.path().canonicalize().unwrap();
    let sdk = root.join("sdk");
    fs::create_dir_all(&sdk).unwrap();
    fs::write(sdk.join("config.h"), "#define A 1\n").unwrap();

    let project_dir = root.join("features/patched");
    fs::create_dir_all(project_dir.join("Keil_5")).unwrap();
    fs::write(project_dir.join("Keil_5/patched.uvprojx"), "<Project/>").unwrap();
    fs::create_dir_all(project_dir.join("patch")).unwrap();
    // hunk does not match the checkout
    fs::write(
        project_dir.join("patch/SDK6patch.diff"),
        "--- a/config.h\n+++ b/config.h\n@@ -1,1 +1,1 @@\n-#define SOMETHING_ELSE\n+#define FEATURE 1\n",
    )
    .unwrap();

    let project =
        Project::from_discovered_path(&project_dir.join("Keil_5/patched.uvprojx"), &root).unwrap();
    let before = fs::read(sdk.join("config.h")).unwrap();

    assert!(project.apply_patch_to_sdk(&sdk).await.is_err());
    assert_eq!(fs::read(sdk.join("config.h")).unwrap(), before);
}

#[tokio::test]
async fn test_run_reverts_patch_when_build_fails() {
    let temp = TempDir::new().unwrap();
    let root = temp.path().canonicalize().unwrap();

    let project_dir = root.join("features/patched");
    fs::create_dir_all(project_dir.join("Keil_5")).unwrap();
    fs::write(project_dir.join("Keil_5/patched.uvprojx"), "<Project/>").unwrap();
    fs::write(
        project_dir.join("CMakeLists.txt"),
        "cmake_minimum_required(VERSION 3.10)\nset(BUILD_FOR_531 TRUE)\n",
    )
    .unwrap();
    fs::create_dir_all(project_dir.join("patch")).unwrap();
    fs::write(
        project_dir.join("patch/SDK6patch.diff"),
        "--- a/config.h\n+++ b/config.h\n@@ -1,3 +1,3 @@\n #define A 1\n-#define FEATURE 0\n+#define FEATURE 1\n #define B 2\n",
    )
    .unwrap();
    // a file where the build directory belongs: clearing it errors out
    // before any toolchain is spawned
    fs::write(project_dir.join("build"), "in the way").unwrap();

    let args = run_args(&root);
    fs::write(
        root.join("sdk/config.h"),
        "#define A 1\n#define FEATURE 0\n#define B 2\n",
    )
    .unwrap();
    let before = fs::read(root.join("sdk/config.h")).unwrap();

    // a rejected patch would surface as a skip, not an error: failing here
    // means the patch went in and the build itself fell over
    assert!(batch::run(&args).await.is_err());
    assert_eq!(fs::read(root.join("sdk/config.h")).unwrap(), before);
}

#[tokio::test]
async fn test_patchless_project_skips_patch_step() {
    let temp = TempDir::new().unwrap();
    let root = temp.path().canonicalize().unwrap();
    create_test_example_project(&root, "features", "alpha", true);

    let project =
        Project::from_discovered_path(&root.join("features/alpha/Keil_5/alpha.uvprojx"), &root)
            .unwrap();
    assert!(project.patch_file.is_none());

    // no patch, no git invocation: the target directory does not even exist
    project
        .apply_patch_to_sdk(Path::new("/nonexistent/sdk"))
        .await
        .unwrap();
    project
        .revert_patch_to_sdk(Path::new("/nonexistent/sdk"))
        .await
        .unwrap();
}

struct FlakyAdapter;

#[async_trait]
impl BuildAdapter for FlakyAdapter {
    fn name(&self) -> &'static str {
        "CMake/gcc10"
    }

    async fn build(&self, project: &Project) -> anyhow::Result<BuildOutcome> {
        if project.title == "alpha" {
            Ok(BuildOutcome::Built)
        } else {
            Ok(BuildOutcome::Failed(2))
        }
    }

    async fn check(&self, project: &mut Project, target: &Target) -> anyhow::Result<()> {
        let passed = project.title == "alpha";
        project.add_build_status(
            self.name(),
            target,
            passed,
            PathBuf::from("build/out.bin"),
            None,
        );
        Ok(())
    }
}

#[tokio::test]
async fn test_adapter_results_drive_failed_check_count() {
    let temp = TempDir::new().unwrap();
    let root = temp.path().canonicalize().unwrap();
    create_test_example_project(&root, "features", "alpha", true);
    create_test_example_project(&root, "features", "beta", true);

    let adapter: Box<dyn BuildAdapter> = Box::new(FlakyAdapter);
    let mut registry = ProjectRegistry::discover(&root, &root).unwrap();

    for project in registry.iter() {
        let outcome = adapter.build(project).await.unwrap();
        assert_eq!(outcome.succeeded(), project.title == "alpha");
    }
    for project in registry.iter_mut() {
        adapter.check(project, &da14531()).await.unwrap();
    }

    assert_eq!(registry.failed_checks("CMake/gcc10"), 1);
    let tally = registry.report(&da14531(), "CMake/gcc10");
    assert_eq!(tally.passed, vec!["alpha".to_string()]);
    assert_eq!(tally.failed, vec!["beta".to_string()]);
}

#[tokio::test]
async fn test_exclude_argument_accepts_file_or_literal() {
    let temp = TempDir::new().unwrap();
    let root = temp.path().canonicalize().unwrap();

    let exclude_file = root.join("excludes.txt");
    fs::write(&exclude_file, "alpha\nbeta\n").unwrap();

    let from_file = load_exclude_text(exclude_file.to_str().unwrap())
        .await
        .unwrap();
    assert_eq!(from_file, "alpha\nbeta\n");

    let literal = load_exclude_text("gamma delta").await.unwrap();
    assert_eq!(literal, "gamma delta");

    let empty = load_exclude_text("").await.unwrap();
    assert_eq!(empty, "");
}
