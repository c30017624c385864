//! End-to-end install flow
//!
//! Exercises config loading -> resolution -> installation -> installed index
//! persistence across repeated runs against the same workspace.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use opkg_fs::NormalizedPath;
use opkg_manifest::{InstalledIndex, YamlManifestReader};
use opkg_resolve::{
    Executor, ExecutionResult, InstallError, InstallReport, InstallationContext, Installer,
    LoaderCaches, ResolverConfig, SkipReason,
};
use opkg_test_utils::{ManifestBuilder, TestWorkspace};
use pretty_assertions::assert_eq;
use semver::Version;

/// Copies the top-level files of each package into
/// `<workspace>/.ai/<platform>/<package>/`.
struct CopyInstaller {
    workspace: PathBuf,
    calls: Mutex<Vec<String>>,
}

impl CopyInstaller {
    fn new(workspace: &Path) -> Self {
        Self {
            workspace: workspace.to_path_buf(),
            calls: Mutex::new(Vec::new()),
        }
    }

    fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl Installer for CopyInstaller {
    async fn install(&self, context: &InstallationContext) -> Result<InstallReport, InstallError> {
        self.calls.lock().unwrap().push(context.package_name.clone());

        let mut report = InstallReport::default();
        for platform in &context.platforms {
            let target = self
                .workspace
                .join(".ai")
                .join(platform)
                .join(&context.package_name);
            for entry in fs::read_dir(&context.content_root)? {
                let entry = entry?;
                if !entry.file_type()?.is_file() {
                    continue;
                }
                let dest = target.join(entry.file_name());
                let existed = dest.exists();
                let content = fs::read_to_string(entry.path())?;
                opkg_fs::io::write_text(&NormalizedPath::new(&dest), &content)?;
                if existed {
                    report.updated.push(dest);
                } else {
                    report.installed.push(dest);
                }
            }
        }
        Ok(report)
    }
}

fn write_config(ws: &TestWorkspace) {
    let mut config = ResolverConfig::default();
    config.registry.path = Some(ws.registry_dir());
    config.cache.path = Some(ws.cache_dir());
    config.install.platforms = vec!["cursor".into(), "claude".into()];
    config.install.fail_fast = true;
    config.save(&ws.root()).unwrap();
}

async fn run(ws: &TestWorkspace, installer: Arc<CopyInstaller>) -> ExecutionResult {
    let config = ResolverConfig::load(&ws.root()).unwrap();
    let executor = Executor::new(
        config.source_loaders(),
        Arc::new(YamlManifestReader),
        LoaderCaches::new(),
        installer,
    );
    let mut options = config.into_executor_options(&ws.root());
    options.planner.installed = InstalledIndex::load(&ws.root()).unwrap();

    let result = executor.execute(options, None, None).await;
    result.installed_index.save(&ws.root()).unwrap();
    result
}

fn setup() -> TestWorkspace {
    let ws = TestWorkspace::new();
    ws.registry_package(ManifestBuilder::new("core").version("1.0.0"));
    ws.registry_package(
        ManifestBuilder::new("rules")
            .version("2.1.0")
            .registry_dep("core", "^1.0.0"),
    );
    ws.path_package(
        "packages/team",
        ManifestBuilder::new("team").registry_dep("rules", "^2.0.0"),
    );
    ws.root_manifest(ManifestBuilder::new("app").path_dep("team", "./packages/team"));
    write_config(&ws);
    ws
}

#[tokio::test]
async fn test_first_install_writes_files_and_index() {
    let ws = setup();
    let installer = Arc::new(CopyInstaller::new(&ws.root()));

    let result = run(&ws, installer.clone()).await;

    assert!(result.success, "{:?}", result.error);
    assert_eq!(installer.calls(), vec!["core", "rules", "team"]);
    ws.assert_file_exists(".ai/cursor/core/README.md");
    ws.assert_file_exists(".ai/claude/rules/openpackage.yml");
    ws.assert_file_exists(".ai/cursor/team/openpackage.yml");
    ws.assert_file_exists(".openpackage/openpackage.index.yml");

    let plan = result.plan.as_ref().unwrap();
    assert_eq!(plan.estimated_operations, Some(6));

    let index = InstalledIndex::load(&ws.root()).unwrap();
    assert!(index.is_installed("core", Some(&Version::new(1, 0, 0))));
    assert!(index.is_installed("rules", Some(&Version::new(2, 1, 0))));
    assert_eq!(
        index.get("core").unwrap().platforms,
        vec!["cursor".to_string(), "claude".to_string()]
    );
}

#[tokio::test]
async fn test_second_run_skips_installed_packages() {
    let ws = setup();
    run(&ws, Arc::new(CopyInstaller::new(&ws.root()))).await;

    let installer = Arc::new(CopyInstaller::new(&ws.root()));
    let result = run(&ws, installer.clone()).await;

    assert!(result.success);
    // Unversioned path packages match any installed entry.
    assert!(installer.calls().is_empty());
    let skipped = &result.plan.as_ref().unwrap().skipped;
    assert_eq!(skipped.len(), 3);
    assert!(
        skipped
            .iter()
            .all(|s| s.reason == SkipReason::AlreadyInstalled)
    );
    assert_eq!(result.summary.skipped, 3);
}

#[tokio::test]
async fn test_new_registry_version_is_picked_up() {
    let ws = setup();
    run(&ws, Arc::new(CopyInstaller::new(&ws.root()))).await;

    ws.registry_package(ManifestBuilder::new("core").version("1.4.0"));
    let installer = Arc::new(CopyInstaller::new(&ws.root()));
    let result = run(&ws, installer.clone()).await;

    assert!(result.success);
    assert_eq!(installer.calls(), vec!["core"]);
    let report = result.results[0].report.as_ref().unwrap();
    assert!(!report.updated.is_empty());

    let index = InstalledIndex::load(&ws.root()).unwrap();
    assert!(index.is_installed("core", Some(&Version::new(1, 4, 0))));
}

#[tokio::test]
async fn test_config_drives_dev_dependencies_and_dry_run() {
    let ws = setup();
    ws.registry_package(ManifestBuilder::new("lint").version("0.1.0"));
    ws.root_manifest(
        ManifestBuilder::new("app")
            .path_dep("team", "./packages/team")
            .dev_registry_dep("lint", "0.1.0"),
    );
    let mut config = ResolverConfig::load(&ws.root()).unwrap();
    config.resolve.include_dev = true;
    config.install.dry_run = true;
    config.save(&ws.root()).unwrap();

    let installer = Arc::new(CopyInstaller::new(&ws.root()));
    let result = run(&ws, installer.clone()).await;

    assert!(result.success);
    assert!(installer.calls().is_empty());
    let plan = result.plan.as_ref().unwrap();
    let names: Vec<_> = plan
        .contexts
        .iter()
        .map(|c| c.package_name.as_str())
        .collect();
    assert_eq!(names, vec!["core", "rules", "team", "lint"]);
    assert!(plan.contexts[3].dev);
    assert!(!ws.root().join(".ai").exists());
}

#[tokio::test]
async fn test_plan_report_serializes_to_json() {
    let ws = setup();
    let mut config = ResolverConfig::load(&ws.root()).unwrap();
    config.install.dry_run = true;
    config.save(&ws.root()).unwrap();

    let result = run(&ws, Arc::new(CopyInstaller::new(&ws.root()))).await;
    let report = serde_json::json!({
        "summary": result.summary,
        "plan": result.plan,
        "warnings": result.warnings,
    });

    assert_eq!(report["summary"]["total"], 3);
    assert_eq!(report["plan"]["contexts"][1]["package_name"], "rules");
    assert_eq!(report["plan"]["contexts"][1]["version"], "2.1.0");
    assert_eq!(
        report["plan"]["contexts"][1]["source"]["location"]["type"],
        "registry"
    );
    assert_eq!(report["warnings"].as_array().unwrap().len(), 0);
}
