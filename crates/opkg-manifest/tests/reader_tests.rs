use opkg_manifest::{ManifestReader, YamlManifestReader};
use opkg_test_utils::{ManifestBuilder, TestWorkspace};
use pretty_assertions::assert_eq;

#[test]
fn reads_manifest_written_by_fixture_builder() {
    let ws = TestWorkspace::new();
    let path = ws.root_manifest(
        ManifestBuilder::new("app")
            .version("0.1.0")
            .registry_dep("core", "^1.0.0")
            .path_dep("local", "./packages/local")
            .git_dep("remote", "https://example.com/remote.git", Some("v1"), Some("pkg"))
            .dev_registry_dep("lint", ""),
    );

    let manifest = YamlManifestReader.read(&path).unwrap();
    assert_eq!(manifest.name, "app");
    assert_eq!(manifest.version.as_deref(), Some("0.1.0"));

    let names: Vec<_> = manifest.entries(true).map(|(d, _)| d.name.clone()).collect();
    assert_eq!(names, vec!["core", "local", "remote", "lint"]);
    assert!(manifest.dev_dependencies[0].version.is_none());
}
