use std::time::Duration;

use opkg_git::{Error, GitFetcher};
use opkg_test_utils::git::{commit_files, package_repo, tag_head};
use pretty_assertions::assert_eq;
use tempfile::TempDir;

fn fetcher() -> GitFetcher {
    GitFetcher::new().with_retry_budget(Duration::from_millis(10))
}

fn url(path: &std::path::Path) -> String {
    path.to_string_lossy().into_owned()
}

#[test]
fn test_fetch_default_branch() {
    let temp = TempDir::new().unwrap();
    let remote = temp.path().join("remote");
    let repo = package_repo(&remote, &[("openpackage.yml", "name: rules\n")]);
    let head = repo.head().unwrap().peel_to_commit().unwrap().id().to_string();

    let dest = temp.path().join("checkout");
    let checkout = fetcher().fetch(&url(&remote), None, None, &dest).unwrap();

    assert_eq!(checkout.commit, head);
    assert_eq!(checkout.repo_path, dest);
    assert_eq!(checkout.content_root, dest);
    assert!(dest.join("openpackage.yml").exists());
}

#[test]
fn test_fetch_tag_and_subpath() {
    let temp = TempDir::new().unwrap();
    let remote = temp.path().join("remote");
    let repo = package_repo(
        &remote,
        &[("packages/core/openpackage.yml", "name: core\nversion: \"1.0.0\"\n")],
    );
    tag_head(&repo, "v1.0.0");
    let tagged = repo.head().unwrap().peel_to_commit().unwrap().id().to_string();
    commit_files(
        &repo,
        &[("packages/core/openpackage.yml", "name: core\nversion: \"2.0.0\"\n")],
        "Bump to 2.0.0",
    );

    let dest = temp.path().join("checkout");
    let checkout = fetcher()
        .fetch(&url(&remote), Some("v1.0.0"), Some("packages/core"), &dest)
        .unwrap();

    assert_eq!(checkout.commit, tagged);
    assert_eq!(checkout.content_root, dest.join("packages/core"));
    let manifest = std::fs::read_to_string(checkout.content_root.join("openpackage.yml")).unwrap();
    assert!(manifest.contains("1.0.0"));
}

#[test]
fn test_refetch_picks_up_new_commits() {
    let temp = TempDir::new().unwrap();
    let remote = temp.path().join("remote");
    let repo = package_repo(&remote, &[("openpackage.yml", "name: rules\n")]);
    let dest = temp.path().join("checkout");

    let first = fetcher().fetch(&url(&remote), Some("main"), None, &dest).unwrap();
    let second_sha = commit_files(&repo, &[("README.md", "# rules\n")], "Add readme");
    let second = fetcher().fetch(&url(&remote), Some("main"), None, &dest).unwrap();

    assert_ne!(first.commit, second.commit);
    assert_eq!(second.commit, second_sha);
    assert!(dest.join("README.md").exists());
}

#[test]
fn test_unknown_ref_is_reported() {
    let temp = TempDir::new().unwrap();
    let remote = temp.path().join("remote");
    package_repo(&remote, &[("openpackage.yml", "name: rules\n")]);

    let err = fetcher()
        .fetch(&url(&remote), Some("no-such-ref"), None, &temp.path().join("checkout"))
        .unwrap_err();
    assert!(matches!(err, Error::RefNotFound { ref reference, .. } if reference == "no-such-ref"));
}

#[test]
fn test_missing_subpath_is_reported() {
    let temp = TempDir::new().unwrap();
    let remote = temp.path().join("remote");
    package_repo(&remote, &[("openpackage.yml", "name: rules\n")]);

    let err = fetcher()
        .fetch(&url(&remote), None, Some("packages/absent"), &temp.path().join("checkout"))
        .unwrap_err();
    assert!(matches!(err, Error::SubpathNotFound { .. }));
}

#[test]
fn test_missing_remote_fails() {
    let temp = TempDir::new().unwrap();
    let result = fetcher().fetch(
        &url(&temp.path().join("does-not-exist")),
        None,
        None,
        &temp.path().join("checkout"),
    );
    assert!(result.is_err());
}
