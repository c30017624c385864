//! Git repository fixtures for package sources.
//!
//! Everything here uses `git2` directly so tests do not depend on a `git`
//! binary being installed.

use std::fs;
use std::path::Path;

use git2::{IndexAddOption, Repository, Signature};

/// Initialise a repository at `path` containing `files` and commit them on
/// `main`.
///
/// `files` are `(relative path, content)` pairs; parent directories are
/// created as needed.
///
/// # Panics
/// Panics if any filesystem or git operation fails.
pub fn package_repo(path: &Path, files: &[(&str, &str)]) -> Repository {
    fs::create_dir_all(path)
        .unwrap_or_else(|e| panic!("package_repo: failed to create {}: {e}", path.display()));
    let repo = Repository::init(path).unwrap_or_else(|e| {
        panic!("package_repo: failed to init repository at {}: {e}", path.display())
    });
    repo.set_head("refs/heads/main")
        .unwrap_or_else(|e| panic!("package_repo: failed to point HEAD at main: {e}"));

    write_files(path, files);
    commit_all(&repo, "Initial commit");
    repo
}

/// Write `files` into the working tree and commit them.
///
/// Returns the new commit's hex SHA.
pub fn commit_files(repo: &Repository, files: &[(&str, &str)], message: &str) -> String {
    let workdir = repo
        .workdir()
        .unwrap_or_else(|| panic!("commit_files: repository has no working directory"));
    write_files(workdir, files);
    commit_all(repo, message)
}

/// Create a lightweight tag named `name` at HEAD.
pub fn tag_head(repo: &Repository, name: &str) {
    let head = repo
        .head()
        .and_then(|h| h.peel(git2::ObjectType::Commit))
        .unwrap_or_else(|e| panic!("tag_head: failed to resolve HEAD: {e}"));
    repo.tag_lightweight(name, &head, false)
        .unwrap_or_else(|e| panic!("tag_head: failed to create tag {name}: {e}"));
}

fn write_files(root: &Path, files: &[(&str, &str)]) {
    for (relative, content) in files {
        let target = root.join(relative);
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).unwrap_or_else(|e| {
                panic!("write_files: failed to create {}: {e}", parent.display())
            });
        }
        fs::write(&target, content)
            .unwrap_or_else(|e| panic!("write_files: failed to write {}: {e}", target.display()));
    }
}

fn commit_all(repo: &Repository, message: &str) -> String {
    let mut index = repo
        .index()
        .unwrap_or_else(|e| panic!("commit_all: failed to open index: {e}"));
    index
        .add_all(["*"].iter(), IndexAddOption::DEFAULT, None)
        .unwrap_or_else(|e| panic!("commit_all: failed to stage files: {e}"));
    index
        .write()
        .unwrap_or_else(|e| panic!("commit_all: failed to write index: {e}"));
    let tree_id = index
        .write_tree()
        .unwrap_or_else(|e| panic!("commit_all: failed to write tree: {e}"));
    let tree = repo
        .find_tree(tree_id)
        .unwrap_or_else(|e| panic!("commit_all: failed to find tree: {e}"));

    let signature = Signature::now("Test User", "test@test.com")
        .unwrap_or_else(|e| panic!("commit_all: failed to build signature: {e}"));
    let parent = repo.head().ok().and_then(|h| h.peel_to_commit().ok());
    let parents: Vec<&git2::Commit> = parent.iter().collect();

    repo.commit(Some("HEAD"), &signature, &signature, message, &tree, &parents)
        .unwrap_or_else(|e| panic!("commit_all: failed to commit: {e}"))
        .to_string()
}
