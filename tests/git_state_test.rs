//! Git adapter tests against real temporary repositories.

use std::path::Path;

use repostat::vcs::{git::GitState, VcsError, VcsState};
use tempfile::TempDir;

/// Minimal repository with `main` checked out.
fn init_repo(dir: &Path) -> git2::Repository {
    std::fs::create_dir_all(dir).expect("create repo dir");
    let repo = git2::Repository::init(dir).expect("init repo");
    repo.set_head("refs/heads/main").expect("set head");
    repo
}

/// Write `name` into the working tree, stage it, and commit.
fn commit_file(repo: &git2::Repository, name: &str, content: &str, message: &str) -> git2::Oid {
    let workdir = repo.workdir().expect("workdir");
    let path = workdir.join(name);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
    std::fs::write(&path, content).unwrap();

    let mut index = repo.index().unwrap();
    index.add_path(Path::new(name)).unwrap();
    index.write().unwrap();
    let tree_id = index.write_tree().unwrap();
    let tree = repo.find_tree(tree_id).unwrap();
    let sig = git2::Signature::now("Test", "test@example.com").unwrap();
    let parent = repo.head().ok().and_then(|h| h.peel_to_commit().ok());
    let parents: Vec<&git2::Commit> = parent.iter().collect();
    repo.commit(Some("HEAD"), &sig, &sig, message, &tree, &parents)
        .unwrap()
}

/// Configure `origin` and point its tracked HEAD at `branch` = `oid`.
fn track_origin(repo: &git2::Repository, branch: &str, oid: git2::Oid) {
    repo.remote("origin", "https://github.com/octo/widgets.git")
        .unwrap();
    repo.reference(&format!("refs/remotes/origin/{branch}"), oid, true, "test")
        .unwrap();
    repo.reference_symbolic(
        "refs/remotes/origin/HEAD",
        &format!("refs/remotes/origin/{branch}"),
        true,
        "test",
    )
    .unwrap();
}

#[tokio::test]
async fn test_status_clean_after_commit() {
    let tmp = TempDir::new().unwrap();
    let repo = init_repo(tmp.path());
    commit_file(&repo, "lib.rs", "pub fn w() {}", "init");

    let git = GitState::new();
    assert_eq!(git.status(tmp.path()).await.unwrap(), "");
}

#[tokio::test]
async fn test_status_reports_modified_and_untracked() {
    let tmp = TempDir::new().unwrap();
    let repo = init_repo(tmp.path());
    commit_file(&repo, "lib.rs", "pub fn w() {}", "init");
    std::fs::write(tmp.path().join("lib.rs"), "pub fn w() { /* changed */ }").unwrap();
    std::fs::write(tmp.path().join("scratch.rs"), "fn s() {}").unwrap();

    let git = GitState::new();
    let status = git.status(tmp.path()).await.unwrap();
    assert!(status.contains("M lib.rs"), "{status:?}");
    assert!(status.contains("? scratch.rs"), "{status:?}");
}

#[tokio::test]
async fn test_status_from_package_subdirectory() {
    let tmp = TempDir::new().unwrap();
    let repo = init_repo(tmp.path());
    commit_file(&repo, "pkg/a/lib.rs", "pub fn a() {}", "add a");

    // Queries run on package directories inside the checkout.
    let git = GitState::new();
    assert_eq!(git.status(&tmp.path().join("pkg/a")).await.unwrap(), "");
    assert_eq!(git.branch(&tmp.path().join("pkg/a")).await.unwrap(), "main");
}

#[tokio::test]
async fn test_branch_and_stash() {
    let tmp = TempDir::new().unwrap();
    let repo = init_repo(tmp.path());
    commit_file(&repo, "lib.rs", "pub fn w() {}", "init");

    let git = GitState::new();
    assert_eq!(git.branch(tmp.path()).await.unwrap(), "main");
    assert_eq!(git.stash(tmp.path()).await.unwrap(), "");
}

#[tokio::test]
async fn test_remote_url_requires_a_remote() {
    let tmp = TempDir::new().unwrap();
    let repo = init_repo(tmp.path());
    let oid = commit_file(&repo, "lib.rs", "pub fn w() {}", "init");

    let git = GitState::new();
    assert!(matches!(
        git.remote_url(tmp.path()).await,
        Err(VcsError::NoRemote)
    ));

    track_origin(&repo, "main", oid);
    assert_eq!(
        git.remote_url(tmp.path()).await.unwrap(),
        "https://github.com/octo/widgets.git"
    );
}

#[tokio::test]
async fn test_remote_branch_no_remote() {
    let tmp = TempDir::new().unwrap();
    let repo = init_repo(tmp.path());
    commit_file(&repo, "lib.rs", "pub fn w() {}", "init");

    let git = GitState::new();
    assert!(matches!(
        git.remote_branch_and_revision(tmp.path()).await,
        Err(VcsError::NoRemote)
    ));
}

#[tokio::test]
async fn test_remote_branch_not_found_without_tracked_head() {
    let tmp = TempDir::new().unwrap();
    let repo = init_repo(tmp.path());
    commit_file(&repo, "lib.rs", "pub fn w() {}", "init");
    repo.remote("origin", "https://github.com/octo/widgets.git")
        .unwrap();

    let git = GitState::new();
    match git.remote_branch_and_revision(tmp.path()).await {
        Err(VcsError::NotFound(missing)) => {
            assert_eq!(missing, "refs/remotes/origin/HEAD");
        }
        other => panic!("expected NotFound, got {other:?}"),
    }
}

#[tokio::test]
async fn test_remote_branch_and_revision_resolves_tracked_head() {
    let tmp = TempDir::new().unwrap();
    let repo = init_repo(tmp.path());
    let oid = commit_file(&repo, "lib.rs", "pub fn w() {}", "init");
    track_origin(&repo, "main", oid);

    let git = GitState::new();
    let (branch, rev) = git.remote_branch_and_revision(tmp.path()).await.unwrap();
    assert_eq!(branch, "main");
    assert_eq!(rev, oid.to_string());

    // A successful lookup seeds the adapter's default-branch cache.
    assert_eq!(git.cached_remote_default_branch().unwrap(), "main");
}

#[tokio::test]
async fn test_cached_default_branch_empty_until_seen() {
    let git = GitState::new();
    assert!(git.cached_remote_default_branch().is_err());
}

#[tokio::test]
async fn test_local_revision_and_containment() {
    let tmp = TempDir::new().unwrap();
    let repo = init_repo(tmp.path());
    let first = commit_file(&repo, "lib.rs", "pub fn w() {}", "init");
    track_origin(&repo, "main", first);
    let second = commit_file(&repo, "lib.rs", "pub fn w2() {}", "more");

    let git = GitState::new();
    assert_eq!(
        git.local_revision(tmp.path(), "main").await.unwrap(),
        second.to_string()
    );

    // Local history contains the remote revision (we are ahead).
    assert!(git
        .contains(tmp.path(), &first.to_string(), "main")
        .await
        .unwrap());
    // The remote does not contain the local tip.
    assert!(!git
        .remote_contains(tmp.path(), &second.to_string(), "main")
        .await
        .unwrap());
    // It does contain its own revision.
    assert!(git
        .remote_contains(tmp.path(), &first.to_string(), "main")
        .await
        .unwrap());
}

#[tokio::test]
async fn test_contains_same_revision_is_true() {
    let tmp = TempDir::new().unwrap();
    let repo = init_repo(tmp.path());
    let oid = commit_file(&repo, "lib.rs", "pub fn w() {}", "init");

    let git = GitState::new();
    assert!(git
        .contains(tmp.path(), &oid.to_string(), "main")
        .await
        .unwrap());
}
