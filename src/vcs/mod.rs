//! Version-control detection and the per-kind state adapter.
//!
//! `detect` walks up from a package directory looking for a checkout marker;
//! `state_for` hands out the shared adapter for kinds we can introspect.
//! Kinds without an adapter are still reported by `detect` so the caller can
//! surface "repository found, cannot introspect it".

pub mod git;
pub mod hg;

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use once_cell::sync::Lazy;

use git::GitState;
use hg::HgState;

/// The version-control system detected for a directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VcsKind {
    Git,
    Mercurial,
    Bazaar,
    Fossil,
}

impl fmt::Display for VcsKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            VcsKind::Git => "Git",
            VcsKind::Mercurial => "Mercurial",
            VcsKind::Bazaar => "Bazaar",
            VcsKind::Fossil => "Fossil",
        };
        f.write_str(name)
    }
}

/// Structured adapter errors.
///
/// `NoRemote` and `NotFound` drive the remote-branch degradation chain;
/// `NotImplemented` triggers the containment heuristic. Anything else is
/// opaque and per-query ignorable.
#[derive(Debug, thiserror::Error)]
pub enum VcsError {
    #[error("no remote configured")]
    NoRemote,
    #[error("ref not found on remote: {0}")]
    NotFound(String),
    #[error("not implemented for this VCS")]
    NotImplemented,
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl From<git2::Error> for VcsError {
    fn from(err: git2::Error) -> Self {
        VcsError::Other(anyhow::Error::new(err))
    }
}

pub type VcsResult<T> = Result<T, VcsError>;

/// Capability set over a checkout of one VCS kind.
///
/// Every query takes the working-copy directory so a single shared adapter
/// instance serves all repositories of its kind. Queries are independent:
/// callers treat each failure as "field unavailable", never as fatal.
#[async_trait]
pub trait VcsState: Send + Sync + fmt::Debug {
    fn kind(&self) -> VcsKind;

    /// Working-copy status text. Empty means clean.
    async fn status(&self, dir: &Path) -> VcsResult<String>;

    /// Currently checked-out branch.
    async fn branch(&self, dir: &Path) -> VcsResult<String>;

    /// Revision of the newest stashed change, or empty when nothing is stashed.
    async fn stash(&self, dir: &Path) -> VcsResult<String>;

    /// Remote URL as configured in the checkout.
    async fn remote_url(&self, dir: &Path) -> VcsResult<String>;

    /// Default branch of the remote and the revision it points at.
    async fn remote_branch_and_revision(&self, dir: &Path) -> VcsResult<(String, String)>;

    /// Local revision of `branch` (the possibly-defaulted remote branch).
    async fn local_revision(&self, dir: &Path, branch: &str) -> VcsResult<String>;

    /// Whether the local history of `branch` contains `revision`.
    async fn contains(&self, dir: &Path, revision: &str, branch: &str) -> VcsResult<bool>;

    /// Whether the remote history of `branch` contains `revision`.
    async fn remote_contains(&self, dir: &Path, revision: &str, branch: &str) -> VcsResult<bool>;

    /// Last remote default branch this adapter successfully resolved.
    fn cached_remote_default_branch(&self) -> VcsResult<String>;

    /// Default branch name to fall back to when the remote cannot answer.
    fn no_remote_default_branch(&self) -> &'static str;
}

/// Detect the VCS kind governing `dir`, walking up no further than `stop`
/// (the source root). Returns the kind and the directory holding the
/// checkout marker.
pub fn detect(dir: &Path, stop: &Path) -> Option<(VcsKind, PathBuf)> {
    let mut cur = dir;
    loop {
        if let Some(kind) = marker_at(cur) {
            return Some((kind, cur.to_path_buf()));
        }
        if cur == stop {
            return None;
        }
        cur = cur.parent()?;
        if !cur.starts_with(stop) {
            return None;
        }
    }
}

fn marker_at(dir: &Path) -> Option<VcsKind> {
    // .git may be a file in worktree/submodule checkouts.
    if dir.join(".git").exists() {
        return Some(VcsKind::Git);
    }
    if dir.join(".hg").is_dir() {
        return Some(VcsKind::Mercurial);
    }
    if dir.join(".bzr").is_dir() {
        return Some(VcsKind::Bazaar);
    }
    if dir.join(".fslckout").is_file() || dir.join("_FOSSIL_").is_file() {
        return Some(VcsKind::Fossil);
    }
    None
}

static GIT: Lazy<Arc<GitState>> = Lazy::new(|| Arc::new(GitState::new()));
static HG: Lazy<Arc<HgState>> = Lazy::new(|| Arc::new(HgState::new()));

/// Shared state adapter for `kind`, or an error naming the unsupported kind.
pub fn state_for(kind: VcsKind) -> anyhow::Result<Arc<dyn VcsState>> {
    match kind {
        VcsKind::Git => Ok(GIT.clone()),
        VcsKind::Mercurial => Ok(HG.clone()),
        other => anyhow::bail!("no state adapter for {other}"),
    }
}
