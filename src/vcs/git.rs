// SPDX-License-Identifier: MIT
//! Git state adapter over libgit2.
//!
//! Local operations only: the remote branch and revision come from the
//! locally tracked `refs/remotes/origin/HEAD`, never from the network.
//! libgit2 is synchronous, so every query opens the repository inside
//! `spawn_blocking`.

use std::path::Path;
use std::sync::{Arc, Mutex};

use anyhow::anyhow;
use async_trait::async_trait;
use git2::{Oid, Repository, StatusOptions};

use super::{VcsError, VcsKind, VcsResult, VcsState};

const REMOTE_NAME: &str = "origin";
const REMOTE_HEAD_REF: &str = "refs/remotes/origin/HEAD";

#[derive(Debug)]
pub struct GitState {
    /// Last remote default branch successfully resolved by any checkout.
    cached_default_branch: Arc<Mutex<Option<String>>>,
}

impl GitState {
    pub fn new() -> Self {
        Self {
            cached_default_branch: Arc::new(Mutex::new(None)),
        }
    }
}

impl Default for GitState {
    fn default() -> Self {
        Self::new()
    }
}

async fn run_blocking<T, F>(f: F) -> VcsResult<T>
where
    F: FnOnce() -> VcsResult<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| VcsError::Other(anyhow!("git query task panicked: {e}")))?
}

#[async_trait]
impl VcsState for GitState {
    fn kind(&self) -> VcsKind {
        VcsKind::Git
    }

    async fn status(&self, dir: &Path) -> VcsResult<String> {
        let dir = dir.to_path_buf();
        run_blocking(move || {
            let repo = Repository::discover(&dir)?;
            let mut opts = StatusOptions::new();
            opts.include_untracked(true)
                .include_ignored(false)
                .recurse_untracked_dirs(true)
                .exclude_submodules(false);
            let statuses = repo.statuses(Some(&mut opts))?;

            let mut out = String::new();
            for entry in statuses.iter() {
                let s = entry.status();
                let code = if s.is_conflicted() {
                    'U'
                } else if s.is_wt_new() {
                    '?'
                } else if s.is_index_new()
                    || s.is_index_modified()
                    || s.is_index_deleted()
                    || s.is_index_renamed()
                {
                    'A'
                } else if s.is_wt_modified() || s.is_wt_renamed() {
                    'M'
                } else if s.is_wt_deleted() {
                    'D'
                } else {
                    continue;
                };
                out.push(code);
                out.push(' ');
                out.push_str(entry.path().unwrap_or(""));
                out.push('\n');
            }
            Ok(out)
        })
        .await
    }

    async fn branch(&self, dir: &Path) -> VcsResult<String> {
        let dir = dir.to_path_buf();
        run_blocking(move || {
            let repo = Repository::discover(&dir)?;
            let head = repo.head()?;
            if head.is_branch() {
                Ok(head.shorthand().unwrap_or("HEAD").to_string())
            } else {
                // Detached HEAD: show the short SHA.
                let oid = head.peel_to_commit()?.id();
                Ok(format!("{:.7}", oid))
            }
        })
        .await
    }

    async fn stash(&self, dir: &Path) -> VcsResult<String> {
        let dir = dir.to_path_buf();
        run_blocking(move || {
            let mut repo = Repository::discover(&dir)?;
            let mut newest = String::new();
            repo.stash_foreach(|_, _, oid| {
                newest = oid.to_string();
                false
            })?;
            Ok(newest)
        })
        .await
    }

    async fn remote_url(&self, dir: &Path) -> VcsResult<String> {
        let dir = dir.to_path_buf();
        run_blocking(move || {
            let repo = Repository::discover(&dir)?;
            let remote = repo.find_remote(REMOTE_NAME).map_err(|_| VcsError::NoRemote)?;
            remote
                .url()
                .map(str::to_string)
                .ok_or_else(|| VcsError::Other(anyhow!("remote URL is not valid UTF-8")))
        })
        .await
    }

    async fn remote_branch_and_revision(&self, dir: &Path) -> VcsResult<(String, String)> {
        let dir = dir.to_path_buf();
        let cache = self.cached_default_branch.clone();
        run_blocking(move || {
            let repo = Repository::discover(&dir)?;
            repo.find_remote(REMOTE_NAME).map_err(|_| VcsError::NoRemote)?;

            let head = repo
                .find_reference(REMOTE_HEAD_REF)
                .map_err(|_| VcsError::NotFound(REMOTE_HEAD_REF.to_string()))?;
            let branch = head
                .symbolic_target()
                .and_then(|t| t.strip_prefix("refs/remotes/origin/"))
                .map(str::to_string)
                .ok_or_else(|| VcsError::Other(anyhow!("{REMOTE_HEAD_REF} is not symbolic")))?;
            let rev = head
                .resolve()?
                .target()
                .ok_or_else(|| VcsError::Other(anyhow!("{REMOTE_HEAD_REF} has no target")))?
                .to_string();

            *cache.lock().unwrap() = Some(branch.clone());
            Ok((branch, rev))
        })
        .await
    }

    async fn local_revision(&self, dir: &Path, branch: &str) -> VcsResult<String> {
        let dir = dir.to_path_buf();
        let branch = branch.to_string();
        run_blocking(move || {
            let repo = Repository::discover(&dir)?;
            let rev = repo.revparse_single(&branch)?.id().to_string();
            Ok(rev)
        })
        .await
    }

    async fn contains(&self, dir: &Path, revision: &str, branch: &str) -> VcsResult<bool> {
        let dir = dir.to_path_buf();
        let revision = revision.to_string();
        let branch = branch.to_string();
        run_blocking(move || {
            let repo = Repository::discover(&dir)?;
            let tip = repo.revparse_single(&branch)?.id();
            let rev = Oid::from_str(&revision).map_err(|e| VcsError::Other(anyhow!(e)))?;
            Ok(tip == rev || repo.graph_descendant_of(tip, rev)?)
        })
        .await
    }

    async fn remote_contains(&self, dir: &Path, revision: &str, branch: &str) -> VcsResult<bool> {
        let dir = dir.to_path_buf();
        let revision = revision.to_string();
        let tracking = format!("refs/remotes/origin/{branch}");
        run_blocking(move || {
            let repo = Repository::discover(&dir)?;
            let tip = repo.revparse_single(&tracking)?.id();
            let rev = Oid::from_str(&revision).map_err(|e| VcsError::Other(anyhow!(e)))?;
            Ok(tip == rev || repo.graph_descendant_of(tip, rev)?)
        })
        .await
    }

    fn cached_remote_default_branch(&self) -> VcsResult<String> {
        self.cached_default_branch
            .lock()
            .unwrap()
            .clone()
            .ok_or_else(|| VcsError::Other(anyhow!("no remote default branch seen yet")))
    }

    fn no_remote_default_branch(&self) -> &'static str {
        "main"
    }
}
