// SPDX-License-Identifier: MIT
//! Mercurial state adapter driving the `hg` binary.
//!
//! Mercurial has no stable embeddable library, so state is read through the
//! CLI. Like the Git adapter this stays local: the "remote" branch is the
//! local tip of the branch the `default` path would push to. Answering
//! whether the remote side contains a local revision would require dialing
//! the remote, so `remote_contains` reports `NotImplemented` and callers
//! fall back to their heuristic.

use std::path::Path;

use anyhow::anyhow;
use async_trait::async_trait;
use tokio::process::Command;

use super::{VcsError, VcsKind, VcsResult, VcsState};

#[derive(Debug)]
pub struct HgState;

impl HgState {
    pub fn new() -> Self {
        Self
    }
}

impl Default for HgState {
    fn default() -> Self {
        Self::new()
    }
}

async fn hg(dir: &Path, args: &[&str]) -> VcsResult<String> {
    let out = Command::new("hg")
        .arg("--cwd")
        .arg(dir)
        .args(args)
        .output()
        .await
        .map_err(|e| VcsError::Other(anyhow!("failed to run hg: {e}")))?;
    if !out.status.success() {
        let stderr = String::from_utf8_lossy(&out.stderr);
        return Err(VcsError::Other(anyhow!(
            "hg {} failed: {}",
            args.first().unwrap_or(&""),
            stderr.trim()
        )));
    }
    Ok(String::from_utf8_lossy(&out.stdout).trim_end().to_string())
}

#[async_trait]
impl VcsState for HgState {
    fn kind(&self) -> VcsKind {
        VcsKind::Mercurial
    }

    async fn status(&self, dir: &Path) -> VcsResult<String> {
        hg(dir, &["status"]).await
    }

    async fn branch(&self, dir: &Path) -> VcsResult<String> {
        hg(dir, &["branch"]).await
    }

    async fn stash(&self, dir: &Path) -> VcsResult<String> {
        // First shelved change, empty when the shelf is clear.
        let list = hg(dir, &["shelve", "--list", "--quiet"]).await?;
        Ok(list.lines().next().unwrap_or("").to_string())
    }

    async fn remote_url(&self, dir: &Path) -> VcsResult<String> {
        hg(dir, &["paths", "default"])
            .await
            .map_err(|_| VcsError::NoRemote)
    }

    async fn remote_branch_and_revision(&self, dir: &Path) -> VcsResult<(String, String)> {
        if hg(dir, &["paths", "default"]).await.is_err() {
            return Err(VcsError::NoRemote);
        }
        let branch = self.no_remote_default_branch();
        match hg(dir, &["log", "-r", branch, "--template", "{node}"]).await {
            Ok(rev) if !rev.is_empty() => Ok((branch.to_string(), rev)),
            _ => Err(VcsError::NotFound(branch.to_string())),
        }
    }

    async fn local_revision(&self, dir: &Path, branch: &str) -> VcsResult<String> {
        hg(dir, &["log", "-r", branch, "--template", "{node}"]).await
    }

    async fn contains(&self, dir: &Path, revision: &str, branch: &str) -> VcsResult<bool> {
        let revset = format!("{revision} and ancestors({branch})");
        let out = hg(dir, &["log", "-r", &revset, "--template", "{node}"]).await?;
        Ok(!out.is_empty())
    }

    async fn remote_contains(&self, _dir: &Path, _revision: &str, _branch: &str) -> VcsResult<bool> {
        Err(VcsError::NotImplemented)
    }

    fn cached_remote_default_branch(&self) -> VcsResult<String> {
        Err(VcsError::Other(anyhow!("no remote default branch seen yet")))
    }

    fn no_remote_default_branch(&self) -> &'static str {
        "default"
    }
}
