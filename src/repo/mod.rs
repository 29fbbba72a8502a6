//! Repository records and the dedup registry.
//!
//! Many packages map onto one repository. Discovery workers race to claim a
//! root; the registry guarantees that exactly one of them constructs the
//! record, which then travels the rest of the pipeline by value.

use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use serde::Serialize;

use crate::vcs::VcsState;

/// Local (working copy) side of a repository's state.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LocalState {
    /// Status text, one entry per changed path. Empty means clean.
    pub status: String,
    pub branch: String,
    /// Revision of the newest stash, empty when nothing is stashed.
    pub stash: String,
    /// Remote URL as configured in the checkout.
    pub remote_url: String,
    pub revision: String,
    /// Whether local history already contains the remote revision.
    pub contains_remote_revision: bool,
}

/// Remote side of a repository's state.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteState {
    pub branch: String,
    pub revision: String,
    /// Canonical repository URL derived from the import path.
    pub repo_url: String,
    /// The ref the remote could not answer for, when one was missing.
    pub not_found: Option<String>,
    /// Whether remote history contains the local revision.
    pub contains_local_revision: bool,
}

/// One version-controlled repository (or VCS-less package) in the workspace.
///
/// `path`, `root`, `vcs_error` and `vcs` are fixed at construction; `local`
/// and `remote` are written exactly once, by the state stage, which owns the
/// record at that point.
pub struct Repo {
    /// Working-copy directory the package resolved to.
    pub path: PathBuf,
    /// Canonical identifier: the repository root import path, the package's
    /// own import path when no VCS applies, or the directory as last resort.
    pub root: String,
    /// Set when the detected VCS kind has no state adapter.
    pub vcs_error: Option<String>,
    /// State adapter handle; `None` when the package is not under VCS.
    pub vcs: Option<Arc<dyn VcsState>>,
    pub local: LocalState,
    pub remote: RemoteState,
}

impl Repo {
    /// Package not under any version control.
    pub fn no_vcs(path: PathBuf, root: String) -> Self {
        Self {
            path,
            root,
            vcs_error: None,
            vcs: None,
            local: LocalState::default(),
            remote: RemoteState::default(),
        }
    }

    /// Repository whose VCS kind has no state adapter.
    pub fn unsupported(path: PathBuf, root: String, vcs_error: String) -> Self {
        Self {
            path,
            root,
            vcs_error: Some(vcs_error),
            vcs: None,
            local: LocalState::default(),
            remote: RemoteState::default(),
        }
    }

    /// Repository with a working state adapter.
    pub fn with_vcs(path: PathBuf, root: String, vcs: Arc<dyn VcsState>) -> Self {
        Self {
            path,
            root,
            vcs_error: None,
            vcs: Some(vcs),
            local: LocalState::default(),
            remote: RemoteState::default(),
        }
    }

    pub fn dirty(&self) -> bool {
        !self.local.status.is_empty()
    }

    pub fn stashed(&self) -> bool {
        !self.local.stash.is_empty()
    }

    /// Local history is missing the remote revision.
    pub fn behind_remote(&self) -> bool {
        !self.remote.revision.is_empty() && !self.local.contains_remote_revision
    }

    /// Remote history is missing the local revision.
    pub fn ahead_of_remote(&self) -> bool {
        !self.local.revision.is_empty() && !self.remote.contains_local_revision
    }

    pub fn off_default_branch(&self) -> bool {
        !self.local.branch.is_empty() && self.local.branch != self.remote.branch
    }

    /// Anything a developer would want to act on.
    pub fn needs_attention(&self) -> bool {
        self.vcs.is_none()
            || self.vcs_error.is_some()
            || self.dirty()
            || self.stashed()
            || self.behind_remote()
            || self.ahead_of_remote()
            || self.off_default_branch()
            || self.remote.not_found.is_some()
            || self.local.remote_url.is_empty()
    }
}

impl fmt::Debug for Repo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Repo")
            .field("path", &self.path)
            .field("root", &self.root)
            .field("vcs_error", &self.vcs_error)
            .field("vcs", &self.vcs.as_ref().map(|v| v.kind()))
            .field("local", &self.local)
            .field("remote", &self.remote)
            .finish()
    }
}

/// Dedup map from canonical root to its first sighting.
///
/// Check-and-insert is one critical section so two workers can never both
/// believe they were first to see a root.
pub struct RepoRegistry {
    roots: Mutex<HashMap<String, PathBuf>>,
}

impl RepoRegistry {
    pub fn new() -> Self {
        Self {
            roots: Mutex::new(HashMap::new()),
        }
    }

    /// Construct and claim a record for `root` iff the root is unseen.
    ///
    /// Returns `Some(record)` for the single caller that inserted the root,
    /// `None` for everyone else. The record is never stored here: the caller
    /// owns it outright, which is what keeps later mutation single-writer.
    pub fn insert_if_absent(&self, root: &str, make: impl FnOnce() -> Repo) -> Option<Repo> {
        let mut roots = self.roots.lock().unwrap();
        if roots.contains_key(root) {
            return None;
        }
        let repo = make();
        roots.insert(root.to_string(), repo.path.clone());
        Some(repo)
    }

    /// Number of distinct roots seen so far.
    pub fn len(&self) -> usize {
        self.roots.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.roots.lock().unwrap().is_empty()
    }
}

impl Default for RepoRegistry {
    fn default() -> Self {
        Self::new()
    }
}
