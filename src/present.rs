// SPDX-License-Identifier: MIT
//! Filters and presenters injected into the pipeline by the CLI.
//!
//! Filters decide which repositories are worth showing; presenters turn a
//! record into one display value. Both are plain functions over the record,
//! so callers can substitute their own.

use std::sync::Arc;

use serde::Serialize;

use crate::repo::{LocalState, RemoteState, Repo};
use crate::workspace::{RepoFilter, RepoPresenter};

/// Which repositories to show.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterKind {
    /// Only repositories needing attention: dirty, stashed, out of sync,
    /// missing their remote ref, not under VCS, or not introspectable.
    Attention,
    /// Every unique repository.
    All,
}

impl FilterKind {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "attention" => Some(Self::Attention),
            "all" => Some(Self::All),
            _ => None,
        }
    }
}

pub fn filter(kind: FilterKind) -> RepoFilter {
    match kind {
        FilterKind::All => Arc::new(|_: &Repo| true),
        FilterKind::Attention => Arc::new(Repo::needs_attention),
    }
}

/// Output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PresenterKind {
    Compact,
    Long,
    Json,
}

impl PresenterKind {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "compact" => Some(Self::Compact),
            "long" => Some(Self::Long),
            "json" => Some(Self::Json),
            _ => None,
        }
    }
}

pub fn presenter(kind: PresenterKind) -> RepoPresenter {
    match kind {
        PresenterKind::Compact => Arc::new(compact),
        PresenterKind::Long => Arc::new(long),
        PresenterKind::Json => Arc::new(json),
    }
}

/// One line per repository: `[<flags>] <root>`.
///
/// Flags: `?` not under VCS, `!` VCS not introspectable, `*` dirty,
/// `$` stashed, `+` ahead of remote, `-` behind remote, `b` off the default
/// branch, `#` remote ref missing.
pub fn compact(repo: &Repo) -> String {
    let mut flags = String::new();
    if repo.vcs.is_none() && repo.vcs_error.is_none() {
        flags.push('?');
    }
    if repo.vcs_error.is_some() {
        flags.push('!');
    }
    if repo.vcs.is_some() {
        if repo.dirty() {
            flags.push('*');
        }
        if repo.stashed() {
            flags.push('$');
        }
        if repo.ahead_of_remote() {
            flags.push('+');
        }
        if repo.behind_remote() {
            flags.push('-');
        }
        if repo.off_default_branch() {
            flags.push('b');
        }
        if repo.remote.not_found.is_some() {
            flags.push('#');
        }
    }
    format!("[{flags:<6}] {}", repo.root)
}

/// Multi-line detail per repository.
pub fn long(repo: &Repo) -> String {
    let mut out = String::new();
    out.push_str(&repo.root);
    out.push('\n');
    push_line(&mut out, "path", &repo.path.display().to_string());

    if let Some(err) = &repo.vcs_error {
        push_line(&mut out, "vcs", err);
        return out;
    }
    let Some(vcs) = &repo.vcs else {
        push_line(&mut out, "vcs", "none");
        return out;
    };
    push_line(&mut out, "vcs", &vcs.kind().to_string());

    let status = if repo.dirty() {
        format!("{} changed path(s)", repo.local.status.lines().count())
    } else {
        "clean".to_string()
    };
    push_line(&mut out, "status", &status);
    push_line(
        &mut out,
        "branch",
        &format!("{} (remote {})", repo.local.branch, repo.remote.branch),
    );
    if repo.stashed() {
        push_line(&mut out, "stash", &repo.local.stash);
    }
    if !repo.local.remote_url.is_empty() {
        push_line(&mut out, "remote", &repo.local.remote_url);
    }
    if !repo.remote.repo_url.is_empty() {
        push_line(&mut out, "repo", &repo.remote.repo_url);
    }
    if let Some(missing) = &repo.remote.not_found {
        push_line(&mut out, "missing", missing);
    }
    let sync = match (repo.ahead_of_remote(), repo.behind_remote()) {
        (false, false) => "up to date",
        (true, false) => "ahead of remote",
        (false, true) => "behind remote",
        (true, true) => "diverged from remote",
    };
    push_line(&mut out, "sync", sync);
    out
}

fn push_line(out: &mut String, label: &str, value: &str) {
    out.push_str(&format!("  {label:<8} {value}\n"));
}

/// Serializable view of a record, one JSON object per line.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct RepoReport<'a> {
    root: &'a str,
    path: String,
    vcs: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    vcs_error: Option<&'a str>,
    local: &'a LocalState,
    remote: &'a RemoteState,
}

pub fn json(repo: &Repo) -> String {
    let report = RepoReport {
        root: &repo.root,
        path: repo.path.display().to_string(),
        vcs: repo.vcs.as_ref().map(|v| v.kind().to_string()),
        vcs_error: repo.vcs_error.as_deref(),
        local: &repo.local,
        remote: &repo.remote,
    };
    serde_json::to_string(&report).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vcs::{self, VcsKind};
    use std::path::PathBuf;

    fn tracked_repo() -> Repo {
        let handle = vcs::state_for(VcsKind::Git).unwrap();
        let mut repo = Repo::with_vcs(
            PathBuf::from("/ws/src/github.com/octo/widgets"),
            "github.com/octo/widgets".to_string(),
            handle,
        );
        repo.local.branch = "main".to_string();
        repo.remote.branch = "main".to_string();
        repo.local.revision = "aaa".to_string();
        repo.remote.revision = "aaa".to_string();
        repo.local.contains_remote_revision = true;
        repo.remote.contains_local_revision = true;
        repo.local.remote_url = "https://github.com/octo/widgets".to_string();
        repo
    }

    #[test]
    fn test_compact_clean_repo_has_no_flags() {
        let repo = tracked_repo();
        assert_eq!(compact(&repo), "[      ] github.com/octo/widgets");
        assert!(!repo.needs_attention());
    }

    #[test]
    fn test_compact_flags() {
        let mut repo = tracked_repo();
        repo.local.status = "M src/lib.rs\n".to_string();
        repo.local.stash = "abc123".to_string();
        repo.remote.contains_local_revision = false;
        repo.local.branch = "feature".to_string();
        let line = compact(&repo);
        for flag in ['*', '$', '+', 'b'] {
            assert!(line.contains(flag), "{line:?} should contain {flag}");
        }
        assert!(repo.needs_attention());
    }

    #[test]
    fn test_compact_untracked_and_unsupported() {
        let plain = Repo::no_vcs(PathBuf::from("/p"), "example.com/plain".to_string());
        assert!(compact(&plain).starts_with("[?"));
        assert!(plain.needs_attention());

        let odd = Repo::unsupported(
            PathBuf::from("/p"),
            "example.com/odd".to_string(),
            "Bazaar not supported: no state adapter for Bazaar".to_string(),
        );
        assert!(compact(&odd).starts_with("[!"));
        assert!(odd.needs_attention());
    }

    #[test]
    fn test_attention_filter_hides_clean_repos() {
        let clean = tracked_repo();
        let shown = filter(FilterKind::Attention);
        assert!(!shown(&clean));

        let mut dirty = tracked_repo();
        dirty.local.status = "M a\n".to_string();
        assert!(shown(&dirty));

        let all = filter(FilterKind::All);
        assert!(all(&clean));
    }

    #[test]
    fn test_json_report_shape() {
        let mut repo = tracked_repo();
        repo.remote.repo_url = "https://github.com/octo/widgets".to_string();
        let value: serde_json::Value = serde_json::from_str(&json(&repo)).unwrap();
        assert_eq!(value["root"], "github.com/octo/widgets");
        assert_eq!(value["vcs"], "Git");
        assert_eq!(value["local"]["containsRemoteRevision"], true);
        assert_eq!(value["remote"]["repoUrl"], "https://github.com/octo/widgets");
        assert!(value.get("vcsError").is_none());
    }

    #[test]
    fn test_long_unsupported_repo() {
        let odd = Repo::unsupported(
            PathBuf::from("/p"),
            "example.com/odd".to_string(),
            "Fossil not supported: no state adapter for Fossil".to_string(),
        );
        let text = long(&odd);
        assert!(text.contains("Fossil not supported"));
    }
}
