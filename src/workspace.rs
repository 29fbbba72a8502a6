// SPDX-License-Identifier: MIT
//! The three-stage status pipeline.
//!
//! Import paths flow through discovery (resolve + dedup into unique
//! repository records), state/filter (VCS state computation), and
//! presentation (rendering), each stage a pool of workers over bounded
//! queues. Backpressure from a full queue is the only flow control; a slow
//! consumer stalls the whole pipeline rather than buffering unboundedly.
//!
//! Shutdown is staged: a downstream queue closes exactly when the last
//! worker feeding it finishes, so every stage drains completely before the
//! next one observes end-of-stream.

use std::path::Path;
use std::sync::Arc;

use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinSet;
use tracing::{debug, error, warn};

use crate::repo::{Repo, RepoRegistry};
use crate::repo_url;
use crate::resolver::{PackageResolver, ResolveError, ResolvedPackage};
use crate::vcs::{self, VcsError};

/// Capacity of every inter-stage queue.
const QUEUE_CAP: usize = 64;

/// Decides which repositories are shown.
pub type RepoFilter = Arc<dyn Fn(&Repo) -> bool + Send + Sync>;
/// Renders one repository into a display string.
pub type RepoPresenter = Arc<dyn Fn(&Repo) -> String + Send + Sync>;

/// Non-fatal errors reported on the side channel.
#[derive(Debug, thiserror::Error)]
pub enum DiscoveryError {
    #[error("cannot resolve {import_path}: {source}")]
    Resolve {
        import_path: String,
        #[source]
        source: ResolveError,
    },
}

type SharedReceiver<T> = Arc<Mutex<mpsc::Receiver<T>>>;

async fn recv_shared<T>(rx: &SharedReceiver<T>) -> Option<T> {
    rx.lock().await.recv().await
}

/// A running pipeline: feed `import_paths`, drain `statuses` and `errors`
/// until both close. Output order is unspecified; the two streams are
/// independent.
pub struct Workspace {
    pub import_paths: mpsc::Sender<String>,
    pub statuses: mpsc::Receiver<String>,
    pub errors: mpsc::Receiver<DiscoveryError>,
}

impl Workspace {
    /// Spawn `parallelism` workers per stage and wire the queues between
    /// them. Dropping the returned `import_paths` sender starts the staged
    /// shutdown.
    pub fn new(
        resolver: Arc<dyn PackageResolver>,
        should_show: RepoFilter,
        presenter: RepoPresenter,
        parallelism: usize,
    ) -> Self {
        let parallelism = parallelism.max(1);
        let (import_tx, import_rx) = mpsc::channel::<String>(QUEUE_CAP);
        let (unique_tx, unique_rx) = mpsc::channel::<Repo>(QUEUE_CAP);
        let (shown_tx, shown_rx) = mpsc::channel::<Repo>(QUEUE_CAP);
        let (status_tx, status_rx) = mpsc::channel::<String>(QUEUE_CAP);
        let (error_tx, error_rx) = mpsc::channel::<DiscoveryError>(QUEUE_CAP);

        let registry = Arc::new(RepoRegistry::new());
        let import_rx: SharedReceiver<String> = Arc::new(Mutex::new(import_rx));
        let unique_rx: SharedReceiver<Repo> = Arc::new(Mutex::new(unique_rx));
        let shown_rx: SharedReceiver<Repo> = Arc::new(Mutex::new(shown_rx));

        let mut discovery = JoinSet::new();
        for _ in 0..parallelism {
            discovery.spawn(discovery_worker(
                import_rx.clone(),
                unique_tx.clone(),
                error_tx.clone(),
                resolver.clone(),
                registry.clone(),
            ));
        }

        let mut state = JoinSet::new();
        for _ in 0..parallelism {
            state.spawn(state_worker(
                unique_rx.clone(),
                shown_tx.clone(),
                error_tx.clone(),
                should_show.clone(),
            ));
        }

        let mut present = JoinSet::new();
        for _ in 0..parallelism {
            present.spawn(presenter_worker(
                shown_rx.clone(),
                status_tx.clone(),
                presenter.clone(),
            ));
        }

        // Workers own the only live sender clones, so each downstream queue
        // closes exactly when the pool feeding it has fully drained. The
        // supervisors just surface panics and mark stage completion.
        drop(unique_tx);
        drop(shown_tx);
        drop(status_tx);
        drop(error_tx);
        tokio::spawn(supervise("discovery", discovery));
        tokio::spawn(supervise("state", state));
        tokio::spawn(supervise("present", present));

        Self {
            import_paths: import_tx,
            statuses: status_rx,
            errors: error_rx,
        }
    }
}

async fn supervise(stage: &'static str, mut workers: JoinSet<()>) {
    while let Some(res) = workers.join_next().await {
        if let Err(err) = res {
            error!(stage, %err, "pipeline worker panicked");
        }
    }
    debug!(stage, "stage drained");
}

/// Resolve an import path, classify its VCS situation, and claim the root.
/// Only the worker that first sees a root forwards its record.
async fn discovery_worker(
    imports: SharedReceiver<String>,
    unique: mpsc::Sender<Repo>,
    errors: mpsc::Sender<DiscoveryError>,
    resolver: Arc<dyn PackageResolver>,
    registry: Arc<RepoRegistry>,
) {
    while let Some(import_path) = recv_shared(&imports).await {
        let pkg = match resolver.resolve(&import_path) {
            Ok(pkg) => pkg,
            Err(source) => {
                let report = DiscoveryError::Resolve {
                    import_path,
                    source,
                };
                if errors.send(report).await.is_err() {
                    break;
                }
                continue;
            }
        };
        if pkg.is_std_dist {
            continue;
        }

        let repo = match vcs::detect(&pkg.dir, &pkg.src_root) {
            None => registry.insert_if_absent(&pkg.import_path, || {
                Repo::no_vcs(pkg.dir.clone(), pkg.import_path.clone())
            }),
            Some((kind, repo_dir)) => {
                let root = root_import_path(&pkg, &repo_dir);
                match vcs::state_for(kind) {
                    Ok(handle) => registry.insert_if_absent(&root, || {
                        Repo::with_vcs(pkg.dir.clone(), root.clone(), handle.clone())
                    }),
                    Err(cause) => registry.insert_if_absent(&root, || {
                        Repo::unsupported(
                            pkg.dir.clone(),
                            root.clone(),
                            format!("{kind} not supported: {cause}"),
                        )
                    }),
                }
            }
        };

        if let Some(repo) = repo {
            if unique.send(repo).await.is_err() {
                break;
            }
        }
    }
}

/// Canonical root for a detected repository: its directory relative to the
/// source root, expressed as an import path. Falls back to the filesystem
/// path when the repository sits outside the source root.
fn root_import_path(pkg: &ResolvedPackage, repo_dir: &Path) -> String {
    match repo_dir.strip_prefix(&pkg.src_root) {
        Ok(rel) if !rel.as_os_str().is_empty() => rel
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/"),
        _ => repo_dir.display().to_string(),
    }
}

/// Populate VCS state, then apply the filter exactly once per record.
async fn state_worker(
    unique: SharedReceiver<Repo>,
    shown: mpsc::Sender<Repo>,
    errors: mpsc::Sender<DiscoveryError>,
    should_show: RepoFilter,
) {
    // The error stream must stay open until this stage drains too.
    let _errors = errors;
    while let Some(mut repo) = recv_shared(&unique).await {
        compute_vcs_state(&mut repo).await;
        if !should_show(&repo) {
            continue;
        }
        if shown.send(repo).await.is_err() {
            break;
        }
    }
}

async fn presenter_worker(
    shown: SharedReceiver<Repo>,
    statuses: mpsc::Sender<String>,
    presenter: RepoPresenter,
) {
    while let Some(repo) = recv_shared(&shown).await {
        if statuses.send(presenter(&repo)).await.is_err() {
            break;
        }
    }
}

/// Fill in `repo.local` and `repo.remote`.
///
/// Every query is attempted exactly once and tolerates failure on its own:
/// a failed query leaves its field at the zero value. The remote-branch
/// lookup degrades instead of failing, so `remote.branch` is never left
/// empty for a repository with an adapter.
pub async fn compute_vcs_state(repo: &mut Repo) {
    let Some(vcs) = repo.vcs.clone() else {
        // Package not under VCS (or unsupported kind): nothing to compute.
        return;
    };
    let dir = repo.path.clone();

    if let Ok(status) = vcs.status(&dir).await {
        repo.local.status = status;
    }
    if let Ok(branch) = vcs.branch(&dir).await {
        repo.local.branch = branch;
    }
    if let Ok(stash) = vcs.stash(&dir).await {
        repo.local.stash = stash;
    }
    if let Ok(url) = vcs.remote_url(&dir).await {
        repo.local.remote_url = url;
    }

    match vcs.remote_branch_and_revision(&dir).await {
        Ok((branch, revision)) => {
            repo.remote.branch = branch;
            repo.remote.revision = revision;
        }
        Err(VcsError::NoRemote) => {
            repo.remote.branch = vcs.no_remote_default_branch().to_string();
        }
        Err(VcsError::NotFound(missing)) => {
            repo.remote.not_found = Some(missing);
            repo.remote.branch = vcs.no_remote_default_branch().to_string();
        }
        Err(err) => match vcs.cached_remote_default_branch() {
            Ok(branch) => repo.remote.branch = branch,
            Err(_) => {
                warn!(root = %repo.root, %err, "remote branch lookup failed");
                // Still a better fallback than an empty branch name.
                repo.remote.branch = vcs.no_remote_default_branch().to_string();
            }
        },
    }

    if let Ok(revision) = vcs.local_revision(&dir, &repo.remote.branch).await {
        repo.local.revision = revision;
    }

    if !repo.remote.revision.is_empty() {
        if let Ok(contains) = vcs
            .contains(&dir, &repo.remote.revision, &repo.remote.branch)
            .await
        {
            repo.local.contains_remote_revision = contains;
        }
    }

    if !repo.local.revision.is_empty() {
        match vcs
            .remote_contains(&dir, &repo.local.revision, &repo.remote.branch)
            .await
        {
            Ok(contains) => repo.remote.contains_local_revision = contains,
            Err(VcsError::NotImplemented)
                if repo.local.revision != repo.remote.revision
                    && !repo.remote.revision.is_empty() =>
            {
                // Best effort: when the revisions differ, assume exactly one
                // side contains the other. Divergent histories can make both
                // containments false, so this is an inference, not a fact.
                repo.remote.contains_local_revision = !repo.local.contains_remote_revision;
            }
            Err(_) => {}
        }
    }

    if let Ok(url) = repo_url::repo_url_for_import_path(&repo.root) {
        repo.remote.repo_url = url;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FnResolver<F>(F);

    impl<F> PackageResolver for FnResolver<F>
    where
        F: Fn(&str) -> Result<ResolvedPackage, ResolveError> + Send + Sync,
    {
        fn resolve(&self, import_path: &str) -> Result<ResolvedPackage, ResolveError> {
            (self.0)(import_path)
        }
    }

    fn show_all() -> RepoFilter {
        Arc::new(|_: &Repo| true)
    }

    fn root_presenter() -> RepoPresenter {
        Arc::new(|repo: &Repo| repo.root.clone())
    }

    #[tokio::test]
    async fn test_empty_input_closes_both_streams() {
        let resolver = Arc::new(FnResolver(|p: &str| {
            Err(ResolveError::NotFound(p.to_string()))
        }));
        let Workspace {
            import_paths,
            mut statuses,
            mut errors,
        } = Workspace::new(resolver, show_all(), root_presenter(), 4);

        drop(import_paths);
        assert!(statuses.recv().await.is_none());
        assert!(errors.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_resolution_failure_reports_and_skips() {
        let resolver = Arc::new(FnResolver(|p: &str| {
            Err(ResolveError::NotFound(p.to_string()))
        }));
        let Workspace {
            import_paths,
            mut statuses,
            mut errors,
        } = Workspace::new(resolver, show_all(), root_presenter(), 2);

        import_paths
            .send("example.com/gone".to_string())
            .await
            .unwrap();
        drop(import_paths);

        let err = errors.recv().await.expect("one error");
        assert!(err.to_string().contains("example.com/gone"));
        assert!(errors.recv().await.is_none());
        assert!(statuses.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_std_dist_is_silently_skipped() {
        let resolver = Arc::new(FnResolver(|p: &str| {
            Ok(ResolvedPackage {
                dir: std::path::PathBuf::new(),
                src_root: std::path::PathBuf::new(),
                import_path: p.to_string(),
                is_std_dist: true,
            })
        }));
        let Workspace {
            import_paths,
            mut statuses,
            mut errors,
        } = Workspace::new(resolver, show_all(), root_presenter(), 2);

        import_paths.send("fmt".to_string()).await.unwrap();
        drop(import_paths);

        assert!(statuses.recv().await.is_none());
        assert!(errors.recv().await.is_none());
    }
}
