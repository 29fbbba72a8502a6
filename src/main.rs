use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Result};
use clap::Parser;
use repostat::config::Config;
use repostat::present::{self, FilterKind, PresenterKind};
use repostat::resolver::SrcDirResolver;
use repostat::workspace::Workspace;
use tokio::io::AsyncBufReadExt;
use tracing::debug;

#[derive(Parser)]
#[command(
    name = "repostat",
    about = "Repository status for workspace packages — dirty, ahead/behind, stashed, or untracked",
    version
)]
struct Args {
    /// Import paths to inspect. With no paths and no --stdin, every package
    /// under the source roots is inspected.
    import_paths: Vec<String>,

    /// Read newline-separated import paths from stdin
    #[arg(long)]
    stdin: bool,

    /// Source root a workspace lays its packages out under (repeatable)
    #[arg(long = "src-root", env = "REPOSTAT_SRC_ROOT")]
    src_roots: Vec<PathBuf>,

    /// Workers per pipeline stage (default: available parallelism)
    #[arg(long, short = 'p', env = "REPOSTAT_PARALLELISM")]
    parallelism: Option<usize>,

    /// Show every repository, not only those needing attention
    #[arg(long, short = 'a')]
    all: bool,

    /// Output format: compact | long | json
    #[arg(long, short = 'f', env = "REPOSTAT_FORMAT")]
    format: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "REPOSTAT_LOG")]
    log: Option<String>,

    /// Log output format: pretty | json
    #[arg(long, env = "REPOSTAT_LOG_FORMAT")]
    log_format: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let filter_arg = args.all.then(|| "all".to_string());
    let config = Config::new(
        args.src_roots,
        args.parallelism,
        args.log,
        args.log_format,
        filter_arg,
        args.format,
    );

    // Statuses go to stdout; logs stay on stderr so output can be piped.
    if config.log_format == "json" {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(config.log.clone())
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(config.log.clone())
            .with_writer(std::io::stderr)
            .compact()
            .init();
    }

    let Some(filter_kind) = FilterKind::parse(&config.filter) else {
        bail!("unknown filter {:?} (expected attention | all)", config.filter);
    };
    let Some(presenter_kind) = PresenterKind::parse(&config.format) else {
        bail!(
            "unknown output format {:?} (expected compact | long | json)",
            config.format
        );
    };

    debug!(
        parallelism = config.parallelism,
        roots = config.src_roots.len(),
        "starting pipeline"
    );

    let resolver = Arc::new(SrcDirResolver::new(config.src_roots.clone()));
    let Workspace {
        import_paths,
        mut statuses,
        mut errors,
    } = Workspace::new(
        resolver,
        present::filter(filter_kind),
        present::presenter(presenter_kind),
        config.parallelism,
    );

    // Producer: explicit paths, stdin, or a walk of the source roots.
    let producer = tokio::spawn(async move {
        if !args.import_paths.is_empty() {
            for path in args.import_paths {
                if import_paths.send(path).await.is_err() {
                    return;
                }
            }
        } else if args.stdin {
            let mut lines = tokio::io::BufReader::new(tokio::io::stdin()).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                let line = line.trim().to_string();
                if line.is_empty() {
                    continue;
                }
                if import_paths.send(line).await.is_err() {
                    return;
                }
            }
        } else {
            let roots = config.src_roots.clone();
            let walked = tokio::task::spawn_blocking(move || walk_import_paths(&roots)).await;
            for path in walked.unwrap_or_default() {
                if import_paths.send(path).await.is_err() {
                    return;
                }
            }
        }
        // Sender drops here; the pipeline begins its staged shutdown.
    });

    let mut error_count = 0usize;
    let mut statuses_open = true;
    let mut errors_open = true;
    while statuses_open || errors_open {
        tokio::select! {
            status = statuses.recv(), if statuses_open => match status {
                Some(line) => println!("{line}"),
                None => statuses_open = false,
            },
            err = errors.recv(), if errors_open => match err {
                Some(err) => {
                    error_count += 1;
                    eprintln!("repostat: {err}");
                }
                None => errors_open = false,
            },
        }
    }
    let _ = producer.await;

    if error_count > 0 {
        std::process::exit(1);
    }
    Ok(())
}

/// Enumerate candidate import paths: every directory under a source root
/// that directly contains at least one file. Hidden directories (including
/// VCS metadata) are skipped; repository-level dedup happens downstream.
fn walk_import_paths(roots: &[PathBuf]) -> Vec<String> {
    let mut out = Vec::new();
    for root in roots {
        walk_dir(root, root, &mut out);
    }
    out
}

fn walk_dir(root: &Path, dir: &Path, out: &mut Vec<String>) {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return;
    };
    let mut has_file = false;
    for entry in entries.flatten() {
        if entry.file_name().to_string_lossy().starts_with('.') {
            continue;
        }
        let path = entry.path();
        if path.is_dir() {
            walk_dir(root, &path, out);
        } else {
            has_file = true;
        }
    }
    if !has_file {
        return;
    }
    if let Ok(rel) = dir.strip_prefix(root) {
        if !rel.as_os_str().is_empty() {
            let import_path = rel
                .components()
                .map(|c| c.as_os_str().to_string_lossy())
                .collect::<Vec<_>>()
                .join("/");
            out.push(import_path);
        }
    }
}
