//! Package resolution: import path to on-disk directory.
//!
//! A workspace lays packages out by import path under one or more source
//! roots (`<root>/github.com/octo/widgets/...`). The resolver is the only
//! component that knows about that layout; everything downstream works with
//! resolved directories. The source roots are passed in explicitly rather
//! than read from ambient process state.

use std::path::PathBuf;

/// A resolved package.
#[derive(Debug, Clone)]
pub struct ResolvedPackage {
    /// Package directory. Empty for standard-distribution packages, which
    /// are classified before any disk lookup.
    pub dir: PathBuf,
    /// The source root `dir` was found under; VCS detection stops here.
    pub src_root: PathBuf,
    /// Cleaned, fully-qualified import path.
    pub import_path: String,
    /// Part of the standard distribution (skipped by status reporting).
    pub is_std_dist: bool,
}

#[derive(Debug, thiserror::Error)]
pub enum ResolveError {
    #[error("invalid import path {0:?}")]
    InvalidImportPath(String),
    #[error("package {0} not found under any source root")]
    NotFound(String),
}

/// Maps import paths to package directories.
pub trait PackageResolver: Send + Sync {
    fn resolve(&self, import_path: &str) -> Result<ResolvedPackage, ResolveError>;
}

/// Resolver over a fixed list of source roots, first match wins.
pub struct SrcDirResolver {
    src_roots: Vec<PathBuf>,
}

impl SrcDirResolver {
    pub fn new(src_roots: Vec<PathBuf>) -> Self {
        Self { src_roots }
    }
}

impl PackageResolver for SrcDirResolver {
    fn resolve(&self, import_path: &str) -> Result<ResolvedPackage, ResolveError> {
        let cleaned = clean_import_path(import_path)
            .ok_or_else(|| ResolveError::InvalidImportPath(import_path.to_string()))?;

        // A first segment without a dot is not a hostname: standard
        // distribution ("fmt", "std/io"). Classified without touching disk.
        let first = cleaned.split('/').next().unwrap_or("");
        if !first.contains('.') {
            return Ok(ResolvedPackage {
                dir: PathBuf::new(),
                src_root: PathBuf::new(),
                import_path: cleaned,
                is_std_dist: true,
            });
        }

        for root in &self.src_roots {
            let mut dir = root.clone();
            for segment in cleaned.split('/') {
                dir.push(segment);
            }
            if dir.is_dir() {
                return Ok(ResolvedPackage {
                    dir,
                    src_root: root.clone(),
                    import_path: cleaned,
                    is_std_dist: false,
                });
            }
        }
        Err(ResolveError::NotFound(cleaned))
    }
}

/// Normalize an import path, rejecting anything that could escape a source
/// root. Returns `None` for empty paths, absolute paths, `.`/`..` segments,
/// and backslashes.
fn clean_import_path(import_path: &str) -> Option<String> {
    let trimmed = import_path.trim().trim_matches('/');
    if trimmed.is_empty() || trimmed.contains('\\') {
        return None;
    }
    for segment in trimmed.split('/') {
        if segment.is_empty() || segment == "." || segment == ".." {
            return None;
        }
    }
    Some(trimmed.to_string())
}
