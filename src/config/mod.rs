//! Layered configuration.
//!
//! Priority: CLI / env var  >  TOML  >  built-in default. The TOML file
//! lives at `{config_dir}/config.toml` and every field in it is an optional
//! override.

use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::error;

const DEFAULT_FILTER: &str = "attention";
const DEFAULT_FORMAT: &str = "compact";

/// `{config_dir}/config.toml`; all fields are optional overrides.
#[derive(Deserialize, Default)]
struct TomlConfig {
    /// Source roots to resolve import paths under.
    src_roots: Option<Vec<PathBuf>>,
    /// Worker count per pipeline stage (default: available parallelism).
    parallelism: Option<usize>,
    /// Log level filter string, e.g. "debug", "info,repostat=trace" (default: "info").
    log: Option<String>,
    /// Log output format: "pretty" (default, human-readable) | "json" (structured for log aggregators).
    log_format: Option<String>,
    /// Default repository filter: "attention" (default) | "all".
    filter: Option<String>,
    /// Default output format: "compact" (default) | "long" | "json".
    format: Option<String>,
}

fn load_toml(config_dir: &Path) -> Option<TomlConfig> {
    let path = config_dir.join("config.toml");
    let contents = std::fs::read_to_string(&path).ok()?;
    match toml::from_str::<TomlConfig>(&contents) {
        Ok(cfg) => Some(cfg),
        Err(e) => {
            error!(path = %path.display(), err = %e, "failed to parse config.toml, using defaults");
            None
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    /// Source roots packages are laid out under, in lookup order.
    pub src_roots: Vec<PathBuf>,
    /// Worker count used by every pipeline stage.
    pub parallelism: usize,
    pub log: String,
    /// "pretty" | "json".
    pub log_format: String,
    /// Default filter name, overridable per invocation.
    pub filter: String,
    /// Default output format name, overridable per invocation.
    pub format: String,
}

impl Config {
    /// Build config from CLI/env args + optional TOML file.
    pub fn new(
        src_roots: Vec<PathBuf>,
        parallelism: Option<usize>,
        log: Option<String>,
        log_format: Option<String>,
        filter: Option<String>,
        format: Option<String>,
    ) -> Self {
        let toml = load_toml(&default_config_dir()).unwrap_or_default();

        let src_roots = if src_roots.is_empty() {
            toml.src_roots.unwrap_or_else(default_src_roots)
        } else {
            src_roots
        };
        let parallelism = parallelism
            .or(toml.parallelism)
            .filter(|&n| n > 0)
            .unwrap_or_else(default_parallelism);
        let log = log.or(toml.log).unwrap_or_else(|| "info".to_string());
        let log_format = log_format
            .or(toml.log_format)
            .unwrap_or_else(|| "pretty".to_string());
        let filter = filter
            .or(toml.filter)
            .unwrap_or_else(|| DEFAULT_FILTER.to_string());
        let format = format
            .or(toml.format)
            .unwrap_or_else(|| DEFAULT_FORMAT.to_string());

        Self {
            src_roots,
            parallelism,
            log,
            log_format,
            filter,
            format,
        }
    }
}

fn default_parallelism() -> usize {
    std::thread::available_parallelism()
        .map(NonZeroUsize::get)
        .unwrap_or(4)
}

/// `~/src` when it exists, else the current directory.
fn default_src_roots() -> Vec<PathBuf> {
    if let Ok(home) = std::env::var("HOME") {
        let src = PathBuf::from(home).join("src");
        if src.is_dir() {
            return vec![src];
        }
    }
    vec![PathBuf::from(".")]
}

fn default_config_dir() -> PathBuf {
    #[cfg(target_os = "macos")]
    {
        // ~/Library/Application Support/repostat
        if let Ok(home) = std::env::var("HOME") {
            return PathBuf::from(home)
                .join("Library")
                .join("Application Support")
                .join("repostat");
        }
    }
    #[cfg(target_os = "linux")]
    {
        // $XDG_CONFIG_HOME/repostat or ~/.config/repostat
        if let Ok(xdg) = std::env::var("XDG_CONFIG_HOME") {
            return PathBuf::from(xdg).join("repostat");
        }
        if let Ok(home) = std::env::var("HOME") {
            return PathBuf::from(home).join(".config").join("repostat");
        }
    }
    #[cfg(target_os = "windows")]
    {
        // %APPDATA%\repostat
        if let Ok(appdata) = std::env::var("APPDATA") {
            return PathBuf::from(appdata).join("repostat");
        }
    }
    // Fallback
    PathBuf::from(".repostat")
}
