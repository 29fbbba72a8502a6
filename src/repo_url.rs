//! Canonical repository URL from an import path.
//!
//! Host rules only, no network: the well-known code hosts all serve the
//! repository at `https://<host>/<owner>/<name>` for import paths of the
//! form `<host>/<owner>/<name>[/...]`.

use once_cell::sync::Lazy;
use regex::Regex;

static KNOWN_HOST: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^(?P<host>github\.com|gitlab\.com|bitbucket\.org|codeberg\.org|sr\.ht)/(?P<owner>[A-Za-z0-9._~-]+)/(?P<name>[A-Za-z0-9._~-]+)(?:/|$)",
    )
    .expect("host rule regex")
});

/// Resolve the canonical repository URL for an import path (or repository
/// root). Fails for hosts without a rule; callers treat that as "unknown".
pub fn repo_url_for_import_path(import_path: &str) -> anyhow::Result<String> {
    let caps = KNOWN_HOST
        .captures(import_path)
        .ok_or_else(|| anyhow::anyhow!("no repository URL rule for {import_path}"))?;
    Ok(format!(
        "https://{}/{}/{}",
        &caps["host"], &caps["owner"], &caps["name"]
    ))
}
