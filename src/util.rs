use chrono::{DateTime, SecondsFormat, Utc};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};

/// Every ancestor directory of `path`, shallowest first, each with a trailing `/`.
///
/// `a/b/c.txt` yields `a/`, `a/b/`. A directory path does not list itself.
pub fn ancestor_dirs(path: &str) -> Vec<String> {
    let trimmed = path.trim_end_matches('/');
    let mut dirs = Vec::new();
    for (idx, ch) in trimmed.char_indices() {
        if ch == '/' && idx > 0 {
            dirs.push(trimmed[..=idx].to_string());
        }
    }
    dirs
}

/// Number of ancestors above `path`; top-level entries have depth 0.
pub fn depth(path: &str) -> usize {
    path.trim_end_matches('/').matches('/').count()
}

pub fn parent_dir(path: &str) -> Option<String> {
    let trimmed = path.trim_end_matches('/');
    trimmed.rfind('/').map(|idx| trimmed[..=idx].to_string())
}

pub fn display_name(path: &str) -> &str {
    let trimmed = path.trim_end_matches('/');
    match trimmed.rfind('/') {
        Some(idx) => &trimmed[idx + 1..],
        None => trimmed,
    }
}

pub fn is_directory_path(path: &str) -> bool {
    path.ends_with('/')
}

/// Strips `./` prefixes and repeated separators so equal paths compare equal.
pub fn normalize_path(path: &str) -> String {
    let is_dir = path.ends_with('/');
    let joined = path
        .split('/')
        .filter(|seg| !seg.is_empty() && *seg != ".")
        .collect::<Vec<_>>()
        .join("/");
    if is_dir && !joined.is_empty() {
        format!("{joined}/")
    } else {
        joined
    }
}

/// Deterministic store file for a repository and optional ingest window.
///
/// The digest covers the repository path and the exact bounds, so windows that
/// differ by any amount never share a file.
pub fn store_path(
    cache_dir: Option<&Path>,
    repo_path: &Path,
    since: Option<DateTime<Utc>>,
    until: Option<DateTime<Utc>>,
) -> PathBuf {
    let dir = match cache_dir {
        Some(dir) => dir.to_path_buf(),
        None => repo_path.join(".repovis"),
    };
    let repo_name = repo_path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| "repo".to_string());

    let exact = |d: Option<DateTime<Utc>>| {
        d.map(|d| d.to_rfc3339_opts(SecondsFormat::Nanos, true))
            .unwrap_or_default()
    };
    let mut hasher = Sha256::new();
    hasher.update(repo_path.to_string_lossy().as_bytes());
    hasher.update([0]);
    hasher.update(exact(since).as_bytes());
    hasher.update([0]);
    hasher.update(exact(until).as_bytes());
    let hash: String = hasher
        .finalize()
        .iter()
        .take(8)
        .map(|b| format!("{b:02x}"))
        .collect();

    let mut name = format!("{repo_name}_{hash}");
    if since.is_some() || until.is_some() {
        let bound = |d: Option<DateTime<Utc>>| {
            d.map(|d| d.format("%Y%m%dT%H%M%S").to_string())
                .unwrap_or_else(|| "open".to_string())
        };
        name.push_str(&format!("_{}_{}", bound(since), bound(until)));
    }
    dir.join(format!("{name}.db"))
}
