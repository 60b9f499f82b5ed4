use crate::error::Result;
use crate::git::GitRepo;
use crate::ingest::pipeline::{IngestOptions, IngestSummary, Ingestor};
use crate::ingest::reconcile::reconcile;
use crate::store::{Store, Table};
use chrono::Utc;
use serde::Serialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Serialize)]
pub struct BuildReport {
    pub store_path: PathBuf,
    pub head_sha: Option<String>,
    pub ingest: IngestSummary,
    /// `None` when the working-tree snapshot could not be read.
    pub removed_paths: Option<usize>,
    pub malformed_headers: usize,
    pub total_files: u64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum BuildOutcome {
    Reused { store_path: PathBuf },
    Built(BuildReport),
}

/// Reuses the store at `target` unless it is missing or `rebuild` is set.
pub fn ensure_store(
    repo: &GitRepo,
    target: &Path,
    rebuild: bool,
    options: IngestOptions,
) -> Result<BuildOutcome> {
    if !rebuild && target.is_file() {
        log::info!("Using cached store: {}", target.display());
        return Ok(BuildOutcome::Reused {
            store_path: target.to_path_buf(),
        });
    }
    build_store(repo, target, options).map(BuildOutcome::Built)
}

/// Builds a fresh store next to `target` and swaps it into place on success.
///
/// Readers of the old store keep a consistent view until the rename. A failed
/// history read leaves `target` untouched.
pub fn build_store(repo: &GitRepo, target: &Path, options: IngestOptions) -> Result<BuildReport> {
    let staging = staging_path(target);
    remove_store_files(&staging)?;
    log::info!("Building store for {} at {}", repo.path().display(), target.display());

    match populate(repo, &staging, target, options) {
        Ok(report) => {
            std::fs::rename(&staging, target)?;
            log::info!(
                "Store ready: {} commits, {} contributors, {} paths",
                report.ingest.commits,
                report.ingest.contributors,
                report.total_files
            );
            Ok(report)
        }
        Err(e) => {
            if let Err(cleanup) = remove_store_files(&staging) {
                log::warn!("Could not remove {}: {}", staging.display(), cleanup);
            }
            Err(e)
        }
    }
}

fn populate(repo: &GitRepo, staging: &Path, target: &Path, options: IngestOptions) -> Result<BuildReport> {
    let mut store = Store::create(staging)?;
    let range = options.range.clone();

    let mut history = repo.history(&range)?;
    let ingest = Ingestor::new(&mut store, options).run(&mut history)?;
    let malformed_headers = history.malformed_count();
    history.finish()?;

    let removed_paths = match repo.snapshot_paths() {
        Ok(snapshot) => Some(reconcile(&mut store, &snapshot)?),
        Err(e) => {
            log::warn!("Skipping working-tree reconciliation: {e}");
            None
        }
    };

    let head_sha = repo.head_sha();
    let total_files = store.count(Table::Files)?;
    let mut metadata = vec![
        ("repo_path", repo.path().to_string_lossy().to_string()),
        ("processed_at", Utc::now().to_rfc3339()),
        ("total_commits", store.count(Table::Commits)?.to_string()),
        ("total_contributors", store.count(Table::Contributors)?.to_string()),
        ("total_files", total_files.to_string()),
    ];
    if let Some(sha) = &head_sha {
        metadata.push(("head_sha", sha.clone()));
    }
    if let Some(since) = range.since {
        metadata.push(("since", since.to_rfc3339()));
    }
    if let Some(until) = range.until {
        metadata.push(("until", until.to_rfc3339()));
    }
    store.replace_metadata(&metadata)?;

    Ok(BuildReport {
        store_path: target.to_path_buf(),
        head_sha,
        ingest,
        removed_paths,
        malformed_headers,
        total_files,
    })
}

fn staging_path(target: &Path) -> PathBuf {
    let mut name = target
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".building");
    target.with_file_name(name)
}

fn remove_store_files(path: &Path) -> Result<()> {
    for suffix in ["", "-journal", "-wal", "-shm"] {
        let mut name = path.as_os_str().to_os_string();
        name.push(suffix);
        let file = PathBuf::from(name);
        if file.exists() {
            std::fs::remove_file(&file)?;
        }
    }
    Ok(())
}
