use crate::error::Result;
use crate::ingest::accumulator::MetricsAccumulator;
use crate::ingest::resolver::{ContributorResolver, PathResolver};
use crate::model::{DateRange, ParsedCommit};
use crate::store::{insert_commit, Store};
use chrono::NaiveDate;
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use std::collections::HashSet;

pub const DEFAULT_BATCH_SIZE: usize = 1000;

#[derive(Debug, Clone)]
pub struct IngestOptions {
    /// Commits processed between flushes.
    pub batch_size: usize,
    /// Commits outside this range are skipped.
    pub range: DateRange,
    pub progress: bool,
}

impl Default for IngestOptions {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            range: DateRange::new(),
            progress: false,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IngestSummary {
    pub commits: usize,
    pub duplicates: usize,
    pub out_of_range: usize,
    pub path_events: usize,
    pub flushes: usize,
    pub contributors: usize,
    pub files: usize,
}

struct PendingCommit {
    sha: String,
    author_name: String,
    author_email: String,
    date: NaiveDate,
    message: String,
}

/// One ingestion run: owns the run-scoped caches and writes to a single store.
pub struct Ingestor<'s> {
    store: &'s mut Store,
    options: IngestOptions,
    paths: PathResolver,
    people: ContributorResolver,
    metrics: MetricsAccumulator,
    pending: Vec<PendingCommit>,
    seen: HashSet<String>,
    summary: IngestSummary,
}

impl<'s> Ingestor<'s> {
    pub fn new(store: &'s mut Store, options: IngestOptions) -> Self {
        let batch_size = options.batch_size.max(1);
        Self {
            store,
            options: IngestOptions { batch_size, ..options },
            paths: PathResolver::new(),
            people: ContributorResolver::new(),
            metrics: MetricsAccumulator::new(),
            pending: Vec::with_capacity(batch_size),
            seen: HashSet::new(),
            summary: IngestSummary::default(),
        }
    }

    /// Consumes the stream to its end, flushing every `batch_size` commits and once
    /// more at the end. The first stream error aborts the run.
    pub fn run<I>(mut self, commits: I) -> Result<IngestSummary>
    where
        I: IntoIterator<Item = Result<ParsedCommit>>,
    {
        let pb = if self.options.progress {
            let pb = ProgressBar::new_spinner();
            pb.set_style(
                ProgressStyle::default_spinner()
                    .template("{spinner:.green} {msg} [{pos} commits]")
                    .unwrap_or_else(|_| ProgressStyle::default_spinner()),
            );
            pb.set_message("Ingesting history...");
            pb
        } else {
            ProgressBar::hidden()
        };

        for item in commits {
            let commit = item?;
            self.record(commit);
            pb.set_position(self.summary.commits as u64);
            if self.pending.len() >= self.options.batch_size {
                self.flush()?;
            }
        }
        self.flush()?;
        pb.finish_with_message("History ingested");

        self.summary.contributors = self.people.count();
        self.summary.files = self.paths.count();
        log::info!(
            "Ingested {} commits ({} duplicates, {} out of range) in {} flushes",
            self.summary.commits,
            self.summary.duplicates,
            self.summary.out_of_range,
            self.summary.flushes
        );
        Ok(self.summary)
    }

    fn record(&mut self, commit: ParsedCommit) {
        if !self.options.range.contains(&commit.timestamp) {
            self.summary.out_of_range += 1;
            return;
        }
        if !self.seen.insert(commit.id.clone()) {
            log::debug!("Revision {} already ingested in this run", commit.id);
            self.summary.duplicates += 1;
            return;
        }

        self.summary.path_events += self.metrics.record(&commit);
        self.summary.commits += 1;
        self.pending.push(PendingCommit {
            date: commit.date(),
            message: commit.truncated_message(),
            sha: commit.id,
            author_name: commit.author_name,
            author_email: commit.author_email,
        });
    }

    fn flush(&mut self) -> Result<()> {
        if self.pending.is_empty() && self.metrics.is_empty() {
            return Ok(());
        }
        let tx = self.store.transaction()?;
        for commit in &self.pending {
            let author_id = self.people.resolve(&tx, &commit.author_name, &commit.author_email)?;
            insert_commit(&tx, &commit.sha, author_id, commit.date, &commit.message)?;
        }
        let merged = self.metrics.flush(&tx, &mut self.paths, &self.people)?;
        tx.commit()?;

        self.summary.flushes += 1;
        log::debug!(
            "Flush #{}: {} commits, {} metric rows merged",
            self.summary.flushes,
            self.pending.len(),
            merged
        );
        self.pending.clear();
        Ok(())
    }
}
