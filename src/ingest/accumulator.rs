use crate::error::{RepoVisError, Result};
use crate::ingest::resolver::{ContributorResolver, PathResolver};
use crate::model::{MetricDelta, ParsedCommit};
use crate::store::merge_metric;
use crate::util::ancestor_dirs;
use chrono::NaiveDate;
use rusqlite::Connection;
use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MetricKey {
    pub path: String,
    pub email: String,
    pub date: NaiveDate,
}

/// In-memory sums per (path, contributor, day) awaiting an additive flush.
///
/// Every touched file also adds its delta to each ancestor directory, once per
/// touched file. A commit changing two files under `a/` adds two to `a/`.
#[derive(Debug, Default)]
pub struct MetricsAccumulator {
    pending: HashMap<MetricKey, MetricDelta>,
}

impl MetricsAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn get(&self, path: &str, email: &str, date: NaiveDate) -> Option<&MetricDelta> {
        self.pending.get(&MetricKey {
            path: path.to_string(),
            email: email.to_string(),
            date,
        })
    }

    /// Adds one commit's changes. Returns the number of path events recorded.
    pub fn record(&mut self, commit: &ParsedCommit) -> usize {
        let date = commit.date();
        let mut events = 0;
        for changed in &commit.changed_paths {
            let delta = MetricDelta::touch(changed.added_lines, changed.deleted_lines);
            for dir in ancestor_dirs(&changed.path) {
                self.add(dir, &commit.author_email, date, &delta);
            }
            self.add(changed.path.clone(), &commit.author_email, date, &delta);
            events += 1;
        }
        events
    }

    fn add(&mut self, path: String, email: &str, date: NaiveDate, delta: &MetricDelta) {
        let key = MetricKey {
            path,
            email: email.to_string(),
            date,
        };
        self.pending.entry(key).or_default().add(delta);
    }

    /// Merges every pending sum into the store and empties the accumulator.
    ///
    /// Contributors must already be resolved; new paths are created shallowest first.
    pub fn flush(
        &mut self,
        conn: &Connection,
        paths: &mut PathResolver,
        people: &ContributorResolver,
    ) -> Result<usize> {
        if self.pending.is_empty() {
            return Ok(0);
        }
        paths.resolve_all(conn, self.pending.keys().map(|k| k.path.as_str()))?;

        let merged = self.pending.len();
        for (key, delta) in self.pending.drain() {
            let file_id = paths.resolve(conn, &key.path)?;
            let contributor_id = people.get(&key.email).ok_or_else(|| {
                RepoVisError::Store(format!("contributor {} was not resolved before flush", key.email))
            })?;
            merge_metric(conn, file_id, contributor_id, key.date, &delta)?;
        }
        Ok(merged)
    }
}
