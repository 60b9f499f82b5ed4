use crate::error::{RepoVisError, Result};
use crate::model::{
    CommitDateRange, Contributor, ContributorFilter, DateWindow, FileDetail, FileNode, Metadata,
    MetricDelta, MetricSelector, NodeMetrics, TimelineBucket, TopContributor, TreeEntry, TreeOutput,
};
use crate::store::Store;
use rusqlite::{params, params_from_iter, OptionalExtension, Row, ToSql, Transaction};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

const TOP_CONTRIBUTORS: i64 = 10;

/// Read-only queries over a built store.
///
/// Holds no connection between calls; every query opens its own read
/// transaction, so one service can be shared across threads.
#[derive(Debug, Clone)]
pub struct QueryService {
    path: PathBuf,
}

impl QueryService {
    /// Fails with `StoreMissing` if nothing has been built at `path`.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        Store::open_read_only(&path)?;
        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read<T>(&self, f: impl FnOnce(&Transaction<'_>) -> Result<T>) -> Result<T> {
        let mut conn = Store::open_read_only(&self.path)?;
        let tx = conn.transaction()?;
        let out = f(&tx)?;
        tx.commit()?;
        Ok(out)
    }

    /// Every node, plus summed metrics inside `window` when it has a bound.
    /// Nodes without matching rows carry `metrics: None`.
    pub fn get_tree(
        &self,
        window: &DateWindow,
        filter: &ContributorFilter,
        selector: MetricSelector,
    ) -> Result<TreeOutput> {
        self.read(|tx| {
            let nodes = {
                let mut stmt = tx.prepare(
                    "SELECT id, path, parent_id, name, is_directory FROM files ORDER BY path",
                )?;
                let rows = stmt.query_map([], file_node)?;
                rows.collect::<rusqlite::Result<Vec<_>>>()?
            };

            let metrics = if window.is_unbounded() {
                HashMap::new()
            } else {
                windowed_metrics(tx, window, filter)?
            };

            let files = nodes
                .into_iter()
                .map(|node| {
                    let metrics = metrics.get(&node.id).map(|totals| NodeMetrics {
                        commit_count: totals.commit_count,
                        lines_added: totals.lines_added,
                        lines_deleted: totals.lines_deleted,
                        value: selector.pick(totals),
                    });
                    TreeEntry { node, metrics }
                })
                .collect();

            Ok(TreeOutput {
                files,
                date_range: commit_date_range(tx)?,
                metric_type: selector,
            })
        })
    }

    /// Commits per day, oldest first.
    pub fn get_timeline(&self, window: &DateWindow) -> Result<Vec<TimelineBucket>> {
        self.read(|tx| {
            let mut sql = String::from("SELECT date, COUNT(*) FROM commits WHERE 1=1");
            let mut to_bind: Vec<Box<dyn ToSql>> = Vec::new();
            push_window(&mut sql, &mut to_bind, window);
            sql.push_str(" GROUP BY date ORDER BY date");

            let mut stmt = tx.prepare(&sql)?;
            let rows = stmt.query_map(params_from_iter(to_bind.iter()), |row| {
                Ok(TimelineBucket {
                    date: row.get(0)?,
                    count: as_count(row.get(1)?),
                })
            })?;
            Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
        })
    }

    pub fn get_contributors(&self) -> Result<Vec<Contributor>> {
        self.read(|tx| {
            let mut stmt = tx.prepare("SELECT id, name, email FROM contributors ORDER BY name, id")?;
            let rows = stmt.query_map([], |row| {
                Ok(Contributor {
                    id: row.get(0)?,
                    name: row.get(1)?,
                    email: row.get(2)?,
                })
            })?;
            Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
        })
    }

    /// Node attributes and its ten most active contributors by commit count.
    /// Ties are broken by contributor id.
    pub fn get_file_detail(&self, node_id: i64) -> Result<FileDetail> {
        self.read(|tx| {
            let node = tx
                .query_row(
                    "SELECT id, path, parent_id, name, is_directory FROM files WHERE id = ?",
                    params![node_id],
                    file_node,
                )
                .optional()?
                .ok_or(RepoVisError::NotFound(node_id))?;

            let mut stmt = tx.prepare(
                "SELECT c.id, c.name, c.email, SUM(fm.commit_count) AS total
                 FROM file_metrics fm
                 JOIN contributors c ON fm.contributor_id = c.id
                 WHERE fm.file_id = ?
                 GROUP BY c.id
                 ORDER BY total DESC, c.id ASC
                 LIMIT ?",
            )?;
            let top_contributors = stmt
                .query_map(params![node_id, TOP_CONTRIBUTORS], |row| {
                    Ok(TopContributor {
                        id: row.get(0)?,
                        name: row.get(1)?,
                        email: row.get(2)?,
                        commits: as_count(row.get(3)?),
                    })
                })?
                .collect::<rusqlite::Result<Vec<_>>>()?;

            Ok(FileDetail {
                node,
                top_contributors,
            })
        })
    }

    pub fn get_metadata(&self) -> Result<Metadata> {
        self.read(|tx| {
            let mut stmt = tx.prepare("SELECT key, value FROM metadata")?;
            let rows = stmt.query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?;
            Ok(rows.collect::<rusqlite::Result<Metadata>>()?)
        })
    }
}

fn file_node(row: &Row<'_>) -> rusqlite::Result<FileNode> {
    Ok(FileNode {
        id: row.get(0)?,
        path: row.get(1)?,
        parent_id: row.get(2)?,
        name: row.get(3)?,
        is_directory: row.get(4)?,
    })
}

fn windowed_metrics(
    tx: &Transaction<'_>,
    window: &DateWindow,
    filter: &ContributorFilter,
) -> Result<HashMap<i64, MetricDelta>> {
    let mut sql = String::from(
        "SELECT file_id, SUM(commit_count), SUM(lines_added), SUM(lines_deleted)
         FROM file_metrics WHERE 1=1",
    );
    let mut to_bind: Vec<Box<dyn ToSql>> = Vec::new();
    push_window(&mut sql, &mut to_bind, window);

    let (ids, negate) = match filter {
        ContributorFilter::All => (&[][..], false),
        ContributorFilter::Include(ids) => (ids.as_slice(), false),
        ContributorFilter::Exclude(ids) => (ids.as_slice(), true),
    };
    if !ids.is_empty() {
        let placeholders = vec!["?"; ids.len()].join(",");
        let op = if negate { "NOT IN" } else { "IN" };
        sql.push_str(&format!(" AND contributor_id {op} ({placeholders})"));
        for id in ids {
            to_bind.push(Box::new(*id));
        }
    }
    sql.push_str(" GROUP BY file_id");

    let mut stmt = tx.prepare(&sql)?;
    let rows = stmt.query_map(params_from_iter(to_bind.iter()), |row| {
        Ok((
            row.get::<_, i64>(0)?,
            MetricDelta {
                commit_count: as_count(row.get(1)?),
                lines_added: as_count(row.get(2)?),
                lines_deleted: as_count(row.get(3)?),
            },
        ))
    })?;
    Ok(rows.collect::<rusqlite::Result<HashMap<_, _>>>()?)
}

fn push_window(sql: &mut String, to_bind: &mut Vec<Box<dyn ToSql>>, window: &DateWindow) {
    if let Some(start) = window.start {
        sql.push_str(" AND date >= ?");
        to_bind.push(Box::new(start));
    }
    if let Some(end) = window.end {
        sql.push_str(" AND date <= ?");
        to_bind.push(Box::new(end));
    }
}

fn commit_date_range(tx: &Transaction<'_>) -> Result<CommitDateRange> {
    Ok(tx.query_row("SELECT MIN(date), MAX(date) FROM commits", [], |row| {
        Ok(CommitDateRange {
            min_date: row.get(0)?,
            max_date: row.get(1)?,
        })
    })?)
}

fn as_count(value: i64) -> u64 {
    value.max(0) as u64
}
