use crate::error::{RepoVisError, Result};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub const SCHEMA_VERSION: u32 = 1;

/// Maximum number of characters of a commit subject kept in the store.
pub const MAX_MESSAGE_CHARS: usize = 500;

/// One file touched by a commit, as reported by `git log --numstat`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangedPath {
    pub path: String,
    pub added_lines: u64,
    pub deleted_lines: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParsedCommit {
    pub id: String,
    pub author_name: String,
    pub author_email: String,
    /// Committer time; drives day bucketing and range filtering.
    pub timestamp: DateTime<Utc>,
    pub subject: String,
    pub changed_paths: Vec<ChangedPath>,
}

impl ParsedCommit {
    /// Calendar day the commit is bucketed into.
    pub fn date(&self) -> NaiveDate {
        self.timestamp.date_naive()
    }

    pub fn truncated_message(&self) -> String {
        self.subject.chars().take(MAX_MESSAGE_CHARS).collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contributor {
    pub id: i64,
    pub name: String,
    pub email: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileNode {
    pub id: i64,
    pub path: String,
    pub parent_id: Option<i64>,
    pub name: String,
    pub is_directory: bool,
}

/// Additive counters shared by the accumulator and the store.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricDelta {
    pub commit_count: u64,
    pub lines_added: u64,
    pub lines_deleted: u64,
}

impl MetricDelta {
    pub fn touch(added: u64, deleted: u64) -> Self {
        Self {
            commit_count: 1,
            lines_added: added,
            lines_deleted: deleted,
        }
    }

    pub fn add(&mut self, other: &MetricDelta) {
        self.commit_count += other.commit_count;
        self.lines_added += other.lines_added;
        self.lines_deleted += other.lines_deleted;
    }
}

/// Which summed column a tree query surfaces as the comparable `value`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricSelector {
    #[default]
    CommitCount,
    LinesAdded,
    LinesDeleted,
}

impl MetricSelector {
    /// Unknown or absent names select `CommitCount`.
    pub fn from_name(name: Option<&str>) -> Self {
        match name.map(str::trim) {
            Some("lines_added") => MetricSelector::LinesAdded,
            Some("lines_deleted") => MetricSelector::LinesDeleted,
            _ => MetricSelector::CommitCount,
        }
    }

    pub fn pick(&self, totals: &MetricDelta) -> u64 {
        match self {
            MetricSelector::CommitCount => totals.commit_count,
            MetricSelector::LinesAdded => totals.lines_added,
            MetricSelector::LinesDeleted => totals.lines_deleted,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum ContributorFilter {
    #[default]
    All,
    Include(Vec<i64>),
    Exclude(Vec<i64>),
}

impl ContributorFilter {
    /// Builds a filter from comma-separated id lists. The inclusion list wins when both
    /// are given; a non-numeric entry is rejected.
    pub fn parse(include: Option<&str>, exclude: Option<&str>) -> Result<Self> {
        if let Some(list) = include {
            let ids = parse_id_list(list)?;
            if !ids.is_empty() {
                return Ok(ContributorFilter::Include(ids));
            }
        }
        if let Some(list) = exclude {
            let ids = parse_id_list(list)?;
            if !ids.is_empty() {
                return Ok(ContributorFilter::Exclude(ids));
            }
        }
        Ok(ContributorFilter::All)
    }
}

fn parse_id_list(list: &str) -> Result<Vec<i64>> {
    list.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            s.parse::<i64>()
                .map_err(|_| RepoVisError::InvalidParameter(format!("contributor id '{s}' is not an integer")))
        })
        .collect()
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DateWindow {
    pub start: Option<NaiveDate>,
    pub end: Option<NaiveDate>,
}

impl DateWindow {
    pub fn new(start: Option<NaiveDate>, end: Option<NaiveDate>) -> Self {
        Self { start, end }
    }

    pub fn parse(start: Option<&str>, end: Option<&str>) -> Result<Self> {
        let window = Self {
            start: start.map(parse_day).transpose()?,
            end: end.map(parse_day).transpose()?,
        };
        if let (Some(s), Some(e)) = (window.start, window.end) {
            if s > e {
                return Err(RepoVisError::InvalidDate(format!(
                    "start date {s} is after end date {e}"
                )));
            }
        }
        Ok(window)
    }

    pub fn is_unbounded(&self) -> bool {
        self.start.is_none() && self.end.is_none()
    }
}

fn parse_day(input: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(input.trim(), "%Y-%m-%d")
        .map_err(|_| RepoVisError::InvalidDate(format!("'{input}' is not a YYYY-MM-DD date")))
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeMetrics {
    pub commit_count: u64,
    pub lines_added: u64,
    pub lines_deleted: u64,
    pub value: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreeEntry {
    #[serde(flatten)]
    pub node: FileNode,
    pub metrics: Option<NodeMetrics>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitDateRange {
    pub min_date: Option<NaiveDate>,
    pub max_date: Option<NaiveDate>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreeOutput {
    pub files: Vec<TreeEntry>,
    pub date_range: CommitDateRange,
    pub metric_type: MetricSelector,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimelineBucket {
    pub date: NaiveDate,
    pub count: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopContributor {
    pub id: i64,
    pub name: String,
    pub email: String,
    pub commits: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileDetail {
    #[serde(flatten)]
    pub node: FileNode,
    pub top_contributors: Vec<TopContributor>,
}

pub type Metadata = BTreeMap<String, String>;

#[derive(Debug, Clone)]
pub struct DateRange {
    pub since: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
}

impl DateRange {
    pub fn new() -> Self {
        Self { since: None, until: None }
    }

    pub fn with_since(mut self, since: DateTime<Utc>) -> Self {
        self.since = Some(since);
        self
    }

    pub fn with_until(mut self, until: DateTime<Utc>) -> Self {
        self.until = Some(until);
        self
    }

    pub fn contains(&self, timestamp: &DateTime<Utc>) -> bool {
        if let Some(since) = self.since {
            if timestamp < &since {
                return false;
            }
        }
        if let Some(until) = self.until {
            if timestamp > &until {
                return false;
            }
        }
        true
    }
}

impl Default for DateRange {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn selector_falls_back_to_commit_count() {
        assert_eq!(MetricSelector::from_name(Some("lines_added")), MetricSelector::LinesAdded);
        assert_eq!(MetricSelector::from_name(Some("lines_deleted")), MetricSelector::LinesDeleted);
        assert_eq!(MetricSelector::from_name(Some("bogus")), MetricSelector::CommitCount);
        assert_eq!(MetricSelector::from_name(None), MetricSelector::CommitCount);
    }

    #[test]
    fn filter_prefers_inclusion() {
        let f = ContributorFilter::parse(Some("1, 2"), Some("3")).unwrap();
        assert_eq!(f, ContributorFilter::Include(vec![1, 2]));
        let f = ContributorFilter::parse(None, Some("3,")).unwrap();
        assert_eq!(f, ContributorFilter::Exclude(vec![3]));
        assert_eq!(ContributorFilter::parse(Some(""), None).unwrap(), ContributorFilter::All);
    }

    #[test]
    fn filter_rejects_non_numeric_ids() {
        let err = ContributorFilter::parse(Some("1,bob"), None).unwrap_err();
        assert!(err.is_client_error());
        assert!(ContributorFilter::parse(None, Some("x")).is_err());
    }

    #[test]
    fn window_rejects_inverted_bounds() {
        assert!(DateWindow::parse(Some("2024-02-01"), Some("2024-01-01")).is_err());
        assert!(DateWindow::parse(Some("01/02/2024"), None).is_err());
        let w = DateWindow::parse(None, Some("2024-01-01")).unwrap();
        assert!(!w.is_unbounded());
    }

    #[test]
    fn message_is_truncated_by_characters() {
        let commit = ParsedCommit {
            id: "abc".into(),
            author_name: "a".into(),
            author_email: "a@x".into(),
            timestamp: Utc.with_ymd_and_hms(2024, 1, 1, 23, 59, 0).unwrap(),
            subject: "é".repeat(600),
            changed_paths: Vec::new(),
        };
        assert_eq!(commit.truncated_message().chars().count(), MAX_MESSAGE_CHARS);
        assert_eq!(commit.date(), NaiveDate::from_ymd_opt(2024, 1, 1).unwrap());
    }
}
