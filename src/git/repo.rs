use crate::error::{RepoVisError, Result};
use crate::git::parser::{CommitStream, LOG_FORMAT};
use crate::model::{DateRange, ParsedCommit};
use crate::util::normalize_path;
use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use gix::{discover, Repository};
use std::collections::HashSet;
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdout, Command, Stdio};
use std::thread::{self, JoinHandle};
use std::time::{Duration, SystemTime};

pub struct GitRepo {
    repo: Repository,
    path: PathBuf,
}

impl GitRepo {
    /// Open a repository at `path`, or current dir if `None`
    pub fn open<P: AsRef<Path>>(path: Option<P>) -> Result<Self> {
        let repo_path = match path {
            Some(p) => p.as_ref().to_path_buf(),
            None => std::env::current_dir()?,
        };

        let repo = discover(&repo_path)?;
        let path = repo.workdir().unwrap_or_else(|| repo.path()).to_path_buf();
        let path = path.canonicalize().unwrap_or(path);

        Ok(Self { repo, path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Starts `git log` over every ref and returns the parsed stream.
    ///
    /// Merges are diffed against their first parent. Paths are printed unquoted so
    /// they match the names seen by [`GitRepo::snapshot_paths`].
    pub fn history(&self, range: &DateRange) -> Result<History> {
        let mut cmd = Command::new("git");
        cmd.arg("-C")
            .arg(&self.path)
            .args(["-c", "core.quotePath=false"])
            .args([
                "log",
                "--all",
                "--numstat",
                "--diff-merges=first-parent",
                "--no-color",
                "--no-ext-diff",
                LOG_FORMAT,
            ]);
        if let Some(since) = range.since {
            cmd.arg(format!("--since={}", since.to_rfc3339()));
        }
        if let Some(until) = range.until {
            cmd.arg(format!("--until={}", until.to_rfc3339()));
        }

        let mut child = cmd
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| RepoVisError::History(format!("failed to start git log: {e}")))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| RepoVisError::History("git log stdout unavailable".to_string()))?;
        // stderr is drained on its own thread while stdout is streamed
        let stderr = child.stderr.take().map(|mut err| {
            thread::spawn(move || {
                let mut text = String::new();
                let _ = err.read_to_string(&mut text);
                text
            })
        });

        log::debug!("Spawned git log in {}", self.path.display());
        Ok(History {
            child: Some(child),
            stderr,
            stream: CommitStream::new(BufReader::new(stdout)),
        })
    }

    pub fn head_sha(&self) -> Option<String> {
        match self.head_commit() {
            Ok(commit) => Some(commit.id.to_string()),
            Err(e) => {
                log::debug!("HEAD has no commit: {e}");
                None
            }
        }
    }

    fn head_commit(&self) -> Result<gix::Commit<'_>> {
        let mut head = self.repo.head()?;
        Ok(head.peel_to_commit_in_place()?)
    }

    /// Every path in the HEAD tree; directories carry a trailing `/`.
    pub fn snapshot_paths(&self) -> Result<HashSet<String>> {
        let tree = self.head_commit()?.tree()?;
        let mut recorder = gix::traverse::tree::Recorder::default();
        tree.traverse().breadthfirst(&mut recorder)?;

        let mut paths = HashSet::with_capacity(recorder.records.len());
        for entry in recorder.records {
            let path = entry.filepath.to_string();
            if entry.mode.is_tree() {
                paths.insert(normalize_path(&format!("{path}/")));
            } else {
                paths.insert(normalize_path(&path));
            }
        }
        Ok(paths)
    }
}

/// A running `git log` whose output is consumed commit by commit.
pub struct History {
    child: Option<Child>,
    stderr: Option<JoinHandle<String>>,
    stream: CommitStream<BufReader<ChildStdout>>,
}

impl History {
    pub fn malformed_count(&self) -> usize {
        self.stream.malformed_count()
    }

    /// Waits for git to exit; a non-zero status is a failed history read.
    pub fn finish(mut self) -> Result<()> {
        let Some(mut child) = self.child.take() else {
            return Ok(());
        };
        let status = child.wait()?;
        let stderr = self
            .stderr
            .take()
            .and_then(|handle| handle.join().ok())
            .unwrap_or_default();
        if !status.success() {
            return Err(RepoVisError::History(format!(
                "git log exited with {status}: {}",
                stderr.trim()
            )));
        }
        Ok(())
    }
}

impl Iterator for History {
    type Item = Result<ParsedCommit>;

    fn next(&mut self) -> Option<Self::Item> {
        self.stream.next()
    }
}

impl Drop for History {
    fn drop(&mut self) {
        if let Some(mut child) = self.child.take() {
            let _ = child.kill();
            let _ = child.wait();
        }
        if let Some(handle) = self.stderr.take() {
            let _ = handle.join();
        }
    }
}

pub fn resolve_range(since: Option<&str>, until: Option<&str>) -> Result<DateRange> {
    let mut range = DateRange::new();

    let since_dt = since.map(|s| parse_date(s, false)).transpose()?;
    let until_dt = until.map(|u| parse_date(u, true)).transpose()?;

    if let (Some(s), Some(u)) = (since_dt, until_dt) {
        if s > u {
            return Err(RepoVisError::InvalidDate(format!(
                "Invalid range: since ({}) is after until ({})",
                s, u
            )));
        }
    }

    if let Some(s) = since_dt {
        range = range.with_since(s);
    }
    if let Some(u) = until_dt {
        range = range.with_until(u);
    }

    Ok(range)
}

/// A bare `YYYY-MM-DD` used as an upper bound covers the whole day.
fn parse_date(input: &str, end_of_day: bool) -> Result<DateTime<Utc>> {
    // RFC3339
    if let Ok(dt) = DateTime::parse_from_rfc3339(input) {
        return Ok(dt.with_timezone(&Utc));
    }

    // YYYY-MM-DD
    if let Ok(date) = NaiveDate::parse_from_str(input, "%Y-%m-%d") {
        let time = if end_of_day {
            date.and_hms_opt(23, 59, 59)
        } else {
            date.and_hms_opt(0, 0, 0)
        };
        if let Some(datetime) = time {
            return Ok(Utc.from_utc_datetime(&datetime));
        }
    }

    // Relative duration (e.g. "2 weeks ago"), truncated to the start of that UTC day
    if let Some(duration) = parse_natural_duration(input) {
        let target = SystemTime::now()
            .checked_sub(duration)
            .ok_or_else(|| RepoVisError::InvalidDate(format!("Duration overflow for '{input}'")))?;
        let day = DateTime::<Utc>::from(target).date_naive();
        if let Some(start) = day.and_hms_opt(0, 0, 0) {
            return Ok(Utc.from_utc_datetime(&start));
        }
    }

    Err(RepoVisError::InvalidDate(format!(
        "'{input}' is not RFC3339, YYYY-MM-DD, or 'N days|weeks|months ago'"
    )))
}

fn parse_natural_duration(input: &str) -> Option<Duration> {
    let input = input.trim().to_lowercase();

    if let Some(days) = input.strip_suffix(" days ago") {
        if let Ok(n) = days.trim().parse::<u64>() {
            return Some(Duration::from_secs(n * 86400));
        }
    }

    if let Some(weeks) = input.strip_suffix(" weeks ago") {
        if let Ok(n) = weeks.trim().parse::<u64>() {
            return Some(Duration::from_secs(n * 7 * 86400));
        }
    }

    if let Some(months) = input.strip_suffix(" months ago") {
        if let Ok(n) = months.trim().parse::<u64>() {
            return Some(Duration::from_secs(n * 30 * 86400));
        }
    }

    None
}
