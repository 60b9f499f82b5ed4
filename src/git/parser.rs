//! Parser for the textual history stream produced by `git log`.
//!
//! Each commit starts with one header line whose fields are joined by
//! [`FIELD_SEP`]: revision id, author name, author email, committer unix timestamp, subject.
//! The subject is the last field and keeps any further separators verbatim.
//! Every other non-blank line belongs to the current commit as a changed path,
//! either `added<TAB>deleted<TAB>path` (numstat) or a bare path.

use crate::error::{RepoVisError, Result};
use crate::model::{ChangedPath, ParsedCommit};
use crate::util::normalize_path;
use chrono::DateTime;
use std::io::BufRead;

/// ASCII unit separator; never appears in ordinary commit text.
pub const FIELD_SEP: char = '\u{1f}';

/// `--format` argument producing headers [`CommitStream`] understands.
pub const LOG_FORMAT: &str = "--format=%H%x1f%an%x1f%ae%x1f%ct%x1f%s";

const HEADER_FIELDS: usize = 5;

/// Lazy, single-pass iterator over the commits of a history stream.
///
/// Malformed headers are skipped together with their path lines; I/O errors end
/// the stream with an `Err` item.
pub struct CommitStream<R> {
    reader: R,
    buf: Vec<u8>,
    current: Option<ParsedCommit>,
    skipping: bool,
    malformed: usize,
    done: bool,
}

impl<R: BufRead> CommitStream<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            buf: Vec::with_capacity(512),
            current: None,
            skipping: false,
            malformed: 0,
            done: false,
        }
    }

    /// Number of headers dropped so far.
    pub fn malformed_count(&self) -> usize {
        self.malformed
    }

    fn next_line(&mut self) -> Result<Option<String>> {
        self.buf.clear();
        let n = self.reader.read_until(b'\n', &mut self.buf)?;
        if n == 0 {
            return Ok(None);
        }
        let line = String::from_utf8_lossy(&self.buf);
        Ok(Some(line.trim_end_matches(['\n', '\r']).to_string()))
    }
}

impl<R: BufRead> Iterator for CommitStream<R> {
    type Item = Result<ParsedCommit>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        loop {
            let line = match self.next_line() {
                Ok(Some(line)) => line,
                Ok(None) => {
                    self.done = true;
                    return self.current.take().map(Ok);
                }
                Err(e) => {
                    self.done = true;
                    return Some(Err(e));
                }
            };

            if line.trim().is_empty() {
                continue;
            }

            if line.contains(FIELD_SEP) {
                let finished = self.current.take();
                match parse_header(&line) {
                    Some(commit) => {
                        self.current = Some(commit);
                        self.skipping = false;
                    }
                    None => {
                        self.malformed += 1;
                        self.skipping = true;
                        log::warn!("Skipping malformed commit header: {:?}", preview(&line));
                    }
                }
                if let Some(commit) = finished {
                    return Some(Ok(commit));
                }
                continue;
            }

            if self.skipping {
                continue;
            }
            match self.current.as_mut() {
                Some(commit) => {
                    if let Some(changed) = parse_path_line(&line) {
                        commit.changed_paths.push(changed);
                    }
                }
                None => log::debug!("Ignoring path line before first header: {:?}", preview(&line)),
            }
        }
    }
}

fn parse_header(line: &str) -> Option<ParsedCommit> {
    let fields: Vec<&str> = line.splitn(HEADER_FIELDS, FIELD_SEP).collect();
    if fields.len() < HEADER_FIELDS {
        return None;
    }
    let id = fields[0].trim();
    if id.is_empty() {
        return None;
    }
    let secs: i64 = fields[3].trim().parse().ok()?;
    let timestamp = DateTime::from_timestamp(secs, 0)?;

    Some(ParsedCommit {
        id: id.to_string(),
        author_name: fields[1].to_string(),
        author_email: fields[2].to_string(),
        timestamp,
        subject: fields[4].to_string(),
        changed_paths: Vec::new(),
    })
}

/// Parses a numstat line or a bare path. Binary entries (`-`) count as zero lines.
pub fn parse_path_line(line: &str) -> Option<ChangedPath> {
    let mut parts = line.splitn(3, '\t');
    let first = parts.next().unwrap_or_default();
    let (added, deleted, raw_path) = match (parts.next(), parts.next()) {
        (Some(deleted), Some(path)) if is_count(first) && is_count(deleted) => {
            (count(first), count(deleted), path)
        }
        _ => (0, 0, line),
    };

    let path = normalize_path(&rename_target(&unquote(raw_path.trim())));
    if path.is_empty() {
        return None;
    }
    Some(ChangedPath {
        path,
        added_lines: added,
        deleted_lines: deleted,
    })
}

/// Decodes a C-quoted path (`"a\tb"`, `"d\303\251"`); anything else is returned as is.
fn unquote(path: &str) -> String {
    let Some(inner) = path
        .strip_prefix('"')
        .and_then(|p| p.strip_suffix('"'))
    else {
        return path.to_string();
    };

    let mut bytes = Vec::with_capacity(inner.len());
    let mut iter = inner.bytes().peekable();
    while let Some(b) = iter.next() {
        if b != b'\\' {
            bytes.push(b);
            continue;
        }
        match iter.next() {
            Some(b'n') => bytes.push(b'\n'),
            Some(b't') => bytes.push(b'\t'),
            Some(b'r') => bytes.push(b'\r'),
            Some(b'a') => bytes.push(0x07),
            Some(b'b') => bytes.push(0x08),
            Some(b'f') => bytes.push(0x0c),
            Some(b'v') => bytes.push(0x0b),
            Some(d @ b'0'..=b'7') => {
                let mut value = u32::from(d - b'0');
                for _ in 0..2 {
                    match iter.peek() {
                        Some(&n @ b'0'..=b'7') => {
                            value = value * 8 + u32::from(n - b'0');
                            iter.next();
                        }
                        _ => break,
                    }
                }
                bytes.push(value as u8);
            }
            Some(other) => bytes.push(other),
            None => bytes.push(b'\\'),
        }
    }
    String::from_utf8_lossy(&bytes).into_owned()
}

fn is_count(field: &str) -> bool {
    let field = field.trim();
    field == "-" || (!field.is_empty() && field.bytes().all(|b| b.is_ascii_digit()))
}

fn count(field: &str) -> u64 {
    field.trim().parse().unwrap_or(0)
}

/// Resolves numstat rename notation to the destination path:
/// `old => new` and `dir/{old => new}/file`.
fn rename_target(path: &str) -> String {
    if !path.contains(" => ") {
        return path.to_string();
    }
    if let (Some(open), Some(close)) = (path.find('{'), path.rfind('}')) {
        if open < close {
            let inner = &path[open + 1..close];
            if let Some((_, to)) = inner.split_once(" => ") {
                return format!("{}{}{}", &path[..open], to, &path[close + 1..]);
            }
        }
    }
    match path.split_once(" => ") {
        Some((_, to)) => to.to_string(),
        None => path.to_string(),
    }
}

fn preview(line: &str) -> String {
    line.chars().take(80).collect::<String>().replace(FIELD_SEP, "|")
}

/// Collects a whole stream, failing on the first I/O error.
pub fn parse_all<R: BufRead>(reader: R) -> Result<Vec<ParsedCommit>> {
    CommitStream::new(reader)
        .collect::<Result<Vec<_>>>()
        .map_err(|e| RepoVisError::History(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn header(id: &str, name: &str, email: &str, ts: i64, subject: &str) -> String {
        format!("{id}\u{1f}{name}\u{1f}{email}\u{1f}{ts}\u{1f}{subject}")
    }

    #[test]
    fn parses_commits_with_numstat_and_bare_paths() {
        let text = format!(
            "{}\n\n2\t0\ta/b.txt\n\n{}\n\n0\t1\ta/b.txt\n3\t0\ta/c.txt\nREADME\n",
            header("c1", "alice", "alice@x", 1704110400, "first"),
            header("c2", "bob", "bob@x", 1704196800, "second"),
        );
        let commits = parse_all(Cursor::new(text)).unwrap();
        assert_eq!(commits.len(), 2);
        assert_eq!(commits[0].id, "c1");
        assert_eq!(commits[0].changed_paths.len(), 1);
        assert_eq!(commits[0].changed_paths[0].added_lines, 2);
        assert_eq!(commits[1].author_email, "bob@x");
        let paths: Vec<_> = commits[1].changed_paths.iter().map(|c| c.path.as_str()).collect();
        assert_eq!(paths, vec!["a/b.txt", "a/c.txt", "README"]);
        assert_eq!(commits[1].changed_paths[2].added_lines, 0);
    }

    #[test]
    fn subject_keeps_extra_separators() {
        let text = header("c1", "alice", "a@x", 0, "fix\u{1f}weird\u{1f}subject");
        let commits = parse_all(Cursor::new(text)).unwrap();
        assert_eq!(commits[0].subject, "fix\u{1f}weird\u{1f}subject");
    }

    #[test]
    fn commit_without_paths_is_emitted() {
        let text = format!(
            "{}\n{}\n1\t1\tx.rs\n",
            header("merge", "m", "m@x", 10, "Merge branch"),
            header("c2", "m", "m@x", 20, "edit"),
        );
        let commits = parse_all(Cursor::new(text)).unwrap();
        assert_eq!(commits.len(), 2);
        assert!(commits[0].changed_paths.is_empty());
        assert_eq!(commits[1].changed_paths.len(), 1);
    }

    #[test]
    fn malformed_header_is_dropped_with_its_paths() {
        let text = format!(
            "{}\n1\t0\tok.txt\nbroken\u{1f}only\u{1f}three\n5\t5\tlost.txt\n{}\n1\t0\tkept.txt\n",
            header("c1", "a", "a@x", 10, "one"),
            header("c3", "a", "a@x", 30, "three"),
        );
        let mut stream = CommitStream::new(Cursor::new(text));
        let commits: Vec<_> = stream.by_ref().map(|c| c.unwrap()).collect();
        assert_eq!(stream.malformed_count(), 1);
        assert_eq!(commits.len(), 2);
        assert_eq!(commits[0].changed_paths[0].path, "ok.txt");
        assert_eq!(commits[1].id, "c3");
        assert_eq!(commits[1].changed_paths[0].path, "kept.txt");
    }

    #[test]
    fn non_numeric_timestamp_is_malformed() {
        let text = header("c1", "a", "a@x", 0, "x").replace("\u{1f}0\u{1f}", "\u{1f}soon\u{1f}");
        let mut stream = CommitStream::new(Cursor::new(text));
        assert!(stream.next().is_none());
        assert_eq!(stream.malformed_count(), 1);
    }

    #[test]
    fn binary_and_renamed_paths() {
        let bin = parse_path_line("-\t-\tassets/logo.png").unwrap();
        assert_eq!((bin.added_lines, bin.deleted_lines), (0, 0));
        assert_eq!(bin.path, "assets/logo.png");

        let moved = parse_path_line("4\t1\tsrc/{old => new}/lib.rs").unwrap();
        assert_eq!(moved.path, "src/new/lib.rs");
        let moved = parse_path_line("0\t0\told.txt => docs/new.txt").unwrap();
        assert_eq!(moved.path, "docs/new.txt");
        let emptied = parse_path_line("1\t0\tsrc/{ => util}/mod.rs").unwrap();
        assert_eq!(emptied.path, "src/util/mod.rs");
    }

    #[test]
    fn quoted_paths_are_decoded() {
        let accented = parse_path_line("1\t0\t\"d\\303\\251/caf\\303\\251.txt\"").unwrap();
        assert_eq!(accented.path, "dé/café.txt");
        assert_eq!(accented.added_lines, 1);

        let tabbed = parse_path_line("2\t0\t\"odd\\tname \\\"q\\\".txt\"").unwrap();
        assert_eq!(tabbed.path, "odd\tname \"q\".txt");

        let plain = parse_path_line("0\t0\tdé/plain.txt").unwrap();
        assert_eq!(plain.path, "dé/plain.txt");
    }
}
