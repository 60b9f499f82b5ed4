use crate::error::{RepoVisError, Result};
use crate::model::{MetricDelta, SCHEMA_VERSION};
use chrono::NaiveDate;
use rusqlite::{params, Connection, OpenFlags, Transaction};
use std::path::Path;

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS contributors (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        name TEXT NOT NULL,
        email TEXT NOT NULL UNIQUE
    );
    CREATE TABLE IF NOT EXISTS files (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        path TEXT NOT NULL UNIQUE,
        parent_id INTEGER REFERENCES files(id) ON DELETE CASCADE,
        name TEXT NOT NULL,
        is_directory INTEGER NOT NULL
    );
    CREATE TABLE IF NOT EXISTS commits (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        sha TEXT NOT NULL UNIQUE,
        author_id INTEGER NOT NULL REFERENCES contributors(id),
        date TEXT NOT NULL,
        message TEXT NOT NULL
    );
    CREATE TABLE IF NOT EXISTS file_metrics (
        file_id INTEGER NOT NULL REFERENCES files(id) ON DELETE CASCADE,
        contributor_id INTEGER NOT NULL REFERENCES contributors(id),
        date TEXT NOT NULL,
        commit_count INTEGER NOT NULL DEFAULT 0 CHECK (commit_count >= 0),
        lines_added INTEGER NOT NULL DEFAULT 0 CHECK (lines_added >= 0),
        lines_deleted INTEGER NOT NULL DEFAULT 0 CHECK (lines_deleted >= 0),
        PRIMARY KEY (file_id, contributor_id, date)
    );
    CREATE TABLE IF NOT EXISTS metadata (
        key TEXT PRIMARY KEY,
        value TEXT NOT NULL
    );
    CREATE INDEX IF NOT EXISTS idx_files_parent ON files(parent_id);
    CREATE INDEX IF NOT EXISTS idx_commits_date ON commits(date);
    CREATE INDEX IF NOT EXISTS idx_metrics_date ON file_metrics(date);
    CREATE INDEX IF NOT EXISTS idx_metrics_contributor ON file_metrics(contributor_id);
";

/// SQLite-backed store for contributors, the path tree, commits, and metrics.
pub struct Store {
    conn: Connection,
}

impl Store {
    /// Creates a store at `path`. The target must not already hold data from another run.
    pub fn create<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir)?;
        }
        let conn = Connection::open(path)?;
        let mut store = Self { conn };
        store.initialize()?;
        Ok(store)
    }

    pub fn in_memory() -> Result<Self> {
        let mut store = Self {
            conn: Connection::open_in_memory()?,
        };
        store.initialize()?;
        Ok(store)
    }

    /// Opens an existing store read-only; a missing file is an error, never an empty store.
    pub fn open_read_only<P: AsRef<Path>>(path: P) -> Result<Connection> {
        let path = path.as_ref();
        if !path.is_file() {
            return Err(RepoVisError::StoreMissing(path.to_path_buf()));
        }
        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;
        check_schema_version(&conn)?;
        Ok(conn)
    }

    fn initialize(&mut self) -> Result<()> {
        self.conn.execute_batch(
            "PRAGMA foreign_keys = ON;
             PRAGMA synchronous = NORMAL;",
        )?;
        self.conn.execute_batch(SCHEMA)?;

        let user_version: i64 = self
            .conn
            .query_row("PRAGMA user_version;", [], |row| row.get(0))?;
        if user_version == 0 {
            self.conn
                .execute_batch(&format!("PRAGMA user_version = {SCHEMA_VERSION};"))?;
        }
        check_schema_version(&self.conn)
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    pub fn transaction(&mut self) -> Result<Transaction<'_>> {
        Ok(self.conn.transaction()?)
    }

    /// Replaces the whole metadata table.
    pub fn replace_metadata(&mut self, entries: &[(&str, String)]) -> Result<()> {
        let tx = self.conn.transaction()?;
        tx.execute("DELETE FROM metadata", [])?;
        {
            let mut stmt = tx.prepare("INSERT INTO metadata (key, value) VALUES (?, ?)")?;
            for (key, value) in entries {
                stmt.execute(params![key, value])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    pub fn file_paths(&self) -> Result<Vec<(i64, String)>> {
        let mut stmt = self.conn.prepare("SELECT id, path FROM files")?;
        let rows = stmt
            .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
            .collect::<rusqlite::Result<Vec<(i64, String)>>>()?;
        Ok(rows)
    }

    /// Hard-deletes nodes; their metric rows and descendants go with them.
    pub fn delete_files(&mut self, ids: &[i64]) -> Result<usize> {
        let tx = self.conn.transaction()?;
        let mut removed = 0;
        {
            let mut metrics = tx.prepare("DELETE FROM file_metrics WHERE file_id = ?")?;
            let mut files = tx.prepare("DELETE FROM files WHERE id = ?")?;
            for id in ids {
                metrics.execute(params![id])?;
                removed += files.execute(params![id])?;
            }
        }
        tx.commit()?;
        Ok(removed)
    }

    pub fn count(&self, table: Table) -> Result<u64> {
        let sql = format!("SELECT COUNT(*) FROM {}", table.name());
        let n: i64 = self.conn.query_row(&sql, [], |row| row.get(0))?;
        Ok(n as u64)
    }
}

#[derive(Debug, Clone, Copy)]
pub enum Table {
    Contributors,
    Files,
    Commits,
    FileMetrics,
}

impl Table {
    fn name(&self) -> &'static str {
        match self {
            Table::Contributors => "contributors",
            Table::Files => "files",
            Table::Commits => "commits",
            Table::FileMetrics => "file_metrics",
        }
    }
}

fn check_schema_version(conn: &Connection) -> Result<()> {
    let user_version: i64 = conn.query_row("PRAGMA user_version;", [], |row| row.get(0))?;
    if user_version != SCHEMA_VERSION as i64 {
        return Err(RepoVisError::Store(format!(
            "Schema version mismatch: expected {}, found {}",
            SCHEMA_VERSION, user_version
        )));
    }
    Ok(())
}

/// Insert-if-absent by email; returns the existing id on conflict.
pub fn insert_contributor(conn: &Connection, name: &str, email: &str) -> Result<i64> {
    conn.prepare_cached("INSERT OR IGNORE INTO contributors (name, email) VALUES (?, ?)")?
        .execute(params![name, email])?;
    let id = conn
        .prepare_cached("SELECT id FROM contributors WHERE email = ?")?
        .query_row(params![email], |row| row.get(0))?;
    Ok(id)
}

/// Insert-if-absent by path. `parent_id` must already be persisted.
pub fn insert_file(
    conn: &Connection,
    path: &str,
    parent_id: Option<i64>,
    name: &str,
    is_directory: bool,
) -> Result<i64> {
    conn.prepare_cached(
        "INSERT OR IGNORE INTO files (path, parent_id, name, is_directory) VALUES (?, ?, ?, ?)",
    )?
    .execute(params![path, parent_id, name, is_directory])?;
    let id = conn
        .prepare_cached("SELECT id FROM files WHERE path = ?")?
        .query_row(params![path], |row| row.get(0))?;
    Ok(id)
}

/// Insert-if-absent by revision id. Returns whether a row was written.
pub fn insert_commit(
    conn: &Connection,
    sha: &str,
    author_id: i64,
    date: NaiveDate,
    message: &str,
) -> Result<bool> {
    let inserted = conn
        .prepare_cached("INSERT OR IGNORE INTO commits (sha, author_id, date, message) VALUES (?, ?, ?, ?)")?
        .execute(params![sha, author_id, date, message])?;
    Ok(inserted > 0)
}

/// Additive merge: an existing row is incremented by `delta`, never overwritten.
pub fn merge_metric(
    conn: &Connection,
    file_id: i64,
    contributor_id: i64,
    date: NaiveDate,
    delta: &MetricDelta,
) -> Result<()> {
    conn.prepare_cached(
        "INSERT INTO file_metrics (file_id, contributor_id, date, commit_count, lines_added, lines_deleted)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)
         ON CONFLICT(file_id, contributor_id, date) DO UPDATE SET
             commit_count = commit_count + excluded.commit_count,
             lines_added = lines_added + excluded.lines_added,
             lines_deleted = lines_deleted + excluded.lines_deleted",
    )?
    .execute(params![
        file_id,
        contributor_id,
        date,
        delta.commit_count as i64,
        delta.lines_added as i64,
        delta.lines_deleted as i64
    ])?;
    Ok(())
}
