//! Run-scoped identity caches mapping paths and emails to store ids.
//!
//! Neither cache is authoritative beyond the run that owns it; the store is.

use crate::error::Result;
use crate::store::{insert_contributor, insert_file};
use crate::util::{depth, display_name, is_directory_path, parent_dir};
use rusqlite::Connection;
use std::collections::HashMap;

#[derive(Debug, Default)]
pub struct PathResolver {
    ids: HashMap<String, i64>,
}

impl PathResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of paths resolved so far in this run.
    pub fn count(&self) -> usize {
        self.ids.len()
    }

    /// Returns the node id for `path`, creating it and any missing ancestor directory.
    ///
    /// Ancestors are found with an explicit upward walk and written shallowest
    /// first, so each row's parent is persisted before the row itself. A trailing
    /// `/` marks a directory; anything else is a file.
    pub fn resolve(&mut self, conn: &Connection, path: &str) -> Result<i64> {
        if let Some(id) = self.ids.get(path) {
            return Ok(*id);
        }

        let mut missing = Vec::new();
        let mut parent_id = None;
        let mut cursor = parent_dir(path);
        while let Some(dir) = cursor {
            if let Some(id) = self.ids.get(&dir) {
                parent_id = Some(*id);
                break;
            }
            cursor = parent_dir(&dir);
            missing.push(dir);
        }

        for dir in missing.into_iter().rev() {
            let dir_id = insert_file(conn, &dir, parent_id, display_name(&dir), true)?;
            self.ids.insert(dir, dir_id);
            parent_id = Some(dir_id);
        }

        let id = insert_file(conn, path, parent_id, display_name(path), is_directory_path(path))?;
        self.ids.insert(path.to_string(), id);
        Ok(id)
    }

    /// Resolves a batch of newly discovered paths ordered by depth, shallowest first.
    pub fn resolve_all<'p, I>(&mut self, conn: &Connection, paths: I) -> Result<()>
    where
        I: IntoIterator<Item = &'p str>,
    {
        let mut fresh: Vec<&str> = paths
            .into_iter()
            .filter(|p| !self.ids.contains_key(*p))
            .collect();
        fresh.sort_by(|a, b| depth(a).cmp(&depth(b)).then_with(|| a.cmp(b)));
        fresh.dedup();
        for path in fresh {
            self.resolve(conn, path)?;
        }
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct ContributorResolver {
    ids: HashMap<String, i64>,
}

impl ContributorResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, email: &str) -> Option<i64> {
        self.ids.get(email).copied()
    }

    pub fn count(&self) -> usize {
        self.ids.len()
    }

    /// The first name seen for an email is the one kept.
    pub fn resolve(&mut self, conn: &Connection, name: &str, email: &str) -> Result<i64> {
        if let Some(id) = self.ids.get(email) {
            return Ok(*id);
        }
        let id = insert_contributor(conn, name, email)?;
        self.ids.insert(email.to_string(), id);
        Ok(id)
    }
}
