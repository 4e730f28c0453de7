//! `SQLite` cache implementation.
//!
//! The cache is the durability boundary: `save_all` rewrites the whole
//! table inside one transaction, so a crash mid-sync leaves the previous
//! state intact. It is called at pull/push boundaries only, never
//! mid-merge.

use crate::error::Result;
use crate::model::{FieldMap, Issue, Patch, patch};
use crate::storage::schema::apply_schema;
use rusqlite::{Connection, params};
use std::path::Path;
use tracing::warn;

/// SQLite-backed issue cache.
#[derive(Debug)]
pub struct SqliteStorage {
    conn: Connection,
}

impl SqliteStorage {
    /// Open a connection to the cache at the given path.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection cannot be established or schema
    /// application fails.
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;
        apply_schema(&conn)?;
        Ok(Self { conn })
    }

    /// Open an in-memory cache for testing.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection cannot be established.
    pub fn open_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        apply_schema(&conn)?;
        Ok(Self { conn })
    }

    /// Load every cached record, reconstructing each snapshot by walking
    /// the stored patch backwards from the stored current form.
    ///
    /// Malformed rows are logged with their key and skipped; they never
    /// abort the load.
    ///
    /// # Errors
    ///
    /// Returns an error only when the query itself fails.
    pub fn load_all(&self) -> Result<Vec<Issue>> {
        let mut stmt = self
            .conn
            .prepare("SELECT key, data, patch FROM issues ORDER BY key")?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, Option<String>>(2)?,
            ))
        })?;

        let mut issues = Vec::new();
        for row in rows {
            let (key, data, patch_json) = row?;
            match Self::inflate(&data, patch_json.as_deref()) {
                Ok(issue) => issues.push(issue),
                Err(e) => warn!(key = %key, "skipping malformed cached record: {e}"),
            }
        }
        Ok(issues)
    }

    /// Replace the entire cache contents with the given records.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or any statement fails; the
    /// transaction rolls back and the previous contents survive.
    pub fn save_all<'a>(&mut self, issues: impl IntoIterator<Item = &'a Issue>) -> Result<()> {
        let tx = self.conn.transaction()?;
        tx.execute("DELETE FROM issues", [])?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO issues (key, project_id, data, patch) VALUES (?1, ?2, ?3, ?4)",
            )?;
            for issue in issues {
                let data = serde_json::to_string(&issue.to_map())?;
                let patch_json = match issue.snapshot() {
                    Some(_) => Some(serde_json::to_string(&issue.diff())?),
                    None => None,
                };
                stmt.execute(params![issue.key, issue.project_id, data, patch_json])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    fn inflate(data: &str, patch_json: Option<&str>) -> Result<Issue> {
        let map: FieldMap = serde_json::from_str(data)?;
        let mut issue = Issue::from_map(&map)?;
        if let Some(raw) = patch_json {
            let stored: Patch = serde_json::from_str(raw)?;
            issue.set_snapshot(Some(patch::revert(&map, &stored)));
        }
        Ok(issue)
    }
}
