//! Cache database schema and migration logic.

use rusqlite::{Connection, Result};

pub const CURRENT_SCHEMA_VERSION: i32 = 1;

/// The complete SQL schema for the local issue cache.
///
/// The cache stores each record's current serialized form plus the patch
/// back to its snapshot; the snapshot itself is reconstructed on load.
pub const SCHEMA_SQL: &str = r"
    CREATE TABLE IF NOT EXISTS issues (
        key TEXT PRIMARY KEY,
        project_id TEXT NOT NULL,
        data TEXT NOT NULL,
        patch TEXT,
        CHECK (length(key) >= 1)
    );

    CREATE INDEX IF NOT EXISTS idx_issues_project ON issues(project_id);
";

/// Apply the schema if the database is new or behind.
///
/// # Errors
///
/// Returns an error if the schema statements fail.
pub fn apply_schema(conn: &Connection) -> Result<()> {
    let version: i32 = conn.query_row("PRAGMA user_version", [], |row| row.get(0))?;
    if version < CURRENT_SCHEMA_VERSION {
        conn.execute_batch(SCHEMA_SQL)?;
        conn.pragma_update(None, "user_version", CURRENT_SCHEMA_VERSION)?;
    }
    Ok(())
}
