//! Cache database schema, versioned through SQLite's `user_version` pragma.
//!
//! When the layout changes, bump `SCHEMA_VERSION` and add a migration step to
//! `migrate`. Steps run in order from the stored version up to the current one.

use rusqlite::Connection;

use super::CacheError;

/// Current schema version.
pub const SCHEMA_VERSION: i32 = 1;

/// Bring the database at `conn` up to `SCHEMA_VERSION`.
pub fn migrate(conn: &Connection) -> Result<(), CacheError> {
    let current: i32 = conn.pragma_query_value(None, "user_version", |row| row.get(0))?;

    if current > SCHEMA_VERSION {
        return Err(CacheError::SchemaTooNew {
            found: current,
            supported: SCHEMA_VERSION,
        });
    }

    if current < 1 {
        create_tables(conn)?;
    }

    if current < SCHEMA_VERSION {
        conn.pragma_update(None, "user_version", SCHEMA_VERSION)?;
    }

    Ok(())
}

/// v0 -> v1: title and verdict tables.
fn create_tables(conn: &Connection) -> Result<(), CacheError> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS github_pr_cache (
            repo_owner TEXT NOT NULL,
            repo_name TEXT NOT NULL,
            pr_number INTEGER NOT NULL,
            title TEXT NOT NULL,
            fetched_at TEXT NOT NULL,
            PRIMARY KEY (repo_owner, repo_name, pr_number)
        );

        CREATE TABLE IF NOT EXISTS validation_cache (
            repo_owner TEXT NOT NULL,
            repo_name TEXT NOT NULL,
            pr_number INTEGER NOT NULL,
            changelog_desc TEXT NOT NULL,
            status INTEGER NOT NULL CHECK(status IN (0, 1, 2)),
            last_validated TEXT NOT NULL,
            PRIMARY KEY (repo_owner, repo_name, pr_number)
        );
        "#,
    )?;
    Ok(())
}
