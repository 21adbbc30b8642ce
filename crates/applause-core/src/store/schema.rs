//! SQLite schema for the applause database.
//!
//! The table layout matches databases written by earlier deployments of the
//! service, so an existing `applause.db` can be opened in place.

use rusqlite::{Connection, Result};

/// Current schema version. Increment when making breaking changes.
pub const SCHEMA_VERSION: i32 = 1;

/// Initialize the database schema.
///
/// Creates all tables if they don't exist and records the schema version.
pub fn init_schema(conn: &Connection) -> Result<()> {
    let current_version = get_schema_version(conn)?;

    if current_version < SCHEMA_VERSION {
        // Tables may already exist without a version row (older deployments).
        create_tables(conn)?;
        set_schema_version(conn, SCHEMA_VERSION)?;
    }

    Ok(())
}

/// Get the current schema version (0 if not initialized).
fn get_schema_version(conn: &Connection) -> Result<i32> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER NOT NULL
        )",
        [],
    )?;

    let version: Option<i32> = conn
        .query_row("SELECT version FROM schema_version LIMIT 1", [], |row| {
            row.get(0)
        })
        .ok();

    Ok(version.unwrap_or(0))
}

fn set_schema_version(conn: &Connection, version: i32) -> Result<()> {
    conn.execute("DELETE FROM schema_version", [])?;
    conn.execute("INSERT INTO schema_version (version) VALUES (?)", [version])?;
    Ok(())
}

fn create_tables(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        -- One row per canonical URL, created on first clap
        CREATE TABLE IF NOT EXISTS applause_counts (
            url_hash BLOB PRIMARY KEY,
            url TEXT NOT NULL,
            clap_count INTEGER NOT NULL DEFAULT 0,
            updated_at DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP
        );

        -- One row per (URL, member) currently clapping
        CREATE TABLE IF NOT EXISTS applause_actor_claps (
            url_hash BLOB NOT NULL,
            actor_type TEXT NOT NULL,
            actor TEXT NOT NULL,
            claps INTEGER NOT NULL DEFAULT 0,
            updated_at DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP,
            PRIMARY KEY (url_hash, actor_type, actor)
        );
        "#,
    )?;

    Ok(())
}
