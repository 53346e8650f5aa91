/*!
 * Database schema definitions.
 *
 * This module contains the SQL schema for the job and batch tables
 * and refuses stores written with another schema version.
 */

use anyhow::{Context, Result, anyhow};
use log::{debug, info};
use rusqlite::Connection;

/// Current schema version
pub const SCHEMA_VERSION: i32 = 1;

/// Initialize the database schema
pub fn initialize_schema(conn: &Connection) -> Result<()> {
    // Per-connection settings, applied on every open
    conn.execute_batch("PRAGMA foreign_keys=ON;")?;
    conn.busy_timeout(std::time::Duration::from_secs(5))?;

    let current_version = get_schema_version(conn)?;

    if current_version == 0 {
        info!("Initializing database schema v{}", SCHEMA_VERSION);
        create_all_tables(conn)?;
        set_schema_version(conn, SCHEMA_VERSION)?;
    } else if current_version != SCHEMA_VERSION {
        return Err(anyhow!(
            "Unsupported schema version v{} (expected v{})",
            current_version,
            SCHEMA_VERSION
        ));
    } else {
        debug!("Database schema is up to date (v{})", current_version);
    }

    Ok(())
}

/// Get the current schema version from the database
fn get_schema_version(conn: &Connection) -> Result<i32> {
    let table_exists: bool = conn
        .query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name='schema_version'",
            [],
            |row| row.get(0),
        )
        .context("Failed to check schema_version table existence")?;

    if !table_exists {
        return Ok(0);
    }

    let version: i32 = conn
        .query_row("SELECT version FROM schema_version LIMIT 1", [], |row| {
            row.get(0)
        })
        .unwrap_or(0);

    Ok(version)
}

/// Set the schema version in the database
fn set_schema_version(conn: &Connection, version: i32) -> Result<()> {
    conn.execute(
        "INSERT OR REPLACE INTO schema_version (id, version, updated_at) VALUES (1, ?1, datetime('now'))",
        [version],
    )?;
    Ok(())
}

/// Create all database tables
fn create_all_tables(conn: &Connection) -> Result<()> {
    conn.execute_batch("PRAGMA journal_mode=WAL;")?;

    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS schema_version (
            id INTEGER PRIMARY KEY CHECK (id = 1),
            version INTEGER NOT NULL,
            updated_at TEXT NOT NULL
        );
        "#,
    )?;

    // One row per content key; the UNIQUE constraint backs create-if-absent
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS translation_jobs (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            content_key TEXT NOT NULL UNIQUE,
            media_id TEXT NOT NULL,
            media_kind TEXT NOT NULL,
            season INTEGER,
            episode INTEGER,
            language TEXT NOT NULL,
            scope TEXT NOT NULL,
            status TEXT NOT NULL DEFAULT 'processing',
            retry_attempts INTEGER NOT NULL DEFAULT 0,
            usage_total INTEGER NOT NULL DEFAULT 0,
            artifact_path TEXT NOT NULL,
            provider TEXT,
            model TEXT,
            error_message TEXT,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            completed_at TEXT,
            last_retry_at TEXT
        );

        CREATE INDEX IF NOT EXISTS idx_jobs_status ON translation_jobs(status);
        CREATE INDEX IF NOT EXISTS idx_jobs_media ON translation_jobs(media_id, season, episode);
        "#,
    )?;

    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS subtitle_batches (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            job_id INTEGER NOT NULL REFERENCES translation_jobs(id) ON DELETE CASCADE,
            batch_number INTEGER NOT NULL,
            first_index INTEGER NOT NULL,
            last_index INTEGER NOT NULL,
            source_entries TEXT NOT NULL,
            translated_entries TEXT,
            status TEXT NOT NULL DEFAULT 'pending',
            usage INTEGER NOT NULL DEFAULT 0,
            attempts INTEGER NOT NULL DEFAULT 0,
            error_message TEXT,
            created_at TEXT NOT NULL,
            completed_at TEXT,
            UNIQUE(job_id, batch_number)
        );

        CREATE INDEX IF NOT EXISTS idx_batches_job_status ON subtitle_batches(job_id, status);
        "#,
    )?;

    info!("Database schema created successfully");
    Ok(())
}
