//! Database schema definitions
//!
//! This module contains all SQL schema definitions for the Trend-Relay database.

/// SQL schema for the database
pub const SCHEMA_SQL: &str = r#"
-- Append-only history of finished runs
CREATE TABLE IF NOT EXISTS task_history (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    task_type TEXT NOT NULL,
    trigger_kind TEXT NOT NULL,
    started_at TEXT NOT NULL,
    finished_at TEXT NOT NULL,
    status TEXT NOT NULL,
    attempts INTEGER NOT NULL,
    items_found INTEGER NOT NULL DEFAULT 0,
    items_kept INTEGER NOT NULL DEFAULT 0,
    error_summary TEXT
);

CREATE INDEX IF NOT EXISTS idx_task_history_type ON task_history(task_type);
CREATE INDEX IF NOT EXISTS idx_task_history_started ON task_history(started_at);

-- One row per calendar policy; last/next run survive restarts
CREATE TABLE IF NOT EXISTS schedule_entries (
    task_type TEXT PRIMARY KEY,
    enabled INTEGER NOT NULL,
    time_of_day TEXT NOT NULL,
    weekday TEXT,
    last_run TEXT,
    next_run TEXT
);

-- Listings already delivered, per task type
CREATE TABLE IF NOT EXISTS seen_listings (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    task_type TEXT NOT NULL,
    name TEXT NOT NULL,
    first_seen TEXT NOT NULL,
    UNIQUE(task_type, name)
);

CREATE INDEX IF NOT EXISTS idx_seen_listings_task ON seen_listings(task_type);
"#;

/// Initializes the database schema
///
/// # Arguments
///
/// * `conn` - The database connection
pub fn initialize_schema(conn: &rusqlite::Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(SCHEMA_SQL)?;
    Ok(())
}
