//! Storage traits and error types
//!
//! The scheduler and the collection job only see these traits, so any
//! backend can stand in for SQLite.

use crate::schedule::ScheduleEntry;
use crate::state::{TaskOutcome, TaskType};
use chrono::{DateTime, Utc};
use std::collections::HashSet;
use thiserror::Error;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Persistence for calendar entries
pub trait ScheduleStore {
    /// Seeds entries from configuration
    ///
    /// Enabled flag, time and weekday are overwritten; last/next run of an
    /// existing entry are preserved.
    fn sync_schedule(&mut self, entries: &[ScheduleEntry]) -> StorageResult<()>;

    /// Loads every persisted entry
    fn load_schedule(&self) -> StorageResult<Vec<ScheduleEntry>>;

    /// Advances last/next run after a scheduled run finishes
    fn record_run(
        &mut self,
        task_type: TaskType,
        last_run: DateTime<Utc>,
        next_run: Option<DateTime<Utc>>,
    ) -> StorageResult<()>;
}

/// Append-only run history
pub trait OutcomeStore {
    /// Appends an outcome and returns its row id
    fn append_outcome(&mut self, outcome: &TaskOutcome) -> StorageResult<i64>;

    /// Most recent outcomes first
    fn recent_outcomes(&self, limit: usize) -> StorageResult<Vec<TaskOutcome>>;
}

/// Memory of listings already delivered
pub trait ListingStore {
    /// Returns the subset of `names` already delivered for `task_type`
    fn seen_names(&self, task_type: TaskType, names: &[String]) -> StorageResult<HashSet<String>>;

    /// Records `names` as delivered for `task_type`
    fn mark_seen(&mut self, task_type: TaskType, names: &[String]) -> StorageResult<()>;
}

/// Everything the pipeline persists
pub trait Storage: ScheduleStore + OutcomeStore + ListingStore + Send {}

impl<T> Storage for T where T: ScheduleStore + OutcomeStore + ListingStore + Send {}
