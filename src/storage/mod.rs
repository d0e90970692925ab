//! Storage module for persisting run data
//!
//! This module handles all database operations, including:
//! - SQLite database initialization and schema management
//! - Schedule entries with last/next run bookkeeping
//! - Append-only task history
//! - Listings already delivered, for de-duplication

mod schema;
mod sqlite;
mod traits;

pub use sqlite::SqliteStorage;
pub use traits::{ListingStore, OutcomeStore, ScheduleStore, Storage, StorageError, StorageResult};

use std::path::Path;
use std::sync::{Arc, Mutex};

/// Storage shared between the scheduler and the collection job
pub type SharedStorage = Arc<Mutex<dyn Storage>>;

/// Initializes or opens a storage database
///
/// # Arguments
///
/// * `path` - Path to the SQLite database file
pub fn open_storage(path: &Path) -> StorageResult<SqliteStorage> {
    SqliteStorage::new(path)
}

/// Wraps a backend for sharing across tasks
pub fn shared<S: Storage + 'static>(storage: S) -> SharedStorage {
    Arc::new(Mutex::new(storage))
}
