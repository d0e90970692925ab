//! SQLite storage implementation
//!
//! This module provides a SQLite-based implementation of the storage traits.

use crate::schedule::{parse_time_of_day, parse_weekday, ScheduleEntry};
use crate::state::{TaskOutcome, TaskStatus, TaskType, Trigger};
use crate::storage::schema::initialize_schema;
use crate::storage::traits::{
    ListingStore, OutcomeStore, ScheduleStore, StorageError, StorageResult,
};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::HashSet;
use std::path::Path;

/// SQLite storage backend
pub struct SqliteStorage {
    conn: Connection,
}

impl std::fmt::Debug for SqliteStorage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteStorage").finish_non_exhaustive()
    }
}

impl SqliteStorage {
    /// Opens or creates the database at `path`
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the SQLite database file
    pub fn new(path: &Path) -> StorageResult<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)?;

        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA temp_store = MEMORY;
        ",
        )?;

        initialize_schema(&conn)?;

        Ok(Self { conn })
    }

    /// Creates an in-memory database
    pub fn open_in_memory() -> StorageResult<Self> {
        let conn = Connection::open_in_memory()?;
        initialize_schema(&conn)?;
        Ok(Self { conn })
    }
}

fn to_db_time(time: &DateTime<Utc>) -> String {
    time.to_rfc3339()
}

fn from_db_time(value: &str) -> StorageResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| StorageError::Serialization(format!("bad timestamp '{}': {}", value, e)))
}

fn from_db_opt_time(value: Option<String>) -> StorageResult<Option<DateTime<Utc>>> {
    value.as_deref().map(from_db_time).transpose()
}

fn parse_task_type(value: &str) -> StorageResult<TaskType> {
    TaskType::parse(value)
        .ok_or_else(|| StorageError::Serialization(format!("unknown task type '{}'", value)))
}

impl ScheduleStore for SqliteStorage {
    fn sync_schedule(&mut self, entries: &[ScheduleEntry]) -> StorageResult<()> {
        let tx = self.conn.transaction()?;
        for entry in entries {
            tx.execute(
                "INSERT INTO schedule_entries (task_type, enabled, time_of_day, weekday)
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(task_type) DO UPDATE SET
                    enabled = excluded.enabled,
                    time_of_day = excluded.time_of_day,
                    weekday = excluded.weekday",
                params![
                    entry.task_type.as_str(),
                    entry.enabled,
                    entry.time.format("%H:%M").to_string(),
                    entry.weekday.map(|w| w.to_string()),
                ],
            )?;
        }
        tx.commit()?;
        Ok(())
    }

    fn load_schedule(&self) -> StorageResult<Vec<ScheduleEntry>> {
        let mut stmt = self.conn.prepare(
            "SELECT task_type, enabled, time_of_day, weekday, last_run, next_run
             FROM schedule_entries ORDER BY task_type",
        )?;

        let rows = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, bool>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, Option<String>>(3)?,
                    row.get::<_, Option<String>>(4)?,
                    row.get::<_, Option<String>>(5)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        let mut entries = Vec::with_capacity(rows.len());
        for (task, enabled, time, weekday, last_run, next_run) in rows {
            let time = parse_time_of_day(&time)
                .ok_or_else(|| StorageError::Serialization(format!("bad time '{}'", time)))?;
            let weekday = match weekday {
                Some(day) => Some(parse_weekday(&day).ok_or_else(|| {
                    StorageError::Serialization(format!("bad weekday '{}'", day))
                })?),
                None => None,
            };

            entries.push(ScheduleEntry {
                task_type: parse_task_type(&task)?,
                enabled,
                time,
                weekday,
                last_run: from_db_opt_time(last_run)?,
                next_run: from_db_opt_time(next_run)?,
            });
        }

        entries.sort_by_key(|e| e.task_type);
        Ok(entries)
    }

    fn record_run(
        &mut self,
        task_type: TaskType,
        last_run: DateTime<Utc>,
        next_run: Option<DateTime<Utc>>,
    ) -> StorageResult<()> {
        let updated = self.conn.execute(
            "UPDATE schedule_entries SET last_run = ?1, next_run = ?2 WHERE task_type = ?3",
            params![
                to_db_time(&last_run),
                next_run.as_ref().map(to_db_time),
                task_type.as_str()
            ],
        )?;

        if updated == 0 {
            return Err(StorageError::Database(format!(
                "no schedule entry for {}",
                task_type
            )));
        }
        Ok(())
    }
}

impl OutcomeStore for SqliteStorage {
    fn append_outcome(&mut self, outcome: &TaskOutcome) -> StorageResult<i64> {
        self.conn.execute(
            "INSERT INTO task_history (task_type, trigger_kind, started_at, finished_at, status,
             attempts, items_found, items_kept, error_summary)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                outcome.task_type.as_str(),
                outcome.trigger.to_db_string(),
                to_db_time(&outcome.started_at),
                to_db_time(&outcome.finished_at),
                outcome.status.to_db_string(),
                outcome.attempts,
                outcome.items_found as i64,
                outcome.items_kept as i64,
                outcome.error_summary,
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    fn recent_outcomes(&self, limit: usize) -> StorageResult<Vec<TaskOutcome>> {
        let mut stmt = self.conn.prepare(
            "SELECT task_type, trigger_kind, started_at, finished_at, status, attempts,
             items_found, items_kept, error_summary
             FROM task_history ORDER BY id DESC LIMIT ?1",
        )?;

        let rows = stmt
            .query_map(params![limit.min(i64::MAX as usize) as i64], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, String>(4)?,
                    row.get::<_, u32>(5)?,
                    row.get::<_, i64>(6)?,
                    row.get::<_, i64>(7)?,
                    row.get::<_, Option<String>>(8)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        rows.into_iter()
            .map(
                |(task, trigger, started, finished, status, attempts, found, kept, summary)| {
                    Ok(TaskOutcome {
                        task_type: parse_task_type(&task)?,
                        trigger: Trigger::from_db_string(&trigger).unwrap_or(Trigger::Scheduled),
                        started_at: from_db_time(&started)?,
                        finished_at: from_db_time(&finished)?,
                        status: TaskStatus::from_db_string(&status).unwrap_or(TaskStatus::Failed),
                        attempts,
                        items_found: found.max(0) as usize,
                        items_kept: kept.max(0) as usize,
                        error_summary: summary,
                    })
                },
            )
            .collect()
    }
}

impl ListingStore for SqliteStorage {
    fn seen_names(&self, task_type: TaskType, names: &[String]) -> StorageResult<HashSet<String>> {
        let mut stmt = self
            .conn
            .prepare("SELECT 1 FROM seen_listings WHERE task_type = ?1 AND name = ?2")?;

        let mut seen = HashSet::new();
        for name in names {
            let found: Option<i64> = stmt
                .query_row(params![task_type.as_str(), name], |row| row.get(0))
                .optional()?;
            if found.is_some() {
                seen.insert(name.clone());
            }
        }
        Ok(seen)
    }

    fn mark_seen(&mut self, task_type: TaskType, names: &[String]) -> StorageResult<()> {
        let now = to_db_time(&Utc::now());
        let tx = self.conn.transaction()?;
        {
            let mut stmt = tx.prepare(
                "INSERT OR IGNORE INTO seen_listings (task_type, name, first_seen)
                 VALUES (?1, ?2, ?3)",
            )?;
            for name in names {
                stmt.execute(params![task_type.as_str(), name, now])?;
            }
        }
        tx.commit()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveTime, TimeZone, Weekday};

    fn create_test_entries() -> Vec<ScheduleEntry> {
        vec![
            ScheduleEntry::new(TaskType::Daily, true, NaiveTime::from_hms_opt(8, 0, 0).unwrap(), None),
            ScheduleEntry::new(
                TaskType::Weekly,
                true,
                NaiveTime::from_hms_opt(22, 0, 0).unwrap(),
                Some(Weekday::Sun),
            ),
            ScheduleEntry::new(TaskType::Monthly, false, NaiveTime::from_hms_opt(22, 0, 0).unwrap(), None),
        ]
    }

    fn create_test_outcome(task_type: TaskType, status: TaskStatus) -> TaskOutcome {
        let started_at = Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).unwrap();
        TaskOutcome {
            task_type,
            trigger: Trigger::Scheduled,
            started_at,
            finished_at: started_at + chrono::Duration::seconds(42),
            status,
            attempts: 1,
            items_found: 25,
            items_kept: 10,
            error_summary: None,
        }
    }

    #[test]
    fn test_open_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("relay.db");
        assert!(SqliteStorage::new(&path).is_ok());
        assert!(path.exists());
    }

    #[test]
    fn test_schedule_roundtrip() {
        let mut storage = SqliteStorage::open_in_memory().unwrap();
        storage.sync_schedule(&create_test_entries()).unwrap();

        let loaded = storage.load_schedule().unwrap();
        assert_eq!(loaded, create_test_entries());
    }

    #[test]
    fn test_sync_preserves_last_run() {
        let mut storage = SqliteStorage::open_in_memory().unwrap();
        storage.sync_schedule(&create_test_entries()).unwrap();

        let last = Utc.with_ymd_and_hms(2024, 5, 1, 0, 30, 0).unwrap();
        let next = Utc.with_ymd_and_hms(2024, 5, 2, 0, 0, 0).unwrap();
        storage.record_run(TaskType::Daily, last, Some(next)).unwrap();

        let mut reseeded = create_test_entries();
        reseeded[0].time = NaiveTime::from_hms_opt(9, 15, 0).unwrap();
        storage.sync_schedule(&reseeded).unwrap();

        let daily = storage.load_schedule().unwrap().remove(0);
        assert_eq!(daily.time, NaiveTime::from_hms_opt(9, 15, 0).unwrap());
        assert_eq!(daily.last_run, Some(last));
        assert_eq!(daily.next_run, Some(next));
    }

    #[test]
    fn test_record_run_unknown_entry() {
        let mut storage = SqliteStorage::open_in_memory().unwrap();
        let result = storage.record_run(TaskType::Weekly, Utc::now(), None);
        assert!(matches!(result, Err(StorageError::Database(_))));
    }

    #[test]
    fn test_outcomes_newest_first() {
        let mut storage = SqliteStorage::open_in_memory().unwrap();
        storage
            .append_outcome(&create_test_outcome(TaskType::Daily, TaskStatus::Success))
            .unwrap();

        let mut failed = create_test_outcome(TaskType::Weekly, TaskStatus::Failed);
        failed.attempts = 4;
        failed.trigger = Trigger::Manual;
        failed.error_summary = Some("HTTP 503 for https://example.com/trending".to_string());
        storage.append_outcome(&failed).unwrap();

        let outcomes = storage.recent_outcomes(10).unwrap();
        assert_eq!(outcomes.len(), 2);
        assert_eq!(outcomes[0], failed);
        assert_eq!(outcomes[1].task_type, TaskType::Daily);

        assert_eq!(storage.recent_outcomes(1).unwrap().len(), 1);
    }

    #[test]
    fn test_seen_listings_per_task_type() {
        let mut storage = SqliteStorage::open_in_memory().unwrap();
        let names = vec!["a/one".to_string(), "b/two".to_string()];
        storage.mark_seen(TaskType::Daily, &names).unwrap();
        // Marking twice is harmless
        storage.mark_seen(TaskType::Daily, &names[..1]).unwrap();

        let candidates = vec!["a/one".to_string(), "c/three".to_string()];
        let seen = storage.seen_names(TaskType::Daily, &candidates).unwrap();
        assert_eq!(seen.len(), 1);
        assert!(seen.contains("a/one"));

        let seen = storage.seen_names(TaskType::Weekly, &candidates).unwrap();
        assert!(seen.is_empty());
    }
}
