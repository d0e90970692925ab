/// Task and outcome definitions for scheduled collection runs
use chrono::{DateTime, Utc};
use std::fmt;

/// The three calendar policies a collection run can follow
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TaskType {
    /// Every day at the configured time
    Daily,

    /// Once a week on the configured weekday
    Weekly,

    /// On the last calendar day of each month
    Monthly,
}

impl TaskType {
    pub const ALL: [TaskType; 3] = [Self::Daily, Self::Weekly, Self::Monthly];

    /// Name used in storage, URLs and the CLI
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Daily => "daily",
            Self::Weekly => "weekly",
            Self::Monthly => "monthly",
        }
    }

    /// Parses a task type name, returning None for unknown names
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "daily" => Some(Self::Daily),
            "weekly" => Some(Self::Weekly),
            "monthly" => Some(Self::Monthly),
            _ => None,
        }
    }
}

impl fmt::Display for TaskType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for TaskType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s).ok_or_else(|| format!("unknown task type '{}'", s))
    }
}

/// What caused a run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    Scheduled,
    Manual,
}

impl Trigger {
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Scheduled => "scheduled",
            Self::Manual => "manual",
        }
    }

    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "scheduled" => Some(Self::Scheduled),
            "manual" => Some(Self::Manual),
            _ => None,
        }
    }
}

/// Terminal status of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskStatus {
    /// Every kept listing was collected and enriched
    Success,

    /// The run completed but some listings fell back to a plain summary
    Partial,

    /// The run failed after exhausting its retries
    Failed,
}

impl TaskStatus {
    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Failed)
    }

    /// Converts the status to its database representation
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Partial => "partial",
            Self::Failed => "failed",
        }
    }

    /// Parses a status from its database representation
    ///
    /// Returns None if the string doesn't match any known status.
    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "success" => Some(Self::Success),
            "partial" => Some(Self::Partial),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_db_string())
    }
}

/// Append-only record of one finished run
#[derive(Debug, Clone, PartialEq)]
pub struct TaskOutcome {
    pub task_type: TaskType,
    pub trigger: Trigger,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub status: TaskStatus,
    /// Number of attempts made, including the first
    pub attempts: u32,
    pub items_found: usize,
    pub items_kept: usize,
    /// Always set for failed runs
    pub error_summary: Option<String>,
}

impl TaskOutcome {
    /// Wall-clock duration of the run including retry delays
    pub fn duration(&self) -> chrono::Duration {
        self.finished_at - self.started_at
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_task_type_roundtrip_names() {
        for task in TaskType::ALL {
            assert_eq!(TaskType::parse(task.as_str()), Some(task));
            assert_eq!(task.to_string(), task.as_str());
        }
        assert_eq!(TaskType::parse(" Weekly "), Some(TaskType::Weekly));
        assert_eq!(TaskType::parse("hourly"), None);
        assert!("yearly".parse::<TaskType>().is_err());
    }

    #[test]
    fn test_status_db_strings() {
        assert_eq!(TaskStatus::Partial.to_db_string(), "partial");
        assert_eq!(TaskStatus::from_db_string("failed"), Some(TaskStatus::Failed));
        assert_eq!(TaskStatus::from_db_string("unknown"), None);
        assert!(TaskStatus::Failed.is_failure());
        assert!(!TaskStatus::Partial.is_failure());
    }

    #[test]
    fn test_trigger_db_strings() {
        assert_eq!(Trigger::from_db_string("manual"), Some(Trigger::Manual));
        assert_eq!(Trigger::Scheduled.to_db_string(), "scheduled");
    }
}
