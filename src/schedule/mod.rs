//! Calendar scheduling of collection runs
//!
//! This module handles:
//! - Daily, weekly and last-day-of-month calendar policies
//! - A fixed-size worker pool fed by a bounded queue
//! - The scheduler loop with retries, history and alerting

mod calendar;
mod pool;
mod scheduler;

pub use calendar::{last_day_of_month, parse_time_of_day, parse_utc_offset, parse_weekday, ScheduleEntry};
pub use pool::{Job, PoolClosed, WorkerPool};
pub use scheduler::{CollectionJob, JobReport, SchedulerOptions, TaskScheduler};
