//! Calendar policy for collection runs
//!
//! All date arithmetic happens in a fixed local offset. An entry is due when
//! its local date matches the policy, the local time has reached the entry's
//! time of day, and it has not already run on that local date.

use crate::config::{ScheduleEntryConfig, SchedulerConfig};
use crate::state::TaskType;
use crate::ConfigError;
use chrono::{DateTime, Datelike, Days, FixedOffset, NaiveDate, NaiveTime, TimeZone, Utc, Weekday};

/// Furthest ahead `next_fire_after` looks before giving up
const SEARCH_HORIZON_DAYS: u64 = 400;

/// One calendar policy plus its persisted bookkeeping
#[derive(Debug, Clone, PartialEq)]
pub struct ScheduleEntry {
    pub task_type: TaskType,
    pub enabled: bool,

    /// Local time of day the run becomes due
    pub time: NaiveTime,

    /// Day of week, only meaningful for weekly entries
    pub weekday: Option<Weekday>,

    pub last_run: Option<DateTime<Utc>>,
    pub next_run: Option<DateTime<Utc>>,
}

impl ScheduleEntry {
    pub fn new(task_type: TaskType, enabled: bool, time: NaiveTime, weekday: Option<Weekday>) -> Self {
        Self {
            task_type,
            enabled,
            time,
            weekday,
            last_run: None,
            next_run: None,
        }
    }

    /// Builds the three entries seeded from configuration
    pub fn from_config(config: &SchedulerConfig) -> Result<Vec<Self>, ConfigError> {
        TaskType::ALL
            .iter()
            .map(|&task| {
                let seed = match task {
                    TaskType::Daily => &config.daily,
                    TaskType::Weekly => &config.weekly,
                    TaskType::Monthly => &config.monthly,
                };
                Self::from_seed(task, seed)
            })
            .collect()
    }

    fn from_seed(task_type: TaskType, seed: &ScheduleEntryConfig) -> Result<Self, ConfigError> {
        let time = parse_time_of_day(&seed.time).ok_or_else(|| {
            ConfigError::InvalidSchedule(format!("{} time must be HH:MM, got '{}'", task_type, seed.time))
        })?;

        let weekday = match task_type {
            TaskType::Weekly => {
                let day = seed.weekday.as_deref().unwrap_or_default();
                Some(parse_weekday(day).ok_or_else(|| {
                    ConfigError::InvalidSchedule(format!("weekly weekday '{}' is not a day of the week", day))
                })?)
            }
            TaskType::Daily | TaskType::Monthly => None,
        };

        Ok(Self::new(task_type, seed.enabled, time, weekday))
    }

    /// Returns true if the policy allows a run on local date `date`
    pub fn fires_on(&self, date: NaiveDate) -> bool {
        match self.task_type {
            TaskType::Daily => true,
            TaskType::Weekly => self.weekday == Some(date.weekday()),
            TaskType::Monthly => is_last_day_of_month(date),
        }
    }

    /// Returns true if the entry should fire at `now`
    ///
    /// A run that already happened on the same local date suppresses the entry
    /// for the rest of that date, so a restart never double-fires.
    pub fn is_due(&self, now: DateTime<Utc>, offset: &FixedOffset) -> bool {
        if !self.enabled {
            return false;
        }

        let local = now.with_timezone(offset);
        let today = local.date_naive();

        if !self.fires_on(today) || local.time() < self.time {
            return false;
        }

        match self.last_run {
            Some(last) => last.with_timezone(offset).date_naive() != today,
            None => true,
        }
    }

    /// First instant strictly after `after` at which the policy fires
    pub fn next_fire_after(&self, after: DateTime<Utc>, offset: &FixedOffset) -> Option<DateTime<Utc>> {
        if !self.enabled {
            return None;
        }

        let start = after.with_timezone(offset).date_naive();
        (0..=SEARCH_HORIZON_DAYS)
            .filter_map(|n| start.checked_add_days(Days::new(n)))
            .filter(|date| self.fires_on(*date))
            .filter_map(|date| offset.from_local_datetime(&date.and_time(self.time)).single())
            .map(|local| local.with_timezone(&Utc))
            .find(|candidate| *candidate > after)
    }
}

/// Last calendar day of `month` in `year`
pub fn last_day_of_month(year: i32, month: u32) -> Option<NaiveDate> {
    let (next_year, next_month) = if month == 12 { (year + 1, 1) } else { (year, month + 1) };
    NaiveDate::from_ymd_opt(next_year, next_month, 1)?.pred_opt()
}

fn is_last_day_of_month(date: NaiveDate) -> bool {
    last_day_of_month(date.year(), date.month()) == Some(date)
}

/// Parses "HH:MM"
pub fn parse_time_of_day(value: &str) -> Option<NaiveTime> {
    NaiveTime::parse_from_str(value.trim(), "%H:%M").ok()
}

/// Parses a weekday name such as "sun", "Sun" or "sunday"
pub fn parse_weekday(value: &str) -> Option<Weekday> {
    value.trim().parse::<Weekday>().ok()
}

/// Parses a fixed UTC offset such as "+08:00", "-05:30" or "Z"
pub fn parse_utc_offset(value: &str) -> Option<FixedOffset> {
    let value = value.trim();
    if value.eq_ignore_ascii_case("z") || value.eq_ignore_ascii_case("utc") {
        return FixedOffset::east_opt(0);
    }

    let (sign, rest) = match value.as_bytes().first()? {
        b'+' => (1, &value[1..]),
        b'-' => (-1, &value[1..]),
        _ => return None,
    };

    let (hours, minutes) = rest.split_once(':')?;
    if hours.len() != 2 || minutes.len() != 2 {
        return None;
    }

    let hours: i32 = hours.parse().ok()?;
    let minutes: i32 = minutes.parse().ok()?;
    if hours > 14 || minutes > 59 {
        return None;
    }

    FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60))
}
