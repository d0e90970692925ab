//! Calendar-driven execution of collection jobs
//!
//! This module handles:
//! - A tick loop that fires due schedule entries
//! - Running jobs on a fixed worker pool
//! - Timer-driven retries of failed runs
//! - Recording outcomes and alerting once when retries run out

use crate::alert::{AlertLevel, Alerter};
use crate::config::SchedulerConfig;
use crate::retry::RetryPolicy;
use crate::schedule::calendar::{parse_utc_offset, ScheduleEntry};
use crate::schedule::pool::{Job, PoolClosed, WorkerPool};
use crate::state::{TaskOutcome, TaskStatus, TaskType, Trigger};
use crate::storage::{SharedStorage, Storage, StorageResult};
use crate::{ConfigError, RelayError, TaskError};
use async_trait::async_trait;
use chrono::{DateTime, FixedOffset, Utc};
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

/// Counts reported by a successful job run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JobReport {
    pub items_found: usize,
    pub items_kept: usize,
    /// Listings that received a fallback summary
    pub enrichment_failures: usize,
}

/// The work a schedule entry triggers
#[async_trait]
pub trait CollectionJob: Send + Sync {
    async fn execute(&self, task: TaskType, cancel: &CancellationToken) -> crate::Result<JobReport>;
}

/// Scheduler tuning
#[derive(Debug, Clone)]
pub struct SchedulerOptions {
    pub offset: FixedOffset,
    pub tick: Duration,
    pub workers: usize,
    pub queue_capacity: usize,
    pub retry: RetryPolicy,
}

impl SchedulerOptions {
    pub fn from_config(config: &SchedulerConfig) -> Result<Self, ConfigError> {
        let offset = parse_utc_offset(&config.utc_offset).ok_or_else(|| {
            ConfigError::InvalidSchedule(format!("bad utc-offset '{}'", config.utc_offset))
        })?;

        Ok(Self {
            offset,
            tick: Duration::from_secs(config.tick_secs),
            workers: config.workers,
            queue_capacity: config.queue_capacity,
            retry: RetryPolicy::for_jobs(config),
        })
    }
}

/// One logical run, carried across its retries
struct Run {
    task: TaskType,
    trigger: Trigger,
    started_at: DateTime<Utc>,
    attempts: u32,
    reply: Option<oneshot::Sender<TaskOutcome>>,
}

impl Run {
    fn new(
        task: TaskType,
        trigger: Trigger,
        started_at: DateTime<Utc>,
        reply: Option<oneshot::Sender<TaskOutcome>>,
    ) -> Self {
        Self {
            task,
            trigger,
            started_at,
            attempts: 0,
            reply,
        }
    }
}

struct Inner {
    job: Arc<dyn CollectionJob>,
    storage: SharedStorage,
    alerter: Arc<dyn Alerter>,
    pool: WorkerPool,
    running: Mutex<HashSet<TaskType>>,
    retry: RetryPolicy,
    offset: FixedOffset,
    cancel: CancellationToken,
}

/// Fires collection jobs on their calendar and keeps their history
pub struct TaskScheduler {
    inner: Arc<Inner>,
    tick: Duration,
}

impl TaskScheduler {
    /// Creates the scheduler and spawns its worker pool
    ///
    /// Must be called from within a Tokio runtime.
    pub fn new(
        job: Arc<dyn CollectionJob>,
        storage: SharedStorage,
        alerter: Arc<dyn Alerter>,
        options: SchedulerOptions,
        cancel: CancellationToken,
    ) -> Self {
        let inner = Inner {
            job,
            storage,
            alerter,
            pool: WorkerPool::new(options.workers, options.queue_capacity),
            running: Mutex::new(HashSet::new()),
            retry: options.retry,
            offset: options.offset,
            cancel,
        };

        Self {
            inner: Arc::new(inner),
            tick: options.tick,
        }
    }

    pub fn offset(&self) -> FixedOffset {
        self.inner.offset
    }

    /// Task types with a run in flight, including runs waiting to retry
    pub fn running(&self) -> Vec<TaskType> {
        let running = self.inner.running.lock().unwrap_or_else(|p| p.into_inner());
        let mut tasks: Vec<_> = running.iter().copied().collect();
        tasks.sort();
        tasks
    }

    /// Ticks until the cancellation token fires, then drains the pool
    pub async fn run(&self) {
        self.log_upcoming(Utc::now());

        let mut ticker = tokio::time::interval(self.tick);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = self.inner.cancel.cancelled() => break,
                _ = ticker.tick() => {
                    self.tick_at(Utc::now()).await;
                }
            }
        }

        tracing::info!("Scheduler stopped, draining workers");
        self.shutdown().await;
    }

    /// Fires every entry due at `now` and returns the task types fired
    pub async fn tick_at(&self, now: DateTime<Utc>) -> Vec<TaskType> {
        let entries = match self.inner.load_entries() {
            Ok(entries) => entries,
            Err(e) => {
                tracing::error!("Failed to load schedule: {}", e);
                return Vec::new();
            }
        };

        let mut fired = Vec::new();
        for entry in entries.iter().filter(|e| e.is_due(now, &self.inner.offset)) {
            let task = entry.task_type;
            if !self.inner.claim(task) {
                tracing::debug!("{} is due but still running", task);
                continue;
            }

            tracing::info!("Firing scheduled {} run", task);
            if let Err(e) = self.inner.submit(Run::new(task, Trigger::Scheduled, now, None)).await {
                tracing::warn!("Could not queue {} run: {}", task, e);
                self.inner.release(task);
                continue;
            }
            fired.push(task);
        }
        fired
    }

    /// Runs `task` immediately, outside its calendar, and waits for the outcome
    ///
    /// Goes through the same retry, history and alerting path as a scheduled
    /// run but leaves the entry's last run untouched.
    pub async fn run_now(&self, task: TaskType) -> crate::Result<TaskOutcome> {
        if !self.inner.claim(task) {
            return Err(TaskError::AlreadyRunning(task).into());
        }

        tracing::info!("Starting manual {} run", task);
        let (reply, outcome) = oneshot::channel();
        if self
            .inner
            .submit(Run::new(task, Trigger::Manual, Utc::now(), Some(reply)))
            .await
            .is_err()
        {
            self.inner.release(task);
            return Err(TaskError::ShutDown.into());
        }

        outcome
            .await
            .map_err(|_| RelayError::from(TaskError::ShutDown))
    }

    /// Stops the pool after queued runs have drained
    pub async fn shutdown(&self) {
        self.inner.pool.shutdown().await;
    }

    fn log_upcoming(&self, now: DateTime<Utc>) {
        match self.inner.load_entries() {
            Ok(entries) => {
                for entry in entries.iter().filter(|e| e.enabled) {
                    if let Some(next) = entry.next_fire_after(now, &self.inner.offset) {
                        tracing::info!(
                            "Next {} run at {}",
                            entry.task_type,
                            next.with_timezone(&self.inner.offset)
                        );
                    }
                }
            }
            Err(e) => tracing::warn!("Failed to load schedule: {}", e),
        }
    }
}

impl Inner {
    fn claim(&self, task: TaskType) -> bool {
        self.running
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .insert(task)
    }

    fn release(&self, task: TaskType) {
        self.running
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .remove(&task);
    }

    fn load_entries(&self) -> StorageResult<Vec<ScheduleEntry>> {
        self.storage
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .load_schedule()
    }

    fn job_for(self: &Arc<Self>, run: Run) -> Job {
        let inner = Arc::clone(self);
        Box::pin(async move { inner.attempt(run).await })
    }

    async fn submit(self: &Arc<Self>, run: Run) -> Result<(), PoolClosed> {
        let job = self.job_for(run);
        self.pool.submit(job).await
    }

    async fn attempt(self: Arc<Self>, mut run: Run) {
        run.attempts += 1;
        tracing::debug!("{} run, attempt {}", run.task, run.attempts);

        match self.job.execute(run.task, &self.cancel).await {
            Ok(report) => {
                let (status, summary) = if report.enrichment_failures > 0 {
                    (
                        TaskStatus::Partial,
                        Some(format!(
                            "{} listings kept their description instead of a summary",
                            report.enrichment_failures
                        )),
                    )
                } else {
                    (TaskStatus::Success, None)
                };
                self.finish(run, status, report, summary, true);
            }
            Err(e) if self.cancel.is_cancelled() => {
                tracing::warn!("{} run cancelled: {}", run.task, e);
                let summary = format!("cancelled during attempt {}: {}", run.attempts, e);
                self.finish(run, TaskStatus::Failed, JobReport::default(), Some(summary), false);
            }
            Err(e) if self.retry.should_retry(run.attempts) => {
                let delay = self.retry.calculate_backoff(run.attempts);
                tracing::warn!(
                    "{} run attempt {}/{} failed: {}; retrying in {:?}",
                    run.task,
                    run.attempts,
                    self.retry.max_attempts(),
                    e,
                    delay
                );
                self.schedule_retry(run, delay);
            }
            Err(e) => {
                let failure = TaskError::ScheduleExecutionFailed {
                    task: run.task,
                    attempts: run.attempts,
                    last_error: e.to_string(),
                };
                tracing::error!("{}", failure);

                if let Err(alert_error) = self.alerter.notify(AlertLevel::Error, &failure.to_string()).await {
                    tracing::warn!("Failed to deliver alert for {}: {}", run.task, alert_error);
                }

                self.finish(
                    run,
                    TaskStatus::Failed,
                    JobReport::default(),
                    Some(failure.to_string()),
                    true,
                );
            }
        }
    }

    /// Re-queues a failed run after `delay`; dropped if cancelled first
    fn schedule_retry(self: &Arc<Self>, run: Run, delay: Duration) {
        let inner = Arc::clone(self);
        tokio::spawn(async move {
            let cancelled = tokio::select! {
                _ = inner.cancel.cancelled() => true,
                _ = tokio::time::sleep(delay) => false,
            };

            let task = run.task;
            if cancelled {
                tracing::debug!("Dropping pending retry of {}", task);
                inner.release(task);
                return;
            }

            if let Err(e) = inner.submit(run).await {
                tracing::warn!("Could not queue retry of {}: {}", task, e);
                inner.release(task);
            }
        });
    }

    fn finish(
        &self,
        run: Run,
        status: TaskStatus,
        report: JobReport,
        error_summary: Option<String>,
        advance_schedule: bool,
    ) {
        let outcome = TaskOutcome {
            task_type: run.task,
            trigger: run.trigger,
            started_at: run.started_at,
            finished_at: Utc::now(),
            status,
            attempts: run.attempts,
            items_found: report.items_found,
            items_kept: report.items_kept,
            error_summary,
        };

        {
            let mut storage = self.storage.lock().unwrap_or_else(|p| p.into_inner());
            if let Err(e) = storage.append_outcome(&outcome) {
                tracing::error!("Failed to record {} outcome: {}", run.task, e);
            }

            if advance_schedule && run.trigger == Trigger::Scheduled {
                if let Err(e) = advance_entry(&mut *storage, &self.offset, &outcome) {
                    tracing::error!("Failed to advance {} schedule: {}", run.task, e);
                }
            }
        }

        tracing::info!(
            "{} run finished: {} after {} attempt(s), {} found, {} kept",
            outcome.task_type,
            outcome.status,
            outcome.attempts,
            outcome.items_found,
            outcome.items_kept
        );

        self.release(run.task);
        if let Some(reply) = run.reply {
            // The caller may have stopped waiting
            let _ = reply.send(outcome);
        }
    }
}

/// Sets last run to the fire time and next run to the following slot
fn advance_entry(
    storage: &mut dyn Storage,
    offset: &FixedOffset,
    outcome: &TaskOutcome,
) -> StorageResult<()> {
    let next_run = storage
        .load_schedule()?
        .into_iter()
        .find(|e| e.task_type == outcome.task_type)
        .and_then(|e| e.next_fire_after(outcome.finished_at.max(outcome.started_at), offset));

    storage.record_run(outcome.task_type, outcome.started_at, next_run)
}
