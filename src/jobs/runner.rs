//! Job runner: queueing, retries, recurring schedules.

use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use futures_util::FutureExt;
use serde::Serialize;
use thiserror::Error;
use tokio::sync::{Notify, Semaphore};
use uuid::Uuid;

use crate::cache::DistributedLock;
use crate::config::JobsConfig;
use crate::jobs::job::{Job, JobContext};
use crate::lifecycle::{panic_message, Shutdown};
use crate::observability::metrics;
use crate::resilience::RetryPolicy;

/// Records kept before finished ones are evicted.
const MAX_RECORDS: usize = 10_000;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum JobError {
    #[error("recurring job '{0}' does not exist")]
    UnknownRecurringJob(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum JobState {
    Scheduled,
    Enqueued,
    Processing,
    Succeeded,
    Failed,
}

impl JobState {
    pub fn is_final(self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed)
    }
}

impl std::str::FromStr for JobState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "scheduled" => Ok(Self::Scheduled),
            "enqueued" => Ok(Self::Enqueued),
            "processing" => Ok(Self::Processing),
            "succeeded" => Ok(Self::Succeeded),
            "failed" => Ok(Self::Failed),
            other => Err(format!("unknown job state '{other}'")),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobRecord {
    pub id: Uuid,
    pub name: String,
    pub state: JobState,
    pub attempts: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scheduled_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recurring_id: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecurringJobInfo {
    pub id: String,
    pub job_name: String,
    pub interval_secs: f64,
    pub next_run: DateTime<Utc>,
    pub last_run: Option<DateTime<Utc>>,
    pub last_job_id: Option<Uuid>,
    /// Ticks skipped because another instance held the lock.
    pub skipped_ticks: u64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct JobStats {
    pub scheduled: usize,
    pub enqueued: usize,
    pub processing: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub recurring: usize,
}

struct RecurringEntry {
    job: Arc<dyn Job>,
    interval: Duration,
    wake: Arc<Notify>,
    generation: u64,
    info: RecurringJobInfo,
}

/// Background-job runner.
///
/// Cheap to clone; clones share queues and state.
#[derive(Clone)]
pub struct JobRunner {
    inner: Arc<Inner>,
}

struct Inner {
    records: DashMap<Uuid, JobRecord>,
    recurring: DashMap<String, RecurringEntry>,
    workers: Arc<Semaphore>,
    worker_count: usize,
    retry: RetryPolicy,
    lock: Arc<dyn DistributedLock>,
    shutdown: Arc<Shutdown>,
    generation: AtomicU64,
}

impl JobRunner {
    pub fn new(config: &JobsConfig, lock: Arc<dyn DistributedLock>, shutdown: Arc<Shutdown>) -> Self {
        let worker_count = config.workers.max(1);
        Self {
            inner: Arc::new(Inner {
                records: DashMap::new(),
                recurring: DashMap::new(),
                workers: Arc::new(Semaphore::new(worker_count)),
                worker_count,
                retry: RetryPolicy::new(
                    config.max_attempts,
                    config.retry_base_delay_ms,
                    config.retry_max_delay_ms,
                ),
                lock,
                shutdown,
                generation: AtomicU64::new(0),
            }),
        }
    }

    /// Run `job` as soon as a worker is free.
    pub fn enqueue(&self, job: Arc<dyn Job>) -> Uuid {
        self.inner.submit(job, None, None)
    }

    /// Run `job` once after `delay`.
    pub fn schedule(&self, job: Arc<dyn Job>, delay: Duration) -> Uuid {
        self.inner.submit(job, Some(delay), None)
    }

    /// Run `job` every `interval`. An existing schedule with the same id is
    /// replaced in place.
    pub fn add_or_update_recurring(&self, id: &str, interval: Duration, job: Arc<dyn Job>) {
        let interval = interval.max(Duration::from_millis(1));
        let next_run = Utc::now() + to_chrono(interval);

        if let Some(mut entry) = self.inner.recurring.get_mut(id) {
            entry.info.job_name = job.name().to_string();
            entry.info.interval_secs = interval.as_secs_f64();
            entry.info.next_run = next_run;
            entry.job = job;
            entry.interval = interval;
            entry.wake.notify_one();
            tracing::info!(recurring_id = id, ?interval, "Updated recurring job");
            return;
        }

        let generation = self.inner.generation.fetch_add(1, Ordering::Relaxed);
        let info = RecurringJobInfo {
            id: id.to_string(),
            job_name: job.name().to_string(),
            interval_secs: interval.as_secs_f64(),
            next_run,
            last_run: None,
            last_job_id: None,
            skipped_ticks: 0,
        };
        self.inner.recurring.insert(
            id.to_string(),
            RecurringEntry {
                job,
                interval,
                wake: Arc::new(Notify::new()),
                generation,
                info,
            },
        );

        let inner = self.inner.clone();
        let handle = tokio::spawn(inner.recurring_loop(id.to_string(), generation));
        self.inner.shutdown.track(format!("recurring-job:{id}"), handle);
        tracing::info!(recurring_id = id, ?interval, "Added recurring job");
    }

    /// Returns `false` if no such schedule existed.
    pub fn remove_recurring(&self, id: &str) -> bool {
        match self.inner.recurring.remove(id) {
            Some((_, entry)) => {
                entry.wake.notify_one();
                tracing::info!(recurring_id = id, "Removed recurring job");
                true
            }
            None => false,
        }
    }

    /// Enqueue a recurring job now, outside its schedule.
    pub fn trigger(&self, id: &str) -> Result<Uuid, JobError> {
        let job = self
            .inner
            .recurring
            .get(id)
            .map(|e| e.job.clone())
            .ok_or_else(|| JobError::UnknownRecurringJob(id.to_string()))?;

        let job_id = self.inner.submit(job, None, Some(id.to_string()));
        if let Some(mut entry) = self.inner.recurring.get_mut(id) {
            entry.info.last_job_id = Some(job_id);
            entry.info.last_run = Some(Utc::now());
        }
        tracing::info!(recurring_id = id, job_id = %job_id, "Triggered recurring job");
        Ok(job_id)
    }

    pub fn job(&self, id: Uuid) -> Option<JobRecord> {
        self.inner.records.get(&id).map(|r| r.clone())
    }

    /// Newest first, optionally filtered by state.
    pub fn jobs(&self, state: Option<JobState>) -> Vec<JobRecord> {
        let mut out: Vec<JobRecord> = self
            .inner
            .records
            .iter()
            .filter(|r| state.map_or(true, |s| r.state == s))
            .map(|r| r.clone())
            .collect();
        out.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        out
    }

    pub fn recurring(&self) -> Vec<RecurringJobInfo> {
        let mut out: Vec<RecurringJobInfo> =
            self.inner.recurring.iter().map(|e| e.info.clone()).collect();
        out.sort_by(|a, b| a.id.cmp(&b.id));
        out
    }

    pub fn stats(&self) -> JobStats {
        let mut stats = JobStats {
            recurring: self.inner.recurring.len(),
            ..JobStats::default()
        };
        for record in self.inner.records.iter() {
            match record.state {
                JobState::Scheduled => stats.scheduled += 1,
                JobState::Enqueued => stats.enqueued += 1,
                JobState::Processing => stats.processing += 1,
                JobState::Succeeded => stats.succeeded += 1,
                JobState::Failed => stats.failed += 1,
            }
        }
        stats
    }

    /// Wait until no job is executing. Returns `false` on timeout.
    pub async fn wait_idle(&self, timeout: Duration) -> bool {
        let all = u32::try_from(self.inner.worker_count).unwrap_or(u32::MAX);
        matches!(
            tokio::time::timeout(timeout, self.inner.workers.acquire_many(all)).await,
            Ok(Ok(_))
        )
    }
}

impl Inner {
    fn submit(
        self: &Arc<Self>,
        job: Arc<dyn Job>,
        delay: Option<Duration>,
        recurring_id: Option<String>,
    ) -> Uuid {
        let id = Uuid::new_v4();
        let now = Utc::now();
        self.records.insert(
            id,
            JobRecord {
                id,
                name: job.name().to_string(),
                state: if delay.is_some() {
                    JobState::Scheduled
                } else {
                    JobState::Enqueued
                },
                attempts: 0,
                created_at: now,
                updated_at: now,
                scheduled_at: delay.map(|d| now + to_chrono(d)),
                last_error: None,
                recurring_id: recurring_id.clone(),
            },
        );
        tracing::debug!(job_id = %id, job = job.name(), ?delay, "Job submitted");

        let inner = self.clone();
        tokio::spawn(async move { inner.process(id, job, delay, recurring_id).await });
        id
    }

    async fn process(
        self: Arc<Self>,
        id: Uuid,
        job: Arc<dyn Job>,
        mut delay: Option<Duration>,
        recurring_id: Option<String>,
    ) {
        let mut shutdown = self.shutdown.subscribe();
        let mut attempt = 0;

        loop {
            if let Some(d) = delay.take() {
                tokio::select! {
                    _ = tokio::time::sleep(d) => {}
                    _ = shutdown.recv() => return,
                }
                self.update(id, |r| r.state = JobState::Enqueued);
            }

            let permit = tokio::select! {
                permit = self.workers.clone().acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => return,
                },
                _ = shutdown.recv() => return,
            };

            attempt += 1;
            self.update(id, |r| {
                r.state = JobState::Processing;
                r.attempts = attempt;
            });

            let ctx = JobContext {
                job_id: id,
                attempt,
                recurring_id: recurring_id.clone(),
            };
            let outcome = AssertUnwindSafe(job.execute(ctx)).catch_unwind().await;
            drop(permit);

            let error = match outcome {
                Ok(Ok(())) => None,
                Ok(Err(e)) => Some(e.to_string()),
                Err(panic) => Some(format!("job panicked: {}", panic_message(panic.as_ref()))),
            };

            match error {
                None => {
                    self.update(id, |r| {
                        r.state = JobState::Succeeded;
                        r.last_error = None;
                        r.scheduled_at = None;
                    });
                    metrics::record_job(job.name(), "succeeded");
                    tracing::debug!(job_id = %id, job = job.name(), attempt, "Job succeeded");
                    break;
                }
                Some(e) if attempt < self.retry.max_attempts => {
                    let wait = self.retry.delay_for(attempt);
                    self.update(id, |r| {
                        r.state = JobState::Scheduled;
                        r.scheduled_at = Some(Utc::now() + to_chrono(wait));
                        r.last_error = Some(e.clone());
                    });
                    metrics::record_job(job.name(), "retried");
                    tracing::warn!(job_id = %id, job = job.name(), attempt, retry_in = ?wait, error = %e, "Job failed, retrying");
                    delay = Some(wait);
                }
                Some(e) => {
                    self.update(id, |r| {
                        r.state = JobState::Failed;
                        r.scheduled_at = None;
                        r.last_error = Some(e.clone());
                    });
                    metrics::record_job(job.name(), "failed");
                    tracing::error!(job_id = %id, job = job.name(), attempts = attempt, error = %e, "Job failed permanently");
                    break;
                }
            }
        }

        self.evict();
    }

    async fn recurring_loop(self: Arc<Self>, id: String, generation: u64) {
        let mut shutdown = self.shutdown.subscribe();

        loop {
            let (interval, wake) = match self.recurring.get(&id) {
                Some(e) if e.generation == generation => (e.interval, e.wake.clone()),
                _ => return,
            };
            if let Some(mut entry) = self.recurring.get_mut(&id) {
                entry.info.next_run = Utc::now() + to_chrono(interval);
            }

            tokio::select! {
                _ = tokio::time::sleep(interval) => self.fire_recurring(&id, generation).await,
                // Updated or removed: re-read the entry.
                _ = wake.notified() => {}
                _ = shutdown.recv() => return,
            }
        }
    }

    /// One tick. The lease is left to expire so the tick runs at most once
    /// across every instance sharing the lock.
    async fn fire_recurring(self: &Arc<Self>, id: &str, generation: u64) {
        let Some((job, interval)) = self
            .recurring
            .get(id)
            .filter(|e| e.generation == generation)
            .map(|e| (e.job.clone(), e.interval))
        else {
            return;
        };

        let key = format!("recurring-job:{id}");
        match self.lock.try_acquire(&key, interval).await {
            Ok(Some(_lease)) => {
                let job_id = self.submit(job, None, Some(id.to_string()));
                if let Some(mut entry) = self.recurring.get_mut(id) {
                    entry.info.last_run = Some(Utc::now());
                    entry.info.last_job_id = Some(job_id);
                }
            }
            Ok(None) => {
                if let Some(mut entry) = self.recurring.get_mut(id) {
                    entry.info.skipped_ticks += 1;
                }
                tracing::debug!(recurring_id = id, "Recurring tick held by another instance");
            }
            Err(e) => {
                tracing::warn!(recurring_id = id, error = %e, "Could not take recurring job lock, skipping tick");
            }
        }
    }

    fn update(&self, id: Uuid, f: impl FnOnce(&mut JobRecord)) {
        if let Some(mut record) = self.records.get_mut(&id) {
            f(&mut record);
            record.updated_at = Utc::now();
        }
    }

    fn evict(&self) {
        while self.records.len() > MAX_RECORDS {
            let oldest = self
                .records
                .iter()
                .filter(|r| r.state.is_final())
                .min_by_key(|r| r.updated_at)
                .map(|r| *r.key());
            match oldest {
                Some(id) => {
                    self.records.remove(&id);
                }
                None => break,
            }
        }
    }
}

fn to_chrono(d: Duration) -> chrono::Duration {
    chrono::Duration::from_std(d).unwrap_or(chrono::Duration::MAX)
}
