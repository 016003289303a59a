//! Recurring message-send jobs ("auto-text").
//!
//! Each running job owns one timer task that fires every `interval_secs`
//! and sweeps the job's targets in list order. Cancellation is cooperative:
//! cancelling a timer prevents future firings but never aborts a sweep
//! already in flight; a stale tick is neutralized by the status and token
//! checks at the top of the sweep.

use std::{collections::HashMap, sync::Arc, time::Duration};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::{
    domain::{JobId, SessionId, Target},
    errors::Error,
    sessions::{port::SessionPort, types::SendOutcome},
    store::JobStore,
    Result,
};

/// Hard floor for job intervals, in seconds.
pub const MIN_INTERVAL_SECS: u64 = 10;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Running,
    Paused,
    Stopped,
    Completed,
    Error,
}

impl JobStatus {
    /// Terminal for automatic progression. `Stopped` and `Error` can still
    /// be restarted explicitly; `Completed` cannot (the repeat budget is
    /// spent).
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Stopped | Self::Completed | Self::Error)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Paused => "paused",
            Self::Stopped => "stopped",
            Self::Completed => "completed",
            Self::Error => "error",
        }
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct JobStats {
    pub total_sent: u64,
    pub successful: u64,
    pub failed: u64,
    pub last_run: Option<DateTime<Utc>>,
    pub next_run: Option<DateTime<Utc>>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    pub session_id: SessionId,
    pub targets: Vec<Target>,
    pub message: String,
    pub interval_secs: u64,
    pub repeat_limit: Option<u32>,
    pub status: JobStatus,
    pub stats: JobStats,
    pub created_at: DateTime<Utc>,
}

impl Job {
    /// A bounded job is done once every target has been hit `repeat_limit`
    /// times, counting failures (parity with the dashboard counters).
    fn repeat_budget_spent(&self) -> bool {
        let Some(limit) = self.repeat_limit else {
            return false;
        };
        self.stats.total_sent >= limit as u64 * self.targets.len() as u64
    }
}

/// Everything needed to create a job; the scheduler assigns the id.
#[derive(Clone, Debug)]
pub struct JobSpec {
    pub session_id: SessionId,
    pub targets: Vec<Target>,
    pub message: String,
    pub interval_secs: u64,
    pub repeat_limit: Option<u32>,
    pub start_now: bool,
}

#[derive(Clone)]
pub struct JobScheduler {
    inner: Arc<SchedulerInner>,
}

struct SchedulerInner {
    sessions: Arc<dyn SessionPort>,
    store: Arc<dyn JobStore>,
    min_interval: Duration,
    state: tokio::sync::Mutex<SchedulerState>,
}

#[derive(Default)]
struct SchedulerState {
    jobs: HashMap<JobId, JobEntry>,
}

struct JobEntry {
    job: Job,
    timer: Option<TimerHandle>,
}

/// The only handle to a job's timer task. Swapping it always goes through
/// `JobEntry::swap_timer`, which cancels the previous one first, so a job
/// can never accumulate two live timers.
struct TimerHandle {
    cancel: CancellationToken,
    _task: JoinHandle<()>,
}

impl JobEntry {
    fn swap_timer(&mut self, next: Option<TimerHandle>) {
        if let Some(old) = self.timer.take() {
            // The loop exits at its next await point; an in-flight sweep is
            // allowed to finish.
            old.cancel.cancel();
        }
        self.timer = next;
    }
}

impl JobScheduler {
    pub fn new(
        sessions: Arc<dyn SessionPort>,
        store: Arc<dyn JobStore>,
        min_interval: Duration,
    ) -> Self {
        Self {
            inner: Arc::new(SchedulerInner {
                sessions,
                store,
                min_interval,
                state: tokio::sync::Mutex::new(SchedulerState::default()),
            }),
        }
    }

    /// Validate and register a new job. Validation failures leave no trace;
    /// with `start_now` the timer is armed before returning.
    pub async fn create_job(&self, spec: JobSpec) -> Result<Job> {
        let min = self.inner.min_interval.as_secs().max(MIN_INTERVAL_SECS);
        if spec.interval_secs < min {
            return Err(Error::Validation(format!(
                "interval must be at least {min}s, got {}s",
                spec.interval_secs
            )));
        }
        if spec.targets.is_empty() {
            return Err(Error::Validation("at least one target is required".to_string()));
        }
        if spec.message.trim().is_empty() {
            return Err(Error::Validation("message must not be empty".to_string()));
        }
        if !self.inner.sessions.is_connected(&spec.session_id).await {
            return Err(Error::Validation(format!(
                "unknown or disconnected session: {}",
                spec.session_id.0
            )));
        }

        let job = Job {
            id: JobId::generate(),
            session_id: spec.session_id,
            targets: spec.targets,
            message: spec.message,
            interval_secs: spec.interval_secs,
            repeat_limit: spec.repeat_limit,
            status: JobStatus::Paused,
            stats: JobStats::default(),
            created_at: Utc::now(),
        };
        let id = job.id.clone();

        {
            let mut st = self.inner.state.lock().await;
            st.jobs.insert(
                id.clone(),
                JobEntry {
                    job: job.clone(),
                    timer: None,
                },
            );
        }
        info!(job = %id.0, interval = job.interval_secs, "job created");
        self.persist(&job);

        if spec.start_now {
            return self.start_job(&id).await;
        }
        Ok(job)
    }

    /// (Re)arm a job's recurring timer. Idempotent: an already-running job
    /// gets a fresh timer and the old one is cancelled, so there is at most
    /// one active timer per job at all times. Accepted from `Paused`,
    /// `Stopped` and `Error`; a `Completed` job cannot be restarted.
    pub async fn start_job(&self, id: &JobId) -> Result<Job> {
        let snapshot = {
            let mut st = self.inner.state.lock().await;
            let entry = st
                .jobs
                .get_mut(id)
                .ok_or_else(|| Error::UnknownJob(id.0.clone()))?;

            if entry.job.status == JobStatus::Completed {
                return Err(Error::Validation(
                    "job already completed; create a new one instead".to_string(),
                ));
            }

            let interval = Duration::from_secs(entry.job.interval_secs);
            let cancel = CancellationToken::new();
            let scheduler = self.clone();
            let job_id = id.clone();
            let token = cancel.clone();
            let task = tokio::spawn(async move {
                scheduler.run_timer(job_id, interval, token).await;
            });

            entry.swap_timer(Some(TimerHandle {
                cancel,
                _task: task,
            }));
            entry.job.status = JobStatus::Running;
            entry.job.stats.next_run =
                Some(Utc::now() + chrono::Duration::seconds(entry.job.interval_secs as i64));
            entry.job.clone()
        };

        info!(job = %id.0, "job started");
        self.persist(&snapshot);
        Ok(snapshot)
    }

    /// Suspend firing without losing stats. Only a running job can pause.
    pub async fn pause_job(&self, id: &JobId) -> Result<Job> {
        let snapshot = {
            let mut st = self.inner.state.lock().await;
            let entry = st
                .jobs
                .get_mut(id)
                .ok_or_else(|| Error::UnknownJob(id.0.clone()))?;
            if entry.job.status != JobStatus::Running {
                return Err(Error::Validation(format!(
                    "only a running job can be paused (status: {})",
                    entry.job.status.as_str()
                )));
            }
            entry.swap_timer(None);
            entry.job.status = JobStatus::Paused;
            entry.job.stats.next_run = None;
            entry.job.clone()
        };

        info!(job = %id.0, "job paused");
        self.persist(&snapshot);
        Ok(snapshot)
    }

    /// Stop a running or paused job. Restarting later is allowed.
    pub async fn stop_job(&self, id: &JobId) -> Result<Job> {
        let snapshot = {
            let mut st = self.inner.state.lock().await;
            let entry = st
                .jobs
                .get_mut(id)
                .ok_or_else(|| Error::UnknownJob(id.0.clone()))?;
            if !matches!(entry.job.status, JobStatus::Running | JobStatus::Paused) {
                return Err(Error::Validation(format!(
                    "job is not active (status: {})",
                    entry.job.status.as_str()
                )));
            }
            entry.swap_timer(None);
            entry.job.status = JobStatus::Stopped;
            entry.job.stats.next_run = None;
            entry.job.clone()
        };

        info!(job = %id.0, "job stopped");
        self.persist(&snapshot);
        Ok(snapshot)
    }

    /// Cancel the timer, purge the entry and forget the job durably.
    pub async fn delete_job(&self, id: &JobId) -> Result<()> {
        {
            let mut st = self.inner.state.lock().await;
            let mut entry = st
                .jobs
                .remove(id)
                .ok_or_else(|| Error::UnknownJob(id.0.clone()))?;
            entry.swap_timer(None);
        }

        info!(job = %id.0, "job deleted");
        if let Err(e) = self.inner.store.remove(id) {
            warn!(job = %id.0, error = %e, "failed to remove job from store");
        }
        Ok(())
    }

    pub async fn get_job(&self, id: &JobId) -> Result<Job> {
        let st = self.inner.state.lock().await;
        st.jobs
            .get(id)
            .map(|e| e.job.clone())
            .ok_or_else(|| Error::UnknownJob(id.0.clone()))
    }

    pub async fn list_jobs(&self) -> Vec<Job> {
        let st = self.inner.state.lock().await;
        let mut jobs: Vec<Job> = st.jobs.values().map(|e| e.job.clone()).collect();
        jobs.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.0.cmp(&b.id.0)));
        jobs
    }

    /// Reload persisted jobs. Timers do not survive a restart, so jobs that
    /// were running come back paused; re-arming is an explicit operator
    /// action.
    pub async fn restore(&self) -> Result<usize> {
        let jobs = self.inner.store.load_all()?;
        let mut restored = 0usize;

        for mut job in jobs {
            if job.status == JobStatus::Running {
                job.status = JobStatus::Paused;
                job.stats.next_run = None;
                self.persist(&job);
            }
            let mut st = self.inner.state.lock().await;
            st.jobs.insert(
                job.id.clone(),
                JobEntry {
                    job,
                    timer: None,
                },
            );
            restored += 1;
        }

        if restored > 0 {
            info!(restored, "jobs restored from store");
        }
        Ok(restored)
    }

    /// Cancel every timer. Statuses are left untouched, so a later
    /// `restore` in a new process demotes them the usual way.
    pub async fn shutdown(&self) {
        let mut st = self.inner.state.lock().await;
        for entry in st.jobs.values_mut() {
            entry.swap_timer(None);
        }
    }

    async fn run_timer(&self, id: JobId, interval: Duration, cancel: CancellationToken) {
        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = sleep(interval) => {
                    self.fire(&id, &cancel).await;
                }
            }
        }
    }

    /// One sweep: send the job's message to every target in list order.
    /// Sequential on purpose, to bound burst load on the session and keep
    /// the statistics accounting simple.
    async fn fire(&self, id: &JobId, cancel: &CancellationToken) {
        let (session_id, targets, message) = {
            let st = self.inner.state.lock().await;
            let Some(entry) = st.jobs.get(id) else {
                return;
            };
            // A stale tick: the job changed state (or was re-armed) between
            // scheduling and firing.
            if cancel.is_cancelled() || entry.job.status != JobStatus::Running {
                return;
            }
            (
                entry.job.session_id.clone(),
                entry.job.targets.clone(),
                entry.job.message.clone(),
            )
        };

        let mut delivered = 0u64;
        let mut rejected = 0u64;
        let mut fault: Option<Error> = None;

        for target in &targets {
            match self.inner.sessions.send(&session_id, target, &message).await {
                Ok(SendOutcome::Delivered) => delivered += 1,
                Ok(SendOutcome::Rejected { reason }) => {
                    warn!(job = %id.0, target = %target.0, %reason, "delivery rejected");
                    rejected += 1;
                }
                Err(e) => {
                    // Transport fault: fatal to this sweep, remaining
                    // targets are not attempted.
                    fault = Some(e);
                    break;
                }
            }
        }

        let snapshot = {
            let mut st = self.inner.state.lock().await;
            let Some(entry) = st.jobs.get_mut(id) else {
                return;
            };

            let stats = &mut entry.job.stats;
            stats.successful += delivered;
            stats.failed += rejected;
            stats.total_sent += delivered + rejected;
            stats.last_run = Some(Utc::now());

            if cancel.is_cancelled() {
                // This timer was cancelled mid-sweep (pause, stop, re-arm).
                // The sends still count, but any state transition belongs
                // to whoever owns the job now.
            } else if let Some(e) = fault {
                error!(job = %id.0, error = %e, "sweep failed; job parked in error state");
                entry.swap_timer(None);
                entry.job.status = JobStatus::Error;
                entry.job.stats.next_run = None;
            } else if entry.job.repeat_budget_spent() {
                info!(job = %id.0, total_sent = entry.job.stats.total_sent, "repeat limit reached");
                entry.swap_timer(None);
                entry.job.status = JobStatus::Completed;
                entry.job.stats.next_run = None;
            } else {
                entry.job.stats.next_run =
                    Some(Utc::now() + chrono::Duration::seconds(entry.job.interval_secs as i64));
            }
            entry.job.clone()
        };

        self.persist(&snapshot);
    }

    // Persistence is best-effort: jobs live in memory first, the store is
    // durability for restarts.
    fn persist(&self, job: &Job) {
        if let Err(e) = self.inner.store.upsert(job) {
            warn!(job = %job.id.0, error = %e, "failed to persist job");
        }
    }
}
