//! Durable job queue
//!
//! Requests are kept in arrival order in `jobs.json`. Every mutation is
//! applied to a copy, persisted with an atomic replace, and only then
//! published, so the file and memory never disagree.
//!
//! Deduplication is by normalized name against pending requests (Queued,
//! Placed, Engraving). A retried request keeps its arrival position but is
//! gated by `not_before`; later requests may run while it waits.

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Notify;

use engravekit_core::{
    persist, AppEvent, BackoffPolicy, EngraveRequest, Error, EventBus, JobEvent, JobId,
    JobPlacement, JobSource, JobStatus, Result,
};
use engravekit_settings::JobSettings;

/// Error text for jobs found mid-engrave at startup
pub const INTERRUPTED: &str = "interrupted by restart";

/// How an engraving attempt ended
#[derive(Debug, Clone, PartialEq)]
pub enum JobOutcome {
    Done,
    Failed {
        error: String,
        /// Transient failure; requeue while retries remain
        retryable: bool,
    },
}

impl JobOutcome {
    pub fn failed(err: &Error) -> Self {
        JobOutcome::Failed {
            error: err.to_string(),
            retryable: err.is_retryable(),
        }
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct JobFile {
    jobs: Vec<EngraveRequest>,
}

/// Retry and history policy
#[derive(Debug, Clone)]
struct QueuePolicy {
    max_retries: u32,
    backoff: BackoffPolicy,
    history_limit: usize,
}

impl From<&JobSettings> for QueuePolicy {
    fn from(settings: &JobSettings) -> Self {
        Self {
            max_retries: settings.max_retries,
            backoff: settings.retry_backoff(),
            history_limit: settings.history_limit,
        }
    }
}

pub struct JobQueue {
    jobs: RwLock<Vec<EngraveRequest>>,
    policy: RwLock<QueuePolicy>,
    path: Option<PathBuf>,
    notify: Notify,
    events: Option<Arc<EventBus>>,
}

impl std::fmt::Debug for JobQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobQueue")
            .field("path", &self.path)
            .field("jobs", &self.jobs.read().len())
            .finish()
    }
}

impl JobQueue {
    /// Load `path` and recover requests interrupted by a restart.
    ///
    /// `Placed` requests go back to `Queued`. `Engraving` requests become
    /// `Failed`: the head may have burned part of the name, so they are
    /// never re-run silently.
    pub fn open(path: impl Into<PathBuf>, settings: &JobSettings) -> Result<Self> {
        let path = path.into();
        let mut jobs = persist::read_json::<JobFile>(&path)?
            .unwrap_or_default()
            .jobs;

        let mut recovered = 0;
        for job in jobs.iter_mut() {
            match job.status {
                JobStatus::Placed => {
                    job.status = JobStatus::Queued;
                    job.placement = None;
                    recovered += 1;
                }
                JobStatus::Engraving => {
                    job.status = JobStatus::Failed;
                    job.error = Some(INTERRUPTED.to_string());
                    job.completed_at = Some(Utc::now());
                    recovered += 1;
                    tracing::warn!(job_id = %job.id, name = %job.name, "job was engraving at shutdown, marked failed");
                }
                _ => {}
            }
        }

        let queue = Self {
            jobs: RwLock::new(Vec::new()),
            policy: RwLock::new(QueuePolicy::from(settings)),
            path: Some(path),
            notify: Notify::new(),
            events: None,
        };
        queue.mutate(|all| {
            *all = jobs;
            Ok(())
        })?;

        let pending = queue.pending().len();
        tracing::info!(pending, recovered, "job queue loaded");
        Ok(queue)
    }

    /// A queue without persistence
    pub fn in_memory(settings: &JobSettings) -> Self {
        Self {
            jobs: RwLock::new(Vec::new()),
            policy: RwLock::new(QueuePolicy::from(settings)),
            path: None,
            notify: Notify::new(),
            events: None,
        }
    }

    /// Publish job events on `bus`
    pub fn with_events(mut self, bus: Arc<EventBus>) -> Self {
        self.events = Some(bus);
        self
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Apply new retry and history settings to subsequent results
    pub fn set_policy(&self, settings: &JobSettings) {
        *self.policy.write() = QueuePolicy::from(settings);
    }

    /// Accept a request unless the same name is still pending
    pub fn enqueue(&self, name: &str, source: JobSource) -> Result<EngraveRequest> {
        let request = EngraveRequest::new(name, source)?;
        let result = self.mutate(|jobs| {
            if jobs
                .iter()
                .any(|j| j.status.is_pending() && j.normalized_name == request.normalized_name)
            {
                return Err(Error::Duplicate {
                    name: request.normalized_name.clone(),
                });
            }
            jobs.push(request.clone());
            Ok(())
        });

        match result {
            Ok(()) => {
                tracing::info!(job_id = %request.id, name = %request.name, source = %source, "job queued");
                self.emit(JobEvent::Enqueued {
                    id: request.id.to_string(),
                    name: request.name.clone(),
                    source,
                });
                self.notify.notify_one();
                Ok(request)
            }
            Err(err @ Error::Duplicate { .. }) => {
                tracing::debug!(name = %request.name, "duplicate request ignored");
                self.emit(JobEvent::DuplicateRejected {
                    name: request.name.clone(),
                });
                Err(err)
            }
            Err(err) => Err(err),
        }
    }

    /// First request in arrival order that may run at `now`
    pub fn next_ready(&self, now: DateTime<Utc>) -> Option<EngraveRequest> {
        self.jobs.read().iter().find(|j| j.is_ready(now)).cloned()
    }

    /// Earliest time a gated retry becomes ready
    pub fn next_retry_at(&self) -> Option<DateTime<Utc>> {
        self.jobs
            .read()
            .iter()
            .filter(|j| j.status == JobStatus::Queued)
            .filter_map(|j| j.not_before)
            .min()
    }

    /// Space reserved for `id`
    pub fn mark_placed(&self, id: &JobId, placement: JobPlacement) -> Result<EngraveRequest> {
        self.update(id, |job, _| {
            expect_status(job, &[JobStatus::Queued])?;
            job.status = JobStatus::Placed;
            job.placement = Some(placement);
            Ok(())
        })
    }

    /// Streaming to the device begins; at most one request engraves at a time
    pub fn mark_engraving(&self, id: &JobId) -> Result<EngraveRequest> {
        self.mutate(|jobs| {
            if let Some(other) = jobs
                .iter()
                .find(|j| j.status == JobStatus::Engraving && &j.id != id)
            {
                return Err(Error::other(format!(
                    "job {} is already engraving",
                    other.id
                )));
            }
            let job = find_mut(jobs, id)?;
            expect_status(job, &[JobStatus::Placed])?;
            job.status = JobStatus::Engraving;
            Ok(job.clone())
        })
    }

    /// Record the outcome of an attempt.
    ///
    /// A retryable failure with retries left returns the request to
    /// `Queued` with `retry_count + 1` and a backoff gate; any other failure
    /// is terminal.
    pub fn mark_result(&self, id: &JobId, outcome: JobOutcome) -> Result<EngraveRequest> {
        let policy = self.policy.read().clone();
        let job = self.update(id, |job, now| {
            if job.status.is_terminal() {
                return Err(Error::validation(format!(
                    "job {} is already {}",
                    job.id, job.status
                )));
            }
            match &outcome {
                JobOutcome::Done => {
                    job.status = JobStatus::Done;
                    job.completed_at = Some(now);
                    job.error = None;
                    job.not_before = None;
                }
                JobOutcome::Failed { error, retryable } => {
                    job.error = Some(error.clone());
                    if *retryable && job.retry_count < policy.max_retries {
                        let delay = policy.backoff.delay(job.retry_count);
                        job.retry_count += 1;
                        job.status = JobStatus::Queued;
                        job.placement = None;
                        job.not_before = Some(
                            now + chrono::Duration::from_std(delay)
                                .unwrap_or_else(|_| chrono::Duration::zero()),
                        );
                    } else {
                        job.status = JobStatus::Failed;
                        job.completed_at = Some(now);
                        job.not_before = None;
                    }
                }
            }
            Ok(())
        })?;

        let id = job.id.to_string();
        match (&outcome, job.status) {
            (JobOutcome::Done, _) => {
                tracing::info!(job_id = %id, name = %job.name, "job done");
                self.emit(JobEvent::Completed {
                    id,
                    name: job.name.clone(),
                });
            }
            (JobOutcome::Failed { error, .. }, JobStatus::Queued) => {
                let delay_ms = job
                    .not_before
                    .map(|t| (t - Utc::now()).num_milliseconds().max(0) as u64)
                    .unwrap_or(0);
                tracing::warn!(job_id = %id, attempt = job.retry_count, delay_ms, "job failed, will retry: {}", error);
                self.emit(JobEvent::Failed {
                    id: id.clone(),
                    error: error.clone(),
                    will_retry: true,
                });
                self.emit(JobEvent::Requeued {
                    id,
                    attempt: job.retry_count,
                    delay_ms,
                });
                self.notify.notify_one();
            }
            (JobOutcome::Failed { error, .. }, _) => {
                tracing::error!(job_id = %id, name = %job.name, "job failed: {}", error);
                self.emit(JobEvent::Failed {
                    id,
                    error: error.clone(),
                    will_retry: false,
                });
            }
        }
        Ok(job)
    }

    /// Submit a finished request's name again as a new manual request
    pub fn redo(&self, id: &JobId) -> Result<EngraveRequest> {
        let job = self
            .get(id)
            .ok_or_else(|| Error::NotFound(format!("job {}", id)))?;
        if !job.status.is_terminal() {
            return Err(Error::validation(format!(
                "job {} is still {}",
                job.id, job.status
            )));
        }
        self.enqueue(&job.name, JobSource::Manual)
    }

    pub fn get(&self, id: &JobId) -> Option<EngraveRequest> {
        self.jobs.read().iter().find(|j| &j.id == id).cloned()
    }

    /// Pending requests in arrival order
    pub fn pending(&self) -> Vec<EngraveRequest> {
        self.jobs
            .read()
            .iter()
            .filter(|j| j.status.is_pending())
            .cloned()
            .collect()
    }

    /// Every request kept, in arrival order
    pub fn all(&self) -> Vec<EngraveRequest> {
        self.jobs.read().clone()
    }

    /// Number of pending requests
    pub fn len(&self) -> usize {
        self.jobs
            .read()
            .iter()
            .filter(|j| j.status.is_pending())
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Resolves after the next enqueue or requeue
    pub async fn changed(&self) {
        self.notify.notified().await
    }

    fn update<F>(&self, id: &JobId, f: F) -> Result<EngraveRequest>
    where
        F: FnOnce(&mut EngraveRequest, DateTime<Utc>) -> Result<()>,
    {
        let now = Utc::now();
        self.mutate(|jobs| {
            let job = find_mut(jobs, id)?;
            f(job, now)?;
            Ok(job.clone())
        })
    }

    /// Apply `f` to a copy, prune, persist, then publish
    fn mutate<R, F>(&self, f: F) -> Result<R>
    where
        F: FnOnce(&mut Vec<EngraveRequest>) -> Result<R>,
    {
        let mut jobs = self.jobs.write();
        let mut next = jobs.clone();
        let result = f(&mut next)?;
        prune_history(&mut next, self.policy.read().history_limit);
        if let Some(path) = &self.path {
            persist::write_json(path, &JobFile { jobs: next.clone() })?;
        }
        *jobs = next;
        Ok(result)
    }

    fn emit(&self, event: JobEvent) {
        if let Some(bus) = &self.events {
            bus.emit(AppEvent::Job(event));
        }
    }
}

fn find_mut<'a>(jobs: &'a mut [EngraveRequest], id: &JobId) -> Result<&'a mut EngraveRequest> {
    jobs.iter_mut()
        .find(|j| &j.id == id)
        .ok_or_else(|| Error::NotFound(format!("job {}", id)))
}

fn expect_status(job: &EngraveRequest, allowed: &[JobStatus]) -> Result<()> {
    if allowed.contains(&job.status) {
        Ok(())
    } else {
        Err(Error::validation(format!(
            "job {} is {}",
            job.id, job.status
        )))
    }
}

/// Drop the oldest finished requests beyond `limit`
fn prune_history(jobs: &mut Vec<EngraveRequest>, limit: usize) {
    let finished = jobs.iter().filter(|j| j.status.is_terminal()).count();
    let mut excess = finished.saturating_sub(limit);
    if excess == 0 {
        return;
    }
    jobs.retain(|j| {
        if excess > 0 && j.status.is_terminal() {
            excess -= 1;
            false
        } else {
            true
        }
    });
}
