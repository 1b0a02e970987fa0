//! In-process job backend.
//!
//! Jobs are kept in submission order; continuation jobs are appended when
//! their parent completes. Availability can be toggled to exercise the
//! unreachable-backend paths of callers.

use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::{debug, info};

use questionhub_shared::{JobRecord, JobState, QuestionHubError, Result};

use crate::job::{JobHandle, JobRequest, QueuedJob, new_job_id};
use crate::{JobBackend, JobQueueClient};

/// Job backend held entirely in memory.
#[derive(Debug)]
pub struct MemoryQueue {
    jobs: RwLock<Vec<QueuedJob>>,
    available: AtomicBool,
}

impl MemoryQueue {
    pub fn new() -> Self {
        Self {
            jobs: RwLock::new(Vec::new()),
            available: AtomicBool::new(true),
        }
    }

    /// Simulate the backend going away (`false`) or coming back (`true`).
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    /// Full snapshot of held jobs, continuations included.
    pub async fn jobs(&self) -> Vec<QueuedJob> {
        self.jobs.read().await.clone()
    }

    fn is_available(&self) -> bool {
        self.available.load(Ordering::SeqCst)
    }
}

impl Default for MemoryQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl JobQueueClient for MemoryQueue {
    async fn submit(&self, request: JobRequest) -> Result<JobHandle> {
        if !self.is_available() {
            return Err(QuestionHubError::Enqueue(
                "in-memory queue is unavailable".into(),
            ));
        }
        let job = QueuedJob::from_request(new_job_id(), request);
        let handle = job.handle();
        debug!(id = %job.id, name = %job.name, continuation = job.link_error.len(), "job enqueued");
        self.jobs.write().await.push(job);
        Ok(handle)
    }

    async fn list_records(&self) -> Result<Vec<JobRecord>> {
        if !self.is_available() {
            return Err(QuestionHubError::QueueUnavailable(
                "in-memory queue is unavailable".into(),
            ));
        }
        Ok(self.jobs.read().await.iter().map(QueuedJob::record).collect())
    }
}

#[async_trait]
impl JobBackend for MemoryQueue {
    async fn claim_next(&self) -> Result<Option<QueuedJob>> {
        let mut jobs = self.jobs.write().await;
        let Some(job) = jobs.iter_mut().find(|j| j.state == JobState::Pending) else {
            return Ok(None);
        };
        job.state = JobState::Started;
        Ok(Some(job.clone()))
    }

    async fn complete(&self, id: &str, outcome: JobState) -> Result<Option<JobHandle>> {
        let mut jobs = self.jobs.write().await;
        let job = jobs
            .iter_mut()
            .find(|j| j.id == id)
            .ok_or_else(|| QuestionHubError::not_found("job", id))?;
        job.finish(outcome)?;

        let follow_up = job.follow_up(outcome, new_job_id());
        info!(id, %outcome, follows = follow_up.as_ref().map(|j| j.name.as_str()), "job completed");

        Ok(follow_up.map(|next| {
            let handle = next.handle();
            jobs.push(next);
            handle
        }))
    }

    async fn revoke(&self, id: &str) -> Result<()> {
        let mut jobs = self.jobs.write().await;
        let job = jobs
            .iter_mut()
            .find(|j| j.id == id)
            .ok_or_else(|| QuestionHubError::not_found("job", id))?;
        job.revoke()
    }
}
