//! Worker loop: claim a job, run it, report the outcome.
//!
//! The answering and knowledge-graph refresh algorithms live behind
//! [`JobRunner`]; the worker only maps job names to runners and turns runner
//! results into SUCCESS/FAILURE so the backend can fire continuations.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{info, instrument, warn};

use questionhub_shared::{JobState, Result};

use crate::JobBackend;
use crate::job::{JobHandle, QueuedJob};

/// Executes one kind of job.
#[async_trait]
pub trait JobRunner: Send + Sync {
    /// Run the job; an `Err` marks it FAILURE.
    async fn run(&self, job: &QueuedJob) -> std::result::Result<(), String>;
}

/// What a single worker step did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerStep {
    pub job_id: String,
    pub name: String,
    pub outcome: JobState,
    /// Continuation enqueued by this outcome.
    pub follow_up: Option<JobHandle>,
}

/// Pulls jobs from a backend and dispatches them by name.
pub struct Worker {
    backend: Arc<dyn JobBackend>,
    runners: HashMap<String, Arc<dyn JobRunner>>,
}

impl Worker {
    pub fn new(backend: Arc<dyn JobBackend>) -> Self {
        Self {
            backend,
            runners: HashMap::new(),
        }
    }

    /// Register the runner for jobs named `name`.
    pub fn register(mut self, name: impl Into<String>, runner: Arc<dyn JobRunner>) -> Self {
        self.runners.insert(name.into(), runner);
        self
    }

    /// Claim and run one job. Returns `None` when nothing is pending.
    #[instrument(skip_all)]
    pub async fn run_once(&self) -> Result<Option<WorkerStep>> {
        let Some(job) = self.backend.claim_next().await? else {
            return Ok(None);
        };

        let outcome = match self.runners.get(&job.name) {
            Some(runner) => match runner.run(&job).await {
                Ok(()) => JobState::Success,
                Err(reason) => {
                    warn!(id = %job.id, name = %job.name, %reason, "job failed");
                    JobState::Failure
                }
            },
            None => {
                warn!(id = %job.id, name = %job.name, "no runner registered for job");
                JobState::Failure
            }
        };

        let follow_up = self.backend.complete(&job.id, outcome).await?;
        Ok(Some(WorkerStep {
            job_id: job.id,
            name: job.name,
            outcome,
            follow_up,
        }))
    }

    /// Run jobs until the backend has nothing pending. Returns the steps taken.
    pub async fn run_until_idle(&self) -> Result<Vec<WorkerStep>> {
        let mut steps = Vec::new();
        while let Some(step) = self.run_once().await? {
            steps.push(step);
        }
        info!(jobs = steps.len(), "worker idle");
        Ok(steps)
    }
}
