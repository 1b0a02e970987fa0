//! Job queue contract and backends.
//!
//! This crate provides:
//! - [`JobQueueClient`] — the two operations orchestration consumes
//!   (submit with an optional failure continuation, list job records)
//! - [`JobBackend`] — the worker-facing side (claim, complete, revoke)
//! - [`MemoryQueue`] — an in-process backend
//! - [`Worker`] — runs claimed jobs through registered [`JobRunner`]s

pub mod job;
pub mod memory;
pub mod worker;

use async_trait::async_trait;

use questionhub_shared::{JobRecord, JobState, Result};

pub use job::{JobHandle, JobRequest, QueuedJob, Signature, new_job_id, render_args};
pub use memory::MemoryQueue;
pub use worker::{JobRunner, Worker, WorkerStep};

/// Client side of an at-least-once asynchronous job backend.
#[async_trait]
pub trait JobQueueClient: Send + Sync {
    /// Enqueue a job. If `request.on_failure` is non-empty, the backend
    /// enqueues that chain automatically when the job fails.
    async fn submit(&self, request: JobRequest) -> Result<JobHandle>;

    /// Snapshot of every job the backend currently knows, unfiltered.
    async fn list_records(&self) -> Result<Vec<JobRecord>>;
}

/// Worker side of a job backend.
#[async_trait]
pub trait JobBackend: JobQueueClient {
    /// Claim the oldest PENDING job, marking it STARTED.
    async fn claim_next(&self) -> Result<Option<QueuedJob>>;

    /// Record `outcome` (SUCCESS or FAILURE) for a running job and enqueue
    /// its continuation, returning the continuation's handle.
    async fn complete(&self, id: &str, outcome: JobState) -> Result<Option<JobHandle>>;

    /// Mark a not-yet-finished job REVOKED. Continuations never fire for it.
    async fn revoke(&self, id: &str) -> Result<()>;
}
