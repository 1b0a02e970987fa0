//! Submission of answering work, with the refresh-then-retry recovery chain.

use std::sync::Arc;

use tracing::{info, instrument};

use questionhub_queue::{JobHandle, JobQueueClient, JobRequest, Signature};
use questionhub_shared::{
    HashToken, Kwargs, QueueConfig, QuestionHubError, QuestionId, Result, UserContext,
};

/// Whether a submission may reuse cached knowledge-graph results.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RebuildPolicy {
    /// Answer, and on failure refresh the knowledge graph and answer again.
    #[default]
    Rebuild,
    /// Answer only.
    ReuseCache,
}

impl RebuildPolicy {
    /// Interpret a `RebuildCache` header value: absent or `"true"` rebuilds,
    /// anything else reuses the cache.
    pub fn from_header(value: Option<&str>) -> Self {
        match value {
            None | Some("true") => Self::Rebuild,
            Some(_) => Self::ReuseCache,
        }
    }

    pub fn rebuilds(self) -> bool {
        matches!(self, Self::Rebuild)
    }
}

impl From<bool> for RebuildPolicy {
    fn from(rebuild: bool) -> Self {
        if rebuild { Self::Rebuild } else { Self::ReuseCache }
    }
}

/// Enqueues answering jobs for question hashes.
pub struct TaskOrchestrator {
    queue: Arc<dyn JobQueueClient>,
    jobs: QueueConfig,
}

impl TaskOrchestrator {
    pub fn new(queue: Arc<dyn JobQueueClient>, jobs: QueueConfig) -> Self {
        Self { queue, jobs }
    }

    /// Enqueue an answer job for `hash` and return its handle without waiting.
    ///
    /// With [`RebuildPolicy::Rebuild`] the job carries a failure continuation
    /// `[refresh(hash), answer(hash)]`; the retry only runs if the refresh
    /// succeeds. The hash is not checked against stored questions.
    #[instrument(skip_all, fields(hash = %hash, question_id = %question_id, rebuild = policy.rebuilds()))]
    pub async fn submit(
        &self,
        hash: &HashToken,
        question_id: &QuestionId,
        user: &UserContext,
        policy: RebuildPolicy,
    ) -> Result<JobHandle> {
        let args = vec![hash.as_str().to_string()];
        let kwargs = Kwargs::from([
            ("question_id".to_string(), question_id.as_str().to_string()),
            ("user_email".to_string(), user.email.clone()),
        ]);

        let mut request = JobRequest::new(&self.jobs.answer_job, args.clone(), kwargs.clone());
        if policy.rebuilds() {
            request = request.on_failure(vec![
                Signature::new(&self.jobs.refresh_job)
                    .with_args(args.clone())
                    .with_kwargs(kwargs.clone()),
                Signature::new(&self.jobs.answer_job)
                    .with_args(args)
                    .with_kwargs(kwargs),
            ]);
        }

        let handle = self.queue.submit(request).await.map_err(|e| match e {
            QuestionHubError::Enqueue(_) => e,
            other => QuestionHubError::Enqueue(other.to_string()),
        })?;

        info!(job_id = %handle.id, "answer job enqueued");
        Ok(handle)
    }
}
