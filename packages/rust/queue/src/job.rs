//! Job signatures, queued-job state, and failure/success continuation mechanics.
//!
//! Continuations follow the chained-signature model: a job carries a
//! `link_error` chain to run when it fails and a `link` chain to run when it
//! succeeds. Firing a chain enqueues only its first link; the remaining links
//! ride along as that job's `link`, so the chain runs strictly in order and
//! stops at the first failing link.

use serde::{Deserialize, Serialize};

use questionhub_shared::{JobRecord, JobState, Kwargs, QuestionHubError, Result};

/// A job invocation template used inside continuation chains.
///
/// `args`/`kwargs` left as `None` inherit the values of the job whose
/// outcome fires the continuation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Signature {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub args: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kwargs: Option<Kwargs>,
}

impl Signature {
    /// A signature that inherits its parent's arguments.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            args: None,
            kwargs: None,
        }
    }

    /// Pin positional arguments instead of inheriting them.
    pub fn with_args(mut self, args: Vec<String>) -> Self {
        self.args = Some(args);
        self
    }

    /// Pin keyword arguments instead of inheriting them.
    pub fn with_kwargs(mut self, kwargs: Kwargs) -> Self {
        self.kwargs = Some(kwargs);
        self
    }
}

/// A submission: one concrete job plus an optional failure continuation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobRequest {
    pub name: String,
    pub args: Vec<String>,
    pub kwargs: Kwargs,
    /// Jobs to run, in order, if this job fails. Empty means no recovery.
    pub on_failure: Vec<Signature>,
}

impl JobRequest {
    pub fn new(name: impl Into<String>, args: Vec<String>, kwargs: Kwargs) -> Self {
        Self {
            name: name.into(),
            args,
            kwargs,
            on_failure: Vec::new(),
        }
    }

    pub fn on_failure(mut self, chain: Vec<Signature>) -> Self {
        self.on_failure = chain;
        self
    }
}

/// Handle to an enqueued job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobHandle {
    pub id: String,
    pub name: String,
}

/// A job as held by a backend, including its pending continuations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueuedJob {
    pub id: String,
    pub name: String,
    pub args: Vec<String>,
    pub kwargs: Kwargs,
    pub state: JobState,
    /// Runs after this job succeeds.
    #[serde(default)]
    pub link: Vec<Signature>,
    /// Runs after this job fails.
    #[serde(default)]
    pub link_error: Vec<Signature>,
    /// Job whose outcome enqueued this one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
}

impl QueuedJob {
    /// A fresh PENDING job for a submission.
    pub fn from_request(id: impl Into<String>, request: JobRequest) -> Self {
        Self {
            id: id.into(),
            name: request.name,
            args: request.args,
            kwargs: request.kwargs,
            state: JobState::Pending,
            link: Vec::new(),
            link_error: request.on_failure,
            parent_id: None,
        }
    }

    pub fn handle(&self) -> JobHandle {
        JobHandle {
            id: self.id.clone(),
            name: self.name.clone(),
        }
    }

    /// The backend-visible snapshot of this job.
    pub fn record(&self) -> JobRecord {
        JobRecord {
            id: self.id.clone(),
            name: self.name.clone(),
            args: render_args(&self.args),
            state: self.state,
        }
    }

    /// Move a live job to a terminal `outcome`.
    pub fn finish(&mut self, outcome: JobState) -> Result<()> {
        if !matches!(outcome, JobState::Success | JobState::Failure) {
            return Err(QuestionHubError::validation(format!(
                "jobs complete as SUCCESS or FAILURE, not {outcome}"
            )));
        }
        if self.state.is_terminal() {
            return Err(QuestionHubError::validation(format!(
                "job {} already finished as {}",
                self.id, self.state
            )));
        }
        self.state = outcome;
        Ok(())
    }

    /// Move a live job to REVOKED.
    pub fn revoke(&mut self) -> Result<()> {
        if self.state.is_terminal() {
            return Err(QuestionHubError::validation(format!(
                "job {} already finished as {}",
                self.id, self.state
            )));
        }
        self.state = JobState::Revoked;
        Ok(())
    }

    /// The job to enqueue once this job has finished with `outcome`, if any.
    pub fn follow_up(&self, outcome: JobState, next_id: impl Into<String>) -> Option<QueuedJob> {
        let chain = match outcome {
            JobState::Success => &self.link,
            JobState::Failure => &self.link_error,
            _ => return None,
        };
        let (first, rest) = chain.split_first()?;

        Some(QueuedJob {
            id: next_id.into(),
            name: first.name.clone(),
            args: first.args.clone().unwrap_or_else(|| self.args.clone()),
            kwargs: first.kwargs.clone().unwrap_or_else(|| self.kwargs.clone()),
            state: JobState::Pending,
            link: rest.to_vec(),
            link_error: Vec::new(),
            parent_id: Some(self.id.clone()),
        })
    }
}

/// Render positional arguments the way the queue backend reports them:
/// a tuple of single-quoted strings (`('abc',)`, `('a', 'b')`, `()`).
pub fn render_args(args: &[String]) -> String {
    let quoted: Vec<String> = args
        .iter()
        .map(|a| format!("'{}'", a.replace('\\', "\\\\").replace('\'', "\\'")))
        .collect();
    match quoted.as_slice() {
        [] => "()".to_string(),
        [only] => format!("({only},)"),
        many => format!("({})", many.join(", ")),
    }
}

/// Generate a backend job id.
pub fn new_job_id() -> String {
    uuid::Uuid::new_v4().to_string()
}
