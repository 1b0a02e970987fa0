//! Question lifecycle: build, persist, submit, and list with live status.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};

use questionhub_queue::JobQueueClient;
use questionhub_shared::{
    AnswerSet, HashToken, IdGenerator, QueryGraph, QueueConfig, Question, QuestionId, Result,
    UserContext,
};
use questionhub_storage::Storage;

use crate::hasher::hash_graph;
use crate::orchestrator::{RebuildPolicy, TaskOrchestrator};
use crate::status::{ActivityLabel, StatusAggregator};

/// A question as submitted by a user, before it has an id or hash.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewQuestion {
    pub name: String,
    #[serde(default)]
    pub natural_question: String,
    #[serde(default)]
    pub notes: String,
    /// Query graph in either list or id-keyed form.
    pub machine_question: serde_json::Value,
}

/// A stored question as listed: metadata, owner, latest answers, live tasks.
#[derive(Debug, Clone, Serialize)]
pub struct QuestionSummary {
    pub id: QuestionId,
    pub hash: HashToken,
    pub name: String,
    pub natural_question: String,
    pub notes: String,
    pub user_email: Option<String>,
    pub created_at: DateTime<Utc>,
    pub latest_answerset_id: Option<String>,
    pub latest_answerset_timestamp: Option<DateTime<Utc>>,
    pub tasks: Vec<ActivityLabel>,
}

pub struct QuestionService {
    storage: Arc<Storage>,
    orchestrator: TaskOrchestrator,
    status: StatusAggregator,
    ids: Arc<dyn IdGenerator>,
}

impl QuestionService {
    pub fn new(
        storage: Arc<Storage>,
        queue: Arc<dyn JobQueueClient>,
        jobs: QueueConfig,
        ids: Arc<dyn IdGenerator>,
    ) -> Self {
        Self {
            storage,
            orchestrator: TaskOrchestrator::new(queue.clone(), jobs.clone()),
            status: StatusAggregator::new(queue, jobs),
            ids,
        }
    }

    pub fn orchestrator(&self) -> &TaskOrchestrator {
        &self.orchestrator
    }

    pub fn status(&self) -> &StatusAggregator {
        &self.status
    }

    /// Build a question (fresh id and content hash) without storing it.
    pub fn convert(&self, new: NewQuestion, user_id: i64) -> Result<Question> {
        let graph = QueryGraph::from_machine_question(&new.machine_question)?;
        let hash = hash_graph(&graph)?;
        Ok(Question {
            id: self.ids.next(),
            hash,
            user_id,
            name: new.name,
            natural_question: new.natural_question,
            notes: new.notes,
            graph,
            created_at: Utc::now(),
        })
    }

    /// Store a new question, then enqueue answering for it.
    ///
    /// The question stays stored even if the enqueue fails.
    #[instrument(skip_all, fields(user = %user.email, ?policy))]
    pub async fn create(
        &self,
        new: NewQuestion,
        user: &UserContext,
        policy: RebuildPolicy,
    ) -> Result<QuestionId> {
        let question = self.convert(new, user.user_id)?;
        self.storage.insert_question(&question).await?;
        info!(id = %question.id, hash = %question.hash, "question stored");

        self.orchestrator
            .submit(&question.hash, &question.id, user, policy)
            .await?;
        Ok(question.id)
    }

    /// Every stored question with its owner, latest answer set, and the
    /// activity currently running for its hash.
    #[instrument(skip_all)]
    pub async fn list(&self) -> Result<Vec<QuestionSummary>> {
        let questions = self.storage.list_questions().await?;
        self.summarize(questions).await
    }

    /// Like [`list`](Self::list), restricted to one user's questions.
    #[instrument(skip_all, fields(user_id = user_id))]
    pub async fn list_for_user(&self, user_id: i64) -> Result<Vec<QuestionSummary>> {
        let questions = self.storage.list_questions_by_user(user_id).await?;
        self.summarize(questions).await
    }

    /// Full answer-set history for a question hash, oldest first.
    pub async fn answers(&self, hash: &HashToken) -> Result<Vec<AnswerSet>> {
        self.storage.list_answersets(hash).await
    }

    async fn summarize(&self, questions: Vec<Question>) -> Result<Vec<QuestionSummary>> {
        let hashes: BTreeSet<HashToken> = questions.iter().map(|q| q.hash.clone()).collect();
        let tasks = self.status.summarize(&hashes).await?;

        let mut emails: HashMap<i64, Option<String>> = HashMap::new();
        let mut summaries = Vec::with_capacity(questions.len());
        for question in questions {
            let user_email = match emails.get(&question.user_id) {
                Some(email) => email.clone(),
                None => {
                    let email = self
                        .storage
                        .get_user(question.user_id)
                        .await?
                        .map(|u| u.email);
                    emails.insert(question.user_id, email.clone());
                    email
                }
            };
            let latest = self.storage.latest_answerset(&question.hash).await?;
            let question_tasks = tasks.get(&question.hash).cloned().unwrap_or_default();

            summaries.push(QuestionSummary {
                id: question.id,
                hash: question.hash,
                name: question.name,
                natural_question: question.natural_question,
                notes: question.notes,
                user_email,
                created_at: question.created_at,
                latest_answerset_id: latest.as_ref().map(|a| a.id.clone()),
                latest_answerset_timestamp: latest.map(|a| a.timestamp),
                tasks: question_tasks,
            });
        }
        Ok(summaries)
    }
}
