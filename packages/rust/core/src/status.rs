//! Per-hash reporting of in-flight background work.
//!
//! Jobs are correlated to questions textually: the backend only reports the
//! rendered positional arguments, and the hash is the first of them. Records
//! whose arguments don't parse are ignored rather than reported as errors.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, LazyLock};

use regex::Regex;
use serde::Serialize;
use tracing::{debug, instrument};

use questionhub_queue::JobQueueClient;
use questionhub_shared::{HashToken, JobRecord, JobState, QueueConfig, Result};

/// First single-quoted positional argument of a rendered tuple or list.
static HASH_ARG_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[\[(]'(.*)',?[)\]]").expect("valid regex"));

/// What a job is doing for a question.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ActivityLabel {
    #[serde(rename = "answering")]
    Answering,
    #[serde(rename = "refreshing KG")]
    RefreshingKg,
    #[serde(rename = "something?")]
    Unclassified,
}

impl ActivityLabel {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Answering => "answering",
            Self::RefreshingKg => "refreshing KG",
            Self::Unclassified => "something?",
        }
    }

    /// Label a job by name.
    pub fn classify(name: &str, jobs: &QueueConfig) -> Self {
        if name == jobs.answer_job {
            Self::Answering
        } else if name == jobs.refresh_job {
            Self::RefreshingKg
        } else {
            Self::Unclassified
        }
    }
}

impl std::fmt::Display for ActivityLabel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Whether a record counts as in-flight work.
///
/// Everything that hasn't finished is reported, and so are revoked jobs.
pub fn is_reportable(state: JobState) -> bool {
    !matches!(state, JobState::Success | JobState::Failure) || state == JobState::Revoked
}

/// The hash a rendered argument string refers to, if any.
pub fn correlate(args: &str) -> Option<HashToken> {
    HASH_ARG_RE
        .captures(args)
        .and_then(|caps| caps.get(1))
        .map(|m| HashToken::new(m.as_str()))
}

/// Group reportable `records` by requested hash, preserving record order.
///
/// Every hash in `hashes` gets an entry; hashes nobody asked for are dropped.
pub fn summarize_records(
    records: &[JobRecord],
    hashes: &BTreeSet<HashToken>,
    jobs: &QueueConfig,
) -> BTreeMap<HashToken, Vec<ActivityLabel>> {
    let mut summary: BTreeMap<HashToken, Vec<ActivityLabel>> =
        hashes.iter().map(|h| (h.clone(), Vec::new())).collect();

    for record in records.iter().filter(|r| is_reportable(r.state)) {
        let Some(hash) = correlate(&record.args) else {
            continue;
        };
        if let Some(labels) = summary.get_mut(&hash) {
            labels.push(ActivityLabel::classify(&record.name, jobs));
        }
    }
    summary
}

/// Answers "what is running for these questions".
pub struct StatusAggregator {
    queue: Arc<dyn JobQueueClient>,
    jobs: QueueConfig,
}

impl StatusAggregator {
    pub fn new(queue: Arc<dyn JobQueueClient>, jobs: QueueConfig) -> Self {
        Self { queue, jobs }
    }

    /// Current activity labels for each requested hash, from one listing of
    /// the backend.
    #[instrument(skip_all, fields(hashes = hashes.len()))]
    pub async fn summarize(
        &self,
        hashes: &BTreeSet<HashToken>,
    ) -> Result<BTreeMap<HashToken, Vec<ActivityLabel>>> {
        let records = self.queue.list_records().await?;
        debug!(records = records.len(), "job records listed");
        Ok(summarize_records(&records, hashes, &self.jobs))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use questionhub_queue::{JobBackend, JobRequest, MemoryQueue, Signature};
    use questionhub_shared::{Kwargs, QuestionHubError};

    fn record(name: &str, args: &str, state: JobState) -> JobRecord {
        JobRecord {
            id: format!("{name}-{args}-{state}"),
            name: name.into(),
            args: args.into(),
            state,
        }
    }

    fn hashes(items: &[&str]) -> BTreeSet<HashToken> {
        items.iter().map(|h| HashToken::new(*h)).collect()
    }

    const ANSWER: &str = "tasks.answer_question";
    const REFRESH: &str = "tasks.update_kg";

    #[test]
    fn reportable_states() {
        assert!(is_reportable(JobState::Pending));
        assert!(is_reportable(JobState::Started));
        assert!(is_reportable(JobState::Retry));
        assert!(is_reportable(JobState::Revoked));
        assert!(!is_reportable(JobState::Success));
        assert!(!is_reportable(JobState::Failure));
    }

    #[test]
    fn correlation_reads_first_quoted_arg() {
        assert_eq!(correlate("('abc123',)"), Some(HashToken::new("abc123")));
        assert_eq!(correlate("['abc123']"), Some(HashToken::new("abc123")));
        assert_eq!(correlate("('abc123')"), Some(HashToken::new("abc123")));
        assert_eq!(correlate(""), None);
        assert_eq!(correlate("()"), None);
        assert_eq!(correlate("(abc123,)"), None);
        assert_eq!(correlate(" ('abc123',)"), None);
    }

    #[test]
    fn multi_arg_tuples_capture_greedily() {
        // Only single-argument jobs correlate cleanly.
        assert_eq!(correlate("('a', 'b')"), Some(HashToken::new("a', 'b")));
    }

    #[test]
    fn groups_labels_per_hash_in_record_order() {
        let records = vec![
            record(REFRESH, "('H1',)", JobState::Started),
            record(ANSWER, "('H1',)", JobState::Pending),
            record(ANSWER, "('H2',)", JobState::Success),
            record("tasks.other", "('H2',)", JobState::Revoked),
            record(ANSWER, "('H3',)", JobState::Pending),
            record(ANSWER, "garbage", JobState::Pending),
        ];
        let summary = summarize_records(&records, &hashes(&["H1", "H2", "H4"]), &QueueConfig::default());

        assert_eq!(summary.len(), 3);
        assert_eq!(
            summary[&HashToken::new("H1")],
            vec![ActivityLabel::RefreshingKg, ActivityLabel::Answering]
        );
        assert_eq!(summary[&HashToken::new("H2")], vec![ActivityLabel::Unclassified]);
        assert!(summary[&HashToken::new("H4")].is_empty());
        assert!(!summary.contains_key(&HashToken::new("H3")));
    }

    #[test]
    fn empty_request_yields_empty_summary() {
        let records = vec![record(ANSWER, "('H1',)", JobState::Pending)];
        assert!(summarize_records(&records, &BTreeSet::new(), &QueueConfig::default()).is_empty());
    }

    #[test]
    fn labels_render_as_reported() {
        assert_eq!(ActivityLabel::Answering.to_string(), "answering");
        assert_eq!(ActivityLabel::RefreshingKg.to_string(), "refreshing KG");
        assert_eq!(
            serde_json::to_string(&ActivityLabel::Unclassified).unwrap(),
            "\"something?\""
        );
    }

    #[tokio::test]
    async fn follows_a_failing_answer_through_its_chain() {
        let queue = Arc::new(MemoryQueue::new());
        let aggregator = StatusAggregator::new(queue.clone(), QueueConfig::default());
        let wanted = hashes(&["H"]);

        let kwargs = Kwargs::from([("question_id".to_string(), "q1".to_string())]);
        let handle = queue
            .submit(
                JobRequest::new(ANSWER, vec!["H".into()], kwargs)
                    .on_failure(vec![Signature::new(REFRESH), Signature::new(ANSWER)]),
            )
            .await
            .unwrap();
        let summary = aggregator.summarize(&wanted).await.unwrap();
        assert_eq!(summary[&HashToken::new("H")], vec![ActivityLabel::Answering]);

        let claimed = queue.claim_next().await.unwrap().expect("answer");
        let refresh = queue
            .complete(&claimed.id, JobState::Failure)
            .await
            .unwrap()
            .expect("refresh");
        assert_eq!(claimed.id, handle.id);
        let summary = aggregator.summarize(&wanted).await.unwrap();
        assert_eq!(summary[&HashToken::new("H")], vec![ActivityLabel::RefreshingKg]);

        queue.claim_next().await.unwrap().expect("refresh claimed");
        queue.complete(&refresh.id, JobState::Success).await.unwrap();
        let summary = aggregator.summarize(&wanted).await.unwrap();
        assert_eq!(summary[&HashToken::new("H")], vec![ActivityLabel::Answering]);
    }

    async fn live_args(queue: &MemoryQueue) -> Vec<String> {
        queue
            .list_records()
            .await
            .unwrap()
            .into_iter()
            .filter(|r| is_reportable(r.state))
            .map(|r| r.args)
            .collect()
    }

    #[tokio::test]
    async fn submitted_question_walks_answer_refresh_retry() {
        use crate::hasher::hash_graph;
        use crate::orchestrator::{RebuildPolicy, TaskOrchestrator};
        use questionhub_shared::{QueryGraph, QuestionId, UserContext};

        let graph = QueryGraph::from_machine_question(&serde_json::json!({
            "nodes": [{"id": "A"}, {"id": "B"}],
            "edges": [{"source_id": "A", "target_id": "B"}]
        }))
        .unwrap();
        let hash = hash_graph(&graph).unwrap();
        let expected_args = format!("('{hash}',)");

        let queue = Arc::new(MemoryQueue::new());
        let orchestrator = TaskOrchestrator::new(queue.clone(), QueueConfig::default());
        let aggregator = StatusAggregator::new(queue.clone(), QueueConfig::default());
        let user = UserContext {
            user_id: 1,
            email: "ann@example.com".into(),
        };
        orchestrator
            .submit(&hash, &QuestionId::new("q1"), &user, RebuildPolicy::Rebuild)
            .await
            .unwrap();

        let wanted = BTreeSet::from([hash.clone()]);
        let labels = |summary: BTreeMap<HashToken, Vec<ActivityLabel>>| summary[&hash].clone();

        assert_eq!(labels(aggregator.summarize(&wanted).await.unwrap()), [ActivityLabel::Answering]);
        assert_eq!(live_args(&queue).await, [expected_args.clone()]);

        let answer = queue.claim_next().await.unwrap().expect("answer");
        queue.complete(&answer.id, JobState::Failure).await.unwrap();
        assert_eq!(
            labels(aggregator.summarize(&wanted).await.unwrap()),
            [ActivityLabel::RefreshingKg]
        );
        assert_eq!(live_args(&queue).await, [expected_args.clone()]);

        let refresh = queue.claim_next().await.unwrap().expect("refresh");
        queue.complete(&refresh.id, JobState::Success).await.unwrap();
        assert_eq!(labels(aggregator.summarize(&wanted).await.unwrap()), [ActivityLabel::Answering]);
        assert_eq!(live_args(&queue).await, [expected_args]);

        let retry = queue.claim_next().await.unwrap().expect("retry");
        queue.complete(&retry.id, JobState::Success).await.unwrap();
        assert!(labels(aggregator.summarize(&wanted).await.unwrap()).is_empty());
        assert!(live_args(&queue).await.is_empty());
        assert!(queue.claim_next().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn listing_failure_propagates() {
        let queue = Arc::new(MemoryQueue::new());
        queue.set_available(false);
        let aggregator = StatusAggregator::new(queue, QueueConfig::default());
        let err = aggregator.summarize(&hashes(&["H"])).await.unwrap_err();
        assert!(matches!(err, QuestionHubError::QueueUnavailable(_)));
    }
}
