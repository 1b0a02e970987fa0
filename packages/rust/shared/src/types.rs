//! Core domain types for QuestionHub questions, answer sets, and job records.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

use crate::error::{QuestionHubError, Result};

// ---------------------------------------------------------------------------
// Identifiers
// ---------------------------------------------------------------------------

/// Canonical content digest of a question graph (SHA-256, lowercase hex).
///
/// Used as the cache/dedup key for answer sets and as the sole positional
/// argument of answering and refresh jobs.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct HashToken(String);

impl HashToken {
    /// Wrap an already-computed digest.
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for HashToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Opaque, externally assigned question identifier.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct QuestionId(String);

impl QuestionId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for QuestionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

// ---------------------------------------------------------------------------
// Query graph
// ---------------------------------------------------------------------------

/// A node of a question graph.
///
/// Fields not modelled here are kept in `extra` and count as meaningful.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryNode {
    /// Node identifier, referenced by edges.
    #[serde(default)]
    pub id: String,
    /// Semantic categories (biolink-style types).
    #[serde(
        default,
        alias = "type",
        alias = "categories",
        deserialize_with = "one_or_many",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub category: Vec<String>,
    /// Pinned identifiers constraining this node.
    #[serde(
        default,
        alias = "ids",
        deserialize_with = "one_or_many",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub curie: Vec<String>,
    /// Whether the node stands for a set of entities.
    #[serde(default)]
    pub is_set: bool,
    /// Attribute constraints on matching entities.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub constraints: Vec<serde_json::Value>,
    /// Display name (cosmetic).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Display label (cosmetic).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

/// A directed edge of a question graph.
///
/// Fields not modelled here are kept in `extra` and count as meaningful.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryEdge {
    /// Edge identifier (cosmetic: edges are identified by their endpoints and relation).
    #[serde(default)]
    pub id: String,
    /// Source node id.
    #[serde(alias = "subject")]
    pub source_id: String,
    /// Target node id.
    #[serde(alias = "object")]
    pub target_id: String,
    /// Relation constraints.
    #[serde(
        default,
        alias = "type",
        alias = "predicates",
        deserialize_with = "one_or_many",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub predicate: Vec<String>,
    /// Whether the relation is negated.
    #[serde(default)]
    pub negated: bool,
    /// Constraints on edge attributes.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attribute_constraints: Vec<serde_json::Value>,
    /// Constraints on edge qualifiers.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub qualifier_constraints: Vec<serde_json::Value>,
    /// Display label (cosmetic).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

/// A question's graph payload: nodes and edges, logically unordered sets.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryGraph {
    pub nodes: Vec<QueryNode>,
    pub edges: Vec<QueryEdge>,
}

impl QueryGraph {
    /// Convert a machine question into a graph.
    ///
    /// Accepts both the list form (`"nodes": [{"id": "n0", ..}]`) and the
    /// dictionary form (`"nodes": {"n0": {..}}`), where the map key becomes
    /// the entry's `id`.
    pub fn from_machine_question(value: &serde_json::Value) -> Result<Self> {
        let nodes = entries(value, "nodes")?;
        let edges = entries(value, "edges")?;

        let nodes = nodes
            .into_iter()
            .map(serde_json::from_value)
            .collect::<std::result::Result<Vec<QueryNode>, _>>()
            .map_err(|e| QuestionHubError::validation(format!("invalid node: {e}")))?;
        let edges = edges
            .into_iter()
            .map(serde_json::from_value)
            .collect::<std::result::Result<Vec<QueryEdge>, _>>()
            .map_err(|e| QuestionHubError::validation(format!("invalid edge: {e}")))?;

        Ok(Self { nodes, edges })
    }
}

/// Pull the `key` collection out of a machine question, normalising the
/// dictionary form into a list of objects carrying their own `id`.
fn entries(value: &serde_json::Value, key: &str) -> Result<Vec<serde_json::Value>> {
    match value.get(key) {
        Some(serde_json::Value::Array(list)) => Ok(list.clone()),
        Some(serde_json::Value::Object(map)) => map
            .iter()
            .map(|(id, entry)| match entry {
                serde_json::Value::Object(fields) => {
                    let mut fields = fields.clone();
                    fields.insert("id".into(), serde_json::Value::String(id.clone()));
                    Ok(serde_json::Value::Object(fields))
                }
                _ => Err(QuestionHubError::validation(format!(
                    "{key} entry '{id}' must be an object"
                ))),
            })
            .collect(),
        Some(_) => Err(QuestionHubError::validation(format!(
            "\"{key}\" must be a list or an object"
        ))),
        None => Err(QuestionHubError::validation(format!(
            "a query graph requires a \"{key}\" property"
        ))),
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum OneOrMany {
    One(String),
    Many(Vec<String>),
}

/// Accept either a single string or a list of strings.
fn one_or_many<'de, D>(deserializer: D) -> std::result::Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<OneOrMany>::deserialize(deserializer)? {
        None => Vec::new(),
        Some(OneOrMany::One(s)) => vec![s],
        Some(OneOrMany::Many(v)) => v,
    })
}

// ---------------------------------------------------------------------------
// Users
// ---------------------------------------------------------------------------

/// A registered user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub email: String,
}

/// The identity a request is made on behalf of.
///
/// Always passed explicitly into orchestration calls.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserContext {
    pub user_id: i64,
    pub email: String,
}

impl From<&User> for UserContext {
    fn from(user: &User) -> Self {
        Self {
            user_id: user.id,
            email: user.email.clone(),
        }
    }
}

// ---------------------------------------------------------------------------
// Questions & answer sets
// ---------------------------------------------------------------------------

/// A submitted question. `hash` is fixed at creation time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Question {
    pub id: QuestionId,
    pub hash: HashToken,
    pub user_id: i64,
    pub name: String,
    #[serde(default)]
    pub natural_question: String,
    #[serde(default)]
    pub notes: String,
    #[serde(flatten)]
    pub graph: QueryGraph,
    pub created_at: DateTime<Utc>,
}

/// The persisted result of a successful answering job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnswerSet {
    pub id: String,
    pub question_hash: HashToken,
    pub timestamp: DateTime<Utc>,
    /// Opaque answer payload.
    #[serde(default)]
    pub payload: serde_json::Value,
}

// ---------------------------------------------------------------------------
// Job records
// ---------------------------------------------------------------------------

/// Job state as reported by the queue backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum JobState {
    Pending,
    Started,
    Retry,
    Success,
    Failure,
    Revoked,
}

impl JobState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Started => "STARTED",
            Self::Retry => "RETRY",
            Self::Success => "SUCCESS",
            Self::Failure => "FAILURE",
            Self::Revoked => "REVOKED",
        }
    }

    /// Whether the job can no longer change state.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Success | Self::Failure | Self::Revoked)
    }
}

impl std::fmt::Display for JobState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for JobState {
    type Err = QuestionHubError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "PENDING" => Ok(Self::Pending),
            "STARTED" => Ok(Self::Started),
            "RETRY" => Ok(Self::Retry),
            "SUCCESS" => Ok(Self::Success),
            "FAILURE" => Ok(Self::Failure),
            "REVOKED" => Ok(Self::Revoked),
            other => Err(QuestionHubError::validation(format!(
                "unknown job state '{other}'"
            ))),
        }
    }
}

/// A point-in-time snapshot of one job known to the queue backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobRecord {
    pub id: String,
    pub name: String,
    /// Rendered positional arguments, e.g. `('abc123',)`.
    pub args: String,
    pub state: JobState,
}

/// Keyword arguments attached to a job.
pub type Kwargs = BTreeMap<String, String>;
