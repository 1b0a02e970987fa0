//! Canonical content hashing of question graphs.
//!
//! The hash is the cache/dedup key for answer sets, so it must be stable
//! across processes and independent of node/edge ordering and of cosmetic
//! fields. Canonical form:
//! - nodes: `(id, sorted categories, sorted curies, is_set, constraints, extra)`, sorted
//! - edges: `(source, target, sorted predicates, negated, constraints, extra)`,
//!   sorted, deduplicated
//! - constraint lists and unmodelled fields as key-sorted JSON; empty ones omitted
//! - serialized as compact JSON behind a versioned prefix, digested with SHA-256

use std::collections::{BTreeMap, HashSet};

use serde::Serialize;
use serde_json::Value;
use sha2::{Digest, Sha256};
use tracing::{debug, instrument};

use questionhub_shared::{HashToken, QueryGraph, QuestionHubError, Result};

/// Prefix that versions the canonical byte encoding.
const CANONICAL_PREFIX: &[u8] = b"questionhub.graph.v1\n";

#[derive(Debug, Serialize, PartialEq, Eq, PartialOrd, Ord)]
struct CanonicalNode<'a> {
    id: &'a str,
    category: Vec<&'a str>,
    curie: Vec<&'a str>,
    is_set: bool,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    constraints: Vec<String>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    extra: BTreeMap<&'a str, String>,
}

#[derive(Debug, Serialize, PartialEq, Eq, PartialOrd, Ord)]
struct CanonicalEdge<'a> {
    source_id: &'a str,
    target_id: &'a str,
    predicate: Vec<&'a str>,
    negated: bool,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    attribute_constraints: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    qualifier_constraints: Vec<String>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    extra: BTreeMap<&'a str, String>,
}

#[derive(Debug, Serialize)]
struct CanonicalGraph<'a> {
    nodes: Vec<CanonicalNode<'a>>,
    edges: Vec<CanonicalEdge<'a>>,
}

/// Sorted, deduplicated view of a multi-valued attribute.
fn as_set(values: &[String]) -> Vec<&str> {
    let mut set: Vec<&str> = values.iter().map(String::as_str).collect();
    set.sort_unstable();
    set.dedup();
    set
}

/// Compact JSON with object keys sorted at every level.
fn canonical_json(value: &Value) -> String {
    match value {
        Value::Object(map) => {
            let mut fields: Vec<(&String, &Value)> = map.iter().collect();
            fields.sort_unstable_by(|a, b| a.0.cmp(b.0));
            let body: Vec<String> = fields
                .into_iter()
                .map(|(k, v)| format!("{}:{}", Value::String(k.clone()), canonical_json(v)))
                .collect();
            format!("{{{}}}", body.join(","))
        }
        Value::Array(items) => {
            let body: Vec<String> = items.iter().map(canonical_json).collect();
            format!("[{}]", body.join(","))
        }
        scalar => scalar.to_string(),
    }
}

/// Constraint lists are unordered: canonical JSON per entry, sorted.
fn constraint_set(values: &[Value]) -> Vec<String> {
    let mut set: Vec<String> = values.iter().map(canonical_json).collect();
    set.sort_unstable();
    set.dedup();
    set
}

fn canonical_extra(extra: &BTreeMap<String, Value>) -> BTreeMap<&str, String> {
    extra
        .iter()
        .filter(|(_, v)| !v.is_null())
        .map(|(k, v)| (k.as_str(), canonical_json(v)))
        .collect()
}

/// Validate the graph and build its canonical form.
fn canonicalize(graph: &QueryGraph) -> Result<CanonicalGraph<'_>> {
    let mut declared: HashSet<&str> = HashSet::with_capacity(graph.nodes.len());
    for node in &graph.nodes {
        if node.id.is_empty() {
            return Err(QuestionHubError::hash("node without an id"));
        }
        if !declared.insert(node.id.as_str()) {
            return Err(QuestionHubError::hash(format!(
                "duplicate node id '{}'",
                node.id
            )));
        }
    }

    let mut nodes: Vec<CanonicalNode<'_>> = graph
        .nodes
        .iter()
        .map(|n| CanonicalNode {
            id: &n.id,
            category: as_set(&n.category),
            curie: as_set(&n.curie),
            is_set: n.is_set,
            constraints: constraint_set(&n.constraints),
            extra: canonical_extra(&n.extra),
        })
        .collect();
    nodes.sort();

    let mut edges = Vec::with_capacity(graph.edges.len());
    for edge in &graph.edges {
        for endpoint in [&edge.source_id, &edge.target_id] {
            if !declared.contains(endpoint.as_str()) {
                return Err(QuestionHubError::hash(format!(
                    "edge '{}' references undeclared node '{endpoint}'",
                    edge.id
                )));
            }
        }
        edges.push(CanonicalEdge {
            source_id: &edge.source_id,
            target_id: &edge.target_id,
            predicate: as_set(&edge.predicate),
            negated: edge.negated,
            attribute_constraints: constraint_set(&edge.attribute_constraints),
            qualifier_constraints: constraint_set(&edge.qualifier_constraints),
            extra: canonical_extra(&edge.extra),
        });
    }
    edges.sort();
    edges.dedup();

    Ok(CanonicalGraph { nodes, edges })
}

/// The exact bytes that get digested for `graph`.
pub fn canonical_bytes(graph: &QueryGraph) -> Result<Vec<u8>> {
    let canonical = canonicalize(graph)?;
    let mut bytes = CANONICAL_PREFIX.to_vec();
    serde_json::to_writer(&mut bytes, &canonical)?;
    Ok(bytes)
}

/// Compute the content hash of a question graph.
#[instrument(skip_all, fields(nodes = graph.nodes.len(), edges = graph.edges.len()))]
pub fn hash_graph(graph: &QueryGraph) -> Result<HashToken> {
    let bytes = canonical_bytes(graph)?;
    let mut hasher = Sha256::new();
    hasher.update(&bytes);
    let token = HashToken::new(format!("{:x}", hasher.finalize()));
    debug!(%token, "graph hashed");
    Ok(token)
}
