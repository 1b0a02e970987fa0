//! libSQL storage layer.
//!
//! The [`Storage`] struct wraps a libSQL database for users, questions,
//! answer sets, and the durable job table (see [`jobs`]).
//!
//! **Access rules:**
//! - CLI and services: read-write via [`Storage::open`]
//! - Reporting tools: read-only via [`Storage::open_readonly`]

pub mod jobs;
mod migrations;

use std::path::Path;

use chrono::{DateTime, Utc};
use libsql::{Connection, Database, params};

use questionhub_shared::{
    AnswerSet, HashToken, QueryGraph, Question, QuestionHubError, QuestionId, Result, User,
};

/// Primary storage handle wrapping a libSQL database.
pub struct Storage {
    #[allow(dead_code)]
    db: Database,
    conn: Connection,
    readonly: bool,
}

/// Map a libSQL error into the storage error variant.
pub(crate) fn storage_err(e: impl std::fmt::Display) -> QuestionHubError {
    QuestionHubError::Storage(e.to_string())
}

impl Storage {
    /// Open or create a database at `path` in read-write mode.
    pub async fn open(path: &Path) -> Result<Self> {
        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| QuestionHubError::io(parent, e))?;
            }
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(storage_err)?;
        let conn = db.connect().map_err(storage_err)?;

        let storage = Self {
            db,
            conn,
            readonly: false,
        };
        storage.run_migrations().await?;
        Ok(storage)
    }

    /// Open a database at `path` in read-only mode.
    pub async fn open_readonly(path: &Path) -> Result<Self> {
        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(storage_err)?;
        let conn = db.connect().map_err(storage_err)?;

        Ok(Self {
            db,
            conn,
            readonly: true,
        })
    }

    /// Run pending schema migrations.
    async fn run_migrations(&self) -> Result<()> {
        let current_version = self.get_schema_version().await;

        for migration in migrations::all_migrations() {
            if migration.version > current_version {
                tracing::info!(
                    version = migration.version,
                    description = migration.description,
                    "applying migration"
                );
                self.conn
                    .execute_batch(migration.sql)
                    .await
                    .map_err(|e| {
                        QuestionHubError::Storage(format!(
                            "migration v{} failed: {e}",
                            migration.version
                        ))
                    })?;
            }
        }
        Ok(())
    }

    /// Get the current schema version, or 0 if no migrations have been applied.
    async fn get_schema_version(&self) -> u32 {
        let result = self
            .conn
            .query("SELECT MAX(version) FROM schema_migrations", params![])
            .await;

        match result {
            Ok(mut rows) => {
                if let Ok(Some(row)) = rows.next().await {
                    row.get::<u32>(0).unwrap_or(0)
                } else {
                    0
                }
            }
            Err(_) => 0, // Table doesn't exist yet
        }
    }

    /// Ensure we're in read-write mode before writing.
    fn check_writable(&self) -> Result<()> {
        if self.readonly {
            return Err(QuestionHubError::Storage(
                "database is opened in read-only mode".into(),
            ));
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Users
    // -----------------------------------------------------------------------

    /// Register a user by email and return it.
    pub async fn insert_user(&self, email: &str) -> Result<User> {
        self.check_writable()?;
        self.conn
            .execute("INSERT INTO users (email) VALUES (?1)", params![email])
            .await
            .map_err(storage_err)?;
        Ok(User {
            id: self.conn.last_insert_rowid(),
            email: email.to_string(),
        })
    }

    /// Look up a user by email.
    pub async fn get_user_by_email(&self, email: &str) -> Result<Option<User>> {
        let mut rows = self
            .conn
            .query("SELECT id, email FROM users WHERE email = ?1", params![email])
            .await
            .map_err(storage_err)?;

        match rows.next().await.map_err(storage_err)? {
            Some(row) => Ok(Some(row_to_user(&row)?)),
            None => Ok(None),
        }
    }

    /// Look up a user by id.
    pub async fn get_user(&self, id: i64) -> Result<Option<User>> {
        let mut rows = self
            .conn
            .query("SELECT id, email FROM users WHERE id = ?1", params![id])
            .await
            .map_err(storage_err)?;

        match rows.next().await.map_err(storage_err)? {
            Some(row) => Ok(Some(row_to_user(&row)?)),
            None => Ok(None),
        }
    }

    // -----------------------------------------------------------------------
    // Questions
    // -----------------------------------------------------------------------

    /// Insert a new question. Questions are never updated in place.
    pub async fn insert_question(&self, question: &Question) -> Result<()> {
        self.check_writable()?;
        let nodes_json = serde_json::to_string(&question.graph.nodes)?;
        let edges_json = serde_json::to_string(&question.graph.edges)?;
        self.conn
            .execute(
                "INSERT INTO questions (id, hash, user_id, name, natural_question, notes, nodes_json, edges_json, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                params![
                    question.id.as_str(),
                    question.hash.as_str(),
                    question.user_id,
                    question.name.as_str(),
                    question.natural_question.as_str(),
                    question.notes.as_str(),
                    nodes_json,
                    edges_json,
                    question.created_at.to_rfc3339(),
                ],
            )
            .await
            .map_err(storage_err)?;
        Ok(())
    }

    /// Get a question by id.
    pub async fn get_question(&self, id: &QuestionId) -> Result<Option<Question>> {
        let mut rows = self
            .conn
            .query(
                "SELECT id, hash, user_id, name, natural_question, notes, nodes_json, edges_json, created_at
                 FROM questions WHERE id = ?1",
                params![id.as_str()],
            )
            .await
            .map_err(storage_err)?;

        match rows.next().await.map_err(storage_err)? {
            Some(row) => Ok(Some(row_to_question(&row)?)),
            None => Ok(None),
        }
    }

    /// List all questions, oldest first.
    pub async fn list_questions(&self) -> Result<Vec<Question>> {
        self.query_questions(
            "SELECT id, hash, user_id, name, natural_question, notes, nodes_json, edges_json, created_at
             FROM questions ORDER BY created_at, id",
            None,
        )
        .await
    }

    /// List the questions owned by one user, oldest first.
    pub async fn list_questions_by_user(&self, user_id: i64) -> Result<Vec<Question>> {
        self.query_questions(
            "SELECT id, hash, user_id, name, natural_question, notes, nodes_json, edges_json, created_at
             FROM questions WHERE user_id = ?1 ORDER BY created_at, id",
            Some(user_id),
        )
        .await
    }

    async fn query_questions(&self, sql: &str, user_id: Option<i64>) -> Result<Vec<Question>> {
        let mut rows = match user_id {
            Some(uid) => self.conn.query(sql, params![uid]).await.map_err(storage_err)?,
            None => self.conn.query(sql, params![]).await.map_err(storage_err)?,
        };

        let mut results = Vec::new();
        while let Some(row) = rows.next().await.map_err(storage_err)? {
            results.push(row_to_question(&row)?);
        }
        Ok(results)
    }

    // -----------------------------------------------------------------------
    // Answer sets
    // -----------------------------------------------------------------------

    /// Append an answer set to a question hash's history.
    pub async fn insert_answerset(&self, answerset: &AnswerSet) -> Result<()> {
        self.check_writable()?;
        let payload_json = serde_json::to_string(&answerset.payload)?;
        self.conn
            .execute(
                "INSERT INTO answersets (id, question_hash, timestamp, payload_json)
                 VALUES (?1, ?2, ?3, ?4)",
                params![
                    answerset.id.as_str(),
                    answerset.question_hash.as_str(),
                    answerset.timestamp.to_rfc3339(),
                    payload_json,
                ],
            )
            .await
            .map_err(storage_err)?;
        Ok(())
    }

    /// All answer sets for a question hash, oldest first.
    pub async fn list_answersets(&self, hash: &HashToken) -> Result<Vec<AnswerSet>> {
        let mut rows = self
            .conn
            .query(
                "SELECT id, question_hash, timestamp, payload_json
                 FROM answersets WHERE question_hash = ?1 ORDER BY timestamp, id",
                params![hash.as_str()],
            )
            .await
            .map_err(storage_err)?;

        let mut results = Vec::new();
        while let Some(row) = rows.next().await.map_err(storage_err)? {
            results.push(row_to_answerset(&row)?);
        }
        Ok(results)
    }

    /// The most recent answer set for a question hash.
    pub async fn latest_answerset(&self, hash: &HashToken) -> Result<Option<AnswerSet>> {
        let mut rows = self
            .conn
            .query(
                "SELECT id, question_hash, timestamp, payload_json
                 FROM answersets WHERE question_hash = ?1 ORDER BY timestamp DESC, id DESC LIMIT 1",
                params![hash.as_str()],
            )
            .await
            .map_err(storage_err)?;

        match rows.next().await.map_err(storage_err)? {
            Some(row) => Ok(Some(row_to_answerset(&row)?)),
            None => Ok(None),
        }
    }
}

// ---------------------------------------------------------------------------
// Row mapping
// ---------------------------------------------------------------------------

fn parse_timestamp(s: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| QuestionHubError::Storage(format!("invalid date: {e}")))
}

fn row_to_user(row: &libsql::Row) -> Result<User> {
    Ok(User {
        id: row.get::<i64>(0).map_err(storage_err)?,
        email: row.get::<String>(1).map_err(storage_err)?,
    })
}

fn row_to_question(row: &libsql::Row) -> Result<Question> {
    let nodes_json: String = row.get(6).map_err(storage_err)?;
    let edges_json: String = row.get(7).map_err(storage_err)?;
    let created_at: String = row.get(8).map_err(storage_err)?;

    Ok(Question {
        id: QuestionId::new(row.get::<String>(0).map_err(storage_err)?),
        hash: HashToken::new(row.get::<String>(1).map_err(storage_err)?),
        user_id: row.get::<i64>(2).map_err(storage_err)?,
        name: row.get::<String>(3).map_err(storage_err)?,
        natural_question: row.get::<String>(4).map_err(storage_err)?,
        notes: row.get::<String>(5).map_err(storage_err)?,
        graph: QueryGraph {
            nodes: serde_json::from_str(&nodes_json)?,
            edges: serde_json::from_str(&edges_json)?,
        },
        created_at: parse_timestamp(&created_at)?,
    })
}

fn row_to_answerset(row: &libsql::Row) -> Result<AnswerSet> {
    let timestamp: String = row.get(2).map_err(storage_err)?;
    let payload_json: String = row.get(3).map_err(storage_err)?;
    Ok(AnswerSet {
        id: row.get::<String>(0).map_err(storage_err)?,
        question_hash: HashToken::new(row.get::<String>(1).map_err(storage_err)?),
        timestamp: parse_timestamp(&timestamp)?,
        payload: serde_json::from_str(&payload_json)?,
    })
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use chrono::Duration;
    use questionhub_shared::{QueryEdge, QueryNode};
    use uuid::Uuid;

    /// Create a temp file storage for testing.
    pub(crate) async fn test_storage() -> Storage {
        let tmp = std::env::temp_dir().join(format!("qh_test_{}.db", Uuid::now_v7()));
        Storage::open(&tmp).await.expect("open test db")
    }

    fn node(id: &str) -> QueryNode {
        QueryNode {
            id: id.into(),
            category: vec!["biolink:Gene".into()],
            ..Default::default()
        }
    }

    fn sample_question(id: &str, user_id: i64) -> Question {
        Question {
            id: QuestionId::new(id),
            hash: HashToken::new(format!("hash-{id}")),
            user_id,
            name: "genes near disease".into(),
            natural_question: "what genes relate to asthma?".into(),
            notes: String::new(),
            graph: QueryGraph {
                nodes: vec![node("n0"), node("n1")],
                edges: vec![QueryEdge {
                    id: "e0".into(),
                    source_id: "n0".into(),
                    target_id: "n1".into(),
                    ..Default::default()
                }],
            },
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn open_and_migrate() {
        let storage = test_storage().await;
        assert_eq!(storage.get_schema_version().await, 2);
    }

    #[tokio::test]
    async fn idempotent_migration() {
        let tmp = std::env::temp_dir().join(format!("qh_test_{}.db", Uuid::now_v7()));
        let s1 = Storage::open(&tmp).await.expect("first open");
        drop(s1);
        let s2 = Storage::open(&tmp).await.expect("second open");
        assert_eq!(s2.get_schema_version().await, 2);
    }

    #[tokio::test]
    async fn user_lookup() {
        let storage = test_storage().await;
        let user = storage.insert_user("ann@example.com").await.expect("insert user");
        let found = storage
            .get_user_by_email("ann@example.com")
            .await
            .expect("lookup")
            .expect("user exists");
        assert_eq!(found, user);
        assert_eq!(storage.get_user(user.id).await.expect("by id"), Some(user));
        assert!(storage.get_user_by_email("bob@example.com").await.expect("lookup").is_none());
        assert!(storage.insert_user("ann@example.com").await.is_err());
    }

    #[tokio::test]
    async fn question_roundtrip() {
        let storage = test_storage().await;
        let user = storage.insert_user("ann@example.com").await.unwrap();
        let question = sample_question("q1", user.id);
        storage.insert_question(&question).await.expect("insert question");

        let found = storage
            .get_question(&question.id)
            .await
            .expect("get question")
            .expect("question exists");
        assert_eq!(found.hash, question.hash);
        assert_eq!(found.graph, question.graph);
        assert_eq!(found.natural_question, question.natural_question);

        let other = storage.insert_user("bob@example.com").await.unwrap();
        storage
            .insert_question(&sample_question("q2", other.id))
            .await
            .unwrap();
        assert_eq!(storage.list_questions().await.unwrap().len(), 2);
        let mine = storage.list_questions_by_user(user.id).await.unwrap();
        assert_eq!(mine.len(), 1);
        assert_eq!(mine[0].id.as_str(), "q1");
    }

    #[tokio::test]
    async fn answerset_history() {
        let storage = test_storage().await;
        let hash = HashToken::new("abc123");
        let older = AnswerSet {
            id: "a1".into(),
            question_hash: hash.clone(),
            timestamp: Utc::now() - Duration::hours(1),
            payload: serde_json::json!({"answers": 1}),
        };
        let newer = AnswerSet {
            id: "a2".into(),
            timestamp: Utc::now(),
            ..older.clone()
        };
        storage.insert_answerset(&newer).await.unwrap();
        storage.insert_answerset(&older).await.unwrap();

        let all = storage.list_answersets(&hash).await.unwrap();
        assert_eq!(all.iter().map(|a| a.id.as_str()).collect::<Vec<_>>(), ["a1", "a2"]);
        let latest = storage.latest_answerset(&hash).await.unwrap().expect("latest");
        assert_eq!(latest.id, "a2");
        assert!(
            storage
                .latest_answerset(&HashToken::new("missing"))
                .await
                .unwrap()
                .is_none()
        );
    }

    #[tokio::test]
    async fn readonly_rejects_writes() {
        let tmp = std::env::temp_dir().join(format!("qh_test_{}.db", Uuid::now_v7()));
        let rw = Storage::open(&tmp).await.unwrap();
        rw.insert_user("ann@example.com").await.unwrap();
        drop(rw);

        let ro = Storage::open_readonly(&tmp).await.unwrap();
        let result = ro.insert_user("bob@example.com").await;
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("read-only"));
    }
}
