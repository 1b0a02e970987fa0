//! SQL migration definitions for the QuestionHub database.
//!
//! Migrations are applied in order on database open. Each migration has a
//! version number and a batch of SQL statements.

/// A database migration with a version and SQL statements.
pub(crate) struct Migration {
    pub version: u32,
    pub description: &'static str,
    pub sql: &'static str,
}

/// All migrations, in ascending version order.
pub(crate) fn all_migrations() -> Vec<Migration> {
    vec![
        Migration {
            version: 1,
            description: "Initial schema: users, questions, answersets",
            sql: r#"
-- Schema version tracking
CREATE TABLE IF NOT EXISTS schema_migrations (
    version   INTEGER PRIMARY KEY,
    applied_at TEXT NOT NULL DEFAULT (datetime('now'))
);

CREATE TABLE IF NOT EXISTS users (
    id    INTEGER PRIMARY KEY AUTOINCREMENT,
    email TEXT NOT NULL UNIQUE
);

-- Questions; hash is fixed at creation
CREATE TABLE IF NOT EXISTS questions (
    id               TEXT PRIMARY KEY,
    hash             TEXT NOT NULL,
    user_id          INTEGER NOT NULL REFERENCES users(id),
    name             TEXT NOT NULL,
    natural_question TEXT NOT NULL DEFAULT '',
    notes            TEXT NOT NULL DEFAULT '',
    nodes_json       TEXT NOT NULL,
    edges_json       TEXT NOT NULL,
    created_at       TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_questions_hash ON questions(hash);
CREATE INDEX IF NOT EXISTS idx_questions_user ON questions(user_id);

-- Append-only answer history, keyed by question hash
CREATE TABLE IF NOT EXISTS answersets (
    id            TEXT PRIMARY KEY,
    question_hash TEXT NOT NULL,
    timestamp     TEXT NOT NULL,
    payload_json  TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_answersets_hash ON answersets(question_hash);

INSERT INTO schema_migrations (version) VALUES (1);
"#,
        },
        Migration {
            version: 2,
            description: "Durable job queue with failure/success continuations",
            sql: r#"
CREATE TABLE IF NOT EXISTS jobs (
    seq             INTEGER PRIMARY KEY AUTOINCREMENT,
    id              TEXT NOT NULL UNIQUE,
    name            TEXT NOT NULL,
    args_json       TEXT NOT NULL,
    kwargs_json     TEXT NOT NULL,
    state           TEXT NOT NULL,
    link_json       TEXT NOT NULL DEFAULT '[]',
    link_error_json TEXT NOT NULL DEFAULT '[]',
    parent_id       TEXT,
    created_at      TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_jobs_state ON jobs(state);

INSERT INTO schema_migrations (version) VALUES (2);
"#,
        },
    ]
}
