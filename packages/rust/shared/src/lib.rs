//! Shared types, error model, and configuration for QuestionHub.
//!
//! This crate is the foundation depended on by all other QuestionHub crates.
//! It provides:
//! - [`QuestionHubError`] — the unified error type
//! - Domain types ([`Question`], [`QueryGraph`], [`HashToken`], [`JobRecord`], ...)
//! - Configuration ([`AppConfig`], config loading)
//! - Injected id generation ([`IdGenerator`])

pub mod config;
pub mod error;
pub mod ids;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    ANSWER_JOB, AppConfig, DefaultsConfig, QueueConfig, REFRESH_JOB, config_dir,
    config_file_path, init_config, load_config, load_config_from, validate_config,
};
pub use error::{QuestionHubError, Result};
pub use ids::{IdGenerator, RandomIdGenerator, SequentialIdGenerator};
pub use types::{
    AnswerSet, HashToken, JobRecord, JobState, Kwargs, QueryEdge, QueryGraph, QueryNode,
    Question, QuestionId, User, UserContext,
};
