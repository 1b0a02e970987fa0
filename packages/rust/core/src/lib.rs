//! Question orchestration for QuestionHub.
//!
//! This crate ties content hashing, the job queue, and storage together:
//! - [`hasher`]: canonical content hash of a question graph
//! - [`orchestrator`]: enqueue answering with the refresh-then-retry chain
//! - [`status`]: per-hash activity labels from live job records
//! - [`questions`]: create / convert / list questions

pub mod hasher;
pub mod orchestrator;
pub mod questions;
pub mod status;

pub use hasher::{canonical_bytes, hash_graph};
pub use orchestrator::{RebuildPolicy, TaskOrchestrator};
pub use questions::{NewQuestion, QuestionService, QuestionSummary};
pub use status::{ActivityLabel, StatusAggregator, correlate, is_reportable, summarize_records};
