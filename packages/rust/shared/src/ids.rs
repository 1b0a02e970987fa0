//! Question identifier generation.
//!
//! Identifier generation is an injected capability so tests can supply
//! deterministic ids.

use std::sync::atomic::{AtomicU64, Ordering};

use rand::Rng;
use rand::distr::Alphanumeric;

use crate::types::QuestionId;

/// Length of generated question ids.
pub const QUESTION_ID_LEN: usize = 12;

/// Source of fresh question identifiers.
pub trait IdGenerator: Send + Sync {
    fn next(&self) -> QuestionId;
}

/// Random 12-character ids drawn uniformly from `[A-Za-z0-9]`.
#[derive(Debug, Default, Clone, Copy)]
pub struct RandomIdGenerator;

impl IdGenerator for RandomIdGenerator {
    fn next(&self) -> QuestionId {
        let id: String = rand::rng()
            .sample_iter(&Alphanumeric)
            .take(QUESTION_ID_LEN)
            .map(char::from)
            .collect();
        QuestionId::new(id)
    }
}

/// Deterministic `<prefix><n>` ids, counting from 1.
#[derive(Debug)]
pub struct SequentialIdGenerator {
    prefix: String,
    counter: AtomicU64,
}

impl SequentialIdGenerator {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            counter: AtomicU64::new(0),
        }
    }
}

impl IdGenerator for SequentialIdGenerator {
    fn next(&self) -> QuestionId {
        let n = self.counter.fetch_add(1, Ordering::Relaxed) + 1;
        QuestionId::new(format!("{}{n}", self.prefix))
    }
}
