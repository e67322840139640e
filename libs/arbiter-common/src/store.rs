//! Durable records the judge writes: per-problem submission history,
//! per-problem accepted counters and per-user solved-problem sets.

use crate::types::{SolvedRecord, SubmissionRecord};
use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("redis error: {0}")]
    Redis(#[from] ::redis::RedisError),
    #[error("record serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Storage capability consumed by the grading orchestrator.
///
/// Implementations provide atomic append and atomic insert-if-absent natively;
/// callers hold no in-process lock across calls.
#[async_trait]
pub trait VerdictStore: Send + Sync {
    /// Appends to the problem's history. Records are never mutated or removed.
    async fn append_submission(&self, problem_id: &str, record: &SubmissionRecord) -> Result<(), StoreError>;

    /// Full history for a problem, oldest first.
    async fn submissions(&self, problem_id: &str) -> Result<Vec<SubmissionRecord>, StoreError>;

    async fn has_solved(&self, user_id: &str, problem_id: &str) -> Result<bool, StoreError>;

    /// Inserts the record unless one already exists for the problem.
    /// Returns whether a record was written.
    async fn insert_solved(&self, user_id: &str, record: &SolvedRecord) -> Result<bool, StoreError>;

    async fn solved_problems(&self, user_id: &str) -> Result<Vec<SolvedRecord>, StoreError>;

    /// Bumps the problem's accepted counter and returns the new value.
    async fn increment_accepted(&self, problem_id: &str) -> Result<u64, StoreError>;

    async fn accepted_count(&self, problem_id: &str) -> Result<u64, StoreError>;
}

#[derive(Default)]
struct MemoryState {
    submissions: HashMap<String, Vec<SubmissionRecord>>,
    solved: HashMap<String, Vec<SolvedRecord>>,
    accepted: HashMap<String, u64>,
}

/// Process-local store used by the CLI, tests and `STORE_BACKEND=memory`.
#[derive(Default)]
pub struct MemoryVerdictStore {
    state: RwLock<MemoryState>,
}

impl MemoryVerdictStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl VerdictStore for MemoryVerdictStore {
    async fn append_submission(&self, problem_id: &str, record: &SubmissionRecord) -> Result<(), StoreError> {
        self.state
            .write()
            .await
            .submissions
            .entry(problem_id.to_string())
            .or_default()
            .push(record.clone());
        Ok(())
    }

    async fn submissions(&self, problem_id: &str) -> Result<Vec<SubmissionRecord>, StoreError> {
        Ok(self
            .state
            .read()
            .await
            .submissions
            .get(problem_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn has_solved(&self, user_id: &str, problem_id: &str) -> Result<bool, StoreError> {
        Ok(self
            .state
            .read()
            .await
            .solved
            .get(user_id)
            .map(|records| records.iter().any(|r| r.problem_id == problem_id))
            .unwrap_or(false))
    }

    async fn insert_solved(&self, user_id: &str, record: &SolvedRecord) -> Result<bool, StoreError> {
        let mut state = self.state.write().await;
        let records = state.solved.entry(user_id.to_string()).or_default();
        if records.iter().any(|r| r.problem_id == record.problem_id) {
            return Ok(false);
        }
        records.push(record.clone());
        Ok(true)
    }

    async fn solved_problems(&self, user_id: &str) -> Result<Vec<SolvedRecord>, StoreError> {
        Ok(self
            .state
            .read()
            .await
            .solved
            .get(user_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn increment_accepted(&self, problem_id: &str) -> Result<u64, StoreError> {
        let mut state = self.state.write().await;
        let count = state.accepted.entry(problem_id.to_string()).or_insert(0);
        *count += 1;
        Ok(*count)
    }

    async fn accepted_count(&self, problem_id: &str) -> Result<u64, StoreError> {
        Ok(self
            .state
            .read()
            .await
            .accepted
            .get(problem_id)
            .copied()
            .unwrap_or(0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Language, UserRef, Verdict};
    use chrono::Utc;

    fn solved(problem_id: &str) -> SolvedRecord {
        SolvedRecord {
            problem_id: problem_id.to_string(),
            language: Language::Cpp,
            submission_date: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_insert_solved_is_idempotent() {
        let store = MemoryVerdictStore::new();
        assert!(!store.has_solved("u1", "p1").await.unwrap());
        assert!(store.insert_solved("u1", &solved("p1")).await.unwrap());
        assert!(!store.insert_solved("u1", &solved("p1")).await.unwrap());
        assert!(store.has_solved("u1", "p1").await.unwrap());
        assert_eq!(store.solved_problems("u1").await.unwrap().len(), 1);
        assert!(!store.has_solved("u2", "p1").await.unwrap());
    }

    #[tokio::test]
    async fn test_submissions_append_in_order() {
        let store = MemoryVerdictStore::new();
        let user = UserRef {
            id: "u1".into(),
            name: "alice".into(),
        };
        let first = SubmissionRecord::new(&user, Language::Python, "a", &Verdict::Accepted, Utc::now());
        let second = SubmissionRecord::new(
            &user,
            Language::Python,
            "b",
            &Verdict::CompilationError { diagnostic: "x".into() },
            Utc::now(),
        );
        store.append_submission("p1", &first).await.unwrap();
        store.append_submission("p1", &second).await.unwrap();

        let history = store.submissions("p1").await.unwrap();
        assert_eq!(history, vec![first, second]);
        assert!(store.submissions("p2").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_accepted_counter() {
        let store = MemoryVerdictStore::new();
        assert_eq!(store.accepted_count("p1").await.unwrap(), 0);
        assert_eq!(store.increment_accepted("p1").await.unwrap(), 1);
        assert_eq!(store.increment_accepted("p1").await.unwrap(), 2);
        assert_eq!(store.accepted_count("p1").await.unwrap(), 2);
    }
}
