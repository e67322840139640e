use crate::store::{StoreError, VerdictStore};
use crate::types::{SolvedRecord, SubmissionRecord};
use ::redis::aio::ConnectionManager;
use ::redis::AsyncCommands;
use async_trait::async_trait;

/// Redis key layout - defines only naming, so API and CLI never drift

pub const SUBMISSIONS_PREFIX: &str = "arbiter:submissions";
pub const SOLVED_PREFIX: &str = "arbiter:solved";
pub const ACCEPTED_PREFIX: &str = "arbiter:accepted";

/// List of JSON submission records for a problem (RPUSH, append-only)
pub fn submissions_key(problem_id: &str) -> String {
    format!("{}:{}", SUBMISSIONS_PREFIX, problem_id)
}

/// Hash of problem id -> JSON solved record for a user
pub fn solved_key(user_id: &str) -> String {
    format!("{}:{}", SOLVED_PREFIX, user_id)
}

/// Integer counter of accepted submissions for a problem
pub fn accepted_key(problem_id: &str) -> String {
    format!("{}:{}", ACCEPTED_PREFIX, problem_id)
}

/// Redis-backed verdict store.
///
/// `ConnectionManager` is cheap to clone and reconnects on its own, so each
/// call works on a clone rather than sharing a locked connection.
#[derive(Clone)]
pub struct RedisVerdictStore {
    conn: ConnectionManager,
}

impl RedisVerdictStore {
    pub async fn connect(url: &str) -> Result<Self, StoreError> {
        let client = ::redis::Client::open(url)?;
        let conn = ConnectionManager::new(client).await?;
        Ok(Self { conn })
    }

    pub fn from_connection(conn: ConnectionManager) -> Self {
        Self { conn }
    }
}

#[async_trait]
impl VerdictStore for RedisVerdictStore {
    async fn append_submission(&self, problem_id: &str, record: &SubmissionRecord) -> Result<(), StoreError> {
        let payload = serde_json::to_string(record)?;
        let mut conn = self.conn.clone();
        let _: () = conn.rpush(submissions_key(problem_id), payload).await?;
        Ok(())
    }

    async fn submissions(&self, problem_id: &str) -> Result<Vec<SubmissionRecord>, StoreError> {
        let mut conn = self.conn.clone();
        let payloads: Vec<String> = conn.lrange(submissions_key(problem_id), 0, -1).await?;
        payloads
            .iter()
            .map(|p| serde_json::from_str(p).map_err(StoreError::from))
            .collect()
    }

    async fn has_solved(&self, user_id: &str, problem_id: &str) -> Result<bool, StoreError> {
        let mut conn = self.conn.clone();
        Ok(conn.hexists(solved_key(user_id), problem_id).await?)
    }

    async fn insert_solved(&self, user_id: &str, record: &SolvedRecord) -> Result<bool, StoreError> {
        let payload = serde_json::to_string(record)?;
        let mut conn = self.conn.clone();
        // HSETNX: insert-if-absent in one round trip
        Ok(conn.hset_nx(solved_key(user_id), &record.problem_id, payload).await?)
    }

    async fn solved_problems(&self, user_id: &str) -> Result<Vec<SolvedRecord>, StoreError> {
        let mut conn = self.conn.clone();
        let payloads: Vec<String> = conn.hvals(solved_key(user_id)).await?;
        let mut records = payloads
            .iter()
            .map(|p| serde_json::from_str(p).map_err(StoreError::from))
            .collect::<Result<Vec<SolvedRecord>, _>>()?;
        records.sort_by_key(|r| r.submission_date);
        Ok(records)
    }

    async fn increment_accepted(&self, problem_id: &str) -> Result<u64, StoreError> {
        let mut conn = self.conn.clone();
        Ok(conn.incr(accepted_key(problem_id), 1u64).await?)
    }

    async fn accepted_count(&self, problem_id: &str) -> Result<u64, StoreError> {
        let mut conn = self.conn.clone();
        let count: Option<u64> = conn.get(accepted_key(problem_id)).await?;
        Ok(count.unwrap_or(0))
    }
}
