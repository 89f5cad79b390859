//! Durable job queue rows.
//!
//! A job is claimed with a single atomic UPDATE so only one worker ever
//! runs it; SQLite's serialized writes provide the single-delivery
//! guarantee. Failed or timed-out jobs keep their error for inspection.

use std::str::FromStr;

use uuid::Uuid;

use crate::error::StorageError;

type SqliteExecutor<'e> = &'e mut sqlx::SqliteConnection;

/// Queue status of a job row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobStatus {
    /// Waiting to be claimed.
    Queued,
    /// Claimed by a worker.
    Running,
    /// Finished successfully.
    Done,
    /// Finished with an error or timed out.
    Failed,
}

impl JobStatus {
    /// Wire-format name of the status.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Running => "running",
            Self::Done => "done",
            Self::Failed => "failed",
        }
    }
}

impl FromStr for JobStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "queued" => Ok(Self::Queued),
            "running" => Ok(Self::Running),
            "done" => Ok(Self::Done),
            "failed" => Ok(Self::Failed),
            other => Err(format!("unknown job status '{other}'")),
        }
    }
}

/// One queued unit of work.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct JobRow {
    /// Job id (UUID text).
    pub id: String,
    /// Job kind name.
    pub name: String,
    /// JSON argument document.
    pub args: String,
    /// Queue status.
    pub status: String,
    /// How many times this job has been claimed.
    pub attempts: i64,
    /// Per-job execution timeout.
    pub timeout_secs: i64,
    /// Failure description, if failed.
    pub error: Option<String>,
    /// RFC 3339 enqueue time.
    pub created_at: String,
    /// RFC 3339 claim time.
    pub started_at: Option<String>,
    /// RFC 3339 completion time.
    pub finished_at: Option<String>,
}

impl JobRow {
    /// The typed queue status of this row.
    pub fn job_status(&self) -> Result<JobStatus, StorageError> {
        JobStatus::from_str(&self.status).map_err(|message| StorageError::Decode { message })
    }
}

/// Insert a queued job; returns its id.
pub async fn enqueue(
    conn: SqliteExecutor<'_>,
    name: &str,
    args: &serde_json::Value,
    timeout_secs: u64,
) -> Result<Uuid, StorageError> {
    let id = Uuid::new_v4();
    let args = serde_json::to_string(args).map_err(|e| StorageError::Decode {
        message: format!("job args: {e}"),
    })?;

    sqlx::query(
        "INSERT INTO jobs (id, name, args, status, timeout_secs, created_at) \
         VALUES (?, ?, ?, 'queued', ?, ?)",
    )
    .bind(id.to_string())
    .bind(name)
    .bind(args)
    .bind(i64::try_from(timeout_secs).unwrap_or(i64::MAX))
    .bind(super::now_rfc3339())
    .execute(conn)
    .await
    .map_err(|e| StorageError::Query { source: e })?;

    Ok(id)
}

/// Atomically claim the oldest queued job, if any.
pub async fn claim_next(conn: SqliteExecutor<'_>) -> Result<Option<JobRow>, StorageError> {
    sqlx::query_as(
        "UPDATE jobs SET status = 'running', attempts = attempts + 1, started_at = ? \
         WHERE id = (SELECT id FROM jobs WHERE status = 'queued' ORDER BY created_at, id LIMIT 1) \
         RETURNING id, name, args, status, attempts, timeout_secs, error, \
                   created_at, started_at, finished_at",
    )
    .bind(super::now_rfc3339())
    .fetch_optional(conn)
    .await
    .map_err(|e| StorageError::Query { source: e })
}

/// Mark a job finished successfully.
pub async fn mark_done(conn: SqliteExecutor<'_>, id: &str) -> Result<(), StorageError> {
    sqlx::query("UPDATE jobs SET status = 'done', finished_at = ? WHERE id = ?")
        .bind(super::now_rfc3339())
        .bind(id)
        .execute(conn)
        .await
        .map_err(|e| StorageError::Query { source: e })?;
    Ok(())
}

/// Mark a job failed with an error description.
pub async fn mark_failed(
    conn: SqliteExecutor<'_>,
    id: &str,
    error: &str,
) -> Result<(), StorageError> {
    sqlx::query("UPDATE jobs SET status = 'failed', error = ?, finished_at = ? WHERE id = ?")
        .bind(error)
        .bind(super::now_rfc3339())
        .bind(id)
        .execute(conn)
        .await
        .map_err(|e| StorageError::Query { source: e })?;
    Ok(())
}

/// Fetch a job by id.
pub async fn get_by_id(pool: &super::DbPool, id: Uuid) -> Result<Option<JobRow>, StorageError> {
    sqlx::query_as(
        "SELECT id, name, args, status, attempts, timeout_secs, error, \
                created_at, started_at, finished_at \
         FROM jobs WHERE id = ?",
    )
    .bind(id.to_string())
    .fetch_optional(pool)
    .await
    .map_err(|e| StorageError::Query { source: e })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::init_test_db;

    #[tokio::test]
    async fn claim_is_oldest_first_and_single_delivery() {
        let pool = init_test_db().await.expect("db");
        let mut conn = pool.acquire().await.expect("conn");

        let first = enqueue(&mut conn, "dialog_run_workflow", &serde_json::json!({}), 300)
            .await
            .expect("enqueue");
        let second = enqueue(&mut conn, "process_message", &serde_json::json!({}), 300)
            .await
            .expect("enqueue");

        let a = claim_next(&mut conn).await.expect("claim").expect("job");
        let b = claim_next(&mut conn).await.expect("claim").expect("job");
        assert_eq!(a.id, first.to_string());
        assert_eq!(b.id, second.to_string());
        assert_eq!(a.attempts, 1);
        assert_eq!(a.job_status().expect("status"), JobStatus::Running);

        // Queue drained: nothing left to claim.
        assert!(claim_next(&mut conn).await.expect("claim").is_none());
    }

    #[tokio::test]
    async fn done_and_failed_transitions_stick() {
        let pool = init_test_db().await.expect("db");
        let mut conn = pool.acquire().await.expect("conn");

        let id = enqueue(&mut conn, "dialog_run_workflow", &serde_json::json!({}), 300)
            .await
            .expect("enqueue");
        let job = claim_next(&mut conn).await.expect("claim").expect("job");

        mark_failed(&mut conn, &job.id, "boom").await.expect("fail");
        drop(conn);

        let row = get_by_id(&pool, id).await.expect("get").expect("row");
        assert_eq!(row.status, "failed");
        assert_eq!(row.error.as_deref(), Some("boom"));
        assert!(row.finished_at.is_some());
    }
}
