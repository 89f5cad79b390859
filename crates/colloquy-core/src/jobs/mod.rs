//! Job queue client: enqueue workflow-advance and message-process work
//! for the worker loop.
//!
//! Jobs are durable rows (see `storage::jobs`); the queue client only
//! inserts them. Execution, timeout, and retry bookkeeping live in
//! [`worker`].

pub mod worker;

use std::str::FromStr;

use uuid::Uuid;

use crate::error::JobError;
use crate::storage::{jobs, DbPool};

/// The kinds of work the queue carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobKind {
    /// Load a dialog and advance it until terminal or suspended.
    DialogRunWorkflow,
    /// Load a dialog and complete its pending assistant message.
    ProcessMessage,
}

impl JobKind {
    /// Wire-format job name.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::DialogRunWorkflow => "dialog_run_workflow",
            Self::ProcessMessage => "process_message",
        }
    }
}

impl FromStr for JobKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "dialog_run_workflow" => Ok(Self::DialogRunWorkflow),
            "process_message" => Ok(Self::ProcessMessage),
            other => Err(format!("unknown job kind '{other}'")),
        }
    }
}

/// Client handle for enqueuing jobs.
#[derive(Clone)]
pub struct JobQueue {
    pool: DbPool,
    job_timeout_secs: u64,
}

impl JobQueue {
    /// Create a queue client with the default per-job timeout.
    pub fn new(pool: DbPool, job_timeout_secs: u64) -> Self {
        Self {
            pool,
            job_timeout_secs,
        }
    }

    /// Enqueue a job; returns its id.
    pub async fn enqueue(
        &self,
        kind: JobKind,
        args: serde_json::Value,
    ) -> Result<Uuid, JobError> {
        let mut conn = self
            .pool
            .acquire()
            .await
            .map_err(|e| crate::error::StorageError::Connection { source: e })?;
        let id = jobs::enqueue(&mut conn, kind.as_str(), &args, self.job_timeout_secs).await?;
        tracing::debug!(job_id = %id, kind = kind.as_str(), "enqueued job");
        Ok(id)
    }

    /// Enqueue a workflow advance for a dialog.
    pub async fn enqueue_run_workflow(&self, dialog_id: Uuid) -> Result<Uuid, JobError> {
        self.enqueue(
            JobKind::DialogRunWorkflow,
            serde_json::json!({"dialog_id": dialog_id}),
        )
        .await
    }

    /// Enqueue completion processing for a dialog's pending message.
    pub async fn enqueue_process_message(&self, dialog_id: Uuid) -> Result<Uuid, JobError> {
        self.enqueue(
            JobKind::ProcessMessage,
            serde_json::json!({"dialog_id": dialog_id}),
        )
        .await
    }
}

/// Parse the `dialog_id` argument common to both job kinds.
pub(crate) fn dialog_id_from_args(job_id: &str, args: &str) -> Result<Uuid, JobError> {
    let value: serde_json::Value =
        serde_json::from_str(args).map_err(|e| JobError::Malformed {
            id: job_id.to_string(),
            message: format!("args are not JSON: {e}"),
        })?;
    let raw = value
        .get("dialog_id")
        .and_then(serde_json::Value::as_str)
        .ok_or_else(|| JobError::Malformed {
            id: job_id.to_string(),
            message: "missing dialog_id".to_string(),
        })?;
    Uuid::parse_str(raw).map_err(|e| JobError::Malformed {
        id: job_id.to_string(),
        message: format!("invalid dialog_id: {e}"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::init_test_db;

    #[tokio::test]
    async fn enqueue_writes_a_claimable_row() {
        let pool = init_test_db().await.expect("db");
        let queue = JobQueue::new(pool.clone(), 120);
        let dialog_id = Uuid::new_v4();

        let job_id = queue
            .enqueue_run_workflow(dialog_id)
            .await
            .expect("enqueue");

        let mut conn = pool.acquire().await.expect("conn");
        let job = jobs::claim_next(&mut conn)
            .await
            .expect("claim")
            .expect("job");
        assert_eq!(job.id, job_id.to_string());
        assert_eq!(job.name, "dialog_run_workflow");
        assert_eq!(job.timeout_secs, 120);
        assert_eq!(
            dialog_id_from_args(&job.id, &job.args).expect("args"),
            dialog_id
        );
    }

    #[test]
    fn malformed_args_are_reported() {
        let err = dialog_id_from_args("j1", "{}").unwrap_err();
        assert!(matches!(err, JobError::Malformed { .. }));

        let err = dialog_id_from_args("j1", "not json").unwrap_err();
        assert!(matches!(err, JobError::Malformed { .. }));
    }

    #[test]
    fn job_kind_round_trips() {
        for kind in [JobKind::DialogRunWorkflow, JobKind::ProcessMessage] {
            assert_eq!(JobKind::from_str(kind.as_str()), Ok(kind));
        }
        assert!(JobKind::from_str("nope").is_err());
    }
}
