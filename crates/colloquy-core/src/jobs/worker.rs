//! Worker loop: claims jobs and executes them under a timeout.
//!
//! One claimed job runs at a time per worker, which is what serializes
//! advances for a given dialog across processes. A timed-out or failed
//! job keeps its error on the row; the dialog itself can be re-run by
//! enqueuing a fresh job, and the idempotent save discipline makes the
//! re-run resume from the last committed step index.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use super::{dialog_id_from_args, JobKind};
use crate::error::JobError;
use crate::storage::{jobs, jobs::JobRow, DbPool};
use crate::workflow::WorkflowService;

/// Background worker draining the job queue.
pub struct JobWorker {
    pool: DbPool,
    service: Arc<WorkflowService>,
    poll_interval: Duration,
    cancel: CancellationToken,
}

impl JobWorker {
    /// Create a worker over the shared pool and workflow service.
    pub fn new(
        pool: DbPool,
        service: Arc<WorkflowService>,
        poll_interval: Duration,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            pool,
            service,
            poll_interval,
            cancel,
        }
    }

    /// Run until cancelled. Sleeps `poll_interval` when the queue is
    /// empty.
    pub async fn run(&self) {
        tracing::info!(poll_ms = self.poll_interval.as_millis() as u64, "job worker started");

        loop {
            if self.cancel.is_cancelled() {
                break;
            }

            match self.run_once().await {
                Ok(true) => {} // claimed and executed one; go straight for the next
                Ok(false) => {
                    tokio::select! {
                        () = self.cancel.cancelled() => break,
                        () = tokio::time::sleep(self.poll_interval) => {}
                    }
                }
                Err(e) => {
                    tracing::error!(error = %e, "job claim failed, backing off");
                    tokio::select! {
                        () = self.cancel.cancelled() => break,
                        () = tokio::time::sleep(self.poll_interval) => {}
                    }
                }
            }
        }

        tracing::info!("job worker stopped");
    }

    /// Claim and execute at most one job. Returns whether one was
    /// claimed.
    pub async fn run_once(&self) -> Result<bool, JobError> {
        let mut conn = self
            .pool
            .acquire()
            .await
            .map_err(|e| crate::error::StorageError::Connection { source: e })?;
        let Some(job) = jobs::claim_next(&mut conn).await? else {
            return Ok(false);
        };
        drop(conn);

        tracing::info!(job_id = %job.id, name = %job.name, attempt = job.attempts, "executing job");

        let timeout_secs = u64::try_from(job.timeout_secs).unwrap_or(300);
        let outcome = tokio::time::timeout(
            Duration::from_secs(timeout_secs),
            self.execute(&job),
        )
        .await;

        let mut conn = self
            .pool
            .acquire()
            .await
            .map_err(|e| crate::error::StorageError::Connection { source: e })?;
        match outcome {
            Ok(Ok(())) => jobs::mark_done(&mut conn, &job.id).await?,
            Ok(Err(message)) => {
                tracing::warn!(job_id = %job.id, error = %message, "job failed");
                jobs::mark_failed(&mut conn, &job.id, &message).await?;
            }
            Err(_) => {
                let err = JobError::Timeout {
                    id: job.id.clone(),
                    timeout_secs,
                };
                tracing::warn!(job_id = %job.id, "job timed out");
                jobs::mark_failed(&mut conn, &job.id, &err.to_string()).await?;
            }
        }

        Ok(true)
    }

    async fn execute(&self, job: &JobRow) -> Result<(), String> {
        let kind: JobKind = job.name.parse()?;
        let dialog_id = dialog_id_from_args(&job.id, &job.args).map_err(|e| e.to_string())?;

        match kind {
            JobKind::DialogRunWorkflow => self
                .service
                .run_workflow_by_id(dialog_id)
                .await
                .map(|_| ())
                .map_err(|e| e.to_string()),
            JobKind::ProcessMessage => self
                .service
                .process_message(dialog_id)
                .await
                .map_err(|e| e.to_string()),
        }
    }
}
