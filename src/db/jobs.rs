//! Job-run history: one row per `Idle -> Running -> {Completed, Aborted}` transition.

use crate::error::DatabaseError;
use crate::types::{AccountId, JobState, OperationKind};
use crate::{Error, Result};

use super::{Database, JobRun, JobRunOutcome, JobRunRow, query_error};

impl Database {
    /// Record that a job entered `Running`, returning the run id
    pub async fn begin_job_run(&self, account: &AccountId, kind: OperationKind) -> Result<i64> {
        let now = chrono::Utc::now().timestamp();

        let result = sqlx::query(
            r#"
            INSERT INTO job_runs (account_id, kind, state, started_at)
            VALUES (?, ?, ?, ?)
            "#,
        )
        .bind(account)
        .bind(kind.as_str())
        .bind(JobState::Running.as_str())
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(|e| query_error("Failed to insert job run", e))?;

        Ok(result.last_insert_rowid())
    }

    /// Record the terminal state of a job run
    pub async fn finish_job_run(&self, run_id: i64, outcome: &JobRunOutcome<'_>) -> Result<()> {
        let now = chrono::Utc::now().timestamp();

        let result = sqlx::query(
            r#"
            UPDATE job_runs
            SET state = ?, finished_at = ?, succeeded = ?, failed = ?,
                abort_code = ?, abort_message = ?
            WHERE id = ?
            "#,
        )
        .bind(outcome.state.as_str())
        .bind(now)
        .bind(outcome.succeeded as i64)
        .bind(outcome.failed as i64)
        .bind(outcome.abort_reason.map(|r| r.code()))
        .bind(outcome.abort_reason.map(|r| r.to_string()))
        .bind(run_id)
        .execute(&self.pool)
        .await
        .map_err(|e| query_error("Failed to update job run", e))?;

        if result.rows_affected() == 0 {
            return Err(Error::Database(DatabaseError::NotFound(format!(
                "job run {}",
                run_id
            ))));
        }

        Ok(())
    }

    /// Most recent run for an account and operation kind
    pub async fn latest_job_run(
        &self,
        account: &AccountId,
        kind: OperationKind,
    ) -> Result<Option<JobRun>> {
        let row = sqlx::query_as::<_, JobRunRow>(
            r#"
            SELECT id, account_id, kind, state, started_at, finished_at,
                   succeeded, failed, abort_code, abort_message
            FROM job_runs
            WHERE account_id = ? AND kind = ?
            ORDER BY id DESC
            LIMIT 1
            "#,
        )
        .bind(account)
        .bind(kind.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| query_error("Failed to load latest job run", e))?;

        row.map(JobRun::try_from).transpose()
    }

    /// All runs for an account, newest first
    pub async fn list_job_runs(&self, account: &AccountId) -> Result<Vec<JobRun>> {
        let rows = sqlx::query_as::<_, JobRunRow>(
            r#"
            SELECT id, account_id, kind, state, started_at, finished_at,
                   succeeded, failed, abort_code, abort_message
            FROM job_runs
            WHERE account_id = ?
            ORDER BY id DESC
            "#,
        )
        .bind(account)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| query_error("Failed to list job runs", e))?;

        rows.into_iter().map(JobRun::try_from).collect()
    }

    /// Mark runs left in `Running` by a previous process as aborted
    ///
    /// Called on startup; a run can only still be `Running` here if the process died
    /// mid-job. Returns the number of runs closed.
    pub async fn abort_interrupted_job_runs(&self) -> Result<u64> {
        let now = chrono::Utc::now().timestamp();

        let result = sqlx::query(
            r#"
            UPDATE job_runs
            SET state = ?, finished_at = ?, abort_code = 'interrupted',
                abort_message = 'process exited while the job was running'
            WHERE state = ?
            "#,
        )
        .bind(JobState::Aborted.as_str())
        .bind(now)
        .bind(JobState::Running.as_str())
        .execute(&self.pool)
        .await
        .map_err(|e| query_error("Failed to close interrupted job runs", e))?;

        Ok(result.rows_affected())
    }
}
