//! Batch loop shared by the import and invite pipelines.

use crate::db::JobRunOutcome;
use crate::error::Result;
use crate::types::{
    AbortReason, AccountId, Event, FailureReason, JobState, JobSummary, OperationKind,
};
use tokio_util::sync::CancellationToken;

use super::BulkEngine;
use super::executor::{BatchExecutor, BatchOutcome, SettledBatch};
use super::partition::BatchPlan;
use super::throttle::{ThrottleController, wait_or_cancel};

/// Book-keeping for one job in `Running`
#[derive(Debug)]
pub(crate) struct RunningJob {
    pub(crate) account: AccountId,
    pub(crate) kind: OperationKind,
    run_id: i64,
    cancel: CancellationToken,
    batches_planned: usize,
    batches_run: usize,
    succeeded: usize,
    failed: usize,
}

impl BulkEngine {
    /// Summary for a request that had nothing left to do; the job stays `Idle`
    pub(crate) fn nothing_to_do(&self, account: &AccountId, kind: OperationKind) -> JobSummary {
        tracing::info!(account = %account, kind = %kind, "Nothing to do");
        self.emit_event(Event::NothingToDo {
            account: account.clone(),
            kind,
        });
        JobSummary {
            account: account.clone(),
            kind,
            state: JobState::Idle,
            succeeded: 0,
            failed: 0,
            batches_planned: 0,
            batches_run: 0,
            abort_reason: None,
        }
    }

    /// Move a job from `Idle` to `Running`
    pub(crate) async fn start_job(
        &self,
        account: &AccountId,
        kind: OperationKind,
        cancel: &CancellationToken,
        items: usize,
        batches: usize,
    ) -> Result<RunningJob> {
        let run_id = self.db.begin_job_run(account, kind).await?;

        tracing::info!(account = %account, kind = %kind, items, batches, "Job started");
        self.emit_event(Event::JobStarted {
            account: account.clone(),
            kind,
            items,
            batches,
        });

        Ok(RunningJob {
            account: account.clone(),
            kind,
            run_id,
            cancel: cancel.clone(),
            batches_planned: batches,
            batches_run: 0,
            succeeded: 0,
            failed: 0,
        })
    }

    /// Execute every batch of the plan in order
    ///
    /// Returns the abort reason if the job stopped early.
    pub(crate) async fn run_batches<T, E>(
        &self,
        job: &mut RunningJob,
        plan: BatchPlan<T>,
        executor: &E,
        throttle: &ThrottleController,
    ) -> Option<AbortReason>
    where
        T: Send + Sync,
        E: BatchExecutor<T>,
    {
        let batches = plan.batch_count();

        for (index, batch) in plan.into_batches().into_iter().enumerate() {
            let number = index + 1;
            if job.cancel.is_cancelled() {
                return Some(AbortReason::Cancelled);
            }

            tracing::debug!(
                account = %job.account,
                kind = %job.kind,
                batch = number,
                batches,
                size = batch.len(),
                "Submitting batch"
            );
            self.emit_event(Event::BatchStarted {
                account: job.account.clone(),
                kind: job.kind,
                batch: number,
                batches,
                size: batch.len(),
            });

            let mut attempt: u32 = 0;
            let settled = loop {
                match executor.execute(&batch).await {
                    BatchOutcome::Settled(settled) => break settled,
                    BatchOutcome::Throttled(wait) => {
                        attempt += 1;
                        if !throttle.may_retry(attempt) {
                            tracing::warn!(
                                account = %job.account,
                                kind = %job.kind,
                                batch = number,
                                attempt,
                                "Throttle retry limit reached, failing batch"
                            );
                            break executor.fail(&batch, FailureReason::ThrottleLimit).await;
                        }

                        tracing::warn!(
                            account = %job.account,
                            kind = %job.kind,
                            batch = number,
                            wait_secs = wait.as_secs(),
                            attempt,
                            "Throttled by platform, waiting before retrying batch"
                        );
                        self.emit_event(Event::Throttled {
                            account: job.account.clone(),
                            kind: job.kind,
                            batch: number,
                            wait_secs: wait.as_secs(),
                            attempt,
                        });

                        if !wait_or_cancel(wait, &job.cancel).await {
                            return Some(AbortReason::Cancelled);
                        }
                    }
                }
            };

            match settled {
                SettledBatch::Completed {
                    succeeded,
                    failed,
                    called_remote,
                } => {
                    job.batches_run += 1;
                    job.succeeded += succeeded;
                    job.failed += failed;
                    self.emit_event(Event::BatchCompleted {
                        account: job.account.clone(),
                        kind: job.kind,
                        batch: number,
                        succeeded,
                        failed,
                        total_succeeded: job.succeeded,
                        total_failed: job.failed,
                    });

                    if called_remote && number < batches {
                        let delay = throttle.pacing_delay();
                        tracing::debug!(
                            account = %job.account,
                            kind = %job.kind,
                            delay_ms = delay.as_millis() as u64,
                            "Pacing before next batch"
                        );
                        self.emit_event(Event::Pacing {
                            account: job.account.clone(),
                            kind: job.kind,
                            batch: number,
                            delay_ms: delay.as_millis() as u64,
                        });
                        if !wait_or_cancel(delay, &job.cancel).await {
                            return Some(AbortReason::Cancelled);
                        }
                    }
                }
                SettledBatch::Failed { failed, error } => {
                    job.batches_run += 1;
                    job.failed += failed;
                    self.emit_event(Event::BatchFailed {
                        account: job.account.clone(),
                        kind: job.kind,
                        batch: number,
                        error,
                        total_succeeded: job.succeeded,
                        total_failed: job.failed,
                    });
                }
                SettledBatch::Fatal(reason) => return Some(reason),
            }
        }

        None
    }

    /// Move a job to its terminal state and record the run
    pub(crate) async fn finish_job(
        &self,
        job: RunningJob,
        abort_reason: Option<AbortReason>,
    ) -> JobSummary {
        let state = if abort_reason.is_some() {
            JobState::Aborted
        } else {
            JobState::Completed
        };

        match &abort_reason {
            None => {
                tracing::info!(
                    account = %job.account,
                    kind = %job.kind,
                    succeeded = job.succeeded,
                    failed = job.failed,
                    "Job completed"
                );
                self.emit_event(Event::JobCompleted {
                    account: job.account.clone(),
                    kind: job.kind,
                    succeeded: job.succeeded,
                    failed: job.failed,
                });
            }
            Some(reason) => {
                tracing::warn!(
                    account = %job.account,
                    kind = %job.kind,
                    reason = %reason,
                    succeeded = job.succeeded,
                    failed = job.failed,
                    "Job aborted"
                );
                self.emit_event(Event::JobAborted {
                    account: job.account.clone(),
                    kind: job.kind,
                    reason: reason.clone(),
                    succeeded: job.succeeded,
                    failed: job.failed,
                });
            }
        }

        let outcome = JobRunOutcome {
            state,
            succeeded: job.succeeded,
            failed: job.failed,
            abort_reason: abort_reason.as_ref(),
        };
        if let Err(e) = self.db.finish_job_run(job.run_id, &outcome).await {
            tracing::error!(run_id = job.run_id, error = %e, "Failed to record job run outcome");
        }

        JobSummary {
            account: job.account,
            kind: job.kind,
            state,
            succeeded: job.succeeded,
            failed: job.failed,
            batches_planned: job.batches_planned,
            batches_run: job.batches_run,
            abort_reason,
        }
    }
}
