//! Job admission, cancellation, and shutdown.

use crate::error::{JobError, Result};
use crate::types::{AccountId, Event, OperationKind};
use std::sync::atomic::Ordering;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use super::{ActiveJobs, BulkEngine};

/// How long `shutdown` waits for running jobs to reach a batch boundary
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);

/// A job admitted into `Running`
#[derive(Clone, Debug)]
pub(crate) struct ActiveJob {
    pub(crate) kind: OperationKind,
    pub(crate) cancel: CancellationToken,
}

/// Slot held by a running job; releases the account when dropped
#[must_use = "the account is released as soon as the guard is dropped"]
pub(crate) struct JobGuard {
    active: ActiveJobs,
    account: AccountId,
    cancel: CancellationToken,
}

impl JobGuard {
    /// Cancellation token for the job holding this slot
    pub(crate) fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }
}

impl Drop for JobGuard {
    fn drop(&mut self) {
        self.active.lock().remove(&self.account);
    }
}

impl std::fmt::Debug for JobGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobGuard")
            .field("account", &self.account)
            .field("cancelled", &self.cancel.is_cancelled())
            .finish()
    }
}

impl ActiveJobs {
    fn lock(
        &self,
    ) -> std::sync::MutexGuard<'_, std::collections::HashMap<AccountId, ActiveJob>> {
        self.jobs
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl BulkEngine {
    /// Claim the account for a new job
    ///
    /// At most one job runs per account, whatever its kind.
    pub(crate) fn admit(&self, account: &AccountId, kind: OperationKind) -> Result<JobGuard> {
        if !self.active.accepting_new.load(Ordering::SeqCst) {
            return Err(JobError::ShuttingDown.into());
        }

        let mut jobs = self.active.lock();
        if let Some(existing) = jobs.get(account) {
            tracing::warn!(
                account = %account,
                requested = %kind,
                running = %existing.kind,
                "Rejected job request, account already has a running job"
            );
            return Err(JobError::AlreadyRunning {
                account: account.clone(),
            }
            .into());
        }

        let cancel = CancellationToken::new();
        jobs.insert(
            account.clone(),
            ActiveJob {
                kind,
                cancel: cancel.clone(),
            },
        );

        Ok(JobGuard {
            active: self.active.clone(),
            account: account.clone(),
            cancel,
        })
    }

    /// Request cancellation of the account's running job
    ///
    /// The job stops at its next batch boundary or pending wait and ends `Aborted`.
    /// A batch whose remote call is already in flight still has its outcome persisted.
    /// Returns `false` if the account has no running job.
    pub fn cancel(&self, account: &AccountId) -> bool {
        let jobs = self.active.lock();
        match jobs.get(account) {
            Some(job) => {
                tracing::info!(account = %account, kind = %job.kind, "Cancelling job");
                job.cancel.cancel();
                true
            }
            None => false,
        }
    }

    /// Whether the account has a running job
    pub fn is_running(&self, account: &AccountId) -> bool {
        self.active.lock().contains_key(account)
    }

    /// Operation kind of the account's running job, if any
    pub fn running_kind(&self, account: &AccountId) -> Option<OperationKind> {
        self.active.lock().get(account).map(|job| job.kind)
    }

    /// Accounts with a running job and the job's kind
    pub fn running_jobs(&self) -> Vec<(AccountId, OperationKind)> {
        let mut running: Vec<(AccountId, OperationKind)> = self
            .active
            .lock()
            .iter()
            .map(|(account, job)| (account.clone(), job.kind))
            .collect();
        running.sort_by(|a, b| a.0.cmp(&b.0));
        running
    }

    /// Gracefully shut down the engine
    ///
    /// Stops admitting jobs, cancels every running job, and waits (up to 30 seconds)
    /// for them to record their abort before emitting [`Event::Shutdown`].
    pub async fn shutdown(&self) -> Result<()> {
        tracing::info!("Initiating graceful shutdown");

        self.active.accepting_new.store(false, Ordering::SeqCst);
        tracing::info!("Stopped accepting new jobs");

        {
            let jobs = self.active.lock();
            tracing::debug!(active_count = jobs.len(), "Cancelling all running jobs");
            for (account, job) in jobs.iter() {
                tracing::debug!(account = %account, kind = %job.kind, "Signaling cancellation");
                job.cancel.cancel();
            }
        }

        match tokio::time::timeout(SHUTDOWN_TIMEOUT, self.wait_for_running_jobs()).await {
            Ok(()) => tracing::info!("All running jobs stopped"),
            Err(_) => tracing::warn!("Timeout waiting for jobs to stop, proceeding with shutdown"),
        }

        self.emit_event(Event::Shutdown);
        tracing::info!("Graceful shutdown complete");
        Ok(())
    }

    async fn wait_for_running_jobs(&self) {
        loop {
            let active_count = self.active.lock().len();
            if active_count == 0 {
                return;
            }

            tracing::debug!(active_count, "Waiting for running jobs to stop");
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
    }
}
