//! Contact import jobs.

use crate::error::Result;
use crate::session::SessionRegistry;
use crate::types::{AbortReason, AccountId, ContactItem, JobSummary, OperationKind};
use serde::{Deserialize, Serialize};

use super::BulkEngine;
use super::executor::ImportExecutor;
use super::partition::{BatchPlan, pending_contacts};
use super::throttle::ThrottleController;

/// Request to import contacts into an account's address book
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ImportRequest {
    /// Account to import into
    pub account: AccountId,
    /// Contacts to import; already-imported phones and duplicates are skipped
    pub contacts: Vec<ContactItem>,
}

impl ImportRequest {
    /// Create a new import request
    pub fn new(account: impl Into<AccountId>, contacts: Vec<ContactItem>) -> Self {
        Self {
            account: account.into(),
            contacts,
        }
    }
}

impl BulkEngine {
    /// Import contacts in paced batches
    ///
    /// Contacts whose phone is already in the imported set are skipped, so re-issuing the
    /// same request after a crash or cancellation resumes where the last run stopped.
    /// Contacts in the failed set are attempted again.
    ///
    /// Returns `Idle` with [`Event::NothingToDo`](crate::types::Event::NothingToDo) when
    /// nothing is left to import, otherwise the job's terminal summary.
    ///
    /// # Errors
    ///
    /// - [`JobError::AlreadyRunning`](crate::error::JobError::AlreadyRunning) if the
    ///   account already has a running job
    /// - [`JobError::ShuttingDown`](crate::error::JobError::ShuttingDown) after
    ///   [`shutdown`](Self::shutdown)
    /// - a database error if progress cannot be read before the job starts
    pub async fn run_import(
        &self,
        sessions: &SessionRegistry,
        request: ImportRequest,
    ) -> Result<JobSummary> {
        let ImportRequest { account, contacts } = request;
        let kind = OperationKind::Import;
        let guard = self.admit(&account, kind)?;

        let snapshot = self.db.import_snapshot(&account).await?;
        let pending = pending_contacts(&contacts, &snapshot.imported_phones);

        let throttle =
            ThrottleController::new(self.config.import.clone(), self.config.max_throttle_retries);
        let plan = BatchPlan::new(&pending, throttle.batch_size());
        if plan.is_empty() {
            return Ok(self.nothing_to_do(&account, kind));
        }

        let retrying = pending
            .iter()
            .filter(|c| snapshot.failed_phones.contains(&c.phone))
            .count();
        tracing::debug!(
            account = %account,
            requested = contacts.len(),
            pending = pending.len(),
            retrying,
            "Planned import"
        );

        let mut job = self
            .start_job(
                &account,
                kind,
                guard.cancel_token(),
                plan.item_count(),
                plan.batch_count(),
            )
            .await?;

        let Some(client) = sessions.get(&account).await else {
            let reason = AbortReason::SessionInvalid("no connected session".to_string());
            return Ok(self.finish_job(job, Some(reason)).await);
        };

        let executor = ImportExecutor {
            db: &self.db,
            client: client.as_ref(),
            account: &account,
        };
        let abort_reason = self.run_batches(&mut job, plan, &executor, &throttle).await;

        Ok(self.finish_job(job, abort_reason).await)
    }
}
