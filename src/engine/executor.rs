//! Batch execution: one remote call per batch, outcome persisted atomically.
//!
//! An executor never sleeps and never retries. A throttle signal is handed back to the
//! runner untouched and nothing is written, so the retried batch starts from a clean
//! slate. Every other outcome is committed in a single store transaction before the
//! executor returns.

use crate::db::{Database, ImportBatchResult, InviteBatchResult};
use crate::remote::{
    ChannelRef, RejectReason, RemoteClient, RemoteError, RemoteErrorKind, RemoteOutcome,
};
use crate::types::{
    AbortReason, AccountId, ContactItem, FailedItem, FailureReason, InviteRecord,
    RemoteUserRecord,
};
use async_trait::async_trait;
use std::collections::HashSet;
use std::time::Duration;

/// Result of one remote call for a batch
#[derive(Clone, Debug, PartialEq)]
pub(crate) enum BatchOutcome {
    /// Outcome recorded; the runner moves on
    Settled(SettledBatch),
    /// Nothing recorded; wait this long and resubmit the identical batch
    Throttled(Duration),
}

/// A batch outcome that has been persisted (or that ends the job)
#[derive(Clone, Debug, PartialEq)]
pub(crate) enum SettledBatch {
    /// Full or partial success; rejected and skipped items went to the failed set
    Completed {
        succeeded: usize,
        failed: usize,
        /// False when every item was skipped before reaching the platform
        called_remote: bool,
    },
    /// Whole batch recorded as failed; the job continues with the next batch
    Failed { failed: usize, error: String },
    /// Continuing is meaningless
    Fatal(AbortReason),
}

/// Runs single batches of one pipeline
#[async_trait]
pub(crate) trait BatchExecutor<T: Send + Sync>: Send + Sync {
    /// Submit the batch and persist its outcome
    async fn execute(&self, batch: &[T]) -> BatchOutcome;

    /// Record every item of the batch as failed without calling the platform
    async fn fail(&self, batch: &[T], reason: FailureReason) -> SettledBatch;
}

fn storage_abort(e: crate::Error) -> SettledBatch {
    tracing::error!(error = %e, "Failed to persist batch outcome");
    SettledBatch::Fatal(AbortReason::Storage(e.to_string()))
}

fn classify_error(e: RemoteError) -> Result<String, SettledBatch> {
    if e.is_fatal() {
        tracing::error!(error = %e, "Session rejected by platform");
        Err(SettledBatch::Fatal(AbortReason::SessionInvalid(e.message)))
    } else if e.kind == RemoteErrorKind::ChannelInvalid {
        tracing::error!(error = %e, "Target channel no longer resolvable");
        Err(SettledBatch::Fatal(AbortReason::ChannelUnresolved(e.message)))
    } else {
        tracing::warn!(error = %e, "Batch failed");
        Ok(e.to_string())
    }
}

/// Contact import batches
pub(crate) struct ImportExecutor<'a> {
    pub(crate) db: &'a Database,
    pub(crate) client: &'a dyn RemoteClient,
    pub(crate) account: &'a AccountId,
}

impl ImportExecutor<'_> {
    async fn persist(&self, result: ImportBatchResult, called_remote: bool) -> SettledBatch {
        let succeeded = result.imported.len();
        let failed = result.failed.len();
        match self.db.commit_import_batch(self.account, &result).await {
            Ok(()) => SettledBatch::Completed {
                succeeded,
                failed,
                called_remote,
            },
            Err(e) => storage_abort(e),
        }
    }
}

#[async_trait]
impl BatchExecutor<ContactItem> for ImportExecutor<'_> {
    async fn execute(&self, batch: &[ContactItem]) -> BatchOutcome {
        let outcome = match self.client.import_contacts(batch).await {
            RemoteOutcome::Success(response) => {
                let in_batch: HashSet<&str> = batch.iter().map(|c| c.phone.as_str()).collect();
                let mut rejected_phones: HashSet<String> = HashSet::new();
                let mut failed = Vec::new();
                for rejected in response.rejected {
                    if in_batch.contains(rejected.item.phone.as_str())
                        && rejected_phones.insert(rejected.item.phone.clone())
                    {
                        failed.push(FailedItem::new(rejected.item, rejected.reason.into()));
                    }
                }

                let imported: Vec<ContactItem> = batch
                    .iter()
                    .filter(|c| !rejected_phones.contains(&c.phone))
                    .cloned()
                    .collect();

                tracing::debug!(
                    account = %self.account,
                    imported = imported.len(),
                    rejected = failed.len(),
                    users = response.created.len(),
                    "Import batch accepted"
                );

                self.persist(
                    ImportBatchResult {
                        imported,
                        users: response.created,
                        failed,
                    },
                    true,
                )
                .await
            }
            RemoteOutcome::Throttled(wait) => return BatchOutcome::Throttled(wait),
            RemoteOutcome::Rejected(reason) => {
                tracing::warn!(account = %self.account, ?reason, "Import batch rejected");
                let failed = fail_all(batch, &reason.into());
                self.persist(
                    ImportBatchResult {
                        failed,
                        ..Default::default()
                    },
                    true,
                )
                .await
            }
            RemoteOutcome::Error(e) => match classify_error(e) {
                Ok(error) => match self.fail(batch, FailureReason::BatchError(error.clone())).await
                {
                    SettledBatch::Failed { failed, .. } => SettledBatch::Failed { failed, error },
                    other => other,
                },
                Err(fatal) => fatal,
            },
        };
        BatchOutcome::Settled(outcome)
    }

    async fn fail(&self, batch: &[ContactItem], reason: FailureReason) -> SettledBatch {
        let failed = fail_all(batch, &reason);
        match self.db.record_import_failures(self.account, &failed).await {
            Ok(()) => SettledBatch::Failed {
                failed: failed.len(),
                error: reason.to_string(),
            },
            Err(e) => storage_abort(e),
        }
    }
}

/// Group invite batches
pub(crate) struct InviteExecutor<'a> {
    pub(crate) db: &'a Database,
    pub(crate) client: &'a dyn RemoteClient,
    pub(crate) account: &'a AccountId,
    pub(crate) channel: &'a ChannelRef,
}

impl InviteExecutor<'_> {
    async fn persist(&self, result: InviteBatchResult, called_remote: bool) -> SettledBatch {
        let succeeded = result.invited.len();
        let failed = result.failed.len();
        match self.db.commit_invite_batch(self.account, &result).await {
            Ok(()) => SettledBatch::Completed {
                succeeded,
                failed,
                called_remote,
            },
            Err(e) => storage_abort(e),
        }
    }
}

#[async_trait]
impl BatchExecutor<RemoteUserRecord> for InviteExecutor<'_> {
    async fn execute(&self, batch: &[RemoteUserRecord]) -> BatchOutcome {
        let (submittable, skipped): (Vec<RemoteUserRecord>, Vec<RemoteUserRecord>) = batch
            .iter()
            .cloned()
            .partition(RemoteUserRecord::has_access_token);

        let mut failed = fail_all(&skipped, &FailureReason::MissingAccessToken);
        if !skipped.is_empty() {
            tracing::debug!(
                account = %self.account,
                skipped = skipped.len(),
                "Skipping users without an access token"
            );
        }

        if submittable.is_empty() {
            let outcome = self
                .persist(
                    InviteBatchResult {
                        invited: Vec::new(),
                        failed,
                    },
                    false,
                )
                .await;
            return BatchOutcome::Settled(outcome);
        }

        let outcome = match self.client.invite_users(self.channel, &submittable).await {
            RemoteOutcome::Success(response) => {
                let mut rejected: std::collections::HashMap<i64, RejectReason> = response
                    .rejected
                    .into_iter()
                    .map(|r| (r.item, r.reason))
                    .collect();

                let now = chrono::Utc::now();
                let mut invited = Vec::with_capacity(submittable.len());
                for user in submittable {
                    match rejected.remove(&user.remote_id) {
                        Some(reason) => failed.push(FailedItem::new(user, reason.into())),
                        None => invited.push(InviteRecord {
                            remote_id: user.remote_id,
                            invited_at: now,
                        }),
                    }
                }

                tracing::debug!(
                    account = %self.account,
                    channel = %self.channel,
                    invited = invited.len(),
                    failed = failed.len(),
                    "Invite batch accepted"
                );

                self.persist(InviteBatchResult { invited, failed }, true)
                    .await
            }
            RemoteOutcome::Throttled(wait) => return BatchOutcome::Throttled(wait),
            RemoteOutcome::Rejected(reason) => {
                tracing::warn!(account = %self.account, ?reason, "Invite batch rejected");
                failed.extend(fail_all(&submittable, &reason.into()));
                self.persist(
                    InviteBatchResult {
                        invited: Vec::new(),
                        failed,
                    },
                    true,
                )
                .await
            }
            RemoteOutcome::Error(e) => match classify_error(e) {
                Ok(error) => {
                    failed.extend(fail_all(
                        &submittable,
                        &FailureReason::BatchError(error.clone()),
                    ));
                    let count = failed.len();
                    match self.db.record_invite_failures(self.account, &failed).await {
                        Ok(()) => SettledBatch::Failed {
                            failed: count,
                            error,
                        },
                        Err(e) => storage_abort(e),
                    }
                }
                Err(fatal) => fatal,
            },
        };
        BatchOutcome::Settled(outcome)
    }

    async fn fail(&self, batch: &[RemoteUserRecord], reason: FailureReason) -> SettledBatch {
        let failed = fail_all(batch, &reason);
        match self.db.record_invite_failures(self.account, &failed).await {
            Ok(()) => SettledBatch::Failed {
                failed: failed.len(),
                error: reason.to_string(),
            },
            Err(e) => storage_abort(e),
        }
    }
}

fn fail_all<T: Clone>(items: &[T], reason: &FailureReason) -> Vec<FailedItem<T>> {
    items
        .iter()
        .map(|item| FailedItem::new(item.clone(), reason.clone()))
        .collect()
}
