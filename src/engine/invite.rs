//! Group invite jobs.

use crate::error::{JobError, Result};
use crate::remote::ChannelRef;
use crate::session::SessionRegistry;
use crate::types::{AbortReason, AccountId, JobSummary, OperationKind};
use serde::{Deserialize, Serialize};

use super::BulkEngine;
use super::executor::InviteExecutor;
use super::partition::{BatchPlan, eligible_invitees, select_invite_candidates};
use super::throttle::ThrottleController;

/// Request to invite previously imported users into a channel
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct InviteRequest {
    /// Account to invite from; it must administer the channel
    pub account: AccountId,
    /// Target channel, if one has been resolved
    pub channel: Option<ChannelRef>,
    /// How many users to invite in this run
    pub count: usize,
}

impl InviteRequest {
    /// Create a new invite request
    pub fn new(account: impl Into<AccountId>, channel: ChannelRef, count: usize) -> Self {
        Self {
            account: account.into(),
            channel: Some(channel),
            count,
        }
    }
}

impl BulkEngine {
    /// Invite a random subset of not-yet-invited users in paced batches
    ///
    /// Draws `min(count, eligible)` users uniformly from the account's imported users,
    /// excluding everyone already invited. Before the first batch the account must be
    /// verified as an admin of the channel.
    ///
    /// # Errors
    ///
    /// - [`JobError::InvalidRequest`] when `count` is zero
    /// - [`JobError::AlreadyRunning`] if the account already has a running job
    /// - [`JobError::ShuttingDown`] after [`shutdown`](Self::shutdown)
    /// - a database error if progress cannot be read before the job starts
    pub async fn run_invite(
        &self,
        sessions: &SessionRegistry,
        request: InviteRequest,
    ) -> Result<JobSummary> {
        let InviteRequest {
            account,
            channel,
            count,
        } = request;
        if count == 0 {
            return Err(
                JobError::InvalidRequest("invite count must be at least 1".to_string()).into(),
            );
        }

        let kind = OperationKind::Invite;
        let guard = self.admit(&account, kind)?;

        let snapshot = self.db.invite_snapshot(&account).await?;
        let eligible = eligible_invitees(&snapshot.users, &snapshot.invited_ids);
        let selected = select_invite_candidates(&eligible, count, &mut rand::thread_rng());

        let throttle =
            ThrottleController::new(self.config.invite.clone(), self.config.max_throttle_retries);
        let plan = BatchPlan::new(&selected, throttle.batch_size());
        if plan.is_empty() {
            return Ok(self.nothing_to_do(&account, kind));
        }

        tracing::debug!(
            account = %account,
            requested = count,
            eligible = eligible.len(),
            selected = selected.len(),
            "Planned invites"
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

        let Some(channel) = channel else {
            let reason = AbortReason::ChannelUnresolved("no target channel set".to_string());
            return Ok(self.finish_job(job, Some(reason)).await);
        };

        let preflight = match client.check_admin(&channel).await {
            Ok(true) => None,
            Ok(false) => Some(AbortReason::NotAdmin),
            Err(e) if e.is_fatal() => Some(AbortReason::SessionInvalid(e.message)),
            Err(e) => Some(AbortReason::ChannelUnresolved(e.message)),
        };
        if let Some(reason) = preflight {
            return Ok(self.finish_job(job, Some(reason)).await);
        }
        tracing::debug!(account = %account, channel = %channel, "Admin rights verified");

        let executor = InviteExecutor {
            db: &self.db,
            client: client.as_ref(),
            account: &account,
            channel: &channel,
        };
        let abort_reason = self.run_batches(&mut job, plan, &executor, &throttle).await;

        Ok(self.finish_job(job, abort_reason).await)
    }
}
