//! Invite progress: invited users and failed invites.

use crate::Result;
use crate::types::{AccountId, FailedItem, InviteRecord, RemoteUserRecord};

use super::{
    Database, FailedInviteRow, InviteBatchResult, InviteSnapshot, InvitedRow, query_error,
};

impl Database {
    /// Load the invite candidate pool and invited set for an account
    pub async fn invite_snapshot(&self, account: &AccountId) -> Result<InviteSnapshot> {
        let users = self.list_remote_users(account).await?;

        let invited_ids: Vec<i64> =
            sqlx::query_scalar("SELECT remote_id FROM invited_users WHERE account_id = ?")
                .bind(account)
                .fetch_all(&self.pool)
                .await
                .map_err(|e| query_error("Failed to load invited ids", e))?;

        Ok(InviteSnapshot {
            users,
            invited_ids: invited_ids.into_iter().collect(),
        })
    }

    /// Persist the outcome of one invite batch atomically
    ///
    /// Invited users join the invited set and leave the failed set; rejected or
    /// skipped users are upserted into the failed set.
    pub async fn commit_invite_batch(
        &self,
        account: &AccountId,
        result: &InviteBatchResult,
    ) -> Result<()> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| query_error("Failed to begin invite commit", e))?;

        for record in &result.invited {
            sqlx::query(
                r#"
                INSERT INTO invited_users (account_id, remote_id, invited_at)
                VALUES (?, ?, ?)
                ON CONFLICT(account_id, remote_id) DO NOTHING
                "#,
            )
            .bind(account)
            .bind(record.remote_id)
            .bind(record.invited_at.timestamp())
            .execute(&mut *tx)
            .await
            .map_err(|e| query_error("Failed to insert invited user", e))?;

            sqlx::query("DELETE FROM failed_invites WHERE account_id = ? AND remote_id = ?")
                .bind(account)
                .bind(record.remote_id)
                .execute(&mut *tx)
                .await
                .map_err(|e| query_error("Failed to clear failed invite", e))?;
        }

        for failed in &result.failed {
            Self::upsert_failed_invite(&mut tx, account, failed).await?;
        }

        tx.commit()
            .await
            .map_err(|e| query_error("Failed to commit invite batch", e))?;

        Ok(())
    }

    /// Record users as failed without any successes (whole-batch failure)
    pub async fn record_invite_failures(
        &self,
        account: &AccountId,
        failed: &[FailedItem<RemoteUserRecord>],
    ) -> Result<()> {
        self.commit_invite_batch(
            account,
            &InviteBatchResult {
                invited: Vec::new(),
                failed: failed.to_vec(),
            },
        )
        .await
    }

    async fn upsert_failed_invite(
        tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
        account: &AccountId,
        failed: &FailedItem<RemoteUserRecord>,
    ) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO failed_invites
                (account_id, remote_id, access_token, display_name, phone, reason, detail, failed_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(account_id, remote_id) DO UPDATE SET
                access_token = excluded.access_token,
                display_name = excluded.display_name,
                phone = excluded.phone,
                reason = excluded.reason,
                detail = excluded.detail,
                failed_at = excluded.failed_at
            "#,
        )
        .bind(account)
        .bind(failed.item.remote_id)
        .bind(&failed.item.access_token)
        .bind(&failed.item.display_name)
        .bind(&failed.item.phone)
        .bind(failed.reason.code())
        .bind(failed.reason.detail())
        .bind(failed.failed_at.timestamp())
        .execute(&mut **tx)
        .await
        .map_err(|e| query_error("Failed to record failed invite", e))?;
        Ok(())
    }

    /// List invited users in invite order
    pub async fn list_invited(&self, account: &AccountId) -> Result<Vec<InviteRecord>> {
        let rows = sqlx::query_as::<_, InvitedRow>(
            r#"
            SELECT remote_id, invited_at
            FROM invited_users
            WHERE account_id = ?
            ORDER BY invited_at ASC, rowid ASC
            "#,
        )
        .bind(account)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| query_error("Failed to list invited users", e))?;

        Ok(rows.into_iter().map(InviteRecord::from).collect())
    }

    /// List users waiting in the failed invite set
    pub async fn list_failed_invites(
        &self,
        account: &AccountId,
    ) -> Result<Vec<FailedItem<RemoteUserRecord>>> {
        let rows = sqlx::query_as::<_, FailedInviteRow>(
            r#"
            SELECT remote_id, access_token, display_name, phone, reason, detail, failed_at
            FROM failed_invites
            WHERE account_id = ?
            ORDER BY failed_at ASC, rowid ASC
            "#,
        )
        .bind(account)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| query_error("Failed to list failed invites", e))?;

        Ok(rows.into_iter().map(FailedItem::from).collect())
    }

    /// Size of the invited set
    pub async fn count_invited(&self, account: &AccountId) -> Result<u64> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM invited_users WHERE account_id = ?")
                .bind(account)
                .fetch_one(&self.pool)
                .await
                .map_err(|e| query_error("Failed to count invited users", e))?;
        Ok(count as u64)
    }

    /// Size of the failed invite set
    pub async fn count_failed_invites(&self, account: &AccountId) -> Result<u64> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM failed_invites WHERE account_id = ?")
                .bind(account)
                .fetch_one(&self.pool)
                .await
                .map_err(|e| query_error("Failed to count failed invites", e))?;
        Ok(count as u64)
    }
}
