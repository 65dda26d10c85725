//! Import progress: imported contacts, the remote user pool, and failed imports.

use crate::Result;
use crate::types::{AccountId, ContactItem, FailedItem, RemoteUserRecord};
use std::collections::HashMap;

use super::{
    Database, FailedImportRow, ImportBatchResult, ImportSnapshot, ImportedContactRow,
    RemoteUserRow, query_error,
};

/// Digits-only form of a phone number, used to match platform-reported phones
/// (which may drop the leading '+') against submitted contacts.
pub(crate) fn phone_key(phone: &str) -> String {
    phone.chars().filter(char::is_ascii_digit).collect()
}

impl Database {
    /// Load the import progress for an account
    pub async fn import_snapshot(&self, account: &AccountId) -> Result<ImportSnapshot> {
        let imported_phones: Vec<String> =
            sqlx::query_scalar("SELECT phone FROM imported_contacts WHERE account_id = ?")
                .bind(account)
                .fetch_all(&self.pool)
                .await
                .map_err(|e| query_error("Failed to load imported phones", e))?;

        let failed_phones: Vec<String> =
            sqlx::query_scalar("SELECT phone FROM failed_imports WHERE account_id = ?")
                .bind(account)
                .fetch_all(&self.pool)
                .await
                .map_err(|e| query_error("Failed to load failed import phones", e))?;

        Ok(ImportSnapshot {
            imported_phones: imported_phones.into_iter().collect(),
            failed_phones: failed_phones.into_iter().collect(),
        })
    }

    /// Persist the outcome of one import batch atomically
    ///
    /// Accepted contacts join the imported set and leave the failed set, returned users
    /// are upserted into the invite candidate pool (refreshing their access token), and
    /// rejected contacts are upserted into the failed set.
    pub async fn commit_import_batch(
        &self,
        account: &AccountId,
        result: &ImportBatchResult,
    ) -> Result<()> {
        let now = chrono::Utc::now().timestamp();

        let remote_ids: HashMap<String, i64> = result
            .users
            .iter()
            .filter(|u| !u.phone.is_empty())
            .map(|u| (phone_key(&u.phone), u.remote_id))
            .collect();

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| query_error("Failed to begin import commit", e))?;

        for contact in &result.imported {
            let remote_id = remote_ids.get(&phone_key(&contact.phone)).copied();
            sqlx::query(
                r#"
                INSERT INTO imported_contacts (account_id, phone, display_name, remote_id, imported_at)
                VALUES (?, ?, ?, ?, ?)
                ON CONFLICT(account_id, phone) DO UPDATE SET
                    remote_id = COALESCE(excluded.remote_id, imported_contacts.remote_id)
                "#,
            )
            .bind(account)
            .bind(&contact.phone)
            .bind(&contact.display_name)
            .bind(remote_id)
            .bind(now)
            .execute(&mut *tx)
            .await
            .map_err(|e| query_error("Failed to insert imported contact", e))?;

            sqlx::query("DELETE FROM failed_imports WHERE account_id = ? AND phone = ?")
                .bind(account)
                .bind(&contact.phone)
                .execute(&mut *tx)
                .await
                .map_err(|e| query_error("Failed to clear failed import", e))?;
        }

        for user in &result.users {
            sqlx::query(
                r#"
                INSERT INTO remote_users
                    (account_id, remote_id, access_token, display_name, phone, imported_at, seq)
                VALUES (?, ?, ?, ?, ?, ?,
                    (SELECT COALESCE(MAX(seq), 0) + 1 FROM remote_users WHERE account_id = ?))
                ON CONFLICT(account_id, remote_id) DO UPDATE SET
                    access_token = COALESCE(excluded.access_token, remote_users.access_token),
                    display_name = excluded.display_name,
                    phone = CASE WHEN excluded.phone != '' THEN excluded.phone ELSE remote_users.phone END
                "#,
            )
            .bind(account)
            .bind(user.remote_id)
            .bind(&user.access_token)
            .bind(&user.display_name)
            .bind(&user.phone)
            .bind(now)
            .bind(account)
            .execute(&mut *tx)
            .await
            .map_err(|e| query_error("Failed to upsert remote user", e))?;
        }

        for failed in &result.failed {
            Self::upsert_failed_import(&mut tx, account, failed).await?;
        }

        tx.commit()
            .await
            .map_err(|e| query_error("Failed to commit import batch", e))?;

        Ok(())
    }

    /// Record contacts as failed without any successes (whole-batch failure)
    pub async fn record_import_failures(
        &self,
        account: &AccountId,
        failed: &[FailedItem<ContactItem>],
    ) -> Result<()> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| query_error("Failed to begin failure commit", e))?;

        for item in failed {
            Self::upsert_failed_import(&mut tx, account, item).await?;
        }

        tx.commit()
            .await
            .map_err(|e| query_error("Failed to commit import failures", e))?;
        Ok(())
    }

    async fn upsert_failed_import(
        tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
        account: &AccountId,
        failed: &FailedItem<ContactItem>,
    ) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO failed_imports (account_id, phone, display_name, reason, detail, failed_at)
            VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT(account_id, phone) DO UPDATE SET
                display_name = excluded.display_name,
                reason = excluded.reason,
                detail = excluded.detail,
                failed_at = excluded.failed_at
            "#,
        )
        .bind(account)
        .bind(&failed.item.phone)
        .bind(&failed.item.display_name)
        .bind(failed.reason.code())
        .bind(failed.reason.detail())
        .bind(failed.failed_at.timestamp())
        .execute(&mut **tx)
        .await
        .map_err(|e| query_error("Failed to record failed import", e))?;
        Ok(())
    }

    /// List imported contacts in import order
    pub async fn list_imported_contacts(
        &self,
        account: &AccountId,
    ) -> Result<Vec<ImportedContactRow>> {
        let rows = sqlx::query_as::<_, ImportedContactRow>(
            r#"
            SELECT account_id, phone, display_name, remote_id, imported_at
            FROM imported_contacts
            WHERE account_id = ?
            ORDER BY imported_at ASC, rowid ASC
            "#,
        )
        .bind(account)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| query_error("Failed to list imported contacts", e))?;

        Ok(rows)
    }

    /// List the invite candidate pool in the order users were first imported
    pub async fn list_remote_users(&self, account: &AccountId) -> Result<Vec<RemoteUserRecord>> {
        let rows = sqlx::query_as::<_, RemoteUserRow>(
            r#"
            SELECT remote_id, access_token, display_name, phone
            FROM remote_users
            WHERE account_id = ?
            ORDER BY seq ASC
            "#,
        )
        .bind(account)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| query_error("Failed to list remote users", e))?;

        Ok(rows.into_iter().map(RemoteUserRecord::from).collect())
    }

    /// List contacts waiting in the failed set
    pub async fn list_failed_imports(
        &self,
        account: &AccountId,
    ) -> Result<Vec<FailedItem<ContactItem>>> {
        let rows = sqlx::query_as::<_, FailedImportRow>(
            r#"
            SELECT phone, display_name, reason, detail, failed_at
            FROM failed_imports
            WHERE account_id = ?
            ORDER BY failed_at ASC, rowid ASC
            "#,
        )
        .bind(account)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| query_error("Failed to list failed imports", e))?;

        Ok(rows.into_iter().map(FailedItem::from).collect())
    }

    /// Size of the imported set
    pub async fn count_imported(&self, account: &AccountId) -> Result<u64> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM imported_contacts WHERE account_id = ?")
                .bind(account)
                .fetch_one(&self.pool)
                .await
                .map_err(|e| query_error("Failed to count imported contacts", e))?;
        Ok(count as u64)
    }

    /// Size of the failed import set
    pub async fn count_failed_imports(&self, account: &AccountId) -> Result<u64> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM failed_imports WHERE account_id = ?")
                .bind(account)
                .fetch_one(&self.pool)
                .await
                .map_err(|e| query_error("Failed to count failed imports", e))?;
        Ok(count as u64)
    }
}
