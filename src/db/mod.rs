//! Progress Store for roster-bulk
//!
//! Handles SQLite persistence of per-account job progress. Every table is keyed by
//! account, and each batch's results are committed in a single transaction, so a
//! crash can lose at most the batch that was in flight.
//!
//! ## Submodules
//!
//! Methods on [`Database`] are organized by domain:
//! - [`migrations`] - Database lifecycle, schema migrations
//! - [`imports`] - imported contacts, imported users, failed imports
//! - [`invites`] - invited users, failed invites
//! - [`jobs`] - job-run history (state transitions)

use crate::types::{
    AbortReason, AccountId, ContactItem, FailedItem, FailureReason, InviteRecord, JobState,
    OperationKind, RemoteUserRecord,
};
use chrono::{DateTime, TimeZone, Utc};
use sqlx::{FromRow, sqlite::SqlitePool};
use std::collections::HashSet;

mod imports;
mod invites;
mod jobs;
mod migrations;

pub(crate) use imports::phone_key;

/// Import progress for one account, read once at the start of a job
#[derive(Debug, Clone, Default)]
pub struct ImportSnapshot {
    /// Phones already imported (never resubmitted)
    pub imported_phones: HashSet<String>,
    /// Phones waiting in the failed set
    pub failed_phones: HashSet<String>,
}

/// Invite progress for one account, read once at the start of a job
#[derive(Debug, Clone, Default)]
pub struct InviteSnapshot {
    /// Candidate pool: every user produced by past imports, in import order
    pub users: Vec<RemoteUserRecord>,
    /// Remote ids already invited (never re-invited)
    pub invited_ids: HashSet<i64>,
}

/// Results of one import batch, committed as one unit
#[derive(Debug, Clone, Default)]
pub struct ImportBatchResult {
    /// Contacts the platform accepted
    pub imported: Vec<ContactItem>,
    /// Platform users returned by the import
    pub users: Vec<RemoteUserRecord>,
    /// Contacts that were rejected
    pub failed: Vec<FailedItem<ContactItem>>,
}

/// Results of one invite batch, committed as one unit
#[derive(Debug, Clone, Default)]
pub struct InviteBatchResult {
    /// Users confirmed as invited
    pub invited: Vec<InviteRecord>,
    /// Users that were rejected or skipped
    pub failed: Vec<FailedItem<RemoteUserRecord>>,
}

/// Imported contact row from database
#[derive(Debug, Clone, FromRow)]
pub struct ImportedContactRow {
    /// Account the contact belongs to
    pub account_id: AccountId,
    /// Contact phone (identity key)
    pub phone: String,
    /// Display name submitted with the contact
    pub display_name: String,
    /// Platform user id, when the import returned a matching user
    pub remote_id: Option<i64>,
    /// Unix timestamp of the import
    pub imported_at: i64,
}

/// Remote user row from database
#[derive(Debug, Clone, FromRow)]
pub struct RemoteUserRow {
    /// Platform user id
    pub remote_id: i64,
    /// Opaque access token
    pub access_token: Option<String>,
    /// Display name reported by the platform
    pub display_name: String,
    /// Phone reported by the platform (may be empty)
    pub phone: String,
}

impl From<RemoteUserRow> for RemoteUserRecord {
    fn from(row: RemoteUserRow) -> Self {
        RemoteUserRecord {
            remote_id: row.remote_id,
            access_token: row.access_token,
            display_name: row.display_name,
            phone: row.phone,
        }
    }
}

/// Failed import row from database
#[derive(Debug, Clone, FromRow)]
pub struct FailedImportRow {
    /// Contact phone
    pub phone: String,
    /// Display name submitted with the contact
    pub display_name: String,
    /// Failure tag (see [`FailureReason::code`])
    pub reason: String,
    /// Failure detail
    pub detail: Option<String>,
    /// Unix timestamp of the failure
    pub failed_at: i64,
}

impl From<FailedImportRow> for FailedItem<ContactItem> {
    fn from(row: FailedImportRow) -> Self {
        FailedItem {
            item: ContactItem::new(row.phone, row.display_name),
            reason: FailureReason::from_parts(&row.reason, row.detail),
            failed_at: timestamp_to_utc(row.failed_at),
        }
    }
}

/// Invited user row from database
#[derive(Debug, Clone, FromRow)]
pub struct InvitedRow {
    /// Platform user id
    pub remote_id: i64,
    /// Unix timestamp of the invite
    pub invited_at: i64,
}

impl From<InvitedRow> for InviteRecord {
    fn from(row: InvitedRow) -> Self {
        InviteRecord {
            remote_id: row.remote_id,
            invited_at: timestamp_to_utc(row.invited_at),
        }
    }
}

/// Failed invite row from database
#[derive(Debug, Clone, FromRow)]
pub struct FailedInviteRow {
    /// Platform user id
    pub remote_id: i64,
    /// Access token at the time of failure
    pub access_token: Option<String>,
    /// Display name
    pub display_name: String,
    /// Phone
    pub phone: String,
    /// Failure tag
    pub reason: String,
    /// Failure detail
    pub detail: Option<String>,
    /// Unix timestamp of the failure
    pub failed_at: i64,
}

impl From<FailedInviteRow> for FailedItem<RemoteUserRecord> {
    fn from(row: FailedInviteRow) -> Self {
        FailedItem {
            item: RemoteUserRecord {
                remote_id: row.remote_id,
                access_token: row.access_token,
                display_name: row.display_name,
                phone: row.phone,
            },
            reason: FailureReason::from_parts(&row.reason, row.detail),
            failed_at: timestamp_to_utc(row.failed_at),
        }
    }
}

/// Job run record from database (raw from SQLite)
#[derive(Debug, Clone, FromRow)]
pub struct JobRunRow {
    /// Unique database ID
    pub id: i64,
    /// Account the job ran for
    pub account_id: AccountId,
    /// Operation kind name
    pub kind: String,
    /// State name
    pub state: String,
    /// Unix timestamp when the job entered Running
    pub started_at: i64,
    /// Unix timestamp of the terminal transition
    pub finished_at: Option<i64>,
    /// Items succeeded during the run
    pub succeeded: i64,
    /// Items failed during the run
    pub failed: i64,
    /// Abort reason tag
    pub abort_code: Option<String>,
    /// Abort reason text
    pub abort_message: Option<String>,
}

/// Job run history entry
#[derive(Debug, Clone, PartialEq)]
pub struct JobRun {
    /// Unique database ID
    pub id: i64,
    /// Account the job ran for
    pub account: AccountId,
    /// Pipeline
    pub kind: OperationKind,
    /// Last recorded state
    pub state: JobState,
    /// When the job entered Running
    pub started_at: DateTime<Utc>,
    /// When the job reached a terminal state
    pub finished_at: Option<DateTime<Utc>>,
    /// Items succeeded during the run
    pub succeeded: u64,
    /// Items failed during the run
    pub failed: u64,
    /// Abort reason tag (see [`AbortReason::code`])
    pub abort_code: Option<String>,
    /// Human-readable abort reason
    pub abort_message: Option<String>,
}

impl TryFrom<JobRunRow> for JobRun {
    type Error = crate::Error;

    fn try_from(row: JobRunRow) -> crate::Result<Self> {
        let kind = OperationKind::parse(&row.kind).ok_or_else(|| {
            crate::Error::Database(crate::error::DatabaseError::QueryFailed(format!(
                "job run {} has unknown operation kind '{}'",
                row.id, row.kind
            )))
        })?;

        Ok(JobRun {
            id: row.id,
            account: row.account_id,
            kind,
            state: JobState::parse(&row.state),
            started_at: timestamp_to_utc(row.started_at),
            finished_at: row.finished_at.map(timestamp_to_utc),
            succeeded: row.succeeded.max(0) as u64,
            failed: row.failed.max(0) as u64,
            abort_code: row.abort_code,
            abort_message: row.abort_message,
        })
    }
}

/// Terminal outcome written to a job run
#[derive(Debug, Clone)]
pub struct JobRunOutcome<'a> {
    /// Terminal state
    pub state: JobState,
    /// Items succeeded during the run
    pub succeeded: usize,
    /// Items failed during the run
    pub failed: usize,
    /// Set when `state` is Aborted
    pub abort_reason: Option<&'a AbortReason>,
}

/// Wrap a sqlx failure as a query error with context
fn query_error(context: &str, e: sqlx::Error) -> crate::Error {
    crate::Error::Database(crate::error::DatabaseError::QueryFailed(format!(
        "{}: {}",
        context, e
    )))
}

fn timestamp_to_utc(ts: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(ts, 0).single().unwrap_or_else(Utc::now)
}

/// Database handle for roster-bulk
pub struct Database {
    pool: SqlitePool,
}
