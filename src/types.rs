//! Core types and events for roster-bulk

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Identifier of the end-user account a job runs on behalf of
///
/// Every Progress Store record is partitioned by this key.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AccountId(pub String);

impl AccountId {
    /// Create a new AccountId
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrow the inner identifier
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for AccountId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for AccountId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl std::fmt::Display for AccountId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

// Implement sqlx Type, Encode, and Decode for database operations
impl sqlx::Type<sqlx::Sqlite> for AccountId {
    fn type_info() -> sqlx::sqlite::SqliteTypeInfo {
        <String as sqlx::Type<sqlx::Sqlite>>::type_info()
    }

    fn compatible(ty: &sqlx::sqlite::SqliteTypeInfo) -> bool {
        <String as sqlx::Type<sqlx::Sqlite>>::compatible(ty)
    }
}

impl<'q> sqlx::Encode<'q, sqlx::Sqlite> for AccountId {
    fn encode_by_ref(
        &self,
        buf: &mut Vec<sqlx::sqlite::SqliteArgumentValue<'q>>,
    ) -> Result<sqlx::encode::IsNull, Box<dyn std::error::Error + Send + Sync>> {
        sqlx::Encode::<sqlx::Sqlite>::encode_by_ref(&self.0, buf)
    }
}

impl<'r> sqlx::Decode<'r, sqlx::Sqlite> for AccountId {
    fn decode(value: sqlx::sqlite::SqliteValueRef<'r>) -> Result<Self, sqlx::error::BoxDynError> {
        let id = <String as sqlx::Decode<sqlx::Sqlite>>::decode(value)?;
        Ok(Self(id))
    }
}

/// The two bulk operations the engine knows how to run
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationKind {
    /// Import contacts into the account's address book
    Import,
    /// Invite imported platform users into a group
    Invite,
}

impl OperationKind {
    /// Stable lowercase name, as stored in the database
    pub fn as_str(&self) -> &'static str {
        match self {
            OperationKind::Import => "import",
            OperationKind::Invite => "invite",
        }
    }

    /// Parse the stored name back into a kind
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "import" => Some(OperationKind::Import),
            "invite" => Some(OperationKind::Invite),
            _ => None,
        }
    }
}

impl std::fmt::Display for OperationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A contact to import. Identity key is `phone`.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContactItem {
    /// Phone number in international format (leading '+')
    pub phone: String,
    /// Name shown in the address book
    pub display_name: String,
}

impl ContactItem {
    /// Create a new contact item
    pub fn new(phone: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            phone: phone.into(),
            display_name: display_name.into(),
        }
    }
}

/// A platform user created by a successful import. Identity key is `remote_id`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteUserRecord {
    /// Stable platform identifier
    pub remote_id: i64,
    /// Opaque token required to target this user later (None if the platform withheld it)
    pub access_token: Option<String>,
    /// Display name reported by the platform
    pub display_name: String,
    /// Phone number reported by the platform (may be empty)
    pub phone: String,
}

impl RemoteUserRecord {
    /// Whether this user can be referenced by a later operation
    pub fn has_access_token(&self) -> bool {
        self.access_token.as_deref().is_some_and(|t| !t.is_empty())
    }
}

/// Why an item ended up in a failed set
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "code", content = "detail", rename_all = "snake_case")]
pub enum FailureReason {
    /// Recipient's privacy settings refuse the operation
    PrivacyRestricted,
    /// User record has no access token, so it cannot be targeted
    MissingAccessToken,
    /// The remote side rejected this specific item
    Rejected(String),
    /// The whole batch failed for a non-policy reason
    BatchError(String),
    /// The batch kept being throttled past the configured retry limit
    ThrottleLimit,
}

impl FailureReason {
    /// Stable tag stored alongside the failed item
    pub fn code(&self) -> &'static str {
        match self {
            FailureReason::PrivacyRestricted => "privacy_restricted",
            FailureReason::MissingAccessToken => "missing_access_token",
            FailureReason::Rejected(_) => "rejected",
            FailureReason::BatchError(_) => "batch_error",
            FailureReason::ThrottleLimit => "throttle_limit",
        }
    }

    /// Free-form detail, if the reason carries one
    pub fn detail(&self) -> Option<&str> {
        match self {
            FailureReason::Rejected(d) | FailureReason::BatchError(d) => Some(d),
            _ => None,
        }
    }

    /// Rebuild a reason from its stored tag and detail
    pub fn from_parts(code: &str, detail: Option<String>) -> Self {
        let detail = detail.unwrap_or_default();
        match code {
            "privacy_restricted" => FailureReason::PrivacyRestricted,
            "missing_access_token" => FailureReason::MissingAccessToken,
            "rejected" => FailureReason::Rejected(detail),
            "throttle_limit" => FailureReason::ThrottleLimit,
            "batch_error" => FailureReason::BatchError(detail),
            other => FailureReason::BatchError(format!("{other}: {detail}")),
        }
    }
}

impl std::fmt::Display for FailureReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.detail() {
            Some(detail) => write!(f, "{}: {}", self.code(), detail),
            None => f.write_str(self.code()),
        }
    }
}

/// An item that could not be processed, kept for manual review or retry
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FailedItem<T> {
    /// The work item
    pub item: T,
    /// Why it failed
    pub reason: FailureReason,
    /// When the failure was recorded
    pub failed_at: DateTime<Utc>,
}

impl<T> FailedItem<T> {
    /// Wrap an item with a failure reason stamped now
    pub fn new(item: T, reason: FailureReason) -> Self {
        Self {
            item,
            reason,
            failed_at: Utc::now(),
        }
    }
}

/// A user that has been invited to the target group. Identity key is `remote_id`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct InviteRecord {
    /// Platform identifier of the invited user
    pub remote_id: i64,
    /// When the invite was confirmed
    pub invited_at: DateTime<Utc>,
}

/// Lifecycle of a bulk job, per account and operation kind
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobState {
    /// No job has run, or the last request found nothing to do
    #[default]
    Idle,
    /// Batches are being processed
    Running,
    /// All planned batches were processed
    Completed,
    /// The job stopped early on a fatal condition
    Aborted,
}

impl JobState {
    /// Stable lowercase name, as stored in the database
    pub fn as_str(&self) -> &'static str {
        match self {
            JobState::Idle => "idle",
            JobState::Running => "running",
            JobState::Completed => "completed",
            JobState::Aborted => "aborted",
        }
    }

    /// Parse the stored name back into a state (unknown names read as Aborted)
    pub fn parse(value: &str) -> Self {
        match value {
            "idle" => JobState::Idle,
            "running" => JobState::Running,
            "completed" => JobState::Completed,
            _ => JobState::Aborted,
        }
    }

    /// Whether the job has reached a terminal state
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobState::Completed | JobState::Aborted)
    }
}

/// Conditions that make continuing a job meaningless
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "code", content = "detail", rename_all = "snake_case")]
pub enum AbortReason {
    /// No usable session for the account, or it was revoked mid-run
    SessionInvalid(String),
    /// The invite target was never established or cannot be resolved
    ChannelUnresolved(String),
    /// The account is not an administrator of the target channel
    NotAdmin,
    /// An external stop signal was observed at a batch boundary
    Cancelled,
    /// Progress could not be persisted
    Storage(String),
}

impl AbortReason {
    /// Stable tag for the reason
    pub fn code(&self) -> &'static str {
        match self {
            AbortReason::SessionInvalid(_) => "session_invalid",
            AbortReason::ChannelUnresolved(_) => "channel_unresolved",
            AbortReason::NotAdmin => "not_admin",
            AbortReason::Cancelled => "cancelled",
            AbortReason::Storage(_) => "storage",
        }
    }
}

impl std::fmt::Display for AbortReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AbortReason::SessionInvalid(d) => write!(f, "session invalid: {d}"),
            AbortReason::ChannelUnresolved(d) => write!(f, "channel unresolved: {d}"),
            AbortReason::NotAdmin => f.write_str("account is not an admin of the target channel"),
            AbortReason::Cancelled => f.write_str("job cancelled"),
            AbortReason::Storage(d) => write!(f, "progress could not be saved: {d}"),
        }
    }
}

/// Outcome of one job request
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct JobSummary {
    /// Account the job ran for
    pub account: AccountId,
    /// Which pipeline ran
    pub kind: OperationKind,
    /// Final state (`Idle` when there was nothing to do)
    pub state: JobState,
    /// Items that succeeded during this run
    pub succeeded: usize,
    /// Items that failed or were skipped during this run
    pub failed: usize,
    /// Batches planned after de-duplication
    pub batches_planned: usize,
    /// Batches that reached a final outcome
    pub batches_run: usize,
    /// Set when `state` is `Aborted`
    pub abort_reason: Option<AbortReason>,
}

/// Progress notification emitted while a job runs
///
/// Every transition, wait, and batch outcome produces one of these.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// Job moved from Idle to Running
    JobStarted {
        /// Account
        account: AccountId,
        /// Pipeline
        kind: OperationKind,
        /// Items remaining after de-duplication
        items: usize,
        /// Planned batch count
        batches: usize,
    },

    /// Request found no eligible items; the job stays Idle
    NothingToDo {
        /// Account
        account: AccountId,
        /// Pipeline
        kind: OperationKind,
    },

    /// A batch is about to be submitted
    BatchStarted {
        /// Account
        account: AccountId,
        /// Pipeline
        kind: OperationKind,
        /// 1-based batch number
        batch: usize,
        /// Planned batch count
        batches: usize,
        /// Items in this batch
        size: usize,
    },

    /// A batch finished with a (possibly partial) success
    BatchCompleted {
        /// Account
        account: AccountId,
        /// Pipeline
        kind: OperationKind,
        /// 1-based batch number
        batch: usize,
        /// Items in this batch that succeeded
        succeeded: usize,
        /// Items in this batch that were rejected or skipped
        failed: usize,
        /// Running success count for the job
        total_succeeded: usize,
        /// Running failure count for the job
        total_failed: usize,
    },

    /// The whole batch failed and was recorded; the job continues
    BatchFailed {
        /// Account
        account: AccountId,
        /// Pipeline
        kind: OperationKind,
        /// 1-based batch number
        batch: usize,
        /// Error description
        error: String,
        /// Running success count for the job
        total_succeeded: usize,
        /// Running failure count for the job
        total_failed: usize,
    },

    /// The platform demanded a wait; the same batch is retried afterwards
    Throttled {
        /// Account
        account: AccountId,
        /// Pipeline
        kind: OperationKind,
        /// 1-based batch number
        batch: usize,
        /// Mandated wait in seconds
        wait_secs: u64,
        /// Consecutive throttle signals for this batch
        attempt: u32,
    },

    /// Baseline pacing delay before the next batch
    Pacing {
        /// Account
        account: AccountId,
        /// Pipeline
        kind: OperationKind,
        /// 1-based number of the batch just finished
        batch: usize,
        /// Delay in milliseconds
        delay_ms: u64,
    },

    /// Job finished all planned batches
    JobCompleted {
        /// Account
        account: AccountId,
        /// Pipeline
        kind: OperationKind,
        /// Items that succeeded in this run
        succeeded: usize,
        /// Items failed or skipped in this run
        failed: usize,
    },

    /// Job stopped early
    JobAborted {
        /// Account
        account: AccountId,
        /// Pipeline
        kind: OperationKind,
        /// Why the job stopped
        reason: AbortReason,
        /// Items that succeeded before the abort
        succeeded: usize,
        /// Items failed or skipped before the abort
        failed: usize,
    },

    /// Graceful shutdown initiated
    Shutdown,
}
