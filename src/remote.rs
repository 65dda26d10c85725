//! Remote operation client capability
//!
//! The engine never talks to the messaging platform directly. Callers hand it a
//! [`RemoteClient`] for each connected account (through
//! [`SessionRegistry`](crate::session::SessionRegistry)), and every call returns a
//! tagged [`RemoteOutcome`] instead of signalling throttling or policy rejections
//! through errors.

use crate::types::{ContactItem, FailureReason, RemoteUserRecord};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Resolved, stable handle to the target group or channel
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChannelRef {
    /// Platform identifier of the channel
    pub id: i64,
    /// Human-supplied handle the channel was resolved from (e.g. "@my_channel")
    pub handle: String,
}

impl ChannelRef {
    /// Create a new channel reference
    pub fn new(id: i64, handle: impl Into<String>) -> Self {
        Self {
            id,
            handle: handle.into(),
        }
    }
}

impl std::fmt::Display for ChannelRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.handle, self.id)
    }
}

/// Why the platform refused an individual item
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum RejectReason {
    /// Recipient privacy settings forbid the operation
    PrivacyRestricted,
    /// Item is invalid for the platform (unknown number, deleted account, ...)
    Invalid(String),
}

impl From<RejectReason> for FailureReason {
    fn from(reason: RejectReason) -> Self {
        match reason {
            RejectReason::PrivacyRestricted => FailureReason::PrivacyRestricted,
            RejectReason::Invalid(detail) => FailureReason::Rejected(detail),
        }
    }
}

/// An item the platform refused, with its reason
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rejected<T> {
    /// The refused item
    pub item: T,
    /// Why it was refused
    pub reason: RejectReason,
}

/// Successful response to a contact import call
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportResponse {
    /// Platform users created or matched by the import
    pub created: Vec<RemoteUserRecord>,
    /// Contacts the platform refused
    pub rejected: Vec<Rejected<ContactItem>>,
}

/// Successful response to a group invite call
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InviteResponse {
    /// Users (by remote id) that could not be added; everyone else was
    pub rejected: Vec<Rejected<i64>>,
}

/// Category of a remote failure
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RemoteErrorKind {
    /// Session is no longer authorized (logged out, revoked key)
    SessionInvalid,
    /// Channel cannot be resolved or accessed
    ChannelInvalid,
    /// Connection-level failure
    Network,
    /// Response could not be interpreted
    MalformedResponse,
    /// Anything else
    Other,
}

/// Failure reported by the remote client
#[derive(Clone, Debug, PartialEq, Eq, Error)]
#[error("{kind:?}: {message}")]
pub struct RemoteError {
    /// Failure category
    pub kind: RemoteErrorKind,
    /// Platform or transport message
    pub message: String,
}

impl RemoteError {
    /// Create a new remote error
    pub fn new(kind: RemoteErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// Session is no longer usable
    pub fn session_invalid(message: impl Into<String>) -> Self {
        Self::new(RemoteErrorKind::SessionInvalid, message)
    }

    /// Connection-level failure
    pub fn network(message: impl Into<String>) -> Self {
        Self::new(RemoteErrorKind::Network, message)
    }

    /// Returns true if no further call on this session can succeed
    ///
    /// Fatal errors abort the job, as do `ChannelInvalid` errors during invites; everything
    /// else fails only the current batch.
    pub fn is_fatal(&self) -> bool {
        matches!(self.kind, RemoteErrorKind::SessionInvalid)
    }
}

/// Tagged result of a remote call
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RemoteOutcome<T> {
    /// Call accepted
    Success(T),
    /// Platform demands a wait before any further call of this kind
    Throttled(Duration),
    /// The whole batch was refused on policy grounds
    Rejected(RejectReason),
    /// Call failed
    Error(RemoteError),
}

impl<T> From<Result<T, RemoteError>> for RemoteOutcome<T> {
    fn from(result: Result<T, RemoteError>) -> Self {
        match result {
            Ok(value) => RemoteOutcome::Success(value),
            Err(e) => RemoteOutcome::Error(e),
        }
    }
}

/// Operations the engine needs from a connected account session
///
/// Implementations wrap a real platform client. They must not retry throttled calls
/// themselves: the throttle signal is returned so the engine can pace and report it.
///
/// # Example
///
/// ```no_run
/// use async_trait::async_trait;
/// use roster_bulk::remote::{
///     ChannelRef, ImportResponse, InviteResponse, RemoteClient, RemoteError, RemoteOutcome,
/// };
/// use roster_bulk::types::{ContactItem, RemoteUserRecord};
///
/// struct Offline;
///
/// #[async_trait]
/// impl RemoteClient for Offline {
///     async fn import_contacts(&self, _batch: &[ContactItem]) -> RemoteOutcome<ImportResponse> {
///         RemoteOutcome::Error(RemoteError::network("offline"))
///     }
///
///     async fn invite_users(
///         &self,
///         _channel: &ChannelRef,
///         _users: &[RemoteUserRecord],
///     ) -> RemoteOutcome<InviteResponse> {
///         RemoteOutcome::Error(RemoteError::network("offline"))
///     }
///
///     async fn check_admin(&self, _channel: &ChannelRef) -> Result<bool, RemoteError> {
///         Ok(false)
///     }
/// }
/// ```
#[async_trait]
pub trait RemoteClient: Send + Sync {
    /// Import a batch of contacts into the account's address book
    async fn import_contacts(&self, batch: &[ContactItem]) -> RemoteOutcome<ImportResponse>;

    /// Invite a batch of users into the channel
    async fn invite_users(
        &self,
        channel: &ChannelRef,
        users: &[RemoteUserRecord],
    ) -> RemoteOutcome<InviteResponse>;

    /// Whether the session's account administers the channel
    async fn check_admin(&self, channel: &ChannelRef) -> Result<bool, RemoteError>;
}
