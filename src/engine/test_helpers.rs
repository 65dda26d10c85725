//! Shared test helpers: a scripted remote client and engine constructors.

use crate::config::{Config, PacingConfig};
use crate::db::phone_key;
use crate::engine::BulkEngine;
use crate::remote::{
    ChannelRef, ImportResponse, InviteResponse, RejectReason, Rejected, RemoteClient, RemoteError,
    RemoteOutcome,
};
use crate::session::SessionRegistry;
use crate::types::{AccountId, ContactItem, RemoteUserRecord};
use async_trait::async_trait;
use std::collections::{HashSet, VecDeque};
use std::sync::{Arc, Mutex};
use tempfile::tempdir;

type CallHook = Box<dyn Fn(usize) + Send + Sync>;

/// In-memory `RemoteClient` that replays queued outcomes and records every call
///
/// With an empty queue, imports succeed (creating one user per contact, except for
/// phones configured as rejected) and invites succeed with no rejections.
pub(crate) struct ScriptedClient {
    imports: Mutex<VecDeque<RemoteOutcome<ImportResponse>>>,
    invites: Mutex<VecDeque<RemoteOutcome<InviteResponse>>>,
    import_calls: Mutex<Vec<Vec<ContactItem>>>,
    invite_calls: Mutex<Vec<Vec<i64>>>,
    admin_checks: Mutex<Vec<ChannelRef>>,
    admin: Mutex<Result<bool, RemoteError>>,
    reject_phones: HashSet<String>,
    withhold_tokens: HashSet<String>,
    on_import: Option<CallHook>,
    on_invite: Option<CallHook>,
}

impl ScriptedClient {
    pub(crate) fn new() -> Self {
        Self {
            imports: Mutex::new(VecDeque::new()),
            invites: Mutex::new(VecDeque::new()),
            import_calls: Mutex::new(Vec::new()),
            invite_calls: Mutex::new(Vec::new()),
            admin_checks: Mutex::new(Vec::new()),
            admin: Mutex::new(Ok(true)),
            reject_phones: HashSet::new(),
            withhold_tokens: HashSet::new(),
            on_import: None,
            on_invite: None,
        }
    }

    /// Default import behavior rejects these phones as privacy-restricted
    pub(crate) fn rejecting_phones(mut self, phones: impl IntoIterator<Item = String>) -> Self {
        self.reject_phones.extend(phones);
        self
    }

    /// Default import behavior creates users without an access token for these phones
    pub(crate) fn withholding_tokens(mut self, phones: impl IntoIterator<Item = String>) -> Self {
        self.withhold_tokens.extend(phones);
        self
    }

    /// Called with the 1-based call number after every import call
    pub(crate) fn on_import(mut self, hook: impl Fn(usize) + Send + Sync + 'static) -> Self {
        self.on_import = Some(Box::new(hook));
        self
    }

    /// Called with the 1-based call number after every invite call
    pub(crate) fn on_invite(mut self, hook: impl Fn(usize) + Send + Sync + 'static) -> Self {
        self.on_invite = Some(Box::new(hook));
        self
    }

    pub(crate) fn push_import(&self, outcome: RemoteOutcome<ImportResponse>) {
        self.imports.lock().unwrap().push_back(outcome);
    }

    pub(crate) fn push_invite(&self, outcome: RemoteOutcome<InviteResponse>) {
        self.invites.lock().unwrap().push_back(outcome);
    }

    pub(crate) fn set_admin(&self, result: Result<bool, RemoteError>) {
        *self.admin.lock().unwrap() = result;
    }

    pub(crate) fn import_calls(&self) -> Vec<Vec<ContactItem>> {
        self.import_calls.lock().unwrap().clone()
    }

    pub(crate) fn import_batch_sizes(&self) -> Vec<usize> {
        self.import_calls().iter().map(Vec::len).collect()
    }

    pub(crate) fn invite_calls(&self) -> Vec<Vec<i64>> {
        self.invite_calls.lock().unwrap().clone()
    }

    pub(crate) fn admin_checks(&self) -> usize {
        self.admin_checks.lock().unwrap().len()
    }

    fn default_import(&self, batch: &[ContactItem]) -> ImportResponse {
        let mut response = ImportResponse::default();
        for contact in batch {
            if self.reject_phones.contains(&contact.phone) {
                response.rejected.push(Rejected {
                    item: contact.clone(),
                    reason: RejectReason::PrivacyRestricted,
                });
                continue;
            }
            let key = phone_key(&contact.phone);
            let remote_id = key.parse::<i64>().unwrap();
            let access_token = if self.withhold_tokens.contains(&contact.phone) {
                None
            } else {
                Some(format!("tok-{remote_id}"))
            };
            // platforms report phones without the leading '+'
            response.created.push(RemoteUserRecord {
                remote_id,
                access_token,
                display_name: contact.display_name.clone(),
                phone: key,
            });
        }
        response
    }
}

#[async_trait]
impl RemoteClient for ScriptedClient {
    async fn import_contacts(&self, batch: &[ContactItem]) -> RemoteOutcome<ImportResponse> {
        let call = {
            let mut calls = self.import_calls.lock().unwrap();
            calls.push(batch.to_vec());
            calls.len()
        };
        let scripted = self.imports.lock().unwrap().pop_front();
        let outcome =
            scripted.unwrap_or_else(|| RemoteOutcome::Success(self.default_import(batch)));
        if let Some(hook) = &self.on_import {
            hook(call);
        }
        outcome
    }

    async fn invite_users(
        &self,
        _channel: &ChannelRef,
        users: &[RemoteUserRecord],
    ) -> RemoteOutcome<InviteResponse> {
        let call = {
            let mut calls = self.invite_calls.lock().unwrap();
            calls.push(users.iter().map(|u| u.remote_id).collect());
            calls.len()
        };
        let scripted = self.invites.lock().unwrap().pop_front();
        let outcome =
            scripted.unwrap_or_else(|| RemoteOutcome::Success(InviteResponse::default()));
        if let Some(hook) = &self.on_invite {
            hook(call);
        }
        outcome
    }

    async fn check_admin(&self, channel: &ChannelRef) -> Result<bool, RemoteError> {
        self.admin_checks.lock().unwrap().push(channel.clone());
        self.admin.lock().unwrap().clone()
    }
}

/// `n` distinct contacts with phones `+15550000000`, `+15550000001`, ...
pub(crate) fn contacts(n: usize) -> Vec<ContactItem> {
    (0..n)
        .map(|i| ContactItem::new(format!("+1555{i:07}"), format!("Contact {i}")))
        .collect()
}

pub(crate) fn user(remote_id: i64) -> RemoteUserRecord {
    RemoteUserRecord {
        remote_id,
        access_token: Some(format!("tok-{remote_id}")),
        display_name: format!("User {remote_id}"),
        phone: String::new(),
    }
}

pub(crate) fn user_without_token(remote_id: i64) -> RemoteUserRecord {
    RemoteUserRecord {
        access_token: None,
        ..user(remote_id)
    }
}

pub(crate) fn test_channel() -> ChannelRef {
    ChannelRef::new(-100_1234, "@roster_test")
}

/// Config with production batch sizes and no pacing delays
pub(crate) fn test_config(db_path: std::path::PathBuf) -> Config {
    let mut config = Config::default();
    config.persistence.database_path = db_path;
    config.import = PacingConfig::immediate(30);
    config.invite = PacingConfig::immediate(5);
    config
}

/// Engine over a fresh database inside a temp dir (which must be kept alive)
pub(crate) async fn create_test_engine() -> (BulkEngine, tempfile::TempDir) {
    let temp_dir = tempdir().unwrap();
    let config = test_config(temp_dir.path().join("test.db"));
    let engine = BulkEngine::new(config).await.unwrap();
    (engine, temp_dir)
}

/// Engine with a caller-adjusted config
pub(crate) async fn create_test_engine_with(
    adjust: impl FnOnce(&mut Config),
) -> (BulkEngine, tempfile::TempDir) {
    let temp_dir = tempdir().unwrap();
    let mut config = test_config(temp_dir.path().join("test.db"));
    adjust(&mut config);
    let engine = BulkEngine::new(config).await.unwrap();
    (engine, temp_dir)
}

/// Registry with a single connected session
pub(crate) async fn sessions_with(
    account: &AccountId,
    client: Arc<ScriptedClient>,
) -> SessionRegistry {
    let sessions = SessionRegistry::new();
    sessions.register(account.clone(), client).await;
    sessions
}
