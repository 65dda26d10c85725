//! In-memory stand-in for a messaging platform

use async_trait::async_trait;
use roster_bulk::{
    ChannelRef, ContactItem, ImportResponse, InviteResponse, RejectReason, Rejected, RemoteClient,
    RemoteError, RemoteOutcome, RemoteUserRecord,
};
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};
use std::time::Duration;

/// Platform behavior knobs
#[derive(Debug, Clone, Default)]
pub struct PlatformRules {
    /// Phones whose owners refuse to be added
    pub private_phones: HashSet<String>,
    /// Throttle the n-th import call (1-based) with the given wait
    pub throttle_import_call: Option<(usize, Duration)>,
    /// Admins of each channel id
    pub admin_of: HashSet<i64>,
    /// Fail every call after this many import calls, as if the session were revoked
    pub revoke_after_imports: Option<usize>,
}

/// Fake platform account: assigns ids to imported contacts and tracks channel members
pub struct FakePlatform {
    rules: PlatformRules,
    next_id: AtomicI64,
    import_calls: AtomicUsize,
    users_by_phone: Mutex<HashMap<String, i64>>,
    imported_batches: Mutex<Vec<Vec<String>>>,
    members: Mutex<HashMap<i64, Vec<i64>>>,
}

impl FakePlatform {
    pub fn new(rules: PlatformRules) -> Self {
        Self {
            rules,
            next_id: AtomicI64::new(1000),
            import_calls: AtomicUsize::new(0),
            users_by_phone: Mutex::new(HashMap::new()),
            imported_batches: Mutex::new(Vec::new()),
            members: Mutex::new(HashMap::new()),
        }
    }

    /// Phones submitted per import call, in order
    pub fn imported_batches(&self) -> Vec<Vec<String>> {
        self.imported_batches.lock().unwrap().clone()
    }

    /// Ids invited into a channel, in order, including repeats
    pub fn members(&self, channel: i64) -> Vec<i64> {
        self.members
            .lock()
            .unwrap()
            .get(&channel)
            .cloned()
            .unwrap_or_default()
    }
}

#[async_trait]
impl RemoteClient for FakePlatform {
    async fn import_contacts(&self, batch: &[ContactItem]) -> RemoteOutcome<ImportResponse> {
        let call = self.import_calls.fetch_add(1, Ordering::SeqCst) + 1;
        if self.rules.revoke_after_imports.is_some_and(|n| call > n) {
            return RemoteOutcome::Error(RemoteError::session_invalid("session revoked"));
        }
        self.imported_batches
            .lock()
            .unwrap()
            .push(batch.iter().map(|c| c.phone.clone()).collect());
        if let Some((n, wait)) = self.rules.throttle_import_call
            && n == call
        {
            return RemoteOutcome::Throttled(wait);
        }

        let mut response = ImportResponse::default();
        let mut users = self.users_by_phone.lock().unwrap();
        for contact in batch {
            if self.rules.private_phones.contains(&contact.phone) {
                response.rejected.push(Rejected {
                    item: contact.clone(),
                    reason: RejectReason::PrivacyRestricted,
                });
                continue;
            }
            let id = *users
                .entry(contact.phone.clone())
                .or_insert_with(|| self.next_id.fetch_add(1, Ordering::SeqCst));
            response.created.push(RemoteUserRecord {
                remote_id: id,
                access_token: Some(format!("hash-{id}")),
                display_name: contact.display_name.clone(),
                phone: contact.phone.trim_start_matches('+').to_string(),
            });
        }
        RemoteOutcome::Success(response)
    }

    async fn invite_users(
        &self,
        channel: &ChannelRef,
        users: &[RemoteUserRecord],
    ) -> RemoteOutcome<InviteResponse> {
        self.members
            .lock()
            .unwrap()
            .entry(channel.id)
            .or_default()
            .extend(users.iter().map(|u| u.remote_id));
        RemoteOutcome::Success(InviteResponse::default())
    }

    async fn check_admin(&self, channel: &ChannelRef) -> Result<bool, RemoteError> {
        Ok(self.rules.admin_of.contains(&channel.id))
    }
}

/// `n` distinct contacts
pub fn contacts(n: usize) -> Vec<ContactItem> {
    (0..n)
        .map(|i| ContactItem::new(format!("+4479{i:08}"), format!("Contact {i}")))
        .collect()
}
