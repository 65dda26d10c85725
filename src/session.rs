//! Connected-session registry
//!
//! Callers own a [`SessionRegistry`] and pass it into every job request. The engine
//! only ever reads from it; logging in, refreshing, and dropping sessions stay with
//! whoever owns the registry.

use crate::remote::RemoteClient;
use crate::types::AccountId;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Map of account to its connected remote client (cheap to clone)
#[derive(Clone, Default)]
pub struct SessionRegistry {
    sessions: Arc<RwLock<HashMap<AccountId, Arc<dyn RemoteClient>>>>,
}

impl SessionRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) the session for an account
    ///
    /// Returns the previously registered session, if any.
    pub async fn register(
        &self,
        account: AccountId,
        client: Arc<dyn RemoteClient>,
    ) -> Option<Arc<dyn RemoteClient>> {
        tracing::debug!(account = %account, "Registering session");
        self.sessions.write().await.insert(account, client)
    }

    /// Session for an account, if one is connected
    pub async fn get(&self, account: &AccountId) -> Option<Arc<dyn RemoteClient>> {
        self.sessions.read().await.get(account).cloned()
    }

    /// Drop the session for an account
    pub async fn remove(&self, account: &AccountId) -> Option<Arc<dyn RemoteClient>> {
        tracing::debug!(account = %account, "Removing session");
        self.sessions.write().await.remove(account)
    }

    /// Whether an account has a connected session
    pub async fn contains(&self, account: &AccountId) -> bool {
        self.sessions.read().await.contains_key(account)
    }

    /// Accounts with a connected session
    pub async fn accounts(&self) -> Vec<AccountId> {
        let mut accounts: Vec<AccountId> = self.sessions.read().await.keys().cloned().collect();
        accounts.sort();
        accounts
    }
}
