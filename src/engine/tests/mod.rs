use super::test_helpers::{
    ScriptedClient, contacts, create_test_engine, create_test_engine_with, sessions_with,
    test_channel, user, user_without_token,
};
use super::*;
use crate::config::PacingConfig;
use crate::db::{ImportBatchResult, InviteBatchResult};
use crate::error::{Error, JobError};
use crate::remote::{ImportResponse, RejectReason, RemoteError, RemoteErrorKind, RemoteOutcome};
use crate::types::{AbortReason, ContactItem, FailureReason, InviteRecord, RemoteUserRecord};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;

mod invite;

/// Everything currently buffered on an event receiver
fn drain(rx: &mut broadcast::Receiver<Event>) -> Vec<Event> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

/// Put users straight into the invite candidate pool
async fn seed_pool(
    engine: &BulkEngine,
    account: &AccountId,
    users: Vec<RemoteUserRecord>,
) {
    engine
        .db
        .commit_import_batch(
            account,
            &ImportBatchResult {
                users,
                ..Default::default()
            },
        )
        .await
        .unwrap();
}

/// Wait until an event matching `pred` arrives
async fn wait_for(rx: &mut broadcast::Receiver<Event>, pred: impl Fn(&Event) -> bool) -> Event {
    loop {
        let event = rx.recv().await.unwrap();
        if pred(&event) {
            return event;
        }
    }
}
