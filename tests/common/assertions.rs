//! Event helpers for integration tests

use roster_bulk::{AccountId, Event};
use std::time::Duration;
use tokio::sync::broadcast;

/// Collect events until one matches `stop` (inclusive) or the timeout elapses
pub async fn collect_events_until(
    events: &mut broadcast::Receiver<Event>,
    timeout: Duration,
    stop: impl Fn(&Event) -> bool,
) -> Vec<Event> {
    let mut collected = Vec::new();
    let _ = tokio::time::timeout(timeout, async {
        while let Ok(event) = events.recv().await {
            let done = stop(&event);
            collected.push(event);
            if done {
                break;
            }
        }
    })
    .await;
    collected
}

/// Whether the event ends a job for this account
pub fn is_job_end(event: &Event, account: &AccountId) -> bool {
    match event {
        Event::JobCompleted { account: a, .. } | Event::JobAborted { account: a, .. } => {
            a == account
        }
        _ => false,
    }
}
