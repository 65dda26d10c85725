//! Dry-run example
//!
//! Runs a full import followed by an invite job against a simulated platform, so the
//! batching, pacing, and resume behavior can be watched without a real account.
//!
//! Settings are read from the environment (or a `.env` file):
//! - `ROSTER_BULK_DB` - progress database path (default: `dry-run.db`)
//! - `DRY_RUN_CONTACTS` - number of generated contacts (default: 65)
//! - `DRY_RUN_INVITES` - number of users to invite (default: 12)
//! - `DRY_RUN_PACED` - set to `1` to use production pacing delays
//!
//! Running it twice against the same database shows resume: the second import has
//! nothing left to do and the second invite only picks users not yet invited.

use async_trait::async_trait;
use roster_bulk::{
    AccountId, BulkEngine, ChannelRef, Config, ContactItem, Event, ImportRequest, ImportResponse,
    InviteRequest, InviteResponse, PacingConfig, RemoteClient, RemoteError, RemoteOutcome,
    RemoteUserRecord, SessionRegistry,
};
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};

/// Accepts every call and hands out sequential user ids
struct SimulatedPlatform {
    next_id: AtomicI64,
}

#[async_trait]
impl RemoteClient for SimulatedPlatform {
    async fn import_contacts(&self, batch: &[ContactItem]) -> RemoteOutcome<ImportResponse> {
        let created = batch
            .iter()
            .map(|contact| {
                let remote_id = self.next_id.fetch_add(1, Ordering::SeqCst);
                RemoteUserRecord {
                    remote_id,
                    access_token: Some(format!("sim-{remote_id}")),
                    display_name: contact.display_name.clone(),
                    phone: contact.phone.clone(),
                }
            })
            .collect();
        RemoteOutcome::Success(ImportResponse {
            created,
            rejected: Vec::new(),
        })
    }

    async fn invite_users(
        &self,
        channel: &ChannelRef,
        users: &[RemoteUserRecord],
    ) -> RemoteOutcome<InviteResponse> {
        println!("  -> inviting {} users into {}", users.len(), channel);
        RemoteOutcome::Success(InviteResponse::default())
    }

    async fn check_admin(&self, _channel: &ChannelRef) -> Result<bool, RemoteError> {
        Ok(true)
    }
}

fn env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing for logging (optional)
    // Uncomment if you add tracing-subscriber to your dependencies:
    // tracing_subscriber::fmt::init();
    dotenvy::dotenv().ok();

    let contact_count: usize = env_or("DRY_RUN_CONTACTS", 65);
    let invite_count: usize = env_or("DRY_RUN_INVITES", 12);
    let paced = std::env::var("DRY_RUN_PACED").is_ok_and(|v| v == "1");

    let mut config = Config::default();
    config.persistence.database_path = env_or("ROSTER_BULK_DB", "dry-run.db".into());
    if !paced {
        config.import = PacingConfig::immediate(config.import.batch_size);
        config.invite = PacingConfig::immediate(config.invite.batch_size);
    }

    let engine = BulkEngine::new(config).await?;
    let account = AccountId::from("dry-run");
    let sessions = SessionRegistry::new();
    sessions
        .register(
            account.clone(),
            Arc::new(SimulatedPlatform {
                next_id: AtomicI64::new(1),
            }),
        )
        .await;

    let mut events = engine.subscribe();
    tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            match event {
                Event::JobStarted {
                    kind,
                    items,
                    batches,
                    ..
                } => println!("{kind}: {items} items in {batches} batches"),
                Event::BatchCompleted {
                    batch,
                    succeeded,
                    failed,
                    ..
                } => println!("  batch {batch}: {succeeded} ok, {failed} failed"),
                Event::Pacing { delay_ms, .. } => println!("  pacing {delay_ms} ms"),
                Event::Throttled { wait_secs, .. } => println!("  throttled for {wait_secs}s"),
                Event::NothingToDo { kind, .. } => println!("{kind}: nothing to do"),
                Event::JobAborted { kind, reason, .. } => println!("{kind}: aborted ({reason})"),
                _ => {}
            }
        }
    });

    let contacts: Vec<ContactItem> = (0..contact_count)
        .map(|i| ContactItem::new(format!("+1555{i:07}"), format!("Contact {i}")))
        .collect();
    let import = engine
        .run_import(&sessions, ImportRequest::new(account.clone(), contacts))
        .await?;
    println!("import finished: {:?}", import);

    let channel = ChannelRef::new(-1001, "@dry_run");
    let invite = engine
        .run_invite(
            &sessions,
            InviteRequest::new(account.clone(), channel, invite_count),
        )
        .await?;
    println!("invite finished: {:?}", invite);

    println!(
        "progress: {} imported, {} invited",
        engine.db.count_imported(&account).await?,
        engine.db.count_invited(&account).await?
    );

    Ok(())
}
