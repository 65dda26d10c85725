//! # roster-bulk
//!
//! Resumable, rate-limited bulk contact import and group invites for messaging
//! platform accounts.
//!
//! ## Design Philosophy
//!
//! roster-bulk is designed to be:
//! - **Crash-safe** - Every batch outcome is committed before the next batch starts,
//!   so re-issuing a request resumes where the last run stopped
//! - **Platform-agnostic** - Remote calls go through the [`RemoteClient`] trait
//! - **Polite** - Jittered pacing between batches, exact waits on throttle signals
//! - **Event-driven** - Consumers subscribe to events, no polling required
//!
//! ## Quick Start
//!
//! ```no_run
//! use roster_bulk::{BulkEngine, Config, ContactItem, ImportRequest, SessionRegistry};
//! # use roster_bulk::RemoteClient;
//! # use std::sync::Arc;
//!
//! # async fn example(client: Arc<dyn RemoteClient>) -> Result<(), Box<dyn std::error::Error>> {
//! let engine = BulkEngine::new(Config::default()).await?;
//! let sessions = SessionRegistry::new();
//! sessions.register("acct-1".into(), client).await;
//!
//! // Subscribe to events
//! let mut events = engine.subscribe();
//! tokio::spawn(async move {
//!     while let Ok(event) = events.recv().await {
//!         println!("Event: {:?}", event);
//!     }
//! });
//!
//! let contacts = vec![ContactItem::new("+15550100", "Ada")];
//! let summary = engine
//!     .run_import(&sessions, ImportRequest::new("acct-1", contacts))
//!     .await?;
//! println!("{:?}: {} imported", summary.state, summary.succeeded);
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// Configuration types
pub mod config;
/// Progress store (SQLite persistence)
pub mod db;
/// Bulk job engine (decomposed into focused submodules)
pub mod engine;
/// Error types
pub mod error;
/// Remote operation client capability
pub mod remote;
/// Connected-session registry
pub mod session;
/// Core types and events
pub mod types;

// Re-export commonly used types
pub use config::{Config, PacingConfig, PersistenceConfig};
pub use db::Database;
pub use engine::{BulkEngine, ImportRequest, InviteRequest, JobRequest};
pub use error::{DatabaseError, Error, JobError, Result};
pub use remote::{
    ChannelRef, ImportResponse, InviteResponse, RejectReason, Rejected, RemoteClient,
    RemoteError, RemoteErrorKind, RemoteOutcome,
};
pub use session::SessionRegistry;
pub use types::{
    AbortReason, AccountId, ContactItem, Event, FailedItem, FailureReason, InviteRecord, JobState,
    JobSummary, OperationKind, RemoteUserRecord,
};

/// Helper function to run the engine with graceful signal handling.
///
/// Waits for a termination signal and then calls the engine's `shutdown()` method.
///
/// - **Unix:** listens for SIGTERM and SIGINT, with fallbacks if signal registration fails.
/// - **Windows/other:** listens for Ctrl+C via `tokio::signal::ctrl_c()`.
///
/// # Example
///
/// ```no_run
/// use roster_bulk::{BulkEngine, Config, run_with_shutdown};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let engine = BulkEngine::new(Config::default()).await?;
///
///     // Jobs are spawned elsewhere; running ones end Aborted(Cancelled) on shutdown
///     run_with_shutdown(engine).await?;
///
///     Ok(())
/// }
/// ```
pub async fn run_with_shutdown(engine: BulkEngine) -> Result<()> {
    wait_for_signal().await;
    engine.shutdown().await
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    // Set up signal handlers - these may fail in restricted environments (containers, tests)
    let sigterm_result = signal(SignalKind::terminate());
    let sigint_result = signal(SignalKind::interrupt());

    match (sigterm_result, sigint_result) {
        (Ok(mut sigterm), Ok(mut sigint)) => {
            tokio::select! {
                _ = sigterm.recv() => {
                    tracing::info!("Received SIGTERM signal");
                }
                _ = sigint.recv() => {
                    tracing::info!("Received SIGINT signal (Ctrl+C)");
                }
            }
        }
        (Err(e), _) => {
            tracing::warn!(error = %e, "Could not register SIGTERM handler, waiting for SIGINT only");
            if let Ok(mut sigint) = signal(SignalKind::interrupt()) {
                sigint.recv().await;
                tracing::info!("Received SIGINT signal (Ctrl+C)");
            } else {
                tracing::error!("Could not register any signal handlers, using ctrl_c fallback");
                tokio::signal::ctrl_c().await.ok();
            }
        }
        (_, Err(e)) => {
            tracing::warn!(error = %e, "Could not register SIGINT handler, waiting for SIGTERM only");
            if let Ok(mut sigterm) = signal(SignalKind::terminate()) {
                sigterm.recv().await;
                tracing::info!("Received SIGTERM signal");
            } else {
                tracing::error!("Could not register any signal handlers, using ctrl_c fallback");
                tokio::signal::ctrl_c().await.ok();
            }
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => {
            tracing::info!("Received Ctrl+C signal");
        }
        Err(e) => {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C signal");
        }
    }
}
