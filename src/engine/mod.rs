//! Bulk job engine split into focused submodules.
//!
//! The `BulkEngine` struct and its methods are organized by concern:
//! - [`partition`] - De-duplication against stored progress and batch planning
//! - [`throttle`] - Jittered pacing and platform-mandated waits
//! - [`executor`] - One remote call per batch, persisted atomically
//! - [`runner`] - Batch loop shared by both pipelines
//! - [`import`] - Contact import jobs
//! - [`invite`] - Group invite jobs
//! - [`control`] - Admission, cancellation, and shutdown

mod control;
mod executor;
mod import;
mod invite;
pub mod partition;
mod runner;
pub mod throttle;

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
pub(crate) mod test_helpers;
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests;

pub use import::ImportRequest;
pub use invite::InviteRequest;

use crate::config::Config;
use crate::db::Database;
use crate::error::Result;
use crate::session::SessionRegistry;
use crate::types::{AccountId, Event, JobState, JobSummary, OperationKind};

/// Jobs currently in `Running`, one per account
#[derive(Clone)]
pub(crate) struct ActiveJobs {
    /// Running job per account with its cancellation token
    pub(crate) jobs: std::sync::Arc<
        std::sync::Mutex<std::collections::HashMap<AccountId, control::ActiveJob>>,
    >,
    /// Cleared during shutdown so that no new job is admitted
    pub(crate) accepting_new: std::sync::Arc<std::sync::atomic::AtomicBool>,
}

/// Either pipeline's request, for callers that dispatch on operation kind
#[derive(Clone, Debug)]
pub enum JobRequest {
    /// Import contacts
    Import(ImportRequest),
    /// Invite users into a channel
    Invite(InviteRequest),
}

impl JobRequest {
    /// Account the request runs under
    pub fn account(&self) -> &AccountId {
        match self {
            JobRequest::Import(request) => &request.account,
            JobRequest::Invite(request) => &request.account,
        }
    }

    /// Pipeline the request belongs to
    pub fn kind(&self) -> OperationKind {
        match self {
            JobRequest::Import(_) => OperationKind::Import,
            JobRequest::Invite(_) => OperationKind::Invite,
        }
    }
}

/// Main engine instance (cloneable - all fields are Arc-wrapped)
#[derive(Clone)]
pub struct BulkEngine {
    /// Progress store (public so callers can inspect imported/invited/failed sets)
    pub db: std::sync::Arc<Database>,
    /// Event broadcast channel sender (multiple subscribers supported)
    pub(crate) event_tx: tokio::sync::broadcast::Sender<Event>,
    /// Configuration
    pub(crate) config: std::sync::Arc<Config>,
    /// Running jobs and admission flag
    pub(crate) active: ActiveJobs,
}

impl BulkEngine {
    /// Create a new engine
    ///
    /// Validates the configuration, opens (or creates) the progress database and
    /// closes any job runs a previous process left in `Running`.
    pub async fn new(config: Config) -> Result<Self> {
        config.validate()?;
        let db = Database::new(&config.persistence.database_path).await?;
        Self::with_database(config, db).await
    }

    /// Create an engine over an already-open database
    pub async fn with_database(config: Config, db: Database) -> Result<Self> {
        config.validate()?;

        let interrupted = db.abort_interrupted_job_runs().await?;
        if interrupted > 0 {
            tracing::warn!(
                interrupted,
                "Closed job runs left running by a previous process"
            );
        }

        let (event_tx, _rx) = tokio::sync::broadcast::channel(config.event_buffer);

        let active = ActiveJobs {
            jobs: Default::default(),
            accepting_new: std::sync::Arc::new(std::sync::atomic::AtomicBool::new(true)),
        };

        tracing::info!(
            database = %config.persistence.database_path.display(),
            import_batch = config.import.batch_size,
            invite_batch = config.invite.batch_size,
            "Bulk engine initialized"
        );

        Ok(Self {
            db: std::sync::Arc::new(db),
            event_tx,
            config: std::sync::Arc::new(config),
            active,
        })
    }

    /// Run either pipeline to completion
    ///
    /// See [`run_import`](Self::run_import) and [`run_invite`](Self::run_invite).
    pub async fn run(&self, sessions: &SessionRegistry, request: JobRequest) -> Result<JobSummary> {
        match request {
            JobRequest::Import(request) => self.run_import(sessions, request).await,
            JobRequest::Invite(request) => self.run_invite(sessions, request).await,
        }
    }

    /// Subscribe to job events
    ///
    /// Each subscriber receives all events independently. A subscriber that falls more
    /// than `event_buffer` events behind receives `RecvError::Lagged`.
    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<Event> {
        self.event_tx.subscribe()
    }

    /// Job events as a `Stream`
    ///
    /// Lagged notifications surface as `Err` items rather than ending the stream.
    pub fn event_stream(&self) -> tokio_stream::wrappers::BroadcastStream<Event> {
        tokio_stream::wrappers::BroadcastStream::new(self.event_tx.subscribe())
    }

    /// Current configuration
    pub fn get_config(&self) -> std::sync::Arc<Config> {
        std::sync::Arc::clone(&self.config)
    }

    /// State of an account's job for one pipeline
    ///
    /// `Running` while a job is in flight, otherwise the terminal state of the most
    /// recent run, or `Idle` if the pipeline has never run for this account.
    pub async fn job_state(&self, account: &AccountId, kind: OperationKind) -> Result<JobState> {
        if self.running_kind(account) == Some(kind) {
            return Ok(JobState::Running);
        }

        let state = match self.db.latest_job_run(account, kind).await? {
            Some(run) if run.state.is_terminal() => run.state,
            // Running in the store but not in memory: interrupted without cleanup
            Some(_) => JobState::Aborted,
            None => JobState::Idle,
        };
        Ok(state)
    }

    /// Emit an event to all subscribers
    ///
    /// Events are dropped silently when nobody is subscribed.
    pub(crate) fn emit_event(&self, event: Event) {
        self.event_tx.send(event).ok();
    }
}
