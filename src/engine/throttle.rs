//! Pacing and throttle policy
//!
//! Two kinds of waits exist between remote calls:
//! - a jittered baseline delay after each successful batch
//! - the exact wait the platform demands with a throttle signal, after which the same
//!   batch is retried
//!
//! Both waits are interruptible by the job's cancellation token.

use crate::config::PacingConfig;
use rand::Rng;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Per-job pacing state for one operation kind
#[derive(Clone, Debug)]
pub struct ThrottleController {
    pacing: PacingConfig,
    max_throttle_retries: Option<u32>,
}

impl ThrottleController {
    /// Create a controller from the pacing policy of one operation kind
    pub fn new(pacing: PacingConfig, max_throttle_retries: Option<u32>) -> Self {
        Self {
            pacing,
            max_throttle_retries,
        }
    }

    /// Batch size for this operation kind
    pub fn batch_size(&self) -> usize {
        self.pacing.batch_size
    }

    /// Baseline delay before the next batch, jittered with the thread-local RNG
    pub fn pacing_delay(&self) -> Duration {
        self.pacing_delay_with(&mut rand::thread_rng())
    }

    /// Baseline delay before the next batch: `base + uniform(jitter_min..=jitter_max)`
    pub fn pacing_delay_with<R: Rng + ?Sized>(&self, rng: &mut R) -> Duration {
        let min = self.pacing.jitter_min.as_millis() as u64;
        let max = self.pacing.jitter_max.as_millis() as u64;
        let jitter = if max > min {
            rng.gen_range(min..=max)
        } else {
            min
        };
        self.pacing.base_delay + Duration::from_millis(jitter)
    }

    /// Whether a batch that has now been throttled `attempt` times may be retried
    ///
    /// Unlimited unless `max_throttle_retries` is configured.
    pub fn may_retry(&self, attempt: u32) -> bool {
        match self.max_throttle_retries {
            Some(limit) => attempt <= limit,
            None => true,
        }
    }
}

/// Sleep for `delay` unless the token is cancelled first
///
/// Returns `false` if the wait was cut short by cancellation.
pub(crate) async fn wait_or_cancel(delay: Duration, cancel: &CancellationToken) -> bool {
    if delay.is_zero() {
        return !cancel.is_cancelled();
    }
    tokio::select! {
        _ = cancel.cancelled() => false,
        _ = tokio::time::sleep(delay) => true,
    }
}
