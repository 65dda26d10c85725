//! Configuration types for roster-bulk

use crate::error::{Error, Result};
use crate::types::OperationKind;
use serde::{Deserialize, Serialize};
use std::{path::PathBuf, time::Duration};

/// Batching and pacing policy for one operation kind
///
/// The delay applied after every successful batch is
/// `base_delay + uniform(jitter_min..=jitter_max)`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PacingConfig {
    /// Number of items submitted per remote call
    pub batch_size: usize,

    /// Fixed delay after a successful batch
    ///
    /// Stored as seconds; sub-second values keep millisecond precision.
    #[serde(with = "duration_serde")]
    pub base_delay: Duration,

    /// Lower bound of the random extra delay
    #[serde(with = "duration_serde")]
    pub jitter_min: Duration,

    /// Upper bound (inclusive) of the random extra delay
    #[serde(with = "duration_serde")]
    pub jitter_max: Duration,
}

impl PacingConfig {
    /// Pacing defaults for contact import (30 per batch, 10s + 5..15s)
    pub fn import_defaults() -> Self {
        Self {
            batch_size: 30,
            base_delay: Duration::from_secs(10),
            jitter_min: Duration::from_secs(5),
            jitter_max: Duration::from_secs(15),
        }
    }

    /// Pacing defaults for group invites (5 per batch, 30s + 5..20s)
    pub fn invite_defaults() -> Self {
        Self {
            batch_size: 5,
            base_delay: Duration::from_secs(30),
            jitter_min: Duration::from_secs(5),
            jitter_max: Duration::from_secs(20),
        }
    }

    /// Pacing with no delays at all, mostly useful in tests and dry runs
    pub fn immediate(batch_size: usize) -> Self {
        Self {
            batch_size,
            base_delay: Duration::ZERO,
            jitter_min: Duration::ZERO,
            jitter_max: Duration::ZERO,
        }
    }

    fn validate(&self, section: &str) -> Result<()> {
        if self.batch_size == 0 {
            return Err(Error::config(
                &format!("{section}.batch_size"),
                "batch size must be at least 1",
            ));
        }
        if self.jitter_min > self.jitter_max {
            return Err(Error::config(
                &format!("{section}.jitter_min"),
                format!(
                    "jitter_min ({:?}) must not exceed jitter_max ({:?})",
                    self.jitter_min, self.jitter_max
                ),
            ));
        }
        Ok(())
    }
}

/// Data storage configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PersistenceConfig {
    /// Database path (default: "./roster-bulk.db")
    #[serde(default = "default_database_path")]
    pub database_path: PathBuf,
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
        }
    }
}

/// Main configuration for [`BulkEngine`](crate::BulkEngine)
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Config {
    /// Progress Store location
    #[serde(default)]
    pub persistence: PersistenceConfig,

    /// Contact import batching and pacing
    #[serde(default = "PacingConfig::import_defaults")]
    pub import: PacingConfig,

    /// Group invite batching and pacing
    #[serde(default = "PacingConfig::invite_defaults")]
    pub invite: PacingConfig,

    /// Maximum consecutive throttle retries of one batch (None = retry forever)
    ///
    /// When exceeded, the batch is recorded as failed and the job moves on.
    #[serde(default)]
    pub max_throttle_retries: Option<u32>,

    /// Capacity of the progress event broadcast channel (default: 1000)
    #[serde(default = "default_event_buffer")]
    pub event_buffer: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            persistence: PersistenceConfig::default(),
            import: PacingConfig::import_defaults(),
            invite: PacingConfig::invite_defaults(),
            max_throttle_retries: None,
            event_buffer: default_event_buffer(),
        }
    }
}

impl Config {
    /// Pacing policy for the given operation kind
    pub fn pacing(&self, kind: OperationKind) -> &PacingConfig {
        match kind {
            OperationKind::Import => &self.import,
            OperationKind::Invite => &self.invite,
        }
    }

    /// Check settings that would otherwise break a job at runtime
    pub fn validate(&self) -> Result<()> {
        self.import.validate("import")?;
        self.invite.validate("invite")?;
        if self.event_buffer == 0 {
            return Err(Error::config(
                "event_buffer",
                "event buffer must hold at least one event",
            ));
        }
        Ok(())
    }
}

fn default_database_path() -> PathBuf {
    PathBuf::from("roster-bulk.db")
}

fn default_event_buffer() -> usize {
    1000
}

// Durations are written as seconds: an integer when whole, otherwise a fraction with
// millisecond precision. Anything finer than a millisecond is rounded on load.
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serializer, de::Error};
    use std::time::Duration;

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Seconds {
        Whole(u64),
        Fractional(f64),
    }

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        if duration.subsec_nanos() == 0 {
            serializer.serialize_u64(duration.as_secs())
        } else {
            serializer.serialize_f64(duration.as_millis() as f64 / 1000.0)
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        match Seconds::deserialize(deserializer)? {
            Seconds::Whole(secs) => Ok(Duration::from_secs(secs)),
            Seconds::Fractional(secs) if secs.is_finite() && secs >= 0.0 => {
                Ok(Duration::from_millis((secs * 1000.0).round() as u64))
            }
            Seconds::Fractional(secs) => Err(D::Error::custom(format!(
                "duration must be a non-negative number of seconds, got {secs}"
            ))),
        }
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_pacing() {
        let config = Config::default();
        assert_eq!(config.import.batch_size, 30);
        assert_eq!(config.import.base_delay, Duration::from_secs(10));
        assert_eq!(config.invite.batch_size, 5);
        assert_eq!(config.invite.jitter_max, Duration::from_secs(20));
        assert!(config.max_throttle_retries.is_none());
        config.validate().unwrap();
    }

    #[test]
    fn pacing_selects_by_kind() {
        let config = Config::default();
        assert_eq!(config.pacing(OperationKind::Import).batch_size, 30);
        assert_eq!(config.pacing(OperationKind::Invite).batch_size, 5);
    }

    #[test]
    fn empty_json_uses_defaults() {
        let config: Config = serde_json::from_str("{}").unwrap();
        assert_eq!(config.import, PacingConfig::import_defaults());
        assert_eq!(config.invite, PacingConfig::invite_defaults());
        assert_eq!(config.event_buffer, 1000);
        assert_eq!(
            config.persistence.database_path,
            PathBuf::from("roster-bulk.db")
        );
    }

    #[test]
    fn durations_deserialize_as_seconds() {
        let json = r#"{
            "invite": {"batch_size": 10, "base_delay": 60, "jitter_min": 1, "jitter_max": 2},
            "max_throttle_retries": 3
        }"#;
        let config: Config = serde_json::from_str(json).unwrap();
        assert_eq!(config.invite.batch_size, 10);
        assert_eq!(config.invite.base_delay, Duration::from_secs(60));
        assert_eq!(config.max_throttle_retries, Some(3));
        // untouched section keeps its defaults
        assert_eq!(config.import.batch_size, 30);
    }

    #[test]
    fn sub_second_pacing_survives_a_round_trip() {
        let mut config = Config::default();
        config.import = PacingConfig {
            batch_size: 4,
            base_delay: Duration::from_millis(20),
            jitter_min: Duration::from_millis(10),
            jitter_max: Duration::from_millis(1500),
        };

        let json = serde_json::to_string(&config).unwrap();
        let parsed: Config = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.import, config.import);
        assert_eq!(parsed.invite, PacingConfig::invite_defaults());

        let value = serde_json::to_value(&config).unwrap();
        assert_eq!(value["invite"]["base_delay"], serde_json::json!(30));
        assert_eq!(value["import"]["base_delay"], serde_json::json!(0.02));
    }

    #[test]
    fn negative_duration_is_rejected() {
        let json = r#"{"import": {"batch_size": 1, "base_delay": -1, "jitter_min": 0, "jitter_max": 0}}"#;
        assert!(serde_json::from_str::<Config>(json).is_err());
    }

    #[test]
    fn zero_batch_size_is_rejected() {
        let mut config = Config::default();
        config.import.batch_size = 0;
        match config.validate().unwrap_err() {
            Error::Config { key, .. } => assert_eq!(key.as_deref(), Some("import.batch_size")),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn inverted_jitter_is_rejected() {
        let mut config = Config::default();
        config.invite.jitter_min = Duration::from_secs(30);
        match config.validate().unwrap_err() {
            Error::Config { key, .. } => assert_eq!(key.as_deref(), Some("invite.jitter_min")),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn zero_event_buffer_is_rejected() {
        let config = Config {
            event_buffer: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
