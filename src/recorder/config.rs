//! Recorder configuration
//!
//! Immutable per session. Durations are written as seconds in settings
//! files and held as [`Duration`] in memory.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::error::RecorderError;

/// Tuning for one resilient recording session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecorderConfig {
    /// No file growth for longer than this while the tool is alive is a stall
    #[serde(with = "secs")]
    pub stall_timeout: Duration,

    /// Cadence of file-size polls
    #[serde(with = "secs")]
    pub check_interval: Duration,

    /// Segments must be strictly larger than this (bytes) to be kept
    pub min_segment_size: u64,

    /// Hard cap on capture invocations per session
    pub max_restart_attempts: u32,

    /// Unbroken failure streak that aborts the session
    pub max_consecutive_failures: u32,

    /// Optional cap on a single attempt's requested duration
    #[serde(with = "opt_secs")]
    pub segment_max_duration: Option<Duration>,

    /// Added to the remaining session time when sizing an attempt
    #[serde(with = "secs")]
    pub duration_buffer: Duration,

    /// Added to an attempt's requested duration to form its hard timeout
    #[serde(with = "secs")]
    pub timeout_grace: Duration,

    /// Wait between the graceful signal and the forced kill
    #[serde(with = "secs")]
    pub terminate_grace: Duration,

    /// First backoff delay; doubles with every consecutive failure
    #[serde(with = "secs")]
    pub backoff_base: Duration,

    /// Backoff ceiling
    #[serde(with = "secs")]
    pub backoff_max: Duration,

    /// Upper bound on the concat step
    #[serde(with = "secs")]
    pub merge_timeout: Duration,
}

impl Default for RecorderConfig {
    fn default() -> Self {
        Self {
            stall_timeout: Duration::from_secs(60),
            check_interval: Duration::from_secs(5),
            min_segment_size: 1000,
            max_restart_attempts: 100,
            max_consecutive_failures: 10,
            segment_max_duration: None,
            duration_buffer: Duration::from_secs(60),
            timeout_grace: Duration::from_secs(30),
            terminate_grace: Duration::from_secs(2),
            backoff_base: Duration::from_secs(1),
            backoff_max: Duration::from_secs(30),
            merge_timeout: Duration::from_secs(300),
        }
    }
}

impl RecorderConfig {
    /// Reject settings that would make the supervisor spin or never start
    pub fn validate(&self) -> Result<(), RecorderError> {
        if self.check_interval.is_zero() {
            return Err(RecorderError::InvalidConfig(
                "check_interval must be greater than zero".to_string(),
            ));
        }
        if self.stall_timeout.is_zero() {
            return Err(RecorderError::InvalidConfig(
                "stall_timeout must be greater than zero".to_string(),
            ));
        }
        if self.max_restart_attempts == 0 {
            return Err(RecorderError::InvalidConfig(
                "max_restart_attempts must be at least 1".to_string(),
            ));
        }
        if self.max_consecutive_failures == 0 {
            return Err(RecorderError::InvalidConfig(
                "max_consecutive_failures must be at least 1".to_string(),
            ));
        }
        if self.segment_max_duration.is_some_and(|d| d.is_zero()) {
            return Err(RecorderError::InvalidConfig(
                "segment_max_duration must be greater than zero when set".to_string(),
            ));
        }
        Ok(())
    }

    /// Capture duration to request for an attempt given the session time left
    pub fn requested_duration(&self, remaining: Duration) -> Duration {
        let wanted = remaining.saturating_add(self.duration_buffer);
        match self.segment_max_duration {
            Some(cap) => wanted.min(cap),
            None => wanted,
        }
    }

    /// Hard wall-clock ceiling for an attempt
    pub fn attempt_timeout(&self, requested: Duration) -> Duration {
        requested.saturating_add(self.timeout_grace)
    }

    /// A segment counts only when strictly above the minimum size
    pub fn is_valid_size(&self, size: u64) -> bool {
        size > self.min_segment_size
    }
}

/// Seconds (integer or fractional) <-> `Duration`
mod secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(value.as_secs_f64())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let raw = f64::deserialize(deserializer)?;
        Duration::try_from_secs_f64(raw).map_err(serde::de::Error::custom)
    }
}

mod opt_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(
        value: &Option<Duration>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match value {
            Some(d) => serializer.serialize_some(&d.as_secs_f64()),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<Duration>, D::Error> {
        let raw = Option::<f64>::deserialize(deserializer)?;
        raw.map(|s| Duration::try_from_secs_f64(s).map_err(serde::de::Error::custom))
            .transpose()
    }
}
