//! Retry policy
//!
//! Pure decision logic: no clocks are read here, callers pass `now` in.

use std::time::{Duration, Instant};

use super::config::RecorderConfig;
use super::state::StopReason;

/// What the supervisor should do after an attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    ContinueImmediately,
    ContinueAfterBackoff(Duration),
    Stop(StopReason),
}

/// Facts about the attempt that just concluded
#[derive(Debug, Clone, Copy)]
pub struct AttemptReport {
    /// Whether the segment was accepted
    pub accepted: bool,
    /// Streak after folding this attempt in
    pub consecutive_failures: u32,
    /// Capture invocations so far, including this one
    pub attempts: u32,
}

/// Decides whether, and when, the next attempt runs
#[derive(Debug, Clone)]
pub struct RetryScheduler {
    max_restart_attempts: u32,
    max_consecutive_failures: u32,
    backoff_base: Duration,
    backoff_max: Duration,
}

impl RetryScheduler {
    pub fn new(config: &RecorderConfig) -> Self {
        Self {
            max_restart_attempts: config.max_restart_attempts,
            max_consecutive_failures: config.max_consecutive_failures,
            backoff_base: config.backoff_base,
            backoff_max: config.backoff_max,
        }
    }

    /// Gate checked before every attempt, including the first
    pub fn may_start(&self, attempts: u32, now: Instant, deadline: Instant) -> Option<StopReason> {
        if now >= deadline {
            Some(StopReason::DeadlineReached)
        } else if attempts >= self.max_restart_attempts {
            Some(StopReason::MaxAttemptsReached)
        } else {
            None
        }
    }

    /// Decision after an attempt has concluded
    pub fn decide(&self, report: AttemptReport, now: Instant, deadline: Instant) -> RetryDecision {
        if !report.accepted && report.consecutive_failures >= self.max_consecutive_failures {
            return RetryDecision::Stop(StopReason::TooManyConsecutiveFailures);
        }
        if report.attempts >= self.max_restart_attempts {
            return RetryDecision::Stop(StopReason::MaxAttemptsReached);
        }
        if now >= deadline {
            return RetryDecision::Stop(StopReason::DeadlineReached);
        }
        if report.accepted {
            RetryDecision::ContinueImmediately
        } else {
            RetryDecision::ContinueAfterBackoff(self.backoff(report.consecutive_failures))
        }
    }

    /// `min(base * 2^(failures - 1), max)`
    pub fn backoff(&self, consecutive_failures: u32) -> Duration {
        if consecutive_failures == 0 {
            return Duration::ZERO;
        }
        let exponent = (consecutive_failures - 1).min(31);
        self.backoff_base
            .checked_mul(1u32 << exponent)
            .map_or(self.backoff_max, |d| d.min(self.backoff_max))
    }
}
