// src/pipeline/backoff.rs

//! Per-source exponential backoff.
//!
//! A healthy source polls on its base interval. After a failed fetch the
//! next delay starts at `initial` and multiplies on every further failure
//! up to `max`:
//!
//! > 30 → 60 → 120 → 240 → 480 → 600 → 600 → ...
//!
//! A single success resets the source to its base interval.

use std::time::Duration;

use crate::models::RetryConfig;

/// Backoff policy shared by every source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffPolicy {
    /// Delay after the first failure
    pub initial: Duration,
    /// Upper bound for any failure delay
    pub max: Duration,
    /// Growth factor per consecutive failure
    pub multiplier: u32,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            initial: Duration::from_secs(30),
            max: Duration::from_secs(600),
            multiplier: 2,
        }
    }
}

impl From<&RetryConfig> for BackoffPolicy {
    fn from(config: &RetryConfig) -> Self {
        Self {
            initial: Duration::from_secs(config.initial_secs),
            max: Duration::from_secs(config.max_secs),
            multiplier: config.multiplier,
        }
    }
}

/// Backoff state of one source.
#[derive(Debug, Clone)]
pub struct Backoff {
    policy: BackoffPolicy,
    base_interval: Duration,
    /// Delay chosen after the last failure; `None` while healthy
    current: Option<Duration>,
    consecutive_failures: u32,
}

impl Backoff {
    pub fn new(policy: BackoffPolicy, base_interval: Duration) -> Self {
        Self {
            policy,
            base_interval,
            current: None,
            consecutive_failures: 0,
        }
    }

    /// Record a successful poll; returns the delay until the next one.
    pub fn record_success(&mut self) -> Duration {
        if self.consecutive_failures > 0 {
            log::info!(
                "Backoff: recovered after {} consecutive failure(s)",
                self.consecutive_failures
            );
        }
        self.current = None;
        self.consecutive_failures = 0;
        self.base_interval
    }

    /// Record a failed poll; returns the delay until the next one.
    pub fn record_failure(&mut self) -> Duration {
        let next = match self.current {
            None => self.policy.initial,
            Some(delay) => delay.saturating_mul(self.policy.multiplier),
        }
        .min(self.policy.max);

        self.current = Some(next);
        self.consecutive_failures = self.consecutive_failures.saturating_add(1);
        next
    }

    /// Delay the source is currently waiting between polls.
    pub fn next_delay(&self) -> Duration {
        self.current.unwrap_or(self.base_interval)
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    pub fn base_interval(&self) -> Duration {
        self.base_interval
    }

    pub fn is_backing_off(&self) -> bool {
        self.current.is_some()
    }
}
