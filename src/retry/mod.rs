//! Retry and backoff policy for `GetRecords` failures
//!
//! Two failure classes are retried: provisioned throughput throttling on the
//! stream, and throttling by the KMS key used for server-side encryption.
//! Both draw from one consecutive-failure budget. Anything else is fatal.

mod backoff;

pub use backoff::{Backoff, ExponentialBackoff, ExponentialBackoffBuilder};

use crate::client::KinesisClientError;
use std::time::Duration;
use tracing::trace;

/// Throttle classes the consumer retries
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThrottleKind {
    /// The shard's read throughput was exceeded server side
    ProvisionedThroughput,
    /// The KMS key backing stream encryption was throttled
    KmsThrottling,
}

/// Configuration for retry behavior
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Consecutive throttled attempts tolerated before giving up
    pub max_retries: u32,
    /// How long a shard stays throttled after a throughput rejection
    pub throughput_cooldown: Duration,
    /// Backoff applied to KMS throttling
    pub kms_backoff: ExponentialBackoff,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 5,
            throughput_cooldown: Duration::from_secs(1),
            kms_backoff: ExponentialBackoff::default(),
        }
    }
}

/// Outcome of classifying a failed fetch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Wait for the given delay, then try the same call again
    RetryAfter(Duration),
    /// A retriable error, but the retry budget is spent
    Exhausted,
    /// Not retriable
    Fatal,
}

/// Consecutive failures since the last successful fetch
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RetryState {
    attempts: u32,
}

impl RetryState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count one more failure and return the new total
    pub fn record_failure(&mut self) -> u32 {
        self.attempts = self.attempts.saturating_add(1);
        self.attempts
    }

    pub fn reset(&mut self) {
        self.attempts = 0;
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }
}

#[derive(Debug, Clone, Default)]
pub struct RetryPolicy {
    config: RetryConfig,
}

impl RetryPolicy {
    pub fn new(config: RetryConfig) -> Self {
        Self { config }
    }

    pub fn max_retries(&self) -> u32 {
        self.config.max_retries
    }

    /// Decide what to do about `error`
    ///
    /// `attempts` is the failure count including this one, `since_call_start`
    /// the time elapsed since the failed call was issued.
    pub fn decide(
        &self,
        error: &KinesisClientError,
        attempts: u32,
        since_call_start: Duration,
    ) -> RetryDecision {
        let Some(kind) = error.throttle_kind() else {
            return RetryDecision::Fatal;
        };

        if attempts > self.config.max_retries {
            return RetryDecision::Exhausted;
        }

        let delay = match kind {
            ThrottleKind::ProvisionedThroughput => self
                .config
                .throughput_cooldown
                .saturating_sub(since_call_start),
            ThrottleKind::KmsThrottling => self.config.kms_backoff.next_delay(attempts),
        };

        trace!(?kind, attempts, delay_ms = delay.as_millis() as u64, "Retry scheduled");
        RetryDecision::RetryAfter(delay)
    }
}
