//! Per-shard read throughput limiting
//!
//! Kinesis allows each shard five `GetRecords` calls and 2 MB of reads per
//! second. [`RateLimiter`] tracks consumption in a [`PacingWindow`] and, before
//! every call, computes how long the caller has to wait so that neither limit
//! is exceeded on average.

use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, trace};

/// Read calls allowed per shard per second
pub const MAX_READ_CALLS_PER_SECOND: u32 = 5;
/// Bytes readable per shard per second
pub const MAX_BYTES_PER_SECOND: u64 = 2_000_000;
/// Largest payload a single `GetRecords` call can return
pub const MAX_BYTES_PER_CALL: u64 = 10_000_000;

const WINDOW: Duration = Duration::from_secs(1);

#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    pub max_calls_per_second: u32,
    pub max_bytes_per_second: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_calls_per_second: MAX_READ_CALLS_PER_SECOND,
            max_bytes_per_second: MAX_BYTES_PER_SECOND,
        }
    }
}

/// The local call budget for the current window is spent
#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
#[error("GetRecords calls per second exceeded locally, window resets in {retry_after:?}")]
pub struct LocalThroughputExceeded {
    /// Time left until the current window ends
    pub retry_after: Duration,
}

/// Consumption counters for one pacing window
///
/// Calls and bytes are tracked on separate clocks. The call window only
/// closes a full second after its first call, while a byte cooldown moves
/// the byte window forward. Bytes stay on the window until either a cooldown
/// pays them off or the window closes under the byte rate, so a burst that
/// overshoots the rate is carried as a deficit into the next cooldown.
#[derive(Debug, Clone)]
pub struct PacingWindow {
    pub calls_made: u32,
    pub calls_started: Instant,
    pub bytes_read: u64,
    pub bytes_started: Instant,
}

impl PacingWindow {
    pub fn new(started: Instant) -> Self {
        Self {
            calls_made: 0,
            calls_started: started,
            bytes_read: 0,
            bytes_started: started,
        }
    }

    fn reset_calls(&mut self, started: Instant) {
        self.calls_made = 0;
        self.calls_started = started;
    }

    fn reset_bytes(&mut self, started: Instant) {
        self.bytes_read = 0;
        self.bytes_started = started;
    }
}

#[derive(Debug, Clone)]
pub struct RateLimiter {
    config: RateLimitConfig,
    window: PacingWindow,
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig, now: Instant) -> Self {
        Self {
            config,
            window: PacingWindow::new(now),
        }
    }

    /// Start from an existing window, e.g. one restored in a test
    pub fn with_window(config: RateLimitConfig, window: PacingWindow) -> Self {
        Self { config, window }
    }

    pub fn window(&self) -> &PacingWindow {
        &self.window
    }

    /// Reserve one call at `now`
    ///
    /// Returns the cooldown the caller must sleep before issuing the call, or
    /// [`LocalThroughputExceeded`] when the call budget of the window the call
    /// would land in is already spent.
    pub fn acquire(&mut self, now: Instant) -> Result<Duration, LocalThroughputExceeded> {
        let bytes_elapsed = now.saturating_duration_since(self.window.bytes_started);

        let cooldown = self.byte_cooldown(bytes_elapsed);
        if !cooldown.is_zero() {
            debug!(
                bytes_read = self.window.bytes_read,
                elapsed_ms = bytes_elapsed.as_millis() as u64,
                cooldown_ms = cooldown.as_millis() as u64,
                "Byte rate over limit, cooling off"
            );
            // the cooldown pays for everything read so far
            self.window.reset_bytes(now + cooldown);
        } else if bytes_elapsed >= WINDOW {
            self.window.reset_bytes(now);
        }

        // the call is issued once the cooldown is over
        let issue_at = now + cooldown;
        let calls_elapsed = issue_at.saturating_duration_since(self.window.calls_started);
        if calls_elapsed >= WINDOW {
            trace!(
                elapsed_ms = calls_elapsed.as_millis() as u64,
                "Starting new pacing window"
            );
            self.window.reset_calls(issue_at);
        } else if self.window.calls_made >= self.config.max_calls_per_second {
            return Err(LocalThroughputExceeded {
                retry_after: cooldown + (WINDOW - calls_elapsed),
            });
        }

        self.window.calls_made += 1;
        Ok(cooldown)
    }

    /// Account for the payload returned by a call
    pub fn record_bytes(&mut self, bytes: u64) {
        self.window.bytes_read = self.window.bytes_read.saturating_add(bytes);
    }

    fn byte_cooldown(&self, elapsed: Duration) -> Duration {
        let bytes = self.window.bytes_read as f64;
        let cap = self.config.max_bytes_per_second as f64;
        if self.window.bytes_read == 0 || cap <= 0.0 {
            return Duration::ZERO;
        }

        if bytes > cap * elapsed.as_secs_f64() {
            Duration::from_secs_f64(bytes / cap)
        } else {
            Duration::ZERO
        }
    }
}
