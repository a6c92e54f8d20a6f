//! Time source used by the consumer loop and the rate limiter
//!
//! Everything time-dependent goes through a [`Clock`] so tests can swap in a
//! virtual clock and assert exact cooldown and backoff values.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::time::{Duration, Instant};

#[async_trait]
pub trait Clock: Send + Sync {
    /// Monotonic "now", used for pacing and retry timing
    fn now(&self) -> Instant;

    /// Wall-clock "now", compared against lease expiry timestamps
    fn utc_now(&self) -> DateTime<Utc>;

    fn elapsed_since(&self, earlier: Instant) -> Duration {
        self.now().saturating_duration_since(earlier)
    }

    /// Suspend the current task for `duration`
    async fn sleep(&self, duration: Duration);
}

/// Clock backed by the system time and the tokio timer
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

#[async_trait]
impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn utc_now(&self) -> DateTime<Utc> {
        Utc::now()
    }

    async fn sleep(&self, duration: Duration) {
        if !duration.is_zero() {
            tokio::time::sleep(duration).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_system_clock_sleep() {
        let clock = SystemClock;
        let start = clock.now();
        clock.sleep(Duration::from_millis(20)).await;
        assert!(clock.elapsed_since(start) >= Duration::from_millis(20));
    }

    #[test]
    fn test_elapsed_since_future_instant_is_zero() {
        let clock = SystemClock;
        let later = clock.now() + Duration::from_secs(60);
        assert_eq!(clock.elapsed_since(later), Duration::ZERO);
    }
}
