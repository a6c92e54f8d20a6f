use rand::Rng;
use std::time::Duration;
use tracing::trace;

/// Trait defining backoff behavior
pub trait Backoff: Send + Sync {
    /// Calculate the delay after `attempt` consecutive failures
    fn next_delay(&self, attempt: u32) -> Duration;
}

/// Exponential backoff with optional jitter
///
/// The delay after `attempt` failures is `initial_delay * multiplier^attempt`,
/// capped at `max_delay`.
#[derive(Debug, Clone)]
pub struct ExponentialBackoff {
    initial_delay: Duration,
    max_delay: Duration,
    multiplier: f64,
    jitter_factor: f64,
}

impl ExponentialBackoff {
    pub fn new(initial_delay: Duration, max_delay: Duration) -> Self {
        Self {
            initial_delay,
            max_delay,
            multiplier: 2.0,
            jitter_factor: 0.0,
        }
    }

    /// Create a new builder for ExponentialBackoff
    pub fn builder() -> ExponentialBackoffBuilder {
        ExponentialBackoffBuilder::default()
    }

    fn calculate_delay(&self, attempt: u32) -> Duration {
        let base = self.initial_delay.as_millis() as f64;
        let exp_delay = base * self.multiplier.powi(attempt as i32);

        let max_ms = self.max_delay.as_millis() as f64;
        let capped_delay = exp_delay.min(max_ms);

        let jitter = if self.jitter_factor > 0.0 {
            let jitter_range = capped_delay * self.jitter_factor;
            rand::thread_rng().gen_range(-jitter_range..=jitter_range)
        } else {
            0.0
        };

        // Cap again after adding jitter to ensure we never exceed max_delay
        let final_delay = (capped_delay + jitter).min(max_ms);

        trace!(
            attempt = attempt,
            base_delay_ms = capped_delay,
            jitter_ms = jitter,
            final_delay_ms = final_delay,
            "Calculated backoff delay"
        );

        Duration::from_millis(final_delay as u64)
    }
}

impl Default for ExponentialBackoff {
    fn default() -> Self {
        ExponentialBackoffBuilder::default().build()
    }
}

impl Backoff for ExponentialBackoff {
    fn next_delay(&self, attempt: u32) -> Duration {
        self.calculate_delay(attempt)
    }
}

/// Builder for ExponentialBackoff
///
/// Defaults to 100ms doubling per attempt, no cap and no jitter.
#[derive(Debug)]
pub struct ExponentialBackoffBuilder {
    initial_delay: Duration,
    max_delay: Duration,
    multiplier: f64,
    jitter_factor: f64,
}

impl Default for ExponentialBackoffBuilder {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::MAX,
            multiplier: 2.0,
            jitter_factor: 0.0,
        }
    }
}

impl ExponentialBackoffBuilder {
    pub fn initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    pub fn max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    pub fn multiplier(mut self, multiplier: f64) -> Self {
        self.multiplier = multiplier;
        self
    }

    pub fn jitter_factor(mut self, factor: f64) -> Self {
        self.jitter_factor = factor.clamp(0.0, 1.0);
        self
    }

    pub fn build(self) -> ExponentialBackoff {
        ExponentialBackoff {
            initial_delay: self.initial_delay,
            max_delay: self.max_delay,
            multiplier: self.multiplier,
            jitter_factor: self.jitter_factor,
        }
    }
}
