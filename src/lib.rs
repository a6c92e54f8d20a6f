//! Kinesis Shard Poller - a polling consumer for a single Kinesis shard
//!
//! This crate reads one leased shard with `GetRecords`, staying inside the
//! per-shard read limits, retrying throttled calls, renewing the lease, and
//! handing batches plus a checkpointer to a user supplied [`RecordProcessor`].

pub mod checkpointer;
pub mod client;
pub mod clock;
pub mod consumer;
pub mod error;
pub mod monitoring;
pub mod processor;
pub mod rate_limit;
pub mod retry;
pub mod shard;
pub mod store;

// Make test utilities available for integration tests
#[cfg(any(test, feature = "test-utils"))]
pub mod test;
#[cfg(test)]
mod tests;

pub use consumer::{ConsumerOutcome, ShardConsumer, ShardConsumerConfig};
pub use error::{ProcessorError, Result};
pub use rate_limit::{RateLimitConfig, RateLimiter};
pub use retry::{Backoff, ExponentialBackoff, RetryConfig, RetryPolicy};
pub use shard::{Checkpoint, InitialPosition, ShardLease};

// Re-export main traits
pub use crate::checkpointer::Checkpointer;
pub use crate::client::KinesisClientTrait;
pub use crate::clock::Clock;
pub use crate::processor::RecordProcessor;
pub use crate::store::LeaseStore;

// Re-export implementations
pub use crate::clock::SystemClock;
pub use crate::store::memory::InMemoryLeaseStore;
