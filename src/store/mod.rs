//! Lease and checkpoint storage used by the shard consumer

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::LeaseError;
use crate::shard::Checkpoint;

pub mod memory;

pub use memory::InMemoryLeaseStore;

/// Durable lease and checkpoint storage shared across a fleet of workers
///
/// Implementations serialize concurrent lease operations themselves.
#[async_trait]
pub trait LeaseStore: Send + Sync {
    /// Checkpoint last recorded for the shard, `None` for a fresh shard
    async fn get_checkpoint(&self, shard_id: &str) -> Result<Option<Checkpoint>, LeaseError>;

    /// Extend the lease held by `owner` and return the new expiry
    ///
    /// Fails with [`LeaseError::NotAcquired`] when another worker owns it.
    async fn renew_lease(&self, shard_id: &str, owner: &str)
        -> Result<DateTime<Utc>, LeaseError>;

    /// Block until the parent shard has been processed to its end
    ///
    /// Fails with [`LeaseError::SequenceIdNotFound`] when the parent has no
    /// record at all.
    async fn wait_for_parent(&self, parent_shard_id: &str) -> Result<(), LeaseError>;

    /// Record progress for the shard
    async fn save_checkpoint(&self, shard_id: &str, checkpoint: &Checkpoint)
        -> Result<(), LeaseError>;

    /// Give up ownership of the shard so another worker can take it
    async fn release_lease(&self, shard_id: &str, owner: &str) -> Result<(), LeaseError>;
}
