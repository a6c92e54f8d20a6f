//! Checkpoint handle passed to record processors

use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::error::CheckpointError;
use crate::shard::{Checkpoint, ShardLease};
use crate::store::LeaseStore;

/// Records processing progress for the shard it was created for
#[async_trait]
pub trait Checkpointer: Send + Sync {
    /// Mark every record up to and including `sequence_number` as processed
    async fn checkpoint(&self, sequence_number: &str) -> Result<(), CheckpointError>;

    /// Mark the closed shard as fully processed so its children can start
    async fn checkpoint_shard_end(&self) -> Result<(), CheckpointError>;
}

/// [`Checkpointer`] bound to one shard and a [`LeaseStore`]
pub struct RecordCheckpointer<S> {
    shard: Arc<ShardLease>,
    store: Arc<S>,
}

impl<S: LeaseStore> RecordCheckpointer<S> {
    pub fn new(shard: Arc<ShardLease>, store: Arc<S>) -> Self {
        Self { shard, store }
    }

    async fn save(&self, checkpoint: Checkpoint) -> Result<(), CheckpointError> {
        let shard_id = self.shard.shard_id();
        match self.store.save_checkpoint(shard_id, &checkpoint).await {
            Ok(()) => {
                debug!(shard_id = %shard_id, checkpoint = %checkpoint, "Checkpoint saved");
                self.shard.set_checkpoint(Some(checkpoint));
                Ok(())
            }
            Err(e) => {
                warn!(
                    shard_id = %shard_id,
                    checkpoint = %checkpoint,
                    error = %e,
                    "Failed to save checkpoint"
                );
                Err(e.into())
            }
        }
    }
}

#[async_trait]
impl<S: LeaseStore> Checkpointer for RecordCheckpointer<S> {
    async fn checkpoint(&self, sequence_number: &str) -> Result<(), CheckpointError> {
        if sequence_number.is_empty() {
            return Err(CheckpointError::InvalidData(
                "empty sequence number".to_string(),
            ));
        }
        self.save(Checkpoint::SequenceNumber(sequence_number.to_string()))
            .await
    }

    async fn checkpoint_shard_end(&self) -> Result<(), CheckpointError> {
        self.save(Checkpoint::ShardEnd).await
    }
}
