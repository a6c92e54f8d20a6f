//! Error types for the shard consumer

use crate::client::KinesisClientError;
use thiserror::Error;

/// Main error type for shard consumer operations
#[derive(Debug, Error)]
pub enum ProcessorError {
    #[error("Failed to get iterator: {0}")]
    GetIteratorFailed(#[source] KinesisClientError),

    #[error("Failed to get records: {0}")]
    GetRecordsFailed(#[source] KinesisClientError),

    #[error("Maximum retry attempts reached after {attempts} attempts: {source}")]
    MaxRetriesExceeded {
        attempts: u32,
        #[source]
        source: KinesisClientError,
    },

    #[error("Error waiting for parent shard {parent_shard_id}: {source}")]
    ParentShardWait {
        parent_shard_id: String,
        #[source]
        source: LeaseError,
    },

    #[error("Error refreshing lease on shard {shard_id}: {source}")]
    LeaseRenewal {
        shard_id: String,
        #[source]
        source: LeaseError,
    },

    #[error("Failed to fetch checkpoint for shard {shard_id}: {source}")]
    CheckpointFetch {
        shard_id: String,
        #[source]
        source: LeaseError,
    },

    #[error("Checkpoint error: {0}")]
    CheckpointError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Record processor panicked: {0}")]
    ProcessorPanicked(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Result type for shard consumer operations
pub type Result<T> = std::result::Result<T, ProcessorError>;

/// Errors reported by a [`LeaseStore`](crate::store::LeaseStore)
#[derive(Debug, Error)]
pub enum LeaseError {
    /// Another worker holds the lease
    #[error("Lease on shard {shard_id} not acquired by worker {owner}")]
    NotAcquired { shard_id: String, owner: String },

    /// No checkpoint is recorded for the shard
    #[error("Sequence ID not found for shard {0}")]
    SequenceIdNotFound(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl LeaseError {
    pub fn is_not_acquired(&self) -> bool {
        matches!(self, LeaseError::NotAcquired { .. })
    }

    pub fn is_sequence_id_not_found(&self) -> bool {
        matches!(self, LeaseError::SequenceIdNotFound(_))
    }
}

/// Error type for checkpoint operations
#[derive(Debug, Error)]
pub enum CheckpointError {
    #[error("Failed to save checkpoint: {0}")]
    SaveFailed(String),

    #[error("Invalid checkpoint data: {0}")]
    InvalidData(String),
}

impl From<CheckpointError> for ProcessorError {
    fn from(err: CheckpointError) -> Self {
        ProcessorError::CheckpointError(err.to_string())
    }
}

impl From<LeaseError> for CheckpointError {
    fn from(err: LeaseError) -> Self {
        CheckpointError::SaveFailed(err.to_string())
    }
}
