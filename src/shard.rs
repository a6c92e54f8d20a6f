//! Shard lease state and starting positions

use aws_sdk_kinesis::types::ShardIteratorType;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::fmt;

/// Checkpoint value recorded for a shard
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Checkpoint {
    /// Last processed sequence number
    SequenceNumber(String),
    /// The shard was closed and every record in it has been processed
    ShardEnd,
}

impl fmt::Display for Checkpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Checkpoint::SequenceNumber(seq) => f.write_str(seq),
            Checkpoint::ShardEnd => f.write_str("SHARD_END"),
        }
    }
}

/// Where to start reading a shard that has no checkpoint yet
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum InitialPosition {
    /// Start from the oldest available record
    #[default]
    TrimHorizon,
    /// Start from the newest record
    Latest,
    /// Start from a specific sequence number
    AtSequenceNumber(String),
    /// Start from a specific timestamp
    AtTimestamp(DateTime<Utc>),
}

/// Resolved position the shard iterator is requested at
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StartingPosition {
    TrimHorizon,
    Latest,
    AtSequenceNumber(String),
    AfterSequenceNumber(String),
    AtTimestamp(DateTime<Utc>),
}

impl StartingPosition {
    /// Resolve the position from a shard's checkpoint, falling back to
    /// `initial` for a fresh shard. Returns `None` for a finished shard.
    pub fn resolve(checkpoint: Option<&Checkpoint>, initial: &InitialPosition) -> Option<Self> {
        match checkpoint {
            Some(Checkpoint::SequenceNumber(seq)) => {
                Some(StartingPosition::AfterSequenceNumber(seq.clone()))
            }
            Some(Checkpoint::ShardEnd) => None,
            None => Some(match initial {
                InitialPosition::TrimHorizon => StartingPosition::TrimHorizon,
                InitialPosition::Latest => StartingPosition::Latest,
                InitialPosition::AtSequenceNumber(seq) => {
                    StartingPosition::AtSequenceNumber(seq.clone())
                }
                InitialPosition::AtTimestamp(ts) => StartingPosition::AtTimestamp(*ts),
            }),
        }
    }

    pub fn iterator_type(&self) -> ShardIteratorType {
        match self {
            StartingPosition::TrimHorizon => ShardIteratorType::TrimHorizon,
            StartingPosition::Latest => ShardIteratorType::Latest,
            StartingPosition::AtSequenceNumber(_) => ShardIteratorType::AtSequenceNumber,
            StartingPosition::AfterSequenceNumber(_) => ShardIteratorType::AfterSequenceNumber,
            StartingPosition::AtTimestamp(_) => ShardIteratorType::AtTimestamp,
        }
    }

    pub fn sequence_number(&self) -> Option<&str> {
        match self {
            StartingPosition::AtSequenceNumber(seq)
            | StartingPosition::AfterSequenceNumber(seq) => Some(seq),
            _ => None,
        }
    }

    pub fn timestamp(&self) -> Option<&DateTime<Utc>> {
        match self {
            StartingPosition::AtTimestamp(ts) => Some(ts),
            _ => None,
        }
    }
}

#[derive(Debug)]
struct LeaseState {
    checkpoint: Option<Checkpoint>,
    lease_timeout: DateTime<Utc>,
}

/// A shard as held by the worker that owns its lease
///
/// Shared between the consumer loop and the checkpointer handed to the
/// record processor. Durable changes go through the lease store; this only
/// mirrors what the store last reported.
#[derive(Debug)]
pub struct ShardLease {
    shard_id: String,
    parent_shard_id: Option<String>,
    state: RwLock<LeaseState>,
}

impl ShardLease {
    pub fn new(shard_id: impl Into<String>, lease_timeout: DateTime<Utc>) -> Self {
        Self {
            shard_id: shard_id.into(),
            parent_shard_id: None,
            state: RwLock::new(LeaseState {
                checkpoint: None,
                lease_timeout,
            }),
        }
    }

    pub fn with_parent(mut self, parent_shard_id: impl Into<String>) -> Self {
        self.parent_shard_id = Some(parent_shard_id.into());
        self
    }

    pub fn with_checkpoint(self, checkpoint: Checkpoint) -> Self {
        self.state.write().checkpoint = Some(checkpoint);
        self
    }

    pub fn shard_id(&self) -> &str {
        &self.shard_id
    }

    pub fn parent_shard_id(&self) -> Option<&str> {
        self.parent_shard_id.as_deref()
    }

    pub fn checkpoint(&self) -> Option<Checkpoint> {
        self.state.read().checkpoint.clone()
    }

    pub fn set_checkpoint(&self, checkpoint: Option<Checkpoint>) {
        self.state.write().checkpoint = checkpoint;
    }

    pub fn lease_timeout(&self) -> DateTime<Utc> {
        self.state.read().lease_timeout
    }

    pub fn set_lease_timeout(&self, lease_timeout: DateTime<Utc>) {
        self.state.write().lease_timeout = lease_timeout;
    }
}
