use chrono::{DateTime, Utc};
use std::time::Duration;

use crate::processor::ShutdownReason;
use crate::retry::ThrottleKind;

/// Configuration for the monitoring system
#[derive(Debug, Clone)]
pub struct MonitoringConfig {
    /// Whether monitoring is enabled
    pub enabled: bool,
    /// Size of the monitoring channel buffer
    pub channel_size: usize,
}

impl Default for MonitoringConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            channel_size: 1000,
        }
    }
}

/// Represents a monitoring event from the shard consumer
#[derive(Debug, Clone)]
pub struct ProcessingEvent {
    /// When the event occurred, as seen by the consumer's clock
    pub timestamp: DateTime<Utc>,
    /// ID of the shard this event relates to
    pub shard_id: String,
    /// The type of event and its details
    pub event_type: ProcessingEventType,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ProcessingEventType {
    ShardEvent {
        event_type: ShardEventType,
        details: Option<String>,
    },
    LeaseRenewed,
    RecordsFetched {
        record_count: usize,
        bytes: u64,
        millis_behind_latest: Option<i64>,
        duration: Duration,
    },
    /// A call was held back, either by the service or by the local limiter
    Throttled {
        /// `None` when the local call budget was exhausted
        kind: Option<ThrottleKind>,
        attempt: u32,
        delay: Duration,
    },
}

/// Types of shard-level events
#[derive(Debug, Clone, PartialEq)]
pub enum ShardEventType {
    /// Started consuming a shard
    Started,
    /// Stopped consuming a shard without error
    Completed(ShutdownReason),
    /// Consuming a shard failed
    Error,
}

impl ProcessingEvent {
    fn new(timestamp: DateTime<Utc>, shard_id: String, event_type: ProcessingEventType) -> Self {
        Self {
            timestamp,
            shard_id,
            event_type,
        }
    }

    pub fn shard_event(
        timestamp: DateTime<Utc>,
        shard_id: String,
        event_type: ShardEventType,
        details: Option<String>,
    ) -> Self {
        Self::new(
            timestamp,
            shard_id,
            ProcessingEventType::ShardEvent {
                event_type,
                details,
            },
        )
    }

    pub fn lease_renewed(timestamp: DateTime<Utc>, shard_id: String) -> Self {
        Self::new(timestamp, shard_id, ProcessingEventType::LeaseRenewed)
    }

    pub fn records_fetched(
        timestamp: DateTime<Utc>,
        shard_id: String,
        record_count: usize,
        bytes: u64,
        millis_behind_latest: Option<i64>,
        duration: Duration,
    ) -> Self {
        Self::new(
            timestamp,
            shard_id,
            ProcessingEventType::RecordsFetched {
                record_count,
                bytes,
                millis_behind_latest,
                duration,
            },
        )
    }

    pub fn throttled(
        timestamp: DateTime<Utc>,
        shard_id: String,
        kind: Option<ThrottleKind>,
        attempt: u32,
        delay: Duration,
    ) -> Self {
        Self::new(
            timestamp,
            shard_id,
            ProcessingEventType::Throttled {
                kind,
                attempt,
                delay,
            },
        )
    }
}
