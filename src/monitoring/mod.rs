//! Monitoring events emitted by the shard consumer
//!
//! When enabled, the consumer streams [`ProcessingEvent`]s over a bounded
//! channel. Aggregating them into metrics is left to the receiver.

mod types;

pub use types::{MonitoringConfig, ProcessingEvent, ProcessingEventType, ShardEventType};
