//! Record processor interface
//!
//! The consumer drives a [`RecordProcessor`] through its lifecycle: one
//! `initialize`, any number of `process_records`, and at most one `shutdown`.

use async_trait::async_trait;
use aws_sdk_kinesis::types::Record;
use std::fmt;
use std::sync::Arc;

use crate::checkpointer::Checkpointer;
use crate::shard::Checkpoint;

/// Trait for implementing record processing logic
///
/// # Examples
///
/// ```rust
/// use kinesis_shard_poller::processor::{
///     InitializationInput, ProcessRecordsInput, RecordProcessor, ShutdownInput, ShutdownReason,
/// };
///
/// struct PrintingProcessor;
///
/// #[async_trait::async_trait]
/// impl RecordProcessor for PrintingProcessor {
///     async fn initialize(&self, input: InitializationInput) {
///         println!("starting shard {}", input.shard_id);
///     }
///
///     async fn process_records(&self, input: ProcessRecordsInput) {
///         for record in &input.records {
///             println!("{}", record.sequence_number());
///         }
///         if let Some(last) = input.records.last() {
///             let _ = input.checkpointer.checkpoint(last.sequence_number()).await;
///         }
///     }
///
///     async fn shutdown(&self, input: ShutdownInput) {
///         if input.reason == ShutdownReason::Terminate {
///             let _ = input.checkpointer.checkpoint_shard_end().await;
///         }
///     }
/// }
/// ```
#[async_trait]
pub trait RecordProcessor: Send + Sync {
    /// Called once before the first batch is delivered
    async fn initialize(&self, input: InitializationInput);

    /// Called with each batch, in shard order
    async fn process_records(&self, input: ProcessRecordsInput);

    /// Called when the consumer stops for one of the [`ShutdownReason`]s
    async fn shutdown(&self, input: ShutdownInput);
}

#[derive(Debug, Clone)]
pub struct InitializationInput {
    pub shard_id: String,
    /// Checkpoint the shard resumes from, `None` for a fresh shard
    pub checkpoint: Option<Checkpoint>,
}

pub struct ProcessRecordsInput {
    pub records: Vec<Record>,
    pub millis_behind_latest: Option<i64>,
    pub checkpointer: Arc<dyn Checkpointer>,
}

impl fmt::Debug for ProcessRecordsInput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProcessRecordsInput")
            .field("records", &self.records.len())
            .field("millis_behind_latest", &self.millis_behind_latest)
            .finish()
    }
}

/// Why the consumer for a shard stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownReason {
    /// The owner of the consumer asked it to stop
    Requested,
    /// The shard was closed and every record has been delivered
    Terminate,
    /// Another worker took over the lease
    LeaseLost,
}

pub struct ShutdownInput {
    pub reason: ShutdownReason,
    pub checkpointer: Arc<dyn Checkpointer>,
}

impl fmt::Debug for ShutdownInput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ShutdownInput")
            .field("reason", &self.reason)
            .finish()
    }
}
