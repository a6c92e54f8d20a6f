//! Single-shard polling consumer
//!
//! [`ShardConsumer::run`] drives one leased shard from its checkpoint until
//! the shard closes, a stop is requested, the lease is lost, or an
//! unrecoverable error occurs. Each cycle:
//!
//! 1. renews the lease when it is within `lease_refresh_period` of expiry
//! 2. waits out any cooldown required by the [`RateLimiter`]
//! 3. calls `GetRecords`, retrying throttles according to the [`RetryPolicy`]
//! 4. hands the batch and a [`Checkpointer`] to the [`RecordProcessor`]
//! 5. idles when caught up with the stream head
//! 6. checks the stop signal
//!
//! The lease is released exactly once when `run` returns, on every path.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use aws_sdk_kinesis::types::Record;
use futures::FutureExt;
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, trace, warn};

use crate::checkpointer::{Checkpointer, RecordCheckpointer};
use crate::client::{KinesisClientError, KinesisClientTrait, RecordBatch};
use crate::clock::{Clock, SystemClock};
use crate::error::{ProcessorError, Result};
use crate::monitoring::{MonitoringConfig, ProcessingEvent, ShardEventType};
use crate::processor::{
    InitializationInput, ProcessRecordsInput, RecordProcessor, ShutdownInput, ShutdownReason,
};
use crate::rate_limit::{RateLimitConfig, RateLimiter};
use crate::retry::{RetryConfig, RetryDecision, RetryPolicy, RetryState};
use crate::shard::{InitialPosition, ShardLease, StartingPosition};
use crate::store::LeaseStore;

/// Largest `Limit` accepted by `GetRecords`
pub const MAX_RECORDS_PER_CALL: i32 = 10_000;

/// Configuration for a shard consumer
#[derive(Debug, Clone)]
pub struct ShardConsumerConfig {
    /// Name of the Kinesis stream the shard belongs to
    pub stream_name: String,
    /// Identity this worker holds leases under
    pub worker_id: String,
    /// Maximum number of records to request per GetRecords call
    pub max_records: i32,
    /// Sleep between reads when no records came back and the shard is caught up
    pub idle_time_between_reads: Duration,
    /// How long before lease expiry the lease gets renewed
    pub lease_refresh_period: Duration,
    /// Where to start reading a shard that has no checkpoint
    pub initial_position: InitialPosition,
    /// Deliver empty batches to the record processor as well
    pub call_process_records_even_for_empty_list: bool,
    pub rate_limit: RateLimitConfig,
    pub retry: RetryConfig,
    pub monitoring: MonitoringConfig,
}

impl Default for ShardConsumerConfig {
    fn default() -> Self {
        Self {
            stream_name: String::new(),
            worker_id: String::new(),
            max_records: MAX_RECORDS_PER_CALL,
            idle_time_between_reads: Duration::from_millis(1000),
            lease_refresh_period: Duration::from_millis(5000),
            initial_position: InitialPosition::TrimHorizon,
            call_process_records_even_for_empty_list: false,
            rate_limit: RateLimitConfig::default(),
            retry: RetryConfig::default(),
            monitoring: MonitoringConfig::default(),
        }
    }
}

impl ShardConsumerConfig {
    pub fn validate(&self) -> Result<()> {
        if self.stream_name.is_empty() {
            return Err(ProcessorError::ConfigError(
                "stream_name must not be empty".to_string(),
            ));
        }
        if self.worker_id.is_empty() {
            return Err(ProcessorError::ConfigError(
                "worker_id must not be empty".to_string(),
            ));
        }
        if !(1..=MAX_RECORDS_PER_CALL).contains(&self.max_records) {
            return Err(ProcessorError::ConfigError(format!(
                "max_records must be between 1 and {}, got {}",
                MAX_RECORDS_PER_CALL, self.max_records
            )));
        }
        if self.rate_limit.max_calls_per_second == 0 || self.rate_limit.max_bytes_per_second == 0
        {
            return Err(ProcessorError::ConfigError(
                "rate limits must be greater than zero".to_string(),
            ));
        }
        if self.monitoring.enabled && self.monitoring.channel_size == 0 {
            return Err(ProcessorError::ConfigError(
                "monitoring channel_size must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// How a consumer run ended without error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsumerOutcome {
    /// The shard was closed and read to its end
    ShardClosed,
    /// The stop signal was observed
    ShutdownRequested,
    /// Another worker acquired the lease
    LeaseLost,
}

impl ConsumerOutcome {
    pub fn reason(&self) -> ShutdownReason {
        match self {
            ConsumerOutcome::ShardClosed => ShutdownReason::Terminate,
            ConsumerOutcome::ShutdownRequested => ShutdownReason::Requested,
            ConsumerOutcome::LeaseLost => ShutdownReason::LeaseLost,
        }
    }
}

/// Polls one leased shard and feeds its records to a [`RecordProcessor`]
pub struct ShardConsumer<P, C, S>
where
    P: RecordProcessor + 'static,
    C: KinesisClientTrait + 'static,
    S: LeaseStore + 'static,
{
    processor: Arc<P>,
    client: Arc<C>,
    store: Arc<S>,
    clock: Arc<dyn Clock>,
    config: ShardConsumerConfig,
    retry_policy: RetryPolicy,
    monitoring_tx: Option<mpsc::Sender<ProcessingEvent>>,
}

impl<P, C, S> ShardConsumer<P, C, S>
where
    P: RecordProcessor + 'static,
    C: KinesisClientTrait + 'static,
    S: LeaseStore + 'static,
{
    /// Creates a new consumer
    ///
    /// Returns the consumer and, when monitoring is enabled, the receiving
    /// end of its event channel.
    pub fn new(
        config: ShardConsumerConfig,
        processor: P,
        client: C,
        store: S,
    ) -> Result<(Self, Option<mpsc::Receiver<ProcessingEvent>>)> {
        Self::from_shared(config, Arc::new(processor), Arc::new(client), Arc::new(store))
    }

    /// Like [`ShardConsumer::new`], for collaborators shared with other consumers
    pub fn from_shared(
        config: ShardConsumerConfig,
        processor: Arc<P>,
        client: Arc<C>,
        store: Arc<S>,
    ) -> Result<(Self, Option<mpsc::Receiver<ProcessingEvent>>)> {
        config.validate()?;

        let (monitoring_tx, monitoring_rx) = if config.monitoring.enabled {
            let (tx, rx) = mpsc::channel(config.monitoring.channel_size);
            (Some(tx), Some(rx))
        } else {
            (None, None)
        };

        let consumer = Self {
            processor,
            client,
            store,
            clock: Arc::new(SystemClock),
            retry_policy: RetryPolicy::new(config.retry.clone()),
            config,
            monitoring_tx,
        };

        Ok((consumer, monitoring_rx))
    }

    /// Replace the time source
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn config(&self) -> &ShardConsumerConfig {
        &self.config
    }

    /// Consume `shard` until it closes, `shutdown` is set, or the lease is lost
    ///
    /// The caller must hold the lease on `shard`. It is released before this
    /// returns, whatever the outcome.
    pub async fn run(
        &self,
        shard: Arc<ShardLease>,
        shutdown: watch::Receiver<bool>,
    ) -> Result<ConsumerOutcome> {
        let shard_id = shard.shard_id().to_string();
        info!(
            shard_id = %shard_id,
            worker_id = %self.config.worker_id,
            "Starting shard consumer"
        );
        self.send_monitoring_event(ProcessingEvent::shard_event(
            self.clock.utc_now(),
            shard_id.clone(),
            ShardEventType::Started,
            None,
        ));

        let result = match AssertUnwindSafe(self.consume(&shard, &shutdown))
            .catch_unwind()
            .await
        {
            Ok(result) => result,
            Err(panic) => {
                let message = panic_message(panic.as_ref());
                error!(shard_id = %shard_id, panic = %message, "Shard consumer panicked");
                Err(ProcessorError::ProcessorPanicked(message))
            }
        };

        self.release_lease(&shard).await;

        match &result {
            Ok(outcome) => {
                info!(shard_id = %shard_id, outcome = ?outcome, "Shard consumer finished");
                self.send_monitoring_event(ProcessingEvent::shard_event(
                    self.clock.utc_now(),
                    shard_id,
                    ShardEventType::Completed(outcome.reason()),
                    None,
                ));
            }
            Err(e) => {
                error!(shard_id = %shard_id, error = %e, "Shard consumer failed");
                self.send_monitoring_event(ProcessingEvent::shard_event(
                    self.clock.utc_now(),
                    shard_id,
                    ShardEventType::Error,
                    Some(e.to_string()),
                ));
            }
        }

        result
    }

    async fn consume(
        &self,
        shard: &Arc<ShardLease>,
        shutdown: &watch::Receiver<bool>,
    ) -> Result<ConsumerOutcome> {
        let shard_id = shard.shard_id();

        let checkpoint = self.store.get_checkpoint(shard_id).await.map_err(|e| {
            error!(shard_id = %shard_id, error = %e, "Failed to fetch checkpoint");
            ProcessorError::CheckpointFetch {
                shard_id: shard_id.to_string(),
                source: e,
            }
        })?;
        shard.set_checkpoint(checkpoint.clone());

        let Some(position) =
            StartingPosition::resolve(checkpoint.as_ref(), &self.config.initial_position)
        else {
            info!(shard_id = %shard_id, "Shard already processed to its end");
            return Ok(ConsumerOutcome::ShardClosed);
        };
        debug!(shard_id = %shard_id, position = ?position, "Resolved starting position");

        self.wait_on_parent_shard(shard).await?;

        let mut iterator = self
            .client
            .get_shard_iterator(&self.config.stream_name, shard_id, &position)
            .await
            .map_err(|e| {
                error!(shard_id = %shard_id, error = %e, "Unable to get shard iterator");
                ProcessorError::GetIteratorFailed(e)
            })?;
        if iterator.is_empty() {
            error!(shard_id = %shard_id, "Empty shard iterator returned");
            return Err(ProcessorError::GetIteratorFailed(KinesisClientError::Other(
                format!("empty shard iterator for shard {}", shard_id),
            )));
        }

        self.processor
            .initialize(InitializationInput {
                shard_id: shard_id.to_string(),
                checkpoint,
            })
            .await;

        let checkpointer: Arc<dyn Checkpointer> =
            Arc::new(RecordCheckpointer::new(shard.clone(), self.store.clone()));
        let mut retry = RetryState::new();
        let mut limiter = RateLimiter::new(self.config.rate_limit.clone(), self.clock.now());
        let idle_threshold_ms = self.config.idle_time_between_reads.as_millis() as i64;

        loop {
            if self.lease_needs_refresh(shard) && !self.refresh_lease(shard).await? {
                self.notify_shutdown(ShutdownReason::LeaseLost, &checkpointer)
                    .await;
                return Ok(ConsumerOutcome::LeaseLost);
            }

            let Some(batch) = self
                .fetch_batch(shard_id, &iterator, &mut retry, &mut limiter)
                .await?
            else {
                // a skipped cycle still honours a stop
                if *shutdown.borrow() {
                    return Ok(self.stop_requested(shard_id, &checkpointer).await);
                }
                continue;
            };

            let RecordBatch {
                records,
                next_shard_iterator,
                millis_behind_latest,
            } = batch;
            let caught_up_and_empty =
                records.is_empty() && millis_behind_latest.unwrap_or(0) < idle_threshold_ms;

            self.deliver_records(records, millis_behind_latest, &checkpointer)
                .await;

            match next_shard_iterator {
                Some(next) => iterator = next,
                None => {
                    info!(shard_id = %shard_id, "Shard closed");
                    self.notify_shutdown(ShutdownReason::Terminate, &checkpointer)
                        .await;
                    return Ok(ConsumerOutcome::ShardClosed);
                }
            }

            if caught_up_and_empty {
                trace!(
                    shard_id = %shard_id,
                    idle_ms = idle_threshold_ms,
                    "No new records, idling"
                );
                self.clock.sleep(self.config.idle_time_between_reads).await;
            }

            let stop_requested = *shutdown.borrow();
            if stop_requested {
                return Ok(self.stop_requested(shard_id, &checkpointer).await);
            }
        }
    }

    async fn stop_requested(
        &self,
        shard_id: &str,
        checkpointer: &Arc<dyn Checkpointer>,
    ) -> ConsumerOutcome {
        info!(shard_id = %shard_id, "Shutdown requested");
        self.notify_shutdown(ShutdownReason::Requested, checkpointer)
            .await;
        ConsumerOutcome::ShutdownRequested
    }

    /// Block until the parent shard is finished, if there is one
    async fn wait_on_parent_shard(&self, shard: &ShardLease) -> Result<()> {
        let Some(parent_shard_id) = shard.parent_shard_id() else {
            return Ok(());
        };

        debug!(
            shard_id = %shard.shard_id(),
            parent_shard_id = %parent_shard_id,
            "Waiting for parent shard to finish"
        );

        match self.store.wait_for_parent(parent_shard_id).await {
            Ok(()) => Ok(()),
            // parent already retired by the service
            Err(e) if e.is_sequence_id_not_found() => {
                debug!(
                    parent_shard_id = %parent_shard_id,
                    "Parent shard has no record, continuing"
                );
                Ok(())
            }
            Err(e) => {
                error!(
                    shard_id = %shard.shard_id(),
                    parent_shard_id = %parent_shard_id,
                    error = %e,
                    "Error waiting for parent shard"
                );
                Err(ProcessorError::ParentShardWait {
                    parent_shard_id: parent_shard_id.to_string(),
                    source: e,
                })
            }
        }
    }

    fn lease_needs_refresh(&self, shard: &ShardLease) -> bool {
        let refresh_period = chrono::Duration::from_std(self.config.lease_refresh_period)
            .unwrap_or_else(|_| chrono::Duration::zero());
        self.clock.utc_now() > shard.lease_timeout() - refresh_period
    }

    /// Renew the lease; `Ok(false)` means another worker owns it now
    async fn refresh_lease(&self, shard: &ShardLease) -> Result<bool> {
        let shard_id = shard.shard_id();
        debug!(
            shard_id = %shard_id,
            worker_id = %self.config.worker_id,
            "Refreshing lease"
        );

        match self
            .store
            .renew_lease(shard_id, &self.config.worker_id)
            .await
        {
            Ok(lease_timeout) => {
                shard.set_lease_timeout(lease_timeout);
                self.send_monitoring_event(ProcessingEvent::lease_renewed(
                    self.clock.utc_now(),
                    shard_id.to_string(),
                ));
                Ok(true)
            }
            Err(e) if e.is_not_acquired() => {
                warn!(
                    shard_id = %shard_id,
                    worker_id = %self.config.worker_id,
                    "Failed in acquiring lease"
                );
                Ok(false)
            }
            Err(e) => {
                error!(
                    shard_id = %shard_id,
                    worker_id = %self.config.worker_id,
                    error = %e,
                    "Error in refreshing lease"
                );
                Err(ProcessorError::LeaseRenewal {
                    shard_id: shard_id.to_string(),
                    source: e,
                })
            }
        }
    }

    /// Fetch the next batch, absorbing throttles
    ///
    /// Returns `Ok(None)` when the local call budget is spent and the cycle
    /// should be skipped.
    async fn fetch_batch(
        &self,
        shard_id: &str,
        iterator: &str,
        retry: &mut RetryState,
        limiter: &mut RateLimiter,
    ) -> Result<Option<RecordBatch>> {
        loop {
            match limiter.acquire(self.clock.now()) {
                Ok(cooldown) if !cooldown.is_zero() => {
                    debug!(
                        shard_id = %shard_id,
                        cooldown_ms = cooldown.as_millis() as u64,
                        "Cooling off before GetRecords"
                    );
                    self.clock.sleep(cooldown).await;
                }
                Ok(_) => {}
                Err(exceeded) => {
                    debug!(shard_id = %shard_id, error = %exceeded, "Skipping read cycle");
                    self.send_monitoring_event(ProcessingEvent::throttled(
                        self.clock.utc_now(),
                        shard_id.to_string(),
                        None,
                        retry.attempts(),
                        exceeded.retry_after,
                    ));
                    self.clock.sleep(exceeded.retry_after).await;
                    return Ok(None);
                }
            }

            trace!(
                shard_id = %shard_id,
                limit = self.config.max_records,
                "Reading records from iterator"
            );
            let call_start = self.clock.now();

            match self
                .client
                .get_records(iterator, self.config.max_records)
                .await
            {
                Ok(batch) => {
                    retry.reset();
                    let bytes = batch.data_bytes();
                    limiter.record_bytes(bytes);
                    self.send_monitoring_event(ProcessingEvent::records_fetched(
                        self.clock.utc_now(),
                        shard_id.to_string(),
                        batch.records.len(),
                        bytes,
                        batch.millis_behind_latest,
                        self.clock.elapsed_since(call_start),
                    ));
                    return Ok(Some(batch));
                }
                Err(e) => {
                    let attempts = retry.record_failure();
                    let since_call_start = self.clock.elapsed_since(call_start);
                    match self.retry_policy.decide(&e, attempts, since_call_start) {
                        RetryDecision::RetryAfter(delay) => {
                            warn!(
                                shard_id = %shard_id,
                                attempt = attempts,
                                delay_ms = delay.as_millis() as u64,
                                error = %e,
                                "Throttled getting records, will retry"
                            );
                            self.send_monitoring_event(ProcessingEvent::throttled(
                                self.clock.utc_now(),
                                shard_id.to_string(),
                                e.throttle_kind(),
                                attempts,
                                delay,
                            ));
                            self.clock.sleep(delay).await;
                        }
                        RetryDecision::Exhausted => {
                            error!(
                                shard_id = %shard_id,
                                retry_count = attempts,
                                error = %e,
                                "Reached max retry count getting records"
                            );
                            return Err(ProcessorError::MaxRetriesExceeded {
                                attempts,
                                source: e,
                            });
                        }
                        RetryDecision::Fatal => {
                            error!(
                                shard_id = %shard_id,
                                error = %e,
                                "Error getting records that cannot be retried"
                            );
                            return Err(ProcessorError::GetRecordsFailed(e));
                        }
                    }
                }
            }
        }
    }

    async fn deliver_records(
        &self,
        records: Vec<Record>,
        millis_behind_latest: Option<i64>,
        checkpointer: &Arc<dyn Checkpointer>,
    ) {
        if records.is_empty() && !self.config.call_process_records_even_for_empty_list {
            return;
        }

        debug!(
            records = records.len(),
            millis_behind_latest = ?millis_behind_latest,
            "Delivering records to processor"
        );
        self.processor
            .process_records(ProcessRecordsInput {
                records,
                millis_behind_latest,
                checkpointer: checkpointer.clone(),
            })
            .await;
    }

    async fn notify_shutdown(&self, reason: ShutdownReason, checkpointer: &Arc<dyn Checkpointer>) {
        debug!(reason = ?reason, "Notifying record processor of shutdown");
        self.processor
            .shutdown(ShutdownInput {
                reason,
                checkpointer: checkpointer.clone(),
            })
            .await;
    }

    async fn release_lease(&self, shard: &ShardLease) {
        match self
            .store
            .release_lease(shard.shard_id(), &self.config.worker_id)
            .await
        {
            Ok(()) => debug!(shard_id = %shard.shard_id(), "Released lease"),
            Err(e) => warn!(
                shard_id = %shard.shard_id(),
                error = %e,
                "Failed to release lease"
            ),
        }
    }

    /// Sends a monitoring event if monitoring is enabled
    fn send_monitoring_event(&self, event: ProcessingEvent) {
        if let Some(tx) = &self.monitoring_tx {
            // a slow monitor must not stall the shard
            if let Err(e) = tx.try_send(event) {
                warn!(error = %e, "Failed to send monitoring event");
            }
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
