use std::sync::{Arc, Once};
use std::time::Duration;

use crate::consumer::{ShardConsumer, ShardConsumerConfig};
use crate::monitoring::{MonitoringConfig, ProcessingEvent};
use crate::shard::ShardLease;
use crate::test::mocks::{MockClock, MockKinesisClient, MockLeaseStore, MockRecordProcessor};
use crate::clock::Clock;
use tokio::sync::mpsc;

pub const SHARD_ID: &str = "shard-1";
pub const WORKER_ID: &str = "worker-1";

static INIT: Once = Once::new();

pub fn init_logging() {
    INIT.call_once(|| {
        tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::from_default_env()
                    .add_directive("kinesis_shard_poller=debug".parse().unwrap()),
            )
            .with_test_writer()
            .with_line_number(true)
            .try_init()
            .ok();
    });
}

pub fn create_test_config() -> ShardConsumerConfig {
    ShardConsumerConfig {
        stream_name: "test-stream".to_string(),
        worker_id: WORKER_ID.to_string(),
        max_records: 100,
        ..Default::default()
    }
}

pub type TestConsumer = ShardConsumer<MockRecordProcessor, MockKinesisClient, MockLeaseStore>;

/// Mocks sharing one virtual clock
pub struct TestContext {
    pub config: ShardConsumerConfig,
    pub clock: Arc<MockClock>,
    pub client: MockKinesisClient,
    pub processor: MockRecordProcessor,
    pub store: MockLeaseStore,
}

impl TestContext {
    pub fn new() -> Self {
        init_logging();
        Self {
            config: create_test_config(),
            clock: Arc::new(MockClock::new()),
            client: MockKinesisClient::new(),
            processor: MockRecordProcessor::new(),
            store: MockLeaseStore::new(),
        }
    }

    pub fn with_monitoring(mut self) -> Self {
        self.config.monitoring = MonitoringConfig {
            enabled: true,
            channel_size: 1000,
        };
        self
    }

    pub fn consumer(&self) -> anyhow::Result<(TestConsumer, Option<mpsc::Receiver<ProcessingEvent>>)> {
        let (consumer, monitoring_rx) = ShardConsumer::new(
            self.config.clone(),
            self.processor.clone(),
            self.client.clone(),
            self.store.clone(),
        )?;
        Ok((consumer.with_clock(self.clock.clone()), monitoring_rx))
    }

    /// A shard whose lease will not need renewing during the test
    pub fn shard(&self) -> Arc<ShardLease> {
        Arc::new(ShardLease::new(
            SHARD_ID,
            self.clock.utc_now() + chrono::Duration::hours(1),
        ))
    }

    /// A shard whose lease expires `lease_left` from now
    pub fn shard_expiring_in(&self, lease_left: Duration) -> Arc<ShardLease> {
        let lease_left = chrono::Duration::from_std(lease_left).unwrap();
        Arc::new(ShardLease::new(SHARD_ID, self.clock.utc_now() + lease_left))
    }
}

/// Drain whatever is buffered on the monitoring channel
pub fn drain_events(monitoring_rx: &mut mpsc::Receiver<ProcessingEvent>) -> Vec<ProcessingEvent> {
    let mut events = Vec::new();
    while let Ok(event) = monitoring_rx.try_recv() {
        events.push(event);
    }
    events
}
