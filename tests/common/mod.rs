// tests/common/mod.rs
#![allow(dead_code)]

use kinesis_shard_poller::test::mocks::{MockClock, MockKinesisClient, MockRecordProcessor};
use kinesis_shard_poller::{InMemoryLeaseStore, ShardConsumer, ShardConsumerConfig};
use std::sync::{Arc, Once};
use std::time::Duration;

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
            .with_thread_ids(true)
            .try_init()
            .ok();
    });
}

pub fn create_test_config() -> ShardConsumerConfig {
    ShardConsumerConfig {
        stream_name: "test-stream".to_string(),
        worker_id: WORKER_ID.to_string(),
        max_records: 500,
        ..Default::default()
    }
}

pub type StoreConsumer = ShardConsumer<MockRecordProcessor, MockKinesisClient, InMemoryLeaseStore>;

/// Mock stream and processor in front of a real in-memory lease store
pub struct TestContext {
    pub config: ShardConsumerConfig,
    pub clock: Arc<MockClock>,
    pub client: MockKinesisClient,
    pub processor: MockRecordProcessor,
    pub store: InMemoryLeaseStore,
}

impl TestContext {
    pub fn new() -> Self {
        init_logging();
        let clock = Arc::new(MockClock::new());
        let store = InMemoryLeaseStore::new()
            .with_clock(clock.clone())
            .with_lease_duration(Duration::from_secs(10))
            .with_parent_poll_interval(Duration::from_millis(500));

        Self {
            config: create_test_config(),
            clock,
            client: MockKinesisClient::new(),
            processor: MockRecordProcessor::new(),
            store,
        }
    }

    pub fn consumer(&self) -> anyhow::Result<StoreConsumer> {
        let (consumer, _) = ShardConsumer::new(
            self.config.clone(),
            self.processor.clone(),
            self.client.clone(),
            self.store.clone(),
        )?;
        Ok(consumer.with_clock(self.clock.clone()))
    }
}
