use anyhow::{anyhow, Result};
use std::time::Duration;
use tokio::sync::watch;

use crate::clock::Clock;
use crate::monitoring::{ProcessingEvent, ProcessingEventType, ShardEventType};
use crate::processor::ShutdownReason;
use crate::retry::ThrottleKind;
use crate::test::TestUtils;
use crate::tests::common::{drain_events, TestContext, SHARD_ID};

fn shard_events(events: &[ProcessingEvent]) -> Vec<ShardEventType> {
    events
        .iter()
        .filter_map(|event| match &event.event_type {
            ProcessingEventType::ShardEvent { event_type, .. } => Some(event_type.clone()),
            _ => None,
        })
        .collect()
}

#[tokio::test]
async fn test_lifecycle_events() -> Result<()> {
    let ctx = TestContext::new().with_monitoring();
    ctx.client.mock_batch(TestUtils::create_test_batch(2, None));

    let (consumer, monitoring_rx) = ctx.consumer()?;
    let mut monitoring_rx = monitoring_rx.ok_or_else(|| anyhow!("Monitoring receiver not created"))?;
    let (_tx, rx) = watch::channel(false);
    consumer.run(ctx.shard(), rx).await?;

    let events = drain_events(&mut monitoring_rx);
    assert!(events.iter().all(|event| event.shard_id == SHARD_ID));
    assert_eq!(
        shard_events(&events),
        vec![
            ShardEventType::Started,
            ShardEventType::Completed(ShutdownReason::Terminate),
        ]
    );

    let fetched: Vec<_> = events
        .iter()
        .filter_map(|event| match &event.event_type {
            ProcessingEventType::RecordsFetched {
                record_count,
                bytes,
                ..
            } => Some((*record_count, *bytes)),
            _ => None,
        })
        .collect();
    // "data-0" and "data-1"
    assert_eq!(fetched, vec![(2, 12)]);
    Ok(())
}

#[tokio::test]
async fn test_throttle_events() -> Result<()> {
    let ctx = TestContext::new().with_monitoring();
    ctx.client.mock_throughput_exceeded(1);
    ctx.client.mock_kms_throttling(1);

    let (consumer, monitoring_rx) = ctx.consumer()?;
    let mut monitoring_rx = monitoring_rx.ok_or_else(|| anyhow!("Monitoring receiver not created"))?;
    let (_tx, rx) = watch::channel(false);
    consumer.run(ctx.shard(), rx).await?;

    let throttles: Vec<_> = drain_events(&mut monitoring_rx)
        .into_iter()
        .filter_map(|event| match event.event_type {
            ProcessingEventType::Throttled {
                kind,
                attempt,
                delay,
            } => Some((kind, attempt, delay)),
            _ => None,
        })
        .collect();

    assert_eq!(
        throttles,
        vec![
            (
                Some(ThrottleKind::ProvisionedThroughput),
                1,
                Duration::from_secs(1)
            ),
            (
                Some(ThrottleKind::KmsThrottling),
                2,
                Duration::from_millis(400)
            ),
        ]
    );
    Ok(())
}

#[tokio::test]
async fn test_error_and_lease_events() -> Result<()> {
    let ctx = TestContext::new().with_monitoring();
    ctx.client.mock_error(crate::client::KinesisClientError::AccessDenied(
        "not allowed".to_string(),
    ));

    let (consumer, monitoring_rx) = ctx.consumer()?;
    let mut monitoring_rx = monitoring_rx.ok_or_else(|| anyhow!("Monitoring receiver not created"))?;
    let (_tx, rx) = watch::channel(false);
    let result = consumer
        .run(ctx.shard_expiring_in(Duration::from_secs(2)), rx)
        .await;
    assert!(result.is_err());

    let events = drain_events(&mut monitoring_rx);
    assert!(events
        .iter()
        .any(|event| event.event_type == ProcessingEventType::LeaseRenewed));

    let error_details = events.iter().find_map(|event| match &event.event_type {
        ProcessingEventType::ShardEvent {
            event_type: ShardEventType::Error,
            details,
        } => details.clone(),
        _ => None,
    });
    assert!(error_details
        .ok_or_else(|| anyhow!("no error event"))?
        .contains("not allowed"));
    Ok(())
}

#[tokio::test]
async fn test_event_timestamps_follow_consumer_clock() -> Result<()> {
    let ctx = TestContext::new().with_monitoring();
    ctx.client
        .mock_batch(TestUtils::create_empty_batch("it-2", 0));

    let (consumer, monitoring_rx) = ctx.consumer()?;
    let mut monitoring_rx = monitoring_rx.ok_or_else(|| anyhow!("Monitoring receiver not created"))?;
    let started_at = ctx.clock.utc_now();
    let (_tx, rx) = watch::channel(false);
    consumer.run(ctx.shard(), rx).await?;

    let events = drain_events(&mut monitoring_rx);
    let first = events.first().ok_or_else(|| anyhow!("no events"))?;
    let last = events.last().ok_or_else(|| anyhow!("no events"))?;
    assert_eq!(first.timestamp, started_at);
    // one idle second between the empty batch and the shard closing
    assert_eq!(last.timestamp, started_at + chrono::Duration::seconds(1));
    assert_eq!(
        last.event_type,
        ProcessingEventType::ShardEvent {
            event_type: ShardEventType::Completed(ShutdownReason::Terminate),
            details: None,
        }
    );
    assert!(events
        .windows(2)
        .all(|pair| pair[0].timestamp <= pair[1].timestamp));
    Ok(())
}

#[tokio::test]
async fn test_monitoring_disabled_by_default() -> Result<()> {
    let ctx = TestContext::new();
    let (_consumer, monitoring_rx) = ctx.consumer()?;
    assert!(monitoring_rx.is_none());
    Ok(())
}
