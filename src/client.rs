use async_trait::async_trait;
use aws_sdk_kinesis::{
    error::SdkError,
    operation::{get_records::GetRecordsError, get_shard_iterator::GetShardIteratorError},
    types::Record,
    Client,
};
use aws_smithy_types::error::display::DisplayErrorContext;
use aws_smithy_types_convert::date_time::DateTimeExt;
use thiserror::Error;
use tracing::trace;

use crate::retry::ThrottleKind;
use crate::shard::StartingPosition;

/// Classified stream service failure
///
/// Every SDK error is mapped into exactly one of these variants, so deciding
/// whether a failure is retriable is a `match` rather than type inspection.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum KinesisClientError {
    #[error("Provisioned throughput exceeded: {0}")]
    ProvisionedThroughputExceeded(String),

    #[error("KMS throttling: {0}")]
    KmsThrottling(String),

    #[error("Iterator expired: {0}")]
    ExpiredIterator(String),

    #[error("Access denied: {0}")]
    AccessDenied(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Resource not found: {0}")]
    ResourceNotFound(String),

    #[error("KMS error: {0}")]
    KmsError(String),

    #[error("{0}")]
    Other(String),
}

impl KinesisClientError {
    /// The throttle class of this error, if it is one the consumer retries
    pub fn throttle_kind(&self) -> Option<ThrottleKind> {
        match self {
            KinesisClientError::ProvisionedThroughputExceeded(_) => {
                Some(ThrottleKind::ProvisionedThroughput)
            }
            KinesisClientError::KmsThrottling(_) => Some(ThrottleKind::KmsThrottling),
            KinesisClientError::ExpiredIterator(_)
            | KinesisClientError::AccessDenied(_)
            | KinesisClientError::InvalidArgument(_)
            | KinesisClientError::ResourceNotFound(_)
            | KinesisClientError::KmsError(_)
            | KinesisClientError::Other(_) => None,
        }
    }
}

/// One successful `GetRecords` response
#[derive(Debug, Clone, Default)]
pub struct RecordBatch {
    pub records: Vec<Record>,
    /// `None` once the shard has been closed and fully read
    pub next_shard_iterator: Option<String>,
    pub millis_behind_latest: Option<i64>,
}

impl RecordBatch {
    /// Total payload size of the batch in bytes
    pub fn data_bytes(&self) -> u64 {
        self.records
            .iter()
            .map(|record| record.data().as_ref().len() as u64)
            .sum()
    }
}

/// The subset of the Kinesis API a shard consumer needs
#[async_trait]
pub trait KinesisClientTrait: Send + Sync {
    async fn get_shard_iterator(
        &self,
        stream_name: &str,
        shard_id: &str,
        position: &StartingPosition,
    ) -> Result<String, KinesisClientError>;

    async fn get_records(
        &self,
        iterator: &str,
        limit: i32,
    ) -> Result<RecordBatch, KinesisClientError>;
}

#[async_trait]
impl KinesisClientTrait for Client {
    async fn get_shard_iterator(
        &self,
        stream_name: &str,
        shard_id: &str,
        position: &StartingPosition,
    ) -> Result<String, KinesisClientError> {
        let mut req = self
            .get_shard_iterator()
            .stream_name(stream_name)
            .shard_id(shard_id)
            .shard_iterator_type(position.iterator_type());

        if let Some(seq) = position.sequence_number() {
            req = req.starting_sequence_number(seq);
        }

        if let Some(ts) = position.timestamp() {
            req = req.timestamp(aws_smithy_types::DateTime::from_chrono_utc(*ts));
        }

        let response = req.send().await.map_err(classify_get_shard_iterator)?;
        match response.shard_iterator {
            Some(iterator) if !iterator.is_empty() => Ok(iterator),
            _ => Err(KinesisClientError::Other(format!(
                "no shard iterator returned for shard {}",
                shard_id
            ))),
        }
    }

    async fn get_records(
        &self,
        iterator: &str,
        limit: i32,
    ) -> Result<RecordBatch, KinesisClientError> {
        let response = self
            .get_records()
            .shard_iterator(iterator)
            .limit(limit)
            .send()
            .await
            .map_err(classify_get_records)?;

        trace!(
            records = response.records().len(),
            millis_behind_latest = ?response.millis_behind_latest(),
            "GetRecords succeeded"
        );

        Ok(RecordBatch {
            records: response.records().to_vec(),
            next_shard_iterator: response.next_shard_iterator().map(String::from),
            millis_behind_latest: response.millis_behind_latest(),
        })
    }
}

fn classify_get_records<R>(err: SdkError<GetRecordsError, R>) -> KinesisClientError
where
    R: std::fmt::Debug + Send + Sync + 'static,
{
    let message = DisplayErrorContext(&err).to_string();
    match err.into_service_error() {
        GetRecordsError::ProvisionedThroughputExceededException(_) => {
            KinesisClientError::ProvisionedThroughputExceeded(message)
        }
        GetRecordsError::KmsThrottlingException(_) => KinesisClientError::KmsThrottling(message),
        GetRecordsError::ExpiredIteratorException(_) => {
            KinesisClientError::ExpiredIterator(message)
        }
        GetRecordsError::AccessDeniedException(_) => KinesisClientError::AccessDenied(message),
        GetRecordsError::InvalidArgumentException(_) => {
            KinesisClientError::InvalidArgument(message)
        }
        GetRecordsError::ResourceNotFoundException(_) => {
            KinesisClientError::ResourceNotFound(message)
        }
        GetRecordsError::KmsAccessDeniedException(_)
        | GetRecordsError::KmsDisabledException(_)
        | GetRecordsError::KmsInvalidStateException(_)
        | GetRecordsError::KmsNotFoundException(_) => KinesisClientError::KmsError(message),
        _ => KinesisClientError::Other(message),
    }
}

fn classify_get_shard_iterator<R>(err: SdkError<GetShardIteratorError, R>) -> KinesisClientError
where
    R: std::fmt::Debug + Send + Sync + 'static,
{
    let message = DisplayErrorContext(&err).to_string();
    match err.into_service_error() {
        GetShardIteratorError::ProvisionedThroughputExceededException(_) => {
            KinesisClientError::ProvisionedThroughputExceeded(message)
        }
        GetShardIteratorError::AccessDeniedException(_) => {
            KinesisClientError::AccessDenied(message)
        }
        GetShardIteratorError::InvalidArgumentException(_) => {
            KinesisClientError::InvalidArgument(message)
        }
        GetShardIteratorError::ResourceNotFoundException(_) => {
            KinesisClientError::ResourceNotFound(message)
        }
        _ => KinesisClientError::Other(message),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test::TestUtils;
    use aws_credential_types::Credentials;

    #[test]
    fn test_throttle_classification() {
        assert_eq!(
            KinesisClientError::ProvisionedThroughputExceeded("x".into()).throttle_kind(),
            Some(ThrottleKind::ProvisionedThroughput)
        );
        assert_eq!(
            KinesisClientError::KmsThrottling("x".into()).throttle_kind(),
            Some(ThrottleKind::KmsThrottling)
        );
        assert_eq!(
            KinesisClientError::ExpiredIterator("x".into()).throttle_kind(),
            None
        );
        assert_eq!(KinesisClientError::KmsError("x".into()).throttle_kind(), None);
    }

    #[test]
    fn test_batch_data_bytes() {
        let batch = RecordBatch {
            records: vec![
                TestUtils::create_test_record("seq-1", b"abcd"),
                TestUtils::create_test_record("seq-2", b"efghij"),
            ],
            next_shard_iterator: Some("next".to_string()),
            millis_behind_latest: Some(0),
        };
        assert_eq!(batch.data_bytes(), 10);
        assert_eq!(RecordBatch::default().data_bytes(), 0);
    }

    #[test]
    fn test_sdk_client_implements_trait() {
        fn assert_client<C: KinesisClientTrait>(_client: &C) {}

        let creds = Credentials::new("test", "test", None, None, "test");
        let config = aws_sdk_kinesis::Config::builder()
            .credentials_provider(creds)
            .region(aws_config::Region::new("us-east-1"))
            .behavior_version(aws_sdk_kinesis::config::BehaviorVersion::latest())
            .build();

        assert_client(&Client::from_conf(config));
    }
}
