//! Test utilities and mock implementations for testing the shard consumer


use aws_sdk_kinesis::types::Record;

use crate::client::RecordBatch;

/// Helper functions for creating test data
pub struct TestUtils;

impl TestUtils {
    /// Create a test record with given sequence number and data
    pub fn create_test_record(sequence_number: &str, data: &[u8]) -> Record {
        Record::builder()
            .sequence_number(sequence_number)
            .data(aws_smithy_types::Blob::new(data.to_vec()))
            .partition_key("test-partition-key")
            .build()
            .expect("Failed to build test record")
    }

    /// Create a record carrying `size` bytes of payload
    pub fn create_sized_record(sequence_number: &str, size: usize) -> Record {
        Self::create_test_record(sequence_number, &vec![b'x'; size])
    }

    /// Create a vector of test records
    pub fn create_test_records(count: usize) -> Vec<Record> {
        (0..count)
            .map(|i| {
                Self::create_test_record(
                    &format!("sequence-{}", i),
                    format!("data-{}", i).as_bytes(),
                )
            })
            .collect()
    }

    /// A batch of `count` records followed by `next_iterator`
    pub fn create_test_batch(count: usize, next_iterator: Option<&str>) -> RecordBatch {
        RecordBatch {
            records: Self::create_test_records(count),
            next_shard_iterator: next_iterator.map(str::to_string),
            millis_behind_latest: Some(0),
        }
    }

    /// An empty batch that keeps the shard open
    pub fn create_empty_batch(next_iterator: &str, millis_behind_latest: i64) -> RecordBatch {
        RecordBatch {
            records: vec![],
            next_shard_iterator: Some(next_iterator.to_string()),
            millis_behind_latest: Some(millis_behind_latest),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_test_record() {
        let record = TestUtils::create_test_record("seq-1", b"test-data");
        assert_eq!(record.sequence_number(), "seq-1");
        assert_eq!(record.data().as_ref(), b"test-data");
        assert_eq!(record.partition_key(), "test-partition-key");
    }

    #[test]
    fn test_create_test_records() {
        let records = TestUtils::create_test_records(3);
        assert_eq!(records.len(), 3);
        assert_eq!(records[0].sequence_number(), "sequence-0");
        assert_eq!(records[2].sequence_number(), "sequence-2");
    }

    #[test]
    fn test_create_batches() {
        let batch = TestUtils::create_test_batch(2, None);
        assert_eq!(batch.records.len(), 2);
        assert!(batch.next_shard_iterator.is_none());

        let empty = TestUtils::create_empty_batch("it-2", 500);
        assert!(empty.records.is_empty());
        assert_eq!(empty.next_shard_iterator.as_deref(), Some("it-2"));
        assert_eq!(empty.millis_behind_latest, Some(500));

        let sized = TestUtils::create_sized_record("seq-1", 1024);
        assert_eq!(sized.data().as_ref().len(), 1024);
    }
}
