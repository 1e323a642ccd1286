use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;

use crate::message::{TimestampKind, Topic, TopicPartition};
use crate::AppResult;

/// A record as it comes off the wire, before deserialization and filtering.
#[derive(Debug, Clone)]
pub struct RawRecord {
    pub partition: i32,
    pub offset: i64,
    pub timestamp: i64,
    pub timestamp_kind: TimestampKind,
    pub key: Option<Bytes>,
    pub value: Option<Bytes>,
    pub headers: Vec<RawHeader>,
}

#[derive(Debug, Clone)]
pub struct RawHeader {
    pub key: String,
    pub value: Option<Bytes>,
}

impl RawHeader {
    pub fn new(key: impl Into<String>, value: Option<Bytes>) -> Self {
        Self {
            key: key.into(),
            value,
        }
    }
}

/// Topic metadata at call time: partitions with their begin/end offsets.
#[async_trait]
pub trait TopicMetadataProvider: Send + Sync {
    async fn topic(&self, name: &str) -> AppResult<Topic>;
}

/// Entry point to the log cluster. A scan acquires exactly one read
/// connection, owns it exclusively and releases it when the scan ends.
#[async_trait]
pub trait ClusterClient: TopicMetadataProvider {
    async fn reader(&self) -> AppResult<Box<dyn ReadConnection>>;
}

/// One read connection against the cluster. Not shared across scans; all
/// cursor state lives behind `&mut self`.
#[async_trait]
pub trait ReadConnection: Send {
    async fn assign(&mut self, partitions: &[TopicPartition]) -> AppResult<()>;

    async fn seek(&mut self, partition: &TopicPartition, offset: i64) -> AppResult<()>;

    /// Waits at most `timeout` for the next batch across assigned partitions.
    /// An empty batch is a normal outcome, not an error.
    async fn poll(&mut self, timeout: Duration) -> AppResult<Vec<RawRecord>>;

    /// For each partition, the first offset whose record timestamp is at or
    /// after the given epoch-millisecond probe; `None` when the timestamp is
    /// beyond the partition's available data.
    async fn offsets_for_timestamp(
        &mut self,
        targets: &BTreeMap<TopicPartition, i64>,
    ) -> AppResult<BTreeMap<TopicPartition, Option<i64>>>;

    async fn close(&mut self) -> AppResult<()>;
}
